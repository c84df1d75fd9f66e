//! Stateful, exclusive-access Modbus device client.
//!
//! [`ModbusDevice`] owns the transport connection and its whole lifetime:
//! it connects lazily on the first operation, closes the link after a
//! configurable idle period, and forces a reconnect cycle once a connection
//! reaches a configurable age. All operations on one device are serialized
//! behind a single lock, so at most one transport call is in flight per
//! device at any time.
//!
//! # Examples
//!
//! ```no_run
//! use modbus_device_lib::codec::{Endianness, RegisterType};
//! use modbus_device_lib::tokio_device::{ConnectionPolicy, ModbusDevice};
//! use tokio_modbus::Slave;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let device =
//!         ModbusDevice::new_tcp("inverter.local", 502, Slave(3), ConnectionPolicy::default())
//!             .await?;
//!
//!     // Connects on demand; the link is closed again once idle.
//!     let power: Vec<f32> = device
//!         .read_registers(30775, 1, RegisterType::Holding, Endianness::Big)
//!         .await?;
//!     println!("power: {} W", power[0]);
//!
//!     let model = device
//!         .read_ascii_string(40020, 16, RegisterType::Holding, Endianness::Big)
//!         .await?;
//!     println!("model: {model}");
//!
//!     Ok(())
//! }
//! ```

#[cfg(feature = "tokio-tcp")]
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_modbus::client::{Client, Context};
use tokio_modbus::Slave;

use crate::codec::{Endianness, RegisterType, RegisterValue};
use crate::tokio_async;
#[cfg(feature = "tokio-rtu")]
use crate::tokio_common::{serial_port_builder, SerialConfig};
use crate::tokio_common::{Error, Result};

/// Connection lifetime settings.
///
/// Both timers only tear the connection down; the next operation reconnects
/// transparently. A zero duration disables the corresponding timer.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionPolicy {
    /// Forced reconnect interval, anchored at connection establishment and
    /// independent of traffic. Some devices degrade once a connection has
    /// been open too long no matter how busy it is.
    pub reconnect_after: Duration,
    /// Idle interval, measured from the end of the most recent operation
    /// attempt. Some devices never reclaim forgotten connections on their
    /// own, so an unused link is closed from this side.
    pub disconnect_when_idle_after: Duration,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            reconnect_after: Duration::from_secs(3600),
            disconnect_when_idle_after: Duration::from_secs(10),
        }
    }
}

/// At most one pending teardown task per purpose. Re-arming cancels the
/// previous occupant; the generation count guards against a task that has
/// already fired but loses the lock race to a newer occupant.
#[derive(Debug, Default)]
struct TimerSlot {
    task: Option<JoinHandle<()>>,
    generation: u64,
}

impl TimerSlot {
    fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum TimerPurpose {
    Idle,
    Reconnect,
}

impl TimerPurpose {
    fn slot(self, shared: &mut Shared) -> &mut TimerSlot {
        match self {
            TimerPurpose::Idle => &mut shared.idle_timer,
            TimerPurpose::Reconnect => &mut shared.reconnect_timer,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            TimerPurpose::Idle => "idle",
            TimerPurpose::Reconnect => "connection age",
        }
    }
}

struct Shared {
    /// `Some` exactly while the transport link is open.
    ctx: Option<Context>,
    idle_timer: TimerSlot,
    reconnect_timer: TimerSlot,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("ctx", &self.ctx.as_ref().map(|_| "Context"))
            .field("idle_timer", &self.idle_timer)
            .field("reconnect_timer", &self.reconnect_timer)
            .finish()
    }
}

/// How to (re)establish the transport link.
enum Connector {
    #[cfg(feature = "tokio-rtu")]
    Rtu { serial: SerialConfig, slave: Slave },
    #[cfg(feature = "tokio-tcp")]
    Tcp {
        candidates: Vec<SocketAddr>,
        slave: Slave,
    },
    #[cfg(test)]
    Mock(Arc<dyn Fn() -> std::io::Result<Context> + Send + Sync>),
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            #[cfg(feature = "tokio-rtu")]
            Connector::Rtu { serial, slave } => f
                .debug_struct("Rtu")
                .field("device", &serial.device)
                .field("slave", slave)
                .finish(),
            #[cfg(feature = "tokio-tcp")]
            Connector::Tcp { candidates, slave } => f
                .debug_struct("Tcp")
                .field("candidates", candidates)
                .field("slave", slave)
                .finish(),
            #[cfg(test)]
            Connector::Mock(_) => f.write_str("Mock"),
        }
    }
}

impl Connector {
    async fn connect(&self) -> Result<Context> {
        match self {
            #[cfg(feature = "tokio-rtu")]
            Connector::Rtu { serial, slave } => {
                let port = tokio_serial::SerialStream::open(&serial_port_builder(serial))
                    .map_err(|err| Error::Connection(err.to_string()))?;
                Ok(tokio_modbus::client::rtu::attach_slave(port, *slave))
            }
            #[cfg(feature = "tokio-tcp")]
            Connector::Tcp { candidates, slave } => {
                let mut last_error = None;
                for candidate in candidates {
                    match tokio_modbus::client::tcp::connect_slave(*candidate, *slave).await {
                        Ok(ctx) => {
                            debug!("connected to {candidate}");
                            return Ok(ctx);
                        }
                        Err(err) => {
                            warn!("connect to {candidate} failed: {err}");
                            last_error = Some(err);
                        }
                    }
                }
                Err(Error::Connection(match last_error {
                    Some(err) => err.to_string(),
                    None => "no candidate addresses".to_string(),
                }))
            }
            #[cfg(test)]
            Connector::Mock(connect) => {
                connect().map_err(|err| Error::Connection(err.to_string()))
            }
        }
    }
}

/// Asynchronous Modbus client with a managed connection lifetime.
///
/// Every operation transparently connects when needed, performs exactly one
/// transport call, converts the payload through [`crate::codec`], and
/// restarts the idle countdown. Operations on the same device never overlap
/// on the transport and complete in the order they acquire it.
#[derive(Debug)]
pub struct ModbusDevice {
    shared: Arc<Mutex<Shared>>,
    connector: Connector,
    policy: ConnectionPolicy,
}

impl ModbusDevice {
    /// Creates a device reached over Modbus RTU on a serial line.
    ///
    /// The serial port is opened lazily on the first operation (and again
    /// after every disconnect), not here.
    #[cfg(feature = "tokio-rtu")]
    pub fn new_rtu(serial: SerialConfig, slave: Slave, policy: ConnectionPolicy) -> Result<Self> {
        if serial.device.is_empty() {
            return Err(Error::Creation("serial device path is empty".into()));
        }
        if serial.baud_rate == 0 {
            return Err(Error::Creation("baud rate must be positive".into()));
        }
        Ok(Self::with_connector(
            Connector::Rtu { serial, slave },
            policy,
        ))
    }

    /// Creates a device reached over Modbus TCP.
    ///
    /// `host` is resolved here, once; connecting later tries the resolved
    /// addresses in order until one accepts. A name that yields no addresses
    /// is a creation error.
    #[cfg(feature = "tokio-tcp")]
    pub async fn new_tcp(
        host: &str,
        port: u16,
        slave: Slave,
        policy: ConnectionPolicy,
    ) -> Result<Self> {
        let candidates: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|err| Error::Creation(format!("could not resolve {host}: {err}")))?
            .collect();
        if candidates.is_empty() {
            return Err(Error::Creation(format!("no addresses found for {host}")));
        }
        Ok(Self::with_connector(
            Connector::Tcp { candidates, slave },
            policy,
        ))
    }

    fn with_connector(connector: Connector, policy: ConnectionPolicy) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                ctx: None,
                idle_timer: TimerSlot::default(),
                reconnect_timer: TimerSlot::default(),
            })),
            connector,
            policy,
        }
    }

    /// Connects now unless already connected.
    ///
    /// Operations connect on demand, so calling this is never required; it
    /// exists to front-load the connection cost or to surface connect errors
    /// early. A connect failure leaves the device disconnected and is never
    /// retried internally.
    pub async fn connect(&self) -> Result<()> {
        let mut shared = self.shared.lock().await;
        if shared.ctx.is_some() {
            return Ok(());
        }
        let ctx = self.connector.connect().await?;
        shared.ctx = Some(ctx);
        self.arm_reconnect_timer(&mut shared);
        self.arm_idle_timer(&mut shared);
        Ok(())
    }

    /// Closes the connection and cancels both timers. Idempotent; close
    /// errors are logged and swallowed.
    pub async fn disconnect(&self) {
        let mut shared = self.shared.lock().await;
        disconnect_locked(&mut shared).await;
    }

    /// Whether the transport link is currently open.
    pub async fn is_connected(&self) -> bool {
        self.shared.lock().await.ctx.is_some()
    }

    /// Reads `count` bits starting at `start_address` from a coil or
    /// discrete input block.
    pub async fn read_bits(
        &self,
        start_address: u16,
        count: u16,
        register_type: RegisterType,
    ) -> Result<Vec<bool>> {
        let mut shared = self.shared.lock().await;
        let mut ctx = self.checkout(&mut shared).await?;
        let result = tokio_async::read_bits(&mut ctx, start_address, count, register_type).await;
        self.checkin(&mut shared, ctx);
        result
    }

    /// Writes a single coil.
    pub async fn write_coil(&self, address: u16, value: bool) -> Result<()> {
        let mut shared = self.shared.lock().await;
        let mut ctx = self.checkout(&mut shared).await?;
        let result = tokio_async::write_coil(&mut ctx, address, value).await;
        self.checkin(&mut shared, ctx);
        result
    }

    /// Reads `count` values of type `T` from holding or input registers,
    /// decoding them under the given byte order.
    pub async fn read_registers<T: RegisterValue>(
        &self,
        start_address: u16,
        count: u16,
        register_type: RegisterType,
        endianness: Endianness,
    ) -> Result<Vec<T>> {
        let mut shared = self.shared.lock().await;
        let mut ctx = self.checkout(&mut shared).await?;
        let result = tokio_async::read_registers(
            &mut ctx,
            start_address,
            count,
            register_type,
            endianness,
        )
        .await;
        self.checkin(&mut shared, ctx);
        result
    }

    /// Reads `count` values of type `T` from holding registers.
    pub async fn read_holding_registers<T: RegisterValue>(
        &self,
        start_address: u16,
        count: u16,
        endianness: Endianness,
    ) -> Result<Vec<T>> {
        self.read_registers(start_address, count, RegisterType::Holding, endianness)
            .await
    }

    /// Reads `count` values of type `T` from input registers.
    pub async fn read_input_registers<T: RegisterValue>(
        &self,
        start_address: u16,
        count: u16,
        endianness: Endianness,
    ) -> Result<Vec<T>> {
        self.read_registers(start_address, count, RegisterType::Input, endianness)
            .await
    }

    /// Packs `values` under the given byte order and writes them as
    /// consecutive holding registers starting at `start_address`.
    ///
    /// Writing an empty slice performs no transport call.
    pub async fn write_registers<T: RegisterValue>(
        &self,
        start_address: u16,
        values: &[T],
        endianness: Endianness,
    ) -> Result<()> {
        let mut shared = self.shared.lock().await;
        let mut ctx = self.checkout(&mut shared).await?;
        let result =
            tokio_async::write_registers(&mut ctx, start_address, values, endianness).await;
        self.checkin(&mut shared, ctx);
        result
    }

    /// Reads a `count`-byte register window and decodes it as an ASCII
    /// string, stopping at the first zero byte.
    pub async fn read_ascii_string(
        &self,
        start_address: u16,
        count: u16,
        register_type: RegisterType,
        endianness: Endianness,
    ) -> Result<String> {
        let mut shared = self.shared.lock().await;
        let mut ctx = self.checkout(&mut shared).await?;
        let result = tokio_async::read_ascii_string(
            &mut ctx,
            start_address,
            count,
            register_type,
            endianness,
        )
        .await;
        self.checkin(&mut shared, ctx);
        result
    }

    /// Writes `string` into a `count`-byte register window, zero-padded;
    /// longer strings are silently truncated.
    pub async fn write_ascii_string(
        &self,
        start_address: u16,
        count: u16,
        string: &str,
        endianness: Endianness,
    ) -> Result<()> {
        let mut shared = self.shared.lock().await;
        let mut ctx = self.checkout(&mut shared).await?;
        let result = tokio_async::write_ascii_string(
            &mut ctx,
            start_address,
            count,
            string,
            endianness,
        )
        .await;
        self.checkin(&mut shared, ctx);
        result
    }

    /// Takes the open transport out of its slot, connecting first if needed.
    ///
    /// The caller holds the device lock, so the empty slot is not observable
    /// by other operations while the transport call runs.
    async fn checkout(&self, shared: &mut Shared) -> Result<Context> {
        if let Some(ctx) = shared.ctx.take() {
            return Ok(ctx);
        }
        let ctx = self.connector.connect().await?;
        debug!("connection established");
        self.arm_reconnect_timer(shared);
        Ok(ctx)
    }

    /// Returns the transport to its slot and restarts the idle countdown.
    ///
    /// Idleness is measured from the end of each attempt, successful or not,
    /// which is why this runs regardless of the operation's outcome.
    fn checkin(&self, shared: &mut Shared, ctx: Context) {
        shared.ctx = Some(ctx);
        self.arm_idle_timer(shared);
    }

    fn arm_idle_timer(&self, shared: &mut Shared) {
        arm_timer(
            &self.shared,
            shared,
            TimerPurpose::Idle,
            self.policy.disconnect_when_idle_after,
        );
    }

    fn arm_reconnect_timer(&self, shared: &mut Shared) {
        arm_timer(
            &self.shared,
            shared,
            TimerPurpose::Reconnect,
            self.policy.reconnect_after,
        );
    }
}

impl Drop for ModbusDevice {
    fn drop(&mut self) {
        // The timer tasks keep the shared state alive; cancel them so both
        // they and the transport go away with the device. If a timer is
        // mid-fire it holds the lock and performs the teardown itself.
        if let Ok(mut shared) = self.shared.try_lock() {
            shared.idle_timer.cancel();
            shared.reconnect_timer.cancel();
        }
    }
}

/// Replaces the slot's occupant with a task that tears the connection down
/// `after` from now. A zero duration disables the timer.
fn arm_timer(
    handle: &Arc<Mutex<Shared>>,
    shared: &mut Shared,
    purpose: TimerPurpose,
    after: Duration,
) {
    let slot = purpose.slot(shared);
    slot.cancel();
    if after.is_zero() {
        return;
    }
    let generation = slot.generation;
    let handle = Arc::clone(handle);
    slot.task = Some(tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let mut shared = handle.lock().await;
        if purpose.slot(&mut shared).generation != generation {
            // Superseded while waiting for the lock.
            return;
        }
        purpose.slot(&mut shared).task = None;
        debug!(
            "{} limit of {after:?} reached, closing connection",
            purpose.describe()
        );
        disconnect_locked(&mut shared).await;
    }));
}

async fn disconnect_locked(shared: &mut Shared) {
    shared.idle_timer.cancel();
    shared.reconnect_timer.cancel();
    if let Some(mut ctx) = shared.ctx.take() {
        // Best effort: a failing close still leaves the state machine
        // disconnected.
        if let Err(err) = ctx.disconnect().await {
            warn!("error while closing connection: {err}");
        }
        debug!("disconnected");
    }
}
