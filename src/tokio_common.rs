//! Shared infrastructure for the `tokio` based client modules: the error
//! taxonomy, the deadline wrapper, and serial link defaults.

use std::time::Duration;

use crate::codec::{CodecError, RegisterType};

/// Underlying transport failure: an I/O or framing error reported by
/// `tokio-modbus`, or an exception reply from the device itself.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// Wraps `tokio_modbus::Error`.
    #[error(transparent)]
    Protocol(#[from] tokio_modbus::Error),

    /// Wraps `tokio_modbus::ExceptionCode`.
    #[error(transparent)]
    Exception(#[from] tokio_modbus::ExceptionCode),
}

/// Represents all possible errors that can occur when talking to a device.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The device handle could not be constructed (invalid parameters, or a
    /// hostname that resolves to no addresses).
    #[error("could not create device: {0}")]
    Creation(String),

    /// Connecting to the device failed. No retry is performed; the connection
    /// stays down and the next operation will attempt to connect again.
    #[error("could not connect: {0}")]
    Connection(String),

    /// A read transport call failed.
    #[error("could not read: {0}")]
    Read(#[source] TransportError),

    /// A write transport call failed.
    #[error("could not write: {0}")]
    Write(#[source] TransportError),

    /// The operation does not apply to this register type, e.g. a bit read
    /// against a word register.
    #[error("{operation} is not supported for {register_type} registers")]
    UnsupportedRegisterType {
        operation: &'static str,
        register_type: RegisterType,
    },

    /// A register/value conversion failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The deadline elapsed before the operation completed.
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),
}

/// The result type for device operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Races `operation` against a deadline.
///
/// Whichever completes first determines the outcome; if the deadline wins the
/// result is [`Error::TimedOut`] and the operation's future is dropped. A
/// deadline that is already elapsed fails on the first poll without waiting.
///
/// Dropping the future only abandons the caller's side of the exchange: the
/// request may already have reached the device, so a timed-out write can still
/// take effect, and a connection abandoned mid-reply may carry a stale
/// response until the next reconnect.
pub async fn with_timeout<T, F>(duration: Duration, operation: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => Err(Error::TimedOut(duration)),
    }
}

/// The default parity used for serial communication.
#[cfg(feature = "tokio-rtu")]
pub const PARITY: &tokio_serial::Parity = &tokio_serial::Parity::None;
/// The default number of stop bits used for serial communication.
#[cfg(feature = "tokio-rtu")]
pub const STOP_BITS: &tokio_serial::StopBits = &tokio_serial::StopBits::One;
/// The default number of data bits used for serial communication.
#[cfg(feature = "tokio-rtu")]
pub const DATA_BITS: &tokio_serial::DataBits = &tokio_serial::DataBits::Eight;

/// Serial link parameters for RTU devices.
#[cfg(feature = "tokio-rtu")]
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Path to the serial port device (e.g. `/dev/ttyUSB0`).
    pub device: String,
    /// Baud rate for the serial communication.
    pub baud_rate: u32,
    pub parity: tokio_serial::Parity,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
}

#[cfg(feature = "tokio-rtu")]
impl SerialConfig {
    /// A configuration for `device` with the common 8-N-1 framing.
    pub fn new(device: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            baud_rate,
            parity: *PARITY,
            data_bits: *DATA_BITS,
            stop_bits: *STOP_BITS,
        }
    }
}

/// Creates a `tokio_serial::SerialPortBuilder` from the given configuration.
#[cfg(feature = "tokio-rtu")]
pub fn serial_port_builder(config: &SerialConfig) -> tokio_serial::SerialPortBuilder {
    tokio_serial::new(&config.device, config.baud_rate)
        .parity(config.parity)
        .stop_bits(config.stop_bits)
        .data_bits(config.data_bits)
        .flow_control(tokio_serial::FlowControl::None)
}
