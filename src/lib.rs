//! Typed, endianness-aware register access for Modbus devices, with a
//! managed connection lifetime.
//!
//! This crate sits on top of the `tokio-modbus` transport and provides two
//! ways to talk to a device:
//!
//! 1.  **High-Level, Managed Client**: [`tokio_device::ModbusDevice`] owns
//!     the connection and its lifetime: it connects lazily on the first
//!     operation, closes the link after an idle period, forces a periodic
//!     reconnect for devices that misbehave on long-lived connections, and
//!     serializes all access so only one request is ever in flight per
//!     device. This is the recommended approach for most users.
//!
//! 2.  **Low-Level, Stateless Functions**: the [`tokio_async`] module maps
//!     typed reads and writes directly onto a caller-owned
//!     `tokio_modbus::client::Context`. This API offers maximum flexibility
//!     but leaves connection management to the caller.
//!
//! Both levels convert through the pure [`codec`] module, which packs any
//! fixed-width integer or float into 16-bit register words under a
//! configurable scalar byte order, plus ASCII string helpers for the common
//! name/serial-number registers.
//!
//! ## Features
//!
//! - **Typed Register Access**: read and write `u8` through `u128`, signed
//!   variants, `f32` and `f64`, with big- or little-endian scalar layout.
//! - **Bit Access**: coil and discrete input reads, single coil writes.
//! - **Managed Connection Lifetime**: lazy connect, idle disconnect, forced
//!   periodic reconnect; failures surface as typed errors and are never
//!   retried behind the caller's back.
//! - **Deadlines**: [`tokio_common::with_timeout`] races any operation
//!   against a deadline.
//! - **RTU and TCP**: both transports, behind the `tokio-rtu` and
//!   `tokio-tcp` features.
//!
//! ## Quick Start
//!
//! ```no_run
//! use modbus_device_lib::codec::{Endianness, RegisterType};
//! use modbus_device_lib::tokio_device::{ConnectionPolicy, ModbusDevice};
//! use tokio_modbus::Slave;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let device =
//!         ModbusDevice::new_tcp("192.168.1.100", 502, Slave(1), ConnectionPolicy::default())
//!             .await?;
//!
//!     // Connects on demand and reconnects transparently after idle or
//!     // max-age disconnects.
//!     let energy: Vec<u64> = device
//!         .read_registers(30513, 1, RegisterType::Holding, Endianness::Big)
//!         .await?;
//!     println!("total yield: {} Wh", energy[0]);
//!
//!     Ok(())
//! }
//! ```
//!
//! For RTU devices, build a [`tokio_common::SerialConfig`] and use
//! [`tokio_device::ModbusDevice::new_rtu`] instead.

pub mod codec;

#[cfg(any(feature = "tokio-rtu", feature = "tokio-tcp"))]
pub mod tokio_common;

#[cfg_attr(
    docsrs,
    doc(cfg(any(feature = "tokio-rtu", feature = "tokio-tcp")))
)]
#[cfg(any(feature = "tokio-rtu", feature = "tokio-tcp"))]
pub mod tokio_async;

#[cfg_attr(
    docsrs,
    doc(cfg(any(feature = "tokio-rtu", feature = "tokio-tcp")))
)]
#[cfg(any(feature = "tokio-rtu", feature = "tokio-tcp"))]
pub mod tokio_device;

#[cfg(all(test, any(feature = "tokio-rtu", feature = "tokio-tcp")))]
pub(crate) mod testutil;
