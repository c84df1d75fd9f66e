//! Stateless, low-level typed register operations.
//!
//! The functions in this module operate on a caller-owned
//! `tokio_modbus::client::Context` and perform exactly one transport call
//! each, converting between raw register words and typed values through
//! [`crate::codec`]. They do not manage the connection; for a stateful client
//! with lazy connect and lifetime management see
//! [`crate::tokio_device::ModbusDevice`].
//!
//! # Examples
//!
//! ```no_run
//! use modbus_device_lib::codec::{Endianness, RegisterType};
//! use modbus_device_lib::tokio_async;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let socket_addr = "192.168.1.100:502".parse()?;
//!     let mut ctx = tokio_modbus::client::tcp::connect(socket_addr).await?;
//!
//!     let voltage: Vec<f32> =
//!         tokio_async::read_registers(&mut ctx, 30775, 2, RegisterType::Holding, Endianness::Big)
//!             .await?;
//!     println!("voltage: {} V", voltage[0]);
//!
//!     Ok(())
//! }
//! ```

use tokio_modbus::client::Context;
use tokio_modbus::prelude::{Reader, Writer};

use crate::codec::{self, Endianness, RegisterType, RegisterValue};
use crate::tokio_common::{Error, Result, TransportError};

/// Helper function to map the nested tokio result to our result, classifying
/// the failure as a read or write error.
fn map_tokio_result<T>(
    result: tokio_modbus::Result<T>,
    classify: fn(TransportError) -> Error,
) -> Result<T> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(exception)) => Err(classify(exception.into())), // Modbus exception
        Err(err) => Err(classify(err.into())),                 // I/O error
    }
}

/// Reads `count` bits starting at `start_address`.
///
/// Valid for [`RegisterType::Coil`] and [`RegisterType::Discrete`]; the word
/// register types do not support bit access and fail with
/// [`Error::UnsupportedRegisterType`].
pub async fn read_bits(
    ctx: &mut Context,
    start_address: u16,
    count: u16,
    register_type: RegisterType,
) -> Result<Vec<bool>> {
    let response = match register_type {
        RegisterType::Coil => ctx.read_coils(start_address, count).await,
        RegisterType::Discrete => ctx.read_discrete_inputs(start_address, count).await,
        RegisterType::Holding | RegisterType::Input => {
            return Err(Error::UnsupportedRegisterType {
                operation: "reading bits",
                register_type,
            })
        }
    };
    let bits = map_tokio_result(response, Error::Read)?;
    Ok(codec::decode_bits(bits, count as usize)?)
}

/// Writes a single coil.
pub async fn write_coil(ctx: &mut Context, address: u16, value: bool) -> Result<()> {
    map_tokio_result(ctx.write_single_coil(address, value).await, Error::Write)
}

/// Reads `count` values of type `T` starting at `start_address` and decodes
/// them under the given byte order.
///
/// Valid for [`RegisterType::Holding`] and [`RegisterType::Input`]; the bit
/// register types fail with [`Error::UnsupportedRegisterType`].
pub async fn read_registers<T: RegisterValue>(
    ctx: &mut Context,
    start_address: u16,
    count: u16,
    register_type: RegisterType,
    endianness: Endianness,
) -> Result<Vec<T>> {
    let quantity = codec::request_quantity(T::BITS, count as usize)?;
    let response = match register_type {
        RegisterType::Holding => ctx.read_holding_registers(start_address, quantity).await,
        RegisterType::Input => ctx.read_input_registers(start_address, quantity).await,
        RegisterType::Coil | RegisterType::Discrete => {
            return Err(Error::UnsupportedRegisterType {
                operation: "reading words",
                register_type,
            })
        }
    };
    let registers = map_tokio_result(response, Error::Read)?;
    Ok(codec::decode_registers(
        &registers,
        count as usize,
        endianness,
    )?)
}

/// Packs `values` under the given byte order and writes them as consecutive
/// holding registers starting at `start_address`.
///
/// Writing an empty slice performs no transport call.
pub async fn write_registers<T: RegisterValue>(
    ctx: &mut Context,
    start_address: u16,
    values: &[T],
    endianness: Endianness,
) -> Result<()> {
    if values.is_empty() {
        return Ok(());
    }
    let registers = codec::encode_registers(values, endianness);
    map_tokio_result(
        ctx.write_multiple_registers(start_address, &registers).await,
        Error::Write,
    )
}

/// Reads `count` bytes starting at `start_address` and decodes them as an
/// ASCII string, stopping at the first zero byte.
pub async fn read_ascii_string(
    ctx: &mut Context,
    start_address: u16,
    count: u16,
    register_type: RegisterType,
    endianness: Endianness,
) -> Result<String> {
    let bytes: Vec<u8> =
        read_registers(ctx, start_address, count, register_type, endianness).await?;
    Ok(codec::decode_ascii(&bytes))
}

/// Encodes `string` into a zero-padded byte buffer of length `count` and
/// writes it starting at `start_address`.
///
/// A string longer than `count` is silently truncated.
pub async fn write_ascii_string(
    ctx: &mut Context,
    start_address: u16,
    count: u16,
    string: &str,
    endianness: Endianness,
) -> Result<()> {
    let values = codec::encode_ascii(string, count as usize);
    write_registers(ctx, start_address, &values, endianness).await
}
