//! Pure conversion between Modbus register words and typed scalar values.
//!
//! Modbus transports carry data as flat sequences of 16-bit words (registers)
//! or single bits (coils and discrete inputs). This module packs and unpacks
//! arbitrary fixed-width integers and floats into such word sequences, under a
//! configurable scalar byte order, without performing any I/O. The per-word
//! wire order (always big-endian on the bus) is the transport library's
//! business and is not handled here; [`Endianness`] only selects how a scalar
//! wider or narrower than one register is laid out across the word sequence.
//!
//! All conversions are deterministic and all-or-nothing: either the full
//! result is produced or a [`CodecError`] is returned.

/// Byte order of a scalar value as laid out across 16-bit registers.
///
/// Many devices document multi-register values as "high word first" (big) or
/// "low word first" (little); this is a device-specific convention independent
/// of the Modbus wire format. For one-register scalars such as `u16` the two
/// settings produce identical register images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Endianness {
    /// Most significant byte first. The common convention, and the default.
    #[default]
    Big,
    /// Least significant byte first.
    Little,
}

/// The four Modbus register classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RegisterType {
    /// Single-bit, read/write.
    Coil,
    /// Single-bit, read-only.
    Discrete,
    /// 16-bit, read/write.
    Holding,
    /// 16-bit, read-only.
    Input,
}

impl std::fmt::Display for RegisterType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            RegisterType::Coil => "coil",
            RegisterType::Discrete => "discrete",
            RegisterType::Holding => "holding",
            RegisterType::Input => "input",
        };
        f.write_str(name)
    }
}

/// A conversion failed because the data did not have the expected shape.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The register slice does not match the word count implied by the
    /// requested value count and type.
    #[error("expected {expected} registers, got {actual}")]
    WordCount { expected: usize, actual: usize },

    /// The transport returned fewer bits than were requested.
    #[error("expected {expected} bits, got {actual}")]
    BitCount { expected: usize, actual: usize },

    /// The request would span more registers than a Modbus quantity field can
    /// express.
    #[error("{words} registers exceed the maximum request quantity")]
    QuantityOverflow { words: usize },
}

mod sealed {
    pub trait Sealed {}
}

/// A fixed-width scalar that can be carried in Modbus registers.
///
/// Implemented for `u8` through `u128`, `i8` through `i128`, `f32` and `f64`,
/// and for no other types. Floats are converted through their raw bit
/// patterns, never through numeric casts.
pub trait RegisterValue: sealed::Sealed + Copy {
    /// Width of the value in bits.
    const BITS: usize;

    #[doc(hidden)]
    fn write_bytes(self, endianness: Endianness, out: &mut [u8]);

    #[doc(hidden)]
    fn read_bytes(endianness: Endianness, bytes: &[u8]) -> Self;
}

macro_rules! impl_register_value_int {
    ($($ty:ty),* $(,)?) => {$(
        impl sealed::Sealed for $ty {}

        impl RegisterValue for $ty {
            const BITS: usize = <$ty>::BITS as usize;

            fn write_bytes(self, endianness: Endianness, out: &mut [u8]) {
                match endianness {
                    Endianness::Big => out.copy_from_slice(&self.to_be_bytes()),
                    Endianness::Little => out.copy_from_slice(&self.to_le_bytes()),
                }
            }

            fn read_bytes(endianness: Endianness, bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                match endianness {
                    Endianness::Big => <$ty>::from_be_bytes(buf),
                    Endianness::Little => <$ty>::from_le_bytes(buf),
                }
            }
        }
    )*};
}

impl_register_value_int!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128);

macro_rules! impl_register_value_float {
    ($($ty:ty => $bits:ty),* $(,)?) => {$(
        impl sealed::Sealed for $ty {}

        impl RegisterValue for $ty {
            const BITS: usize = <$bits>::BITS as usize;

            fn write_bytes(self, endianness: Endianness, out: &mut [u8]) {
                self.to_bits().write_bytes(endianness, out)
            }

            fn read_bytes(endianness: Endianness, bytes: &[u8]) -> Self {
                <$ty>::from_bits(<$bits>::read_bytes(endianness, bytes))
            }
        }
    )*};
}

impl_register_value_float!(f32 => u32, f64 => u64);

/// Number of 16-bit registers needed to carry `count` values of `bits` width.
///
/// Rounds up, so sub-register types still occupy whole registers: three `u8`
/// values need two registers, with the trailing byte zero-filled on encode.
pub fn words_for(bits: usize, count: usize) -> usize {
    (bits * count).div_ceil(16)
}

/// The word count for a request, as the protocol's 16-bit quantity field.
pub fn request_quantity(bits: usize, count: usize) -> Result<u16, CodecError> {
    let words = words_for(bits, count);
    u16::try_from(words).map_err(|_| CodecError::QuantityOverflow { words })
}

/// Packs scalar values into a register sequence under the given byte order.
///
/// The result always has exactly `words_for(T::BITS, values.len())` elements;
/// any padding byte beyond the packed values is zero.
pub fn encode_registers<T: RegisterValue>(values: &[T], endianness: Endianness) -> Vec<u16> {
    let words = words_for(T::BITS, values.len());
    let mut bytes = vec![0u8; words * 2];
    let size = T::BITS / 8;
    for (chunk, value) in bytes.chunks_exact_mut(size).zip(values) {
        value.write_bytes(endianness, chunk);
    }
    bytes
        .chunks_exact(2)
        .map(|pair| match endianness {
            Endianness::Big => u16::from_be_bytes([pair[0], pair[1]]),
            Endianness::Little => u16::from_le_bytes([pair[0], pair[1]]),
        })
        .collect()
}

/// Unpacks `count` scalar values from a register sequence.
///
/// `registers` must hold exactly the word count implied by `count` and `T`;
/// on success the result has exactly `count` elements.
pub fn decode_registers<T: RegisterValue>(
    registers: &[u16],
    count: usize,
    endianness: Endianness,
) -> Result<Vec<T>, CodecError> {
    let expected = words_for(T::BITS, count);
    if registers.len() != expected {
        return Err(CodecError::WordCount {
            expected,
            actual: registers.len(),
        });
    }
    let mut bytes = Vec::with_capacity(registers.len() * 2);
    for register in registers {
        let pair = match endianness {
            Endianness::Big => register.to_be_bytes(),
            Endianness::Little => register.to_le_bytes(),
        };
        bytes.extend_from_slice(&pair);
    }
    let size = T::BITS / 8;
    Ok(bytes
        .chunks_exact(size)
        .take(count)
        .map(|chunk| T::read_bytes(endianness, chunk))
        .collect())
}

/// Normalizes a transport bit read to exactly `count` values.
///
/// Transports unpack coil responses from packed bytes and may therefore return
/// up to seven trailing bits beyond the requested quantity; those are dropped.
pub fn decode_bits(mut bits: Vec<bool>, count: usize) -> Result<Vec<bool>, CodecError> {
    if bits.len() < count {
        return Err(CodecError::BitCount {
            expected: count,
            actual: bits.len(),
        });
    }
    bits.truncate(count);
    Ok(bits)
}

/// Decodes a `u8` register payload as an ASCII string.
///
/// Bytes up to, and excluding, the first zero byte are used; if there is no
/// zero byte the whole payload is used.
pub fn decode_ascii(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    bytes[..end].iter().map(|&b| char::from(b)).collect()
}

/// Encodes a string into a fixed-size `u8` payload of length `count`.
///
/// Characters without an ASCII value map to zero; unused trailing slots are
/// zero-filled. A string longer than `count` is silently truncated, so callers
/// must size `count` to fit.
pub fn encode_ascii(string: &str, count: usize) -> Vec<u8> {
    let mut values = vec![0u8; count];
    for (slot, character) in values.iter_mut().zip(string.chars()) {
        *slot = if character.is_ascii() {
            character as u8
        } else {
            0
        };
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_counts() {
        assert_eq!(words_for(8, 1), 1);
        assert_eq!(words_for(8, 2), 1);
        assert_eq!(words_for(8, 3), 2);
        assert_eq!(words_for(16, 1), 1);
        assert_eq!(words_for(32, 1), 2);
        assert_eq!(words_for(64, 1), 4);
        assert_eq!(words_for(128, 1), 8);
        assert_eq!(words_for(16, 0), 0);
    }

    fn round_trip<T: RegisterValue + PartialEq + std::fmt::Debug>(value: T) {
        for endianness in [Endianness::Big, Endianness::Little] {
            let registers = encode_registers(&[value], endianness);
            assert_eq!(registers.len(), words_for(T::BITS, 1));
            let decoded: Vec<T> = decode_registers(&registers, 1, endianness).unwrap();
            assert_eq!(decoded, [value]);
        }
    }

    #[test]
    fn integer_round_trips() {
        round_trip(0u8);
        round_trip(u8::MAX);
        round_trip(0u16);
        round_trip(u16::MAX);
        round_trip(0u32);
        round_trip(u32::MAX);
        round_trip(0u64);
        round_trip(u64::MAX);
        round_trip(0u128);
        round_trip(u128::MAX);
        round_trip(i8::MIN);
        round_trip(i16::MIN);
        round_trip(-1i32);
        round_trip(i64::MIN);
        round_trip(i128::MAX);
    }

    #[test]
    fn float_round_trips_preserve_bit_patterns() {
        round_trip(0.0f32);
        round_trip(-1.5f32);
        round_trip(f32::MAX);
        round_trip(0.0f64);
        round_trip(1.0e300f64);

        // NaN payloads survive because conversion is bit-pattern based.
        let registers = encode_registers(&[f32::NAN], Endianness::Big);
        let decoded: Vec<f32> = decode_registers(&registers, 1, Endianness::Big).unwrap();
        assert_eq!(decoded[0].to_bits(), f32::NAN.to_bits());
    }

    #[test]
    fn big_endian_register_image() {
        assert_eq!(
            encode_registers(&[0x0001_F0FFu32], Endianness::Big),
            [0x0001, 0xF0FF]
        );
        assert_eq!(
            encode_registers(&[0x0001_F0FFu32], Endianness::Little),
            [0xF0FF, 0x0001]
        );
    }

    #[test]
    fn single_register_scalars_ignore_endianness() {
        assert_eq!(
            encode_registers(&[0xABCDu16], Endianness::Big),
            encode_registers(&[0xABCDu16], Endianness::Little)
        );
    }

    #[test]
    fn mixed_endianness_yields_swapped_value() {
        let registers = encode_registers(&[0x1122_3344u32], Endianness::Big);
        let decoded: Vec<u32> = decode_registers(&registers, 1, Endianness::Little).unwrap();
        assert_ne!(decoded, [0x1122_3344]);
        assert_eq!(decoded, [0x3344_1122]);
    }

    #[test]
    fn sub_register_values_pad_with_zero() {
        assert_eq!(encode_registers(&[0xABu8], Endianness::Big), [0xAB00]);
        assert_eq!(encode_registers(&[0xABu8], Endianness::Little), [0x00AB]);

        let registers = encode_registers(&[0x41u8, 0x42, 0x43], Endianness::Big);
        assert_eq!(registers, [0x4142, 0x4300]);
        let decoded: Vec<u8> = decode_registers(&registers, 3, Endianness::Big).unwrap();
        assert_eq!(decoded, [0x41, 0x42, 0x43]);
    }

    #[test]
    fn decode_rejects_wrong_word_count() {
        let err = decode_registers::<u32>(&[0x0001], 1, Endianness::Big).unwrap_err();
        assert_eq!(
            err,
            CodecError::WordCount {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn request_quantity_overflow() {
        assert_eq!(request_quantity(16, 1), Ok(1));
        assert_eq!(request_quantity(32, 2), Ok(4));
        assert!(matches!(
            request_quantity(128, 10_000),
            Err(CodecError::QuantityOverflow { .. })
        ));
    }

    #[test]
    fn bit_decoding_truncates_padding() {
        let bits = vec![true, false, true, false, false, false, false, false];
        assert_eq!(
            decode_bits(bits, 3).unwrap(),
            vec![true, false, true]
        );
        assert!(matches!(
            decode_bits(vec![true], 3),
            Err(CodecError::BitCount {
                expected: 3,
                actual: 1
            })
        ));
    }

    #[test]
    fn ascii_round_trip() {
        let payload = encode_ascii("charger", 10);
        assert_eq!(payload.len(), 10);
        assert_eq!(payload[..7], *b"charger");
        assert_eq!(payload[7..], [0, 0, 0]);
        assert_eq!(decode_ascii(&payload), "charger");
    }

    #[test]
    fn ascii_decoding_stops_at_first_zero() {
        assert_eq!(decode_ascii(&[b'e', b'v', 0, b'x']), "ev");
        assert_eq!(decode_ascii(b"abc"), "abc");
        assert_eq!(decode_ascii(&[]), "");
    }

    #[test]
    fn ascii_encoding_truncates_and_scrubs() {
        // Longer than the buffer: silently truncated.
        assert_eq!(encode_ascii("overflowing", 4), b"over".to_vec());
        // Non-ASCII characters map to zero.
        assert_eq!(encode_ascii("a\u{e9}b", 3), vec![b'a', 0, b'b']);
    }

    #[test]
    fn ascii_through_registers() {
        let payload = encode_ascii("evchar", 10);
        let registers = encode_registers(&payload, Endianness::Big);
        assert_eq!(registers.len(), 5);
        let decoded: Vec<u8> = decode_registers(&registers, 10, Endianness::Big).unwrap();
        assert_eq!(decode_ascii(&decoded), "evchar");
    }
}
