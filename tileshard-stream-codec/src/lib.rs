//! Byte-level wire codec shared by the protocol crate.
//!
//! Values decode from the front of a shrinking byte slice and encode by
//! appending to a byte vector. All multi-byte integers are big-endian.
//! Encoding is infallible: everything this server puts on the wire has
//! exactly one byte representation, so only decoding carries an error
//! channel.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

/// Decoding ran out of bytes.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("input ended in the middle of a field")]
pub struct ShortInput;

/// Symmetric wire codec. `decode` consumes the value's bytes from the front
/// of the slice; `encode` appends them.
pub trait WireCodec: Sized {
    type DecodeError;

    fn decode(r: &mut &[u8]) -> Result<Self, Self::DecodeError>;
    fn encode(&self, out: &mut Vec<u8>);
}

/// Splits `len` bytes off the front of the input.
pub fn take<'a>(r: &mut &'a [u8], len: usize) -> Result<&'a [u8], ShortInput> {
    if r.len() < len {
        return Err(ShortInput);
    }
    let (head, tail) = r.split_at(len);
    *r = tail;
    Ok(head)
}

impl WireCodec for u8 {
    type DecodeError = ShortInput;

    fn decode(r: &mut &[u8]) -> Result<Self, ShortInput> {
        r.read_u8().map_err(|_| ShortInput)
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }
}

macro_rules! int_codec {
    ($($t:ty => $read:ident / $write:ident,)*) => {
        $(impl WireCodec for $t {
            type DecodeError = ShortInput;

            fn decode(r: &mut &[u8]) -> Result<Self, ShortInput> {
                r.$read::<BigEndian>().map_err(|_| ShortInput)
            }

            fn encode(&self, out: &mut Vec<u8>) {
                out.$write::<BigEndian>(*self).unwrap();
            }
        })*
    };
}

int_codec! {
    u16 => read_u16 / write_u16,
    u32 => read_u32 / write_u32,
    u64 => read_u64 / write_u64,
    i16 => read_i16 / write_i16,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeStringError {
    #[error(transparent)]
    ShortInput(#[from] ShortInput),

    #[error("string bytes are not valid UTF-8")]
    NotUtf8,
}

/// Strings travel as `[len:u16][utf8 bytes]`.
impl WireCodec for String {
    type DecodeError = DecodeStringError;

    fn decode(r: &mut &[u8]) -> Result<Self, DecodeStringError> {
        let len = u16::decode(r)? as usize;
        let bytes = take(r, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeStringError::NotUtf8)
    }

    fn encode(&self, out: &mut Vec<u8>) {
        debug_assert!(self.len() <= u16::MAX as usize);
        (self.len() as u16).encode(out);
        out.extend_from_slice(self.as_bytes());
    }
}
