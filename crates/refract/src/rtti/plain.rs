// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Marshaling rules for plain field values.
//!
//! A plain value either has a fixed little-endian layout (integers, floats,
//! bool) or is length-prefixed (`String`, `Vec<u8>`). The u32 prefix of a
//! dynamic value holds the *total* encoded size including the prefix itself,
//! which is also what the dynamic-size query reports before encoding.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// A value that can be marshaled as a plain field.
pub trait PlainValue: Sized + 'static {
    /// Encoded size for fixed-layout values; `None` for length-prefixed ones.
    const FIXED_SIZE: Option<u8>;

    /// Appends the encoded form to `out`.
    fn write_bytes(&self, out: &mut Vec<u8>) -> Result<()>;

    /// Decodes one value from exactly `bytes`.
    fn read_bytes(bytes: &[u8]) -> Result<Self>;

    /// Total encoded size in bytes, prefix included for dynamic values.
    fn dynamic_size(&self) -> Result<u32> {
        match Self::FIXED_SIZE {
            Some(n) => Ok(u32::from(n)),
            None => Err(Error::Truncated {
                what: "dynamic size query on a value without one",
            }),
        }
    }
}

macro_rules! impl_plain_fixed {
    ($($ty:ty => $size:expr),* $(,)?) => {
        $(
            impl PlainValue for $ty {
                const FIXED_SIZE: Option<u8> = Some($size);

                fn write_bytes(&self, out: &mut Vec<u8>) -> Result<()> {
                    out.extend_from_slice(&self.to_le_bytes());
                    Ok(())
                }

                fn read_bytes(bytes: &[u8]) -> Result<Self> {
                    if bytes.len() != $size {
                        return Err(Error::Truncated {
                            what: stringify!($ty),
                        });
                    }
                    let mut raw = [0u8; $size];
                    raw.copy_from_slice(bytes);
                    Ok(<$ty>::from_le_bytes(raw))
                }
            }
        )*
    };
}

impl_plain_fixed! {
    u8 => 1, i8 => 1,
    u16 => 2, i16 => 2,
    u32 => 4, i32 => 4,
    u64 => 8, i64 => 8,
    f32 => 4, f64 => 8,
}

impl PlainValue for bool {
    const FIXED_SIZE: Option<u8> = Some(1);

    fn write_bytes(&self, out: &mut Vec<u8>) -> Result<()> {
        out.push(u8::from(*self));
        Ok(())
    }

    fn read_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 1 {
            return Err(Error::Truncated { what: "bool" });
        }
        Ok(bytes[0] != 0)
    }
}

fn prefixed_size(payload_len: usize) -> Result<u32> {
    let total = payload_len as u64 + 4;
    if total > u64::from(u32::MAX) {
        return Err(Error::SizeLimit(total));
    }
    Ok(total as u32)
}

fn split_prefixed(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < 4 {
        return Err(Error::Truncated {
            what: "dynamic size prefix",
        });
    }
    let declared = LittleEndian::read_u32(&bytes[..4]);
    if declared as usize != bytes.len() {
        return Err(Error::PrefixMismatch {
            declared,
            actual: bytes.len() as u32,
        });
    }
    Ok(&bytes[4..])
}

impl PlainValue for String {
    const FIXED_SIZE: Option<u8> = None;

    fn write_bytes(&self, out: &mut Vec<u8>) -> Result<()> {
        let total = prefixed_size(self.len())?;
        out.extend_from_slice(&total.to_le_bytes());
        out.extend_from_slice(self.as_bytes());
        Ok(())
    }

    fn read_bytes(bytes: &[u8]) -> Result<Self> {
        let payload = split_prefixed(bytes)?;
        String::from_utf8(payload.to_vec()).map_err(|_| Error::InvalidUtf8)
    }

    fn dynamic_size(&self) -> Result<u32> {
        prefixed_size(self.len())
    }
}

impl PlainValue for Vec<u8> {
    const FIXED_SIZE: Option<u8> = None;

    fn write_bytes(&self, out: &mut Vec<u8>) -> Result<()> {
        let total = prefixed_size(self.len())?;
        out.extend_from_slice(&total.to_le_bytes());
        out.extend_from_slice(self);
        Ok(())
    }

    fn read_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(split_prefixed(bytes)?.to_vec())
    }

    fn dynamic_size(&self) -> Result<u32> {
        prefixed_size(self.len())
    }
}
