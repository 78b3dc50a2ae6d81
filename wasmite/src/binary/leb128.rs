//! LEB128 decoding for the integer widths the binary format uses (u32, u64, i32, i33, i64).
//! The number of bytes consumed is the cursor's offset delta.

use super::{cursor::Cursor, BinaryReadError, Result};

pub fn read_uleb_u32(cur: &mut Cursor) -> Result<u32> {
    read_unsigned(cur, 32).map(|v| v as u32)
}

pub fn read_uleb_u64(cur: &mut Cursor) -> Result<u64> {
    read_unsigned(cur, 64)
}

pub fn read_sleb_i32(cur: &mut Cursor) -> Result<i32> {
    read_signed(cur, 32).map(|v| v as i32)
}

/// Signed 33-bit integer, the encoding of block types.
pub fn read_sleb_i33(cur: &mut Cursor) -> Result<i64> {
    read_signed(cur, 33)
}

pub fn read_sleb_i64(cur: &mut Cursor) -> Result<i64> {
    read_signed(cur, 64)
}

#[inline]
fn max_bytes(bits: u32) -> u32 {
    (bits + 6) / 7
}

fn read_unsigned(cur: &mut Cursor, bits: u32) -> Result<u64> {
    let limit = max_bytes(bits);
    let mut result = 0u64;
    let mut shift = 0u32;
    for _ in 0..limit {
        let byte = cur.read_u8()?;
        let low = u64::from(byte & 0x7F);
        let room = bits - shift;
        if room < 7 && (low >> room) != 0 {
            return Err(BinaryReadError::Leb128Overflow {
                target_bits: bits as u8,
                offset: cur.offset(),
            });
        }
        result |= low << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
    Err(BinaryReadError::Leb128TooManyBytes {
        limit: limit as u8,
        offset: cur.offset(),
    })
}

fn read_signed(cur: &mut Cursor, bits: u32) -> Result<i64> {
    let limit = max_bytes(bits);
    let mut result = 0i64;
    let mut shift = 0u32;
    for _ in 0..limit {
        let byte = cur.read_u8()?;
        let low = byte & 0x7F;
        let room = bits - shift;
        if room < 7 {
            // Unused high bits of the last byte must replicate the sign bit.
            let unused = low >> (room - 1);
            if unused != 0 && unused != (0x7F >> (room - 1)) {
                return Err(BinaryReadError::Leb128Overflow {
                    target_bits: bits as u8,
                    offset: cur.offset(),
                });
            }
        }
        result |= i64::from(low) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && (low & 0x40) != 0 {
                result |= -1i64 << shift;
            }
            return Ok(result);
        }
    }
    Err(BinaryReadError::Leb128TooManyBytes {
        limit: limit as u8,
        offset: cur.offset(),
    })
}
