//! Length-prefixed vectors and names.

use super::{cursor::Cursor, leb128, BinaryReadError, Result};

/// Upper bound on pre-allocation for a decoded vector; the length prefix is untrusted.
const MAX_PREALLOC: usize = 4096;

pub fn read_len_prefixed_bytes<'a>(cur: &mut Cursor<'a>) -> Result<&'a [u8]> {
    let len = leb128::read_uleb_u32(cur)? as usize;
    cur.read_bytes(len)
}

pub fn read_name(cur: &mut Cursor) -> Result<String> {
    let start = cur.offset();
    let bytes = read_len_prefixed_bytes(cur)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| BinaryReadError::InvalidUtf8 { offset: start })
}

/// Read a ULEB128-counted vector, decoding each element with `elem`.
pub fn read_vec<'a, T, F>(cur: &mut Cursor<'a>, mut elem: F) -> Result<Vec<T>>
where
    F: FnMut(&mut Cursor<'a>) -> Result<T>,
{
    let len = leb128::read_uleb_u32(cur)? as usize;
    let mut out = Vec::with_capacity(len.min(MAX_PREALLOC));
    for _ in 0..len {
        out.push(elem(cur)?);
    }
    Ok(out)
}
