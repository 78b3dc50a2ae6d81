//! Linear memory (32-bit index space). Page-granular growth and bounds-checked
//! little-endian loads/stores.

use crate::error::{LinkError, Trap};
use crate::model::{Limits, MemoryType};

/// WASM page size in bytes (64 KiB).
pub const PAGE_SIZE: usize = 64 * 1024;

/// Absolute page cap of a 32-bit memory.
pub const MAX_PAGES: u32 = 65536;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    buf: Vec<u8>,
    limits: Limits,
}

impl Memory {
    /// An empty memory carrying its declared limits. Sized by [`Memory::ensure_min`].
    pub fn new(ty: MemoryType) -> Self {
        Self {
            buf: Vec::new(),
            limits: ty.limits,
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn size_pages(&self) -> u32 {
        (self.buf.len() / PAGE_SIZE) as u32
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn max_pages(&self) -> u32 {
        self.limits.max.map_or(MAX_PAGES, |m| m.min(MAX_PAGES))
    }

    /// Grow by `delta` pages. Returns the previous size in pages, or `None` past the maximum.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let prev = self.size_pages();
        let new = prev.checked_add(delta)?;
        if new > self.max_pages() {
            return None;
        }
        self.buf.resize(new as usize * PAGE_SIZE, 0);
        Some(prev)
    }

    /// Resize up to the declared minimum. Never shrinks.
    pub fn ensure_min(&mut self) -> Result<(), LinkError> {
        let min = self.limits.min;
        if min > self.max_pages() {
            return Err(LinkError::SizeExceedsMaximum {
                context: "memory minimum",
                unit: "pages",
                required: u64::from(min),
                max: u64::from(self.max_pages()),
            });
        }
        let want = min as usize * PAGE_SIZE;
        if self.buf.len() < want {
            self.buf.resize(want, 0);
        }
        Ok(())
    }

    /// Copy a data segment in at `offset`, growing by whole pages when the write runs past
    /// the current end.
    pub fn write_segment(&mut self, offset: u32, bytes: &[u8]) -> Result<(), LinkError> {
        let start = offset as usize;
        let end = start + bytes.len();
        let max = self.max_pages() as usize * PAGE_SIZE;
        if end > max {
            return Err(LinkError::SizeExceedsMaximum {
                context: "data segment",
                unit: "bytes",
                required: end as u64,
                max: max as u64,
            });
        }
        if end > self.buf.len() {
            let pages = end.div_ceil(PAGE_SIZE);
            self.buf.resize(pages * PAGE_SIZE, 0);
        }
        self.buf[start..end].copy_from_slice(bytes);
        Ok(())
    }

    #[inline]
    fn range(&self, addr: u32, offset: u32, len: usize) -> Result<core::ops::Range<usize>, Trap> {
        let ea = u64::from(addr) + u64::from(offset);
        let start = ea as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.buf.len() => Ok(start..end),
            _ => Err(Trap::MemoryOutOfBounds { addr: ea, len }),
        }
    }

    /// Read `N` bytes at `addr + offset`.
    pub fn load<const N: usize>(&self, addr: u32, offset: u32) -> Result<[u8; N], Trap> {
        let r = self.range(addr, offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[r]);
        Ok(out)
    }

    /// Write `N` bytes at `addr + offset`.
    pub fn store<const N: usize>(&mut self, addr: u32, offset: u32, bytes: [u8; N]) -> Result<(), Trap> {
        let r = self.range(addr, offset, N)?;
        self.buf[r].copy_from_slice(&bytes);
        Ok(())
    }

    pub fn load_u8(&self, addr: u32, offset: u32) -> Result<u8, Trap> {
        self.load::<1>(addr, offset).map(|b| b[0])
    }

    pub fn load_u16(&self, addr: u32, offset: u32) -> Result<u16, Trap> {
        self.load(addr, offset).map(u16::from_le_bytes)
    }

    pub fn load_u32(&self, addr: u32, offset: u32) -> Result<u32, Trap> {
        self.load(addr, offset).map(u32::from_le_bytes)
    }

    pub fn load_u64(&self, addr: u32, offset: u32) -> Result<u64, Trap> {
        self.load(addr, offset).map(u64::from_le_bytes)
    }

    pub fn store_u8(&mut self, addr: u32, offset: u32, v: u8) -> Result<(), Trap> {
        self.store(addr, offset, [v])
    }

    pub fn store_u16(&mut self, addr: u32, offset: u32, v: u16) -> Result<(), Trap> {
        self.store(addr, offset, v.to_le_bytes())
    }

    pub fn store_u32(&mut self, addr: u32, offset: u32, v: u32) -> Result<(), Trap> {
        self.store(addr, offset, v.to_le_bytes())
    }

    pub fn store_u64(&mut self, addr: u32, offset: u32, v: u64) -> Result<(), Trap> {
        self.store(addr, offset, v.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem(min: u32, max: Option<u32>) -> Memory {
        let mut m = Memory::new(MemoryType {
            limits: Limits::new(min, max),
        });
        m.ensure_min().unwrap();
        m
    }

    #[test]
    fn grow_and_bounds() {
        let mut mem = mem(1, Some(2));
        assert_eq!(mem.size_pages(), 1);
        assert_eq!(mem.len(), PAGE_SIZE);
        assert!(mem.load_u8((PAGE_SIZE - 1) as u32, 0).is_ok());
        assert_eq!(
            mem.load_u8(PAGE_SIZE as u32, 0),
            Err(Trap::MemoryOutOfBounds { addr: PAGE_SIZE as u64, len: 1 })
        );
        assert_eq!(mem.grow(1), Some(1));
        assert_eq!(mem.size_pages(), 2);
        assert!(mem.load_u8((2 * PAGE_SIZE - 1) as u32, 0).is_ok());
        assert_eq!(mem.grow(1), None);
        assert_eq!(mem.size_pages(), 2);
    }

    #[test]
    fn effective_address_does_not_wrap() {
        let mem = mem(1, None);
        assert!(mem.load_u32(u32::MAX, 4).is_err());
        assert!(mem.load_u32(0, (PAGE_SIZE - 3) as u32).is_err());
        assert!(mem.load_u32(0, (PAGE_SIZE - 4) as u32).is_ok());
    }

    #[test]
    fn le_load_store() {
        let mut mem = mem(1, None);
        mem.store_u32(0, 0, 0x1122_3344).unwrap();
        assert_eq!(mem.load_u8(0, 0).unwrap(), 0x44);
        assert_eq!(mem.load_u16(0, 0).unwrap(), 0x3344);
        assert_eq!(mem.load_u32(0, 0).unwrap(), 0x1122_3344);

        mem.store_u64(8, 8, 0x1122_3344_5566_7788).unwrap();
        assert_eq!(mem.load_u64(16, 0).unwrap(), 0x1122_3344_5566_7788);
    }

    #[test]
    fn data_segment_grows_by_whole_pages() {
        let mut mem = Memory::new(MemoryType {
            limits: Limits::new(0, Some(2)),
        });
        mem.write_segment(PAGE_SIZE as u32 + 10, b"hi").unwrap();
        assert_eq!(mem.size_pages(), 2);
        assert_eq!(&mem.data()[PAGE_SIZE + 10..PAGE_SIZE + 12], b"hi");

        let err = mem.write_segment(2 * PAGE_SIZE as u32 - 1, b"xy").unwrap_err();
        assert!(matches!(err, LinkError::SizeExceedsMaximum { .. }));
    }

    #[test]
    fn ensure_min_never_shrinks() {
        let mut m = Memory::new(MemoryType {
            limits: Limits::new(1, None),
        });
        m.write_segment(PAGE_SIZE as u32 * 2, &[1]).unwrap();
        assert_eq!(m.size_pages(), 3);
        m.ensure_min().unwrap();
        assert_eq!(m.size_pages(), 3);
    }
}
