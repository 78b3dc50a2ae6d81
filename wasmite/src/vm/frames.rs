//! Call frames and control labels used by the interpreter.

use std::sync::Arc;

use crate::binary::{cursor::Cursor, leb128};
use crate::error::Trap;
use crate::runtime::WasmFunc;

/// A branch target pushed by `block`, `loop` and `if`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    /// Values carried across a branch to this label.
    pub arity: usize,
    /// Where a branch resumes: past the `end` for block/if, the `loop` opcode itself for loop.
    pub continuation: usize,
    /// Operand-stack height below the construct's parameters.
    pub height: usize,
}

#[derive(Debug)]
pub struct Frame {
    pub func: Arc<WasmFunc>,
    pub pc: usize,
    pub locals: Vec<u64>,
    pub labels: Vec<Label>,
    /// Operand-stack height at entry, after parameters were popped.
    pub base: usize,
}

impl Frame {
    pub fn new(func: Arc<WasmFunc>, locals: Vec<u64>, base: usize) -> Self {
        Self {
            func,
            pc: 0,
            locals,
            labels: Vec::new(),
            base,
        }
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, Trap> {
        let b = *self
            .func
            .body
            .get(self.pc)
            .ok_or(Trap::Malformed { offset: self.pc })?;
        self.pc += 1;
        Ok(b)
    }

    #[inline]
    pub fn read_uleb_u32(&mut self) -> Result<u32, Trap> {
        let mut cur = Cursor::at(&self.func.body, self.pc)?;
        let v = leb128::read_uleb_u32(&mut cur)?;
        self.pc = cur.offset();
        Ok(v)
    }

    pub fn read_sleb_i32(&mut self) -> Result<i32, Trap> {
        let mut cur = Cursor::at(&self.func.body, self.pc)?;
        let v = leb128::read_sleb_i32(&mut cur)?;
        self.pc = cur.offset();
        Ok(v)
    }

    pub fn read_sleb_i64(&mut self) -> Result<i64, Trap> {
        let mut cur = Cursor::at(&self.func.body, self.pc)?;
        let v = leb128::read_sleb_i64(&mut cur)?;
        self.pc = cur.offset();
        Ok(v)
    }

    pub fn read_u32_le(&mut self) -> Result<u32, Trap> {
        let mut cur = Cursor::at(&self.func.body, self.pc)?;
        let v = cur.read_u32_le()?;
        self.pc = cur.offset();
        Ok(v)
    }

    pub fn read_u64_le(&mut self) -> Result<u64, Trap> {
        let mut cur = Cursor::at(&self.func.body, self.pc)?;
        let v = cur.read_u64_le()?;
        self.pc = cur.offset();
        Ok(v)
    }

    /// `memarg` immediate: alignment hint (ignored) and static offset.
    pub fn read_memarg(&mut self) -> Result<u32, Trap> {
        self.read_uleb_u32()?;
        self.read_uleb_u32()
    }

    pub fn local(&self, index: u32) -> Result<u64, Trap> {
        self.locals
            .get(index as usize)
            .copied()
            .ok_or(Trap::LocalIndexOutOfRange(index))
    }

    pub fn local_mut(&mut self, index: u32) -> Result<&mut u64, Trap> {
        self.locals
            .get_mut(index as usize)
            .ok_or(Trap::LocalIndexOutOfRange(index))
    }
}
