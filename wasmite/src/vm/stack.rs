//! Operand stack shared by all frames of one instance. Values are untyped 64-bit patterns:
//! `i32` is stored zero-extended, floats as their IEEE-754 bits.

use crate::error::Trap;

#[derive(Debug)]
pub struct OperandStack {
    values: Vec<u64>,
    limit: usize,
}

impl OperandStack {
    pub fn new(limit: usize) -> Self {
        Self {
            values: Vec::new(),
            limit,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    #[inline]
    pub fn push(&mut self, v: u64) -> Result<(), Trap> {
        if self.values.len() >= self.limit {
            return Err(Trap::StackOverflow);
        }
        self.values.push(v);
        Ok(())
    }

    #[inline]
    pub fn pop(&mut self) -> Result<u64, Trap> {
        self.values.pop().ok_or(Trap::StackUnderflow)
    }

    pub fn peek(&self) -> Result<u64, Trap> {
        self.values.last().copied().ok_or(Trap::StackUnderflow)
    }

    #[inline]
    pub fn push_i32(&mut self, v: i32) -> Result<(), Trap> {
        self.push(u64::from(v as u32))
    }

    #[inline]
    pub fn push_i64(&mut self, v: i64) -> Result<(), Trap> {
        self.push(v as u64)
    }

    #[inline]
    pub fn push_f32(&mut self, v: f32) -> Result<(), Trap> {
        self.push(u64::from(v.to_bits()))
    }

    #[inline]
    pub fn push_f64(&mut self, v: f64) -> Result<(), Trap> {
        self.push(v.to_bits())
    }

    #[inline]
    pub fn push_bool(&mut self, b: bool) -> Result<(), Trap> {
        self.push(u64::from(b))
    }

    #[inline]
    pub fn pop_i32(&mut self) -> Result<i32, Trap> {
        self.pop().map(|v| v as u32 as i32)
    }

    #[inline]
    pub fn pop_u32(&mut self) -> Result<u32, Trap> {
        self.pop().map(|v| v as u32)
    }

    #[inline]
    pub fn pop_i64(&mut self) -> Result<i64, Trap> {
        self.pop().map(|v| v as i64)
    }

    #[inline]
    pub fn pop_f32(&mut self) -> Result<f32, Trap> {
        self.pop().map(|v| f32::from_bits(v as u32))
    }

    #[inline]
    pub fn pop_f64(&mut self) -> Result<f64, Trap> {
        self.pop().map(f64::from_bits)
    }

    /// Pop the top `n` values, returned bottom-first.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<u64>, Trap> {
        let at = self.values.len().checked_sub(n).ok_or(Trap::StackUnderflow)?;
        Ok(self.values.split_off(at))
    }

    /// Keep the top `arity` values and drop everything between them and `height`.
    pub fn unwind(&mut self, height: usize, arity: usize) -> Result<(), Trap> {
        let len = self.values.len();
        if len < height + arity {
            return Err(Trap::StackUnderflow);
        }
        self.values.drain(height..len - arity);
        Ok(())
    }
}
