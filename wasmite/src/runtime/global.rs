//! Global instance: declared type plus the current value as a raw 64-bit pattern.

use crate::model::{GlobalType, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    ty: GlobalType,
    bits: u64,
}

impl Global {
    pub fn new(ty: GlobalType, init: Value) -> Self {
        Self {
            ty,
            bits: init.to_bits(),
        }
    }

    pub fn ty(&self) -> GlobalType {
        self.ty
    }

    pub fn get(&self) -> Value {
        Value::from_bits(self.ty.val_type, self.bits)
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Overwrite the raw value. Mutability is checked by the caller.
    pub(crate) fn set_bits(&mut self, bits: u64) {
        self.bits = bits;
    }
}
