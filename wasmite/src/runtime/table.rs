//! Funcref table: nullable slots holding indices into the owning instance's function space.

use crate::error::{LinkError, Trap};
use crate::model::{FuncIdx, TableType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    elems: Vec<Option<FuncIdx>>,
    ty: TableType,
}

impl Table {
    /// An empty table carrying its declared limits. Sized by [`Table::ensure_min`].
    pub fn new(ty: TableType) -> Self {
        Self {
            elems: Vec::new(),
            ty,
        }
    }

    pub fn ty(&self) -> TableType {
        self.ty
    }

    pub fn size(&self) -> u32 {
        self.elems.len() as u32
    }

    pub fn elements(&self) -> &[Option<FuncIdx>] {
        &self.elems
    }

    /// Function index stored in slot `idx`.
    pub fn get(&self, idx: u32) -> Result<FuncIdx, Trap> {
        match self.elems.get(idx as usize) {
            Some(Some(f)) => Ok(*f),
            Some(None) => Err(Trap::UninitializedElement { index: idx }),
            None => Err(Trap::UndefinedElement { index: idx }),
        }
    }

    fn max(&self) -> u64 {
        self.ty.limits.max.map_or(u64::from(u32::MAX), u64::from)
    }

    /// Write an element segment at `offset`, extending the table when the range runs past
    /// the current end. Each slot receives its own copy of the encoded index.
    pub fn write_segment(&mut self, offset: u32, funcs: &[FuncIdx]) -> Result<(), LinkError> {
        let start = offset as usize;
        let end = start + funcs.len();
        if end as u64 > self.max() {
            return Err(LinkError::SizeExceedsMaximum {
                context: "element segment",
                unit: "elements",
                required: end as u64,
                max: self.max(),
            });
        }
        if end > self.elems.len() {
            self.elems.resize(end, None);
        }
        for (slot, &f) in self.elems[start..end].iter_mut().zip(funcs) {
            *slot = Some(f);
        }
        Ok(())
    }

    pub fn ensure_min(&mut self) -> Result<(), LinkError> {
        let min = self.ty.limits.min;
        if u64::from(min) > self.max() {
            return Err(LinkError::SizeExceedsMaximum {
                context: "table minimum",
                unit: "elements",
                required: u64::from(min),
                max: self.max(),
            });
        }
        if self.elems.len() < min as usize {
            self.elems.resize(min as usize, None);
        }
        Ok(())
    }
}
