//! Decoded module: every section of one binary, immutable after decoding.

use std::io::Read;

use super::types::{
    Export, FuncIdx, FuncType, GlobalType, Import, ImportDesc, MemIdx, MemoryType, TableIdx,
    TableType, TypeIdx, ValType,
};
use crate::config::ModuleConfig;
use crate::error::ParseError;
use crate::expr::Expression;

/// `count` repetitions of a local of type `val_type`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalDecl {
    pub count: u32,
    pub val_type: ValType,
}

/// Locals and raw instruction bytes of one defined function. The body ends with its own `end`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeBody {
    pub locals: Vec<LocalDecl>,
    pub body: Vec<u8>,
}

impl CodeBody {
    /// Declared locals, parameters excluded.
    pub fn num_locals(&self) -> u64 {
        self.locals.iter().map(|l| u64::from(l.count)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSegment {
    pub ty: GlobalType,
    pub init: Expression,
}

/// Active element segment: function indices written into `table` starting at `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSegment {
    pub table: TableIdx,
    pub offset: Expression,
    pub init: Vec<FuncIdx>,
}

/// Active data segment: bytes written into `memory` starting at `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    pub memory: MemIdx,
    pub offset: Expression,
    pub init: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Type index of each defined (non-imported) function, in module order.
    pub func_type_indices: Vec<TypeIdx>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<GlobalSegment>,

    pub exports: Vec<Export>,
    pub start: Option<FuncIdx>,

    pub elements: Vec<ElementSegment>,
    pub codes: Vec<CodeBody>,
    pub data: Vec<DataSegment>,

    pub imported_funcs: u32,
    pub imported_tables: u32,
    pub imported_memories: u32,
    pub imported_globals: u32,
}

impl Module {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        Self::from_bytes_with_config(bytes, &ModuleConfig::default())
    }

    pub fn from_bytes_with_config(bytes: &[u8], config: &ModuleConfig) -> Result<Self, ParseError> {
        crate::binary::sections::decode_module(bytes, config)
    }

    /// Read the whole source, then decode it.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, ParseError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    pub fn total_funcs(&self) -> u32 {
        self.imported_funcs + self.func_type_indices.len() as u32
    }

    pub fn total_tables(&self) -> u32 {
        self.imported_tables + self.tables.len() as u32
    }

    pub fn total_memories(&self) -> u32 {
        self.imported_memories + self.memories.len() as u32
    }

    pub fn total_globals(&self) -> u32 {
        self.imported_globals + self.globals.len() as u32
    }

    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|e| e.name == name)
    }

    /// Signature of function `index` in the combined (imported + defined) index space.
    pub fn func_type(&self, index: FuncIdx) -> Option<&FuncType> {
        let type_idx = if index < self.imported_funcs {
            self.imports
                .iter()
                .filter_map(|i| match i.desc {
                    ImportDesc::Func(t) => Some(t),
                    _ => None,
                })
                .nth(index as usize)?
        } else {
            *self
                .func_type_indices
                .get((index - self.imported_funcs) as usize)?
        };
        self.types.get(type_idx as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_locals_sums_groups() {
        let code = CodeBody {
            locals: vec![
                LocalDecl { count: 2, val_type: ValType::I32 },
                LocalDecl { count: 3, val_type: ValType::F64 },
            ],
            body: vec![0x0B],
        };
        assert_eq!(code.num_locals(), 5);
    }

    #[test]
    fn func_type_spans_imports_then_definitions() {
        let m = Module {
            types: vec![
                FuncType::new([ValType::I32], []),
                FuncType::new([], [ValType::I64]),
            ],
            imports: vec![Import {
                module: "env".into(),
                name: "f".into(),
                desc: ImportDesc::Func(0),
            }],
            func_type_indices: vec![1],
            imported_funcs: 1,
            ..Module::default()
        };
        assert_eq!(m.total_funcs(), 2);
        assert_eq!(m.func_type(0).unwrap().params, vec![ValType::I32]);
        assert_eq!(m.func_type(1).unwrap().results, vec![ValType::I64]);
        assert!(m.func_type(2).is_none());
    }
}
