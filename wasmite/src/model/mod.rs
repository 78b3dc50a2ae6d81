//! Public model surface: value and entity types plus the decoded `Module`.

pub mod module;
pub mod types;

pub use module::{CodeBody, DataSegment, ElementSegment, GlobalSegment, LocalDecl, Module};
pub use types::{
    Export, ExportDesc, ExternKind, FuncIdx, FuncType, GlobalIdx, GlobalType, Import, ImportDesc,
    Limits, MemIdx, MemoryType, RefType, TableIdx, TableType, TypeIdx, ValType, Value,
};
