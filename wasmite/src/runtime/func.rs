//! Entries of the function index space.

use std::sync::Arc;

use crate::host::HostFunc;
use crate::model::FuncType;
use crate::vm::blocks::BlockMap;

/// A function defined in WASM: signature, body and its precomputed block map.
#[derive(Debug)]
pub struct WasmFunc {
    pub ty: FuncType,
    pub body: Arc<[u8]>,
    /// Declared locals, parameters excluded.
    pub num_locals: u64,
    /// Type section the body was decoded against (block types, `call_indirect`).
    pub types: Arc<[FuncType]>,
    pub blocks: BlockMap,
}

#[derive(Debug, Clone)]
pub enum FuncEntry {
    Wasm(Arc<WasmFunc>),
    Host(HostFunc),
}

impl FuncEntry {
    pub fn ty(&self) -> &FuncType {
        match self {
            FuncEntry::Wasm(f) => &f.ty,
            FuncEntry::Host(h) => h.ty(),
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, FuncEntry::Host(_))
    }
}

impl From<HostFunc> for FuncEntry {
    fn from(h: HostFunc) -> Self {
        FuncEntry::Host(h)
    }
}
