//! Runtime entities and the instance that owns them.

pub mod func;
pub mod global;
pub mod index_space;
pub mod instance;
pub mod memory;
pub mod table;

pub use func::{FuncEntry, WasmFunc};
pub use global::Global;
pub use index_space::IndexSpace;
pub use instance::Instance;
pub use memory::{Memory, MAX_PAGES, PAGE_SIZE};
pub use table::Table;
