//! wasmite: WebAssembly MVP loader, linker and stack-machine interpreter.
//!
//! ```no_run
//! use std::sync::Arc;
//! use wasmite::{Caller, Linker, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("app.wasm")?;
//! let module = Arc::new(wasmite::parse(&bytes)?);
//! let mut linker = Linker::default();
//! linker.define_func("env", "log", |_: Caller<'_>, v: i32| println!("{v}"))?;
//! let mut instance = linker.instantiate(module)?;
//! let out = instance.call_exported_func("main", &[Value::I32(1)])?;
//! println!("{out:?}");
//! # Ok(())
//! # }
//! ```

pub mod binary;
pub mod config;
pub mod error;
pub mod expr;
pub mod host;
pub mod model;
pub mod runtime;
pub mod vm;

pub use config::{EngineConfig, LinkerConfig, ModuleConfig};
pub use error::{LinkError, ParseError, Trap};
pub use host::{Caller, Extern, ExternModule, HostFunc, ImportResolver, Linker};
pub use model::{FuncType, Module, ValType, Value};
pub use runtime::Instance;

/// Decode a binary module with default settings.
pub fn parse(bytes: &[u8]) -> Result<Module, ParseError> {
    Module::from_bytes(bytes)
}
