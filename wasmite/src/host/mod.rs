//! Import resolution: external modules, host registration and the `Linker`.

pub mod func;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::LinkerConfig;
use crate::error::LinkError;
use crate::model::{ExternKind, Module};
use crate::runtime::{FuncEntry, Global, Instance, Memory, Table};
pub use func::{Caller, HostFn, HostFunc, HostResults, IntoHostFunc, WasmTy};

/// An importable entity.
#[derive(Debug, Clone)]
pub enum Extern {
    Func(FuncEntry),
    Table(Table),
    Memory(Memory),
    Global(Global),
}

impl Extern {
    pub fn kind(&self) -> ExternKind {
        match self {
            Extern::Func(_) => ExternKind::Func,
            Extern::Table(_) => ExternKind::Table,
            Extern::Memory(_) => ExternKind::Memory,
            Extern::Global(_) => ExternKind::Global,
        }
    }
}

impl From<HostFunc> for Extern {
    fn from(h: HostFunc) -> Self {
        Extern::Func(FuncEntry::Host(h))
    }
}

impl From<FuncEntry> for Extern {
    fn from(f: FuncEntry) -> Self {
        Extern::Func(f)
    }
}

impl From<Memory> for Extern {
    fn from(m: Memory) -> Self {
        Extern::Memory(m)
    }
}

impl From<Table> for Extern {
    fn from(t: Table) -> Self {
        Extern::Table(t)
    }
}

impl From<Global> for Extern {
    fn from(g: Global) -> Self {
        Extern::Global(g)
    }
}

/// The exports of one external module, by name.
#[derive(Debug, Clone, Default)]
pub struct ExternModule {
    exports: HashMap<String, Extern>,
}

impl ExternModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Extern> {
        self.exports.get(name)
    }

    /// Insert an export, returning the one it replaced.
    pub fn insert(&mut self, name: impl Into<String>, ext: impl Into<Extern>) -> Option<Extern> {
        self.exports.insert(name.into(), ext.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Extern)> {
        self.exports.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

/// Source of external modules for import resolution.
pub trait ImportResolver {
    fn lookup_module(&self, module: &str) -> Option<&ExternModule>;
}

impl ImportResolver for HashMap<String, ExternModule> {
    fn lookup_module(&self, module: &str) -> Option<&ExternModule> {
        self.get(module)
    }
}

/// Collects host functions and instance exports under `(module, name)` pairs, then
/// instantiates modules against them.
#[derive(Debug, Default)]
pub struct Linker {
    modules: HashMap<String, ExternModule>,
    config: LinkerConfig,
}

impl Linker {
    pub fn new(config: LinkerConfig) -> Self {
        Self {
            modules: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    pub fn define(
        &mut self,
        module: &str,
        name: &str,
        ext: impl Into<Extern>,
    ) -> Result<&mut Self, LinkError> {
        let entry = self.modules.entry(module.to_string()).or_default();
        if entry.get(name).is_some() {
            if self.config.disable_shadowing {
                return Err(LinkError::DuplicateDefinition {
                    module: module.to_string(),
                    name: name.to_string(),
                });
            }
            log::warn!("{module}.{name} redefined; the later definition wins");
        }
        entry.insert(name, ext);
        Ok(self)
    }

    /// Register a typed Rust closure, e.g. `|caller: Caller<'_>, ptr: i32, len: i32| { .. }`.
    pub fn define_func<Params, Results>(
        &mut self,
        module: &str,
        name: &str,
        f: impl IntoHostFunc<Params, Results>,
    ) -> Result<&mut Self, LinkError> {
        self.define(module, name, f.into_host_func())
    }

    /// Register a host function with an explicit signature and fallible body.
    pub fn define_host_func(
        &mut self,
        module: &str,
        name: &str,
        func: HostFunc,
    ) -> Result<&mut Self, LinkError> {
        self.define(module, name, func)
    }

    /// Make every export of `instance` importable under `name`.
    pub fn define_instance(&mut self, name: &str, instance: &Instance) -> Result<&mut Self, LinkError> {
        for (export, ext) in instance.exports().iter() {
            self.define(name, export, ext.clone())?;
        }
        Ok(self)
    }

    pub fn instantiate(&self, module: Arc<Module>) -> Result<Instance, LinkError> {
        Instance::with_config(module, self, self.config.engine)
    }
}

impl ImportResolver for Linker {
    fn lookup_module(&self, module: &str) -> Option<&ExternModule> {
        self.modules.get(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_definition_shadows_earlier() {
        let mut linker = Linker::default();
        linker.define_func("env", "f", |_: Caller<'_>| 1i32).unwrap();
        linker.define_func("env", "f", |_: Caller<'_>| 2i64).unwrap();
        let ext = linker.lookup_module("env").unwrap().get("f").unwrap();
        match ext {
            Extern::Func(f) => assert_eq!(f.ty().results, vec![crate::model::ValType::I64]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn shadowing_can_be_disabled() {
        let mut linker = Linker::new(LinkerConfig::default().with_shadowing_disabled(true));
        linker.define_func("env", "f", |_: Caller<'_>| {}).unwrap();
        let err = linker.define_func("env", "f", |_: Caller<'_>| {}).unwrap_err();
        assert!(matches!(err, LinkError::DuplicateDefinition { .. }));
        linker.define_func("env", "g", |_: Caller<'_>| {}).unwrap();
    }
}
