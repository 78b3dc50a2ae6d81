//! A linked, initialized module ready to run.

use std::collections::HashMap;
use std::sync::Arc;

use super::IndexSpace;
use crate::config::EngineConfig;
use crate::error::{LinkError, Trap};
use crate::host::{Extern, ExternModule, ImportResolver};
use crate::model::{ExportDesc, Module, ValType, Value};
use crate::vm::interpreter::Machine;
use crate::vm::stack::OperandStack;

/// Owns its index spaces and operand stack. Execution is single-threaded per instance; one
/// instance never touches another's state.
#[derive(Debug)]
pub struct Instance {
    module: Arc<Module>,
    space: IndexSpace,
    exports: HashMap<String, ExportDesc>,
    stack: OperandStack,
    config: EngineConfig,
    fuel: Option<u64>,
}

impl Instance {
    /// Link and initialize with default engine limits.
    pub fn new(module: Arc<Module>, resolver: &impl ImportResolver) -> Result<Self, LinkError> {
        Self::with_config(module, resolver, EngineConfig::default())
    }

    pub fn with_config(
        module: Arc<Module>,
        resolver: &impl ImportResolver,
        config: EngineConfig,
    ) -> Result<Self, LinkError> {
        let space = IndexSpace::build(&module, resolver)?;

        let mut exports = HashMap::with_capacity(module.exports.len());
        for export in &module.exports {
            let (space_name, index, len) = match export.desc {
                ExportDesc::Func(i) => ("function", i, space.funcs.len()),
                ExportDesc::Table(i) => ("table", i, space.tables.len()),
                ExportDesc::Memory(i) => ("memory", i, space.memories.len()),
                ExportDesc::Global(i) => ("global", i, space.globals.len()),
            };
            if index as usize >= len {
                return Err(LinkError::IndexOutOfRange {
                    space: space_name,
                    index,
                    len,
                });
            }
            exports.insert(export.name.clone(), export.desc);
        }

        let host_funcs = space.funcs.iter().filter(|f| f.is_host()).count();
        if host_funcs > 0 {
            log::debug!("bound {host_funcs} host functions");
        }

        let mut instance = Instance {
            module,
            space,
            exports,
            stack: OperandStack::new(config.max_stack_height),
            config,
            fuel: config.fuel,
        };

        if let Some(start) = instance.module.start {
            let len = instance.space.funcs.len();
            if start as usize >= len {
                return Err(LinkError::IndexOutOfRange {
                    space: "function",
                    index: start,
                    len,
                });
            }
            log::debug!("running start function {start}");
            instance
                .call_func(start, &[])
                .map_err(LinkError::StartFunction)?;
        }
        Ok(instance)
    }

    /// Call an exported function by name.
    pub fn call_exported_func(&mut self, name: &str, args: &[Value]) -> Result<Vec<Value>, Trap> {
        match self.exports.get(name) {
            Some(ExportDesc::Func(index)) => self.call_func(*index, args),
            Some(_) => Err(Trap::NotAFunction(name.to_string())),
            None => Err(Trap::ExportNotFound(name.to_string())),
        }
    }

    /// Call a function by its index in the function index space. Imported functions come
    /// first.
    pub fn call_func(&mut self, index: u32, args: &[Value]) -> Result<Vec<Value>, Trap> {
        let func = self
            .space
            .funcs
            .get(index as usize)
            .ok_or(Trap::FunctionIndexOutOfRange {
                index,
                len: self.space.funcs.len(),
            })?;
        let ty = func.ty().clone();
        let found: Vec<ValType> = args.iter().map(Value::ty).collect();
        if found != ty.params {
            return Err(Trap::ArgumentMismatch {
                expected: ty,
                found,
            });
        }

        let result = self.execute(index, args);
        if let Err(trap) = &result {
            log::debug!("function {index} trapped: {trap}");
            self.stack.clear();
        }
        result?;

        let raw = self.stack.pop_n(ty.results.len())?;
        Ok(ty
            .results
            .iter()
            .zip(raw)
            .map(|(&t, bits)| Value::from_bits(t, bits))
            .collect())
    }

    fn execute(&mut self, index: u32, args: &[Value]) -> Result<(), Trap> {
        for arg in args {
            self.stack.push(arg.to_bits())?;
        }
        Machine {
            space: &mut self.space,
            stack: &mut self.stack,
            config: &self.config,
            fuel: &mut self.fuel,
        }
        .invoke(index)
    }

    /// Every export as an importable entity. Functions are shared; tables, memories and
    /// globals are copied as they stand now.
    pub fn exports(&self) -> ExternModule {
        let mut out = ExternModule::new();
        for (name, desc) in &self.exports {
            let ext = match *desc {
                ExportDesc::Func(i) => self.space.funcs.get(i as usize).cloned().map(Extern::Func),
                ExportDesc::Table(i) => self.space.tables.get(i as usize).cloned().map(Extern::Table),
                ExportDesc::Memory(i) => {
                    self.space.memories.get(i as usize).cloned().map(Extern::Memory)
                }
                ExportDesc::Global(i) => {
                    self.space.globals.get(i as usize).cloned().map(Extern::Global)
                }
            };
            if let Some(ext) = ext {
                out.insert(name.clone(), ext);
            }
        }
        out
    }

    pub fn exported_global(&self, name: &str) -> Option<Value> {
        match self.exports.get(name)? {
            ExportDesc::Global(i) => self.space.globals.get(*i as usize).map(|g| g.get()),
            _ => None,
        }
    }

    /// Contents of the instance's linear memory, if it has one.
    pub fn memory(&self) -> Option<&[u8]> {
        self.space.memories.first().map(|m| m.data())
    }

    pub fn memory_mut(&mut self) -> Option<&mut [u8]> {
        self.space.memories.first_mut().map(|m| m.data_mut())
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn index_space(&self) -> &IndexSpace {
        &self.space
    }

    /// Fuel left, when the engine was configured with a budget.
    pub fn remaining_fuel(&self) -> Option<u64> {
        self.fuel
    }
}
