//! Per-instance index spaces: imported entities first, then the module's own, with element and
//! data segments applied.

use std::sync::Arc;

use super::{FuncEntry, Global, Memory, Table, WasmFunc};
use crate::error::LinkError;
use crate::host::{Extern, ImportResolver};
use crate::model::{FuncType, ImportDesc, Module, Value};
use crate::vm::blocks::analyze_blocks;

#[derive(Debug, Clone, Default)]
pub struct IndexSpace {
    pub(crate) funcs: Vec<FuncEntry>,
    pub(crate) tables: Vec<Table>,
    pub(crate) memories: Vec<Memory>,
    pub(crate) globals: Vec<Global>,
}

impl IndexSpace {
    /// Link `module` against `resolver`. Fails on the first error; nothing partial is returned.
    pub fn build(module: &Module, resolver: &impl ImportResolver) -> Result<Self, LinkError> {
        let mut space = IndexSpace::default();
        space.resolve_imports(module, resolver)?;

        // Local tables and memories start empty and keep their declared limits.
        space.tables.extend(module.tables.iter().copied().map(Table::new));
        space.memories.extend(module.memories.iter().copied().map(Memory::new));
        if space.tables.len() > 1 {
            return Err(LinkError::MultipleTables(space.tables.len()));
        }
        if space.memories.len() > 1 {
            return Err(LinkError::MultipleMemories(space.memories.len()));
        }

        for seg in &module.globals {
            let value = seg.init.evaluate(&space.globals)?;
            if value.ty() != seg.ty.val_type {
                return Err(LinkError::TypeMismatch {
                    context: "global initializer",
                    expected: seg.ty.val_type,
                    found: value.ty(),
                });
            }
            space.globals.push(Global::new(seg.ty, value));
        }

        space.define_funcs(module)?;
        space.init_tables(module)?;
        space.init_memories(module)?;

        for memory in &mut space.memories {
            memory.ensure_min()?;
        }
        for table in &mut space.tables {
            table.ensure_min()?;
        }

        log::debug!(
            "index space: {} funcs, {} tables, {} memories, {} globals",
            space.funcs.len(),
            space.tables.len(),
            space.memories.len(),
            space.globals.len()
        );
        Ok(space)
    }

    fn resolve_imports(&mut self, module: &Module, resolver: &impl ImportResolver) -> Result<(), LinkError> {
        for imp in &module.imports {
            if let ImportDesc::Global(gt) = imp.desc {
                if gt.mutable {
                    return Err(LinkError::MutableGlobalImport {
                        module: imp.module.clone(),
                        name: imp.name.clone(),
                    });
                }
            }

            let ext = resolver
                .lookup_module(&imp.module)
                .ok_or_else(|| LinkError::UnresolvedModule {
                    module: imp.module.clone(),
                })?
                .get(&imp.name)
                .ok_or_else(|| LinkError::UnresolvedExport {
                    module: imp.module.clone(),
                    name: imp.name.clone(),
                })?;

            match (&imp.desc, ext) {
                (ImportDesc::Func(type_idx), Extern::Func(f)) => {
                    let expected = module.types.get(*type_idx as usize).ok_or(
                        LinkError::IndexOutOfRange {
                            space: "type",
                            index: *type_idx,
                            len: module.types.len(),
                        },
                    )?;
                    if f.ty() != expected {
                        return Err(LinkError::SignatureMismatch {
                            module: imp.module.clone(),
                            name: imp.name.clone(),
                            expected: expected.clone(),
                            found: f.ty().clone(),
                        });
                    }
                    self.funcs.push(f.clone());
                }
                (ImportDesc::Table(_), Extern::Table(t)) => self.tables.push(t.clone()),
                (ImportDesc::Memory(_), Extern::Memory(m)) => self.memories.push(m.clone()),
                (ImportDesc::Global(gt), Extern::Global(g)) => {
                    // Rejected when mutable on either side.
                    if g.ty().mutable {
                        return Err(LinkError::MutableGlobalImport {
                            module: imp.module.clone(),
                            name: imp.name.clone(),
                        });
                    }
                    if g.ty().val_type != gt.val_type {
                        return Err(LinkError::TypeMismatch {
                            context: "global import",
                            expected: gt.val_type,
                            found: g.ty().val_type,
                        });
                    }
                    self.globals.push(Global::new(*gt, g.get()));
                }
                (desc, ext) => {
                    return Err(LinkError::KindMismatch {
                        module: imp.module.clone(),
                        name: imp.name.clone(),
                        expected: desc.kind(),
                        found: ext.kind(),
                    })
                }
            }
            log::trace!("resolved import {}.{}", imp.module, imp.name);
        }
        Ok(())
    }

    fn define_funcs(&mut self, module: &Module) -> Result<(), LinkError> {
        let types: Arc<[FuncType]> = module.types.clone().into();
        for (i, &type_idx) in module.func_type_indices.iter().enumerate() {
            let index = self.funcs.len() as u32;
            let ty = types
                .get(type_idx as usize)
                .ok_or(LinkError::IndexOutOfRange {
                    space: "type",
                    index: type_idx,
                    len: types.len(),
                })?
                .clone();
            let code = module.codes.get(i).ok_or(LinkError::IndexOutOfRange {
                space: "code",
                index: i as u32,
                len: module.codes.len(),
            })?;
            let blocks = analyze_blocks(&code.body, &types)
                .map_err(|source| LinkError::IllNestedBlock { func: index, source })?;
            self.funcs.push(FuncEntry::Wasm(Arc::new(WasmFunc {
                ty,
                body: code.body.as_slice().into(),
                num_locals: code.num_locals(),
                types: Arc::clone(&types),
                blocks,
            })));
        }
        Ok(())
    }

    fn init_tables(&mut self, module: &Module) -> Result<(), LinkError> {
        for seg in &module.elements {
            let offset = segment_offset(seg.offset.evaluate(&self.globals)?, "element segment")?;
            for &f in &seg.init {
                if f as usize >= self.funcs.len() {
                    return Err(LinkError::IndexOutOfRange {
                        space: "function",
                        index: f,
                        len: self.funcs.len(),
                    });
                }
            }
            let len = self.tables.len();
            let table = self
                .tables
                .get_mut(seg.table as usize)
                .ok_or(LinkError::IndexOutOfRange {
                    space: "table",
                    index: seg.table,
                    len,
                })?;
            table.write_segment(offset, &seg.init)?;
        }
        Ok(())
    }

    fn init_memories(&mut self, module: &Module) -> Result<(), LinkError> {
        for seg in &module.data {
            let offset = segment_offset(seg.offset.evaluate(&self.globals)?, "data segment")?;
            let len = self.memories.len();
            let memory = self
                .memories
                .get_mut(seg.memory as usize)
                .ok_or(LinkError::IndexOutOfRange {
                    space: "memory",
                    index: seg.memory,
                    len,
                })?;
            memory.write_segment(offset, &seg.init)?;
        }
        Ok(())
    }

    pub fn funcs(&self) -> &[FuncEntry] {
        &self.funcs
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn memories(&self) -> &[Memory] {
        &self.memories
    }

    pub fn globals(&self) -> &[Global] {
        &self.globals
    }
}

fn segment_offset(value: Value, context: &'static str) -> Result<u32, LinkError> {
    match value {
        Value::I32(v) => Ok(v as u32),
        other => Err(LinkError::OffsetNotI32 {
            context,
            found: other.ty(),
        }),
    }
}
