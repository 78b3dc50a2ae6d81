//! Section ids, headers, payload decoders and the top-level module decoder.

use std::collections::HashSet;

use super::{
    cursor::Cursor,
    leb128,
    reader::{read_len_prefixed_bytes, read_name, read_vec},
    BinaryReadError, Result,
};
use crate::config::ModuleConfig;
use crate::error::ParseError;
use crate::expr::{read_expression, ExprOpcode, Expression};
use crate::model::{
    CodeBody, DataSegment, ElementSegment, Export, ExportDesc, FuncType, GlobalSegment,
    GlobalType, Import, ImportDesc, Limits, LocalDecl, MemoryType, Module, RefType, TableType,
    ValType,
};

pub const MAGIC: u32 = 0x6D73_6100;
pub const VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
}

impl SectionId {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => SectionId::Custom,
            1 => SectionId::Type,
            2 => SectionId::Import,
            3 => SectionId::Function,
            4 => SectionId::Table,
            5 => SectionId::Memory,
            6 => SectionId::Global,
            7 => SectionId::Export,
            8 => SectionId::Start,
            9 => SectionId::Element,
            10 => SectionId::Code,
            11 => SectionId::Data,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub id: SectionId,
    pub payload_len: u32,
    pub payload_offset: usize,
}

pub fn read_section_header(cur: &mut Cursor) -> Result<SectionHeader> {
    let id_offset = cur.offset();
    let id_byte = cur.read_u8()?;
    let id = SectionId::from_byte(id_byte).ok_or(BinaryReadError::Malformed {
        offset: id_offset,
        msg: "unknown section id",
    })?;
    let payload_len = leb128::read_uleb_u32(cur)?;
    Ok(SectionHeader {
        id,
        payload_len,
        payload_offset: cur.offset(),
    })
}

/// Section payload reader. Offsets reported in errors are absolute within the module.
struct SectionReader<'c> {
    config: &'c ModuleConfig,
}

impl SectionReader<'_> {
    fn val_type(&self, cur: &mut Cursor) -> Result<ValType> {
        let offset = cur.offset();
        let b = cur.read_u8()?;
        let ty = ValType::from_byte(b).ok_or(BinaryReadError::InvalidTypeByte {
            byte: b,
            offset,
            expected: "value type",
        })?;
        if ty.is_float() && self.config.disable_float_point {
            return Err(BinaryReadError::InvalidTypeByte {
                byte: b,
                offset,
                expected: "integer value type (floating point disabled)",
            });
        }
        Ok(ty)
    }

    fn expression(&self, cur: &mut Cursor) -> Result<Expression> {
        let offset = cur.offset();
        let expr = read_expression(cur)?;
        if self.config.disable_float_point
            && matches!(expr.opcode, ExprOpcode::F32Const | ExprOpcode::F64Const)
        {
            return Err(BinaryReadError::InvalidExprOpcode {
                opcode: expr.opcode as u8,
                offset,
            });
        }
        Ok(expr)
    }

    fn func_type(&self, cur: &mut Cursor) -> Result<FuncType> {
        let offset = cur.offset();
        let form = cur.read_u8()?;
        if form != 0x60 {
            return Err(BinaryReadError::InvalidTypeByte {
                byte: form,
                offset,
                expected: "function type (0x60)",
            });
        }
        let params = read_vec(cur, |c| self.val_type(c))?;
        let results = read_vec(cur, |c| self.val_type(c))?;
        Ok(FuncType { params, results })
    }

    fn global_type(&self, cur: &mut Cursor) -> Result<GlobalType> {
        let val_type = self.val_type(cur)?;
        let offset = cur.offset();
        let mutable = match cur.read_u8()? {
            0x00 => false,
            0x01 => true,
            _ => {
                return Err(BinaryReadError::Malformed {
                    offset,
                    msg: "invalid global mutability",
                })
            }
        };
        Ok(GlobalType { val_type, mutable })
    }

    fn imports(&self, cur: &mut Cursor, module: &mut Module) -> Result<()> {
        module.imports = read_vec(cur, |c| {
            let module_name = read_name(c)?;
            let name = read_name(c)?;
            let offset = c.offset();
            let desc = match c.read_u8()? {
                0x00 => ImportDesc::Func(leb128::read_uleb_u32(c)?),
                0x01 => ImportDesc::Table(read_table_type(c)?),
                0x02 => ImportDesc::Memory(MemoryType {
                    limits: read_limits(c)?,
                }),
                0x03 => ImportDesc::Global(self.global_type(c)?),
                _ => {
                    return Err(BinaryReadError::Malformed {
                        offset,
                        msg: "invalid import kind",
                    })
                }
            };
            Ok(Import {
                module: module_name,
                name,
                desc,
            })
        })?;
        for imp in &module.imports {
            match imp.desc {
                ImportDesc::Func(_) => module.imported_funcs += 1,
                ImportDesc::Table(_) => module.imported_tables += 1,
                ImportDesc::Memory(_) => module.imported_memories += 1,
                ImportDesc::Global(_) => module.imported_globals += 1,
            }
        }
        Ok(())
    }

    fn globals(&self, cur: &mut Cursor) -> Result<Vec<GlobalSegment>> {
        read_vec(cur, |c| {
            let ty = self.global_type(c)?;
            let init = self.expression(c)?;
            Ok(GlobalSegment { ty, init })
        })
    }

    fn elements(&self, cur: &mut Cursor) -> Result<Vec<ElementSegment>> {
        read_vec(cur, |c| {
            let table = leb128::read_uleb_u32(c)?;
            let offset = self.expression(c)?;
            let init = read_vec(c, leb128::read_uleb_u32)?;
            Ok(ElementSegment {
                table,
                offset,
                init,
            })
        })
    }

    fn data(&self, cur: &mut Cursor) -> Result<Vec<DataSegment>> {
        read_vec(cur, |c| {
            let memory = leb128::read_uleb_u32(c)?;
            let offset = self.expression(c)?;
            let init = read_len_prefixed_bytes(c)?.to_vec();
            Ok(DataSegment {
                memory,
                offset,
                init,
            })
        })
    }

    fn codes(&self, cur: &mut Cursor) -> Result<Vec<CodeBody>> {
        read_vec(cur, |c| {
            let size = leb128::read_uleb_u32(c)? as usize;
            let start = c.offset();
            let end = start + size;
            c.read_bytes(size)?;
            c.seek(start)?;

            let mut total: u64 = 0;
            let locals = read_vec(c, |c| {
                let count_offset = c.offset();
                let count = leb128::read_uleb_u32(c)?;
                total += u64::from(count);
                if total > u64::from(u32::MAX) {
                    return Err(BinaryReadError::Malformed {
                        offset: count_offset,
                        msg: "too many locals",
                    });
                }
                let val_type = self.val_type(c)?;
                Ok(LocalDecl { count, val_type })
            })?;
            if c.offset() > end {
                return Err(BinaryReadError::Malformed {
                    offset: start,
                    msg: "local declarations overrun code body",
                });
            }
            let body = c.read_bytes(end - c.offset())?.to_vec();
            Ok(CodeBody { locals, body })
        })
    }
}

fn read_limits(cur: &mut Cursor) -> Result<Limits> {
    let offset = cur.offset();
    match cur.read_u8()? {
        0x00 => Ok(Limits::new(leb128::read_uleb_u32(cur)?, None)),
        0x01 => {
            let min = leb128::read_uleb_u32(cur)?;
            let max = leb128::read_uleb_u32(cur)?;
            if max < min {
                return Err(BinaryReadError::Malformed {
                    offset,
                    msg: "limits maximum below minimum",
                });
            }
            Ok(Limits::new(min, Some(max)))
        }
        _ => Err(BinaryReadError::Malformed {
            offset,
            msg: "invalid limits flag",
        }),
    }
}

fn read_table_type(cur: &mut Cursor) -> Result<TableType> {
    let offset = cur.offset();
    let b = cur.read_u8()?;
    if b != 0x70 {
        return Err(BinaryReadError::InvalidTypeByte {
            byte: b,
            offset,
            expected: "funcref (0x70)",
        });
    }
    Ok(TableType {
        elem: RefType::FuncRef,
        limits: read_limits(cur)?,
    })
}

/// At most one table or memory may be declared in a single section.
fn at_most_one<T>(items: Vec<T>, offset: usize, msg: &'static str) -> Result<Vec<T>> {
    if items.len() > 1 {
        return Err(BinaryReadError::Malformed { offset, msg });
    }
    Ok(items)
}

/// Decode a complete binary module.
pub fn decode_module(bytes: &[u8], config: &ModuleConfig) -> core::result::Result<Module, ParseError> {
    let mut cur = Cursor::new(bytes);

    if cur.read_u32_le()? != MAGIC {
        return Err(BinaryReadError::Malformed {
            offset: 0,
            msg: "bad magic header",
        }
        .into());
    }
    if cur.read_u32_le()? != VERSION {
        return Err(BinaryReadError::Malformed {
            offset: 4,
            msg: "unsupported version",
        }
        .into());
    }

    let reader = SectionReader { config };
    let mut module = Module::default();
    let mut last_id: u8 = 0;

    while !cur.is_eof() {
        let header = read_section_header(&mut cur)?;
        let end = header.payload_offset + header.payload_len as usize;
        // Bounds-check the payload before dispatching on it.
        cur.read_bytes(header.payload_len as usize)?;
        let mut pcur = Cursor::at(&bytes[..end], header.payload_offset)?;

        if header.id != SectionId::Custom {
            let id = header.id as u8;
            if id <= last_id {
                return Err(BinaryReadError::Malformed {
                    offset: header.payload_offset,
                    msg: "section out of order or duplicated",
                }
                .into());
            }
            last_id = id;
        }
        log::trace!(
            "section {:?} at {} ({} bytes)",
            header.id,
            header.payload_offset,
            header.payload_len
        );

        match header.id {
            SectionId::Custom => {
                read_name(&mut pcur)?;
                pcur.seek(end)?;
            }
            SectionId::Type => module.types = read_vec(&mut pcur, |c| reader.func_type(c))?,
            SectionId::Import => reader.imports(&mut pcur, &mut module)?,
            SectionId::Function => {
                module.func_type_indices = read_vec(&mut pcur, leb128::read_uleb_u32)?
            }
            SectionId::Table => {
                module.tables = at_most_one(
                    read_vec(&mut pcur, read_table_type)?,
                    header.payload_offset,
                    "multiple tables",
                )?
            }
            SectionId::Memory => {
                let memories = read_vec(&mut pcur, |c| {
                    Ok(MemoryType {
                        limits: read_limits(c)?,
                    })
                })?;
                module.memories =
                    at_most_one(memories, header.payload_offset, "multiple memories")?
            }
            SectionId::Global => module.globals = reader.globals(&mut pcur)?,
            SectionId::Export => module.exports = read_exports(&mut pcur)?,
            SectionId::Start => module.start = Some(leb128::read_uleb_u32(&mut pcur)?),
            SectionId::Element => module.elements = reader.elements(&mut pcur)?,
            SectionId::Code => module.codes = reader.codes(&mut pcur)?,
            SectionId::Data => module.data = reader.data(&mut pcur)?,
        }

        if pcur.offset() != end {
            return Err(BinaryReadError::Malformed {
                offset: pcur.offset(),
                msg: "section size mismatch",
            }
            .into());
        }
    }

    if module.func_type_indices.len() != module.codes.len() {
        return Err(ParseError::FunctionCodeMismatch {
            functions: module.func_type_indices.len(),
            codes: module.codes.len(),
        });
    }

    let mut names = HashSet::new();
    for export in &module.exports {
        if !names.insert(export.name.as_str()) {
            return Err(ParseError::DuplicateExport(export.name.clone()));
        }
    }

    log::debug!(
        "decoded module: {} types, {} imports, {} functions, {} exports",
        module.types.len(),
        module.imports.len(),
        module.func_type_indices.len(),
        module.exports.len()
    );
    Ok(module)
}

fn read_exports(cur: &mut Cursor) -> Result<Vec<Export>> {
    read_vec(cur, |c| {
        let name = read_name(c)?;
        let offset = c.offset();
        let kind = c.read_u8()?;
        let index = leb128::read_uleb_u32(c)?;
        let desc = match kind {
            0x00 => ExportDesc::Func(index),
            0x01 => ExportDesc::Table(index),
            0x02 => ExportDesc::Memory(index),
            0x03 => ExportDesc::Global(index),
            _ => {
                return Err(BinaryReadError::Malformed {
                    offset,
                    msg: "invalid export kind",
                })
            }
        };
        Ok(Export { name, desc })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];

    fn module_with(sections: &[(u8, &[u8])]) -> Vec<u8> {
        let mut out = HEADER.to_vec();
        for (id, payload) in sections {
            out.push(*id);
            out.push(payload.len() as u8);
            out.extend_from_slice(payload);
        }
        out
    }

    #[test]
    fn header_ok() {
        let data = [1u8, 0x03, 0xAA, 0xBB, 0xCC];
        let mut c = Cursor::new(&data);
        let h = read_section_header(&mut c).unwrap();
        assert_eq!(h.id, SectionId::Type);
        assert_eq!(h.payload_len, 3);
        assert_eq!(h.payload_offset, 2);
    }

    #[test]
    fn empty_module_decodes() {
        let m = decode_module(&HEADER, &ModuleConfig::default()).unwrap();
        assert_eq!(m, Module::default());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = HEADER.to_vec();
        bytes[0] = 0x01;
        let err = decode_module(&bytes, &ModuleConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Binary(BinaryReadError::Malformed { offset: 0, .. })
        ));
    }

    #[test]
    fn bad_functype_tag_reports_type_byte() {
        // type section: 1 entry, tag 0x61
        let bytes = module_with(&[(1, &[0x01, 0x61, 0x00, 0x00])]);
        let err = decode_module(&bytes, &ModuleConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Binary(BinaryReadError::InvalidTypeByte { byte: 0x61, offset: 11, .. })
        ));
    }

    #[test]
    fn float_types_rejected_when_disabled() {
        let bytes = module_with(&[(1, &[0x01, 0x60, 0x01, 0x7C, 0x00])]);
        assert!(decode_module(&bytes, &ModuleConfig::default()).is_ok());
        let config = ModuleConfig::default().with_float_point_disabled(true);
        let err = decode_module(&bytes, &config).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Binary(BinaryReadError::InvalidTypeByte { byte: 0x7C, .. })
        ));
    }

    #[test]
    fn two_memories_in_one_section_are_rejected() {
        let bytes = module_with(&[(5, &[0x02, 0x00, 0x01, 0x00, 0x01])]);
        let err = decode_module(&bytes, &ModuleConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Binary(BinaryReadError::Malformed { msg: "multiple memories", .. })
        ));
    }

    #[test]
    fn duplicate_export_names_are_rejected() {
        // one memory, exported twice as "m"
        let bytes = module_with(&[
            (5, &[0x01, 0x00, 0x01]),
            (7, &[0x02, 0x01, b'm', 0x02, 0x00, 0x01, b'm', 0x02, 0x00]),
        ]);
        let err = decode_module(&bytes, &ModuleConfig::default()).unwrap_err();
        assert!(matches!(err, ParseError::DuplicateExport(name) if name == "m"));
    }

    #[test]
    fn sections_out_of_order_are_rejected() {
        let bytes = module_with(&[(5, &[0x00]), (1, &[0x00])]);
        assert!(decode_module(&bytes, &ModuleConfig::default()).is_err());
    }

    #[test]
    fn code_body_splits_locals_from_instructions() {
        let bytes = module_with(&[
            (1, &[0x01, 0x60, 0x00, 0x00]),
            (3, &[0x01, 0x00]),
            // one body of 5 bytes: 1 local group (2 x i32), then `nop end`
            (10, &[0x01, 0x05, 0x01, 0x02, 0x7F, 0x01, 0x0B]),
        ]);
        let m = decode_module(&bytes, &ModuleConfig::default()).unwrap();
        assert_eq!(m.codes.len(), 1);
        assert_eq!(m.codes[0].num_locals(), 2);
        assert_eq!(m.codes[0].body, vec![0x01, 0x0B]);
    }

    #[test]
    fn missing_code_bodies_are_rejected() {
        let bytes = module_with(&[(1, &[0x01, 0x60, 0x00, 0x00]), (3, &[0x01, 0x00])]);
        let err = decode_module(&bytes, &ModuleConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ParseError::FunctionCodeMismatch { functions: 1, codes: 0 }
        ));
    }
}
