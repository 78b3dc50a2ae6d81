//! Constant-initializer expressions: the single-instruction form used by global initializers
//! and by element/data segment offsets.
//!
//! The reader keeps the immediate as the exact bytes found in the binary rather than a decoded
//! number. Its width is only known after decoding it once, so the cursor seeks back over the
//! immediate and copies it verbatim.

use crate::binary::{cursor::Cursor, leb128, BinaryReadError, Result};
use crate::error::LinkError;
use crate::model::{ValType, Value};
use crate::runtime::Global;

/// Marks the end of a constant expression.
pub const END: u8 = 0x0B;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExprOpcode {
    GlobalGet = 0x23,
    I32Const = 0x41,
    I64Const = 0x42,
    F32Const = 0x43,
    F64Const = 0x44,
}

impl ExprOpcode {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0x23 => ExprOpcode::GlobalGet,
            0x41 => ExprOpcode::I32Const,
            0x42 => ExprOpcode::I64Const,
            0x43 => ExprOpcode::F32Const,
            0x44 => ExprOpcode::F64Const,
            _ => return None,
        })
    }
}

/// A decoded constant expression: opcode plus its raw immediate bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub opcode: ExprOpcode,
    pub data: Vec<u8>,
}

impl Expression {
    pub fn i32_const(v: i32) -> Self {
        let mut data = Vec::new();
        write_sleb(&mut data, i64::from(v));
        Self {
            opcode: ExprOpcode::I32Const,
            data,
        }
    }

    /// Evaluate against the globals defined so far (imported ones first).
    pub fn evaluate(&self, globals: &[Global]) -> core::result::Result<Value, LinkError> {
        let mut cur = Cursor::new(&self.data);
        let value = match self.opcode {
            ExprOpcode::I32Const => Value::I32(leb128::read_sleb_i32(&mut cur)?),
            ExprOpcode::I64Const => Value::I64(leb128::read_sleb_i64(&mut cur)?),
            ExprOpcode::F32Const => Value::F32(cur.read_u32_le()?),
            ExprOpcode::F64Const => Value::F64(cur.read_u64_le()?),
            ExprOpcode::GlobalGet => {
                let index = leb128::read_uleb_u32(&mut cur)?;
                globals
                    .get(index as usize)
                    .map(Global::get)
                    .ok_or(LinkError::IndexOutOfRange {
                        space: "global",
                        index,
                        len: globals.len(),
                    })?
            }
        };
        Ok(value)
    }

    /// Statically known result type, or `None` for `global.get`.
    pub fn const_type(&self) -> Option<ValType> {
        match self.opcode {
            ExprOpcode::I32Const => Some(ValType::I32),
            ExprOpcode::I64Const => Some(ValType::I64),
            ExprOpcode::F32Const => Some(ValType::F32),
            ExprOpcode::F64Const => Some(ValType::F64),
            ExprOpcode::GlobalGet => None,
        }
    }
}

/// Read one constant expression, leaving the cursor just past its `end` marker.
pub fn read_expression(cur: &mut Cursor) -> Result<Expression> {
    let op_offset = cur.offset();
    let byte = cur.read_u8()?;
    let opcode = ExprOpcode::from_byte(byte).ok_or(BinaryReadError::InvalidExprOpcode {
        opcode: byte,
        offset: op_offset,
    })?;

    let start = cur.offset();
    match opcode {
        ExprOpcode::I32Const => {
            leb128::read_sleb_i32(cur)?;
        }
        ExprOpcode::I64Const => {
            leb128::read_sleb_i64(cur)?;
        }
        ExprOpcode::F32Const => cur.skip(4)?,
        ExprOpcode::F64Const => cur.skip(8)?,
        ExprOpcode::GlobalGet => {
            leb128::read_uleb_u32(cur)?;
        }
    }
    let n = cur.offset() - start;

    let end_offset = cur.offset();
    if cur.read_u8()? != END {
        return Err(BinaryReadError::ExprNotTerminated { offset: end_offset });
    }

    cur.seek(start)?;
    let data = cur.read_bytes(n)?.to_vec();
    cur.skip(1)?;

    Ok(Expression { opcode, data })
}

fn write_sleb(out: &mut Vec<u8>, mut v: i64) {
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
        out.push(if done { byte } else { byte | 0x80 });
        if done {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GlobalType;
    use proptest::prelude::*;

    fn sleb(v: i64) -> Vec<u8> {
        let mut out = Vec::new();
        write_sleb(&mut out, v);
        out
    }

    fn read_all(bytes: &[u8]) -> (Result<Expression>, usize) {
        let mut c = Cursor::new(bytes);
        let r = read_expression(&mut c);
        (r, c.offset())
    }

    #[test]
    fn i32_const_keeps_raw_immediate() {
        let (e, pos) = read_all(&[0x41, 0x9b, 0xf1, 0x59, 0x0B, 0xEE]);
        let e = e.unwrap();
        assert_eq!(e.opcode, ExprOpcode::I32Const);
        assert_eq!(e.data, vec![0x9b, 0xf1, 0x59]);
        assert_eq!(pos, 5);
        assert_eq!(e.evaluate(&[]).unwrap(), Value::I32(-624485));
    }

    #[test]
    fn float_consts_take_fixed_widths() {
        let mut bytes = vec![0x43];
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.push(0x0B);
        let (e, pos) = read_all(&bytes);
        let e = e.unwrap();
        assert_eq!(e.data, 1.5f32.to_le_bytes().to_vec());
        assert_eq!(pos, 6);
        assert_eq!(e.evaluate(&[]).unwrap(), Value::from_f32(1.5));

        let mut bytes = vec![0x44];
        bytes.extend_from_slice(&(-2.25f64).to_le_bytes());
        bytes.push(0x0B);
        let (e, pos) = read_all(&bytes);
        assert_eq!(e.unwrap().evaluate(&[]).unwrap(), Value::from_f64(-2.25));
        assert_eq!(pos, 10);
    }

    #[test]
    fn global_get_reads_from_defined_globals() {
        let (e, pos) = read_all(&[0x23, 0x01, 0x0B]);
        let e = e.unwrap();
        assert_eq!(e.data, vec![0x01]);
        assert_eq!(pos, 3);
        let globals = vec![
            Global::new(GlobalType::new(ValType::I32, false), Value::I32(7)),
            Global::new(GlobalType::new(ValType::I64, false), Value::I64(-9)),
        ];
        assert_eq!(e.evaluate(&globals).unwrap(), Value::I64(-9));
        assert!(matches!(
            e.evaluate(&globals[..1]),
            Err(LinkError::IndexOutOfRange { space: "global", index: 1, .. })
        ));
    }

    #[test]
    fn missing_end_is_not_terminated() {
        let (e, _) = read_all(&[0x41, 0x01, 0x01]);
        assert_eq!(e.unwrap_err(), BinaryReadError::ExprNotTerminated { offset: 2 });
    }

    #[test]
    fn unsupported_opcode_is_rejected() {
        let (e, _) = read_all(&[0x6A, 0x0B]);
        assert_eq!(
            e.unwrap_err(),
            BinaryReadError::InvalidExprOpcode { opcode: 0x6A, offset: 0 }
        );
    }

    #[test]
    fn truncated_immediate_is_eof() {
        let (e, _) = read_all(&[0x44, 0x00, 0x00]);
        assert!(matches!(e.unwrap_err(), BinaryReadError::UnexpectedEof { .. }));
    }

    proptest! {
        #[test]
        fn i32_const_round_trips_bytes(v in any::<i32>(), trailer in any::<u8>()) {
            let imm = sleb(i64::from(v));
            let mut bytes = vec![0x41];
            bytes.extend_from_slice(&imm);
            bytes.push(0x0B);
            bytes.push(trailer);
            let (e, pos) = read_all(&bytes);
            let e = e.unwrap();
            prop_assert_eq!(&e.data, &imm);
            prop_assert_eq!(pos, imm.len() + 2);
            prop_assert_eq!(e.evaluate(&[]).unwrap(), Value::I32(v));
        }

        #[test]
        fn i64_const_round_trips_bytes(v in any::<i64>()) {
            let imm = sleb(v);
            let mut bytes = vec![0x42];
            bytes.extend_from_slice(&imm);
            bytes.push(0x0B);
            let (e, pos) = read_all(&bytes);
            let e = e.unwrap();
            prop_assert_eq!(&e.data, &imm);
            prop_assert_eq!(pos, bytes.len());
            prop_assert_eq!(e.evaluate(&[]).unwrap(), Value::I64(v));
        }

        #[test]
        fn wrong_terminator_fails(v in any::<i32>(), bad in any::<u8>()) {
            prop_assume!(bad != END);
            let mut bytes = vec![0x41];
            bytes.extend_from_slice(&sleb(i64::from(v)));
            bytes.push(bad);
            let (e, _) = read_all(&bytes);
            let is_not_terminated = matches!(e, Err(BinaryReadError::ExprNotTerminated { .. }));
            prop_assert!(is_not_terminated);
        }
    }
}
