//! Block structure analysis: one forward scan over a function body that records, for every
//! `block`/`loop`/`if`, where its `else` and `end` sit and how many values it takes and yields.
//!
//! The scan must skip every immediate with exactly the width the interpreter consumes, or all
//! later opcode boundaries shift.

use std::collections::HashMap;

use thiserror::Error;

use super::instructions::{op, BLOCK_TYPE_EMPTY};
use crate::binary::{cursor::Cursor, leb128, BinaryReadError};
use crate::model::{FuncType, ValType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Block,
    Loop,
    If,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValType),
    /// Index into the type section.
    Func(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// Offset of the opening opcode.
    pub start_at: usize,
    /// Offset of the `else` opcode, if any.
    pub else_at: Option<usize>,
    /// Offset of the matching `end` opcode.
    pub end_at: usize,
    pub block_type: BlockType,
    pub param_arity: usize,
    pub result_arity: usize,
    /// Byte width of the block-type immediate.
    pub immediate_len: usize,
}

/// Blocks keyed by the offset of their opening opcode.
pub type BlockMap = HashMap<usize, Block>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("ill-nested block at offset {offset}")]
    IllNested { offset: usize },

    #[error("invalid block type at offset {offset}")]
    InvalidBlockType { offset: usize },

    #[error(transparent)]
    Binary(#[from] BinaryReadError),
}

pub fn analyze_blocks(body: &[u8], types: &[FuncType]) -> Result<BlockMap, BlockError> {
    let mut cur = Cursor::new(body);
    let mut open: Vec<Block> = Vec::new();
    let mut blocks = BlockMap::new();

    while !cur.is_eof() {
        let at = cur.offset();
        let opcode = cur.read_u8()?;
        match opcode {
            op::BLOCK | op::LOOP | op::IF => {
                let kind = match opcode {
                    op::BLOCK => BlockKind::Block,
                    op::LOOP => BlockKind::Loop,
                    _ => BlockKind::If,
                };
                let imm_start = cur.offset();
                let block_type = read_block_type(&mut cur)?;
                let (param_arity, result_arity) = match block_type {
                    BlockType::Empty => (0, 0),
                    BlockType::Value(_) => (0, 1),
                    BlockType::Func(idx) => {
                        let ty = types
                            .get(idx as usize)
                            .ok_or(BlockError::InvalidBlockType { offset: imm_start })?;
                        (ty.params.len(), ty.results.len())
                    }
                };
                open.push(Block {
                    kind,
                    start_at: at,
                    else_at: None,
                    end_at: 0,
                    block_type,
                    param_arity,
                    result_arity,
                    immediate_len: cur.offset() - imm_start,
                });
            }
            op::ELSE => match open.last_mut() {
                Some(b) if b.kind == BlockKind::If && b.else_at.is_none() => b.else_at = Some(at),
                _ => return Err(BlockError::IllNested { offset: at }),
            },
            op::END => match open.pop() {
                Some(mut b) => {
                    b.end_at = at;
                    blocks.insert(b.start_at, b);
                }
                // The function's own `end` must be the final byte.
                None if cur.is_eof() => return Ok(blocks),
                None => return Err(BlockError::IllNested { offset: at }),
            },
            op::BR
            | op::BR_IF
            | op::CALL
            | op::LOCAL_GET
            | op::LOCAL_SET
            | op::LOCAL_TEE
            | op::GLOBAL_GET
            | op::GLOBAL_SET
            | op::MEMORY_SIZE
            | op::MEMORY_GROW => {
                leb128::read_uleb_u32(&mut cur)?;
            }
            op::CALL_INDIRECT => {
                leb128::read_uleb_u32(&mut cur)?;
                cur.skip(1)?;
            }
            op::BR_TABLE => {
                let count = leb128::read_uleb_u32(&mut cur)?;
                for _ in 0..=count {
                    leb128::read_uleb_u32(&mut cur)?;
                }
            }
            op::I32_LOAD..=op::I64_STORE32 => {
                leb128::read_uleb_u32(&mut cur)?;
                leb128::read_uleb_u32(&mut cur)?;
            }
            op::I32_CONST => {
                leb128::read_sleb_i32(&mut cur)?;
            }
            op::I64_CONST => {
                leb128::read_sleb_i64(&mut cur)?;
            }
            op::F32_CONST => cur.skip(4)?,
            op::F64_CONST => cur.skip(8)?,
            _ => {}
        }
    }

    Err(BlockError::IllNested { offset: body.len() })
}

fn read_block_type(cur: &mut Cursor) -> Result<BlockType, BlockError> {
    let offset = cur.offset();
    let b = cur.peek_u8()?;
    if b == BLOCK_TYPE_EMPTY {
        cur.skip(1)?;
        return Ok(BlockType::Empty);
    }
    if let Some(ty) = ValType::from_byte(b) {
        cur.skip(1)?;
        return Ok(BlockType::Value(ty));
    }
    let idx = leb128::read_sleb_i33(cur)?;
    u32::try_from(idx)
        .map(BlockType::Func)
        .map_err(|_| BlockError::InvalidBlockType { offset })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn analyze(body: &[u8]) -> Result<BlockMap, BlockError> {
        analyze_blocks(body, &[])
    }

    #[test]
    fn empty_body_is_just_end() {
        assert!(analyze(&[op::END]).unwrap().is_empty());
    }

    #[test]
    fn nested_blocks_record_start_else_end() {
        // block(empty) i32.const 1 if(i32) i32.const 2 else i32.const 3 end drop end end
        let body = [
            0x02, 0x40, // 0: block
            0x41, 0x01, // 2
            0x04, 0x7F, // 4: if i32
            0x41, 0x02, // 6
            0x05, // 8: else
            0x41, 0x03, // 9
            0x0B, // 11: end if
            0x1A, // 12: drop
            0x0B, // 13: end block
            0x0B, // 14: end func
        ];
        let map = analyze(&body).unwrap();
        assert_eq!(map.len(), 2);
        let outer = map[&0];
        assert_eq!(outer.kind, BlockKind::Block);
        assert_eq!(outer.end_at, 13);
        assert_eq!(outer.result_arity, 0);
        let inner = map[&4];
        assert_eq!(inner.kind, BlockKind::If);
        assert_eq!(inner.else_at, Some(8));
        assert_eq!(inner.end_at, 11);
        assert_eq!(inner.block_type, BlockType::Value(ValType::I32));
        assert_eq!(inner.result_arity, 1);
        assert_eq!(inner.immediate_len, 1);
    }

    #[test]
    fn immediates_containing_opcode_bytes_are_skipped() {
        // i32.const 11 (0x0B) ; f64.const with 0x0B bytes ; drop drop end
        let mut body = vec![0x41, 0x0B, 0x44];
        body.extend_from_slice(&[0x0B; 8]);
        body.extend_from_slice(&[0x1A, 0x1A, 0x0B]);
        assert!(analyze(&body).unwrap().is_empty());

        // br_table with 2 labels + default, each 0x0B-free, inside a block
        let body = [0x02, 0x40, 0x41, 0x00, 0x0E, 0x02, 0x00, 0x00, 0x00, 0x0B, 0x0B];
        let map = analyze(&body).unwrap();
        assert_eq!(map[&0].end_at, 9);
    }

    #[test]
    fn loop_with_function_block_type() {
        let types = [FuncType::new([ValType::I32], [ValType::I64])];
        let body = [0x03, 0x00, 0x1A, 0x42, 0x00, 0x0B, 0x1A, 0x0B];
        let map = analyze_blocks(&body, &types).unwrap();
        let b = map[&0];
        assert_eq!(b.kind, BlockKind::Loop);
        assert_eq!(b.block_type, BlockType::Func(0));
        assert_eq!((b.param_arity, b.result_arity), (1, 1));
        assert_eq!(b.end_at, 5);
    }

    #[test]
    fn extra_end_is_ill_nested() {
        let err = analyze(&[0x0B, 0x0B]).unwrap_err();
        assert_eq!(err, BlockError::IllNested { offset: 0 });
    }

    #[test]
    fn missing_terminal_end_is_ill_nested() {
        assert!(matches!(
            analyze(&[0x02, 0x40, 0x0B]),
            Err(BlockError::IllNested { offset: 3 })
        ));
        assert!(matches!(analyze(&[0x01]), Err(BlockError::IllNested { .. })));
    }

    #[test]
    fn else_outside_if_is_ill_nested() {
        assert!(matches!(
            analyze(&[0x02, 0x40, 0x05, 0x0B, 0x0B]),
            Err(BlockError::IllNested { offset: 2 })
        ));
        assert!(matches!(
            analyze(&[0x41, 0x01, 0x04, 0x40, 0x05, 0x05, 0x0B, 0x0B]),
            Err(BlockError::IllNested { offset: 5 })
        ));
    }

    #[test]
    fn unknown_type_index_is_invalid() {
        assert!(matches!(
            analyze(&[0x02, 0x05, 0x0B, 0x0B]),
            Err(BlockError::InvalidBlockType { offset: 1 })
        ));
        assert!(matches!(
            analyze(&[0x02, 0x70, 0x0B, 0x0B]),
            Err(BlockError::InvalidBlockType { offset: 1 })
        ));
    }

    #[derive(Debug, Clone)]
    enum Node {
        Plain(Vec<u8>),
        Block { opcode: u8, body: Vec<Node> },
        If { then: Vec<Node>, els: Option<Vec<Node>> },
    }

    fn uleb(mut v: u32, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                return;
            }
            out.push(byte | 0x80);
        }
    }

    fn sleb(mut v: i64, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
            if done {
                out.push(byte);
                return;
            }
            out.push(byte | 0x80);
        }
    }

    /// Non-control instructions whose immediates may contain `end`/`else` bytes.
    fn plain() -> impl Strategy<Value = Vec<u8>> {
        prop_oneof![
            Just(vec![op::NOP]),
            any::<i32>().prop_map(|v| {
                let mut b = vec![op::I32_CONST];
                sleb(i64::from(v), &mut b);
                b
            }),
            any::<[u8; 8]>().prop_map(|bits| {
                let mut b = vec![op::F64_CONST];
                b.extend_from_slice(&bits);
                b
            }),
            (any::<u32>(), 0u32..16).prop_map(|(off, align)| {
                let mut b = vec![op::I32_LOAD];
                uleb(align, &mut b);
                uleb(off, &mut b);
                b
            }),
            prop::collection::vec(0u32..300, 0..5).prop_map(|labels| {
                let mut b = vec![op::BR_TABLE];
                uleb(labels.len() as u32, &mut b);
                for l in labels {
                    uleb(l, &mut b);
                }
                uleb(11, &mut b);
                b
            }),
            (0u32..200).prop_map(|i| {
                let mut b = vec![op::LOCAL_GET];
                uleb(i, &mut b);
                b
            }),
        ]
    }

    fn tree() -> impl Strategy<Value = Vec<Node>> {
        let node = plain().prop_map(Node::Plain).prop_recursive(5, 64, 4, |inner| {
            let body = move || prop::collection::vec(inner.clone(), 0..4);
            prop_oneof![
                (prop_oneof![Just(op::BLOCK), Just(op::LOOP)], body())
                    .prop_map(|(opcode, body)| Node::Block { opcode, body }),
                (body(), prop::option::of(body())).prop_map(|(then, els)| Node::If { then, els }),
            ]
        });
        prop::collection::vec(node, 0..6)
    }

    /// Encode `nodes`, recording `(start, else, end)` for every opener in `spans`.
    fn encode(nodes: &[Node], out: &mut Vec<u8>, spans: &mut Vec<(usize, Option<usize>, usize)>) {
        for node in nodes {
            match node {
                Node::Plain(bytes) => out.extend_from_slice(bytes),
                Node::Block { opcode, body } => {
                    let start = out.len();
                    out.extend_from_slice(&[*opcode, BLOCK_TYPE_EMPTY]);
                    encode(body, out, spans);
                    spans.push((start, None, out.len()));
                    out.push(op::END);
                }
                Node::If { then, els } => {
                    let start = out.len();
                    out.extend_from_slice(&[op::IF, 0x7F]);
                    encode(then, out, spans);
                    let mut else_at = None;
                    if let Some(els) = els {
                        else_at = Some(out.len());
                        out.push(op::ELSE);
                        encode(els, out, spans);
                    }
                    spans.push((start, else_at, out.len()));
                    out.push(op::END);
                }
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128, .. ProptestConfig::default()
        })]

        #[test]
        fn well_nested_bodies_map_every_opener(nodes in tree()) {
            let mut body = Vec::new();
            let mut spans = Vec::new();
            encode(&nodes, &mut body, &mut spans);
            body.push(op::END);

            let map = analyze(&body).unwrap();
            prop_assert_eq!(map.len(), spans.len());
            for (start, else_at, end) in spans {
                let b = map.get(&start).copied();
                prop_assert!(b.is_some(), "no block recorded at {}", start);
                let b = b.unwrap();
                prop_assert!(b.end_at > b.start_at);
                prop_assert_eq!((b.else_at, b.end_at), (else_at, end));
                if let Some(e) = b.else_at {
                    prop_assert!(b.start_at < e && e < b.end_at);
                }
            }
        }

        #[test]
        fn dropping_the_final_end_is_ill_nested(nodes in tree()) {
            let mut body = Vec::new();
            encode(&nodes, &mut body, &mut Vec::new());
            let is_ill_nested = matches!(analyze(&body), Err(BlockError::IllNested { .. }));
            prop_assert!(is_ill_nested);
        }
    }
}
