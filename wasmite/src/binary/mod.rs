//! Binary decoding layer: byte cursor, LEB128 codec, vector/name readers and section decoders.
//! Errors are reported with `BinaryReadError`, which always carries the byte offset at fault;
//! `crate::error::ParseError` wraps it for the public API.

pub mod cursor;
pub mod leb128;
pub mod reader;
pub mod sections;

use thiserror::Error;

/// Result alias for binary reading operations.
pub type Result<T> = core::result::Result<T, BinaryReadError>;

/// Errors that can occur while reading a WASM binary stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinaryReadError {
    #[error("unexpected EOF at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("LEB128 overflow (target bits={target_bits}) at offset {offset}")]
    Leb128Overflow { target_bits: u8, offset: usize },

    #[error("too many bytes in LEB128 (limit={limit}) at offset {offset}")]
    Leb128TooManyBytes { limit: u8, offset: usize },

    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("invalid type byte {byte:#04x} at offset {offset}: {expected}")]
    InvalidTypeByte {
        byte: u8,
        offset: usize,
        expected: &'static str,
    },

    #[error("invalid opcode {opcode:#04x} for constant expression at offset {offset}")]
    InvalidExprOpcode { opcode: u8, offset: usize },

    #[error("constant expression has not terminated at offset {offset}")]
    ExprNotTerminated { offset: usize },

    #[error("malformed binary at offset {offset}: {msg}")]
    Malformed { offset: usize, msg: &'static str },
}
