//! Crate-level error types: decoding, linking and execution.

use thiserror::Error;

use crate::model::{ExternKind, FuncType, ValType};
use crate::vm::blocks::BlockError;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Binary(#[from] crate::binary::BinaryReadError),

    #[error("failed to read module bytes")]
    Io(#[from] std::io::Error),

    #[error("duplicate export name {0:?}")]
    DuplicateExport(String),

    #[error("function section declares {functions} functions but code section has {codes} bodies")]
    FunctionCodeMismatch { functions: usize, codes: usize },
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("unresolved import module {module:?}")]
    UnresolvedModule { module: String },

    #[error("module {module:?} has no export named {name:?}")]
    UnresolvedExport { module: String, name: String },

    #[error("import {module}.{name}: expected {expected}, found {found}")]
    KindMismatch {
        module: String,
        name: String,
        expected: ExternKind,
        found: ExternKind,
    },

    #[error("import {module}.{name}: signature mismatch, expected {expected}, found {found}")]
    SignatureMismatch {
        module: String,
        name: String,
        expected: FuncType,
        found: FuncType,
    },

    #[error("import {module}.{name}: mutable globals cannot be imported")]
    MutableGlobalImport { module: String, name: String },

    #[error("{space} index {index} out of range (len {len})")]
    IndexOutOfRange {
        space: &'static str,
        index: u32,
        len: usize,
    },

    #[error("{context} offset must be i32, found {found}")]
    OffsetNotI32 {
        context: &'static str,
        found: ValType,
    },

    #[error("{context} needs {required} {unit} but maximum is {max}")]
    SizeExceedsMaximum {
        context: &'static str,
        unit: &'static str,
        required: u64,
        max: u64,
    },

    #[error("at most one table is allowed, found {0}")]
    MultipleTables(usize),

    #[error("at most one memory is allowed, found {0}")]
    MultipleMemories(usize),

    #[error("type mismatch ({context}): expected {expected}, found {found}")]
    TypeMismatch {
        context: &'static str,
        expected: ValType,
        found: ValType,
    },

    #[error("function {func}: ill-nested block")]
    IllNestedBlock {
        func: u32,
        #[source]
        source: BlockError,
    },

    #[error("start function failed")]
    StartFunction(#[source] Trap),

    #[error("{module}.{name} is already defined")]
    DuplicateDefinition { module: String, name: String },

    #[error(transparent)]
    Binary(#[from] crate::binary::BinaryReadError),
}

/// A fatal runtime error. Ends the in-flight call; the instance stays usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Trap {
    #[error("unreachable executed")]
    Unreachable,

    #[error("integer divide by zero")]
    IntegerDivideByZero,

    #[error("integer overflow")]
    IntegerOverflow,

    #[error("invalid conversion to integer")]
    InvalidConversionToInteger,

    #[error("out of bounds memory access (addr {addr}, len {len})")]
    MemoryOutOfBounds { addr: u64, len: usize },

    #[error("undefined element {index}")]
    UndefinedElement { index: u32 },

    #[error("uninitialized element {index}")]
    UninitializedElement { index: u32 },

    #[error("indirect call type mismatch: expected {expected}, found {found}")]
    IndirectCallTypeMismatch { expected: FuncType, found: FuncType },

    #[error("function index {index} out of range (len {len})")]
    FunctionIndexOutOfRange { index: u32, len: usize },

    #[error("local index {0} out of range")]
    LocalIndexOutOfRange(u32),

    #[error("global index {0} out of range")]
    GlobalIndexOutOfRange(u32),

    #[error("type index {0} out of range")]
    TypeIndexOutOfRange(u32),

    #[error("table index {0} out of range")]
    TableIndexOutOfRange(u32),

    #[error("no memory present")]
    MissingMemory,

    #[error("global {0} is immutable")]
    ImmutableGlobal(u32),

    #[error("illegal opcode {opcode:#04x} at offset {offset}")]
    IllegalOpcode { opcode: u8, offset: usize },

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("operand stack exhausted")]
    StackOverflow,

    #[error("call stack exhausted")]
    CallStackExhausted,

    #[error("all fuel consumed")]
    OutOfFuel,

    #[error("export {0:?} not found")]
    ExportNotFound(String),

    #[error("export {0:?} is not a function")]
    NotAFunction(String),

    #[error("argument mismatch: expected {expected}, found {found:?}")]
    ArgumentMismatch {
        expected: FuncType,
        found: Vec<ValType>,
    },

    #[error("host function returned {found:?}, declared {expected}")]
    HostResultMismatch {
        expected: FuncType,
        found: Vec<ValType>,
    },

    #[error("host function error: {0}")]
    Host(String),

    #[error("malformed function body at offset {offset}")]
    Malformed { offset: usize },
}

impl From<crate::binary::BinaryReadError> for Trap {
    fn from(err: crate::binary::BinaryReadError) -> Self {
        use crate::binary::BinaryReadError as E;
        let offset = match err {
            E::UnexpectedEof { offset }
            | E::Leb128Overflow { offset, .. }
            | E::Leb128TooManyBytes { offset, .. }
            | E::InvalidUtf8 { offset }
            | E::InvalidTypeByte { offset, .. }
            | E::InvalidExprOpcode { offset, .. }
            | E::ExprNotTerminated { offset }
            | E::Malformed { offset, .. } => offset,
        };
        Trap::Malformed { offset }
    }
}
