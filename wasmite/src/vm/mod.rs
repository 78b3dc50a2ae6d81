//! Execution engine: block analysis, operand stack, call frames and the interpreter loop.

pub mod blocks;
pub mod frames;
pub mod instructions;
pub mod interpreter;
pub mod numeric;
pub mod stack;

pub use blocks::{analyze_blocks, Block, BlockError, BlockKind, BlockMap, BlockType};
pub use stack::OperandStack;
