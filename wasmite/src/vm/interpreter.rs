//! Fetch-decode-execute loop. Calls between WASM functions push onto an explicit frame stack
//! instead of recursing; host functions run in place without a frame. Control instructions
//! resolve their targets through the per-function block map.

use std::sync::Arc;

use super::blocks::BlockKind;
use super::frames::{Frame, Label};
use super::instructions::op;
use super::numeric;
use super::stack::OperandStack;
use crate::config::EngineConfig;
use crate::error::Trap;
use crate::host::{Caller, HostFunc};
use crate::model::Value;
use crate::runtime::{FuncEntry, IndexSpace, Memory, WasmFunc};

/// What the loop does after one instruction.
enum Flow {
    Next,
    Return,
    Call(u32),
}

const F32_SIGN: u64 = 0x8000_0000;
const F64_SIGN: u64 = 1 << 63;

macro_rules! unop {
    ($s:expr, $pop:ident, $push:ident, |$a:ident| $e:expr) => {{
        let $a = $s.$pop()?;
        $s.$push($e)?;
    }};
}

macro_rules! binop {
    ($s:expr, $pop:ident, $push:ident, |$a:ident, $b:ident| $e:expr) => {{
        let $b = $s.$pop()?;
        let $a = $s.$pop()?;
        $s.$push($e)?;
    }};
}

/// Borrowed view of one instance's execution state for the duration of a call.
pub(crate) struct Machine<'a> {
    pub space: &'a mut IndexSpace,
    pub stack: &'a mut OperandStack,
    pub config: &'a EngineConfig,
    pub fuel: &'a mut Option<u64>,
}

impl Machine<'_> {
    /// Call function `index`. Arguments must already be on the operand stack; results are left
    /// there in their place.
    pub fn invoke(&mut self, index: u32) -> Result<(), Trap> {
        match self.func(index)? {
            FuncEntry::Host(h) => self.call_host(&h),
            FuncEntry::Wasm(f) => self.run(f),
        }
    }

    fn func(&self, index: u32) -> Result<FuncEntry, Trap> {
        self.space
            .funcs
            .get(index as usize)
            .cloned()
            .ok_or(Trap::FunctionIndexOutOfRange {
                index,
                len: self.space.funcs.len(),
            })
    }

    fn enter(&mut self, func: Arc<WasmFunc>) -> Result<Frame, Trap> {
        let mut locals = self.stack.pop_n(func.ty.params.len())?;
        let total = locals.len() as u64 + func.num_locals;
        if total > self.config.max_stack_height as u64 {
            return Err(Trap::StackOverflow);
        }
        locals.resize(total as usize, 0);
        Ok(Frame::new(func, locals, self.stack.len()))
    }

    fn call_host(&mut self, h: &HostFunc) -> Result<(), Trap> {
        let ty = h.ty();
        let raw = self.stack.pop_n(ty.params.len())?;
        let args: Vec<Value> = ty
            .params
            .iter()
            .zip(raw)
            .map(|(&t, bits)| Value::from_bits(t, bits))
            .collect();
        log::trace!("host call {ty} with {args:?}");
        let caller = Caller::new(self.space.memories.first_mut(), &self.space.globals);
        for v in h.call(caller, &args)? {
            self.stack.push(v.to_bits())?;
        }
        Ok(())
    }

    fn consume_fuel(&mut self) -> Result<(), Trap> {
        if let Some(fuel) = self.fuel.as_mut() {
            *fuel = fuel.checked_sub(1).ok_or(Trap::OutOfFuel)?;
        }
        Ok(())
    }

    fn memory(&self) -> Result<&Memory, Trap> {
        self.space.memories.first().ok_or(Trap::MissingMemory)
    }

    fn memory_mut(&mut self) -> Result<&mut Memory, Trap> {
        self.space.memories.first_mut().ok_or(Trap::MissingMemory)
    }

    fn run(&mut self, entry: Arc<WasmFunc>) -> Result<(), Trap> {
        let mut frames: Vec<Frame> = Vec::new();
        let mut frame = self.enter(entry)?;
        loop {
            self.consume_fuel()?;
            match self.step(&mut frame)? {
                Flow::Next => {}
                Flow::Return => {
                    self.stack.unwind(frame.base, frame.func.ty.results.len())?;
                    match frames.pop() {
                        Some(caller) => frame = caller,
                        None => return Ok(()),
                    }
                }
                Flow::Call(index) => match self.func(index)? {
                    FuncEntry::Host(h) => self.call_host(&h)?,
                    FuncEntry::Wasm(f) => {
                        if frames.len() + 2 > self.config.max_call_depth {
                            return Err(Trap::CallStackExhausted);
                        }
                        log::trace!("call {index}");
                        let callee = self.enter(f)?;
                        frames.push(std::mem::replace(&mut frame, callee));
                    }
                },
            }
        }
    }

    /// Unwind to the label `depth` levels out and continue there. One past the outermost
    /// label returns from the function.
    fn branch(&mut self, frame: &mut Frame, depth: u32) -> Result<Flow, Trap> {
        let depth = depth as usize;
        let n = frame.labels.len();
        if depth >= n {
            return if depth == n {
                Ok(Flow::Return)
            } else {
                Err(Trap::Malformed { offset: frame.pc })
            };
        }
        let label = frame.labels[n - 1 - depth];
        self.stack.unwind(label.height, label.arity)?;
        frame.labels.truncate(n - 1 - depth);
        frame.pc = label.continuation;
        Ok(Flow::Next)
    }

    fn step(&mut self, frame: &mut Frame) -> Result<Flow, Trap> {
        let at = frame.pc;
        let opcode = frame.read_u8()?;
        match opcode {
            op::UNREACHABLE => return Err(Trap::Unreachable),
            op::NOP => {}
            op::BLOCK | op::LOOP | op::IF => {
                let block = *frame
                    .func
                    .blocks
                    .get(&at)
                    .ok_or(Trap::Malformed { offset: at })?;
                frame.pc = at + 1 + block.immediate_len;
                let cond = if opcode == op::IF {
                    Some(self.stack.pop_i32()? != 0)
                } else {
                    None
                };
                let height = self
                    .stack
                    .len()
                    .checked_sub(block.param_arity)
                    .ok_or(Trap::StackUnderflow)?;
                frame.labels.push(match block.kind {
                    BlockKind::Loop => Label {
                        arity: block.param_arity,
                        continuation: at,
                        height,
                    },
                    BlockKind::Block | BlockKind::If => Label {
                        arity: block.result_arity,
                        continuation: block.end_at + 1,
                        height,
                    },
                });
                if cond == Some(false) {
                    // Without an else arm, land on `end` so the label is popped there.
                    frame.pc = block.else_at.map_or(block.end_at, |e| e + 1);
                }
            }
            // Reached only by falling out of a then-arm.
            op::ELSE => return self.branch(frame, 0),
            op::END => {
                if frame.labels.pop().is_none() {
                    return Ok(Flow::Return);
                }
            }
            op::BR => {
                let depth = frame.read_uleb_u32()?;
                return self.branch(frame, depth);
            }
            op::BR_IF => {
                let depth = frame.read_uleb_u32()?;
                if self.stack.pop_i32()? != 0 {
                    return self.branch(frame, depth);
                }
            }
            op::BR_TABLE => {
                let count = frame.read_uleb_u32()?;
                let index = self.stack.pop_u32()?;
                let mut target = None;
                for k in 0..count {
                    let depth = frame.read_uleb_u32()?;
                    if k == index {
                        target = Some(depth);
                    }
                }
                let default = frame.read_uleb_u32()?;
                return self.branch(frame, target.unwrap_or(default));
            }
            op::RETURN => return Ok(Flow::Return),
            op::CALL => return Ok(Flow::Call(frame.read_uleb_u32()?)),
            op::CALL_INDIRECT => {
                let type_idx = frame.read_uleb_u32()?;
                let table_idx = frame.read_u8()?;
                let elem = self.stack.pop_u32()?;
                let table = self
                    .space
                    .tables
                    .get(table_idx as usize)
                    .ok_or(Trap::TableIndexOutOfRange(u32::from(table_idx)))?;
                let func_idx = table.get(elem)?;
                let expected = frame
                    .func
                    .types
                    .get(type_idx as usize)
                    .ok_or(Trap::TypeIndexOutOfRange(type_idx))?;
                let callee = self.func(func_idx)?;
                if callee.ty() != expected {
                    return Err(Trap::IndirectCallTypeMismatch {
                        expected: expected.clone(),
                        found: callee.ty().clone(),
                    });
                }
                return Ok(Flow::Call(func_idx));
            }

            op::DROP => {
                self.stack.pop()?;
            }
            op::SELECT => {
                let c = self.stack.pop_i32()?;
                let b = self.stack.pop()?;
                let a = self.stack.pop()?;
                self.stack.push(if c != 0 { a } else { b })?;
            }

            op::LOCAL_GET => {
                let idx = frame.read_uleb_u32()?;
                let v = frame.local(idx)?;
                self.stack.push(v)?;
            }
            op::LOCAL_SET => {
                let idx = frame.read_uleb_u32()?;
                let v = self.stack.pop()?;
                *frame.local_mut(idx)? = v;
            }
            op::LOCAL_TEE => {
                let idx = frame.read_uleb_u32()?;
                let v = self.stack.peek()?;
                *frame.local_mut(idx)? = v;
            }
            op::GLOBAL_GET => {
                let idx = frame.read_uleb_u32()?;
                let g = self
                    .space
                    .globals
                    .get(idx as usize)
                    .ok_or(Trap::GlobalIndexOutOfRange(idx))?;
                let bits = g.bits();
                self.stack.push(bits)?;
            }
            op::GLOBAL_SET => {
                let idx = frame.read_uleb_u32()?;
                let v = self.stack.pop()?;
                let g = self
                    .space
                    .globals
                    .get_mut(idx as usize)
                    .ok_or(Trap::GlobalIndexOutOfRange(idx))?;
                if !g.ty().mutable {
                    return Err(Trap::ImmutableGlobal(idx));
                }
                g.set_bits(v);
            }

            op::I32_LOAD..=op::I64_LOAD32_U => self.load(frame, opcode)?,
            op::I32_STORE..=op::I64_STORE32 => self.store(frame, opcode)?,
            op::MEMORY_SIZE => {
                frame.read_uleb_u32()?;
                let pages = self.memory()?.size_pages();
                self.stack.push(u64::from(pages))?;
            }
            op::MEMORY_GROW => {
                frame.read_uleb_u32()?;
                let delta = self.stack.pop_u32()?;
                let prev = self.memory_mut()?.grow(delta).map_or(-1, |p| p as i32);
                self.stack.push_i32(prev)?;
            }

            op::I32_CONST => {
                let v = frame.read_sleb_i32()?;
                self.stack.push_i32(v)?;
            }
            op::I64_CONST => {
                let v = frame.read_sleb_i64()?;
                self.stack.push_i64(v)?;
            }
            op::F32_CONST => {
                let bits = frame.read_u32_le()?;
                self.stack.push(u64::from(bits))?;
            }
            op::F64_CONST => {
                let bits = frame.read_u64_le()?;
                self.stack.push(bits)?;
            }

            _ => self.numeric(opcode, at)?,
        }
        Ok(Flow::Next)
    }

    fn load(&mut self, frame: &mut Frame, opcode: u8) -> Result<(), Trap> {
        let offset = frame.read_memarg()?;
        let addr = self.stack.pop_u32()?;
        let mem = self.memory()?;
        let v: u64 = match opcode {
            op::I32_LOAD | op::F32_LOAD => u64::from(mem.load_u32(addr, offset)?),
            op::I64_LOAD | op::F64_LOAD => mem.load_u64(addr, offset)?,
            op::I32_LOAD8_S => u64::from(mem.load_u8(addr, offset)? as i8 as i32 as u32),
            op::I32_LOAD8_U | op::I64_LOAD8_U => u64::from(mem.load_u8(addr, offset)?),
            op::I32_LOAD16_S => u64::from(mem.load_u16(addr, offset)? as i16 as i32 as u32),
            op::I32_LOAD16_U | op::I64_LOAD16_U => u64::from(mem.load_u16(addr, offset)?),
            op::I64_LOAD8_S => mem.load_u8(addr, offset)? as i8 as i64 as u64,
            op::I64_LOAD16_S => mem.load_u16(addr, offset)? as i16 as i64 as u64,
            op::I64_LOAD32_S => mem.load_u32(addr, offset)? as i32 as i64 as u64,
            op::I64_LOAD32_U => u64::from(mem.load_u32(addr, offset)?),
            _ => return Err(Trap::IllegalOpcode { opcode, offset: frame.pc }),
        };
        self.stack.push(v)
    }

    fn store(&mut self, frame: &mut Frame, opcode: u8) -> Result<(), Trap> {
        let offset = frame.read_memarg()?;
        let v = self.stack.pop()?;
        let addr = self.stack.pop_u32()?;
        let mem = self.memory_mut()?;
        match opcode {
            op::I32_STORE | op::F32_STORE | op::I64_STORE32 => mem.store_u32(addr, offset, v as u32),
            op::I64_STORE | op::F64_STORE => mem.store_u64(addr, offset, v),
            op::I32_STORE8 | op::I64_STORE8 => mem.store_u8(addr, offset, v as u8),
            op::I32_STORE16 | op::I64_STORE16 => mem.store_u16(addr, offset, v as u16),
            _ => Err(Trap::IllegalOpcode { opcode, offset: frame.pc }),
        }
    }

    fn numeric(&mut self, opcode: u8, at: usize) -> Result<(), Trap> {
        let s = &mut *self.stack;
        match opcode {
            op::I32_EQZ => unop!(s, pop_i32, push_bool, |a| a == 0),
            op::I32_EQ => binop!(s, pop_i32, push_bool, |a, b| a == b),
            op::I32_NE => binop!(s, pop_i32, push_bool, |a, b| a != b),
            op::I32_LT_S => binop!(s, pop_i32, push_bool, |a, b| a < b),
            op::I32_LT_U => binop!(s, pop_u32, push_bool, |a, b| a < b),
            op::I32_GT_S => binop!(s, pop_i32, push_bool, |a, b| a > b),
            op::I32_GT_U => binop!(s, pop_u32, push_bool, |a, b| a > b),
            op::I32_LE_S => binop!(s, pop_i32, push_bool, |a, b| a <= b),
            op::I32_LE_U => binop!(s, pop_u32, push_bool, |a, b| a <= b),
            op::I32_GE_S => binop!(s, pop_i32, push_bool, |a, b| a >= b),
            op::I32_GE_U => binop!(s, pop_u32, push_bool, |a, b| a >= b),

            op::I64_EQZ => unop!(s, pop, push_bool, |a| a == 0),
            op::I64_EQ => binop!(s, pop, push_bool, |a, b| a == b),
            op::I64_NE => binop!(s, pop, push_bool, |a, b| a != b),
            op::I64_LT_S => binop!(s, pop_i64, push_bool, |a, b| a < b),
            op::I64_LT_U => binop!(s, pop, push_bool, |a, b| a < b),
            op::I64_GT_S => binop!(s, pop_i64, push_bool, |a, b| a > b),
            op::I64_GT_U => binop!(s, pop, push_bool, |a, b| a > b),
            op::I64_LE_S => binop!(s, pop_i64, push_bool, |a, b| a <= b),
            op::I64_LE_U => binop!(s, pop, push_bool, |a, b| a <= b),
            op::I64_GE_S => binop!(s, pop_i64, push_bool, |a, b| a >= b),
            op::I64_GE_U => binop!(s, pop, push_bool, |a, b| a >= b),

            op::F32_EQ => binop!(s, pop_f32, push_bool, |a, b| a == b),
            op::F32_NE => binop!(s, pop_f32, push_bool, |a, b| a != b),
            op::F32_LT => binop!(s, pop_f32, push_bool, |a, b| a < b),
            op::F32_GT => binop!(s, pop_f32, push_bool, |a, b| a > b),
            op::F32_LE => binop!(s, pop_f32, push_bool, |a, b| a <= b),
            op::F32_GE => binop!(s, pop_f32, push_bool, |a, b| a >= b),

            op::F64_EQ => binop!(s, pop_f64, push_bool, |a, b| a == b),
            op::F64_NE => binop!(s, pop_f64, push_bool, |a, b| a != b),
            op::F64_LT => binop!(s, pop_f64, push_bool, |a, b| a < b),
            op::F64_GT => binop!(s, pop_f64, push_bool, |a, b| a > b),
            op::F64_LE => binop!(s, pop_f64, push_bool, |a, b| a <= b),
            op::F64_GE => binop!(s, pop_f64, push_bool, |a, b| a >= b),

            op::I32_CLZ => unop!(s, pop_u32, push_i32, |a| a.leading_zeros() as i32),
            op::I32_CTZ => unop!(s, pop_u32, push_i32, |a| a.trailing_zeros() as i32),
            op::I32_POPCNT => unop!(s, pop_u32, push_i32, |a| a.count_ones() as i32),
            op::I32_ADD => binop!(s, pop_i32, push_i32, |a, b| a.wrapping_add(b)),
            op::I32_SUB => binop!(s, pop_i32, push_i32, |a, b| a.wrapping_sub(b)),
            op::I32_MUL => binop!(s, pop_i32, push_i32, |a, b| a.wrapping_mul(b)),
            op::I32_DIV_S => binop!(s, pop_i32, push_i32, |a, b| numeric::i32_div_s(a, b)?),
            op::I32_DIV_U => binop!(s, pop_u32, push_i32, |a, b| numeric::i32_div_u(a, b)? as i32),
            op::I32_REM_S => binop!(s, pop_i32, push_i32, |a, b| numeric::i32_rem_s(a, b)?),
            op::I32_REM_U => binop!(s, pop_u32, push_i32, |a, b| numeric::i32_rem_u(a, b)? as i32),
            op::I32_AND => binop!(s, pop_i32, push_i32, |a, b| a & b),
            op::I32_OR => binop!(s, pop_i32, push_i32, |a, b| a | b),
            op::I32_XOR => binop!(s, pop_i32, push_i32, |a, b| a ^ b),
            op::I32_SHL => binop!(s, pop_u32, push_i32, |a, b| a.wrapping_shl(b) as i32),
            op::I32_SHR_S => binop!(s, pop_i32, push_i32, |a, b| a.wrapping_shr(b as u32)),
            op::I32_SHR_U => binop!(s, pop_u32, push_i32, |a, b| a.wrapping_shr(b) as i32),
            op::I32_ROTL => binop!(s, pop_u32, push_i32, |a, b| a.rotate_left(b) as i32),
            op::I32_ROTR => binop!(s, pop_u32, push_i32, |a, b| a.rotate_right(b) as i32),

            op::I64_CLZ => unop!(s, pop, push, |a| u64::from(a.leading_zeros())),
            op::I64_CTZ => unop!(s, pop, push, |a| u64::from(a.trailing_zeros())),
            op::I64_POPCNT => unop!(s, pop, push, |a| u64::from(a.count_ones())),
            op::I64_ADD => binop!(s, pop, push, |a, b| a.wrapping_add(b)),
            op::I64_SUB => binop!(s, pop, push, |a, b| a.wrapping_sub(b)),
            op::I64_MUL => binop!(s, pop, push, |a, b| a.wrapping_mul(b)),
            op::I64_DIV_S => binop!(s, pop_i64, push_i64, |a, b| numeric::i64_div_s(a, b)?),
            op::I64_DIV_U => binop!(s, pop, push, |a, b| numeric::i64_div_u(a, b)?),
            op::I64_REM_S => binop!(s, pop_i64, push_i64, |a, b| numeric::i64_rem_s(a, b)?),
            op::I64_REM_U => binop!(s, pop, push, |a, b| numeric::i64_rem_u(a, b)?),
            op::I64_AND => binop!(s, pop, push, |a, b| a & b),
            op::I64_OR => binop!(s, pop, push, |a, b| a | b),
            op::I64_XOR => binop!(s, pop, push, |a, b| a ^ b),
            op::I64_SHL => binop!(s, pop, push, |a, b| a.wrapping_shl(b as u32)),
            op::I64_SHR_S => binop!(s, pop_i64, push_i64, |a, b| a.wrapping_shr(b as u32)),
            op::I64_SHR_U => binop!(s, pop, push, |a, b| a.wrapping_shr(b as u32)),
            op::I64_ROTL => binop!(s, pop, push, |a, b| a.rotate_left((b % 64) as u32)),
            op::I64_ROTR => binop!(s, pop, push, |a, b| a.rotate_right((b % 64) as u32)),

            op::F32_ABS => unop!(s, pop, push, |a| a & (F32_SIGN - 1)),
            op::F32_NEG => unop!(s, pop, push, |a| a ^ F32_SIGN),
            op::F32_CEIL => unop!(s, pop_f32, push_f32, |a| a.ceil()),
            op::F32_FLOOR => unop!(s, pop_f32, push_f32, |a| a.floor()),
            op::F32_TRUNC => unop!(s, pop_f32, push_f32, |a| a.trunc()),
            op::F32_NEAREST => unop!(s, pop_f32, push_f32, |a| numeric::f32_nearest(a)),
            op::F32_SQRT => unop!(s, pop_f32, push_f32, |a| a.sqrt()),
            op::F32_ADD => binop!(s, pop_f32, push_f32, |a, b| a + b),
            op::F32_SUB => binop!(s, pop_f32, push_f32, |a, b| a - b),
            op::F32_MUL => binop!(s, pop_f32, push_f32, |a, b| a * b),
            op::F32_DIV => binop!(s, pop_f32, push_f32, |a, b| a / b),
            op::F32_MIN => binop!(s, pop_f32, push_f32, |a, b| numeric::f32_min(a, b)),
            op::F32_MAX => binop!(s, pop_f32, push_f32, |a, b| numeric::f32_max(a, b)),
            op::F32_COPYSIGN => {
                binop!(s, pop, push, |a, b| (a & (F32_SIGN - 1)) | (b & F32_SIGN))
            }

            op::F64_ABS => unop!(s, pop, push, |a| a & !F64_SIGN),
            op::F64_NEG => unop!(s, pop, push, |a| a ^ F64_SIGN),
            op::F64_CEIL => unop!(s, pop_f64, push_f64, |a| a.ceil()),
            op::F64_FLOOR => unop!(s, pop_f64, push_f64, |a| a.floor()),
            op::F64_TRUNC => unop!(s, pop_f64, push_f64, |a| a.trunc()),
            op::F64_NEAREST => unop!(s, pop_f64, push_f64, |a| numeric::f64_nearest(a)),
            op::F64_SQRT => unop!(s, pop_f64, push_f64, |a| a.sqrt()),
            op::F64_ADD => binop!(s, pop_f64, push_f64, |a, b| a + b),
            op::F64_SUB => binop!(s, pop_f64, push_f64, |a, b| a - b),
            op::F64_MUL => binop!(s, pop_f64, push_f64, |a, b| a * b),
            op::F64_DIV => binop!(s, pop_f64, push_f64, |a, b| a / b),
            op::F64_MIN => binop!(s, pop_f64, push_f64, |a, b| numeric::f64_min(a, b)),
            op::F64_MAX => binop!(s, pop_f64, push_f64, |a, b| numeric::f64_max(a, b)),
            op::F64_COPYSIGN => {
                binop!(s, pop, push, |a, b| (a & !F64_SIGN) | (b & F64_SIGN))
            }

            op::I32_WRAP_I64 => unop!(s, pop, push_i32, |a| a as i32),
            op::I32_TRUNC_F32_S => unop!(s, pop_f32, push_i32, |a| numeric::i32_trunc_s(f64::from(a))?),
            op::I32_TRUNC_F32_U => {
                unop!(s, pop_f32, push_i32, |a| numeric::i32_trunc_u(f64::from(a))? as i32)
            }
            op::I32_TRUNC_F64_S => unop!(s, pop_f64, push_i32, |a| numeric::i32_trunc_s(a)?),
            op::I32_TRUNC_F64_U => unop!(s, pop_f64, push_i32, |a| numeric::i32_trunc_u(a)? as i32),
            op::I64_EXTEND_I32_S => unop!(s, pop_i32, push_i64, |a| i64::from(a)),
            op::I64_EXTEND_I32_U => unop!(s, pop_u32, push, |a| u64::from(a)),
            op::I64_TRUNC_F32_S => unop!(s, pop_f32, push_i64, |a| numeric::i64_trunc_s(f64::from(a))?),
            op::I64_TRUNC_F32_U => unop!(s, pop_f32, push, |a| numeric::i64_trunc_u(f64::from(a))?),
            op::I64_TRUNC_F64_S => unop!(s, pop_f64, push_i64, |a| numeric::i64_trunc_s(a)?),
            op::I64_TRUNC_F64_U => unop!(s, pop_f64, push, |a| numeric::i64_trunc_u(a)?),
            op::F32_CONVERT_I32_S => unop!(s, pop_i32, push_f32, |a| a as f32),
            op::F32_CONVERT_I32_U => unop!(s, pop_u32, push_f32, |a| a as f32),
            op::F32_CONVERT_I64_S => unop!(s, pop_i64, push_f32, |a| a as f32),
            op::F32_CONVERT_I64_U => unop!(s, pop, push_f32, |a| a as f32),
            op::F32_DEMOTE_F64 => unop!(s, pop_f64, push_f32, |a| a as f32),
            op::F64_CONVERT_I32_S => unop!(s, pop_i32, push_f64, |a| f64::from(a)),
            op::F64_CONVERT_I32_U => unop!(s, pop_u32, push_f64, |a| f64::from(a)),
            op::F64_CONVERT_I64_S => unop!(s, pop_i64, push_f64, |a| a as f64),
            op::F64_CONVERT_I64_U => unop!(s, pop, push_f64, |a| a as f64),
            op::F64_PROMOTE_F32 => unop!(s, pop_f32, push_f64, |a| f64::from(a)),
            // Same bit pattern on the untyped stack.
            op::I32_REINTERPRET_F32
            | op::I64_REINTERPRET_F64
            | op::F32_REINTERPRET_I32
            | op::F64_REINTERPRET_I64 => {
                s.peek()?;
            }

            _ => return Err(Trap::IllegalOpcode { opcode, offset: at }),
        }
        Ok(())
    }
}
