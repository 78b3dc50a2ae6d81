//! Host functions and the trampoline that adapts typed Rust closures to the engine's uniform
//! calling convention.

use std::fmt;
use std::sync::Arc;

use crate::error::Trap;
use crate::model::{FuncType, ValType, Value};
use crate::runtime::{Global, Memory};

/// Uniform host calling convention: typed arguments in, typed results out.
pub type HostFn = dyn Fn(Caller<'_>, &[Value]) -> Result<Vec<Value>, Trap> + Send + Sync;

/// Access to the calling instance handed to a host function for the duration of one call.
/// It exposes memory and globals only; host code cannot call back into the engine.
pub struct Caller<'a> {
    memory: Option<&'a mut Memory>,
    globals: &'a [Global],
}

impl<'a> Caller<'a> {
    pub(crate) fn new(memory: Option<&'a mut Memory>, globals: &'a [Global]) -> Self {
        Self { memory, globals }
    }

    pub fn memory(&self) -> Option<&[u8]> {
        self.memory.as_deref().map(Memory::data)
    }

    /// The instance's linear memory as a raw byte slice.
    pub fn memory_mut(&mut self) -> Option<&mut [u8]> {
        self.memory.as_deref_mut().map(Memory::data_mut)
    }

    pub fn global(&self, index: u32) -> Option<Value> {
        self.globals.get(index as usize).map(Global::get)
    }
}

/// A host function: its signature and the closure implementing it.
#[derive(Clone)]
pub struct HostFunc {
    ty: FuncType,
    f: Arc<HostFn>,
}

impl HostFunc {
    pub fn new<F>(ty: FuncType, f: F) -> Self
    where
        F: Fn(Caller<'_>, &[Value]) -> Result<Vec<Value>, Trap> + Send + Sync + 'static,
    {
        Self { ty, f: Arc::new(f) }
    }

    pub fn ty(&self) -> &FuncType {
        &self.ty
    }

    /// Invoke with already-typed arguments and check the returned types.
    pub(crate) fn call(&self, caller: Caller<'_>, args: &[Value]) -> Result<Vec<Value>, Trap> {
        let results = (self.f)(caller, args)?;
        if !results.iter().map(Value::ty).eq(self.ty.results.iter().copied()) {
            return Err(Trap::HostResultMismatch {
                expected: self.ty.clone(),
                found: results.iter().map(Value::ty).collect(),
            });
        }
        Ok(results)
    }
}

impl fmt::Debug for HostFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunc").field("ty", &self.ty).finish()
    }
}

/// A Rust type that maps onto one WASM value type.
pub trait WasmTy: Copy + Send + Sync + 'static {
    const TYPE: ValType;
    fn from_value(v: Value) -> Option<Self>;
    fn into_value(self) -> Value;
}

macro_rules! wasm_ty {
    ($t:ty, $vt:ident, |$v:ident| $from:expr, |$s:ident| $into:expr) => {
        impl WasmTy for $t {
            const TYPE: ValType = ValType::$vt;
            fn from_value(v: Value) -> Option<Self> {
                match v {
                    Value::$vt($v) => Some($from),
                    _ => None,
                }
            }
            fn into_value(self) -> Value {
                let $s = self;
                Value::$vt($into)
            }
        }
    };
}

wasm_ty!(i32, I32, |v| v, |s| s);
wasm_ty!(u32, I32, |v| v as u32, |s| s as i32);
wasm_ty!(i64, I64, |v| v, |s| s);
wasm_ty!(u64, I64, |v| v as u64, |s| s as i64);
wasm_ty!(f32, F32, |v| f32::from_bits(v), |s| s.to_bits());
wasm_ty!(f64, F64, |v| f64::from_bits(v), |s| s.to_bits());

/// Return type of a typed host closure: `()` or a single [`WasmTy`].
pub trait HostResults {
    fn types() -> Vec<ValType>;
    fn into_values(self) -> Vec<Value>;
}

impl HostResults for () {
    fn types() -> Vec<ValType> {
        Vec::new()
    }
    fn into_values(self) -> Vec<Value> {
        Vec::new()
    }
}

macro_rules! host_results {
    ($($t:ty),*) => {$(
        impl HostResults for $t {
            fn types() -> Vec<ValType> {
                vec![<$t as WasmTy>::TYPE]
            }
            fn into_values(self) -> Vec<Value> {
                vec![self.into_value()]
            }
        }
    )*};
}

host_results!(i32, u32, i64, u64, f32, f64);

/// Closures convertible into a [`HostFunc`]; the signature is synthesized from the closure's
/// parameter and return types.
pub trait IntoHostFunc<Params, Results> {
    fn into_host_func(self) -> HostFunc;
}

macro_rules! into_host_func {
    ($($p:ident),*) => {
        impl<F, R, $($p,)*> IntoHostFunc<($($p,)*), R> for F
        where
            F: Fn(Caller<'_>, $($p),*) -> R + Send + Sync + 'static,
            R: HostResults,
            $($p: WasmTy,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_host_func(self) -> HostFunc {
                let params: Vec<ValType> = vec![$($p::TYPE),*];
                let ty = FuncType::new(params, R::types());
                HostFunc::new(ty, move |caller, args| {
                    let mut args = args.iter().copied();
                    $(
                        let $p = args
                            .next()
                            .and_then($p::from_value)
                            .ok_or_else(|| Trap::Host("argument type mismatch".into()))?;
                    )*
                    Ok(self(caller, $($p),*).into_values())
                })
            }
        }
    };
}

into_host_func!();
into_host_func!(A1);
into_host_func!(A1, A2);
into_host_func!(A1, A2, A3);
into_host_func!(A1, A2, A3, A4);

#[cfg(test)]
mod tests {
    use super::*;

    fn sig<P, R>(f: impl IntoHostFunc<P, R>) -> HostFunc {
        f.into_host_func()
    }

    #[test]
    fn signature_is_synthesized_from_closure_types() {
        let f = sig(|_: Caller<'_>, a: i32, b: i64| -> f64 { a as f64 + b as f64 });
        assert_eq!(
            f.ty(),
            &FuncType::new([ValType::I32, ValType::I64], [ValType::F64])
        );
        let g = sig(|_: Caller<'_>| {});
        assert_eq!(g.ty(), &FuncType::default());
    }

    #[test]
    fn trampoline_converts_arguments_and_results() {
        let f = sig(|_: Caller<'_>, a: u32, b: u32| a.wrapping_add(b));
        let out = f
            .call(Caller::new(None, &[]), &[Value::I32(-1), Value::I32(2)])
            .unwrap();
        assert_eq!(out, vec![Value::I32(1)]);
    }

    #[test]
    fn host_can_write_caller_memory() {
        use crate::model::{Limits, MemoryType};
        let mut mem = Memory::new(MemoryType {
            limits: Limits::new(1, None),
        });
        mem.ensure_min().unwrap();
        let f = sig(|mut caller: Caller<'_>, ptr: i32| {
            if let Some(m) = caller.memory_mut() {
                m[ptr as usize..ptr as usize + 2].copy_from_slice(b"ok");
            }
        });
        f.call(Caller::new(Some(&mut mem), &[]), &[Value::I32(4)]).unwrap();
        assert_eq!(&mem.data()[4..6], b"ok");
    }

    #[test]
    fn mistyped_results_are_rejected() {
        let f = HostFunc::new(FuncType::new([], [ValType::I32]), |_, _| Ok(vec![Value::I64(1)]));
        assert!(matches!(
            f.call(Caller::new(None, &[]), &[]),
            Err(Trap::HostResultMismatch { .. })
        ));
    }
}
