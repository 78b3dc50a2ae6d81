use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wasmite::model::GlobalType;
use wasmite::runtime::Global;
use wasmite::{
    Caller, ExternModule, FuncType, HostFunc, Instance, LinkError, Linker, LinkerConfig, Module,
    Trap, ValType, Value,
};

fn load(src: &str) -> Arc<Module> {
    let bytes = wat::parse_str(src).expect("valid wat");
    Arc::new(wasmite::parse(&bytes).expect("decodes"))
}

const IMPORTS_ADD: &str = r#"
(module
  (import "env" "add" (func $add (param i32 i32) (result i32)))
  (func (export "add_twice") (param i32) (result i32)
    (call $add (call $add (local.get 0) (local.get 0)) (local.get 0))))
"#;

#[test]
fn imported_function_is_callable_like_a_local_one() {
    let mut linker = Linker::default();
    linker
        .define_func("env", "add", |_: Caller<'_>, a: i32, b: i32| a.wrapping_add(b))
        .unwrap();
    let mut inst = linker.instantiate(load(IMPORTS_ADD)).unwrap();
    assert_eq!(
        inst.call_exported_func("add_twice", &[Value::I32(5)]),
        Ok(vec![Value::I32(15)])
    );
    // Imports come first in the function index space.
    assert_eq!(
        inst.call_func(0, &[Value::I32(2), Value::I32(3)]),
        Ok(vec![Value::I32(5)])
    );
}

#[test]
fn signature_must_match_exactly() {
    let mut linker = Linker::default();
    linker
        .define_func("env", "add", |_: Caller<'_>, a: i32, b: i32| i64::from(a) + i64::from(b))
        .unwrap();
    match linker.instantiate(load(IMPORTS_ADD)) {
        Err(LinkError::SignatureMismatch { module, name, expected, found }) => {
            assert_eq!((module.as_str(), name.as_str()), ("env", "add"));
            assert_eq!(expected.results, vec![ValType::I32]);
            assert_eq!(found.results, vec![ValType::I64]);
        }
        other => panic!("expected signature mismatch, got {other:?}"),
    }
}

#[test]
fn unresolved_imports_name_module_and_export() {
    let linker = Linker::default();
    assert!(matches!(
        linker.instantiate(load(IMPORTS_ADD)),
        Err(LinkError::UnresolvedModule { module }) if module == "env"
    ));

    let mut linker = Linker::default();
    linker.define_func("env", "sub", |_: Caller<'_>| {}).unwrap();
    assert!(matches!(
        linker.instantiate(load(IMPORTS_ADD)),
        Err(LinkError::UnresolvedExport { name, .. }) if name == "add"
    ));
}

#[test]
fn kind_mismatch_is_reported() {
    let mut env = ExternModule::new();
    env.insert("add", Global::new(GlobalType::new(ValType::I32, false), Value::I32(0)));
    let resolver: HashMap<String, ExternModule> = [("env".to_string(), env)].into();
    assert!(matches!(
        Instance::new(load(IMPORTS_ADD), &resolver),
        Err(LinkError::KindMismatch { .. })
    ));
}

#[test]
fn mutable_global_import_always_fails() {
    let zero = |ty: ValType| Value::from_bits(ty, 0);
    for (ty, name) in [
        (ValType::I32, "i32"),
        (ValType::I64, "i64"),
        (ValType::F32, "f32"),
        (ValType::F64, "f64"),
    ] {
        // (exported mutability, import declaration)
        let cases = [
            (true, format!("(mut {name})")),
            (false, format!("(mut {name})")),
            (true, name.to_string()),
        ];
        for (exported_mut, decl) in cases {
            let mut env = ExternModule::new();
            env.insert("g", Global::new(GlobalType::new(ty, exported_mut), zero(ty)));
            let resolver: HashMap<String, ExternModule> = [("env".to_string(), env)].into();
            let module = load(&format!(r#"(module (import "env" "g" (global {decl})))"#));
            assert!(
                matches!(
                    Instance::new(module, &resolver),
                    Err(LinkError::MutableGlobalImport { .. })
                ),
                "{decl} imported from a global with mutable = {exported_mut}"
            );
        }
    }
}

#[test]
fn immutable_global_import_feeds_initializers() {
    let mut env = ExternModule::new();
    env.insert("base", Global::new(GlobalType::new(ValType::I32, false), Value::I32(16)));
    let resolver: HashMap<String, ExternModule> = [("env".to_string(), env)].into();
    let module = load(
        r#"
        (module
          (import "env" "base" (global $base i32))
          (global $copy (export "copy") i32 (global.get $base))
          (memory 1)
          (data (global.get $base) "\2a")
          (func (export "at_base") (result i32) (i32.load8_u (global.get $base))))
        "#,
    );
    let mut inst = Instance::new(module, &resolver).unwrap();
    assert_eq!(inst.exported_global("copy"), Some(Value::I32(16)));
    assert_eq!(inst.call_exported_func("at_base", &[]), Ok(vec![Value::I32(42)]));
}

#[test]
fn host_writes_guest_memory() {
    let mut linker = Linker::default();
    linker
        .define_func("env", "fill", |mut caller: Caller<'_>, ptr: u32, len: u32| {
            let mem = caller.memory_mut().expect("guest memory");
            for (i, b) in mem[ptr as usize..(ptr + len) as usize].iter_mut().enumerate() {
                *b = 0xA0 + i as u8;
            }
        })
        .unwrap();
    let mut inst = linker
        .instantiate(load(
            r#"
            (module
              (import "env" "fill" (func $fill (param i32 i32)))
              (memory 1)
              (func (export "run") (result i32)
                (call $fill (i32.const 16) (i32.const 4))
                (i32.load8_u (i32.const 18))))
            "#,
        ))
        .unwrap();
    assert_eq!(inst.call_exported_func("run", &[]), Ok(vec![Value::I32(0xA2)]));
    assert_eq!(&inst.memory().unwrap()[16..20], &[0xA0, 0xA1, 0xA2, 0xA3]);
}

#[test]
fn host_errors_and_bad_results_become_traps() {
    let mut linker = Linker::default();
    linker
        .define_host_func(
            "env",
            "fail",
            HostFunc::new(FuncType::new([], [ValType::I32]), |_, _| {
                Err(Trap::Host("refused".into()))
            }),
        )
        .unwrap()
        .define_host_func(
            "env",
            "liar",
            HostFunc::new(FuncType::new([], [ValType::I32]), |_, _| Ok(vec![Value::I64(1)])),
        )
        .unwrap();
    let mut inst = linker
        .instantiate(load(
            r#"
            (module
              (import "env" "fail" (func $fail (result i32)))
              (import "env" "liar" (func $liar (result i32)))
              (func (export "fail") (result i32) (call $fail))
              (func (export "liar") (result i32) (call $liar)))
            "#,
        ))
        .unwrap();
    assert_eq!(
        inst.call_exported_func("fail", &[]),
        Err(Trap::Host("refused".into()))
    );
    assert!(matches!(
        inst.call_exported_func("liar", &[]),
        Err(Trap::HostResultMismatch { .. })
    ));
}

#[test]
fn shadowing_can_be_disabled() {
    let mut linker = Linker::new(LinkerConfig::default().with_shadowing_disabled(true));
    linker.define_func("env", "f", |_: Caller<'_>| 1i32).unwrap();
    assert!(matches!(
        linker.define_func("env", "f", |_: Caller<'_>| 2i32),
        Err(LinkError::DuplicateDefinition { .. })
    ));

    let calls = Arc::new(AtomicU32::new(0));
    let mut linker = Linker::default();
    linker.define_func("env", "add", |_: Caller<'_>, _: i32, _: i32| 0i32).unwrap();
    let seen = Arc::clone(&calls);
    linker
        .define_func("env", "add", move |_: Caller<'_>, a: i32, b: i32| {
            seen.fetch_add(1, Ordering::Relaxed);
            a + b
        })
        .unwrap();
    let mut inst = linker.instantiate(load(IMPORTS_ADD)).unwrap();
    assert_eq!(
        inst.call_exported_func("add_twice", &[Value::I32(1)]),
        Ok(vec![Value::I32(3)])
    );
    assert_eq!(calls.load(Ordering::Relaxed), 2);
}

#[test]
fn instance_exports_link_into_another_module() {
    let mut linker = Linker::default();
    let lib = linker
        .instantiate(load(
            r#"
            (module
              (global (export "scale") i32 (i32.const 3))
              (func (export "triple") (param i32) (result i32)
                (i32.mul (local.get 0) (i32.const 3))))
            "#,
        ))
        .unwrap();
    linker.define_instance("lib", &lib).unwrap();
    let mut app = linker
        .instantiate(load(
            r#"
            (module
              (import "lib" "triple" (func $triple (param i32) (result i32)))
              (import "lib" "scale" (global $scale i32))
              (func (export "run") (param i32) (result i32)
                (i32.add (call $triple (local.get 0)) (global.get $scale))))
            "#,
        ))
        .unwrap();
    assert_eq!(
        app.call_exported_func("run", &[Value::I32(5)]),
        Ok(vec![Value::I32(18)])
    );
}

#[test]
fn linked_modules_agree_on_random_inputs() {
    let mut linker = Linker::default();
    linker
        .define_func("env", "add", |_: Caller<'_>, a: i32, b: i32| a.wrapping_add(b))
        .unwrap();
    let mut inst = linker.instantiate(load(IMPORTS_ADD)).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..100 {
        let x: i32 = rng.gen();
        assert_eq!(
            inst.call_exported_func("add_twice", &[Value::I32(x)]),
            Ok(vec![Value::I32(x.wrapping_mul(3))])
        );
    }
}
