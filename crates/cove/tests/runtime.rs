//! End-to-end tests of decoding, linking, instantiation and the
//! sandboxed object graph over the null code generator.

use assert_matches::assert_matches;
use cove::{
    collect_garbage,
    core::{FuncType, GlobalType, MemoryType, Mutability, ValType, Value},
    instantiate,
    link,
    Compartment,
    Context,
    Engine,
    Extern,
    ExternType,
    Function,
    HostFunc,
    InstantiationError,
    NamespaceResolver,
    Resolver,
    StubBehavior,
    StubResolver,
    TrapKind,
};
use std::sync::Arc;

fn compile(engine: &Engine, wat: &str) -> cove::CompiledModule {
    let bytes = wat::parse_str(wat).expect("invalid test module");
    engine.load(&bytes).expect("module failed to load")
}

fn fresh() -> (Engine, Compartment, Context) {
    let engine = Engine::default();
    let compartment = Compartment::new().expect("cannot create compartment");
    let context = compartment.create_context().expect("cannot create context");
    (engine, compartment, context)
}

#[test]
fn active_data_segments_initialize_the_right_memory() {
    let (engine, compartment, context) = fresh();
    let module = compile(
        &engine,
        r#"
        (module
            (memory $a (export "a") 1)
            (memory $b (export "b") 1)
            (data (memory $b) (i32.const 4096) "\de\ad\be\ef\ca\fe\ba\be"))
        "#,
    );
    let instance =
        instantiate(&compartment, &context, &module, &[], "segments").expect("instantiation");

    // Memory 1 holds the segment bytes at 4096; an i64 load reads them
    // back in little-endian order.
    let memory_b = instance
        .export("b")
        .and_then(Extern::into_memory)
        .expect("exported memory");
    let mut bytes = [0u8; 8];
    memory_b.read(4096, &mut bytes).expect("in bounds");
    assert_eq!(bytes, [0xde, 0xad, 0xbe, 0xef, 0xca, 0xfe, 0xba, 0xbe]);
    assert_eq!(u64::from_le_bytes(bytes), 0xbeba_feca_efbe_adde);

    // Memory 0 is untouched.
    let memory_a = instance
        .export("a")
        .and_then(Extern::into_memory)
        .expect("exported memory");
    memory_a.read(4096, &mut bytes).expect("in bounds");
    assert_eq!(bytes, [0; 8]);
}

#[test]
fn memory_copy_writes_prefix_then_traps() {
    let (_, compartment, _) = fresh();
    let ty = MemoryType::new(1, Some(1), false).unwrap();
    let memory = compartment.create_memory(ty, "scenario").unwrap();

    // Seed src[0..4] with recognizable bytes.
    memory.write(0, &[0x11, 0x22, 0x33, 0x44]).unwrap();

    let error = memory.copy(&memory.clone(), 0xfffc, 0, 8).unwrap_err();
    assert_matches!(
        error.kind(),
        TrapKind::OutOfBoundsMemoryAccess { offset: 0x10004, .. }
    );

    // The in-range prefix was written from src[0..4].
    let mut bytes = [0u8; 4];
    memory.read(0xfffc, &mut bytes).unwrap();
    assert_eq!(bytes, [0x11, 0x22, 0x33, 0x44]);
}

#[test]
fn memory_grow_respects_the_declared_maximum() {
    let (_, compartment, _) = fresh();
    let ty = MemoryType::new(1, Some(2), false).unwrap();
    let memory = compartment.create_memory(ty, "grow").unwrap();

    assert_eq!(memory.grow(0).unwrap(), 1);
    assert_eq!(memory.grow(1).unwrap(), 1);
    assert!(memory.grow(1).is_err());
    // The failed growth changed nothing.
    assert_eq!(memory.size(), 2);
}

#[test]
fn mismatched_import_is_reported_missing() {
    let (engine, _, _) = fresh();
    let module = compile(
        &engine,
        r#"(module (import "env" "foo" (func (param i32) (result i32))))"#,
    );

    // A resolver that returns a function of the wrong type (i64 -> i32).
    struct WrongType;
    impl Resolver for WrongType {
        fn resolve(&self, _: &str, _: &str, _: &ExternType) -> Option<Extern> {
            let ty = FuncType::new([ValType::I64], [ValType::I32]).unwrap();
            let host = HostFunc::new("wrong", ty, |_, _, _| Ok(()));
            Some(Extern::Func(Function::host(Arc::new(host))))
        }
    }

    let result = link(module.module(), &WrongType);
    assert!(!result.success);
    assert_eq!(result.missing.len(), 1);
    assert_eq!(result.missing[0].module, "env");
    assert_eq!(result.missing[0].name, "foo");
    assert_eq!(result.resolved.len(), 1);
    assert!(result.resolved[0].is_none());
}

#[test]
fn host_functions_resolve_and_invoke() {
    let (engine, compartment, context) = fresh();
    let module = compile(
        &engine,
        r#"
        (module
            (import "env" "add" (func (param i32 i32) (result i32)))
            (export "imported_add" (func 0)))
        "#,
    );

    struct Env;
    impl Resolver for Env {
        fn resolve(&self, module: &str, name: &str, _: &ExternType) -> Option<Extern> {
            if module != "env" || name != "add" {
                return None;
            }
            let ty = FuncType::new([ValType::I32, ValType::I32], [ValType::I32]).unwrap();
            let host = HostFunc::new("env.add", ty, |_, args, results| {
                let lhs = args[0].to_bits64() as i32;
                let rhs = args[1].to_bits64() as i32;
                results[0] = cove::core::UntypedValue::from(lhs.wrapping_add(rhs));
                Ok(())
            });
            Some(Extern::Func(Function::host(Arc::new(host))))
        }
    }

    let imports = link(module.module(), &Env).into_imports().expect("linked");
    let instance =
        instantiate(&compartment, &context, &module, &imports, "host").expect("instantiation");

    let add = instance
        .export("imported_add")
        .and_then(Extern::into_func)
        .expect("exported function");
    let results = cove::invoke(&context, &add, &[Value::I32(40), Value::I32(2)]).unwrap();
    assert_eq!(results, vec![Value::I32(42)]);

    // Argument type mismatches trap as invalid arguments.
    let error = cove::invoke(&context, &add, &[Value::I64(1), Value::I32(2)]).unwrap_err();
    assert_matches!(error.kind(), TrapKind::InvalidArgument);
}

#[test]
fn stub_resolver_synthesizes_missing_imports() {
    let (engine, compartment, context) = fresh();
    let module = compile(
        &engine,
        r#"
        (module
            (import "env" "f" (func (param i32) (result i32)))
            (import "env" "mem" (memory 2))
            (import "env" "tbl" (table 3 funcref))
            (import "env" "g" (global i64)))
        "#,
    );

    struct Nothing;
    impl Resolver for Nothing {
        fn resolve(&self, _: &str, _: &str, _: &ExternType) -> Option<Extern> {
            None
        }
    }

    let stubs = StubResolver::new(&Nothing, &engine, &compartment, &context, StubBehavior::Trap)
        .quiet();
    let result = link(module.module(), &stubs);
    assert!(result.success, "missing: {:?}", result.missing);
    let imports = result.into_imports().unwrap();

    match &imports[1] {
        Extern::Memory(memory) => assert_eq!(memory.size(), 2),
        other => panic!("expected a memory stub, got {other:?}"),
    }
    match &imports[2] {
        Extern::Table(table) => assert_eq!(table.size(), 3),
        other => panic!("expected a table stub, got {other:?}"),
    }
    let instance = instantiate(&compartment, &context, &module, &imports, "stubbed");
    assert!(instance.is_ok());
}

#[test]
fn cross_compartment_imports_are_rejected() {
    let (engine, compartment_a, context_a) = fresh();
    let compartment_b = Compartment::new().unwrap();

    let module = compile(&engine, r#"(module (import "env" "mem" (memory 1)))"#);
    let foreign = compartment_b
        .create_memory(MemoryType::new(1, None, false).unwrap(), "foreign")
        .unwrap();

    let error = instantiate(
        &compartment_a,
        &context_a,
        &module,
        &[Extern::Memory(foreign)],
        "cross",
    )
    .expect_err("cross-compartment import must fail");
    assert_matches!(error, InstantiationError::CrossCompartmentImport { index: 0 });
}

#[test]
fn namespace_resolver_exposes_instance_exports() {
    let (engine, compartment, context) = fresh();
    let exporter = compile(
        &engine,
        r#"(module (memory (export "mem") 1) (global (export "g") i32 (i32.const 3)))"#,
    );
    let exporter =
        instantiate(&compartment, &context, &exporter, &[], "exporter").expect("instantiation");

    let importer = compile(
        &engine,
        r#"
        (module
            (import "host" "mem" (memory 1))
            (import "host" "g" (global i32)))
        "#,
    );
    let mut resolver = NamespaceResolver::new();
    resolver.define("host", exporter);
    let imports = link(importer.module(), &resolver).into_imports().unwrap();
    let instance = instantiate(&compartment, &context, &importer, &imports, "importer");
    assert!(instance.is_ok());
}

#[test]
fn mutable_globals_are_per_context() {
    let (_, compartment, context_a) = fresh();
    let context_b = compartment.create_context().unwrap();

    let ty = GlobalType::new(ValType::I32, Mutability::Var);
    let global = compartment.create_global(ty, Value::I32(7)).unwrap();

    assert_eq!(global.get(&context_a), Value::I32(7));
    assert_eq!(global.get(&context_b), Value::I32(7));

    global.set(&context_a, Value::I32(100));
    assert_eq!(global.get(&context_a), Value::I32(100));
    // The write is invisible to the other context.
    assert_eq!(global.get(&context_b), Value::I32(7));
}

#[test]
fn compartment_clone_deep_copies_mutable_state() {
    let (_, compartment, context) = fresh();
    let ty = GlobalType::new(ValType::I32, Mutability::Var);
    let global = compartment.create_global(ty, Value::I32(1)).unwrap();
    global.set(&context, Value::I32(55));

    let memory = compartment
        .create_memory(MemoryType::new(1, None, false).unwrap(), "mem")
        .unwrap();
    memory.write(64, &[9, 9]).unwrap();

    let clone = compartment.clone_compartment().expect("clone");
    // The clone's objects carry the same ids but are distinct storage.
    let cloned_memory = clone
        .memory(memory.id())
        .expect("cloned memory");
    let mut bytes = [0u8; 2];
    cloned_memory.read(64, &mut bytes).unwrap();
    assert_eq!(bytes, [9, 9]);
    cloned_memory.write(64, &[1, 2]).unwrap();
    memory.read(64, &mut bytes).unwrap();
    assert_eq!(bytes, [9, 9], "writes to the clone must not leak back");
}

#[test]
fn reclamation_spares_rooted_objects() {
    // No context: only the two memories participate in the pass.
    let compartment = Compartment::new().unwrap();
    let rooted = compartment
        .create_memory(MemoryType::new(1, None, false).unwrap(), "rooted")
        .unwrap();
    let unrooted = compartment
        .create_memory(MemoryType::new(1, None, false).unwrap(), "unrooted")
        .unwrap();
    rooted.add_root();

    let destroyed = collect_garbage(&compartment);
    assert_eq!(destroyed, 1);
    assert!(compartment.memory(rooted.id()).is_some());
    assert!(compartment.memory(unrooted.id()).is_none());

    rooted.remove_root();
    let destroyed = collect_garbage(&compartment);
    assert_eq!(destroyed, 1);
}

#[test]
fn instances_keep_their_objects_alive() {
    let (engine, compartment, context) = fresh();
    let module = compile(
        &engine,
        r#"(module (memory (export "mem") 1) (table (export "tbl") 2 funcref))"#,
    );
    let instance =
        instantiate(&compartment, &context, &module, &[], "owner").expect("instantiation");
    instance.add_root();
    context.add_root();

    // The instance is rooted, so its memory and table survive.
    assert_eq!(collect_garbage(&compartment), 0);

    instance.remove_root();
    let destroyed = collect_garbage(&compartment);
    // Instance, memory and table are reclaimed together.
    assert_eq!(destroyed, 3);
}

#[test]
fn precompiled_modules_roundtrip_and_check_versions() {
    let (engine, compartment, context) = fresh();
    let module = compile(&engine, r#"(module (func (export "f")))"#);
    let image = module.serialize();

    // Loading the image with the same engine skips codegen and works.
    let reloaded = engine.load(&image).expect("precompiled load");
    let instance = instantiate(&compartment, &context, &reloaded, &[], "precompiled");
    assert!(instance.is_ok());

    // An engine with a different generator version rejects the image.
    struct OtherVersion;
    impl cove::codegen::CodeGenerator for OtherVersion {
        fn version_tag(&self) -> u64 {
            42
        }
        fn compile(
            &self,
            module: &cove::ir::Module,
            config: &cove::Config,
        ) -> Result<cove::codegen::ObjectCode, cove::codegen::CodegenError> {
            cove::codegen::NullCodeGenerator.compile(module, config)
        }
    }
    let other = Engine::new(cove::Config::default(), Arc::new(OtherVersion));
    let error = other.load(&image).expect_err("version mismatch");
    assert_matches!(
        error,
        cove::ModuleError::PrecompiledVersionMismatch { found, .. } if found != 42
    );
}
