use super::{validate, Reason};
use crate::Config;
use cove_ir::decode;

fn module(wat: &str) -> cove_ir::Module {
    let bytes = wat::parse_str(wat).expect("invalid test module");
    decode(&bytes).expect("decode failed").0
}

fn assert_valid(wat: &str) {
    let module = module(wat);
    if let Err(errors) = validate(&module, &Config::default()) {
        panic!("expected valid module, got: {errors:?}");
    }
}

fn first_reason(wat: &str, config: &Config) -> Reason {
    let module = module(wat);
    let errors = validate(&module, config).expect_err("expected validation failure");
    errors.into_iter().next().expect("no errors collected").reason
}

#[test]
fn simple_modules_validate() {
    assert_valid("(module)");
    assert_valid(
        r#"
        (module
            (memory 1)
            (func (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.add)
            (func (result i32)
                (i32.load (i32.const 0))))
        "#,
    );
}

#[test]
fn unreachable_stack_is_polymorphic() {
    assert_valid(
        r#"
        (module
            (func (result i32)
                unreachable
                i64.const 1
                drop
                i32.add))
        "#,
    );
}

#[test]
fn blocks_and_branches_validate() {
    assert_valid(
        r#"
        (module
            (func (param i32) (result i32)
                (block (result i32)
                    (loop (result i32)
                        i32.const 42
                        local.get 0
                        br_if 1
                        drop
                        br 0))))
        "#,
    );
}

#[test]
fn multi_value_blocks_validate() {
    assert_valid(
        r#"
        (module
            (func (result i32 i32)
                (block (result i32 i32)
                    i32.const 1
                    i32.const 2)))
        "#,
    );
}

#[test]
fn type_mismatch_is_rejected() {
    let reason = first_reason(
        r#"
        (module
            (func (result i32)
                i64.const 1
                i32.const 2
                i32.add))
        "#,
        &Config::default(),
    );
    assert!(matches!(reason, Reason::TypeMismatch { .. }), "{reason:?}");
}

#[test]
fn disabling_bulk_memory_names_the_feature() {
    let wat = r#"
        (module
            (memory 1)
            (func (param i32 i32 i32)
                local.get 0
                local.get 1
                local.get 2
                memory.copy))
        "#;
    assert_valid(wat);
    let mut config = Config::default();
    config.wasm_bulk_memory(false);
    let reason = first_reason(wat, &config);
    assert_eq!(
        reason,
        Reason::FeatureDisabled {
            feature: "bulk-memory"
        }
    );
}

#[test]
fn disabling_simd_names_the_feature() {
    let wat = r#"
        (module
            (func (result v128)
                v128.const i64x2 0 0))
        "#;
    assert_valid(wat);
    let mut config = Config::default();
    config.wasm_simd(false);
    let reason = first_reason(wat, &config);
    assert_eq!(reason, Reason::FeatureDisabled { feature: "simd" });
}

#[test]
fn disabling_sign_extension_names_the_feature() {
    let wat = r#"
        (module
            (func (param i32) (result i32)
                local.get 0
                i32.extend8_s))
        "#;
    let mut config = Config::default();
    config.wasm_sign_extension(false);
    let reason = first_reason(wat, &config);
    assert_eq!(
        reason,
        Reason::FeatureDisabled {
            feature: "sign-extension"
        }
    );
}

#[test]
fn br_table_arity_mismatch_is_rejected() {
    let reason = first_reason(
        r#"
        (module
            (func (param i32)
                (block (result i32)
                    (block
                        i32.const 0
                        local.get 0
                        br_table 1 0)
                    i32.const 1)
                drop))
        "#,
        &Config::default(),
    );
    assert_eq!(reason, Reason::BranchTableArityMismatch);
}

#[test]
fn immutable_global_cannot_be_written() {
    let reason = first_reason(
        r#"
        (module
            (global i32 (i32.const 1))
            (func
                i32.const 2
                global.set 0))
        "#,
        &Config::default(),
    );
    assert_eq!(reason, Reason::GlobalIsImmutable);
}

#[test]
fn start_function_type_is_checked() {
    let reason = first_reason(
        r#"
        (module
            (func (param i32))
            (start 0))
        "#,
        &Config::default(),
    );
    assert_eq!(reason, Reason::InvalidStartFunction);
}

#[test]
fn atomic_alignment_must_be_natural() {
    assert_valid(
        r#"
        (module
            (memory 1 1 shared)
            (func (param i32) (result i32)
                local.get 0
                (i32.atomic.load align=4)))
        "#,
    );
    let reason = first_reason(
        r#"
        (module
            (memory 1 1 shared)
            (func (param i32) (result i32)
                local.get 0
                (i32.atomic.load align=2)))
        "#,
        &Config::default(),
    );
    assert_eq!(reason, Reason::AtomicAlignmentMismatch);
}

#[test]
fn shared_atomics_requirement_is_enforced_when_enabled() {
    let wat = r#"
        (module
            (memory 1)
            (func (param i32) (result i32)
                local.get 0
                i32.atomic.load))
        "#;
    // Accepted with the default (permissive) configuration.
    assert_valid(wat);
    let mut config = Config::default();
    config.wasm_require_shared_atomics(true);
    let reason = first_reason(wat, &config);
    assert_eq!(reason, Reason::AtomicRequiresSharedMemory);
}

#[test]
fn locals_limit_is_enforced() {
    let wat = r#"
        (module
            (func (local i64 i64 i64)))
        "#;
    let mut config = Config::default();
    config.set_max_locals(2);
    let reason = first_reason(wat, &config);
    assert!(matches!(reason, Reason::TooManyLocals { count: 3 }));
}

#[test]
fn duplicate_export_names_are_rejected() {
    let reason = first_reason(
        r#"
        (module
            (func)
            (memory 1)
            (export "thing" (func 0))
            (export "thing" (memory 0)))
        "#,
        &Config::default(),
    );
    assert!(matches!(reason, Reason::DuplicateExportName { .. }));
}

#[test]
fn error_collection_is_capped() {
    // Ten broken functions, cap at the default of eight.
    let mut wat = String::from("(module ");
    for _ in 0..10 {
        wat.push_str("(func (result i32) i64.const 0) ");
    }
    wat.push(')');
    let module = module(&wat);
    let errors = validate(&module, &Config::default()).expect_err("must fail");
    assert_eq!(errors.len(), Config::default().max_validation_errors());
}
