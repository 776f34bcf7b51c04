//! Decode/encode round-trip tests over WAT-authored modules.

use assert_matches::assert_matches;
use cove_ir::{decode, encode, DecodeErrorKind, ElemItems, ExternIndex, Op};

fn wasm(wat: &str) -> Vec<u8> {
    wat::parse_str(wat).expect("invalid test module")
}

fn roundtrip(wat: &str) -> cove_ir::Module {
    let bytes = wasm(wat);
    let (module, diagnostics) = decode(&bytes).expect("decode failed");
    assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
    let encoded = encode(&module);
    assert_eq!(
        encoded, bytes,
        "encoding a decoded module must reproduce the input bytes"
    );
    let (again, _) = decode(&encoded).expect("re-decode failed");
    assert_eq!(module, again);
    module
}

#[test]
fn empty_module() {
    let module = roundtrip("(module)");
    assert!(module.types.is_empty());
    assert!(module.funcs.is_empty());
}

#[test]
fn arithmetic_function() {
    let module = roundtrip(
        r#"
        (module
            (func (export "add") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.add))
        "#,
    );
    assert_eq!(module.funcs.len(), 1);
    assert_eq!(module.exports.len(), 1);
    assert_matches!(module.exports[0].index, ExternIndex::Func(0));
    let ops: Vec<Op> = module.funcs[0].body.iter().map(|i| i.op).collect();
    assert_eq!(
        ops,
        [Op::LocalGet, Op::LocalGet, Op::I32Add, Op::End]
    );
}

#[test]
fn imports_and_memory() {
    let module = roundtrip(
        r#"
        (module
            (import "env" "callback" (func (param i32) (result i32)))
            (import "env" "mem" (memory 1 4))
            (global (mut i32) (i32.const 7))
            (func (result i32)
                global.get 0)
            (export "run" (func 1)))
        "#,
    );
    assert_eq!(module.imports.len(), 2);
    assert_eq!(module.num_imported_funcs(), 1);
    assert_eq!(module.num_imported_memories(), 1);
    assert_eq!(module.num_funcs(), 2);
    // Function index 1 addresses the defined function.
    let ty = module.func_type(1).expect("missing function type");
    assert!(ty.params().is_empty());
}

#[test]
fn segments_and_start() {
    let module = roundtrip(
        r#"
        (module
            (memory 1)
            (table 4 funcref)
            (func $noop)
            (start $noop)
            (elem (i32.const 1) $noop)
            (data (i32.const 8) "\de\ad\be\ef"))
        "#,
    );
    assert_eq!(module.start, Some(0));
    assert_eq!(module.elems.len(), 1);
    assert_matches!(&module.elems[0].items, ElemItems::Funcs(items) if items == &[0]);
    assert_eq!(module.datas.len(), 1);
    assert_eq!(module.datas[0].bytes, [0xde, 0xad, 0xbe, 0xef]);
}

#[test]
fn passive_segments_and_bulk_ops() {
    let module = roundtrip(
        r#"
        (module
            (memory 1)
            (data $seg "abc")
            (func (param i32 i32 i32)
                local.get 0
                local.get 1
                local.get 2
                memory.init $seg
                data.drop $seg))
        "#,
    );
    assert_eq!(module.data_count, Some(1));
    let ops: Vec<Op> = module.funcs[0].body.iter().map(|i| i.op).collect();
    assert!(ops.contains(&Op::MemoryInit));
    assert!(ops.contains(&Op::DataDrop));
}

#[test]
fn simd_and_control_flow() {
    let module = roundtrip(
        r#"
        (module
            (memory 1)
            (func (result v128)
                (block (result v128)
                    v128.const i32x4 1 2 3 4
                    (v128.load (i32.const 0))
                    i32x4.add)))
        "#,
    );
    let ops: Vec<Op> = module.funcs[0].body.iter().map(|i| i.op).collect();
    assert!(ops.contains(&Op::V128ConstOp));
    assert!(ops.contains(&Op::I32x4Add));
}

#[test]
fn custom_sections_are_preserved() {
    let mut bytes = wasm("(module (func))");
    // Append a custom section: id 0, size, name "meta", three bytes.
    let mut custom = Vec::new();
    custom.push(0);
    custom.push(4 + 1 + 3);
    custom.push(4);
    custom.extend_from_slice(b"meta");
    custom.extend_from_slice(&[1, 2, 3]);
    bytes.extend_from_slice(&custom);

    let (module, _) = decode(&bytes).expect("decode failed");
    assert_eq!(module.customs.len(), 1);
    assert_eq!(module.customs[0].name, "meta");
    assert_eq!(module.customs[0].bytes, [1, 2, 3]);
    assert_eq!(encode(&module), bytes);
}

#[test]
fn name_section_is_parsed_and_preserved() {
    let mut bytes = wasm("(module (func) (func))");
    // Hand-build a `name` section with a function-names subsection
    // assigning "first" and "second".
    let mut payload = Vec::new();
    payload.push(4);
    payload.extend_from_slice(b"name");
    let mut sub = Vec::new();
    sub.push(2); // two assignments
    sub.push(0);
    sub.push(5);
    sub.extend_from_slice(b"first");
    sub.push(1);
    sub.push(6);
    sub.extend_from_slice(b"second");
    payload.push(1); // function-names subsection id
    payload.push(sub.len() as u8);
    payload.extend_from_slice(&sub);
    bytes.push(0);
    bytes.push(payload.len() as u8);
    bytes.extend_from_slice(&payload);

    let (module, _) = decode(&bytes).expect("decode failed");
    assert_eq!(module.names.func_name(0), Some("first"));
    assert_eq!(module.names.func_name(1), Some("second"));
    assert_eq!(module.names.func_name(2), None);
    assert_eq!(encode(&module), bytes);
}

#[test]
fn truncated_module_reports_offset() {
    let mut bytes = wasm("(module (func (result i32) i32.const 1))");
    bytes.truncate(bytes.len() - 3);
    let error = decode(&bytes).expect_err("truncation must fail");
    assert!(error.offset <= bytes.len());
}

#[test]
fn bad_magic_is_rejected() {
    let error = decode(b"\0wasm\x01\0\0\0").expect_err("bad magic must fail");
    assert_eq!(error.offset, 0);
    assert_matches!(error.kind, DecodeErrorKind::BadMagic);
}

#[test]
fn unknown_opcode_is_rejected() {
    // A function body consisting of the unassigned opcode 0x27.
    let bytes = [
        b'\0', b'a', b's', b'm', 1, 0, 0, 0,
        // Type section: one type, [] -> [].
        1, 4, 1, 0x60, 0, 0,
        // Function section: one function of type 0.
        3, 2, 1, 0,
        // Code section: one body, size 3: no locals, 0x27, end.
        10, 5, 1, 3, 0, 0x27, 0x0b,
    ];
    let error = decode(&bytes).expect_err("unknown opcode must fail");
    assert_matches!(
        error.kind,
        DecodeErrorKind::UnknownOpcode { prefix: 0, code: 0x27 }
    );
}

#[test]
fn section_order_is_enforced() {
    // Memory section (5) after export section (7).
    let bytes = [
        b'\0', b'a', b's', b'm', 1, 0, 0, 0,
        7, 1, 0, // empty export section
        5, 3, 1, 0, 1, // memory section
    ];
    let error = decode(&bytes).expect_err("out of order section must fail");
    assert_matches!(error.kind, DecodeErrorKind::SectionOutOfOrder);
}
