//! Binary module encoding.
//!
//! The inverse of [`decode`](crate::decode::decode): emits the canonical
//! (shortest-LEB) encoding of every construct and re-emits custom sections
//! byte-for-byte in their recorded positions. A module obtained from
//! `decode` therefore encodes back to its original bytes unless the input
//! used non-canonical integer or flag encodings.

use crate::{
    instr::{BlockType, Imm, Instr},
    leb128,
    module::{
        ConstExpr,
        DataSegmentMode,
        ElemItems,
        ElemSegmentMode,
        ExternIndex,
        ImportDesc,
        Module,
        SectionId,
    },
    op::Op,
};
use cove_core::{GlobalType, MemoryType, Mutability, TableType, ValType};

fn val_type_byte(ty: ValType) -> u8 {
    match ty {
        ValType::I32 => 0x7f,
        ValType::I64 => 0x7e,
        ValType::F32 => 0x7d,
        ValType::F64 => 0x7c,
        ValType::V128 => 0x7b,
        ValType::FuncRef => 0x70,
        ValType::AnyRef => 0x6f,
        ValType::NullRef => 0x6e,
    }
}

fn u32_leb(out: &mut Vec<u8>, value: u32) {
    leb128::write_unsigned(out, u64::from(value));
}

fn name(out: &mut Vec<u8>, value: &str) {
    u32_leb(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

fn limits(out: &mut Vec<u8>, min: u32, max: Option<u32>, shared: bool) {
    let mut flags = 0_u8;
    if max.is_some() {
        flags |= 0x01;
    }
    if shared {
        flags |= 0x02;
    }
    out.push(flags);
    u32_leb(out, min);
    if let Some(max) = max {
        u32_leb(out, max);
    }
}

fn memory_type(out: &mut Vec<u8>, ty: &MemoryType) {
    limits(out, ty.min(), ty.max(), ty.is_shared());
}

fn table_type(out: &mut Vec<u8>, ty: &TableType) {
    out.push(val_type_byte(ty.element()));
    limits(out, ty.min(), ty.max(), ty.is_shared());
}

fn global_type(out: &mut Vec<u8>, ty: &GlobalType) {
    out.push(val_type_byte(ty.content()));
    out.push(match ty.mutability() {
        Mutability::Const => 0,
        Mutability::Var => 1,
    });
}

fn const_expr(out: &mut Vec<u8>, expr: &ConstExpr) {
    match expr {
        ConstExpr::I32(value) => {
            instr(out, &Instr::with_imm(Op::I32Const, Imm::I32(*value)));
        }
        ConstExpr::I64(value) => {
            instr(out, &Instr::with_imm(Op::I64Const, Imm::I64(*value)));
        }
        ConstExpr::F32(bits) => {
            instr(out, &Instr::with_imm(Op::F32Const, Imm::F32(*bits)));
        }
        ConstExpr::F64(bits) => {
            instr(out, &Instr::with_imm(Op::F64Const, Imm::F64(*bits)));
        }
        ConstExpr::V128(bits) => {
            instr(out, &Instr::with_imm(Op::V128ConstOp, Imm::V128(*bits)));
        }
        ConstExpr::RefNull(ty) => {
            instr(out, &Instr::with_imm(Op::RefNull, Imm::RefType(*ty)));
        }
        ConstExpr::RefFunc(index) => {
            instr(out, &Instr::with_imm(Op::RefFunc, Imm::Func(*index)));
        }
        ConstExpr::GlobalGet(index) => {
            instr(out, &Instr::with_imm(Op::GlobalGet, Imm::Global(*index)));
        }
    }
    instr(out, &Instr::plain(Op::End));
}

fn instr(out: &mut Vec<u8>, instr: &Instr) {
    let (prefix, code) = instr.op.encoding();
    if prefix == 0 {
        out.push(code as u8);
    } else {
        out.push(prefix);
        u32_leb(out, code);
    }
    match &instr.imm {
        Imm::None => {
            if instr.op == Op::AtomicFence {
                out.push(0);
            }
        }
        Imm::BlockType(block_type) => match block_type {
            BlockType::Empty => out.push(0x40),
            BlockType::Value(ty) => out.push(val_type_byte(*ty)),
            BlockType::Func(index) => leb128::write_signed(out, i64::from(*index)),
        },
        Imm::Label(label) => u32_leb(out, *label),
        Imm::BrTable(table) => {
            u32_leb(out, table.targets.len() as u32);
            for target in &table.targets {
                u32_leb(out, *target);
            }
            u32_leb(out, table.default);
        }
        Imm::Local(index)
        | Imm::Global(index)
        | Imm::Func(index)
        | Imm::Table(index)
        | Imm::Mem(index)
        | Imm::Data(index)
        | Imm::Elem(index)
        | Imm::Tag(index) => u32_leb(out, *index),
        Imm::CallIndirect { ty, table } => {
            u32_leb(out, *ty);
            u32_leb(out, *table);
        }
        Imm::RefType(ty) => out.push(val_type_byte(*ty)),
        Imm::SelectTypes(types) => {
            u32_leb(out, types.len() as u32);
            for ty in types {
                out.push(val_type_byte(*ty));
            }
        }
        Imm::MemArg(memarg) => mem_arg(out, memarg),
        Imm::MemArgLane { memarg, lane } => {
            mem_arg(out, memarg);
            out.push(*lane);
        }
        Imm::Lane(lane) => out.push(*lane),
        Imm::Shuffle(lanes) => out.extend_from_slice(lanes),
        Imm::DataMem { data, mem } => {
            u32_leb(out, *data);
            u32_leb(out, *mem);
        }
        Imm::ElemTable { elem, table } => {
            u32_leb(out, *elem);
            u32_leb(out, *table);
        }
        Imm::TableTable { dst, src } => {
            u32_leb(out, *dst);
            u32_leb(out, *src);
        }
        Imm::MemMem { dst, src } => {
            u32_leb(out, *dst);
            u32_leb(out, *src);
        }
        Imm::I32(value) => leb128::write_signed(out, i64::from(*value)),
        Imm::I64(value) => leb128::write_signed(out, *value),
        Imm::F32(bits) => out.extend_from_slice(&bits.to_le_bytes()),
        Imm::F64(bits) => out.extend_from_slice(&bits.to_le_bytes()),
        Imm::V128(bits) => out.extend_from_slice(&bits.to_le_bytes()),
    }
}

fn mem_arg(out: &mut Vec<u8>, memarg: &crate::instr::MemArg) {
    let mut flags = memarg.align;
    if memarg.memory != 0 {
        flags |= 0x40;
    }
    u32_leb(out, flags);
    if memarg.memory != 0 {
        u32_leb(out, memarg.memory);
    }
    leb128::write_unsigned(out, memarg.offset);
}

fn section(out: &mut Vec<u8>, id: u8, payload: Vec<u8>) {
    out.push(id);
    u32_leb(out, payload.len() as u32);
    out.extend_from_slice(&payload);
}

/// Encodes the [`Module`] to its binary form.
pub fn encode(module: &Module) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"\0asm");
    out.extend_from_slice(&[1, 0, 0, 0]);

    let emit_customs = |out: &mut Vec<u8>, placement: u8| {
        for custom in module.customs.iter().filter(|c| c.placement == placement) {
            let mut payload = Vec::with_capacity(custom.bytes.len() + custom.name.len() + 5);
            name(&mut payload, &custom.name);
            payload.extend_from_slice(&custom.bytes);
            section(out, 0, payload);
        }
    };

    emit_customs(&mut out, 0);

    // Type section.
    if !module.types.is_empty() {
        let mut payload = Vec::new();
        u32_leb(&mut payload, module.types.len() as u32);
        for ty in &module.types {
            payload.push(0x60);
            u32_leb(&mut payload, ty.params().len() as u32);
            for param in ty.params() {
                payload.push(val_type_byte(*param));
            }
            u32_leb(&mut payload, ty.results().len() as u32);
            for result in ty.results() {
                payload.push(val_type_byte(*result));
            }
        }
        section(&mut out, SectionId::Type as u8, payload);
    }
    emit_customs(&mut out, SectionId::Type.order());

    // Import section.
    if !module.imports.is_empty() {
        let mut payload = Vec::new();
        u32_leb(&mut payload, module.imports.len() as u32);
        for import in &module.imports {
            name(&mut payload, &import.module);
            name(&mut payload, &import.name);
            match &import.desc {
                ImportDesc::Func(ty) => {
                    payload.push(0);
                    u32_leb(&mut payload, *ty);
                }
                ImportDesc::Table(ty) => {
                    payload.push(1);
                    table_type(&mut payload, ty);
                }
                ImportDesc::Memory(ty) => {
                    payload.push(2);
                    memory_type(&mut payload, ty);
                }
                ImportDesc::Global(ty) => {
                    payload.push(3);
                    global_type(&mut payload, ty);
                }
                ImportDesc::Tag(ty) => {
                    payload.push(4);
                    payload.push(0);
                    u32_leb(&mut payload, *ty);
                }
            }
        }
        section(&mut out, SectionId::Import as u8, payload);
    }
    emit_customs(&mut out, SectionId::Import.order());

    // Function section.
    if !module.funcs.is_empty() {
        let mut payload = Vec::new();
        u32_leb(&mut payload, module.funcs.len() as u32);
        for def in &module.funcs {
            u32_leb(&mut payload, def.type_index);
        }
        section(&mut out, SectionId::Function as u8, payload);
    }
    emit_customs(&mut out, SectionId::Function.order());

    // Table section.
    if !module.tables.is_empty() {
        let mut payload = Vec::new();
        u32_leb(&mut payload, module.tables.len() as u32);
        for ty in &module.tables {
            table_type(&mut payload, ty);
        }
        section(&mut out, SectionId::Table as u8, payload);
    }
    emit_customs(&mut out, SectionId::Table.order());

    // Memory section.
    if !module.memories.is_empty() {
        let mut payload = Vec::new();
        u32_leb(&mut payload, module.memories.len() as u32);
        for ty in &module.memories {
            memory_type(&mut payload, ty);
        }
        section(&mut out, SectionId::Memory as u8, payload);
    }
    emit_customs(&mut out, SectionId::Memory.order());

    // Tag section.
    if !module.tags.is_empty() {
        let mut payload = Vec::new();
        u32_leb(&mut payload, module.tags.len() as u32);
        for tag in &module.tags {
            payload.push(0);
            u32_leb(&mut payload, tag.type_index);
        }
        section(&mut out, SectionId::Tag as u8, payload);
    }
    emit_customs(&mut out, SectionId::Tag.order());

    // Global section.
    if !module.globals.is_empty() {
        let mut payload = Vec::new();
        u32_leb(&mut payload, module.globals.len() as u32);
        for def in &module.globals {
            global_type(&mut payload, &def.ty);
            const_expr(&mut payload, &def.init);
        }
        section(&mut out, SectionId::Global as u8, payload);
    }
    emit_customs(&mut out, SectionId::Global.order());

    // Export section.
    if !module.exports.is_empty() {
        let mut payload = Vec::new();
        u32_leb(&mut payload, module.exports.len() as u32);
        for export in &module.exports {
            name(&mut payload, &export.name);
            let (kind, index) = match export.index {
                ExternIndex::Func(index) => (0, index),
                ExternIndex::Table(index) => (1, index),
                ExternIndex::Memory(index) => (2, index),
                ExternIndex::Global(index) => (3, index),
                ExternIndex::Tag(index) => (4, index),
            };
            payload.push(kind);
            u32_leb(&mut payload, index);
        }
        section(&mut out, SectionId::Export as u8, payload);
    }
    emit_customs(&mut out, SectionId::Export.order());

    // Start section.
    if let Some(start) = module.start {
        let mut payload = Vec::new();
        u32_leb(&mut payload, start);
        section(&mut out, SectionId::Start as u8, payload);
    }
    emit_customs(&mut out, SectionId::Start.order());

    // Element section.
    if !module.elems.is_empty() {
        let mut payload = Vec::new();
        u32_leb(&mut payload, module.elems.len() as u32);
        for segment in &module.elems {
            let is_exprs = matches!(segment.items, ElemItems::Exprs(_));
            let mode_bits = match &segment.mode {
                ElemSegmentMode::Active { .. } if !segment.explicit_type => 0,
                ElemSegmentMode::Passive => 1,
                ElemSegmentMode::Active { .. } => 2,
                ElemSegmentMode::Declared => 3,
            };
            let flag = mode_bits | if is_exprs { 4 } else { 0 };
            u32_leb(&mut payload, flag);
            match &segment.mode {
                ElemSegmentMode::Active { table, offset } => {
                    if segment.explicit_type {
                        u32_leb(&mut payload, *table);
                    }
                    const_expr(&mut payload, offset);
                }
                ElemSegmentMode::Passive | ElemSegmentMode::Declared => {}
            }
            if segment.explicit_type {
                if is_exprs {
                    payload.push(val_type_byte(segment.ty));
                } else {
                    // Element kind byte, `0x00` = funcref.
                    payload.push(0);
                }
            }
            match &segment.items {
                ElemItems::Funcs(items) => {
                    u32_leb(&mut payload, items.len() as u32);
                    for item in items {
                        u32_leb(&mut payload, *item);
                    }
                }
                ElemItems::Exprs(items) => {
                    u32_leb(&mut payload, items.len() as u32);
                    for item in items {
                        const_expr(&mut payload, item);
                    }
                }
            }
        }
        section(&mut out, SectionId::Element as u8, payload);
    }
    emit_customs(&mut out, SectionId::Element.order());

    // Data-count section.
    if let Some(count) = module.data_count {
        let mut payload = Vec::new();
        u32_leb(&mut payload, count);
        section(&mut out, SectionId::DataCount as u8, payload);
    }
    emit_customs(&mut out, SectionId::DataCount.order());

    // Code section.
    if !module.funcs.is_empty() {
        let mut payload = Vec::new();
        u32_leb(&mut payload, module.funcs.len() as u32);
        for def in &module.funcs {
            let mut body = Vec::new();
            u32_leb(&mut body, def.locals.len() as u32);
            for (count, ty) in &def.locals {
                u32_leb(&mut body, *count);
                body.push(val_type_byte(*ty));
            }
            for i in &def.body {
                instr(&mut body, i);
            }
            u32_leb(&mut payload, body.len() as u32);
            payload.extend_from_slice(&body);
        }
        section(&mut out, SectionId::Code as u8, payload);
    }
    emit_customs(&mut out, SectionId::Code.order());

    // Data section.
    if !module.datas.is_empty() {
        let mut payload = Vec::new();
        u32_leb(&mut payload, module.datas.len() as u32);
        for segment in &module.datas {
            match &segment.mode {
                DataSegmentMode::Active { memory, offset } => {
                    if segment.explicit_memory {
                        u32_leb(&mut payload, 2);
                        u32_leb(&mut payload, *memory);
                    } else {
                        u32_leb(&mut payload, 0);
                    }
                    const_expr(&mut payload, offset);
                }
                DataSegmentMode::Passive => u32_leb(&mut payload, 1),
            }
            u32_leb(&mut payload, segment.bytes.len() as u32);
            payload.extend_from_slice(&segment.bytes);
        }
        section(&mut out, SectionId::Data as u8, payload);
    }
    emit_customs(&mut out, SectionId::Data.order());

    out
}
