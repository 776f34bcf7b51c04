//! Module IR, typed instruction set and binary codec for the Cove runtime.
//!
//! The heart of this crate is the operator table in [`op`]: one row per
//! opcode carrying its binary encoding, mnemonic, immediate shape, type
//! signature template and governing feature. The [`decode`] and [`encode`]
//! passes and the runtime's validator all consult the same table, so the
//! three can never disagree about an opcode.
//!
//! A decoded [`Module`] is an immutable record of everything the binary
//! declared, including custom sections (preserved byte-for-byte) and the
//! extended names section. `decode` and `encode` round-trip: for every
//! well-formed module `m`, `decode(&encode(&m))` equals `m`.

mod features;
mod instr;
mod module;
pub mod decode;
pub mod encode;
pub mod leb128;
pub mod op;

pub use self::{
    decode::{decode, DecodeError, DecodeErrorKind, Diagnostic},
    encode::encode,
    features::Features,
    instr::{BlockType, BrTableImm, Imm, Instr, MemArg},
    module::{
        ConstExpr,
        CustomSection,
        DataSegment,
        DataSegmentMode,
        ElemItems,
        ElemSegment,
        ElemSegmentMode,
        Export,
        ExternIndex,
        FuncDef,
        GlobalDef,
        Import,
        ImportDesc,
        Module,
        Names,
        SectionId,
        TagDef,
    },
    op::{Feature, ImmKind, Op, Sig},
};
