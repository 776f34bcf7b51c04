//! The operator table.
//!
//! One row per opcode: binary encoding, mnemonic, immediate shape, type
//! signature template and governing feature. The decoder, the encoder and
//! the validator each consult this table instead of keeping their own
//! per-opcode knowledge.
//!
//! Operators whose typing depends on their immediates or on the module
//! context (control flow, calls, locals, globals, bulk operations) carry
//! the [`Sig::Special`] template and are typed by dedicated validator
//! rules; everything else is typed by its [`Sig::Fixed`] row alone.

use crate::Features;
use core::fmt::{self, Display};
use cove_core::ValType;

/// The shape of an operator's immediate bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImmKind {
    /// No immediate.
    None,
    /// A structured block type (s33).
    BlockType,
    /// A label depth.
    Label,
    /// A branch table.
    BrTable,
    /// A local index.
    Local,
    /// A global index.
    Global,
    /// A function index.
    Func,
    /// A table index.
    Table,
    /// A memory index.
    Mem,
    /// A data segment index.
    Data,
    /// An element segment index.
    Elem,
    /// An exception tag index.
    Tag,
    /// A type index plus a table index.
    CallIndirect,
    /// A heap reference type.
    RefType,
    /// A vector of explicit result types.
    SelectTypes,
    /// Alignment, offset and memory index.
    MemArg,
    /// A [`ImmKind::MemArg`] followed by a lane index.
    MemArgLane,
    /// A vector lane index.
    Lane,
    /// Sixteen lane selectors.
    Shuffle,
    /// A data segment index plus a memory index.
    DataMem,
    /// An element segment index plus a table index.
    ElemTable,
    /// Destination and source table indices.
    TableTable,
    /// Destination and source memory indices.
    MemMem,
    /// A reserved zero byte (`atomic.fence`).
    Fence,
    /// An `i32` literal.
    I32,
    /// An `i64` literal.
    I64,
    /// An `f32` literal.
    F32,
    /// An `f64` literal.
    F64,
    /// A `v128` literal.
    V128,
}

/// The type signature template of an operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Sig {
    /// Pops the parameter types right-to-left, pushes the results.
    Fixed(&'static [ValType], &'static [ValType]),
    /// The signature depends on immediates or module context.
    Special,
}

/// The feature gating an operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Feature {
    /// Always available.
    Mvp,
    /// The non-trapping float-to-int conversions.
    NonTrappingFloatToInt,
    /// The extended sign-extension operators.
    SignExtension,
    /// The bulk memory and table operators.
    BulkMemory,
    /// The reference-type operators.
    ReferenceTypes,
    /// The 128-bit SIMD operators.
    Simd,
    /// The atomic operators including wait/notify.
    Atomics,
    /// The exception-handling operators.
    Exceptions,
}

impl Feature {
    /// Returns `true` if the feature is enabled in `features`.
    pub fn is_enabled(self, features: &Features) -> bool {
        match self {
            Self::Mvp => true,
            Self::NonTrappingFloatToInt => features.non_trapping_float_to_int,
            Self::SignExtension => features.sign_extension,
            Self::BulkMemory => features.bulk_memory,
            Self::ReferenceTypes => features.reference_types,
            Self::Simd => features.simd,
            Self::Atomics => features.atomics,
            Self::Exceptions => features.exceptions,
        }
    }

    /// Returns the feature name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Mvp => "mvp",
            Self::NonTrappingFloatToInt => "non-trapping float-to-int",
            Self::SignExtension => "sign-extension",
            Self::BulkMemory => "bulk-memory",
            Self::ReferenceTypes => "reference-types",
            Self::Simd => "simd",
            Self::Atomics => "atomics",
            Self::Exceptions => "exception-handling",
        }
    }
}

macro_rules! sig {
    (special) => {
        Sig::Special
    };
    ([$($p:ident)*] -> [$($r:ident)*]) => {
        Sig::Fixed(&[$(ValType::$p),*], &[$(ValType::$r),*])
    };
}

macro_rules! define_ops {
    (
        $(
            ($variant:ident, $mnemonic:literal, $prefix:literal, $code:literal,
             $imm:ident, $sig:expr, $feature:ident)
        ),* $(,)?
    ) => {
        /// A Wasm operator.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        pub enum Op {
            $(
                #[doc = concat!("The `", $mnemonic, "` operator.")]
                $variant
            ),*
        }

        impl Op {
            /// Returns the textual mnemonic of the operator.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( Self::$variant => $mnemonic ),*
                }
            }

            /// Returns the binary encoding as `(prefix, opcode)`.
            ///
            /// A prefix of `0` means the operator is a single-byte opcode.
            pub fn encoding(self) -> (u8, u32) {
                match self {
                    $( Self::$variant => ($prefix, $code) ),*
                }
            }

            /// Returns the immediate shape of the operator.
            pub fn imm_kind(self) -> ImmKind {
                match self {
                    $( Self::$variant => ImmKind::$imm ),*
                }
            }

            /// Returns the type signature template of the operator.
            pub fn signature(self) -> Sig {
                match self {
                    $( Self::$variant => $sig ),*
                }
            }

            /// Returns the feature gating the operator.
            pub fn feature(self) -> Feature {
                match self {
                    $( Self::$variant => Feature::$feature ),*
                }
            }

            /// Looks up the operator with the given binary encoding.
            ///
            /// `prefix` is `0` for single-byte opcodes.
            pub fn from_encoding(prefix: u8, code: u32) -> Option<Self> {
                match (prefix, code) {
                    $( ($prefix, $code) => Some(Self::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

impl Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

define_ops! {
    // Control operators.
    (Unreachable, "unreachable", 0, 0x00, None, sig!(special), Mvp),
    (Nop, "nop", 0, 0x01, None, sig!([] -> []), Mvp),
    (Block, "block", 0, 0x02, BlockType, sig!(special), Mvp),
    (Loop, "loop", 0, 0x03, BlockType, sig!(special), Mvp),
    (If, "if", 0, 0x04, BlockType, sig!(special), Mvp),
    (Else, "else", 0, 0x05, None, sig!(special), Mvp),
    (Try, "try", 0, 0x06, BlockType, sig!(special), Exceptions),
    (Catch, "catch", 0, 0x07, Tag, sig!(special), Exceptions),
    (Throw, "throw", 0, 0x08, Tag, sig!(special), Exceptions),
    (Rethrow, "rethrow", 0, 0x09, Label, sig!(special), Exceptions),
    (End, "end", 0, 0x0b, None, sig!(special), Mvp),
    (Br, "br", 0, 0x0c, Label, sig!(special), Mvp),
    (BrIf, "br_if", 0, 0x0d, Label, sig!(special), Mvp),
    (BrTable, "br_table", 0, 0x0e, BrTable, sig!(special), Mvp),
    (Return, "return", 0, 0x0f, None, sig!(special), Mvp),
    (Call, "call", 0, 0x10, Func, sig!(special), Mvp),
    (CallIndirect, "call_indirect", 0, 0x11, CallIndirect, sig!(special), Mvp),
    (Delegate, "delegate", 0, 0x18, Label, sig!(special), Exceptions),
    (CatchAll, "catch_all", 0, 0x19, None, sig!(special), Exceptions),

    // Parametric operators.
    (Drop, "drop", 0, 0x1a, None, sig!(special), Mvp),
    (Select, "select", 0, 0x1b, None, sig!(special), Mvp),
    (SelectTyped, "select", 0, 0x1c, SelectTypes, sig!(special), ReferenceTypes),

    // Variable access.
    (LocalGet, "local.get", 0, 0x20, Local, sig!(special), Mvp),
    (LocalSet, "local.set", 0, 0x21, Local, sig!(special), Mvp),
    (LocalTee, "local.tee", 0, 0x22, Local, sig!(special), Mvp),
    (GlobalGet, "global.get", 0, 0x23, Global, sig!(special), Mvp),
    (GlobalSet, "global.set", 0, 0x24, Global, sig!(special), Mvp),
    (TableGet, "table.get", 0, 0x25, Table, sig!(special), ReferenceTypes),
    (TableSet, "table.set", 0, 0x26, Table, sig!(special), ReferenceTypes),

    // Memory access.
    (I32Load, "i32.load", 0, 0x28, MemArg, sig!([I32] -> [I32]), Mvp),
    (I64Load, "i64.load", 0, 0x29, MemArg, sig!([I32] -> [I64]), Mvp),
    (F32Load, "f32.load", 0, 0x2a, MemArg, sig!([I32] -> [F32]), Mvp),
    (F64Load, "f64.load", 0, 0x2b, MemArg, sig!([I32] -> [F64]), Mvp),
    (I32Load8S, "i32.load8_s", 0, 0x2c, MemArg, sig!([I32] -> [I32]), Mvp),
    (I32Load8U, "i32.load8_u", 0, 0x2d, MemArg, sig!([I32] -> [I32]), Mvp),
    (I32Load16S, "i32.load16_s", 0, 0x2e, MemArg, sig!([I32] -> [I32]), Mvp),
    (I32Load16U, "i32.load16_u", 0, 0x2f, MemArg, sig!([I32] -> [I32]), Mvp),
    (I64Load8S, "i64.load8_s", 0, 0x30, MemArg, sig!([I32] -> [I64]), Mvp),
    (I64Load8U, "i64.load8_u", 0, 0x31, MemArg, sig!([I32] -> [I64]), Mvp),
    (I64Load16S, "i64.load16_s", 0, 0x32, MemArg, sig!([I32] -> [I64]), Mvp),
    (I64Load16U, "i64.load16_u", 0, 0x33, MemArg, sig!([I32] -> [I64]), Mvp),
    (I64Load32S, "i64.load32_s", 0, 0x34, MemArg, sig!([I32] -> [I64]), Mvp),
    (I64Load32U, "i64.load32_u", 0, 0x35, MemArg, sig!([I32] -> [I64]), Mvp),
    (I32Store, "i32.store", 0, 0x36, MemArg, sig!([I32 I32] -> []), Mvp),
    (I64Store, "i64.store", 0, 0x37, MemArg, sig!([I32 I64] -> []), Mvp),
    (F32Store, "f32.store", 0, 0x38, MemArg, sig!([I32 F32] -> []), Mvp),
    (F64Store, "f64.store", 0, 0x39, MemArg, sig!([I32 F64] -> []), Mvp),
    (I32Store8, "i32.store8", 0, 0x3a, MemArg, sig!([I32 I32] -> []), Mvp),
    (I32Store16, "i32.store16", 0, 0x3b, MemArg, sig!([I32 I32] -> []), Mvp),
    (I64Store8, "i64.store8", 0, 0x3c, MemArg, sig!([I32 I64] -> []), Mvp),
    (I64Store16, "i64.store16", 0, 0x3d, MemArg, sig!([I32 I64] -> []), Mvp),
    (I64Store32, "i64.store32", 0, 0x3e, MemArg, sig!([I32 I64] -> []), Mvp),
    (MemorySize, "memory.size", 0, 0x3f, Mem, sig!([] -> [I32]), Mvp),
    (MemoryGrow, "memory.grow", 0, 0x40, Mem, sig!([I32] -> [I32]), Mvp),

    // Constants.
    (I32Const, "i32.const", 0, 0x41, I32, sig!([] -> [I32]), Mvp),
    (I64Const, "i64.const", 0, 0x42, I64, sig!([] -> [I64]), Mvp),
    (F32Const, "f32.const", 0, 0x43, F32, sig!([] -> [F32]), Mvp),
    (F64Const, "f64.const", 0, 0x44, F64, sig!([] -> [F64]), Mvp),

    // Integer comparisons.
    (I32Eqz, "i32.eqz", 0, 0x45, None, sig!([I32] -> [I32]), Mvp),
    (I32Eq, "i32.eq", 0, 0x46, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32Ne, "i32.ne", 0, 0x47, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32LtS, "i32.lt_s", 0, 0x48, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32LtU, "i32.lt_u", 0, 0x49, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32GtS, "i32.gt_s", 0, 0x4a, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32GtU, "i32.gt_u", 0, 0x4b, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32LeS, "i32.le_s", 0, 0x4c, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32LeU, "i32.le_u", 0, 0x4d, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32GeS, "i32.ge_s", 0, 0x4e, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32GeU, "i32.ge_u", 0, 0x4f, None, sig!([I32 I32] -> [I32]), Mvp),
    (I64Eqz, "i64.eqz", 0, 0x50, None, sig!([I64] -> [I32]), Mvp),
    (I64Eq, "i64.eq", 0, 0x51, None, sig!([I64 I64] -> [I32]), Mvp),
    (I64Ne, "i64.ne", 0, 0x52, None, sig!([I64 I64] -> [I32]), Mvp),
    (I64LtS, "i64.lt_s", 0, 0x53, None, sig!([I64 I64] -> [I32]), Mvp),
    (I64LtU, "i64.lt_u", 0, 0x54, None, sig!([I64 I64] -> [I32]), Mvp),
    (I64GtS, "i64.gt_s", 0, 0x55, None, sig!([I64 I64] -> [I32]), Mvp),
    (I64GtU, "i64.gt_u", 0, 0x56, None, sig!([I64 I64] -> [I32]), Mvp),
    (I64LeS, "i64.le_s", 0, 0x57, None, sig!([I64 I64] -> [I32]), Mvp),
    (I64LeU, "i64.le_u", 0, 0x58, None, sig!([I64 I64] -> [I32]), Mvp),
    (I64GeS, "i64.ge_s", 0, 0x59, None, sig!([I64 I64] -> [I32]), Mvp),
    (I64GeU, "i64.ge_u", 0, 0x5a, None, sig!([I64 I64] -> [I32]), Mvp),

    // Float comparisons.
    (F32Eq, "f32.eq", 0, 0x5b, None, sig!([F32 F32] -> [I32]), Mvp),
    (F32Ne, "f32.ne", 0, 0x5c, None, sig!([F32 F32] -> [I32]), Mvp),
    (F32Lt, "f32.lt", 0, 0x5d, None, sig!([F32 F32] -> [I32]), Mvp),
    (F32Gt, "f32.gt", 0, 0x5e, None, sig!([F32 F32] -> [I32]), Mvp),
    (F32Le, "f32.le", 0, 0x5f, None, sig!([F32 F32] -> [I32]), Mvp),
    (F32Ge, "f32.ge", 0, 0x60, None, sig!([F32 F32] -> [I32]), Mvp),
    (F64Eq, "f64.eq", 0, 0x61, None, sig!([F64 F64] -> [I32]), Mvp),
    (F64Ne, "f64.ne", 0, 0x62, None, sig!([F64 F64] -> [I32]), Mvp),
    (F64Lt, "f64.lt", 0, 0x63, None, sig!([F64 F64] -> [I32]), Mvp),
    (F64Gt, "f64.gt", 0, 0x64, None, sig!([F64 F64] -> [I32]), Mvp),
    (F64Le, "f64.le", 0, 0x65, None, sig!([F64 F64] -> [I32]), Mvp),
    (F64Ge, "f64.ge", 0, 0x66, None, sig!([F64 F64] -> [I32]), Mvp),

    // Integer arithmetic.
    (I32Clz, "i32.clz", 0, 0x67, None, sig!([I32] -> [I32]), Mvp),
    (I32Ctz, "i32.ctz", 0, 0x68, None, sig!([I32] -> [I32]), Mvp),
    (I32Popcnt, "i32.popcnt", 0, 0x69, None, sig!([I32] -> [I32]), Mvp),
    (I32Add, "i32.add", 0, 0x6a, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32Sub, "i32.sub", 0, 0x6b, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32Mul, "i32.mul", 0, 0x6c, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32DivS, "i32.div_s", 0, 0x6d, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32DivU, "i32.div_u", 0, 0x6e, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32RemS, "i32.rem_s", 0, 0x6f, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32RemU, "i32.rem_u", 0, 0x70, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32And, "i32.and", 0, 0x71, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32Or, "i32.or", 0, 0x72, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32Xor, "i32.xor", 0, 0x73, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32Shl, "i32.shl", 0, 0x74, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32ShrS, "i32.shr_s", 0, 0x75, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32ShrU, "i32.shr_u", 0, 0x76, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32Rotl, "i32.rotl", 0, 0x77, None, sig!([I32 I32] -> [I32]), Mvp),
    (I32Rotr, "i32.rotr", 0, 0x78, None, sig!([I32 I32] -> [I32]), Mvp),
    (I64Clz, "i64.clz", 0, 0x79, None, sig!([I64] -> [I64]), Mvp),
    (I64Ctz, "i64.ctz", 0, 0x7a, None, sig!([I64] -> [I64]), Mvp),
    (I64Popcnt, "i64.popcnt", 0, 0x7b, None, sig!([I64] -> [I64]), Mvp),
    (I64Add, "i64.add", 0, 0x7c, None, sig!([I64 I64] -> [I64]), Mvp),
    (I64Sub, "i64.sub", 0, 0x7d, None, sig!([I64 I64] -> [I64]), Mvp),
    (I64Mul, "i64.mul", 0, 0x7e, None, sig!([I64 I64] -> [I64]), Mvp),
    (I64DivS, "i64.div_s", 0, 0x7f, None, sig!([I64 I64] -> [I64]), Mvp),
    (I64DivU, "i64.div_u", 0, 0x80, None, sig!([I64 I64] -> [I64]), Mvp),
    (I64RemS, "i64.rem_s", 0, 0x81, None, sig!([I64 I64] -> [I64]), Mvp),
    (I64RemU, "i64.rem_u", 0, 0x82, None, sig!([I64 I64] -> [I64]), Mvp),
    (I64And, "i64.and", 0, 0x83, None, sig!([I64 I64] -> [I64]), Mvp),
    (I64Or, "i64.or", 0, 0x84, None, sig!([I64 I64] -> [I64]), Mvp),
    (I64Xor, "i64.xor", 0, 0x85, None, sig!([I64 I64] -> [I64]), Mvp),
    (I64Shl, "i64.shl", 0, 0x86, None, sig!([I64 I64] -> [I64]), Mvp),
    (I64ShrS, "i64.shr_s", 0, 0x87, None, sig!([I64 I64] -> [I64]), Mvp),
    (I64ShrU, "i64.shr_u", 0, 0x88, None, sig!([I64 I64] -> [I64]), Mvp),
    (I64Rotl, "i64.rotl", 0, 0x89, None, sig!([I64 I64] -> [I64]), Mvp),
    (I64Rotr, "i64.rotr", 0, 0x8a, None, sig!([I64 I64] -> [I64]), Mvp),

    // Float arithmetic.
    (F32Abs, "f32.abs", 0, 0x8b, None, sig!([F32] -> [F32]), Mvp),
    (F32Neg, "f32.neg", 0, 0x8c, None, sig!([F32] -> [F32]), Mvp),
    (F32Ceil, "f32.ceil", 0, 0x8d, None, sig!([F32] -> [F32]), Mvp),
    (F32Floor, "f32.floor", 0, 0x8e, None, sig!([F32] -> [F32]), Mvp),
    (F32Trunc, "f32.trunc", 0, 0x8f, None, sig!([F32] -> [F32]), Mvp),
    (F32Nearest, "f32.nearest", 0, 0x90, None, sig!([F32] -> [F32]), Mvp),
    (F32Sqrt, "f32.sqrt", 0, 0x91, None, sig!([F32] -> [F32]), Mvp),
    (F32Add, "f32.add", 0, 0x92, None, sig!([F32 F32] -> [F32]), Mvp),
    (F32Sub, "f32.sub", 0, 0x93, None, sig!([F32 F32] -> [F32]), Mvp),
    (F32Mul, "f32.mul", 0, 0x94, None, sig!([F32 F32] -> [F32]), Mvp),
    (F32Div, "f32.div", 0, 0x95, None, sig!([F32 F32] -> [F32]), Mvp),
    (F32Min, "f32.min", 0, 0x96, None, sig!([F32 F32] -> [F32]), Mvp),
    (F32Max, "f32.max", 0, 0x97, None, sig!([F32 F32] -> [F32]), Mvp),
    (F32Copysign, "f32.copysign", 0, 0x98, None, sig!([F32 F32] -> [F32]), Mvp),
    (F64Abs, "f64.abs", 0, 0x99, None, sig!([F64] -> [F64]), Mvp),
    (F64Neg, "f64.neg", 0, 0x9a, None, sig!([F64] -> [F64]), Mvp),
    (F64Ceil, "f64.ceil", 0, 0x9b, None, sig!([F64] -> [F64]), Mvp),
    (F64Floor, "f64.floor", 0, 0x9c, None, sig!([F64] -> [F64]), Mvp),
    (F64Trunc, "f64.trunc", 0, 0x9d, None, sig!([F64] -> [F64]), Mvp),
    (F64Nearest, "f64.nearest", 0, 0x9e, None, sig!([F64] -> [F64]), Mvp),
    (F64Sqrt, "f64.sqrt", 0, 0x9f, None, sig!([F64] -> [F64]), Mvp),
    (F64Add, "f64.add", 0, 0xa0, None, sig!([F64 F64] -> [F64]), Mvp),
    (F64Sub, "f64.sub", 0, 0xa1, None, sig!([F64 F64] -> [F64]), Mvp),
    (F64Mul, "f64.mul", 0, 0xa2, None, sig!([F64 F64] -> [F64]), Mvp),
    (F64Div, "f64.div", 0, 0xa3, None, sig!([F64 F64] -> [F64]), Mvp),
    (F64Min, "f64.min", 0, 0xa4, None, sig!([F64 F64] -> [F64]), Mvp),
    (F64Max, "f64.max", 0, 0xa5, None, sig!([F64 F64] -> [F64]), Mvp),
    (F64Copysign, "f64.copysign", 0, 0xa6, None, sig!([F64 F64] -> [F64]), Mvp),

    // Conversions.
    (I32WrapI64, "i32.wrap_i64", 0, 0xa7, None, sig!([I64] -> [I32]), Mvp),
    (I32TruncF32S, "i32.trunc_f32_s", 0, 0xa8, None, sig!([F32] -> [I32]), Mvp),
    (I32TruncF32U, "i32.trunc_f32_u", 0, 0xa9, None, sig!([F32] -> [I32]), Mvp),
    (I32TruncF64S, "i32.trunc_f64_s", 0, 0xaa, None, sig!([F64] -> [I32]), Mvp),
    (I32TruncF64U, "i32.trunc_f64_u", 0, 0xab, None, sig!([F64] -> [I32]), Mvp),
    (I64ExtendI32S, "i64.extend_i32_s", 0, 0xac, None, sig!([I32] -> [I64]), Mvp),
    (I64ExtendI32U, "i64.extend_i32_u", 0, 0xad, None, sig!([I32] -> [I64]), Mvp),
    (I64TruncF32S, "i64.trunc_f32_s", 0, 0xae, None, sig!([F32] -> [I64]), Mvp),
    (I64TruncF32U, "i64.trunc_f32_u", 0, 0xaf, None, sig!([F32] -> [I64]), Mvp),
    (I64TruncF64S, "i64.trunc_f64_s", 0, 0xb0, None, sig!([F64] -> [I64]), Mvp),
    (I64TruncF64U, "i64.trunc_f64_u", 0, 0xb1, None, sig!([F64] -> [I64]), Mvp),
    (F32ConvertI32S, "f32.convert_i32_s", 0, 0xb2, None, sig!([I32] -> [F32]), Mvp),
    (F32ConvertI32U, "f32.convert_i32_u", 0, 0xb3, None, sig!([I32] -> [F32]), Mvp),
    (F32ConvertI64S, "f32.convert_i64_s", 0, 0xb4, None, sig!([I64] -> [F32]), Mvp),
    (F32ConvertI64U, "f32.convert_i64_u", 0, 0xb5, None, sig!([I64] -> [F32]), Mvp),
    (F32DemoteF64, "f32.demote_f64", 0, 0xb6, None, sig!([F64] -> [F32]), Mvp),
    (F64ConvertI32S, "f64.convert_i32_s", 0, 0xb7, None, sig!([I32] -> [F64]), Mvp),
    (F64ConvertI32U, "f64.convert_i32_u", 0, 0xb8, None, sig!([I32] -> [F64]), Mvp),
    (F64ConvertI64S, "f64.convert_i64_s", 0, 0xb9, None, sig!([I64] -> [F64]), Mvp),
    (F64ConvertI64U, "f64.convert_i64_u", 0, 0xba, None, sig!([I64] -> [F64]), Mvp),
    (F64PromoteF32, "f64.promote_f32", 0, 0xbb, None, sig!([F32] -> [F64]), Mvp),
    (I32ReinterpretF32, "i32.reinterpret_f32", 0, 0xbc, None, sig!([F32] -> [I32]), Mvp),
    (I64ReinterpretF64, "i64.reinterpret_f64", 0, 0xbd, None, sig!([F64] -> [I64]), Mvp),
    (F32ReinterpretI32, "f32.reinterpret_i32", 0, 0xbe, None, sig!([I32] -> [F32]), Mvp),
    (F64ReinterpretI64, "f64.reinterpret_i64", 0, 0xbf, None, sig!([I64] -> [F64]), Mvp),

    // Sign-extension operators.
    (I32Extend8S, "i32.extend8_s", 0, 0xc0, None, sig!([I32] -> [I32]), SignExtension),
    (I32Extend16S, "i32.extend16_s", 0, 0xc1, None, sig!([I32] -> [I32]), SignExtension),
    (I64Extend8S, "i64.extend8_s", 0, 0xc2, None, sig!([I64] -> [I64]), SignExtension),
    (I64Extend16S, "i64.extend16_s", 0, 0xc3, None, sig!([I64] -> [I64]), SignExtension),
    (I64Extend32S, "i64.extend32_s", 0, 0xc4, None, sig!([I64] -> [I64]), SignExtension),

    // Reference operators.
    (RefNull, "ref.null", 0, 0xd0, RefType, sig!(special), ReferenceTypes),
    (RefIsNull, "ref.is_null", 0, 0xd1, None, sig!(special), ReferenceTypes),
    (RefFunc, "ref.func", 0, 0xd2, Func, sig!(special), ReferenceTypes),

    // Saturating float-to-int conversions (0xfc prefix).
    (I32TruncSatF32S, "i32.trunc_sat_f32_s", 0xfc, 0x00, None, sig!([F32] -> [I32]), NonTrappingFloatToInt),
    (I32TruncSatF32U, "i32.trunc_sat_f32_u", 0xfc, 0x01, None, sig!([F32] -> [I32]), NonTrappingFloatToInt),
    (I32TruncSatF64S, "i32.trunc_sat_f64_s", 0xfc, 0x02, None, sig!([F64] -> [I32]), NonTrappingFloatToInt),
    (I32TruncSatF64U, "i32.trunc_sat_f64_u", 0xfc, 0x03, None, sig!([F64] -> [I32]), NonTrappingFloatToInt),
    (I64TruncSatF32S, "i64.trunc_sat_f32_s", 0xfc, 0x04, None, sig!([F32] -> [I64]), NonTrappingFloatToInt),
    (I64TruncSatF32U, "i64.trunc_sat_f32_u", 0xfc, 0x05, None, sig!([F32] -> [I64]), NonTrappingFloatToInt),
    (I64TruncSatF64S, "i64.trunc_sat_f64_s", 0xfc, 0x06, None, sig!([F64] -> [I64]), NonTrappingFloatToInt),
    (I64TruncSatF64U, "i64.trunc_sat_f64_u", 0xfc, 0x07, None, sig!([F64] -> [I64]), NonTrappingFloatToInt),

    // Bulk memory and table operators (0xfc prefix).
    (MemoryInit, "memory.init", 0xfc, 0x08, DataMem, sig!(special), BulkMemory),
    (DataDrop, "data.drop", 0xfc, 0x09, Data, sig!(special), BulkMemory),
    (MemoryCopy, "memory.copy", 0xfc, 0x0a, MemMem, sig!(special), BulkMemory),
    (MemoryFill, "memory.fill", 0xfc, 0x0b, Mem, sig!(special), BulkMemory),
    (TableInit, "table.init", 0xfc, 0x0c, ElemTable, sig!(special), BulkMemory),
    (ElemDrop, "elem.drop", 0xfc, 0x0d, Elem, sig!(special), BulkMemory),
    (TableCopy, "table.copy", 0xfc, 0x0e, TableTable, sig!(special), BulkMemory),
    (TableGrow, "table.grow", 0xfc, 0x0f, Table, sig!(special), ReferenceTypes),
    (TableSize, "table.size", 0xfc, 0x10, Table, sig!(special), ReferenceTypes),
    (TableFill, "table.fill", 0xfc, 0x11, Table, sig!(special), BulkMemory),

    // SIMD memory access and lane shuffles (0xfd prefix).
    (V128Load, "v128.load", 0xfd, 0x00, MemArg, sig!([I32] -> [V128]), Simd),
    (V128Load8x8S, "v128.load8x8_s", 0xfd, 0x01, MemArg, sig!([I32] -> [V128]), Simd),
    (V128Load8x8U, "v128.load8x8_u", 0xfd, 0x02, MemArg, sig!([I32] -> [V128]), Simd),
    (V128Load16x4S, "v128.load16x4_s", 0xfd, 0x03, MemArg, sig!([I32] -> [V128]), Simd),
    (V128Load16x4U, "v128.load16x4_u", 0xfd, 0x04, MemArg, sig!([I32] -> [V128]), Simd),
    (V128Load32x2S, "v128.load32x2_s", 0xfd, 0x05, MemArg, sig!([I32] -> [V128]), Simd),
    (V128Load32x2U, "v128.load32x2_u", 0xfd, 0x06, MemArg, sig!([I32] -> [V128]), Simd),
    (V128Load8Splat, "v128.load8_splat", 0xfd, 0x07, MemArg, sig!([I32] -> [V128]), Simd),
    (V128Load16Splat, "v128.load16_splat", 0xfd, 0x08, MemArg, sig!([I32] -> [V128]), Simd),
    (V128Load32Splat, "v128.load32_splat", 0xfd, 0x09, MemArg, sig!([I32] -> [V128]), Simd),
    (V128Load64Splat, "v128.load64_splat", 0xfd, 0x0a, MemArg, sig!([I32] -> [V128]), Simd),
    (V128Store, "v128.store", 0xfd, 0x0b, MemArg, sig!([I32 V128] -> []), Simd),
    (V128ConstOp, "v128.const", 0xfd, 0x0c, V128, sig!([] -> [V128]), Simd),
    (I8x16Shuffle, "i8x16.shuffle", 0xfd, 0x0d, Shuffle, sig!([V128 V128] -> [V128]), Simd),
    (I8x16Swizzle, "i8x16.swizzle", 0xfd, 0x0e, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16Splat, "i8x16.splat", 0xfd, 0x0f, None, sig!([I32] -> [V128]), Simd),
    (I16x8Splat, "i16x8.splat", 0xfd, 0x10, None, sig!([I32] -> [V128]), Simd),
    (I32x4Splat, "i32x4.splat", 0xfd, 0x11, None, sig!([I32] -> [V128]), Simd),
    (I64x2Splat, "i64x2.splat", 0xfd, 0x12, None, sig!([I64] -> [V128]), Simd),
    (F32x4Splat, "f32x4.splat", 0xfd, 0x13, None, sig!([F32] -> [V128]), Simd),
    (F64x2Splat, "f64x2.splat", 0xfd, 0x14, None, sig!([F64] -> [V128]), Simd),
    (I8x16ExtractLaneS, "i8x16.extract_lane_s", 0xfd, 0x15, Lane, sig!([V128] -> [I32]), Simd),
    (I8x16ExtractLaneU, "i8x16.extract_lane_u", 0xfd, 0x16, Lane, sig!([V128] -> [I32]), Simd),
    (I8x16ReplaceLane, "i8x16.replace_lane", 0xfd, 0x17, Lane, sig!([V128 I32] -> [V128]), Simd),
    (I16x8ExtractLaneS, "i16x8.extract_lane_s", 0xfd, 0x18, Lane, sig!([V128] -> [I32]), Simd),
    (I16x8ExtractLaneU, "i16x8.extract_lane_u", 0xfd, 0x19, Lane, sig!([V128] -> [I32]), Simd),
    (I16x8ReplaceLane, "i16x8.replace_lane", 0xfd, 0x1a, Lane, sig!([V128 I32] -> [V128]), Simd),
    (I32x4ExtractLane, "i32x4.extract_lane", 0xfd, 0x1b, Lane, sig!([V128] -> [I32]), Simd),
    (I32x4ReplaceLane, "i32x4.replace_lane", 0xfd, 0x1c, Lane, sig!([V128 I32] -> [V128]), Simd),
    (I64x2ExtractLane, "i64x2.extract_lane", 0xfd, 0x1d, Lane, sig!([V128] -> [I64]), Simd),
    (I64x2ReplaceLane, "i64x2.replace_lane", 0xfd, 0x1e, Lane, sig!([V128 I64] -> [V128]), Simd),
    (F32x4ExtractLane, "f32x4.extract_lane", 0xfd, 0x1f, Lane, sig!([V128] -> [F32]), Simd),
    (F32x4ReplaceLane, "f32x4.replace_lane", 0xfd, 0x20, Lane, sig!([V128 F32] -> [V128]), Simd),
    (F64x2ExtractLane, "f64x2.extract_lane", 0xfd, 0x21, Lane, sig!([V128] -> [F64]), Simd),
    (F64x2ReplaceLane, "f64x2.replace_lane", 0xfd, 0x22, Lane, sig!([V128 F64] -> [V128]), Simd),

    // SIMD comparisons.
    (I8x16Eq, "i8x16.eq", 0xfd, 0x23, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16Ne, "i8x16.ne", 0xfd, 0x24, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16LtS, "i8x16.lt_s", 0xfd, 0x25, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16LtU, "i8x16.lt_u", 0xfd, 0x26, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16GtS, "i8x16.gt_s", 0xfd, 0x27, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16GtU, "i8x16.gt_u", 0xfd, 0x28, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16LeS, "i8x16.le_s", 0xfd, 0x29, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16LeU, "i8x16.le_u", 0xfd, 0x2a, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16GeS, "i8x16.ge_s", 0xfd, 0x2b, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16GeU, "i8x16.ge_u", 0xfd, 0x2c, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8Eq, "i16x8.eq", 0xfd, 0x2d, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8Ne, "i16x8.ne", 0xfd, 0x2e, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8LtS, "i16x8.lt_s", 0xfd, 0x2f, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8LtU, "i16x8.lt_u", 0xfd, 0x30, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8GtS, "i16x8.gt_s", 0xfd, 0x31, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8GtU, "i16x8.gt_u", 0xfd, 0x32, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8LeS, "i16x8.le_s", 0xfd, 0x33, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8LeU, "i16x8.le_u", 0xfd, 0x34, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8GeS, "i16x8.ge_s", 0xfd, 0x35, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8GeU, "i16x8.ge_u", 0xfd, 0x36, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4Eq, "i32x4.eq", 0xfd, 0x37, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4Ne, "i32x4.ne", 0xfd, 0x38, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4LtS, "i32x4.lt_s", 0xfd, 0x39, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4LtU, "i32x4.lt_u", 0xfd, 0x3a, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4GtS, "i32x4.gt_s", 0xfd, 0x3b, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4GtU, "i32x4.gt_u", 0xfd, 0x3c, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4LeS, "i32x4.le_s", 0xfd, 0x3d, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4LeU, "i32x4.le_u", 0xfd, 0x3e, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4GeS, "i32x4.ge_s", 0xfd, 0x3f, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4GeU, "i32x4.ge_u", 0xfd, 0x40, None, sig!([V128 V128] -> [V128]), Simd),
    (F32x4Eq, "f32x4.eq", 0xfd, 0x41, None, sig!([V128 V128] -> [V128]), Simd),
    (F32x4Ne, "f32x4.ne", 0xfd, 0x42, None, sig!([V128 V128] -> [V128]), Simd),
    (F32x4Lt, "f32x4.lt", 0xfd, 0x43, None, sig!([V128 V128] -> [V128]), Simd),
    (F32x4Gt, "f32x4.gt", 0xfd, 0x44, None, sig!([V128 V128] -> [V128]), Simd),
    (F32x4Le, "f32x4.le", 0xfd, 0x45, None, sig!([V128 V128] -> [V128]), Simd),
    (F32x4Ge, "f32x4.ge", 0xfd, 0x46, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Eq, "f64x2.eq", 0xfd, 0x47, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Ne, "f64x2.ne", 0xfd, 0x48, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Lt, "f64x2.lt", 0xfd, 0x49, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Gt, "f64x2.gt", 0xfd, 0x4a, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Le, "f64x2.le", 0xfd, 0x4b, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Ge, "f64x2.ge", 0xfd, 0x4c, None, sig!([V128 V128] -> [V128]), Simd),

    // SIMD bitwise operators.
    (V128Not, "v128.not", 0xfd, 0x4d, None, sig!([V128] -> [V128]), Simd),
    (V128And, "v128.and", 0xfd, 0x4e, None, sig!([V128 V128] -> [V128]), Simd),
    (V128Andnot, "v128.andnot", 0xfd, 0x4f, None, sig!([V128 V128] -> [V128]), Simd),
    (V128Or, "v128.or", 0xfd, 0x50, None, sig!([V128 V128] -> [V128]), Simd),
    (V128Xor, "v128.xor", 0xfd, 0x51, None, sig!([V128 V128] -> [V128]), Simd),
    (V128Bitselect, "v128.bitselect", 0xfd, 0x52, None, sig!([V128 V128 V128] -> [V128]), Simd),
    (V128AnyTrue, "v128.any_true", 0xfd, 0x53, None, sig!([V128] -> [I32]), Simd),

    // SIMD lane memory access.
    (V128Load8Lane, "v128.load8_lane", 0xfd, 0x54, MemArgLane, sig!([I32 V128] -> [V128]), Simd),
    (V128Load16Lane, "v128.load16_lane", 0xfd, 0x55, MemArgLane, sig!([I32 V128] -> [V128]), Simd),
    (V128Load32Lane, "v128.load32_lane", 0xfd, 0x56, MemArgLane, sig!([I32 V128] -> [V128]), Simd),
    (V128Load64Lane, "v128.load64_lane", 0xfd, 0x57, MemArgLane, sig!([I32 V128] -> [V128]), Simd),
    (V128Store8Lane, "v128.store8_lane", 0xfd, 0x58, MemArgLane, sig!([I32 V128] -> []), Simd),
    (V128Store16Lane, "v128.store16_lane", 0xfd, 0x59, MemArgLane, sig!([I32 V128] -> []), Simd),
    (V128Store32Lane, "v128.store32_lane", 0xfd, 0x5a, MemArgLane, sig!([I32 V128] -> []), Simd),
    (V128Store64Lane, "v128.store64_lane", 0xfd, 0x5b, MemArgLane, sig!([I32 V128] -> []), Simd),
    (V128Load32Zero, "v128.load32_zero", 0xfd, 0x5c, MemArg, sig!([I32] -> [V128]), Simd),
    (V128Load64Zero, "v128.load64_zero", 0xfd, 0x5d, MemArg, sig!([I32] -> [V128]), Simd),
    (F32x4DemoteF64x2Zero, "f32x4.demote_f64x2_zero", 0xfd, 0x5e, None, sig!([V128] -> [V128]), Simd),
    (F64x2PromoteLowF32x4, "f64x2.promote_low_f32x4", 0xfd, 0x5f, None, sig!([V128] -> [V128]), Simd),

    // SIMD i8x16 arithmetic.
    (I8x16Abs, "i8x16.abs", 0xfd, 0x60, None, sig!([V128] -> [V128]), Simd),
    (I8x16Neg, "i8x16.neg", 0xfd, 0x61, None, sig!([V128] -> [V128]), Simd),
    (I8x16Popcnt, "i8x16.popcnt", 0xfd, 0x62, None, sig!([V128] -> [V128]), Simd),
    (I8x16AllTrue, "i8x16.all_true", 0xfd, 0x63, None, sig!([V128] -> [I32]), Simd),
    (I8x16Bitmask, "i8x16.bitmask", 0xfd, 0x64, None, sig!([V128] -> [I32]), Simd),
    (I8x16NarrowI16x8S, "i8x16.narrow_i16x8_s", 0xfd, 0x65, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16NarrowI16x8U, "i8x16.narrow_i16x8_u", 0xfd, 0x66, None, sig!([V128 V128] -> [V128]), Simd),
    (F32x4Ceil, "f32x4.ceil", 0xfd, 0x67, None, sig!([V128] -> [V128]), Simd),
    (F32x4Floor, "f32x4.floor", 0xfd, 0x68, None, sig!([V128] -> [V128]), Simd),
    (F32x4Trunc, "f32x4.trunc", 0xfd, 0x69, None, sig!([V128] -> [V128]), Simd),
    (F32x4Nearest, "f32x4.nearest", 0xfd, 0x6a, None, sig!([V128] -> [V128]), Simd),
    (I8x16Shl, "i8x16.shl", 0xfd, 0x6b, None, sig!([V128 I32] -> [V128]), Simd),
    (I8x16ShrS, "i8x16.shr_s", 0xfd, 0x6c, None, sig!([V128 I32] -> [V128]), Simd),
    (I8x16ShrU, "i8x16.shr_u", 0xfd, 0x6d, None, sig!([V128 I32] -> [V128]), Simd),
    (I8x16Add, "i8x16.add", 0xfd, 0x6e, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16AddSatS, "i8x16.add_sat_s", 0xfd, 0x6f, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16AddSatU, "i8x16.add_sat_u", 0xfd, 0x70, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16Sub, "i8x16.sub", 0xfd, 0x71, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16SubSatS, "i8x16.sub_sat_s", 0xfd, 0x72, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16SubSatU, "i8x16.sub_sat_u", 0xfd, 0x73, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Ceil, "f64x2.ceil", 0xfd, 0x74, None, sig!([V128] -> [V128]), Simd),
    (F64x2Floor, "f64x2.floor", 0xfd, 0x75, None, sig!([V128] -> [V128]), Simd),
    (I8x16MinS, "i8x16.min_s", 0xfd, 0x76, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16MinU, "i8x16.min_u", 0xfd, 0x77, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16MaxS, "i8x16.max_s", 0xfd, 0x78, None, sig!([V128 V128] -> [V128]), Simd),
    (I8x16MaxU, "i8x16.max_u", 0xfd, 0x79, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Trunc, "f64x2.trunc", 0xfd, 0x7a, None, sig!([V128] -> [V128]), Simd),
    (I8x16AvgrU, "i8x16.avgr_u", 0xfd, 0x7b, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8ExtaddPairwiseI8x16S, "i16x8.extadd_pairwise_i8x16_s", 0xfd, 0x7c, None, sig!([V128] -> [V128]), Simd),
    (I16x8ExtaddPairwiseI8x16U, "i16x8.extadd_pairwise_i8x16_u", 0xfd, 0x7d, None, sig!([V128] -> [V128]), Simd),
    (I32x4ExtaddPairwiseI16x8S, "i32x4.extadd_pairwise_i16x8_s", 0xfd, 0x7e, None, sig!([V128] -> [V128]), Simd),
    (I32x4ExtaddPairwiseI16x8U, "i32x4.extadd_pairwise_i16x8_u", 0xfd, 0x7f, None, sig!([V128] -> [V128]), Simd),

    // SIMD i16x8 arithmetic.
    (I16x8Abs, "i16x8.abs", 0xfd, 0x80, None, sig!([V128] -> [V128]), Simd),
    (I16x8Neg, "i16x8.neg", 0xfd, 0x81, None, sig!([V128] -> [V128]), Simd),
    (I16x8Q15mulrSatS, "i16x8.q15mulr_sat_s", 0xfd, 0x82, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8AllTrue, "i16x8.all_true", 0xfd, 0x83, None, sig!([V128] -> [I32]), Simd),
    (I16x8Bitmask, "i16x8.bitmask", 0xfd, 0x84, None, sig!([V128] -> [I32]), Simd),
    (I16x8NarrowI32x4S, "i16x8.narrow_i32x4_s", 0xfd, 0x85, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8NarrowI32x4U, "i16x8.narrow_i32x4_u", 0xfd, 0x86, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8ExtendLowI8x16S, "i16x8.extend_low_i8x16_s", 0xfd, 0x87, None, sig!([V128] -> [V128]), Simd),
    (I16x8ExtendHighI8x16S, "i16x8.extend_high_i8x16_s", 0xfd, 0x88, None, sig!([V128] -> [V128]), Simd),
    (I16x8ExtendLowI8x16U, "i16x8.extend_low_i8x16_u", 0xfd, 0x89, None, sig!([V128] -> [V128]), Simd),
    (I16x8ExtendHighI8x16U, "i16x8.extend_high_i8x16_u", 0xfd, 0x8a, None, sig!([V128] -> [V128]), Simd),
    (I16x8Shl, "i16x8.shl", 0xfd, 0x8b, None, sig!([V128 I32] -> [V128]), Simd),
    (I16x8ShrS, "i16x8.shr_s", 0xfd, 0x8c, None, sig!([V128 I32] -> [V128]), Simd),
    (I16x8ShrU, "i16x8.shr_u", 0xfd, 0x8d, None, sig!([V128 I32] -> [V128]), Simd),
    (I16x8Add, "i16x8.add", 0xfd, 0x8e, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8AddSatS, "i16x8.add_sat_s", 0xfd, 0x8f, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8AddSatU, "i16x8.add_sat_u", 0xfd, 0x90, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8Sub, "i16x8.sub", 0xfd, 0x91, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8SubSatS, "i16x8.sub_sat_s", 0xfd, 0x92, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8SubSatU, "i16x8.sub_sat_u", 0xfd, 0x93, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Nearest, "f64x2.nearest", 0xfd, 0x94, None, sig!([V128] -> [V128]), Simd),
    (I16x8Mul, "i16x8.mul", 0xfd, 0x95, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8MinS, "i16x8.min_s", 0xfd, 0x96, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8MinU, "i16x8.min_u", 0xfd, 0x97, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8MaxS, "i16x8.max_s", 0xfd, 0x98, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8MaxU, "i16x8.max_u", 0xfd, 0x99, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8AvgrU, "i16x8.avgr_u", 0xfd, 0x9b, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8ExtmulLowI8x16S, "i16x8.extmul_low_i8x16_s", 0xfd, 0x9c, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8ExtmulHighI8x16S, "i16x8.extmul_high_i8x16_s", 0xfd, 0x9d, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8ExtmulLowI8x16U, "i16x8.extmul_low_i8x16_u", 0xfd, 0x9e, None, sig!([V128 V128] -> [V128]), Simd),
    (I16x8ExtmulHighI8x16U, "i16x8.extmul_high_i8x16_u", 0xfd, 0x9f, None, sig!([V128 V128] -> [V128]), Simd),

    // SIMD i32x4 arithmetic.
    (I32x4Abs, "i32x4.abs", 0xfd, 0xa0, None, sig!([V128] -> [V128]), Simd),
    (I32x4Neg, "i32x4.neg", 0xfd, 0xa1, None, sig!([V128] -> [V128]), Simd),
    (I32x4AllTrue, "i32x4.all_true", 0xfd, 0xa3, None, sig!([V128] -> [I32]), Simd),
    (I32x4Bitmask, "i32x4.bitmask", 0xfd, 0xa4, None, sig!([V128] -> [I32]), Simd),
    (I32x4ExtendLowI16x8S, "i32x4.extend_low_i16x8_s", 0xfd, 0xa7, None, sig!([V128] -> [V128]), Simd),
    (I32x4ExtendHighI16x8S, "i32x4.extend_high_i16x8_s", 0xfd, 0xa8, None, sig!([V128] -> [V128]), Simd),
    (I32x4ExtendLowI16x8U, "i32x4.extend_low_i16x8_u", 0xfd, 0xa9, None, sig!([V128] -> [V128]), Simd),
    (I32x4ExtendHighI16x8U, "i32x4.extend_high_i16x8_u", 0xfd, 0xaa, None, sig!([V128] -> [V128]), Simd),
    (I32x4Shl, "i32x4.shl", 0xfd, 0xab, None, sig!([V128 I32] -> [V128]), Simd),
    (I32x4ShrS, "i32x4.shr_s", 0xfd, 0xac, None, sig!([V128 I32] -> [V128]), Simd),
    (I32x4ShrU, "i32x4.shr_u", 0xfd, 0xad, None, sig!([V128 I32] -> [V128]), Simd),
    (I32x4Add, "i32x4.add", 0xfd, 0xae, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4Sub, "i32x4.sub", 0xfd, 0xb1, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4Mul, "i32x4.mul", 0xfd, 0xb5, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4MinS, "i32x4.min_s", 0xfd, 0xb6, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4MinU, "i32x4.min_u", 0xfd, 0xb7, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4MaxS, "i32x4.max_s", 0xfd, 0xb8, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4MaxU, "i32x4.max_u", 0xfd, 0xb9, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4DotI16x8S, "i32x4.dot_i16x8_s", 0xfd, 0xba, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4ExtmulLowI16x8S, "i32x4.extmul_low_i16x8_s", 0xfd, 0xbc, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4ExtmulHighI16x8S, "i32x4.extmul_high_i16x8_s", 0xfd, 0xbd, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4ExtmulLowI16x8U, "i32x4.extmul_low_i16x8_u", 0xfd, 0xbe, None, sig!([V128 V128] -> [V128]), Simd),
    (I32x4ExtmulHighI16x8U, "i32x4.extmul_high_i16x8_u", 0xfd, 0xbf, None, sig!([V128 V128] -> [V128]), Simd),

    // SIMD i64x2 arithmetic.
    (I64x2Abs, "i64x2.abs", 0xfd, 0xc0, None, sig!([V128] -> [V128]), Simd),
    (I64x2Neg, "i64x2.neg", 0xfd, 0xc1, None, sig!([V128] -> [V128]), Simd),
    (I64x2AllTrue, "i64x2.all_true", 0xfd, 0xc3, None, sig!([V128] -> [I32]), Simd),
    (I64x2Bitmask, "i64x2.bitmask", 0xfd, 0xc4, None, sig!([V128] -> [I32]), Simd),
    (I64x2ExtendLowI32x4S, "i64x2.extend_low_i32x4_s", 0xfd, 0xc7, None, sig!([V128] -> [V128]), Simd),
    (I64x2ExtendHighI32x4S, "i64x2.extend_high_i32x4_s", 0xfd, 0xc8, None, sig!([V128] -> [V128]), Simd),
    (I64x2ExtendLowI32x4U, "i64x2.extend_low_i32x4_u", 0xfd, 0xc9, None, sig!([V128] -> [V128]), Simd),
    (I64x2ExtendHighI32x4U, "i64x2.extend_high_i32x4_u", 0xfd, 0xca, None, sig!([V128] -> [V128]), Simd),
    (I64x2Shl, "i64x2.shl", 0xfd, 0xcb, None, sig!([V128 I32] -> [V128]), Simd),
    (I64x2ShrS, "i64x2.shr_s", 0xfd, 0xcc, None, sig!([V128 I32] -> [V128]), Simd),
    (I64x2ShrU, "i64x2.shr_u", 0xfd, 0xcd, None, sig!([V128 I32] -> [V128]), Simd),
    (I64x2Add, "i64x2.add", 0xfd, 0xce, None, sig!([V128 V128] -> [V128]), Simd),
    (I64x2Sub, "i64x2.sub", 0xfd, 0xd1, None, sig!([V128 V128] -> [V128]), Simd),
    (I64x2Mul, "i64x2.mul", 0xfd, 0xd5, None, sig!([V128 V128] -> [V128]), Simd),
    (I64x2Eq, "i64x2.eq", 0xfd, 0xd6, None, sig!([V128 V128] -> [V128]), Simd),
    (I64x2Ne, "i64x2.ne", 0xfd, 0xd7, None, sig!([V128 V128] -> [V128]), Simd),
    (I64x2LtS, "i64x2.lt_s", 0xfd, 0xd8, None, sig!([V128 V128] -> [V128]), Simd),
    (I64x2GtS, "i64x2.gt_s", 0xfd, 0xd9, None, sig!([V128 V128] -> [V128]), Simd),
    (I64x2LeS, "i64x2.le_s", 0xfd, 0xda, None, sig!([V128 V128] -> [V128]), Simd),
    (I64x2GeS, "i64x2.ge_s", 0xfd, 0xdb, None, sig!([V128 V128] -> [V128]), Simd),
    (I64x2ExtmulLowI32x4S, "i64x2.extmul_low_i32x4_s", 0xfd, 0xdc, None, sig!([V128 V128] -> [V128]), Simd),
    (I64x2ExtmulHighI32x4S, "i64x2.extmul_high_i32x4_s", 0xfd, 0xdd, None, sig!([V128 V128] -> [V128]), Simd),
    (I64x2ExtmulLowI32x4U, "i64x2.extmul_low_i32x4_u", 0xfd, 0xde, None, sig!([V128 V128] -> [V128]), Simd),
    (I64x2ExtmulHighI32x4U, "i64x2.extmul_high_i32x4_u", 0xfd, 0xdf, None, sig!([V128 V128] -> [V128]), Simd),

    // SIMD float arithmetic.
    (F32x4Abs, "f32x4.abs", 0xfd, 0xe0, None, sig!([V128] -> [V128]), Simd),
    (F32x4Neg, "f32x4.neg", 0xfd, 0xe1, None, sig!([V128] -> [V128]), Simd),
    (F32x4Sqrt, "f32x4.sqrt", 0xfd, 0xe3, None, sig!([V128] -> [V128]), Simd),
    (F32x4Add, "f32x4.add", 0xfd, 0xe4, None, sig!([V128 V128] -> [V128]), Simd),
    (F32x4Sub, "f32x4.sub", 0xfd, 0xe5, None, sig!([V128 V128] -> [V128]), Simd),
    (F32x4Mul, "f32x4.mul", 0xfd, 0xe6, None, sig!([V128 V128] -> [V128]), Simd),
    (F32x4Div, "f32x4.div", 0xfd, 0xe7, None, sig!([V128 V128] -> [V128]), Simd),
    (F32x4Min, "f32x4.min", 0xfd, 0xe8, None, sig!([V128 V128] -> [V128]), Simd),
    (F32x4Max, "f32x4.max", 0xfd, 0xe9, None, sig!([V128 V128] -> [V128]), Simd),
    (F32x4Pmin, "f32x4.pmin", 0xfd, 0xea, None, sig!([V128 V128] -> [V128]), Simd),
    (F32x4Pmax, "f32x4.pmax", 0xfd, 0xeb, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Abs, "f64x2.abs", 0xfd, 0xec, None, sig!([V128] -> [V128]), Simd),
    (F64x2Neg, "f64x2.neg", 0xfd, 0xed, None, sig!([V128] -> [V128]), Simd),
    (F64x2Sqrt, "f64x2.sqrt", 0xfd, 0xef, None, sig!([V128] -> [V128]), Simd),
    (F64x2Add, "f64x2.add", 0xfd, 0xf0, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Sub, "f64x2.sub", 0xfd, 0xf1, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Mul, "f64x2.mul", 0xfd, 0xf2, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Div, "f64x2.div", 0xfd, 0xf3, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Min, "f64x2.min", 0xfd, 0xf4, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Max, "f64x2.max", 0xfd, 0xf5, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Pmin, "f64x2.pmin", 0xfd, 0xf6, None, sig!([V128 V128] -> [V128]), Simd),
    (F64x2Pmax, "f64x2.pmax", 0xfd, 0xf7, None, sig!([V128 V128] -> [V128]), Simd),

    // SIMD conversions.
    (I32x4TruncSatF32x4S, "i32x4.trunc_sat_f32x4_s", 0xfd, 0xf8, None, sig!([V128] -> [V128]), Simd),
    (I32x4TruncSatF32x4U, "i32x4.trunc_sat_f32x4_u", 0xfd, 0xf9, None, sig!([V128] -> [V128]), Simd),
    (F32x4ConvertI32x4S, "f32x4.convert_i32x4_s", 0xfd, 0xfa, None, sig!([V128] -> [V128]), Simd),
    (F32x4ConvertI32x4U, "f32x4.convert_i32x4_u", 0xfd, 0xfb, None, sig!([V128] -> [V128]), Simd),
    (I32x4TruncSatF64x2SZero, "i32x4.trunc_sat_f64x2_s_zero", 0xfd, 0xfc, None, sig!([V128] -> [V128]), Simd),
    (I32x4TruncSatF64x2UZero, "i32x4.trunc_sat_f64x2_u_zero", 0xfd, 0xfd, None, sig!([V128] -> [V128]), Simd),
    (F64x2ConvertLowI32x4S, "f64x2.convert_low_i32x4_s", 0xfd, 0xfe, None, sig!([V128] -> [V128]), Simd),
    (F64x2ConvertLowI32x4U, "f64x2.convert_low_i32x4_u", 0xfd, 0xff, None, sig!([V128] -> [V128]), Simd),

    // Atomic wait, notify and fence (0xfe prefix).
    (MemoryAtomicNotify, "memory.atomic.notify", 0xfe, 0x00, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (MemoryAtomicWait32, "memory.atomic.wait32", 0xfe, 0x01, MemArg, sig!([I32 I32 I64] -> [I32]), Atomics),
    (MemoryAtomicWait64, "memory.atomic.wait64", 0xfe, 0x02, MemArg, sig!([I32 I64 I64] -> [I32]), Atomics),
    (AtomicFence, "atomic.fence", 0xfe, 0x03, Fence, sig!([] -> []), Atomics),

    // Atomic loads and stores.
    (I32AtomicLoad, "i32.atomic.load", 0xfe, 0x10, MemArg, sig!([I32] -> [I32]), Atomics),
    (I64AtomicLoad, "i64.atomic.load", 0xfe, 0x11, MemArg, sig!([I32] -> [I64]), Atomics),
    (I32AtomicLoad8U, "i32.atomic.load8_u", 0xfe, 0x12, MemArg, sig!([I32] -> [I32]), Atomics),
    (I32AtomicLoad16U, "i32.atomic.load16_u", 0xfe, 0x13, MemArg, sig!([I32] -> [I32]), Atomics),
    (I64AtomicLoad8U, "i64.atomic.load8_u", 0xfe, 0x14, MemArg, sig!([I32] -> [I64]), Atomics),
    (I64AtomicLoad16U, "i64.atomic.load16_u", 0xfe, 0x15, MemArg, sig!([I32] -> [I64]), Atomics),
    (I64AtomicLoad32U, "i64.atomic.load32_u", 0xfe, 0x16, MemArg, sig!([I32] -> [I64]), Atomics),
    (I32AtomicStore, "i32.atomic.store", 0xfe, 0x17, MemArg, sig!([I32 I32] -> []), Atomics),
    (I64AtomicStore, "i64.atomic.store", 0xfe, 0x18, MemArg, sig!([I32 I64] -> []), Atomics),
    (I32AtomicStore8, "i32.atomic.store8", 0xfe, 0x19, MemArg, sig!([I32 I32] -> []), Atomics),
    (I32AtomicStore16, "i32.atomic.store16", 0xfe, 0x1a, MemArg, sig!([I32 I32] -> []), Atomics),
    (I64AtomicStore8, "i64.atomic.store8", 0xfe, 0x1b, MemArg, sig!([I32 I64] -> []), Atomics),
    (I64AtomicStore16, "i64.atomic.store16", 0xfe, 0x1c, MemArg, sig!([I32 I64] -> []), Atomics),
    (I64AtomicStore32, "i64.atomic.store32", 0xfe, 0x1d, MemArg, sig!([I32 I64] -> []), Atomics),

    // Atomic read-modify-write.
    (I32AtomicRmwAdd, "i32.atomic.rmw.add", 0xfe, 0x1e, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I64AtomicRmwAdd, "i64.atomic.rmw.add", 0xfe, 0x1f, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I32AtomicRmw8AddU, "i32.atomic.rmw8.add_u", 0xfe, 0x20, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I32AtomicRmw16AddU, "i32.atomic.rmw16.add_u", 0xfe, 0x21, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I64AtomicRmw8AddU, "i64.atomic.rmw8.add_u", 0xfe, 0x22, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I64AtomicRmw16AddU, "i64.atomic.rmw16.add_u", 0xfe, 0x23, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I64AtomicRmw32AddU, "i64.atomic.rmw32.add_u", 0xfe, 0x24, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I32AtomicRmwSub, "i32.atomic.rmw.sub", 0xfe, 0x25, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I64AtomicRmwSub, "i64.atomic.rmw.sub", 0xfe, 0x26, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I32AtomicRmw8SubU, "i32.atomic.rmw8.sub_u", 0xfe, 0x27, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I32AtomicRmw16SubU, "i32.atomic.rmw16.sub_u", 0xfe, 0x28, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I64AtomicRmw8SubU, "i64.atomic.rmw8.sub_u", 0xfe, 0x29, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I64AtomicRmw16SubU, "i64.atomic.rmw16.sub_u", 0xfe, 0x2a, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I64AtomicRmw32SubU, "i64.atomic.rmw32.sub_u", 0xfe, 0x2b, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I32AtomicRmwAnd, "i32.atomic.rmw.and", 0xfe, 0x2c, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I64AtomicRmwAnd, "i64.atomic.rmw.and", 0xfe, 0x2d, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I32AtomicRmw8AndU, "i32.atomic.rmw8.and_u", 0xfe, 0x2e, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I32AtomicRmw16AndU, "i32.atomic.rmw16.and_u", 0xfe, 0x2f, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I64AtomicRmw8AndU, "i64.atomic.rmw8.and_u", 0xfe, 0x30, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I64AtomicRmw16AndU, "i64.atomic.rmw16.and_u", 0xfe, 0x31, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I64AtomicRmw32AndU, "i64.atomic.rmw32.and_u", 0xfe, 0x32, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I32AtomicRmwOr, "i32.atomic.rmw.or", 0xfe, 0x33, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I64AtomicRmwOr, "i64.atomic.rmw.or", 0xfe, 0x34, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I32AtomicRmw8OrU, "i32.atomic.rmw8.or_u", 0xfe, 0x35, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I32AtomicRmw16OrU, "i32.atomic.rmw16.or_u", 0xfe, 0x36, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I64AtomicRmw8OrU, "i64.atomic.rmw8.or_u", 0xfe, 0x37, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I64AtomicRmw16OrU, "i64.atomic.rmw16.or_u", 0xfe, 0x38, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I64AtomicRmw32OrU, "i64.atomic.rmw32.or_u", 0xfe, 0x39, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I32AtomicRmwXor, "i32.atomic.rmw.xor", 0xfe, 0x3a, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I64AtomicRmwXor, "i64.atomic.rmw.xor", 0xfe, 0x3b, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I32AtomicRmw8XorU, "i32.atomic.rmw8.xor_u", 0xfe, 0x3c, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I32AtomicRmw16XorU, "i32.atomic.rmw16.xor_u", 0xfe, 0x3d, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I64AtomicRmw8XorU, "i64.atomic.rmw8.xor_u", 0xfe, 0x3e, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I64AtomicRmw16XorU, "i64.atomic.rmw16.xor_u", 0xfe, 0x3f, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I64AtomicRmw32XorU, "i64.atomic.rmw32.xor_u", 0xfe, 0x40, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I32AtomicRmwXchg, "i32.atomic.rmw.xchg", 0xfe, 0x41, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I64AtomicRmwXchg, "i64.atomic.rmw.xchg", 0xfe, 0x42, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I32AtomicRmw8XchgU, "i32.atomic.rmw8.xchg_u", 0xfe, 0x43, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I32AtomicRmw16XchgU, "i32.atomic.rmw16.xchg_u", 0xfe, 0x44, MemArg, sig!([I32 I32] -> [I32]), Atomics),
    (I64AtomicRmw8XchgU, "i64.atomic.rmw8.xchg_u", 0xfe, 0x45, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I64AtomicRmw16XchgU, "i64.atomic.rmw16.xchg_u", 0xfe, 0x46, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I64AtomicRmw32XchgU, "i64.atomic.rmw32.xchg_u", 0xfe, 0x47, MemArg, sig!([I32 I64] -> [I64]), Atomics),
    (I32AtomicRmwCmpxchg, "i32.atomic.rmw.cmpxchg", 0xfe, 0x48, MemArg, sig!([I32 I32 I32] -> [I32]), Atomics),
    (I64AtomicRmwCmpxchg, "i64.atomic.rmw.cmpxchg", 0xfe, 0x49, MemArg, sig!([I32 I64 I64] -> [I64]), Atomics),
    (I32AtomicRmw8CmpxchgU, "i32.atomic.rmw8.cmpxchg_u", 0xfe, 0x4a, MemArg, sig!([I32 I32 I32] -> [I32]), Atomics),
    (I32AtomicRmw16CmpxchgU, "i32.atomic.rmw16.cmpxchg_u", 0xfe, 0x4b, MemArg, sig!([I32 I32 I32] -> [I32]), Atomics),
    (I64AtomicRmw8CmpxchgU, "i64.atomic.rmw8.cmpxchg_u", 0xfe, 0x4c, MemArg, sig!([I32 I64 I64] -> [I64]), Atomics),
    (I64AtomicRmw16CmpxchgU, "i64.atomic.rmw16.cmpxchg_u", 0xfe, 0x4d, MemArg, sig!([I32 I64 I64] -> [I64]), Atomics),
    (I64AtomicRmw32CmpxchgU, "i64.atomic.rmw32.cmpxchg_u", 0xfe, 0x4e, MemArg, sig!([I32 I64 I64] -> [I64]), Atomics),
}

impl Op {
    /// Returns the byte width of the memory access performed by the
    /// operator, or `None` if it does not access memory through a
    /// [`ImmKind::MemArg`] immediate.
    ///
    /// The validator caps the declared alignment of plain accesses at this
    /// width and requires the alignment of atomic accesses to equal it.
    pub fn access_width(self) -> Option<u32> {
        use Op::*;
        let width = match self {
            I32Load8S | I32Load8U | I64Load8S | I64Load8U | I32Store8 | I64Store8
            | V128Load8Splat | V128Load8Lane | V128Store8Lane | I32AtomicLoad8U
            | I64AtomicLoad8U | I32AtomicStore8 | I64AtomicStore8 | I32AtomicRmw8AddU
            | I64AtomicRmw8AddU | I32AtomicRmw8SubU | I64AtomicRmw8SubU | I32AtomicRmw8AndU
            | I64AtomicRmw8AndU | I32AtomicRmw8OrU | I64AtomicRmw8OrU | I32AtomicRmw8XorU
            | I64AtomicRmw8XorU | I32AtomicRmw8XchgU | I64AtomicRmw8XchgU
            | I32AtomicRmw8CmpxchgU | I64AtomicRmw8CmpxchgU => 1,
            I32Load16S | I32Load16U | I64Load16S | I64Load16U | I32Store16 | I64Store16
            | V128Load16Splat | V128Load16Lane | V128Store16Lane | I32AtomicLoad16U
            | I64AtomicLoad16U | I32AtomicStore16 | I64AtomicStore16 | I32AtomicRmw16AddU
            | I64AtomicRmw16AddU | I32AtomicRmw16SubU | I64AtomicRmw16SubU
            | I32AtomicRmw16AndU | I64AtomicRmw16AndU | I32AtomicRmw16OrU
            | I64AtomicRmw16OrU | I32AtomicRmw16XorU | I64AtomicRmw16XorU
            | I32AtomicRmw16XchgU | I64AtomicRmw16XchgU | I32AtomicRmw16CmpxchgU
            | I64AtomicRmw16CmpxchgU => 2,
            I32Load | F32Load | I64Load32S | I64Load32U | I32Store | F32Store | I64Store32
            | V128Load32Splat | V128Load32Zero | V128Load32Lane | V128Store32Lane
            | MemoryAtomicNotify | MemoryAtomicWait32 | I32AtomicLoad | I64AtomicLoad32U
            | I32AtomicStore | I64AtomicStore32 | I32AtomicRmwAdd | I64AtomicRmw32AddU
            | I32AtomicRmwSub | I64AtomicRmw32SubU | I32AtomicRmwAnd | I64AtomicRmw32AndU
            | I32AtomicRmwOr | I64AtomicRmw32OrU | I32AtomicRmwXor | I64AtomicRmw32XorU
            | I32AtomicRmwXchg | I64AtomicRmw32XchgU | I32AtomicRmwCmpxchg
            | I64AtomicRmw32CmpxchgU => 4,
            I64Load | F64Load | I64Store | F64Store | V128Load8x8S | V128Load8x8U
            | V128Load16x4S | V128Load16x4U | V128Load32x2S | V128Load32x2U
            | V128Load64Splat | V128Load64Zero | V128Load64Lane | V128Store64Lane
            | MemoryAtomicWait64 | I64AtomicLoad | I64AtomicStore | I64AtomicRmwAdd
            | I64AtomicRmwSub | I64AtomicRmwAnd | I64AtomicRmwOr | I64AtomicRmwXor
            | I64AtomicRmwXchg | I64AtomicRmwCmpxchg => 8,
            V128Load | V128Store => 16,
            _ => return Option::None,
        };
        Some(width)
    }

    /// Returns the number of lanes addressed by the operator's lane
    /// immediate, or `None` for operators without one.
    pub fn lane_count(self) -> Option<u8> {
        use Op::*;
        let lanes = match self {
            I8x16ExtractLaneS | I8x16ExtractLaneU | I8x16ReplaceLane | V128Load8Lane
            | V128Store8Lane | I8x16Shuffle => 16,
            I16x8ExtractLaneS | I16x8ExtractLaneU | I16x8ReplaceLane | V128Load16Lane
            | V128Store16Lane => 8,
            I32x4ExtractLane | I32x4ReplaceLane | V128Load32Lane | V128Store32Lane => 4,
            I64x2ExtractLane | I64x2ReplaceLane | V128Load64Lane | V128Store64Lane => 2,
            _ => return Option::None,
        };
        Some(lanes)
    }

    /// Returns `true` if the operator is an atomic memory access gated on
    /// the shared-memory requirement flag.
    pub fn is_atomic_access(self) -> bool {
        matches!(self.feature(), Feature::Atomics) && self != Self::AtomicFence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_roundtrip() {
        for op in [
            Op::Unreachable,
            Op::I32Add,
            Op::MemoryCopy,
            Op::V128Load,
            Op::F64x2ConvertLowI32x4U,
            Op::I64AtomicRmw32CmpxchgU,
            Op::Throw,
        ] {
            let (prefix, code) = op.encoding();
            assert_eq!(Op::from_encoding(prefix, code), Some(op));
        }
        assert_eq!(Op::from_encoding(0, 0xff), None);
        assert_eq!(Op::from_encoding(0xfc, 0x40), None);
    }

    #[test]
    fn features_gate_operators() {
        let mvp = Features::none();
        assert!(Op::I32Add.feature().is_enabled(&mvp));
        assert!(!Op::MemoryCopy.feature().is_enabled(&mvp));
        assert!(!Op::V128Load.feature().is_enabled(&mvp));
        let all = Features::default();
        assert!(Op::MemoryCopy.feature().is_enabled(&all));
        assert!(Op::I64AtomicRmwAdd.feature().is_enabled(&all));
    }

    #[test]
    fn access_widths() {
        assert_eq!(Op::I32Load.access_width(), Some(4));
        assert_eq!(Op::I64Load32U.access_width(), Some(4));
        assert_eq!(Op::V128Load.access_width(), Some(16));
        assert_eq!(Op::V128Load8x8S.access_width(), Some(8));
        assert_eq!(Op::I32Add.access_width(), None);
    }
}
