use crate::op::Op;
use cove_core::ValType;

/// The type of a structured control block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockType {
    /// The block has no parameters and no results.
    Empty,
    /// The block has no parameters and a single result.
    Value(ValType),
    /// The block's parameters and results are given by a function type index.
    Func(u32),
}

/// The immediate of a memory access operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct MemArg {
    /// Log2 of the static alignment hint.
    pub align: u32,
    /// The static address offset.
    pub offset: u64,
    /// The accessed memory index.
    ///
    /// Non-zero only when the multi-memory flag bit was set in the
    /// alignment field.
    pub memory: u32,
}

/// The immediate of a `br_table` operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrTableImm {
    /// The branch targets, selected by index.
    pub targets: Vec<u32>,
    /// The branch target for out-of-range indices.
    pub default: u32,
}

/// The immediate payload of an [`Instr`].
///
/// The payload variant always matches the [`ImmKind`](crate::ImmKind)
/// declared by the operator table row of the instruction's [`Op`]; the
/// decoder and the builders are the only constructors.
#[derive(Debug, Clone, PartialEq)]
pub enum Imm {
    /// No immediate.
    None,
    /// A structured block type.
    BlockType(BlockType),
    /// A label depth (`br`, `br_if`, `rethrow`, `delegate`).
    Label(u32),
    /// A branch table.
    BrTable(Box<BrTableImm>),
    /// A local index.
    Local(u32),
    /// A global index.
    Global(u32),
    /// A function index.
    Func(u32),
    /// A table index.
    Table(u32),
    /// A memory index.
    Mem(u32),
    /// A data segment index.
    Data(u32),
    /// An element segment index.
    Elem(u32),
    /// An exception tag index.
    Tag(u32),
    /// The type and table of a `call_indirect`.
    CallIndirect {
        /// The expected callee type index.
        ty: u32,
        /// The table holding the callees.
        table: u32,
    },
    /// A reference type (`ref.null`).
    RefType(ValType),
    /// The explicit result types of a typed `select`.
    SelectTypes(Vec<ValType>),
    /// A memory access immediate.
    MemArg(MemArg),
    /// A memory access immediate plus a vector lane index.
    MemArgLane {
        /// The memory access immediate.
        memarg: MemArg,
        /// The accessed lane.
        lane: u8,
    },
    /// A vector lane index.
    Lane(u8),
    /// The 16 lane selectors of `i8x16.shuffle`.
    Shuffle([u8; 16]),
    /// The data segment and memory of `memory.init`.
    DataMem {
        /// The source data segment.
        data: u32,
        /// The destination memory.
        mem: u32,
    },
    /// The element segment and table of `table.init`.
    ElemTable {
        /// The source element segment.
        elem: u32,
        /// The destination table.
        table: u32,
    },
    /// The destination and source tables of `table.copy`.
    TableTable {
        /// The destination table.
        dst: u32,
        /// The source table.
        src: u32,
    },
    /// The destination and source memories of `memory.copy`.
    MemMem {
        /// The destination memory.
        dst: u32,
        /// The source memory.
        src: u32,
    },
    /// An `i32` literal.
    I32(i32),
    /// An `i64` literal.
    I64(i64),
    /// An `f32` literal as its bit pattern.
    F32(u32),
    /// An `f64` literal as its bit pattern.
    F64(u64),
    /// A `v128` literal as its bit pattern.
    V128(u128),
}

/// A single decoded instruction: an operator plus its immediate payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    /// The operator.
    pub op: Op,
    /// The immediate payload, matching `op.imm_kind()`.
    pub imm: Imm,
}

impl Instr {
    /// Creates an [`Instr`] without immediates.
    ///
    /// # Panics
    ///
    /// In debug builds, if `op` declares an immediate.
    pub fn plain(op: Op) -> Self {
        debug_assert_eq!(op.imm_kind(), crate::op::ImmKind::None);
        Self { op, imm: Imm::None }
    }

    /// Creates an [`Instr`] with the given immediate payload.
    pub fn with_imm(op: Op, imm: Imm) -> Self {
        Self { op, imm }
    }
}
