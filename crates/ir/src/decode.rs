//! Binary module decoding.
//!
//! The decoder performs the structural half of module loading: magic and
//! version, section ordering, LEB128 integers, UTF-8 names, and the
//! per-opcode immediates declared by the operator table. Anything beyond
//! structure (index bounds, typing, feature gating) is left to the
//! validator. Every failure carries the byte offset of the malformed
//! construct.

use crate::{
    instr::{BlockType, BrTableImm, Imm, Instr, MemArg},
    leb128::{self, LebError},
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
    op::{ImmKind, Op},
};
use core::fmt::{self, Display};
use cove_core::{FuncType, GlobalType, MemoryType, Mutability, TableType, ValType};

/// The magic bytes introducing every binary module.
const MAGIC: [u8; 4] = *b"\0asm";

/// The supported binary format version.
const VERSION: [u8; 4] = [1, 0, 0, 0];

/// A fatal decode failure at a byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// The byte offset of the malformed construct.
    pub offset: usize,
    /// The reason the construct is malformed.
    pub kind: DecodeErrorKind,
}

/// The reason a binary module is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// The input ended unexpectedly.
    UnexpectedEof,
    /// The input does not start with the `\0asm` magic.
    BadMagic,
    /// The input has an unsupported binary format version.
    BadVersion,
    /// An LEB128 integer does not fit its declared width.
    IntegerTooLarge,
    /// A name is not valid UTF-8.
    InvalidUtf8,
    /// A section id is not known.
    UnknownSection(u8),
    /// A known section appeared out of order or twice.
    SectionOutOfOrder,
    /// The declared section size does not match its content.
    SectionSizeMismatch,
    /// The declared function body size does not match its content.
    BodySizeMismatch,
    /// The function and code section declare different counts.
    FunctionCountMismatch,
    /// The data-count section disagrees with the data section.
    DataCountMismatch,
    /// An opcode is not in the operator table.
    UnknownOpcode {
        /// The opcode prefix, `0` for single-byte opcodes.
        prefix: u8,
        /// The opcode value.
        code: u32,
    },
    /// A value type byte is not known or not allowed here.
    InvalidValType(u8),
    /// A reference type byte is not a reference type.
    InvalidRefType(u8),
    /// Memory or table limits are malformed.
    InvalidLimits,
    /// An import or export kind byte is not known.
    InvalidExternKind(u8),
    /// A constant expression is not one of the allowed forms.
    InvalidConstExpr,
    /// An element segment has a malformed flag or payload.
    InvalidElemSegment,
    /// A data segment has a malformed flag.
    InvalidDataSegment,
    /// A reserved byte holds a non-zero value.
    InvalidReservedByte,
    /// A function body ended without its closing `end`.
    UnclosedBlock,
    /// Bytes remain after the final section.
    TrailingBytes,
    /// A mutability byte is neither `0` nor `1`.
    InvalidMutability(u8),
    /// A function type does not start with the `0x60` form byte.
    InvalidFuncTypeForm(u8),
    /// A function type declares too many parameters or results.
    FuncTypeTooLarge,
}

impl Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::BadMagic => write!(f, "missing \\0asm magic bytes"),
            Self::BadVersion => write!(f, "unsupported binary format version"),
            Self::IntegerTooLarge => write!(f, "integer does not fit its declared width"),
            Self::InvalidUtf8 => write!(f, "name is not valid UTF-8"),
            Self::UnknownSection(id) => write!(f, "unknown section id {id}"),
            Self::SectionOutOfOrder => write!(f, "section out of order or duplicated"),
            Self::SectionSizeMismatch => write!(f, "section size does not match its content"),
            Self::BodySizeMismatch => write!(f, "function body size does not match its content"),
            Self::FunctionCountMismatch => {
                write!(f, "function and code section counts disagree")
            }
            Self::DataCountMismatch => {
                write!(f, "data-count section disagrees with data section")
            }
            Self::UnknownOpcode { prefix: 0, code } => write!(f, "unknown opcode 0x{code:02x}"),
            Self::UnknownOpcode { prefix, code } => {
                write!(f, "unknown opcode 0x{prefix:02x} 0x{code:02x}")
            }
            Self::InvalidValType(byte) => write!(f, "invalid value type 0x{byte:02x}"),
            Self::InvalidRefType(byte) => write!(f, "invalid reference type 0x{byte:02x}"),
            Self::InvalidLimits => write!(f, "malformed limits"),
            Self::InvalidExternKind(byte) => write!(f, "invalid extern kind 0x{byte:02x}"),
            Self::InvalidConstExpr => write!(f, "malformed constant expression"),
            Self::InvalidElemSegment => write!(f, "malformed element segment"),
            Self::InvalidDataSegment => write!(f, "malformed data segment"),
            Self::InvalidReservedByte => write!(f, "reserved byte is not zero"),
            Self::UnclosedBlock => write!(f, "function body is missing its final `end`"),
            Self::TrailingBytes => write!(f, "trailing bytes after the final section"),
            Self::InvalidMutability(byte) => write!(f, "invalid mutability byte 0x{byte:02x}"),
            Self::InvalidFuncTypeForm(byte) => {
                write!(f, "invalid function type form byte 0x{byte:02x}")
            }
            Self::FuncTypeTooLarge => write!(f, "function type has too many entries"),
        }
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed binary at offset {}: {}", self.offset, self.kind)
    }
}

impl core::error::Error for DecodeError {}

/// A non-fatal oddity noticed while decoding.
///
/// Diagnostics never prevent a module from loading; they surface details
/// like unknown name subsections that were carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// The byte offset the diagnostic refers to.
    pub offset: usize,
    /// A human-readable description.
    pub message: String,
}

/// A positioned reader over the module bytes.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn err(&self, kind: DecodeErrorKind) -> DecodeError {
        DecodeError {
            offset: self.pos,
            kind,
        }
    }

    fn err_at(&self, offset: usize, kind: DecodeErrorKind) -> DecodeError {
        DecodeError { offset, kind }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| self.err(DecodeErrorKind::UnexpectedEof))?;
        self.pos += 1;
        Ok(byte)
    }

    fn raw(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| self.err(DecodeErrorKind::UnexpectedEof))?;
        let bytes = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn leb_err(&self, start: usize, error: LebError) -> DecodeError {
        let kind = match error {
            LebError::UnexpectedEof => DecodeErrorKind::UnexpectedEof,
            LebError::Overflow => DecodeErrorKind::IntegerTooLarge,
        };
        self.err_at(start, kind)
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let start = self.pos;
        let value = leb128::read_unsigned(self.bytes, &mut self.pos, 32)
            .map_err(|error| self.leb_err(start, error))?;
        Ok(value as u32)
    }

    fn u64_offset(&mut self) -> Result<u64, DecodeError> {
        let start = self.pos;
        leb128::read_unsigned(self.bytes, &mut self.pos, 64)
            .map_err(|error| self.leb_err(start, error))
    }

    fn s32(&mut self) -> Result<i32, DecodeError> {
        let start = self.pos;
        let value = leb128::read_signed(self.bytes, &mut self.pos, 32)
            .map_err(|error| self.leb_err(start, error))?;
        Ok(value as i32)
    }

    fn s64(&mut self) -> Result<i64, DecodeError> {
        let start = self.pos;
        leb128::read_signed(self.bytes, &mut self.pos, 64)
            .map_err(|error| self.leb_err(start, error))
    }

    fn s33(&mut self) -> Result<i64, DecodeError> {
        let start = self.pos;
        leb128::read_signed(self.bytes, &mut self.pos, 33)
            .map_err(|error| self.leb_err(start, error))
    }

    fn f32_bits(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.raw(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4 bytes")))
    }

    fn f64_bits(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.raw(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8 bytes")))
    }

    fn name(&mut self) -> Result<String, DecodeError> {
        let len = self.u32()? as usize;
        let start = self.pos;
        let bytes = self.raw(len)?;
        core::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| self.err_at(start, DecodeErrorKind::InvalidUtf8))
    }

    fn val_type(&mut self) -> Result<ValType, DecodeError> {
        let offset = self.pos;
        let byte = self.byte()?;
        val_type_from_byte(byte).ok_or_else(|| self.err_at(offset, DecodeErrorKind::InvalidValType(byte)))
    }

    /// Reads a value type that must be usable in declared positions.
    fn declared_val_type(&mut self) -> Result<ValType, DecodeError> {
        let offset = self.pos;
        let ty = self.val_type()?;
        if !ty.is_declarable() {
            return Err(self.err_at(offset, DecodeErrorKind::InvalidValType(0x6e)));
        }
        Ok(ty)
    }

    fn ref_type(&mut self) -> Result<ValType, DecodeError> {
        let offset = self.pos;
        let byte = self.byte()?;
        match val_type_from_byte(byte) {
            Some(ty) if ty.is_ref() && ty.is_declarable() => Ok(ty),
            _ => Err(self.err_at(offset, DecodeErrorKind::InvalidRefType(byte))),
        }
    }

    fn limits(&mut self) -> Result<(u32, Option<u32>, bool), DecodeError> {
        let offset = self.pos;
        let flags = self.byte()?;
        if flags > 0x03 {
            return Err(self.err_at(offset, DecodeErrorKind::InvalidLimits));
        }
        let has_max = flags & 0x01 != 0;
        let shared = flags & 0x02 != 0;
        let min = self.u32()?;
        let max = has_max.then(|| self.u32()).transpose()?;
        Ok((min, max, shared))
    }

    fn memory_type(&mut self) -> Result<MemoryType, DecodeError> {
        let offset = self.pos;
        let (min, max, shared) = self.limits()?;
        MemoryType::new(min, max, shared)
            .ok_or_else(|| self.err_at(offset, DecodeErrorKind::InvalidLimits))
    }

    fn table_type(&mut self) -> Result<TableType, DecodeError> {
        let element = self.ref_type()?;
        let offset = self.pos;
        let (min, max, shared) = self.limits()?;
        TableType::new(element, min, max, shared)
            .ok_or_else(|| self.err_at(offset, DecodeErrorKind::InvalidLimits))
    }

    fn global_type(&mut self) -> Result<GlobalType, DecodeError> {
        let content = self.declared_val_type()?;
        let offset = self.pos;
        let mutability = match self.byte()? {
            0 => Mutability::Const,
            1 => Mutability::Var,
            byte => return Err(self.err_at(offset, DecodeErrorKind::InvalidMutability(byte))),
        };
        Ok(GlobalType::new(content, mutability))
    }

    fn block_type(&mut self) -> Result<BlockType, DecodeError> {
        let offset = self.pos;
        let value = self.s33()?;
        if value >= 0 {
            return Ok(BlockType::Func(value as u32));
        }
        // Negative values are the one-byte shorthand forms.
        let byte = (value & 0x7f) as u8;
        if byte == 0x40 {
            return Ok(BlockType::Empty);
        }
        match val_type_from_byte(byte) {
            Some(ty) if ty.is_declarable() => Ok(BlockType::Value(ty)),
            _ => Err(self.err_at(offset, DecodeErrorKind::InvalidValType(byte))),
        }
    }

    fn mem_arg(&mut self) -> Result<MemArg, DecodeError> {
        let flags = self.u32()?;
        let memory = if flags & 0x40 != 0 { self.u32()? } else { 0 };
        let offset = self.u64_offset()?;
        Ok(MemArg {
            align: flags & !0x40,
            offset,
            memory,
        })
    }

    fn const_expr(&mut self) -> Result<ConstExpr, DecodeError> {
        let offset = self.pos;
        let instr = self.instr()?;
        let expr = match (instr.op, instr.imm) {
            (Op::I32Const, Imm::I32(value)) => ConstExpr::I32(value),
            (Op::I64Const, Imm::I64(value)) => ConstExpr::I64(value),
            (Op::F32Const, Imm::F32(bits)) => ConstExpr::F32(bits),
            (Op::F64Const, Imm::F64(bits)) => ConstExpr::F64(bits),
            (Op::V128ConstOp, Imm::V128(bits)) => ConstExpr::V128(bits),
            (Op::RefNull, Imm::RefType(ty)) => ConstExpr::RefNull(ty),
            (Op::RefFunc, Imm::Func(index)) => ConstExpr::RefFunc(index),
            (Op::GlobalGet, Imm::Global(index)) => ConstExpr::GlobalGet(index),
            _ => return Err(self.err_at(offset, DecodeErrorKind::InvalidConstExpr)),
        };
        let end = self.instr()?;
        if end.op != Op::End {
            return Err(self.err_at(offset, DecodeErrorKind::InvalidConstExpr));
        }
        Ok(expr)
    }

    /// Reads one operator together with its immediates.
    fn instr(&mut self) -> Result<Instr, DecodeError> {
        let offset = self.pos;
        let first = self.byte()?;
        let (prefix, code) = match first {
            0xfc | 0xfd | 0xfe => (first, self.u32()?),
            _ => (0, u32::from(first)),
        };
        let op = Op::from_encoding(prefix, code)
            .ok_or_else(|| self.err_at(offset, DecodeErrorKind::UnknownOpcode { prefix, code }))?;
        let imm = match op.imm_kind() {
            ImmKind::None => Imm::None,
            ImmKind::BlockType => Imm::BlockType(self.block_type()?),
            ImmKind::Label => Imm::Label(self.u32()?),
            ImmKind::BrTable => {
                let count = self.u32()? as usize;
                let mut targets = Vec::with_capacity(count.min(0x10000));
                for _ in 0..count {
                    targets.push(self.u32()?);
                }
                let default = self.u32()?;
                Imm::BrTable(Box::new(BrTableImm { targets, default }))
            }
            ImmKind::Local => Imm::Local(self.u32()?),
            ImmKind::Global => Imm::Global(self.u32()?),
            ImmKind::Func => Imm::Func(self.u32()?),
            ImmKind::Table => Imm::Table(self.u32()?),
            ImmKind::Mem => Imm::Mem(self.u32()?),
            ImmKind::Data => Imm::Data(self.u32()?),
            ImmKind::Elem => Imm::Elem(self.u32()?),
            ImmKind::Tag => Imm::Tag(self.u32()?),
            ImmKind::CallIndirect => {
                let ty = self.u32()?;
                let table = self.u32()?;
                Imm::CallIndirect { ty, table }
            }
            ImmKind::RefType => Imm::RefType(self.ref_type()?),
            ImmKind::SelectTypes => {
                let count = self.u32()? as usize;
                let mut types = Vec::with_capacity(count.min(0x10000));
                for _ in 0..count {
                    types.push(self.declared_val_type()?);
                }
                Imm::SelectTypes(types)
            }
            ImmKind::MemArg => Imm::MemArg(self.mem_arg()?),
            ImmKind::MemArgLane => {
                let memarg = self.mem_arg()?;
                let lane = self.byte()?;
                Imm::MemArgLane { memarg, lane }
            }
            ImmKind::Lane => Imm::Lane(self.byte()?),
            ImmKind::Shuffle => {
                let bytes = self.raw(16)?;
                Imm::Shuffle(bytes.try_into().expect("16 bytes"))
            }
            ImmKind::DataMem => {
                let data = self.u32()?;
                let mem = self.u32()?;
                Imm::DataMem { data, mem }
            }
            ImmKind::ElemTable => {
                let elem = self.u32()?;
                let table = self.u32()?;
                Imm::ElemTable { elem, table }
            }
            ImmKind::TableTable => {
                let dst = self.u32()?;
                let src = self.u32()?;
                Imm::TableTable { dst, src }
            }
            ImmKind::MemMem => {
                let dst = self.u32()?;
                let src = self.u32()?;
                Imm::MemMem { dst, src }
            }
            ImmKind::Fence => {
                let reserved_at = self.pos;
                if self.byte()? != 0 {
                    return Err(self.err_at(reserved_at, DecodeErrorKind::InvalidReservedByte));
                }
                Imm::None
            }
            ImmKind::I32 => Imm::I32(self.s32()?),
            ImmKind::I64 => Imm::I64(self.s64()?),
            ImmKind::F32 => Imm::F32(self.f32_bits()?),
            ImmKind::F64 => Imm::F64(self.f64_bits()?),
            ImmKind::V128 => {
                let bytes = self.raw(16)?;
                Imm::V128(u128::from_le_bytes(bytes.try_into().expect("16 bytes")))
            }
        };
        Ok(Instr { op, imm })
    }

    /// Reads instructions up to and including the `end` that closes the
    /// implicit function block.
    fn expr(&mut self) -> Result<Vec<Instr>, DecodeError> {
        let mut body = Vec::new();
        let mut depth = 0_usize;
        loop {
            if self.is_at_end() {
                return Err(self.err(DecodeErrorKind::UnclosedBlock));
            }
            let instr = self.instr()?;
            match instr.op {
                Op::Block | Op::Loop | Op::If | Op::Try => depth += 1,
                Op::End => {
                    if depth == 0 {
                        body.push(instr);
                        return Ok(body);
                    }
                    depth -= 1;
                }
                // `delegate` both closes its `try` and names a handler.
                Op::Delegate => {
                    if depth == 0 {
                        return Err(self.err(DecodeErrorKind::UnclosedBlock));
                    }
                    depth -= 1;
                }
                _ => {}
            }
            body.push(instr);
        }
    }
}

fn val_type_from_byte(byte: u8) -> Option<ValType> {
    Some(match byte {
        0x7f => ValType::I32,
        0x7e => ValType::I64,
        0x7d => ValType::F32,
        0x7c => ValType::F64,
        0x7b => ValType::V128,
        0x70 => ValType::FuncRef,
        0x6f => ValType::AnyRef,
        0x6e => ValType::NullRef,
        _ => return None,
    })
}

/// Decodes a binary module.
///
/// Returns the decoded [`Module`] along with non-fatal [`Diagnostic`]s, or
/// the first fatal [`DecodeError`]. The result is purely structural; run
/// the validator before compiling or instantiating it.
///
/// # Errors
///
/// If the input is not a structurally well-formed binary module.
pub fn decode(bytes: &[u8]) -> Result<(Module, Vec<Diagnostic>), DecodeError> {
    let mut reader = Reader::new(bytes);
    let mut diagnostics = Vec::new();
    let mut module = Module::default();

    let magic_at = reader.pos;
    let magic = reader.raw(4).map_err(|mut error| {
        error.kind = DecodeErrorKind::BadMagic;
        error.offset = magic_at;
        error
    })?;
    if magic != &MAGIC[..] {
        return Err(reader.err_at(magic_at, DecodeErrorKind::BadMagic));
    }
    let version_at = reader.pos;
    let version = reader.raw(4).map_err(|mut error| {
        error.kind = DecodeErrorKind::BadVersion;
        error.offset = version_at;
        error
    })?;
    if version != &VERSION[..] {
        return Err(reader.err_at(version_at, DecodeErrorKind::BadVersion));
    }

    // Type indices declared by the function section, consumed by the code
    // section.
    let mut func_type_indices: Vec<u32> = Vec::new();
    let mut last_order = 0_u8;

    while !reader.is_at_end() {
        let id_at = reader.pos;
        let id = reader.byte()?;
        let size = reader.u32()? as usize;
        let payload_start = reader.pos;
        let payload_end = payload_start
            .checked_add(size)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| reader.err_at(id_at, DecodeErrorKind::UnexpectedEof))?;

        if id == 0 {
            // Custom section: name followed by free-form bytes.
            let name = reader.name()?;
            if reader.pos > payload_end {
                return Err(reader.err_at(id_at, DecodeErrorKind::SectionSizeMismatch));
            }
            let content = reader.raw(payload_end - reader.pos)?.to_vec();
            if name == "name" {
                match decode_names(&content, payload_start) {
                    Ok(names) => module.names = names,
                    Err(diag) => diagnostics.push(diag),
                }
            }
            module.customs.push(CustomSection {
                name,
                bytes: content,
                placement: last_order,
            });
            continue;
        }

        let section = SectionId::from_u8(id)
            .ok_or_else(|| reader.err_at(id_at, DecodeErrorKind::UnknownSection(id)))?;
        if section.order() <= last_order {
            return Err(reader.err_at(id_at, DecodeErrorKind::SectionOutOfOrder));
        }
        last_order = section.order();

        match section {
            SectionId::Type => {
                let count = reader.u32()?;
                for _ in 0..count {
                    let form_at = reader.pos;
                    let form = reader.byte()?;
                    if form != 0x60 {
                        return Err(
                            reader.err_at(form_at, DecodeErrorKind::InvalidFuncTypeForm(form))
                        );
                    }
                    let num_params = reader.u32()? as usize;
                    let mut params = Vec::with_capacity(num_params.min(0x10000));
                    for _ in 0..num_params {
                        params.push(reader.declared_val_type()?);
                    }
                    let num_results = reader.u32()? as usize;
                    let mut results = Vec::with_capacity(num_results.min(0x10000));
                    for _ in 0..num_results {
                        results.push(reader.declared_val_type()?);
                    }
                    let ty = FuncType::new(params, results)
                        .map_err(|_| reader.err_at(form_at, DecodeErrorKind::FuncTypeTooLarge))?;
                    module.types.push(ty);
                }
            }
            SectionId::Import => {
                let count = reader.u32()?;
                for _ in 0..count {
                    let import_module = reader.name()?;
                    let name = reader.name()?;
                    let kind_at = reader.pos;
                    let desc = match reader.byte()? {
                        0 => ImportDesc::Func(reader.u32()?),
                        1 => ImportDesc::Table(reader.table_type()?),
                        2 => ImportDesc::Memory(reader.memory_type()?),
                        3 => ImportDesc::Global(reader.global_type()?),
                        4 => {
                            // Tag attribute byte, reserved as zero.
                            let attr_at = reader.pos;
                            if reader.byte()? != 0 {
                                return Err(reader
                                    .err_at(attr_at, DecodeErrorKind::InvalidReservedByte));
                            }
                            ImportDesc::Tag(reader.u32()?)
                        }
                        byte => {
                            return Err(
                                reader.err_at(kind_at, DecodeErrorKind::InvalidExternKind(byte))
                            )
                        }
                    };
                    module.imports.push(Import {
                        module: import_module,
                        name,
                        desc,
                    });
                }
            }
            SectionId::Function => {
                let count = reader.u32()?;
                for _ in 0..count {
                    func_type_indices.push(reader.u32()?);
                }
            }
            SectionId::Table => {
                let count = reader.u32()?;
                for _ in 0..count {
                    let ty = reader.table_type()?;
                    module.tables.push(ty);
                }
            }
            SectionId::Memory => {
                let count = reader.u32()?;
                for _ in 0..count {
                    let ty = reader.memory_type()?;
                    module.memories.push(ty);
                }
            }
            SectionId::Tag => {
                let count = reader.u32()?;
                for _ in 0..count {
                    let attr_at = reader.pos;
                    if reader.byte()? != 0 {
                        return Err(reader.err_at(attr_at, DecodeErrorKind::InvalidReservedByte));
                    }
                    module.tags.push(TagDef {
                        type_index: reader.u32()?,
                    });
                }
            }
            SectionId::Global => {
                let count = reader.u32()?;
                for _ in 0..count {
                    let ty = reader.global_type()?;
                    let init = reader.const_expr()?;
                    module.globals.push(GlobalDef { ty, init });
                }
            }
            SectionId::Export => {
                let count = reader.u32()?;
                for _ in 0..count {
                    let name = reader.name()?;
                    let kind_at = reader.pos;
                    let kind = reader.byte()?;
                    let index = reader.u32()?;
                    let index = match kind {
                        0 => ExternIndex::Func(index),
                        1 => ExternIndex::Table(index),
                        2 => ExternIndex::Memory(index),
                        3 => ExternIndex::Global(index),
                        4 => ExternIndex::Tag(index),
                        byte => {
                            return Err(
                                reader.err_at(kind_at, DecodeErrorKind::InvalidExternKind(byte))
                            )
                        }
                    };
                    module.exports.push(Export { name, index });
                }
            }
            SectionId::Start => {
                module.start = Some(reader.u32()?);
            }
            SectionId::Element => {
                let count = reader.u32()?;
                for _ in 0..count {
                    module.elems.push(decode_elem_segment(&mut reader)?);
                }
            }
            SectionId::DataCount => {
                module.data_count = Some(reader.u32()?);
            }
            SectionId::Code => {
                let count = reader.u32()? as usize;
                if count != func_type_indices.len() {
                    return Err(reader.err_at(id_at, DecodeErrorKind::FunctionCountMismatch));
                }
                for type_index in &func_type_indices {
                    let body_size = reader.u32()? as usize;
                    let body_start = reader.pos;
                    let body_end = body_start
                        .checked_add(body_size)
                        .filter(|&end| end <= bytes.len())
                        .ok_or_else(|| reader.err(DecodeErrorKind::UnexpectedEof))?;
                    let num_local_runs = reader.u32()? as usize;
                    let mut locals = Vec::with_capacity(num_local_runs.min(0x10000));
                    for _ in 0..num_local_runs {
                        let run = reader.u32()?;
                        let ty = reader.declared_val_type()?;
                        locals.push((run, ty));
                    }
                    let body = reader.expr()?;
                    if reader.pos != body_end {
                        return Err(
                            reader.err_at(body_start, DecodeErrorKind::BodySizeMismatch)
                        );
                    }
                    module.funcs.push(FuncDef {
                        type_index: *type_index,
                        locals,
                        body,
                    });
                }
            }
            SectionId::Data => {
                let count = reader.u32()?;
                if let Some(declared) = module.data_count {
                    if declared != count {
                        return Err(reader.err_at(id_at, DecodeErrorKind::DataCountMismatch));
                    }
                }
                for _ in 0..count {
                    let flag_at = reader.pos;
                    let flag = reader.u32()?;
                    let segment = match flag {
                        0 => {
                            let offset = reader.const_expr()?;
                            let len = reader.u32()? as usize;
                            DataSegment {
                                mode: DataSegmentMode::Active { memory: 0, offset },
                                bytes: reader.raw(len)?.to_vec(),
                                explicit_memory: false,
                            }
                        }
                        1 => {
                            let len = reader.u32()? as usize;
                            DataSegment {
                                mode: DataSegmentMode::Passive,
                                bytes: reader.raw(len)?.to_vec(),
                                explicit_memory: false,
                            }
                        }
                        2 => {
                            let memory = reader.u32()?;
                            let offset = reader.const_expr()?;
                            let len = reader.u32()? as usize;
                            DataSegment {
                                mode: DataSegmentMode::Active { memory, offset },
                                bytes: reader.raw(len)?.to_vec(),
                                explicit_memory: true,
                            }
                        }
                        _ => {
                            return Err(
                                reader.err_at(flag_at, DecodeErrorKind::InvalidDataSegment)
                            )
                        }
                    };
                    module.datas.push(segment);
                }
            }
        }

        if reader.pos != payload_end {
            return Err(reader.err_at(id_at, DecodeErrorKind::SectionSizeMismatch));
        }
    }

    if !func_type_indices.is_empty() && module.funcs.is_empty() {
        // A function section without a code section.
        return Err(reader.err(DecodeErrorKind::FunctionCountMismatch));
    }

    Ok((module, diagnostics))
}

fn decode_elem_segment(reader: &mut Reader<'_>) -> Result<ElemSegment, DecodeError> {
    let flag_at = reader.pos;
    let flag = reader.u32()?;
    if flag > 7 {
        return Err(reader.err_at(flag_at, DecodeErrorKind::InvalidElemSegment));
    }
    let is_exprs = flag & 0x04 != 0;
    let explicit_type = flag & 0x03 != 0;

    let mode = match flag & 0x03 {
        0 => ElemSegmentMode::Active {
            table: 0,
            offset: reader.const_expr()?,
        },
        1 => ElemSegmentMode::Passive,
        2 => {
            let table = reader.u32()?;
            let offset = reader.const_expr()?;
            ElemSegmentMode::Active { table, offset }
        }
        3 => ElemSegmentMode::Declared,
        _ => unreachable!(),
    };

    let ty = if explicit_type {
        if is_exprs {
            reader.ref_type()?
        } else {
            // Element kind byte: only `0x00` (funcref) is defined.
            let kind_at = reader.pos;
            if reader.byte()? != 0 {
                return Err(reader.err_at(kind_at, DecodeErrorKind::InvalidElemSegment));
            }
            ValType::FuncRef
        }
    } else {
        ValType::FuncRef
    };

    let count = reader.u32()? as usize;
    let items = if is_exprs {
        let mut exprs = Vec::with_capacity(count.min(0x10000));
        for _ in 0..count {
            exprs.push(reader.const_expr()?);
        }
        ElemItems::Exprs(exprs)
    } else {
        let mut funcs = Vec::with_capacity(count.min(0x10000));
        for _ in 0..count {
            funcs.push(reader.u32()?);
        }
        ElemItems::Funcs(funcs)
    };

    Ok(ElemSegment {
        mode,
        ty,
        items,
        explicit_type,
    })
}

/// Parses the `name` custom section payload.
///
/// Failures are reported as a [`Diagnostic`] rather than an error: the raw
/// section is preserved either way and debug names are best-effort.
fn decode_names(payload: &[u8], section_offset: usize) -> Result<Names, Diagnostic> {
    let mut reader = Reader::new(payload);
    let mut names = Names::default();
    let diag = |reader: &Reader<'_>, message: &str| Diagnostic {
        offset: section_offset + reader.pos,
        message: message.to_string(),
    };
    while !reader.is_at_end() {
        let id = reader
            .byte()
            .map_err(|_| diag(&reader, "truncated name subsection id"))?;
        let size = reader
            .u32()
            .map_err(|_| diag(&reader, "truncated name subsection size"))? as usize;
        let end = reader
            .pos
            .checked_add(size)
            .filter(|&end| end <= payload.len())
            .ok_or_else(|| diag(&reader, "name subsection overruns the section"))?;
        match id {
            0 => {
                names.module = Some(
                    reader
                        .name()
                        .map_err(|_| diag(&reader, "malformed module name"))?,
                );
            }
            1 => {
                let count = reader
                    .u32()
                    .map_err(|_| diag(&reader, "malformed function name map"))?;
                for _ in 0..count {
                    let index = reader
                        .u32()
                        .map_err(|_| diag(&reader, "malformed function name map"))?;
                    let name = reader
                        .name()
                        .map_err(|_| diag(&reader, "malformed function name map"))?;
                    names.funcs.push((index, name));
                }
            }
            2 => {
                let count = reader
                    .u32()
                    .map_err(|_| diag(&reader, "malformed local name map"))?;
                for _ in 0..count {
                    let func = reader
                        .u32()
                        .map_err(|_| diag(&reader, "malformed local name map"))?;
                    let num_locals = reader
                        .u32()
                        .map_err(|_| diag(&reader, "malformed local name map"))?;
                    let mut locals = Vec::new();
                    for _ in 0..num_locals {
                        let index = reader
                            .u32()
                            .map_err(|_| diag(&reader, "malformed local name map"))?;
                        let name = reader
                            .name()
                            .map_err(|_| diag(&reader, "malformed local name map"))?;
                        locals.push((index, name));
                    }
                    names.locals.push((func, locals));
                }
            }
            _ => {
                // Extended subsections (labels, types, ...) are carried in
                // the preserved raw section but not interpreted.
                reader.pos = end;
            }
        }
        if reader.pos != end {
            return Err(diag(&reader, "name subsection size mismatch"));
        }
    }
    names.funcs.sort_by_key(|(index, _)| *index);
    names.locals.sort_by_key(|(index, _)| *index);
    Ok(names)
}
