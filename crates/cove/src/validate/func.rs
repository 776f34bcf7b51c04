//! Stack-polymorphic validation of one function body.
//!
//! The state is a value stack of known-or-unknown types and a control
//! stack of frames carrying label types, end types, the entry stack
//! height and the unreachable flag. Fixed-signature operators are typed
//! straight from the operator table; control flow, calls, variable access
//! and the bulk operators have dedicated rules.

use super::{ModuleContext, Reason, ValidationError};
use crate::Config;
use cove_core::{FuncType, ValType};
use cove_ir::{BlockType, Imm, ImmKind, Instr, MemArg, Op, Sig};

/// A type on the validation stack.
#[derive(Debug, Copy, Clone, PartialEq)]
enum StackType {
    /// A known value type.
    Known(ValType),
    /// Any type: produced below the entry height of unreachable frames.
    Unknown,
}

/// The structured operator that opened a control frame.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FrameKind {
    /// The implicit function body block.
    Body,
    /// A `block` frame.
    Block,
    /// A `loop` frame: branches target the loop header.
    Loop,
    /// An `if` frame, tracking whether `else` was seen.
    If {
        /// Whether the false arm has started.
        has_else: bool,
    },
    /// A `try` frame, tracking whether a handler arm has started.
    Try {
        /// Whether validation is inside a `catch`/`catch_all` arm.
        in_catch: bool,
    },
}

/// A control stack frame.
#[derive(Debug, Clone)]
struct Frame {
    kind: FrameKind,
    /// The block parameter types.
    params: Vec<ValType>,
    /// The block result types.
    results: Vec<ValType>,
    /// The value stack height at frame entry.
    height: usize,
    /// Whether the remainder of the frame is unreachable.
    unreachable: bool,
}

impl Frame {
    /// The types a branch to this frame's label must provide.
    ///
    /// Loops label their header, so branches carry the parameters;
    /// every other frame labels its end and carries the results.
    fn label_types(&self) -> &[ValType] {
        match self.kind {
            FrameKind::Loop => &self.params,
            _ => &self.results,
        }
    }
}

struct FuncValidator<'a> {
    ctx: &'a ModuleContext<'a>,
    /// Parameter types followed by the expanded local types.
    locals: Vec<ValType>,
    stack: Vec<StackType>,
    frames: Vec<Frame>,
    position: usize,
}

/// Validates the body of one defined function.
pub(crate) fn validate_function(
    ctx: &ModuleContext<'_>,
    config: &Config,
    def: &cove_ir::FuncDef,
) -> Result<(), ValidationError> {
    let ty = ctx
        .module
        .types
        .get(def.type_index as usize)
        .cloned()
        .unwrap_or_default();

    let num_locals = def.num_locals();
    if num_locals > u64::from(config.max_locals()) {
        return Err(ValidationError {
            function: None,
            position: 0,
            reason: Reason::TooManyLocals { count: num_locals },
        });
    }

    let mut locals: Vec<ValType> = ty.params().to_vec();
    for (count, local_ty) in &def.locals {
        locals.extend(core::iter::repeat(*local_ty).take(*count as usize));
    }

    let mut validator = FuncValidator {
        ctx,
        locals,
        stack: Vec::new(),
        frames: vec![Frame {
            kind: FrameKind::Body,
            params: Vec::new(),
            results: ty.results().to_vec(),
            height: 0,
            unreachable: false,
        }],
        position: 0,
    };

    for (position, instr) in def.body.iter().enumerate() {
        validator.position = position;
        if validator.frames.is_empty() {
            return Err(validator.error(Reason::TrailingInstructions));
        }
        validator.instr(instr)?;
    }
    if !validator.frames.is_empty() {
        return Err(validator.error(Reason::UnclosedBlocks));
    }
    Ok(())
}

impl<'a> FuncValidator<'a> {
    fn error(&self, reason: Reason) -> ValidationError {
        ValidationError {
            function: None,
            position: self.position,
            reason,
        }
    }

    fn top_frame(&self) -> &Frame {
        self.frames.last().expect("control stack is never empty here")
    }

    fn push(&mut self, ty: ValType) {
        self.stack.push(StackType::Known(ty));
    }

    fn push_unknown(&mut self) {
        self.stack.push(StackType::Unknown);
    }

    /// Pops any value, yielding `Unknown` below the entry height of an
    /// unreachable frame.
    fn pop_any(&mut self) -> Result<StackType, ValidationError> {
        let frame = self.top_frame();
        if self.stack.len() == frame.height {
            if frame.unreachable {
                return Ok(StackType::Unknown);
            }
            return Err(self.error(Reason::StackHeightMismatch));
        }
        Ok(self.stack.pop().expect("height checked above"))
    }

    /// Pops a value and checks it against `expected` under subtyping.
    fn pop_expect(&mut self, expected: ValType) -> Result<(), ValidationError> {
        match self.pop_any()? {
            StackType::Unknown => Ok(()),
            StackType::Known(found) if found.is_subtype_of(&expected) => Ok(()),
            StackType::Known(found) => Err(self.error(Reason::TypeMismatch {
                expected,
                found: Some(found),
            })),
        }
    }

    /// Pops the given types right-to-left.
    fn pop_types(&mut self, types: &[ValType]) -> Result<(), ValidationError> {
        for ty in types.iter().rev() {
            self.pop_expect(*ty)?;
        }
        Ok(())
    }

    fn push_types(&mut self, types: &[ValType]) {
        for ty in types {
            self.push(*ty);
        }
    }

    /// Marks the current frame unreachable and truncates the stack to its
    /// entry height.
    fn set_unreachable(&mut self) {
        let frame = self.frames.last_mut().expect("control stack is not empty");
        frame.unreachable = true;
        let height = frame.height;
        self.stack.truncate(height);
    }

    /// Resolves a block type to its parameter and result tuples.
    fn block_signature(
        &self,
        block_type: BlockType,
    ) -> Result<(Vec<ValType>, Vec<ValType>), ValidationError> {
        match block_type {
            BlockType::Empty => Ok((Vec::new(), Vec::new())),
            BlockType::Value(ty) => Ok((Vec::new(), vec![ty])),
            BlockType::Func(index) => {
                if !self.ctx.features.multi_value {
                    return Err(self.error(Reason::FeatureDisabled {
                        feature: "multi-value",
                    }));
                }
                let ty = self.func_type_at(index)?;
                Ok((ty.params().to_vec(), ty.results().to_vec()))
            }
        }
    }

    fn func_type_at(&self, index: u32) -> Result<&'a FuncType, ValidationError> {
        self.ctx
            .module
            .types
            .get(index as usize)
            .ok_or_else(|| {
                self.error(Reason::IndexOutOfBounds {
                    space: "type",
                    index,
                })
            })
    }

    fn push_frame(
        &mut self,
        kind: FrameKind,
        params: Vec<ValType>,
        results: Vec<ValType>,
    ) -> Result<(), ValidationError> {
        self.pop_types(&params)?;
        let height = self.stack.len();
        self.push_types(&params);
        self.frames.push(Frame {
            kind,
            params,
            results,
            height,
            unreachable: false,
        });
        Ok(())
    }

    /// Verifies the stack matches the current frame's results and
    /// truncates back to the entry height. Used by `end`, `else`,
    /// `catch` and `delegate`.
    fn check_frame_end(&mut self) -> Result<Frame, ValidationError> {
        let results = self.top_frame().results.clone();
        self.pop_types(&results)?;
        let frame = self.top_frame();
        if self.stack.len() != frame.height && !frame.unreachable {
            return Err(self.error(Reason::UnbalancedBlockEnd));
        }
        let height = frame.height;
        self.stack.truncate(height);
        Ok(self.frames.pop().expect("control stack is not empty"))
    }

    fn label(&self, depth: u32) -> Result<&Frame, ValidationError> {
        self.frames
            .len()
            .checked_sub(1 + depth as usize)
            .map(|index| &self.frames[index])
            .ok_or_else(|| self.error(Reason::LabelOutOfBounds { depth }))
    }

    /// Checks the memory-access immediate of the operator.
    fn check_mem_arg(&self, op: Op, memarg: &MemArg) -> Result<(), ValidationError> {
        let memory_ty = self
            .ctx
            .module
            .memory_type(memarg.memory)
            .ok_or_else(|| {
                self.error(Reason::IndexOutOfBounds {
                    space: "memory",
                    index: memarg.memory,
                })
            })?;
        let width = op.access_width().expect("memarg operators access memory");
        let is_atomic = op.is_atomic_access();
        let natural = width.trailing_zeros();
        if is_atomic {
            if memarg.align != natural {
                return Err(self.error(Reason::AtomicAlignmentMismatch));
            }
            if self.ctx.features.require_shared_memory_for_atomics && !memory_ty.is_shared() {
                return Err(self.error(Reason::AtomicRequiresSharedMemory));
            }
        } else if memarg.align > natural {
            return Err(self.error(Reason::InvalidAlignment));
        }
        Ok(())
    }

    fn local_type(&self, index: u32) -> Result<ValType, ValidationError> {
        self.locals.get(index as usize).copied().ok_or_else(|| {
            self.error(Reason::IndexOutOfBounds {
                space: "local",
                index,
            })
        })
    }

    fn global_type(&self, index: u32) -> Result<cove_core::GlobalType, ValidationError> {
        self.ctx.module.global_type(index).ok_or_else(|| {
            self.error(Reason::IndexOutOfBounds {
                space: "global",
                index,
            })
        })
    }

    fn table_type(&self, index: u32) -> Result<cove_core::TableType, ValidationError> {
        self.ctx.module.table_type(index).ok_or_else(|| {
            self.error(Reason::IndexOutOfBounds {
                space: "table",
                index,
            })
        })
    }

    fn tag_params(&self, index: u32) -> Result<Vec<ValType>, ValidationError> {
        let type_index = self.ctx.module.tag_type_index(index).ok_or_else(|| {
            self.error(Reason::IndexOutOfBounds {
                space: "tag",
                index,
            })
        })?;
        Ok(self.func_type_at(type_index)?.params().to_vec())
    }

    fn check_data_index(&self, index: u32) -> Result<(), ValidationError> {
        if self.ctx.module.data_count.is_none() {
            return Err(self.error(Reason::MissingDataCount));
        }
        let count = self
            .ctx
            .module
            .data_count
            .unwrap_or(self.ctx.module.datas.len() as u32);
        if index >= count {
            return Err(self.error(Reason::IndexOutOfBounds {
                space: "data segment",
                index,
            }));
        }
        Ok(())
    }

    fn check_elem_index(&self, index: u32) -> Result<ValType, ValidationError> {
        self.ctx
            .module
            .elems
            .get(index as usize)
            .map(|segment| segment.ty)
            .ok_or_else(|| {
                self.error(Reason::IndexOutOfBounds {
                    space: "element segment",
                    index,
                })
            })
    }

    fn instr(&mut self, instr: &Instr) -> Result<(), ValidationError> {
        let op = instr.op;
        let feature = op.feature();
        if !feature.is_enabled(self.ctx.features) {
            return Err(self.error(Reason::FeatureDisabled {
                feature: feature.name(),
            }));
        }

        // Immediate checks shared by whole operator classes.
        match (&instr.imm, op.imm_kind()) {
            (Imm::MemArg(memarg), ImmKind::MemArg) => self.check_mem_arg(op, memarg)?,
            (Imm::MemArgLane { memarg, lane }, ImmKind::MemArgLane) => {
                self.check_mem_arg(op, memarg)?;
                if *lane >= op.lane_count().expect("lane operators have lane counts") {
                    return Err(self.error(Reason::LaneOutOfBounds));
                }
            }
            (Imm::Lane(lane), ImmKind::Lane) => {
                if *lane >= op.lane_count().expect("lane operators have lane counts") {
                    return Err(self.error(Reason::LaneOutOfBounds));
                }
            }
            (Imm::Shuffle(lanes), ImmKind::Shuffle) => {
                if lanes.iter().any(|lane| *lane >= 32) {
                    return Err(self.error(Reason::LaneOutOfBounds));
                }
            }
            (Imm::Mem(index), ImmKind::Mem) => {
                self.ctx.module.memory_type(*index).ok_or_else(|| {
                    self.error(Reason::IndexOutOfBounds {
                        space: "memory",
                        index: *index,
                    })
                })?;
            }
            _ => {}
        }

        if let Sig::Fixed(params, results) = op.signature() {
            self.pop_types(params)?;
            self.push_types(results);
            return Ok(());
        }

        match (op, &instr.imm) {
            (Op::Unreachable, _) => self.set_unreachable(),
            (Op::Block, Imm::BlockType(bt)) => {
                let (params, results) = self.block_signature(*bt)?;
                self.push_frame(FrameKind::Block, params, results)?;
            }
            (Op::Loop, Imm::BlockType(bt)) => {
                let (params, results) = self.block_signature(*bt)?;
                self.push_frame(FrameKind::Loop, params, results)?;
            }
            (Op::If, Imm::BlockType(bt)) => {
                self.pop_expect(ValType::I32)?;
                let (params, results) = self.block_signature(*bt)?;
                self.push_frame(FrameKind::If { has_else: false }, params, results)?;
            }
            (Op::Try, Imm::BlockType(bt)) => {
                let (params, results) = self.block_signature(*bt)?;
                self.push_frame(FrameKind::Try { in_catch: false }, params, results)?;
            }
            (Op::Else, _) => {
                let frame = self.check_frame_end()?;
                let FrameKind::If { has_else: false } = frame.kind else {
                    return Err(self.error(Reason::MisplacedBlockTerminator));
                };
                let params = frame.params.clone();
                self.frames.push(Frame {
                    kind: FrameKind::If { has_else: true },
                    height: self.stack.len(),
                    unreachable: false,
                    ..frame
                });
                self.push_types(&params);
            }
            (Op::Catch, Imm::Tag(tag)) => {
                let params = self.tag_params(*tag)?;
                let frame = self.check_frame_end()?;
                let FrameKind::Try { .. } = frame.kind else {
                    return Err(self.error(Reason::MisplacedBlockTerminator));
                };
                self.frames.push(Frame {
                    kind: FrameKind::Try { in_catch: true },
                    height: self.stack.len(),
                    unreachable: false,
                    ..frame
                });
                self.push_types(&params);
            }
            (Op::CatchAll, _) => {
                let frame = self.check_frame_end()?;
                let FrameKind::Try { .. } = frame.kind else {
                    return Err(self.error(Reason::MisplacedBlockTerminator));
                };
                self.frames.push(Frame {
                    kind: FrameKind::Try { in_catch: true },
                    height: self.stack.len(),
                    unreachable: false,
                    ..frame
                });
            }
            (Op::Delegate, Imm::Label(depth)) => {
                let frame = self.check_frame_end()?;
                let FrameKind::Try { in_catch: false } = frame.kind else {
                    return Err(self.error(Reason::MisplacedBlockTerminator));
                };
                if self.frames.is_empty() {
                    return Err(self.error(Reason::LabelOutOfBounds { depth: *depth }));
                }
                self.label(*depth)?;
                self.push_types(&frame.results);
            }
            (Op::Throw, Imm::Tag(tag)) => {
                let params = self.tag_params(*tag)?;
                self.pop_types(&params)?;
                self.set_unreachable();
            }
            (Op::Rethrow, Imm::Label(depth)) => {
                let target = self.label(*depth)?;
                let FrameKind::Try { in_catch: true } = target.kind else {
                    return Err(self.error(Reason::MisplacedBlockTerminator));
                };
                self.set_unreachable();
            }
            (Op::End, _) => {
                let frame = self.check_frame_end()?;
                // An `if` without `else` must be a no-op on the types.
                if let FrameKind::If { has_else: false } = frame.kind {
                    if frame.params != frame.results {
                        return Err(self.error(Reason::UnbalancedBlockEnd));
                    }
                }
                self.push_types(&frame.results);
            }
            (Op::Br, Imm::Label(depth)) => {
                let types = self.label(*depth)?.label_types().to_vec();
                self.pop_types(&types)?;
                self.set_unreachable();
            }
            (Op::BrIf, Imm::Label(depth)) => {
                self.pop_expect(ValType::I32)?;
                let types = self.label(*depth)?.label_types().to_vec();
                self.pop_types(&types)?;
                self.push_types(&types);
            }
            (Op::BrTable, Imm::BrTable(table)) => {
                self.pop_expect(ValType::I32)?;
                let default_types = self.label(table.default)?.label_types().to_vec();
                for target in &table.targets {
                    let target_types = self.label(*target)?.label_types();
                    if target_types != default_types.as_slice() {
                        return Err(self.error(Reason::BranchTableArityMismatch));
                    }
                }
                self.pop_types(&default_types)?;
                self.set_unreachable();
            }
            (Op::Return, _) => {
                let types = self.frames[0].results.clone();
                self.pop_types(&types)?;
                self.set_unreachable();
            }
            (Op::Call, Imm::Func(index)) => {
                let ty = self
                    .ctx
                    .module
                    .func_type(*index)
                    .cloned()
                    .ok_or_else(|| {
                        self.error(Reason::IndexOutOfBounds {
                            space: "function",
                            index: *index,
                        })
                    })?;
                self.pop_types(ty.params())?;
                self.push_types(ty.results());
            }
            (Op::CallIndirect, Imm::CallIndirect { ty, table }) => {
                let table_ty = self.table_type(*table)?;
                if table_ty.element() != ValType::FuncRef {
                    return Err(self.error(Reason::ElementTypeMismatch));
                }
                let ty = self.func_type_at(*ty)?.clone();
                self.pop_expect(ValType::I32)?;
                self.pop_types(ty.params())?;
                self.push_types(ty.results());
            }
            (Op::Drop, _) => {
                self.pop_any()?;
            }
            (Op::Select, _) => {
                self.pop_expect(ValType::I32)?;
                let rhs = self.pop_any()?;
                let lhs = self.pop_any()?;
                let result = match (lhs, rhs) {
                    (StackType::Unknown, other) | (other, StackType::Unknown) => other,
                    (StackType::Known(lhs), StackType::Known(rhs)) => {
                        if lhs != rhs || lhs.is_ref() {
                            return Err(self.error(Reason::SelectTypeMismatch));
                        }
                        StackType::Known(lhs)
                    }
                };
                if let StackType::Known(ty) = result {
                    // Untyped select only works on numeric and vector types.
                    if ty.is_ref() {
                        return Err(self.error(Reason::SelectTypeMismatch));
                    }
                    self.push(ty);
                } else {
                    self.push_unknown();
                }
            }
            (Op::SelectTyped, Imm::SelectTypes(types)) => {
                let [ty] = types.as_slice() else {
                    return Err(self.error(Reason::InvalidSelectArity));
                };
                self.pop_expect(ValType::I32)?;
                self.pop_expect(*ty)?;
                self.pop_expect(*ty)?;
                self.push(*ty);
            }
            (Op::LocalGet, Imm::Local(index)) => {
                let ty = self.local_type(*index)?;
                self.push(ty);
            }
            (Op::LocalSet, Imm::Local(index)) => {
                let ty = self.local_type(*index)?;
                self.pop_expect(ty)?;
            }
            (Op::LocalTee, Imm::Local(index)) => {
                let ty = self.local_type(*index)?;
                self.pop_expect(ty)?;
                self.push(ty);
            }
            (Op::GlobalGet, Imm::Global(index)) => {
                let ty = self.global_type(*index)?;
                self.push(ty.content());
            }
            (Op::GlobalSet, Imm::Global(index)) => {
                let ty = self.global_type(*index)?;
                if !ty.mutability().is_mut() {
                    return Err(self.error(Reason::GlobalIsImmutable));
                }
                self.pop_expect(ty.content())?;
            }
            (Op::TableGet, Imm::Table(index)) => {
                let ty = self.table_type(*index)?;
                self.pop_expect(ValType::I32)?;
                self.push(ty.element());
            }
            (Op::TableSet, Imm::Table(index)) => {
                let ty = self.table_type(*index)?;
                self.pop_expect(ty.element())?;
                self.pop_expect(ValType::I32)?;
            }
            (Op::TableGrow, Imm::Table(index)) => {
                let ty = self.table_type(*index)?;
                self.pop_expect(ValType::I32)?;
                self.pop_expect(ty.element())?;
                self.push(ValType::I32);
            }
            (Op::TableSize, Imm::Table(index)) => {
                self.table_type(*index)?;
                self.push(ValType::I32);
            }
            (Op::TableFill, Imm::Table(index)) => {
                let ty = self.table_type(*index)?;
                self.pop_expect(ValType::I32)?;
                self.pop_expect(ty.element())?;
                self.pop_expect(ValType::I32)?;
            }
            (Op::TableInit, Imm::ElemTable { elem, table }) => {
                let table_ty = self.table_type(*table)?;
                let elem_ty = self.check_elem_index(*elem)?;
                if !elem_ty.is_subtype_of(&table_ty.element()) {
                    return Err(self.error(Reason::ElementTypeMismatch));
                }
                self.pop_types(&[ValType::I32, ValType::I32, ValType::I32])?;
            }
            (Op::TableCopy, Imm::TableTable { dst, src }) => {
                let dst_ty = self.table_type(*dst)?;
                let src_ty = self.table_type(*src)?;
                if !src_ty.element().is_subtype_of(&dst_ty.element()) {
                    return Err(self.error(Reason::ElementTypeMismatch));
                }
                self.pop_types(&[ValType::I32, ValType::I32, ValType::I32])?;
            }
            (Op::ElemDrop, Imm::Elem(index)) => {
                self.check_elem_index(*index)?;
            }
            (Op::MemoryInit, Imm::DataMem { data, mem }) => {
                self.check_data_index(*data)?;
                self.ctx.module.memory_type(*mem).ok_or_else(|| {
                    self.error(Reason::IndexOutOfBounds {
                        space: "memory",
                        index: *mem,
                    })
                })?;
                self.pop_types(&[ValType::I32, ValType::I32, ValType::I32])?;
            }
            (Op::DataDrop, Imm::Data(index)) => {
                self.check_data_index(*index)?;
            }
            (Op::MemoryCopy, Imm::MemMem { dst, src }) => {
                for index in [dst, src] {
                    self.ctx.module.memory_type(*index).ok_or_else(|| {
                        self.error(Reason::IndexOutOfBounds {
                            space: "memory",
                            index: *index,
                        })
                    })?;
                }
                self.pop_types(&[ValType::I32, ValType::I32, ValType::I32])?;
            }
            (Op::MemoryFill, Imm::Mem(_)) => {
                self.pop_types(&[ValType::I32, ValType::I32, ValType::I32])?;
            }
            (Op::RefNull, Imm::RefType(ty)) => {
                self.push(*ty);
            }
            (Op::RefIsNull, _) => {
                match self.pop_any()? {
                    StackType::Unknown => {}
                    StackType::Known(ty) if ty.is_ref() => {}
                    StackType::Known(found) => {
                        return Err(self.error(Reason::TypeMismatch {
                            expected: ValType::AnyRef,
                            found: Some(found),
                        }))
                    }
                }
                self.push(ValType::I32);
            }
            (Op::RefFunc, Imm::Func(index)) => {
                if *index >= self.ctx.module.num_funcs() {
                    return Err(self.error(Reason::IndexOutOfBounds {
                        space: "function",
                        index: *index,
                    }));
                }
                if !self.ctx.declared_funcs.contains(index) {
                    return Err(self.error(Reason::FunctionNotDeclared { index: *index }));
                }
                self.push(ValType::FuncRef);
            }
            _ => {
                // Every special-signature operator is handled above; a
                // mismatch between operator and immediate cannot be
                // constructed by the decoder.
                unreachable!("unhandled operator `{op}` with immediate {:?}", instr.imm)
            }
        }
        Ok(())
    }
}
