use crate::{MemoryId, TableId, TagId};
use core::fmt::{self, Display};
use cove_core::{TrapCode, UntypedValue};

/// The typed kind of a [`Trap`] together with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum TrapKind {
    /// An `unreachable` instruction was executed.
    Unreachable,
    /// Integer division by zero or `INT_MIN / -1` overflow.
    IntegerDivideByZeroOrOverflow,
    /// A float-to-integer conversion with an unrepresentable input.
    InvalidConversionToInteger,
    /// A linear-memory access outside the memory's committed size.
    OutOfBoundsMemoryAccess {
        /// The accessed memory.
        memory: MemoryId,
        /// The first out-of-bounds byte address.
        offset: u64,
    },
    /// A table access outside the table's current size.
    OutOfBoundsTableAccess {
        /// The accessed table.
        table: TableId,
        /// The accessed element index.
        index: u64,
    },
    /// A `memory.init` source range outside the data segment.
    OutOfBoundsDataSegmentAccess {
        /// The instance owning the segment.
        instance: u32,
        /// The segment index.
        segment: u32,
        /// The accessed end offset.
        size: u64,
    },
    /// A `table.init` source range outside the element segment.
    OutOfBoundsElemSegmentAccess {
        /// The instance owning the segment.
        instance: u32,
        /// The segment index.
        segment: u32,
        /// The accessed end offset.
        size: u64,
    },
    /// An indirect call whose callee type does not match the expected type.
    IndirectCallSignatureMismatch,
    /// An indirect call through a null or out-of-bounds sentinel element.
    UndefinedElement,
    /// An indirect call through an element that was never written.
    UninitializedTableElement,
    /// A call to an intrinsic the host did not bind.
    CalledUnimplementedIntrinsic,
    /// The host could not satisfy a guest allocation.
    OutOfMemory,
    /// A host call received an argument outside its domain.
    InvalidArgument,
    /// A guest exception of a user-defined tag.
    UserException {
        /// The exception tag.
        tag: TagId,
        /// The exception arguments, typed by the tag's parameter tuple.
        arguments: Vec<UntypedValue>,
    },
    /// A `proc_exit`-style request to leave the invocation.
    ///
    /// Recognized by launchers, which map the value to a process exit
    /// code rather than reporting a failure.
    Exit {
        /// The exit code.
        code: i32,
    },
}

impl TrapKind {
    /// Returns the closest [`TrapCode`] classifying this kind.
    pub fn code(&self) -> TrapCode {
        match self {
            Self::Unreachable | Self::Exit { .. } | Self::UserException { .. } => {
                TrapCode::Unreachable
            }
            Self::IntegerDivideByZeroOrOverflow => TrapCode::IntegerDivideByZeroOrOverflow,
            Self::InvalidConversionToInteger => TrapCode::InvalidConversionToInteger,
            Self::OutOfBoundsMemoryAccess { .. } => TrapCode::OutOfBoundsMemoryAccess,
            Self::OutOfBoundsTableAccess { .. } => TrapCode::OutOfBoundsTableAccess,
            Self::OutOfBoundsDataSegmentAccess { .. } => TrapCode::OutOfBoundsDataSegmentAccess,
            Self::OutOfBoundsElemSegmentAccess { .. } => TrapCode::OutOfBoundsElemSegmentAccess,
            Self::IndirectCallSignatureMismatch => TrapCode::IndirectCallSignatureMismatch,
            Self::UndefinedElement => TrapCode::UndefinedElement,
            Self::UninitializedTableElement => TrapCode::UninitializedTableElement,
            Self::CalledUnimplementedIntrinsic => TrapCode::CalledUnimplementedIntrinsic,
            Self::OutOfMemory => TrapCode::OutOfMemory,
            Self::InvalidArgument => TrapCode::InvalidArgument,
        }
    }
}

impl Display for TrapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBoundsMemoryAccess { memory, offset } => {
                write!(f, "out of bounds access to memory {memory:?} at +0x{offset:x}")
            }
            Self::OutOfBoundsTableAccess { table, index } => {
                write!(f, "out of bounds access to table {table:?} at index {index}")
            }
            Self::OutOfBoundsDataSegmentAccess { segment, size, .. } => {
                write!(f, "out of bounds access to data segment {segment} at +{size}")
            }
            Self::OutOfBoundsElemSegmentAccess { segment, size, .. } => {
                write!(f, "out of bounds access to element segment {segment} at +{size}")
            }
            Self::UserException { tag, .. } => write!(f, "uncaught guest exception {tag:?}"),
            Self::Exit { code } => write!(f, "process exit with code {code}"),
            kind => write!(f, "{}", kind.code()),
        }
    }
}

/// A frame of the guest call stack captured when a trap was raised.
///
/// Rendered through the module's debug names when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrapFrame {
    /// The function description, e.g. its debug name or index.
    pub function: String,
}

/// A typed, non-resumable failure of a Wasm operation.
///
/// Traps propagate out of the current invocation as the `Err` variant of
/// [`Result`] and unwind every engine-inserted host frame on the way; the
/// engine never catches them.
#[derive(Debug, Clone, PartialEq)]
pub struct Trap {
    /// The typed kind with its arguments.
    kind: Box<TrapKind>,
    /// The captured guest frames, innermost first.
    frames: Vec<TrapFrame>,
}

impl Trap {
    /// Creates a new [`Trap`] of the given kind.
    #[cold]
    pub fn new(kind: TrapKind) -> Self {
        Self {
            kind: Box::new(kind),
            frames: Vec::new(),
        }
    }

    /// Creates an exit trap carrying the guest's exit code.
    #[cold]
    pub fn exit(code: i32) -> Self {
        Self::new(TrapKind::Exit { code })
    }

    /// Returns the typed kind of the [`Trap`].
    pub fn kind(&self) -> &TrapKind {
        &self.kind
    }

    /// Returns the exit code if this is an exit trap.
    pub fn exit_code(&self) -> Option<i32> {
        match *self.kind {
            TrapKind::Exit { code } => Some(code),
            _ => None,
        }
    }

    /// Returns the captured guest frames, innermost first.
    pub fn frames(&self) -> &[TrapFrame] {
        &self.frames
    }

    /// Appends a guest frame to the captured call stack.
    pub fn push_frame(&mut self, function: impl Into<String>) {
        self.frames.push(TrapFrame {
            function: function.into(),
        });
    }
}

impl From<TrapCode> for Trap {
    fn from(code: TrapCode) -> Self {
        let kind = match code {
            TrapCode::Unreachable => TrapKind::Unreachable,
            TrapCode::IntegerDivideByZeroOrOverflow => TrapKind::IntegerDivideByZeroOrOverflow,
            TrapCode::InvalidConversionToInteger => TrapKind::InvalidConversionToInteger,
            TrapCode::IndirectCallSignatureMismatch => TrapKind::IndirectCallSignatureMismatch,
            TrapCode::UndefinedElement => TrapKind::UndefinedElement,
            TrapCode::UninitializedTableElement => TrapKind::UninitializedTableElement,
            TrapCode::CalledUnimplementedIntrinsic => TrapKind::CalledUnimplementedIntrinsic,
            TrapCode::OutOfMemory => TrapKind::OutOfMemory,
            TrapCode::InvalidArgument => TrapKind::InvalidArgument,
            // Codes with arguments need the caller to attach them.
            TrapCode::OutOfBoundsMemoryAccess => TrapKind::OutOfBoundsMemoryAccess {
                memory: MemoryId::invalid(),
                offset: 0,
            },
            TrapCode::OutOfBoundsTableAccess => TrapKind::OutOfBoundsTableAccess {
                table: TableId::invalid(),
                index: 0,
            },
            TrapCode::OutOfBoundsDataSegmentAccess => TrapKind::OutOfBoundsDataSegmentAccess {
                instance: 0,
                segment: 0,
                size: 0,
            },
            TrapCode::OutOfBoundsElemSegmentAccess => TrapKind::OutOfBoundsElemSegmentAccess {
                instance: 0,
                segment: 0,
                size: 0,
            },
        };
        Self::new(kind)
    }
}

impl Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trap: {}", self.kind)?;
        for frame in &self.frames {
            write!(f, "\n  in {}", frame.function)?;
        }
        Ok(())
    }
}

impl core::error::Error for Trap {}
