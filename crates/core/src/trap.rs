use core::fmt::{self, Display};

/// The typed failure codes of Wasm operations.
///
/// A [`TrapCode`] names the kind of a trap; the runtime attaches the
/// kind-specific arguments (faulting address, table index, segment sizes)
/// when it materializes the full trap value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TrapCode {
    /// An `unreachable` instruction was executed.
    Unreachable,
    /// Integer division by zero or `INT_MIN / -1` overflow.
    IntegerDivideByZeroOrOverflow,
    /// A float-to-integer conversion with an unrepresentable input.
    InvalidConversionToInteger,
    /// A linear-memory access outside the memory's current size.
    OutOfBoundsMemoryAccess,
    /// A table access outside the table's current size.
    OutOfBoundsTableAccess,
    /// A `memory.init` source range outside the data segment.
    OutOfBoundsDataSegmentAccess,
    /// A `table.init` source range outside the element segment.
    OutOfBoundsElemSegmentAccess,
    /// An indirect call whose callee type does not match the expected type.
    IndirectCallSignatureMismatch,
    /// An indirect call through a null or out-of-bounds sentinel element.
    UndefinedElement,
    /// An indirect call through an element that was never written.
    UninitializedTableElement,
    /// A call to an intrinsic that the host did not bind.
    CalledUnimplementedIntrinsic,
    /// The host could not satisfy a guest allocation.
    OutOfMemory,
    /// A host call received an argument outside its domain.
    InvalidArgument,
}

impl TrapCode {
    /// Returns the trap message of the [`TrapCode`].
    pub fn message(&self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable instruction executed",
            Self::IntegerDivideByZeroOrOverflow => "integer divide by zero or overflow",
            Self::InvalidConversionToInteger => "invalid conversion to integer",
            Self::OutOfBoundsMemoryAccess => "out of bounds memory access",
            Self::OutOfBoundsTableAccess => "out of bounds table access",
            Self::OutOfBoundsDataSegmentAccess => "out of bounds data segment access",
            Self::OutOfBoundsElemSegmentAccess => "out of bounds element segment access",
            Self::IndirectCallSignatureMismatch => "indirect call signature mismatch",
            Self::UndefinedElement => "undefined table element",
            Self::UninitializedTableElement => "uninitialized table element",
            Self::CalledUnimplementedIntrinsic => "called unimplemented intrinsic",
            Self::OutOfMemory => "out of memory",
            Self::InvalidArgument => "invalid argument",
        }
    }
}

impl Display for TrapCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl core::error::Error for TrapCode {}
