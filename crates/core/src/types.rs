use crate::{FuncType, ValType};
use std::vec::Vec;

/// The mutability of a Wasm global variable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mutability {
    /// The global is constant after initialization.
    Const,
    /// The global may be written by guest code.
    Var,
}

impl Mutability {
    /// Returns `true` if the global is mutable.
    pub fn is_mut(&self) -> bool {
        matches!(self, Self::Var)
    }
}

/// The type of a Wasm global variable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobalType {
    /// The value type of the global.
    content: ValType,
    /// The mutability of the global.
    mutability: Mutability,
}

impl GlobalType {
    /// Creates a new [`GlobalType`].
    pub fn new(content: ValType, mutability: Mutability) -> Self {
        Self {
            content,
            mutability,
        }
    }

    /// Returns the value type of the global.
    pub fn content(&self) -> ValType {
        self.content
    }

    /// Returns the mutability of the global.
    pub fn mutability(&self) -> Mutability {
        self.mutability
    }

    /// Returns `true` if `self` satisfies an import of type `other`.
    ///
    /// Global types have no width subtyping: mutability and content type
    /// must match exactly.
    pub fn is_subtype_of(&self, other: &Self) -> bool {
        self == other
    }
}

/// The type of a Wasm linear memory: size limits in 64 KiB pages plus the
/// shared flag.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemoryType {
    /// The minimum number of pages.
    min: u32,
    /// The optional maximum number of pages.
    max: Option<u32>,
    /// Whether the memory may be shared between threads.
    shared: bool,
}

impl MemoryType {
    /// The hard cap on the number of pages of a 32-bit memory.
    pub const MAX_PAGES: u32 = 65536;

    /// Creates a new [`MemoryType`].
    ///
    /// Returns `None` if the limits are malformed (`min` or `max` above the
    /// 32-bit page cap, or `max < min`).
    pub fn new(min: u32, max: Option<u32>, shared: bool) -> Option<Self> {
        if min > Self::MAX_PAGES {
            return None;
        }
        if let Some(max) = max {
            if max > Self::MAX_PAGES || max < min {
                return None;
            }
        }
        Some(Self { min, max, shared })
    }

    /// Returns the minimum number of pages.
    pub fn min(&self) -> u32 {
        self.min
    }

    /// Returns the maximum number of pages if any.
    pub fn max(&self) -> Option<u32> {
        self.max
    }

    /// Returns `true` if the memory is shared.
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Returns `true` if `self` satisfies an import of type `other`.
    ///
    /// A memory type is a subtype of another if its minimum is at least as
    /// large, its maximum is at least as restrictive, and the shared flags
    /// match.
    pub fn is_subtype_of(&self, other: &Self) -> bool {
        if self.shared != other.shared {
            return false;
        }
        if self.min < other.min {
            return false;
        }
        match (self.max, other.max) {
            (_, None) => true,
            (Some(lhs), Some(rhs)) => lhs <= rhs,
            (None, Some(_)) => false,
        }
    }
}

/// The type of a Wasm table: the element reference type plus size limits
/// in elements.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableType {
    /// The type of the stored elements.
    element: ValType,
    /// The minimum number of elements.
    min: u32,
    /// The optional maximum number of elements.
    max: Option<u32>,
    /// Whether the table may be shared between threads.
    shared: bool,
}

impl TableType {
    /// Creates a new [`TableType`].
    ///
    /// Returns `None` if `element` is not a declarable reference type or
    /// the limits are malformed.
    pub fn new(element: ValType, min: u32, max: Option<u32>, shared: bool) -> Option<Self> {
        if !element.is_ref() || !element.is_declarable() {
            return None;
        }
        if let Some(max) = max {
            if max < min {
                return None;
            }
        }
        Some(Self {
            element,
            min,
            max,
            shared,
        })
    }

    /// Returns the element type of the table.
    pub fn element(&self) -> ValType {
        self.element
    }

    /// Returns the minimum number of elements.
    pub fn min(&self) -> u32 {
        self.min
    }

    /// Returns the maximum number of elements if any.
    pub fn max(&self) -> Option<u32> {
        self.max
    }

    /// Returns `true` if the table is shared.
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Returns `true` if `self` satisfies an import of type `other`.
    pub fn is_subtype_of(&self, other: &Self) -> bool {
        if self.element != other.element || self.shared != other.shared {
            return false;
        }
        if self.min < other.min {
            return false;
        }
        match (self.max, other.max) {
            (_, None) => true,
            (Some(lhs), Some(rhs)) => lhs <= rhs,
            (None, Some(_)) => false,
        }
    }
}

/// The type of a Wasm exception tag: an ordered tuple of parameter types.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagType {
    /// The parameter types carried by exceptions of this tag.
    params: Vec<ValType>,
}

impl TagType {
    /// Creates a new [`TagType`] with the given parameter types.
    pub fn new<P>(params: P) -> Self
    where
        P: IntoIterator<Item = ValType>,
    {
        Self {
            params: params.into_iter().collect(),
        }
    }

    /// Creates a [`TagType`] from the parameter tuple of a [`FuncType`].
    ///
    /// The binary format types tags by function-type index; only the
    /// parameters are meaningful and the result tuple must be empty.
    pub fn from_func_type(ty: &FuncType) -> Self {
        Self::new(ty.params().iter().copied())
    }

    /// Returns the parameter types of the tag.
    pub fn params(&self) -> &[ValType] {
        &self.params
    }

    /// Returns `true` if `self` satisfies an import of type `other`.
    pub fn is_subtype_of(&self, other: &Self) -> bool {
        self == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_subtyping() {
        let m = |min, max| MemoryType::new(min, max, false).unwrap();
        assert!(m(2, Some(4)).is_subtype_of(&m(1, Some(4))));
        assert!(m(2, Some(3)).is_subtype_of(&m(2, Some(4))));
        assert!(m(2, None).is_subtype_of(&m(1, None)));
        assert!(!m(1, Some(4)).is_subtype_of(&m(2, Some(4))));
        assert!(!m(2, None).is_subtype_of(&m(2, Some(4))));
    }

    #[test]
    fn malformed_limits_rejected() {
        assert!(MemoryType::new(4, Some(2), false).is_none());
        assert!(MemoryType::new(MemoryType::MAX_PAGES + 1, None, false).is_none());
        assert!(TableType::new(ValType::I32, 0, None, false).is_none());
        assert!(TableType::new(ValType::NullRef, 0, None, false).is_none());
    }
}
