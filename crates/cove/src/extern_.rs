use crate::{Function, Global, Memory, Table, Tag};
use core::fmt::{self, Display};
use cove_core::{FuncType, GlobalType, MemoryType, TableType, TagType};

/// An external value: anything importable or exportable.
#[derive(Debug, Clone)]
pub enum Extern {
    /// A Wasm or host function.
    Func(Function),
    /// A table.
    Table(Table),
    /// A linear memory.
    Memory(Memory),
    /// A global variable.
    Global(Global),
    /// An exception tag.
    Tag(Tag),
}

impl Extern {
    /// Returns the [`ExternType`] of the value.
    ///
    /// Memories and tables report their *dynamic* type (current size as
    /// minimum) so that grown objects satisfy larger import minimums.
    pub fn ty(&self) -> ExternType {
        match self {
            Self::Func(func) => ExternType::Func(func.ty()),
            Self::Table(table) => ExternType::Table(table.dynamic_ty()),
            Self::Memory(memory) => ExternType::Memory(memory.dynamic_ty()),
            Self::Global(global) => ExternType::Global(global.ty()),
            Self::Tag(tag) => ExternType::Tag(tag.ty().clone()),
        }
    }

    /// Returns the function if this is a function.
    pub fn into_func(self) -> Option<Function> {
        match self {
            Self::Func(func) => Some(func),
            _ => None,
        }
    }

    /// Returns the memory if this is a memory.
    pub fn into_memory(self) -> Option<Memory> {
        match self {
            Self::Memory(memory) => Some(memory),
            _ => None,
        }
    }

    /// Returns the table if this is a table.
    pub fn into_table(self) -> Option<Table> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Returns the global if this is a global.
    pub fn into_global(self) -> Option<Global> {
        match self {
            Self::Global(global) => Some(global),
            _ => None,
        }
    }
}

/// The type of an [`Extern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternType {
    /// A function type.
    Func(FuncType),
    /// A table type.
    Table(TableType),
    /// A memory type.
    Memory(MemoryType),
    /// A global type.
    Global(GlobalType),
    /// An exception tag type.
    Tag(TagType),
}

impl ExternType {
    /// Returns `true` if a value of type `other` satisfies a requirement
    /// of type `self`.
    ///
    /// Function and tag types match by structural equality, memories and
    /// tables by limit subtyping, globals exactly.
    pub fn is_satisfied_by(&self, other: &ExternType) -> bool {
        match (self, other) {
            (Self::Func(expected), Self::Func(found)) => expected == found,
            (Self::Table(expected), Self::Table(found)) => found.is_subtype_of(expected),
            (Self::Memory(expected), Self::Memory(found)) => found.is_subtype_of(expected),
            (Self::Global(expected), Self::Global(found)) => found.is_subtype_of(expected),
            (Self::Tag(expected), Self::Tag(found)) => found.is_subtype_of(expected),
            _ => false,
        }
    }

    /// Returns the kind name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Func(_) => "function",
            Self::Table(_) => "table",
            Self::Memory(_) => "memory",
            Self::Global(_) => "global",
            Self::Tag(_) => "tag",
        }
    }
}

impl Display for ExternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Func(ty) => write!(f, "func {ty}"),
            Self::Table(ty) => write!(f, "table {} {:?}", ty.element(), ty.min()),
            Self::Memory(ty) => write!(f, "memory {}..{:?}", ty.min(), ty.max()),
            Self::Global(ty) => write!(f, "global {}", ty.content()),
            Self::Tag(_) => write!(f, "tag"),
        }
    }
}
