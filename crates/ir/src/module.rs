use crate::Instr;
use cove_core::{FuncType, GlobalType, MemoryType, TableType, ValType};

/// The id of a known (non-custom) section, in the required section order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SectionId {
    /// The function type section.
    Type = 1,
    /// The import section.
    Import = 2,
    /// The function declaration section.
    Function = 3,
    /// The table section.
    Table = 4,
    /// The memory section.
    Memory = 5,
    /// The global section.
    Global = 6,
    /// The export section.
    Export = 7,
    /// The start function section.
    Start = 8,
    /// The element segment section.
    Element = 9,
    /// The function body section.
    Code = 10,
    /// The data segment section.
    Data = 11,
    /// The data segment count section.
    DataCount = 12,
    /// The exception tag section.
    Tag = 13,
}

impl SectionId {
    /// Returns the [`SectionId`] with the given binary id.
    pub fn from_u8(id: u8) -> Option<Self> {
        Some(match id {
            1 => Self::Type,
            2 => Self::Import,
            3 => Self::Function,
            4 => Self::Table,
            5 => Self::Memory,
            6 => Self::Global,
            7 => Self::Export,
            8 => Self::Start,
            9 => Self::Element,
            10 => Self::Code,
            11 => Self::Data,
            12 => Self::DataCount,
            13 => Self::Tag,
            _ => return None,
        })
    }

    /// Returns the position of the section in the required section order.
    ///
    /// The tag section sits between memory and global; the data-count
    /// section between element and code.
    pub fn order(self) -> u8 {
        match self {
            Self::Type => 1,
            Self::Import => 2,
            Self::Function => 3,
            Self::Table => 4,
            Self::Memory => 5,
            Self::Tag => 6,
            Self::Global => 7,
            Self::Export => 8,
            Self::Start => 9,
            Self::Element => 10,
            Self::DataCount => 11,
            Self::Code => 12,
            Self::Data => 13,
        }
    }
}

/// A constant initializer expression.
///
/// One of: a literal of a declared type, a read of an (immutable, imported)
/// global, `ref.null`, or `ref.func`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstExpr {
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
    /// A null reference of the given reference type.
    RefNull(ValType),
    /// A reference to the function with the given index.
    ///
    /// Evaluated after code loading so that the function pointer exists.
    RefFunc(u32),
    /// A read of the global with the given index.
    GlobalGet(u32),
}

impl ConstExpr {
    /// Returns the type the expression evaluates to.
    ///
    /// `GlobalGet` needs the type of the referenced global, supplied by
    /// `global_type`.
    pub fn ty(&self, global_type: impl Fn(u32) -> Option<ValType>) -> Option<ValType> {
        Some(match self {
            Self::I32(_) => ValType::I32,
            Self::I64(_) => ValType::I64,
            Self::F32(_) => ValType::F32,
            Self::F64(_) => ValType::F64,
            Self::V128(_) => ValType::V128,
            Self::RefNull(ty) => *ty,
            Self::RefFunc(_) => ValType::FuncRef,
            Self::GlobalGet(index) => global_type(*index)?,
        })
    }
}

/// The description of an imported definition.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportDesc {
    /// An imported function of the given interned type.
    Func(u32),
    /// An imported table.
    Table(TableType),
    /// An imported linear memory.
    Memory(MemoryType),
    /// An imported global.
    Global(GlobalType),
    /// An imported exception tag of the given interned type.
    Tag(u32),
}

/// An import descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    /// The name of the providing module.
    pub module: String,
    /// The name of the export within the providing module.
    pub name: String,
    /// What is imported.
    pub desc: ImportDesc,
}

/// An index into one of the module's index spaces, tagged by kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExternIndex {
    /// A function index.
    Func(u32),
    /// A table index.
    Table(u32),
    /// A memory index.
    Memory(u32),
    /// A global index.
    Global(u32),
    /// An exception tag index.
    Tag(u32),
}

/// An export descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    /// The export name, unique within the module.
    pub name: String,
    /// The exported definition.
    pub index: ExternIndex,
}

/// A defined (non-imported) function.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    /// The interned type of the function.
    pub type_index: u32,
    /// The local declarations as `(count, type)` runs, as encoded.
    pub locals: Vec<(u32, ValType)>,
    /// The decoded body, ending with `end`.
    pub body: Vec<Instr>,
}

impl FuncDef {
    /// Returns the total number of declared locals.
    pub fn num_locals(&self) -> u64 {
        self.locals.iter().map(|(count, _)| u64::from(*count)).sum()
    }
}

/// A defined (non-imported) global.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDef {
    /// The type of the global.
    pub ty: GlobalType,
    /// The initializer expression.
    pub init: ConstExpr,
}

/// A defined (non-imported) exception tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TagDef {
    /// The interned function type carrying the tag parameters.
    ///
    /// The referenced type must have an empty result tuple.
    pub type_index: u32,
}

/// The mode of a data segment.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSegmentMode {
    /// Copied into a memory at instantiation.
    Active {
        /// The destination memory.
        memory: u32,
        /// The constant destination offset.
        offset: ConstExpr,
    },
    /// Available to `memory.init` until dropped.
    Passive,
}

/// A data segment.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSegment {
    /// Whether the segment is active or passive.
    pub mode: DataSegmentMode,
    /// The segment bytes.
    pub bytes: Vec<u8>,
    /// `true` if the binary spelled out the memory index (flag 2) instead
    /// of using the implicit-memory-0 form (flag 0).
    ///
    /// Preserved so that encoding reproduces the input bytes.
    pub explicit_memory: bool,
}

/// The mode of an element segment.
#[derive(Debug, Clone, PartialEq)]
pub enum ElemSegmentMode {
    /// Copied into a table at instantiation.
    Active {
        /// The destination table.
        table: u32,
        /// The constant destination offset.
        offset: ConstExpr,
    },
    /// Available to `table.init` until dropped.
    Passive,
    /// Only declares its functions for `ref.func`; never copied.
    Declared,
}

/// The payload of an element segment, preserving the encoded form.
#[derive(Debug, Clone, PartialEq)]
pub enum ElemItems {
    /// A vector of function indices.
    Funcs(Vec<u32>),
    /// A vector of constant expressions.
    Exprs(Vec<ConstExpr>),
}

impl ElemItems {
    /// Returns the number of element items.
    pub fn len(&self) -> usize {
        match self {
            Self::Funcs(items) => items.len(),
            Self::Exprs(items) => items.len(),
        }
    }

    /// Returns `true` if the segment has no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An element segment.
#[derive(Debug, Clone, PartialEq)]
pub struct ElemSegment {
    /// Whether the segment is active, passive or declared.
    pub mode: ElemSegmentMode,
    /// The element type of the segment.
    pub ty: ValType,
    /// The items, preserving the encoded representation.
    pub items: ElemItems,
    /// `true` if the binary spelled out the table index and element type
    /// instead of using the implicit-table-0 `funcref` form.
    ///
    /// Preserved so that encoding reproduces the input bytes.
    pub explicit_type: bool,
}

/// A custom section preserved byte-for-byte.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomSection {
    /// The section name.
    pub name: String,
    /// The raw payload bytes following the name.
    pub bytes: Vec<u8>,
    /// The [`SectionId::order`] of the last known section preceding this
    /// one, or `0` if it appeared before every known section.
    ///
    /// Encoding re-emits the custom section in the same position.
    pub placement: u8,
}

/// Debug name metadata parsed from the `name` custom section.
///
/// Derived from the raw custom section, which is also retained so that
/// encoding reproduces the original bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Names {
    /// The module name if any.
    pub module: Option<String>,
    /// Sorted `(function index, name)` assignments.
    pub funcs: Vec<(u32, String)>,
    /// Sorted `(function index, (local index, name))` assignments.
    pub locals: Vec<(u32, Vec<(u32, String)>)>,
}

impl Names {
    /// Returns the name assigned to the given function index if any.
    pub fn func_name(&self, index: u32) -> Option<&str> {
        self.funcs
            .binary_search_by_key(&index, |(idx, _)| *idx)
            .ok()
            .map(|pos| self.funcs[pos].1.as_str())
    }
}

/// An immutable record of everything a binary module declares.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    /// The interned function types.
    pub types: Vec<FuncType>,
    /// The import descriptors, in declaration order.
    pub imports: Vec<Import>,
    /// The defined functions. Imports precede them in the index space.
    pub funcs: Vec<FuncDef>,
    /// The defined tables.
    pub tables: Vec<TableType>,
    /// The defined memories.
    pub memories: Vec<MemoryType>,
    /// The defined globals.
    pub globals: Vec<GlobalDef>,
    /// The defined exception tags.
    pub tags: Vec<TagDef>,
    /// The exports.
    pub exports: Vec<Export>,
    /// The start function index if any.
    pub start: Option<u32>,
    /// The element segments.
    pub elems: Vec<ElemSegment>,
    /// The data segments.
    pub datas: Vec<DataSegment>,
    /// The declared data segment count if the section was present.
    pub data_count: Option<u32>,
    /// Custom sections, preserved byte-for-byte.
    pub customs: Vec<CustomSection>,
    /// Debug names parsed from the `name` custom section.
    pub names: Names,
}

macro_rules! impl_index_space {
    (
        $( ($imported:ident, $num_imported:ident, $desc:ident ( $binding:ident ) => $res:expr, $ty:ty) ),* $(,)?
    ) => {
        impl Module {
            $(
                /// Returns the imported entries of this index space in
                /// declaration order.
                pub fn $imported(&self) -> impl Iterator<Item = $ty> + '_ {
                    self.imports.iter().filter_map(|import| match &import.desc {
                        ImportDesc::$desc($binding) => Some($res),
                        _ => None,
                    })
                }

                /// Returns the number of imported entries of this index space.
                pub fn $num_imported(&self) -> u32 {
                    self.$imported().count() as u32
                }
            )*
        }
    };
}

impl_index_space! {
    (imported_funcs, num_imported_funcs, Func(ty) => *ty, u32),
    (imported_tables, num_imported_tables, Table(ty) => *ty, TableType),
    (imported_memories, num_imported_memories, Memory(ty) => *ty, MemoryType),
    (imported_globals, num_imported_globals, Global(ty) => *ty, GlobalType),
    (imported_tags, num_imported_tags, Tag(ty) => *ty, u32),
}

impl Module {
    /// Returns the total number of functions (imported plus defined).
    pub fn num_funcs(&self) -> u32 {
        self.num_imported_funcs() + self.funcs.len() as u32
    }

    /// Returns the total number of tables.
    pub fn num_tables(&self) -> u32 {
        self.num_imported_tables() + self.tables.len() as u32
    }

    /// Returns the total number of memories.
    pub fn num_memories(&self) -> u32 {
        self.num_imported_memories() + self.memories.len() as u32
    }

    /// Returns the total number of globals.
    pub fn num_globals(&self) -> u32 {
        self.num_imported_globals() + self.globals.len() as u32
    }

    /// Returns the total number of exception tags.
    pub fn num_tags(&self) -> u32 {
        self.num_imported_tags() + self.tags.len() as u32
    }

    /// Returns the interned type index of the function at `index`, which
    /// may address an import or a definition.
    pub fn func_type_index(&self, index: u32) -> Option<u32> {
        let num_imported = self.num_imported_funcs();
        if index < num_imported {
            return self.imported_funcs().nth(index as usize);
        }
        let defined = (index - num_imported) as usize;
        self.funcs.get(defined).map(|def| def.type_index)
    }

    /// Returns the [`FuncType`] of the function at `index`.
    pub fn func_type(&self, index: u32) -> Option<&FuncType> {
        self.types.get(self.func_type_index(index)? as usize)
    }

    /// Returns the [`TableType`] of the table at `index`.
    pub fn table_type(&self, index: u32) -> Option<TableType> {
        let num_imported = self.num_imported_tables();
        if index < num_imported {
            return self.imported_tables().nth(index as usize);
        }
        self.tables.get((index - num_imported) as usize).copied()
    }

    /// Returns the [`MemoryType`] of the memory at `index`.
    pub fn memory_type(&self, index: u32) -> Option<MemoryType> {
        let num_imported = self.num_imported_memories();
        if index < num_imported {
            return self.imported_memories().nth(index as usize);
        }
        self.memories.get((index - num_imported) as usize).copied()
    }

    /// Returns the [`GlobalType`] of the global at `index`.
    pub fn global_type(&self, index: u32) -> Option<GlobalType> {
        let num_imported = self.num_imported_globals();
        if index < num_imported {
            return self.imported_globals().nth(index as usize);
        }
        self.globals
            .get((index - num_imported) as usize)
            .map(|def| def.ty)
    }

    /// Returns the interned type index of the tag at `index`.
    pub fn tag_type_index(&self, index: u32) -> Option<u32> {
        let num_imported = self.num_imported_tags();
        if index < num_imported {
            return self.imported_tags().nth(index as usize);
        }
        self.tags
            .get((index - num_imported) as usize)
            .map(|def| def.type_index)
    }
}
