use crate::codegen::{CallingAbi, ObjectCode, Relocation, SymbolRef};
use crate::Trap;
use core::fmt::{self, Debug};
use cove_core::{VirtualMemory, VirtualMemoryError};

/// A resolver for the symbols an object references.
///
/// Supplied by instantiation, which knows the import addresses and the
/// runtime ids the compartment assigned to the module's objects.
pub(crate) trait SymbolResolver {
    /// Returns the 8-byte value to patch for the given symbol.
    ///
    /// # Errors
    ///
    /// If the symbol cannot be bound, e.g. an unimplemented intrinsic.
    fn resolve(&self, symbol: &SymbolRef) -> Result<u64, Trap>;
}

/// An error while loading object code into executable memory.
#[derive(Debug)]
pub enum CodeLoadError {
    /// The object references an offset outside its own bytes.
    RelocationOutOfBounds {
        /// The offending relocation offset.
        offset: usize,
    },
    /// A function symbol lies outside the object bytes.
    FunctionOutOfBounds {
        /// The offending function index.
        index: u32,
    },
    /// A symbol could not be bound.
    UnresolvedSymbol(Trap),
    /// The operating system refused the mapping.
    Memory(VirtualMemoryError),
}

impl fmt::Display for CodeLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RelocationOutOfBounds { offset } => {
                write!(f, "relocation offset {offset} is outside the object")
            }
            Self::FunctionOutOfBounds { index } => {
                write!(f, "function symbol {index} is outside the object")
            }
            Self::UnresolvedSymbol(trap) => write!(f, "unresolved symbol: {trap}"),
            Self::Memory(error) => write!(f, "cannot map code: {error}"),
        }
    }
}

impl core::error::Error for CodeLoadError {}

impl From<VirtualMemoryError> for CodeLoadError {
    fn from(error: VirtualMemoryError) -> Self {
        Self::Memory(error)
    }
}

/// A published entry point.
#[derive(Debug, Copy, Clone)]
pub(crate) struct EntryPoint {
    /// The address of the entry inside the executable mapping.
    pub addr: *const u8,
    /// The calling convention of the entry.
    pub abi: CallingAbi,
}

// Entry addresses point into the immutable executable mapping.
unsafe impl Send for EntryPoint {}
unsafe impl Sync for EntryPoint {}

/// An executable mapping of one object, alive as long as any module
/// instance references it.
pub(crate) struct CodeMemory {
    /// The backing mapping. Kept for its Drop unmapping the pages.
    mapping: VirtualMemory,
    /// The published entry points, indexed by defined-function index.
    entries: Vec<EntryPoint>,
}

impl Debug for CodeMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeMemory")
            .field("len", &self.mapping.committed_len())
            .field("functions", &self.entries.len())
            .finish()
    }
}

impl CodeMemory {
    /// Maps the object read-write, applies its relocations, remaps it
    /// read-execute and publishes the entry points.
    ///
    /// # Errors
    ///
    /// If a relocation or function symbol is malformed, a symbol cannot
    /// be bound, or the operating system refuses the mapping.
    pub fn load(
        object: &ObjectCode,
        resolver: &dyn SymbolResolver,
    ) -> Result<Self, CodeLoadError> {
        let page = region::page::size();
        let len = object.bytes.len().max(1).next_multiple_of(page);
        let mut mapping = VirtualMemory::reserve(len)?;
        mapping.commit(len)?;
        mapping.data_mut()[..object.bytes.len()].copy_from_slice(&object.bytes);

        for Relocation { offset, symbol } in &object.relocations {
            let end = offset
                .checked_add(8)
                .filter(|&end| end <= object.bytes.len())
                .ok_or(CodeLoadError::RelocationOutOfBounds { offset: *offset })?;
            let value = resolver
                .resolve(symbol)
                .map_err(CodeLoadError::UnresolvedSymbol)?;
            mapping.data_mut()[*offset..end].copy_from_slice(&value.to_le_bytes());
        }

        let mut entries = Vec::with_capacity(object.functions.len());
        for sym in &object.functions {
            sym.offset
                .checked_add(sym.len)
                .filter(|&end| end <= object.bytes.len())
                .ok_or(CodeLoadError::FunctionOutOfBounds { index: sym.index })?;
            entries.push(EntryPoint {
                addr: unsafe { mapping.as_ptr().add(sym.offset) },
                abi: sym.abi,
            });
        }

        // Publish: the mapping becomes immutable and executable.
        unsafe {
            region::protect(
                mapping.as_ptr(),
                mapping.committed_len(),
                region::Protection::READ_EXECUTE,
            )
            .map_err(VirtualMemoryError::from)?;
        }

        Ok(Self { mapping, entries })
    }

    /// Returns the entry point of the defined function at `index`.
    pub fn entry(&self, index: u32) -> Option<EntryPoint> {
        self.entries.get(index as usize).copied()
    }

    /// Returns the base address of the executable mapping.
    #[cfg(test)]
    pub fn base(&self) -> *const u8 {
        self.mapping.as_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::FunctionSym;

    struct FixedResolver(u64);

    impl SymbolResolver for FixedResolver {
        fn resolve(&self, _symbol: &SymbolRef) -> Result<u64, Trap> {
            Ok(self.0)
        }
    }

    #[test]
    fn load_patches_relocations() {
        let object = ObjectCode {
            bytes: vec![0; 32],
            functions: vec![FunctionSym {
                index: 0,
                abi: CallingAbi::ContextArgs,
                offset: 16,
                len: 16,
            }],
            relocations: vec![Relocation {
                offset: 8,
                symbol: SymbolRef::TableSentinel,
            }],
            version_tag: 1,
        };
        let code = CodeMemory::load(&object, &FixedResolver(0xdead_beef)).unwrap();
        let entry = code.entry(0).unwrap();
        assert_eq!(entry.addr as usize, code.base() as usize + 16);
        let patched =
            unsafe { core::ptr::read_unaligned(code.base().add(8) as *const u64) };
        assert_eq!(patched, 0xdead_beef);
        assert_eq!(code.entry(1).map(|e| e.addr as usize), None);
    }

    #[test]
    fn malformed_relocation_is_rejected() {
        let object = ObjectCode {
            bytes: vec![0; 8],
            functions: Vec::new(),
            relocations: vec![Relocation {
                offset: 4,
                symbol: SymbolRef::TableSentinel,
            }],
            version_tag: 1,
        };
        assert!(matches!(
            CodeMemory::load(&object, &FixedResolver(0)),
            Err(CodeLoadError::RelocationOutOfBounds { offset: 4 })
        ));
    }
}
