//! The opaque code-generator seam.
//!
//! The runtime never inspects generated machine code: a [`CodeGenerator`]
//! turns a validated module into an [`ObjectCode`] blob plus symbol
//! requirements, and the loader (see [`CodeMemory`](crate::code_memory))
//! maps the blob, patches each [`Relocation`] with a resolved address and
//! publishes the entry points. Everything about instruction selection and
//! the relocation model beyond this contract is generator-defined.

use crate::Config;
use core::fmt::{self, Display};
use cove_core::{FuncType, UntypedValue};
use cove_ir::Module;

/// The calling convention of a generated function symbol.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CallingAbi {
    /// `fn(context_runtime_data, argument_buffer) -> context_runtime_data`.
    ///
    /// Arguments and results travel through an [`UntypedValue`] buffer;
    /// the returned context pointer allows the callee to migrate the
    /// caller to a different context.
    ContextArgs,
    /// The generator's native parameter-passing convention.
    ///
    /// Callable from other generated code only; the host reaches such
    /// functions through a per-type invoke thunk.
    Native,
}

/// The entry-point type of a [`CallingAbi::ContextArgs`] function.
pub type ContextArgsFn =
    unsafe extern "C" fn(*mut u8, *mut UntypedValue) -> *mut u8;

/// A function symbol published by the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSym {
    /// The defined-function index the symbol implements.
    pub index: u32,
    /// The calling convention of the entry point.
    pub abi: CallingAbi,
    /// The offset of the entry point inside the object bytes.
    pub offset: usize,
    /// The length of the function's code in bytes.
    pub len: usize,
}

/// A symbol whose resolved address the loader writes into the object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolRef {
    /// The entry point of the imported function with the given index.
    ImportedFunction(u32),
    /// A host intrinsic bound by name.
    Intrinsic {
        /// The intrinsic name, e.g. `"memory.grow"`.
        name: String,
        /// The calling convention the generated call site expects.
        abi: CallingAbi,
    },
    /// The runtime id of the memory with the given module index.
    MemoryId(u32),
    /// The runtime id of the table with the given module index.
    TableId(u32),
    /// The mutable-global slot (or immutable address) of the global with
    /// the given module index.
    GlobalSlot(u32),
    /// The runtime id of the exception tag with the given module index.
    TagId(u32),
    /// The biased out-of-bounds sentinel of table elements.
    TableSentinel,
}

/// An absolute 8-byte patch the loader applies to the object bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    /// The byte offset of the 8-byte slot inside the object.
    pub offset: usize,
    /// The symbol whose resolved value is written into the slot.
    pub symbol: SymbolRef,
}

/// The output of compiling one validated module.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectCode {
    /// The opaque object bytes.
    pub bytes: Vec<u8>,
    /// The function entry points, one per defined function.
    pub functions: Vec<FunctionSym>,
    /// The patches the loader must apply before publishing.
    pub relocations: Vec<Relocation>,
    /// The generator version, hashed into precompiled-image identity.
    pub version_tag: u64,
}

/// An error produced by a [`CodeGenerator`].
#[derive(Debug, Clone)]
pub struct CodegenError {
    /// A generator-defined description of the failure.
    pub message: String,
}

impl Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code generation failed: {}", self.message)
    }
}

impl core::error::Error for CodegenError {}

/// An opaque ahead-of-time code generator.
///
/// Implementations are heavyweight external collaborators; the runtime
/// only relies on the [`ObjectCode`] contract.
pub trait CodeGenerator: Send + Sync {
    /// Returns the generator version tag.
    ///
    /// Precompiled images carry this tag; a mismatch at load time rejects
    /// the image instead of running code from a different generator.
    fn version_tag(&self) -> u64;

    /// Compiles a validated module to object code.
    ///
    /// # Errors
    ///
    /// If the generator cannot compile the module.
    fn compile(&self, module: &Module, config: &Config) -> Result<ObjectCode, CodegenError>;

    /// Compiles an invoke thunk for calling a [`CallingAbi::Native`]
    /// function of the given type from the host.
    ///
    /// The default implementation reports the thunk as unavailable,
    /// which is correct for generators emitting only
    /// [`CallingAbi::ContextArgs`] entry points.
    ///
    /// # Errors
    ///
    /// If the generator cannot produce the thunk.
    fn compile_invoke_thunk(&self, ty: &FuncType) -> Result<ObjectCode, CodegenError> {
        let _ = ty;
        Err(CodegenError {
            message: "this code generator does not produce native-abi entry points".into(),
        })
    }
}

/// A [`CodeGenerator`] that produces empty objects.
///
/// Every defined function gets a zero-length [`CallingAbi::ContextArgs`]
/// symbol that must never be invoked. Useful for exercising decoding,
/// validation, linking, instantiation and the host-call surface without a
/// machine-code backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCodeGenerator;

impl CodeGenerator for NullCodeGenerator {
    fn version_tag(&self) -> u64 {
        // A fixed tag: null objects are interchangeable.
        0x636f76655f6e756c // "cove_nul"
    }

    fn compile(&self, module: &Module, _config: &Config) -> Result<ObjectCode, CodegenError> {
        // One `int3`-like poison byte per function so that entry points
        // are distinct addresses.
        let num_funcs = module.funcs.len();
        let functions = (0..num_funcs)
            .map(|index| FunctionSym {
                index: index as u32,
                abi: CallingAbi::ContextArgs,
                offset: index,
                len: 1,
            })
            .collect();
        Ok(ObjectCode {
            bytes: vec![0xcc; num_funcs.max(1)],
            functions,
            relocations: Vec::new(),
            version_tag: self.version_tag(),
        })
    }
}
