//! Compiled modules and precompiled images.
//!
//! A [`CompiledModule`] pairs the immutable IR record with its object
//! code. [`CompiledModule::serialize`] embeds the object in a custom
//! section so the binary doubles as a precompiled image: loading it
//! skips code generation, guarded by the generator version tag hashed
//! into the image identity.

use crate::{
    codegen::{CallingAbi, CodegenError, FunctionSym, ObjectCode, Relocation, SymbolRef},
    engine::Engine,
    instantiate::InstantiationError,
    validate::ValidationError,
};
use core::fmt::{self, Display};
use cove_ir::{leb128, CustomSection, DecodeError, Module, SectionId};
use std::sync::Arc;

/// The name of the user section holding a precompiled object.
pub const PRECOMPILED_SECTION: &str = "cove.precompiled_object";

/// An error while loading, validating or compiling a module.
#[derive(Debug)]
pub enum ModuleError {
    /// The binary is malformed.
    Decode(DecodeError),
    /// The module failed validation.
    Validation(Vec<ValidationError>),
    /// The code generator failed.
    Codegen(CodegenError),
    /// A precompiled object was produced by a different generator.
    PrecompiledVersionMismatch {
        /// The running generator's version tag.
        expected: u64,
        /// The tag found in the image.
        found: u64,
    },
    /// The precompiled section exists but cannot be parsed.
    MalformedPrecompiledObject,
    /// Instantiating a linker-synthesized stub failed.
    StubInstantiation(Box<InstantiationError>),
}

impl ModuleError {
    pub(crate) fn stub_instantiation(error: InstantiationError) -> Self {
        Self::StubInstantiation(Box::new(error))
    }
}

impl Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(error) => write!(f, "{error}"),
            Self::Validation(errors) => {
                write!(f, "module validation failed")?;
                for error in errors {
                    write!(f, "\n  {error}")?;
                }
                Ok(())
            }
            Self::Codegen(error) => write!(f, "{error}"),
            Self::PrecompiledVersionMismatch { expected, found } => write!(
                f,
                "precompiled object version 0x{found:x} does not match the generator 0x{expected:x}"
            ),
            Self::MalformedPrecompiledObject => write!(f, "malformed precompiled object"),
            Self::StubInstantiation(error) => write!(f, "stub instantiation failed: {error}"),
        }
    }
}

impl core::error::Error for ModuleError {}

/// A validated module together with its generated object code.
#[derive(Debug, Clone)]
pub struct CompiledModule {
    engine: Engine,
    module: Arc<Module>,
    object: Arc<ObjectCode>,
}

impl CompiledModule {
    pub(crate) fn new(engine: Engine, module: Arc<Module>, object: ObjectCode) -> Self {
        Self {
            engine,
            module,
            object: Arc::new(object),
        }
    }

    /// Returns the engine that compiled the module.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Returns the immutable module record.
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    /// Returns the generated object code.
    pub(crate) fn object(&self) -> &ObjectCode {
        &self.object
    }

    /// Returns the export names declared by the module.
    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.module.exports.iter().map(|export| export.name.as_str())
    }

    /// Serializes the module with its object code embedded in the
    /// [`PRECOMPILED_SECTION`] user section.
    ///
    /// The resulting bytes are an ordinary binary module; runtimes
    /// without the matching generator simply recompile it.
    pub fn serialize(&self) -> Vec<u8> {
        let mut module = (*self.module).clone();
        module
            .customs
            .retain(|section| section.name != PRECOMPILED_SECTION);
        module.customs.push(CustomSection {
            name: PRECOMPILED_SECTION.to_string(),
            bytes: serialize_object(&self.object),
            placement: SectionId::Data.order(),
        });
        cove_ir::encode(&module)
    }

    /// Extracts the precompiled object from a decoded module if present.
    pub(crate) fn extract_precompiled(module: &Module) -> Result<Option<ObjectCode>, ModuleError> {
        let Some(section) = module
            .customs
            .iter()
            .find(|section| section.name == PRECOMPILED_SECTION)
        else {
            return Ok(None);
        };
        deserialize_object(&section.bytes)
            .map(Some)
            .ok_or(ModuleError::MalformedPrecompiledObject)
    }
}

fn abi_to_u8(abi: CallingAbi) -> u8 {
    match abi {
        CallingAbi::ContextArgs => 0,
        CallingAbi::Native => 1,
    }
}

fn abi_from_u8(byte: u64) -> Option<CallingAbi> {
    match byte {
        0 => Some(CallingAbi::ContextArgs),
        1 => Some(CallingAbi::Native),
        _ => None,
    }
}

/// Serializes an [`ObjectCode`] into the precompiled-section payload.
///
/// The format is private to this runtime: the version tag, the symbol
/// tables and the raw bytes, all integers LEB128.
fn serialize_object(object: &ObjectCode) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&object.version_tag.to_le_bytes());
    leb128::write_unsigned(&mut out, object.functions.len() as u64);
    for sym in &object.functions {
        leb128::write_unsigned(&mut out, u64::from(sym.index));
        out.push(abi_to_u8(sym.abi));
        leb128::write_unsigned(&mut out, sym.offset as u64);
        leb128::write_unsigned(&mut out, sym.len as u64);
    }
    leb128::write_unsigned(&mut out, object.relocations.len() as u64);
    for relocation in &object.relocations {
        leb128::write_unsigned(&mut out, relocation.offset as u64);
        match &relocation.symbol {
            SymbolRef::ImportedFunction(index) => {
                out.push(0);
                leb128::write_unsigned(&mut out, u64::from(*index));
            }
            SymbolRef::Intrinsic { name, abi } => {
                out.push(1);
                out.push(abi_to_u8(*abi));
                leb128::write_unsigned(&mut out, name.len() as u64);
                out.extend_from_slice(name.as_bytes());
            }
            SymbolRef::MemoryId(index) => {
                out.push(2);
                leb128::write_unsigned(&mut out, u64::from(*index));
            }
            SymbolRef::TableId(index) => {
                out.push(3);
                leb128::write_unsigned(&mut out, u64::from(*index));
            }
            SymbolRef::GlobalSlot(index) => {
                out.push(4);
                leb128::write_unsigned(&mut out, u64::from(*index));
            }
            SymbolRef::TagId(index) => {
                out.push(5);
                leb128::write_unsigned(&mut out, u64::from(*index));
            }
            SymbolRef::TableSentinel => out.push(6),
        }
    }
    leb128::write_unsigned(&mut out, object.bytes.len() as u64);
    out.extend_from_slice(&object.bytes);
    out
}

fn deserialize_object(bytes: &[u8]) -> Option<ObjectCode> {
    let mut pos = 0_usize;
    let version_tag = u64::from_le_bytes(bytes.get(0..8)?.try_into().ok()?);
    pos += 8;
    let mut u = |pos: &mut usize| leb128::read_unsigned(bytes, pos, 64).ok();
    let mut byte = |pos: &mut usize| {
        let value = *bytes.get(*pos)?;
        *pos += 1;
        Some(value)
    };

    let num_functions = u(&mut pos)? as usize;
    let mut functions = Vec::with_capacity(num_functions.min(0x10000));
    for _ in 0..num_functions {
        let index = u(&mut pos)? as u32;
        let abi = abi_from_u8(u64::from(byte(&mut pos)?))?;
        let offset = u(&mut pos)? as usize;
        let len = u(&mut pos)? as usize;
        functions.push(FunctionSym {
            index,
            abi,
            offset,
            len,
        });
    }

    let num_relocations = u(&mut pos)? as usize;
    let mut relocations = Vec::with_capacity(num_relocations.min(0x10000));
    for _ in 0..num_relocations {
        let offset = u(&mut pos)? as usize;
        let symbol = match byte(&mut pos)? {
            0 => SymbolRef::ImportedFunction(u(&mut pos)? as u32),
            1 => {
                let abi = abi_from_u8(u64::from(byte(&mut pos)?))?;
                let len = u(&mut pos)? as usize;
                let name = core::str::from_utf8(bytes.get(pos..pos + len)?).ok()?;
                pos += len;
                SymbolRef::Intrinsic {
                    name: name.to_string(),
                    abi,
                }
            }
            2 => SymbolRef::MemoryId(u(&mut pos)? as u32),
            3 => SymbolRef::TableId(u(&mut pos)? as u32),
            4 => SymbolRef::GlobalSlot(u(&mut pos)? as u32),
            5 => SymbolRef::TagId(u(&mut pos)? as u32),
            6 => SymbolRef::TableSentinel,
            _ => return None,
        };
        relocations.push(Relocation { offset, symbol });
    }

    let num_bytes = u(&mut pos)? as usize;
    let object_bytes = bytes.get(pos..pos + num_bytes)?.to_vec();
    pos += num_bytes;
    if pos != bytes.len() {
        return None;
    }

    Some(ObjectCode {
        bytes: object_bytes,
        functions,
        relocations,
        version_tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_serialization_roundtrips() {
        let object = ObjectCode {
            bytes: vec![1, 2, 3, 4],
            functions: vec![FunctionSym {
                index: 0,
                abi: CallingAbi::ContextArgs,
                offset: 0,
                len: 4,
            }],
            relocations: vec![
                Relocation {
                    offset: 0,
                    symbol: SymbolRef::Intrinsic {
                        name: "memory.grow".to_string(),
                        abi: CallingAbi::ContextArgs,
                    },
                },
                Relocation {
                    offset: 8,
                    symbol: SymbolRef::TableSentinel,
                },
            ],
            version_tag: 0xfeed_beef,
        };
        let bytes = serialize_object(&object);
        assert_eq!(deserialize_object(&bytes), Some(object));
    }

    #[test]
    fn truncated_objects_are_rejected() {
        let object = ObjectCode {
            bytes: vec![0; 16],
            functions: Vec::new(),
            relocations: Vec::new(),
            version_tag: 7,
        };
        let mut bytes = serialize_object(&object);
        bytes.pop();
        assert_eq!(deserialize_object(&bytes), None);
    }
}
