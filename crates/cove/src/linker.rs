//! Import resolution.
//!
//! A [`Resolver`] is a capability: given a `(module, name)` pair and the
//! declared import type, it may produce an [`Extern`]. The [`link`]
//! entry point runs a module's import list against a resolver and
//! reports the outcome as a [`LinkResult`]; resolved objects that fail
//! the subtype check are treated as if the resolver had declined, so a
//! mismatched import shows up as *missing*, never as silently wrong.

use crate::{
    compartment::Compartment,
    engine::Engine,
    extern_::{Extern, ExternType},
    instance::Instance,
    instantiate::instantiate,
    module::ModuleError,
    Context,
};
use cove_core::{TagType, ValType, Value};
use cove_ir::{Export, ExternIndex, FuncDef, ImportDesc, Instr, Module, Op};
use std::collections::BTreeMap;

/// A failed or unresolved import, reported by [`LinkResult::missing`].
#[derive(Debug, Clone)]
pub struct ImportDescriptor {
    /// The name of the providing module.
    pub module: String,
    /// The name of the export within the providing module.
    pub name: String,
    /// The declared import type.
    pub ty: ExternType,
}

/// The outcome of linking a module's imports.
#[derive(Debug)]
pub struct LinkResult {
    /// One entry per import, in declaration order; `None` where the
    /// resolver declined or returned a type-mismatched object.
    pub resolved: Vec<Option<Extern>>,
    /// The imports that could not be resolved.
    pub missing: Vec<ImportDescriptor>,
    /// `true` if every import was resolved.
    pub success: bool,
}

impl LinkResult {
    /// Returns the resolved import vector if linking succeeded.
    pub fn into_imports(self) -> Result<Vec<Extern>, Vec<ImportDescriptor>> {
        if self.success {
            Ok(self
                .resolved
                .into_iter()
                .map(|external| external.expect("all imports resolved"))
                .collect())
        } else {
            Err(self.missing)
        }
    }
}

/// A capability that resolves imports.
pub trait Resolver {
    /// Resolves the export `name` of module `module`, expected to have
    /// type `expected`.
    ///
    /// Returning an object of the wrong type is equivalent to returning
    /// `None`: the linker re-checks every object.
    fn resolve(&self, module: &str, name: &str, expected: &ExternType) -> Option<Extern>;
}

/// Runs the module's import list against `resolver`.
pub fn link(module: &Module, resolver: &dyn Resolver) -> LinkResult {
    let mut resolved = Vec::with_capacity(module.imports.len());
    let mut missing = Vec::new();
    for import in &module.imports {
        let expected = declared_type(module, &import.desc);
        let external = resolver
            .resolve(&import.module, &import.name, &expected)
            // A type-mismatched resolution is treated as a decline.
            .filter(|external| expected.is_satisfied_by(&external.ty()));
        if external.is_none() {
            missing.push(ImportDescriptor {
                module: import.module.clone(),
                name: import.name.clone(),
                ty: expected,
            });
        }
        resolved.push(external);
    }
    let success = missing.is_empty();
    LinkResult {
        resolved,
        missing,
        success,
    }
}

fn declared_type(module: &Module, desc: &ImportDesc) -> ExternType {
    match desc {
        ImportDesc::Func(type_index) => ExternType::Func(
            module
                .types
                .get(*type_index as usize)
                .cloned()
                .unwrap_or_default(),
        ),
        ImportDesc::Table(ty) => ExternType::Table(*ty),
        ImportDesc::Memory(ty) => ExternType::Memory(*ty),
        ImportDesc::Global(ty) => ExternType::Global(*ty),
        ImportDesc::Tag(type_index) => ExternType::Tag(
            module
                .types
                .get(*type_index as usize)
                .map(TagType::from_func_type)
                .unwrap_or_else(|| TagType::new([])),
        ),
    }
}

/// A resolver over named module instances, e.g. host intrinsic modules.
///
/// Resolution looks up the instance registered under the module name and
/// returns its matching export; the type check is left to the linker.
#[derive(Debug, Default)]
pub struct NamespaceResolver {
    instances: BTreeMap<String, Instance>,
}

impl NamespaceResolver {
    /// Creates an empty [`NamespaceResolver`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `instance` under `module_name`, replacing any previous
    /// registration.
    pub fn define(&mut self, module_name: impl Into<String>, instance: Instance) -> &mut Self {
        self.instances.insert(module_name.into(), instance);
        self
    }

    /// Returns the instance registered under `module_name` if any.
    pub fn get(&self, module_name: &str) -> Option<&Instance> {
        self.instances.get(module_name)
    }
}

impl Resolver for NamespaceResolver {
    fn resolve(&self, module: &str, name: &str, _expected: &ExternType) -> Option<Extern> {
        self.instances.get(module)?.export(name)
    }
}

/// What a [`StubResolver`] synthesizes for a missing function import.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StubBehavior {
    /// The stub traps when called.
    Trap,
    /// The stub returns type-appropriate zero or null values.
    Zero,
}

/// A resolver decorator that synthesizes stubs for missing imports.
///
/// On a miss the stub resolver creates a replacement matching the
/// declared type: a compiled function that traps or returns zeroes, or a
/// minimally sized fresh table/memory/global/tag. Opt-in per linker
/// invocation; generation failures surface as ordinary misses.
pub struct StubResolver<'a> {
    inner: &'a dyn Resolver,
    engine: &'a Engine,
    compartment: &'a Compartment,
    context: &'a Context,
    behavior: StubBehavior,
    log_stubbed_imports: bool,
}

impl<'a> StubResolver<'a> {
    /// Creates a [`StubResolver`] around `inner`.
    pub fn new(
        inner: &'a dyn Resolver,
        engine: &'a Engine,
        compartment: &'a Compartment,
        context: &'a Context,
        behavior: StubBehavior,
    ) -> Self {
        Self {
            inner,
            engine,
            compartment,
            context,
            behavior,
            log_stubbed_imports: true,
        }
    }

    /// Disables the per-stub error log.
    pub fn quiet(mut self) -> Self {
        self.log_stubbed_imports = false;
        self
    }

    /// Builds and instantiates a single-function module whose export
    /// implements the requested type with stub behavior.
    fn synthesize_function(&self, ty: &cove_core::FuncType) -> Result<Extern, ModuleError> {
        let mut body = Vec::new();
        match self.behavior {
            StubBehavior::Trap => body.push(Instr::plain(Op::Unreachable)),
            StubBehavior::Zero => {
                for result in ty.results() {
                    body.push(zero_const(*result));
                }
            }
        }
        body.push(Instr::plain(Op::End));
        let stub = Module {
            types: vec![ty.clone()],
            funcs: vec![FuncDef {
                type_index: 0,
                locals: Vec::new(),
                body,
            }],
            exports: vec![Export {
                name: "stub".to_string(),
                index: ExternIndex::Func(0),
            }],
            ..Module::default()
        };
        let compiled = self.engine.compile(stub)?;
        let instance = instantiate(self.compartment, self.context, &compiled, &[], "stub")
            .map_err(ModuleError::stub_instantiation)?;
        Ok(instance
            .export("stub")
            .expect("the stub module exports its function"))
    }
}

fn zero_const(ty: ValType) -> Instr {
    use cove_ir::Imm;
    match ty {
        ValType::I32 => Instr::with_imm(Op::I32Const, Imm::I32(0)),
        ValType::I64 => Instr::with_imm(Op::I64Const, Imm::I64(0)),
        ValType::F32 => Instr::with_imm(Op::F32Const, Imm::F32(0)),
        ValType::F64 => Instr::with_imm(Op::F64Const, Imm::F64(0)),
        ValType::V128 => Instr::with_imm(Op::V128ConstOp, Imm::V128(0)),
        ValType::FuncRef => Instr::with_imm(Op::RefNull, Imm::RefType(ValType::FuncRef)),
        ValType::AnyRef | ValType::NullRef => {
            Instr::with_imm(Op::RefNull, Imm::RefType(ValType::AnyRef))
        }
    }
}

impl Resolver for StubResolver<'_> {
    fn resolve(&self, module: &str, name: &str, expected: &ExternType) -> Option<Extern> {
        if let Some(external) = self.inner.resolve(module, name, expected) {
            return Some(external);
        }
        if self.log_stubbed_imports {
            log::error!("generated stub for missing import {module}.{name} : {expected}");
        }
        match expected {
            ExternType::Func(ty) => match self.synthesize_function(ty) {
                Ok(external) => Some(external),
                Err(error) => {
                    log::error!("cannot synthesize stub for {module}.{name}: {error}");
                    None
                }
            },
            ExternType::Memory(ty) => {
                let minimal = cove_core::MemoryType::new(ty.min(), ty.max(), ty.is_shared())
                    .expect("declared import types are well-formed");
                self.compartment
                    .create_memory(minimal, name)
                    .ok()
                    .map(Extern::Memory)
            }
            ExternType::Table(ty) => self
                .compartment
                .create_table(*ty, name)
                .ok()
                .map(Extern::Table),
            ExternType::Global(ty) => self
                .compartment
                .create_global(*ty, Value::default_for(ty.content()))
                .ok()
                .map(Extern::Global),
            ExternType::Tag(ty) => Some(Extern::Tag(self.compartment.create_tag(ty.clone(), name))),
        }
    }
}
