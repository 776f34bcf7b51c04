//! Module instantiation.
//!
//! Instantiation is atomic from the guest's point of view: either every
//! step succeeds and the instance is installed in its compartment, or
//! the partially constructed instance is unregistered and its objects
//! are left to the next reclamation pass.

use crate::{
    code_memory::{CodeLoadError, CodeMemory, SymbolResolver},
    codegen::SymbolRef,
    compartment::{Compartment, CompartmentError},
    context::Context,
    extern_::{Extern, ExternType},
    func::{Function, FunctionKind},
    global::Global,
    instance::{Instance, InstanceEntity},
    intrinsics,
    invoke::invoke,
    memory::Memory,
    module::CompiledModule,
    table::Table,
    tag::Tag,
    trap::{Trap, TrapKind},
};
use core::fmt::{self, Display};
use cove_core::{RefValue, TagType, UntypedValue};
use cove_ir::{ConstExpr, DataSegmentMode, ElemItems, ElemSegmentMode, ExternIndex, ImportDesc};
use spin::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// An error during instantiation.
#[derive(Debug)]
pub enum InstantiationError {
    /// Too many or too few imports were supplied.
    ImportCountMismatch {
        /// The number of imports the module declares.
        expected: usize,
        /// The number of externals supplied.
        given: usize,
    },
    /// A supplied import does not satisfy the declared import type.
    ImportTypeMismatch {
        /// The import index.
        index: usize,
        /// The declared import type.
        expected: ExternType,
        /// The type of the supplied external.
        found: ExternType,
    },
    /// A supplied import lives in a different compartment.
    CrossCompartmentImport {
        /// The import index.
        index: usize,
    },
    /// The compartment ran out of a resource.
    Resource(CompartmentError),
    /// The code image could not be loaded.
    CodeLoad(CodeLoadError),
    /// Segment initialization or the start function trapped.
    Trap(Trap),
}

impl From<CompartmentError> for InstantiationError {
    fn from(error: CompartmentError) -> Self {
        Self::Resource(error)
    }
}

impl From<CodeLoadError> for InstantiationError {
    fn from(error: CodeLoadError) -> Self {
        Self::CodeLoad(error)
    }
}

impl From<Trap> for InstantiationError {
    fn from(trap: Trap) -> Self {
        Self::Trap(trap)
    }
}

impl Display for InstantiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImportCountMismatch { expected, given } => {
                write!(f, "module needs {expected} imports but {given} were supplied")
            }
            Self::ImportTypeMismatch {
                index,
                expected,
                found,
            } => write!(
                f,
                "import {index} requires {expected} but a {found} was supplied"
            ),
            Self::CrossCompartmentImport { index } => {
                write!(f, "import {index} belongs to a different compartment")
            }
            Self::Resource(error) => write!(f, "{error}"),
            Self::CodeLoad(error) => write!(f, "{error}"),
            Self::Trap(trap) => write!(f, "{trap}"),
        }
    }
}

impl core::error::Error for InstantiationError {}

/// Binds the symbols of a module's object code against the resolved
/// imports and the ids the compartment assigned to its objects.
struct InstanceSymbols<'a> {
    imported_funcs: &'a [Function],
    memories: &'a [Memory],
    tables: &'a [Table],
    globals: &'a [Global],
    tags: &'a [Tag],
}

impl SymbolResolver for InstanceSymbols<'_> {
    fn resolve(&self, symbol: &SymbolRef) -> Result<u64, Trap> {
        match symbol {
            SymbolRef::ImportedFunction(index) => {
                let function = self
                    .imported_funcs
                    .get(*index as usize)
                    .ok_or_else(|| Trap::new(TrapKind::CalledUnimplementedIntrinsic))?;
                match &function.kind {
                    FunctionKind::Host(host) => Ok(crate::func::HostFunc::thunk_addr(host)),
                    FunctionKind::Wasm { instance, index } => {
                        let instance = instance
                            .upgrade()
                            .expect("imports are alive during instantiation");
                        let num_imported = instance.module().num_imported_funcs();
                        let code = instance
                            .code()
                            .expect("imports come from fully built instances");
                        let entry = code
                            .entry(index - num_imported)
                            .ok_or_else(|| Trap::new(TrapKind::CalledUnimplementedIntrinsic))?;
                        Ok(entry.addr as usize as u64)
                    }
                }
            }
            SymbolRef::Intrinsic { name, .. } => intrinsics::lookup(name)
                .ok_or_else(|| Trap::new(TrapKind::CalledUnimplementedIntrinsic)),
            SymbolRef::MemoryId(index) => self
                .memories
                .get(*index as usize)
                .map(|memory| u64::from(memory.id().into_u32()))
                .ok_or_else(|| Trap::new(TrapKind::InvalidArgument)),
            SymbolRef::TableId(index) => self
                .tables
                .get(*index as usize)
                .map(|table| u64::from(table.id().into_u32()))
                .ok_or_else(|| Trap::new(TrapKind::InvalidArgument)),
            SymbolRef::GlobalSlot(index) => {
                let global = self
                    .globals
                    .get(*index as usize)
                    .ok_or_else(|| Trap::new(TrapKind::InvalidArgument))?;
                match global.entity.slot {
                    Some(slot) => Ok(u64::from(slot)),
                    // Immutable globals resolve to the address of their
                    // inline value.
                    None => Ok(global.entity.initial_ptr() as usize as u64),
                }
            }
            SymbolRef::TagId(index) => self
                .tags
                .get(*index as usize)
                .map(|tag| u64::from(tag.id().into_u32()))
                .ok_or_else(|| Trap::new(TrapKind::InvalidArgument)),
            SymbolRef::TableSentinel => Ok(0),
        }
    }
}

/// Instantiates `module` inside `compartment`.
///
/// `imports` must match the module's import descriptors in declaration
/// order; use the [`Linker`](crate::Resolver) to produce the vector. The
/// start function, if declared, runs in `context` before this returns.
///
/// # Errors
///
/// See [`InstantiationError`]; on error nothing guest-visible remains of
/// the attempted instantiation except objects awaiting reclamation.
pub fn instantiate(
    compartment: &Compartment,
    context: &Context,
    module: &CompiledModule,
    imports: &[Extern],
    debug_name: &str,
) -> Result<Instance, InstantiationError> {
    // Step 1: allocate the instance id.
    let id = compartment.reserve_instance_id();
    let result = instantiate_inner(compartment, context, module, imports, debug_name, id);
    if result.is_err() {
        compartment.unregister_instance(id);
    }
    result
}

fn instantiate_inner(
    compartment: &Compartment,
    context: &Context,
    module: &CompiledModule,
    imports: &[Extern],
    debug_name: &str,
    id: crate::ids::InstanceId,
) -> Result<Instance, InstantiationError> {
    let ir = module.module();
    let config = module.engine().config();

    // Step 2: check the supplied imports.
    if imports.len() != ir.imports.len() {
        return Err(InstantiationError::ImportCountMismatch {
            expected: ir.imports.len(),
            given: imports.len(),
        });
    }
    let mut imported_funcs = Vec::new();
    let mut tables = Vec::new();
    let mut memories = Vec::new();
    let mut globals = Vec::new();
    let mut tags = Vec::new();
    for (index, (import, external)) in ir.imports.iter().zip(imports).enumerate() {
        let expected = import_type(ir, &import.desc);
        let found = external.ty();
        if !expected.is_satisfied_by(&found) {
            return Err(InstantiationError::ImportTypeMismatch {
                index,
                expected,
                found,
            });
        }
        let external_compartment = match external {
            Extern::Func(function) => function.compartment_id(),
            Extern::Table(table) => Some(table.compartment_id()),
            Extern::Memory(memory) => Some(memory.compartment_id()),
            Extern::Global(global) => Some(global.compartment_id()),
            Extern::Tag(tag) => Some(tag.compartment_id()),
        };
        // Host functions are compartment-less; everything else must live
        // in the target compartment.
        if let Some(external_compartment) = external_compartment {
            if !compartment.owns(external_compartment) {
                return Err(InstantiationError::CrossCompartmentImport { index });
            }
        }
        match external.clone() {
            Extern::Func(function) => imported_funcs.push(function),
            Extern::Table(table) => tables.push(table),
            Extern::Memory(memory) => memories.push(memory),
            Extern::Global(global) => globals.push(global),
            Extern::Tag(tag) => tags.push(tag),
        }
    }

    // Step 3: create the locally defined objects.
    for ty in &ir.tables {
        tables.push(compartment.create_table(*ty, debug_name)?);
    }
    for ty in &ir.memories {
        memories.push(compartment.create_memory_capped(
            *ty,
            config.max_memory_pages(),
            debug_name,
        )?);
    }
    for def in &ir.tags {
        let ty = ir
            .types
            .get(def.type_index as usize)
            .map(TagType::from_func_type)
            .expect("validated tag type index");
        tags.push(compartment.create_tag(ty, debug_name));
    }

    // Step 4: evaluate global initializers; `ref.func` is deferred until
    // the function pointers exist.
    let mut deferred_func_globals = Vec::new();
    for def in &ir.globals {
        let global = match &def.init {
            ConstExpr::RefFunc(func_index) => {
                let global = compartment.create_global_raw(
                    def.ty,
                    UntypedValue::from_ref(RefValue::Null),
                    false,
                )?;
                deferred_func_globals.push((global.clone(), *func_index));
                global
            }
            init => {
                let value = eval_const(init, &globals);
                compartment.create_global_raw(def.ty, value, true)?
            }
        };
        globals.push(global);
    }

    // Step 5: load the code image, binding imports and intrinsics.
    let symbols = InstanceSymbols {
        imported_funcs: &imported_funcs,
        memories: &memories,
        tables: &tables,
        globals: &globals,
        tags: &tags,
    };
    let code = Arc::new(CodeMemory::load(module.object(), &symbols)?);

    // The passive segment state starts as the module's bytes; active
    // segments have no runtime state.
    let passive_datas = ir
        .datas
        .iter()
        .map(|segment| {
            Mutex::new(match segment.mode {
                DataSegmentMode::Passive => Some(Arc::<[u8]>::from(segment.bytes.as_slice())),
                DataSegmentMode::Active { .. } => None,
            })
        })
        .collect();

    let entity = Arc::new(InstanceEntity::new(
        id,
        compartment.id(),
        ir.clone(),
        code,
        imported_funcs,
        tables,
        memories,
        globals,
        tags,
        passive_datas,
        // Passive element segments are resolved below, once the entity
        // exists and own function references can be encoded.
        ir.elems.iter().map(|_| Mutex::new(None)).collect(),
        debug_name.to_string(),
    ));
    compartment.install_instance(id, entity.clone());
    let instance = Instance {
        entity: entity.clone(),
    };

    // Step 6: back-patch the deferred `ref.func` globals.
    for (global, func_index) in deferred_func_globals {
        let function = InstanceEntity::function(&entity, func_index)
            .expect("validated function index");
        let value = UntypedValue::from_ref(function.to_ref());
        global.entity.patch_initial(value);
        if let Some(slot) = global.entity.slot {
            compartment.seed_mutable_global(slot, value);
        }
    }

    // Resolve the element segments to reference values.
    for (segment, state) in ir.elems.iter().zip(&entity.passive_elems) {
        if matches!(segment.mode, ElemSegmentMode::Passive) {
            let items = resolve_elem_items(segment, &entity)?;
            *state.lock() = Some(Arc::new(items));
        }
    }

    // Step 7: copy the active data segments.
    for (index, segment) in ir.datas.iter().enumerate() {
        let DataSegmentMode::Active { memory, offset } = &segment.mode else {
            continue;
        };
        let memory = &entity.memories[*memory as usize];
        let dst = u64::from(eval_const(offset, &entity.globals).to_bits64() as u32);
        let instance_index = id.into_u32();
        memory
            .entity
            .init_from(&segment.bytes, dst, 0, segment.bytes.len() as u64, |size| {
                Trap::new(TrapKind::OutOfBoundsDataSegmentAccess {
                    instance: instance_index,
                    segment: index as u32,
                    size,
                })
            })?;
    }

    // Step 8: write the active element segments.
    for (index, segment) in ir.elems.iter().enumerate() {
        let ElemSegmentMode::Active { table, offset } = &segment.mode else {
            continue;
        };
        let table = &entity.tables[*table as usize];
        let dst = u64::from(eval_const(offset, &entity.globals).to_bits64() as u32);
        let items = resolve_elem_items(segment, &entity)?;
        table
            .entity
            .init_from(&items, dst, 0, items.len() as u64, |size| {
                Trap::new(TrapKind::OutOfBoundsElemSegmentAccess {
                    instance: id.into_u32(),
                    segment: index as u32,
                    size,
                })
            })?;
    }

    // Build the export map.
    let mut exports = BTreeMap::new();
    for export in &ir.exports {
        let external = match export.index {
            ExternIndex::Func(index) => Extern::Func(
                InstanceEntity::function(&entity, index).expect("validated export index"),
            ),
            ExternIndex::Table(index) => Extern::Table(entity.tables[index as usize].clone()),
            ExternIndex::Memory(index) => {
                Extern::Memory(entity.memories[index as usize].clone())
            }
            ExternIndex::Global(index) => {
                Extern::Global(entity.globals[index as usize].clone())
            }
            ExternIndex::Tag(index) => Extern::Tag(entity.tags[index as usize].clone()),
        };
        exports.insert(export.name.clone(), external);
    }
    entity.set_exports(exports);

    // Step 9: run the start function.
    if let Some(start) = instance.start_function() {
        invoke(context, &start, &[]).map_err(InstantiationError::Trap)?;
    }

    Ok(instance)
}

/// Returns the declared [`ExternType`] of an import descriptor.
fn import_type(module: &cove_ir::Module, desc: &ImportDesc) -> ExternType {
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

/// Evaluates a constant expression against already created globals.
///
/// `ref.func` never reaches this: it is deferred or resolved through the
/// instance.
fn eval_const(expr: &ConstExpr, globals: &[Global]) -> UntypedValue {
    match expr {
        ConstExpr::I32(value) => UntypedValue::from(*value),
        ConstExpr::I64(value) => UntypedValue::from(*value),
        ConstExpr::F32(bits) => UntypedValue::from_bits64(u64::from(*bits)),
        ConstExpr::F64(bits) => UntypedValue::from_bits64(*bits),
        ConstExpr::V128(bits) => UntypedValue::from_bits128(*bits),
        ConstExpr::RefNull(_) => UntypedValue::from_ref(RefValue::Null),
        ConstExpr::GlobalGet(index) => globals[*index as usize].entity.initial(),
        ConstExpr::RefFunc(_) => unreachable!("ref.func initializers are deferred"),
    }
}

/// Resolves an element segment's items to reference values through the
/// instance's function index space.
fn resolve_elem_items(
    segment: &cove_ir::ElemSegment,
    entity: &Arc<InstanceEntity>,
) -> Result<Vec<RefValue>, Trap> {
    let resolve_func = |index: u32| -> RefValue {
        InstanceEntity::function(entity, index)
            .expect("validated function index")
            .to_ref()
    };
    Ok(match &segment.items {
        ElemItems::Funcs(indices) => indices.iter().copied().map(resolve_func).collect(),
        ElemItems::Exprs(exprs) => exprs
            .iter()
            .map(|expr| match expr {
                ConstExpr::RefNull(_) => RefValue::Null,
                ConstExpr::RefFunc(index) => resolve_func(*index),
                ConstExpr::GlobalGet(index) => entity.globals[*index as usize]
                    .entity
                    .initial()
                    .to_ref(),
                _ => RefValue::Null,
            })
            .collect(),
    })
}
