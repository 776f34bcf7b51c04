use crate::{
    code_memory::CodeMemory,
    compartment::Compartment,
    extern_::Extern,
    func::Function,
    global::Global,
    ids::{CompartmentId, InstanceId},
    memory::Memory,
    table::Table,
    tag::Tag,
    trap::{Trap, TrapKind},
};
use core::fmt::{self, Debug};
use core::sync::atomic::AtomicUsize;
use cove_core::RefValue;
use cove_ir::Module;
use spin::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A passive data segment: shared bytes plus a per-compartment drop bit.
///
/// Cloning a compartment shares the bytes but gives each clone its own
/// drop state.
pub(crate) type PassiveData = Mutex<Option<Arc<[u8]>>>;

/// A passive element segment, resolved to reference values.
pub(crate) type PassiveElems = Mutex<Option<Arc<Vec<RefValue>>>>;

/// The compartment-owned state of one module instance.
pub(crate) struct InstanceEntity {
    pub id: InstanceId,
    pub compartment: CompartmentId,
    pub root_count: AtomicUsize,
    /// The immutable module record, shared across clones.
    module: Arc<Module>,
    /// The loaded code image, shared across clones.
    ///
    /// `None` only on the placeholder installed while instantiation is
    /// in flight.
    code: Option<Arc<CodeMemory>>,
    /// The resolved imported functions, indexed by import order.
    imported_funcs: Vec<Function>,
    /// Root counters of the defined functions.
    ///
    /// A function's root count lives here (its "mutable data") so that
    /// rooting a function transitively roots this instance.
    defined_func_roots: Vec<AtomicUsize>,
    /// All tables of the instance: imports first, then definitions.
    pub tables: Vec<Table>,
    /// All memories of the instance: imports first, then definitions.
    pub memories: Vec<Memory>,
    /// All globals of the instance: imports first, then definitions.
    pub globals: Vec<Global>,
    /// All tags of the instance: imports first, then definitions.
    pub tags: Vec<Tag>,
    /// The name to export map, filled at the end of instantiation.
    exports: Mutex<BTreeMap<String, Extern>>,
    /// Passive data segments; active segments hold `None` from the start.
    pub(crate) passive_datas: Vec<PassiveData>,
    /// Passive element segments; active segments hold `None`.
    pub(crate) passive_elems: Vec<PassiveElems>,
    /// The start function index if declared.
    pub start: Option<u32>,
    pub debug_name: String,
}

impl Debug for InstanceEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceEntity")
            .field("id", &self.id)
            .field("name", &self.debug_name)
            .finish()
    }
}

impl InstanceEntity {
    /// A placeholder installed while instantiation is in flight.
    pub(crate) fn placeholder(id: InstanceId, compartment: CompartmentId) -> Self {
        Self {
            id,
            compartment,
            root_count: AtomicUsize::new(0),
            module: Arc::new(Module::default()),
            code: None,
            imported_funcs: Vec::new(),
            defined_func_roots: Vec::new(),
            tables: Vec::new(),
            memories: Vec::new(),
            globals: Vec::new(),
            tags: Vec::new(),
            exports: Mutex::new(BTreeMap::new()),
            passive_datas: Vec::new(),
            passive_elems: Vec::new(),
            start: None,
            debug_name: String::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: InstanceId,
        compartment: CompartmentId,
        module: Arc<Module>,
        code: Arc<CodeMemory>,
        imported_funcs: Vec<Function>,
        tables: Vec<Table>,
        memories: Vec<Memory>,
        globals: Vec<Global>,
        tags: Vec<Tag>,
        passive_datas: Vec<PassiveData>,
        passive_elems: Vec<PassiveElems>,
        debug_name: String,
    ) -> Self {
        let num_defined = module.funcs.len();
        Self {
            id,
            compartment,
            root_count: AtomicUsize::new(0),
            start: module.start,
            module,
            code: Some(code),
            imported_funcs,
            defined_func_roots: (0..num_defined).map(|_| AtomicUsize::new(0)).collect(),
            tables,
            memories,
            globals,
            tags,
            exports: Mutex::new(BTreeMap::new()),
            passive_datas,
            passive_elems,
            debug_name,
        }
    }

    /// Returns the module record of the instance.
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    /// Returns the loaded code image.
    pub fn code(&self) -> Option<&Arc<CodeMemory>> {
        self.code.as_ref()
    }

    /// Returns the function with the given index (imports included).
    pub fn function(this: &Arc<Self>, index: u32) -> Option<Function> {
        let num_imported = this.module.num_imported_funcs();
        if index < num_imported {
            return this.imported_funcs.get(index as usize).cloned();
        }
        if index < this.module.num_funcs() {
            return Some(Function::wasm(this, index));
        }
        None
    }

    /// Returns the root counter of the function with the given index.
    ///
    /// Imported functions root their defining instance instead, so only
    /// defined indices reach this.
    pub fn func_root_count(&self, index: u32) -> &AtomicUsize {
        let defined = index
            .checked_sub(self.module.num_imported_funcs())
            .expect("imported functions carry their own roots");
        &self.defined_func_roots[defined as usize]
    }

    /// Returns `true` if any function of this instance is rooted.
    pub(crate) fn has_rooted_function(&self) -> bool {
        self.defined_func_roots
            .iter()
            .any(|count| count.load(core::sync::atomic::Ordering::Acquire) > 0)
    }

    pub(crate) fn imported_funcs(&self) -> &[Function] {
        &self.imported_funcs
    }

    pub(crate) fn set_exports(&self, exports: BTreeMap<String, Extern>) {
        *self.exports.lock() = exports;
    }

    pub(crate) fn export(&self, name: &str) -> Option<Extern> {
        self.exports.lock().get(name).cloned()
    }

    pub(crate) fn export_entries(&self) -> Vec<(String, Extern)> {
        self.exports
            .lock()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Returns a human-readable name for the function with the given
    /// index, preferring the module's debug names.
    pub fn func_debug_name(&self, index: u32) -> String {
        match self.module.names.func_name(index) {
            Some(name) => format!("{}!{name}", self.debug_name),
            None => format!("{}!<function #{index}>", self.debug_name),
        }
    }

    /// Returns the bytes of the passive data segment if not yet dropped.
    pub(crate) fn passive_data(&self, segment: u32) -> Option<Arc<[u8]>> {
        self.passive_datas
            .get(segment as usize)
            .and_then(|bytes| bytes.lock().clone())
    }

    /// Returns the items of the passive element segment if not dropped.
    pub(crate) fn passive_elem(&self, segment: u32) -> Option<Arc<Vec<RefValue>>> {
        self.passive_elems
            .get(segment as usize)
            .and_then(|items| items.lock().clone())
    }

    /// Clones this instance into a cloned compartment, remapping every
    /// object handle to the clone's object with the same id.
    pub(crate) fn clone_into(
        this: &Arc<Self>,
        clone: &Compartment,
        id: InstanceId,
    ) -> Arc<Self> {
        let clone_state = clone.inner.state.lock();
        let remap_table = |table: &Table| Table {
            entity: clone_state
                .tables
                .get(table.id())
                .expect("tables are cloned before instances")
                .clone(),
        };
        let remap_memory = |memory: &Memory| Memory {
            entity: clone_state
                .memories
                .get(memory.id())
                .expect("memories are cloned before instances")
                .clone(),
        };
        let remap_global = |global: &Global| Global {
            entity: clone_state
                .globals
                .get(global.id())
                .expect("globals are cloned before instances")
                .clone(),
        };
        let remap_tag = |tag: &Tag| Tag {
            entity: clone_state
                .tags
                .get(tag.id())
                .expect("tags are cloned before instances")
                .clone(),
        };
        let remap_function = |function: &Function| match &function.kind {
            crate::func::FunctionKind::Host(host) => Function::host(host.clone()),
            crate::func::FunctionKind::Wasm { instance, index } => {
                let original = instance.upgrade().expect("imports outlive their importers");
                let cloned = clone_state
                    .instances
                    .get(original.id)
                    .expect("imported instances are cloned before their importers")
                    .clone();
                Function::wasm(&cloned, *index)
            }
        };

        let entity = Arc::new(Self {
            id,
            compartment: clone.id(),
            root_count: AtomicUsize::new(0),
            module: this.module.clone(),
            code: this.code.clone(),
            imported_funcs: this.imported_funcs.iter().map(remap_function).collect(),
            defined_func_roots: (0..this.defined_func_roots.len())
                .map(|_| AtomicUsize::new(0))
                .collect(),
            tables: this.tables.iter().map(remap_table).collect(),
            memories: this.memories.iter().map(remap_memory).collect(),
            globals: this.globals.iter().map(remap_global).collect(),
            tags: this.tags.iter().map(remap_tag).collect(),
            exports: Mutex::new(BTreeMap::new()),
            // Bytes are shared; the drop bits are per-clone.
            passive_datas: this
                .passive_datas
                .iter()
                .map(|bytes| Mutex::new(bytes.lock().clone()))
                .collect(),
            passive_elems: this
                .passive_elems
                .iter()
                .map(|items| Mutex::new(items.lock().clone()))
                .collect(),
            start: this.start,
            debug_name: this.debug_name.clone(),
        });
        drop(clone_state);

        // Rebuild the export map against the clone's objects.
        let exports = this
            .export_entries()
            .into_iter()
            .map(|(name, value)| {
                let value = match &value {
                    Extern::Func(function) => {
                        // Own functions must point at the cloned entity.
                        match &function.kind {
                            crate::func::FunctionKind::Wasm { instance, index }
                                if instance
                                    .upgrade()
                                    .is_some_and(|original| original.id == this.id) =>
                            {
                                Extern::Func(Function::wasm(&entity, *index))
                            }
                            _ => Extern::Func(remap_function_standalone(clone, function)),
                        }
                    }
                    Extern::Table(table) => Extern::Table(Table {
                        entity: clone
                            .inner
                            .state
                            .lock()
                            .tables
                            .get(table.id())
                            .expect("cloned")
                            .clone(),
                    }),
                    Extern::Memory(memory) => Extern::Memory(Memory {
                        entity: clone
                            .inner
                            .state
                            .lock()
                            .memories
                            .get(memory.id())
                            .expect("cloned")
                            .clone(),
                    }),
                    Extern::Global(global) => Extern::Global(Global {
                        entity: clone
                            .inner
                            .state
                            .lock()
                            .globals
                            .get(global.id())
                            .expect("cloned")
                            .clone(),
                    }),
                    Extern::Tag(tag) => Extern::Tag(Tag {
                        entity: clone
                            .inner
                            .state
                            .lock()
                            .tags
                            .get(tag.id())
                            .expect("cloned")
                            .clone(),
                    }),
                };
                (name, value)
            })
            .collect();
        entity.set_exports(exports);
        entity
    }
}

fn remap_function_standalone(clone: &Compartment, function: &Function) -> Function {
    match &function.kind {
        crate::func::FunctionKind::Host(host) => Function::host(host.clone()),
        crate::func::FunctionKind::Wasm { instance, index } => {
            let original = instance.upgrade().expect("imports outlive their importers");
            let cloned = clone
                .inner
                .state
                .lock()
                .instances
                .get(original.id)
                .expect("imported instances are cloned before their importers")
                .clone();
            Function::wasm(&cloned, *index)
        }
    }
}

/// A module instance: the runtime result of instantiating a compiled
/// module inside a compartment.
#[derive(Debug, Clone)]
pub struct Instance {
    pub(crate) entity: Arc<InstanceEntity>,
}

impl Instance {
    /// Returns the runtime id of the instance within its compartment.
    pub fn id(&self) -> InstanceId {
        self.entity.id
    }

    /// Returns the id of the owning compartment.
    pub fn compartment_id(&self) -> CompartmentId {
        self.entity.compartment
    }

    /// Returns the export with the given name if any.
    pub fn export(&self, name: &str) -> Option<Extern> {
        self.entity.export(name)
    }

    /// Returns the function with the given index (imports included).
    pub fn function(&self, index: u32) -> Option<Function> {
        InstanceEntity::function(&self.entity, index)
    }

    /// Returns the start function if the module declared one.
    pub fn start_function(&self) -> Option<Function> {
        self.entity
            .start
            .and_then(|index| InstanceEntity::function(&self.entity, index))
    }

    /// Returns the debug name given at instantiation.
    pub fn debug_name(&self) -> &str {
        &self.entity.debug_name
    }

    /// `data.drop`: releases the backing bytes of a passive data
    /// segment. Idempotent; dropping an active segment is a no-op.
    pub fn data_drop(&self, segment: u32) {
        if let Some(bytes) = self.entity.passive_datas.get(segment as usize) {
            bytes.lock().take();
        }
    }

    /// `elem.drop`: releases a passive element segment. Idempotent.
    pub fn elem_drop(&self, segment: u32) {
        if let Some(items) = self.entity.passive_elems.get(segment as usize) {
            items.lock().take();
        }
    }

    /// `memory.init`: copies from a passive data segment into `memory`.
    ///
    /// A dropped segment behaves as a zero-length segment. The in-range
    /// prefix is written before any trap is raised.
    ///
    /// # Errors
    ///
    /// Traps on out-of-bounds segment or memory ranges.
    pub fn memory_init(
        &self,
        memory: &Memory,
        segment: u32,
        dst: u64,
        src: u64,
        len: u64,
    ) -> Result<(), Trap> {
        let bytes = self.entity.passive_data(segment);
        let bytes = bytes.as_deref().unwrap_or(&[]);
        let instance = self.entity.id.into_u32();
        memory.entity.init_from(bytes, dst, src, len, |size| {
            Trap::new(TrapKind::OutOfBoundsDataSegmentAccess {
                instance,
                segment,
                size,
            })
        })
    }

    /// `table.init`: copies from a passive element segment into `table`.
    ///
    /// # Errors
    ///
    /// Traps on out-of-bounds segment or table ranges.
    pub fn table_init(
        &self,
        table: &Table,
        segment: u32,
        dst: u64,
        src: u64,
        len: u64,
    ) -> Result<(), Trap> {
        let items = self.entity.passive_elem(segment);
        let items = items.as_deref().map(Vec::as_slice).unwrap_or(&[]);
        let instance = self.entity.id.into_u32();
        table.entity.init_from(items, dst, src, len, |size| {
            Trap::new(TrapKind::OutOfBoundsElemSegmentAccess {
                instance,
                segment,
                size,
            })
        })
    }

    /// Adds a root reference, protecting the instance from reclamation.
    pub fn add_root(&self) {
        self.entity
            .root_count
            .fetch_add(1, core::sync::atomic::Ordering::AcqRel);
    }

    /// Removes a root reference.
    pub fn remove_root(&self) {
        self.entity
            .root_count
            .fetch_sub(1, core::sync::atomic::Ordering::AcqRel);
    }
}
