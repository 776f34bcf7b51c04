//! Compartments: the unit of isolation.
//!
//! Every object a guest can reach lives in exactly one compartment, and
//! every operation that accepts externally supplied objects checks their
//! compartment first. The compartment's mutex guards its id maps; it is
//! never held across calls into guest code or user-supplied resolvers.

use cove_collections::ArenaIndex;

use crate::{
    context::{Context, ContextEntity},
    global::{Global, GlobalEntity},
    ids::{CompartmentId, ContextId, GlobalId, InstanceId, MemoryId, TableId, TagId},
    instance::InstanceEntity,
    memory::{Memory, MemoryEntity, MemoryError},
    runtime_data::{RuntimeDataRegion, MAX_CONTEXTS, MAX_MEMORIES, MAX_MUTABLE_GLOBALS, MAX_TABLES},
    table::{Table, TableEntity, TableError},
    tag::{Tag, TagEntity},
};
use core::fmt::{self, Debug, Display};
use core::sync::atomic::{AtomicUsize, Ordering};
use cove_collections::SparseArena;
use cove_core::{
    GlobalType,
    MemoryType,
    TableType,
    TagType,
    UntypedValue,
    Value,
    VirtualMemoryError,
};
use spin::Mutex;
use std::sync::Arc;

/// Errors raised when a compartment runs out of a resource.
#[derive(Debug)]
pub enum CompartmentError {
    /// All memory ids of the runtime-data layout are in use.
    OutOfMemoryIds,
    /// All table ids of the runtime-data layout are in use.
    OutOfTableIds,
    /// All mutable-global slots are in use.
    OutOfMutableGlobalSlots,
    /// All context blocks of the runtime-data region are in use.
    OutOfContexts,
    /// The operating system refused an allocation.
    Virtual(VirtualMemoryError),
    /// A memory could not be created.
    Memory(MemoryError),
    /// A table could not be created.
    Table(TableError),
}

impl From<VirtualMemoryError> for CompartmentError {
    fn from(error: VirtualMemoryError) -> Self {
        Self::Virtual(error)
    }
}

impl From<MemoryError> for CompartmentError {
    fn from(error: MemoryError) -> Self {
        Self::Memory(error)
    }
}

impl From<TableError> for CompartmentError {
    fn from(error: TableError) -> Self {
        Self::Table(error)
    }
}

impl Display for CompartmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemoryIds => write!(f, "the compartment is out of memory ids"),
            Self::OutOfTableIds => write!(f, "the compartment is out of table ids"),
            Self::OutOfMutableGlobalSlots => {
                write!(f, "the compartment is out of mutable-global slots")
            }
            Self::OutOfContexts => write!(f, "the compartment is out of context blocks"),
            Self::Virtual(error) => write!(f, "{error}"),
            Self::Memory(error) => write!(f, "{error}"),
            Self::Table(error) => write!(f, "{error}"),
        }
    }
}

impl core::error::Error for CompartmentError {}

/// The id-indexed object maps of a compartment, behind its mutex.
pub(crate) struct CompartmentState {
    pub memories: SparseArena<MemoryId, Arc<MemoryEntity>>,
    pub tables: SparseArena<TableId, Arc<TableEntity>>,
    pub globals: SparseArena<GlobalId, Arc<GlobalEntity>>,
    pub tags: SparseArena<TagId, Arc<TagEntity>>,
    pub instances: SparseArena<InstanceId, Arc<InstanceEntity>>,
    pub contexts: SparseArena<ContextId, Arc<ContextEntity>>,
    /// The initial mutable-global values copied into every new context.
    pub global_template: Vec<UntypedValue>,
}

impl CompartmentState {
    fn new() -> Self {
        Self {
            memories: SparseArena::new(),
            tables: SparseArena::new(),
            globals: SparseArena::new(),
            tags: SparseArena::new(),
            instances: SparseArena::new(),
            contexts: SparseArena::new(),
            global_template: Vec::new(),
        }
    }
}

pub(crate) struct CompartmentInner {
    id: CompartmentId,
    pub(crate) root_count: AtomicUsize,
    runtime_data: RuntimeDataRegion,
    pub(crate) state: Mutex<CompartmentState>,
}

impl CompartmentInner {
    pub fn runtime_data(&self) -> &RuntimeDataRegion {
        &self.runtime_data
    }

    pub fn id(&self) -> CompartmentId {
        self.id
    }
}

impl Debug for CompartmentInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compartment").field("id", &self.id).finish()
    }
}

/// An isolation domain owning tables, memories, globals, exception tags,
/// module instances and execution contexts.
#[derive(Debug, Clone)]
pub struct Compartment {
    pub(crate) inner: Arc<CompartmentInner>,
}

impl Compartment {
    /// Creates a new empty compartment.
    ///
    /// # Errors
    ///
    /// If the runtime-data region cannot be reserved.
    pub fn new() -> Result<Self, CompartmentError> {
        let runtime_data = RuntimeDataRegion::new()?;
        let inner = Arc::new(CompartmentInner {
            id: CompartmentId::next(),
            root_count: AtomicUsize::new(0),
            runtime_data,
            state: Mutex::new(CompartmentState::new()),
        });
        inner
            .runtime_data
            .set_owner(Arc::as_ptr(&inner) as *const ());
        Ok(Self { inner })
    }

    /// Returns the process-unique id of the compartment.
    pub fn id(&self) -> CompartmentId {
        self.inner.id
    }

    /// Creates a memory of the given type.
    ///
    /// # Errors
    ///
    /// If the compartment is out of memory ids or the reservation fails.
    pub fn create_memory(
        &self,
        ty: MemoryType,
        debug_name: &str,
    ) -> Result<Memory, CompartmentError> {
        self.create_memory_capped(ty, MemoryType::MAX_PAGES, debug_name)
    }

    pub(crate) fn create_memory_capped(
        &self,
        ty: MemoryType,
        max_pages: u32,
        debug_name: &str,
    ) -> Result<Memory, CompartmentError> {
        let mut state = self.inner.state.lock();
        if state.memories.len() >= MAX_MEMORIES {
            return Err(CompartmentError::OutOfMemoryIds);
        }
        let compartment = self.inner.id;
        let id = state.memories.try_alloc_with(|id| {
            MemoryEntity::new(id, compartment, ty, max_pages, debug_name.to_string())
                .map(Arc::new)
        })?;
        let entity = state.memories.get(id).expect("freshly allocated").clone();
        self.inner
            .runtime_data
            .set_memory_base(id.into_u32() as usize, entity.base());
        Ok(Memory { entity })
    }

    /// Creates a table of the given type.
    ///
    /// # Errors
    ///
    /// If the compartment is out of table ids.
    pub fn create_table(&self, ty: TableType, debug_name: &str) -> Result<Table, CompartmentError> {
        let mut state = self.inner.state.lock();
        if state.tables.len() >= MAX_TABLES {
            return Err(CompartmentError::OutOfTableIds);
        }
        let compartment = self.inner.id;
        let id = state.tables.alloc_with(|id| {
            Arc::new(TableEntity::new(id, compartment, ty, debug_name.to_string()))
        });
        let entity = state.tables.get(id).expect("freshly allocated").clone();
        self.inner
            .runtime_data
            .set_table_base(id.into_u32() as usize, entity.elements_base() as *mut u8);
        Ok(Table { entity })
    }

    /// Creates a global of the given type holding `initial`.
    ///
    /// # Errors
    ///
    /// If the compartment is out of mutable-global slots.
    pub fn create_global(
        &self,
        ty: GlobalType,
        initial: Value,
    ) -> Result<Global, CompartmentError> {
        self.create_global_raw(ty, initial.to_untyped(), true)
    }

    /// Creates a global, optionally leaving it uninitialized for the
    /// deferred `ref.func` backpatch of instantiation.
    pub(crate) fn create_global_raw(
        &self,
        ty: GlobalType,
        initial: UntypedValue,
        initialized: bool,
    ) -> Result<Global, CompartmentError> {
        let mut state = self.inner.state.lock();
        let slot = if ty.mutability().is_mut() {
            let slot = state.global_template.len();
            if slot >= MAX_MUTABLE_GLOBALS {
                return Err(CompartmentError::OutOfMutableGlobalSlots);
            }
            state.global_template.push(initial);
            // Seed the slot of every live context with the initial value.
            for (_, context) in state.contexts.iter() {
                unsafe {
                    self.inner
                        .runtime_data
                        .context_globals(context.slot)
                        .add(slot)
                        .write(initial);
                }
            }
            Some(slot as u32)
        } else {
            None
        };
        let compartment = self.inner.id;
        let id = state.globals.alloc_with(|id| {
            Arc::new(GlobalEntity::new(id, compartment, ty, slot, initial, initialized))
        });
        let entity = state.globals.get(id).expect("freshly allocated").clone();
        Ok(Global { entity })
    }

    /// Creates an exception tag.
    pub fn create_tag(&self, ty: TagType, debug_name: &str) -> Tag {
        let mut state = self.inner.state.lock();
        let compartment = self.inner.id;
        let id = state.tags.alloc_with(|id| {
            Arc::new(TagEntity::new(id, compartment, ty.clone(), debug_name.to_string()))
        });
        let entity = state.tags.get(id).expect("freshly allocated").clone();
        Tag { entity }
    }

    /// Creates an execution context.
    ///
    /// The context block is committed and seeded from the compartment's
    /// mutable-global template.
    ///
    /// # Errors
    ///
    /// If the compartment is out of context blocks.
    pub fn create_context(&self) -> Result<Context, CompartmentError> {
        let mut state = self.inner.state.lock();
        if state.contexts.len() >= MAX_CONTEXTS {
            return Err(CompartmentError::OutOfContexts);
        }
        let compartment_id = self.inner.id;
        let runtime_data = &self.inner.runtime_data;
        let id = state.contexts.try_alloc_with(|id| {
            let slot = id.into_usize();
            runtime_data.commit_context(slot)?;
            Ok::<_, VirtualMemoryError>(Arc::new(ContextEntity {
                id,
                compartment_id,
                slot,
                root_count: AtomicUsize::new(0),
            }))
        })?;
        let entity = state.contexts.get(id).expect("freshly allocated").clone();
        let slot = entity.slot;
        let globals = self.inner.runtime_data.context_globals(slot);
        for (index, value) in state.global_template.iter().enumerate() {
            unsafe {
                globals.add(index).write(*value);
            }
        }
        Ok(Context {
            entity,
            compartment: self.inner.clone(),
        })
    }

    /// Reserves an instance id, installing a placeholder entity.
    ///
    /// Instantiation builds the real entity outside the compartment
    /// mutex and installs it with [`Self::install_instance`], or rolls
    /// back with [`Self::unregister_instance`].
    pub(crate) fn reserve_instance_id(&self) -> InstanceId {
        let compartment = self.inner.id;
        self.inner
            .state
            .lock()
            .instances
            .alloc_with(|id| Arc::new(InstanceEntity::placeholder(id, compartment)))
    }

    /// Replaces the placeholder for `id` with the real entity.
    pub(crate) fn install_instance(&self, id: InstanceId, entity: Arc<InstanceEntity>) {
        let mut state = self.inner.state.lock();
        *state.instances.get_mut(id).expect("id was reserved") = entity;
    }

    /// Removes a partially constructed instance after a failed
    /// instantiation.
    pub(crate) fn unregister_instance(&self, id: InstanceId) {
        self.inner.state.lock().instances.remove(id);
    }

    /// Returns the instance with the given id.
    pub(crate) fn instance(&self, id: InstanceId) -> Option<Arc<InstanceEntity>> {
        self.inner.state.lock().instances.get(id).cloned()
    }

    /// Returns the memory with the given runtime id if it is live.
    pub fn memory(&self, id: MemoryId) -> Option<Memory> {
        let entity = self.inner.state.lock().memories.get(id).cloned()?;
        Some(Memory { entity })
    }

    /// Returns the table with the given runtime id if it is live.
    pub fn table(&self, id: TableId) -> Option<Table> {
        let entity = self.inner.state.lock().tables.get(id).cloned()?;
        Some(Table { entity })
    }

    /// Returns the global with the given runtime id if it is live.
    pub fn global(&self, id: GlobalId) -> Option<Global> {
        let entity = self.inner.state.lock().globals.get(id).cloned()?;
        Some(Global { entity })
    }

    /// Re-publishes the element-storage base pointer of a table.
    ///
    /// Table growth reallocates the element storage; intrinsic call
    /// paths refresh the runtime-data pointer afterwards so generated
    /// code observes the new base.
    pub fn refresh_table_base(&self, table: &Table) {
        assert_eq!(table.compartment_id(), self.inner.id);
        let _state = self.inner.state.lock();
        self.inner.runtime_data.set_table_base(
            table.id().into_u32() as usize,
            table.entity.elements_base() as *mut u8,
        );
    }

    /// Returns `true` if the object with the given compartment id
    /// belongs to this compartment.
    pub fn owns(&self, compartment: CompartmentId) -> bool {
        self.inner.id == compartment
    }

    /// Writes a mutable-global slot in the template and in every live
    /// context. Used by the deferred `ref.func` backpatch.
    pub(crate) fn seed_mutable_global(&self, slot: u32, value: UntypedValue) {
        let mut state = self.inner.state.lock();
        let slot = slot as usize;
        if let Some(template) = state.global_template.get_mut(slot) {
            *template = value;
        }
        for (_, context) in state.contexts.iter() {
            unsafe {
                self.inner
                    .runtime_data
                    .context_globals(context.slot)
                    .add(slot)
                    .write(value);
            }
        }
    }

    /// Adds a root reference, protecting the compartment from teardown.
    pub fn add_root(&self) {
        self.inner.root_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Removes a root reference.
    pub fn remove_root(&self) {
        self.inner.root_count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Clones the compartment: every object is duplicated under its
    /// original id, passive segment bytes are shared, and the mutable
    /// global state of the template and of every context is deep-copied.
    ///
    /// # Errors
    ///
    /// If any reservation of the clone fails.
    pub fn clone_compartment(&self) -> Result<Compartment, CompartmentError> {
        let clone = Compartment::new()?;
        let state = self.inner.state.lock();
        {
            let mut clone_state = clone.inner.state.lock();
            clone_state.global_template = state.global_template.clone();

            // Memories: same ids, same declared types, copied contents.
            for (id, memory) in state.memories.iter() {
                let entity = Arc::new(MemoryEntity::new(
                    id,
                    clone.inner.id,
                    memory.ty(),
                    MemoryType::MAX_PAGES,
                    memory.debug_name.clone(),
                )?);
                let pages = memory.size();
                if pages > entity.size() {
                    entity
                        .grow(pages - entity.size())
                        .map_err(CompartmentError::Memory)?;
                }
                let mut buffer = vec![0u8; memory.size_in_bytes() as usize];
                memory
                    .read(0, &mut buffer)
                    .expect("the committed prefix is always readable");
                entity
                    .write(0, &buffer)
                    .expect("the clone was grown to the same size");
                clone
                    .inner
                    .runtime_data
                    .set_memory_base(id.into_u32() as usize, entity.base());
                clone_state.memories.insert_at(id, entity);
            }

            // Tables: same ids, element bits copied verbatim (instance
            // ids are preserved by the clone, keeping funcref bits valid).
            for (id, table) in state.tables.iter() {
                let entity = Arc::new(TableEntity::new(
                    id,
                    clone.inner.id,
                    table.ty(),
                    table.debug_name.clone(),
                ));
                let size = table.size();
                if size > entity.size() {
                    entity
                        .grow(size - entity.size(), crate::table::TableElement::Uninitialized)
                        .map_err(CompartmentError::Table)?;
                }
                for index in 0..u64::from(size) {
                    let element = table.get(index).expect("index is in bounds");
                    entity.set(index, element).expect("index is in bounds");
                }
                clone_state.tables.insert_at(id, entity);
            }

            for (id, global) in state.globals.iter() {
                let entity = Arc::new(GlobalEntity::new(
                    id,
                    clone.inner.id,
                    global.ty(),
                    global.slot,
                    global.initial(),
                    global.initialized.load(Ordering::Acquire),
                ));
                clone_state.globals.insert_at(id, entity);
            }

            for (id, tag) in state.tags.iter() {
                let entity = Arc::new(TagEntity::new(
                    id,
                    clone.inner.id,
                    tag.ty().clone(),
                    tag.debug_name.clone(),
                ));
                clone_state.tags.insert_at(id, entity);
            }

            // Contexts: same slots, block contents deep-copied.
            for (id, context) in state.contexts.iter() {
                clone.inner.runtime_data.commit_context(context.slot)?;
                let src = self.inner.runtime_data.context_ptr(context.slot);
                let dst = clone.inner.runtime_data.context_ptr(context.slot);
                unsafe {
                    core::ptr::copy_nonoverlapping(
                        src,
                        dst,
                        crate::runtime_data::CONTEXT_BYTES,
                    );
                }
                clone_state.contexts.insert_at(
                    id,
                    Arc::new(ContextEntity {
                        id,
                        compartment_id: clone.inner.id,
                        slot: context.slot,
                        root_count: AtomicUsize::new(0),
                    }),
                );
            }
        }

        // Instances last: they reference the cloned objects by id.
        let instance_ids: Vec<InstanceId> = state.instances.indices().collect();
        for id in instance_ids {
            let instance = state.instances.get(id).expect("listed above").clone();
            let cloned = InstanceEntity::clone_into(&instance, &clone, id);
            clone
                .inner
                .state
                .lock()
                .instances
                .insert_at(id, cloned);
        }

        Ok(clone)
    }
}
