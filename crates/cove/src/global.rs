use crate::{
    context::Context,
    ids::{CompartmentId, GlobalId},
};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use cove_core::{GlobalType, UntypedValue, Value};
use spin::mutex::SpinMutex as Mutex;
use std::sync::Arc;

/// The compartment-owned state of one global variable.
///
/// Immutable globals store their value inline. Mutable globals are
/// indirected through the per-context slot arrays: the entity only knows
/// its slot id, and the compartment's template provides the value copied
/// into each new context. This gives per-context mutable globals without
/// any per-access locking.
#[derive(Debug)]
pub(crate) struct GlobalEntity {
    pub id: GlobalId,
    pub compartment: CompartmentId,
    ty: GlobalType,
    /// The mutable-global slot id; `None` for immutable globals.
    pub(crate) slot: Option<u32>,
    /// The initial (and, for immutable globals, the only) value.
    ///
    /// Behind a lock because `ref.func` initializers are patched in
    /// after code loading.
    initial: Mutex<UntypedValue>,
    /// Set once the initializer has been evaluated.
    pub(crate) initialized: AtomicBool,
    pub root_count: AtomicUsize,
}

impl GlobalEntity {
    pub fn new(
        id: GlobalId,
        compartment: CompartmentId,
        ty: GlobalType,
        slot: Option<u32>,
        initial: UntypedValue,
        initialized: bool,
    ) -> Self {
        Self {
            id,
            compartment,
            ty,
            slot,
            initial: Mutex::new(initial),
            initialized: AtomicBool::new(initialized),
            root_count: AtomicUsize::new(0),
        }
    }

    pub fn ty(&self) -> GlobalType {
        self.ty
    }

    /// Returns the initial value.
    pub fn initial(&self) -> UntypedValue {
        *self.initial.lock()
    }

    /// Patches the initial value of a deferred `ref.func` initializer.
    pub fn patch_initial(&self, value: UntypedValue) {
        *self.initial.lock() = value;
        self.initialized.store(true, Ordering::Release);
    }

    /// Returns the address of the inline value.
    ///
    /// Code loading publishes this for immutable globals so generated
    /// code reads the value directly.
    pub fn initial_ptr(&self) -> *const UntypedValue {
        self.initial.as_mut_ptr()
    }
}

/// A global variable owned by a compartment.
#[derive(Debug, Clone)]
pub struct Global {
    pub(crate) entity: Arc<GlobalEntity>,
}

impl Global {
    /// Returns the runtime id of the global within its compartment.
    pub fn id(&self) -> GlobalId {
        self.entity.id
    }

    /// Returns the id of the owning compartment.
    pub fn compartment_id(&self) -> CompartmentId {
        self.entity.compartment
    }

    /// Returns the type of the global.
    pub fn ty(&self) -> GlobalType {
        self.entity.ty()
    }

    /// Reads the global through the given context.
    ///
    /// Mutable globals read their per-context slot; immutable globals
    /// read the inline value.
    ///
    /// # Panics
    ///
    /// If `context` belongs to a different compartment.
    pub fn get(&self, context: &Context) -> Value {
        context.check_compartment(self.entity.compartment);
        let untyped = match self.entity.slot {
            Some(slot) => context.read_global_slot(slot),
            None => self.entity.initial(),
        };
        Value::from_untyped(untyped, self.entity.ty.content())
    }

    /// Writes the global through the given context.
    ///
    /// # Panics
    ///
    /// - If `context` belongs to a different compartment.
    /// - If the global is immutable or `value` has the wrong type; the
    ///   validator rules out both for guest code.
    pub fn set(&self, context: &Context, value: Value) {
        context.check_compartment(self.entity.compartment);
        assert!(
            self.entity.ty.mutability().is_mut(),
            "cannot write the immutable global {:?}",
            self.entity.id
        );
        assert!(
            value.ty().is_subtype_of(&self.entity.ty.content()),
            "global write with mismatching type"
        );
        let slot = self.entity.slot.expect("mutable globals always have a slot");
        context.write_global_slot(slot, value.to_untyped());
    }

    /// Adds a root reference, protecting the global from reclamation.
    pub fn add_root(&self) {
        self.entity.root_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Removes a root reference.
    pub fn remove_root(&self) {
        self.entity.root_count.fetch_sub(1, Ordering::AcqRel);
    }
}
