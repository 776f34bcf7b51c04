use crate::{
    compartment::CompartmentInner,
    ids::{CompartmentId, ContextId},
    runtime_data::MAX_MUTABLE_GLOBALS,
};
use core::sync::atomic::{AtomicUsize, Ordering};
use cove_core::UntypedValue;
use std::sync::Arc;

/// The compartment-owned state of one execution context.
#[derive(Debug)]
pub(crate) struct ContextEntity {
    pub id: ContextId,
    pub compartment_id: CompartmentId,
    /// The context's block index inside the runtime-data region.
    pub slot: usize,
    pub root_count: AtomicUsize,
}

/// A single thread's execution handle into a compartment.
///
/// A context owns a page-sized block of the compartment's runtime-data
/// region holding its thunk scratch space and its mutable-global slot
/// array; generated code receives the block's address as its context
/// pointer and recovers the compartment from it with a single mask.
///
/// Each host thread should drive at most one context at a time; contexts
/// themselves are cheap and a compartment can hold many.
#[derive(Debug, Clone)]
pub struct Context {
    pub(crate) entity: Arc<ContextEntity>,
    /// Keeps the runtime-data region (owned by the compartment) alive.
    pub(crate) compartment: Arc<CompartmentInner>,
}

impl Context {
    /// Returns the runtime id of the context within its compartment.
    pub fn id(&self) -> ContextId {
        self.entity.id
    }

    /// Returns the id of the owning compartment.
    pub fn compartment_id(&self) -> CompartmentId {
        self.entity.compartment_id
    }

    /// Returns the context's runtime-data pointer handed to generated
    /// code.
    pub(crate) fn runtime_data_ptr(&self) -> *mut u8 {
        self.compartment.runtime_data().context_ptr(self.entity.slot)
    }

    /// Returns the thunk scratch buffer of this context.
    pub(crate) fn scratch_ptr(&self) -> *mut UntypedValue {
        self.compartment.runtime_data().context_scratch(self.entity.slot)
    }

    /// Reads the mutable-global slot with the given id.
    pub(crate) fn read_global_slot(&self, slot: u32) -> UntypedValue {
        assert!((slot as usize) < MAX_MUTABLE_GLOBALS);
        unsafe {
            self.compartment
                .runtime_data()
                .context_globals(self.entity.slot)
                .add(slot as usize)
                .read()
        }
    }

    /// Writes the mutable-global slot with the given id.
    pub(crate) fn write_global_slot(&self, slot: u32, value: UntypedValue) {
        assert!((slot as usize) < MAX_MUTABLE_GLOBALS);
        unsafe {
            self.compartment
                .runtime_data()
                .context_globals(self.entity.slot)
                .add(slot as usize)
                .write(value);
        }
    }

    /// Panics unless the context belongs to the given compartment.
    ///
    /// Cross-compartment calls are forbidden by invariant; every
    /// externally supplied object is checked at the boundary.
    pub(crate) fn check_compartment(&self, compartment: CompartmentId) {
        assert_eq!(
            self.entity.compartment_id, compartment,
            "object and context belong to different compartments"
        );
    }

    /// Adds a root reference, protecting the context from reclamation.
    pub fn add_root(&self) {
        self.entity.root_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Removes a root reference.
    pub fn remove_root(&self) {
        self.entity.root_count.fetch_sub(1, Ordering::AcqRel);
    }
}
