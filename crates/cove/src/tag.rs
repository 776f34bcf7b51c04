use crate::ids::{CompartmentId, TagId};
use core::sync::atomic::{AtomicUsize, Ordering};
use cove_core::TagType;
use std::sync::Arc;

/// The compartment-owned state of one exception tag.
#[derive(Debug)]
pub(crate) struct TagEntity {
    pub id: TagId,
    pub compartment: CompartmentId,
    ty: TagType,
    pub root_count: AtomicUsize,
    pub debug_name: String,
}

impl TagEntity {
    pub fn new(id: TagId, compartment: CompartmentId, ty: TagType, debug_name: String) -> Self {
        Self {
            id,
            compartment,
            ty,
            root_count: AtomicUsize::new(0),
            debug_name,
        }
    }

    pub fn ty(&self) -> &TagType {
        &self.ty
    }
}

/// An exception tag owned by a compartment.
///
/// Guest `throw`/`catch` match on tag identity; two tags with equal
/// parameter tuples remain distinct.
#[derive(Debug, Clone)]
pub struct Tag {
    pub(crate) entity: Arc<TagEntity>,
}

impl Tag {
    /// Returns the runtime id of the tag within its compartment.
    pub fn id(&self) -> TagId {
        self.entity.id
    }

    /// Returns the id of the owning compartment.
    pub fn compartment_id(&self) -> CompartmentId {
        self.entity.compartment
    }

    /// Returns the parameter tuple of the tag.
    pub fn ty(&self) -> &TagType {
        self.entity.ty()
    }

    /// Returns the debug name of the tag.
    pub fn debug_name(&self) -> &str {
        &self.entity.debug_name
    }

    /// Adds a root reference, protecting the tag from reclamation.
    pub fn add_root(&self) {
        self.entity.root_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Removes a root reference.
    pub fn remove_root(&self) {
        self.entity.root_count.fetch_sub(1, Ordering::AcqRel);
    }
}
