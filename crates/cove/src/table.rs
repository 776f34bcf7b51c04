//! The table engine.
//!
//! Element slots hold a biased encoding so that freshly committed
//! zero-initialized storage reads back as the *uninitialized sentinel*:
//! an indirect call landing on such a slot traps as an uninitialized
//! element instead of dispatching. A null written by the guest is a
//! distinct encoding so that `undefined` and `null` trap differently.
//!
//! Growth and the bulk operators mirror the memory engine: the resizing
//! lock serializes structural changes while element reads and writes go
//! through atomics, and partially out-of-bounds bulk operations write the
//! in-range prefix before trapping.

use crate::{
    ids::{CompartmentId, TableId},
    trap::{Trap, TrapKind},
};
use core::fmt::{self, Debug, Display};
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use cove_core::{RefValue, TableType};
use spin::{Mutex, RwLock};
use std::sync::Arc;

/// Errors that can occur when creating or growing a [`Table`].
#[derive(Debug)]
pub enum TableError {
    /// Growth would exceed the declared maximum or the engine cap.
    OutOfBoundsGrowth,
    /// The compartment is out of table ids.
    TooManyTables,
}

impl Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBoundsGrowth => write!(f, "table cannot grow beyond its limits"),
            Self::TooManyTables => write!(f, "the compartment is out of table ids"),
        }
    }
}

impl core::error::Error for TableError {}

/// The biased element encoding.
///
/// - `0`: the uninitialized sentinel (fresh storage reads as this),
/// - `1`: an explicit null reference,
/// - tag `0b10`: a function reference; bits 2.. hold the packed id,
/// - tag `0b11`: an extern reference; bits 2.. hold the packed id.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum TableElement {
    /// Never written since the slot was created.
    Uninitialized,
    /// An explicit null.
    Null,
    /// A reference value.
    Ref(RefValue),
}

const ELEM_UNINIT: u64 = 0;
const ELEM_NULL: u64 = 1;
const ELEM_TAG_FUNC: u64 = 0b10;
const ELEM_TAG_EXTERN: u64 = 0b11;

impl TableElement {
    pub(crate) fn to_bits(self) -> u64 {
        match self {
            Self::Uninitialized => ELEM_UNINIT,
            Self::Null | Self::Ref(RefValue::Null) => ELEM_NULL,
            Self::Ref(RefValue::Func(id)) => (id << 2) | ELEM_TAG_FUNC,
            Self::Ref(RefValue::Extern(id)) => (id << 2) | ELEM_TAG_EXTERN,
        }
    }

    pub(crate) fn from_bits(bits: u64) -> Self {
        match bits {
            ELEM_UNINIT => Self::Uninitialized,
            ELEM_NULL => Self::Null,
            _ => match bits & 0b11 {
                ELEM_TAG_FUNC => Self::Ref(RefValue::Func(bits >> 2)),
                ELEM_TAG_EXTERN => Self::Ref(RefValue::Extern(bits >> 2)),
                _ => Self::Uninitialized,
            },
        }
    }
}

/// The compartment-owned state of one table.
pub(crate) struct TableEntity {
    pub id: TableId,
    pub compartment: CompartmentId,
    ty: TableType,
    max_elements: u32,
    pub root_count: AtomicUsize,
    pub debug_name: String,
    /// Held across growth and clone; element access takes the read half.
    resizing: Mutex<()>,
    elements: RwLock<Vec<AtomicU64>>,
}

impl Debug for TableEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableEntity")
            .field("id", &self.id)
            .field("size", &self.size())
            .finish()
    }
}

impl TableEntity {
    pub fn new(
        id: TableId,
        compartment: CompartmentId,
        ty: TableType,
        debug_name: String,
    ) -> Self {
        let max_elements = TableType::max(&ty).unwrap_or(u32::MAX);
        let elements = (0..TableType::min(&ty))
            .map(|_| AtomicU64::new(ELEM_UNINIT))
            .collect();
        Self {
            id,
            compartment,
            ty,
            max_elements,
            root_count: AtomicUsize::new(0),
            debug_name,
            resizing: Mutex::new(()),
            elements: RwLock::new(elements),
        }
    }

    pub fn ty(&self) -> TableType {
        self.ty
    }

    /// Returns the current number of elements.
    pub fn size(&self) -> u32 {
        self.elements.read().len() as u32
    }

    /// Returns the current base address of the element storage.
    ///
    /// Invalidated by growth; the compartment re-publishes it into the
    /// runtime-data region afterwards.
    pub fn elements_base(&self) -> *const AtomicU64 {
        self.elements.read().as_ptr()
    }

    fn oob(&self, index: u64) -> Trap {
        Trap::new(TrapKind::OutOfBoundsTableAccess {
            table: self.id,
            index,
        })
    }

    /// Reads the element at `index`.
    pub fn get(&self, index: u64) -> Result<TableElement, Trap> {
        let elements = self.elements.read();
        let slot = elements
            .get(index as usize)
            .ok_or_else(|| self.oob(index))?;
        Ok(TableElement::from_bits(slot.load(Ordering::Acquire)))
    }

    /// Writes the element at `index`.
    pub fn set(&self, index: u64, element: TableElement) -> Result<(), Trap> {
        let elements = self.elements.read();
        let slot = elements
            .get(index as usize)
            .ok_or_else(|| self.oob(index))?;
        slot.store(element.to_bits(), Ordering::Release);
        Ok(())
    }

    /// Grows the table by `delta` elements initialized to `init`,
    /// returning the previous size.
    ///
    /// # Errors
    ///
    /// If growth would exceed the declared maximum; guests observe the
    /// failure as `-1`.
    pub fn grow(&self, delta: u32, init: TableElement) -> Result<u32, TableError> {
        let _resizing = self.resizing.lock();
        let mut elements = self.elements.write();
        let current = elements.len() as u32;
        if delta == 0 {
            return Ok(current);
        }
        let desired = current
            .checked_add(delta)
            .filter(|desired| *desired <= self.max_elements)
            .ok_or(TableError::OutOfBoundsGrowth)?;
        let bits = init.to_bits();
        elements.extend((current..desired).map(|_| AtomicU64::new(bits)));
        Ok(current)
    }

    /// `table.fill`: writes `len` copies of `value` starting at `dst`.
    ///
    /// The in-range prefix is written before any trap is raised.
    pub fn fill(&self, dst: u64, value: TableElement, len: u64) -> Result<(), Trap> {
        let elements = self.elements.read();
        let size = elements.len() as u64;
        let prefix = size.saturating_sub(dst).min(len);
        let bits = value.to_bits();
        for slot in 0..prefix {
            elements[(dst + slot) as usize].store(bits, Ordering::Release);
        }
        if prefix != len {
            return Err(self.oob(dst.saturating_add(len)));
        }
        Ok(())
    }

    /// `table.init`: copies `len` items of `items[src..]` to `dst`.
    ///
    /// The in-range prefix is written before any trap is raised.
    pub fn init_from(
        &self,
        items: &[RefValue],
        dst: u64,
        src: u64,
        len: u64,
        segment_oob: impl FnOnce(u64) -> Trap,
    ) -> Result<(), Trap> {
        let elements = self.elements.read();
        let size = elements.len() as u64;
        let src_avail = (items.len() as u64).saturating_sub(src);
        let prefix = size.saturating_sub(dst).min(len).min(src_avail);
        for offset in 0..prefix {
            let bits = TableElement::Ref(items[(src + offset) as usize]).to_bits();
            elements[(dst + offset) as usize].store(bits, Ordering::Release);
        }
        if src_avail < len {
            return Err(segment_oob(src.saturating_add(len)));
        }
        if prefix != len {
            return Err(self.oob(dst.saturating_add(len)));
        }
        Ok(())
    }
}

/// `table.copy`: copies `len` elements from `src_table[src]` to
/// `dst_table[dst]`, allowing overlap within one table.
///
/// The in-range prefix is copied before any trap is raised.
pub(crate) fn copy_between(
    dst_table: &TableEntity,
    src_table: &TableEntity,
    dst: u64,
    src: u64,
    len: u64,
) -> Result<(), Trap> {
    let same = core::ptr::eq(dst_table, src_table);
    let src_avail = u64::from(src_table.size()).saturating_sub(src);
    let dst_avail = u64::from(dst_table.size()).saturating_sub(dst);
    let prefix = len.min(src_avail).min(dst_avail);
    if same && dst > src {
        // Copy backwards so overlapping ranges stay intact.
        let elements = dst_table.elements.read();
        for offset in (0..prefix).rev() {
            let bits = elements[(src + offset) as usize].load(Ordering::Acquire);
            elements[(dst + offset) as usize].store(bits, Ordering::Release);
        }
    } else if same {
        let elements = dst_table.elements.read();
        for offset in 0..prefix {
            let bits = elements[(src + offset) as usize].load(Ordering::Acquire);
            elements[(dst + offset) as usize].store(bits, Ordering::Release);
        }
    } else {
        let src_elements = src_table.elements.read();
        let dst_elements = dst_table.elements.read();
        for offset in 0..prefix {
            let bits = src_elements[(src + offset) as usize].load(Ordering::Acquire);
            dst_elements[(dst + offset) as usize].store(bits, Ordering::Release);
        }
    }
    if src_avail < len {
        return Err(src_table.oob(src.saturating_add(len)));
    }
    if dst_avail < len {
        return Err(dst_table.oob(dst.saturating_add(len)));
    }
    Ok(())
}

/// A table owned by a compartment.
#[derive(Debug, Clone)]
pub struct Table {
    pub(crate) entity: Arc<TableEntity>,
}

impl Table {
    /// Returns the runtime id of the table within its compartment.
    pub fn id(&self) -> TableId {
        self.entity.id
    }

    /// Returns the id of the owning compartment.
    pub fn compartment_id(&self) -> CompartmentId {
        self.entity.compartment
    }

    /// Returns the declared type of the table.
    pub fn ty(&self) -> TableType {
        self.entity.ty()
    }

    /// Returns the type with the current size as its minimum.
    pub fn dynamic_ty(&self) -> TableType {
        let ty = self.entity.ty();
        TableType::new(
            ty.element(),
            self.entity.size(),
            TableType::max(&ty),
            ty.is_shared(),
        )
            .expect("the current size is always within the declared limits")
    }

    /// Returns the current number of elements.
    pub fn size(&self) -> u32 {
        self.entity.size()
    }

    /// Reads the reference at `index`.
    ///
    /// Uninitialized slots read as null through this accessor; only
    /// indirect calls distinguish the sentinel.
    ///
    /// # Errors
    ///
    /// Traps if `index` is out of bounds.
    pub fn get(&self, index: u64) -> Result<RefValue, Trap> {
        Ok(match self.entity.get(index)? {
            TableElement::Uninitialized | TableElement::Null => RefValue::Null,
            TableElement::Ref(value) => value,
        })
    }

    /// Writes the reference at `index`.
    ///
    /// # Errors
    ///
    /// Traps if `index` is out of bounds.
    pub fn set(&self, index: u64, value: RefValue) -> Result<(), Trap> {
        self.entity.set(index, TableElement::Ref(value))
    }

    /// Grows the table by `delta` elements initialized to `init`,
    /// returning the previous size.
    ///
    /// # Errors
    ///
    /// See [`TableEntity::grow`].
    pub fn grow(&self, delta: u32, init: RefValue) -> Result<u32, TableError> {
        self.entity.grow(delta, TableElement::Ref(init))
    }

    /// `table.fill` with partial-progress semantics.
    ///
    /// # Errors
    ///
    /// Traps after writing the in-range prefix on out-of-bounds ranges.
    pub fn fill(&self, dst: u64, value: RefValue, len: u64) -> Result<(), Trap> {
        self.entity.fill(dst, TableElement::Ref(value), len)
    }

    /// `table.copy` with partial-progress semantics; `self` is the
    /// destination.
    ///
    /// # Errors
    ///
    /// Traps after copying the in-range prefix on out-of-bounds ranges.
    pub fn copy(&self, src: &Table, dst: u64, src_offset: u64, len: u64) -> Result<(), Trap> {
        copy_between(&self.entity, &src.entity, dst, src_offset, len)
    }

    /// Adds a root reference, protecting the table from reclamation.
    pub fn add_root(&self) {
        self.entity.root_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Removes a root reference.
    pub fn remove_root(&self) {
        self.entity.root_count.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(min: u32, max: Option<u32>) -> TableEntity {
        let ty = TableType::new(cove_core::ValType::FuncRef, min, max, false).unwrap();
        TableEntity::new(TableId::from_u32(0), CompartmentId::from_u32(0), ty, String::new())
    }

    #[test]
    fn fresh_slots_read_as_the_sentinel() {
        let table = table(2, None);
        assert_eq!(table.get(0).unwrap(), TableElement::Uninitialized);
        table.set(0, TableElement::Ref(RefValue::Func(7))).unwrap();
        assert_eq!(table.get(0).unwrap(), TableElement::Ref(RefValue::Func(7)));
        // An explicit null is distinct from the sentinel.
        table.set(1, TableElement::Ref(RefValue::Null)).unwrap();
        assert_eq!(table.get(1).unwrap(), TableElement::Null);
    }

    #[test]
    fn grow_respects_the_maximum() {
        let table = table(1, Some(3));
        assert_eq!(table.grow(2, TableElement::Null).unwrap(), 1);
        assert!(matches!(
            table.grow(1, TableElement::Null),
            Err(TableError::OutOfBoundsGrowth)
        ));
        assert_eq!(table.size(), 3);
        assert_eq!(table.grow(0, TableElement::Null).unwrap(), 3);
    }

    #[test]
    fn fill_writes_the_prefix_before_trapping() {
        let table = table(4, None);
        let error = table
            .fill(2, TableElement::Ref(RefValue::Func(1)), 4)
            .unwrap_err();
        assert!(matches!(
            error.kind(),
            TrapKind::OutOfBoundsTableAccess { index: 6, .. }
        ));
        assert_eq!(table.get(2).unwrap(), TableElement::Ref(RefValue::Func(1)));
        assert_eq!(table.get(3).unwrap(), TableElement::Ref(RefValue::Func(1)));
    }

    #[test]
    fn overlapping_copy_is_correct() {
        let table = table(4, None);
        for index in 0..3 {
            table
                .set(index, TableElement::Ref(RefValue::Func(index)))
                .unwrap();
        }
        copy_between(&table, &table, 1, 0, 3).unwrap();
        assert_eq!(table.get(1).unwrap(), TableElement::Ref(RefValue::Func(0)));
        assert_eq!(table.get(2).unwrap(), TableElement::Ref(RefValue::Func(1)));
        assert_eq!(table.get(3).unwrap(), TableElement::Ref(RefValue::Func(2)));
    }
}
