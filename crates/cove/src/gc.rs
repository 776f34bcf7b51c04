//! Root-reference counting and compartment reclamation.
//!
//! Every compartment-owned object carries an atomic root counter that
//! holders outside the object graph (embedder code, host-call frames)
//! adjust through the `add_root`/`remove_root` handle methods. The
//! reclamation pass is a single-compartment mark-sweep: anything not
//! reachable from a rooted object is removed from the compartment's id
//! maps and freed once the last outstanding handle drops.

use crate::{
    compartment::Compartment,
    func::{unpack_func_bits, FunctionKind},
    ids::{ContextId, GlobalId, InstanceId, MemoryId, TableId, TagId},
    table::TableElement,
};
use core::sync::atomic::Ordering;
use cove_core::RefValue;
use std::collections::BTreeSet;

/// A typed reference into the compartment's object maps.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum ObjectRef {
    Memory(MemoryId),
    Table(TableId),
    Global(GlobalId),
    Tag(TagId),
    Instance(InstanceId),
    Context(ContextId),
}

/// Runs a reclamation pass over `compartment` and returns the number of
/// destroyed objects.
///
/// The pass holds the compartment mutex: no object can be created or
/// resolved concurrently. Objects whose root count is positive are never
/// destroyed, and a rooted function roots the instance owning its code.
pub fn collect_garbage(compartment: &Compartment) -> usize {
    let mut state = compartment.inner.state.lock();

    let mut pending: Vec<ObjectRef> = Vec::new();
    let mut unreferenced: BTreeSet<ObjectRef> = BTreeSet::new();

    let mut classify = |object: ObjectRef, rooted: bool| {
        if rooted {
            pending.push(object);
        } else {
            unreferenced.insert(object);
        }
    };

    for (id, memory) in state.memories.iter() {
        classify(
            ObjectRef::Memory(id),
            memory.root_count.load(Ordering::Acquire) > 0,
        );
    }
    for (id, table) in state.tables.iter() {
        classify(
            ObjectRef::Table(id),
            table.root_count.load(Ordering::Acquire) > 0,
        );
    }
    for (id, global) in state.globals.iter() {
        classify(
            ObjectRef::Global(id),
            global.root_count.load(Ordering::Acquire) > 0,
        );
    }
    for (id, tag) in state.tags.iter() {
        classify(
            ObjectRef::Tag(id),
            tag.root_count.load(Ordering::Acquire) > 0,
        );
    }
    for (id, context) in state.contexts.iter() {
        classify(
            ObjectRef::Context(id),
            context.root_count.load(Ordering::Acquire) > 0,
        );
    }
    for (id, instance) in state.instances.iter() {
        // A function-level root transfers to the owning instance.
        let rooted =
            instance.root_count.load(Ordering::Acquire) > 0 || instance.has_rooted_function();
        classify(ObjectRef::Instance(id), rooted);
    }

    // Mark: follow every edge out of the pending set.
    while let Some(object) = pending.pop() {
        let mut reach = |target: ObjectRef| {
            if unreferenced.remove(&target) {
                pending.push(target);
            }
        };
        let mut reach_ref = |value: RefValue, reach: &mut dyn FnMut(ObjectRef)| {
            if let RefValue::Func(bits) = value {
                let (instance, _) = unpack_func_bits(bits);
                reach(ObjectRef::Instance(instance));
            }
        };
        match object {
            ObjectRef::Memory(_) | ObjectRef::Tag(_) | ObjectRef::Context(_) => {}
            ObjectRef::Table(id) => {
                let table = state.tables.get(id).expect("listed object").clone();
                for index in 0..u64::from(table.size()) {
                    if let Ok(TableElement::Ref(value)) = table.get(index) {
                        reach_ref(value, &mut reach);
                    }
                }
            }
            ObjectRef::Global(id) => {
                let global = state.globals.get(id).expect("listed object").clone();
                if global.ty().content().is_ref() {
                    // The initial value, the template slot and every
                    // context's slot can each hold a distinct reference.
                    reach_ref(global.initial().to_ref(), &mut reach);
                    if let Some(slot) = global.slot {
                        if let Some(template) = state.global_template.get(slot as usize) {
                            reach_ref(template.to_ref(), &mut reach);
                        }
                        let slots: Vec<usize> = state
                            .contexts
                            .iter()
                            .map(|(_, context)| context.slot)
                            .collect();
                        for context_slot in slots {
                            let value = unsafe {
                                compartment
                                    .inner
                                    .runtime_data()
                                    .context_globals(context_slot)
                                    .add(slot as usize)
                                    .read()
                            };
                            reach_ref(value.to_ref(), &mut reach);
                        }
                    }
                }
            }
            ObjectRef::Instance(id) => {
                let instance = state.instances.get(id).expect("listed object").clone();
                for function in instance.imported_funcs() {
                    if let FunctionKind::Wasm { instance, .. } = &function.kind {
                        if let Some(imported) = instance.upgrade() {
                            reach(ObjectRef::Instance(imported.id));
                        }
                    }
                }
                for table in &instance.tables {
                    reach(ObjectRef::Table(table.id()));
                }
                for memory in &instance.memories {
                    reach(ObjectRef::Memory(memory.id()));
                }
                for global in &instance.globals {
                    reach(ObjectRef::Global(global.id()));
                }
                for tag in &instance.tags {
                    reach(ObjectRef::Tag(tag.id()));
                }
                for segment in 0..instance.passive_elems.len() {
                    if let Some(items) = instance.passive_elem(segment as u32) {
                        for item in items.iter() {
                            reach_ref(*item, &mut reach);
                        }
                    }
                }
            }
        }
    }

    // Sweep: everything still unreferenced is destroyed.
    let destroyed = unreferenced.len();
    for object in unreferenced {
        match object {
            ObjectRef::Memory(id) => {
                state.memories.remove(id);
            }
            ObjectRef::Table(id) => {
                state.tables.remove(id);
            }
            ObjectRef::Global(id) => {
                state.globals.remove(id);
            }
            ObjectRef::Tag(id) => {
                state.tags.remove(id);
            }
            ObjectRef::Instance(id) => {
                state.instances.remove(id);
            }
            ObjectRef::Context(id) => {
                state.contexts.remove(id);
            }
        }
    }
    if destroyed > 0 {
        log::debug!(
            "reclaimed {destroyed} objects from compartment {:?}",
            compartment.id()
        );
    }
    destroyed
}
