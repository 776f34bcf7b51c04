use crate::{
    context::Context,
    ids::{CompartmentId, InstanceId},
    instance::InstanceEntity,
    trap::Trap,
};
use core::fmt::{self, Debug};
use core::sync::atomic::Ordering;
use cove_core::{FuncType, RefValue, UntypedValue};
use std::sync::{Arc, Weak};

/// The callback type of a host function.
///
/// Receives the caller's context, the arguments and a result buffer
/// sized to the function type's result tuple.
pub type HostFuncCallback =
    dyn Fn(&Context, &[UntypedValue], &mut [UntypedValue]) -> Result<(), Trap> + Send + Sync;

/// A host-defined function exposed to guests as an intrinsic.
pub struct HostFunc {
    ty: FuncType,
    debug_name: String,
    callback: Box<HostFuncCallback>,
}

impl Debug for HostFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunc")
            .field("name", &self.debug_name)
            .field("ty", &self.ty)
            .finish()
    }
}

impl HostFunc {
    /// Creates a new host function with the given type and callback.
    pub fn new(
        debug_name: impl Into<String>,
        ty: FuncType,
        callback: impl Fn(&Context, &[UntypedValue], &mut [UntypedValue]) -> Result<(), Trap>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            ty,
            debug_name: debug_name.into(),
            callback: Box::new(callback),
        }
    }

    /// Returns the type of the host function.
    pub fn ty(&self) -> &FuncType {
        &self.ty
    }

    /// Returns the debug name of the host function.
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub(crate) fn call(
        &self,
        context: &Context,
        args: &[UntypedValue],
        results: &mut [UntypedValue],
    ) -> Result<(), Trap> {
        (self.callback)(context, args, results)
    }

    /// Returns the stable address identifying this host function.
    ///
    /// Code loading binds intrinsic call sites to this value; the
    /// intrinsic thunk recovers the [`HostFunc`] from it.
    pub(crate) fn thunk_addr(this: &Arc<Self>) -> u64 {
        Arc::as_ptr(this) as usize as u64
    }
}

/// The inner representation of a [`Function`].
#[derive(Clone)]
pub(crate) enum FunctionKind {
    /// A guest function owned by a module instance.
    ///
    /// Holds its instance weakly: the instance's function list would
    /// otherwise form a reference cycle with its own functions. A
    /// function whose instance has been reclaimed is dead.
    Wasm {
        instance: Weak<InstanceEntity>,
        /// The function index within the instance (imports included).
        index: u32,
    },
    /// A host function.
    Host(Arc<HostFunc>),
}

/// A Wasm or host function.
///
/// Unlike the other runtime objects a function has no id of its own: a
/// guest function is addressed by its instance and index, and its root
/// count lives on the instance so that rooting a function transitively
/// roots the instance that owns its code.
#[derive(Clone)]
pub struct Function {
    pub(crate) kind: FunctionKind,
}

impl Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FunctionKind::Wasm { index, .. } => f
                .debug_struct("Function")
                .field("kind", &"wasm")
                .field("index", index)
                .finish(),
            FunctionKind::Host(host) => f
                .debug_struct("Function")
                .field("kind", &"host")
                .field("name", &host.debug_name())
                .finish(),
        }
    }
}

impl Function {
    /// Creates a host [`Function`] from the given [`HostFunc`].
    pub fn host(host: Arc<HostFunc>) -> Self {
        Self {
            kind: FunctionKind::Host(host),
        }
    }

    pub(crate) fn wasm(instance: &Arc<InstanceEntity>, index: u32) -> Self {
        Self {
            kind: FunctionKind::Wasm {
                instance: Arc::downgrade(instance),
                index,
            },
        }
    }

    /// Returns the type of the function.
    ///
    /// # Panics
    ///
    /// If the function's instance has been reclaimed.
    pub fn ty(&self) -> FuncType {
        match &self.kind {
            FunctionKind::Host(host) => host.ty().clone(),
            FunctionKind::Wasm { instance, index } => {
                let instance = instance.upgrade().expect("function instance was reclaimed");
                instance
                    .module()
                    .func_type(*index)
                    .expect("function index is valid by construction")
                    .clone()
            }
        }
    }

    /// Returns the id of the owning compartment for guest functions.
    ///
    /// Host functions belong to no compartment and return `None`.
    pub fn compartment_id(&self) -> Option<CompartmentId> {
        match &self.kind {
            FunctionKind::Host(_) => None,
            FunctionKind::Wasm { instance, .. } => instance
                .upgrade()
                .map(|instance| instance.compartment),
        }
    }

    /// Returns the debug name of the function.
    pub fn debug_name(&self) -> String {
        match &self.kind {
            FunctionKind::Host(host) => host.debug_name().to_string(),
            FunctionKind::Wasm { instance, index } => match instance.upgrade() {
                Some(instance) => instance.func_debug_name(*index),
                None => format!("<reclaimed function {index}>"),
            },
        }
    }

    /// Encodes the function as a reference value.
    ///
    /// Host functions are not representable in tables and encode as
    /// null.
    pub(crate) fn to_ref(&self) -> RefValue {
        match &self.kind {
            FunctionKind::Host(_) => RefValue::Null,
            FunctionKind::Wasm { instance, index } => match instance.upgrade() {
                Some(instance) => RefValue::Func(pack_func_bits(instance.id, *index)),
                None => RefValue::Null,
            },
        }
    }

    /// Adds a root reference.
    ///
    /// The count lives on the owning instance's per-function data, so a
    /// rooted function also keeps its instance (and thereby its code)
    /// alive across reclamation.
    pub fn add_root(&self) {
        if let FunctionKind::Wasm { instance, index } = &self.kind {
            if let Some(instance) = instance.upgrade() {
                instance.func_root_count(*index).fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    /// Removes a root reference.
    pub fn remove_root(&self) {
        if let FunctionKind::Wasm { instance, index } = &self.kind {
            if let Some(instance) = instance.upgrade() {
                instance.func_root_count(*index).fetch_sub(1, Ordering::AcqRel);
            }
        }
    }
}

/// Packs an instance id and function index into funcref bits.
///
/// The packing leaves the low 2 bits clear for the table-element tag, so
/// a compartment supports at most 2^30 instances.
pub(crate) fn pack_func_bits(instance: InstanceId, index: u32) -> u64 {
    (u64::from(instance.into_u32()) << 32) | u64::from(index)
}

/// The inverse of [`pack_func_bits`].
pub(crate) fn unpack_func_bits(bits: u64) -> (InstanceId, u32) {
    (InstanceId::from_u32((bits >> 32) as u32), bits as u32)
}
