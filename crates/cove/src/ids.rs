use core::sync::atomic::{AtomicU32, Ordering};
use cove_collections::ArenaIndex;

macro_rules! define_id {
    ( $( $(#[$docs:meta])* $name:ident ),* $(,)? ) => {
        $(
            $(#[$docs])*
            #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
            pub struct $name(u32);

            impl $name {
                /// Creates the id from its raw index.
                pub(crate) fn from_u32(index: u32) -> Self {
                    Self(index)
                }

                /// Returns the raw index of the id.
                pub fn into_u32(self) -> u32 {
                    self.0
                }

                /// Returns the reserved invalid id.
                ///
                /// Used as a placeholder where no live object is known,
                /// e.g. in traps synthesized from bare trap codes.
                pub fn invalid() -> Self {
                    Self(u32::MAX)
                }
            }

            impl ArenaIndex for $name {
                fn into_usize(self) -> usize {
                    self.0 as usize
                }

                fn from_usize(value: usize) -> Self {
                    let value = u32::try_from(value)
                        .unwrap_or_else(|_| panic!("id out of bounds: {value}"));
                    Self(value)
                }
            }
        )*
    };
}

define_id! {
    /// The id of a compartment, unique within the process.
    CompartmentId,
    /// The id of a linear memory within its compartment.
    MemoryId,
    /// The id of a table within its compartment.
    TableId,
    /// The id of a global within its compartment.
    GlobalId,
    /// The id of an exception tag within its compartment.
    TagId,
    /// The id of a module instance within its compartment.
    InstanceId,
    /// The id of an execution context within its compartment.
    ContextId,
}

impl CompartmentId {
    /// Allocates the next process-unique [`CompartmentId`].
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        Self(NEXT.fetch_add(1, Ordering::AcqRel))
    }
}
