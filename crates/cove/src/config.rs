use cove_ir::Features;

/// Configuration of an [`Engine`](crate::Engine).
///
/// Carries the accepted Wasm proposals and the implementation limits
/// enforced by validation and by the runtime engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The accepted Wasm proposals.
    features: Features,
    /// The maximum number of locals of a single function.
    max_locals: u32,
    /// The maximum number of pages any memory may grow to.
    max_memory_pages: u32,
    /// The cap on collected function-validation failures per module.
    max_validation_errors: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            features: Features::default(),
            max_locals: 65_536,
            max_memory_pages: 65_536,
            max_validation_errors: 8,
        }
    }
}

macro_rules! feature_setters {
    ( $( $(#[$docs:meta])* $fn_name:ident => $field:ident ),* $(,)? ) => {
        impl Config {
            $(
                $(#[$docs])*
                pub fn $fn_name(&mut self, enable: bool) -> &mut Self {
                    self.features.$field = enable;
                    self
                }
            )*
        }
    };
}

feature_setters! {
    /// Enables or disables import and export of mutable globals.
    ///
    /// Enabled by default.
    wasm_mutable_global => mutable_global,
    /// Enables or disables the saturating float-to-int conversions.
    ///
    /// Enabled by default.
    wasm_saturating_float_to_int => non_trapping_float_to_int,
    /// Enables or disables the extended sign-extension operators.
    ///
    /// Enabled by default.
    wasm_sign_extension => sign_extension,
    /// Enables or disables the 128-bit SIMD proposal.
    ///
    /// Enabled by default.
    wasm_simd => simd,
    /// Enables or disables atomics including wait/notify.
    ///
    /// Enabled by default.
    wasm_atomics => atomics,
    /// Enables or disables exception handling.
    ///
    /// Enabled by default.
    wasm_exceptions => exceptions,
    /// Enables or disables blocks with multiple results and parameters.
    ///
    /// Enabled by default.
    wasm_multi_value => multi_value,
    /// Enables or disables the bulk memory and table operators.
    ///
    /// Enabled by default.
    wasm_bulk_memory => bulk_memory,
    /// Enables or disables reference types.
    ///
    /// Enabled by default.
    wasm_reference_types => reference_types,
    /// Enables or disables the extended name subsections.
    ///
    /// Enabled by default.
    wasm_extended_name_section => extended_name_section,
    /// Enables or disables tables with the shared flag.
    ///
    /// Enabled by default.
    wasm_shared_tables => shared_tables,
    /// Requires atomic accesses to target a shared memory.
    ///
    /// Disabled by default: atomic operators are accepted on unshared
    /// memories.
    wasm_require_shared_atomics => require_shared_memory_for_atomics,
}

impl Config {
    /// Returns the accepted Wasm proposals.
    pub fn features(&self) -> &Features {
        &self.features
    }

    /// Sets the maximum number of locals of a single function.
    pub fn set_max_locals(&mut self, max: u32) -> &mut Self {
        self.max_locals = max;
        self
    }

    /// Returns the maximum number of locals of a single function.
    pub fn max_locals(&self) -> u32 {
        self.max_locals
    }

    /// Sets the cap on the number of pages any memory may grow to.
    pub fn set_max_memory_pages(&mut self, max: u32) -> &mut Self {
        self.max_memory_pages = max.min(cove_core::MemoryType::MAX_PAGES);
        self
    }

    /// Returns the cap on the number of pages any memory may grow to.
    pub fn max_memory_pages(&self) -> u32 {
        self.max_memory_pages
    }

    /// Returns the cap on collected function-validation failures.
    pub fn max_validation_errors(&self) -> usize {
        self.max_validation_errors
    }
}
