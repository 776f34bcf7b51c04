/// The set of Wasm proposals accepted by decoding and validation.
///
/// The default enables everything except the shared-memory requirement on
/// atomic accesses, mirroring the runtime's shipped configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Features {
    /// Allow import and export of mutable globals.
    pub mutable_global: bool,
    /// Allow the saturating (non-trapping) float-to-int conversions.
    pub non_trapping_float_to_int: bool,
    /// Allow the extended sign-extension operators.
    pub sign_extension: bool,
    /// Allow the 128-bit SIMD operators.
    pub simd: bool,
    /// Allow the atomic operators including wait/notify.
    pub atomics: bool,
    /// Allow exception handling.
    pub exceptions: bool,
    /// Allow blocks with multiple results and block parameters.
    pub multi_value: bool,
    /// Allow the bulk memory and table operators and passive segments.
    pub bulk_memory: bool,
    /// Allow reference types.
    pub reference_types: bool,
    /// Allow the extended name subsections beyond function names.
    pub extended_name_section: bool,
    /// Accept quoted names in the textual format.
    ///
    /// Consumed only by textual front ends; carried here so that one
    /// feature record configures every layer identically.
    pub quoted_names: bool,
    /// Allow tables with the shared flag.
    pub shared_tables: bool,
    /// Require atomic accesses to target a shared memory.
    ///
    /// Off by default: atomic operators are accepted on unshared memories.
    pub require_shared_memory_for_atomics: bool,
    /// Accept legacy operator mnemonics in the textual format.
    pub legacy_operator_names: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            mutable_global: true,
            non_trapping_float_to_int: true,
            sign_extension: true,
            simd: true,
            atomics: true,
            exceptions: true,
            multi_value: true,
            bulk_memory: true,
            reference_types: true,
            extended_name_section: true,
            quoted_names: true,
            shared_tables: true,
            require_shared_memory_for_atomics: false,
            legacy_operator_names: true,
        }
    }
}

impl Features {
    /// Returns the [`Features`] with every proposal disabled.
    ///
    /// Useful as a baseline when testing feature gating.
    pub fn none() -> Self {
        Self {
            mutable_global: false,
            non_trapping_float_to_int: false,
            sign_extension: false,
            simd: false,
            atomics: false,
            exceptions: false,
            multi_value: false,
            bulk_memory: false,
            reference_types: false,
            extended_name_section: false,
            quoted_names: false,
            shared_tables: false,
            require_shared_memory_for_atomics: false,
            legacy_operator_names: false,
        }
    }
}
