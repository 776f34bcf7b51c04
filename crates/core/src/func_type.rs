use crate::ValType;
use std::{sync::Arc, vec::Vec};
use core::fmt::{self, Display};

/// Errors that can occur when constructing a [`FuncType`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FuncTypeError {
    /// Too many function parameters.
    TooManyParams,
    /// Too many function results.
    TooManyResults,
}

impl core::error::Error for FuncTypeError {}

impl Display for FuncTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyParams => write!(f, "encountered a function with too many parameters"),
            Self::TooManyResults => write!(f, "encountered a function with too many results"),
        }
    }
}

/// A function type: an ordered tuple of parameter types and an ordered
/// tuple of result types.
///
/// Two function types are identical iff both tuples are equal elementwise.
/// Function types are interned per module; the runtime additionally encodes
/// each type to a stable [`key`](FuncType::key) compared by `call_indirect`.
///
/// # Note
///
/// Can be cloned cheaply.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncType {
    /// Parameter types followed by result types.
    params_results: Arc<[ValType]>,
    /// The number of parameter types in `params_results`.
    len_params: usize,
}

impl FuncType {
    /// The maximum number of parameters of a [`FuncType`].
    const MAX_LEN_PARAMS: usize = 1_000;

    /// The maximum number of results of a [`FuncType`].
    const MAX_LEN_RESULTS: usize = 1_000;

    /// Creates a new [`FuncType`] from the given parameter and result types.
    ///
    /// # Errors
    ///
    /// If more than 1000 parameters or results are given.
    pub fn new<P, R>(params: P, results: R) -> Result<Self, FuncTypeError>
    where
        P: IntoIterator<Item = ValType>,
        R: IntoIterator<Item = ValType>,
    {
        let mut params_results: Vec<ValType> = params.into_iter().collect();
        let len_params = params_results.len();
        params_results.extend(results);
        if len_params > Self::MAX_LEN_PARAMS {
            return Err(FuncTypeError::TooManyParams);
        }
        if params_results.len() - len_params > Self::MAX_LEN_RESULTS {
            return Err(FuncTypeError::TooManyResults);
        }
        Ok(Self {
            params_results: params_results.into(),
            len_params,
        })
    }

    /// Returns the parameter types of the [`FuncType`].
    pub fn params(&self) -> &[ValType] {
        &self.params_results[..self.len_params]
    }

    /// Returns the result types of the [`FuncType`].
    pub fn results(&self) -> &[ValType] {
        &self.params_results[self.len_params..]
    }

    /// Encodes the [`FuncType`] to a stable 64-bit key.
    ///
    /// Structurally equal types always map to the same key. `call_indirect`
    /// compares callee keys instead of full tuples so that the check is one
    /// integer comparison in generated code.
    pub fn key(&self) -> u64 {
        // FNV-1a over the canonical (arity-prefixed) encoding.
        const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut hash = OFFSET_BASIS;
        let mut mix = |byte: u8| {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(PRIME);
        };
        for byte in (self.len_params as u32).to_le_bytes() {
            mix(byte);
        }
        for ty in self.params_results.iter() {
            mix(*ty as u8);
        }
        hash
    }
}

impl Default for FuncType {
    fn default() -> Self {
        Self {
            params_results: Arc::from([]),
            len_params: 0,
        }
    }
}

impl Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (nth, param) in self.params().iter().enumerate() {
            if nth != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> (")?;
        for (nth, result) in self.results().iter().enumerate() {
            if nth != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{result}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_results_split() {
        let ty = FuncType::new([ValType::I32, ValType::F64], [ValType::I64]).unwrap();
        assert_eq!(ty.params(), &[ValType::I32, ValType::F64]);
        assert_eq!(ty.results(), &[ValType::I64]);
    }

    #[test]
    fn keys_distinguish_param_result_split() {
        // Same flattened tuple, different arity split.
        let a = FuncType::new([ValType::I32], [ValType::I32]).unwrap();
        let b = FuncType::new([ValType::I32, ValType::I32], []).unwrap();
        let c = FuncType::new([], [ValType::I32, ValType::I32]).unwrap();
        assert_ne!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        assert_ne!(b.key(), c.key());
        // Structural equality implies key equality.
        let a2 = FuncType::new([ValType::I32], [ValType::I32]).unwrap();
        assert_eq!(a, a2);
        assert_eq!(a.key(), a2.key());
    }
}
