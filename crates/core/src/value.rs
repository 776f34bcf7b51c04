use crate::{UntypedValue, V128};
use core::fmt::{self, Display};

/// The type of a Wasm value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValType {
    /// 32-bit signed or unsigned integer.
    I32,
    /// 64-bit signed or unsigned integer.
    I64,
    /// 32-bit IEEE 754-2008 floating point number.
    F32,
    /// 64-bit IEEE 754-2008 floating point number.
    F64,
    /// A 128-bit vector of packed integer or floating point lanes.
    V128,
    /// An opaque reference to any runtime object.
    AnyRef,
    /// A reference to a Wasm or host function.
    FuncRef,
    /// The bottom reference type.
    ///
    /// # Note
    ///
    /// `NullRef` exists only inside the validator's type lattice and as the
    /// type of `ref.null`; it is rejected in every declared position
    /// (locals, globals, parameters, results, table elements).
    NullRef,
}

impl ValType {
    /// Returns `true` if [`ValType`] is a Wasm numeric type.
    pub fn is_num(&self) -> bool {
        matches!(self, Self::I32 | Self::I64 | Self::F32 | Self::F64)
    }

    /// Returns `true` if [`ValType`] is a Wasm reference type.
    pub fn is_ref(&self) -> bool {
        matches!(self, Self::AnyRef | Self::FuncRef | Self::NullRef)
    }

    /// Returns `true` if values of this type may appear in declared positions.
    ///
    /// This is `true` for every type except [`ValType::NullRef`].
    pub fn is_declarable(&self) -> bool {
        !matches!(self, Self::NullRef)
    }

    /// Returns `true` if `self` is a subtype of `other`.
    ///
    /// Every value type is a subtype of itself and `nullref` is a subtype
    /// of both `anyref` and `funcref`.
    pub fn is_subtype_of(&self, other: &Self) -> bool {
        match (self, other) {
            _ if self == other => true,
            (Self::NullRef, Self::AnyRef | Self::FuncRef) => true,
            _ => false,
        }
    }

    /// Returns the join (least upper bound) of `self` and `other` if any.
    pub fn join(&self, other: &Self) -> Option<Self> {
        if self.is_subtype_of(other) {
            return Some(*other);
        }
        if other.is_subtype_of(self) {
            return Some(*self);
        }
        None
    }
}

impl Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::V128 => "v128",
            Self::AnyRef => "anyref",
            Self::FuncRef => "funcref",
            Self::NullRef => "nullref",
        };
        write!(f, "{name}")
    }
}

/// An opaque reference value.
///
/// The payload is a runtime-defined object id; `Null` is the value of
/// `ref.null` and of freshly initialized table elements and reference
/// globals.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RefValue {
    /// The null reference.
    #[default]
    Null,
    /// A reference to a function, encoded as a runtime function id.
    Func(u64),
    /// A reference to an arbitrary runtime object, encoded as an object id.
    Extern(u64),
}

impl RefValue {
    /// Returns `true` if the reference is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// A typed Wasm value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A value of type `i32`.
    I32(i32),
    /// A value of type `i64`.
    I64(i64),
    /// A value of type `f32`, stored as its bit pattern.
    ///
    /// Storing bits keeps NaN payloads intact across the host boundary.
    F32(u32),
    /// A value of type `f64`, stored as its bit pattern.
    F64(u64),
    /// A 128-bit vector value.
    V128(V128),
    /// A reference of type `funcref`.
    FuncRef(RefValue),
    /// A reference of type `anyref`.
    AnyRef(RefValue),
}

impl Value {
    /// Returns the zero or null [`Value`] of the given type.
    ///
    /// # Panics
    ///
    /// If `ty` is not declarable (see [`ValType::is_declarable`]).
    pub fn default_for(ty: ValType) -> Self {
        match ty {
            ValType::I32 => Self::I32(0),
            ValType::I64 => Self::I64(0),
            ValType::F32 => Self::F32(0),
            ValType::F64 => Self::F64(0),
            ValType::V128 => Self::V128(V128::ZERO),
            ValType::FuncRef => Self::FuncRef(RefValue::Null),
            ValType::AnyRef => Self::AnyRef(RefValue::Null),
            ValType::NullRef => panic!("nullref has no default value"),
        }
    }

    /// Returns the [`ValType`] of the [`Value`].
    pub fn ty(&self) -> ValType {
        match self {
            Self::I32(_) => ValType::I32,
            Self::I64(_) => ValType::I64,
            Self::F32(_) => ValType::F32,
            Self::F64(_) => ValType::F64,
            Self::V128(_) => ValType::V128,
            Self::FuncRef(_) => ValType::FuncRef,
            Self::AnyRef(_) => ValType::AnyRef,
        }
    }

    /// Returns the value as an `i32` if it is one.
    pub fn i32(&self) -> Option<i32> {
        match self {
            Self::I32(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the value as an `i64` if it is one.
    pub fn i64(&self) -> Option<i64> {
        match self {
            Self::I64(value) => Some(*value),
            _ => None,
        }
    }

    /// Reinterprets the [`Value`] as its untyped bit pattern.
    pub fn to_untyped(&self) -> UntypedValue {
        match self {
            Self::I32(value) => UntypedValue::from(*value),
            Self::I64(value) => UntypedValue::from(*value),
            Self::F32(bits) => UntypedValue::from_bits64(u64::from(*bits)),
            Self::F64(bits) => UntypedValue::from_bits64(*bits),
            Self::V128(value) => UntypedValue::from_bits128(value.to_bits()),
            Self::FuncRef(value) | Self::AnyRef(value) => UntypedValue::from_ref(*value),
        }
    }

    /// Recovers a typed [`Value`] from an untyped bit pattern.
    ///
    /// # Panics
    ///
    /// If `ty` is not declarable.
    pub fn from_untyped(untyped: UntypedValue, ty: ValType) -> Self {
        match ty {
            ValType::I32 => Self::I32(untyped.to_bits64() as i32),
            ValType::I64 => Self::I64(untyped.to_bits64() as i64),
            ValType::F32 => Self::F32(untyped.to_bits64() as u32),
            ValType::F64 => Self::F64(untyped.to_bits64()),
            ValType::V128 => Self::V128(V128::from_bits(untyped.to_bits128())),
            ValType::FuncRef => Self::FuncRef(untyped.to_ref()),
            ValType::AnyRef => Self::AnyRef(untyped.to_ref()),
            ValType::NullRef => panic!("nullref values cannot be materialized"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtype_lattice() {
        assert!(ValType::I32.is_subtype_of(&ValType::I32));
        assert!(ValType::NullRef.is_subtype_of(&ValType::AnyRef));
        assert!(ValType::NullRef.is_subtype_of(&ValType::FuncRef));
        assert!(!ValType::FuncRef.is_subtype_of(&ValType::AnyRef));
        assert!(!ValType::AnyRef.is_subtype_of(&ValType::NullRef));
        assert!(!ValType::I32.is_subtype_of(&ValType::I64));
    }

    #[test]
    fn join_of_refs() {
        assert_eq!(
            ValType::NullRef.join(&ValType::FuncRef),
            Some(ValType::FuncRef)
        );
        assert_eq!(ValType::FuncRef.join(&ValType::AnyRef), None);
        assert_eq!(ValType::I32.join(&ValType::I32), Some(ValType::I32));
    }

    #[test]
    fn untyped_roundtrip() {
        let values = [
            Value::I32(-7),
            Value::I64(i64::MIN),
            Value::F32(0x7fc0_0000),
            Value::F64(0x7ff8_0000_0000_0000),
            Value::FuncRef(RefValue::Func(42)),
        ];
        for value in values {
            let ty = value.ty();
            assert_eq!(Value::from_untyped(value.to_untyped(), ty), value);
        }
    }
}
