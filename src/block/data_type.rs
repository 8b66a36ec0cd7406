use derive_more::Display;
use serde::{Deserialize, Serialize};

/// The element type of a block.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// `bool`
    #[display("bool")]
    Bool,
    /// `i32`
    #[display("int32")]
    Int32,
    /// `i64`
    #[display("int64")]
    Int64,
    /// `f32`
    #[display("float32")]
    Float32,
    /// `f64`
    #[display("float64")]
    Float64,
}

impl DataType {
    /// Returns the size in bytes of an element.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Int32 | Self::Float32 => 4,
            Self::Int64 | Self::Float64 => 8,
        }
    }

    /// Returns true if the data type is a floating point type.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Returns true if the data type is an integer type.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }

    /// Parse a data type from its name (e.g. `"float64"`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(Self::Bool),
            "int32" | "i4" => Some(Self::Int32),
            "int64" | "i8" | "int" => Some(Self::Int64),
            "float32" | "f4" => Some(Self::Float32),
            "float64" | "f8" | "float" => Some(Self::Float64),
            _ => None,
        }
    }

    /// The smallest data type that can represent values of both `self` and `other`.
    #[must_use]
    pub const fn promote(self, other: Self) -> Self {
        use DataType::{Bool, Float32, Float64, Int32, Int64};
        match (self, other) {
            (Bool, x) | (x, Bool) => x,
            (Int32, Int32) => Int32,
            (Int32 | Int64, Int32 | Int64) => Int64,
            (Float32, Float32) => Float32,
            (Int32 | Int64, Float32) | (Float32, Int32 | Int64) | (_, Float64) | (Float64, _) => {
                Float64
            }
        }
    }

    /// Promote a sequence of data types. Returns [`None`] if the sequence is empty.
    pub fn promote_all(data_types: impl IntoIterator<Item = Self>) -> Option<Self> {
        data_types.into_iter().reduce(Self::promote)
    }

    /// The floating point type used for results of true division and transcendental functions.
    #[must_use]
    pub const fn float_type(self) -> Self {
        match self {
            Self::Float32 => Self::Float32,
            _ => Self::Float64,
        }
    }

    /// The data type used to accumulate sums and products.
    #[must_use]
    pub const fn accumulator_type(self) -> Self {
        match self {
            Self::Bool | Self::Int32 | Self::Int64 => Self::Int64,
            Self::Float32 => Self::Float32,
            Self::Float64 => Self::Float64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_promotion() {
        use DataType::*;
        assert_eq!(Bool.promote(Int32), Int32);
        assert_eq!(Int32.promote(Int64), Int64);
        assert_eq!(Int32.promote(Float32), Float64);
        assert_eq!(Float32.promote(Float32), Float32);
        assert_eq!(Float32.promote(Float64), Float64);
        assert_eq!(Int64.promote(Bool), Int64);
        assert_eq!(DataType::promote_all([Bool, Int32, Float32]), Some(Float64));
        assert_eq!(DataType::promote_all([]), None);
    }

    #[test]
    fn data_type_names() {
        assert_eq!(DataType::Float64.to_string(), "float64");
        assert_eq!(DataType::from_name("int32"), Some(DataType::Int32));
        assert_eq!(DataType::from_name("complex"), None);
        assert_eq!(
            serde_json::to_string(&DataType::Int64).unwrap(),
            r#""int64""#
        );
    }
}
