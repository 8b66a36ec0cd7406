use std::fmt::Debug;

use ndarray::ArrayD;

use super::{Block, BlockError, DataType};

/// A scalar value.
///
/// Scalars are "weakly typed": when combined with a block they adopt the block's data type
/// wherever the value is representable (see [`Scalar::promote_with`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
}

impl Scalar {
    /// The data type of the scalar when it is not combined with a block.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Bool,
            Self::Int(_) => DataType::Int64,
            Self::Float(_) => DataType::Float64,
        }
    }

    /// The data type resulting from combining this scalar with a block of type `data_type`.
    #[must_use]
    pub fn promote_with(&self, data_type: DataType) -> DataType {
        match (*self, data_type) {
            (Self::Bool(_), data_type) => data_type,
            (Self::Int(_), DataType::Bool | DataType::Int64) => DataType::Int64,
            (Self::Int(value), DataType::Int32) => {
                if i32::try_from(value).is_ok() {
                    DataType::Int32
                } else {
                    DataType::Int64
                }
            }
            (Self::Int(_), data_type) => data_type,
            (Self::Float(_), DataType::Bool | DataType::Int32 | DataType::Int64) => {
                DataType::Float64
            }
            (Self::Float(value), DataType::Float32) => {
                if value.is_finite() && value.abs() > f64::from(f32::MAX) {
                    DataType::Float64
                } else {
                    DataType::Float32
                }
            }
            (Self::Float(_), DataType::Float64) => DataType::Float64,
        }
    }

    /// Convert the scalar to a value of element type `T`.
    #[must_use]
    pub fn cast<T: Element>(self) -> T {
        T::from_scalar(self)
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for Scalar {
    fn from(value: f32) -> Self {
        Self::Float(value.into())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// A type that can be stored in a [`Block`].
pub trait Element: Copy + Debug + PartialEq + PartialOrd + Send + Sync + 'static {
    /// The data type of the element.
    const DATA_TYPE: DataType;

    /// Convert a scalar to this element type, with `as` cast semantics.
    fn from_scalar(scalar: Scalar) -> Self;

    /// Convert this element to a scalar.
    fn to_scalar(self) -> Scalar;

    /// Wrap an array of this element type in a [`Block`].
    fn into_block(array: ArrayD<Self>) -> Block;

    /// Borrow the typed array of a [`Block`] if it has this element type.
    fn array(block: &Block) -> Option<&ArrayD<Self>>;

    /// Take the typed array of a [`Block`] if it has this element type.
    ///
    /// # Errors
    /// Returns the block if it has a different element type.
    fn try_into_array(block: Block) -> Result<ArrayD<Self>, Block>;

    /// Returns true if the element is a floating point NaN.
    fn is_nan(self) -> bool {
        false
    }
}

impl Element for bool {
    const DATA_TYPE: DataType = DataType::Bool;

    fn from_scalar(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool(value) => value,
            Scalar::Int(value) => value != 0,
            Scalar::Float(value) => value != 0.0,
        }
    }

    fn to_scalar(self) -> Scalar {
        Scalar::Bool(self)
    }

    fn into_block(array: ArrayD<Self>) -> Block {
        Block::Bool(array)
    }

    fn array(block: &Block) -> Option<&ArrayD<Self>> {
        if let Block::Bool(array) = block {
            Some(array)
        } else {
            None
        }
    }

    fn try_into_array(block: Block) -> Result<ArrayD<Self>, Block> {
        if let Block::Bool(array) = block {
            Ok(array)
        } else {
            Err(block)
        }
    }
}

macro_rules! impl_numeric_element {
    ($t:ty, $variant:ident, $scalar:ident) => {
        impl Element for $t {
            const DATA_TYPE: DataType = DataType::$variant;

            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
            fn from_scalar(scalar: Scalar) -> Self {
                match scalar {
                    Scalar::Bool(value) => <$t>::from(u8::from(value)),
                    Scalar::Int(value) => value as $t,
                    Scalar::Float(value) => value as $t,
                }
            }

            fn to_scalar(self) -> Scalar {
                Scalar::$scalar(self.into())
            }

            fn into_block(array: ArrayD<Self>) -> Block {
                Block::$variant(array)
            }

            fn array(block: &Block) -> Option<&ArrayD<Self>> {
                if let Block::$variant(array) = block {
                    Some(array)
                } else {
                    None
                }
            }

            fn try_into_array(block: Block) -> Result<ArrayD<Self>, Block> {
                if let Block::$variant(array) = block {
                    Ok(array)
                } else {
                    Err(block)
                }
            }

            #[allow(clippy::float_cmp, clippy::eq_op)]
            fn is_nan(self) -> bool {
                self != self
            }
        }
    };
}

impl_numeric_element!(i32, Int32, Int);
impl_numeric_element!(i64, Int64, Int);
impl_numeric_element!(f32, Float32, Float);
impl_numeric_element!(f64, Float64, Float);

/// An element type supporting arithmetic.
pub trait Numeric: Element + ndarray::LinalgScalar {
    /// `self + rhs`, wrapping on integer overflow.
    fn wrapping_add(self, rhs: Self) -> Self;

    /// `self - rhs`, wrapping on integer overflow.
    fn wrapping_sub(self, rhs: Self) -> Self;

    /// `self * rhs`, wrapping on integer overflow.
    fn wrapping_mul(self, rhs: Self) -> Self;

    /// Raise `self` to the power `exponent`.
    ///
    /// # Errors
    /// Returns [`BlockError::NegativeIntegerPower`] for integers raised to negative powers.
    fn pow(self, exponent: Self) -> Result<Self, BlockError>;

    /// The absolute value.
    fn abs(self) -> Self;
}

macro_rules! impl_numeric_integer {
    ($t:ty) => {
        impl Numeric for $t {
            fn wrapping_add(self, rhs: Self) -> Self {
                <$t>::wrapping_add(self, rhs)
            }

            fn wrapping_sub(self, rhs: Self) -> Self {
                <$t>::wrapping_sub(self, rhs)
            }

            fn wrapping_mul(self, rhs: Self) -> Self {
                <$t>::wrapping_mul(self, rhs)
            }

            fn pow(self, exponent: Self) -> Result<Self, BlockError> {
                let exponent =
                    u32::try_from(exponent).map_err(|_| BlockError::NegativeIntegerPower)?;
                Ok(self.wrapping_pow(exponent))
            }

            fn abs(self) -> Self {
                self.wrapping_abs()
            }
        }
    };
}

macro_rules! impl_numeric_float {
    ($t:ty) => {
        impl Numeric for $t {
            fn wrapping_add(self, rhs: Self) -> Self {
                self + rhs
            }

            fn wrapping_sub(self, rhs: Self) -> Self {
                self - rhs
            }

            fn wrapping_mul(self, rhs: Self) -> Self {
                self * rhs
            }

            fn pow(self, exponent: Self) -> Result<Self, BlockError> {
                Ok(self.powf(exponent))
            }

            fn abs(self) -> Self {
                <$t>::abs(self)
            }
        }

        impl Float for $t {
            fn exp(self) -> Self {
                <$t>::exp(self)
            }

            fn ln(self) -> Self {
                <$t>::ln(self)
            }

            fn sqrt(self) -> Self {
                <$t>::sqrt(self)
            }

            fn sin(self) -> Self {
                <$t>::sin(self)
            }

            fn cos(self) -> Self {
                <$t>::cos(self)
            }

            fn floor(self) -> Self {
                <$t>::floor(self)
            }
        }
    };
}

/// A floating point element type.
pub trait Float: Numeric + std::ops::Neg<Output = Self> {
    /// `e^self`
    fn exp(self) -> Self;
    /// The natural logarithm.
    fn ln(self) -> Self;
    /// The square root.
    fn sqrt(self) -> Self;
    /// The sine.
    fn sin(self) -> Self;
    /// The cosine.
    fn cos(self) -> Self;
    /// The largest integer less than or equal to `self`.
    fn floor(self) -> Self;
}

impl_numeric_integer!(i32);
impl_numeric_integer!(i64);
impl_numeric_float!(f32);
impl_numeric_float!(f64);

/// Returns the larger of `x` and `y`, propagating NaN.
pub(crate) fn maximum<T: Element>(x: T, y: T) -> T {
    if x.is_nan() || x >= y {
        x
    } else {
        y
    }
}

/// Returns the smaller of `x` and `y`, propagating NaN.
pub(crate) fn minimum<T: Element>(x: T, y: T) -> T {
    if x.is_nan() || x <= y {
        x
    } else {
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_weak_promotion() {
        assert_eq!(Scalar::Int(1).promote_with(DataType::Int32), DataType::Int32);
        assert_eq!(
            Scalar::Int(i64::from(i32::MAX) + 1).promote_with(DataType::Int32),
            DataType::Int64
        );
        assert_eq!(
            Scalar::Float(2.0).promote_with(DataType::Float32),
            DataType::Float32
        );
        assert_eq!(
            Scalar::Float(2.0).promote_with(DataType::Int32),
            DataType::Float64
        );
        assert_eq!(Scalar::Int(1).promote_with(DataType::Bool), DataType::Int64);
        assert_eq!(Scalar::Bool(true).promote_with(DataType::Float32), DataType::Float32);
    }

    #[test]
    fn scalar_casts() {
        assert_eq!(Scalar::Float(2.7).cast::<i32>(), 2);
        assert_eq!(Scalar::Bool(true).cast::<f64>(), 1.0);
        assert!(Scalar::Int(3).cast::<bool>());
        assert_eq!(5i32.to_scalar(), Scalar::Int(5));
        assert_eq!(Scalar::Float(1.5).to_string(), "1.5");
        assert_eq!(Scalar::Float(1.0).to_string(), "1.0");
    }

    #[test]
    fn numeric_pow() {
        assert_eq!(Numeric::pow(2i64, 10).unwrap(), 1024);
        assert!(Numeric::pow(2i32, -1).is_err());
        assert_eq!(Numeric::pow(4.0f64, 0.5).unwrap(), 2.0);
    }

    #[test]
    fn nan_propagation() {
        assert!(maximum(f64::NAN, 1.0).is_nan());
        assert!(maximum(1.0, f64::NAN).is_nan());
        assert!(minimum(f64::NAN, 1.0).is_nan());
        assert_eq!(maximum(1, 2), 2);
        assert_eq!(minimum(1, 2), 1);
    }
}
