//! In-memory N-dimensional blocks.
//!
//! A [`Block`] is the unit of data that flows between tasks: a dynamically-dimensioned
//! [`ndarray`] array of one of the supported [`DataType`]s.
//! This module also implements the block-level numeric operations used by array tasks:
//!  - selection ([`Block::select`]),
//!  - element-wise operations ([`BinaryOp`], [`UnaryOp`]),
//!  - reductions ([`ReductionOp`]), including coarsening ([`ReductionOp::coarsen`]),
//!  - tensor contraction ([`tensordot`]), and
//!  - recursive concatenation of nested block lists ([`concatenate3`]).

/// Apply `$body` to the typed array of a block, rewrapping the result in the same variant.
macro_rules! map_block {
    ($block:expr, $array:ident => $body:expr) => {
        match $block {
            Block::Bool($array) => Block::Bool($body),
            Block::Int32($array) => Block::Int32($body),
            Block::Int64($array) => Block::Int64($body),
            Block::Float32($array) => Block::Float32($body),
            Block::Float64($array) => Block::Float64($body),
        }
    };
}

/// As [`map_block`], for a fallible `$body`.
macro_rules! try_map_block {
    ($block:expr, $array:ident => $body:expr) => {
        match $block {
            Block::Bool($array) => Block::Bool($body?),
            Block::Int32($array) => Block::Int32($body?),
            Block::Int64($array) => Block::Int64($body?),
            Block::Float32($array) => Block::Float32($body?),
            Block::Float64($array) => Block::Float64($body?),
        }
    };
}

/// Apply `$body` to the typed array of a block.
macro_rules! with_block {
    ($block:expr, $array:ident => $body:expr) => {
        match $block {
            Block::Bool($array) => $body,
            Block::Int32($array) => $body,
            Block::Int64($array) => $body,
            Block::Float32($array) => $body,
            Block::Float64($array) => $body,
        }
    };
}

/// Evaluate `$body` with `$t` aliased to the element type of `$data_type`.
macro_rules! with_element_type {
    ($data_type:expr, $t:ident => $body:expr) => {
        match $data_type {
            DataType::Bool => {
                type $t = bool;
                $body
            }
            DataType::Int32 => {
                type $t = i32;
                $body
            }
            DataType::Int64 => {
                type $t = i64;
                $body
            }
            DataType::Float32 => {
                type $t = f32;
                $body
            }
            DataType::Float64 => {
                type $t = f64;
                $body
            }
        }
    };
}

/// As [`with_element_type`], restricted to numeric types. `$bool` is evaluated for [`DataType::Bool`].
macro_rules! with_numeric_type {
    ($data_type:expr, $t:ident => $body:expr, bool => $bool:expr) => {
        match $data_type {
            DataType::Bool => $bool,
            DataType::Int32 => {
                type $t = i32;
                $body
            }
            DataType::Int64 => {
                type $t = i64;
                $body
            }
            DataType::Float32 => {
                type $t = f32;
                $body
            }
            DataType::Float64 => {
                type $t = f64;
                $body
            }
        }
    };
}

/// As [`with_element_type`], restricted to floating point types. `$other` is evaluated otherwise.
macro_rules! with_float_type {
    ($data_type:expr, $t:ident => $body:expr, other => $other:expr) => {
        match $data_type {
            DataType::Float32 => {
                type $t = f32;
                $body
            }
            DataType::Float64 => {
                type $t = f64;
                $body
            }
            DataType::Bool | DataType::Int32 | DataType::Int64 => $other,
        }
    };
}

mod block_errors;
mod concatenate;
mod data_type;
mod element;
mod linalg;
mod reduction;
mod selection;
mod sort;
mod ufunc;

pub use block_errors::BlockError;
pub use concatenate::{concatenate3, NestedBlocks};
pub use data_type::DataType;
pub use element::{Element, Float, Numeric, Scalar};
pub use linalg::tensordot;
pub use reduction::ReductionOp;
pub use selection::{Selection, SliceSpec};
pub use ufunc::{broadcast_shapes, choose, isclose, select_where, BinaryOp, BlockOperand, UnaryOp};

use std::borrow::Cow;

use ndarray::{ArrayD, Axis, IxDyn};

/// An in-memory N-dimensional block.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// A `bool` block.
    Bool(ArrayD<bool>),
    /// An `i32` block.
    Int32(ArrayD<i32>),
    /// An `i64` block.
    Int64(ArrayD<i64>),
    /// An `f32` block.
    Float32(ArrayD<f32>),
    /// An `f64` block.
    Float64(ArrayD<f64>),
}

impl<T: Element> From<ArrayD<T>> for Block {
    fn from(array: ArrayD<T>) -> Self {
        T::into_block(array)
    }
}

impl From<Scalar> for Block {
    fn from(scalar: Scalar) -> Self {
        Self::from_scalar(scalar)
    }
}

impl Block {
    /// Create a zero-dimensional block holding `scalar`.
    #[must_use]
    pub fn from_scalar(scalar: Scalar) -> Self {
        Self::full(scalar.data_type(), &[], scalar)
    }

    /// Create a block of `data_type` with every element set to `value`.
    #[must_use]
    pub fn full(data_type: DataType, shape: &[usize], value: Scalar) -> Self {
        with_element_type!(data_type, T => {
            Self::from(ArrayD::from_elem(IxDyn(shape), T::from_scalar(value)))
        })
    }

    /// Create a block of `data_type` filled with zeros.
    #[must_use]
    pub fn zeros(data_type: DataType, shape: &[usize]) -> Self {
        Self::full(data_type, shape, Scalar::Int(0))
    }

    /// Create a block with `ndim` dimensions and no elements.
    ///
    /// Empty blocks are used as representative inputs when inferring the result type of an operation.
    #[must_use]
    pub fn empty(data_type: DataType, ndim: usize) -> Self {
        Self::zeros(data_type, &vec![0; ndim])
    }

    /// Create a block from a flat vector of elements in C order.
    ///
    /// # Errors
    /// Returns a [`BlockError`] if the number of elements does not match `shape`.
    pub fn from_vec<T: Element>(shape: &[usize], elements: Vec<T>) -> Result<Self, BlockError> {
        Ok(Self::from(ArrayD::from_shape_vec(IxDyn(shape), elements)?))
    }

    /// Create a block of `data_type` from scalars in C order, converting each with `as` cast semantics.
    ///
    /// # Errors
    /// Returns a [`BlockError`] if the number of scalars does not match `shape`.
    pub fn from_scalars(
        data_type: DataType,
        shape: &[usize],
        scalars: &[Scalar],
    ) -> Result<Self, BlockError> {
        with_element_type!(data_type, T => {
            Self::from_vec(shape, scalars.iter().map(|scalar| T::from_scalar(*scalar)).collect::<Vec<T>>())
        })
    }

    /// Returns the data type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Bool,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
        }
    }

    /// Returns the shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        with_block!(self, array => array.shape())
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn num_elements(&self) -> usize {
        with_block!(self, array => array.len())
    }

    /// Borrow the typed array.
    ///
    /// # Errors
    /// Returns [`BlockError::UnexpectedValue`] if the block is not of element type `T`.
    pub fn as_array<T: Element>(&self) -> Result<&ArrayD<T>, BlockError> {
        T::array(self).ok_or_else(|| BlockError::UnexpectedValue {
            expected: "a block of the requested data type",
            got: self.data_type().to_string(),
        })
    }

    /// Take the typed array.
    ///
    /// # Errors
    /// Returns [`BlockError::UnexpectedValue`] if the block is not of element type `T`.
    pub fn into_array<T: Element>(self) -> Result<ArrayD<T>, BlockError> {
        T::try_into_array(self).map_err(|block| BlockError::UnexpectedValue {
            expected: "a block of the requested data type",
            got: block.data_type().to_string(),
        })
    }

    /// Convert the block to an array of element type `T`.
    #[must_use]
    pub fn cast<T: Element>(&self) -> ArrayD<T> {
        with_block!(self, array => array.mapv(|value| T::from_scalar(value.to_scalar())))
    }

    /// Borrow the block as an array of element type `T`, converting only if necessary.
    #[must_use]
    pub fn cast_cow<T: Element>(&self) -> Cow<'_, ArrayD<T>> {
        T::array(self).map_or_else(|| Cow::Owned(self.cast()), Cow::Borrowed)
    }

    /// Convert the block to `data_type`.
    #[must_use]
    pub fn astype(&self, data_type: DataType) -> Self {
        if data_type == self.data_type() {
            return self.clone();
        }
        with_element_type!(data_type, T => Self::from(self.cast::<T>()))
    }

    /// Returns the elements as scalars in logical (C) order.
    #[must_use]
    pub fn to_scalars(&self) -> Vec<Scalar> {
        with_block!(self, array => array.iter().map(|value| value.to_scalar()).collect())
    }

    /// Returns the element of a block with exactly one element.
    ///
    /// # Errors
    /// Returns [`BlockError::UnexpectedValue`] if the block does not have exactly one element.
    pub fn to_scalar(&self) -> Result<Scalar, BlockError> {
        match self.to_scalars().as_slice() {
            [scalar] => Ok(*scalar),
            _ => Err(BlockError::UnexpectedValue {
                expected: "a block with one element",
                got: format!("a block with shape {:?}", self.shape()),
            }),
        }
    }

    /// Permute the axes of the block.
    ///
    /// # Errors
    /// Returns [`BlockError::InvalidSelection`] if `axes` is not a permutation of the block axes.
    pub fn transpose(&self, axes: &[usize]) -> Result<Self, BlockError> {
        let mut seen = vec![false; self.ndim()];
        let valid = axes.len() == self.ndim()
            && axes
                .iter()
                .all(|&axis| axis < seen.len() && !std::mem::replace(&mut seen[axis], true));
        if !valid {
            return Err(BlockError::InvalidSelection {
                selection: format!("transpose{axes:?}"),
                shape: self.shape().to_vec(),
            });
        }
        Ok(map_block!(self, array => array.clone().permuted_axes(axes.to_vec())))
    }

    /// Reshape the block, reading and writing elements in C order.
    ///
    /// # Errors
    /// Returns a [`BlockError`] if the number of elements differs.
    pub fn reshape(&self, shape: &[usize]) -> Result<Self, BlockError> {
        Ok(try_map_block!(self, array => {
            ArrayD::from_shape_vec(IxDyn(shape), array.iter().copied().collect())
        }))
    }

    /// Broadcast the block to `shape`.
    ///
    /// # Errors
    /// Returns [`BlockError::IncompatibleShapes`] if the block cannot be broadcast to `shape`.
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<Self, BlockError> {
        let incompatible = || BlockError::IncompatibleShapes(self.shape().to_vec(), shape.to_vec());
        Ok(try_map_block!(self, array => {
            array
                .broadcast(IxDyn(shape))
                .map(|view| view.to_owned())
                .ok_or_else(incompatible)
        }))
    }

    /// Concatenate blocks along `axis`, promoting to a common data type.
    ///
    /// # Errors
    /// Returns a [`BlockError`] if `blocks` is empty or the block shapes are incompatible.
    pub fn concatenate(blocks: &[&Self], axis: usize) -> Result<Self, BlockError> {
        let data_type = DataType::promote_all(blocks.iter().map(|block| block.data_type()))
            .ok_or_else(|| BlockError::Shape("need at least one block to concatenate".into()))?;
        if let Some(block) = blocks.iter().find(|block| axis >= block.ndim()) {
            return Err(BlockError::InvalidAxis {
                axis,
                ndim: block.ndim(),
            });
        }
        with_element_type!(data_type, T => {
            let arrays: Vec<_> = blocks.iter().map(|block| block.cast_cow::<T>()).collect();
            let views: Vec<_> = arrays.iter().map(|array| array.view()).collect();
            Ok(Self::from(ndarray::concatenate(Axis(axis), &views)?))
        })
    }

    /// Insert an axis of length one at `axis`.
    #[must_use]
    pub fn insert_axis(&self, axis: usize) -> Self {
        map_block!(self, array => array.clone().insert_axis(Axis(axis)))
    }

    /// Promote the block to at least `ndim` dimensions by prepending axes of length one.
    #[must_use]
    pub fn atleast_nd(&self, ndim: usize) -> Self {
        let mut block = self.clone();
        while block.ndim() < ndim {
            block = block.insert_axis(0);
        }
        block
    }

    /// Write the elements in C order as native-endian bytes.
    #[must_use]
    pub fn to_ne_bytes(&self) -> Vec<u8> {
        fn pod_bytes<T: bytemuck::Pod>(array: &ArrayD<T>) -> Vec<u8> {
            let elements: Vec<T> = array.iter().copied().collect();
            bytemuck::cast_slice(&elements).to_vec()
        }
        match self {
            Self::Bool(array) => array.iter().map(|value| u8::from(*value)).collect(),
            Self::Int32(array) => pod_bytes(array),
            Self::Int64(array) => pod_bytes(array),
            Self::Float32(array) => pod_bytes(array),
            Self::Float64(array) => pod_bytes(array),
        }
    }

    /// Read a block of `data_type` and `shape` from native-endian bytes in C order.
    ///
    /// # Errors
    /// Returns a [`BlockError`] if the length of `bytes` does not match the shape.
    pub fn from_ne_bytes(
        data_type: DataType,
        shape: &[usize],
        bytes: &[u8],
    ) -> Result<Self, BlockError> {
        fn pod_array<T: bytemuck::Pod + Element>(
            shape: &[usize],
            bytes: &[u8],
        ) -> Result<Block, BlockError> {
            if bytes.len() % std::mem::size_of::<T>() != 0 {
                return Err(BlockError::Shape(format!(
                    "{} bytes is not a multiple of the element size",
                    bytes.len()
                )));
            }
            Block::from_vec(shape, bytemuck::pod_collect_to_vec::<u8, T>(bytes))
        }
        match data_type {
            DataType::Bool => Self::from_vec(shape, bytes.iter().map(|byte| *byte != 0).collect()),
            DataType::Int32 => pod_array::<i32>(shape, bytes),
            DataType::Int64 => pod_array::<i64>(shape, bytes),
            DataType::Float32 => pod_array::<f32>(shape, bytes),
            DataType::Float64 => pod_array::<f64>(shape, bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn block_constructors() {
        let block = Block::full(DataType::Int32, &[2, 3], Scalar::Int(7));
        assert_eq!(block.shape(), &[2, 3]);
        assert_eq!(block.data_type(), DataType::Int32);
        assert_eq!(block.to_scalars(), vec![Scalar::Int(7); 6]);
        assert_eq!(Block::empty(DataType::Float64, 3).shape(), &[0, 0, 0]);
        assert_eq!(Block::from_scalar(Scalar::Float(1.5)).ndim(), 0);
        assert_eq!(
            Block::from_scalar(Scalar::Float(1.5)).to_scalar().unwrap(),
            Scalar::Float(1.5)
        );
        assert!(Block::zeros(DataType::Bool, &[2]).to_scalar().is_err());
    }

    #[test]
    fn block_astype() {
        let block = Block::from(array![1.7f64, -2.2].into_dyn());
        let converted = block.astype(DataType::Int32);
        assert_eq!(converted.as_array::<i32>().unwrap(), &array![1, -2].into_dyn());
        assert!(converted.as_array::<i64>().is_err());
    }

    #[test]
    fn block_transpose_reshape() {
        let block = Block::from_vec(&[2, 3], (0..6i64).collect()).unwrap();
        let transposed = block.transpose(&[1, 0]).unwrap();
        assert_eq!(transposed.shape(), &[3, 2]);
        assert_eq!(
            transposed.as_array::<i64>().unwrap(),
            &array![[0i64, 3], [1, 4], [2, 5]].into_dyn()
        );
        assert!(block.transpose(&[0, 0]).is_err());
        let reshaped = transposed.reshape(&[6]).unwrap();
        assert_eq!(
            reshaped.as_array::<i64>().unwrap(),
            &array![0i64, 3, 1, 4, 2, 5].into_dyn()
        );
        assert!(block.reshape(&[4]).is_err());
    }

    #[test]
    fn block_concatenate_promotes() {
        let a = Block::from(array![[1i32, 2]].into_dyn());
        let b = Block::from(array![[0.5f64, 1.5]].into_dyn());
        let c = Block::concatenate(&[&a, &b], 0).unwrap();
        assert_eq!(
            c.as_array::<f64>().unwrap(),
            &array![[1.0, 2.0], [0.5, 1.5]].into_dyn()
        );
        assert!(Block::concatenate(&[&a, &b], 2).is_err());
        assert!(Block::concatenate(&[], 0).is_err());
    }

    #[test]
    fn block_broadcast() {
        let a = Block::from(array![1i64, 2, 3].into_dyn());
        assert_eq!(a.broadcast_to(&[2, 3]).unwrap().shape(), &[2, 3]);
        assert!(a.broadcast_to(&[2, 4]).is_err());
        assert_eq!(a.atleast_nd(3).shape(), &[1, 1, 3]);
    }

    #[test]
    fn block_bytes() {
        let a = Block::from_vec(&[2, 2], vec![1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let bytes = a.to_ne_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(Block::from_ne_bytes(DataType::Float32, &[2, 2], &bytes).unwrap(), a);
        let b = Block::from(array![true, false].into_dyn());
        assert_eq!(
            Block::from_ne_bytes(DataType::Bool, &[2], &b.to_ne_bytes()).unwrap(),
            b
        );
        assert!(Block::from_ne_bytes(DataType::Int64, &[2], &bytes[..3]).is_err());
    }
}
