use thiserror::Error;

use super::DataType;

/// A block operation error.
#[derive(Debug, Error)]
pub enum BlockError {
    /// The operation does not support the data type.
    #[error("operation {operation} does not support data type {data_type}")]
    UnsupportedDataType {
        /// The operation.
        operation: String,
        /// The unsupported data type.
        data_type: DataType,
    },
    /// Shapes cannot be broadcast together.
    #[error("shapes {0:?} and {1:?} cannot be broadcast together")]
    IncompatibleShapes(Vec<usize>, Vec<usize>),
    /// An index is out of bounds.
    #[error("index {index} is out of bounds for axis {axis} with size {size}")]
    IndexOutOfBounds {
        /// The index.
        index: usize,
        /// The axis.
        axis: usize,
        /// The axis size.
        size: usize,
    },
    /// A selection is invalid for the block.
    #[error("selection {selection} is invalid for a block with shape {shape:?}")]
    InvalidSelection {
        /// The selection.
        selection: String,
        /// The block shape.
        shape: Vec<usize>,
    },
    /// An axis is out of range.
    #[error("axis {axis} is out of range for a block with {ndim} dimensions")]
    InvalidAxis {
        /// The axis.
        axis: usize,
        /// The number of dimensions.
        ndim: usize,
    },
    /// A task argument had an unexpected kind.
    #[error("expected {expected}, got {got}")]
    UnexpectedValue {
        /// The expected kind.
        expected: &'static str,
        /// A description of the received value.
        got: String,
    },
    /// An operation received the wrong number of arguments.
    #[error("{operation} takes {expected} arguments, got {got}")]
    ArgumentCount {
        /// The operation.
        operation: String,
        /// The expected number of arguments.
        expected: usize,
        /// The received number of arguments.
        got: usize,
    },
    /// An integer was raised to a negative power.
    #[error("integers to negative integer powers are not allowed")]
    NegativeIntegerPower,
    /// A reduction without an identity was applied to a zero-size block.
    #[error("zero-size block to reduction operation {0} which has no identity")]
    EmptyReduction(&'static str),
    /// A shape error.
    #[error("{0}")]
    Shape(String),
    /// An IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A user-supplied operation failed.
    #[error("{0}")]
    Other(String),
}

impl From<ndarray::ShapeError> for BlockError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Shape(err.to_string())
    }
}
