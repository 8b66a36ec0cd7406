use thiserror::Error;

use crate::{block::BlockError, graph::ComputeError};

/// The category of an [`ArrayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An argument has the right type but an invalid value.
    Value,
    /// An argument is missing or of the wrong kind.
    Type,
    /// An index is out of bounds or malformed.
    Index,
    /// The operation is valid but not supported.
    NotImplemented,
    /// A task failed while executing a graph.
    Execution,
    /// Reading or writing external storage failed.
    Io,
}

/// An array error.
#[derive(Debug, Error)]
pub enum ArrayError {
    /// Shapes cannot be broadcast together.
    #[error("shapes {0:?} cannot be broadcast together")]
    IncompatibleShapes(Vec<Vec<usize>>),
    /// Chunks cannot be broadcast or aligned together.
    #[error("chunks are incompatible: {0}")]
    IncompatibleChunks(String),
    /// The number of dimensions of an argument does not match.
    #[error("expected {expected} dimensions, got {got}")]
    DimensionalityMismatch {
        /// The expected number of dimensions.
        expected: usize,
        /// The received number of dimensions.
        got: usize,
    },
    /// A chunk size is not a non-negative integral value, or is zero for a non-empty axis.
    #[error("invalid chunk size {0}")]
    InvalidChunkSize(String),
    /// Explicit chunks do not sum to the array shape.
    #[error("chunks {chunks} do not add up to shape {shape:?}")]
    ChunksShapeMismatch {
        /// The chunks.
        chunks: String,
        /// The shape.
        shape: Vec<usize>,
    },
    /// A reshape changes the number of elements.
    #[error("cannot reshape array of shape {from:?} into shape {to:?}")]
    ReshapeSize {
        /// The array shape.
        from: Vec<usize>,
        /// The requested shape.
        to: Vec<isize>,
    },
    /// An array cannot be broadcast to a shape.
    #[error("cannot broadcast array of shape {from:?} to shape {to:?}")]
    BroadcastTo {
        /// The array shape.
        from: Vec<usize>,
        /// The target shape.
        to: Vec<usize>,
    },
    /// An axis is out of range.
    #[error("axis {axis} is out of range for an array with {ndim} dimensions")]
    AxisOutOfRange {
        /// The axis.
        axis: isize,
        /// The number of dimensions.
        ndim: usize,
    },
    /// An operation name is not recognised.
    #[error("unknown operation {0}")]
    UnknownOperation(String),
    /// An operation received the wrong number of operands.
    #[error("{operation} takes {expected} operands, got {got}")]
    OperandCount {
        /// The operation.
        operation: String,
        /// The expected number of operands.
        expected: usize,
        /// The received number of operands.
        got: usize,
    },
    /// A fixed argument position was given more than once.
    #[error("argument position {0} was fixed more than once")]
    DuplicateArgumentPosition(usize),
    /// The result type of an operation could not be inferred.
    #[error("could not infer the data type of {operation}, provide one explicitly: {source}")]
    DataTypeInference {
        /// The operation.
        operation: String,
        /// The error raised by the operation on representative inputs.
        #[source]
        source: BlockError,
    },
    /// An argument value is invalid.
    #[error("{0}")]
    InvalidArgument(String),
    /// Chunks were given without a shape that they require.
    #[error("chunks {0} require an array shape")]
    MissingShape(String),
    /// An array was constructed without chunks.
    #[error("must supply chunks to construct an array, see the documentation of `Array::new` and `normalize_chunks`")]
    MissingChunks,
    /// An operation received an unexpected keyword argument.
    #[error("{operation} got an unexpected keyword argument {keyword}")]
    UnexpectedKeyword {
        /// The operation.
        operation: String,
        /// The keyword.
        keyword: String,
    },
    /// An attempt was made to assign the chunks of an array.
    #[error("cannot assign chunks directly, use rechunk instead")]
    ImmutableChunks,
    /// An index is out of bounds.
    #[error("index {index} is out of bounds for axis {axis} with size {size}")]
    IndexOutOfBounds {
        /// The index.
        index: isize,
        /// The axis.
        axis: usize,
        /// The axis size.
        size: usize,
    },
    /// An index is malformed.
    #[error("invalid index: {0}")]
    InvalidIndex(String),
    /// The operation is not supported.
    #[error("not supported: {0}")]
    Unsupported(String),
    /// Executing a task graph failed.
    #[error(transparent)]
    Compute(#[from] ComputeError),
    /// A block operation failed outside of a task graph.
    #[error(transparent)]
    Block(#[from] BlockError),
    /// An IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A metadata serialisation error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ArrayError {
    /// Returns the category of the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IncompatibleShapes(_)
            | Self::IncompatibleChunks(_)
            | Self::DimensionalityMismatch { .. }
            | Self::InvalidChunkSize(_)
            | Self::ChunksShapeMismatch { .. }
            | Self::ReshapeSize { .. }
            | Self::BroadcastTo { .. }
            | Self::AxisOutOfRange { .. }
            | Self::UnknownOperation(_)
            | Self::OperandCount { .. }
            | Self::DuplicateArgumentPosition(_)
            | Self::DataTypeInference { .. }
            | Self::InvalidArgument(_)
            | Self::MissingChunks => ErrorKind::Value,
            Self::MissingShape(_)
            | Self::UnexpectedKeyword { .. }
            | Self::ImmutableChunks => ErrorKind::Type,
            Self::IndexOutOfBounds { .. } | Self::InvalidIndex(_) => ErrorKind::Index,
            Self::Unsupported(_) => ErrorKind::NotImplemented,
            Self::Compute(_) | Self::Block(_) => ErrorKind::Execution,
            Self::Io(_) | Self::Json(_) => ErrorKind::Io,
        }
    }
}
