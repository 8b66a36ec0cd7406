//! Chunked arrays.
//!
//! An [`Array`] is a deferred N-dimensional array split into rectangular blocks.
//! It owns a [`TaskGraph`] that computes every block, the name of its blocks in that graph, its [`ChunkSpec`], and
//! its [`DataType`]. Every operation returns a new [`Array`] whose graph shares the layers of its inputs and adds the
//! tasks of the operation. Nothing is computed until [`Array::compute`].
//!
//! Arrays are created from existing data with [`Array::from_array`] or [`Array::from_block`], from scratch with
//! [`zeros`], [`ones`], [`full`], [`arange`] and [`from_function`], or from a task graph with [`Array::new`].

mod array_errors;
mod block_stack;
mod coarsen;
mod creation;
mod elemwise;
mod insert;
mod linalg;
mod map_blocks;
mod rechunk;
mod reductions;
mod reshape;
mod routines;
mod slicing;
mod store;
mod structural;
mod topk;
mod vindex;

pub use self::{
    array_errors::{ArrayError, ErrorKind},
    block_stack::{from_block_stack, to_block_stack},
    coarsen::coarsen,
    creation::{arange, arange_with, from_function, full, ones, zeros},
    elemwise::{elemwise, ufunc, ElemwiseOptions, Operand},
    insert::{insert, InsertIndex},
    linalg::{dot, tensordot, TensorDotAxes},
    map_blocks::{map_blocks, MapBlocksOptions},
    routines::{choose, compress, isclose, where_},
    slicing::Index,
    store::store,
    structural::{concatenate, dstack, hstack, stack, vstack},
    topk::topk,
};

use std::sync::Arc;

use crate::{
    block::{concatenate3, Block, DataType},
    chunks::{fmt_tuple, normalize_chunks, ChunkSpec, ChunksArg},
    config::ComputeConfig,
    getem::getem,
    graph::{GraphKey, NestedKeys, Scheduler, Task, TaskArg, TaskGraph, Tasks, Value},
    source::{ArrayLike, SourceLock},
    tokenize::{name_for, Tokenize, Tokenizer},
};

/// The maximum length of the chunks shown by the [`Display`](std::fmt::Display) implementation of [`Array`].
const DISPLAY_CHUNKS_MAX_LENGTH: usize = 100;

/// A deferred chunked N-dimensional array.
///
/// The shape of an array is derived from its chunks: `shape[axis]` is the sum of the block sizes along `axis`.
/// An array is immutable. Its chunks cannot be reassigned ([`set_chunks`](Array::set_chunks) always fails), use
/// [`rechunk`](Array::rechunk) to create an array with different chunks.
///
/// ### Example
/// ```rust
/// # use chunkgraph::{array::Array, block::Block, config::ComputeConfig};
/// let x = Array::from_block(Block::from_vec(&[4], vec![1i64, 2, 3, 4])?, 2)?;
/// let y = (&x + &x)?;
/// assert_eq!(y.chunks().as_slice(), &[vec![2, 2]]);
/// let z = y.compute(&ComputeConfig::synchronous())?;
/// assert_eq!(z, Block::from_vec(&[4], vec![2i64, 4, 6, 8])?);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct Array {
    /// The graph computing the blocks of the array (and of the arrays it depends on).
    graph: TaskGraph,
    /// The name of the blocks in the graph.
    name: String,
    /// The block sizes along each axis.
    chunks: ChunkSpec,
    /// The data type of every block.
    data_type: DataType,
}

impl Array {
    /// Create an array from a task graph holding its blocks.
    ///
    /// `chunks` is normalised against `shape` with [`normalize_chunks`]. Every block `(name, *coordinates)` must be
    /// computable from `graph`.
    ///
    /// # Errors
    /// Returns [`ArrayError::MissingChunks`] if `chunks` is [`None`], or an error from [`normalize_chunks`].
    pub fn new(
        graph: TaskGraph,
        name: &str,
        chunks: Option<ChunksArg>,
        shape: Option<&[usize]>,
        data_type: DataType,
    ) -> Result<Self, ArrayError> {
        let chunks = chunks.ok_or(ArrayError::MissingChunks)?;
        Ok(Self::from_parts(
            graph,
            name.to_string(),
            normalize_chunks(chunks, shape)?,
            data_type,
        ))
    }

    pub(crate) fn from_parts(
        graph: TaskGraph,
        name: String,
        chunks: ChunkSpec,
        data_type: DataType,
    ) -> Self {
        Self {
            graph,
            name,
            chunks,
            data_type,
        }
    }

    /// Create an array from the graphs of `dependencies` and a layer of new tasks named `name`.
    pub(crate) fn derive(
        name: String,
        tasks: Tasks,
        dependencies: &[&Self],
        chunks: ChunkSpec,
        data_type: DataType,
    ) -> Self {
        let graph = TaskGraph::merge(dependencies.iter().map(|array| &array.graph))
            .with_layer(name.clone(), tasks);
        Self::from_parts(graph, name, chunks, data_type)
    }

    /// Create an array reading its blocks from an external source.
    ///
    /// A [`ChunkDimension::Full`](crate::chunks::ChunkDimension::Full) axis of `chunks` is a single block spanning the
    /// axis. If `lock` is given, every block read holds it, so reads from a source that is not safe for concurrent
    /// access are serialised. Pass clones of one [`SourceLock`] to share a lock between arrays reading the same source.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `chunks` is incompatible with the shape of `source`.
    pub fn from_array(
        source: Arc<dyn ArrayLike>,
        chunks: impl Into<ChunksArg>,
        lock: Option<SourceLock>,
    ) -> Result<Self, ArrayError> {
        let shape = source.shape();
        let chunks = normalize_chunks(chunks, Some(&shape))?;
        let token = source.token();
        let name = name_for("array", &[&token, &chunks]);
        let original = GraphKey::scalar(format!("array-original-{token}"));
        let mut tasks = getem(
            &name,
            &chunks,
            &TaskArg::Key(original.clone()),
            lock.as_ref(),
            None,
        );
        let data_type = source.data_type();
        tasks.insert(original, Task::Value(Value::Source(source)));
        Ok(Self::derive(name, tasks, &[], chunks, data_type))
    }

    /// Create an array from an in-memory block.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `chunks` is incompatible with the shape of `block`.
    pub fn from_block(block: Block, chunks: impl Into<ChunksArg>) -> Result<Self, ArrayError> {
        Self::from_array(Arc::new(block), chunks, None)
    }

    /// Returns the task graph.
    #[must_use]
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Returns the name of the blocks of the array in its graph.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the chunks.
    #[must_use]
    pub fn chunks(&self) -> &ChunkSpec {
        &self.chunks
    }

    /// Always fails: the chunks of an array are immutable.
    ///
    /// # Errors
    /// Always returns [`ArrayError::ImmutableChunks`]. Use [`rechunk`](Array::rechunk) instead.
    pub fn set_chunks(&mut self, _chunks: impl Into<ChunksArg>) -> Result<(), ArrayError> {
        Err(ArrayError::ImmutableChunks)
    }

    /// Returns the data type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the shape.
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        self.chunks.shape()
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.chunks.ndim()
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shape().iter().product()
    }

    /// Returns the number of bytes of the elements.
    #[must_use]
    pub fn nbytes(&self) -> usize {
        self.size() * self.data_type.size()
    }

    /// Returns the extent of the first axis.
    ///
    /// # Errors
    /// Returns [`ArrayError::InvalidArgument`] for a zero-dimensional array.
    pub fn len(&self) -> Result<usize, ArrayError> {
        self.shape()
            .first()
            .copied()
            .ok_or_else(|| ArrayError::InvalidArgument("len() of unsized object".to_string()))
    }

    /// Returns true if the array has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the number of blocks along each axis.
    #[must_use]
    pub fn numblocks(&self) -> Vec<usize> {
        self.chunks.numblocks()
    }

    /// Returns the key of the block at `coordinates`.
    #[must_use]
    pub fn key(&self, coordinates: Vec<usize>) -> GraphKey {
        GraphKey::new(self.name.clone(), coordinates)
    }

    /// Returns the keys of the blocks as a nested list mirroring the block grid.
    ///
    /// The keys of a zero-dimensional array are the single key `(name,)`.
    #[must_use]
    pub fn keys(&self) -> NestedKeys {
        fn nest(name: &str, numblocks: &[usize], coordinates: &mut Vec<usize>) -> NestedKeys {
            let axis = coordinates.len();
            if axis == numblocks.len() {
                return NestedKeys::Key(GraphKey::new(name, coordinates.clone()));
            }
            NestedKeys::List(
                (0..numblocks[axis])
                    .map(|index| {
                        coordinates.push(index);
                        let keys = nest(name, numblocks, coordinates);
                        coordinates.pop();
                        keys
                    })
                    .collect(),
            )
        }
        nest(&self.name, &self.numblocks(), &mut Vec::with_capacity(self.ndim()))
    }

    /// Returns the labels of the axes of the array in an index expression.
    pub(crate) fn labels(&self) -> Vec<char> {
        labels(self.ndim())
    }

    /// Compute the array with the scheduler of `config`.
    ///
    /// # Errors
    /// Returns [`ArrayError::Compute`] if a task fails.
    pub fn compute(&self, config: &ComputeConfig) -> Result<Block, ArrayError> {
        self.compute_with(config.create_scheduler()?.as_ref())
    }

    /// Compute the array with `scheduler`, concatenating the blocks into a single block.
    ///
    /// # Errors
    /// Returns [`ArrayError::Compute`] if a task fails.
    pub fn compute_with(&self, scheduler: &dyn Scheduler) -> Result<Block, ArrayError> {
        let keys = self.keys();
        let mut values = scheduler.get(&self.graph, &keys.flatten())?.into_iter();
        let nested = nest_values(&keys, &mut values);
        Ok(concatenate3(&nested.to_nested_blocks()?)?)
    }

    /// Compute the values of every block, in C order of the block grid.
    pub(crate) fn compute_blocks(
        &self,
        config: &ComputeConfig,
    ) -> Result<Vec<(GraphKey, Value)>, ArrayError> {
        let keys = self.keys().flatten();
        let values = config.create_scheduler()?.get(&self.graph, &keys)?;
        Ok(keys.into_iter().zip(values).collect())
    }
}

/// Rebuild the nesting of `keys` from values of the flattened keys.
fn nest_values(keys: &NestedKeys, values: &mut impl Iterator<Item = Value>) -> Value {
    match keys {
        NestedKeys::Key(_) => values.next().unwrap_or(Value::List(vec![])),
        NestedKeys::List(items) => {
            Value::List(items.iter().map(|item| nest_values(item, values)).collect())
        }
    }
}

/// Returns `ndim` distinct axis labels for index expressions.
pub(crate) fn labels(ndim: usize) -> Vec<char> {
    (0..ndim)
        .map(|axis| {
            u32::try_from(axis)
                .ok()
                .and_then(|axis| char::from_u32(u32::from('a') + axis))
                .unwrap_or(char::REPLACEMENT_CHARACTER)
        })
        .collect()
}

/// Normalise a possibly negative axis of an array with `ndim` dimensions.
pub(crate) fn normalize_axis(axis: isize, ndim: usize) -> Result<usize, ArrayError> {
    let out_of_range = || ArrayError::AxisOutOfRange { axis, ndim };
    let ndim_signed = isize::try_from(ndim).map_err(|_| out_of_range())?;
    let normalized = if axis < 0 { axis + ndim_signed } else { axis };
    if (0..ndim_signed).contains(&normalized) {
        usize::try_from(normalized).map_err(|_| out_of_range())
    } else {
        Err(out_of_range())
    }
}

impl Tokenize for Array {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.update(&self.name);
    }
}

impl std::fmt::Display for Array {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut chunks = self.chunks.to_string();
        if chunks.len() > DISPLAY_CHUNKS_MAX_LENGTH {
            chunks = format!("<{} blocks>", fmt_tuple(&self.numblocks()));
        }
        write!(
            f,
            "chunkgraph.Array<{}, shape={}, chunks={}, dtype={}>",
            self.name,
            fmt_tuple(&self.shape()),
            chunks,
            self.data_type
        )
    }
}
