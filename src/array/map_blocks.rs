use std::{collections::HashMap, sync::Arc};

use itertools::Itertools;

use super::{
    elemwise::{array_operands, external_arrays, infer_data_type, scalar_operands, unify_chunks},
    labels, Array, ArrayError, Operand,
};
use crate::{
    block::{broadcast_shapes, Block, DataType},
    chunks::{ChunkDimension, ChunkSpec, ChunksArg},
    graph::{operation_token, partial_by_order, Operation, Task, TaskArg, Tasks, Value},
    operations::Unwrap,
    tokenize::{name_for, Tokenize, Tokenizer},
    top::{top, TopArg},
};

/// Options of [`map_blocks`].
#[derive(Debug, Clone, Default)]
pub struct MapBlocksOptions {
    data_type: Option<DataType>,
    chunks: Option<ChunksArg>,
    drop_axis: Vec<usize>,
    new_axis: Vec<usize>,
    name: Option<String>,
    block_id: bool,
}

impl MapBlocksOptions {
    /// Create the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output data type instead of inferring it.
    #[must_use]
    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    /// Set the output chunks.
    ///
    /// A fixed size along an axis is the size of every block along it, explicit sizes must give one size per block.
    #[must_use]
    pub fn chunks(mut self, chunks: impl Into<ChunksArg>) -> Self {
        self.chunks = Some(chunks.into());
        self
    }

    /// Set the axes removed by the function. They are rechunked to a single block first.
    #[must_use]
    pub fn drop_axis(mut self, drop_axis: Vec<usize>) -> Self {
        self.drop_axis = drop_axis;
        self
    }

    /// Set the positions of axes added by the function. New axes have a single block of extent one.
    #[must_use]
    pub fn new_axis(mut self, new_axis: Vec<usize>) -> Self {
        self.new_axis = new_axis;
        self
    }

    /// Set the output name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Pass the coordinates of the output block as a trailing [`Value::Shape`] argument.
    #[must_use]
    pub fn block_id(mut self, block_id: bool) -> Self {
        self.block_id = block_id;
        self
    }
}

impl Tokenize for MapBlocksOptions {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer
            .update(&self.data_type)
            .update(&self.chunks.as_ref().map(|chunks| format!("{chunks:?}")))
            .update(&self.drop_axis)
            .update(&self.new_axis)
            .update(&self.block_id);
    }
}

/// Resolve explicit output chunks against the default output chunks, which fix the number of blocks.
fn resolve_chunks(chunks: &ChunksArg, default: &ChunkSpec) -> Result<ChunkSpec, ArrayError> {
    let dimensions: Vec<ChunkDimension> = match chunks {
        ChunksArg::Uniform(size) => vec![ChunkDimension::Fixed(*size); default.ndim()],
        ChunksArg::PerAxis(dimensions) => dimensions.clone(),
        ChunksArg::Spec(spec) => spec.iter().cloned().map(ChunkDimension::Varying).collect(),
    };
    if dimensions.len() != default.ndim() {
        return Err(ArrayError::DimensionalityMismatch {
            expected: default.ndim(),
            got: dimensions.len(),
        });
    }
    let resolved = dimensions
        .into_iter()
        .zip(default.iter())
        .map(|(dimension, blocks)| match dimension {
            ChunkDimension::Fixed(size) => Ok(vec![size; blocks.len()]),
            ChunkDimension::Varying(sizes) if sizes.len() == blocks.len() => Ok(sizes),
            ChunkDimension::Varying(sizes) => Err(ArrayError::InvalidArgument(format!(
                "{} block sizes given for an axis of {} blocks",
                sizes.len(),
                blocks.len()
            ))),
            ChunkDimension::Full => Ok(blocks.clone()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    ChunkSpec::new(resolved)
}

/// Apply a function to every block of one or more arrays.
///
/// Array operands are aligned on their trailing axes and rechunked to common chunks as in
/// [`elemwise`](super::elemwise), scalars are fixed arguments. Unlike [`elemwise`](super::elemwise), the function may
/// change the shape of the blocks: the output chunks, dropped axes and new axes are described by `options`.
///
/// Unless set in `options`, the data type is inferred by applying `operation` to empty blocks.
///
/// # Errors
/// Returns an [`ArrayError`] if
///  - the operand shapes cannot be broadcast together,
///  - a dropped axis or new axis is out of range,
///  - the output chunks do not match the number of output blocks, or
///  - the data type cannot be inferred.
pub fn map_blocks(
    operation: &Operation,
    operands: &[Operand<'_>],
    options: &MapBlocksOptions,
) -> Result<Array, ArrayError> {
    let externals = external_arrays(operands)?;
    let arrays = array_operands(operands, &externals);
    let scalars = scalar_operands(operands);

    let shapes: Vec<Vec<usize>> = arrays.iter().map(|(_, array)| array.shape()).collect();
    let shape_refs: Vec<&[usize]> = shapes.iter().map(Vec::as_slice).collect();
    let shape = broadcast_shapes(&shape_refs)
        .ok_or_else(|| ArrayError::IncompatibleShapes(shapes.clone()))?;
    let ndim = shape.len();
    if let Some(&axis) = options.drop_axis.iter().find(|&&axis| axis >= ndim) {
        return Err(ArrayError::AxisOutOfRange {
            axis: isize::try_from(axis).unwrap_or(isize::MAX),
            ndim,
        });
    }
    if !options.drop_axis.iter().all_unique() || !options.new_axis.iter().all_unique() {
        return Err(ArrayError::InvalidArgument(format!(
            "repeated axes in drop_axis {:?} or new_axis {:?}",
            options.drop_axis, options.new_axis
        )));
    }
    let out_ndim = ndim - options.drop_axis.len() + options.new_axis.len();
    if let Some(&axis) = options.new_axis.iter().find(|&&axis| axis >= out_ndim) {
        return Err(ArrayError::AxisOutOfRange {
            axis: isize::try_from(axis).unwrap_or(isize::MAX),
            ndim: out_ndim,
        });
    }

    let rechunked = arrays
        .iter()
        .map(|(_, array)| {
            let offset = ndim - array.ndim();
            if options
                .drop_axis
                .iter()
                .any(|&axis| axis >= offset && array.numblocks()[axis - offset] > 1)
            {
                let dimensions: Vec<ChunkDimension> = (offset..ndim)
                    .map(|axis| {
                        if options.drop_axis.contains(&axis) {
                            ChunkDimension::Full
                        } else {
                            ChunkDimension::Varying(array.chunks()[axis - offset].clone())
                        }
                    })
                    .collect();
                array.rechunk(dimensions)
            } else {
                Ok((*array).clone())
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    let rechunked_refs: Vec<&Array> = rechunked.iter().collect();
    let (unified, unified_chunks) = unify_chunks(&rechunked_refs, &shape)?;

    let data_type = match options.data_type {
        Some(data_type) => data_type,
        None => {
            let mut args: Vec<(usize, Value)> = arrays
                .iter()
                .map(|(position, array)| {
                    (*position, Value::from(Block::empty(array.data_type(), array.ndim())))
                })
                .chain(scalars.iter().cloned())
                .collect();
            args.sort_by_key(|(position, _)| *position);
            let mut args: Vec<Value> = args.into_iter().map(|(_, value)| value).collect();
            if options.block_id {
                args.push(Value::Shape(vec![0; out_ndim]));
            }
            infer_data_type(operation.as_ref(), &args)?
        }
    };

    let name = match &options.name {
        Some(name) => name.clone(),
        None => {
            let token = operation_token(operation.as_ref());
            let mut parts: Vec<&dyn Tokenize> = vec![&token, options];
            parts.extend(operands.iter().map(|operand| operand as &dyn Tokenize));
            name_for(&operation.name(), &parts)
        }
    };

    let mut operation = if scalars.is_empty() {
        Arc::clone(operation)
    } else {
        partial_by_order(Arc::clone(operation), scalars)?
    };
    if !options.drop_axis.is_empty() {
        operation = Arc::new(Unwrap(operation));
    }

    let all_labels = labels(ndim + options.new_axis.len());
    let in_labels = &all_labels[..ndim];
    let mut out_labels: Vec<char> = in_labels
        .iter()
        .enumerate()
        .filter_map(|(axis, label)| (!options.drop_axis.contains(&axis)).then_some(*label))
        .collect();
    let mut out_chunks: Vec<Vec<usize>> = unified_chunks
        .iter()
        .enumerate()
        .filter_map(|(axis, chunks)| (!options.drop_axis.contains(&axis)).then(|| chunks.clone()))
        .collect();
    let mut new_axis = options.new_axis.clone();
    new_axis.sort_unstable();
    for (&position, &label) in new_axis.iter().zip(&all_labels[ndim..]) {
        out_labels.insert(position, label);
        out_chunks.insert(position, vec![1]);
    }
    let mut chunks = ChunkSpec::new_unchecked(out_chunks);
    if let Some(explicit) = &options.chunks {
        chunks = resolve_chunks(explicit, &chunks)?;
    }

    let numblocks: HashMap<String, Vec<usize>> = unified
        .iter()
        .map(|array| (array.name().to_string(), array.numblocks()))
        .collect();
    let args: Vec<TopArg> = unified
        .iter()
        .map(|array| TopArg::array(array.name(), &in_labels[ndim - array.ndim()..]))
        .collect();
    let mut tasks = top(&operation, &name, &out_labels, &args, &numblocks)?;
    if options.block_id {
        tasks = tasks
            .into_iter()
            .map(|(key, task)| {
                let task = match task {
                    Task::Call { operation, mut args } => {
                        args.push(TaskArg::Value(Value::Shape(key.index().to_vec())));
                        Task::Call { operation, args }
                    }
                    task => task,
                };
                (key, task)
            })
            .collect::<Tasks>();
    }
    let dependencies: Vec<&Array> = unified.iter().map(AsRef::as_ref).collect();
    Ok(Array::derive(name, tasks, &dependencies, chunks, data_type))
}

impl Array {
    /// Apply a function to every block of the array. See [`map_blocks`].
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if [`map_blocks`] fails.
    pub fn map_blocks(
        &self,
        operation: &Operation,
        options: &MapBlocksOptions,
    ) -> Result<Self, ArrayError> {
        map_blocks(operation, &[self.into()], options)
    }
}
