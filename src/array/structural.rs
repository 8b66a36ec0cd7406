use std::{collections::HashMap, sync::Arc};

use super::{normalize_axis, Array, ArrayError, Index};
use crate::{
    block::DataType,
    chunks::ChunkSpec,
    getem::region_selection,
    graph::{GraphKey, Operation, Task, TaskArg, Tasks, Value},
    operations::{BroadcastTo, GetArray, Transpose},
    tokenize::{name_for, Tokenize},
    top::{top, TopArg},
};

/// Promote the data types of `arrays` and convert each array to the result.
fn promote_arrays(arrays: &[&Array]) -> Result<(Vec<Array>, DataType), ArrayError> {
    let data_type = DataType::promote_all(arrays.iter().map(|array| array.data_type()))
        .ok_or_else(|| ArrayError::InvalidArgument("need at least one array".to_string()))?;
    let arrays = arrays
        .iter()
        .map(|array| array.astype(data_type))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((arrays, data_type))
}

/// Stack arrays of the same shape along a new axis.
///
/// The output has one block of extent one along the new axis per input. Inputs after the first are rechunked to the
/// chunks of the first, and all inputs are converted to their promoted data type.
///
/// # Errors
/// Returns an [`ArrayError`] if `arrays` is empty, the shapes differ, or `axis` is out of range.
pub fn stack(arrays: &[&Array], axis: isize) -> Result<Array, ArrayError> {
    let Some(first) = arrays.first() else {
        return Err(ArrayError::InvalidArgument(
            "need at least one array to stack".to_string(),
        ));
    };
    if arrays.iter().any(|array| array.shape() != first.shape()) {
        return Err(ArrayError::IncompatibleShapes(
            arrays.iter().map(|array| array.shape()).collect(),
        ));
    }
    let axis = normalize_axis(axis, first.ndim() + 1)?;
    let rechunked = arrays
        .iter()
        .map(|array| array.rechunk(first.chunks()))
        .collect::<Result<Vec<_>, _>>()?;
    let (arrays, data_type) = promote_arrays(&rechunked.iter().collect::<Vec<_>>())?;

    let mut chunks = first.chunks().as_slice().to_vec();
    chunks.insert(axis, vec![1; arrays.len()]);
    let chunks = ChunkSpec::new_unchecked(chunks);
    let mut parts: Vec<&dyn Tokenize> = arrays.iter().map(|array| array as &dyn Tokenize).collect();
    parts.push(&axis);
    let name = name_for("stack", &parts);

    let get: Operation = Arc::new(GetArray);
    let tasks: Tasks = chunks
        .block_indices()
        .filter_map(|coordinates| {
            let mut input = coordinates.clone();
            let source = input.remove(axis);
            let region: Vec<_> = arrays[source]
                .chunks()
                .block_shape(&input)?
                .into_iter()
                .map(|size| 0..size)
                .collect();
            let task = Task::call(
                &get,
                vec![
                    TaskArg::Key(arrays[source].key(input)),
                    TaskArg::Value(Value::Selection(region_selection(&region, Some(axis)))),
                ],
            );
            Some((GraphKey::new(name.clone(), coordinates), task))
        })
        .collect();
    let dependencies: Vec<&Array> = arrays.iter().collect();
    Ok(Array::derive(name, tasks, &dependencies, chunks, data_type))
}

/// Concatenate arrays along an existing axis.
///
/// Every output block is an alias of an input block. The inputs must have identical chunks along the other axes and
/// are converted to their promoted data type.
///
/// # Errors
/// Returns an [`ArrayError`] if
///  - `arrays` is empty or zero-dimensional, or `axis` is out of range,
///  - the shapes differ along another axis, or
///  - the chunks differ along another axis.
pub fn concatenate(arrays: &[&Array], axis: isize) -> Result<Array, ArrayError> {
    let Some(first) = arrays.first() else {
        return Err(ArrayError::InvalidArgument(
            "need at least one array to concatenate".to_string(),
        ));
    };
    let ndim = first.ndim();
    if ndim == 0 {
        return Err(ArrayError::InvalidArgument(
            "zero-dimensional arrays cannot be concatenated".to_string(),
        ));
    }
    let axis = normalize_axis(axis, ndim)?;
    let differs = |array: &Array, of: fn(&Array, usize) -> Vec<usize>| {
        (0..ndim).any(|other| other != axis && of(array, other) != of(*first, other))
    };
    if arrays
        .iter()
        .any(|array| array.ndim() != ndim || differs(*array, |array, other| vec![array.shape()[other]]))
    {
        return Err(ArrayError::IncompatibleShapes(
            arrays.iter().map(|array| array.shape()).collect(),
        ));
    }
    if arrays
        .iter()
        .any(|array| differs(*array, |array, other| array.chunks()[other].clone()))
    {
        return Err(ArrayError::IncompatibleChunks(format!(
            "concatenated arrays must have the same chunks along every axis except {axis}: {}",
            arrays.iter().map(|array| array.chunks().to_string()).collect::<Vec<_>>().join(", ")
        )));
    }
    let (arrays, data_type) = promote_arrays(arrays)?;

    let mut chunks = first.chunks().as_slice().to_vec();
    chunks[axis] = arrays
        .iter()
        .flat_map(|array| array.chunks()[axis].iter().copied())
        .collect();
    let chunks = ChunkSpec::new_unchecked(chunks);
    let mut parts: Vec<&dyn Tokenize> = arrays.iter().map(|array| array as &dyn Tokenize).collect();
    parts.push(&axis);
    let name = name_for("concatenate", &parts);

    // The input and its block offset along `axis` for every output block along `axis`.
    let sources: Vec<(usize, usize)> = arrays
        .iter()
        .enumerate()
        .flat_map(|(source, array)| (0..array.numblocks()[axis]).map(move |block| (source, block)))
        .collect();
    let tasks: Tasks = chunks
        .block_indices()
        .map(|coordinates| {
            let (source, block) = sources[coordinates[axis]];
            let mut input = coordinates.clone();
            input[axis] = block;
            (
                GraphKey::new(name.clone(), coordinates),
                Task::Alias(arrays[source].key(input)),
            )
        })
        .collect();
    let dependencies: Vec<&Array> = arrays.iter().collect();
    Ok(Array::derive(name, tasks, &dependencies, chunks, data_type))
}

/// Stack arrays vertically (along the first axis), treating one-dimensional arrays as rows.
///
/// # Errors
/// Returns an [`ArrayError`] if [`concatenate`] fails.
pub fn vstack(arrays: &[&Array]) -> Result<Array, ArrayError> {
    let arrays = arrays
        .iter()
        .map(|array| array.atleast_nd(2))
        .collect::<Result<Vec<_>, _>>()?;
    concatenate(&arrays.iter().collect::<Vec<_>>(), 0)
}

/// Stack arrays horizontally: along the first axis for one-dimensional arrays, otherwise the second.
///
/// # Errors
/// Returns an [`ArrayError`] if [`concatenate`] fails.
pub fn hstack(arrays: &[&Array]) -> Result<Array, ArrayError> {
    let arrays = arrays
        .iter()
        .map(|array| array.atleast_nd(1))
        .collect::<Result<Vec<_>, _>>()?;
    let axis = if arrays.iter().all(|array| array.ndim() == 1) { 0 } else { 1 };
    concatenate(&arrays.iter().collect::<Vec<_>>(), axis)
}

/// Stack arrays along the third axis.
///
/// # Errors
/// Returns an [`ArrayError`] if [`concatenate`] fails.
pub fn dstack(arrays: &[&Array]) -> Result<Array, ArrayError> {
    let arrays = arrays
        .iter()
        .map(|array| array.atleast_nd(3))
        .collect::<Result<Vec<_>, _>>()?;
    concatenate(&arrays.iter().collect::<Vec<_>>(), 2)
}

impl Array {
    /// View the array with at least `ndim` dimensions.
    ///
    /// A zero-dimensional array gains leading axes. A one-dimensional array becomes a row `(1, n)`, and with three
    /// dimensions `(1, n, 1)`. A two-dimensional array gains a trailing axis.
    pub(crate) fn atleast_nd(&self, ndim: usize) -> Result<Self, ArrayError> {
        if self.ndim() >= ndim {
            return Ok(self.clone());
        }
        let index = match (self.ndim(), ndim) {
            (1, 3) => vec![Index::NewAxis, Index::full(), Index::NewAxis],
            (2, 3) => vec![Index::Ellipsis, Index::NewAxis],
            (current, ndim) => {
                let mut index = vec![Index::NewAxis; ndim - current];
                index.push(Index::Ellipsis);
                index
            }
        };
        self.get(&index)
    }

    /// Permute the axes.
    ///
    /// `axes[i]` is the input axis of output axis `i`. Reverses the axes if [`None`].
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `axes` is not a permutation of the axes.
    pub fn transpose(&self, axes: Option<&[isize]>) -> Result<Self, ArrayError> {
        let ndim = self.ndim();
        let permutation: Vec<usize> = match axes {
            Some(axes) => axes
                .iter()
                .map(|&axis| normalize_axis(axis, ndim))
                .collect::<Result<_, _>>()?,
            None => (0..ndim).rev().collect(),
        };
        let mut sorted = permutation.clone();
        sorted.sort_unstable();
        if sorted != (0..ndim).collect::<Vec<_>>() {
            return Err(ArrayError::InvalidArgument(format!(
                "axes {permutation:?} do not match an array with {ndim} dimensions"
            )));
        }
        let labels = self.labels();
        let out_labels: Vec<char> = permutation.iter().map(|&axis| labels[axis]).collect();
        let chunks = ChunkSpec::new_unchecked(
            permutation
                .iter()
                .map(|&axis| self.chunks[axis].clone())
                .collect(),
        );
        let name = name_for("transpose", &[&self.name, &permutation]);
        let operation: Operation = Arc::new(Transpose(permutation));
        let numblocks = HashMap::from([(self.name.clone(), self.numblocks())]);
        let tasks = top(
            &operation,
            &name,
            &out_labels,
            &[TopArg::array(self.name.clone(), &labels)],
            &numblocks,
        )?;
        Ok(Self::derive(name, tasks, &[self], chunks, self.data_type))
    }

    /// Reverse the axes.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the graph cannot be built.
    #[allow(non_snake_case)]
    pub fn T(&self) -> Result<Self, ArrayError> {
        self.transpose(None)
    }

    /// Broadcast the array to `shape`.
    ///
    /// Trailing axes are aligned. New leading axes and stretched axes of extent one have a single block.
    ///
    /// # Errors
    /// Returns [`ArrayError::BroadcastTo`] if the array cannot be broadcast to `shape`.
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<Self, ArrayError> {
        let from = self.shape();
        if from == shape {
            return Ok(self.clone());
        }
        let error = || ArrayError::BroadcastTo {
            from: from.clone(),
            to: shape.to_vec(),
        };
        let offset = shape.len().checked_sub(self.ndim()).ok_or_else(error)?;
        if from
            .iter()
            .zip(&shape[offset..])
            .any(|(&extent, &target)| extent != target && extent != 1)
        {
            return Err(error());
        }
        let chunks = ChunkSpec::new_unchecked(
            shape
                .iter()
                .enumerate()
                .map(|(axis, &extent)| match axis.checked_sub(offset) {
                    Some(input_axis) if from[input_axis] == extent => {
                        self.chunks[input_axis].clone()
                    }
                    _ => vec![extent],
                })
                .collect(),
        );
        let name = name_for("broadcast_to", &[&self.name, &shape.to_vec()]);
        let operation: Operation = Arc::new(BroadcastTo);
        let tasks: Tasks = chunks
            .block_indices()
            .map(|coordinates| {
                let input: Vec<usize> = (0..self.ndim())
                    .map(|axis| {
                        if from[axis] == shape[axis + offset] {
                            coordinates[axis + offset]
                        } else {
                            0
                        }
                    })
                    .collect();
                let block_shape = chunks.block_shape(&coordinates).unwrap_or_default();
                let task = Task::call(
                    &operation,
                    vec![
                        TaskArg::Key(self.key(input)),
                        TaskArg::Value(Value::Shape(block_shape)),
                    ],
                );
                (GraphKey::new(name.clone(), coordinates), task)
            })
            .collect();
        Ok(Self::derive(name, tasks, &[self], chunks, self.data_type))
    }
}
