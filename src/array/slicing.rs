use std::sync::Arc;

use super::{normalize_axis, Array, ArrayError};
use crate::{
    block::{Selection, SliceSpec},
    chunks::ChunkSpec,
    graph::{GraphKey, Operation, Task, TaskArg, Tasks, Value},
    operations::GetArray,
    tokenize::{name_for, Tokenize, Tokenizer},
};

/// An index along one or more axes of an [`Array`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Index {
    /// A single element, dropping the axis. Negative values count from the end.
    Int(isize),
    /// A strided range. Negative bounds count from the end and are clamped to the axis.
    Slice {
        /// The first index, 0 if [`None`].
        start: Option<isize>,
        /// The end index (exclusive), the axis extent if [`None`].
        stop: Option<isize>,
        /// The step. Must be positive.
        step: isize,
    },
    /// A new axis of extent 1.
    NewAxis,
    /// Full slices for every axis not otherwise indexed.
    Ellipsis,
    /// A list of indices along the axis.
    Array(Vec<isize>),
    /// A boolean mask selecting the indices where it is true. Its length must be the extent of the axis.
    Mask(Vec<bool>),
    /// A multi-dimensional list of indices.
    NestedArray(Vec<Vec<isize>>),
}

impl Index {
    /// A slice of the whole axis.
    #[must_use]
    pub const fn full() -> Self {
        Self::Slice {
            start: None,
            stop: None,
            step: 1,
        }
    }

    /// A slice `start..stop` with a step of 1.
    #[must_use]
    pub const fn range(start: isize, stop: isize) -> Self {
        Self::Slice {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }

    /// A strided slice.
    #[must_use]
    pub const fn slice(start: Option<isize>, stop: Option<isize>, step: isize) -> Self {
        Self::Slice { start, stop, step }
    }

    const fn consumes_axis(&self) -> bool {
        !matches!(self, Self::NewAxis | Self::Ellipsis)
    }

    const fn is_full(&self) -> bool {
        matches!(
            self,
            Self::Slice {
                start: None | Some(0),
                stop: None,
                step: 1
            }
        )
    }
}

impl From<isize> for Index {
    fn from(index: isize) -> Self {
        Self::Int(index)
    }
}

impl From<std::ops::Range<isize>> for Index {
    fn from(range: std::ops::Range<isize>) -> Self {
        Self::range(range.start, range.end)
    }
}

impl From<std::ops::RangeFull> for Index {
    fn from(_: std::ops::RangeFull) -> Self {
        Self::full()
    }
}

impl From<Vec<isize>> for Index {
    fn from(indices: Vec<isize>) -> Self {
        Self::Array(indices)
    }
}

impl From<Vec<bool>> for Index {
    fn from(mask: Vec<bool>) -> Self {
        Self::Mask(mask)
    }
}

impl Tokenize for Index {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        match self {
            Self::Int(index) => tokenizer.write_bytes(b'i', &[]).update(index),
            Self::Slice { start, stop, step } => tokenizer
                .write_bytes(b':', &[])
                .update(start)
                .update(stop)
                .update(step),
            Self::NewAxis => tokenizer.write_bytes(b'n', &[]),
            Self::Ellipsis => tokenizer.write_bytes(b'e', &[]),
            Self::Array(indices) => tokenizer.write_bytes(b'a', &[]).update(indices),
            Self::Mask(mask) => tokenizer.write_bytes(b'm', &[]).update(mask),
            Self::NestedArray(indices) => tokenizer.write_bytes(b'A', &[]).update(indices),
        };
    }
}

/// Replace an ellipsis by full slices and append full slices for the remaining axes.
pub(crate) fn expand_ellipsis(index: &[Index], ndim: usize) -> Result<Vec<Index>, ArrayError> {
    let ellipses = index.iter().filter(|index| matches!(index, Index::Ellipsis)).count();
    if ellipses > 1 {
        return Err(ArrayError::InvalidIndex(
            "an index can only have a single ellipsis".to_string(),
        ));
    }
    let consumed = index.iter().filter(|index| index.consumes_axis()).count();
    if consumed > ndim {
        return Err(ArrayError::InvalidIndex(format!(
            "too many indices for an array with {ndim} dimensions: {consumed} were indexed"
        )));
    }
    let mut expanded = Vec::with_capacity(index.len() + ndim - consumed);
    for entry in index {
        if matches!(entry, Index::Ellipsis) {
            expanded.extend(std::iter::repeat(Index::full()).take(ndim - consumed));
        } else {
            expanded.push(entry.clone());
        }
    }
    if ellipses == 0 {
        expanded.extend(std::iter::repeat(Index::full()).take(ndim - consumed));
    }
    Ok(expanded)
}

/// Normalise a possibly negative index along an axis of extent `size`.
pub(crate) fn normalize_index(index: isize, axis: usize, size: usize) -> Result<usize, ArrayError> {
    let out_of_bounds = || ArrayError::IndexOutOfBounds { index, axis, size };
    let size_signed = isize::try_from(size).map_err(|_| out_of_bounds())?;
    let normalized = if index < 0 { index + size_signed } else { index };
    if (0..size_signed).contains(&normalized) {
        usize::try_from(normalized).map_err(|_| out_of_bounds())
    } else {
        Err(out_of_bounds())
    }
}

/// Clamp a slice bound to `0..=size` the way sequence slicing does.
fn clamp_bound(bound: Option<isize>, default: usize, size: usize) -> usize {
    match bound {
        None => default,
        Some(bound) if bound < 0 => size.saturating_sub(bound.unsigned_abs()),
        Some(bound) => bound.unsigned_abs().min(size),
    }
}

/// A part of an output block along one axis: the input block, its local selection, and the output size.
type Part = (usize, SliceSpec, usize);

/// How one entry of an index maps the blocks of the input to the blocks of the output.
enum AxisPlan {
    /// An integer index: the axis is dropped.
    Drop { block: usize, index: usize },
    /// An axis of the output with one block per part.
    Keep(Vec<Part>),
    /// A new axis of extent one.
    NewAxis,
}

/// Plan a strided range over blocks of `sizes`, with one part per block holding at least one selected element.
fn plan_slice(sizes: &[usize], start: usize, stop: usize, step: usize) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut offset = 0;
    for (block, &size) in sizes.iter().enumerate() {
        let (block_start, block_stop) = (offset, offset + size);
        offset = block_stop;
        let low = start.max(block_start);
        let high = stop.min(block_stop);
        if low >= high {
            continue;
        }
        let first = start + (low - start).div_ceil(step) * step;
        if first >= high {
            continue;
        }
        parts.push((
            block,
            SliceSpec::Range {
                start: first - block_start,
                stop: Some(high - block_start),
                step,
            },
            (high - first).div_ceil(step),
        ));
    }
    if parts.is_empty() {
        parts.push((0, SliceSpec::range(0..0), 0));
    }
    parts
}

/// Plan a list of indices, with one part per run of consecutive indices in the same block.
fn plan_points(chunks: &ChunkSpec, axis: usize, indices: &[usize]) -> Vec<Part> {
    let offsets = chunks.offsets(axis);
    let mut parts: Vec<Part> = Vec::new();
    for &index in indices {
        let block = offsets.partition_point(|&offset| offset <= index) - 1;
        let local = index - offsets[block];
        match parts.last_mut() {
            Some((last, SliceSpec::Points(points), count)) if *last == block => {
                points.push(local);
                *count += 1;
            }
            _ => parts.push((block, SliceSpec::Points(vec![local]), 1)),
        }
    }
    if parts.is_empty() {
        parts.push((0, SliceSpec::range(0..0), 0));
    }
    parts
}

impl Array {
    /// Index the array.
    ///
    /// Supports integers, strided slices with a positive step, new axes, an ellipsis, boolean masks and a single
    /// list of indices. Missing trailing indices select whole axes.
    ///
    /// Every output block reads one region of one input block. An output block equal to an input block is an alias
    /// of it. Returns a clone of the array if every axis is selected in full.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - the index has more than one ellipsis or more entries than the array has axes,
    ///  - an integer or list index is out of bounds, or a mask length does not match its axis,
    ///  - a slice step is zero, or
    ///  - the index uses an unsupported feature: negative steps, several lists, or nested lists.
    pub fn get(&self, index: &[Index]) -> Result<Self, ArrayError> {
        let expanded = expand_ellipsis(index, self.ndim())?;
        if expanded.iter().all(Index::is_full) {
            return Ok(self.clone());
        }
        if expanded.iter().any(|entry| matches!(entry, Index::NestedArray(_))) {
            return Err(ArrayError::Unsupported(
                "multi-dimensional list indices are not supported".to_string(),
            ));
        }
        let lists = expanded
            .iter()
            .filter(|entry| matches!(entry, Index::Array(_) | Index::Mask(_)))
            .count();
        if lists > 1 {
            return Err(ArrayError::Unsupported(
                "only one list index is supported, use vindex for pointwise indexing".to_string(),
            ));
        }

        let shape = self.shape();
        let mut plans = Vec::with_capacity(expanded.len());
        let mut axis = 0;
        for entry in &expanded {
            let plan = match entry {
                Index::Int(index) => {
                    let index = normalize_index(*index, axis, shape[axis])?;
                    let (block, index) = self
                        .chunks
                        .locate(axis, index)
                        .ok_or(ArrayError::IndexOutOfBounds {
                            index: isize::try_from(index).unwrap_or(isize::MAX),
                            axis,
                            size: shape[axis],
                        })?;
                    AxisPlan::Drop { block, index }
                }
                Index::Slice { start, stop, step } => {
                    if *step == 0 {
                        return Err(ArrayError::InvalidArgument(
                            "slice step cannot be zero".to_string(),
                        ));
                    }
                    if *step < 0 {
                        return Err(ArrayError::Unsupported(
                            "slices with a negative step are not supported".to_string(),
                        ));
                    }
                    let size = shape[axis];
                    let start = clamp_bound(*start, 0, size);
                    let stop = clamp_bound(*stop, size, size);
                    AxisPlan::Keep(plan_slice(
                        &self.chunks[axis],
                        start,
                        stop,
                        step.unsigned_abs(),
                    ))
                }
                Index::Array(indices) => {
                    let indices = indices
                        .iter()
                        .map(|&index| normalize_index(index, axis, shape[axis]))
                        .collect::<Result<Vec<_>, _>>()?;
                    AxisPlan::Keep(plan_points(&self.chunks, axis, &indices))
                }
                Index::Mask(mask) => {
                    if mask.len() != shape[axis] {
                        return Err(ArrayError::InvalidIndex(format!(
                            "boolean index of length {} does not match axis {axis} of extent {}",
                            mask.len(),
                            shape[axis]
                        )));
                    }
                    let indices: Vec<usize> = mask
                        .iter()
                        .enumerate()
                        .filter_map(|(index, &selected)| selected.then_some(index))
                        .collect();
                    AxisPlan::Keep(plan_points(&self.chunks, axis, &indices))
                }
                Index::NewAxis | Index::Ellipsis | Index::NestedArray(_) => AxisPlan::NewAxis,
            };
            if entry.consumes_axis() {
                axis += 1;
            }
            plans.push(plan);
        }

        let chunks = ChunkSpec::new_unchecked(
            plans
                .iter()
                .filter_map(|plan| match plan {
                    AxisPlan::Drop { .. } => None,
                    AxisPlan::Keep(parts) => Some(parts.iter().map(|(_, _, size)| *size).collect()),
                    AxisPlan::NewAxis => Some(vec![1]),
                })
                .collect(),
        );
        let name = name_for("getitem", &[&self.name, &expanded]);
        let get: Operation = Arc::new(GetArray);
        let mut tasks = Tasks::with_capacity(chunks.num_blocks());
        for coordinates in chunks.block_indices() {
            let mut out_axis = 0;
            let mut input = Vec::with_capacity(self.ndim());
            let mut specs = Vec::with_capacity(plans.len());
            for plan in &plans {
                match plan {
                    AxisPlan::Drop { block, index } => {
                        input.push(*block);
                        specs.push(SliceSpec::Index(*index));
                    }
                    AxisPlan::Keep(parts) => {
                        let (block, spec, _) = &parts[coordinates[out_axis]];
                        input.push(*block);
                        specs.push(spec.clone());
                        out_axis += 1;
                    }
                    AxisPlan::NewAxis => {
                        specs.push(SliceSpec::NewAxis);
                        out_axis += 1;
                    }
                }
            }
            let whole = specs.len() == input.len()
                && specs.iter().zip(&input).enumerate().all(|(axis, (spec, &block))| {
                    *spec == SliceSpec::range(0..self.chunks[axis][block])
                });
            let task = if whole {
                Task::Alias(self.key(input))
            } else {
                Task::call(
                    &get,
                    vec![
                        TaskArg::Key(self.key(input)),
                        TaskArg::Value(Value::Selection(Selection::new(specs))),
                    ],
                )
            };
            tasks.insert(GraphKey::new(name.clone(), coordinates), task);
        }
        Ok(Self::derive(name, tasks, &[self], chunks, self.data_type))
    }

    /// Select `indices` along `axis`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `axis` is out of range or an index is out of bounds.
    pub fn take(&self, indices: &[isize], axis: isize) -> Result<Self, ArrayError> {
        let axis = normalize_axis(axis, self.ndim())?;
        let mut index = vec![Index::full(); axis];
        index.push(Index::Array(indices.to_vec()));
        self.get(&index)
    }

    /// Remove the axes of extent one.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the graph cannot be built.
    pub fn squeeze(&self) -> Result<Self, ArrayError> {
        let index: Vec<Index> = self
            .shape()
            .iter()
            .map(|&size| if size == 1 { Index::Int(0) } else { Index::full() })
            .collect();
        self.get(&index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        array::ErrorKind,
        block::Block,
        chunks::ChunksArg,
        config::ComputeConfig,
    };

    fn arange(shape: &[usize], chunks: impl Into<ChunksArg>) -> Array {
        let n: usize = shape.iter().product();
        Array::from_block(Block::from_vec(shape, (0..n as i64).collect()).unwrap(), chunks).unwrap()
    }

    fn values(array: &Array) -> Vec<i64> {
        array
            .compute(&ComputeConfig::synchronous())
            .unwrap()
            .as_array::<i64>()
            .unwrap()
            .iter()
            .copied()
            .collect()
    }

    #[test]
    fn plan_slice_parts() {
        assert_eq!(
            plan_slice(&[4, 4, 2], 1, 9, 3),
            vec![
                (0, SliceSpec::Range { start: 1, stop: Some(4), step: 3 }, 1),
                (1, SliceSpec::Range { start: 0, stop: Some(4), step: 3 }, 2),
            ]
        );
        assert_eq!(plan_slice(&[4, 4], 3, 3, 1), vec![(0, SliceSpec::range(0..0), 0)]);
    }

    #[test]
    fn get_slices() {
        let x = arange(&[10], 4);
        let y = x.get(&[Index::slice(Some(1), Some(9), 3)]).unwrap();
        assert_eq!(y.chunks().as_slice(), &[vec![1, 2]]);
        assert_eq!(values(&y), vec![1, 4, 7]);

        let y = x.get(&[Index::range(-3, 100)]).unwrap();
        assert_eq!(values(&y), vec![7, 8, 9]);
        assert_eq!(y.chunks().as_slice(), &[vec![1, 2]]);

        let empty = x.get(&[Index::range(5, 2)]).unwrap();
        assert_eq!(empty.shape(), vec![0]);
        assert!(values(&empty).is_empty());

        assert_eq!(x.get(&[Index::full()]).unwrap().name(), x.name());
        assert_eq!(x.get(&[(..).into()]).unwrap().name(), x.name());
    }

    #[test]
    fn get_integers_and_new_axes() {
        let x = arange(&[4, 6], [2, 3]);
        let row = x.get(&[Index::Int(-1)]).unwrap();
        assert_eq!(row.shape(), vec![6]);
        assert_eq!(values(&row), vec![18, 19, 20, 21, 22, 23]);

        let element = x.get(&[Index::Int(2), Index::Int(4)]).unwrap();
        assert_eq!(element.ndim(), 0);
        assert_eq!(values(&element), vec![16]);

        let expanded = x.get(&[Index::NewAxis, Index::Ellipsis, Index::NewAxis]).unwrap();
        assert_eq!(expanded.shape(), vec![1, 4, 6, 1]);
        assert_eq!(expanded.chunks().as_slice(), &[vec![1], vec![2, 2], vec![3, 3], vec![1]]);
        assert_eq!(values(&expanded), values(&x));

        let last = x.get(&[Index::Ellipsis, Index::Int(0)]).unwrap();
        assert_eq!(values(&last), vec![0, 6, 12, 18]);
    }

    #[test]
    fn get_aliases_whole_blocks() {
        let x = arange(&[4, 6], [2, 3]);
        let y = x.get(&[Index::range(2, 4)]).unwrap();
        let layer = y.graph().layer(y.name()).unwrap();
        assert_eq!(layer[&y.key(vec![0, 1])], Task::Alias(x.key(vec![1, 1])));
    }

    #[test]
    fn get_lists_and_masks() {
        let x = arange(&[6], 2);
        let y = x.get(&[Index::Array(vec![5, 0, 1, -1])]).unwrap();
        assert_eq!(y.chunks().as_slice(), &[vec![1, 2, 1]]);
        assert_eq!(values(&y), vec![5, 0, 1, 5]);

        let z = x.get(&[Index::Mask(vec![true, false, false, true, true, false])]).unwrap();
        assert_eq!(values(&z), vec![0, 3, 4]);

        let t = arange(&[3, 4], 2).take(&[3, 0], 1).unwrap();
        assert_eq!(t.shape(), vec![3, 2]);
        assert_eq!(values(&t), vec![3, 0, 7, 4, 11, 8]);

        let empty = x.take(&[], 0).unwrap();
        assert_eq!(empty.shape(), vec![0]);
    }

    #[test]
    fn squeeze_removes_unit_axes() {
        let x = arange(&[1, 3, 1], 1);
        let y = x.squeeze().unwrap();
        assert_eq!(y.shape(), vec![3]);
        assert_eq!(values(&y), vec![0, 1, 2]);
    }

    #[test]
    fn get_errors() {
        let x = arange(&[4, 6], [2, 3]);
        let err = x.get(&[Index::Int(4)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
        assert!(matches!(
            x.get(&[Index::Int(0), Index::Int(0), Index::Int(0)]),
            Err(ArrayError::InvalidIndex(_))
        ));
        assert!(matches!(
            x.get(&[Index::Ellipsis, Index::Ellipsis]),
            Err(ArrayError::InvalidIndex(_))
        ));
        assert!(matches!(
            x.get(&[Index::slice(None, None, 0)]),
            Err(ArrayError::InvalidArgument(_))
        ));
        assert_eq!(
            x.get(&[Index::slice(None, None, -1)]).unwrap_err().kind(),
            ErrorKind::NotImplemented
        );
        assert_eq!(
            x.get(&[Index::Array(vec![0]), Index::Array(vec![1])]).unwrap_err().kind(),
            ErrorKind::NotImplemented
        );
        assert_eq!(
            x.get(&[Index::Mask(vec![true])]).unwrap_err().kind(),
            ErrorKind::Index
        );
        assert_eq!(
            x.take(&[6], 1).unwrap_err().kind(),
            ErrorKind::Index
        );
    }
}
