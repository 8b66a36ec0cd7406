use std::{collections::HashMap, sync::Arc};

use itertools::Itertools;

use super::{labels, normalize_axis, Array, ArrayError};
use crate::{
    block::{self, Block},
    chunks::{common_refinement, ChunkSpec},
    graph::Operation,
    operations::TensorDotMany,
    tokenize::name_for,
    top::{top, TopArg},
};

/// The axes contracted by [`tensordot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TensorDotAxes {
    /// The last `n` axes of the left operand with the first `n` axes of the right operand.
    Count(usize),
    /// Pairs of left and right axes, which may be negative.
    Pairs(Vec<isize>, Vec<isize>),
}

impl From<usize> for TensorDotAxes {
    fn from(count: usize) -> Self {
        Self::Count(count)
    }
}

impl From<(isize, isize)> for TensorDotAxes {
    fn from((lhs, rhs): (isize, isize)) -> Self {
        Self::Pairs(vec![lhs], vec![rhs])
    }
}

impl From<(Vec<isize>, Vec<isize>)> for TensorDotAxes {
    fn from((lhs, rhs): (Vec<isize>, Vec<isize>)) -> Self {
        Self::Pairs(lhs, rhs)
    }
}

impl TensorDotAxes {
    /// Resolve the axes against operands with `lhs_ndim` and `rhs_ndim` dimensions.
    fn resolve(&self, lhs_ndim: usize, rhs_ndim: usize) -> Result<(Vec<usize>, Vec<usize>), ArrayError> {
        let (lhs, rhs) = match self {
            Self::Count(count) => {
                if *count > lhs_ndim || *count > rhs_ndim {
                    return Err(ArrayError::InvalidArgument(format!(
                        "cannot contract {count} axes of arrays with {lhs_ndim} and {rhs_ndim} dimensions"
                    )));
                }
                ((lhs_ndim - count..lhs_ndim).collect(), (0..*count).collect())
            }
            Self::Pairs(lhs, rhs) => {
                if lhs.len() != rhs.len() {
                    return Err(ArrayError::InvalidArgument(format!(
                        "tensordot axes {lhs:?} and {rhs:?} have different lengths"
                    )));
                }
                let lhs: Vec<usize> = lhs
                    .iter()
                    .map(|&axis| normalize_axis(axis, lhs_ndim))
                    .collect::<Result<_, _>>()?;
                let rhs: Vec<usize> = rhs
                    .iter()
                    .map(|&axis| normalize_axis(axis, rhs_ndim))
                    .collect::<Result<_, _>>()?;
                (lhs, rhs)
            }
        };
        if !lhs.iter().all_unique() || !rhs.iter().all_unique() {
            return Err(ArrayError::InvalidArgument(format!(
                "repeated tensordot axes {lhs:?} and {rhs:?}"
            )));
        }
        Ok((lhs, rhs))
    }
}

/// Contract `a` and `b` over pairs of axes.
///
/// The output has the free axes of `a` followed by the free axes of `b`. The right operand reuses the labels of the
/// left operand on contracted axes, so every output block receives the lists of blocks along them and sums their
/// products. Contracted axes with different chunks are rechunked to their common refinement.
///
/// # Errors
/// Returns an [`ArrayError`] if
///  - the axes are invalid or repeated, or
///  - the extents of a pair of contracted axes differ.
pub fn tensordot(
    a: &Array,
    b: &Array,
    axes: impl Into<TensorDotAxes>,
) -> Result<Array, ArrayError> {
    let (lhs_axes, rhs_axes) = axes.into().resolve(a.ndim(), b.ndim())?;
    let (a_shape, b_shape) = (a.shape(), b.shape());
    if lhs_axes
        .iter()
        .zip(&rhs_axes)
        .any(|(&lhs, &rhs)| a_shape[lhs] != b_shape[rhs])
    {
        return Err(ArrayError::IncompatibleShapes(vec![a_shape, b_shape]));
    }

    let mut a_chunks = a.chunks().as_slice().to_vec();
    let mut b_chunks = b.chunks().as_slice().to_vec();
    for (&lhs, &rhs) in lhs_axes.iter().zip(&rhs_axes) {
        if a_chunks[lhs] != b_chunks[rhs] {
            let refined = common_refinement(&a_chunks[lhs], &b_chunks[rhs]);
            a_chunks[lhs].clone_from(&refined);
            b_chunks[rhs] = refined;
        }
    }
    let a = a.rechunk(ChunkSpec::new_unchecked(a_chunks))?;
    let b = b.rechunk(ChunkSpec::new_unchecked(b_chunks))?;

    let data_type = block::tensordot(
        &Block::empty(a.data_type(), a.ndim()),
        &Block::empty(b.data_type(), b.ndim()),
        &lhs_axes,
        &rhs_axes,
    )
    .map_err(|source| ArrayError::DataTypeInference {
        operation: "tensordot".to_string(),
        source,
    })?
    .data_type();

    let all_labels = labels(a.ndim() + b.ndim());
    let a_labels = all_labels[..a.ndim()].to_vec();
    let mut free_labels = all_labels[a.ndim()..].iter();
    let b_labels: Vec<char> = (0..b.ndim())
        .map(|axis| match rhs_axes.iter().position(|&rhs| rhs == axis) {
            Some(pair) => a_labels[lhs_axes[pair]],
            None => free_labels.next().copied().unwrap_or(char::REPLACEMENT_CHARACTER),
        })
        .collect();
    let a_free: Vec<usize> = (0..a.ndim()).filter(|axis| !lhs_axes.contains(axis)).collect();
    let b_free: Vec<usize> = (0..b.ndim()).filter(|axis| !rhs_axes.contains(axis)).collect();
    let out_labels: Vec<char> = a_free
        .iter()
        .map(|&axis| a_labels[axis])
        .chain(b_free.iter().map(|&axis| b_labels[axis]))
        .collect();
    let chunks = ChunkSpec::new_unchecked(
        a_free
            .iter()
            .map(|&axis| a.chunks()[axis].clone())
            .chain(b_free.iter().map(|&axis| b.chunks()[axis].clone()))
            .collect(),
    );

    // Nesting levels follow the contracted axes in increasing order.
    let lhs_sorted: Vec<usize> = lhs_axes.iter().copied().sorted().collect();
    let rhs_order: Vec<usize> = rhs_axes
        .iter()
        .zip(&lhs_axes)
        .sorted_by_key(|pair| *pair.0)
        .map(|(_, lhs)| lhs_sorted.iter().position(|axis| axis == lhs).unwrap_or(0))
        .collect();

    let name = name_for("tensordot", &[&a.name(), &b.name(), &lhs_axes, &rhs_axes]);
    let operation: Operation = Arc::new(TensorDotMany {
        lhs_axes,
        rhs_axes,
        rhs_order,
    });
    let numblocks = HashMap::from([
        (a.name().to_string(), a.numblocks()),
        (b.name().to_string(), b.numblocks()),
    ]);
    let tasks = top(
        &operation,
        &name,
        &out_labels,
        &[TopArg::array(a.name(), &a_labels), TopArg::array(b.name(), &b_labels)],
        &numblocks,
    )?;
    Ok(Array::derive(name, tasks, &[&a, &b], chunks, data_type))
}

/// The dot product of `a` and `b`.
///
/// Zero-dimensional operands are multiplied. Otherwise the last axis of `a` is contracted with the second to last
/// axis of `b`, or its only axis if `b` is one-dimensional.
///
/// # Errors
/// Returns an [`ArrayError`] if the contracted axes have different extents.
pub fn dot(a: &Array, b: &Array) -> Result<Array, ArrayError> {
    if a.ndim() == 0 || b.ndim() == 0 {
        return a * b;
    }
    let rhs_axis = if b.ndim() == 1 { -1 } else { -2 };
    tensordot(a, b, TensorDotAxes::Pairs(vec![-1], vec![rhs_axis]))
}

impl Array {
    /// The dot product with `other`. See [`dot`].
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the contracted axes have different extents.
    pub fn dot(&self, other: &Self) -> Result<Self, ArrayError> {
        dot(self, other)
    }
}
