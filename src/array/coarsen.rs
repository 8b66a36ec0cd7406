use std::{collections::HashMap, sync::Arc};

use super::{normalize_axis, Array, ArrayError};
use crate::{
    block::ReductionOp,
    chunks::ChunkSpec,
    graph::Operation,
    operations::Coarsen,
    tokenize::name_for,
    top::{top, TopArg},
};

/// Reduce non-overlapping groups of neighbouring elements.
///
/// `factors` maps axes to the number of consecutive elements along them that form a group. Axes without a factor are
/// not coarsened. Every block is coarsened independently, so each chunk along an axis must be divisible by its factor.
/// With `trim_excess`, the trailing elements of each block that do not fill a group are dropped instead.
///
/// # Errors
/// Returns an [`ArrayError`] if
///  - an axis is out of range or a factor is zero, or
///  - a chunk is not divisible by its factor and `trim_excess` is not set.
pub fn coarsen(
    op: ReductionOp,
    array: &Array,
    factors: &[(isize, usize)],
    trim_excess: bool,
) -> Result<Array, ArrayError> {
    let mut axis_factors = vec![1; array.ndim()];
    for &(axis, factor) in factors {
        let axis = normalize_axis(axis, array.ndim())?;
        if factor == 0 {
            return Err(ArrayError::InvalidArgument(format!(
                "coarsening factor of axis {axis} must be positive"
            )));
        }
        axis_factors[axis] = factor;
    }

    let chunks = array
        .chunks()
        .iter()
        .zip(&axis_factors)
        .enumerate()
        .map(|(axis, (chunks, &factor))| {
            chunks
                .iter()
                .map(|&chunk| {
                    if trim_excess || chunk % factor == 0 {
                        Ok(chunk / factor)
                    } else {
                        Err(ArrayError::IncompatibleChunks(format!(
                            "coarsening factor {factor} does not divide the chunks {chunks:?} of axis {axis}"
                        )))
                    }
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let name = name_for(
        "coarsen",
        &[&array.name(), &op.name(), &axis_factors, &trim_excess],
    );
    let operation: Operation = Arc::new(Coarsen {
        op,
        factors: axis_factors,
        trim_excess,
    });
    let labels = array.labels();
    let numblocks = HashMap::from([(array.name().to_string(), array.numblocks())]);
    let tasks = top(
        &operation,
        &name,
        &labels,
        &[TopArg::array(array.name(), &labels)],
        &numblocks,
    )?;
    Ok(Array::derive(
        name,
        tasks,
        &[array],
        ChunkSpec::new_unchecked(chunks),
        op.result_type(array.data_type()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        array::{arange, ErrorKind},
        block::{Block, DataType},
        config::ComputeConfig,
    };

    fn compute(array: &Array) -> Block {
        array.compute(&ComputeConfig::synchronous()).unwrap()
    }

    #[test]
    fn coarsen_blocks() {
        let values: Vec<i64> = (0..576).map(|i| (i * 13 + 5) % 10).collect();
        let x = Block::from_vec(&[24, 24], values).unwrap();
        let d = Array::from_block(x.clone(), [4, 8]).unwrap();
        let summed = coarsen(ReductionOp::Sum, &d, &[(0, 2), (1, 4)], false).unwrap();
        assert_eq!(summed.shape(), vec![12, 6]);
        assert_eq!(summed.chunks().as_slice(), &[vec![2; 6], vec![2; 3]]);
        assert_eq!(summed.data_type(), DataType::Int64);
        assert_eq!(
            compute(&summed),
            ReductionOp::Sum.coarsen(&x, &[2, 4], false).unwrap()
        );
        assert_eq!(
            summed.name(),
            coarsen(ReductionOp::Sum, &d, &[(-1, 4), (0, 2)], false).unwrap().name()
        );

        let err = coarsen(ReductionOp::Sum, &d, &[(0, 3)], false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
        assert!(coarsen(ReductionOp::Sum, &d, &[(2, 2)], false).is_err());
        assert!(coarsen(ReductionOp::Sum, &d, &[(0, 0)], false).is_err());
    }

    #[test]
    fn coarsen_trim_excess() {
        let x = arange(10, 5).unwrap();
        let min = coarsen(ReductionOp::Min, &x, &[(0, 3)], true).unwrap();
        assert_eq!(min.chunks().as_slice(), &[vec![1, 1]]);
        assert_eq!(compute(&min), Block::from_vec(&[2], vec![0i64, 5]).unwrap());
        let sum = coarsen(ReductionOp::Sum, &x, &[(0, 3)], true).unwrap();
        assert_eq!(
            compute(&sum),
            Block::from_vec(&[2], vec![3i64, 18]).unwrap()
        );
    }
}
