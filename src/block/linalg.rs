use itertools::Itertools;
use ndarray::{Array2, ArrayD, IxDyn};

use super::{Block, BlockError, DataType};

fn validate_axes(block: &Block, axes: &[usize]) -> Result<(), BlockError> {
    if let Some(&axis) = axes.iter().find(|&&axis| axis >= block.ndim()) {
        return Err(BlockError::InvalidAxis {
            axis,
            ndim: block.ndim(),
        });
    }
    if !axes.iter().all_unique() {
        return Err(BlockError::InvalidSelection {
            selection: format!("tensordot axes {axes:?}"),
            shape: block.shape().to_vec(),
        });
    }
    Ok(())
}

/// Contract `lhs` and `rhs` over the paired axes `lhs_axes` and `rhs_axes`.
///
/// The result has the free axes of `lhs` followed by the free axes of `rhs`.
/// Boolean blocks are contracted as `int64`.
///
/// # Errors
/// Returns a [`BlockError`] if the axes are invalid or the contracted axes have different sizes.
pub fn tensordot(
    lhs: &Block,
    rhs: &Block,
    lhs_axes: &[usize],
    rhs_axes: &[usize],
) -> Result<Block, BlockError> {
    validate_axes(lhs, lhs_axes)?;
    validate_axes(rhs, rhs_axes)?;
    let contracted: Vec<usize> = lhs_axes.iter().map(|&axis| lhs.shape()[axis]).collect();
    let rhs_contracted: Vec<usize> = rhs_axes.iter().map(|&axis| rhs.shape()[axis]).collect();
    if contracted != rhs_contracted {
        return Err(BlockError::IncompatibleShapes(
            lhs.shape().to_vec(),
            rhs.shape().to_vec(),
        ));
    }

    let lhs_free: Vec<usize> = (0..lhs.ndim()).filter(|axis| !lhs_axes.contains(axis)).collect();
    let rhs_free: Vec<usize> = (0..rhs.ndim()).filter(|axis| !rhs_axes.contains(axis)).collect();
    let lhs_permutation: Vec<usize> = lhs_free.iter().chain(lhs_axes).copied().collect();
    let rhs_permutation: Vec<usize> = rhs_axes.iter().chain(&rhs_free).copied().collect();
    let m: usize = lhs_free.iter().map(|&axis| lhs.shape()[axis]).product();
    let k: usize = contracted.iter().product();
    let n: usize = rhs_free.iter().map(|&axis| rhs.shape()[axis]).product();
    let output_shape: Vec<usize> = lhs_free
        .iter()
        .map(|&axis| lhs.shape()[axis])
        .chain(rhs_free.iter().map(|&axis| rhs.shape()[axis]))
        .collect();

    let data_type = match lhs.data_type().promote(rhs.data_type()) {
        DataType::Bool => DataType::Int64,
        data_type => data_type,
    };
    with_numeric_type!(data_type, T => {
        let lhs = lhs.cast_cow::<T>();
        let rhs = rhs.cast_cow::<T>();
        let lhs = lhs.view().permuted_axes(lhs_permutation);
        let rhs = rhs.view().permuted_axes(rhs_permutation);
        let lhs = Array2::from_shape_vec((m, k), lhs.iter().copied().collect())?;
        let rhs = Array2::from_shape_vec((k, n), rhs.iter().copied().collect())?;
        let product = lhs.dot(&rhs);
        Ok(Block::from(ArrayD::from_shape_vec(
            IxDyn(&output_shape),
            product.into_iter().collect(),
        )?))
    }, bool => Err(BlockError::UnsupportedDataType {
        operation: "tensordot".to_string(),
        data_type,
    }))
}
