use std::sync::Arc;

use super::{elemwise, normalize_axis, Array, ArrayError, ElemwiseOptions, Operand};
use crate::{
    block::UnaryOp,
    graph::Operation,
    operations::{Choose, IsClose, Where},
};

/// Take elements from `x` where `condition` is true and from `y` elsewhere.
///
/// The three operands are broadcast against each other like the operands of [`elemwise`]. The result has the
/// promoted data type of `x` and `y`.
///
/// # Errors
/// Returns an [`ArrayError`] if the operand shapes cannot be broadcast together.
pub fn where_<'a>(
    condition: impl Into<Operand<'a>>,
    x: impl Into<Operand<'a>>,
    y: impl Into<Operand<'a>>,
) -> Result<Array, ArrayError> {
    let operation: Operation = Arc::new(Where);
    elemwise(
        &operation,
        &[condition.into(), x.into(), y.into()],
        &ElemwiseOptions::new(),
    )
}

/// Construct an array from `choices`, taking each element from the choice selected by `index`.
///
/// A boolean index selects between two choices. The index and the choices are broadcast against each other.
///
/// # Errors
/// Returns an [`ArrayError`] if `choices` is empty or the operand shapes cannot be broadcast together.
pub fn choose<'a>(
    index: impl Into<Operand<'a>>,
    choices: &[Operand<'a>],
) -> Result<Array, ArrayError> {
    if choices.is_empty() {
        return Err(ArrayError::InvalidArgument(
            "choose needs at least one choice".to_string(),
        ));
    }
    let mut operands = vec![index.into()];
    operands.extend_from_slice(choices);
    let operation: Operation = Arc::new(Choose);
    elemwise(&operation, &operands, &ElemwiseOptions::new())
}

/// Test elements for equality within a tolerance, `|a - b| <= atol + rtol * |b|`.
///
/// NaNs compare equal to each other only if `equal_nan` is set.
///
/// # Errors
/// Returns an [`ArrayError`] if the operand shapes cannot be broadcast together.
pub fn isclose<'a>(
    a: impl Into<Operand<'a>>,
    b: impl Into<Operand<'a>>,
    rtol: f64,
    atol: f64,
    equal_nan: bool,
) -> Result<Array, ArrayError> {
    let operation: Operation = Arc::new(IsClose {
        rtol,
        atol,
        equal_nan,
    });
    elemwise(&operation, &[a.into(), b.into()], &ElemwiseOptions::new())
}

/// Select the slices of `array` along `axis` where `condition` is true.
///
/// A `condition` shorter than the axis is treated as false for the remaining slices.
///
/// # Errors
/// Returns an [`ArrayError`] if
///  - `axis` is [`None`], which is not supported,
///  - `axis` is out of range, or
///  - `condition` is longer than the axis.
pub fn compress(condition: &[bool], array: &Array, axis: Option<isize>) -> Result<Array, ArrayError> {
    let Some(axis) = axis else {
        return Err(ArrayError::Unsupported(
            "compress of the flattened array, pass an axis".to_string(),
        ));
    };
    let axis_index = normalize_axis(axis, array.ndim())?;
    let size = array.shape()[axis_index];
    if condition.len() > size {
        return Err(ArrayError::IndexOutOfBounds {
            index: isize::try_from(condition.len() - 1).unwrap_or(isize::MAX),
            axis: axis_index,
            size,
        });
    }
    let indices: Vec<isize> = condition
        .iter()
        .enumerate()
        .filter(|(_, &keep)| keep)
        .map(|(index, _)| isize::try_from(index).unwrap_or(isize::MAX))
        .collect();
    array.take(&indices, axis)
}

impl Array {
    /// Elementwise test for missing (NaN) values.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the graph cannot be built.
    pub fn isnull(&self) -> Result<Self, ArrayError> {
        let operation: Operation = Arc::new(UnaryOp::IsNan);
        elemwise(&operation, &[self.into()], &ElemwiseOptions::new())
    }

    /// Elementwise test for values that are not missing.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the graph cannot be built.
    pub fn notnull(&self) -> Result<Self, ArrayError> {
        self.isnull()?.logical_not()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        array::{ufunc, ErrorKind, Index},
        block::{Block, DataType},
        chunks::ChunksArg,
        config::ComputeConfig,
    };

    fn from_vec(shape: &[usize], values: Vec<i64>, chunks: impl Into<ChunksArg>) -> (Block, Array) {
        let block = Block::from_vec(shape, values).unwrap();
        let array = Array::from_block(block.clone(), chunks).unwrap();
        (block, array)
    }

    fn compute(array: &Array) -> Block {
        array.compute(&ComputeConfig::synchronous()).unwrap()
    }

    fn digits(n: usize) -> Vec<i64> {
        (0..n as i64).map(|i| (i * 7 + 3) % 10).collect()
    }

    #[test]
    fn where_selects() {
        let (x, d) = from_vec(&[15, 16], digits(240), [4, 5]);
        let (y, e) = from_vec(&[15], digits(15).into_iter().rev().collect(), 4);
        let mask = d.greater(5i64).unwrap();

        let kept = where_(&mask, &d, 0i64).unwrap();
        assert_eq!(kept.chunks(), d.chunks());
        assert_eq!(kept.data_type(), DataType::Int64);
        let expected: Vec<i64> = digits(240).into_iter().map(|v| if v > 5 { v } else { 0 }).collect();
        assert_eq!(compute(&kept), Block::from_vec(&[15, 16], expected).unwrap());

        let column = (-&e.get(&[Index::full(), Index::NewAxis]).unwrap()).unwrap();
        let mixed = where_(&mask, &d, &column).unwrap();
        let x = x.as_array::<i64>().unwrap();
        let y = y.as_array::<i64>().unwrap();
        let expected: Vec<i64> = x
            .indexed_iter()
            .map(|(position, &v)| if v > 5 { v } else { -y[[position[0]]] })
            .collect();
        assert_eq!(compute(&mixed), Block::from_vec(&[15, 16], expected).unwrap());
    }

    #[test]
    fn where_needs_three_operands() {
        let x = Array::from_block(Block::from_vec(&[5], vec![1.0f64; 5]).unwrap(), 3).unwrap();
        let mask = x.greater(0i64).unwrap();
        let err = ufunc("where", &[(&mask).into()], &[]).unwrap_err();
        assert!(matches!(err, ArrayError::OperandCount { expected: 3, got: 1, .. }));
        assert!(err.to_string().contains("where"));
        let y = ufunc("where", &[(&mask).into(), (&x).into(), 2.0f64.into()], &[]).unwrap();
        assert_eq!(compute(&y), Block::from_vec(&[5], vec![1.0f64; 5]).unwrap());
    }

    #[test]
    fn choose_between_arrays() {
        let (_, d) = from_vec(&[15, 16], digits(240), [4, 5]);
        let mask = d.greater(5i64).unwrap();
        let zeroed = choose(&mask, &[0i64.into(), (&d).into()]).unwrap();
        assert_eq!(compute(&zeroed), compute(&where_(&mask, &d, 0i64).unwrap()));

        let negated = (-&d).unwrap();
        let absolute = choose(&mask, &[(&negated).into(), (&d).into()]).unwrap();
        let expected: Vec<i64> = digits(240).into_iter().map(|v| if v > 5 { v } else { -v }).collect();
        assert_eq!(compute(&absolute), Block::from_vec(&[15, 16], expected).unwrap());
        assert!(choose(&mask, &[]).is_err());
    }

    #[test]
    fn isclose_and_isnull() {
        let x = Block::from_vec(&[4], vec![0.0f64, f64::NAN, 1.0, 1.5]).unwrap();
        let y = Block::from_vec(&[4], vec![1e-9f64, f64::NAN, 1.0, 2.0]).unwrap();
        let a = Array::from_block(x, 2).unwrap();
        let b = Array::from_block(y, 2).unwrap();
        let close = isclose(&a, &b, 1e-5, 1e-8, true).unwrap();
        assert_eq!(close.data_type(), DataType::Bool);
        assert_eq!(
            compute(&close),
            Block::from_vec(&[4], vec![true, true, true, false]).unwrap()
        );
        assert_eq!(
            compute(&isclose(&a, &b, 1e-5, 1e-8, false).unwrap()),
            Block::from_vec(&[4], vec![true, false, true, false]).unwrap()
        );
        assert_ne!(
            isclose(&a, &b, 1e-5, 1e-8, true).unwrap().name(),
            isclose(&a, &b, 1e-3, 1e-8, true).unwrap().name()
        );

        let c = Array::from_block(Block::from_vec(&[2], vec![1.0f64, f64::NAN]).unwrap(), 2).unwrap();
        assert_eq!(
            compute(&c.isnull().unwrap()),
            Block::from_vec(&[2], vec![false, true]).unwrap()
        );
        assert_eq!(
            compute(&c.notnull().unwrap()),
            Block::from_vec(&[2], vec![true, false]).unwrap()
        );
    }

    #[test]
    fn compress_axis() {
        let (_, a) = from_vec(&[5, 5], (0..25).collect(), [2, 2]);
        let rows = compress(&[true, false, true, false, true], &a, Some(0)).unwrap();
        assert_eq!(rows.shape(), vec![3, 5]);
        let expected: Vec<i64> = [0, 2, 4].iter().flat_map(|row| (0..5).map(move |c| row * 5 + c)).collect();
        assert_eq!(compute(&rows), Block::from_vec(&[3, 5], expected).unwrap());

        let columns = compress(&[true, false, true, false, true], &a, Some(1)).unwrap();
        let expected: Vec<i64> = (0..5).flat_map(|r| [0, 2, 4].map(|c| r * 5 + c)).collect();
        assert_eq!(compute(&columns), Block::from_vec(&[5, 3], expected).unwrap());

        let first = compress(&[true, false], &a, Some(1)).unwrap();
        let expected: Vec<i64> = (0..5).map(|r| r * 5).collect();
        assert_eq!(compute(&first), Block::from_vec(&[5, 1], expected).unwrap());

        assert_eq!(
            compress(&[true, false], &a, None).unwrap_err().kind(),
            ErrorKind::NotImplemented
        );
        assert_eq!(
            compress(&[true, false], &a, Some(100)).unwrap_err().kind(),
            ErrorKind::Value
        );
        assert!(compress(&[true; 6], &a, Some(0)).is_err());
    }
}
