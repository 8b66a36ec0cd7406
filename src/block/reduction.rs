use ndarray::{ArrayD, Axis, IxDyn};
use num::{One, Zero};

use super::element::{maximum, minimum};
use super::ufunc::BlockOperand;
use super::{BinaryOp, Block, BlockError, DataType, Numeric, Scalar, Selection};

/// A reduction over the elements of one or more blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReductionOp {
    /// The sum. Integers and booleans accumulate as `int64`.
    Sum,
    /// The product. Integers and booleans accumulate as `int64`.
    Prod,
    /// The minimum, propagating NaN.
    Min,
    /// The maximum, propagating NaN.
    Max,
    /// The arithmetic mean.
    Mean,
}

impl ReductionOp {
    /// The name of the reduction.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Prod => "prod",
            Self::Min => "min",
            Self::Max => "max",
            Self::Mean => "mean",
        }
    }

    /// The data type of the result of reducing elements of `data_type`.
    #[must_use]
    pub const fn result_type(self, data_type: DataType) -> DataType {
        match self {
            Self::Sum | Self::Prod => data_type.accumulator_type(),
            Self::Min | Self::Max => data_type,
            Self::Mean => data_type.float_type(),
        }
    }

    /// Reduce a single block, either fully (to a zero-dimensional block) or along `axis`.
    ///
    /// # Errors
    /// Returns a [`BlockError`] if `axis` is out of range or the reduction has no identity
    /// and the block is empty.
    pub fn reduce(self, block: &Block, axis: Option<usize>) -> Result<Block, BlockError> {
        self.reduce_many(&[block], axis)
    }

    /// Reduce a sequence of blocks as if they were concatenated along `axis`
    /// (or, with no axis, as if every element belonged to one block).
    ///
    /// # Errors
    /// Returns a [`BlockError`] if `blocks` is empty, `axis` is out of range, or
    /// the reduction has no identity and the blocks are empty.
    pub fn reduce_many(self, blocks: &[&Block], axis: Option<usize>) -> Result<Block, BlockError> {
        if let Some(axis) = axis {
            if let Some(block) = blocks.iter().find(|block| axis >= block.ndim()) {
                return Err(BlockError::InvalidAxis {
                    axis,
                    ndim: block.ndim(),
                });
            }
        }
        if self == Self::Mean {
            let count: usize = blocks
                .iter()
                .map(|block| axis.map_or(block.num_elements(), |axis| block.shape()[axis]))
                .sum();
            let data_type = DataType::promote_all(blocks.iter().map(|block| block.data_type()))
                .map_or(DataType::Float64, DataType::float_type);
            let as_float: Vec<Block> = blocks.iter().map(|block| block.astype(data_type)).collect();
            let as_float: Vec<&Block> = as_float.iter().collect();
            let total = Self::Sum.reduce_many(&as_float, axis)?;
            let count = i64::try_from(count).map_err(|err| BlockError::Other(err.to_string()))?;
            return BinaryOp::Divide.apply(
                BlockOperand::Block(&total),
                BlockOperand::Scalar(Scalar::Int(count)),
            );
        }

        let combine = match self {
            Self::Sum => BinaryOp::Add,
            Self::Prod => BinaryOp::Multiply,
            Self::Min => BinaryOp::Minimum,
            _ => BinaryOp::Maximum,
        };
        let mut partials = blocks.iter().map(|block| self.reduce_one(block, axis));
        let first = partials
            .next()
            .ok_or_else(|| BlockError::Shape(format!("{} of zero blocks", self.name())))??;
        partials.try_fold(first, |accumulated, partial| {
            combine.apply(BlockOperand::Block(&accumulated), BlockOperand::Block(&partial?))
        })
    }

    /// Reduce non-overlapping groups of `factors[axis]` consecutive elements along every axis.
    ///
    /// An axis of extent `n` becomes an axis of extent `n / factor`. With `trim_excess`, trailing elements that do not
    /// fill a group are dropped; otherwise every extent must be divisible by its factor.
    ///
    /// # Errors
    /// Returns a [`BlockError`] if there is not one positive factor per axis or an extent is not divisible by its
    /// factor.
    pub fn coarsen(
        self,
        block: &Block,
        factors: &[usize],
        trim_excess: bool,
    ) -> Result<Block, BlockError> {
        if factors.len() != block.ndim() {
            return Err(BlockError::Shape(format!(
                "{} coarsening factors for a block with {} dimensions",
                factors.len(),
                block.ndim()
            )));
        }
        let mut region = Vec::with_capacity(factors.len());
        let mut grouped = Vec::with_capacity(factors.len() * 2);
        for (axis, (&extent, &factor)) in block.shape().iter().zip(factors).enumerate() {
            if factor == 0 {
                return Err(BlockError::Shape(format!(
                    "coarsening factor of axis {axis} must be positive"
                )));
            }
            if extent % factor != 0 && !trim_excess {
                return Err(BlockError::Shape(format!(
                    "extent {extent} of axis {axis} is not divisible by coarsening factor {factor}"
                )));
            }
            region.push(0..extent / factor * factor);
            grouped.extend([extent / factor, factor]);
        }
        let mut output = block
            .select(&Selection::from_ranges(&region))?
            .reshape(&grouped)?;
        for axis in (0..factors.len()).rev() {
            output = self.reduce(&output, Some(axis * 2 + 1))?;
        }
        Ok(output)
    }

    fn reduce_one(self, block: &Block, axis: Option<usize>) -> Result<Block, BlockError> {
        let data_type = self.result_type(block.data_type());
        match self {
            Self::Sum => with_numeric_type!(data_type, T => {
                Ok(fold(&block.cast_cow::<T>(), axis, T::zero(), Numeric::wrapping_add))
            }, bool => Err(self.unsupported(data_type))),
            Self::Prod => with_numeric_type!(data_type, T => {
                Ok(fold(&block.cast_cow::<T>(), axis, T::one(), Numeric::wrapping_mul))
            }, bool => Err(self.unsupported(data_type))),
            _ => {
                let extent = axis.map_or(block.num_elements(), |axis| block.shape()[axis]);
                if extent == 0 {
                    return Err(BlockError::EmptyReduction(self.name()));
                }
                with_block!(block, array => {
                    let pick = |x, y| if self == Self::Max { maximum(x, y) } else { minimum(x, y) };
                    Ok(match axis {
                        None => {
                            let value = array
                                .iter()
                                .copied()
                                .reduce(pick)
                                .ok_or(BlockError::EmptyReduction(self.name()))?;
                            Block::from(ArrayD::from_elem(IxDyn(&[]), value))
                        }
                        Some(axis) => Block::from(
                            array.map_axis(Axis(axis), |lane| lane.iter().copied().fold(lane[0], pick)),
                        ),
                    })
                })
            }
        }
    }

    fn unsupported(self, data_type: DataType) -> BlockError {
        BlockError::UnsupportedDataType {
            operation: self.name().to_string(),
            data_type,
        }
    }
}

fn fold<T: Numeric>(
    array: &ArrayD<T>,
    axis: Option<usize>,
    init: T,
    f: impl Fn(T, T) -> T,
) -> Block {
    match axis {
        None => Block::from(ArrayD::from_elem(
            IxDyn(&[]),
            array.iter().fold(init, |acc, &x| f(acc, x)),
        )),
        Some(axis) => Block::from(
            array.map_axis(Axis(axis), |lane| lane.iter().fold(init, |acc, &x| f(acc, x))),
        ),
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn reduce_full() {
        let a = Block::from(array![[1i32, 2], [3, 4]].into_dyn());
        let sum = ReductionOp::Sum.reduce(&a, None).unwrap();
        assert_eq!(sum.data_type(), DataType::Int64);
        assert_eq!(sum.to_scalar().unwrap(), Scalar::Int(10));
        assert_eq!(
            ReductionOp::Prod.reduce(&a, None).unwrap().to_scalar().unwrap(),
            Scalar::Int(24)
        );
        assert_eq!(
            ReductionOp::Max.reduce(&a, None).unwrap().to_scalar().unwrap(),
            Scalar::Int(4)
        );
        assert_eq!(
            ReductionOp::Mean.reduce(&a, None).unwrap().to_scalar().unwrap(),
            Scalar::Float(2.5)
        );
    }

    #[test]
    fn reduce_axis_many() {
        let a = Block::from(array![[1.0f64, 2.0], [3.0, 4.0]].into_dyn());
        let b = Block::from(array![[5.0f64, 6.0]].into_dyn());
        let sum = ReductionOp::Sum.reduce_many(&[&a, &b], Some(0)).unwrap();
        assert_eq!(sum.as_array::<f64>().unwrap(), &array![9.0, 12.0].into_dyn());
        let c = Block::from(array![[1.0f64, 2.0], [3.0, 4.0], [5.0, 6.0]].into_dyn());
        let min = ReductionOp::Min.reduce_many(&[&a, &c], Some(1)).unwrap_err();
        assert!(matches!(min, BlockError::IncompatibleShapes(..)));
        let mean = ReductionOp::Mean.reduce_many(&[&a, &b], Some(0)).unwrap();
        assert_eq!(mean.as_array::<f64>().unwrap(), &array![3.0, 4.0].into_dyn());
    }

    #[test]
    fn reduce_empty() {
        let empty = Block::empty(DataType::Float64, 1);
        assert_eq!(
            ReductionOp::Sum.reduce(&empty, None).unwrap().to_scalar().unwrap(),
            Scalar::Float(0.0)
        );
        assert!(matches!(
            ReductionOp::Max.reduce(&empty, None),
            Err(BlockError::EmptyReduction("max"))
        ));
        assert!(ReductionOp::Sum.reduce(&empty, Some(1)).is_err());
    }

    #[test]
    fn coarsen_groups() {
        let a = Block::from_vec(&[4, 6], (0..24i64).collect()).unwrap();
        let sum = ReductionOp::Sum.coarsen(&a, &[2, 3], false).unwrap();
        assert_eq!(
            sum.as_array::<i64>().unwrap(),
            &array![[24, 42], [96, 114]].into_dyn()
        );
        let max = ReductionOp::Max.coarsen(&a, &[4, 1], false).unwrap();
        assert_eq!(
            max.as_array::<i64>().unwrap(),
            &array![[18, 19, 20, 21, 22, 23]].into_dyn()
        );

        let b = Block::from_vec(&[5], (5..10i64).collect()).unwrap();
        assert!(ReductionOp::Sum.coarsen(&b, &[3], false).is_err());
        let trimmed = ReductionOp::Min.coarsen(&b, &[3], true).unwrap();
        assert_eq!(trimmed.as_array::<i64>().unwrap(), &array![5].into_dyn());
        let short = Block::from_vec(&[2], vec![1.0f64, 2.0]).unwrap();
        assert_eq!(
            ReductionOp::Mean.coarsen(&short, &[3], true).unwrap().shape(),
            &[0]
        );
        assert!(ReductionOp::Sum.coarsen(&b, &[0], true).is_err());
        assert!(ReductionOp::Sum.coarsen(&b, &[1, 1], true).is_err());
    }
}
