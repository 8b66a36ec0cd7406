use std::{collections::HashMap, sync::Arc};

use super::{normalize_axis, Array, ArrayError};
use crate::{
    block::ReductionOp,
    chunks::ChunkSpec,
    graph::Operation,
    operations::Reduction,
    tokenize::name_for,
    top::{top, TopArg},
};

impl Array {
    /// Reduce the array with `op`, over every element or along one axis.
    ///
    /// A full reduction is a single task receiving every block and produces a zero-dimensional array. A reduction along
    /// `axis` contracts that axis: each output block reduces the column of input blocks along it.
    ///
    /// # Errors
    /// Returns [`ArrayError::AxisOutOfRange`] if `axis` is out of range.
    pub fn reduce(&self, op: ReductionOp, axis: Option<isize>) -> Result<Self, ArrayError> {
        let axis = axis.map(|axis| normalize_axis(axis, self.ndim())).transpose()?;
        let labels = self.labels();
        let out_labels: Vec<char> = match axis {
            Some(axis) => labels
                .iter()
                .enumerate()
                .filter_map(|(index, label)| (index != axis).then_some(*label))
                .collect(),
            None => vec![],
        };
        let chunks = match axis {
            Some(axis) => {
                let mut chunks = self.chunks.as_slice().to_vec();
                chunks.remove(axis);
                ChunkSpec::new_unchecked(chunks)
            }
            None => ChunkSpec::new_unchecked(vec![]),
        };
        let name = name_for(op.name(), &[&self.name, &axis]);
        let operation: Operation = Arc::new(Reduction { op, axis });
        let numblocks = HashMap::from([(self.name.clone(), self.numblocks())]);
        let tasks = top(
            &operation,
            &name,
            &out_labels,
            &[TopArg::array(self.name.clone(), &labels)],
            &numblocks,
        )?;
        Ok(Self::derive(
            name,
            tasks,
            &[self],
            chunks,
            op.result_type(self.data_type),
        ))
    }

    /// The sum of the elements, over every element or along `axis`.
    ///
    /// # Errors
    /// Returns [`ArrayError::AxisOutOfRange`] if `axis` is out of range.
    pub fn sum(&self, axis: Option<isize>) -> Result<Self, ArrayError> {
        self.reduce(ReductionOp::Sum, axis)
    }

    /// The product of the elements, over every element or along `axis`.
    ///
    /// # Errors
    /// Returns [`ArrayError::AxisOutOfRange`] if `axis` is out of range.
    pub fn prod(&self, axis: Option<isize>) -> Result<Self, ArrayError> {
        self.reduce(ReductionOp::Prod, axis)
    }

    /// The minimum element, over every element or along `axis`.
    ///
    /// # Errors
    /// Returns [`ArrayError::AxisOutOfRange`] if `axis` is out of range.
    pub fn min(&self, axis: Option<isize>) -> Result<Self, ArrayError> {
        self.reduce(ReductionOp::Min, axis)
    }

    /// The maximum element, over every element or along `axis`.
    ///
    /// # Errors
    /// Returns [`ArrayError::AxisOutOfRange`] if `axis` is out of range.
    pub fn max(&self, axis: Option<isize>) -> Result<Self, ArrayError> {
        self.reduce(ReductionOp::Max, axis)
    }

    /// The arithmetic mean, over every element or along `axis`.
    ///
    /// # Errors
    /// Returns [`ArrayError::AxisOutOfRange`] if `axis` is out of range.
    pub fn mean(&self, axis: Option<isize>) -> Result<Self, ArrayError> {
        self.reduce(ReductionOp::Mean, axis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        array::stack,
        block::{Block, DataType, Scalar},
        chunks::ChunksArg,
        config::ComputeConfig,
    };

    fn arange(shape: &[usize], chunks: impl Into<ChunksArg>) -> Array {
        let n: usize = shape.iter().product();
        Array::from_block(Block::from_vec(shape, (0..n as i64).collect()).unwrap(), chunks).unwrap()
    }

    fn compute(array: &Array) -> Block {
        array.compute(&ComputeConfig::synchronous()).unwrap()
    }

    #[test]
    fn full_reductions() {
        let x = arange(&[10], 3);
        let sum = x.sum(None).unwrap();
        assert_eq!(sum.ndim(), 0);
        assert_eq!(sum.graph().layer(sum.name()).unwrap().len(), 1);
        assert_eq!(compute(&sum).to_scalar().unwrap(), Scalar::Int(45));
        assert_eq!(compute(&x.max(None).unwrap()).to_scalar().unwrap(), Scalar::Int(9));
        assert_eq!(compute(&x.min(None).unwrap()).to_scalar().unwrap(), Scalar::Int(0));
        let mean = x.mean(None).unwrap();
        assert_eq!(mean.data_type(), DataType::Float64);
        assert_eq!(compute(&mean).to_scalar().unwrap(), Scalar::Float(4.5));
        let prod = (&arange(&[4], 2) + 1i64).unwrap().prod(None).unwrap();
        assert_eq!(compute(&prod).to_scalar().unwrap(), Scalar::Int(24));
    }

    #[test]
    fn axis_reductions() {
        let x = arange(&[4, 6], [3, 4]);
        let rows = x.sum(Some(1)).unwrap();
        assert_eq!(rows.chunks().as_slice(), &[vec![3, 1]]);
        assert_eq!(
            compute(&rows),
            Block::from_vec(&[4], vec![15i64, 51, 87, 123]).unwrap()
        );
        let columns = x.max(Some(-2)).unwrap();
        assert_eq!(columns.chunks().as_slice(), &[vec![4, 2]]);
        assert_eq!(
            compute(&columns),
            Block::from_vec(&[6], vec![18i64, 19, 20, 21, 22, 23]).unwrap()
        );
        assert!(matches!(
            x.sum(Some(2)),
            Err(ArrayError::AxisOutOfRange { axis: 2, ndim: 2 })
        ));
    }

    #[test]
    fn reduction_data_types() {
        let x = arange(&[4], 2).astype(DataType::Int32).unwrap();
        let sum = x.sum(None).unwrap();
        assert_eq!(sum.data_type(), DataType::Int64);
        assert_eq!(compute(&sum).data_type(), DataType::Int64);
        assert_eq!(x.max(None).unwrap().data_type(), DataType::Int32);
        assert_eq!(sum.name(), x.sum(None).unwrap().name());
        assert_ne!(sum.name(), x.sum(Some(0)).unwrap().name());
    }

    #[test]
    fn stack_reductions() {
        let d = arange(&[4], 2);
        let s = stack(&[&d.mean(None).unwrap(), &d.sum(None).unwrap()], 0).unwrap();
        assert_eq!(s.shape(), vec![2]);
        assert_eq!(
            compute(&s),
            Block::from_vec(&[2], vec![1.5f64, 6.0]).unwrap()
        );
    }
}
