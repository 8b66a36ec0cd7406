use std::sync::Arc;

use super::{Array, ArrayError};
use crate::{
    chunks::ChunkSpec,
    graph::{GraphKey, Operation, Task, TaskArg, TaskGraph, Tasks},
    operations::TopK,
    tokenize::name_for,
};

/// The `k` largest elements of a one-dimensional array, largest first.
///
/// Each block is first reduced to its own `k` largest elements, then a single task selects the `k` largest of those.
/// The result is a single block of `min(k, len)` elements.
///
/// # Errors
/// Returns [`ArrayError::DimensionalityMismatch`] if the array is not one-dimensional.
pub fn topk(k: usize, array: &Array) -> Result<Array, ArrayError> {
    if array.ndim() != 1 {
        return Err(ArrayError::DimensionalityMismatch {
            expected: 1,
            got: array.ndim(),
        });
    }
    let k = k.min(array.shape()[0]);
    let operation: Operation = Arc::new(TopK { k });

    let partial = name_for("topk-partial", &[&array.name(), &k]);
    let partial_tasks: Tasks = (0..array.numblocks()[0])
        .map(|block| {
            let task = Task::call(&operation, vec![TaskArg::Key(array.key(vec![block]))]);
            (GraphKey::new(partial.clone(), vec![block]), task)
        })
        .collect();
    let partial_keys: Vec<TaskArg> = (0..array.numblocks()[0])
        .map(|block| TaskArg::Key(GraphKey::new(partial.clone(), vec![block])))
        .collect();

    let name = name_for("topk", &[&array.name(), &k]);
    let tasks = Tasks::from([(
        GraphKey::new(name.clone(), vec![0]),
        Task::call(&operation, vec![TaskArg::List(partial_keys)]),
    )]);
    let graph = TaskGraph::merge([array.graph()])
        .with_layer(partial, partial_tasks)
        .with_layer(name.clone(), tasks);
    Ok(Array::from_parts(
        graph,
        name,
        ChunkSpec::new_unchecked(vec![vec![k]]),
        array.data_type(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        array::ErrorKind,
        block::{Block, DataType},
        config::ComputeConfig,
    };

    fn compute(array: &Array) -> Block {
        array.compute(&ComputeConfig::synchronous()).unwrap()
    }

    #[test]
    fn topk_two_stage() {
        let d = Array::from_block(Block::from_vec(&[4], vec![5i64, 2, 1, 6]).unwrap(), 2).unwrap();
        let e = topk(2, &d).unwrap();
        assert_eq!(e.chunks().as_slice(), &[vec![2]]);
        assert_eq!(compute(&e), Block::from_vec(&[2], vec![6i64, 5]).unwrap());
        assert_eq!(topk(2, &d).unwrap().name(), e.name());
        assert_eq!(e.graph().layer(e.name()).unwrap().len(), 1);
        assert_eq!(e.graph().len(), d.graph().len() + 3);
    }

    #[test]
    fn topk_k_bigger_than_chunk() {
        let d = Array::from_block(Block::from_vec(&[4], vec![5i64, 2, 1, 6]).unwrap(), 2).unwrap();
        let e = topk(3, &d).unwrap();
        assert_eq!(e.chunks().as_slice(), &[vec![3]]);
        assert_eq!(compute(&e), Block::from_vec(&[3], vec![6i64, 5, 2]).unwrap());

        let all = topk(10, &d.astype(DataType::Float32).unwrap()).unwrap();
        assert_eq!(all.chunks().as_slice(), &[vec![4]]);
        assert_eq!(
            compute(&all),
            Block::from_vec(&[4], vec![6.0f32, 5.0, 2.0, 1.0]).unwrap()
        );
    }

    #[test]
    fn topk_requires_one_dimension() {
        let d = Array::from_block(Block::from_vec(&[2, 2], vec![1i64, 2, 3, 4]).unwrap(), 1).unwrap();
        assert_eq!(topk(1, &d).unwrap_err().kind(), ErrorKind::Value);
    }
}
