use std::sync::Arc;

use super::{Array, ArrayError};
use crate::{
    block::{DataType, Scalar, Selection},
    chunks::{normalize_chunks, ChunkSpec, ChunksArg},
    graph::{GraphKey, Operation, Task, TaskArg, Tasks, Value},
    operations::{Arange, FromFunction, Full},
    tokenize::name_for,
};

/// Build one task per block of `chunks`, passing each task the value made by `argument` from the block coordinates.
fn blockwise_tasks(
    name: &str,
    chunks: &ChunkSpec,
    operation: &Operation,
    argument: impl Fn(&[usize]) -> Value,
) -> Tasks {
    chunks
        .block_indices()
        .map(|coordinates| {
            let task = Task::call(operation, vec![TaskArg::Value(argument(&coordinates))]);
            (GraphKey::new(name, coordinates), task)
        })
        .collect()
}

/// The region covered by the block at `coordinates`.
fn block_region(chunks: &ChunkSpec, coordinates: &[usize]) -> Value {
    Value::Selection(Selection::from_ranges(
        &chunks.block_ranges(coordinates).unwrap_or_default(),
    ))
}

/// Create an array filled with `value`.
///
/// The data type defaults to the type of `value`.
///
/// # Errors
/// Returns an [`ArrayError`] if `chunks` is incompatible with `shape`.
pub fn full(
    shape: &[usize],
    chunks: impl Into<ChunksArg>,
    value: Scalar,
    data_type: Option<DataType>,
) -> Result<Array, ArrayError> {
    let chunks = normalize_chunks(chunks, Some(shape))?;
    let data_type = data_type.unwrap_or_else(|| value.data_type());
    let name = name_for("full", &[&chunks, &value, &data_type]);
    let operation: Operation = Arc::new(Full { value, data_type });
    let tasks = blockwise_tasks(&name, &chunks, &operation, |coordinates| {
        Value::Shape(chunks.block_shape(coordinates).unwrap_or_default())
    });
    Ok(Array::derive(name, tasks, &[], chunks, data_type))
}

/// Create an array filled with ones.
///
/// # Errors
/// Returns an [`ArrayError`] if `chunks` is incompatible with `shape`.
pub fn ones(
    shape: &[usize],
    chunks: impl Into<ChunksArg>,
    data_type: DataType,
) -> Result<Array, ArrayError> {
    full(shape, chunks, Scalar::Int(1), Some(data_type))
}

/// Create an array filled with zeros.
///
/// # Errors
/// Returns an [`ArrayError`] if `chunks` is incompatible with `shape`.
pub fn zeros(
    shape: &[usize],
    chunks: impl Into<ChunksArg>,
    data_type: DataType,
) -> Result<Array, ArrayError> {
    full(shape, chunks, Scalar::Int(0), Some(data_type))
}

/// Create the `int64` array `0, 1, ..., stop - 1` with blocks of `chunks` elements.
///
/// # Errors
/// Returns an [`ArrayError`] if `chunks` is zero and the array is not empty.
pub fn arange(stop: i64, chunks: usize) -> Result<Array, ArrayError> {
    arange_with(Scalar::Int(0), Scalar::Int(stop), Scalar::Int(1), chunks, None)
}

/// The number of values of `start, start + step, ...` before `stop`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn arange_length(start: Scalar, stop: Scalar, step: Scalar, float: bool) -> usize {
    if float {
        let length = ((stop.cast::<f64>() - start.cast::<f64>()) / step.cast::<f64>()).ceil();
        if length.is_finite() && length > 0.0 {
            length as usize
        } else {
            0
        }
    } else {
        let (start, stop, step) = (
            i128::from(start.cast::<i64>()),
            i128::from(stop.cast::<i64>()),
            i128::from(step.cast::<i64>()),
        );
        let span = stop - start;
        let length = if step > 0 {
            (span + step - 1).div_euclid(step)
        } else {
            (span + step + 1).div_euclid(step)
        };
        usize::try_from(length.max(0)).unwrap_or(usize::MAX)
    }
}

/// Create a one-dimensional array of evenly spaced values in `[start, stop)`.
///
/// The data type defaults to `float64` if any of `start`, `stop` or `step` is a float, otherwise `int64`.
///
/// # Errors
/// Returns an [`ArrayError`] if `step` is zero, or `chunks` is zero and the array is not empty.
pub fn arange_with(
    start: Scalar,
    stop: Scalar,
    step: Scalar,
    chunks: usize,
    data_type: Option<DataType>,
) -> Result<Array, ArrayError> {
    if step.cast::<f64>() == 0.0 {
        return Err(ArrayError::InvalidArgument(
            "arange step must not be zero".to_string(),
        ));
    }
    let float = [start, stop, step]
        .iter()
        .any(|scalar| scalar.data_type().is_float());
    let data_type =
        data_type.unwrap_or(if float { DataType::Float64 } else { DataType::Int64 });
    let length = arange_length(start, stop, step, float);
    let chunks = normalize_chunks(chunks, Some(&[length]))?;
    let name = name_for("arange", &[&start, &stop, &step, &chunks, &data_type]);
    let operation: Operation = Arc::new(Arange {
        start,
        step,
        data_type,
    });
    let tasks = blockwise_tasks(&name, &chunks, &operation, |coordinates| {
        block_region(&chunks, coordinates)
    });
    Ok(Array::derive(name, tasks, &[], chunks, data_type))
}

/// Create an array by evaluating `function` at the coordinates of every element.
///
/// Each block is computed by its own task. Functions given the same `name` are assumed to be identical, so arrays
/// created with the same name, shape, chunks and data type share their blocks.
///
/// # Errors
/// Returns an [`ArrayError`] if `chunks` is incompatible with `shape`.
pub fn from_function(
    name: &str,
    function: impl Fn(&[usize]) -> Scalar + Send + Sync + 'static,
    shape: &[usize],
    chunks: impl Into<ChunksArg>,
    data_type: DataType,
) -> Result<Array, ArrayError> {
    let chunks = normalize_chunks(chunks, Some(shape))?;
    let array_name = name_for("fromfunction", &[&name, &chunks, &data_type]);
    let operation: Operation = Arc::new(FromFunction::new(name, function, data_type));
    let tasks = blockwise_tasks(&array_name, &chunks, &operation, |coordinates| {
        block_region(&chunks, coordinates)
    });
    Ok(Array::derive(array_name, tasks, &[], chunks, data_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block::Block, config::ComputeConfig};

    fn compute(array: &Array) -> Block {
        array.compute(&ComputeConfig::synchronous()).unwrap()
    }

    #[test]
    fn full_blocks() {
        let d = full(&[3, 4], vec![vec![2, 1], vec![2, 2]], Scalar::Int(2), None).unwrap();
        assert_eq!(d.chunks().as_slice(), &[vec![2, 1], vec![2, 2]]);
        assert_eq!(d.data_type(), DataType::Int64);
        assert_eq!(compute(&d), Block::full(DataType::Int64, &[3, 4], Scalar::Int(2)));

        let o = ones(&[4, 4], 2, DataType::Float32).unwrap();
        assert_eq!(o.graph().len(), 4);
        assert_eq!(compute(&o), Block::full(DataType::Float32, &[4, 4], Scalar::Float(1.0)));
        assert_eq!(
            compute(&zeros(&[5], 2, DataType::Bool).unwrap()),
            Block::zeros(DataType::Bool, &[5])
        );
        assert_eq!(o.name(), ones(&[4, 4], 2, DataType::Float32).unwrap().name());
        assert_ne!(o.name(), zeros(&[4, 4], 2, DataType::Float32).unwrap().name());
    }

    #[test]
    fn arange_values() {
        let x = arange(10, 3).unwrap();
        assert_eq!(x.chunks().as_slice(), &[vec![3, 3, 3, 1]]);
        assert_eq!(x.data_type(), DataType::Int64);
        assert_eq!(compute(&x), Block::from_vec(&[10], (0..10i64).collect()).unwrap());

        let y = arange_with(Scalar::Int(10), Scalar::Int(0), Scalar::Int(-3), 2, None).unwrap();
        assert_eq!(compute(&y), Block::from_vec(&[4], vec![10i64, 7, 4, 1]).unwrap());

        let z = arange_with(Scalar::Float(0.0), Scalar::Int(1), Scalar::Float(0.25), 3, None).unwrap();
        assert_eq!(z.data_type(), DataType::Float64);
        assert_eq!(
            compute(&z),
            Block::from_vec(&[4], vec![0.0f64, 0.25, 0.5, 0.75]).unwrap()
        );

        let empty = arange_with(Scalar::Int(5), Scalar::Int(0), Scalar::Int(1), 2, None).unwrap();
        assert_eq!(empty.shape(), vec![0]);
        assert!(arange_with(Scalar::Int(0), Scalar::Int(5), Scalar::Int(0), 2, None).is_err());
    }

    #[test]
    fn from_function_blocks() {
        let f = |index: &[usize]| Scalar::Float((index[0] + index[1]) as f64);
        let d = from_function("add", f, &[5, 5], 2, DataType::Float64).unwrap();
        assert_eq!(d.numblocks(), vec![3, 3]);
        let values = compute(&d);
        let values = values.as_array::<f64>().unwrap();
        assert_eq!(values[[4, 3].as_slice()], 7.0);
        assert_eq!(values[[1, 2].as_slice()], 3.0);
        let again = from_function("add", f, &[5, 5], 2, DataType::Float64).unwrap();
        assert_eq!(d.name(), again.name());
    }
}
