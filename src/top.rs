//! The index-expression task builder.
//!
//! [`top`] generates one task per output block from an operation and index expressions labelling the block axes of
//! the output and each input. Labels shared between inputs and the output align block coordinates. Labels of inputs
//! that are absent from the output are contracted: the task receives a nested list of every block along them.
//!
//! For example, a block matrix multiply `z[i, k] = x[i, j] · y[j, k]` is built with
//! ```text
//! top(dotmany, "z", "ik", [("x", "ij"), ("y", "jk")], numblocks)
//! ```
//! which creates the task `("z", i, k) -> dotmany([("x", i, 0), ("x", i, 1), ...], [("y", 0, k), ("y", 1, k), ...])`.

use std::{collections::HashMap, hash::Hash};

use itertools::Itertools;

use crate::{
    array::ArrayError,
    chunks::BlockIndices,
    graph::{GraphKey, Operation, Task, TaskArg, Tasks, Value},
};

/// An argument of [`top`].
#[derive(Debug, Clone)]
pub enum TopArg {
    /// The blocks of an array, with one label per block axis.
    Array {
        /// The array name.
        name: String,
        /// The index expression of the array.
        labels: Vec<char>,
    },
    /// A literal passed unchanged to every task.
    Literal(Value),
}

impl TopArg {
    /// Create an array argument.
    #[must_use]
    pub fn array(name: impl Into<String>, labels: &[char]) -> Self {
        Self::Array {
            name: name.into(),
            labels: labels.to_vec(),
        }
    }
}

/// Block counts that can be resolved against each other along a shared label.
pub trait BroadcastDimension: Clone + Eq + Hash + std::fmt::Debug {
    /// Returns true if the dimension is a single block that broadcasts against any other.
    fn is_singleton(&self) -> bool;
}

impl BroadcastDimension for usize {
    fn is_singleton(&self) -> bool {
        *self == 1
    }
}

impl BroadcastDimension for Vec<usize> {
    fn is_singleton(&self) -> bool {
        self.len() == 1
    }
}

/// Resolve the dimension of every label from the dimensions of the arguments using it.
///
/// A singleton dimension broadcasts against any other. A label whose dimensions are all singletons resolves to the
/// first of them.
///
/// # Errors
/// Returns [`ArrayError::IncompatibleChunks`] if a label has more than one distinct non-singleton dimension.
pub fn broadcast_dimensions<D: BroadcastDimension>(
    arguments: &[(&[char], &[D])],
) -> Result<HashMap<char, D>, ArrayError> {
    let mut candidates: HashMap<char, Vec<&D>> = HashMap::new();
    for (labels, dimensions) in arguments {
        for (label, dimension) in labels.iter().zip(dimensions.iter()) {
            candidates.entry(*label).or_default().push(dimension);
        }
    }
    candidates
        .into_iter()
        .map(|(label, dimensions)| {
            let distinct: Vec<&D> = dimensions
                .iter()
                .copied()
                .filter(|dimension| !dimension.is_singleton())
                .unique()
                .collect();
            match distinct.as_slice() {
                [] => Ok((label, dimensions[0].clone())),
                [dimension] => Ok((label, (*dimension).clone())),
                _ => Err(ArrayError::IncompatibleChunks(format!(
                    "shapes do not align on index {label}: {}",
                    distinct.iter().map(|dimension| format!("{dimension:?}")).join(", ")
                ))),
            }
        })
        .collect()
}

/// Build the nested list of keys of one array argument for one output block.
fn nested_keys(
    name: &str,
    labels: &[char],
    numblocks: &[usize],
    coordinates: &mut Vec<usize>,
    fixed: &HashMap<char, usize>,
    dimensions: &HashMap<char, usize>,
) -> TaskArg {
    let axis = coordinates.len();
    let Some(label) = labels.get(axis) else {
        return TaskArg::Key(GraphKey::new(name, coordinates.clone()));
    };
    let singleton = numblocks[axis] == 1;
    if let Some(&coordinate) = fixed.get(label) {
        coordinates.push(if singleton { 0 } else { coordinate });
        let arg = nested_keys(name, labels, numblocks, coordinates, fixed, dimensions);
        coordinates.pop();
        arg
    } else {
        let items = (0..dimensions[label])
            .map(|coordinate| {
                coordinates.push(if singleton { 0 } else { coordinate });
                let arg = nested_keys(name, labels, numblocks, coordinates, fixed, dimensions);
                coordinates.pop();
                arg
            })
            .collect();
        TaskArg::List(items)
    }
}

/// Build the tasks of an operation applied blockwise under index expressions.
///
/// `numblocks` maps every array argument to its number of blocks along each axis. Output labels that appear in no
/// argument have a single block.
///
/// # Errors
/// Returns an [`ArrayError`] if
///  - an array argument is missing from `numblocks` or its labels do not match its dimensionality, or
///  - the block counts of a shared label are incompatible.
pub fn top(
    operation: &Operation,
    output: &str,
    out_labels: &[char],
    args: &[TopArg],
    numblocks: &HashMap<String, Vec<usize>>,
) -> Result<Tasks, ArrayError> {
    let mut arguments: Vec<(&[char], &[usize])> = Vec::with_capacity(args.len());
    for arg in args {
        if let TopArg::Array { name, labels } = arg {
            let blocks = numblocks.get(name).ok_or_else(|| {
                ArrayError::InvalidArgument(format!("missing block counts for {name}"))
            })?;
            if blocks.len() != labels.len() {
                return Err(ArrayError::DimensionalityMismatch {
                    expected: blocks.len(),
                    got: labels.len(),
                });
            }
            arguments.push((labels.as_slice(), blocks.as_slice()));
        }
    }
    let mut dimensions = broadcast_dimensions(&arguments)?;
    for label in out_labels {
        dimensions.entry(*label).or_insert(1);
    }

    let out_blocks: Vec<usize> = out_labels.iter().map(|label| dimensions[label]).collect();
    let mut tasks = Tasks::with_capacity(out_blocks.iter().product());
    for coordinates in BlockIndices::new(&out_blocks) {
        let fixed: HashMap<char, usize> = out_labels
            .iter()
            .copied()
            .zip(coordinates.iter().copied())
            .collect();
        let task_args = args
            .iter()
            .map(|arg| match arg {
                TopArg::Array { name, labels } => nested_keys(
                    name,
                    labels,
                    &numblocks[name],
                    &mut Vec::with_capacity(labels.len()),
                    &fixed,
                    &dimensions,
                ),
                TopArg::Literal(value) => TaskArg::Value(value.clone()),
            })
            .collect();
        tasks.insert(
            GraphKey::new(output, coordinates),
            Task::call(operation, task_args),
        );
    }
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::block::{BinaryOp, Scalar};

    fn key(name: &str, index: &[usize]) -> TaskArg {
        TaskArg::Key(GraphKey::new(name, index.to_vec()))
    }

    fn numblocks(entries: &[(&str, &[usize])]) -> HashMap<String, Vec<usize>> {
        entries
            .iter()
            .map(|(name, blocks)| ((*name).to_string(), blocks.to_vec()))
            .collect()
    }

    #[test]
    fn top_elementwise() {
        let add: Operation = Arc::new(BinaryOp::Add);
        let tasks = top(
            &add,
            "z",
            &['i', 'j'],
            &[TopArg::array("x", &['i', 'j']), TopArg::array("y", &['i', 'j'])],
            &numblocks(&[("x", &[2, 2]), ("y", &[2, 2])]),
        )
        .unwrap();
        assert_eq!(tasks.len(), 4);
        for (i, j) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            assert_eq!(
                tasks[&GraphKey::new("z", vec![i, j])],
                Task::call(&add, vec![key("x", &[i, j]), key("y", &[i, j])])
            );
        }
    }

    #[test]
    fn top_literal_and_broadcast() {
        let add: Operation = Arc::new(BinaryOp::Add);
        let tasks = top(
            &add,
            "z",
            &['i', 'j'],
            &[
                TopArg::array("x", &['i', 'j']),
                TopArg::array("y", &['j']),
                TopArg::Literal(Value::Scalar(Scalar::Int(1))),
            ],
            &numblocks(&[("x", &[1, 3]), ("y", &[1])]),
        )
        .unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(
            tasks[&GraphKey::new("z", vec![0, 2])],
            Task::call(
                &add,
                vec![
                    key("x", &[0, 2]),
                    key("y", &[0]),
                    TaskArg::Value(Value::Scalar(Scalar::Int(1)))
                ]
            )
        );
    }

    #[test]
    fn top_contraction() {
        let dot: Operation = Arc::new(BinaryOp::Multiply);
        let tasks = top(
            &dot,
            "z",
            &['i', 'k'],
            &[TopArg::array("x", &['i', 'j']), TopArg::array("y", &['j', 'k'])],
            &numblocks(&[("x", &[2, 3]), ("y", &[3, 1])]),
        )
        .unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(
            tasks[&GraphKey::new("z", vec![1, 0])].args(),
            &[
                TaskArg::List(vec![key("x", &[1, 0]), key("x", &[1, 1]), key("x", &[1, 2])]),
                TaskArg::List(vec![key("y", &[0, 0]), key("y", &[1, 0]), key("y", &[2, 0])]),
            ]
        );
    }

    #[test]
    fn top_full_reduction() {
        let sum: Operation = Arc::new(BinaryOp::Add);
        let tasks = top(
            &sum,
            "s",
            &[],
            &[TopArg::array("x", &['i', 'j'])],
            &numblocks(&[("x", &[2, 2])]),
        )
        .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(
            tasks[&GraphKey::scalar("s")].args(),
            &[TaskArg::List(vec![
                TaskArg::List(vec![key("x", &[0, 0]), key("x", &[0, 1])]),
                TaskArg::List(vec![key("x", &[1, 0]), key("x", &[1, 1])]),
            ])]
        );
    }

    #[test]
    fn top_errors() {
        let add: Operation = Arc::new(BinaryOp::Add);
        let args = [TopArg::array("x", &['i']), TopArg::array("y", &['i'])];
        assert!(matches!(
            top(&add, "z", &['i'], &args, &numblocks(&[("x", &[2]), ("y", &[3])])),
            Err(ArrayError::IncompatibleChunks(_))
        ));
        assert!(top(&add, "z", &['i'], &args, &numblocks(&[("x", &[2])])).is_err());
        assert!(matches!(
            top(&add, "z", &['i'], &args, &numblocks(&[("x", &[2, 1]), ("y", &[2])])),
            Err(ArrayError::DimensionalityMismatch { .. })
        ));
    }

    #[test]
    fn broadcast_dimensions_chunks() {
        let a = vec![vec![5usize], vec![2, 3]];
        let b = vec![vec![1usize, 1, 1], vec![2, 3]];
        let dimensions =
            broadcast_dimensions(&[(&['i', 'j'][..], &a[..]), (&['i', 'j'][..], &b[..])]).unwrap();
        assert_eq!(dimensions[&'i'], vec![1, 1, 1]);
        assert_eq!(dimensions[&'j'], vec![2, 3]);

        let c = vec![vec![1usize, 4]];
        assert!(broadcast_dimensions(&[(&['j'][..], &a[1..]), (&['j'][..], &c[..])]).is_err());
    }

    #[test]
    fn broadcast_dimensions_distinct_counts() {
        let labels = ['i'];
        let (three, four, one) = ([3usize], [4usize], [1usize]);
        let dimensions = broadcast_dimensions(&[
            (&labels[..], &three[..]),
            (&labels[..], &one[..]),
            (&labels[..], &three[..]),
        ])
        .unwrap();
        assert_eq!(dimensions[&'i'], 3);

        let err = broadcast_dimensions(&[
            (&labels[..], &three[..]),
            (&labels[..], &four[..]),
            (&labels[..], &three[..]),
        ])
        .unwrap_err();
        assert_eq!(err.to_string().matches('3').count(), 1);
        assert!(err.to_string().ends_with("on index i: 3, 4"));
    }
}
