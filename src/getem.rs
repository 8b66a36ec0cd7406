//! The block index generator.

use std::{ops::Range, sync::Arc};

use crate::{
    block::{Selection, SliceSpec},
    chunks::ChunkSpec,
    graph::{GraphKey, Operation, Task, TaskArg, Tasks, Value},
    operations::GetArray,
    source::SourceLock,
};

/// Build one task per block of `chunks` that reads the region of the block from `source`.
///
/// Each task of the form `(name, *coordinates) -> getarray(source, selection[, lock])` selects the hyperrectangle of
/// its block, computed from the cumulative block sizes. If `lock` is given, every task holds it while reading, so
/// all reads from `source` are serialised.
///
/// With `new_axis`, every selection inserts an axis of length one at that position and the task keys gain a zero
/// coordinate there, so the tasks form the blocks of an array with one more dimension.
#[must_use]
pub fn getem(
    name: &str,
    chunks: &ChunkSpec,
    source: &TaskArg,
    lock: Option<&SourceLock>,
    new_axis: Option<usize>,
) -> Tasks {
    let operation: Operation = Arc::new(GetArray);
    chunks
        .block_indices()
        .filter_map(|mut coordinates| {
            let region = chunks.block_ranges(&coordinates)?;
            let mut args = vec![
                source.clone(),
                TaskArg::Value(Value::Selection(region_selection(&region, new_axis))),
            ];
            if let Some(lock) = lock {
                args.push(TaskArg::Value(Value::Lock(lock.clone())));
            }
            if let Some(axis) = new_axis {
                coordinates.insert(axis.min(coordinates.len()), 0);
            }
            Some((GraphKey::new(name, coordinates), Task::call(&operation, args)))
        })
        .collect()
}

/// The selection of the hyperrectangle `region`, with a new axis of length one inserted at `new_axis`.
#[must_use]
pub fn region_selection(region: &[Range<usize>], new_axis: Option<usize>) -> Selection {
    let mut specs: Vec<SliceSpec> = region.iter().cloned().map(SliceSpec::range).collect();
    if let Some(axis) = new_axis {
        specs.insert(axis.min(specs.len()), SliceSpec::NewAxis);
    }
    Selection::new(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block::Block, graph::BlockOperation};

    #[test]
    fn getem_regions() {
        let chunks = ChunkSpec::new(vec![vec![2, 2], vec![3]]).unwrap();
        let source = TaskArg::Key(GraphKey::scalar("x"));
        let tasks = getem("y", &chunks, &source, None, None);
        assert_eq!(tasks.len(), 2);
        let task = &tasks[&GraphKey::new("y", vec![1, 0])];
        assert_eq!(task.operation().map(|op| op.name()), Some("getarray".to_string()));
        assert_eq!(
            task.args(),
            &[
                source.clone(),
                TaskArg::Value(Value::Selection(Selection::new(vec![
                    SliceSpec::range(2..4),
                    SliceSpec::range(0..3)
                ])))
            ]
        );
    }

    #[test]
    fn getem_shares_lock() {
        let chunks = ChunkSpec::new(vec![vec![1, 1, 1]]).unwrap();
        let lock = SourceLock::new();
        let tasks = getem("y", &chunks, &TaskArg::Key(GraphKey::scalar("x")), Some(&lock), None);
        for task in tasks.values() {
            match task.args() {
                [_, _, TaskArg::Value(Value::Lock(task_lock))] => assert!(task_lock.same_lock(&lock)),
                args => panic!("unexpected arguments {args:?}"),
            }
        }
    }

    #[test]
    fn getem_new_axis() {
        let chunks = ChunkSpec::new(vec![vec![2, 1], vec![3]]).unwrap();
        let x = Block::from_vec(&[3, 3], (0..9i64).collect()).unwrap();
        let source = TaskArg::Value(Value::from(x));
        let tasks = getem("y", &chunks, &source, None, Some(1));
        assert_eq!(tasks.len(), 2);
        assert!(tasks.keys().all(|key| key.index().len() == 3 && key.index()[1] == 0));

        let task = &tasks[&GraphKey::new("y", vec![1, 0, 0])];
        assert_eq!(
            task.args()[1],
            TaskArg::Value(Value::Selection(Selection::new(vec![
                SliceSpec::range(2..3),
                SliceSpec::NewAxis,
                SliceSpec::range(0..3)
            ])))
        );

        let values: Vec<Value> = task
            .args()
            .iter()
            .map(|arg| match arg {
                TaskArg::Value(value) => value.clone(),
                arg => panic!("unexpected argument {arg:?}"),
            })
            .collect();
        let block = GetArray.call(&values).unwrap().to_block().unwrap().into_owned();
        assert_eq!(block.shape(), &[1, 1, 3]);
        assert_eq!(block, Block::from_vec(&[1, 1, 3], vec![6i64, 7, 8]).unwrap());

        let first = &tasks[&GraphKey::new("y", vec![0, 0, 0])];
        let values: Vec<Value> = first
            .args()
            .iter()
            .filter_map(|arg| match arg {
                TaskArg::Value(value) => Some(value.clone()),
                _ => None,
            })
            .collect();
        let block = GetArray.call(&values).unwrap().to_block().unwrap().into_owned();
        assert_eq!(block.shape(), &[2, 1, 3]);
    }

    #[test]
    fn region_selection_trailing_axis() {
        assert_eq!(
            region_selection(&[0..2], Some(5)),
            Selection::new(vec![SliceSpec::range(0..2), SliceSpec::NewAxis])
        );
        assert_eq!(region_selection(&[0..2], None), Selection::from_ranges(&[0..2]));
    }
}
