use std::{ops::Range, sync::Arc};

use super::{Array, ArrayError};
use crate::{
    block::Selection,
    chunks::{normalize_chunks, BlockIndices, ChunksArg},
    graph::{GraphKey, Operation, Task, TaskArg, Tasks, Value},
    operations::{Concatenate3, GetArray},
    tokenize::tokenize,
};

/// A part of an input block: its coordinate along an axis and the element range within it.
type Piece = (usize, Range<usize>);

/// For every block of `new`, the parts of the blocks of `old` covering it along one axis.
///
/// A block of size zero is covered by a single empty piece.
fn plan_axis(old: &[usize], new: &[usize]) -> Vec<Vec<Piece>> {
    let offsets: Vec<usize> = std::iter::once(0)
        .chain(old.iter().scan(0, |offset, &size| {
            *offset += size;
            Some(*offset)
        }))
        .collect();
    let mut start = 0;
    new.iter()
        .map(|&size| {
            let stop = start + size;
            let pieces = if size == 0 {
                let block = (0..old.len())
                    .find(|&block| offsets[block + 1] > start)
                    .unwrap_or(old.len().saturating_sub(1));
                let local = start - offsets[block].min(start);
                vec![(block, local..local)]
            } else {
                (0..old.len())
                    .filter(|&block| offsets[block] < stop && offsets[block + 1] > start)
                    .map(|block| {
                        let local_start = start.max(offsets[block]) - offsets[block];
                        let local_stop = stop.min(offsets[block + 1]) - offsets[block];
                        (block, local_start..local_stop)
                    })
                    .collect()
            };
            start = stop;
            pieces
        })
        .collect()
}

/// Nest `leaves` (in C order) into lists following `grid`.
fn nest(leaves: &mut impl Iterator<Item = TaskArg>, grid: &[usize]) -> TaskArg {
    match grid.split_first() {
        None => leaves.next().unwrap_or(TaskArg::List(vec![])),
        Some((&count, rest)) => TaskArg::List((0..count).map(|_| nest(leaves, rest)).collect()),
    }
}

impl Array {
    /// Change the chunks of the array.
    ///
    /// Each output block is assembled from the parts of the input blocks it overlaps. An output block equal to an
    /// input block is an alias of it, an output block inside one input block is a selection of it, and any other
    /// output block concatenates selections of several input blocks.
    ///
    /// Returns a clone of the array if the chunks are unchanged.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `chunks` is incompatible with the shape of the array.
    pub fn rechunk(&self, chunks: impl Into<ChunksArg>) -> Result<Self, ArrayError> {
        let shape = self.shape();
        let chunks = normalize_chunks(chunks, Some(&shape))?;
        if chunks == self.chunks {
            return Ok(self.clone());
        }
        let token = tokenize(&[&self.name, &chunks]);
        let name = format!("rechunk-merge-{token}");
        let split_name = format!("rechunk-split-{token}");
        log::debug!(
            "rechunk {} from {} to {} ({} to {} blocks)",
            self.name,
            self.chunks,
            chunks,
            self.chunks.num_blocks(),
            chunks.num_blocks()
        );

        let plans: Vec<Vec<Vec<Piece>>> = (0..self.ndim())
            .map(|axis| plan_axis(&self.chunks[axis], &chunks[axis]))
            .collect();
        let get: Operation = Arc::new(GetArray);
        let concatenate: Operation = Arc::new(Concatenate3);
        let mut tasks = Tasks::with_capacity(chunks.num_blocks());
        for coordinates in chunks.block_indices() {
            let pieces: Vec<&[Piece]> = coordinates
                .iter()
                .enumerate()
                .map(|(axis, &coordinate)| plans[axis][coordinate].as_slice())
                .collect();
            let grid: Vec<usize> = pieces.iter().map(|pieces| pieces.len()).collect();

            // The input block and region of each piece, and whether it spans the input block.
            let piece = |piece_coordinates: &[usize]| {
                let (input, region): (Vec<usize>, Vec<Range<usize>>) = pieces
                    .iter()
                    .zip(piece_coordinates)
                    .map(|(pieces, &index)| pieces[index].clone())
                    .unzip();
                let full = input.iter().zip(&region).enumerate().all(|(axis, (&block, range))| {
                    range.start == 0 && range.end == self.chunks[axis][block]
                });
                (input, region, full)
            };
            let read = |input: Vec<usize>, region: &[Range<usize>]| {
                Task::call(
                    &get,
                    vec![
                        TaskArg::Key(self.key(input)),
                        TaskArg::Value(Value::Selection(Selection::from_ranges(region))),
                    ],
                )
            };

            let task = if grid.iter().all(|&count| count == 1) {
                let (input, region, full) = piece(&vec![0; grid.len()]);
                if full {
                    Task::Alias(self.key(input))
                } else {
                    read(input, &region)
                }
            } else {
                let mut leaves = Vec::with_capacity(grid.iter().product());
                for piece_coordinates in BlockIndices::new(&grid) {
                    let (input, region, full) = piece(&piece_coordinates);
                    if full {
                        leaves.push(TaskArg::Key(self.key(input)));
                    } else {
                        let mut index = coordinates.clone();
                        index.extend(piece_coordinates);
                        let key = GraphKey::new(split_name.clone(), index);
                        tasks.insert(key.clone(), read(input, &region));
                        leaves.push(TaskArg::Key(key));
                    }
                }
                Task::call(&concatenate, vec![nest(&mut leaves.into_iter(), &grid)])
            };
            tasks.insert(GraphKey::new(name.clone(), coordinates), task);
        }
        Ok(Self::derive(name, tasks, &[self], chunks, self.data_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block::Block, config::ComputeConfig};

    fn arange(shape: &[usize], chunks: impl Into<ChunksArg>) -> Array {
        let n: usize = shape.iter().product();
        Array::from_block(Block::from_vec(shape, (0..n as i64).collect()).unwrap(), chunks).unwrap()
    }

    #[test]
    fn plan_axis_pieces() {
        assert_eq!(
            plan_axis(&[4, 4], &[2, 3, 3]),
            vec![vec![(0, 0..2)], vec![(0, 2..4), (1, 0..1)], vec![(1, 1..4)]]
        );
        assert_eq!(plan_axis(&[3, 3], &[6]), vec![vec![(0, 0..3), (1, 0..3)]]);
        assert_eq!(plan_axis(&[0], &[0]), vec![vec![(0, 0..0)]]);
        assert_eq!(plan_axis(&[2, 2], &[2, 0, 2]), vec![
            vec![(0, 0..2)],
            vec![(1, 0..0)],
            vec![(1, 0..2)]
        ]);
    }

    #[test]
    fn rechunk_values() {
        let x = arange(&[6, 5], [4, 2]);
        let config = ComputeConfig::synchronous();
        for chunks in [vec![2, 5], vec![3, 3], vec![6, 1], vec![1, 4]] {
            let y = x.rechunk(chunks.clone()).unwrap();
            assert_eq!(y.shape(), x.shape());
            assert_eq!(y.chunks().as_slice()[0][0], chunks[0]);
            assert_eq!(y.compute(&config).unwrap(), x.compute(&config).unwrap());
        }
    }

    #[test]
    fn rechunk_tasks() {
        let x = arange(&[8], 4);
        assert_eq!(x.rechunk(4).unwrap().name(), x.name());

        let merged = x.rechunk(8).unwrap();
        assert!(merged.name().starts_with("rechunk-merge-"));
        let layer = merged.graph().layer(merged.name()).unwrap();
        assert_eq!(
            layer[&merged.key(vec![0])].args(),
            &[TaskArg::List(vec![
                TaskArg::Key(x.key(vec![0])),
                TaskArg::Key(x.key(vec![1]))
            ])]
        );

        let split = x.rechunk(2).unwrap();
        let layer = split.graph().layer(split.name()).unwrap();
        assert_eq!(layer.len(), 4);
        assert_eq!(
            layer[&split.key(vec![3])].args(),
            &[
                TaskArg::Key(x.key(vec![1])),
                TaskArg::Value(Value::Selection(Selection::from_ranges(&[2..4])))
            ]
        );

        let within = arange(&[4, 4], [2, 4]).rechunk([2, 2]).unwrap();
        let layer = within.graph().layer(within.name()).unwrap();
        assert!(layer
            .values()
            .all(|task| task.operation().map(|op| op.name()) == Some("getarray".to_string())));
    }

    #[test]
    fn rechunk_aliases_identical_blocks() {
        let x = arange(&[4, 6], [2, 3]);
        let y = x.rechunk(vec![vec![2, 2], vec![3, 1, 2]]).unwrap();
        let layer = y.graph().layer(y.name()).unwrap();
        assert_eq!(layer[&y.key(vec![1, 0])], Task::Alias(x.key(vec![1, 0])));
        assert_eq!(
            y.compute(&ComputeConfig::synchronous()).unwrap(),
            x.compute(&ComputeConfig::synchronous()).unwrap()
        );
    }

    #[test]
    fn rechunk_errors() {
        let x = arange(&[4], 2);
        assert!(x.rechunk(vec![vec![3, 3]]).is_err());
        assert!(x.rechunk(vec![2, 2]).is_err());
    }
}
