use std::{collections::BTreeMap, sync::Arc};

use super::{
    slicing::{expand_ellipsis, normalize_index},
    Array, ArrayError, Index,
};
use crate::{
    chunks::{BlockIndices, ChunkSpec},
    graph::{GraphKey, Operation, Task, TaskArg, Tasks},
    operations::{VindexGather, VindexMerge},
    tokenize::tokenize,
};

/// The points of one combination of blocks along the point axes.
struct PointGroup {
    /// The output position of each point.
    locations: Vec<usize>,
    /// The block-local coordinates of each point, one list per point axis.
    points: Vec<Vec<usize>>,
}

impl Array {
    /// Pointwise indexing.
    ///
    /// Every list of `index` holds one coordinate of each point along its axis; all lists must have the same length.
    /// The other axes must be selected in full. The output has one leading axis with the points in order, followed by
    /// the axes that are not indexed.
    ///
    /// Points are grouped by the blocks holding them. Each group is gathered from its block by one task per block
    /// of the remaining axes, then the groups are merged back into the order of the points.
    ///
    /// At least two lists are required unless the array is one-dimensional, as a single list is ordinary
    /// [`take`](Array::take) indexing.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - an entry is an integer, a mask, or a multi-dimensional list,
    ///  - there are too few lists, or lists of different lengths,
    ///  - a coordinate is out of bounds, or
    ///  - an entry is a new axis or a partial slice, which are unsupported.
    pub fn vindex(&self, index: &[Index]) -> Result<Self, ArrayError> {
        let expanded = expand_ellipsis(index, self.ndim())?;
        let shape = self.shape();
        let mut point_axes = Vec::new();
        let mut coordinates: Vec<Vec<usize>> = Vec::new();
        for (axis, entry) in expanded.iter().enumerate() {
            match entry {
                Index::Array(indices) => {
                    point_axes.push(axis);
                    coordinates.push(
                        indices
                            .iter()
                            .map(|&index| normalize_index(index, axis, shape[axis]))
                            .collect::<Result<_, _>>()?,
                    );
                }
                Index::Slice {
                    start: None | Some(0),
                    stop: None,
                    step: 1,
                } => {}
                Index::Int(_) => {
                    return Err(ArrayError::InvalidIndex(
                        "vindex does not support integer indices, use get".to_string(),
                    ))
                }
                Index::Mask(_) | Index::NestedArray(_) => {
                    return Err(ArrayError::InvalidIndex(
                        "vindex only supports one-dimensional lists of indices".to_string(),
                    ))
                }
                Index::Slice { .. } | Index::NewAxis | Index::Ellipsis => {
                    return Err(ArrayError::Unsupported(
                        "vindex only supports lists and full slices".to_string(),
                    ))
                }
            }
        }
        if point_axes.len() < 2 && !(point_axes.len() == 1 && self.ndim() == 1) {
            return Err(ArrayError::InvalidIndex(format!(
                "vindex requires at least two lists of indices, got {}",
                point_axes.len()
            )));
        }
        let num_points = coordinates[0].len();
        if coordinates.iter().any(|coordinates| coordinates.len() != num_points) {
            return Err(ArrayError::InvalidIndex(format!(
                "lists of indices have different lengths: {:?}",
                coordinates.iter().map(Vec::len).collect::<Vec<_>>()
            )));
        }

        let mut groups: BTreeMap<Vec<usize>, PointGroup> = BTreeMap::new();
        for point in 0..num_points {
            let located: Vec<(usize, usize)> = point_axes
                .iter()
                .zip(&coordinates)
                .map(|(&axis, coordinates)| {
                    let coordinate = coordinates[point];
                    self.chunks.locate(axis, coordinate).ok_or(ArrayError::IndexOutOfBounds {
                        index: isize::try_from(coordinate).unwrap_or(isize::MAX),
                        axis,
                        size: shape[axis],
                    })
                })
                .collect::<Result<_, _>>()?;
            let group = groups
                .entry(located.iter().map(|(block, _)| *block).collect())
                .or_insert_with(|| PointGroup {
                    locations: Vec::new(),
                    points: vec![Vec::new(); point_axes.len()],
                });
            group.locations.push(point);
            for (points, (_, local)) in group.points.iter_mut().zip(&located) {
                points.push(*local);
            }
        }

        let rest_axes: Vec<usize> = (0..self.ndim()).filter(|axis| !point_axes.contains(axis)).collect();
        let rest_chunks: Vec<Vec<usize>> = rest_axes.iter().map(|&axis| self.chunks[axis].clone()).collect();
        let mut out_chunks = vec![vec![num_points]];
        out_chunks.extend(rest_chunks.iter().cloned());
        let rest_chunks = ChunkSpec::new_unchecked(rest_chunks);

        let token = tokenize(&[&self.name, &expanded]);
        let name = format!("vindex-merge-{token}");
        let slice_name = format!("vindex-slice-{token}");
        let locations: Vec<Vec<usize>> = groups.values().map(|group| group.locations.clone()).collect();
        let mut tasks = Tasks::new();
        for rest in BlockIndices::new(&rest_chunks.numblocks()) {
            let mut gathered = Vec::with_capacity(groups.len());
            for (group_index, (blocks, group)) in groups.iter().enumerate() {
                let mut input = vec![0; self.ndim()];
                for (&axis, &block) in point_axes.iter().zip(blocks) {
                    input[axis] = block;
                }
                for (&axis, &block) in rest_axes.iter().zip(&rest) {
                    input[axis] = block;
                }
                let gather: Operation = Arc::new(VindexGather {
                    axes: point_axes.clone(),
                    points: group.points.clone(),
                });
                let mut index = vec![group_index];
                index.extend(&rest);
                let key = GraphKey::new(slice_name.clone(), index);
                tasks.insert(
                    key.clone(),
                    Task::call(&gather, vec![TaskArg::Key(self.key(input))]),
                );
                gathered.push(TaskArg::Key(key));
            }
            let merge: Operation = Arc::new(VindexMerge {
                locations: locations.clone(),
                data_type: self.data_type,
                trailing_shape: rest_chunks.block_shape(&rest).unwrap_or_default(),
            });
            let mut index = vec![0];
            index.extend(rest);
            tasks.insert(
                GraphKey::new(name.clone(), index),
                Task::call(&merge, vec![TaskArg::List(gathered)]),
            );
        }
        Ok(Self::derive(
            name,
            tasks,
            &[self],
            ChunkSpec::new_unchecked(out_chunks),
            self.data_type,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        array::ErrorKind,
        block::Block,
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
    fn vindex_points() {
        let x = arange(&[7, 8], [5, 5]);
        let y = x
            .vindex(&[Index::Array(vec![1, 2, 5, 5]), Index::Array(vec![3, 1, 6, 1])])
            .unwrap();
        assert_eq!(y.shape(), vec![4]);
        assert_eq!(y.chunks().as_slice(), &[vec![4]]);
        assert!(y.name().starts_with("vindex-merge-"));
        assert_eq!(compute(&y), Block::from_vec(&[4], vec![11i64, 17, 46, 41]).unwrap());
        // Points fall in three block combinations: (0, 0), (1, 0) and (1, 1).
        let slices = y
            .graph()
            .layer(y.name())
            .unwrap()
            .keys()
            .filter(|key| key.name().starts_with("vindex-slice-"))
            .count();
        assert_eq!(slices, 3);
    }

    #[test]
    fn vindex_keeps_other_axes() {
        let x = arange(&[4, 3, 5], [2, 3, 2]);
        let y = x
            .vindex(&[Index::Array(vec![3, 0]), Index::full(), Index::Array(vec![-1, 2])])
            .unwrap();
        assert_eq!(y.shape(), vec![2, 3]);
        assert_eq!(y.chunks().as_slice(), &[vec![2], vec![3]]);
        let x_values = compute(&x);
        let x_values = x_values.as_array::<i64>().unwrap();
        let expected: Vec<i64> = [(3, 4), (0, 2)]
            .iter()
            .flat_map(|&(i, k)| (0..3).map(move |j| (i, j, k)))
            .map(|(i, j, k)| x_values[[i, j, k].as_slice()])
            .collect();
        assert_eq!(compute(&y), Block::from_vec(&[2, 3], expected).unwrap());
    }

    #[test]
    fn vindex_one_dimensional_and_empty() {
        let x = arange(&[6], 4);
        let y = x.vindex(&[Index::Array(vec![5, 1, 4])]).unwrap();
        assert_eq!(compute(&y), Block::from_vec(&[3], vec![5i64, 1, 4]).unwrap());

        let z = arange(&[3, 3], 2)
            .vindex(&[Index::Array(vec![]), Index::Array(vec![])])
            .unwrap();
        assert_eq!(z.shape(), vec![0]);
        assert_eq!(compute(&z).shape(), &[0]);
    }

    #[test]
    fn vindex_errors() {
        let x = arange(&[4, 4], 2);
        assert!(matches!(
            x.vindex(&[Index::Array(vec![0, 1])]),
            Err(ArrayError::InvalidIndex(_))
        ));
        assert!(matches!(
            x.vindex(&[Index::Array(vec![0, 1]), Index::Array(vec![0])]),
            Err(ArrayError::InvalidIndex(_))
        ));
        assert!(matches!(
            x.vindex(&[Index::Int(0), Index::Array(vec![0])]),
            Err(ArrayError::InvalidIndex(_))
        ));
        assert!(matches!(
            x.vindex(&[Index::NestedArray(vec![vec![0]]), Index::Array(vec![0])]),
            Err(ArrayError::InvalidIndex(_))
        ));
        assert_eq!(
            x.vindex(&[Index::Array(vec![4]), Index::Array(vec![0])]).unwrap_err().kind(),
            ErrorKind::Index
        );
        assert_eq!(
            x.vindex(&[Index::range(0, 2), Index::Array(vec![0])]).unwrap_err().kind(),
            ErrorKind::NotImplemented
        );
    }
}
