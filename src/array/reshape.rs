use std::sync::Arc;

use super::{Array, ArrayError, Index};
use crate::{
    chunks::{ChunkDimension, ChunkSpec, ChunksArg},
    graph::{GraphKey, Operation, Task, TaskArg, Tasks, Value},
    operations::Reshape,
    tokenize::name_for,
};

/// Resolve a shape with at most one unknown (`-1`) extent against `size` elements.
fn resolve_shape(from: &[usize], shape: &[isize]) -> Result<Vec<usize>, ArrayError> {
    let size: usize = from.iter().product();
    let mismatch = || ArrayError::ReshapeSize {
        from: from.to_vec(),
        to: shape.to_vec(),
    };
    if shape.iter().filter(|&&extent| extent == -1).count() > 1 {
        return Err(ArrayError::InvalidArgument(
            "can only specify one unknown dimension".to_string(),
        ));
    }
    if shape.iter().any(|&extent| extent < -1) {
        return Err(ArrayError::InvalidArgument(format!(
            "negative dimensions are not allowed: {shape:?}"
        )));
    }
    let known: usize = shape
        .iter()
        .filter(|&&extent| extent != -1)
        .map(|&extent| extent.unsigned_abs())
        .product();
    let resolved: Vec<usize> = shape
        .iter()
        .map(|&extent| {
            if extent == -1 {
                if known == 0 || size % known != 0 {
                    Err(mismatch())
                } else {
                    Ok(size / known)
                }
            } else {
                Ok(extent.unsigned_abs())
            }
        })
        .collect::<Result<_, _>>()?;
    if resolved.iter().product::<usize>() == size {
        Ok(resolved)
    } else {
        Err(mismatch())
    }
}

impl Array {
    /// Reshape the array in row-major order. One extent of `shape` may be `-1`, inferred from the size of the array.
    ///
    /// The array is flattened with [`ravel`](Array::ravel) and then unflattened with [`unravel`](Array::unravel).
    /// Both steps reshape every block independently when the block boundaries align with the new shape, and
    /// otherwise rechunk first.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `shape` has more than one unknown extent, a negative extent, or a different size.
    pub fn reshape(&self, shape: &[isize]) -> Result<Self, ArrayError> {
        let shape = resolve_shape(&self.shape(), shape)?;
        if shape == self.shape() {
            return Ok(self.clone());
        }
        let flat = self.ravel()?;
        if shape.len() == 1 {
            Ok(flat)
        } else {
            flat.unravel(&shape)
        }
    }

    /// Flatten the array in row-major order.
    ///
    /// Each block spanning every axis after the first becomes one block of the output. Other arrays are first
    /// rechunked to a single block along every axis after the first, which makes each output block depend on a
    /// whole row of input blocks.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the graph cannot be built.
    pub fn ravel(&self) -> Result<Self, ArrayError> {
        match self.ndim() {
            0 => return self.get(&[Index::NewAxis]),
            1 => return Ok(self.clone()),
            _ => {}
        }
        let aligned = self.numblocks()[1..].iter().all(|&blocks| blocks == 1);
        let source = if aligned {
            self.clone()
        } else {
            log::warn!(
                "ravel of {} with chunks {} rechunks every axis after the first into a single block",
                self.name,
                self.chunks
            );
            let mut chunks = vec![ChunkDimension::Varying(self.chunks[0].clone())];
            chunks.extend(std::iter::repeat(ChunkDimension::Full).take(self.ndim() - 1));
            self.rechunk(ChunksArg::PerAxis(chunks))?
        };

        let row: usize = source.shape()[1..].iter().product();
        let out_chunks: Vec<usize> = source.chunks[0].iter().map(|&size| size * row).collect();
        let name = name_for("ravel", &[&source.name]);
        let operation: Operation = Arc::new(Reshape);
        let tasks: Tasks = out_chunks
            .iter()
            .enumerate()
            .map(|(block, &size)| {
                let mut input = vec![0; source.ndim()];
                input[0] = block;
                let task = Task::call(
                    &operation,
                    vec![
                        TaskArg::Key(source.key(input)),
                        TaskArg::Value(Value::Shape(vec![size])),
                    ],
                );
                (GraphKey::new(name.clone(), vec![block]), task)
            })
            .collect();
        Ok(Self::derive(
            name,
            tasks,
            &[&source],
            ChunkSpec::new_unchecked(vec![out_chunks]),
            self.data_type,
        ))
    }

    /// Unflatten a one-dimensional array into `shape` in row-major order.
    ///
    /// Each block whose size is a multiple of the size of the trailing axes of `shape` becomes one block of the
    /// output. Other arrays are first rechunked to such multiples.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the array is not one-dimensional or `shape` has a different size.
    pub fn unravel(&self, shape: &[usize]) -> Result<Self, ArrayError> {
        if self.ndim() != 1 {
            return Err(ArrayError::DimensionalityMismatch {
                expected: 1,
                got: self.ndim(),
            });
        }
        let size = self.size();
        if shape.iter().product::<usize>() != size {
            return Err(ArrayError::ReshapeSize {
                from: self.shape(),
                to: shape
                    .iter()
                    .map(|&extent| isize::try_from(extent).unwrap_or(isize::MAX))
                    .collect(),
            });
        }
        if shape == self.shape() {
            return Ok(self.clone());
        }

        let row: usize = shape.iter().skip(1).product();
        let aligned = if shape.is_empty() || row == 0 {
            self.numblocks()[0] == 1
        } else {
            self.chunks[0].iter().all(|&size| size % row == 0)
        };
        let source = if aligned {
            self.clone()
        } else {
            let block = if shape.is_empty() || row == 0 {
                size
            } else {
                let largest = self.chunks[0].iter().copied().max().unwrap_or(0);
                (largest / row).max(1) * row
            };
            log::warn!(
                "unravel of {} with chunks {} to shape {shape:?} rechunks to blocks of {block}",
                self.name,
                self.chunks
            );
            self.rechunk(block)?
        };

        let mut out_chunks: Vec<Vec<usize>> = Vec::with_capacity(shape.len());
        if let Some((&first, rest)) = shape.split_first() {
            out_chunks.push(if row == 0 {
                vec![first]
            } else {
                source.chunks[0].iter().map(|&size| size / row).collect()
            });
            out_chunks.extend(rest.iter().map(|&extent| vec![extent]));
        }
        let out_chunks = ChunkSpec::new_unchecked(out_chunks);
        let name = name_for("unravel", &[&source.name, &shape.to_vec()]);
        let operation: Operation = Arc::new(Reshape);
        let tasks: Tasks = out_chunks
            .block_indices()
            .map(|coordinates| {
                let block = coordinates.first().copied().unwrap_or(0);
                let block_shape = out_chunks.block_shape(&coordinates).unwrap_or_default();
                let task = Task::call(
                    &operation,
                    vec![
                        TaskArg::Key(source.key(vec![block])),
                        TaskArg::Value(Value::Shape(block_shape)),
                    ],
                );
                (GraphKey::new(name.clone(), coordinates), task)
            })
            .collect();
        Ok(Self::derive(name, tasks, &[&source], out_chunks, self.data_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{array::ErrorKind, block::Block, config::ComputeConfig};

    fn arange(shape: &[usize], chunks: impl Into<ChunksArg>) -> Array {
        let n: usize = shape.iter().product();
        Array::from_block(Block::from_vec(shape, (0..n as i64).collect()).unwrap(), chunks).unwrap()
    }

    fn compute(array: &Array) -> Block {
        array.compute(&ComputeConfig::synchronous()).unwrap()
    }

    fn rechunked(array: &Array) -> bool {
        array.graph().layer_names().any(|name| name.starts_with("rechunk-"))
    }

    #[test]
    fn resolve_unknown_extent() {
        assert_eq!(resolve_shape(&[2, 12], &[-1]).unwrap(), vec![24]);
        assert_eq!(resolve_shape(&[2, 12], &[-1, 3, 4]).unwrap(), vec![2, 3, 4]);
        assert!(matches!(
            resolve_shape(&[24], &[-1, -1]),
            Err(ArrayError::InvalidArgument(_))
        ));
        assert!(matches!(
            resolve_shape(&[24], &[5, -1]),
            Err(ArrayError::ReshapeSize { .. })
        ));
        assert!(matches!(
            resolve_shape(&[24], &[100]),
            Err(ArrayError::ReshapeSize { .. })
        ));
        assert!(resolve_shape(&[24], &[-2, -12]).is_err());
    }

    #[test]
    fn reshape_values() {
        let shapes: [&[usize]; 3] = [&[24], &[2, 12], &[2, 3, 4]];
        for from in shapes {
            for to in shapes {
                for chunks in [2, 4, 12] {
                    let x = arange(from, chunks);
                    let to_signed: Vec<isize> = to.iter().map(|&extent| extent as isize).collect();
                    let y = x.reshape(&to_signed).unwrap();
                    assert_eq!(y.shape(), to.to_vec());
                    assert_eq!(compute(&y), compute(&x).reshape(to).unwrap());
                }
            }
        }
        let err = arange(&[24], 4).reshape(&[100]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
    }

    #[test]
    fn ravel_shortcut() {
        for chunks in [[4, 6], [2, 6]] {
            let x = arange(&[4, 6], chunks);
            let y = x.ravel().unwrap();
            assert_eq!(y.graph().len(), x.graph().len() + x.chunks()[0].len());
            assert!(!rechunked(&y));
            assert_eq!(compute(&y), compute(&x).reshape(&[24]).unwrap());
        }
        for chunks in [[4, 2], [2, 2]] {
            let x = arange(&[4, 6], chunks);
            let y = x.ravel().unwrap();
            assert!(rechunked(&y));
            assert_eq!(compute(&y), compute(&x).reshape(&[24]).unwrap());
        }
        let x = arange(&[4, 6], 2);
        let scalar = x.get(&[Index::Int(0), Index::Int(1)]).unwrap();
        assert_eq!(scalar.ravel().unwrap().shape(), vec![1]);
        let flat = x.ravel().unwrap();
        assert_eq!(flat.ravel().unwrap().name(), flat.name());
    }

    #[test]
    fn unravel_shortcut() {
        let aligned: [(ChunksArg, &[usize]); 6] = [
            (24.into(), &[3, 8]),
            (24.into(), &[12, 2]),
            (6.into(), &[4, 6]),
            (6.into(), &[4, 3, 2]),
            (6.into(), &[4, 6, 1]),
            (vec![vec![6, 12, 6]].into(), &[4, 6]),
        ];
        for (chunks, shape) in aligned {
            let x = arange(&[24], chunks);
            let y = x.unravel(shape).unwrap();
            assert_eq!(y.graph().len(), x.graph().len() + x.chunks()[0].len());
            assert!(!rechunked(&y));
            assert_eq!(compute(&y), compute(&x).reshape(shape).unwrap());
        }
        let unaligned: [&[usize]; 3] = [&[2, 12], &[1, 4, 6], &[2, 1, 12]];
        for shape in unaligned {
            let x = arange(&[24], 6);
            let y = x.unravel(shape).unwrap();
            assert!(rechunked(&y));
            assert_eq!(compute(&y), compute(&x).reshape(shape).unwrap());
        }
        let x = arange(&[24], 6);
        assert_eq!(x.unravel(&[24]).unwrap().name(), x.name());
        assert!(x.unravel(&[5, 5]).is_err());
        assert!(arange(&[4, 6], 2).unravel(&[24]).is_err());
    }

    #[test]
    fn reshape_single_block() {
        let x = arange(&[10, 20], 20);
        let y = x.reshape(&[20, 10]).unwrap();
        assert_eq!(y.graph().len(), x.graph().len() + 2);
        assert_eq!(compute(&y), compute(&x).reshape(&[20, 10]).unwrap());

        let one = arange(&[1, 1], 1);
        let scalar = one.reshape(&[]).unwrap();
        assert_eq!(scalar.ndim(), 0);
        assert_eq!(compute(&scalar).shape(), &[] as &[usize]);
    }
}
