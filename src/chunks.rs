//! Chunk metadata.
//!
//! A [`ChunkSpec`] records the block sizes along every axis of a chunked array.
//! Blocks along an axis may be irregular, but their sizes always add up to the axis extent.
//! A zero-length axis is represented by a single block of size zero.
//!
//! [`normalize_chunks`] converts the many ways a user can describe chunking ([`ChunksArg`]) into a [`ChunkSpec`].

mod block_indices;

pub use block_indices::{ravel_index, unravel_index, BlockIndices};

use std::{fmt::Display, ops::Range};

use derive_more::Deref;
use itertools::Itertools;
use num::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::array::ArrayError;

/// Format values like a tuple, e.g. `(4,)` or `(2, 3)`.
pub(crate) fn fmt_tuple<T: Display>(values: &[T]) -> String {
    if values.len() == 1 {
        format!("({},)", values[0])
    } else {
        format!("({})", values.iter().join(", "))
    }
}

/// The block sizes along each axis of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deref, Serialize, Deserialize)]
pub struct ChunkSpec(Vec<Vec<usize>>);

impl ChunkSpec {
    /// Create a new chunk specification from block sizes along each axis.
    ///
    /// # Errors
    /// Returns [`ArrayError::InvalidChunkSize`] if any axis has no blocks.
    pub fn new(chunks: Vec<Vec<usize>>) -> Result<Self, ArrayError> {
        if let Some(axis) = chunks.iter().position(Vec::is_empty) {
            return Err(ArrayError::InvalidChunkSize(format!(
                "axis {axis} has no blocks"
            )));
        }
        Ok(Self(chunks))
    }

    /// Create a new chunk specification without validation.
    pub(crate) fn new_unchecked(chunks: Vec<Vec<usize>>) -> Self {
        debug_assert!(chunks.iter().all(|axis| !axis.is_empty()));
        Self(chunks)
    }

    /// Create a chunk specification with uniform blocks of `block_shape` covering `shape`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the dimensionalities differ or a block size is zero.
    pub fn regular(shape: &[usize], block_shape: &[usize]) -> Result<Self, ArrayError> {
        blockdims_from_blockshape(shape, block_shape)
    }

    /// Returns the block sizes along each axis.
    #[must_use]
    pub fn as_slice(&self) -> &[Vec<usize>] {
        &self.0
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Returns the array shape.
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        self.0.iter().map(|axis| axis.iter().sum()).collect()
    }

    /// Returns the number of blocks along each axis.
    #[must_use]
    pub fn numblocks(&self) -> Vec<usize> {
        self.0.iter().map(Vec::len).collect()
    }

    /// Returns the total number of blocks.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.0.iter().map(Vec::len).product()
    }

    /// Returns the largest block size along each axis.
    #[must_use]
    pub fn max_block_shape(&self) -> Vec<usize> {
        self.0
            .iter()
            .map(|axis| axis.iter().copied().max().unwrap_or(0))
            .collect()
    }

    /// Returns the block boundaries along `axis`: `[0, b0, b0 + b1, ..., extent]`.
    ///
    /// # Panics
    /// Panics if `axis` is out of range.
    #[must_use]
    pub fn offsets(&self, axis: usize) -> Vec<usize> {
        std::iter::once(0)
            .chain(self.0[axis].iter().scan(0, |offset, &size| {
                *offset += size;
                Some(*offset)
            }))
            .collect()
    }

    /// Returns the shape of the block at `coordinates`, or [`None`] if the coordinates are out of bounds.
    #[must_use]
    pub fn block_shape(&self, coordinates: &[usize]) -> Option<Vec<usize>> {
        if coordinates.len() != self.ndim() {
            return None;
        }
        std::iter::zip(&self.0, coordinates)
            .map(|(axis, &coordinate)| axis.get(coordinate).copied())
            .collect()
    }

    /// Returns the element ranges covered by the block at `coordinates`, or [`None`] if the coordinates are out of bounds.
    #[must_use]
    pub fn block_ranges(&self, coordinates: &[usize]) -> Option<Vec<Range<usize>>> {
        if coordinates.len() != self.ndim() {
            return None;
        }
        coordinates
            .iter()
            .enumerate()
            .map(|(axis, &coordinate)| {
                let size = *self.0[axis].get(coordinate)?;
                let start: usize = self.0[axis][..coordinate].iter().sum();
                Some(start..start + size)
            })
            .collect()
    }

    /// Locate element `index` along `axis`, returning the block coordinate and the index within the block.
    ///
    /// Returns [`None`] if `index` is out of bounds.
    #[must_use]
    pub fn locate(&self, axis: usize, index: usize) -> Option<(usize, usize)> {
        let offsets = self.offsets(axis);
        let extent = *offsets.last()?;
        if index >= extent {
            return None;
        }
        let block = offsets.partition_point(|&offset| offset <= index) - 1;
        Some((block, index - offsets[block]))
    }

    /// Returns an iterator over the coordinates of every block in C order.
    #[must_use]
    pub fn block_indices(&self) -> BlockIndices {
        BlockIndices::new(&self.numblocks())
    }

    /// Consume the chunk specification and return the block sizes along each axis.
    #[must_use]
    pub fn into_inner(self) -> Vec<Vec<usize>> {
        self.0
    }
}

impl Display for ChunkSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let axes: Vec<String> = self.0.iter().map(|axis| fmt_tuple(axis)).collect();
        write!(f, "{}", fmt_tuple(&axes))
    }
}

/// The chunking of a single axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkDimension {
    /// Uniform blocks of the given size, with a smaller final block if the extent is not divisible.
    Fixed(usize),
    /// Explicit block sizes.
    Varying(Vec<usize>),
    /// A single block spanning the axis.
    Full,
}

impl From<usize> for ChunkDimension {
    fn from(size: usize) -> Self {
        Self::Fixed(size)
    }
}

impl From<Vec<usize>> for ChunkDimension {
    fn from(sizes: Vec<usize>) -> Self {
        Self::Varying(sizes)
    }
}

impl From<Option<usize>> for ChunkDimension {
    fn from(size: Option<usize>) -> Self {
        size.map_or(Self::Full, Self::Fixed)
    }
}

/// A description of the chunking of an array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunksArg {
    /// The same block size along every axis.
    Uniform(usize),
    /// A chunking per axis.
    PerAxis(Vec<ChunkDimension>),
    /// A fully specified chunking.
    Spec(ChunkSpec),
}

impl From<usize> for ChunksArg {
    fn from(size: usize) -> Self {
        Self::Uniform(size)
    }
}

impl From<Vec<usize>> for ChunksArg {
    fn from(block_shape: Vec<usize>) -> Self {
        Self::PerAxis(block_shape.into_iter().map(ChunkDimension::Fixed).collect())
    }
}

impl<const N: usize> From<[usize; N]> for ChunksArg {
    fn from(block_shape: [usize; N]) -> Self {
        Self::PerAxis(block_shape.into_iter().map(ChunkDimension::Fixed).collect())
    }
}

impl From<&[usize]> for ChunksArg {
    fn from(block_shape: &[usize]) -> Self {
        Self::PerAxis(block_shape.iter().copied().map(ChunkDimension::Fixed).collect())
    }
}

impl From<Vec<Vec<usize>>> for ChunksArg {
    fn from(chunks: Vec<Vec<usize>>) -> Self {
        Self::PerAxis(chunks.into_iter().map(ChunkDimension::Varying).collect())
    }
}

impl From<Vec<Option<usize>>> for ChunksArg {
    fn from(block_shape: Vec<Option<usize>>) -> Self {
        Self::PerAxis(block_shape.into_iter().map(ChunkDimension::from).collect())
    }
}

impl<const N: usize> From<[Option<usize>; N]> for ChunksArg {
    fn from(block_shape: [Option<usize>; N]) -> Self {
        Self::PerAxis(block_shape.into_iter().map(ChunkDimension::from).collect())
    }
}

impl From<Vec<ChunkDimension>> for ChunksArg {
    fn from(dimensions: Vec<ChunkDimension>) -> Self {
        Self::PerAxis(dimensions)
    }
}

impl From<ChunkSpec> for ChunksArg {
    fn from(chunks: ChunkSpec) -> Self {
        Self::Spec(chunks)
    }
}

impl From<&ChunkSpec> for ChunksArg {
    fn from(chunks: &ChunkSpec) -> Self {
        Self::Spec(chunks.clone())
    }
}

/// Uniform blocks of `block_size` covering `extent`, with a smaller final block if needed.
fn uniform(block_size: usize, extent: usize) -> Result<Vec<usize>, ArrayError> {
    if extent == 0 {
        return Ok(vec![0]);
    }
    if block_size == 0 {
        return Err(ArrayError::InvalidChunkSize(
            "0 for a non-empty axis".to_string(),
        ));
    }
    let mut sizes = vec![block_size; extent / block_size];
    if extent % block_size != 0 {
        sizes.push(extent % block_size);
    }
    Ok(sizes)
}

/// Convert a size to `usize`, accepting only exact non-negative integral values.
fn coerce_size<T: ToPrimitive>(value: &T) -> Result<usize, ArrayError> {
    let as_float = value.to_f64().unwrap_or(f64::NAN);
    value
        .to_usize()
        .filter(|_| as_float.fract() == 0.0)
        .ok_or_else(|| ArrayError::InvalidChunkSize(as_float.to_string()))
}

/// Expand a shape and a uniform block shape into block sizes along each axis.
///
/// Sizes may be given as any primitive numeric type, but must be exact non-negative integers.
///
/// # Errors
/// Returns an [`ArrayError`] if the dimensionalities differ, a size is not integral, or a block size is zero.
pub fn blockdims_from_blockshape<S: ToPrimitive, B: ToPrimitive>(
    shape: &[S],
    block_shape: &[B],
) -> Result<ChunkSpec, ArrayError> {
    if shape.len() != block_shape.len() {
        return Err(ArrayError::DimensionalityMismatch {
            expected: shape.len(),
            got: block_shape.len(),
        });
    }
    std::iter::zip(shape, block_shape)
        .map(|(extent, block_size)| uniform(coerce_size(block_size)?, coerce_size(extent)?))
        .collect::<Result<Vec<_>, _>>()
        .map(ChunkSpec::new_unchecked)
}

/// Convert a chunk description into block sizes along each axis.
///
/// `shape` is required unless every axis is given explicit block sizes.
///
/// # Errors
/// Returns an [`ArrayError`] if
///  - the chunks need a shape and none was given,
///  - the chunks and shape have different dimensionality, or
///  - explicit block sizes do not add up to the shape.
pub fn normalize_chunks(
    chunks: impl Into<ChunksArg>,
    shape: Option<&[usize]>,
) -> Result<ChunkSpec, ArrayError> {
    let chunks = chunks.into();
    let missing_shape = || ArrayError::MissingShape(format!("{chunks:?}"));
    match &chunks {
        ChunksArg::Spec(spec) => {
            if let Some(shape) = shape {
                if spec.shape() != shape {
                    return Err(ArrayError::ChunksShapeMismatch {
                        chunks: spec.to_string(),
                        shape: shape.to_vec(),
                    });
                }
            }
            Ok(spec.clone())
        }
        ChunksArg::Uniform(block_size) => {
            let shape = shape.ok_or_else(missing_shape)?;
            shape
                .iter()
                .map(|&extent| uniform(*block_size, extent))
                .collect::<Result<Vec<_>, _>>()
                .map(ChunkSpec::new_unchecked)
        }
        ChunksArg::PerAxis(dimensions) => {
            if let Some(shape) = shape {
                if shape.len() != dimensions.len() {
                    return Err(ArrayError::DimensionalityMismatch {
                        expected: shape.len(),
                        got: dimensions.len(),
                    });
                }
            }
            let axes = dimensions
                .iter()
                .enumerate()
                .map(|(axis, dimension)| {
                    let extent = shape.map(|shape| shape[axis]);
                    match dimension {
                        ChunkDimension::Fixed(block_size) => {
                            uniform(*block_size, extent.ok_or_else(missing_shape)?)
                        }
                        ChunkDimension::Full => {
                            Ok(vec![extent.ok_or_else(missing_shape)?])
                        }
                        ChunkDimension::Varying(sizes) => {
                            if sizes.is_empty() {
                                return Err(ArrayError::InvalidChunkSize(format!(
                                    "axis {axis} has no blocks"
                                )));
                            }
                            if let Some(extent) = extent {
                                if sizes.iter().sum::<usize>() != extent {
                                    return Err(ArrayError::ChunksShapeMismatch {
                                        chunks: fmt_tuple(sizes),
                                        shape: vec![extent],
                                    });
                                }
                            }
                            Ok(sizes.clone())
                        }
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ChunkSpec::new_unchecked(axes))
        }
    }
}

/// Broadcast chunk specifications against each other, aligning trailing axes.
///
/// A single block of size one broadcasts against any chunking; all other chunkings of an axis must be identical.
///
/// # Errors
/// Returns [`ArrayError::IncompatibleChunks`] if two chunkings of an axis differ.
pub fn broadcast_chunks(chunks: &[&ChunkSpec]) -> Result<ChunkSpec, ArrayError> {
    let ndim = chunks.iter().map(|spec| spec.ndim()).max().unwrap_or(0);
    let axes = (0..ndim)
        .map(|axis| {
            let candidates: Vec<&Vec<usize>> = chunks
                .iter()
                .filter_map(|spec| {
                    let offset = ndim - spec.ndim();
                    axis.checked_sub(offset).map(|axis| &spec.0[axis])
                })
                .filter(|sizes| sizes.as_slice() != [1])
                .unique()
                .collect();
            match candidates.as_slice() {
                [] => Ok(vec![1]),
                [sizes] => Ok((*sizes).clone()),
                _ => Err(ArrayError::IncompatibleChunks(format!(
                    "axis {axis} has chunks {}",
                    candidates.iter().map(|sizes| fmt_tuple(sizes)).join(" and ")
                ))),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ChunkSpec::new_unchecked(axes))
}

/// The coarsest block sizes whose boundaries include the boundaries of both `a` and `b`.
///
/// `a` and `b` must cover the same extent.
#[must_use]
pub fn common_refinement(a: &[usize], b: &[usize]) -> Vec<usize> {
    let boundaries = |sizes: &[usize]| -> Vec<usize> {
        sizes
            .iter()
            .scan(0, |offset, &size| {
                *offset += size;
                Some(*offset)
            })
            .collect()
    };
    let merged: Vec<usize> = boundaries(a)
        .into_iter()
        .merge(boundaries(b))
        .dedup()
        .filter(|&boundary| boundary > 0)
        .collect();
    if merged.is_empty() {
        return vec![0];
    }
    std::iter::once(0)
        .chain(merged.iter().copied())
        .tuple_windows()
        .map(|(start, end)| end - start)
        .collect()
}
