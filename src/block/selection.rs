use std::ops::Range;

use derive_more::{Deref, From};
use itertools::Itertools;
use ndarray::{ArrayD, Axis, Slice, SliceInfo, SliceInfoElem};

use super::{Block, BlockError, Element};

/// A selection along a single axis of a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SliceSpec {
    /// Select `start..stop` with a positive `step`. A [`None`] `stop` selects to the end.
    Range {
        /// The first index.
        start: usize,
        /// The end index (exclusive).
        stop: Option<usize>,
        /// The step.
        step: usize,
    },
    /// Select a single index and drop the axis.
    Index(usize),
    /// Insert a new axis of length 1. Does not consume an axis of the block.
    NewAxis,
    /// Select a list of indices along the axis.
    Points(Vec<usize>),
}

impl SliceSpec {
    /// Select the whole axis.
    #[must_use]
    pub const fn full() -> Self {
        Self::Range {
            start: 0,
            stop: None,
            step: 1,
        }
    }

    /// Select `range` with a step of 1.
    #[must_use]
    pub const fn range(range: Range<usize>) -> Self {
        Self::Range {
            start: range.start,
            stop: Some(range.end),
            step: 1,
        }
    }

    /// Returns true if the spec consumes an axis of the block.
    #[must_use]
    pub const fn consumes_axis(&self) -> bool {
        !matches!(self, Self::NewAxis)
    }
}

impl From<Range<usize>> for SliceSpec {
    fn from(range: Range<usize>) -> Self {
        Self::range(range)
    }
}

impl std::fmt::Display for SliceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Range { start, stop, step } => {
                let stop = stop.map(|stop| stop.to_string()).unwrap_or_default();
                if *step == 1 {
                    write!(f, "{start}:{stop}")
                } else {
                    write!(f, "{start}:{stop}:{step}")
                }
            }
            Self::Index(index) => write!(f, "{index}"),
            Self::NewAxis => write!(f, "None"),
            Self::Points(points) => write!(f, "[{}]", points.iter().join(", ")),
        }
    }
}

/// A selection of a block: one [`SliceSpec`] per axis.
///
/// Trailing axes without a spec are selected in full.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deref, From)]
pub struct Selection(Vec<SliceSpec>);

impl Selection {
    /// Create a new selection.
    #[must_use]
    pub fn new(specs: Vec<SliceSpec>) -> Self {
        Self(specs)
    }

    /// Create a selection of the hyperrectangle `ranges`.
    #[must_use]
    pub fn from_ranges(ranges: &[Range<usize>]) -> Self {
        Self(ranges.iter().cloned().map(SliceSpec::range).collect())
    }

    /// Returns the slice specs.
    #[must_use]
    pub fn specs(&self) -> &[SliceSpec] {
        &self.0
    }
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.iter().join(", "))
    }
}

/// A selection resolved against a block shape.
struct ResolvedSelection {
    elements: Vec<SliceInfoElem>,
    points: Vec<(usize, Vec<usize>)>,
}

fn resolve(selection: &Selection, shape: &[usize]) -> Result<ResolvedSelection, BlockError> {
    let invalid = || BlockError::InvalidSelection {
        selection: selection.to_string(),
        shape: shape.to_vec(),
    };
    let consumed = selection.iter().filter(|spec| spec.consumes_axis()).count();
    if consumed > shape.len() {
        return Err(invalid());
    }

    let mut elements = Vec::with_capacity(selection.len() + shape.len() - consumed);
    let mut points = Vec::new();
    let mut in_axis = 0;
    let mut out_axis = 0;
    for spec in selection.iter() {
        match spec {
            SliceSpec::Range { start, stop, step } => {
                if *step == 0 {
                    return Err(invalid());
                }
                let size = shape[in_axis];
                let stop = stop.unwrap_or(size).min(size);
                let start = (*start).min(stop);
                elements.push(SliceInfoElem::Slice {
                    start: isize::try_from(start).map_err(|_| invalid())?,
                    end: Some(isize::try_from(stop).map_err(|_| invalid())?),
                    step: isize::try_from(*step).map_err(|_| invalid())?,
                });
                in_axis += 1;
                out_axis += 1;
            }
            SliceSpec::Index(index) => {
                let size = shape[in_axis];
                if *index >= size {
                    return Err(BlockError::IndexOutOfBounds {
                        index: *index,
                        axis: in_axis,
                        size,
                    });
                }
                elements.push(SliceInfoElem::Index(
                    isize::try_from(*index).map_err(|_| invalid())?,
                ));
                in_axis += 1;
            }
            SliceSpec::NewAxis => {
                elements.push(SliceInfoElem::NewAxis);
                out_axis += 1;
            }
            SliceSpec::Points(indices) => {
                let size = shape[in_axis];
                if let Some(index) = indices.iter().find(|index| **index >= size) {
                    return Err(BlockError::IndexOutOfBounds {
                        index: *index,
                        axis: in_axis,
                        size,
                    });
                }
                elements.push(SliceInfoElem::from(..));
                points.push((out_axis, indices.clone()));
                in_axis += 1;
                out_axis += 1;
            }
        }
    }
    elements.extend((in_axis..shape.len()).map(|_| SliceInfoElem::from(..)));
    Ok(ResolvedSelection { elements, points })
}

fn select_typed<T: Element>(
    array: &ArrayD<T>,
    resolved: &ResolvedSelection,
) -> Result<ArrayD<T>, BlockError> {
    let info = SliceInfo::<_, ndarray::IxDyn, ndarray::IxDyn>::try_from(
        resolved.elements.clone(),
    )?;
    let mut output = array.slice(&info).to_owned();
    for (axis, indices) in &resolved.points {
        output = output.select(Axis(*axis), indices);
    }
    Ok(output)
}

fn assign_typed<T: Element>(
    array: &mut ArrayD<T>,
    region: &[Range<usize>],
    value: &Block,
) -> Result<(), BlockError> {
    let value = value.cast_cow::<T>();
    let mut view = array.slice_each_axis_mut(|axis| Slice::from(region[axis.axis.index()].clone()));
    if view.shape() != value.shape() {
        return Err(BlockError::IncompatibleShapes(
            view.shape().to_vec(),
            value.shape().to_vec(),
        ));
    }
    view.assign(&*value);
    Ok(())
}

impl Block {
    /// Overwrite the hyperrectangle `region` of the block with `value`, converting `value` to the block data type.
    ///
    /// # Errors
    /// Returns a [`BlockError`] if `region` is out of bounds or does not match the shape of `value`.
    pub fn assign(&mut self, region: &[Range<usize>], value: &Self) -> Result<(), BlockError> {
        let in_bounds = region.len() == self.ndim()
            && std::iter::zip(region, self.shape())
                .all(|(range, &size)| range.start <= range.end && range.end <= size);
        if !in_bounds {
            return Err(BlockError::InvalidSelection {
                selection: format!("{region:?}"),
                shape: self.shape().to_vec(),
            });
        }
        with_block!(self, array => assign_typed(array, region, value))
    }

    /// Select a region of the block.
    ///
    /// # Errors
    /// Returns a [`BlockError`] if the selection is incompatible with the block shape.
    pub fn select(&self, selection: &Selection) -> Result<Self, BlockError> {
        let resolved = resolve(selection, self.shape())?;
        Ok(try_map_block!(self, array => select_typed(array, &resolved)))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, ArrayD};

    use super::*;

    fn block_4x6() -> Block {
        let array = ArrayD::from_shape_vec(vec![4, 6], (0..24i64).collect()).unwrap();
        Block::from(array)
    }

    #[test]
    fn select_ranges() {
        let block = block_4x6();
        let selected = block
            .select(&Selection::from_ranges(&[1..3, 2..4]))
            .unwrap();
        assert_eq!(
            selected.as_array::<i64>().unwrap(),
            &array![[8i64, 9], [14, 15]].into_dyn()
        );
    }

    #[test]
    fn select_index_newaxis_points() {
        let block = block_4x6();
        let selection = Selection::new(vec![
            SliceSpec::Index(1),
            SliceSpec::NewAxis,
            SliceSpec::Points(vec![5, 0, 0]),
        ]);
        let selected = block.select(&selection).unwrap();
        assert_eq!(selected.shape(), &[1, 3]);
        assert_eq!(
            selected.as_array::<i64>().unwrap(),
            &array![[11i64, 6, 6]].into_dyn()
        );
    }

    #[test]
    fn select_step_and_empty() {
        let block = block_4x6();
        let selection = Selection::new(vec![SliceSpec::Range {
            start: 0,
            stop: None,
            step: 3,
        }]);
        assert_eq!(block.select(&selection).unwrap().shape(), &[2, 6]);
        let empty = block.select(&Selection::from_ranges(&[2..2])).unwrap();
        assert_eq!(empty.shape(), &[0, 6]);
    }

    #[test]
    fn assign_region() {
        let mut block = Block::zeros(crate::block::DataType::Float64, &[3, 3]);
        let value = Block::from_vec(&[2, 1], vec![1i32, 2]).unwrap();
        block.assign(&[1..3, 2..3], &value).unwrap();
        assert_eq!(
            block.as_array::<f64>().unwrap(),
            &array![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 2.0]].into_dyn()
        );
        assert!(block.assign(&[0..4, 0..1], &value).is_err());
        assert!(block.assign(&[0..1, 0..1], &value).is_err());
    }

    #[test]
    fn select_invalid() {
        let block = block_4x6();
        assert!(block
            .select(&Selection::new(vec![SliceSpec::Index(4)]))
            .is_err());
        assert!(block
            .select(&Selection::new(vec![SliceSpec::full(); 3]))
            .is_err());
    }
}
