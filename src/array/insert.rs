use super::{
    concatenate, creation::full, normalize_axis, Array, ArrayError, Index, Operand,
};

/// The positions of [`insert`], before which values are inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertIndex {
    /// A single position. Array values gain a new axis of extent one at the insertion axis.
    Scalar(isize),
    /// A list of positions, in non-decreasing order once negative positions are resolved.
    List(Vec<isize>),
    /// The positions of a slice of the axis.
    Slice {
        /// The first position, or [`None`] for the start.
        start: Option<isize>,
        /// The end position (exclusive), or [`None`] for the end.
        stop: Option<isize>,
        /// The step, which must not be zero.
        step: isize,
    },
}

impl From<isize> for InsertIndex {
    fn from(index: isize) -> Self {
        Self::Scalar(index)
    }
}

impl From<Vec<isize>> for InsertIndex {
    fn from(indices: Vec<isize>) -> Self {
        Self::List(indices)
    }
}

/// The positions selected by a slice of an axis of extent `extent`.
fn slice_positions(start: Option<isize>, stop: Option<isize>, step: isize, extent: isize) -> Vec<isize> {
    let clamp = |bound: isize, low: isize, high: isize| {
        let bound = if bound < 0 { bound + extent } else { bound };
        bound.clamp(low, high)
    };
    if step > 0 {
        let start = start.map_or(0, |start| clamp(start, 0, extent));
        let stop = stop.map_or(extent, |stop| clamp(stop, 0, extent));
        (start..stop).step_by(step.unsigned_abs()).collect()
    } else {
        let start = start.map_or(extent - 1, |start| clamp(start, -1, extent - 1));
        let stop = stop.map_or(-1, |stop| clamp(stop, -1, extent - 1));
        let mut positions = Vec::new();
        let mut position = start;
        while position > stop {
            positions.push(position);
            position += step;
        }
        positions
    }
}

/// Split `array` along `axis` before each of `breaks`.
fn split_at_breaks(array: &Array, breaks: &[usize], axis: usize) -> Result<Vec<Array>, ArrayError> {
    let bounds: Vec<Option<isize>> = std::iter::once(None)
        .chain(breaks.iter().map(|&position| isize::try_from(position).ok()))
        .chain(std::iter::once(None))
        .collect();
    bounds
        .windows(2)
        .map(|bounds| {
            let mut index = vec![Index::full(); axis];
            index.push(Index::Slice {
                start: bounds[0],
                stop: bounds[1],
                step: 1,
            });
            array.get(&index)
        })
        .collect()
}

/// Broadcast array values to the inserted region and match the chunks of `array` on the other axes.
fn align_values(
    array: &Array,
    values: Array,
    values_shape: &[usize],
    axis: usize,
    scalar_position: bool,
) -> Result<Array, ArrayError> {
    let values = if scalar_position && values.ndim() > 0 {
        let mut index = vec![Index::full(); axis];
        index.push(Index::NewAxis);
        values.get(&index)?
    } else {
        values
    };
    let values = values.broadcast_to(values_shape)?;
    let chunks: Vec<Vec<usize>> = (0..values.ndim())
        .map(|index| {
            if index == axis {
                values.chunks()[index].clone()
            } else {
                array.chunks()[index].clone()
            }
        })
        .collect();
    values.rechunk(chunks)
}

/// Insert values before the given positions along an axis.
///
/// Scalar values are repeated at every position. Array values are broadcast to the shape of the inserted region and
/// split between the positions. The array is split at every distinct position and the pieces of the array and of the
/// values are interleaved and concatenated.
///
/// # Errors
/// Returns an [`ArrayError`] if
///  - `axis` is out of range,
///  - a position is out of range,
///  - the positions are not in non-decreasing order, which is unsupported, or
///  - the values cannot be broadcast to the inserted region.
pub fn insert<'a>(
    array: &Array,
    positions: impl Into<InsertIndex>,
    values: impl Into<Operand<'a>>,
    axis: isize,
) -> Result<Array, ArrayError> {
    let axis = normalize_axis(axis, array.ndim())
        .map_err(|error| ArrayError::InvalidIndex(error.to_string()))?;
    let shape = array.shape();
    let extent = isize::try_from(shape[axis])
        .map_err(|_| ArrayError::InvalidArgument(format!("axis extent {} is too large", shape[axis])))?;
    let positions = positions.into();
    let scalar_position = matches!(positions, InsertIndex::Scalar(_));
    let positions: Vec<isize> = match positions {
        InsertIndex::Scalar(position) => vec![position],
        InsertIndex::List(positions) => positions,
        InsertIndex::Slice { step: 0, .. } => {
            return Err(ArrayError::InvalidArgument(
                "slice step cannot be zero".to_string(),
            ))
        }
        InsertIndex::Slice { start, stop, step } => slice_positions(start, stop, step, extent),
    };
    let positions: Vec<usize> = positions
        .into_iter()
        .map(|position| {
            let resolved = if position < 0 { position + extent } else { position };
            usize::try_from(resolved)
                .ok()
                .filter(|&resolved| resolved <= shape[axis])
                .ok_or(ArrayError::IndexOutOfBounds {
                    index: position,
                    axis,
                    size: shape[axis],
                })
        })
        .collect::<Result<_, _>>()?;
    if positions.windows(2).any(|pair| pair[1] < pair[0]) {
        return Err(ArrayError::Unsupported(
            "insert is only implemented for non-decreasing positions".to_string(),
        ));
    }

    let mut values_shape = shape.clone();
    values_shape[axis] = positions.len();
    let values = match values.into() {
        Operand::Scalar(scalar) => {
            let chunks: Vec<Vec<usize>> = array
                .chunks()
                .iter()
                .enumerate()
                .map(|(index, chunks)| {
                    if index == axis {
                        vec![positions.len()]
                    } else {
                        chunks.clone()
                    }
                })
                .collect();
            full(
                &values_shape,
                chunks,
                scalar,
                Some(scalar.promote_with(array.data_type())),
            )?
        }
        Operand::Array(values) => {
            align_values(array, values.clone(), &values_shape, axis, scalar_position)?
        }
        Operand::External(block) => {
            let chunks = block.shape().to_vec();
            let values = Array::from_block(block, chunks)?;
            align_values(array, values, &values_shape, axis, scalar_position)?
        }
    };

    let mut breaks = positions.clone();
    breaks.dedup();
    let array_pieces = split_at_breaks(array, &breaks, axis)?;
    // Values inserted before each distinct position, as split points of the values.
    let mut value_breaks = Vec::new();
    let mut count = 0;
    for pair in positions.windows(2) {
        count += 1;
        if pair[1] != pair[0] {
            value_breaks.push(count);
        }
    }
    let value_pieces = split_at_breaks(&values, &value_breaks, axis)?;

    let interleaved: Vec<Array> = array_pieces
        .into_iter()
        .zip(value_pieces.into_iter().map(Some).chain(std::iter::once(None)))
        .flat_map(|(piece, values)| std::iter::once(piece).chain(values))
        .filter(|piece| piece.size() > 0)
        .collect();
    if interleaved.is_empty() {
        return Ok(array.clone());
    }
    let pieces: Vec<&Array> = interleaved.iter().collect();
    concatenate(&pieces, isize::try_from(axis).unwrap_or(0))
}
