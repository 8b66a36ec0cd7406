use std::iter::FusedIterator;

/// Unravel a linearised index to block coordinates in a grid of shape `grid`.
#[must_use]
pub fn unravel_index(mut index: usize, grid: &[usize]) -> Vec<usize> {
    let mut coordinates = vec![0; grid.len()];
    for (coordinate, &size) in std::iter::zip(coordinates.iter_mut().rev(), grid.iter().rev()) {
        *coordinate = index % size;
        index /= size;
    }
    coordinates
}

/// Ravel block coordinates in a grid of shape `grid` to a linearised index.
#[must_use]
pub fn ravel_index(coordinates: &[usize], grid: &[usize]) -> usize {
    let mut index = 0;
    let mut count = 1;
    for (coordinate, size) in std::iter::zip(coordinates, grid).rev() {
        index += coordinate * count;
        count *= size;
    }
    index
}

/// An iterator over the block coordinates of a block grid.
///
/// Iterates over the last dimension fastest (i.e. C-contiguous order).
/// For example, a 2x3 grid produces
/// ```text
/// [0, 0]  [0, 1]  [0, 2]  [1, 0]  [1, 1]  [1, 2]
/// ```
/// A zero-dimensional grid produces a single empty coordinate.
#[derive(Debug, Clone)]
pub struct BlockIndices {
    grid: Vec<usize>,
    index_front: usize,
    index_back: usize,
}

impl BlockIndices {
    /// Create an iterator over the coordinates of a grid with `grid` blocks along each axis.
    #[must_use]
    pub fn new(grid: &[usize]) -> Self {
        Self {
            grid: grid.to_vec(),
            index_front: 0,
            index_back: grid.iter().product(),
        }
    }
}

impl Iterator for BlockIndices {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index_front < self.index_back {
            let coordinates = unravel_index(self.index_front, &self.grid);
            self.index_front += 1;
            Some(coordinates)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let length = self.index_back - self.index_front;
        (length, Some(length))
    }
}

impl DoubleEndedIterator for BlockIndices {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.index_back > self.index_front {
            self.index_back -= 1;
            Some(unravel_index(self.index_back, &self.grid))
        } else {
            None
        }
    }
}

impl ExactSizeIterator for BlockIndices {}

impl FusedIterator for BlockIndices {}
