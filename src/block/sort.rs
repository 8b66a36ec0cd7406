use std::cmp::Ordering;

use ndarray::Array1;

use super::{Block, BlockError, Element};

/// Largest first, with NaN after every number.
fn descending<T: Element>(x: T, y: T) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
    }
}

impl Block {
    /// The `k` largest elements of a one-dimensional block, largest first.
    ///
    /// Fewer than `k` elements are returned if the block is shorter than `k`.
    ///
    /// # Errors
    /// Returns [`BlockError::Shape`] if the block is not one-dimensional.
    pub fn topk(&self, k: usize) -> Result<Self, BlockError> {
        if self.ndim() != 1 {
            return Err(BlockError::Shape(format!(
                "topk requires a one-dimensional block, got shape {:?}",
                self.shape()
            )));
        }
        Ok(map_block!(self, array => {
            let mut values: Vec<_> = array.iter().copied().collect();
            values.sort_by(|x, y| descending(*x, *y));
            values.truncate(k);
            Array1::from(values).into_dyn()
        }))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn topk_descending() {
        let a = Block::from(array![5i64, 2, 1, 6].into_dyn());
        assert_eq!(a.topk(2).unwrap(), Block::from(array![6i64, 5].into_dyn()));
        assert_eq!(a.topk(9).unwrap(), Block::from(array![6i64, 5, 2, 1].into_dyn()));
        assert_eq!(a.topk(0).unwrap().shape(), &[0]);

        let b = Block::from(array![0.5f32, f32::NAN, 3.0, -1.0].into_dyn());
        assert_eq!(b.topk(3).unwrap(), Block::from(array![3.0f32, 0.5, -1.0].into_dyn()));
        assert!(Block::from(array![[1i32]].into_dyn()).topk(1).is_err());
    }
}
