use std::borrow::Cow;

use super::{Block, BlockError};

/// A nested list of blocks. The nesting depth of the list maps onto the leading axes of the
/// assembled block.
#[derive(Debug, Clone)]
pub enum NestedBlocks<'a> {
    /// A leaf block.
    Leaf(Cow<'a, Block>),
    /// A list of nested blocks, concatenated along the axis at the current depth.
    List(Vec<NestedBlocks<'a>>),
}

impl NestedBlocks<'_> {
    fn depth(&self) -> usize {
        match self {
            Self::Leaf(_) => 0,
            Self::List(items) => 1 + items.first().map_or(0, Self::depth),
        }
    }

    fn max_leaf_ndim(&self) -> usize {
        match self {
            Self::Leaf(block) => block.ndim(),
            Self::List(items) => items.iter().map(Self::max_leaf_ndim).max().unwrap_or(0),
        }
    }
}

/// Assemble a nested list of blocks into one block.
///
/// The outermost list concatenates along axis 0, the next level along axis 1, and so on.
/// Leaves with fewer dimensions than the assembled result are promoted by prepending axes of
/// length one, so a flat list of zero-dimensional blocks assembles into a one-dimensional block.
///
/// # Errors
/// Returns a [`BlockError`] if a list is empty or the leaf shapes do not fit together.
pub fn concatenate3(nested: &NestedBlocks<'_>) -> Result<Block, BlockError> {
    let ndim = nested.depth().max(nested.max_leaf_ndim());
    assemble(nested, 0, ndim)
}

fn assemble(nested: &NestedBlocks<'_>, axis: usize, ndim: usize) -> Result<Block, BlockError> {
    match nested {
        NestedBlocks::Leaf(block) => Ok(block.atleast_nd(ndim)),
        NestedBlocks::List(items) => {
            let blocks = items
                .iter()
                .map(|item| assemble(item, axis + 1, ndim))
                .collect::<Result<Vec<_>, _>>()?;
            match blocks.as_slice() {
                [] => Err(BlockError::Shape(
                    "cannot assemble an empty list of blocks".to_string(),
                )),
                [block] => Ok(block.clone()),
                blocks => Block::concatenate(&blocks.iter().collect::<Vec<_>>(), axis),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::block::Scalar;

    fn leaf(block: Block) -> NestedBlocks<'static> {
        NestedBlocks::Leaf(Cow::Owned(block))
    }

    #[test]
    fn concatenate3_two_dimensions() {
        let x = Block::from(array![[1i64, 2], [3, 4]].into_dyn());
        let y = Block::from(array![[5i64], [6]].into_dyn());
        let z = Block::from(array![[7i64, 8, 9]].into_dyn());
        let nested = NestedBlocks::List(vec![
            NestedBlocks::List(vec![leaf(x), leaf(y)]),
            NestedBlocks::List(vec![leaf(z)]),
        ]);
        let block = concatenate3(&nested).unwrap();
        assert_eq!(
            block.as_array::<i64>().unwrap(),
            &array![[1i64, 2, 5], [3, 4, 6], [7, 8, 9]].into_dyn()
        );
    }

    #[test]
    fn concatenate3_scalars_and_promotion() {
        let nested = NestedBlocks::List(vec![
            leaf(Block::from_scalar(Scalar::Int(1))),
            leaf(Block::from_scalar(Scalar::Int(2))),
        ]);
        assert_eq!(
            concatenate3(&nested).unwrap().as_array::<i64>().unwrap(),
            &array![1i64, 2].into_dyn()
        );

        let x = Block::from(array![1i64, 2].into_dyn());
        let nested = NestedBlocks::List(vec![NestedBlocks::List(vec![leaf(x.clone()), leaf(x)])]);
        let block = concatenate3(&nested).unwrap();
        assert_eq!(block.shape(), &[1, 4]);

        let single = leaf(Block::from(array![[1.0f64]].into_dyn()));
        assert_eq!(concatenate3(&single).unwrap().shape(), &[1, 1]);
        assert!(concatenate3(&NestedBlocks::List(vec![])).is_err());
    }
}
