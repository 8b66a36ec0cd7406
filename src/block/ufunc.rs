use std::borrow::Cow;

use ndarray::{ArrayD, ArrayViewD, Dimension, IxDyn, Zip};
use num::Zero;

use super::element::{maximum, minimum};
use super::{Block, BlockError, DataType, Element, Float, Numeric, Scalar};

/// An operand of a block-level binary operation.
#[derive(Debug, Clone, Copy)]
pub enum BlockOperand<'a> {
    /// A block.
    Block(&'a Block),
    /// A weakly typed scalar.
    Scalar(Scalar),
}

impl BlockOperand<'_> {
    fn typed<T: Element>(&self) -> Cow<'_, ArrayD<T>> {
        match self {
            Self::Block(block) => block.cast_cow(),
            Self::Scalar(scalar) => Cow::Owned(ArrayD::from_elem(IxDyn(&[]), T::from_scalar(*scalar))),
        }
    }
}

/// Broadcast shapes against each other, aligning trailing axes.
///
/// Returns [`None`] if the shapes are incompatible.
#[must_use]
pub fn broadcast_shapes(shapes: &[&[usize]]) -> Option<Vec<usize>> {
    let ndim = shapes.iter().map(|shape| shape.len()).max().unwrap_or(0);
    let mut output = vec![1; ndim];
    for shape in shapes {
        let offset = ndim - shape.len();
        for (axis, &size) in shape.iter().enumerate() {
            let current = &mut output[offset + axis];
            if *current == 1 {
                *current = size;
            } else if size != 1 && size != *current {
                return None;
            }
        }
    }
    Some(output)
}

fn zip_with<T: Element, U: Element>(
    lhs: &ArrayD<T>,
    rhs: &ArrayD<T>,
    mut f: impl FnMut(T, T) -> U,
) -> Result<ArrayD<U>, BlockError> {
    let incompatible = || BlockError::IncompatibleShapes(lhs.shape().to_vec(), rhs.shape().to_vec());
    let shape = broadcast_shapes(&[lhs.shape(), rhs.shape()]).ok_or_else(incompatible)?;
    let lhs_view = lhs.broadcast(IxDyn(&shape)).ok_or_else(incompatible)?;
    let rhs_view = rhs.broadcast(IxDyn(&shape)).ok_or_else(incompatible)?;
    Ok(Zip::from(lhs_view)
        .and(rhs_view)
        .map_collect(|&x, &y| f(x, y)))
}

fn try_zip_with<T: Element, U: Element>(
    lhs: &ArrayD<T>,
    rhs: &ArrayD<T>,
    f: impl Fn(T, T) -> Result<U, BlockError>,
) -> Result<ArrayD<U>, BlockError> {
    let mut error = None;
    let output = zip_with(lhs, rhs, |x, y| {
        f(x, y).unwrap_or_else(|err| {
            error.get_or_insert(err);
            U::from_scalar(Scalar::Int(0))
        })
    })?;
    error.map_or(Ok(output), Err)
}

/// A binary element-wise operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `x + y`
    Add,
    /// `x - y`
    Subtract,
    /// `x * y`
    Multiply,
    /// `x / y`, always producing a floating point result.
    Divide,
    /// `x ** y`
    Power,
    /// The element-wise maximum, propagating NaN.
    Maximum,
    /// The element-wise minimum, propagating NaN.
    Minimum,
    /// `x == y`
    Equal,
    /// `x != y`
    NotEqual,
    /// `x < y`
    Less,
    /// `x <= y`
    LessEqual,
    /// `x > y`
    Greater,
    /// `x >= y`
    GreaterEqual,
}

impl BinaryOp {
    /// All binary operations.
    pub const ALL: [Self; 13] = [
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::Power,
        Self::Maximum,
        Self::Minimum,
        Self::Equal,
        Self::NotEqual,
        Self::Less,
        Self::LessEqual,
        Self::Greater,
        Self::GreaterEqual,
    ];

    /// The name of the operation.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Power => "power",
            Self::Maximum => "maximum",
            Self::Minimum => "minimum",
            Self::Equal => "equal",
            Self::NotEqual => "not_equal",
            Self::Less => "less",
            Self::LessEqual => "less_equal",
            Self::Greater => "greater",
            Self::GreaterEqual => "greater_equal",
        }
    }

    /// Look up an operation by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::Less
                | Self::LessEqual
                | Self::Greater
                | Self::GreaterEqual
        )
    }

    fn compare<T: PartialOrd>(self, x: &T, y: &T) -> bool {
        match self {
            Self::Equal => x == y,
            Self::NotEqual => x != y,
            Self::Less => x < y,
            Self::LessEqual => x <= y,
            Self::Greater => x > y,
            _ => x >= y,
        }
    }

    /// The data type of the result for operands of type `lhs` and `rhs`.
    fn operand_type(lhs: &BlockOperand<'_>, rhs: &BlockOperand<'_>) -> DataType {
        match (lhs, rhs) {
            (BlockOperand::Block(lhs), BlockOperand::Block(rhs)) => {
                lhs.data_type().promote(rhs.data_type())
            }
            (BlockOperand::Block(block), BlockOperand::Scalar(scalar))
            | (BlockOperand::Scalar(scalar), BlockOperand::Block(block)) => {
                scalar.promote_with(block.data_type())
            }
            (BlockOperand::Scalar(lhs), BlockOperand::Scalar(rhs)) => {
                lhs.data_type().promote(rhs.data_type())
            }
        }
    }

    /// Apply the operation, broadcasting the operands against each other.
    ///
    /// # Errors
    /// Returns a [`BlockError`] if the operand shapes are incompatible or the data type is unsupported.
    pub fn apply(
        self,
        lhs: BlockOperand<'_>,
        rhs: BlockOperand<'_>,
    ) -> Result<Block, BlockError> {
        let common = Self::operand_type(&lhs, &rhs);
        if self.is_comparison() {
            return with_element_type!(common, T => {
                let (x, y) = (lhs.typed::<T>(), rhs.typed::<T>());
                Ok(Block::from(zip_with(&x, &y, |x, y| self.compare(&x, &y))?))
            });
        }
        match self {
            Self::Maximum | Self::Minimum => with_element_type!(common, T => {
                let (x, y) = (lhs.typed::<T>(), rhs.typed::<T>());
                let pick = if self == Self::Maximum { maximum::<T> } else { minimum::<T> };
                Ok(Block::from(zip_with(&x, &y, pick)?))
            }),
            Self::Divide => with_float_type!(common.float_type(), T => {
                let (x, y) = (lhs.typed::<T>(), rhs.typed::<T>());
                Ok(Block::from(zip_with(&x, &y, |x, y| x / y)?))
            }, other => Err(self.unsupported(common))),
            _ => {
                let data_type = if common == DataType::Bool {
                    DataType::Int64
                } else {
                    common
                };
                with_numeric_type!(data_type, T => {
                    let (x, y) = (lhs.typed::<T>(), rhs.typed::<T>());
                    let output = match self {
                        Self::Add => zip_with(&x, &y, Numeric::wrapping_add)?,
                        Self::Subtract => zip_with(&x, &y, Numeric::wrapping_sub)?,
                        Self::Multiply => zip_with(&x, &y, Numeric::wrapping_mul)?,
                        _ => try_zip_with(&x, &y, Numeric::pow)?,
                    };
                    Ok(Block::from(output))
                }, bool => Err(self.unsupported(common)))
            }
        }
    }

    fn unsupported(self, data_type: DataType) -> BlockError {
        BlockError::UnsupportedDataType {
            operation: self.name().to_string(),
            data_type,
        }
    }
}

/// A unary element-wise operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-x`
    Negative,
    /// `|x|`
    Absolute,
    /// `e^x`
    Exp,
    /// The natural logarithm.
    Log,
    /// The square root.
    Sqrt,
    /// The sine.
    Sin,
    /// The cosine.
    Cos,
    /// Round down.
    Floor,
    /// Test for NaN.
    IsNan,
    /// Logical not of a boolean block.
    LogicalNot,
}

impl UnaryOp {
    /// All unary operations.
    pub const ALL: [Self; 10] = [
        Self::Negative,
        Self::Absolute,
        Self::Exp,
        Self::Log,
        Self::Sqrt,
        Self::Sin,
        Self::Cos,
        Self::Floor,
        Self::IsNan,
        Self::LogicalNot,
    ];

    /// The name of the operation.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Absolute => "absolute",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Sqrt => "sqrt",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Floor => "floor",
            Self::IsNan => "isnan",
            Self::LogicalNot => "logical_not",
        }
    }

    /// Look up an operation by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    fn float<T: Float>(self, x: T) -> T {
        match self {
            Self::Exp => x.exp(),
            Self::Log => x.ln(),
            Self::Sqrt => x.sqrt(),
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            _ => x.floor(),
        }
    }

    fn unsupported(self, data_type: DataType) -> BlockError {
        BlockError::UnsupportedDataType {
            operation: self.name().to_string(),
            data_type,
        }
    }

    /// Apply the operation.
    ///
    /// # Errors
    /// Returns [`BlockError::UnsupportedDataType`] if the operation does not support the block data type.
    pub fn apply(self, block: &Block) -> Result<Block, BlockError> {
        let data_type = block.data_type();
        match self {
            Self::Negative => with_numeric_type!(data_type, T => {
                let x = block.cast_cow::<T>();
                Ok(Block::from(x.mapv(|x| T::zero().wrapping_sub(x))))
            }, bool => Err(self.unsupported(data_type))),
            Self::Absolute => with_numeric_type!(data_type, T => {
                let x = block.cast_cow::<T>();
                Ok(Block::from(x.mapv(Numeric::abs)))
            }, bool => Ok(block.clone())),
            Self::IsNan => Ok(with_block!(block, x => Block::from(x.mapv(Element::is_nan)))),
            Self::LogicalNot => match block {
                Block::Bool(x) => Ok(Block::from(x.mapv(|x| !x))),
                _ => Err(self.unsupported(data_type)),
            },
            _ => with_float_type!(data_type.float_type(), T => {
                let x = block.cast_cow::<T>();
                Ok(Block::from(x.mapv(|x| self.float(x))))
            }, other => Err(self.unsupported(data_type))),
        }
    }
}

fn broadcast_view<'a, T>(array: &'a ArrayD<T>, shape: &[usize]) -> Result<ArrayViewD<'a, T>, BlockError> {
    array
        .broadcast(IxDyn(shape))
        .ok_or_else(|| BlockError::IncompatibleShapes(array.shape().to_vec(), shape.to_vec()))
}

fn broadcast_all(shapes: &[&[usize]]) -> Result<Vec<usize>, BlockError> {
    broadcast_shapes(shapes)
        .ok_or_else(|| BlockError::Shape(format!("shapes {shapes:?} cannot be broadcast together")))
}

/// The common data type of operands. Scalars only widen the type of the blocks within their kind.
fn common_type(operands: &[BlockOperand<'_>]) -> Option<DataType> {
    let blocks = DataType::promote_all(operands.iter().filter_map(|operand| match operand {
        BlockOperand::Block(block) => Some(block.data_type()),
        BlockOperand::Scalar(_) => None,
    }));
    match blocks {
        Some(data_type) => Some(operands.iter().fold(data_type, |data_type, operand| match operand {
            BlockOperand::Scalar(scalar) => scalar.promote_with(data_type),
            BlockOperand::Block(_) => data_type,
        })),
        None => DataType::promote_all(operands.iter().filter_map(|operand| match operand {
            BlockOperand::Scalar(scalar) => Some(scalar.data_type()),
            BlockOperand::Block(_) => None,
        })),
    }
}

/// Take elements from `x` where `condition` is true and from `y` elsewhere.
///
/// The three operands are broadcast against each other. The condition is converted to booleans.
///
/// # Errors
/// Returns a [`BlockError`] if the operand shapes are incompatible.
pub fn select_where(
    condition: BlockOperand<'_>,
    x: BlockOperand<'_>,
    y: BlockOperand<'_>,
) -> Result<Block, BlockError> {
    let data_type = common_type(&[x, y]).unwrap_or(DataType::Float64);
    let condition = condition.typed::<bool>();
    with_element_type!(data_type, T => {
        let (x, y) = (x.typed::<T>(), y.typed::<T>());
        let shape = broadcast_all(&[condition.shape(), x.shape(), y.shape()])?;
        Ok(Block::from(
            Zip::from(broadcast_view(&condition, &shape)?)
                .and(broadcast_view(&x, &shape)?)
                .and(broadcast_view(&y, &shape)?)
                .map_collect(|&condition, &x, &y| if condition { x } else { y }),
        ))
    })
}

/// Construct a block from `choices`, taking each element from the choice selected by `index`.
///
/// The index and the choices are broadcast against each other. A boolean index selects between two choices.
///
/// # Errors
/// Returns a [`BlockError`] if there are no choices, the shapes are incompatible, or an index does not select a
/// choice.
pub fn choose(index: BlockOperand<'_>, choices: &[BlockOperand<'_>]) -> Result<Block, BlockError> {
    let data_type = common_type(choices)
        .ok_or_else(|| BlockError::Other("choose needs at least one choice".to_string()))?;
    let index = index.typed::<i64>();
    with_element_type!(data_type, T => {
        let typed: Vec<Cow<'_, ArrayD<T>>> = choices.iter().map(BlockOperand::typed::<T>).collect();
        let mut shapes: Vec<&[usize]> = vec![index.shape()];
        shapes.extend(typed.iter().map(|choice| choice.shape()));
        let shape = broadcast_all(&shapes)?;
        let index = broadcast_view(&index, &shape)?;
        let views = typed
            .iter()
            .map(|choice| broadcast_view(choice, &shape))
            .collect::<Result<Vec<_>, _>>()?;
        let mut error = None;
        let output = ArrayD::from_shape_fn(IxDyn(&shape), |position| {
            let choice = index[position.slice()];
            match usize::try_from(choice).ok().and_then(|choice| views.get(choice)) {
                Some(view) => view[position.slice()],
                None => {
                    error.get_or_insert_with(|| {
                        BlockError::Other(format!("invalid choice {choice} of {} choices", views.len()))
                    });
                    T::from_scalar(Scalar::Int(0))
                }
            }
        });
        error.map_or(Ok(Block::from(output)), Err)
    })
}

/// Test elements for equality within a tolerance, `|x - y| <= atol + rtol * |y|`.
///
/// Infinities are close only to infinities of the same sign. NaNs are close to each other if `equal_nan` is set.
///
/// # Errors
/// Returns a [`BlockError`] if the operand shapes are incompatible.
pub fn isclose(
    lhs: BlockOperand<'_>,
    rhs: BlockOperand<'_>,
    rtol: f64,
    atol: f64,
    equal_nan: bool,
) -> Result<Block, BlockError> {
    let (x, y) = (lhs.typed::<f64>(), rhs.typed::<f64>());
    Ok(Block::from(zip_with(&x, &y, |x, y| {
        if x.is_nan() || y.is_nan() {
            equal_nan && x.is_nan() && y.is_nan()
        } else if x.is_infinite() || y.is_infinite() {
            x.is_infinite() && y.is_infinite() && x.is_sign_positive() == y.is_sign_positive()
        } else {
            (x - y).abs() <= atol + rtol * y.abs()
        }
    })?))
}
