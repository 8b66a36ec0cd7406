use std::{borrow::Cow, collections::HashMap, sync::Arc};

use super::{Array, ArrayError};
use crate::{
    block::{broadcast_shapes, BinaryOp, Block, DataType, Scalar, UnaryOp},
    chunks::{common_refinement, ChunkSpec},
    graph::{operation_token, partial_by_order, BlockOperation, Operation, Value},
    operations::{Astype, Where},
    tokenize::{name_for, Tokenize, Tokenizer},
    top::{top, TopArg},
};

/// An operand of an elementwise operation.
#[derive(Debug, Clone)]
pub enum Operand<'a> {
    /// A chunked array.
    Array(&'a Array),
    /// A scalar, broadcast against every block.
    Scalar(Scalar),
    /// An in-memory array, converted to a chunked array with a single block.
    External(Block),
}

impl<'a> From<&'a Array> for Operand<'a> {
    fn from(array: &'a Array) -> Self {
        Self::Array(array)
    }
}

impl From<Scalar> for Operand<'_> {
    fn from(scalar: Scalar) -> Self {
        Self::Scalar(scalar)
    }
}

impl From<i64> for Operand<'_> {
    fn from(value: i64) -> Self {
        Self::Scalar(Scalar::Int(value))
    }
}

impl From<f64> for Operand<'_> {
    fn from(value: f64) -> Self {
        Self::Scalar(Scalar::Float(value))
    }
}

impl From<bool> for Operand<'_> {
    fn from(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }
}

impl From<Block> for Operand<'_> {
    fn from(block: Block) -> Self {
        Self::External(block)
    }
}

impl Tokenize for Operand<'_> {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        match self {
            Self::Array(array) => array.tokenize(tokenizer),
            Self::Scalar(scalar) => scalar.tokenize(tokenizer),
            Self::External(block) => block.tokenize(tokenizer),
        }
    }
}

/// Options of [`elemwise`].
#[derive(Debug, Clone, Default)]
pub struct ElemwiseOptions {
    data_type: Option<DataType>,
    name: Option<String>,
}

impl ElemwiseOptions {
    /// Create the default options: the data type is inferred and the name derived from the inputs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output data type instead of inferring it.
    #[must_use]
    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    /// Set the output name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Rechunk `arrays` so that every axis they share (right-aligned, excluding broadcast axes of extent one) has the
/// same chunks. Returns the rechunked arrays and the broadcast output chunks.
pub(crate) fn unify_chunks<'a>(
    arrays: &[&'a Array],
    shape: &[usize],
) -> Result<(Vec<Cow<'a, Array>>, ChunkSpec), ArrayError> {
    let ndim = shape.len();
    let mut output: Vec<Vec<usize>> = shape.iter().map(|&extent| vec![extent]).collect();
    for (axis, chunks) in output.iter_mut().enumerate() {
        let mut refined: Option<Vec<usize>> = None;
        for array in arrays {
            let Some(array_axis) = (axis + array.ndim()).checked_sub(ndim) else {
                continue;
            };
            if array.shape()[array_axis] != shape[axis] {
                continue;
            }
            let array_chunks = &array.chunks()[array_axis];
            refined = Some(match refined {
                None => array_chunks.clone(),
                Some(refined) => common_refinement(&refined, array_chunks),
            });
        }
        if let Some(refined) = refined {
            *chunks = refined;
        }
    }

    let unified = arrays
        .iter()
        .map(|array| {
            let offset = ndim - array.ndim();
            let target: Vec<Vec<usize>> = (0..array.ndim())
                .map(|axis| {
                    if array.shape()[axis] == shape[axis + offset] {
                        output[axis + offset].clone()
                    } else {
                        array.chunks()[axis].clone()
                    }
                })
                .collect();
            if target.as_slice() == array.chunks().as_slice() {
                Ok(Cow::Borrowed(*array))
            } else {
                array
                    .rechunk(ChunkSpec::new_unchecked(target))
                    .map(Cow::Owned)
            }
        })
        .collect::<Result<Vec<_>, ArrayError>>()?;
    Ok((unified, ChunkSpec::new_unchecked(output)))
}

/// Convert the in-memory operands to arrays with a single block, keeping their positions.
pub(crate) fn external_arrays(operands: &[Operand<'_>]) -> Result<Vec<(usize, Array)>, ArrayError> {
    operands
        .iter()
        .enumerate()
        .filter_map(|(position, operand)| match operand {
            Operand::External(block) => {
                let chunks: Vec<usize> = block.shape().to_vec();
                Some(Array::from_block(block.clone(), chunks).map(|array| (position, array)))
            }
            _ => None,
        })
        .collect()
}

/// The array operands and converted in-memory operands with their positions, in order.
pub(crate) fn array_operands<'a>(
    operands: &[Operand<'a>],
    externals: &'a [(usize, Array)],
) -> Vec<(usize, &'a Array)> {
    let mut arrays: Vec<(usize, &Array)> = operands
        .iter()
        .enumerate()
        .filter_map(|(position, operand)| match operand {
            Operand::Array(array) => Some((position, *array)),
            _ => None,
        })
        .chain(externals.iter().map(|(position, array)| (*position, array)))
        .collect();
    arrays.sort_by_key(|(position, _)| *position);
    arrays
}

/// The scalar operands with their positions.
pub(crate) fn scalar_operands(operands: &[Operand<'_>]) -> Vec<(usize, Value)> {
    operands
        .iter()
        .enumerate()
        .filter_map(|(position, operand)| match operand {
            Operand::Scalar(scalar) => Some((position, Value::Scalar(*scalar))),
            _ => None,
        })
        .collect()
}

/// Infer the output data type of `operation` by applying it to empty blocks of the input types.
pub(crate) fn infer_data_type(
    operation: &dyn BlockOperation,
    args: &[Value],
) -> Result<DataType, ArrayError> {
    operation
        .call(args)
        .and_then(|value| value.to_block().map(|block| block.data_type()))
        .map_err(|source| ArrayError::DataTypeInference {
            operation: operation.name(),
            source,
        })
}

/// Apply an operation elementwise to arrays and scalars with broadcasting.
///
/// The shapes of the array operands are broadcast together, aligning trailing axes. Axes shared by more than one
/// operand are rechunked to the common refinement of their chunks. Scalars are fixed arguments of every task.
///
/// Unless set in `options`, the output data type is inferred by applying `operation` to empty blocks of the
/// operand data types, and the output name is derived from `operation` and the operands.
///
/// # Errors
/// Returns an [`ArrayError`] if
///  - the operand shapes cannot be broadcast together, or
///  - the data type cannot be inferred.
pub fn elemwise(
    operation: &Operation,
    operands: &[Operand<'_>],
    options: &ElemwiseOptions,
) -> Result<Array, ArrayError> {
    let externals = external_arrays(operands)?;
    let arrays = array_operands(operands, &externals);
    let scalars = scalar_operands(operands);

    let shapes: Vec<Vec<usize>> = arrays.iter().map(|(_, array)| array.shape()).collect();
    let shape_refs: Vec<&[usize]> = shapes.iter().map(Vec::as_slice).collect();
    let shape =
        broadcast_shapes(&shape_refs).ok_or_else(|| ArrayError::IncompatibleShapes(shapes.clone()))?;
    let ndim = shape.len();

    let data_type = match options.data_type {
        Some(data_type) => data_type,
        None => {
            let mut args: Vec<(usize, Value)> = arrays
                .iter()
                .map(|(position, array)| {
                    (*position, Value::from(Block::empty(array.data_type(), array.ndim())))
                })
                .chain(scalars.iter().cloned())
                .collect();
            args.sort_by_key(|(position, _)| *position);
            let args: Vec<Value> = args.into_iter().map(|(_, value)| value).collect();
            infer_data_type(operation.as_ref(), &args)?
        }
    };

    let name = match &options.name {
        Some(name) => name.clone(),
        None => {
            let token = operation_token(operation.as_ref());
            let mut parts: Vec<&dyn Tokenize> = vec![&token];
            parts.extend(operands.iter().map(|operand| operand as &dyn Tokenize));
            name_for(&operation.name(), &parts)
        }
    };

    let array_refs: Vec<&Array> = arrays.iter().map(|(_, array)| *array).collect();
    let (unified, chunks) = unify_chunks(&array_refs, &shape)?;

    let operation = if scalars.is_empty() {
        Arc::clone(operation)
    } else {
        partial_by_order(Arc::clone(operation), scalars)?
    };
    let out_labels = super::labels(ndim);
    let numblocks: HashMap<String, Vec<usize>> = unified
        .iter()
        .map(|array| (array.name().to_string(), array.numblocks()))
        .collect();
    let args: Vec<TopArg> = unified
        .iter()
        .map(|array| TopArg::array(array.name(), &out_labels[ndim - array.ndim()..]))
        .collect();
    let tasks = top(&operation, &name, &out_labels, &args, &numblocks)?;
    let dependencies: Vec<&Array> = unified.iter().map(AsRef::as_ref).collect();
    Ok(Array::derive(name, tasks, &dependencies, chunks, data_type))
}

/// The keywords accepted by [`ufunc`].
const UFUNC_KEYWORDS: [&str; 2] = ["dtype", "name"];

/// Apply an elementwise operation by name, e.g. `"add"`, `"sqrt"` or `"where"`.
///
/// `keywords` may set the output `dtype` (a data type name such as `"float32"`) and the output `name`.
///
/// # Errors
/// Returns an [`ArrayError`] if
///  - the operation is unknown or receives the wrong number of operands,
///  - a keyword is not accepted or its value is invalid, or
///  - [`elemwise`] fails.
pub fn ufunc(
    name: &str,
    operands: &[Operand<'_>],
    keywords: &[(&str, &str)],
) -> Result<Array, ArrayError> {
    let mut options = ElemwiseOptions::new();
    for (keyword, value) in keywords {
        if !UFUNC_KEYWORDS.contains(keyword) {
            return Err(ArrayError::UnexpectedKeyword {
                operation: name.to_string(),
                keyword: (*keyword).to_string(),
            });
        }
        match *keyword {
            "dtype" => {
                let data_type = DataType::from_name(value).ok_or_else(|| {
                    ArrayError::InvalidArgument(format!("unknown data type {value}"))
                })?;
                options = options.data_type(data_type);
            }
            _ => options = options.name(*value),
        }
    }
    let (operation, arity): (Operation, usize) = if let Some(op) = BinaryOp::from_name(name) {
        (Arc::new(op), 2)
    } else if let Some(op) = UnaryOp::from_name(name) {
        (Arc::new(op), 1)
    } else if name == "where" {
        (Arc::new(Where), 3)
    } else {
        return Err(ArrayError::UnknownOperation(name.to_string()));
    };
    if operands.len() != arity {
        return Err(ArrayError::OperandCount {
            operation: name.to_string(),
            expected: arity,
            got: operands.len(),
        });
    }
    elemwise(&operation, operands, &options)
}

impl Array {
    fn binary(&self, op: BinaryOp, other: Operand<'_>) -> Result<Self, ArrayError> {
        let operation: Operation = Arc::new(op);
        elemwise(&operation, &[self.into(), other], &ElemwiseOptions::new())
    }

    fn unary(&self, op: UnaryOp) -> Result<Self, ArrayError> {
        let operation: Operation = Arc::new(op);
        elemwise(&operation, &[self.into()], &ElemwiseOptions::new())
    }

    /// Raise elements to a power.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operands cannot be broadcast together.
    pub fn pow<'a>(&self, exponent: impl Into<Operand<'a>>) -> Result<Self, ArrayError> {
        self.binary(BinaryOp::Power, exponent.into())
    }

    /// The elementwise maximum.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operands cannot be broadcast together.
    pub fn maximum<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, ArrayError> {
        self.binary(BinaryOp::Maximum, other.into())
    }

    /// The elementwise minimum.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operands cannot be broadcast together.
    pub fn minimum<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, ArrayError> {
        self.binary(BinaryOp::Minimum, other.into())
    }

    /// Elementwise `==`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operands cannot be broadcast together.
    pub fn equal<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, ArrayError> {
        self.binary(BinaryOp::Equal, other.into())
    }

    /// Elementwise `!=`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operands cannot be broadcast together.
    pub fn not_equal<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, ArrayError> {
        self.binary(BinaryOp::NotEqual, other.into())
    }

    /// Elementwise `<`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operands cannot be broadcast together.
    pub fn less<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, ArrayError> {
        self.binary(BinaryOp::Less, other.into())
    }

    /// Elementwise `<=`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operands cannot be broadcast together.
    pub fn less_equal<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, ArrayError> {
        self.binary(BinaryOp::LessEqual, other.into())
    }

    /// Elementwise `>`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operands cannot be broadcast together.
    pub fn greater<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, ArrayError> {
        self.binary(BinaryOp::Greater, other.into())
    }

    /// Elementwise `>=`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operands cannot be broadcast together.
    pub fn greater_equal<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, ArrayError> {
        self.binary(BinaryOp::GreaterEqual, other.into())
    }

    /// The absolute value.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operation does not support the data type.
    pub fn abs(&self) -> Result<Self, ArrayError> {
        self.unary(UnaryOp::Absolute)
    }

    /// The exponential.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operation does not support the data type.
    pub fn exp(&self) -> Result<Self, ArrayError> {
        self.unary(UnaryOp::Exp)
    }

    /// The natural logarithm.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operation does not support the data type.
    pub fn log(&self) -> Result<Self, ArrayError> {
        self.unary(UnaryOp::Log)
    }

    /// The square root.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operation does not support the data type.
    pub fn sqrt(&self) -> Result<Self, ArrayError> {
        self.unary(UnaryOp::Sqrt)
    }

    /// The sine.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operation does not support the data type.
    pub fn sin(&self) -> Result<Self, ArrayError> {
        self.unary(UnaryOp::Sin)
    }

    /// The cosine.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operation does not support the data type.
    pub fn cos(&self) -> Result<Self, ArrayError> {
        self.unary(UnaryOp::Cos)
    }

    /// The floor.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operation does not support the data type.
    pub fn floor(&self) -> Result<Self, ArrayError> {
        self.unary(UnaryOp::Floor)
    }

    /// Returns true where elements are NaN.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operation does not support the data type.
    pub fn isnan(&self) -> Result<Self, ArrayError> {
        self.unary(UnaryOp::IsNan)
    }

    /// The logical negation.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the operation does not support the data type.
    pub fn logical_not(&self) -> Result<Self, ArrayError> {
        self.unary(UnaryOp::LogicalNot)
    }

    /// Convert the elements to `data_type`.
    ///
    /// Returns a clone of the array if it already has `data_type`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the graph cannot be built.
    pub fn astype(&self, data_type: DataType) -> Result<Self, ArrayError> {
        if data_type == self.data_type() {
            return Ok(self.clone());
        }
        let operation: Operation = Arc::new(Astype(data_type));
        elemwise(
            &operation,
            &[self.into()],
            &ElemwiseOptions::new().data_type(data_type),
        )
    }
}

macro_rules! impl_binary_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait<&Array> for &Array {
            type Output = Result<Array, ArrayError>;

            fn $method(self, rhs: &Array) -> Self::Output {
                self.binary($op, Operand::Array(rhs))
            }
        }

        impl std::ops::$trait<i64> for &Array {
            type Output = Result<Array, ArrayError>;

            fn $method(self, rhs: i64) -> Self::Output {
                self.binary($op, rhs.into())
            }
        }

        impl std::ops::$trait<f64> for &Array {
            type Output = Result<Array, ArrayError>;

            fn $method(self, rhs: f64) -> Self::Output {
                self.binary($op, rhs.into())
            }
        }

        impl std::ops::$trait<&Array> for i64 {
            type Output = Result<Array, ArrayError>;

            fn $method(self, rhs: &Array) -> Self::Output {
                let operation: Operation = Arc::new($op);
                elemwise(&operation, &[self.into(), rhs.into()], &ElemwiseOptions::new())
            }
        }

        impl std::ops::$trait<&Array> for f64 {
            type Output = Result<Array, ArrayError>;

            fn $method(self, rhs: &Array) -> Self::Output {
                let operation: Operation = Arc::new($op);
                elemwise(&operation, &[self.into(), rhs.into()], &ElemwiseOptions::new())
            }
        }
    };
}

impl_binary_operator!(Add, add, BinaryOp::Add);
impl_binary_operator!(Sub, sub, BinaryOp::Subtract);
impl_binary_operator!(Mul, mul, BinaryOp::Multiply);
impl_binary_operator!(Div, div, BinaryOp::Divide);

impl std::ops::Neg for &Array {
    type Output = Result<Array, ArrayError>;

    fn neg(self) -> Self::Output {
        self.unary(UnaryOp::Negative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        array::ErrorKind,
        config::ComputeConfig,
        graph::{GraphKey, Task, TaskArg},
    };

    fn arange(shape: &[usize], chunks: impl Into<crate::chunks::ChunksArg>) -> Array {
        let n: usize = shape.iter().product();
        Array::from_block(Block::from_vec(shape, (0..n as i64).collect()).unwrap(), chunks).unwrap()
    }

    fn compute(array: &Array) -> Block {
        array.compute(&ComputeConfig::synchronous()).unwrap()
    }

    #[test]
    fn elemwise_matches_blocks() {
        let x = arange(&[4, 6], [2, 3]);
        let y = arange(&[4, 6], [2, 3]);
        let z = (&x + &y).unwrap();
        assert_eq!(z.chunks(), x.chunks());
        assert_eq!(z.graph().layer(z.name()).unwrap().len(), 4);
        let task = &z.graph().layer(z.name()).unwrap()[&GraphKey::new(z.name(), vec![1, 0])];
        assert_eq!(
            task.args(),
            &[
                TaskArg::Key(GraphKey::new(x.name(), vec![1, 0])),
                TaskArg::Key(GraphKey::new(y.name(), vec![1, 0]))
            ]
        );
        let expected = BinaryOp::Add
            .apply(
                crate::block::BlockOperand::Block(&compute(&x)),
                crate::block::BlockOperand::Block(&compute(&y)),
            )
            .unwrap();
        assert_eq!(compute(&z), expected);
    }

    #[test]
    fn elemwise_names_are_deterministic() {
        let x = arange(&[4], 2);
        let a = (&x + 1).unwrap();
        let b = (&x + 1).unwrap();
        let c = (&x + 2).unwrap();
        assert_eq!(a.name(), b.name());
        assert_ne!(a.name(), c.name());
        assert!(a.name().starts_with("add-"));
        let keys_a: std::collections::HashSet<_> = a.graph().keys().into_iter().cloned().collect();
        let keys_b: std::collections::HashSet<_> = b.graph().keys().into_iter().cloned().collect();
        assert_eq!(keys_a, keys_b);
    }

    #[test]
    fn elemwise_broadcasting() {
        let x = arange(&[3, 2, 2], [1, 2, 2]);
        let y = arange(&[1, 2, 2], [1, 2, 2]);
        let z = (&x + &y).unwrap();
        assert_eq!(z.shape(), vec![3, 2, 2]);
        assert_eq!(z.chunks().as_slice(), &[vec![1, 1, 1], vec![2], vec![2]]);
        let expected = BinaryOp::Add
            .apply(
                crate::block::BlockOperand::Block(&compute(&x)),
                crate::block::BlockOperand::Block(&compute(&y)),
            )
            .unwrap();
        assert_eq!(compute(&z), expected);

        let row = arange(&[2], 1);
        let w = (&x * &row).unwrap();
        assert_eq!(w.chunks().as_slice(), &[vec![1, 1, 1], vec![2], vec![1, 1]]);
        assert_eq!(compute(&w).shape(), &[3, 2, 2]);

        let bad = arange(&[3], 3);
        let err = (&x + &bad).unwrap_err();
        assert!(matches!(err, ArrayError::IncompatibleShapes(_)));
        assert_eq!(err.kind(), ErrorKind::Value);
    }

    #[test]
    fn elemwise_unifies_chunks() {
        let x = arange(&[6], 2);
        let y = arange(&[6], 3);
        let z = (&x - &y).unwrap();
        assert_eq!(z.chunks().as_slice(), &[vec![2, 1, 1, 2]]);
        assert_eq!(compute(&z), Block::zeros(DataType::Int64, &[6]));
    }

    #[test]
    fn elemwise_scalars_and_dtypes() {
        let x = arange(&[4], 2).astype(DataType::Float32).unwrap();
        assert_eq!(x.data_type(), DataType::Float32);
        assert_eq!((&x * 2.0).unwrap().data_type(), DataType::Float32);
        assert_eq!((&x * 1e300).unwrap().data_type(), DataType::Float64);
        let i = arange(&[4], 2);
        assert_eq!((&i / &i).unwrap().data_type(), DataType::Float64);
        assert_eq!(i.less(2).unwrap().data_type(), DataType::Bool);

        let reversed = (10 - &i).unwrap();
        assert_eq!(
            compute(&reversed),
            Block::from_vec(&[4], vec![10i64, 9, 8, 7]).unwrap()
        );
        let negated = (-&i).unwrap();
        assert_eq!(
            compute(&negated),
            Block::from_vec(&[4], vec![0i64, -1, -2, -3]).unwrap()
        );
        let external = elemwise(
            &(Arc::new(BinaryOp::Add) as Operation),
            &[(&i).into(), Block::from_vec(&[4], vec![1i64, 1, 1, 1]).unwrap().into()],
            &ElemwiseOptions::new(),
        )
        .unwrap();
        assert_eq!(
            compute(&external),
            Block::from_vec(&[4], vec![1i64, 2, 3, 4]).unwrap()
        );
    }

    #[test]
    fn elemwise_data_type_inference_failure() {
        let x = arange(&[4], 2);
        let err = x.logical_not().unwrap_err();
        assert!(matches!(err, ArrayError::DataTypeInference { .. }));
        let forced = elemwise(
            &(Arc::new(UnaryOp::LogicalNot) as Operation),
            &[(&x).into()],
            &ElemwiseOptions::new().data_type(DataType::Bool).name("not"),
        )
        .unwrap();
        assert_eq!(forced.name(), "not");
        assert_eq!(forced.data_type(), DataType::Bool);
    }

    #[test]
    fn ufunc_keywords() {
        let x = arange(&[4], 2);
        let y = ufunc("add", &[(&x).into(), 1.into()], &[("dtype", "float64"), ("name", "y")]).unwrap();
        assert_eq!(y.name(), "y");
        assert_eq!(y.data_type(), DataType::Float64);

        let err = ufunc("add", &[(&x).into(), 1.into()], &[("out", "x")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        assert!(err.to_string().contains("add") && err.to_string().contains("out"));

        assert!(matches!(
            ufunc("frobnicate", &[(&x).into()], &[]),
            Err(ArrayError::UnknownOperation(_))
        ));
        assert!(matches!(
            ufunc("add", &[(&x).into()], &[]),
            Err(ArrayError::OperandCount { .. })
        ));
    }

    #[test]
    fn elemwise_literal_task_arguments() {
        let x = arange(&[2], 2);
        let y = x.pow(2).unwrap();
        let Task::Call { operation, args } =
            &y.graph().layer(y.name()).unwrap()[&GraphKey::new(y.name(), vec![0])]
        else {
            panic!("expected a call");
        };
        assert_eq!(operation.name(), "power(2)");
        assert_eq!(args.len(), 1);
        assert_eq!(
            compute(&y),
            Block::from_vec(&[2], vec![0i64, 1]).unwrap()
        );
    }
}
