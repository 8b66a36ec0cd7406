//! Block operations used by array tasks.
//!
//! Every task of an array graph calls one of the [`BlockOperation`]s defined here (or a user-supplied
//! [`BlockFn`](crate::graph::BlockFn)) on the resolved values of its arguments.

use std::{ops::Range, path::PathBuf, sync::Arc};

use crate::{
    block::{
        choose, concatenate3, isclose, select_where, tensordot, BinaryOp, Block, BlockError,
        BlockOperand, DataType, ReductionOp, Scalar, Selection, SliceSpec, UnaryOp,
    },
    graph::{expect_args, BlockOperation, Operation, Value},
    source::ArrayStore,
    tokenize::{Tokenize, Tokenizer},
};

fn operand(value: &Value) -> Result<BlockOperand<'_>, BlockError> {
    match value {
        Value::Block(block) => Ok(BlockOperand::Block(block)),
        Value::Scalar(scalar) => Ok(BlockOperand::Scalar(*scalar)),
        value => Err(BlockError::UnexpectedValue {
            expected: "a block or scalar",
            got: value.kind().to_string(),
        }),
    }
}

/// Extract the ranges of a selection made only of ranges with a step of one.
pub(crate) fn region(selection: &Selection) -> Result<Vec<Range<usize>>, BlockError> {
    selection
        .iter()
        .map(|spec| match spec {
            SliceSpec::Range {
                start,
                stop: Some(stop),
                step: 1,
            } => Ok(*start..*stop),
            _ => Err(BlockError::UnexpectedValue {
                expected: "a region of ranges",
                got: selection.to_string(),
            }),
        })
        .collect()
}

impl BlockOperation for BinaryOp {
    fn name(&self) -> String {
        BinaryOp::name(*self).to_string()
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args(BinaryOp::name(*self), args, 2)?;
        let result = self.apply(operand(&args[0])?, operand(&args[1])?)?;
        Ok(result.into())
    }
}

impl BlockOperation for UnaryOp {
    fn name(&self) -> String {
        UnaryOp::name(*self).to_string()
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args(UnaryOp::name(*self), args, 1)?;
        Ok(self.apply(&*args[0].to_block()?)?.into())
    }
}

/// Read a selection from a block or an external source.
///
/// Arguments: the source, a [`Selection`], and optionally a lock held while reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetArray;

impl BlockOperation for GetArray {
    fn name(&self) -> String {
        "getarray".to_string()
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        let (source, selection, lock) = match args {
            [source, selection] => (source, selection.as_selection()?, None),
            [source, selection, Value::Lock(lock)] => {
                (source, selection.as_selection()?, Some(lock))
            }
            _ => {
                return Err(BlockError::ArgumentCount {
                    operation: self.name(),
                    expected: 2,
                    got: args.len(),
                })
            }
        };
        let _guard = lock.map(|lock| lock.lock());
        let block = match source {
            Value::Source(source) => source.get(selection)?,
            value => value.to_block()?.select(selection)?,
        };
        Ok(block.into())
    }
}

/// Assemble a nested list of blocks with [`concatenate3`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Concatenate3;

impl BlockOperation for Concatenate3 {
    fn name(&self) -> String {
        "concatenate3".to_string()
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("concatenate3", args, 1)?;
        Ok(concatenate3(&args[0].to_nested_blocks()?)?.into())
    }
}

/// Convert a block to a data type.
#[derive(Debug, Clone, Copy)]
pub struct Astype(pub DataType);

impl BlockOperation for Astype {
    fn name(&self) -> String {
        "astype".to_string()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.update("astype").update(&self.0);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("astype", args, 1)?;
        Ok(args[0].to_block()?.astype(self.0).into())
    }
}

/// Permute the axes of a block.
#[derive(Debug, Clone)]
pub struct Transpose(pub Vec<usize>);

impl BlockOperation for Transpose {
    fn name(&self) -> String {
        "transpose".to_string()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.update("transpose").update(&self.0);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("transpose", args, 1)?;
        Ok(args[0].to_block()?.transpose(&self.0)?.into())
    }
}

/// Reshape a block. Arguments: the block and the new [`Value::Shape`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Reshape;

impl BlockOperation for Reshape {
    fn name(&self) -> String {
        "reshape".to_string()
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("reshape", args, 2)?;
        Ok(args[0].to_block()?.reshape(args[1].as_shape()?)?.into())
    }
}

/// Broadcast a block. Arguments: the block and the target [`Value::Shape`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastTo;

impl BlockOperation for BroadcastTo {
    fn name(&self) -> String {
        "broadcast_to".to_string()
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("broadcast_to", args, 2)?;
        Ok(args[0].to_block()?.broadcast_to(args[1].as_shape()?)?.into())
    }
}

/// Flatten a (possibly nested) list into its leaves and their positions in the nesting.
fn indexed_leaves<'a>(value: &'a Value, path: &mut Vec<usize>, out: &mut Vec<(Vec<usize>, &'a Value)>) {
    match value {
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(i);
                indexed_leaves(item, path, out);
                path.pop();
            }
        }
        value => out.push((path.clone(), value)),
    }
}

/// Contract two lists of blocks and sum the partial products.
///
/// The arguments are nested lists of blocks along the contracted block axes, in the axis order of each operand.
/// `rhs_order[j]` is the nesting level of the left operand that corresponds to nesting level `j` of the right operand.
#[derive(Debug, Clone)]
pub struct TensorDotMany {
    /// The contracted axes of the left blocks.
    pub lhs_axes: Vec<usize>,
    /// The contracted axes of the right blocks.
    pub rhs_axes: Vec<usize>,
    /// The correspondence between right and left nesting levels.
    pub rhs_order: Vec<usize>,
}

impl BlockOperation for TensorDotMany {
    fn name(&self) -> String {
        "tensordot".to_string()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer
            .update("tensordot")
            .update(&self.lhs_axes)
            .update(&self.rhs_axes)
            .update(&self.rhs_order);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("tensordot", args, 2)?;
        let mut lhs = Vec::new();
        indexed_leaves(&args[0], &mut Vec::new(), &mut lhs);
        let mut rhs = Vec::new();
        indexed_leaves(&args[1], &mut Vec::new(), &mut rhs);

        let mut total: Option<Block> = None;
        for (lhs_path, lhs_block) in &lhs {
            let rhs_path: Vec<usize> = self
                .rhs_order
                .iter()
                .map(|&level| lhs_path.get(level).copied().unwrap_or(0))
                .collect();
            let Some((_, rhs_block)) = rhs.iter().find(|(path, _)| *path == rhs_path) else {
                return Err(BlockError::Shape(format!(
                    "no right operand block at {rhs_path:?} to contract with"
                )));
            };
            let product = tensordot(
                &*lhs_block.to_block()?,
                &*rhs_block.to_block()?,
                &self.lhs_axes,
                &self.rhs_axes,
            )?;
            total = Some(match total {
                None => product,
                Some(total) => BinaryOp::Add.apply(
                    BlockOperand::Block(&total),
                    BlockOperand::Block(&product),
                )?,
            });
        }
        total
            .map(Value::from)
            .ok_or_else(|| BlockError::Shape("no blocks to contract".to_string()))
    }
}

/// Reduce all blocks of a (possibly nested) list, either fully or along one axis.
#[derive(Debug, Clone, Copy)]
pub struct Reduction {
    /// The reduction.
    pub op: ReductionOp,
    /// The reduced axis, or [`None`] to reduce every element.
    pub axis: Option<usize>,
}

impl BlockOperation for Reduction {
    fn name(&self) -> String {
        self.op.name().to_string()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer
            .update(self.op.name())
            .update(&self.axis);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args(self.op.name(), args, 1)?;
        let blocks = args[0]
            .leaves()
            .into_iter()
            .map(Value::to_block)
            .collect::<Result<Vec<_>, _>>()?;
        let blocks: Vec<&Block> = blocks.iter().map(AsRef::as_ref).collect();
        Ok(self.op.reduce_many(&blocks, self.axis)?.into())
    }
}

/// Take elements from the second argument where the first is true and from the third elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct Where;

impl BlockOperation for Where {
    fn name(&self) -> String {
        "where".to_string()
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("where", args, 3)?;
        Ok(select_where(operand(&args[0])?, operand(&args[1])?, operand(&args[2])?)?.into())
    }
}

/// Take each element from the choice selected by the index in the first argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct Choose;

impl BlockOperation for Choose {
    fn name(&self) -> String {
        "choose".to_string()
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        let Some((index, choices)) = args.split_first() else {
            return Err(BlockError::ArgumentCount {
                operation: self.name(),
                expected: 2,
                got: 0,
            });
        };
        let choices = choices.iter().map(operand).collect::<Result<Vec<_>, _>>()?;
        Ok(choose(operand(index)?, &choices)?.into())
    }
}

/// Test two blocks for equality within a tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsClose {
    /// The relative tolerance.
    pub rtol: f64,
    /// The absolute tolerance.
    pub atol: f64,
    /// Whether NaNs compare equal.
    pub equal_nan: bool,
}

impl BlockOperation for IsClose {
    fn name(&self) -> String {
        "isclose".to_string()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer
            .update("isclose")
            .update(&self.rtol)
            .update(&self.atol)
            .update(&self.equal_nan);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("isclose", args, 2)?;
        let close = isclose(
            operand(&args[0])?,
            operand(&args[1])?,
            self.rtol,
            self.atol,
            self.equal_nan,
        )?;
        Ok(close.into())
    }
}

/// Reduce groups of neighbouring elements of a block.
#[derive(Debug, Clone)]
pub struct Coarsen {
    /// The reduction applied to each group.
    pub op: ReductionOp,
    /// The group extent along every axis.
    pub factors: Vec<usize>,
    /// Whether elements that do not fill a group are dropped.
    pub trim_excess: bool,
}

impl BlockOperation for Coarsen {
    fn name(&self) -> String {
        format!("coarsen-{}", self.op.name())
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer
            .update(&self.name())
            .update(&self.factors)
            .update(&self.trim_excess);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("coarsen", args, 1)?;
        let block = args[0].to_block()?;
        Ok(self.op.coarsen(&block, &self.factors, self.trim_excess)?.into())
    }
}

/// The `k` largest elements of a one-dimensional block, or of a list of blocks joined end to end.
#[derive(Debug, Clone, Copy)]
pub struct TopK {
    /// The number of elements to keep.
    pub k: usize,
}

impl BlockOperation for TopK {
    fn name(&self) -> String {
        "topk".to_string()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.update("topk").update(&self.k);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("topk", args, 1)?;
        let blocks = args[0]
            .leaves()
            .into_iter()
            .map(Value::to_block)
            .collect::<Result<Vec<_>, _>>()?;
        let blocks: Vec<&Block> = blocks.iter().map(AsRef::as_ref).collect();
        let joined = match blocks.as_slice() {
            [block] => block.topk(self.k)?,
            blocks => Block::concatenate(blocks, 0)?.topk(self.k)?,
        };
        Ok(joined.into())
    }
}

/// Gather points from a block.
///
/// The point axes are replaced by one leading axis holding the gathered points in order.
#[derive(Debug, Clone)]
pub struct VindexGather {
    /// The point axes of the block, in increasing order.
    pub axes: Vec<usize>,
    /// The block-local coordinates of each point, one list per point axis.
    pub points: Vec<Vec<usize>>,
}

impl BlockOperation for VindexGather {
    fn name(&self) -> String {
        "vindex-slice".to_string()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer
            .update("vindex-slice")
            .update(&self.axes)
            .update(&self.points);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("vindex-slice", args, 1)?;
        let block = args[0].to_block()?;
        let shape = block.shape();
        let rest: Vec<usize> = (0..block.ndim())
            .filter(|axis| !self.axes.contains(axis))
            .collect();
        let mut permutation = self.axes.clone();
        permutation.extend(&rest);
        let point_shape: Vec<usize> = self.axes.iter().map(|&axis| shape[axis]).collect();
        let mut flat_shape = vec![point_shape.iter().product::<usize>()];
        flat_shape.extend(rest.iter().map(|&axis| shape[axis]));

        let flat_points = (0..self.points.first().map_or(0, Vec::len))
            .map(|point| {
                self.points.iter().zip(&point_shape).try_fold(0, |flat, (coordinates, &size)| {
                    let coordinate = coordinates[point];
                    if coordinate < size {
                        Ok(flat * size + coordinate)
                    } else {
                        Err(BlockError::IndexOutOfBounds {
                            index: coordinate,
                            axis: 0,
                            size,
                        })
                    }
                })
            })
            .collect::<Result<Vec<usize>, _>>()?;
        let gathered = block
            .transpose(&permutation)?
            .reshape(&flat_shape)?
            .select(&Selection::new(vec![SliceSpec::Points(flat_points)]))?;
        Ok(gathered.into())
    }
}

/// Merge gathered points back into their original order.
///
/// The argument is the list of gathered blocks. `locations[g]` holds the output position of every
/// point of gather `g`. An empty merge produces an empty block of `data_type` with `trailing_shape`.
#[derive(Debug, Clone)]
pub struct VindexMerge {
    /// The output positions of the points of each gather.
    pub locations: Vec<Vec<usize>>,
    /// The data type of the output.
    pub data_type: DataType,
    /// The shape of the output after the point axis.
    pub trailing_shape: Vec<usize>,
}

impl BlockOperation for VindexMerge {
    fn name(&self) -> String {
        "vindex-merge".to_string()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer
            .update("vindex-merge")
            .update(&self.locations)
            .update(&self.data_type)
            .update(&self.trailing_shape);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("vindex-merge", args, 1)?;
        let gathered = args[0]
            .leaves()
            .into_iter()
            .filter(|value| !matches!(value, Value::List(_)))
            .map(Value::to_block)
            .collect::<Result<Vec<_>, _>>()?;
        if gathered.is_empty() {
            let mut shape = vec![0];
            shape.extend(&self.trailing_shape);
            return Ok(Block::zeros(self.data_type, &shape).into());
        }
        let gathered: Vec<&Block> = gathered.iter().map(AsRef::as_ref).collect();
        let concatenated = Block::concatenate(&gathered, 0)?.astype(self.data_type);

        let order: Vec<usize> = self.locations.iter().flatten().copied().collect();
        let mut inverse = vec![usize::MAX; order.len()];
        for (position, &location) in order.iter().enumerate() {
            match inverse.get_mut(location) {
                Some(slot) if *slot == usize::MAX => *slot = position,
                _ => {
                    return Err(BlockError::Other(format!(
                        "invalid point location {location}"
                    )))
                }
            }
        }
        let merged =
            concatenated.select(&Selection::new(vec![SliceSpec::Points(inverse)]))?;
        Ok(merged.into())
    }
}

/// Create a block filled with a value. Argument: the block [`Value::Shape`].
#[derive(Debug, Clone, Copy)]
pub struct Full {
    /// The fill value.
    pub value: Scalar,
    /// The data type of the block.
    pub data_type: DataType,
}

impl BlockOperation for Full {
    fn name(&self) -> String {
        "full".to_string()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer
            .update("full")
            .update(&self.value)
            .update(&self.data_type);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("full", args, 1)?;
        Ok(Block::full(self.data_type, args[0].as_shape()?, self.value).into())
    }
}

/// Create a block of evenly spaced values. Argument: the one-dimensional region of the block.
#[derive(Debug, Clone, Copy)]
pub struct Arange {
    /// The first value of the whole array.
    pub start: Scalar,
    /// The spacing between values.
    pub step: Scalar,
    /// The data type of the block.
    pub data_type: DataType,
}

impl BlockOperation for Arange {
    fn name(&self) -> String {
        "arange".to_string()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer
            .update("arange")
            .update(&self.start)
            .update(&self.step)
            .update(&self.data_type);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("arange", args, 1)?;
        let region = region(args[0].as_selection()?)?;
        let [range] = region.as_slice() else {
            return Err(BlockError::UnexpectedValue {
                expected: "a one-dimensional region",
                got: format!("{region:?}"),
            });
        };
        let values: Vec<Scalar> = if self.data_type.is_float() {
            let (start, step) = (self.start.cast::<f64>(), self.step.cast::<f64>());
            range
                .clone()
                .map(|i| Scalar::Float(start + step * i as f64))
                .collect()
        } else {
            let (start, step) = (self.start.cast::<i64>(), self.step.cast::<i64>());
            range
                .clone()
                .map(|i| {
                    let i = i64::try_from(i).unwrap_or(i64::MAX);
                    Scalar::Int(start.wrapping_add(step.wrapping_mul(i)))
                })
                .collect()
        };
        Ok(Block::from_scalars(self.data_type, &[values.len()], &values)?.into())
    }
}

type IndexFn = Arc<dyn Fn(&[usize]) -> Scalar + Send + Sync>;

/// Create a block by evaluating a function at the global coordinates of every element.
///
/// Argument: the region of the block.
#[derive(Clone)]
pub struct FromFunction {
    name: String,
    function: IndexFn,
    data_type: DataType,
}

impl std::fmt::Debug for FromFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FromFunction")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .finish_non_exhaustive()
    }
}

impl FromFunction {
    /// Create a new operation. Functions with the same `name` are assumed to be identical.
    pub fn new(
        name: &str,
        function: impl Fn(&[usize]) -> Scalar + Send + Sync + 'static,
        data_type: DataType,
    ) -> Self {
        Self {
            name: name.to_string(),
            function: Arc::new(function),
            data_type,
        }
    }
}

impl BlockOperation for FromFunction {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer
            .update("fromfunction")
            .update(&self.name)
            .update(&self.data_type);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("fromfunction", args, 1)?;
        let region = region(args[0].as_selection()?)?;
        let shape: Vec<usize> = region.iter().map(ExactSizeIterator::len).collect();
        let offsets: Vec<usize> = region.iter().map(|range| range.start).collect();
        let mut coordinates = vec![0; shape.len()];
        let values: Vec<Scalar> = crate::chunks::BlockIndices::new(&shape)
            .map(|local| {
                for (coordinate, (local, offset)) in
                    coordinates.iter_mut().zip(local.iter().zip(&offsets))
                {
                    *coordinate = local + offset;
                }
                (self.function)(&coordinates)
            })
            .collect();
        Ok(Block::from_scalars(self.data_type, &shape, &values)?.into())
    }
}

/// Read a block from a raw file written by [`to_block_stack`](crate::array::to_block_stack).
#[derive(Debug, Clone)]
pub struct LoadBlock {
    /// The file path.
    pub path: PathBuf,
    /// The data type of the block.
    pub data_type: DataType,
    /// The shape of the block.
    pub shape: Vec<usize>,
    /// True if the file is little-endian.
    pub little_endian: bool,
}

impl BlockOperation for LoadBlock {
    fn name(&self) -> String {
        "from-block-stack".to_string()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer
            .update("from-block-stack")
            .update(self.path.to_string_lossy().as_ref())
            .update(&self.data_type)
            .update(&self.shape);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("from-block-stack", args, 0)?;
        let mut bytes = std::fs::read(&self.path)?;
        if self.little_endian != cfg!(target_endian = "little") {
            for element in bytes.chunks_exact_mut(self.data_type.size()) {
                element.reverse();
            }
        }
        Ok(Block::from_ne_bytes(self.data_type, &self.shape, &bytes)?.into())
    }
}

/// Write a block to a raw little-endian file read by [`LoadBlock`]. Argument: the block. Returns an empty list.
#[derive(Debug, Clone)]
pub struct SaveBlock {
    /// The file path.
    pub path: PathBuf,
}

impl BlockOperation for SaveBlock {
    fn name(&self) -> String {
        "to-block-stack".to_string()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer
            .update("to-block-stack")
            .update(self.path.to_string_lossy().as_ref());
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("to-block-stack", args, 1)?;
        let block = args[0].to_block()?;
        let mut bytes = block.to_ne_bytes();
        if cfg!(target_endian = "big") {
            for element in bytes.chunks_exact_mut(block.data_type().size()) {
                element.reverse();
            }
        }
        std::fs::write(&self.path, bytes)?;
        Ok(Value::List(vec![]))
    }
}

/// Write a block into a region of an [`ArrayStore`]. Argument: the block. Returns the block.
#[derive(Debug, Clone)]
pub struct StoreBlock {
    /// The target.
    pub target: Arc<dyn ArrayStore>,
    /// The region of the target written by the block.
    pub region: Vec<Range<usize>>,
}

impl BlockOperation for StoreBlock {
    fn name(&self) -> String {
        "store".to_string()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer
            .update("store")
            .update(&self.target.token())
            .update(&self.region);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        expect_args("store", args, 1)?;
        self.target.write(&self.region, &*args[0].to_block()?)?;
        Ok(args[0].clone())
    }
}

/// Call an operation after replacing every argument that is a list with a single leaf by that leaf.
#[derive(Debug, Clone)]
pub struct Unwrap(pub Operation);

impl BlockOperation for Unwrap {
    fn name(&self) -> String {
        self.0.name()
    }

    fn is_anonymous(&self) -> bool {
        self.0.is_anonymous()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.update("unwrap");
        self.0.tokenize(tokenizer);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        let args: Vec<Value> = args
            .iter()
            .map(|arg| match arg.leaves().as_slice() {
                [leaf] if matches!(arg, Value::List(_)) => (*leaf).clone(),
                _ => arg.clone(),
            })
            .collect();
        self.0.call(&args)
    }
}

impl Tokenize for Range<usize> {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.update(&self.start).update(&self.end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceLock;

    fn block(shape: &[usize], values: Vec<i64>) -> Value {
        Block::from_vec(shape, values).unwrap().into()
    }

    fn to_vec(value: &Value) -> Vec<i64> {
        value.to_block().unwrap().cast::<i64>().iter().copied().collect()
    }

    #[test]
    fn binary_and_unary_operations() {
        let x = block(&[2], vec![1, 2]);
        let out = BinaryOp::Add
            .call(&[x.clone(), Value::Scalar(Scalar::Int(10))])
            .unwrap();
        assert_eq!(to_vec(&out), vec![11, 12]);
        let out = UnaryOp::Negative.call(&[x.clone()]).unwrap();
        assert_eq!(to_vec(&out), vec![-1, -2]);
        assert!(BinaryOp::Add.call(&[x.clone()]).is_err());
        assert!(BinaryOp::Add
            .call(&[x, Value::Shape(vec![1])])
            .is_err());
    }

    #[test]
    fn getarray_with_lock() {
        let x = block(&[2, 3], (0..6).collect());
        let selection = Value::Selection(Selection::new(vec![SliceSpec::NewAxis, SliceSpec::Index(1)]));
        let out = GetArray
            .call(&[x.clone(), selection.clone(), Value::Lock(SourceLock::new())])
            .unwrap();
        assert_eq!(out.to_block().unwrap().shape(), &[1, 3]);
        assert_eq!(to_vec(&out), vec![3, 4, 5]);
        let source: Value = Value::Source(Arc::new(Block::from_vec(&[2, 3], (0..6i64).collect()).unwrap()));
        assert_eq!(to_vec(&GetArray.call(&[source, selection]).unwrap()), vec![3, 4, 5]);
        assert!(GetArray.call(&[x]).is_err());
    }

    #[test]
    fn tensordot_many_sums_products() {
        // x = [[1, 2, 3, 4]] split into two blocks along the contracted axis
        let lhs = Value::List(vec![block(&[1, 2], vec![1, 2]), block(&[1, 2], vec![3, 4])]);
        let rhs = Value::List(vec![block(&[2, 1], vec![1, 1]), block(&[2, 1], vec![1, 1])]);
        let op = TensorDotMany {
            lhs_axes: vec![1],
            rhs_axes: vec![0],
            rhs_order: vec![0],
        };
        let out = op.call(&[lhs, rhs]).unwrap();
        assert_eq!(out.to_block().unwrap().shape(), &[1, 1]);
        assert_eq!(to_vec(&out), vec![10]);
    }

    #[test]
    fn reduction_over_nested_blocks() {
        let nested = Value::List(vec![
            Value::List(vec![block(&[1, 1], vec![1]), block(&[1, 1], vec![2])]),
            Value::List(vec![block(&[1, 1], vec![3]), block(&[1, 1], vec![4])]),
        ]);
        let sum = Reduction {
            op: ReductionOp::Sum,
            axis: None,
        };
        assert_eq!(to_vec(&sum.call(&[nested]).unwrap()), vec![10]);

        let column = Value::List(vec![block(&[2, 1], vec![1, 2]), block(&[1, 1], vec![3])]);
        let max = Reduction {
            op: ReductionOp::Max,
            axis: Some(0),
        };
        assert_eq!(to_vec(&max.call(&[column]).unwrap()), vec![3]);
    }

    #[test]
    fn vindex_gather_and_merge() {
        let x = block(&[3, 4], (0..12).collect());
        let gather = VindexGather {
            axes: vec![0, 1],
            points: vec![vec![2, 0], vec![1, 3]],
        };
        let gathered = gather.call(&[x.clone()]).unwrap();
        assert_eq!(to_vec(&gathered), vec![9, 3]);

        let other = VindexGather {
            axes: vec![0, 1],
            points: vec![vec![1], vec![1]],
        }
        .call(&[x])
        .unwrap();
        let merge = VindexMerge {
            locations: vec![vec![2, 0], vec![1]],
            data_type: DataType::Int64,
            trailing_shape: vec![],
        };
        let merged = merge.call(&[Value::List(vec![gathered, other])]).unwrap();
        assert_eq!(to_vec(&merged), vec![3, 5, 9]);

        let empty = merge.call(&[Value::List(vec![])]).unwrap();
        assert_eq!(empty.to_block().unwrap().shape(), &[0]);
    }

    #[test]
    fn creation_operations() {
        let full = Full {
            value: Scalar::Int(2),
            data_type: DataType::Float32,
        };
        let out = full.call(&[Value::Shape(vec![2, 2])]).unwrap();
        assert_eq!(out.to_block().unwrap().data_type(), DataType::Float32);

        let arange = Arange {
            start: Scalar::Int(1),
            step: Scalar::Int(2),
            data_type: DataType::Int64,
        };
        let out = arange
            .call(&[Value::Selection(Selection::from_ranges(&[2..5]))])
            .unwrap();
        assert_eq!(to_vec(&out), vec![5, 7, 9]);

        let sum = FromFunction::new(
            "sum",
            |index| Scalar::Int(index.iter().map(|&i| i as i64).sum()),
            DataType::Int64,
        );
        let out = sum
            .call(&[Value::Selection(Selection::from_ranges(&[1..3, 2..4]))])
            .unwrap();
        assert_eq!(to_vec(&out), vec![3, 4, 4, 5]);
    }

    #[test]
    fn unwrap_singleton_lists() {
        let op = Unwrap(Arc::new(UnaryOp::Negative));
        let out = op.call(&[Value::List(vec![block(&[1], vec![4])])]).unwrap();
        assert_eq!(to_vec(&out), vec![-4]);
    }
}
