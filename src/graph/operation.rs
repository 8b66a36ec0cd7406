use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use itertools::Itertools;

use super::Value;
use crate::{
    array::ArrayError,
    block::{Block, BlockError},
    tokenize::{Tokenize, Tokenizer},
};

/// An operation applied to the resolved arguments of a task.
pub trait BlockOperation: std::fmt::Debug + Send + Sync {
    /// The name of the operation. Used as the prefix of derived array names.
    fn name(&self) -> String;

    /// Returns true if the operation has no meaningful name.
    fn is_anonymous(&self) -> bool {
        false
    }

    /// Hash everything that determines the behaviour of the operation.
    ///
    /// Operations with equal tokens are considered interchangeable.
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.update(&self.name());
    }

    /// Apply the operation.
    ///
    /// # Errors
    /// Returns a [`BlockError`] if the arguments are invalid or the operation fails.
    fn call(&self, args: &[Value]) -> Result<Value, BlockError>;
}

/// A shared [`BlockOperation`].
pub type Operation = Arc<dyn BlockOperation>;

/// Returns the token of an operation.
#[must_use]
pub fn operation_token(operation: &dyn BlockOperation) -> String {
    let mut tokenizer = Tokenizer::new();
    operation.tokenize(&mut tokenizer);
    tokenizer.finish()
}

impl Tokenize for Operation {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.write_bytes(b'O', operation_token(self.as_ref()).as_bytes());
    }
}

pub(crate) fn expect_args(
    operation: &str,
    args: &[Value],
    expected: usize,
) -> Result<(), BlockError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(BlockError::ArgumentCount {
            operation: operation.to_string(),
            expected,
            got: args.len(),
        })
    }
}

type BoxedFn = Arc<dyn Fn(&[Value]) -> Result<Value, BlockError> + Send + Sync>;

static NEXT_FUNCTION_ID: AtomicU64 = AtomicU64::new(0);

/// A user-supplied block function.
///
/// Named functions are identified by their name: two functions with the same name are treated as the same operation.
/// Anonymous functions are identified by the instance, so clones of one [`Operation`] share keys but separately created
/// anonymous functions never do.
#[derive(Clone)]
pub struct BlockFn {
    name: Option<String>,
    id: u64,
    function: BoxedFn,
}

impl std::fmt::Debug for BlockFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockFn")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl BlockFn {
    fn create(
        name: Option<&str>,
        function: impl Fn(&[Value]) -> Result<Value, BlockError> + Send + Sync + 'static,
    ) -> Operation {
        Arc::new(Self {
            name: name.map(str::to_string),
            id: NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed),
            function: Arc::new(function),
        })
    }

    /// Create a named operation from a function of the task arguments.
    pub fn named(
        name: &str,
        function: impl Fn(&[Value]) -> Result<Value, BlockError> + Send + Sync + 'static,
    ) -> Operation {
        Self::create(Some(name), function)
    }

    /// Create an anonymous operation from a function of the task arguments.
    pub fn anonymous(
        function: impl Fn(&[Value]) -> Result<Value, BlockError> + Send + Sync + 'static,
    ) -> Operation {
        Self::create(None, function)
    }

    /// Create an operation applying `function` to the first argument, which must be a block or scalar.
    pub fn map(
        name: Option<&str>,
        function: impl Fn(&Block) -> Result<Block, BlockError> + Send + Sync + 'static,
    ) -> Operation {
        Self::create(name, move |args| {
            let block = args
                .first()
                .ok_or(BlockError::ArgumentCount {
                    operation: "map".to_string(),
                    expected: 1,
                    got: 0,
                })?
                .to_block()?;
            function(&block).map(Value::from)
        })
    }
}

impl BlockOperation for BlockFn {
    fn name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "lambda".to_string())
    }

    fn is_anonymous(&self) -> bool {
        self.name.is_none()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        match &self.name {
            Some(name) => tokenizer.update(name),
            None => tokenizer.update(&self.id),
        };
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        (self.function)(args)
    }
}

/// An operation with some arguments fixed at given positions.
#[derive(Debug, Clone)]
pub struct PartialByOrder {
    operation: Operation,
    fixed: Vec<(usize, Value)>,
}

/// Fix arguments of `operation` at the given positions.
///
/// The remaining arguments of each call fill the free positions in order.
///
/// # Errors
/// Returns [`ArrayError::DuplicateArgumentPosition`] if a position is fixed more than once.
pub fn partial_by_order(
    operation: Operation,
    fixed: Vec<(usize, Value)>,
) -> Result<Operation, ArrayError> {
    if let Some(position) = fixed.iter().map(|(position, _)| *position).duplicates().next() {
        return Err(ArrayError::DuplicateArgumentPosition(position));
    }
    let mut fixed = fixed;
    fixed.sort_by_key(|(position, _)| *position);
    Ok(Arc::new(PartialByOrder { operation, fixed }))
}

impl BlockOperation for PartialByOrder {
    fn name(&self) -> String {
        if self.operation.is_anonymous() {
            "partial_by_order".to_string()
        } else {
            format!(
                "{}({})",
                self.operation.name(),
                self.fixed.iter().map(|(_, value)| value).join(", ")
            )
        }
    }

    fn is_anonymous(&self) -> bool {
        self.operation.is_anonymous()
    }

    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.write_bytes(b'P', &[]);
        self.operation.tokenize(tokenizer);
        self.fixed.tokenize(tokenizer);
    }

    fn call(&self, args: &[Value]) -> Result<Value, BlockError> {
        let total = args.len() + self.fixed.len();
        let mut free = args.iter();
        let mut fixed = self.fixed.iter().peekable();
        let mut full = Vec::with_capacity(total);
        for position in 0..total {
            match fixed.next_if(|(fixed_position, _)| *fixed_position == position) {
                Some((_, value)) => full.push(value.clone()),
                None => match free.next() {
                    Some(value) => full.push(value.clone()),
                    None => break,
                },
            }
        }
        if full.len() != total {
            return Err(BlockError::ArgumentCount {
                operation: self.name(),
                expected: self.fixed.last().map_or(0, |(position, _)| position + 1) - self.fixed.len(),
                got: args.len(),
            });
        }
        self.operation.call(&full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BinaryOp, Scalar};

    fn scalar(value: i64) -> Value {
        Value::Scalar(Scalar::Int(value))
    }

    #[test]
    fn partial_by_order_fills_positions() {
        let sub: Operation = Arc::new(BinaryOp::Subtract);
        let op = partial_by_order(sub, vec![(0, scalar(20))]).unwrap();
        let block = Value::from(Block::from_scalar(Scalar::Int(5)));
        let result = op.call(&[block]).unwrap();
        assert_eq!(result.to_block().unwrap().to_scalar().unwrap(), Scalar::Int(15));
        assert_eq!(op.name(), "subtract(20)");
    }

    #[test]
    fn partial_by_order_duplicate_positions() {
        let add: Operation = Arc::new(BinaryOp::Add);
        let err = partial_by_order(add, vec![(1, scalar(1)), (1, scalar(2))]).unwrap_err();
        assert!(matches!(err, ArrayError::DuplicateArgumentPosition(1)));
    }

    #[test]
    fn partial_by_order_anonymous_name() {
        let f = BlockFn::anonymous(|args| Ok(args[0].clone()));
        let op = partial_by_order(f, vec![(1, scalar(1))]).unwrap();
        assert_eq!(op.name(), "partial_by_order");
        assert!(op.is_anonymous());
    }

    #[test]
    fn partial_by_order_trailing_fixed_argument() {
        let sub: Operation = Arc::new(BinaryOp::Subtract);
        let op = partial_by_order(sub, vec![(1, scalar(2))]).unwrap();
        let block = Value::from(Block::from_scalar(Scalar::Int(5)));
        assert_eq!(
            op.call(&[block]).unwrap().to_block().unwrap().to_scalar().unwrap(),
            Scalar::Int(3)
        );
        assert!(op.call(&[]).is_err());
    }

    #[test]
    fn block_fn_tokens() {
        let a = BlockFn::named("double", |args| Ok(args[0].clone()));
        let b = BlockFn::named("double", |args| Ok(args[0].clone()));
        assert_eq!(operation_token(a.as_ref()), operation_token(b.as_ref()));
        let c = BlockFn::anonymous(|args| Ok(args[0].clone()));
        let d = BlockFn::anonymous(|args| Ok(args[0].clone()));
        assert_ne!(operation_token(c.as_ref()), operation_token(d.as_ref()));
        assert_eq!(operation_token(c.as_ref()), operation_token(Arc::clone(&c).as_ref()));
        assert_eq!(c.name(), "lambda");
    }

    #[test]
    fn block_fn_map() {
        let double = BlockFn::map(Some("double"), |block| {
            crate::block::BinaryOp::Multiply.apply(
                crate::block::BlockOperand::Block(block),
                crate::block::BlockOperand::Scalar(Scalar::Int(2)),
            )
        });
        let out = double.call(&[scalar(4)]).unwrap();
        assert_eq!(out.to_block().unwrap().to_scalar().unwrap(), Scalar::Int(8));
        assert!(double.call(&[]).is_err());
    }
}
