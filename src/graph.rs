//! Task graphs.
//!
//! A [`TaskGraph`] maps [`GraphKey`]s to [`Task`]s. A task is either a literal [`Value`], an alias of
//! another key, or a call of a [`BlockOperation`] on arguments that may reference other keys.
//!
//! Graphs are stored as named layers of shared task maps. Merging graphs shares layers rather than
//! copying tasks, so combining many arrays into one expression stays cheap.
//!
//! A [`Scheduler`] executes a task graph and returns the values of requested keys.

mod operation;
mod scheduler;

pub use operation::{
    operation_token, partial_by_order, BlockFn, BlockOperation, Operation, PartialByOrder,
};
pub(crate) use operation::expect_args;
pub use scheduler::{ComputeError, Scheduler, SynchronousScheduler, ThreadedScheduler};

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use itertools::Itertools;

use crate::{
    block::{Block, BlockError, NestedBlocks, Scalar, Selection},
    source::{ArrayLike, SourceLock},
    tokenize::{Tokenize, Tokenizer},
};

/// A task key: an array name and block coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphKey {
    name: String,
    index: Vec<usize>,
}

impl GraphKey {
    /// Create a new key.
    #[must_use]
    pub fn new(name: impl Into<String>, index: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    /// Create a key without block coordinates.
    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::new(name, vec![])
    }

    /// Returns the name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the block coordinates.
    #[must_use]
    pub fn index(&self) -> &[usize] {
        &self.index
    }
}

impl std::fmt::Display for GraphKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.index.is_empty() {
            write!(f, "('{}',)", self.name)
        } else {
            write!(f, "('{}', {})", self.name, self.index.iter().join(", "))
        }
    }
}

impl Tokenize for GraphKey {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        self.name.tokenize(tokenizer);
        self.index.tokenize(tokenizer);
    }
}

/// A value produced or consumed by a task.
#[derive(Debug, Clone)]
pub enum Value {
    /// A block.
    Block(Arc<Block>),
    /// A scalar.
    Scalar(Scalar),
    /// A list of values.
    List(Vec<Value>),
    /// A block selection.
    Selection(Selection),
    /// A shape.
    Shape(Vec<usize>),
    /// An external data source.
    Source(Arc<dyn ArrayLike>),
    /// A lock guarding an external data source.
    Lock(SourceLock),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Block(a), Self::Block(b)) => Arc::ptr_eq(a, b) || a == b,
            (Self::Scalar(a), Self::Scalar(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Selection(a), Self::Selection(b)) => a == b,
            (Self::Shape(a), Self::Shape(b)) => a == b,
            (Self::Source(a), Self::Source(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (Self::Lock(a), Self::Lock(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Block> for Value {
    fn from(block: Block) -> Self {
        Self::Block(Arc::new(block))
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        Self::Scalar(scalar)
    }
}

impl From<Selection> for Value {
    fn from(selection: Selection) -> Self {
        Self::Selection(selection)
    }
}

impl Value {
    /// A short description of the kind of value, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Block(_) => "block",
            Self::Scalar(_) => "scalar",
            Self::List(_) => "list",
            Self::Selection(_) => "selection",
            Self::Shape(_) => "shape",
            Self::Source(_) => "source",
            Self::Lock(_) => "lock",
        }
    }

    fn unexpected(&self, expected: &'static str) -> BlockError {
        BlockError::UnexpectedValue {
            expected,
            got: self.kind().to_string(),
        }
    }

    /// Borrow the value as a block. Scalars are converted to zero-dimensional blocks.
    ///
    /// # Errors
    /// Returns [`BlockError::UnexpectedValue`] if the value is not a block or scalar.
    pub fn to_block(&self) -> Result<std::borrow::Cow<'_, Block>, BlockError> {
        match self {
            Self::Block(block) => Ok(std::borrow::Cow::Borrowed(block)),
            Self::Scalar(scalar) => Ok(std::borrow::Cow::Owned(Block::from_scalar(*scalar))),
            _ => Err(self.unexpected("a block")),
        }
    }

    /// Borrow the value as a selection.
    ///
    /// # Errors
    /// Returns [`BlockError::UnexpectedValue`] if the value is not a selection.
    pub fn as_selection(&self) -> Result<&Selection, BlockError> {
        match self {
            Self::Selection(selection) => Ok(selection),
            _ => Err(self.unexpected("a selection")),
        }
    }

    /// Borrow the value as a shape.
    ///
    /// # Errors
    /// Returns [`BlockError::UnexpectedValue`] if the value is not a shape.
    pub fn as_shape(&self) -> Result<&[usize], BlockError> {
        match self {
            Self::Shape(shape) => Ok(shape),
            _ => Err(self.unexpected("a shape")),
        }
    }

    /// Convert a (possibly nested) list of blocks into [`NestedBlocks`].
    ///
    /// # Errors
    /// Returns [`BlockError::UnexpectedValue`] if a leaf is not a block or scalar.
    pub fn to_nested_blocks(&self) -> Result<NestedBlocks<'_>, BlockError> {
        match self {
            Self::List(items) => Ok(NestedBlocks::List(
                items
                    .iter()
                    .map(Self::to_nested_blocks)
                    .collect::<Result<_, _>>()?,
            )),
            _ => Ok(NestedBlocks::Leaf(self.to_block()?)),
        }
    }

    /// Returns the leaves of a (possibly nested) list of values in depth-first order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Self> {
        match self {
            Self::List(items) => items.iter().flat_map(Self::leaves).collect(),
            value => vec![value],
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Block(block) => write!(f, "<{} block {:?}>", block.data_type(), block.shape()),
            Self::Scalar(scalar) => write!(f, "{scalar}"),
            Self::List(items) => write!(f, "[{}]", items.iter().join(", ")),
            Self::Selection(selection) => write!(f, "{selection}"),
            Self::Shape(shape) => write!(f, "{}", crate::chunks::fmt_tuple(shape)),
            Self::Source(source) => write!(f, "<source {:?}>", source.shape()),
            Self::Lock(_) => write!(f, "<lock>"),
        }
    }
}

impl Tokenize for Value {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        match self {
            Self::Block(block) => {
                tokenizer.write_bytes(b'B', &[]);
                block.tokenize(tokenizer);
            }
            Self::Scalar(scalar) => scalar.tokenize(tokenizer),
            Self::List(items) => items.tokenize(tokenizer),
            Self::Selection(selection) => selection.tokenize(tokenizer),
            Self::Shape(shape) => {
                tokenizer.write_bytes(b'S', &[]);
                shape.tokenize(tokenizer);
            }
            Self::Source(source) => {
                tokenizer.write_bytes(b'R', source.token().as_bytes());
            }
            Self::Lock(lock) => lock.tokenize(tokenizer),
        }
    }
}

/// A nested list of keys, mirroring the block grid of an array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NestedKeys {
    /// A single key.
    Key(GraphKey),
    /// A list of nested keys.
    List(Vec<NestedKeys>),
}

impl NestedKeys {
    /// Returns the keys in depth-first order.
    #[must_use]
    pub fn flatten(&self) -> Vec<GraphKey> {
        match self {
            Self::Key(key) => vec![key.clone()],
            Self::List(items) => items.iter().flat_map(Self::flatten).collect(),
        }
    }

    /// Returns the list items, or [`None`] for a single key.
    #[must_use]
    pub fn as_list(&self) -> Option<&[NestedKeys]> {
        match self {
            Self::Key(_) => None,
            Self::List(items) => Some(items),
        }
    }
}

impl From<&NestedKeys> for TaskArg {
    fn from(keys: &NestedKeys) -> Self {
        match keys {
            NestedKeys::Key(key) => Self::Key(key.clone()),
            NestedKeys::List(items) => Self::List(items.iter().map(Self::from).collect()),
        }
    }
}

/// An argument of a [`Task::Call`].
#[derive(Debug, Clone, PartialEq)]
pub enum TaskArg {
    /// The value of another task.
    Key(GraphKey),
    /// A list of arguments, resolved to a [`Value::List`].
    List(Vec<TaskArg>),
    /// A literal value.
    Value(Value),
}

impl From<GraphKey> for TaskArg {
    fn from(key: GraphKey) -> Self {
        Self::Key(key)
    }
}

impl From<Value> for TaskArg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl TaskArg {
    fn collect_dependencies<'a>(&'a self, dependencies: &mut Vec<&'a GraphKey>) {
        match self {
            Self::Key(key) => dependencies.push(key),
            Self::List(items) => {
                for item in items {
                    item.collect_dependencies(dependencies);
                }
            }
            Self::Value(_) => {}
        }
    }
}

/// A task.
#[derive(Debug, Clone)]
pub enum Task {
    /// The value of another key.
    Alias(GraphKey),
    /// A call of an operation.
    Call {
        /// The operation.
        operation: Operation,
        /// The arguments.
        args: Vec<TaskArg>,
    },
    /// A literal value.
    Value(Value),
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Alias(a), Self::Alias(b)) => a == b,
            (
                Self::Call {
                    operation: op_a,
                    args: args_a,
                },
                Self::Call {
                    operation: op_b,
                    args: args_b,
                },
            ) => {
                args_a == args_b
                    && (Arc::ptr_eq(op_a, op_b)
                        || operation_token(op_a.as_ref()) == operation_token(op_b.as_ref()))
            }
            (Self::Value(a), Self::Value(b)) => a == b,
            _ => false,
        }
    }
}

impl Task {
    /// Create a call task.
    #[must_use]
    pub fn call(operation: &Operation, args: Vec<TaskArg>) -> Self {
        Self::Call {
            operation: Arc::clone(operation),
            args,
        }
    }

    /// Returns the keys this task depends on, without duplicates.
    #[must_use]
    pub fn dependencies(&self) -> Vec<&GraphKey> {
        let mut dependencies = Vec::new();
        match self {
            Self::Alias(key) => dependencies.push(key),
            Self::Call { args, .. } => {
                for arg in args {
                    arg.collect_dependencies(&mut dependencies);
                }
            }
            Self::Value(_) => {}
        }
        dependencies.into_iter().unique().collect()
    }

    /// Returns the operation of a call task.
    #[must_use]
    pub fn operation(&self) -> Option<&Operation> {
        match self {
            Self::Call { operation, .. } => Some(operation),
            _ => None,
        }
    }

    /// Returns the arguments of a call task.
    #[must_use]
    pub fn args(&self) -> &[TaskArg] {
        match self {
            Self::Call { args, .. } => args,
            _ => &[],
        }
    }
}

/// The tasks of one layer of a [`TaskGraph`].
pub type Tasks = HashMap<GraphKey, Task>;

/// A task graph, stored as named layers of shared task maps.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    layers: BTreeMap<String, Arc<Tasks>>,
}

impl TaskGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a graph with a single layer.
    #[must_use]
    pub fn from_layer(name: impl Into<String>, tasks: Tasks) -> Self {
        Self::new().with_layer(name, tasks)
    }

    /// Add a layer to the graph, returning the graph.
    ///
    /// If a layer with the same name exists, the tasks are merged and existing tasks take precedence.
    #[must_use]
    pub fn with_layer(mut self, name: impl Into<String>, tasks: Tasks) -> Self {
        self.insert_layer(name.into(), Arc::new(tasks));
        self
    }

    fn insert_layer(&mut self, name: String, tasks: Arc<Tasks>) {
        match self.layers.get_mut(&name) {
            None => {
                self.layers.insert(name, tasks);
            }
            Some(existing) if Arc::ptr_eq(existing, &tasks) => {}
            Some(existing) => {
                let missing: Vec<_> = tasks
                    .iter()
                    .filter(|(key, _)| !existing.contains_key(*key))
                    .collect();
                if !missing.is_empty() {
                    let mut merged = Tasks::clone(existing);
                    merged.extend(missing.into_iter().map(|(k, t)| (k.clone(), t.clone())));
                    *existing = Arc::new(merged);
                }
            }
        }
    }

    /// Merge graphs, sharing their layers.
    #[must_use]
    pub fn merge<'a>(graphs: impl IntoIterator<Item = &'a Self>) -> Self {
        let mut merged = Self::new();
        for graph in graphs {
            for (name, tasks) in &graph.layers {
                merged.insert_layer(name.clone(), Arc::clone(tasks));
            }
        }
        merged
    }

    /// Returns the task for `key`.
    #[must_use]
    pub fn get(&self, key: &GraphKey) -> Option<&Task> {
        if let Some(task) = self.layers.get(key.name()).and_then(|tasks| tasks.get(key)) {
            return Some(task);
        }
        self.layers.values().find_map(|tasks| tasks.get(key))
    }

    /// Returns true if the graph contains `key`.
    #[must_use]
    pub fn contains_key(&self, key: &GraphKey) -> bool {
        self.get(key).is_some()
    }

    /// Returns the unique keys of the graph.
    #[must_use]
    pub fn keys(&self) -> HashSet<&GraphKey> {
        self.layers.values().flat_map(|tasks| tasks.keys()).collect()
    }

    /// Returns the number of unique keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    /// Returns true if the graph has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.values().all(|tasks| tasks.is_empty())
    }

    /// Returns the tasks of the layer `name`.
    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&Tasks> {
        self.layers.get(name).map(AsRef::as_ref)
    }

    /// Returns the layer names.
    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    /// Returns an iterator over the tasks. Keys present in more than one layer are visited once.
    pub fn iter(&self) -> impl Iterator<Item = (&GraphKey, &Task)> {
        let mut seen = HashSet::new();
        self.layers
            .values()
            .flat_map(|tasks| tasks.iter())
            .filter(move |(key, _)| seen.insert(*key))
    }

    /// Returns the tasks as a single flat map.
    #[must_use]
    pub fn to_tasks(&self) -> Tasks {
        self.iter()
            .map(|(key, task)| (key.clone(), task.clone()))
            .collect()
    }
}
