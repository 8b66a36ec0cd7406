use std::{collections::HashMap, sync::Arc};

use rayon::prelude::*;
use thiserror::Error;

use super::{GraphKey, Task, TaskArg, TaskGraph, Value};
use crate::block::BlockError;

/// A task graph execution error.
#[derive(Debug, Error)]
pub enum ComputeError {
    /// A key is referenced but not present in the graph.
    #[error("key {0} is referenced but not present in the task graph")]
    MissingKey(GraphKey),
    /// The graph contains a cycle.
    #[error("the task graph contains a cycle through {0} tasks")]
    Cycle(usize),
    /// A task failed.
    #[error("task {key} ({operation}) failed: {source}")]
    Task {
        /// The key of the failed task.
        key: GraphKey,
        /// The name of the operation.
        operation: String,
        /// The error raised by the operation.
        #[source]
        source: BlockError,
    },
    /// The thread pool could not be created.
    #[error("failed to create a thread pool: {0}")]
    ThreadPool(String),
}

/// Executes task graphs.
pub trait Scheduler: Send + Sync {
    /// Execute the tasks required to produce `keys` and return their values in order.
    ///
    /// # Errors
    /// Returns a [`ComputeError`] if the graph is incomplete or cyclic, or a task fails.
    fn get(&self, graph: &TaskGraph, keys: &[GraphKey]) -> Result<Vec<Value>, ComputeError>;
}

/// A scheduler executing tasks one at a time on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynchronousScheduler;

impl Scheduler for SynchronousScheduler {
    fn get(&self, graph: &TaskGraph, keys: &[GraphKey]) -> Result<Vec<Value>, ComputeError> {
        execute(graph, keys, None)
    }
}

/// A scheduler executing independent tasks concurrently on a [`rayon`] thread pool.
///
/// The pool is created once and shared by clones of the scheduler.
#[derive(Debug, Clone)]
pub struct ThreadedScheduler {
    pool: Arc<rayon::ThreadPool>,
}

impl ThreadedScheduler {
    /// Create a threaded scheduler with `num_threads` threads. Zero selects the [`rayon`] default.
    ///
    /// # Errors
    /// Returns [`ComputeError::ThreadPool`] if the thread pool cannot be created.
    pub fn new(num_threads: usize) -> Result<Self, ComputeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|index| format!("chunkgraph-worker-{index}"))
            .build()
            .map_err(|err| ComputeError::ThreadPool(err.to_string()))?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Returns the number of threads in the pool.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Scheduler for ThreadedScheduler {
    fn get(&self, graph: &TaskGraph, keys: &[GraphKey]) -> Result<Vec<Value>, ComputeError> {
        execute(graph, keys, Some(self.pool.as_ref()))
    }
}

/// Collect the tasks reachable from `keys`.
fn reachable<'a>(
    graph: &'a TaskGraph,
    keys: &[GraphKey],
) -> Result<HashMap<&'a GraphKey, &'a Task>, ComputeError> {
    let mut tasks: HashMap<&GraphKey, &Task> = HashMap::new();
    let mut stack: Vec<&GraphKey> = Vec::new();
    for key in keys {
        let (key, task) = lookup(graph, key)?;
        if tasks.insert(key, task).is_none() {
            stack.push(key);
        }
    }
    while let Some(key) = stack.pop() {
        let task: &'a Task = tasks[key];
        for dependency in task.dependencies() {
            if !tasks.contains_key(dependency) {
                let (dependency, task) = lookup(graph, dependency)?;
                tasks.insert(dependency, task);
                stack.push(dependency);
            }
        }
    }
    Ok(tasks)
}

fn lookup<'a>(
    graph: &'a TaskGraph,
    key: &GraphKey,
) -> Result<(&'a GraphKey, &'a Task), ComputeError> {
    graph
        .layers
        .get(key.name())
        .and_then(|tasks| tasks.get_key_value(key))
        .or_else(|| graph.layers.values().find_map(|tasks| tasks.get_key_value(key)))
        .ok_or_else(|| ComputeError::MissingKey(key.clone()))
}

fn resolve(arg: &TaskArg, results: &HashMap<&GraphKey, Value>) -> Result<Value, ComputeError> {
    match arg {
        TaskArg::Key(key) => results
            .get(key)
            .cloned()
            .ok_or_else(|| ComputeError::MissingKey(key.clone())),
        TaskArg::List(items) => Ok(Value::List(
            items
                .iter()
                .map(|item| resolve(item, results))
                .collect::<Result<_, _>>()?,
        )),
        TaskArg::Value(value) => Ok(value.clone()),
    }
}

fn run(
    key: &GraphKey,
    task: &Task,
    results: &HashMap<&GraphKey, Value>,
) -> Result<Value, ComputeError> {
    match task {
        Task::Value(value) => Ok(value.clone()),
        Task::Alias(target) => results
            .get(target)
            .cloned()
            .ok_or_else(|| ComputeError::MissingKey(target.clone())),
        Task::Call { operation, args } => {
            let args = args
                .iter()
                .map(|arg| resolve(arg, results))
                .collect::<Result<Vec<_>, _>>()?;
            operation.call(&args).map_err(|source| ComputeError::Task {
                key: key.clone(),
                operation: operation.name(),
                source,
            })
        }
    }
}

/// Execute the tasks reachable from `keys` in dependency order.
///
/// Tasks are executed in batches: every task whose dependencies are complete runs in the next batch.
/// Batches run on `pool` if one is given.
fn execute(
    graph: &TaskGraph,
    keys: &[GraphKey],
    pool: Option<&rayon::ThreadPool>,
) -> Result<Vec<Value>, ComputeError> {
    let tasks = reachable(graph, keys)?;
    let mut in_degree: HashMap<&GraphKey, usize> = HashMap::with_capacity(tasks.len());
    let mut dependents: HashMap<&GraphKey, Vec<&GraphKey>> = HashMap::new();
    for (&key, task) in &tasks {
        let dependencies = task.dependencies();
        in_degree.insert(key, dependencies.len());
        for dependency in dependencies {
            let (dependency, _) = lookup(graph, dependency)?;
            dependents.entry(dependency).or_default().push(key);
        }
    }

    let mut ready: Vec<&GraphKey> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&key, _)| key)
        .collect();
    log::debug!(
        "executing {} tasks for {} keys ({})",
        tasks.len(),
        keys.len(),
        if pool.is_some() { "threaded" } else { "synchronous" }
    );

    let mut results: HashMap<&GraphKey, Value> = HashMap::with_capacity(tasks.len());
    let mut completed = 0;
    while !ready.is_empty() {
        let batch = std::mem::take(&mut ready);
        let run_task = |&key: &_| run(key, tasks[key], &results).map(move |value| (key, value));
        let values = match pool {
            Some(pool) if batch.len() > 1 => {
                pool.install(|| batch.par_iter().map(run_task).collect::<Result<Vec<_>, _>>())?
            }
            _ => batch.iter().map(run_task).collect::<Result<Vec<_>, _>>()?,
        };
        completed += values.len();
        for (key, value) in values {
            results.insert(key, value);
            for dependent in dependents.get(key).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(*dependent);
                    }
                }
            }
        }
    }
    if completed < tasks.len() {
        log::error!("{} tasks could not be scheduled", tasks.len() - completed);
        return Err(ComputeError::Cycle(tasks.len() - completed));
    }

    keys.iter()
        .map(|key| {
            results
                .get(key)
                .cloned()
                .ok_or_else(|| ComputeError::MissingKey(key.clone()))
        })
        .collect()
}
