//! Compute configuration.
//!
//! There is no global or ambient scheduler. A [`ComputeConfig`] is passed explicitly to every
//! method that executes a task graph (e.g. [`Array::compute`](crate::array::Array::compute)).

use crate::graph::{ComputeError, Scheduler, SynchronousScheduler, ThreadedScheduler};

/// The scheduler used to execute a task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerKind {
    /// Execute tasks one at a time on the calling thread.
    Synchronous,
    /// Execute independent tasks concurrently on a [`rayon`] thread pool.
    #[default]
    Threaded,
}

/// Configuration options for executing a task graph.
///
/// ## Scheduler
///  > default: [`SchedulerKind::Threaded`]
///
/// The scheduler that executes tasks.
///
/// ## Concurrent Limit
/// > default: [`std::thread::available_parallelism`]`()`
///
/// The number of threads used by the threaded scheduler.
/// The limit is ignored by the synchronous scheduler.
/// If set to zero, the [`rayon`] default is used.
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    scheduler: SchedulerKind,
    concurrent_limit: usize,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::default(),
            concurrent_limit: std::thread::available_parallelism()
                .map_or(1, std::num::NonZeroUsize::get),
        }
    }
}

impl ComputeConfig {
    /// Create a configuration that executes tasks synchronously on the calling thread.
    #[must_use]
    pub fn synchronous() -> Self {
        Self {
            scheduler: SchedulerKind::Synchronous,
            ..Self::default()
        }
    }

    /// Get the [scheduler](#scheduler) configuration.
    #[must_use]
    pub fn scheduler_kind(&self) -> SchedulerKind {
        self.scheduler
    }

    /// Set the [scheduler](#scheduler) configuration.
    pub fn set_scheduler_kind(&mut self, scheduler: SchedulerKind) -> &mut Self {
        self.scheduler = scheduler;
        self
    }

    /// Get the [concurrent limit](#concurrent-limit) configuration.
    #[must_use]
    pub fn concurrent_limit(&self) -> usize {
        self.concurrent_limit
    }

    /// Set the [concurrent limit](#concurrent-limit) configuration.
    pub fn set_concurrent_limit(&mut self, concurrent_limit: usize) -> &mut Self {
        self.concurrent_limit = concurrent_limit;
        self
    }

    /// Create the scheduler described by this configuration.
    ///
    /// A threaded scheduler owns its thread pool, keep the scheduler to reuse the pool across computations.
    ///
    /// # Errors
    /// Returns [`ComputeError::ThreadPool`] if the thread pool of a threaded scheduler cannot be created.
    pub fn create_scheduler(&self) -> Result<Box<dyn Scheduler>, ComputeError> {
        Ok(match self.scheduler {
            SchedulerKind::Synchronous => Box::new(SynchronousScheduler),
            SchedulerKind::Threaded => Box::new(ThreadedScheduler::new(self.concurrent_limit)?),
        })
    }
}

/// A builder for [`ComputeConfig`].
#[derive(Debug, Clone, Default)]
pub struct ComputeConfigBuilder {
    config: ComputeConfig,
}

impl ComputeConfigBuilder {
    /// Create a new builder with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scheduler.
    #[must_use]
    pub fn scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.config.scheduler = scheduler;
        self
    }

    /// Set the concurrent limit.
    #[must_use]
    pub fn concurrent_limit(mut self, concurrent_limit: usize) -> Self {
        self.config.concurrent_limit = concurrent_limit;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> ComputeConfig {
        self.config
    }
}
