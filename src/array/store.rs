use std::sync::Arc;

use super::{Array, ArrayError};
use crate::{
    config::ComputeConfig,
    graph::{GraphKey, Operation, Task, TaskArg, TaskGraph, Tasks},
    operations::StoreBlock,
    source::ArrayStore,
    tokenize::{name_for, tokenize},
};

/// Compute `sources` and write each into the matching store of `targets`.
///
/// Every block is written by its own task into the region of the target it covers. The blocks of all sources are
/// computed in a single graph, so shared dependencies are computed once.
///
/// # Errors
/// Returns an [`ArrayError`] if
///  - the number of sources and targets differ,
///  - the shape of a source differs from the shape of its target, or
///  - a task fails.
pub fn store(
    sources: &[&Array],
    targets: &[Arc<dyn ArrayStore>],
    config: &ComputeConfig,
) -> Result<(), ArrayError> {
    if sources.len() != targets.len() {
        return Err(ArrayError::InvalidArgument(format!(
            "different number of sources ({}) and targets ({})",
            sources.len(),
            targets.len()
        )));
    }
    for (source, target) in sources.iter().zip(targets) {
        if source.shape() != target.shape() {
            return Err(ArrayError::IncompatibleShapes(vec![
                source.shape(),
                target.shape(),
            ]));
        }
    }

    let tokens: Vec<String> = targets.iter().map(|target| target.token()).collect();
    let names: Vec<&str> = sources.iter().map(|source| source.name()).collect();
    let name = name_for("store", &[&names, &tokens]);
    let mut tasks = Tasks::new();
    for (index, (source, target)) in sources.iter().zip(targets).enumerate() {
        for coordinates in source.chunks().block_indices() {
            let region = source
                .chunks()
                .block_ranges(&coordinates)
                .unwrap_or_default();
            let operation: Operation = Arc::new(StoreBlock {
                target: Arc::clone(target),
                region,
            });
            let mut key_index = vec![index];
            key_index.extend_from_slice(&coordinates);
            tasks.insert(
                GraphKey::new(name.clone(), key_index),
                Task::call(&operation, vec![TaskArg::Key(source.key(coordinates))]),
            );
        }
    }
    let keys: Vec<GraphKey> = tasks.keys().cloned().collect();
    log::debug!("storing {} blocks of {} arrays", keys.len(), sources.len());
    let graph = TaskGraph::merge(sources.iter().map(|source| source.graph()))
        .with_layer(name, tasks);
    config.create_scheduler()?.get(&graph, &keys)?;
    Ok(())
}

impl Array {
    /// Compute every block and return an array whose graph holds the computed blocks.
    ///
    /// The returned array has the same chunks and one task per block, with no dependencies.
    ///
    /// # Errors
    /// Returns [`ArrayError::Compute`] if a task fails.
    pub fn cache(&self, config: &ComputeConfig) -> Result<Self, ArrayError> {
        let name = format!("cache-{}", tokenize(&[&self.name]));
        let tasks: Tasks = self
            .compute_blocks(config)?
            .into_iter()
            .map(|(key, value)| (GraphKey::new(name.clone(), key.index().to_vec()), Task::Value(value)))
            .collect();
        Ok(Self::derive(
            name,
            tasks,
            &[],
            self.chunks.clone(),
            self.data_type,
        ))
    }

    /// Store the array into `target` and return an array reading from it with the same chunks.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the shape of `target` differs or a task fails.
    pub fn cache_into<S: ArrayStore + 'static>(
        &self,
        target: Arc<S>,
        config: &ComputeConfig,
    ) -> Result<Self, ArrayError> {
        let store_target: Arc<dyn ArrayStore> = target.clone();
        store(&[self], &[store_target], config)?;
        Self::from_array(target, &self.chunks, None)
    }
}
