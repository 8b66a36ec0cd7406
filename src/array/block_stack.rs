//! Persistence of an array as a directory of raw blocks.
//!
//! A block stack is a directory holding one file `<i>.bin` per block along one axis, with the elements of the block in
//! C order as little-endian bytes, and an `info.json` file describing the array:
//! ```json
//! {"chunks": [[2, 2, 1], [4]], "data_type": "Int64", "axis": 0}
//! ```

use std::{path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use super::{normalize_axis, Array, ArrayError};
use crate::{
    block::DataType,
    chunks::{ChunkDimension, ChunkSpec},
    config::ComputeConfig,
    graph::{GraphKey, Operation, Task, TaskArg, TaskGraph, Tasks},
    operations::{LoadBlock, SaveBlock},
    tokenize::name_for,
};

const INFO_FILE: &str = "info.json";

/// The contents of `info.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BlockStackInfo {
    chunks: Vec<Vec<usize>>,
    data_type: DataType,
    axis: usize,
}

fn block_file(axis_index: usize) -> String {
    format!("{axis_index}.bin")
}

/// Write `array` to the directory `dir` as a block stack along `axis`.
///
/// The array is first rechunked to a single block along every other axis. The directory is created if it does not
/// exist. Each block is written by its own task.
///
/// # Errors
/// Returns an [`ArrayError`] if `axis` is out of range, writing a file fails, or a task fails.
pub fn to_block_stack(
    dir: impl AsRef<Path>,
    array: &Array,
    axis: isize,
    config: &ComputeConfig,
) -> Result<(), ArrayError> {
    let dir = dir.as_ref();
    let axis = normalize_axis(axis, array.ndim())?;
    let dimensions: Vec<ChunkDimension> = array
        .chunks()
        .iter()
        .enumerate()
        .map(|(index, chunks)| {
            if index == axis {
                ChunkDimension::Varying(chunks.clone())
            } else {
                ChunkDimension::Full
            }
        })
        .collect();
    let array = array.rechunk(dimensions)?;
    std::fs::create_dir_all(dir)?;

    let name = name_for(
        "to-block-stack",
        &[&dir.to_string_lossy().to_string(), &array.name()],
    );
    let tasks: Tasks = array
        .chunks()
        .block_indices()
        .map(|coordinates| {
            let operation: Operation = Arc::new(SaveBlock {
                path: dir.join(block_file(coordinates[axis])),
            });
            let task = Task::call(&operation, vec![TaskArg::Key(array.key(coordinates.clone()))]);
            (GraphKey::new(name.clone(), coordinates), task)
        })
        .collect();
    let keys: Vec<GraphKey> = tasks.keys().cloned().collect();
    log::debug!("writing {} blocks to {}", keys.len(), dir.display());
    let graph = array.graph().clone().with_layer(name, tasks);
    config.create_scheduler()?.get(&graph, &keys)?;

    let info = BlockStackInfo {
        chunks: array.chunks().as_slice().to_vec(),
        data_type: array.data_type(),
        axis,
    };
    std::fs::write(dir.join(INFO_FILE), serde_json::to_vec_pretty(&info)?)?;
    Ok(())
}

/// Open the block stack in the directory `dir` as an array reading each block file in its own task.
///
/// # Errors
/// Returns an [`ArrayError`] if `info.json` cannot be read or is invalid.
pub fn from_block_stack(dir: impl AsRef<Path>) -> Result<Array, ArrayError> {
    let dir = dir.as_ref();
    let info: BlockStackInfo = serde_json::from_slice(&std::fs::read(dir.join(INFO_FILE))?)?;
    let chunks = ChunkSpec::new(info.chunks)?;
    if info.axis >= chunks.ndim() {
        return Err(ArrayError::AxisOutOfRange {
            axis: isize::try_from(info.axis).unwrap_or(isize::MAX),
            ndim: chunks.ndim(),
        });
    }
    let name = name_for(
        "from-block-stack",
        &[&dir.to_string_lossy().to_string(), &chunks, &info.data_type],
    );
    let tasks: Tasks = chunks
        .block_indices()
        .map(|coordinates| {
            let operation: Operation = Arc::new(LoadBlock {
                path: dir.join(block_file(coordinates[info.axis])),
                data_type: info.data_type,
                shape: chunks.block_shape(&coordinates).unwrap_or_default(),
                little_endian: true,
            });
            (GraphKey::new(name.clone(), coordinates), Task::call(&operation, vec![]))
        })
        .collect();
    Ok(Array::from_parts(
        TaskGraph::from_layer(name.clone(), tasks),
        name,
        chunks,
        info.data_type,
    ))
}
