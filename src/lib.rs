//! Deferred task graphs over chunked N-dimensional arrays.
//!
//! `chunkgraph` describes computations on N-dimensional arrays that are split into rectangular blocks.
//! Every operation on an [`Array`](crate::array::Array) adds tasks to a graph, one per output block, without
//! computing anything. The graph is executed block by block when the result is requested with
//! [`Array::compute`](crate::array::Array::compute), on the calling thread or on a thread pool.
//!
//! The hard part is the bookkeeping of block coordinates: aligning operands that are chunked differently, routing
//! pointwise indices to the blocks that hold them, and splitting or merging blocks for reshapes, stacks and
//! concatenations. The numeric work on each block is done by [`ndarray`].
//!
//! ## Getting Started
//! - [`array::Array`] is the chunked array. Create one with [`Array::from_block`](crate::array::Array::from_block),
//!   [`Array::from_array`](crate::array::Array::from_array) or the creation functions in [`array`].
//! - [`chunks`] describes how an array is divided into blocks.
//! - [`graph`] holds the task graph, the [`BlockOperation`](crate::graph::BlockOperation) trait for custom block
//!   functions and the schedulers.
//! - [`top`] is the index-expression builder behind element-wise operations, reductions and tensor products.
//!
//! ## Example
//! ```rust
//! # use chunkgraph::{array::Array, block::Block, config::ComputeConfig};
//! let x = Array::from_block(Block::from_vec(&[10, 10], (0..100i64).collect())?, [4, 3])?;
//! assert_eq!(x.chunks().as_slice(), &[vec![4, 4, 2], vec![3, 3, 3, 1]]);
//!
//! let y = (&(&x + &x.T()?)? * 2i64)?;
//! let total = y.sum(None)?.compute(&ComputeConfig::default())?;
//! assert_eq!(total, Block::from_vec(&[], vec![19800i64])?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Logging
//! The crate logs with the [`log`] facade. Schedulers report graph sizes at `debug` level, and reshapes that need to
//! merge blocks emit a `warn` message.
//!
//! ## Licence
//! `chunkgraph` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod array;
pub mod block;
pub mod chunks;
pub mod config;
pub mod getem;
pub mod graph;
pub mod operations;
pub mod source;
pub mod tokenize;
pub mod top;
