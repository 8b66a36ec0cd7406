//! External array-like data sources.

use std::{
    ops::Range,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::{
    block::{Block, BlockError, DataType, Selection},
    tokenize::{tokenize, Tokenize, Tokenizer},
};

/// A source of array data that can be read in regions.
///
/// Chunked arrays created with [`Array::from_array`](crate::array::Array::from_array) read their
/// blocks from an [`ArrayLike`] source when the graph is executed.
pub trait ArrayLike: std::fmt::Debug + Send + Sync {
    /// Returns the shape of the source.
    fn shape(&self) -> Vec<usize>;

    /// Returns the data type of the source.
    fn data_type(&self) -> DataType;

    /// Read a region of the source.
    ///
    /// # Errors
    /// Returns a [`BlockError`] if the selection is invalid or the read fails.
    fn get(&self, selection: &Selection) -> Result<Block, BlockError>;

    /// Returns a token identifying the content of the source.
    fn token(&self) -> String;
}

impl ArrayLike for Block {
    fn shape(&self) -> Vec<usize> {
        Self::shape(self).to_vec()
    }

    fn data_type(&self) -> DataType {
        Self::data_type(self)
    }

    fn get(&self, selection: &Selection) -> Result<Block, BlockError> {
        self.select(selection)
    }

    fn token(&self) -> String {
        tokenize(&[self])
    }
}

/// An [`ArrayLike`] that can also be written in regions.
///
/// Targets of [`store`](crate::array::store) implement this trait.
pub trait ArrayStore: ArrayLike {
    /// Write `block` to the hyperrectangle `region`.
    ///
    /// # Errors
    /// Returns a [`BlockError`] if the region is invalid or the write fails.
    fn write(&self, region: &[Range<usize>], block: &Block) -> Result<(), BlockError>;
}

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(0);

/// An in-memory [`ArrayStore`].
///
/// Writes from concurrently executing tasks are serialised by an internal [`RwLock`].
#[derive(Debug)]
pub struct MemoryStore {
    id: u64,
    block: RwLock<Block>,
}

impl MemoryStore {
    /// Create a store of `data_type` and `shape` filled with zeros.
    #[must_use]
    pub fn new(data_type: DataType, shape: &[usize]) -> Self {
        Self::from_block(Block::zeros(data_type, shape))
    }

    /// Create a store holding `block`.
    #[must_use]
    pub fn from_block(block: Block) -> Self {
        Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            block: RwLock::new(block),
        }
    }

    /// Returns a copy of the stored data.
    #[must_use]
    pub fn to_block(&self) -> Block {
        self.block.read().clone()
    }
}

impl ArrayLike for MemoryStore {
    fn shape(&self) -> Vec<usize> {
        self.block.read().shape().to_vec()
    }

    fn data_type(&self) -> DataType {
        self.block.read().data_type()
    }

    fn get(&self, selection: &Selection) -> Result<Block, BlockError> {
        self.block.read().select(selection)
    }

    fn token(&self) -> String {
        tokenize(&[&"memory-store", &self.id])
    }
}

impl ArrayStore for MemoryStore {
    fn write(&self, region: &[Range<usize>], block: &Block) -> Result<(), BlockError> {
        self.block.write().assign(region, block)
    }
}

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(0);

/// A lock serialising reads from a source that is not safe for concurrent access.
///
/// Clones share the same underlying lock.
#[derive(Debug, Clone)]
pub struct SourceLock {
    id: u64,
    mutex: Arc<Mutex<()>>,
}

impl Default for SourceLock {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceLock {
    /// Create a new lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed),
            mutex: Arc::new(Mutex::new(())),
        }
    }

    /// Acquire the lock, blocking until it is available.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock()
    }

    /// Returns true if `self` and `other` are the same lock.
    #[must_use]
    pub fn same_lock(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.mutex, &other.mutex)
    }
}

impl PartialEq for SourceLock {
    fn eq(&self, other: &Self) -> bool {
        self.same_lock(other)
    }
}

impl Tokenize for SourceLock {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.write_bytes(b'k', &self.id.to_le_bytes());
    }
}
