//! Deterministic content tokens.
//!
//! Array and task names are derived from a [`Tokenizer`] digest of everything that determines their content.
//! Equal inputs produce equal names, so independently built graphs that describe the same computation
//! share keys and merge without duplication.
//!
//! The digest is the first 128 bits of a SHA-256 hash, rendered as 32 lowercase hex characters.

use sha2::{Digest, Sha256};

use crate::{
    block::{Block, DataType, Scalar, Selection, SliceSpec},
    chunks::ChunkSpec,
};

/// An incremental content hasher.
#[derive(Clone, Default)]
pub struct Tokenizer {
    hasher: Sha256,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer").finish_non_exhaustive()
    }
}

impl Tokenizer {
    /// Create a new tokenizer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a value.
    pub fn update<T: Tokenize + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.tokenize(self);
        self
    }

    /// Hash a tagged byte string.
    ///
    /// The tag and length are hashed before the bytes so that adjacent values cannot alias.
    pub fn write_bytes(&mut self, tag: u8, bytes: &[u8]) -> &mut Self {
        self.hasher.update([tag]);
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    /// Finish hashing and return the token.
    #[must_use]
    pub fn finish(self) -> String {
        let digest = self.hasher.finalize();
        digest[..16]
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }
}

/// A value that can be hashed into a [`Tokenizer`].
pub trait Tokenize {
    /// Hash the value.
    fn tokenize(&self, tokenizer: &mut Tokenizer);
}

/// Return the token of a sequence of values.
#[must_use]
pub fn tokenize(parts: &[&dyn Tokenize]) -> String {
    let mut tokenizer = Tokenizer::new();
    for part in parts {
        part.tokenize(&mut tokenizer);
    }
    tokenizer.finish()
}

/// Return a name of the form `prefix-<token>`.
#[must_use]
pub fn name_for(prefix: &str, parts: &[&dyn Tokenize]) -> String {
    format!("{prefix}-{}", tokenize(parts))
}

impl<T: Tokenize + ?Sized> Tokenize for &T {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        (**self).tokenize(tokenizer);
    }
}

impl Tokenize for str {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.write_bytes(b's', self.as_bytes());
    }
}

impl Tokenize for String {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        self.as_str().tokenize(tokenizer);
    }
}

macro_rules! impl_tokenize_primitive {
    ($t:ty, $tag:literal) => {
        impl Tokenize for $t {
            fn tokenize(&self, tokenizer: &mut Tokenizer) {
                tokenizer.write_bytes($tag, &self.to_le_bytes());
            }
        }
    };
}

impl_tokenize_primitive!(u64, b'u');
impl_tokenize_primitive!(i64, b'i');
impl_tokenize_primitive!(isize, b'z');
impl_tokenize_primitive!(f64, b'f');

impl Tokenize for usize {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        (*self as u64).tokenize(tokenizer);
    }
}

impl Tokenize for bool {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.write_bytes(b'b', &[u8::from(*self)]);
    }
}

impl Tokenize for char {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.write_bytes(b'c', &u32::from(*self).to_le_bytes());
    }
}

impl<T: Tokenize> Tokenize for [T] {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.write_bytes(b'l', &(self.len() as u64).to_le_bytes());
        for item in self {
            item.tokenize(tokenizer);
        }
    }
}

impl<T: Tokenize> Tokenize for Vec<T> {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        self.as_slice().tokenize(tokenizer);
    }
}

impl<T: Tokenize> Tokenize for Option<T> {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        match self {
            Some(value) => {
                tokenizer.write_bytes(b'o', &[1]);
                value.tokenize(tokenizer);
            }
            None => {
                tokenizer.write_bytes(b'o', &[0]);
            }
        }
    }
}

impl<A: Tokenize, B: Tokenize> Tokenize for (A, B) {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        self.0.tokenize(tokenizer);
        self.1.tokenize(tokenizer);
    }
}

impl Tokenize for DataType {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.write_bytes(b'd', self.to_string().as_bytes());
    }
}

impl Tokenize for Scalar {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        match self {
            Self::Bool(value) => value.tokenize(tokenizer),
            Self::Int(value) => value.tokenize(tokenizer),
            Self::Float(value) => value.tokenize(tokenizer),
        }
    }
}

impl Tokenize for ChunkSpec {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        self.as_slice().tokenize(tokenizer);
    }
}

impl Tokenize for SliceSpec {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        match self {
            Self::Range { start, stop, step } => {
                tokenizer.write_bytes(b'r', &[]);
                start.tokenize(tokenizer);
                stop.tokenize(tokenizer);
                step.tokenize(tokenizer);
            }
            Self::Index(index) => {
                tokenizer.write_bytes(b'x', &[]);
                index.tokenize(tokenizer);
            }
            Self::NewAxis => {
                tokenizer.write_bytes(b'n', &[]);
            }
            Self::Points(points) => {
                tokenizer.write_bytes(b'p', &[]);
                points.tokenize(tokenizer);
            }
        }
    }
}

impl Tokenize for Selection {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        self.specs().tokenize(tokenizer);
    }
}

impl Tokenize for Block {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        self.data_type().tokenize(tokenizer);
        self.shape().tokenize(tokenizer);
        tokenizer.write_bytes(b'a', &self.to_ne_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_deterministic() {
        let a = tokenize(&[&"x", &vec![1usize, 2]]);
        let b = tokenize(&[&"x", &vec![1usize, 2]]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_distinguish_structure() {
        assert_ne!(tokenize(&[&"ab", &"c"]), tokenize(&[&"a", &"bc"]));
        assert_ne!(
            tokenize(&[&vec![vec![1usize], vec![2]]]),
            tokenize(&[&vec![vec![1usize, 2]]])
        );
        assert_ne!(tokenize(&[&Scalar::Int(1)]), tokenize(&[&Scalar::Float(1.0)]));
        assert_ne!(tokenize(&[&1i64]), tokenize(&[&1u64]));
    }

    #[test]
    fn block_tokens_depend_on_content() {
        let a = Block::from_vec(&[2], vec![1i64, 2]).unwrap();
        let b = Block::from_vec(&[2], vec![1i64, 3]).unwrap();
        let c = Block::from_vec(&[2, 1], vec![1i64, 2]).unwrap();
        assert_ne!(tokenize(&[&a]), tokenize(&[&b]));
        assert_ne!(tokenize(&[&a]), tokenize(&[&c]));
        assert_eq!(tokenize(&[&a]), tokenize(&[&a.clone()]));
    }

    #[test]
    fn names() {
        let name = name_for("add", &[&"x"]);
        assert!(name.starts_with("add-"));
        assert_eq!(name.len(), "add-".len() + 32);
    }
}
