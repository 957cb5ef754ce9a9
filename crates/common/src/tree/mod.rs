//! The wrds tree: an ordered, persistent, blob-backed B-tree
//!
//! A [`Tree`] maps byte-string keys to [`Ref`]s. Level 1 nodes hold leaf
//! entries pointing at user data; a node at level `n > 1` holds one entry per
//! child, keyed by that child's minimum key, whose ref points at the encoded
//! child node of level `n - 1`.
//!
//! Nodes are immutable once posted. Every mutation returns a new root and
//! shares untouched subtrees with the old one through their refs, so an old
//! root stays a consistent snapshot forever.
//!
//! Each node must encode to no more than the ref store's plaintext ceiling.
//! An oversized node is split by entry count into halves, and splits cascade
//! toward the root. Siblings are never merged on delete.

mod cursor;
mod node;

use crate::codec::CodecError;
use crate::context::Cancelled;
use crate::refs::RefError;

pub use cursor::TreeCursor;
pub use node::{Tree, TreeEntry};

/// Nodes with fewer entries than this are never split
pub const MIN_SPLIT_ENTRIES: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("tree error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("ref error: {0}")]
    Ref(RefError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("invalid tree level {0}")]
    InvalidLevel(u32),
    #[error("internal node at level {0} has no entries")]
    EmptyInternal(u32),
    #[error("entries at level {0} are not strictly ascending")]
    Unordered(u32),
    #[error("child at level {child} under a node at level {parent}")]
    LevelMismatch { parent: u32, child: u32 },
    #[error("node with {entries} entries encodes to {size} bytes, over the {max} byte ceiling")]
    Unsplittable {
        entries: usize,
        size: usize,
        max: usize,
    },
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl From<RefError> for TreeError {
    fn from(e: RefError) -> Self {
        match e {
            RefError::Cancelled(c) => TreeError::Cancelled(c),
            RefError::Codec(c) => TreeError::Codec(c),
            e => TreeError::Ref(e),
        }
    }
}
