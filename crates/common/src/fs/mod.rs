//! Directories, files and volumes over the wrds tree
//!
//! Every node in the object graph is an [`Object`] posted as an encrypted blob.
//! A [`Dir`] embeds a tree mapping names to refs of child objects; a [`File`]
//! embeds a tree mapping chunk end offsets to refs of chunk data. A
//! [`Volume`] anchors the root directory in a cell and commits new roots
//! with CAS.
//!
//! Writes go bottom-up: post the changed leaf, fold its ref into the parent,
//! post the parent, and so on until a new root is CAS'd into the cell. A crash
//! part way leaves only unreferenced blobs behind.

mod dir;
mod file;
mod volume;

use serde::{Deserialize, Serialize};

use crate::cell::{CellError, CellSpec};
use crate::codec::{BlockEncoded, CodecError};
use crate::context::{Cancelled, Context};
use crate::refs::{Ref, RefError, RefStore};
use crate::tree::TreeError;

pub use dir::Dir;
pub use file::{File, DEFAULT_CHUNK_SIZE};
pub use volume::{Commit, Volume};

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("fs error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("tree error: {0}")]
    Tree(TreeError),
    #[error("ref error: {0}")]
    Ref(RefError),
    #[error("cell error: {0}")]
    Cell(CellError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("not a file: {0}")]
    NotAFile(String),
    #[error("invalid name: {0:?}")]
    InvalidName(String),
    #[error("corrupt file index: {0}")]
    CorruptIndex(String),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl From<TreeError> for FsError {
    fn from(e: TreeError) -> Self {
        match e {
            TreeError::Cancelled(c) => FsError::Cancelled(c),
            e => FsError::Tree(e),
        }
    }
}

impl From<RefError> for FsError {
    fn from(e: RefError) -> Self {
        match e {
            RefError::Cancelled(c) => FsError::Cancelled(c),
            e => FsError::Ref(e),
        }
    }
}

impl From<CellError> for FsError {
    fn from(e: CellError) -> Self {
        match e {
            CellError::Cancelled(c) => FsError::Cancelled(c),
            e => FsError::Cell(e),
        }
    }
}

/// A node of the object graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Object {
    File(File),
    Dir(Dir),
    /// Another mutable root, mounted by reference
    Cell(CellSpec),
    /// A pinned, read-only commit of some volume
    Snapshot(Commit),
}

impl BlockEncoded for Object {}

impl Object {
    pub fn kind(&self) -> &'static str {
        match self {
            Object::File(_) => "file",
            Object::Dir(_) => "dir",
            Object::Cell(_) => "cell",
            Object::Snapshot(_) => "snapshot",
        }
    }

    pub async fn load(ctx: &Context, refs: &RefStore, r: &Ref) -> Result<Object, FsError> {
        Ok(refs.get_decoded(ctx, r).await?)
    }

    /// Post this object. Embedded trees are split first if the encoded object
    /// would not fit in one blob.
    pub async fn post(&self, ctx: &Context, refs: &RefStore) -> Result<Ref, FsError> {
        let fitted = match self {
            Object::Dir(dir) => Object::Dir(dir.fit(ctx, refs).await?),
            Object::File(file) => Object::File(file.fit(ctx, refs).await?),
            other => other.clone(),
        };
        Ok(refs.post_encoded(ctx, &fitted).await?)
    }

    /// Every ref this object points at directly
    pub async fn refs(&self, ctx: &Context, refs: &RefStore) -> Result<Vec<Ref>, FsError> {
        match self {
            Object::Dir(dir) => Ok(dir
                .list(ctx, refs)
                .await?
                .into_iter()
                .map(|(_, r)| r)
                .collect()),
            Object::File(file) => file.chunk_refs(ctx, refs).await,
            Object::Cell(_) => Ok(Vec::new()),
            Object::Snapshot(commit) => Ok(vec![commit.root.clone()]),
        }
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), FsError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}
