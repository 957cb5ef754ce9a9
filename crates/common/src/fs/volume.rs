use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Dir, FsError, Object};
use crate::cell::retry::DEFAULT_CAS_ATTEMPTS;
use crate::cell::{Cell, CellError};
use crate::codec::BlockEncoded;
use crate::context::Context;
use crate::refs::{Ref, RefStore};

/// The record a volume's cell holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Ref of the root `Object::Dir`
    pub root: Ref,
    /// Root of the commit this one replaced
    pub parent: Option<Ref>,
    pub generation: u64,
}

impl BlockEncoded for Commit {}

/// A mutable directory tree anchored in a cell
#[derive(Debug, Clone)]
pub struct Volume {
    cell: Arc<dyn Cell>,
    refs: RefStore,
    attempts: usize,
}

impl Volume {
    pub fn new(cell: Arc<dyn Cell>, refs: RefStore) -> Self {
        Self {
            cell,
            refs,
            attempts: DEFAULT_CAS_ATTEMPTS,
        }
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    /// The current commit; `None` for a volume never written
    pub async fn head(&self, ctx: &Context) -> Result<Option<Commit>, FsError> {
        let raw = self.cell.get(ctx).await?;
        decode_head(&raw)
    }

    /// The current root directory
    pub async fn root(&self, ctx: &Context) -> Result<Dir, FsError> {
        match self.head(ctx).await? {
            Some(commit) => self.load_root(ctx, &commit).await,
            None => Ok(Dir::new()),
        }
    }

    async fn load_root(&self, ctx: &Context, commit: &Commit) -> Result<Dir, FsError> {
        Object::load(ctx, &self.refs, &commit.root).await?.try_into()
    }

    /// Read the root, let `f` produce a new one, post it and CAS the commit in.
    ///  `f` runs again from the newer root each time the CAS loses.
    pub async fn update<F, Fut>(&self, ctx: &Context, mut f: F) -> Result<Commit, FsError>
    where
        F: FnMut(Dir) -> Fut,
        Fut: Future<Output = Result<Dir, FsError>>,
    {
        for attempt in 1..=self.attempts {
            let raw = self.cell.get(ctx).await?;
            let head = decode_head(&raw)?;
            let root = match &head {
                Some(commit) => self.load_root(ctx, commit).await?,
                None => Dir::new(),
            };

            let next_root = f(root).await?;
            let root_ref = Object::Dir(next_root).post(ctx, &self.refs).await?;
            let commit = Commit {
                root: root_ref,
                parent: head.as_ref().map(|c| c.root.clone()),
                generation: head.as_ref().map(|c| c.generation + 1).unwrap_or(1),
            };

            if self.cell.cas(ctx, &raw, &commit.encode()?).await? {
                tracing::info!(cell = %self.cell.id(), generation = commit.generation, "committed volume root");
                return Ok(commit);
            }
            tracing::debug!(cell = %self.cell.id(), attempt, "volume commit lost a race, retrying");
        }
        Err(CellError::CasExhausted {
            attempts: self.attempts,
        }
        .into())
    }

    /// Put `object` at `path`, creating directories as needed
    pub async fn put(&self, ctx: &Context, path: &str, object: Object) -> Result<Commit, FsError> {
        self.update(ctx, |root| {
            let object = object.clone();
            async move { root.put_path(ctx, &self.refs, path, &object).await }
        })
        .await
    }

    pub async fn get(&self, ctx: &Context, path: &str) -> Result<Object, FsError> {
        self.root(ctx).await?.get_path(ctx, &self.refs, path).await
    }

    /// Remove the entry named `name` from the root directory
    pub async fn remove(&self, ctx: &Context, name: &str) -> Result<Commit, FsError> {
        self.update(ctx, |root| async move { root.remove(ctx, &self.refs, name).await })
            .await
    }

    /// Pin the current commit as a read-only object
    pub async fn snapshot(&self, ctx: &Context) -> Result<Object, FsError> {
        let commit = self
            .head(ctx)
            .await?
            .ok_or_else(|| FsError::NotFound("volume has no commits".to_string()))?;
        Ok(Object::Snapshot(commit))
    }
}

fn decode_head(raw: &[u8]) -> Result<Option<Commit>, FsError> {
    if raw.is_empty() {
        return Ok(None);
    }
    Ok(Some(Commit::decode(raw)?))
}
