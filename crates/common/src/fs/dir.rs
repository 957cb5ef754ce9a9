use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use super::{validate_name, FsError, Object};
use crate::codec::BlockEncoded;
use crate::context::Context;
use crate::refs::{Ref, RefStore};
use crate::tree::{Tree, TreeCursor};

/// A directory: names to refs of child objects, kept in an embedded tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dir {
    tree: Tree,
}

impl Dir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub async fn entry(&self, ctx: &Context, refs: &RefStore, name: &str) -> Result<Option<Ref>, FsError> {
        let entry = self.tree.get(ctx, refs, name.as_bytes()).await?;
        Ok(entry.map(|e| e.r#ref))
    }

    pub async fn get(&self, ctx: &Context, refs: &RefStore, name: &str) -> Result<Option<Object>, FsError> {
        match self.entry(ctx, refs, name).await? {
            Some(r) => Ok(Some(Object::load(ctx, refs, &r).await?)),
            None => Ok(None),
        }
    }

    /// Post `object` and link it under `name`, replacing any previous entry
    pub async fn put(
        &self,
        ctx: &Context,
        refs: &RefStore,
        name: &str,
        object: &Object,
    ) -> Result<Dir, FsError> {
        validate_name(name)?;
        let r = object.post(ctx, refs).await?;
        self.link(ctx, refs, name, r).await
    }

    /// Link an already posted object under `name`
    pub async fn link(&self, ctx: &Context, refs: &RefStore, name: &str, r: Ref) -> Result<Dir, FsError> {
        validate_name(name)?;
        let tree = self.tree.put(ctx, refs, name.as_bytes(), r).await?;
        tracing::debug!(name, level = tree.level(), "linked dir entry");
        Ok(Dir { tree })
    }

    pub async fn remove(&self, ctx: &Context, refs: &RefStore, name: &str) -> Result<Dir, FsError> {
        match self.tree.delete(ctx, refs, name.as_bytes()).await? {
            Some(tree) => Ok(Dir { tree }),
            None => Err(FsError::NotFound(name.to_string())),
        }
    }

    /// Entries in name order
    pub async fn list(&self, ctx: &Context, refs: &RefStore) -> Result<Vec<(String, Ref)>, FsError> {
        let mut cursor = self.cursor();
        let mut out = Vec::new();
        while let Some(entry) = cursor.next(ctx, refs).await? {
            let name = String::from_utf8(entry.key)
                .map_err(|e| anyhow::anyhow!("non-utf8 directory entry: {}", e))?;
            out.push((name, entry.r#ref));
        }
        Ok(out)
    }

    /// A lazy walk over the raw entries, for large directories
    pub fn cursor(&self) -> TreeCursor {
        self.tree.iter()
    }

    /// Resolve a slash-separated path below this directory
    pub async fn get_path(&self, ctx: &Context, refs: &RefStore, path: &str) -> Result<Object, FsError> {
        let mut current = Object::Dir(self.clone());
        let mut walked = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let Object::Dir(dir) = &current else {
                return Err(FsError::NotADirectory(walked));
            };
            walked = if walked.is_empty() {
                part.to_string()
            } else {
                format!("{}/{}", walked, part)
            };
            current = dir
                .get(ctx, refs, part)
                .await?
                .ok_or_else(|| FsError::NotFound(walked.clone()))?;
        }
        Ok(current)
    }

    /// Put `object` at `path`, creating missing directories on the way
    pub async fn put_path(
        &self,
        ctx: &Context,
        refs: &RefStore,
        path: &str,
        object: &Object,
    ) -> Result<Dir, FsError> {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            return Err(FsError::InvalidName(path.to_string()));
        }
        self.put_parts(ctx, refs, &parts, object).await
    }

    fn put_parts<'a>(
        &'a self,
        ctx: &'a Context,
        refs: &'a RefStore,
        parts: &'a [&'a str],
        object: &'a Object,
    ) -> BoxFuture<'a, Result<Dir, FsError>> {
        async move {
            let (name, rest) = match parts {
                [name] => return self.put(ctx, refs, name, object).await,
                [name, rest @ ..] => (*name, rest),
                [] => return Ok(self.clone()),
            };
            let child = match self.get(ctx, refs, name).await? {
                Some(Object::Dir(dir)) => dir,
                Some(_) => return Err(FsError::NotADirectory(name.to_string())),
                None => Dir::new(),
            };
            let child = child.put_parts(ctx, refs, rest, object).await?;
            self.put(ctx, refs, name, &Object::Dir(child)).await
        }
        .boxed()
    }

    /// Split the embedded tree until the encoded directory fits in one blob
    pub(crate) async fn fit(&self, ctx: &Context, refs: &RefStore) -> Result<Dir, FsError> {
        let max = refs.max_plaintext_size();
        let mut dir = self.clone();
        while Object::Dir(dir.clone()).encoded_len()? > max {
            let tree = dir.tree.split(ctx, refs, true).await?;
            tracing::debug!(level = tree.level(), "split oversized directory");
            dir = Dir { tree };
        }
        Ok(dir)
    }
}

impl From<Tree> for Dir {
    fn from(tree: Tree) -> Self {
        Self { tree }
    }
}

impl TryFrom<Object> for Dir {
    type Error = FsError;

    fn try_from(object: Object) -> Result<Self, Self::Error> {
        match object {
            Object::Dir(dir) => Ok(dir),
            other => Err(FsError::NotADirectory(other.kind().to_string())),
        }
    }
}
