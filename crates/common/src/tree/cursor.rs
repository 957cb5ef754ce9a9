use super::{Tree, TreeEntry, TreeError};
use crate::context::Context;
use crate::refs::RefStore;

/// Lazy in-order walk over a tree snapshot.
///  Every step is a fresh `min_gt` descent from the root using the last key
///  returned, so a step costs O(depth). The root is pinned at creation, so the
///  walk stays consistent no matter what happens to newer roots.
#[derive(Debug, Clone)]
pub struct TreeCursor {
    root: Tree,
    last: Option<Vec<u8>>,
    done: bool,
}

impl TreeCursor {
    pub(crate) fn new(root: Tree, after: Option<Vec<u8>>) -> Self {
        Self {
            root,
            last: after,
            done: false,
        }
    }

    pub async fn next(
        &mut self,
        ctx: &Context,
        refs: &RefStore,
    ) -> Result<Option<TreeEntry>, TreeError> {
        if self.done {
            return Ok(None);
        }
        let next = match &self.last {
            None => self.root.first(ctx, refs).await?,
            Some(key) => self.root.min_gt(ctx, refs, key).await?,
        };
        match &next {
            Some(entry) => self.last = Some(entry.key.clone()),
            None => self.done = true,
        }
        Ok(next)
    }

    /// Drain the cursor
    pub async fn collect(
        mut self,
        ctx: &Context,
        refs: &RefStore,
    ) -> Result<Vec<TreeEntry>, TreeError> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next(ctx, refs).await? {
            entries.push(entry);
        }
        Ok(entries)
    }
}
