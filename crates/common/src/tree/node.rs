use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use super::{TreeCursor, TreeError, MIN_SPLIT_ENTRIES};
use crate::codec::BlockEncoded;
use crate::context::Context;
use crate::refs::{Ref, RefStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub key: Vec<u8>,
    pub r#ref: Ref,
}

impl TreeEntry {
    pub fn new(key: impl Into<Vec<u8>>, r#ref: Ref) -> Self {
        Self {
            key: key.into(),
            r#ref,
        }
    }
}

/// One node of a wrds tree. Also the handle for the whole tree when it is the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    level: u32,
    entries: Vec<TreeEntry>,
}

impl BlockEncoded for Tree {}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// An empty leaf
    pub fn new() -> Self {
        Self {
            level: 1,
            entries: Vec::new(),
        }
    }

    pub fn from_entries(level: u32, entries: Vec<TreeEntry>) -> Result<Self, TreeError> {
        let tree = Self { level, entries };
        tree.validate()?;
        Ok(tree)
    }

    fn validate(&self) -> Result<(), TreeError> {
        if self.level == 0 {
            return Err(TreeError::InvalidLevel(0));
        }
        if self.level > 1 && self.entries.is_empty() {
            return Err(TreeError::EmptyInternal(self.level));
        }
        if !self.entries.windows(2).all(|w| w[0].key < w[1].key) {
            return Err(TreeError::Unordered(self.level));
        }
        Ok(())
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Entries of this node only; for a level above 1 these point at children
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn min_key(&self) -> Option<&[u8]> {
        self.entries.first().map(|e| e.key.as_slice())
    }

    /// Fetch and validate a posted node
    pub async fn load(ctx: &Context, refs: &RefStore, r: &Ref) -> Result<Tree, TreeError> {
        let tree: Tree = refs.get_decoded(ctx, r).await?;
        tree.validate()?;
        Ok(tree)
    }

    pub async fn post(&self, ctx: &Context, refs: &RefStore) -> Result<Ref, TreeError> {
        Ok(refs.post_encoded(ctx, self).await?)
    }

    async fn load_child(&self, ctx: &Context, refs: &RefStore, idx: usize) -> Result<Tree, TreeError> {
        let child = Self::load(ctx, refs, &self.entries[idx].r#ref).await?;
        if child.level + 1 != self.level {
            return Err(TreeError::LevelMismatch {
                parent: self.level,
                child: child.level,
            });
        }
        Ok(child)
    }

    /// Index of the rightmost entry whose key is <= `key`
    fn child_index(&self, key: &[u8]) -> Option<usize> {
        self.entries
            .partition_point(|e| e.key.as_slice() <= key)
            .checked_sub(1)
    }

    /// Exact lookup. A missing key is `Ok(None)`.
    pub async fn get(
        &self,
        ctx: &Context,
        refs: &RefStore,
        key: &[u8],
    ) -> Result<Option<TreeEntry>, TreeError> {
        self.get_inner(ctx, refs, key).await
    }

    fn get_inner<'a>(
        &'a self,
        ctx: &'a Context,
        refs: &'a RefStore,
        key: &'a [u8],
    ) -> BoxFuture<'a, Result<Option<TreeEntry>, TreeError>> {
        async move {
            ctx.check()?;
            if self.level == 1 {
                return Ok(self
                    .entries
                    .binary_search_by(|e| e.key.as_slice().cmp(key))
                    .ok()
                    .map(|i| self.entries[i].clone()));
            }
            let Some(idx) = self.child_index(key) else {
                return Ok(None);
            };
            let child = self.load_child(ctx, refs, idx).await?;
            child.get_inner(ctx, refs, key).await
        }
        .boxed()
    }

    /// Smallest entry in the tree
    pub async fn first(&self, ctx: &Context, refs: &RefStore) -> Result<Option<TreeEntry>, TreeError> {
        self.min_after(ctx, refs, None).await
    }

    /// Smallest entry whose key is strictly greater than `key`
    pub async fn min_gt(
        &self,
        ctx: &Context,
        refs: &RefStore,
        key: &[u8],
    ) -> Result<Option<TreeEntry>, TreeError> {
        self.min_after(ctx, refs, Some(key)).await
    }

    fn min_after<'a>(
        &'a self,
        ctx: &'a Context,
        refs: &'a RefStore,
        key: Option<&'a [u8]>,
    ) -> BoxFuture<'a, Result<Option<TreeEntry>, TreeError>> {
        async move {
            ctx.check()?;
            if self.level == 1 {
                let idx = match key {
                    None => 0,
                    Some(k) => self.entries.partition_point(|e| e.key.as_slice() <= k),
                };
                return Ok(self.entries.get(idx).cloned());
            }

            // the subtree that could hold `key` may have nothing past it, in
            // which case the answer is the head of the next sibling
            let start = key.and_then(|k| self.child_index(k)).unwrap_or(0);
            for idx in start..self.entries.len() {
                let child = self.load_child(ctx, refs, idx).await?;
                if let Some(entry) = child.min_after(ctx, refs, key).await? {
                    return Ok(Some(entry));
                }
            }
            Ok(None)
        }
        .boxed()
    }

    /// Insert or replace `key`, returning the new root
    pub async fn put(
        &self,
        ctx: &Context,
        refs: &RefStore,
        key: &[u8],
        r#ref: Ref,
    ) -> Result<Tree, TreeError> {
        let max = refs.max_plaintext_size();
        let pieces = self.put_inner(ctx, refs, key, r#ref, max).await?;
        grow(ctx, refs, pieces, max).await
    }

    fn put_inner<'a>(
        &'a self,
        ctx: &'a Context,
        refs: &'a RefStore,
        key: &'a [u8],
        r#ref: Ref,
        max: usize,
    ) -> BoxFuture<'a, Result<Vec<Tree>, TreeError>> {
        async move {
            ctx.check()?;
            if self.level == 1 {
                let mut node = self.clone();
                match node.entries.binary_search_by(|e| e.key.as_slice().cmp(key)) {
                    Ok(i) => node.entries[i].r#ref = r#ref,
                    Err(i) => node.entries.insert(i, TreeEntry::new(key, r#ref)),
                }
                return node.split_to_fit(max);
            }

            // a key below every separator goes to the first child, whose
            // separator drops to the new key on repost
            let idx = self.child_index(key).unwrap_or(0);
            let child = self.load_child(ctx, refs, idx).await?;
            let pieces = child.put_inner(ctx, refs, key, r#ref, max).await?;
            self.replace_child(ctx, refs, idx, pieces, max).await
        }
        .boxed()
    }

    /// Remove `key`. `Ok(None)` when the key was absent.
    pub async fn delete(
        &self,
        ctx: &Context,
        refs: &RefStore,
        key: &[u8],
    ) -> Result<Option<Tree>, TreeError> {
        let max = refs.max_plaintext_size();
        let Some(pieces) = self.delete_inner(ctx, refs, key, max).await? else {
            return Ok(None);
        };
        if pieces.is_empty() {
            return Ok(Some(Tree::new()));
        }
        let mut root = grow(ctx, refs, pieces, max).await?;
        // shed levels that only wrap a single child
        while root.level > 1 && root.entries.len() == 1 {
            root = root.load_child(ctx, refs, 0).await?;
        }
        Ok(Some(root))
    }

    fn delete_inner<'a>(
        &'a self,
        ctx: &'a Context,
        refs: &'a RefStore,
        key: &'a [u8],
        max: usize,
    ) -> BoxFuture<'a, Result<Option<Vec<Tree>>, TreeError>> {
        async move {
            ctx.check()?;
            if self.level == 1 {
                let Ok(i) = self.entries.binary_search_by(|e| e.key.as_slice().cmp(key)) else {
                    return Ok(None);
                };
                let mut node = self.clone();
                node.entries.remove(i);
                if node.entries.is_empty() {
                    return Ok(Some(Vec::new()));
                }
                return Ok(Some(vec![node]));
            }

            let Some(idx) = self.child_index(key) else {
                return Ok(None);
            };
            let child = self.load_child(ctx, refs, idx).await?;
            let Some(pieces) = child.delete_inner(ctx, refs, key, max).await? else {
                return Ok(None);
            };
            self.replace_child(ctx, refs, idx, pieces, max).await.map(Some)
        }
        .boxed()
    }

    /// Swap the child at `idx` for the posted `pieces` and re-fit this node.
    ///  An empty result means this node lost its last child.
    async fn replace_child(
        &self,
        ctx: &Context,
        refs: &RefStore,
        idx: usize,
        pieces: Vec<Tree>,
        max: usize,
    ) -> Result<Vec<Tree>, TreeError> {
        let replacement = post_pieces(ctx, refs, pieces).await?;
        let mut node = self.clone();
        node.entries.splice(idx..=idx, replacement);
        if node.entries.is_empty() {
            return Ok(Vec::new());
        }
        node.split_to_fit(max)
    }

    /// Split this tree from the outside. With `force` the split happens even if
    /// the root already fits; the result always gains at least one level.
    pub async fn split(&self, ctx: &Context, refs: &RefStore, force: bool) -> Result<Tree, TreeError> {
        let max = refs.max_plaintext_size();
        let size = self.encoded_len()?;
        if !force && size <= max {
            return Ok(self.clone());
        }
        if self.entries.len() < MIN_SPLIT_ENTRIES {
            return Err(TreeError::Unsplittable {
                entries: self.entries.len(),
                size,
                max,
            });
        }
        let (left, right) = self.clone().halve();
        let mut pieces = left.split_to_fit(max)?;
        pieces.extend(right.split_to_fit(max)?);
        grow(ctx, refs, pieces, max).await
    }

    fn halve(mut self) -> (Tree, Tree) {
        let right = self.entries.split_off(self.entries.len() / 2);
        let level = self.level;
        (
            self,
            Tree {
                level,
                entries: right,
            },
        )
    }

    /// Split by entry count until every piece encodes within `max`
    fn split_to_fit(self, max: usize) -> Result<Vec<Tree>, TreeError> {
        let size = self.encoded_len()?;
        if size <= max {
            return Ok(vec![self]);
        }
        if self.entries.len() < MIN_SPLIT_ENTRIES {
            return Err(TreeError::Unsplittable {
                entries: self.entries.len(),
                size,
                max,
            });
        }
        tracing::debug!(level = self.level, entries = self.entries.len(), size, max, "splitting tree node");
        let (left, right) = self.halve();
        let mut pieces = left.split_to_fit(max)?;
        pieces.extend(right.split_to_fit(max)?);
        Ok(pieces)
    }

    /// Cursor over every entry in key order
    pub fn iter(&self) -> TreeCursor {
        TreeCursor::new(self.clone(), None)
    }

    /// Cursor over the entries strictly after `key`
    pub fn iter_from(&self, key: &[u8]) -> TreeCursor {
        TreeCursor::new(self.clone(), Some(key.to_vec()))
    }
}

async fn post_pieces(
    ctx: &Context,
    refs: &RefStore,
    pieces: Vec<Tree>,
) -> Result<Vec<TreeEntry>, TreeError> {
    let mut entries = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let Some(key) = piece.min_key().map(<[u8]>::to_vec) else {
            continue;
        };
        let r = piece.post(ctx, refs).await?;
        entries.push(TreeEntry { key, r#ref: r });
    }
    Ok(entries)
}

/// Stack parent levels over `pieces` until a single root remains
async fn grow(
    ctx: &Context,
    refs: &RefStore,
    mut pieces: Vec<Tree>,
    max: usize,
) -> Result<Tree, TreeError> {
    loop {
        match pieces.len() {
            0 => return Ok(Tree::new()),
            1 => return Ok(pieces.remove(0)),
            _ => {
                let level = pieces[0].level + 1;
                let entries = post_pieces(ctx, refs, pieces).await?;
                pieces = Tree { level, entries }.split_to_fit(max)?;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::refs::RefStoreConfig;
    use crate::store::MemoryStore;

    fn small_refs() -> RefStore {
        RefStore::new(
            Arc::new(MemoryStore::with_max_blob_size(2048)),
            RefStoreConfig::default(),
        )
    }

    fn key(i: u64) -> [u8; 8] {
        i.to_be_bytes()
    }

    fn check_sizes<'a>(
        ctx: &'a Context,
        refs: &'a RefStore,
        node: &'a Tree,
        max: usize,
    ) -> BoxFuture<'a, usize> {
        async move {
            assert!(node.encoded_len().unwrap() <= max);
            if node.level() == 1 {
                return 1;
            }
            let mut count = 1;
            for idx in 0..node.entries().len() {
                let child = node.load_child(ctx, refs, idx).await.unwrap();
                assert_eq!(child.min_key(), Some(node.entries()[idx].key.as_slice()));
                count += check_sizes(ctx, refs, &child, max).await;
            }
            count
        }
        .boxed()
    }

    #[tokio::test]
    async fn test_put_get_replace() {
        let ctx = Context::background();
        let refs = small_refs();
        let a = refs.post(&ctx, b"a").await.unwrap();
        let b = refs.post(&ctx, b"b").await.unwrap();

        let tree = Tree::new();
        let tree = tree.put(&ctx, &refs, b"alpha", a.clone()).await.unwrap();
        let tree = tree.put(&ctx, &refs, b"beta", b.clone()).await.unwrap();
        assert_eq!(tree.get(&ctx, &refs, b"alpha").await.unwrap().unwrap().r#ref, a);
        assert_eq!(tree.get(&ctx, &refs, b"gamma").await.unwrap(), None);

        let replaced = tree.put(&ctx, &refs, b"alpha", b.clone()).await.unwrap();
        assert_eq!(replaced.get(&ctx, &refs, b"alpha").await.unwrap().unwrap().r#ref, b);
        assert_eq!(replaced.entries().len(), 2);
        // the old root still sees the old value
        assert_eq!(tree.get(&ctx, &refs, b"alpha").await.unwrap().unwrap().r#ref, a);
    }

    #[tokio::test]
    async fn test_thousand_sequential_keys() {
        let ctx = Context::background();
        let refs = small_refs();
        let value = refs.post(&ctx, b"shared").await.unwrap();

        let mut tree = Tree::new();
        for i in 0..1000u64 {
            tree = tree.put(&ctx, &refs, &key(i), value.clone()).await.unwrap();
        }
        assert!(tree.level() > 1);

        for i in 0..1000u64 {
            let entry = tree.get(&ctx, &refs, &key(i)).await.unwrap().unwrap();
            assert_eq!(entry.r#ref, value);
        }

        let entries = tree.iter().collect(&ctx, &refs).await.unwrap();
        assert_eq!(entries.len(), 1000);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.key, key(i as u64));
        }
    }

    #[tokio::test]
    async fn test_every_node_fits() {
        let ctx = Context::background();
        let refs = small_refs();
        let max = refs.max_plaintext_size();

        let mut tree = Tree::new();
        // descending inserts exercise the below-first-separator path
        for i in (0..300u64).rev() {
            let v = refs.post(&ctx, &key(i)).await.unwrap();
            tree = tree.put(&ctx, &refs, &key(i * 3), v).await.unwrap();
        }
        let nodes = check_sizes(&ctx, &refs, &tree, max).await;
        assert!(nodes > 1);

        for i in 0..300u64 {
            let entry = tree.get(&ctx, &refs, &key(i * 3)).await.unwrap().unwrap();
            assert_eq!(refs.get(&ctx, &entry.r#ref).await.unwrap(), key(i));
            assert_eq!(tree.get(&ctx, &refs, &key(i * 3 + 1)).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_min_gt() {
        let ctx = Context::background();
        let refs = small_refs();
        let value = refs.post(&ctx, b"v").await.unwrap();

        let mut tree = Tree::new();
        for i in 0..100u64 {
            tree = tree.put(&ctx, &refs, &key(i * 10), value.clone()).await.unwrap();
        }

        let next = tree.min_gt(&ctx, &refs, &key(55)).await.unwrap().unwrap();
        assert_eq!(next.key, key(60));
        let next = tree.min_gt(&ctx, &refs, &key(60)).await.unwrap().unwrap();
        assert_eq!(next.key, key(70));
        assert_eq!(tree.min_gt(&ctx, &refs, &key(990)).await.unwrap(), None);
        assert_eq!(tree.first(&ctx, &refs).await.unwrap().unwrap().key, key(0));

        // every separator boundary
        for i in 0..99u64 {
            let next = tree.min_gt(&ctx, &refs, &key(i * 10 + 9)).await.unwrap().unwrap();
            assert_eq!(next.key, key((i + 1) * 10));
        }

        let rest = tree.iter_from(&key(950)).collect(&ctx, &refs).await.unwrap();
        assert_eq!(rest.len(), 4);
    }

    #[tokio::test]
    async fn test_delete() {
        let ctx = Context::background();
        let refs = small_refs();
        let value = refs.post(&ctx, b"v").await.unwrap();

        let mut tree = Tree::new();
        for i in 0..200u64 {
            tree = tree.put(&ctx, &refs, &key(i), value.clone()).await.unwrap();
        }
        assert!(tree.delete(&ctx, &refs, b"missing").await.unwrap().is_none());

        for i in (0..200u64).filter(|i| i % 2 == 0) {
            tree = tree.delete(&ctx, &refs, &key(i)).await.unwrap().unwrap();
        }
        let left = tree.iter().collect(&ctx, &refs).await.unwrap();
        assert_eq!(left.len(), 100);
        assert!(left.iter().all(|e| e.key[7] % 2 == 1));
        check_sizes(&ctx, &refs, &tree, refs.max_plaintext_size()).await;

        for i in (0..200u64).filter(|i| i % 2 == 1) {
            tree = tree.delete(&ctx, &refs, &key(i)).await.unwrap().unwrap();
        }
        assert_eq!(tree, Tree::new());
    }

    #[tokio::test]
    async fn test_forced_split() {
        let ctx = Context::background();
        let refs = RefStore::new(Arc::new(MemoryStore::new()), RefStoreConfig::default());
        let value = refs.post(&ctx, b"v").await.unwrap();

        let mut tree = Tree::new();
        for i in 0..8u64 {
            tree = tree.put(&ctx, &refs, &key(i), value.clone()).await.unwrap();
        }
        assert_eq!(tree.level(), 1);
        assert_eq!(tree.split(&ctx, &refs, false).await.unwrap(), tree);

        let split = tree.split(&ctx, &refs, true).await.unwrap();
        assert_eq!(split.level(), 2);
        assert_eq!(split.entries().len(), 2);
        for i in 0..8u64 {
            assert!(split.get(&ctx, &refs, &key(i)).await.unwrap().is_some());
        }

        let small = Tree::new().put(&ctx, &refs, b"k", value).await.unwrap();
        assert!(matches!(
            small.split(&ctx, &refs, true).await,
            Err(TreeError::Unsplittable { entries: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_oversized_entry_unsplittable() {
        let ctx = Context::background();
        let refs = small_refs();
        let value = refs.post(&ctx, b"v").await.unwrap();
        let giant = vec![b'x'; 4096];
        assert!(matches!(
            Tree::new().put(&ctx, &refs, &giant, value).await,
            Err(TreeError::Unsplittable { .. })
        ));
    }

    #[test]
    fn test_malformed_levels() {
        assert!(matches!(
            Tree::from_entries(0, Vec::new()),
            Err(TreeError::InvalidLevel(0))
        ));
        assert!(matches!(
            Tree::from_entries(2, Vec::new()),
            Err(TreeError::EmptyInternal(2))
        ));
        assert!(Tree::from_entries(1, Vec::new()).is_ok());
    }
}
