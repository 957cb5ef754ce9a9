//! Integration tests for the wrds tree over an on-disk store

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use ::common::prelude::*;
use tempfile::TempDir;

/// Small deterministic generator so failures reproduce
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

#[tokio::test]
async fn test_random_puts_match_a_btreemap() {
    let ctx = Context::background();
    let temp = TempDir::new().unwrap();
    let store = FsStore::open_with_max_blob_size(temp.path(), 2048).await.unwrap();
    let refs = RefStore::new(Arc::new(store), RefStoreConfig::default());

    let values: Vec<Ref> = {
        let mut values = Vec::new();
        for i in 0..8u8 {
            values.push(refs.post(&ctx, &[i]).await.unwrap());
        }
        values
    };

    let mut rng = Lcg(7);
    let mut model = BTreeMap::new();
    let mut tree = Tree::new();
    for _ in 0..400 {
        let len = 1 + (rng.next() % 12) as usize;
        let key: Vec<u8> = (0..len).map(|_| (rng.next() % 4) as u8 + b'a').collect();
        let value = values[(rng.next() % 8) as usize].clone();
        tree = tree.put(&ctx, &refs, &key, value.clone()).await.unwrap();
        model.insert(key, value);
    }

    for (key, value) in &model {
        assert_eq!(&tree.get(&ctx, &refs, key).await.unwrap().unwrap().r#ref, value);
    }

    let entries = tree.iter().collect(&ctx, &refs).await.unwrap();
    let keys: Vec<Vec<u8>> = entries.into_iter().map(|e| e.key).collect();
    let expected: Vec<Vec<u8>> = model.keys().cloned().collect();
    assert_eq!(keys, expected);

    // deleting half keeps the rest reachable and ordered
    let doomed: Vec<Vec<u8>> = model.keys().step_by(2).cloned().collect();
    for key in &doomed {
        tree = tree.delete(&ctx, &refs, key).await.unwrap().unwrap();
        model.remove(key);
    }
    let keys: Vec<Vec<u8>> = tree
        .iter()
        .collect(&ctx, &refs)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.key)
        .collect();
    assert_eq!(keys, model.keys().cloned().collect::<Vec<_>>());
}

#[tokio::test]
async fn test_old_roots_are_snapshots() {
    let ctx = Context::background();
    let (_, refs, _temp) = common::setup_test_env().await;
    let value = refs.post(&ctx, b"v").await.unwrap();

    let mut roots = vec![Tree::new()];
    for i in 0..50u64 {
        let next = roots[roots.len() - 1]
            .put(&ctx, &refs, &i.to_be_bytes(), value.clone())
            .await
            .unwrap();
        roots.push(next);
    }
    for (n, root) in roots.iter().enumerate() {
        assert_eq!(root.iter().collect(&ctx, &refs).await.unwrap().len(), n);
    }
}
