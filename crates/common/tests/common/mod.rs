//! Shared test utilities for volume integration tests
#![allow(dead_code)]

use std::sync::Arc;

pub use common::cell::FileCell;
use common::prelude::*;
use tempfile::TempDir;

/// Set up an on-disk environment: a blob store, a file-backed root cell and a ref store
pub async fn setup_test_env() -> (Volume, RefStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let refs = open_refs(&temp_dir).await;
    let cell = FileCell::new(temp_dir.path().join("root.cell"));
    let volume = Volume::new(Arc::new(cell), refs.clone());
    (volume, refs, temp_dir)
}

pub async fn open_refs(temp_dir: &TempDir) -> RefStore {
    let store = FsStore::open(&temp_dir.path().join("blobs")).await.unwrap();
    RefStore::new(Arc::new(store), RefStoreConfig::default())
}

/// A fresh ACL cell handle for `entity` over shared raw storage, with its own trust cell
pub fn acl_handle(raw: &MemoryCell, entity: &Entity) -> AclCell {
    AclCell::new(
        Arc::new(raw.clone()),
        Arc::new(MemoryCell::new()),
        entity.clone(),
    )
}

pub async fn write_file(ctx: &Context, refs: &RefStore, data: &[u8]) -> Object {
    Object::File(File::write(ctx, refs, data).await.unwrap())
}

pub async fn read_file(ctx: &Context, volume: &Volume, path: &str) -> Vec<u8> {
    let file: File = volume.get(ctx, path).await.unwrap().try_into().unwrap();
    file.read_all(ctx, volume.refs()).await.unwrap()
}
