/**
 * Mutable pointers with compare-and-swap.
 *  - Raw memory, file and HTTP cells
 *  - Symmetric and ACL'd encrypted wrappers
 *  - A registry keyed by cell spec
 */
pub mod cell;
/**
 * Deterministic binary encoding for every
 *  record we persist or sign.
 */
pub mod codec;
/**
 * Cancellation tokens and deadlines threaded
 *  through every async entry point.
 */
pub mod context;
/**
 * Cryptographic types and operations.
 *  - Signing and encryption identities
 *  - Symmetric secrets
 *  - Per-reader key wrapping
 */
pub mod crypto;
/**
 * Directories, files and volumes built on
 *  the tree and the ref layer.
 */
pub mod fs;
/**
 * Encrypted, verified, optionally mirrored
 *  references to immutable blobs.
 */
pub mod refs;
/**
 * Content-addressed blob store seam, with
 *  in-memory and on-disk backends.
 */
pub mod store;
/**
 * The persistent blob-backed B-tree that
 *  indexes directory entries and file chunks.
 */
pub mod tree;

pub mod prelude {
    pub use crate::cell::acl::{AclCell, AclError, Role};
    pub use crate::cell::{Cell, CellError, CellRegistry, CellSpec, HttpCell, MemoryCell, SymmetricCell};
    pub use crate::context::Context;
    pub use crate::crypto::{Entity, PublicEntity, Secret};
    pub use crate::fs::{Dir, File, FsError, Object, Volume};
    pub use crate::refs::{KeyMode, Ref, RefStore, RefStoreConfig};
    pub use crate::store::{BlobStore, FsStore, MemoryStore};
    pub use crate::tree::{Tree, TreeEntry, TreeError};
}
