//! Cells: small mutable pointers with compare-and-swap
//!
//! Everything mutable in cellfs hangs off a [`Cell`]. Raw cells
//! ([`MemoryCell`], [`FileCell`], [`HttpCell`]) just hold bytes. The
//! [`SymmetricCell`] and [`acl::AclCell`] wrappers stack on top of any other
//! cell and add confidentiality and multi-party access control, still behind
//! the same `get`/`cas` contract.
//!
//! A CAS that loses a race is not an error: it returns `Ok(false)` and the
//! caller re-reads and retries, usually through [`retry::update`].

pub mod acl;
mod file;
mod http;
mod memory;
pub mod retry;
mod spec;
mod symmetric;

use async_trait::async_trait;

use crate::codec::CodecError;
use crate::context::{Cancelled, Context};
use crate::crypto::SecretError;

pub use file::FileCell;
pub use http::{CasRequest, CasResponse, HttpCell};
pub use memory::MemoryCell;
pub use spec::{CellRegistry, CellSpec};
pub use symmetric::SymmetricCell;

#[derive(Debug, thiserror::Error)]
pub enum CellError {
    #[error("cell error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("cell {url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("cell not found: {0}")]
    NotFound(String),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("acl error: {0}")]
    Acl(Box<acl::AclError>),
    #[error("could not complete CAS after {attempts} attempts; the cell is busy, retry later")]
    CasExhausted { attempts: usize },
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// A mutable pointer with compare-and-swap
#[async_trait]
pub trait Cell: Send + Sync + std::fmt::Debug {
    /// Current value; empty if the cell was never written
    async fn get(&self, ctx: &Context) -> Result<Vec<u8>, CellError>;

    /// Replace the value with `next` iff it currently equals `current`.
    ///  `Ok(false)` means someone else got there first.
    async fn cas(&self, ctx: &Context, current: &[u8], next: &[u8]) -> Result<bool, CellError>;

    /// Names this cell uniquely within the process
    fn id(&self) -> String;
}
