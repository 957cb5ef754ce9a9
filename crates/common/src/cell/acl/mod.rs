//! Multi-party access control over a raw cell
//!
//! The inner cell holds an encoded [`CellContents`]: an admin-signed ACL
//! ([`Who`]) and an author-signed, envelope-encrypted payload ([`What`]). Each
//! write draws a fresh DEK, seals the payload with it and wraps the DEK for
//! every reader. Readers unwrap their copy by their position in `Who::read`.
//!
//! The backend is not trusted. Every read validates the contents against the
//! ACL this process last accepted (its "local who", persisted through an
//! auxiliary cell), so a backend cannot promote a new admin on its own. Writes
//! by non-admins are accepted by the raw CAS but poison the cell for every
//! later reader rather than silently taking effect.

mod cell;
mod contents;
mod validate;

use crate::codec::CodecError;
use crate::context::Cancelled;
use crate::crypto::{KeyError, SecretError, SecretShareError};

use super::CellError;

pub use cell::AclCell;
pub use contents::{CellContents, Role, What, Who};
pub use validate::{validate_contents, ValidationError, ValidationErrors};

#[derive(Debug, thiserror::Error)]
pub enum AclError {
    #[error("acl error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("cell error: {0}")]
    Cell(#[from] CellError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("secret share error: {0}")]
    SecretShare(#[from] SecretShareError),
    #[error("cell is already initialized")]
    AlreadyInitialized,
    #[error("cell already in use: lost the race to initialize it")]
    CellInUse,
    #[error("cell is not initialized")]
    Uninitialized,
    #[error("cell changed underneath this operation; re-read and retry")]
    Conflict,
    #[error("a race occurred updating the locally trusted ACL; re-read")]
    Race,
    #[error("this entity is not listed in the cell's ACL")]
    NotMember,
    #[error("no entity at index {0}")]
    UnknownEntity(u32),
    #[error("trust violated, do not retry: {0}")]
    Validation(ValidationErrors),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl From<AclError> for CellError {
    fn from(e: AclError) -> Self {
        match e {
            AclError::Cell(inner) => inner,
            AclError::Cancelled(c) => CellError::Cancelled(c),
            e => CellError::Acl(Box::new(e)),
        }
    }
}
