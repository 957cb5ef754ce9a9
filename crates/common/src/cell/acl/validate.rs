use std::fmt;

use super::contents::{CellContents, Role, Who};
use crate::codec::BlockEncoded;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("contents carry no ACL")]
    MissingWho,
    #[error("contents carry no payload record")]
    MissingWhat,
    #[error("{role:?} list names entity {index}, but only {entities} exist")]
    IndexOutOfRange {
        role: Role,
        index: u32,
        entities: usize,
    },
    #[error("trusted entity {0} was removed or replaced")]
    EntityReplaced(u32),
    #[error("ACL signed by entity {0}, which is not an admin in the trusted ACL")]
    WhoSignerNotAdmin(u32),
    #[error("no ACL signature from entity {0}")]
    MissingWhoSignature(u32),
    #[error("ACL signature from entity {0} does not verify")]
    BadWhoSignature(u32),
    #[error("payload signed by entity {0}, which is not a writer")]
    WhatSignerNotWriter(u32),
    #[error("payload carries no signature")]
    MissingWhatSignature,
    #[error("payload signature from entity {0} does not verify")]
    BadWhatSignature(u32),
    #[error("{deks} wrapped keys for only {readers} readers")]
    TooManyDeks { deks: usize, readers: usize },
    #[error("record failed to encode: {0}")]
    Encoding(String),
}

/// Every invariant a set of contents broke
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Check initialized `contents` against the last ACL this process trusted.
///
/// The `Who` signer must be an admin *in `trusted`*, and its signature is
/// checked with the key `trusted` holds for it, so rewriting the ACL and its
/// signature together buys a backend nothing. With no trusted ACL yet the
/// contents vouch for themselves. The `What` signer must be a writer in the new
/// ACL. All failures are collected.
pub fn validate_contents(
    contents: &CellContents,
    trusted: Option<&Who>,
) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    let Some(who) = contents.who.as_ref() else {
        return Err(ValidationErrors(vec![ValidationError::MissingWho]));
    };
    let trusted = trusted.unwrap_or(who);

    for role in [Role::Admin, Role::Write, Role::Read] {
        for &index in who.members(role) {
            if who.entity(index).is_none() {
                errors.push(ValidationError::IndexOutOfRange {
                    role,
                    index,
                    entities: who.entities.len(),
                });
            }
        }
    }

    for (i, entity) in trusted.entities.iter().enumerate() {
        if who.entities.get(i) != Some(entity) {
            errors.push(ValidationError::EntityReplaced(i as u32));
        }
    }

    let who_author = contents.who_author;
    match (
        trusted.has_role(who_author, Role::Admin),
        trusted.entity(who_author),
    ) {
        (true, Some(signer)) => match contents.who_signatures.get(&who_author) {
            None => errors.push(ValidationError::MissingWhoSignature(who_author)),
            Some(signature) => match who.encode() {
                Ok(bytes) => {
                    if signer.verify_sig(&bytes, signature).is_err() {
                        errors.push(ValidationError::BadWhoSignature(who_author));
                    }
                }
                Err(e) => errors.push(ValidationError::Encoding(e.to_string())),
            },
        },
        _ => errors.push(ValidationError::WhoSignerNotAdmin(who_author)),
    }

    match contents.what.as_ref() {
        None => errors.push(ValidationError::MissingWhat),
        Some(what) => {
            let what_author = contents.what_author;
            match (who.has_role(what_author, Role::Write), who.entity(what_author)) {
                (true, Some(signer)) => match contents.what_signature.as_ref() {
                    None => errors.push(ValidationError::MissingWhatSignature),
                    Some(signature) => match what.encode() {
                        Ok(bytes) => {
                            if signer.verify_sig(&bytes, signature).is_err() {
                                errors.push(ValidationError::BadWhatSignature(what_author));
                            }
                        }
                        Err(e) => errors.push(ValidationError::Encoding(e.to_string())),
                    },
                },
                _ => errors.push(ValidationError::WhatSignerNotWriter(what_author)),
            }
            if what.deks.len() > who.read.len() {
                errors.push(ValidationError::TooManyDeks {
                    deks: what.deks.len(),
                    readers: who.read.len(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}
