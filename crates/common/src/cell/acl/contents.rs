use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::AclError;
use crate::codec::BlockEncoded;
use crate::crypto::{Entity, PublicEntity, Secret, SecretShare, Signature};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Write,
    Read,
}

/// The ACL: entities plus index lists per role.
///  `read` is ordered; the DEK for `read[i]` sits at `What::deks[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Who {
    pub entities: Vec<PublicEntity>,
    pub admin: Vec<u32>,
    pub write: Vec<u32>,
    pub read: Vec<u32>,
}

impl BlockEncoded for Who {}

impl Who {
    /// The first ACL of a cell: `owner` alone, with every role
    pub fn bootstrap(owner: PublicEntity) -> Self {
        Self {
            entities: vec![owner],
            admin: vec![0],
            write: vec![0],
            read: vec![0],
        }
    }

    pub fn index_of(&self, entity: &PublicEntity) -> Option<u32> {
        self.entities
            .iter()
            .position(|e| e == entity)
            .map(|i| i as u32)
    }

    pub fn entity(&self, index: u32) -> Option<&PublicEntity> {
        self.entities.get(index as usize)
    }

    pub fn members(&self, role: Role) -> &[u32] {
        match role {
            Role::Admin => &self.admin,
            Role::Write => &self.write,
            Role::Read => &self.read,
        }
    }

    pub fn has_role(&self, index: u32, role: Role) -> bool {
        self.members(role).contains(&index)
    }

    /// Position of `index` in the read list, which is also its DEK slot
    pub fn read_position(&self, index: u32) -> Option<usize> {
        self.read.iter().position(|&i| i == index)
    }

    /// A copy with `entity` appended, and its index.
    ///  An entity already present keeps its index and the copy is unchanged.
    pub fn with_entity(&self, entity: PublicEntity) -> (Who, u32) {
        let mut next = self.clone();
        if let Some(index) = self.index_of(&entity) {
            return (next, index);
        }
        next.entities.push(entity);
        let index = (next.entities.len() - 1) as u32;
        (next, index)
    }

    /// A copy with `index` granted `role`
    pub fn with_role(&self, index: u32, role: Role) -> Result<Who, AclError> {
        if self.entity(index).is_none() {
            return Err(AclError::UnknownEntity(index));
        }
        let mut next = self.clone();
        let members = match role {
            Role::Admin => &mut next.admin,
            Role::Write => &mut next.write,
            Role::Read => &mut next.read,
        };
        if !members.contains(&index) {
            members.push(index);
        }
        Ok(next)
    }
}

/// An encrypted payload and the DEK wrapped once per reader
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct What {
    /// `None` until the first write
    pub payload: Option<Vec<u8>>,
    /// Aligned with `Who::read` at write time. `None` where wrapping failed.
    pub deks: Vec<Option<SecretShare>>,
    pub generation: u64,
}

impl BlockEncoded for What {}

impl What {
    /// Seal `plaintext` under a fresh DEK and wrap it for every reader in `who`.
    ///  A reader whose key cannot be wrapped to is logged and skipped.
    pub fn seal(plaintext: &[u8], who: &Who, generation: u64) -> Result<Self, AclError> {
        let dek = Secret::generate()?;
        let payload = dek.seal(plaintext)?;
        let deks = who
            .read
            .iter()
            .map(|&index| {
                let entity = who.entity(index)?;
                match SecretShare::new(&dek, entity) {
                    Ok(share) => Some(share),
                    Err(e) => {
                        tracing::warn!(reader = index, entity = %entity.to_hex(), "skipping DEK for reader: {}", e);
                        None
                    }
                }
            })
            .collect();
        Ok(Self {
            payload: Some(payload),
            deks,
            generation,
        })
    }

    /// Decrypt as the entity at `reader`.
    ///  `Ok(None)` when there is no DEK for it, e.g. it became a reader after
    ///  the last write.
    pub fn open(&self, who: &Who, reader: u32, entity: &Entity) -> Result<Option<Vec<u8>>, AclError> {
        let Some(payload) = &self.payload else {
            return Ok(Some(Vec::new()));
        };
        let Some(position) = who.read_position(reader) else {
            return Ok(None);
        };
        let Some(Some(share)) = self.deks.get(position) else {
            return Ok(None);
        };
        let dek = share.recover(entity)?;
        Ok(Some(dek.open(payload)?))
    }
}

/// What the raw cell actually stores
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellContents {
    pub who: Option<Who>,
    pub who_author: u32,
    pub who_signatures: BTreeMap<u32, Signature>,
    pub what: Option<What>,
    pub what_author: u32,
    pub what_signature: Option<Signature>,
}

impl BlockEncoded for CellContents {}

impl CellContents {
    /// Decode raw cell bytes; an empty cell is the uninitialized default
    pub fn from_raw(raw: &[u8]) -> Result<Self, AclError> {
        if raw.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self::decode(raw)?)
    }

    pub fn is_initialized(&self) -> bool {
        self.who.is_some()
    }

    /// A copy carrying `who`, signed by `signer` as entity `author`
    pub fn with_who(&self, who: Who, author: u32, signer: &Entity) -> Result<Self, AclError> {
        let signature = signer.sign(&who.encode()?);
        let mut next = self.clone();
        next.who = Some(who);
        next.who_author = author;
        next.who_signatures = BTreeMap::from([(author, signature)]);
        Ok(next)
    }

    /// A copy carrying `what`, signed by `signer` as entity `author`
    pub fn with_what(&self, what: What, author: u32, signer: &Entity) -> Result<Self, AclError> {
        let signature = signer.sign(&what.encode()?);
        let mut next = self.clone();
        next.what = Some(what);
        next.what_author = author;
        next.what_signature = Some(signature);
        Ok(next)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mutators_copy() {
        let owner = Entity::generate().unwrap().public();
        let guest = Entity::generate().unwrap().public();
        let who = Who::bootstrap(owner);

        let (added, index) = who.with_entity(guest);
        assert_eq!(index, 1);
        assert_eq!(who.entities.len(), 1);
        assert_eq!(added.with_entity(guest).1, 1);

        let granted = added.with_role(1, Role::Read).unwrap();
        assert!(granted.has_role(1, Role::Read));
        assert!(!added.has_role(1, Role::Read));
        assert_eq!(granted.with_role(1, Role::Read).unwrap(), granted);
        assert_eq!(granted.read_position(1), Some(1));
        assert!(matches!(
            granted.with_role(9, Role::Admin),
            Err(AclError::UnknownEntity(9))
        ));
    }

    #[test]
    fn test_seal_open_per_reader() {
        let owner = Entity::generate().unwrap();
        let reader = Entity::generate().unwrap();
        let outsider = Entity::generate().unwrap();

        let (who, reader_index) = Who::bootstrap(owner.public()).with_entity(reader.public());
        let who = who.with_role(reader_index, Role::Read).unwrap();

        let what = What::seal(b"payload", &who, 1).unwrap();
        assert_eq!(what.deks.len(), 2);
        assert_eq!(what.open(&who, 0, &owner).unwrap().unwrap(), b"payload");
        assert_eq!(what.open(&who, reader_index, &reader).unwrap().unwrap(), b"payload");
        // the wrong private entity cannot unwrap another reader's DEK
        assert!(what.open(&who, reader_index, &outsider).is_err());

        let (later, late_index) = who.with_entity(outsider.public());
        let later = later.with_role(late_index, Role::Read).unwrap();
        assert_eq!(what.open(&later, late_index, &outsider).unwrap(), None);
    }

    #[test]
    fn test_contents_roundtrip() {
        let owner = Entity::generate().unwrap();
        let who = Who::bootstrap(owner.public());
        let contents = CellContents::default()
            .with_who(who.clone(), 0, &owner)
            .unwrap()
            .with_what(What::default(), 0, &owner)
            .unwrap();
        let raw = contents.encode().unwrap();
        assert_eq!(CellContents::from_raw(&raw).unwrap(), contents);
        assert!(!CellContents::from_raw(&[]).unwrap().is_initialized());
    }
}
