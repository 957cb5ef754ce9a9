use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::contents::{CellContents, Role, What, Who};
use super::validate::validate_contents;
use super::AclError;
use crate::cell::{Cell, CellError};
use crate::codec::BlockEncoded;
use crate::context::Context;
use crate::crypto::{Entity, PublicEntity};

/// The last contents this handle validated, as raw bytes and decrypted
#[derive(Debug, Clone)]
struct Loaded {
    raw: Vec<u8>,
    contents: CellContents,
    plaintext: Vec<u8>,
}

/// A cell shared between entities with admin, write and read roles.
///
/// `get` must precede `cas` in a session: `cas` compares against the plaintext
/// cached by the last `get`, not a fresh read.
#[derive(Debug)]
pub struct AclCell {
    inner: Arc<dyn Cell>,
    local_who: Arc<dyn Cell>,
    entity: Entity,
    loaded: Mutex<Option<Loaded>>,
}

impl AclCell {
    /// `inner` holds the shared contents; `local_who` persists the ACL this
    /// process last trusted and should be private to it.
    pub fn new(inner: Arc<dyn Cell>, local_who: Arc<dyn Cell>, entity: Entity) -> Self {
        Self {
            inner,
            local_who,
            entity,
            loaded: Mutex::new(None),
        }
    }

    pub fn entity(&self) -> PublicEntity {
        self.entity.public()
    }

    /// Make this entity the sole admin, writer and reader of an empty cell
    pub async fn init(&self, ctx: &Context) -> Result<(), AclError> {
        let raw = self.inner.get(ctx).await?;
        if CellContents::from_raw(&raw)?.is_initialized() {
            return Err(AclError::AlreadyInitialized);
        }

        let who = Who::bootstrap(self.entity.public());
        let contents = CellContents::default()
            .with_who(who.clone(), 0, &self.entity)?
            .with_what(What::default(), 0, &self.entity)?;
        let next = contents.encode()?;
        if !self.inner.cas(ctx, &raw, &next).await? {
            return Err(AclError::CellInUse);
        }
        self.trust(ctx, &who).await?;

        tracing::info!(cell = %self.inner.id(), owner = %self.entity.public().to_hex(), "initialized acl cell");
        *self.loaded.lock() = Some(Loaded {
            raw: next,
            contents,
            plaintext: Vec::new(),
        });
        Ok(())
    }

    /// Fetch, validate and decrypt the current payload.
    ///  Empty when nothing was written since this entity became a reader.
    pub async fn load(&self, ctx: &Context) -> Result<Vec<u8>, AclError> {
        match self.fetch(ctx).await {
            Ok(loaded) => {
                let plaintext = loaded.plaintext.clone();
                *self.loaded.lock() = Some(loaded);
                Ok(plaintext)
            }
            Err(e) => {
                *self.loaded.lock() = None;
                Err(e)
            }
        }
    }

    /// Write `next` if the last loaded payload equals `expected`
    pub async fn cas_payload(
        &self,
        ctx: &Context,
        expected: &[u8],
        next: &[u8],
    ) -> Result<bool, AclError> {
        let Some(loaded) = self.loaded.lock().clone() else {
            tracing::debug!(cell = %self.inner.id(), "acl cas before any load");
            return Ok(false);
        };
        if loaded.plaintext != expected {
            return Ok(false);
        }

        let who = loaded.contents.who.as_ref().ok_or(AclError::Uninitialized)?;
        let author = who
            .index_of(&self.entity.public())
            .ok_or(AclError::NotMember)?;
        if !who.has_role(author, Role::Write) {
            tracing::warn!(cell = %self.inner.id(), author, "writing without the write role; readers will reject it");
        }

        let generation = loaded
            .contents
            .what
            .as_ref()
            .map(|w| w.generation + 1)
            .unwrap_or(1);
        let what = What::seal(next, who, generation)?;
        let contents = loaded.contents.with_what(what, author, &self.entity)?;
        let raw = contents.encode()?;

        let applied = self.inner.cas(ctx, &loaded.raw, &raw).await?;
        *self.loaded.lock() = applied.then(|| Loaded {
            raw,
            contents,
            plaintext: next.to_vec(),
        });
        Ok(applied)
    }

    /// The current validated ACL
    pub async fn who(&self, ctx: &Context) -> Result<Who, AclError> {
        let loaded = self.fetch(ctx).await?;
        loaded.contents.who.ok_or(AclError::Uninitialized)
    }

    /// Add `entity` to the ACL with no roles, returning its index
    pub async fn add_entity(&self, ctx: &Context, entity: PublicEntity) -> Result<u32, AclError> {
        let who = self
            .amend(ctx, |who| {
                if who.index_of(&entity).is_some() {
                    return Ok(None);
                }
                Ok(Some(who.with_entity(entity).0))
            })
            .await?;
        who.index_of(&entity)
            .ok_or_else(|| anyhow::anyhow!("entity missing after add").into())
    }

    pub async fn grant(&self, ctx: &Context, index: u32, role: Role) -> Result<(), AclError> {
        self.amend(ctx, |who| {
            if who.has_role(index, role) {
                return Ok(None);
            }
            who.with_role(index, role).map(Some)
        })
        .await?;
        tracing::info!(cell = %self.inner.id(), index, ?role, "granted role");
        Ok(())
    }

    pub async fn grant_admin(&self, ctx: &Context, index: u32) -> Result<(), AclError> {
        self.grant(ctx, index, Role::Admin).await
    }

    pub async fn grant_write(&self, ctx: &Context, index: u32) -> Result<(), AclError> {
        self.grant(ctx, index, Role::Write).await
    }

    pub async fn grant_read(&self, ctx: &Context, index: u32) -> Result<(), AclError> {
        self.grant(ctx, index, Role::Read).await
    }

    /// Apply `f` to the current ACL, sign the result and swap it in.
    ///  `f` returning `None` means nothing to change. A lost CAS is reported as
    ///  [`AclError::Conflict`], not retried.
    async fn amend<F>(&self, ctx: &Context, f: F) -> Result<Who, AclError>
    where
        F: FnOnce(&Who) -> Result<Option<Who>, AclError>,
    {
        let loaded = self.fetch(ctx).await?;
        let who = loaded
            .contents
            .who
            .as_ref()
            .ok_or(AclError::Uninitialized)?;
        let Some(next_who) = f(who)? else {
            let who = who.clone();
            *self.loaded.lock() = Some(loaded);
            return Ok(who);
        };

        let author = next_who
            .index_of(&self.entity.public())
            .ok_or(AclError::NotMember)?;
        let contents = loaded
            .contents
            .with_who(next_who.clone(), author, &self.entity)?;
        let raw = contents.encode()?;
        if !self.inner.cas(ctx, &loaded.raw, &raw).await? {
            *self.loaded.lock() = None;
            return Err(AclError::Conflict);
        }

        *self.loaded.lock() = Some(Loaded {
            raw,
            contents,
            plaintext: loaded.plaintext,
        });
        Ok(next_who)
    }

    async fn fetch(&self, ctx: &Context) -> Result<Loaded, AclError> {
        let raw = self.inner.get(ctx).await?;
        let contents = CellContents::from_raw(&raw)?;
        let Some(who) = contents.who.as_ref() else {
            return Ok(Loaded {
                raw,
                contents,
                plaintext: Vec::new(),
            });
        };

        let (_, trusted) = self.trusted(ctx).await?;
        validate_contents(&contents, trusted.as_ref()).map_err(|errors| {
            tracing::error!(cell = %self.inner.id(), %errors, "acl cell failed validation");
            AclError::Validation(errors)
        })?;
        self.trust(ctx, who).await?;

        let me = self.entity.public();
        let index = who.index_of(&me).ok_or(AclError::NotMember)?;
        let plaintext = match contents.what.as_ref() {
            Some(what) => match what.open(who, index, &self.entity)? {
                Some(plaintext) => plaintext,
                None => {
                    tracing::debug!(cell = %self.inner.id(), index, "no DEK for this reader yet");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Ok(Loaded {
            raw,
            contents,
            plaintext,
        })
    }

    async fn trusted(&self, ctx: &Context) -> Result<(Vec<u8>, Option<Who>), AclError> {
        let raw = self.local_who.get(ctx).await?;
        if raw.is_empty() {
            return Ok((raw, None));
        }
        let who = Who::decode(&raw)?;
        Ok((raw, Some(who)))
    }

    /// Record `who` as the locally trusted ACL.
    ///  Losing this CAS means another reader of the same local state moved it.
    async fn trust(&self, ctx: &Context, who: &Who) -> Result<(), AclError> {
        let (raw, trusted) = self.trusted(ctx).await?;
        if trusted.as_ref() == Some(who) {
            return Ok(());
        }
        if !self.local_who.cas(ctx, &raw, &who.encode()?).await? {
            return Err(AclError::Race);
        }
        tracing::debug!(cell = %self.inner.id(), entities = who.entities.len(), "trusting updated acl");
        Ok(())
    }
}

#[async_trait]
impl Cell for AclCell {
    async fn get(&self, ctx: &Context) -> Result<Vec<u8>, CellError> {
        Ok(self.load(ctx).await?)
    }

    async fn cas(&self, ctx: &Context, current: &[u8], next: &[u8]) -> Result<bool, CellError> {
        Ok(self.cas_payload(ctx, current, next).await?)
    }

    fn id(&self) -> String {
        format!("acl:{}", self.inner.id())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cell::retry;
    use crate::cell::MemoryCell;

    fn handle(raw: &MemoryCell, entity: &Entity) -> AclCell {
        AclCell::new(
            Arc::new(raw.clone()),
            Arc::new(MemoryCell::new()),
            entity.clone(),
        )
    }

    /// Lets someone else initialize the cell between our read and our CAS
    #[derive(Debug)]
    struct Ambushed {
        inner: MemoryCell,
        rival: Entity,
    }

    #[async_trait]
    impl Cell for Ambushed {
        async fn get(&self, ctx: &Context) -> Result<Vec<u8>, CellError> {
            self.inner.get(ctx).await
        }

        async fn cas(&self, ctx: &Context, current: &[u8], next: &[u8]) -> Result<bool, CellError> {
            if current.is_empty() && self.inner.get(ctx).await?.is_empty() {
                let rival = handle(&self.inner, &self.rival);
                rival.init(ctx).await?;
            }
            self.inner.cas(ctx, current, next).await
        }

        fn id(&self) -> String {
            "ambushed".to_string()
        }
    }

    #[tokio::test]
    async fn test_init_twice() {
        let ctx = Context::background();
        let raw = MemoryCell::new();
        let owner = Entity::generate().unwrap();

        let cell = handle(&raw, &owner);
        cell.init(&ctx).await.unwrap();
        assert!(cell.load(&ctx).await.unwrap().is_empty());
        assert!(matches!(
            cell.init(&ctx).await,
            Err(AclError::AlreadyInitialized)
        ));
        let other = handle(&raw, &Entity::generate().unwrap());
        assert!(matches!(
            other.init(&ctx).await,
            Err(AclError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn test_init_race_is_cell_in_use() {
        let ctx = Context::background();
        let ambushed = Ambushed {
            inner: MemoryCell::new(),
            rival: Entity::generate().unwrap(),
        };
        let cell = AclCell::new(
            Arc::new(ambushed),
            Arc::new(MemoryCell::new()),
            Entity::generate().unwrap(),
        );
        assert!(matches!(cell.init(&ctx).await, Err(AclError::CellInUse)));
    }

    #[tokio::test]
    async fn test_uninitialized() {
        let ctx = Context::background();
        let cell = handle(&MemoryCell::new(), &Entity::generate().unwrap());
        assert!(cell.load(&ctx).await.unwrap().is_empty());
        assert!(matches!(
            cell.cas_payload(&ctx, b"", b"x").await,
            Err(AclError::Uninitialized)
        ));
    }

    #[tokio::test]
    async fn test_write_read_and_stale_cas() {
        let ctx = Context::background();
        let raw = MemoryCell::new();
        let owner = Entity::generate().unwrap();
        let cell = handle(&raw, &owner);
        cell.init(&ctx).await.unwrap();

        assert!(cell.cas_payload(&ctx, b"", b"hello").await.unwrap());
        assert_eq!(cell.load(&ctx).await.unwrap(), b"hello");
        let stored = raw.get(&ctx).await.unwrap();
        assert!(!cell.cas_payload(&ctx, b"stale", b"nope").await.unwrap());
        assert_eq!(raw.get(&ctx).await.unwrap(), stored);

        let contents = CellContents::decode(&stored).unwrap();
        assert_eq!(contents.what.unwrap().generation, 1);
    }

    #[tokio::test]
    async fn test_reader_added_after_write_sees_empty() {
        let ctx = Context::background();
        let raw = MemoryCell::new();
        let owner = Entity::generate().unwrap();
        let reader = Entity::generate().unwrap();

        let admin = handle(&raw, &owner);
        admin.init(&ctx).await.unwrap();
        retry::write(&ctx, &admin, b"before", 4).await.unwrap();

        let index = admin.add_entity(&ctx, reader.public()).await.unwrap();
        assert_eq!(index, 1);
        admin.grant_read(&ctx, index).await.unwrap();

        let late = handle(&raw, &reader);
        assert!(late.load(&ctx).await.unwrap().is_empty());

        retry::write(&ctx, &admin, b"after", 4).await.unwrap();
        assert_eq!(late.load(&ctx).await.unwrap(), b"after");
    }

    #[tokio::test]
    async fn test_three_writers() {
        let ctx = Context::background();
        let raw = MemoryCell::new();
        let entities: Vec<Entity> = (0..3).map(|_| Entity::generate().unwrap()).collect();
        let cells: Vec<AclCell> = entities.iter().map(|e| handle(&raw, e)).collect();

        cells[0].init(&ctx).await.unwrap();
        for entity in &entities[1..] {
            let index = cells[0].add_entity(&ctx, entity.public()).await.unwrap();
            cells[0].grant_write(&ctx, index).await.unwrap();
            cells[0].grant_read(&ctx, index).await.unwrap();
        }

        for (i, cell) in cells.iter().enumerate() {
            let value = format!("side{}", i);
            retry::update(&ctx, cell, 4, |_| Ok(value.clone().into_bytes()))
                .await
                .unwrap();
        }
        for cell in &cells {
            assert_eq!(cell.get(&ctx).await.unwrap(), b"side2");
        }
    }

    #[tokio::test]
    async fn test_non_admin_acl_change_poisons_cell() {
        let ctx = Context::background();
        let raw = MemoryCell::new();
        let owner = Entity::generate().unwrap();
        let writer = Entity::generate().unwrap();

        let admin = handle(&raw, &owner);
        admin.init(&ctx).await.unwrap();
        let index = admin.add_entity(&ctx, writer.public()).await.unwrap();
        admin.grant_write(&ctx, index).await.unwrap();
        admin.grant_read(&ctx, index).await.unwrap();
        admin.load(&ctx).await.unwrap();

        let rogue = handle(&raw, &writer);
        rogue.load(&ctx).await.unwrap();

        // rewrite storage directly: promote self and sign as self
        let stored = CellContents::from_raw(&raw.get(&ctx).await.unwrap()).unwrap();
        let promoted = stored.who.clone().unwrap().with_role(index, Role::Admin).unwrap();
        let forged = stored.with_who(promoted, index, &writer).unwrap();
        raw.set_raw(&forged.encode().unwrap());

        match admin.load(&ctx).await {
            Err(AclError::Validation(errors)) => assert!(!errors.is_empty()),
            other => panic!("expected validation failure, got {:?}", other),
        }
        // the rogue's own anchored trust rejects it too
        assert!(matches!(
            rogue.load(&ctx).await,
            Err(AclError::Validation(_))
        ));
        assert!(matches!(
            admin.cas_payload(&ctx, b"", b"x").await,
            Ok(false)
        ));
    }

    #[tokio::test]
    async fn test_grant_through_handle_by_non_admin_is_rejected_by_readers() {
        let ctx = Context::background();
        let raw = MemoryCell::new();
        let owner = Entity::generate().unwrap();
        let writer = Entity::generate().unwrap();

        let admin = handle(&raw, &owner);
        admin.init(&ctx).await.unwrap();
        let index = admin.add_entity(&ctx, writer.public()).await.unwrap();
        admin.load(&ctx).await.unwrap();

        // the raw CAS accepts it; validation is the reader's job
        let rogue = handle(&raw, &writer);
        rogue.grant_admin(&ctx, index).await.unwrap();
        assert!(matches!(
            admin.load(&ctx).await,
            Err(AclError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_shared_local_trust_race() {
        let ctx = Context::background();
        let raw = MemoryCell::new();
        let owner = Entity::generate().unwrap();
        let admin = handle(&raw, &owner);
        admin.init(&ctx).await.unwrap();

        let local = MemoryCell::new();
        let reader = AclCell::new(Arc::new(raw.clone()), Arc::new(local.clone()), owner.clone());
        reader.load(&ctx).await.unwrap();

        // someone else sharing the same local state moves it under us
        admin
            .add_entity(&ctx, Entity::generate().unwrap().public())
            .await
            .unwrap();
        let contended = Racing {
            inner: local.clone(),
        };
        let racer = AclCell::new(Arc::new(raw.clone()), Arc::new(contended), owner);
        assert!(matches!(racer.load(&ctx).await, Err(AclError::Race)));
    }

    /// Local trust cell whose CAS always loses
    #[derive(Debug)]
    struct Racing {
        inner: MemoryCell,
    }

    #[async_trait]
    impl Cell for Racing {
        async fn get(&self, ctx: &Context) -> Result<Vec<u8>, CellError> {
            self.inner.get(ctx).await
        }

        async fn cas(&self, ctx: &Context, current: &[u8], _next: &[u8]) -> Result<bool, CellError> {
            self.inner.cas(ctx, current, b"moved by someone else").await?;
            Ok(false)
        }

        fn id(&self) -> String {
            "racing".to_string()
        }
    }

    #[tokio::test]
    async fn test_unwrappable_reader_is_skipped() {
        let ctx = Context::background();
        let raw = MemoryCell::new();
        let owner = Entity::generate().unwrap();
        let admin = handle(&raw, &owner);
        admin.init(&ctx).await.unwrap();

        // an all-zero encryption key makes the X25519 exchange non-contributory
        let mut degenerate = owner.public().signing_bytes().to_vec();
        degenerate.extend_from_slice(&[0u8; 32]);
        let broken: PublicEntity = bincode::deserialize(&degenerate).unwrap();
        let index = admin.add_entity(&ctx, broken).await.unwrap();
        admin.grant_read(&ctx, index).await.unwrap();

        retry::write(&ctx, &admin, b"still works", 4).await.unwrap();
        assert_eq!(admin.load(&ctx).await.unwrap(), b"still works");
        let contents = CellContents::from_raw(&raw.get(&ctx).await.unwrap()).unwrap();
        let deks = contents.what.unwrap().deks;
        assert_eq!(deks.len(), 2);
        assert!(deks[0].is_some());
        assert!(deks[1].is_none());
    }
}
