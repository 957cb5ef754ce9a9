use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Cell, CellError, Context};
use crate::crypto::Secret;

/// Last ciphertext seen on the inner cell and what it opened to
#[derive(Debug, Clone, Default)]
struct Known {
    ciphertext: Vec<u8>,
    plaintext: Vec<u8>,
}

/// Authenticated encryption over any cell with a pre-shared key.
///  The inner value is `nonce || box`; an empty inner value reads as empty.
#[derive(Debug)]
pub struct SymmetricCell {
    inner: Arc<dyn Cell>,
    key: Secret,
    known: Mutex<Option<Known>>,
}

impl SymmetricCell {
    pub fn new(inner: Arc<dyn Cell>, key: Secret) -> Self {
        Self {
            inner,
            key,
            known: Mutex::new(None),
        }
    }

    fn forget(&self) {
        *self.known.lock() = None;
    }
}

#[async_trait]
impl Cell for SymmetricCell {
    async fn get(&self, ctx: &Context) -> Result<Vec<u8>, CellError> {
        let ciphertext = self.inner.get(ctx).await.inspect_err(|_| self.forget())?;
        let plaintext = if ciphertext.is_empty() {
            Vec::new()
        } else {
            self.key.open(&ciphertext).inspect_err(|_| self.forget())?
        };
        *self.known.lock() = Some(Known {
            ciphertext,
            plaintext: plaintext.clone(),
        });
        Ok(plaintext)
    }

    async fn cas(&self, ctx: &Context, current: &[u8], next: &[u8]) -> Result<bool, CellError> {
        // nothing read yet: the only value we can vouch for is the empty cell
        let known = self.known.lock().clone().unwrap_or_default();
        if known.plaintext != current {
            return Ok(false);
        }

        let ciphertext = self.key.seal(next)?;
        let applied = self.inner.cas(ctx, &known.ciphertext, &ciphertext).await?;
        *self.known.lock() = applied.then(|| Known {
            ciphertext,
            plaintext: next.to_vec(),
        });
        Ok(applied)
    }

    fn id(&self) -> String {
        format!("symmetric:{}", self.inner.id())
    }
}
