use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Cell, CellError, Context};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Cell held in process memory. Clones share the same value and identity.
#[derive(Debug, Clone)]
pub struct MemoryCell {
    id: u64,
    value: Arc<Mutex<Vec<u8>>>,
}

impl Default for MemoryCell {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCell {
    pub fn new() -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            value: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Overwrite the value with no CAS. Lets tests play a hostile backend.
    pub fn set_raw(&self, value: &[u8]) {
        *self.value.lock() = value.to_vec();
    }
}

#[async_trait]
impl Cell for MemoryCell {
    async fn get(&self, ctx: &Context) -> Result<Vec<u8>, CellError> {
        ctx.check()?;
        Ok(self.value.lock().clone())
    }

    async fn cas(&self, ctx: &Context, current: &[u8], next: &[u8]) -> Result<bool, CellError> {
        ctx.check()?;
        let mut value = self.value.lock();
        if value.as_slice() != current {
            return Ok(false);
        }
        *value = next.to_vec();
        Ok(true)
    }

    fn id(&self) -> String {
        format!("memory:{}", self.id)
    }
}
