//! Bounded read-then-CAS loops
//!
//! These are the retry boundary for everything stacked on a cell. Transport
//! and store errors propagate immediately; only a lost CAS is retried.

use super::{Cell, CellError, Context};

pub const DEFAULT_CAS_ATTEMPTS: usize = 16;

/// Set the cell to `next` regardless of its current value
pub async fn write<C: Cell + ?Sized>(
    ctx: &Context,
    cell: &C,
    next: &[u8],
    attempts: usize,
) -> Result<(), CellError> {
    update(ctx, cell, attempts, |_| Ok(next.to_vec()))
        .await
        .map(|_| ())
}

/// Read the cell, compute the next value from the current one, CAS it in.
///  `f` may run several times, once per lost race. Returns the value written.
pub async fn update<C, F>(
    ctx: &Context,
    cell: &C,
    attempts: usize,
    mut f: F,
) -> Result<Vec<u8>, CellError>
where
    C: Cell + ?Sized,
    F: FnMut(&[u8]) -> Result<Vec<u8>, CellError>,
{
    for attempt in 1..=attempts {
        let current = cell.get(ctx).await?;
        let next = f(&current)?;
        if cell.cas(ctx, &current, &next).await? {
            return Ok(next);
        }
        tracing::debug!(cell = %cell.id(), attempt, "CAS lost, retrying");
    }
    Err(CellError::CasExhausted { attempts })
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cell::MemoryCell;

    /// Loses every CAS by rewriting the value just before comparing
    #[derive(Debug, Default)]
    struct Contended {
        inner: MemoryCell,
        races: AtomicUsize,
    }

    #[async_trait]
    impl Cell for Contended {
        async fn get(&self, ctx: &Context) -> Result<Vec<u8>, CellError> {
            self.inner.get(ctx).await
        }

        async fn cas(&self, ctx: &Context, current: &[u8], next: &[u8]) -> Result<bool, CellError> {
            let n = self.races.fetch_add(1, Ordering::SeqCst);
            self.inner.set_raw(format!("interloper {}", n).as_bytes());
            self.inner.cas(ctx, current, next).await
        }

        fn id(&self) -> String {
            "contended".to_string()
        }
    }

    #[tokio::test]
    async fn test_update_counter() {
        let ctx = Context::background();
        let cell = MemoryCell::new();
        for _ in 0..5 {
            update(&ctx, &cell, DEFAULT_CAS_ATTEMPTS, |cur| {
                let n = if cur.is_empty() { 0 } else { cur[0] };
                Ok(vec![n + 1])
            })
            .await
            .unwrap();
        }
        assert_eq!(cell.get(&ctx).await.unwrap(), vec![5]);

        write(&ctx, &cell, b"reset", 1).await.unwrap();
        assert_eq!(cell.get(&ctx).await.unwrap(), b"reset");
    }

    #[tokio::test]
    async fn test_exhausted() {
        let ctx = Context::background();
        let cell = Contended::default();
        let result = write(&ctx, &cell, b"mine", 3).await;
        assert!(matches!(result, Err(CellError::CasExhausted { attempts: 3 })));
        assert_eq!(cell.races.load(Ordering::SeqCst), 3);
    }
}
