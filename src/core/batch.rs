// src/core/batch.rs

//! Bounded fan-out used inside a single task body for bulk file operations.

use anyhow::{Result, anyhow};
use futures::{StreamExt, stream::FuturesUnordered};
use std::future::Future;
use std::num::NonZeroUsize;
use tokio::sync::Semaphore;

/// Position of an item within its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchContext {
    /// 0-based position of the item in the input.
    pub index: usize,
    pub total: usize,
}

/// Runs `f` over every item with at most `concurrency` futures in flight
/// (unbounded when `None`).
///
/// Results come back in completion order. The first error stops the batch:
/// futures still pending are dropped and the error is returned.
pub async fn map_bounded<T, R, F, Fut>(
    items: Vec<T>,
    concurrency: Option<NonZeroUsize>,
    f: F,
) -> Result<Vec<R>>
where
    F: Fn(T, BatchContext) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let total = items.len();
    let permits = concurrency.map_or(Semaphore::MAX_PERMITS, |n| n.get().min(Semaphore::MAX_PERMITS));
    let sem = Semaphore::new(permits);
    let f = &f;
    let sem = &sem;

    let mut pending = FuturesUnordered::new();
    for (index, item) in items.into_iter().enumerate() {
        pending.push(async move {
            let _permit = sem
                .acquire()
                .await
                .map_err(|_| anyhow!("Semaphore closed"))?;
            f(item, BatchContext { index, total }).await
        });
    }

    let mut results = Vec::with_capacity(total);
    while let Some(result) = pending.next().await {
        results.push(result?);
    }
    Ok(results)
}
