//! Bounded fan-out over a list of futures.
//!
//! A fixed pool of workers pulls `(index, task)` pairs from one shared queue
//! in submission order. Every result carries its submission index, so the
//! output order equals submission order whatever order tasks finish in. All
//! workers are polled on the caller's task: concurrency here means
//! overlapping I/O waits, not parallel threads.

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use tokio::sync::Mutex;

/// Runs `tasks` with at most `max_concurrency` in flight (0 is treated as 1).
///
/// Resolves once every task succeeded, or with the first failure observed.
/// On failure no further queued task is started; tasks still in flight are
/// dropped with the pool; cooperative cancellation is up to the caller.
pub async fn run_bounded<T, E, Fut>(tasks: Vec<Fut>, max_concurrency: usize) -> Result<Vec<T>, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    let total = tasks.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let workers = max_concurrency.clamp(1, total);
    tracing::debug!("Scheduling {} task(s) on {} worker(s)", total, workers);

    let queue = Mutex::new(tasks.into_iter().enumerate());
    let mut pool: FuturesUnordered<_> = (0..workers).map(|_| worker(&queue)).collect();
    let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();

    while let Some(finished) = pool.next().await {
        for (index, value) in finished? {
            slots[index] = Some(value);
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

async fn worker<I, T, E, Fut>(queue: &Mutex<I>) -> Result<Vec<(usize, T)>, E>
where
    I: Iterator<Item = (usize, Fut)>,
    Fut: Future<Output = Result<T, E>>,
{
    let mut done = Vec::new();
    loop {
        let next = queue.lock().await.next();
        let Some((index, task)) = next else {
            break;
        };
        done.push((index, task.await?));
    }
    Ok(done)
}
