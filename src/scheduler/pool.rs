//! Bounded-concurrency fan-out.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinError;

/// Result of one item of a bounded run.
#[derive(Debug)]
pub struct Outcome<T, E> {
    pub index: usize,
    pub result: Result<T, E>,
}

/// Run `job(i)` for every `i` in `0..count` with at most `limit` running
/// at once, and wait for all of them.
///
/// Outcomes are returned in index order. A failing or panicking job does
/// not affect its siblings; a panic surfaces as that item's error.
pub async fn run_bounded<F, Fut, T, E>(count: usize, limit: usize, job: F) -> Vec<Outcome<T, E>>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let handles: Vec<_> = (0..count)
        .map(|index| {
            let permits = Arc::clone(&permits);
            let fut = job(index);
            tokio::spawn(async move {
                // Held until the job completes, whatever its result.
                let _permit = permits.acquire_owned().await;
                fut.await
            })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(count);
    for (index, handle) in handles.into_iter().enumerate() {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(E::from(e)),
        };
        outcomes.push(Outcome { index, result });
    }
    outcomes
}
