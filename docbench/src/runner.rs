//! Sustained read load through one [`QueryStrategy`].
//!
//! [`run`] spawns a fixed number of workers that each loop forever: pick a uniformly random id,
//! turn it into an email and fetch it through the strategy. Failures are logged at debug level and
//! never stop a worker. There is no stop signal; the run ends when the process is terminated.

use std::sync::Arc;

use anyhow::{Context, Result};
use docbench_store::{Document, SharedStore, Store};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinSet;

use crate::keys::DocId;
use crate::strategy::{FetchError, QueryStrategy};

/// Fetches the document for `id` through `strategy`.
pub async fn query_once<S: QueryStrategy + ?Sized>(
    store: &dyn Store,
    strategy: &S,
    id: DocId,
) -> Result<Document, FetchError> {
    strategy.fetch(store, &id.email()).await
}

/// Drives `workers` concurrent readers over ids `[0, total_ids)` until the process exits.
///
/// This only returns if a worker panics.
pub async fn run<S: QueryStrategy>(
    store: SharedStore,
    strategy: S,
    total_ids: u64,
    workers: usize,
) -> Result<()> {
    anyhow::ensure!(total_ids > 0, "cannot sample from an empty id space");

    let strategy = Arc::new(strategy);
    let mut tasks = JoinSet::new();
    for worker in 0..workers.max(1) {
        let store = Arc::clone(&store);
        let strategy = Arc::clone(&strategy);
        tasks.spawn(read_worker(worker, store, strategy, total_ids));
    }

    while let Some(result) = tasks.join_next().await {
        result.context("read worker panicked")?;
    }
    Ok(())
}

async fn read_worker<S: QueryStrategy>(
    worker: usize,
    store: SharedStore,
    strategy: Arc<S>,
    total_ids: u64,
) {
    let mut rng = SmallRng::from_rng(&mut rand::rng());
    tracing::debug!(worker, strategy = strategy.name(), "read worker started");

    loop {
        let id = DocId::random(&mut rng, total_ids);
        if let Err(error) = query_once(store.as_ref(), strategy.as_ref(), id).await {
            tracing::debug!(error = &error as &dyn std::error::Error, %id, "query failed");
        }

        if tracing::enabled!(tracing::Level::DEBUG) && rng.random_ratio(1, 10) {
            let tasks = tokio::runtime::Handle::current()
                .metrics()
                .num_alive_tasks();
            tracing::debug!(worker, tasks, "runtime tasks alive");
        }

        // stores that answer without suspending would otherwise starve other tasks
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use docbench_store::InMemoryStore;

    use super::*;
    use crate::strategy::KeyLookupStrategy;

    #[tokio::test]
    async fn key_lookup_of_sampled_id() {
        let store = InMemoryStore::new();
        for id in 0..100 {
            let doc = Document {
                email: DocId(id).email(),
                name: "someone".into(),
            };
            store.create(&DocId(id).key(), &doc).await.unwrap();
        }

        let doc = query_once(&store, &KeyLookupStrategy, DocId(7)).await.unwrap();
        assert_eq!(doc.email, "00000000000000000007@joyent.com");
    }

    #[tokio::test]
    async fn run_survives_failing_queries() {
        docbench_test::tracing::init();

        // nothing is loaded, so every lookup fails
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let run = run(store, KeyLookupStrategy, 100, 4);

        let result = tokio::time::timeout(Duration::from_millis(200), run).await;
        assert!(result.is_err(), "runner must keep going until cancelled");
    }

    #[tokio::test]
    async fn run_rejects_empty_id_space() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        assert!(run(store, KeyLookupStrategy, 0, 1).await.is_err());
    }
}
