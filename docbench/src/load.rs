//! Bulk load of synthetic documents.
//!
//! A single producer feeds every id of `[0, total_ids)` into a bounded queue and closes it. A fixed
//! pool of workers drains the queue concurrently; each worker creates the document for its id and
//! falls back to an unconditional replace when the key already exists, so repeated runs overwrite
//! the previous data. Other failures are logged and the id is skipped.
//!
//! [`load`] returns only once every worker has drained the queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use docbench_store::{Cas, SharedStore, StoreError, StoreResult};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

use crate::keys::{self, DocId};
use crate::timer::{Timer, timed};

/// Number of ids buffered between the producer and the workers, per worker.
const QUEUE_DEPTH_PER_WORKER: usize = 16;

/// Counts of what happened to each id during a load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Documents that did not exist before.
    pub created: u64,
    /// Documents that existed and were overwritten.
    pub replaced: u64,
    /// Ids skipped because of an error.
    pub failed: u64,
}

impl LoadSummary {
    /// Total number of ids a worker picked up.
    pub fn attempted(&self) -> u64 {
        self.created + self.replaced + self.failed
    }
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    replaced: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn summary(&self) -> LoadSummary {
        LoadSummary {
            created: self.created.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// What a worker did with one id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The document was created.
    Created,
    /// The document existed and was replaced.
    Replaced,
}

/// Loads documents `[0, total_ids)` into `store` using `workers` concurrent workers.
///
/// The whole phase is measured as a single `preload` latency record.
pub async fn load(store: SharedStore, total_ids: u64, workers: usize) -> LoadSummary {
    let workers = workers.max(1);
    let timer = Timer::start("preload");

    let (sender, receiver) = mpsc::channel(workers * QUEUE_DEPTH_PER_WORKER);
    let producer = tokio::spawn(async move {
        for id in 0..total_ids {
            if sender.send(DocId(id)).await.is_err() {
                break;
            }
        }
        // dropping the sender closes the queue
    });

    let receiver = Arc::new(Mutex::new(receiver));
    let counters = Arc::new(Counters::default());

    let mut tasks = JoinSet::new();
    for _ in 0..workers {
        let store = Arc::clone(&store);
        let receiver = Arc::clone(&receiver);
        let counters = Arc::clone(&counters);
        tasks.spawn(load_worker(store, receiver, counters));
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(error) = result {
            tracing::error!(error = &error as &dyn std::error::Error, "load worker panicked");
        }
    }
    if let Err(error) = producer.await {
        tracing::error!(error = &error as &dyn std::error::Error, "load producer panicked");
    }

    timer.stop();
    counters.summary()
}

async fn load_worker(
    store: SharedStore,
    receiver: Arc<Mutex<mpsc::Receiver<DocId>>>,
    counters: Arc<Counters>,
) {
    let mut rng = SmallRng::from_rng(&mut rand::rng());

    loop {
        let next = receiver.lock().await.recv().await;
        let Some(id) = next else {
            break;
        };

        match load_document(&store, id, &mut rng).await {
            Ok(LoadOutcome::Created) => counters.created.fetch_add(1, Ordering::Relaxed),
            Ok(LoadOutcome::Replaced) => counters.replaced.fetch_add(1, Ordering::Relaxed),
            Err(error) => {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    %id,
                    "failed to load document"
                );
                counters.failed.fetch_add(1, Ordering::Relaxed)
            }
        };
    }
}

/// Writes a fresh document for `id`, overwriting an existing one.
pub async fn load_document(
    store: &SharedStore,
    id: DocId,
    rng: &mut SmallRng,
) -> StoreResult<LoadOutcome> {
    let key = id.key();
    let doc = keys::make_document(id, rng);

    match timed(format!("insert:{key}"), store.create(&key, &doc)).await {
        Ok(_) => Ok(LoadOutcome::Created),
        Err(StoreError::AlreadyExists { cas, .. }) => {
            tracing::trace!(%key, ?cas, "document exists, replacing");
            timed(
                format!("replace:{key}"),
                store.replace(&key, &doc, Cas::ANY),
            )
            .await?;
            Ok(LoadOutcome::Replaced)
        }
        Err(error) => Err(error),
    }
}
