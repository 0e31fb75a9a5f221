//! Blackbox tests for the bulk load phase.
//!
//! These drive [`docbench::load::load`] through a store that counts writes per key, asserting
//! that every id is picked up exactly once regardless of the number of workers.

use std::sync::Arc;

use docbench::keys::DocId;
use docbench::load::{LoadSummary, load};
use docbench_store::{InMemoryStore, SharedStore, Store};
use docbench_test::counting::CountingStore;

async fn load_counted(total: u64, workers: usize) -> (CountingStore<InMemoryStore>, LoadSummary) {
    let store = CountingStore::new(InMemoryStore::new());
    let shared: SharedStore = Arc::new(store.clone());
    let summary = load(shared, total, workers).await;
    (store, summary)
}

fn assert_each_id_once(store: &CountingStore<InMemoryStore>, total: u64) {
    for id in 0..total {
        assert_eq!(store.writes(&DocId(id).key()), 1, "id {id}");
    }
    assert_eq!(store.created_keys() as u64, total);
    assert_eq!(store.inner().len() as u64, total);
}

#[tokio::test]
async fn single_worker_loads_every_id_once() {
    docbench_test::tracing::init();

    let (store, summary) = load_counted(250, 1).await;
    assert_each_id_once(&store, 250);
    assert_eq!(summary.created, 250);
    assert_eq!(summary.attempted(), 250);
}

#[tokio::test]
async fn ten_workers_load_every_id_once() {
    let (store, summary) = load_counted(250, 10).await;
    assert_each_id_once(&store, 250);
    assert_eq!(summary.created, 250);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_worker_per_id_loads_every_id_once() {
    let (store, summary) = load_counted(64, 64).await;
    assert_each_id_once(&store, 64);
    assert_eq!(summary.created, 64);
}

#[tokio::test]
async fn more_workers_than_ids() {
    let (store, summary) = load_counted(3, 10).await;
    assert_each_id_once(&store, 3);
    assert_eq!(summary.attempted(), 3);
}

#[tokio::test]
async fn empty_id_space_loads_nothing() {
    let (store, summary) = load_counted(0, 4).await;
    assert_eq!(summary, LoadSummary::default());
    assert!(store.inner().is_empty());
}

#[tokio::test]
async fn second_load_replaces_all_documents() {
    let store = InMemoryStore::new();
    let shared: SharedStore = Arc::new(store.clone());

    let first = load(Arc::clone(&shared), 50, 5).await;
    assert_eq!(first.created, 50);
    let name_before = store.get(&DocId(42).key()).await.unwrap().name;

    let second = load(shared, 50, 5).await;
    assert_eq!(second.created, 0);
    assert_eq!(second.replaced, 50);
    assert_eq!(store.len(), 50);

    let doc = store.get(&DocId(42).key()).await.unwrap();
    assert_eq!(doc.email, DocId(42).email());
    assert_eq!(doc.name.len(), 20);
    // names are random, two 20-letter draws colliding would be a broken generator
    assert_ne!(doc.name, name_before);
}

#[tokio::test]
async fn failing_ids_are_skipped_and_counted() {
    let store = CountingStore::new(InMemoryStore::new());
    store.fail_key(DocId(3).key());
    store.fail_key(DocId(7).key());
    let shared: SharedStore = Arc::new(store.clone());

    let summary = load(shared, 10, 3).await;
    assert_eq!(summary.created, 8);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.attempted(), 10);
    assert_eq!(store.inner().len(), 8);
    assert_eq!(store.replaces(&DocId(3).key()), 0);
}
