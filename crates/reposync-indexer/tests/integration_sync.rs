//! Integration tests for the commit-keyed sync engine.

use async_trait::async_trait;
use parking_lot::Mutex;
use reposync_core::{Commit, Diff};
use reposync_indexer::chunking::{stable_chunk_id, FnCounter};
use reposync_indexer::storage::CollectionInfo;
use reposync_indexer::{
    Chunker, HashingEmbedder, IndexerError, LocalStore, MemoryStore, Metadata, QueryHit, Record,
    SyncEngine, SyncOptions, SyncOutcome, Vcs, VectorStore, Where,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

/// VCS fake with a settable HEAD and canned diffs.
struct ScriptedVcs {
    head: Mutex<Commit>,
    diffs: Mutex<HashMap<(String, String), Diff>>,
}

impl ScriptedVcs {
    fn new(head: &str) -> Self {
        Self {
            head: Mutex::new(Commit::new(head, format!("commit {}", head))),
            diffs: Mutex::new(HashMap::new()),
        }
    }

    fn commit(&self, id: &str, diff: Diff) {
        let previous = std::mem::replace(
            &mut *self.head.lock(),
            Commit::new(id, format!("commit {}", id)),
        );
        self.diffs
            .lock()
            .insert((previous.id, id.to_string()), diff);
    }

    /// Move HEAD without recording a diff, as `git checkout` would.
    fn checkout(&self, id: &str) {
        *self.head.lock() = Commit::new(id, format!("commit {}", id));
    }
}

#[async_trait]
impl Vcs for ScriptedVcs {
    async fn head(&self) -> Result<Commit, IndexerError> {
        Ok(self.head.lock().clone())
    }

    async fn diff(&self, old: &str, new: &str) -> Result<Diff, IndexerError> {
        self.diffs
            .lock()
            .get(&(old.to_string(), new.to_string()))
            .cloned()
            .ok_or_else(|| IndexerError::Vcs(format!("no diff {}..{}", old, new)))
    }
}

/// Memory store that counts mutating calls and can fail an upcoming `add`.
struct CountingStore {
    inner: MemoryStore,
    writes: AtomicUsize,
    adds_before_failure: Mutex<Option<usize>>,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(Arc::new(HashingEmbedder::new(32))),
            writes: AtomicUsize::new(0),
            adds_before_failure: Mutex::new(None),
        }
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Let `n` more adds succeed, then fail exactly one.
    fn fail_after_adds(&self, n: usize) {
        *self.adds_before_failure.lock() = Some(n);
    }

    fn write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorStore for CountingStore {
    async fn create_collection(&self, name: &str) -> Result<(), IndexerError> {
        self.write();
        self.inner.create_collection(name).await
    }

    async fn get_or_create_collection(&self, name: &str) -> Result<CollectionInfo, IndexerError> {
        if !self.inner.has_collection(name).await? {
            self.write();
        }
        self.inner.get_or_create_collection(name).await
    }

    async fn get_collection(&self, name: &str) -> Result<CollectionInfo, IndexerError> {
        self.inner.get_collection(name).await
    }

    async fn fork(&self, source: &str, target: &str) -> Result<(), IndexerError> {
        self.write();
        self.inner.fork(source, target).await
    }

    async fn add(&self, collection: &str, records: Vec<Record>) -> Result<(), IndexerError> {
        {
            let mut remaining = self.adds_before_failure.lock();
            match remaining.as_mut() {
                Some(0) => {
                    *remaining = None;
                    return Err(IndexerError::Storage("injected failure".into()));
                }
                Some(n) => *n -= 1,
                None => {}
            }
        }
        self.write();
        self.inner.add(collection, records).await
    }

    async fn update(
        &self,
        collection: &str,
        ids: &[String],
        metadatas: Vec<Metadata>,
    ) -> Result<(), IndexerError> {
        self.write();
        self.inner.update(collection, ids, metadatas).await
    }

    async fn delete(&self, collection: &str, filter: &Where) -> Result<usize, IndexerError> {
        self.write();
        self.inner.delete(collection, filter).await
    }

    async fn get(
        &self,
        collection: &str,
        filter: Option<&Where>,
    ) -> Result<Vec<Record>, IndexerError> {
        self.inner.get(collection, filter).await
    }

    async fn query(
        &self,
        collection: &str,
        text: &str,
        n_results: usize,
        filter: Option<&Where>,
    ) -> Result<Vec<QueryHit>, IndexerError> {
        self.inner.query(collection, text, n_results, filter).await
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexerError> {
        self.inner.list_collections().await
    }

    async fn flush(&self, collection: &str) -> Result<(), IndexerError> {
        self.inner.flush(collection).await
    }
}

/// Whitespace-word counter so tests need no tokenizer data.
fn chunker() -> Chunker {
    let counter = FnCounter(|text: &str| {
        if text == "\n" {
            1
        } else {
            text.split_whitespace().count()
        }
    });
    Chunker::new(Arc::new(counter), 40)
}

/// A 40-line TypeScript file with two functions; `extra` lines grow `alpha`.
fn a_ts(extra: usize) -> String {
    let mut lines = vec!["import { log } from './log';".to_string(), String::new()];
    lines.push("export function alpha(x: number) {".to_string());
    lines.push("  let total = 0;".to_string());
    for i in 0..(13 + extra) {
        lines.push(format!("  total += x * {};", i));
    }
    lines.push("  return total;".to_string());
    lines.push("}".to_string());
    lines.push(String::new());
    lines.push("export function beta(y: number) {".to_string());
    for i in 0..15 {
        lines.push(format!("  log('beta step {}', y);", i));
    }
    lines.push("  return y;".to_string());
    lines.push("}".to_string());
    lines.push(String::new());
    lines.push("export const VERSION = 1;".to_string());
    lines.join("\n") + "\n"
}

const B_TS: &str = "export class Cache {\n  get(key: string) {\n    return key;\n  }\n}\n";

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn create_repo() -> TempDir {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write(root, ".gitignore", "dist/\n*.log\n");
    write(root, "a.ts", &a_ts(0));
    write(root, "b.ts", B_TS);
    write(root, "README.md", "# Demo\n");
    write(root, "dist/bundle.ts", "export function built() {}\n");
    write(root, ".git/hooks/pre-commit.ts", "function hook() {}\n");
    temp
}

fn engine(root: &Path, vcs: &Arc<ScriptedVcs>, store: Arc<dyn VectorStore>, batch_size: usize) -> SyncEngine {
    let options = SyncOptions {
        batch_size,
        ..Default::default()
    };
    SyncEngine::new(root, vcs.clone(), store, chunker(), options).unwrap()
}

async fn paths_in(store: &dyn VectorStore, collection: &str) -> Vec<String> {
    let mut paths: Vec<String> = store
        .get(collection, None)
        .await
        .unwrap()
        .iter()
        .map(|r| r.metadata["filePath"].as_str().unwrap().to_string())
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

async fn records_for(store: &dyn VectorStore, collection: &str, path: &str) -> Vec<Record> {
    let mut records = store
        .get(collection, Some(&Where::eq("filePath", path)))
        .await
        .unwrap();
    records.sort_by(|a, b| a.id.cmp(&b.id));
    records
}

#[tokio::test]
async fn test_first_sync_indexes_everything() {
    let repo = create_repo();
    let vcs = Arc::new(ScriptedVcs::new("c1"));
    let store = Arc::new(CountingStore::new());
    let engine = engine(repo.path(), &vcs, store.clone(), 3);

    let report = engine.sync().await.unwrap();

    assert_eq!(report.commit, "c1");
    assert_eq!(report.collection, "c1");
    let expected_chunks = chunker().chunk_source("a.ts", &a_ts(0)).unwrap().len()
        + chunker().chunk_source("b.ts", B_TS).unwrap().len();
    assert_eq!(
        report.outcome,
        SyncOutcome::FullIndex {
            files: 2,
            chunks: expected_chunks,
        }
    );

    assert_eq!(paths_in(store.as_ref(), "c1").await, vec!["a.ts", "b.ts"]);
    assert_eq!(
        store.get_collection("c1").await.unwrap().count,
        expected_chunks
    );

    let latest = store
        .get("commits", Some(&Where::eq("isLatest", true)))
        .await
        .unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id, "c1");
    assert_eq!(latest[0].document, "commit c1");
}

#[tokio::test]
async fn test_second_sync_without_changes_does_nothing() {
    let repo = create_repo();
    let vcs = Arc::new(ScriptedVcs::new("c1"));
    let store = Arc::new(CountingStore::new());
    let engine = engine(repo.path(), &vcs, store.clone(), 100);

    engine.sync().await.unwrap();
    let writes = store.writes();

    let report = engine.sync().await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::UpToDate);
    assert_eq!(report.collection, "c1");
    assert_eq!(store.writes(), writes);
}

#[tokio::test]
async fn test_modified_file_is_replaced_in_fork() {
    let repo = create_repo();
    let vcs = Arc::new(ScriptedVcs::new("c1"));
    let store = Arc::new(CountingStore::new());
    let engine = engine(repo.path(), &vcs, store.clone(), 4);
    engine.sync().await.unwrap();

    let b_before = records_for(store.as_ref(), "c1", "b.ts").await;
    let c1_count = store.get_collection("c1").await.unwrap().count;

    write(repo.path(), "a.ts", &a_ts(6));
    vcs.commit(
        "c2",
        Diff {
            modified: vec!["a.ts".into()],
            ..Default::default()
        },
    );

    let report = engine.sync().await.unwrap();

    let old_a = chunker().chunk_source("a.ts", &a_ts(0)).unwrap().len();
    let new_a = chunker().chunk_for_commit("c2", "a.ts", &a_ts(6)).unwrap();
    assert_eq!(
        report.outcome,
        SyncOutcome::DeltaIndex {
            added: 0,
            modified: 1,
            deleted: 0,
            chunks_removed: old_a,
            chunks_added: new_a.len(),
        }
    );

    // b.ts survives the fork untouched, ids included.
    assert_eq!(records_for(store.as_ref(), "c2", "b.ts").await, b_before);

    // a.ts holds exactly the re-chunked content under c2's ids.
    let a_after = records_for(store.as_ref(), "c2", "a.ts").await;
    let mut expected_ids: Vec<String> = new_a.iter().map(|c| c.id.clone()).collect();
    expected_ids.sort();
    let ids: Vec<String> = a_after.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, expected_ids);
    assert!(a_after
        .iter()
        .any(|r| r.document.contains("total += x * 18;")));

    // The previous snapshot is left alone.
    assert_eq!(store.get_collection("c1").await.unwrap().count, c1_count);

    let history = engine.commit_log().history().await.unwrap();
    let flags: Vec<(&str, bool)> = history
        .iter()
        .map(|p| (p.commit_id.as_str(), p.is_latest))
        .collect();
    assert_eq!(flags, vec![("c2", true), ("c1", false)]);
}

#[tokio::test]
async fn test_returning_to_indexed_commit_leaves_its_snapshot_alone() {
    let repo = create_repo();
    let vcs = Arc::new(ScriptedVcs::new("c1"));
    let store = Arc::new(CountingStore::new());
    let engine = engine(repo.path(), &vcs, store.clone(), 4);
    engine.sync().await.unwrap();
    let c1_records = store.get("c1", None).await.unwrap();

    write(repo.path(), "a.ts", &a_ts(6));
    vcs.commit(
        "c2",
        Diff {
            modified: vec!["a.ts".into()],
            ..Default::default()
        },
    );
    engine.sync().await.unwrap();
    let c2_records = store.get("c2", None).await.unwrap();

    // Back to c1 with a dirty working tree.
    write(repo.path(), "a.ts", &a_ts(9));
    vcs.checkout("c1");
    let writes = store.writes();

    let report = engine.sync().await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Restored);
    assert_eq!(report.collection, "c1");
    // Only the pointer upsert.
    assert_eq!(store.writes(), writes + 1);
    assert_eq!(store.get("c1", None).await.unwrap(), c1_records);
    assert_eq!(store.get("c2", None).await.unwrap(), c2_records);

    let latest = engine.commit_log().latest().await.unwrap().unwrap();
    assert_eq!(latest.commit_id, "c1");
    let flagged = store
        .get("commits", Some(&Where::eq("isLatest", true)))
        .await
        .unwrap();
    assert_eq!(flagged.len(), 1);

    // And forward again to c2.
    vcs.checkout("c2");
    let report = engine.sync().await.unwrap();
    assert_eq!(report.outcome, SyncOutcome::Restored);
    assert_eq!(store.get("c2", None).await.unwrap(), c2_records);
    assert_eq!(
        engine.commit_log().latest().await.unwrap().unwrap().commit_id,
        "c2"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinked_files_are_skipped_in_full_and_delta() {
    let repo = create_repo();
    std::os::unix::fs::symlink("b.ts", repo.path().join("first-link.ts")).unwrap();

    let vcs = Arc::new(ScriptedVcs::new("c1"));
    let store = Arc::new(CountingStore::new());
    let engine = engine(repo.path(), &vcs, store.clone(), 100);
    engine.sync().await.unwrap();
    assert_eq!(paths_in(store.as_ref(), "c1").await, vec!["a.ts", "b.ts"]);

    std::os::unix::fs::symlink("b.ts", repo.path().join("link.ts")).unwrap();
    vcs.commit(
        "c2",
        Diff {
            added: vec!["link.ts".into()],
            modified: vec!["first-link.ts".into()],
            ..Default::default()
        },
    );

    let report = engine.sync().await.unwrap();
    assert!(matches!(
        report.outcome,
        SyncOutcome::DeltaIndex { chunks_added: 0, .. }
    ));
    assert_eq!(paths_in(store.as_ref(), "c2").await, vec!["a.ts", "b.ts"]);
}

#[tokio::test]
async fn test_rename_delete_and_filtered_additions() {
    let repo = create_repo();
    let vcs = Arc::new(ScriptedVcs::new("c1"));
    let store = Arc::new(CountingStore::new());
    let engine = engine(repo.path(), &vcs, store.clone(), 100);
    engine.sync().await.unwrap();

    write(repo.path(), "lib/cache.ts", B_TS);
    std::fs::remove_file(repo.path().join("b.ts")).unwrap();
    write(repo.path(), "dist/extra.ts", "export function extra() {}\n");
    std::fs::remove_file(repo.path().join("a.ts")).unwrap();

    vcs.commit(
        "c2",
        Diff {
            added: vec![
                "lib/cache.ts".into(),
                "dist/extra.ts".into(),
                "gone.ts".into(),
            ],
            modified: vec![],
            deleted: vec!["b.ts".into(), "a.ts".into()],
        },
    );

    let report = engine.sync().await.unwrap();

    match report.outcome {
        SyncOutcome::DeltaIndex {
            added, deleted, ..
        } => {
            assert_eq!(added, 3);
            assert_eq!(deleted, 2);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(paths_in(store.as_ref(), "c2").await, vec!["lib/cache.ts"]);

    let cache = records_for(store.as_ref(), "c2", "lib/cache.ts").await;
    assert_eq!(cache.len(), 1);
    assert_eq!(cache[0].id, stable_chunk_id("c2", "lib/cache.ts", 0));
    assert_eq!(cache[0].metadata["symbol"], "Cache".into());
}

#[tokio::test]
async fn test_retry_after_failed_delta_converges() {
    let repo = create_repo();
    let vcs = Arc::new(ScriptedVcs::new("c1"));
    let store = Arc::new(CountingStore::new());
    let engine = engine(repo.path(), &vcs, store.clone(), 2);
    engine.sync().await.unwrap();

    write(repo.path(), "a.ts", &a_ts(10));
    vcs.commit(
        "c2",
        Diff {
            modified: vec!["a.ts".into()],
            ..Default::default()
        },
    );

    // Two batches land, the third fails mid-way through a.ts.
    store.fail_after_adds(2);
    let err = engine.sync().await.unwrap_err();
    assert!(matches!(err, IndexerError::Storage(_)));

    let latest = engine.commit_log().latest().await.unwrap().unwrap();
    assert_eq!(latest.commit_id, "c1");
    assert!(store.has_collection("c2").await.unwrap());

    let report = engine.sync().await.unwrap();
    assert!(matches!(report.outcome, SyncOutcome::DeltaIndex { .. }));

    let expected = chunker().chunk_for_commit("c2", "a.ts", &a_ts(10)).unwrap();
    let a_after = records_for(store.as_ref(), "c2", "a.ts").await;
    assert_eq!(a_after.len(), expected.len());

    let b_count = records_for(store.as_ref(), "c2", "b.ts").await.len();
    assert_eq!(
        store.get_collection("c2").await.unwrap().count,
        expected.len() + b_count
    );

    let latest = engine.commit_log().latest().await.unwrap().unwrap();
    assert_eq!(latest.commit_id, "c2");
    let flagged = store
        .get("commits", Some(&Where::eq("isLatest", true)))
        .await
        .unwrap();
    assert_eq!(flagged.len(), 1);
}

#[tokio::test]
async fn test_retry_after_failed_full_index_converges() {
    let repo = create_repo();
    let vcs = Arc::new(ScriptedVcs::new("c1"));
    let store = Arc::new(CountingStore::new());
    let engine = engine(repo.path(), &vcs, store.clone(), 2);

    store.fail_after_adds(1);
    assert!(engine.sync().await.is_err());
    assert!(engine.commit_log().latest().await.unwrap().is_none());

    let report = engine.sync().await.unwrap();
    let SyncOutcome::FullIndex { chunks, .. } = report.outcome else {
        panic!("expected a full index");
    };
    assert_eq!(store.get_collection("c1").await.unwrap().count, chunks);
}

#[tokio::test]
async fn test_non_utf8_source_is_skipped() {
    let repo = create_repo();
    // Not valid UTF-8, so it can never be chunked.
    std::fs::write(repo.path().join("bad.ts"), [0xff, 0xfe, 0x00]).unwrap();

    let vcs = Arc::new(ScriptedVcs::new("c1"));
    let store: Arc<dyn VectorStore> = Arc::new(CountingStore::new());
    let engine = engine(repo.path(), &vcs, store.clone(), 100);

    let report = engine.sync().await.unwrap();
    assert!(matches!(report.outcome, SyncOutcome::FullIndex { files: 2, .. }));
    assert_eq!(paths_in(store.as_ref(), "c1").await, vec!["a.ts", "b.ts"]);
}

#[tokio::test]
async fn test_local_store_end_to_end() {
    let repo = create_repo();
    let store_dir = tempdir().unwrap();
    let vcs = Arc::new(ScriptedVcs::new("c1"));

    {
        let store: Arc<dyn VectorStore> = Arc::new(
            LocalStore::open(store_dir.path(), Arc::new(HashingEmbedder::default()))
                .await
                .unwrap(),
        );
        engine(repo.path(), &vcs, store, 5).sync().await.unwrap();
    }

    write(repo.path(), "c.ts", "export function gamma() {\n  return 3;\n}\n");
    vcs.commit(
        "c2",
        Diff {
            added: vec!["c.ts".into()],
            ..Default::default()
        },
    );

    let store: Arc<dyn VectorStore> = Arc::new(
        LocalStore::open(store_dir.path(), Arc::new(HashingEmbedder::default()))
            .await
            .unwrap(),
    );
    let engine = engine(repo.path(), &vcs, store.clone(), 5);
    let report = engine.sync().await.unwrap();
    assert_eq!(report.collection, "c2");

    assert_eq!(
        store.list_collections().await.unwrap(),
        vec!["c1", "c2", "commits"]
    );
    assert_eq!(paths_in(store.as_ref(), "c2").await, vec!["a.ts", "b.ts", "c.ts"]);

    let hits = store
        .query("c2", "gamma", 1, Some(&Where::eq("filePath", "c.ts")))
        .await
        .unwrap();
    assert_eq!(hits[0].record.metadata["symbol"], "gamma".into());
}
