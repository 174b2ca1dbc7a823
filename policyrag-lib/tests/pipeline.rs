//! End-to-end tests for ingestion and retrieval.
//!
//! Every test runs against a temporary corpus and store with the
//! deterministic hashing embedder, so no network or model download is needed.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use policyrag_lib::chunk::RecursiveChunker;
use policyrag_lib::embed::{Embedder, HashingEmbedder};
use policyrag_lib::ingest::Ingestor;
use policyrag_lib::search::{Retriever, NO_MATCH};
use policyrag_lib::store::{Manifest, PersistentStore};
use policyrag_lib::Error;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn embedder() -> Arc<dyn Embedder> {
    Arc::new(HashingEmbedder::default())
}

fn ingestor(store: &Path) -> Ingestor {
    Ingestor::new(embedder(), Box::new(RecursiveChunker::new(1000, 100).unwrap()), store)
}

fn corpus(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        fs::write(dir.path().join(name), content).unwrap();
    }
    dir
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn casual_leave_question_finds_casual_leave_policy() {
    let docs = corpus(&[
        ("casual.txt", "Casual leave: 12 days per year."),
        ("sick.txt", "Sick leave: 10 days per year."),
    ]);
    let store = tempfile::tempdir().unwrap();

    let report = ingestor(store.path()).ingest(docs.path()).await.unwrap();
    assert_eq!(report.documents, 2);
    assert_eq!(report.records, 2);

    let retriever = Retriever::new(embedder(), store.path());
    let context = retriever.retrieve("How many casual leaves do I get?", 1).await;

    assert!(context.contains("Casual leave: 12 days per year."));
    assert!(!context.contains("Sick leave"));
}

#[tokio::test]
async fn corrupt_file_is_skipped_and_others_are_indexed() {
    let docs = corpus(&[
        ("a-casual.txt", "Casual leave: 12 days per year."),
        ("c-sick.txt", "Sick leave: 10 days per year."),
    ]);
    fs::write(docs.path().join("b-broken.txt"), [0xff, 0xfe, 0xfd, 0x00, 0xc3]).unwrap();
    let store = tempfile::tempdir().unwrap();

    let report = ingestor(store.path()).ingest(docs.path()).await.unwrap();

    assert_eq!(report.documents, 2);
    assert_eq!(report.records, 2);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].path.ends_with("b-broken.txt"));

    let index = PersistentStore::open(store.path()).await.unwrap();
    let sources: Vec<_> = index
        .records()
        .iter()
        .map(|r| r.chunk.metadata.source_id.as_str())
        .collect();
    assert_eq!(sources, vec!["a-casual.txt", "c-sick.txt"]);
}

#[tokio::test]
async fn reingestion_replaces_instead_of_appending() {
    let docs = corpus(&[
        ("leave.md", "# Leave\n\n".repeat(300).as_str()),
        ("remote.txt", "Remote work is allowed two days per week with manager approval."),
    ]);
    let store = tempfile::tempdir().unwrap();
    let ingestor = ingestor(store.path());

    let first = ingestor.ingest(docs.path()).await.unwrap();
    let snapshot = PersistentStore::open(store.path()).await.unwrap().records().to_vec();

    let second = ingestor.ingest(docs.path()).await.unwrap();
    let reopened = PersistentStore::open(store.path()).await.unwrap();

    assert!(first.records > 2);
    assert_eq!(first, second);
    assert_eq!(reopened.records().len(), first.records);
    assert_eq!(reopened.records(), snapshot.as_slice());
}

#[tokio::test]
async fn empty_corpus_creates_no_store() {
    let docs = corpus(&[("notes.docx", "not eligible")]);
    let store = tempfile::tempdir().unwrap();
    let store_dir = store.path().join("vector_store");

    let report = ingestor(&store_dir).ingest(docs.path()).await.unwrap();

    assert_eq!(report.documents, 0);
    assert!(!report.committed());
    assert!(!store_dir.exists());

    let retriever = Retriever::new(embedder(), &store_dir);
    assert!(matches!(
        retriever.search("casual leave", 3).await,
        Err(Error::StoreNotFound(_))
    ));
}

#[tokio::test]
async fn missing_store_is_described_not_raised() {
    let store = tempfile::tempdir().unwrap();
    let retriever = Retriever::new(embedder(), store.path().join("missing"));

    let text = retriever.retrieve("casual leave", 3).await;

    assert!(text.starts_with("Error searching policy:"));
    assert!(text.contains("not found"));
    assert_ne!(text, NO_MATCH);
}

#[tokio::test]
async fn empty_store_returns_no_match_sentinel() {
    let store = tempfile::tempdir().unwrap();
    let model = HashingEmbedder::default();
    let mut index = PersistentStore::create_or_replace(
        store.path(),
        Manifest::new(model.model_name(), model.dimension(), 1000, 100),
    )
    .await
    .unwrap();
    index.commit().await.unwrap();
    drop(index);

    let retriever = Retriever::new(embedder(), store.path());
    assert_eq!(retriever.retrieve("How many casual leaves do I get?", 3).await, NO_MATCH);
}

#[tokio::test]
async fn ingestion_recovers_from_writer_killed_mid_run() {
    let docs = corpus(&[("casual.txt", "Casual leave: 12 days per year.")]);
    let store = tempfile::tempdir().unwrap();
    // what a killed ingestion leaves behind: the lock file, with no live holder
    fs::write(store.path().join(".ingest.lock"), "4194303\n").unwrap();

    let report = ingestor(store.path()).ingest(docs.path()).await.unwrap();

    assert_eq!(report.records, 1);
    assert!(PersistentStore::exists(store.path()));
}

#[tokio::test]
async fn missing_source_directory_is_an_error() {
    let store = tempfile::tempdir().unwrap();
    let err = ingestor(store.path())
        .ingest(store.path().join("no-such-dir"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Io(_)));
}

// ============================================================================
// Ranking properties
// ============================================================================

#[tokio::test]
async fn results_are_ordered_by_descending_score() {
    let docs = corpus(&[
        ("1.txt", "Employees get twelve days of casual leave each year."),
        ("2.txt", "Sick leave requires a medical certificate after two days."),
        ("3.txt", "Maternity leave is twenty six weeks."),
        ("4.txt", "Remote work needs approval from the manager."),
        ("5.txt", "Expense claims are reimbursed monthly."),
    ]);
    let store = tempfile::tempdir().unwrap();
    ingestor(store.path()).ingest(docs.path()).await.unwrap();

    let retriever = Retriever::new(embedder(), store.path());
    for query in ["casual leave", "how do I claim expenses", "leave days", "manager approval"] {
        for k in 1..=6 {
            let results = retriever.search(query, k).await.unwrap();
            assert!(results.len() <= k);
            assert!(
                results.windows(2).all(|w| w[0].score >= w[1].score),
                "unordered results for {query:?} k={k}"
            );
        }
    }
}

#[tokio::test]
async fn concurrent_queries_share_one_store() {
    let docs = corpus(&[
        ("casual.txt", "Casual leave: 12 days per year."),
        ("sick.txt", "Sick leave: 10 days per year."),
    ]);
    let store = tempfile::tempdir().unwrap();
    ingestor(store.path()).ingest(docs.path()).await.unwrap();

    let retriever = Retriever::new(embedder(), store.path());
    let mut handles = Vec::new();
    for i in 0..8 {
        let retriever = retriever.clone();
        handles.push(tokio::spawn(async move {
            let query = if i % 2 == 0 { "casual leave" } else { "sick leave" };
            (i, retriever.retrieve(query, 1).await)
        }));
    }

    for handle in handles {
        let (i, text) = handle.await.unwrap();
        let expected = if i % 2 == 0 { "Casual" } else { "Sick" };
        assert!(text.starts_with(expected), "query {i} got {text:?}");
    }
}
