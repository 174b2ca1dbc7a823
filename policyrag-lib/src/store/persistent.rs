//! On-disk vector index.
//!
//! A store location is a directory holding `index.json` (manifest plus all
//! records). Writers build the new index in memory and publish it with a
//! rename, so concurrent readers see either the old index or the new one.
//! An advisory lock on `.ingest.lock` keeps two writers off the same location.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::chunk::Chunk;
use crate::embed::Embedding;
use crate::store::{IndexRecord, MemoryStore, SearchResult, VectorStore};
use crate::{Error, Result};

pub const INDEX_FILE: &str = "index.json";
const TMP_FILE: &str = "index.json.tmp";
const LOCK_FILE: &str = ".ingest.lock";
const FORMAT_VERSION: u32 = 1;

/// Describes the embedding space and chunking a store was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    /// Embedding model identifier
    pub model: String,
    pub dimension: usize,
    pub record_count: usize,
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Manifest {
    pub fn new(
        model: impl Into<String>,
        dimension: usize,
        chunk_size: usize,
        overlap: usize,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            model: model.into(),
            dimension,
            record_count: 0,
            chunk_size,
            overlap,
        }
    }
}

#[derive(Deserialize)]
struct IndexFile {
    manifest: Manifest,
    records: Vec<IndexRecord>,
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    manifest: &'a Manifest,
    records: &'a [IndexRecord],
}

/// Exclusive writer claim on a store location.
///
/// Held as an OS advisory lock on `.ingest.lock`. The OS releases it when the
/// holding process exits, so a killed ingestion leaves only an unlocked file
/// behind and the next writer reclaims it. The file records the pid of the
/// last writer.
#[derive(Debug)]
struct WriteLock {
    file: File,
    path: PathBuf,
}

impl WriteLock {
    fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(Error::StoreLocked(dir.to_path_buf())),
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "acquired ingest lock");
        Ok(Self { file, path })
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %e, "failed to release ingest lock");
        }
    }
}

/// Vector index persisted in a directory.
///
/// Handles from [`open`](Self::open) are read-only snapshots. Handles from
/// [`create_or_replace`](Self::create_or_replace) start empty, hold the
/// location's write lock and replace the on-disk index on
/// [`commit`](Self::commit). Dropping a writer without committing leaves
/// the previous index untouched.
#[derive(Debug)]
pub struct PersistentStore {
    dir: PathBuf,
    manifest: Manifest,
    index: MemoryStore,
    lock: Option<WriteLock>,
}

impl PersistentStore {
    /// Open an existing store for reading.
    ///
    /// Fails with [`Error::StoreNotFound`] when nothing was ever committed at
    /// `dir`, and with [`Error::Store`] when the index file is malformed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let path = dir.join(INDEX_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::StoreNotFound(dir.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let file: IndexFile = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Store(format!("malformed index {}: {e}", path.display())))?;

        if file.manifest.record_count != file.records.len() {
            return Err(Error::Store(format!(
                "index {} declares {} records but holds {}",
                path.display(),
                file.manifest.record_count,
                file.records.len()
            )));
        }
        if let Some(bad) = file
            .records
            .iter()
            .find(|r| r.embedding.len() != file.manifest.dimension)
        {
            return Err(Error::Store(format!(
                "record {} has dimension {}, manifest says {}",
                bad.chunk.id,
                bad.embedding.len(),
                file.manifest.dimension
            )));
        }

        debug!(dir = %dir.display(), records = file.records.len(), "opened vector store");
        Ok(Self {
            dir: dir.to_path_buf(),
            manifest: file.manifest,
            index: MemoryStore::from_records(file.records)?,
            lock: None,
        })
    }

    /// Start a fresh index at `dir`, to replace any existing one on commit.
    ///
    /// Creates the directory if needed and takes the write lock; a second
    /// concurrent writer gets [`Error::StoreLocked`].
    pub async fn create_or_replace(dir: impl AsRef<Path>, manifest: Manifest) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let lock = WriteLock::acquire(dir)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            manifest: Manifest {
                record_count: 0,
                ..manifest
            },
            index: MemoryStore::new(),
            lock: Some(lock),
        })
    }

    /// Whether a committed index exists at `dir`.
    pub fn exists(dir: impl AsRef<Path>) -> bool {
        dir.as_ref().join(INDEX_FILE).is_file()
    }

    /// Atomically publish the in-memory records as the index at this location.
    pub async fn commit(&mut self) -> Result<()> {
        if self.lock.is_none() {
            return Err(Error::Store("store was opened read-only".to_string()));
        }

        self.manifest.record_count = self.index.len();
        let bytes = serde_json::to_vec(&IndexFileRef {
            manifest: &self.manifest,
            records: self.index.records(),
        })?;

        let tmp = self.dir.join(TMP_FILE);
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, self.dir.join(INDEX_FILE)).await?;

        info!(
            dir = %self.dir.display(),
            records = self.manifest.record_count,
            model = %self.manifest.model,
            "committed vector store"
        );
        Ok(())
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[IndexRecord] {
        self.index.records()
    }

    /// Reject a query embedder whose space differs from the one the index was built with.
    pub fn check_compatible(&self, model: &str, dimension: usize) -> Result<()> {
        if self.manifest.model != model || self.manifest.dimension != dimension {
            return Err(Error::EmbeddingMismatch(format!(
                "store was built with {} ({} dims) but queried with {} ({} dims); re-run ingestion",
                self.manifest.model, self.manifest.dimension, model, dimension
            )));
        }
        Ok(())
    }
}

impl VectorStore for PersistentStore {
    fn insert(&mut self, chunks: &[Chunk], embeddings: &[Embedding]) -> Result<()> {
        if self.lock.is_none() {
            return Err(Error::Store("store was opened read-only".to_string()));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.manifest.dimension) {
            return Err(Error::EmbeddingMismatch(format!(
                "embedding has dimension {}, manifest says {}",
                bad.len(),
                self.manifest.dimension
            )));
        }
        self.index.insert(chunks, embeddings)
    }

    fn search(&self, query_embedding: &Embedding, k: usize) -> Result<Vec<SearchResult>> {
        if query_embedding.len() != self.manifest.dimension {
            return Err(Error::EmbeddingMismatch(format!(
                "query has dimension {}, store holds dimension {}",
                query_embedding.len(),
                self.manifest.dimension
            )));
        }
        self.index.search(query_embedding, k)
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn clear(&mut self) {
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkMetadata;
    use pretty_assertions::assert_eq;

    fn chunk(id: &str, content: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: content.to_string(),
            metadata: ChunkMetadata {
                source_id: "policy.txt".into(),
                ..ChunkMetadata::default()
            },
        }
    }

    fn manifest() -> Manifest {
        Manifest::new("test-model", 2, 1000, 100)
    }

    #[tokio::test]
    async fn test_open_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        let err = PersistentStore::open(dir.path().join("never-created")).await.unwrap_err();
        assert!(matches!(err, Error::StoreNotFound(_)));

        // an existing but empty directory is not a store either
        let err = PersistentStore::open(dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::StoreNotFound(_)));
    }

    #[tokio::test]
    async fn test_commit_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PersistentStore::create_or_replace(dir.path(), manifest()).await.unwrap();
        store
            .insert(
                &[chunk("a", "Casual leave"), chunk("b", "Sick leave")],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .unwrap();
        store.commit().await.unwrap();
        drop(store);

        assert!(PersistentStore::exists(dir.path()));
        assert!(!dir.path().join(TMP_FILE).exists());

        let reopened = PersistentStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.manifest().record_count, 2);
        assert_eq!(reopened.manifest().model, "test-model");

        let results = reopened.search(&vec![1.0, 0.0], 1).unwrap();
        assert_eq!(results[0].chunk.content, "Casual leave");
    }

    #[tokio::test]
    async fn test_replace_discards_previous_records() {
        let dir = tempfile::tempdir().unwrap();
        for round in 0..2 {
            let mut store =
                PersistentStore::create_or_replace(dir.path(), manifest()).await.unwrap();
            store
                .insert(&[chunk("a", &format!("round {round}"))], &[vec![1.0, 0.0]])
                .unwrap();
            store.commit().await.unwrap();
        }

        let store = PersistentStore::open(dir.path()).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.search(&vec![1.0, 0.0], 5).unwrap()[0].chunk.content, "round 1");
    }

    #[tokio::test]
    async fn test_uncommitted_writer_leaves_index_intact() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PersistentStore::create_or_replace(dir.path(), manifest()).await.unwrap();
        store.insert(&[chunk("a", "kept")], &[vec![1.0, 0.0]]).unwrap();
        store.commit().await.unwrap();
        drop(store);

        {
            let mut writer =
                PersistentStore::create_or_replace(dir.path(), manifest()).await.unwrap();
            writer.insert(&[chunk("b", "abandoned")], &[vec![0.0, 1.0]]).unwrap();
        }

        let store = PersistentStore::open(dir.path()).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.index.records()[0].chunk.content, "kept");
    }

    #[tokio::test]
    async fn test_second_writer_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let first = PersistentStore::create_or_replace(dir.path(), manifest()).await.unwrap();

        let err = PersistentStore::create_or_replace(dir.path(), manifest()).await.unwrap_err();
        assert!(matches!(err, Error::StoreLocked(_)));

        drop(first);
        assert!(PersistentStore::create_or_replace(dir.path(), manifest()).await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_file_left_by_killed_writer_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PersistentStore::create_or_replace(dir.path(), manifest()).await.unwrap();
        store.insert(&[chunk("a", "kept")], &[vec![1.0, 0.0]]).unwrap();
        store.commit().await.unwrap();
        drop(store);

        // a killed process leaves its lock file on disk but the OS has dropped the lock
        std::fs::write(dir.path().join(LOCK_FILE), "4194303\n").unwrap();

        let mut writer = PersistentStore::create_or_replace(dir.path(), manifest()).await.unwrap();
        writer.insert(&[chunk("b", "replaced")], &[vec![0.0, 1.0]]).unwrap();
        writer.commit().await.unwrap();
        drop(writer);

        let pid = std::fs::read_to_string(dir.path().join(LOCK_FILE)).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());

        let store = PersistentStore::open(dir.path()).await.unwrap();
        assert_eq!(store.records()[0].chunk.content, "replaced");
    }

    #[tokio::test]
    async fn test_read_only_handle_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PersistentStore::create_or_replace(dir.path(), manifest()).await.unwrap();
        store.commit().await.unwrap();
        drop(store);

        let mut reader = PersistentStore::open(dir.path()).await.unwrap();
        assert!(reader.is_empty());
        assert!(matches!(
            reader.insert(&[chunk("a", "x")], &[vec![1.0, 0.0]]),
            Err(Error::Store(_))
        ));
        assert!(matches!(reader.commit().await, Err(Error::Store(_))));
    }

    #[tokio::test]
    async fn test_malformed_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), b"{ not json").unwrap();

        let err = PersistentStore::open(dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[tokio::test]
    async fn test_dimension_checks() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PersistentStore::create_or_replace(dir.path(), manifest()).await.unwrap();

        let err = store.insert(&[chunk("a", "x")], &[vec![1.0, 0.0, 0.0]]).unwrap_err();
        assert!(matches!(err, Error::EmbeddingMismatch(_)));

        let err = store.search(&vec![1.0], 1).unwrap_err();
        assert!(matches!(err, Error::EmbeddingMismatch(_)));

        assert!(store.check_compatible("test-model", 2).is_ok());
        assert!(matches!(
            store.check_compatible("other-model", 2),
            Err(Error::EmbeddingMismatch(_))
        ));
    }
}
