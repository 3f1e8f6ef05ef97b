// File: src/learning.rs
//! Active-learning memory: definitions a user has confirmed, keyed by acronym
//! and an optional document fingerprint.

use crate::core::types::{Candidate, SourceKind};
use crate::error::{StoreError, StoreResult};
use crate::persistence::{self, LearnedRecord};
use chrono::Utc;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const SHARD_COUNT: usize = 16;
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);
/// Confirmed by a human: the highest confidence tier.
pub const CONFIRMED_CONFIDENCE: f64 = 1.0;

pub struct Confirmation {
    pub acronym: String,
    pub fingerprint: Option<String>,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RecordKey {
    acronym: String,
    fingerprint: Option<String>,
}

impl RecordKey {
    fn new(acronym: &str, fingerprint: Option<&str>) -> Self {
        Self {
            acronym: acronym.trim().to_string(),
            fingerprint: fingerprint.map(str::trim).filter(|f| !f.is_empty()).map(str::to_string),
        }
    }

    fn of(record: &LearnedRecord) -> Self {
        Self::new(&record.acronym, record.fingerprint.as_deref())
    }

    fn shard(&self) -> usize {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        (hasher.finish() as usize) % SHARD_COUNT
    }
}

type Shard = RwLock<HashMap<RecordKey, LearnedRecord>>;

/// Memory writes lock one shard, so unrelated keys never wait on each other
/// there. A file-backed write is journaled first and applied to memory only
/// once the line is on disk; its revision is taken under the journal lock,
/// so journal order, memory and replay agree on last-write-wins.
pub struct ActiveLearningStore {
    shards: Vec<Shard>,
    next_revision: AtomicU64,
    snapshot_path: Option<PathBuf>,
    journal: Option<Mutex<tokio::fs::File>>,
    /// One compaction at a time; confirmations never take it.
    flushing: Mutex<()>,
    write_timeout: Duration,
    closed: AtomicBool,
    load_issues: std::sync::Mutex<Vec<String>>,
}

impl ActiveLearningStore {
    pub fn in_memory() -> Self {
        Self::from_records(Vec::new(), None, None, Vec::new())
    }

    fn from_records(
        records: Vec<LearnedRecord>,
        snapshot_path: Option<PathBuf>,
        journal: Option<tokio::fs::File>,
        load_issues: Vec<String>,
    ) -> Self {
        let mut maps: Vec<HashMap<RecordKey, LearnedRecord>> = (0..SHARD_COUNT).map(|_| HashMap::new()).collect();
        let mut max_revision = 0;
        for record in records {
            max_revision = max_revision.max(record.revision);
            let key = RecordKey::of(&record);
            let map = &mut maps[key.shard()];
            match map.get(&key) {
                Some(existing) if existing.revision > record.revision => {}
                _ => {
                    map.insert(key, record);
                }
            }
        }
        Self {
            shards: maps.into_iter().map(RwLock::new).collect(),
            next_revision: AtomicU64::new(max_revision + 1),
            snapshot_path,
            journal: journal.map(Mutex::new),
            flushing: Mutex::new(()),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            closed: AtomicBool::new(false),
            load_issues: std::sync::Mutex::new(load_issues),
        }
    }

    /// Loads the snapshot at `path` and replays its journal. An unreadable
    /// snapshot is moved aside and the store starts without it; the problem
    /// is kept for [`take_load_issues`](Self::take_load_issues).
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let snapshot_path = path.as_ref().to_path_buf();
        let journal_path = persistence::journal_path(&snapshot_path);

        let load_path = snapshot_path.clone();
        let (records, issues) = tokio::task::spawn_blocking(move || load_all(&load_path))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))??;

        if let Some(parent) = journal_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let journal = OpenOptions::new().create(true).append(true).open(&journal_path).await?;

        info!(path = %snapshot_path.display(), records = records.len(), "active-learning store opened");
        Ok(Self::from_records(records, Some(snapshot_path), Some(journal), issues))
    }

    /// How long a confirmation may wait for the journal before it is
    /// dropped. A dropped confirmation leaves no trace in memory or on disk.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Problems found while loading; each is reported once.
    pub fn take_load_issues(&self) -> Vec<String> {
        self.load_issues.lock().map(|mut v| std::mem::take(&mut *v)).unwrap_or_default()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("store is closed".to_string()));
        }
        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> Option<LearnedRecord> {
        self.shards[key.shard()].read().await.get(key).cloned()
    }

    /// The confirmed definition for this fingerprint, else the one confirmed
    /// without a fingerprint.
    pub async fn lookup(&self, acronym: &str, fingerprint: Option<&str>) -> StoreResult<Option<Candidate>> {
        self.ensure_open()?;
        let scoped = RecordKey::new(acronym, fingerprint);
        let mut record = self.get(&scoped).await;
        if record.is_none() && scoped.fingerprint.is_some() {
            record = self.get(&RecordKey::new(acronym, None)).await;
        }
        Ok(record.and_then(|r| Candidate::new(&r.definition, SourceKind::ActiveLearning, CONFIRMED_CONFIDENCE)))
    }

    /// Stores the pick, overwriting any earlier one for the same key. With a
    /// backing file the line is journaled before memory changes, so an error
    /// or a timeout leaves the store as it was.
    pub async fn confirm(&self, confirmation: &Confirmation) -> StoreResult<LearnedRecord> {
        self.ensure_open()?;
        let key = RecordKey::new(&confirmation.acronym, confirmation.fingerprint.as_deref());
        if key.acronym.is_empty() {
            return Err(StoreError::Invalid("empty acronym".to_string()));
        }
        let definition = crate::core::types::collapse_whitespace(&confirmation.definition);
        if definition.is_empty() {
            return Err(StoreError::Invalid("empty definition".to_string()));
        }

        let Some(journal) = &self.journal else {
            let record = self.new_record(&key, definition);
            self.apply(key, record.clone()).await;
            return Ok(record);
        };

        let mut file = tokio::time::timeout(self.write_timeout, journal.lock())
            .await
            .map_err(|_| StoreError::Timeout(self.write_timeout))?;
        let record = self.new_record(&key, definition);
        let line = persistence::encode_journal_line(&record)?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        self.apply(key, record.clone()).await;
        drop(file);

        debug!(acronym = %record.acronym, revision = record.revision, "confirmation stored");
        Ok(record)
    }

    fn new_record(&self, key: &RecordKey, definition: String) -> LearnedRecord {
        LearnedRecord {
            acronym: key.acronym.clone(),
            fingerprint: key.fingerprint.clone(),
            definition,
            confirmed_at: Utc::now(),
            revision: self.next_revision.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// Inserts unless the key already holds a later revision.
    async fn apply(&self, key: RecordKey, record: LearnedRecord) {
        let mut shard = self.shards[key.shard()].write().await;
        match shard.get(&key) {
            Some(existing) if existing.revision > record.revision => {}
            _ => {
                shard.insert(key, record);
            }
        }
    }

    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.read().await.len();
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn records(&self) -> Vec<LearnedRecord> {
        let mut out = Vec::new();
        for shard in &self.shards {
            out.extend(shard.read().await.values().cloned());
        }
        out.sort_by_key(|r| r.revision);
        out
    }

    /// Writes a fresh snapshot and empties the journal. No-op in memory.
    ///
    /// The journal is held only while its lines move to the pending file;
    /// confirmations carry on while the snapshot is written. The pending
    /// file is removed once the snapshot holding its records is on disk.
    pub async fn flush(&self) -> StoreResult<()> {
        let (Some(path), Some(journal)) = (&self.snapshot_path, &self.journal) else {
            return Ok(());
        };
        let _flushing = self.flushing.lock().await;
        let journal_path = persistence::journal_path(path);
        let pending_path = persistence::pending_path(path);

        let records = {
            let mut file = journal.lock().await;
            file.flush().await?;
            let records = self.records().await;
            let lines = tokio::fs::read(&journal_path).await?;
            if !lines.is_empty() {
                let mut pending = OpenOptions::new().create(true).append(true).open(&pending_path).await?;
                pending.write_all(&lines).await?;
                pending.sync_all().await?;
                file.set_len(0).await?;
            }
            records
        };

        let count = records.len();
        let target = path.clone();
        tokio::task::spawn_blocking(move || persistence::save_snapshot(&records, &target))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        match tokio::fs::remove_file(&pending_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(path = %path.display(), records = count, "active-learning store flushed");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn hold_journal(&self) -> Option<tokio::sync::MutexGuard<'_, tokio::fs::File>> {
        match &self.journal {
            Some(journal) => Some(journal.lock().await),
            None => None,
        }
    }

    #[cfg(test)]
    pub(crate) async fn hold_shard(
        &self,
        acronym: &str,
        fingerprint: Option<&str>,
    ) -> tokio::sync::RwLockWriteGuard<'_, HashMap<RecordKey, LearnedRecord>> {
        self.shards[RecordKey::new(acronym, fingerprint).shard()].write().await
    }

    /// Flushes, then refuses further reads and writes.
    pub async fn close(&self) -> StoreResult<()> {
        let result = self.flush().await;
        self.closed.store(true, Ordering::Release);
        result
    }
}

fn load_all(snapshot: &Path) -> StoreResult<(Vec<LearnedRecord>, Vec<String>)> {
    let mut issues = Vec::new();
    let mut records = match persistence::load_snapshot(snapshot) {
        Ok(records) => records,
        Err(err @ (StoreError::Encode(_) | StoreError::Json(_))) => {
            warn!(path = %snapshot.display(), error = %err, "unreadable snapshot, starting without it");
            issues.push(format!("snapshot {}: {err}", snapshot.display()));
            if let Err(e) = persistence::quarantine(snapshot) {
                issues.push(format!("could not move snapshot aside: {e}"));
            }
            Vec::new()
        }
        Err(err) => return Err(err),
    };

    // lines from an interrupted flush, then everything confirmed since
    for journal in [persistence::pending_path(snapshot), persistence::journal_path(snapshot)] {
        let (replayed, corrupt) = persistence::replay_journal(&journal)?;
        if corrupt > 0 {
            warn!(path = %journal.display(), corrupt, "skipped unreadable journal lines");
            issues.push(format!("journal {}: {corrupt} unreadable line(s) skipped", journal.display()));
        }
        records.extend(replayed);
    }
    Ok((records, issues))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn confirmation(acronym: &str, fingerprint: Option<&str>, definition: &str) -> Confirmation {
        Confirmation {
            acronym: acronym.to_string(),
            fingerprint: fingerprint.map(str::to_string),
            definition: definition.to_string(),
        }
    }

    #[tokio::test]
    async fn confirmed_definition_comes_back_as_active_learning() {
        let store = ActiveLearningStore::in_memory();
        store.confirm(&confirmation("HTTP", Some("protocol|web"), "HyperText Transfer Protocol")).await.unwrap();

        let found = store.lookup("HTTP", Some("protocol|web")).await.unwrap().unwrap();
        assert_eq!(found.definition, "HyperText Transfer Protocol");
        assert!(found.has_source(SourceKind::ActiveLearning));
        assert_eq!(found.confidence, CONFIRMED_CONFIDENCE);
        assert!(store.lookup("HTTP", Some("biology|cell")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unscoped_record_backs_any_fingerprint() {
        let store = ActiveLearningStore::in_memory();
        store.confirm(&confirmation("SAR", None, "Synthetic Aperture Radar")).await.unwrap();
        store.confirm(&confirmation("SAR", Some("rescue|coast"), "Search and Rescue")).await.unwrap();

        let scoped = store.lookup("SAR", Some("rescue|coast")).await.unwrap().unwrap();
        assert_eq!(scoped.definition, "Search and Rescue");
        let other = store.lookup("SAR", Some("radar|orbit")).await.unwrap().unwrap();
        assert_eq!(other.definition, "Synthetic Aperture Radar");
    }

    #[tokio::test]
    async fn later_confirmation_overwrites() {
        let store = ActiveLearningStore::in_memory();
        store.confirm(&confirmation("RAM", None, "Radio Access Module")).await.unwrap();
        store.confirm(&confirmation("RAM", None, "Random Access Memory")).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.lookup("RAM", None).await.unwrap().unwrap().definition, "Random Access Memory");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_confirmations_for_same_key_keep_the_latest_revision() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned.bin");
        let store = Arc::new(ActiveLearningStore::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..24 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let written = store.confirm(&confirmation("RAM", Some("memory"), &format!("Definition {i}"))).await;
                written.unwrap()
            }));
        }
        let mut written = Vec::new();
        for handle in handles {
            written.push(handle.await.unwrap());
        }
        let last = written.iter().max_by_key(|r| r.revision).unwrap().definition.clone();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.lookup("RAM", Some("memory")).await.unwrap().unwrap().definition, last);
        drop(store);

        let reopened = ActiveLearningStore::open(&path).await.unwrap();
        assert_eq!(reopened.lookup("RAM", Some("memory")).await.unwrap().unwrap().definition, last);
    }

    #[tokio::test]
    async fn timed_out_confirmation_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned.bin");
        let store = ActiveLearningStore::open(&path).await.unwrap().with_write_timeout(Duration::from_millis(50));

        let held = store.hold_journal().await;
        let err = store.confirm(&confirmation("RAM", None, "Radio Access Module")).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        assert!(store.lookup("RAM", None).await.unwrap().is_none());
        drop(held);

        store.confirm(&confirmation("CPU", None, "Central Processing Unit")).await.unwrap();
        drop(store);
        let reopened = ActiveLearningStore::open(&path).await.unwrap();
        assert!(reopened.lookup("RAM", None).await.unwrap().is_none());
        assert_eq!(reopened.len().await, 1);
    }

    #[tokio::test]
    async fn interrupted_flush_is_replayed_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned.bin");
        let record = LearnedRecord {
            acronym: "SAR".to_string(),
            fingerprint: None,
            definition: "Synthetic Aperture Radar".to_string(),
            confirmed_at: Utc::now(),
            revision: 7,
        };
        std::fs::write(persistence::pending_path(&path), persistence::encode_journal_line(&record).unwrap()).unwrap();

        let store = ActiveLearningStore::open(&path).await.unwrap();
        assert_eq!(store.lookup("SAR", None).await.unwrap().unwrap().definition, "Synthetic Aperture Radar");
        let next = store.confirm(&confirmation("CPU", None, "Central Processing Unit")).await.unwrap();
        assert!(next.revision > 7);

        store.flush().await.unwrap();
        assert!(!persistence::pending_path(&path).exists());
        drop(store);
        assert_eq!(ActiveLearningStore::open(&path).await.unwrap().len().await, 2);
    }

    #[tokio::test]
    async fn blank_definitions_are_rejected() {
        let store = ActiveLearningStore::in_memory();
        let err = store.confirm(&confirmation("RAM", None, "   ")).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_confirmations_for_different_keys() {
        let store = Arc::new(ActiveLearningStore::in_memory());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let acronym = format!("AC{i}");
                store.confirm(&confirmation(&acronym, None, &format!("Definition {i}"))).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len().await, 32);
        assert_eq!(store.lookup("AC7", None).await.unwrap().unwrap().definition, "Definition 7");
    }

    #[tokio::test]
    async fn journal_survives_reopen_without_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned.bin");
        {
            let store = ActiveLearningStore::open(&path).await.unwrap();
            store.confirm(&confirmation("HTTP", None, "Hypertext Transport Program")).await.unwrap();
            store.confirm(&confirmation("HTTP", None, "HyperText Transfer Protocol")).await.unwrap();
        }
        let store = ActiveLearningStore::open(&path).await.unwrap();
        assert_eq!(store.lookup("HTTP", None).await.unwrap().unwrap().definition, "HyperText Transfer Protocol");
    }

    #[tokio::test]
    async fn flush_compacts_into_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned.bin");
        let store = ActiveLearningStore::open(&path).await.unwrap();
        store.confirm(&confirmation("RAM", Some("memory"), "Random Access Memory")).await.unwrap();
        store.flush().await.unwrap();

        assert!(path.exists());
        let journal = std::fs::metadata(persistence::journal_path(&path)).unwrap();
        assert_eq!(journal.len(), 0);

        store.confirm(&confirmation("CPU", None, "Central Processing Unit")).await.unwrap();
        drop(store);
        let reopened = ActiveLearningStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 2);
    }

    #[tokio::test]
    async fn corrupt_snapshot_degrades_to_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned.bin");
        std::fs::write(&path, b"\xff\xff\xff\xff\xff\xff\xff\xff\xff").unwrap();

        let store = ActiveLearningStore::open(&path).await.unwrap();
        assert!(store.lookup("RAM", None).await.unwrap().is_none());
        assert_eq!(store.take_load_issues().len(), 1);
        assert!(store.take_load_issues().is_empty());
        assert!(dir.path().join("learned.corrupt").exists());
    }

    #[tokio::test]
    async fn closed_store_is_unavailable() {
        let store = ActiveLearningStore::in_memory();
        store.close().await.unwrap();
        assert!(matches!(store.lookup("RAM", None).await, Err(StoreError::Unavailable(_))));
        assert!(store.confirm(&confirmation("RAM", None, "Random Access Memory")).await.is_err());
    }
}
