// File: src/persistence.rs
//! On-disk form of the active-learning store: a bincode snapshot written
//! atomically, plus a JSON-lines journal of confirmations made since.

use crate::error::StoreResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// One confirmed definition. `revision` orders writes to the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedRecord {
    pub acronym: String,
    pub fingerprint: Option<String>,
    pub definition: String,
    pub confirmed_at: DateTime<Utc>,
    pub revision: u64,
}

/// The serializable state of the store.
#[derive(Clone, Serialize, Deserialize)]
struct SerializableState {
    records: Vec<LearnedRecord>,
}

pub fn journal_path(snapshot: &Path) -> PathBuf {
    snapshot.with_extension("journal")
}

/// Journal lines handed over by a flush whose snapshot is not yet written.
pub fn pending_path(snapshot: &Path) -> PathBuf {
    snapshot.with_extension("journal.pending")
}

pub fn save_snapshot(records: &[LearnedRecord], path: &Path) -> StoreResult<()> {
    let parent_dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent_dir)?;

    let state = SerializableState { records: records.to_vec() };

    let temp_file = NamedTempFile::new_in(parent_dir)?;
    let mut writer = BufWriter::new(&temp_file);
    bincode::serialize_into(&mut writer, &state)?;
    writer.flush()?;
    drop(writer);

    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// A missing snapshot is an empty store, not an error.
pub fn load_snapshot(path: &Path) -> StoreResult<Vec<LearnedRecord>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let reader = BufReader::new(file);
    let state: SerializableState = bincode::deserialize_from(reader)?;
    Ok(state.records)
}

/// Moves an unreadable snapshot out of the way so the next flush cannot clobber it.
pub fn quarantine(path: &Path) -> StoreResult<PathBuf> {
    let target = path.with_extension("corrupt");
    fs::rename(path, &target)?;
    Ok(target)
}

pub fn encode_journal_line(record: &LearnedRecord) -> StoreResult<String> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}

/// Records in the journal, plus the number of lines that could not be parsed.
pub fn replay_journal(path: &Path) -> StoreResult<(Vec<LearnedRecord>, usize)> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e.into()),
    };
    let mut records = Vec::new();
    let mut corrupt = 0;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LearnedRecord>(&line) {
            Ok(record) => records.push(record),
            Err(_) => corrupt += 1,
        }
    }
    Ok((records, corrupt))
}
