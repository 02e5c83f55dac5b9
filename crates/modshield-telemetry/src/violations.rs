//! Hash-chained violation log
//!
//! Violations are appended as JSON lines. Each record carries the SHA-256 of
//! its own content plus the previous record's hash, so any edit, insertion or
//! deletion in the middle of the file breaks the chain.

use modshield_core::{Error, Result, UserId, Violation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One line of the violation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// Unique record ID (`vio_<uuid>`)
    pub id: String,

    /// The recorded violation
    #[serde(flatten)]
    pub violation: Violation,

    /// Hash of the previous record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,

    /// Hash of this record
    pub hash: String,
}

impl ViolationRecord {
    fn chained(violation: Violation, previous_hash: Option<String>) -> Result<Self> {
        let id = format!("vio_{}", uuid::Uuid::new_v4());
        let hash = compute_hash(&id, &violation, previous_hash.as_deref())?;
        Ok(Self {
            id,
            violation,
            previous_hash,
            hash,
        })
    }
}

fn compute_hash(id: &str, violation: &Violation, previous_hash: Option<&str>) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(serde_json::to_vec(violation)?);
    if let Some(prev) = previous_hash {
        hasher.update(prev.as_bytes());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether `records` form an unbroken chain from the first record
pub fn verify_records(records: &[ViolationRecord]) -> bool {
    let mut previous: Option<&str> = None;
    for record in records {
        if record.previous_hash.as_deref() != previous {
            return false;
        }
        match compute_hash(&record.id, &record.violation, previous) {
            Ok(hash) if hash == record.hash => {}
            _ => return false,
        }
        previous = Some(&record.hash);
    }
    true
}

struct LogWriter {
    file: BufWriter<File>,
    last_hash: Option<String>,
    since_flush: usize,
}

/// Append-only violation log
pub struct ViolationLog {
    path: PathBuf,
    flush_interval: usize,
    writer: Mutex<LogWriter>,
}

impl ViolationLog {
    /// Open or create the log at `path`, continuing the existing chain
    pub fn open(path: impl Into<PathBuf>, flush_interval: usize) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let existing = Self::read_path(&path)?;
        let last_hash = existing.last().map(|r| r.hash.clone());
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), records = existing.len(), "Opened violation log");

        Ok(Self {
            path,
            flush_interval: flush_interval.max(1),
            writer: Mutex::new(LogWriter {
                file: BufWriter::new(file),
                last_hash,
                since_flush: 0,
            }),
        })
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a violation, chaining it to the previous record
    pub fn append(&self, violation: Violation) -> Result<ViolationRecord> {
        let mut writer = self.writer.lock();
        let record = ViolationRecord::chained(violation, writer.last_hash.clone())?;

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        writer.file.write_all(&line)?;
        writer.since_flush += 1;
        if writer.since_flush >= self.flush_interval {
            writer.file.flush()?;
            writer.since_flush = 0;
        }

        writer.last_hash = Some(record.hash.clone());
        debug!(id = %record.id, user = record.violation.user_id, "Violation appended");
        Ok(record)
    }

    /// Force buffered records to disk
    pub fn flush(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.file.flush()?;
        writer.since_flush = 0;
        Ok(())
    }

    /// Every record on disk, oldest first
    pub fn read_all(&self) -> Result<Vec<ViolationRecord>> {
        self.flush()?;
        Self::read_path(&self.path)
    }

    /// Records for one user, oldest first
    pub fn history(&self, user_id: UserId) -> Result<Vec<ViolationRecord>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.violation.user_id == user_id)
            .collect())
    }

    /// Whether the log on disk is an unbroken chain
    pub fn verify_chain(&self) -> Result<bool> {
        let records = self.read_all()?;
        let intact = verify_records(&records);
        if !intact {
            warn!(path = %self.path.display(), "Violation log chain is broken");
        }
        Ok(intact)
    }

    fn read_path(path: &Path) -> Result<Vec<ViolationRecord>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                Error::storage(format!(
                    "{}:{}: malformed violation record: {}",
                    path.display(),
                    number + 1,
                    e
                ))
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

impl Drop for ViolationLog {
    fn drop(&mut self) {
        if let Err(e) = self.writer.get_mut().file.flush() {
            warn!(error = %e, "Failed to flush violation log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modshield_core::Severity;
    use tempfile::TempDir;

    fn violation(user: UserId, severity: i64) -> Violation {
        Violation::new(user, Severity::clamped(severity), "harassment", Some("cat".into()), "test")
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let log = ViolationLog::open(dir.path().join("violations.jsonl"), 10).unwrap();

        let first = log.append(violation(1, 8)).unwrap();
        let second = log.append(violation(2, 3)).unwrap();

        assert!(first.id.starts_with("vio_"));
        assert_eq!(first.previous_hash, None);
        assert_eq!(second.previous_hash.as_deref(), Some(first.hash.as_str()));

        let records = log.read_all().unwrap();
        assert_eq!(records, vec![first, second]);
        assert!(log.verify_chain().unwrap());
        assert_eq!(log.history(2).unwrap().len(), 1);
    }

    #[test]
    fn test_chain_continues_after_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("violations.jsonl");

        let last = {
            let log = ViolationLog::open(&path, 1).unwrap();
            log.append(violation(1, 5)).unwrap()
        };

        let log = ViolationLog::open(&path, 1).unwrap();
        let next = log.append(violation(1, 6)).unwrap();
        assert_eq!(next.previous_hash, Some(last.hash));
        assert!(log.verify_chain().unwrap());
    }

    #[test]
    fn test_tampering_breaks_chain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("violations.jsonl");
        let log = ViolationLog::open(&path, 1).unwrap();
        for severity in [4, 5, 6] {
            log.append(violation(9, severity)).unwrap();
        }

        let mut records = log.read_all().unwrap();
        assert!(verify_records(&records));

        records[1].violation.severity = Severity::MIN;
        assert!(!verify_records(&records));

        let mut records = log.read_all().unwrap();
        records.remove(1);
        assert!(!verify_records(&records));
    }

    #[test]
    fn test_malformed_line_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("violations.jsonl");
        std::fs::write(&path, "{\"id\": 1}\n").unwrap();
        assert!(ViolationLog::open(&path, 1).is_err());
    }
}
