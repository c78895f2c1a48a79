//! The tracker: durable record of every document that has entered the pipeline.
//!
//! The tracker is the single source of truth for "have we already uploaded this" and "is this due
//! for deletion". It is loaded once at the start of a run, mutated in memory, and persisted at the
//! checkpoints the orchestrator chooses with [`TrackerStore::save`]. On disk it is one JSON object
//! keyed by identity:
//!
//! ```json
//! {
//!   "5f0c…": {
//!     "identity": "5f0c…",
//!     "status": "uploaded",
//!     "remote_document_id": "0b7e…",
//!     "uploaded_at": "2026-10-01T06:00:00Z",
//!     "source_account": "me@gmail.com",
//!     "title": "The Weekly"
//!   }
//! }
//! ```

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Ledger, TrackedDocument};

/// In-memory view of the tracker file.
#[derive(Debug)]
pub struct TrackerStore {
    path: PathBuf,
    documents: Ledger,
}

impl TrackerStore {
    /// Load the tracker at `path`.
    ///
    /// A missing file yields an empty tracker. A file that exists but cannot be decoded, or that
    /// decodes into records breaking the lifecycle invariants, is an error: prior history is never
    /// silently discarded.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no tracker file found, starting fresh");
                return Ok(TrackerStore {
                    path,
                    documents: Ledger::new(),
                });
            }
            Err(source) => return Err(Error::StateIo { path, source }),
        };

        let documents: Ledger = match serde_json::from_slice(&bytes) {
            Ok(documents) => documents,
            Err(source) => return Err(Error::CorruptState { path, source }),
        };

        for (key, doc) in &documents {
            if *key != doc.identity {
                return Err(Error::InvalidState {
                    path,
                    reason: format!("record under {} claims identity {}", key, doc.identity),
                });
            }
            if let Some(reason) = doc.inconsistency() {
                return Err(Error::InvalidState {
                    path,
                    reason: format!("record {}: {}", key, reason),
                });
            }
        }

        info!(path = %path.display(), documents = documents.len(), "loaded tracker");
        Ok(TrackerStore { path, documents })
    }

    /// Atomically persist the full current state.
    ///
    /// The new content is written to a temporary file next to the tracker, synced, and renamed
    /// over it, so the file on disk always holds either the previous or the new state in full.
    pub fn save(&self) -> Result<()> {
        self.write_atomically().map_err(|source| Error::StateIo {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), documents = self.documents.len(), "saved tracker");
        Ok(())
    }

    fn write_atomically(&self) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &self.documents)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Whether a record exists for `identity`.
    pub fn contains(&self, identity: &str) -> bool {
        self.documents.contains_key(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&TrackedDocument> {
        self.documents.get(identity)
    }

    /// Insert or replace the record for `doc.identity`.
    ///
    /// Durable after the next [`save`](Self::save).
    pub fn upsert(&mut self, doc: TrackedDocument) {
        self.documents.insert(doc.identity.clone(), doc);
    }

    /// Drop the record for `identity`. Durable after the next [`save`](Self::save).
    pub fn remove(&mut self, identity: &str) -> Option<TrackedDocument> {
        self.documents.remove(identity)
    }

    /// Record that the document for `identity` is no longer on the device.
    ///
    /// The record is kept as [`Status::Removed`](crate::types::Status::Removed) so its message
    /// is still recognised when fetched again. Returns whether a record existed.
    pub fn mark_removed(&mut self, identity: &str) -> bool {
        match self.documents.remove(identity) {
            Some(doc) => {
                self.upsert(doc.into_removed());
                true
            }
            None => false,
        }
    }

    /// All records, keyed by identity.
    pub fn documents(&self) -> &Ledger {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
