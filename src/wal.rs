//! Write-ahead log for page delta-images (`spec.md` §4.3 "Borrow-mut
//! semantics" / §5 "WAL-record builder capable of batching up to K
//! delta-image pages per record").
//!
//! Adapted from the teacher's `src/wal.rs` `WalEntry { checksum }`
//! pattern: there, a `WalOperation` carries row-level inserts/deletes;
//! here, a [`WalRecordGroup`] carries whole-page delta images, because
//! this system logs at the page granularity its host's buffer manager
//! owns, not at the row granularity.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::error::RetrieverError;
use crate::page::PAGE_SIZE;

/// Maximum number of delta-image pages batched into one physical WAL
/// record (`spec.md` §5: "K ~ 4 in practice").
pub const MAX_PAGES_PER_RECORD: usize = 4;

/// One page's before-or-after image inside a WAL record group. This
/// crate always logs the *after* image (full-page), which is simpler
/// than a byte-range delta and, at 8 KiB pages, cheap enough for the
/// crash-recovery scenarios this system targets (`spec.md` §8 Scenario
/// D).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageImage {
    pub block: u32,
    pub bytes: Vec<u8>,
}

/// A batch of up to [`MAX_PAGES_PER_RECORD`] page images, logged and
/// recovered atomically (`spec.md` §4.3 "finalize each WAL chunk in
/// order").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalRecordGroup {
    pub sequence: u64,
    pub pages: Vec<PageImage>,
    pub timestamp: DateTime<Utc>,
    pub checksum: u32,
}

impl WalRecordGroup {
    fn new(sequence: u64, pages: Vec<PageImage>) -> Self {
        let timestamp = Utc::now();
        let mut group = WalRecordGroup {
            sequence,
            pages,
            timestamp,
            checksum: 0,
        };
        group.checksum = group.compute_checksum();
        group
    }

    fn compute_checksum(&self) -> u32 {
        let mut hasher = Hasher::new();
        let data = bincode::serialize(&(self.sequence, &self.pages, &self.timestamp)).unwrap_or_default();
        hasher.update(&data);
        hasher.finalize()
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.compute_checksum()
    }
}

/// Append-only WAL segment file plus a pending-group builder
/// (`spec.md` §4.3 "open a generic-WAL record chunk (batched in groups
/// of up to K pages per record)").
pub struct WalManager {
    path: PathBuf,
    writer: Arc<Mutex<Option<BufWriter<File>>>>,
    sequence: Arc<RwLock<u64>>,
    pending: Arc<Mutex<VecDeque<PageImage>>>,
}

impl WalManager {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RetrieverError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(WalManager {
            path,
            writer: Arc::new(Mutex::new(None)),
            sequence: Arc::new(RwLock::new(0)),
            pending: Arc::new(Mutex::new(VecDeque::new())),
        })
    }

    pub fn open(&self) -> Result<(), RetrieverError> {
        let exists_before_open = self.path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        *self.writer.lock().expect("wal writer lock poisoned") = Some(BufWriter::new(file));

        if exists_before_open {
            let last_seq = self.scan_last_sequence()?;
            *self.sequence.write().expect("wal sequence lock poisoned") = last_seq + 1;
        }
        Ok(())
    }

    /// `borrow_mut` registers a dirtied page here; it joins the pending
    /// batch for the in-flight insert (`spec.md` §4.3 step 3: "register
    /// the buffer as a delta-image page; add to extra-dirtied").
    pub fn stage_page(&self, block: u32, bytes: Vec<u8>) {
        self.pending
            .lock()
            .expect("wal pending lock poisoned")
            .push_back(PageImage { block, bytes });
    }

    /// Flush the currently staged pages as one or more
    /// [`WalRecordGroup`]s of at most [`MAX_PAGES_PER_RECORD`] pages
    /// each, in the order they were staged (`spec.md` §4.3
    /// "MUTATING -> COMMITTED: finalize WAL record groups").
    pub fn finish(&self) -> Result<Vec<WalRecordGroup>, RetrieverError> {
        let mut pending = self.pending.lock().expect("wal pending lock poisoned");
        let mut groups = Vec::new();
        while !pending.is_empty() {
            let chunk: Vec<PageImage> = pending.drain(..pending.len().min(MAX_PAGES_PER_RECORD)).collect();
            let sequence = {
                let mut seq = self.sequence.write().expect("wal sequence lock poisoned");
                let current = *seq;
                *seq += 1;
                current
            };
            let group = WalRecordGroup::new(sequence, chunk);
            self.append(&group)?;
            groups.push(group);
        }
        Ok(groups)
    }

    /// Discard staged pages without writing them (`spec.md` §4.3
    /// "Cancellation": "drops WAL record chunks without finishing
    /// them, discarding changes").
    pub fn discard(&self) {
        self.pending.lock().expect("wal pending lock poisoned").clear();
    }

    fn append(&self, group: &WalRecordGroup) -> Result<(), RetrieverError> {
        let mut guard = self.writer.lock().expect("wal writer lock poisoned");
        let writer = guard
            .as_mut()
            .ok_or_else(|| RetrieverError::WalFinishFailed("WAL not opened".into()))?;
        let encoded = bincode::serialize(group).map_err(|e| RetrieverError::WalFinishFailed(e.to_string()))?;
        writer.write_all(&(encoded.len() as u64).to_le_bytes())?;
        writer.write_all(&encoded)?;
        writer.flush()?;
        Ok(())
    }

    /// Replay every record group in the WAL file against `apply`,
    /// typically a callback that writes the page image straight into
    /// the page file (`spec.md` §8 Scenario D "On restart ... pages
    /// read back to their pre-insert contents" — replay is what
    /// restores the *post*-insert contents for a group that did
    /// finish; a group that never finished was never appended at all).
    pub fn replay(&self, mut apply: impl FnMut(&PageImage) -> Result<(), RetrieverError>) -> Result<(), RetrieverError> {
        if !self.path.exists() {
            return Ok(());
        }
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        loop {
            let mut len_bytes = [0u8; 8];
            if reader.read_exact(&mut len_bytes).is_err() {
                break;
            }
            let len = u64::from_le_bytes(len_bytes) as usize;
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf)?;
            let group: WalRecordGroup =
                bincode::deserialize(&buf).map_err(|e| RetrieverError::WalFinishFailed(e.to_string()))?;
            if !group.verify_checksum() {
                return Err(RetrieverError::WalFinishFailed(format!(
                    "checksum mismatch at sequence {}",
                    group.sequence
                )));
            }
            for page in &group.pages {
                debug_assert_eq!(page.bytes.len(), PAGE_SIZE);
                apply(page)?;
            }
        }
        Ok(())
    }

    fn scan_last_sequence(&self) -> Result<u64, RetrieverError> {
        let mut last = 0u64;
        self.replay_sequences(|seq| last = last.max(seq))?;
        Ok(last)
    }

    fn replay_sequences(&self, mut visit: impl FnMut(u64)) -> Result<(), RetrieverError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        loop {
            let mut len_bytes = [0u8; 8];
            if reader.read_exact(&mut len_bytes).is_err() {
                break;
            }
            let len = u64::from_le_bytes(len_bytes) as usize;
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf)?;
            if let Ok(group) = bincode::deserialize::<WalRecordGroup>(&buf) {
                visit(group.sequence);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_finish_round_trips_through_replay() {
        let dir = tempfile::tempdir().unwrap();
        let wal = WalManager::new(dir.path().join("wal.log")).unwrap();
        wal.open().unwrap();

        wal.stage_page(1, vec![0xAB; PAGE_SIZE]);
        wal.stage_page(2, vec![0xCD; PAGE_SIZE]);
        let groups = wal.finish().unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].verify_checksum());

        let mut seen = Vec::new();
        wal.replay(|page| {
            seen.push(page.block);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn discard_drops_staged_pages() {
        let dir = tempfile::tempdir().unwrap();
        let wal = WalManager::new(dir.path().join("wal.log")).unwrap();
        wal.open().unwrap();
        wal.stage_page(1, vec![0; PAGE_SIZE]);
        wal.discard();
        let groups = wal.finish().unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn batches_split_at_max_pages_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let wal = WalManager::new(dir.path().join("wal.log")).unwrap();
        wal.open().unwrap();
        for b in 0..(MAX_PAGES_PER_RECORD as u32 + 1) {
            wal.stage_page(b, vec![0; PAGE_SIZE]);
        }
        let groups = wal.finish().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].pages.len(), MAX_PAGES_PER_RECORD);
        assert_eq!(groups[1].pages.len(), 1);
    }
}
