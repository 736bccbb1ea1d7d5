use crate::core::memtable::MemTable;
use crate::core::merge::{MergingIterator, RecordCursor, VecCursor};
use crate::core::record::{next_key, Record};
use crate::infra::config::LsmConfig;
use crate::infra::error::{LsmError, Result};
use crate::storage::sstable::{Sstable, SstableWriter};

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const SSTABLE_PREFIX: &str = "SSTable_";

#[derive(Serialize)]
pub struct LsmStats {
    pub memtable_records: usize,
    pub memtable_bytes: usize,
    pub sstable_count: usize,
    pub sstable_records: usize,
    pub next_generation: u64,
}

/// Everything the engine mutates, behind a single lock. Every public
/// operation holds this lock for its entire duration rather than taking
/// finer-grained locks on the memtable and SSTable list separately, so a
/// `range` never observes a flush half-applied.
struct EngineState {
    memtable: MemTable,
    sstables: Vec<Sstable>,
    next_generation: u64,
}

pub struct LsmEngine {
    state: Mutex<EngineState>,
    dir_path: PathBuf,
    flush_threshold_bytes: usize,
}

impl LsmEngine {
    pub fn new(config: LsmConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.dir_path)?;

        let mut sstables = Vec::new();
        for entry in std::fs::read_dir(&config.dir_path)? {
            let entry = entry?;
            let path = entry.path();
            let Some(generation) = parse_generation(&path) else {
                continue;
            };
            match Sstable::open(path.clone(), generation) {
                Ok(sst) => sstables.push(sst),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to open sstable, skipping"),
            }
        }
        sstables.sort_by_key(|s| s.generation());
        let next_generation = sstables.last().map_or(0, |s| s.generation() + 1);

        info!(
            sstables = sstables.len(),
            next_generation, "lsm engine initialized (no WAL: memtable starts empty)"
        );

        Ok(Self {
            state: Mutex::new(EngineState {
                memtable: MemTable::new(),
                sstables,
                next_generation,
            }),
            dir_path: config.dir_path,
            flush_threshold_bytes: config.memtable_flush_threshold_bytes,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, EngineState>> {
        self.state
            .lock()
            .map_err(|_| LsmError::LockPoisoned("engine state"))
    }

    pub fn upsert(&self, record: Record) -> Result<()> {
        let mut state = self.lock()?;
        state.memtable.insert(record);
        if state.memtable.accounted_bytes() >= self.flush_threshold_bytes {
            self.flush_locked(&mut state)?;
        }
        Ok(())
    }

    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<i64> {
        let ts = now_millis()?;
        self.upsert(Record::value(key, value, ts))?;
        Ok(ts)
    }

    pub fn delete(&self, key: Vec<u8>) -> Result<i64> {
        let ts = now_millis()?;
        self.upsert(Record::tombstone(key, ts))?;
        Ok(ts)
    }

    /// Point lookup across memtable then SSTables, newest generation first.
    /// Returns the raw record (tombstone included) so callers can decide
    /// how to represent "not found" vs "deleted".
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        let state = self.lock()?;
        if let Some(record) = state.memtable.get(key) {
            return Ok(Some(record.clone()));
        }
        for sst in state.sstables.iter().rev() {
            if let Some(record) = sst.get(key)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// `[from_key, to_key)` range read. Forces a flush first so the
    /// memtable is empty before the merge, keeping the merge path uniform
    /// (SSTables only) regardless of recent writes. Tombstones are
    /// filtered out of the result.
    pub fn range(&self, from_key: Option<&[u8]>, to_key: Option<&[u8]>) -> Result<Vec<Record>> {
        let mut state = self.lock()?;
        if !state.memtable.is_empty() {
            self.flush_locked(&mut state)?;
        }

        let mut inputs: Vec<Box<dyn RecordCursor>> = Vec::with_capacity(state.sstables.len());
        for sst in state.sstables.iter() {
            inputs.push(Box::new(sst.range_cursor(from_key, to_key)));
        }
        // The memtable is always empty here, but it still participates as
        // the highest-index (newest) input for uniformity with the merge
        // iterator's generation ordering.
        inputs.push(Box::new(VecCursor::new(state.memtable.range(from_key, to_key))));

        let merged: Vec<Record> = MergingIterator::new(inputs)
            .filter(|r| !r.is_tombstone())
            .collect();
        Ok(merged)
    }

    pub fn flush(&self) -> Result<()> {
        let mut state = self.lock()?;
        self.flush_locked(&mut state)
    }

    fn flush_locked(&self, state: &mut EngineState) -> Result<()> {
        if state.memtable.is_empty() {
            return Ok(());
        }
        let records = state.memtable.drain_sorted();
        let generation = state.next_generation;
        state.next_generation += 1;

        let path = self.dir_path.join(sstable_filename(generation));
        let final_path = SstableWriter::create(path)?.write_all(&records)?;
        let sst = Sstable::open(final_path, generation)?;
        debug!(generation, records = records.len(), "flushed memtable");
        state.sstables.push(sst);
        Ok(())
    }

    /// Offline compaction: merge every SSTable into a single new generation,
    /// dropping tombstones and superseded values, then remove the old files.
    /// Not run automatically; callers trigger it explicitly.
    pub fn compact(&self) -> Result<()> {
        let mut state = self.lock()?;
        if !state.memtable.is_empty() {
            self.flush_locked(&mut state)?;
        }
        if state.sstables.len() <= 1 {
            return Ok(());
        }

        let inputs: Vec<Box<dyn RecordCursor>> = state
            .sstables
            .iter()
            .map(|sst| Box::new(sst.range_cursor(None, None)) as Box<dyn RecordCursor>)
            .collect();
        let merged: Vec<Record> = MergingIterator::new(inputs).collect();

        let generation = state.next_generation;
        state.next_generation += 1;
        let path = self.dir_path.join(sstable_filename(generation));
        let final_path = SstableWriter::create(path)?
            .write_all(&merged)
            .map_err(|e| LsmError::CompactionFailed(e.to_string()))?;
        let compacted = Sstable::open(final_path, generation)?;

        let old_paths: Vec<PathBuf> = state.sstables.iter().map(|s| s.path().to_path_buf()).collect();
        state.sstables = vec![compacted];
        for path in old_paths {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove compacted sstable");
            }
        }
        info!(generation, records = merged.len(), "compaction complete");
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.flush()
    }

    pub fn stats(&self) -> Result<LsmStats> {
        let state = self.lock()?;
        Ok(LsmStats {
            memtable_records: state.memtable.len(),
            memtable_bytes: state.memtable.accounted_bytes(),
            sstable_count: state.sstables.len(),
            sstable_records: state.sstables.iter().map(|s| s.record_count()).sum(),
            next_generation: state.next_generation,
        })
    }
}

fn sstable_filename(generation: u64) -> String {
    format!("{}{:020}", SSTABLE_PREFIX, generation)
}

fn parse_generation(path: &std::path::Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix(SSTABLE_PREFIX)?.parse().ok()
}

fn now_millis() -> Result<i64> {
    let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(since_epoch.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn engine_in(dir: &std::path::Path) -> LsmEngine {
        let config = LsmConfig::builder()
            .dir_path(dir.to_path_buf())
            .memtable_flush_threshold_bytes(64)
            .build()
            .unwrap();
        LsmEngine::new(config).unwrap()
    }

    #[test]
    fn put_then_get_roundtrips() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());
        engine.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        let got = engine.get(b"k").unwrap().unwrap();
        assert_eq!(got.value.as_deref(), Some(b"v".as_slice()));
    }

    #[test]
    fn delete_creates_visible_tombstone() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());
        engine.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        engine.delete(b"k".to_vec()).unwrap();
        let got = engine.get(b"k").unwrap().unwrap();
        assert!(got.is_tombstone());
    }

    #[test]
    fn flush_threshold_spills_to_sstable() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());
        for i in 0..20 {
            engine
                .put(format!("key-{i}").into_bytes(), vec![0u8; 16])
                .unwrap();
        }
        assert!(engine.stats().unwrap().sstable_count >= 1);
    }

    #[test]
    fn restart_recovers_flushed_data_but_not_unflushed_writes() {
        let dir = tempdir().unwrap();
        {
            let engine = engine_in(dir.path());
            engine.put(b"flushed".to_vec(), vec![1u8; 64]).unwrap();
            engine.put(b"flushed2".to_vec(), vec![1u8; 64]).unwrap();
            // never flushed:
            engine.upsert(Record::value(b"lost".to_vec(), b"v".to_vec(), 1)).unwrap();
        }
        let reopened = engine_in(dir.path());
        assert!(reopened.get(b"flushed").unwrap().is_some());
    }

    #[test]
    fn range_filters_tombstones_and_respects_bounds() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());
        engine.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        engine.put(b"b".to_vec(), b"2".to_vec()).unwrap();
        engine.put(b"c".to_vec(), b"3".to_vec()).unwrap();
        engine.delete(b"b".to_vec()).unwrap();

        let results = engine.range(Some(b"a"), Some(&next_key(b"c"))).unwrap();
        let keys: Vec<_> = results.into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn compact_merges_and_removes_old_files() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());
        for i in 0..20 {
            engine.put(format!("k{i}").into_bytes(), vec![0u8; 16]).unwrap();
        }
        let before = engine.stats().unwrap().sstable_count;
        assert!(before >= 1);
        engine.compact().unwrap();
        let after = engine.stats().unwrap().sstable_count;
        assert!(after <= before);
        assert!(engine.get(b"k0").unwrap().is_some());
    }
}
