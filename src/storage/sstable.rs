//! On-disk SSTable: an immutable, sorted run of records produced by flushing
//! a memtable, read back via a memory-mapped binary-search range cursor.
//!
//! Wire format (all integers big-endian):
//!
//! ```text
//! record*  := key_len:u32 key value_len:i32 [value] timestamp:i64
//!             (value_len == -1 marks a tombstone; value is absent)
//! index    := offset:u64 (one per record, in file order == key order)
//! footer   := index_offset:u64   (byte offset where `index` begins)
//! ```
//!
//! The index lets a reader binary-search for the lower bound of a range
//! without scanning every record; the records themselves are read lazily
//! through the memory map as the cursor advances.

use crate::core::merge::RecordCursor;
use crate::core::record::Record;
use crate::infra::error::{LsmError, Result};
use memmap2::Mmap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const TOMBSTONE_MARKER: i32 = -1;

/// Writes a sequence of already-sorted, deduplicated records to a new
/// SSTable file. Written atomically: the file is built under a `.tmp`
/// name and renamed into place only once every byte has been synced.
pub struct SstableWriter {
    final_path: PathBuf,
    tmp_path: PathBuf,
}

impl SstableWriter {
    pub fn create(path: PathBuf) -> Result<Self> {
        let mut tmp_path = path.clone();
        tmp_path.set_extension("tmp");
        Ok(Self {
            final_path: path,
            tmp_path,
        })
    }

    /// Write `records` (already sorted ascending by key) and rename the
    /// result into place. Returns the final path on success.
    pub fn write_all(self, records: &[Record]) -> Result<PathBuf> {
        let file = File::create(&self.tmp_path)?;
        let mut writer = BufWriter::new(file);
        let mut offsets = Vec::with_capacity(records.len());
        let mut offset: u64 = 0;

        for record in records {
            offsets.push(offset);
            offset += write_record(&mut writer, record)? as u64;
        }

        let index_offset = offset;
        for off in &offsets {
            writer.write_all(&off.to_be_bytes())?;
        }
        writer.write_all(&index_offset.to_be_bytes())?;

        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);

        fs::rename(&self.tmp_path, &self.final_path).map_err(|e| {
            let _ = fs::remove_file(&self.tmp_path);
            LsmError::Io(e)
        })?;

        debug!(path = %self.final_path.display(), records = records.len(), "sstable written");
        Ok(self.final_path)
    }
}

fn write_record<W: Write>(writer: &mut W, record: &Record) -> Result<usize> {
    let mut written = 0usize;

    let key_len = record.key.len() as u32;
    writer.write_all(&key_len.to_be_bytes())?;
    writer.write_all(&record.key)?;
    written += 4 + record.key.len();

    match &record.value {
        Some(value) => {
            let value_len = value.len() as i32;
            writer.write_all(&value_len.to_be_bytes())?;
            writer.write_all(value)?;
            written += 4 + value.len();
        }
        None => {
            writer.write_all(&TOMBSTONE_MARKER.to_be_bytes())?;
            written += 4;
        }
    }

    writer.write_all(&record.timestamp.to_be_bytes())?;
    written += 8;

    Ok(written)
}

/// A memory-mapped, immutable SSTable opened for reads.
///
/// `generation` is the monotonically increasing index assigned at flush
/// time; higher generations are newer and win merge ties.
pub struct Sstable {
    mmap: Arc<Mmap>,
    index: Vec<u64>,
    path: PathBuf,
    generation: u64,
}

impl Sstable {
    pub fn open(path: PathBuf, generation: u64) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(&path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < 8 {
            return Err(LsmError::InvalidSstable(format!(
                "{}: file too short for footer",
                path.display()
            )));
        }
        let footer_at = mmap.len() - 8;
        let index_offset = read_u64(&mmap, footer_at)?;
        let index = read_index(&mmap, index_offset as usize, footer_at)?;

        Ok(Self {
            mmap: Arc::new(mmap),
            index,
            path,
            generation,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_count(&self) -> usize {
        self.index.len()
    }

    /// Binary-search the index for the first record with key >= `key`.
    fn lower_bound(&self, key: &[u8]) -> usize {
        self.index.partition_point(|&off| {
            match decode_record(&self.mmap, off as usize) {
                Ok((record, _)) => record.key.as_slice() < key,
                Err(_) => true,
            }
        })
    }

    /// Point lookup: the most recent record for `key`, if present.
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        let pos = self.lower_bound(key);
        match self.index.get(pos) {
            Some(&off) => {
                let (record, _) = decode_record(&self.mmap, off as usize)?;
                if record.key == key {
                    Ok(Some(record))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    /// A lazy cursor over `[from_key, to_key)`, reading records from the
    /// memory map on demand as `advance` is called. The first record (if
    /// any) is loaded eagerly so `peek` is valid immediately.
    pub fn range_cursor(&self, from_key: Option<&[u8]>, to_key: Option<&[u8]>) -> SstableCursor {
        let start = match from_key {
            Some(k) => self.lower_bound(k),
            None => 0,
        };
        let mut cursor = SstableCursor {
            mmap: Arc::clone(&self.mmap),
            index: self.index.clone(),
            pos: start,
            to_key: to_key.map(|k| k.to_vec()),
            peeked: None,
        };
        cursor.load_peek();
        cursor
    }
}

fn read_u64(bytes: &[u8], at: usize) -> Result<u64> {
    let slice = bytes.get(at..at + 8).ok_or_else(|| {
        LsmError::InvalidSstable("truncated footer".to_string())
    })?;
    Ok(u64::from_be_bytes(slice.try_into().unwrap()))
}

fn read_index(bytes: &[u8], index_start: usize, footer_at: usize) -> Result<Vec<u64>> {
    if index_start > footer_at || (footer_at - index_start) % 8 != 0 {
        return Err(LsmError::InvalidSstable("misaligned index".to_string()));
    }
    let mut out = Vec::with_capacity((footer_at - index_start) / 8);
    let mut pos = index_start;
    while pos < footer_at {
        out.push(read_u64(bytes, pos)?);
        pos += 8;
    }
    Ok(out)
}

/// Decode one record starting at `at`, returning it plus the offset just
/// past it (start of the next record).
fn decode_record(bytes: &[u8], at: usize) -> Result<(Record, usize)> {
    let key_len = read_u32(bytes, at)? as usize;
    let key_start = at + 4;
    let key_end = key_start + key_len;
    let key = bytes
        .get(key_start..key_end)
        .ok_or_else(|| LsmError::InvalidSstable("truncated key".to_string()))?
        .to_vec();

    let value_len = read_i32(bytes, key_end)?;
    let value_len_end = key_end + 4;

    let (value, after_value) = if value_len == TOMBSTONE_MARKER {
        (None, value_len_end)
    } else if value_len < 0 {
        return Err(LsmError::InvalidSstable(format!(
            "invalid value length {}",
            value_len
        )));
    } else {
        let value_start = value_len_end;
        let value_end = value_start + value_len as usize;
        let value = bytes
            .get(value_start..value_end)
            .ok_or_else(|| LsmError::InvalidSstable("truncated value".to_string()))?
            .to_vec();
        (Some(value), value_end)
    };

    let timestamp = read_i64(bytes, after_value)?;
    let next = after_value + 8;

    Ok((Record { key, value, timestamp }, next))
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32> {
    let slice = bytes
        .get(at..at + 4)
        .ok_or_else(|| LsmError::InvalidSstable("truncated record header".to_string()))?;
    Ok(u32::from_be_bytes(slice.try_into().unwrap()))
}

fn read_i32(bytes: &[u8], at: usize) -> Result<i32> {
    let slice = bytes
        .get(at..at + 4)
        .ok_or_else(|| LsmError::InvalidSstable("truncated record header".to_string()))?;
    Ok(i32::from_be_bytes(slice.try_into().unwrap()))
}

fn read_i64(bytes: &[u8], at: usize) -> Result<i64> {
    let slice = bytes
        .get(at..at + 8)
        .ok_or_else(|| LsmError::InvalidSstable("truncated timestamp".to_string()))?;
    Ok(i64::from_be_bytes(slice.try_into().unwrap()))
}

/// Lazy ascending cursor into a memory-mapped SSTable.
pub struct SstableCursor {
    mmap: Arc<Mmap>,
    index: Vec<u64>,
    pos: usize,
    to_key: Option<Vec<u8>>,
    peeked: Option<Record>,
}

impl SstableCursor {
    fn load_peek(&mut self) {
        if self.peeked.is_some() {
            return;
        }
        while let Some(&off) = self.index.get(self.pos) {
            match decode_record(&self.mmap, off as usize) {
                Ok((record, _)) => {
                    if let Some(to_key) = &self.to_key {
                        if record.key.as_slice() >= to_key.as_slice() {
                            self.pos = self.index.len();
                            return;
                        }
                    }
                    self.peeked = Some(record);
                    return;
                }
                Err(_) => {
                    // Corrupt trailing record: stop rather than return garbage.
                    self.pos = self.index.len();
                    return;
                }
            }
        }
    }
}

impl RecordCursor for SstableCursor {
    fn peek(&self) -> Option<&Record> {
        // `peek` is specified to not require mutation, but loading is
        // inherently lazy; callers always call it after `load_peek` runs
        // via `advance`, and we eagerly load on construction below.
        self.peeked.as_ref()
    }

    fn advance(&mut self) -> Option<Record> {
        self.load_peek();
        let record = self.peeked.take();
        if record.is_some() {
            self.pos += 1;
        }
        self.load_peek();
        record
    }
}
