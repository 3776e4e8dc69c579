use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tranche_core::error::LedgerError;
use tranche_core::operation::OperationReceipt;

/// A journaled operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// The validated operation, with the events it is about to emit
    pub receipt: OperationReceipt,

    /// Wall-clock time the entry was written (milliseconds)
    pub recorded_at: u64,
}

/// Upper bound on a single encoded entry
pub const MAX_FRAME_LEN: u64 = 16 * 1024 * 1024;

const LEN_PREFIX: u64 = 8;

/// Write-ahead log for ledger operations.
///
/// The ledger records each operation twice: once validated, before any state
/// is mutated, and once more in its final state. A validated entry with no
/// later committed entry of the same sequence never took effect.
pub trait LedgerJournal: Send {
    /// Append a receipt
    fn record(&self, receipt: &OperationReceipt) -> Result<(), LedgerError>;

    /// Iterate over all entries in write order
    fn iterate_entries(&self) -> Box<dyn Iterator<Item = Result<JournalEntry, LedgerError>> + '_>;

    /// Receipts of the operations that committed, in commit order
    fn committed_receipts(&self) -> Result<Vec<OperationReceipt>, LedgerError> {
        let mut committed = Vec::new();
        for entry in self.iterate_entries() {
            let entry = entry?;
            if entry.receipt.is_committed() {
                committed.push(entry.receipt);
            }
        }
        Ok(committed)
    }
}

fn current_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Encode `entry` as a little-endian length prefix followed by its bincode body
fn encode_frame(entry: &JournalEntry) -> Result<Vec<u8>, LedgerError> {
    let body = bincode::serialize(entry)?;
    let len = body.len() as u64;
    if len > MAX_FRAME_LEN {
        return Err(LedgerError::Journal(format!(
            "entry of {} bytes exceeds the {} byte frame limit",
            len, MAX_FRAME_LEN
        )));
    }
    let mut frame = Vec::with_capacity(LEN_PREFIX as usize + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// A file-based journal of length-prefixed bincode frames
pub struct FileJournal {
    path: Arc<Mutex<PathBuf>>,
    writer: Arc<Mutex<Option<BufWriter<File>>>>,
}

impl Default for FileJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl FileJournal {
    /// Create an unopened journal
    pub fn new() -> Self {
        Self {
            path: Arc::new(Mutex::new(PathBuf::new())),
            writer: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a journal and open `path` for appending
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let journal = Self::new();
        journal.init(path)?;
        Ok(journal)
    }

    /// Open (creating if needed) the journal file. Existing entries are kept.
    pub fn init(&self, path: &Path) -> Result<(), LedgerError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| LedgerError::Journal(format!("cannot open {}: {}", path.display(), e)))?;

        *lock(&self.writer)? = Some(BufWriter::new(file));
        *lock(&self.path)? = path.to_path_buf();

        log::debug!("journal opened at {}", path.display());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, LedgerError> {
    mutex
        .lock()
        .map_err(|e| LedgerError::Journal(format!("journal lock poisoned: {}", e)))
}

impl LedgerJournal for FileJournal {
    fn record(&self, receipt: &OperationReceipt) -> Result<(), LedgerError> {
        let frame = encode_frame(&JournalEntry {
            receipt: receipt.clone(),
            recorded_at: current_millis(),
        })?;

        let mut guard = lock(&self.writer)?;
        let writer = guard
            .as_mut()
            .ok_or_else(|| LedgerError::Journal("journal has not been opened".to_string()))?;
        writer.write_all(&frame)?;
        writer.flush()?;
        Ok(())
    }

    fn iterate_entries(&self) -> Box<dyn Iterator<Item = Result<JournalEntry, LedgerError>> + '_> {
        let path = match lock(&self.path) {
            Ok(guard) => guard.clone(),
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };

        let opened = File::open(&path).and_then(|file| {
            let remaining = file.metadata()?.len();
            Ok(FrameReader {
                reader: BufReader::new(file),
                remaining,
                failed: false,
            })
        });
        match opened {
            Ok(frames) => Box::new(frames),
            Err(e) => {
                log::warn!("journal at {} could not be read: {}", path.display(), e);
                Box::new(std::iter::empty())
            }
        }
    }
}

/// Decodes frames from a journal file, stopping at the first damaged one
struct FrameReader {
    reader: BufReader<File>,
    /// Bytes left in the file
    remaining: u64,
    failed: bool,
}

impl FrameReader {
    fn read_frame(&mut self) -> Result<Option<JournalEntry>, LedgerError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        if self.remaining < LEN_PREFIX {
            return Err(LedgerError::Journal(format!(
                "torn length prefix: {} trailing bytes",
                self.remaining
            )));
        }

        let mut prefix = [0u8; LEN_PREFIX as usize];
        self.reader.read_exact(&mut prefix)?;
        self.remaining -= LEN_PREFIX;

        let len = u64::from_le_bytes(prefix);
        if len > MAX_FRAME_LEN || len > self.remaining {
            return Err(LedgerError::Journal(format!(
                "frame claims {} bytes but {} remain (limit {})",
                len, self.remaining, MAX_FRAME_LEN
            )));
        }

        let mut body = vec![0u8; len as usize];
        self.reader.read_exact(&mut body)?;
        self.remaining -= len;
        Ok(Some(bincode::deserialize(&body)?))
    }
}

impl Iterator for FrameReader {
    type Item = Result<JournalEntry, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_frame() {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// In-memory journal, for tests and embedded use
#[derive(Debug, Default, Clone)]
pub struct MemoryJournal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded entries
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all entries
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl LedgerJournal for MemoryJournal {
    fn record(&self, receipt: &OperationReceipt) -> Result<(), LedgerError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| LedgerError::Journal(format!("Failed to acquire lock: {}", e)))?;
        entries.push(JournalEntry {
            receipt: receipt.clone(),
            recorded_at: current_millis(),
        });
        Ok(())
    }

    fn iterate_entries(&self) -> Box<dyn Iterator<Item = Result<JournalEntry, LedgerError>> + '_> {
        Box::new(self.entries().into_iter().map(Ok))
    }
}
