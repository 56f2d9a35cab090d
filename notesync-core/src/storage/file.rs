/// Commit-log backed durable storage
///
/// The directory holds a single append-only `commit.log`. Every committed
/// batch is one framed record; the live state is rebuilt by replaying the log
/// on open and kept in memory afterwards.
///
/// Format: [magic(4) | version(4) | reserved(8)] [record...]
/// Record: [seq(8) | len(4) | bincode(WriteBatch) | crc(4)]

use super::{Keyspace, Storage, Tables, WriteBatch};
use crate::config::StorageConfig;
use crate::{Error, Result};
use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOG_FILE: &str = "commit.log";
const LOG_TMP_FILE: &str = "commit.log.tmp";
const LOG_HEADER_SIZE: usize = 16;
const LOG_MAGIC: u32 = 0x4E534C47; // "NSLG"
const LOG_VERSION: u32 = 1;
const RECORD_HEADER_SIZE: usize = 12; // seq(8) + len(4)
const RECORD_TRAILER_SIZE: usize = 4; // crc(4)

pub struct FileStorage {
    dir: PathBuf,
    config: StorageConfig,
    inner: Mutex<FileInner>,
}

struct FileInner {
    file: File,
    tables: Tables,
    next_seq: u64,
    /// Records currently in the log
    records: u64,
    /// Length of the valid prefix of the log
    len: u64,
}

impl FileStorage {
    /// Open (or create) the storage in `dir` with default settings
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(dir, StorageConfig::default())
    }

    /// Open (or create) the storage in `dir`.
    ///
    /// A directory that cannot be created or a log that cannot be opened is
    /// reported as `StorageUnavailable`. A torn or checksum-failing tail
    /// record is truncated away.
    pub fn open_with_config(dir: impl AsRef<Path>, config: StorageConfig) -> Result<Self> {
        config.validate().map_err(Error::InvalidArgument)?;

        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::StorageUnavailable(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let path = dir.join(LOG_FILE);
        let exists = path.exists();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| {
                Error::StorageUnavailable(format!("cannot open {}: {}", path.display(), e))
            })?;

        let mut contents = Vec::new();
        if exists {
            file.read_to_end(&mut contents)?;
        }

        if !contents.is_empty() && is_torn_header(&contents) {
            tracing::warn!(
                path = %path.display(),
                bytes = contents.len(),
                "reinitializing commit log with a torn header"
            );
            file.set_len(0)?;
            contents.clear();
        }

        let inner = if contents.is_empty() {
            write_header(&mut file)?;
            file.sync_all()?;
            FileInner {
                file,
                tables: Tables::default(),
                next_seq: 1,
                records: 0,
                len: LOG_HEADER_SIZE as u64,
            }
        } else {
            let replay = replay(&contents)?;
            if replay.valid_len < contents.len() as u64 {
                tracing::warn!(
                    path = %path.display(),
                    dropped_bytes = contents.len() as u64 - replay.valid_len,
                    "truncating incomplete commit log tail"
                );
                file.set_len(replay.valid_len)?;
                file.sync_all()?;
            }
            FileInner {
                file,
                tables: replay.tables,
                next_seq: replay.last_seq + 1,
                records: replay.records,
                len: replay.valid_len,
            }
        };

        tracing::debug!(
            dir = %dir.display(),
            records = inner.records,
            "opened file storage"
        );

        Ok(Self {
            dir,
            config,
            inner: Mutex::new(inner),
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Number of records currently in the commit log
    pub fn log_records(&self) -> u64 {
        self.inner.lock().records
    }

    /// Rewrite the log as a single record holding the live state.
    pub fn compact(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.compact_locked(&mut inner)
    }

    fn compact_locked(&self, inner: &mut FileInner) -> Result<()> {
        let tmp_path = self.dir.join(LOG_TMP_FILE);
        let log_path = self.dir.join(LOG_FILE);

        let snapshot = inner.tables.snapshot();
        let mut tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        write_header(&mut tmp)?;

        let mut len = LOG_HEADER_SIZE as u64;
        let mut records = 0;
        let mut seq = inner.next_seq;
        if !snapshot.is_empty() {
            let frame = encode_record(seq, &snapshot)?;
            tmp.write_all(&frame)?;
            len += frame.len() as u64;
            records = 1;
            seq += 1;
        }
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &log_path)?;

        let mut file = OpenOptions::new().read(true).write(true).open(&log_path)?;
        file.seek(SeekFrom::End(0))?;

        tracing::debug!(
            before = inner.records,
            after = records,
            "compacted commit log"
        );

        inner.file = file;
        inner.records = records;
        inner.len = len;
        inner.next_seq = seq;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, space: Keyspace, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.lock().tables.get(space, key))
    }

    fn scan(&self, space: Keyspace) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self.inner.lock().tables.scan(space))
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        let frame = encode_record(seq, &batch)?;
        let previous_len = inner.len;

        let written = inner
            .file
            .seek(SeekFrom::Start(previous_len))
            .and_then(|_| inner.file.write_all(&frame))
            .and_then(|_| {
                if self.config.sync_writes {
                    inner.file.sync_data()
                } else {
                    Ok(())
                }
            });

        if let Err(e) = written {
            // Drop whatever part of the record reached the file
            if let Err(truncate_err) = inner.file.set_len(previous_len) {
                tracing::error!(error = %truncate_err, "failed to roll back partial commit");
            }
            return Err(e.into());
        }

        inner.tables.apply(&batch);
        inner.next_seq = seq + 1;
        inner.records += 1;
        inner.len = previous_len + frame.len() as u64;

        if inner.records >= self.config.compact_after_records {
            // The commit is already durable; a failed compaction only delays the next one
            if let Err(e) = self.compact_locked(&mut inner) {
                tracing::warn!(error = %e, "commit log compaction failed");
            }
        }

        Ok(())
    }
}

fn header_bytes() -> BytesMut {
    let mut header = BytesMut::with_capacity(LOG_HEADER_SIZE);
    header.put_u32(LOG_MAGIC);
    header.put_u32_le(LOG_VERSION);
    header.put_u64_le(0); // reserved
    header
}

fn write_header(file: &mut File) -> Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header_bytes())?;
    Ok(())
}

/// A log shorter than its header can only come from a crash while the header
/// of a new log was being written; nothing was ever committed to it.
fn is_torn_header(contents: &[u8]) -> bool {
    contents.len() < LOG_HEADER_SIZE && header_bytes().starts_with(contents)
}

fn encode_record(seq: u64, batch: &WriteBatch) -> Result<BytesMut> {
    let data = bincode::serialize(batch)
        .map_err(|e| Error::Internal(format!("Serialize error: {}", e)))?;
    let crc = crc32fast::hash(&data);

    let mut buf = BytesMut::with_capacity(RECORD_HEADER_SIZE + data.len() + RECORD_TRAILER_SIZE);
    buf.put_u64_le(seq);
    buf.put_u32_le(data.len() as u32);
    buf.put_slice(&data);
    buf.put_u32_le(crc);
    Ok(buf)
}

struct Replay {
    tables: Tables,
    last_seq: u64,
    records: u64,
    valid_len: u64,
}

fn replay(contents: &[u8]) -> Result<Replay> {
    if contents.len() < LOG_HEADER_SIZE {
        return Err(Error::Corruption("commit log header is truncated".to_string()));
    }
    let magic = u32::from_be_bytes([contents[0], contents[1], contents[2], contents[3]]);
    if magic != LOG_MAGIC {
        return Err(Error::Corruption("Invalid commit log magic".to_string()));
    }
    let version = u32::from_le_bytes([contents[4], contents[5], contents[6], contents[7]]);
    if version != LOG_VERSION {
        return Err(Error::Corruption(format!(
            "unsupported commit log version {}",
            version
        )));
    }

    let mut tables = Tables::default();
    let mut last_seq = 0u64;
    let mut records = 0u64;
    let mut pos = LOG_HEADER_SIZE;

    loop {
        let rest = &contents[pos..];
        if rest.len() < RECORD_HEADER_SIZE {
            break;
        }

        let seq = u64::from_le_bytes([
            rest[0], rest[1], rest[2], rest[3], rest[4], rest[5], rest[6], rest[7],
        ]);
        let len = u32::from_le_bytes([rest[8], rest[9], rest[10], rest[11]]) as usize;

        let total = RECORD_HEADER_SIZE + len + RECORD_TRAILER_SIZE;
        if rest.len() < total {
            break;
        }

        let data = &rest[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + len];
        let crc_bytes = &rest[RECORD_HEADER_SIZE + len..total];
        let expected_crc =
            u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if crc32fast::hash(data) != expected_crc {
            break;
        }

        let batch: WriteBatch = bincode::deserialize(data)
            .map_err(|e| Error::Corruption(format!("Deserialize error at seq {}: {}", seq, e)))?;
        tables.apply(&batch);

        last_seq = last_seq.max(seq);
        records += 1;
        pos += total;
    }

    Ok(Replay {
        tables,
        last_seq,
        records,
        valid_len: pos as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn put(key: &str, value: &[u8]) -> WriteBatch {
        let mut batch = WriteBatch::new();
        batch.put(Keyspace::Notes, key, value.to_vec());
        batch
    }

    fn log_path(dir: &TempDir) -> PathBuf {
        dir.path().join(LOG_FILE)
    }

    #[test]
    fn test_reopen_restores_state() {
        let dir = TempDir::new().unwrap();

        {
            let storage = FileStorage::open(dir.path()).unwrap();
            storage.commit(put("n1", b"one")).unwrap();
            storage.commit(put("n2", b"two")).unwrap();

            let mut batch = WriteBatch::new();
            batch.delete(Keyspace::Notes, "n1");
            storage.commit(batch).unwrap();
        }

        let storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get(Keyspace::Notes, "n1").unwrap(), None);
        assert_eq!(storage.get(Keyspace::Notes, "n2").unwrap(), Some(b"two".to_vec()));
        assert_eq!(storage.log_records(), 3);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        {
            let storage = FileStorage::open(dir.path()).unwrap();
            storage.commit(put("n1", b"one")).unwrap();
            storage.commit(put("n2", b"two")).unwrap();
        }

        let full_len = fs::metadata(log_path(&dir)).unwrap().len();
        let file = OpenOptions::new().write(true).open(log_path(&dir)).unwrap();
        file.set_len(full_len - 3).unwrap();
        drop(file);

        let storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get(Keyspace::Notes, "n1").unwrap(), Some(b"one".to_vec()));
        assert_eq!(storage.get(Keyspace::Notes, "n2").unwrap(), None);
        assert_eq!(storage.log_records(), 1);

        // New commits land after the valid prefix
        storage.commit(put("n3", b"three")).unwrap();
        drop(storage);
        let storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get(Keyspace::Notes, "n3").unwrap(), Some(b"three".to_vec()));
        assert_eq!(storage.log_records(), 2);
    }

    #[test]
    fn test_crc_mismatch_drops_tail_record() {
        let dir = TempDir::new().unwrap();
        {
            let storage = FileStorage::open(dir.path()).unwrap();
            storage.commit(put("n1", b"one")).unwrap();
            storage.commit(put("n2", b"two")).unwrap();
        }

        let mut bytes = fs::read(log_path(&dir)).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(log_path(&dir), &bytes).unwrap();

        let storage = FileStorage::open(dir.path()).unwrap();
        assert!(storage.get(Keyspace::Notes, "n1").unwrap().is_some());
        assert!(storage.get(Keyspace::Notes, "n2").unwrap().is_none());
    }

    #[test]
    fn test_bad_magic_is_corruption() {
        let dir = TempDir::new().unwrap();
        fs::write(log_path(&dir), [0u8; LOG_HEADER_SIZE]).unwrap();

        let err = FileStorage::open(dir.path()).err().unwrap();
        assert!(matches!(err, Error::Corruption(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_torn_header_is_reinitialized() {
        let dir = TempDir::new().unwrap();
        fs::write(log_path(&dir), &header_bytes()[..6]).unwrap();

        let storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(storage.log_records(), 0);
        storage.commit(put("n1", b"one")).unwrap();
        drop(storage);

        let storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get(Keyspace::Notes, "n1").unwrap(), Some(b"one".to_vec()));
    }

    #[test]
    fn test_short_foreign_file_is_corruption() {
        let dir = TempDir::new().unwrap();
        fs::write(log_path(&dir), b"hello").unwrap();

        let err = FileStorage::open(dir.path()).err().unwrap();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_unavailable_directory() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();

        let err = FileStorage::open(blocker.join("store")).err().unwrap();
        assert!(matches!(err, Error::StorageUnavailable(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_auto_compaction() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::new()
            .without_sync_writes()
            .with_compact_after_records(4);

        {
            let storage = FileStorage::open_with_config(dir.path(), config.clone()).unwrap();
            for i in 0..10 {
                storage.commit(put("counter", &[i])).unwrap();
            }
            assert!(storage.log_records() < 4);
        }

        let storage = FileStorage::open_with_config(dir.path(), config).unwrap();
        assert_eq!(storage.get(Keyspace::Notes, "counter").unwrap(), Some(vec![9]));
        assert!(!dir.path().join(LOG_TMP_FILE).exists());
    }

    #[test]
    fn test_compact_empty_state() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.commit(put("n1", b"one")).unwrap();

        let mut batch = WriteBatch::new();
        batch.delete(Keyspace::Notes, "n1");
        storage.commit(batch).unwrap();

        storage.compact().unwrap();
        assert_eq!(storage.log_records(), 0);
        assert_eq!(
            fs::metadata(log_path(&dir)).unwrap().len(),
            LOG_HEADER_SIZE as u64
        );

        storage.commit(put("n2", b"two")).unwrap();
        drop(storage);
        let storage = FileStorage::open(dir.path()).unwrap();
        assert!(storage.get(Keyspace::Notes, "n2").unwrap().is_some());
    }
}
