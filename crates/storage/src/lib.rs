#![forbid(unsafe_code)]

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Kafka's single-segment file name for base offset zero.
pub const SEGMENT_FILE_NAME: &str = "00000000000000000000.log";

/// Default log root shared with the cluster-metadata directory layout.
pub const DEFAULT_LOG_ROOT: &str = "/tmp/kraft-combined-logs";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage {operation} failed on {path}: {message}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        message: String,
    },
}

impl StorageError {
    fn io(operation: &'static str, path: &Path, err: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Byte-oriented store with one segment file per (topic, partition), laid
/// out as `<root>/<topic>-<partition>/00000000000000000000.log`.
///
/// The store holds no state besides the root path; concurrent writers to
/// the same partition race at the file-system level.
#[derive(Debug, Clone)]
pub struct PartitionStore {
    root: PathBuf,
}

impl Default for PartitionStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_ROOT)
    }
}

impl PartitionStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, topic: &str, partition: i32) -> PathBuf {
        self.root.join(format!("{topic}-{partition}"))
    }

    pub fn segment_path(&self, topic: &str, partition: i32) -> PathBuf {
        self.partition_dir(topic, partition).join(SEGMENT_FILE_NAME)
    }

    /// Read the whole segment for a partition. A missing file reads as
    /// empty; other failures surface as errors for the caller to map to a
    /// per-partition disposition.
    pub fn read(&self, topic: &str, partition: i32) -> Result<Vec<u8>, StorageError> {
        let path = self.segment_path(topic, partition);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(StorageError::io("read", &path, err)),
        }
    }

    /// Replace the segment for a partition, creating the partition
    /// directory if needed.
    pub fn write(&self, topic: &str, partition: i32, records: &[u8]) -> Result<(), StorageError> {
        let dir = self.partition_dir(topic, partition);
        fs::create_dir_all(&dir).map_err(|err| StorageError::io("create_dir_all", &dir, err))?;
        let path = dir.join(SEGMENT_FILE_NAME);
        fs::write(&path, records).map_err(|err| StorageError::io("write", &path, err))
    }
}
