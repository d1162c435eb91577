//! Storage layout for tagsync
//!
//! All persistent state lives under one directory inside the project root:
//!
//! ```text
//! .tagsync/                     # Store directory (configurable)
//!   store.json                  # Snapshot of tags, tasks and links
//!   store.lock                  # Lock guarding every snapshot read-modify-write
//!   outstanding.jsonl           # One change record per row write
//!   outstanding.lock            # Lock guarding change-log appends
//!   command.lock                # Held by mutating CLI commands
//! ```

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;
use crate::lock;

/// Default name of the store directory
pub const STORE_DIR: &str = ".tagsync";

/// Path manager for tagsync state
#[derive(Debug, Clone)]
pub struct Storage {
    /// Project root (where `.tagsync.toml` lives)
    root: PathBuf,
    /// Store directory, usually `<root>/.tagsync`
    dir: PathBuf,
}

impl Storage {
    /// Create a storage manager for an explicit store directory
    pub fn new(root: PathBuf, dir: PathBuf) -> Self {
        Self { root, dir }
    }

    /// Create storage with the default directory layout under `root`
    pub fn for_root(root: PathBuf) -> Self {
        let dir = root.join(STORE_DIR);
        Self::new(root, dir)
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    /// Project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path to the table snapshot
    pub fn store_file(&self) -> PathBuf {
        self.dir.join("store.json")
    }

    /// Path to the snapshot lock
    pub fn store_lock(&self) -> PathBuf {
        self.dir.join("store.lock")
    }

    /// Path to the outstanding change log (JSONL format)
    pub fn outstanding_file(&self) -> PathBuf {
        self.dir.join("outstanding.jsonl")
    }

    /// Path to the outstanding change log lock
    pub fn outstanding_lock(&self) -> PathBuf {
        self.dir.join("outstanding.lock")
    }

    /// Path to the lock held by mutating commands
    pub fn command_lock(&self) -> PathBuf {
        self.dir.join("command.lock")
    }

    // =========================================================================
    // Directory initialization
    // =========================================================================

    /// Create the store directory and an empty change log
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let outstanding = self.outstanding_file();
        if !outstanding.exists() {
            File::create(&outstanding)?;
        }

        Ok(())
    }

    /// Check if storage has been initialized
    pub fn is_initialized(&self) -> bool {
        self.dir.exists()
    }

    // =========================================================================
    // File I/O helpers
    // =========================================================================

    /// Write JSON data atomically (write to temp, then rename)
    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(data)?;
        lock::write_atomic(path, &json)
    }

    /// Read JSON data from a file
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        let data: T = serde_json::from_str(&content)?;
        Ok(data)
    }

    /// Append records to a JSONL file in one write
    ///
    /// Every record is serialized before the file is touched, so a
    /// serialization error appends nothing. Not atomic across processes on
    /// its own; callers hold the matching lock.
    pub fn append_jsonl<T: Serialize>(&self, path: &Path, records: &[T]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(buf.as_bytes())?;
        file.sync_all()?;

        Ok(())
    }

    /// Read all records from a JSONL file
    pub fn read_jsonl<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: T = serde_json::from_str(&line)?;
            records.push(record);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: i64,
        name: String,
    }

    #[test]
    fn default_layout_lives_under_root() {
        let storage = Storage::for_root(PathBuf::from("/project"));
        assert_eq!(storage.dir(), Path::new("/project/.tagsync"));
        assert_eq!(
            storage.store_file(),
            PathBuf::from("/project/.tagsync/store.json")
        );
        assert_eq!(
            storage.outstanding_file(),
            PathBuf::from("/project/.tagsync/outstanding.jsonl")
        );
    }

    #[test]
    fn init_creates_directory_and_log() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::for_root(temp.path().to_path_buf());
        assert!(!storage.is_initialized());

        storage.init().unwrap();
        assert!(storage.is_initialized());
        assert!(storage.outstanding_file().exists());
    }

    #[test]
    fn jsonl_append_and_read() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::for_root(temp.path().to_path_buf());
        let path = storage.outstanding_file();

        storage
            .append_jsonl(&path, &[Row { id: 1, name: "home".into() }])
            .unwrap();
        storage
            .append_jsonl(&path, &[Row { id: 2, name: "urgent".into() }])
            .unwrap();

        let rows: Vec<Row> = storage.read_jsonl(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].name, "urgent");
    }

    #[test]
    fn read_jsonl_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::for_root(temp.path().to_path_buf());
        let rows: Vec<Row> = storage.read_jsonl(&storage.outstanding_file()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn json_round_trip_through_atomic_write() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::for_root(temp.path().to_path_buf());
        let path = storage.store_file();

        storage
            .write_json(&path, &Row { id: 7, name: "errand".into() })
            .unwrap();
        let row: Row = storage.read_json(&path).unwrap();
        assert_eq!(row, Row { id: 7, name: "errand".into() });
    }
}
