#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assert_cmd::Command;
use tagsync::changes::{ChangeRecorder, OutstandingLog, RowChange};
use tagsync::lock::DEFAULT_LOCK_TIMEOUT_MS;
use tagsync::model::TaskRecord;
use tagsync::storage::Storage;
use tagsync::store::{FileStore, TagStore};
use tagsync::tags::TagService;
use tagsync::Error;
use tempfile::TempDir;

pub struct TestRoot {
    dir: TempDir,
}

impl TestRoot {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        Self { dir }
    }

    /// A root with an initialized store directory.
    pub fn initialized() -> Self {
        let root = Self::new();
        root.storage().init().expect("init store");
        root
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn storage(&self) -> Storage {
        Storage::for_root(self.dir.path().to_path_buf())
    }

    pub fn store_dir(&self) -> PathBuf {
        self.storage().dir().to_path_buf()
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(".tagsync.toml");
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn outstanding_log(&self) -> OutstandingLog {
        OutstandingLog::for_storage(&self.storage())
    }

    pub fn service(&self) -> TagService<FileStore> {
        self.service_with(Arc::new(self.outstanding_log()))
    }

    pub fn service_with(&self, changes: Arc<dyn ChangeRecorder>) -> TagService<FileStore> {
        let store = FileStore::open(self.storage(), DEFAULT_LOCK_TIMEOUT_MS, changes)
            .expect("open store");
        TagService::new(store)
    }

    /// Make the next snapshot write fail by occupying its temp path.
    pub fn block_store_writes(&self) -> PathBuf {
        let store_file = self.storage().store_file();
        let blocker = store_file.with_extension(format!("json.tmp.{}", std::process::id()));
        fs::create_dir_all(&blocker).expect("create blocker");
        blocker
    }

    pub fn add_task(&self, service: &TagService<FileStore>, title: &str) -> TaskRecord {
        service
            .store()
            .insert_task(TaskRecord::new(format!("task-{title}"), title))
            .expect("insert task")
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("tagsync").expect("binary");
        cmd.current_dir(self.dir.path());
        cmd.env_remove("TAGSYNC_ROOT");
        cmd.env_remove("RUST_LOG");
        cmd
    }
}

pub fn json_stdout(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is json")
}

/// Outstanding log that rejects batches from the `fail_from`-th call on.
pub struct FlakyLog {
    inner: OutstandingLog,
    calls: AtomicUsize,
    fail_from: usize,
}

impl FlakyLog {
    pub fn new(inner: OutstandingLog, fail_from: usize) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_from,
        }
    }
}

impl ChangeRecorder for FlakyLog {
    fn record_all(&self, changes: &[RowChange]) -> tagsync::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.fail_from {
            return Err(Error::StoreFailed("recorder down".to_string()));
        }
        self.inner.record_all(changes)
    }

    fn read_all(&self) -> tagsync::Result<Vec<RowChange>> {
        self.inner.read_all()
    }
}
