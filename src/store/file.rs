//! File-backed store backend.
//!
//! Tables are kept as one JSON snapshot. Every call takes the store lock,
//! loads the snapshot, applies the operation, and writes the snapshot back
//! atomically, so concurrent processes see whole row writes only.
//!
//! Changes are delivered after the snapshot is saved. If the recorder
//! rejects them, the previous snapshot is written back, so the rows and the
//! change trail never disagree.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::changes::{ChangeRecorder, RowChange};
use crate::error::{Error, Result};
use crate::lock::FileLock;
use crate::model::{Association, LinkUpdate, Tag, TaskRecord, TaskUpdate, UpsertOutcome};
use crate::query::{GroupedQuery, LinkCriterion, TagCriterion, TagGroupRow, TaskCriterion};
use crate::storage::Storage;

use super::{TagInsert, TagStore, Tables};

pub struct FileStore {
    storage: Storage,
    timeout_ms: u64,
    changes: Arc<dyn ChangeRecorder>,
}

impl FileStore {
    /// Open an initialized store directory.
    pub fn open(
        storage: Storage,
        timeout_ms: u64,
        changes: Arc<dyn ChangeRecorder>,
    ) -> Result<Self> {
        if !storage.is_initialized() {
            return Err(Error::NotInitialized(storage.dir().to_path_buf()));
        }
        Ok(Self {
            storage,
            timeout_ms,
            changes,
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    fn load(&self) -> Result<Tables> {
        let path = self.storage.store_file();
        if !path.exists() {
            return Ok(Tables::new());
        }
        self.storage.read_json(&path)
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T> {
        let _lock = FileLock::acquire(self.storage.store_lock(), self.timeout_ms)?;
        let tables = self.load()?;
        Ok(f(&tables))
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut Tables, &mut Vec<RowChange>) -> Result<T>,
    ) -> Result<T> {
        let _lock = FileLock::acquire(self.storage.store_lock(), self.timeout_ms)?;
        let path = self.storage.store_file();
        let before = self.load()?;
        let mut tables = before.clone();
        let mut pending = Vec::new();
        let value = f(&mut tables, &mut pending)?;

        self.storage.write_json(&path, &tables)?;
        trace!(path = %path.display(), "store snapshot written");
        if pending.is_empty() {
            return Ok(value);
        }
        if let Err(err) = self.changes.record_all(&pending) {
            warn!(
                %err,
                changes = pending.len(),
                "change trail rejected write; restoring snapshot"
            );
            self.storage.write_json(&path, &before)?;
            return Err(err);
        }
        Ok(value)
    }
}

impl TagStore for FileStore {
    fn find_tag(&self, criterion: &TagCriterion) -> Result<Option<Tag>> {
        self.read(|tables| tables.find_tag(criterion))
    }

    fn tags_by_name(&self) -> Result<Vec<Tag>> {
        self.read(|tables| tables.tags_by_name())
    }

    fn insert_tag(&self, tag: Tag) -> Result<TagInsert> {
        self.write(|tables, pending| Ok(tables.insert_tag(tag, pending)))
    }

    fn rename_tags(&self, criterion: &TagCriterion, name: &str) -> Result<usize> {
        self.write(|tables, pending| tables.rename_tags(criterion, name, pending))
    }

    fn insert_task(&self, task: TaskRecord) -> Result<TaskRecord> {
        self.write(|tables, _| Ok(tables.insert_task(task)))
    }

    fn update_tasks(&self, criterion: &TaskCriterion, update: &TaskUpdate) -> Result<usize> {
        self.write(|tables, _| Ok(tables.update_tasks(criterion, update)))
    }

    fn query_tasks(&self, criterion: &TaskCriterion) -> Result<Vec<TaskRecord>> {
        self.read(|tables| tables.query_tasks(criterion))
    }

    fn query_links(&self, criterion: &LinkCriterion) -> Result<Vec<Association>> {
        self.read(|tables| tables.query_links(criterion))
    }

    fn insert_link(&self, link: Association) -> Result<Association> {
        self.write(|tables, pending| tables.insert_link(link, pending))
    }

    fn update_links(&self, criterion: &LinkCriterion, update: &LinkUpdate) -> Result<usize> {
        self.write(|tables, pending| Ok(tables.update_links(criterion, update, pending)))
    }

    fn upsert_link(
        &self,
        criterion: &LinkCriterion,
        link: Association,
    ) -> Result<UpsertOutcome> {
        self.write(|tables, pending| tables.upsert_link(criterion, link, pending))
    }

    fn group_links(&self, query: &GroupedQuery) -> Result<Vec<TagGroupRow>> {
        self.read(|tables| tables.group_links(query))
    }
}
