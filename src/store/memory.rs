//! In-process store backend.
//!
//! Writes run against a scratch copy of the tables. The copy replaces the
//! live tables only after the recorder has kept every change of the call.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::changes::{ChangeRecorder, MemoryChangeLog, RowChange};
use crate::error::Result;
use crate::model::{Association, LinkUpdate, Tag, TaskRecord, TaskUpdate, UpsertOutcome};
use crate::query::{GroupedQuery, LinkCriterion, TagCriterion, TagGroupRow, TaskCriterion};

use super::{TagInsert, TagStore, Tables};

/// Tables behind a mutex. Each call is atomic; calls do not compose.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    changes: Arc<dyn ChangeRecorder>,
}

impl MemoryStore {
    pub fn new(changes: Arc<dyn ChangeRecorder>) -> Self {
        Self {
            tables: Mutex::new(Tables::new()),
            changes,
        }
    }

    /// Store with its own in-memory change trail, returned alongside.
    pub fn with_memory_log() -> (Self, Arc<MemoryChangeLog>) {
        let log = Arc::new(MemoryChangeLog::new());
        (Self::new(log.clone()), log)
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut Tables, &mut Vec<RowChange>) -> Result<T>,
    ) -> Result<T> {
        let mut tables = self.tables();
        let mut scratch = tables.clone();
        let mut pending = Vec::new();
        let value = f(&mut scratch, &mut pending)?;
        if !pending.is_empty() {
            self.changes.record_all(&pending)?;
        }
        *tables = scratch;
        Ok(value)
    }
}

impl TagStore for MemoryStore {
    fn find_tag(&self, criterion: &TagCriterion) -> Result<Option<Tag>> {
        Ok(self.tables().find_tag(criterion))
    }

    fn tags_by_name(&self) -> Result<Vec<Tag>> {
        Ok(self.tables().tags_by_name())
    }

    fn insert_tag(&self, tag: Tag) -> Result<TagInsert> {
        self.write(|tables, pending| Ok(tables.insert_tag(tag, pending)))
    }

    fn rename_tags(&self, criterion: &TagCriterion, name: &str) -> Result<usize> {
        self.write(|tables, pending| tables.rename_tags(criterion, name, pending))
    }

    fn insert_task(&self, task: TaskRecord) -> Result<TaskRecord> {
        Ok(self.tables().insert_task(task))
    }

    fn update_tasks(&self, criterion: &TaskCriterion, update: &TaskUpdate) -> Result<usize> {
        Ok(self.tables().update_tasks(criterion, update))
    }

    fn query_tasks(&self, criterion: &TaskCriterion) -> Result<Vec<TaskRecord>> {
        Ok(self.tables().query_tasks(criterion))
    }

    fn query_links(&self, criterion: &LinkCriterion) -> Result<Vec<Association>> {
        Ok(self.tables().query_links(criterion))
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
        Ok(self.tables().group_links(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::test_support::FlakyRecorder;
    use chrono::Utc;

    #[test]
    fn failed_record_leaves_rows_untouched() {
        let recorder = Arc::new(FlakyRecorder::failing_from(1));
        let store = MemoryStore::new(recorder.clone());
        let task = store.insert_task(TaskRecord::new("t1", "one")).unwrap();

        let result = store.insert_link(Association::new(&task, "home", "g1"));
        assert!(result.is_err());
        assert!(store.query_links(&LinkCriterion::All).unwrap().is_empty());
        assert_eq!(recorder.kept(), 0);
    }

    #[test]
    fn failed_batch_keeps_earlier_state_and_trail() {
        let recorder = Arc::new(FlakyRecorder::failing_from(3));
        let store = MemoryStore::new(recorder.clone());
        let task = store.insert_task(TaskRecord::new("t1", "one")).unwrap();
        store
            .insert_link(Association::new(&task, "home", "g1"))
            .unwrap();
        store
            .insert_link(Association::new(&task, "work", "g2"))
            .unwrap();

        let result = store.update_links(
            &LinkCriterion::TaskUuid("t1".into()),
            &LinkUpdate::tombstone(Utc::now()),
        );
        assert!(result.is_err());
        assert_eq!(store.query_links(&LinkCriterion::Live).unwrap().len(), 2);
        assert_eq!(recorder.kept(), 2);
    }
}
