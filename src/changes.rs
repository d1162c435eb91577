//! Outstanding change trail
//!
//! Every row-level insert or update of a tag or link produces exactly one
//! `RowChange`. A store collects the changes of one operation and hands
//! them to a `ChangeRecorder` as a batch once the rows are committed; a sync
//! layer later drains the trail. Removing a tag from a task therefore has
//! to be one update per tag so every change names its own `tag_uuid`.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::lock::{FileLock, DEFAULT_LOCK_TIMEOUT_MS};
use crate::model::{Association, LinkUpdate, Tag};
use crate::storage::Storage;

/// Table a change applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Tag,
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Insert,
    Update,
}

/// One recorded row write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub change_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub table: ChangeTable,
    pub action: ChangeAction,
    pub row_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_uuid: Option<String>,
    /// Columns written, by name.
    pub values: serde_json::Value,
}

impl RowChange {
    fn new(table: ChangeTable, action: ChangeAction, row_id: i64) -> Self {
        Self {
            change_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            table,
            action,
            row_id,
            task_id: None,
            tag_uuid: None,
            values: serde_json::Value::Null,
        }
    }

    pub fn tag_inserted(tag: &Tag) -> Self {
        Self {
            tag_uuid: Some(tag.uuid.clone()),
            values: serde_json::json!({ "uuid": tag.uuid, "name": tag.name }),
            ..Self::new(ChangeTable::Tag, ChangeAction::Insert, tag.id)
        }
    }

    pub fn tag_renamed(tag: &Tag) -> Self {
        Self {
            tag_uuid: Some(tag.uuid.clone()),
            values: serde_json::json!({ "name": tag.name }),
            ..Self::new(ChangeTable::Tag, ChangeAction::Update, tag.id)
        }
    }

    pub fn link_inserted(link: &Association) -> Result<Self> {
        Ok(Self {
            task_id: Some(link.task_id),
            tag_uuid: Some(link.tag_uuid.clone()),
            values: serde_json::to_value(link)?,
            ..Self::new(ChangeTable::Link, ChangeAction::Insert, link.id)
        })
    }

    /// `link` is the row after `update` was applied.
    pub fn link_updated(link: &Association, update: &LinkUpdate) -> Self {
        let mut values = serde_json::Map::new();
        if let Some(name) = &update.tag_name {
            values.insert("tag_name".to_string(), serde_json::json!(name));
        }
        if update.tombstone_at.is_some() {
            values.insert(
                "deleted_at".to_string(),
                serde_json::json!(link.state.deleted_at()),
            );
        }
        Self {
            task_id: Some(link.task_id),
            tag_uuid: Some(link.tag_uuid.clone()),
            values: serde_json::Value::Object(values),
            ..Self::new(ChangeTable::Link, ChangeAction::Update, link.id)
        }
    }
}

/// Sink for row changes.
///
/// `record_all` keeps either every change of the batch or none of them.
pub trait ChangeRecorder: Send + Sync {
    fn record_all(&self, changes: &[RowChange]) -> Result<()>;

    fn record(&self, change: RowChange) -> Result<()> {
        self.record_all(std::slice::from_ref(&change))
    }

    /// All changes recorded so far, oldest first.
    fn read_all(&self) -> Result<Vec<RowChange>>;
}

/// In-memory change trail
#[derive(Debug, Default)]
pub struct MemoryChangeLog {
    changes: Mutex<Vec<RowChange>>,
}

impl MemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChangeRecorder for MemoryChangeLog {
    fn record_all(&self, changes: &[RowChange]) -> Result<()> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(changes);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<RowChange>> {
        Ok(self
            .changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// Append-only JSONL trail at `.tagsync/outstanding.jsonl`
#[derive(Debug, Clone)]
pub struct OutstandingLog {
    storage: Storage,
    path: PathBuf,
    lock_path: PathBuf,
    timeout_ms: u64,
}

impl OutstandingLog {
    pub fn new(storage: Storage, timeout_ms: u64) -> Self {
        let path = storage.outstanding_file();
        let lock_path = storage.outstanding_lock();
        Self {
            storage,
            path,
            lock_path,
            timeout_ms,
        }
    }

    pub fn for_storage(storage: &Storage) -> Self {
        Self::new(storage.clone(), DEFAULT_LOCK_TIMEOUT_MS)
    }
}

impl ChangeRecorder for OutstandingLog {
    fn record_all(&self, changes: &[RowChange]) -> Result<()> {
        let _lock = FileLock::acquire(&self.lock_path, self.timeout_ms)?;
        self.storage.append_jsonl(&self.path, changes)
    }

    fn read_all(&self) -> Result<Vec<RowChange>> {
        let _lock = FileLock::acquire(&self.lock_path, self.timeout_ms)?;
        self.storage.read_jsonl(&self.path)
    }
}

/// Recorder used when change tracking is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardChanges;

impl ChangeRecorder for DiscardChanges {
    fn record_all(&self, _changes: &[RowChange]) -> Result<()> {
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<RowChange>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::Error;

    /// Recorder whose `record_all` fails from the given call on (1-based).
    #[derive(Debug)]
    pub(crate) struct FlakyRecorder {
        kept: MemoryChangeLog,
        calls: AtomicUsize,
        fail_from: usize,
    }

    impl FlakyRecorder {
        pub(crate) fn failing_from(fail_from: usize) -> Self {
            Self {
                kept: MemoryChangeLog::new(),
                calls: AtomicUsize::new(0),
                fail_from,
            }
        }

        /// Number of changes kept so far.
        pub(crate) fn kept(&self) -> usize {
            self.kept.len()
        }
    }

    impl ChangeRecorder for FlakyRecorder {
        fn record_all(&self, changes: &[RowChange]) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.fail_from {
                return Err(Error::StoreFailed("recorder down".to_string()));
            }
            self.kept.record_all(changes)
        }

        fn read_all(&self) -> Result<Vec<RowChange>> {
            self.kept.read_all()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskRecord;
    use tempfile::TempDir;

    #[test]
    fn tombstone_change_names_its_tag() {
        let task = TaskRecord {
            id: 4,
            ..TaskRecord::new("task-4", "Pay rent")
        };
        let mut link = Association::new(&task, "home", "tag-home");
        link.id = 11;
        let update = LinkUpdate::tombstone(Utc::now());
        update.apply(&mut link);

        let change = RowChange::link_updated(&link, &update);
        assert_eq!(change.table, ChangeTable::Link);
        assert_eq!(change.action, ChangeAction::Update);
        assert_eq!(change.row_id, 11);
        assert_eq!(change.task_id, Some(4));
        assert_eq!(change.tag_uuid.as_deref(), Some("tag-home"));
        assert!(change.values.get("deleted_at").is_some());
        assert!(change.values.get("tag_name").is_none());
    }

    #[test]
    fn memory_log_keeps_order() {
        let log = MemoryChangeLog::new();
        let mut tag = Tag::new("u1", "work");
        tag.id = 1;
        log.record(RowChange::tag_inserted(&tag)).unwrap();
        tag.name = "Work".into();
        log.record(RowChange::tag_renamed(&tag)).unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].action, ChangeAction::Insert);
        assert_eq!(all[1].values["name"], "Work");
    }

    #[test]
    fn link_insert_carries_row_values() {
        let task = TaskRecord {
            id: 2,
            ..TaskRecord::new("task-2", "Call mum")
        };
        let mut link = Association::new(&task, "phone", "tag-phone");
        link.id = 5;

        let change = RowChange::link_inserted(&link).unwrap();
        assert_eq!(change.action, ChangeAction::Insert);
        assert_eq!(change.values["tag_name"], "phone");
        assert!(change.values["deleted_at"].is_null());
    }

    #[test]
    fn outstanding_log_appends_batches() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::for_root(temp.path().to_path_buf());
        storage.init().unwrap();

        let log = OutstandingLog::for_storage(&storage);
        let mut first = Tag::new("u1", "home");
        first.id = 1;
        let mut second = Tag::new("u2", "work");
        second.id = 2;
        log.record_all(&[RowChange::tag_inserted(&first), RowChange::tag_inserted(&second)])
            .unwrap();
        log.record_all(&[]).unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].row_id, 2);
    }

    #[test]
    fn outstanding_log_persists_jsonl() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::for_root(temp.path().to_path_buf());
        storage.init().unwrap();

        let log = OutstandingLog::for_storage(&storage);
        let mut tag = Tag::new("u1", "errand");
        tag.id = 9;
        log.record(RowChange::tag_inserted(&tag)).unwrap();

        let reopened = OutstandingLog::for_storage(&storage);
        let all = reopened.read_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].row_id, 9);
        assert_eq!(all[0].table, ChangeTable::Tag);
    }
}
