//! Persistent store adapter.
//!
//! `TagStore` is the narrow surface the tag engine needs: point lookups,
//! inserts, conditional updates reporting affected rows, an atomic
//! update-or-insert for links, and a grouped count query. Every row write
//! against tags or links is reported to the store's `ChangeRecorder`.
//!
//! Each call is atomic together with its change records: either the rows
//! are committed and every change is kept, or neither happens. No
//! transaction spans more than one call.

mod file;
mod memory;
mod tables;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use tables::{TagInsert, Tables};

use crate::error::Result;
use crate::model::{Association, LinkUpdate, Tag, TaskRecord, TaskUpdate, UpsertOutcome};
use crate::query::{GroupedQuery, LinkCriterion, TagCriterion, TagGroupRow, TaskCriterion};

pub trait TagStore: Send + Sync {
    /// First tag matching `criterion`.
    fn find_tag(&self, criterion: &TagCriterion) -> Result<Option<Tag>>;

    /// Every tag, ordered by name case-insensitively.
    fn tags_by_name(&self) -> Result<Vec<Tag>>;

    /// Insert `tag` unless its name is already taken case-insensitively.
    fn insert_tag(&self, tag: Tag) -> Result<TagInsert>;

    /// Set the name of every tag matching `criterion`.
    fn rename_tags(&self, criterion: &TagCriterion, name: &str) -> Result<usize>;

    fn insert_task(&self, task: TaskRecord) -> Result<TaskRecord>;

    fn update_tasks(&self, criterion: &TaskCriterion, update: &TaskUpdate) -> Result<usize>;

    fn query_tasks(&self, criterion: &TaskCriterion) -> Result<Vec<TaskRecord>>;

    /// Links matching `criterion`, in insertion order. Includes tombstoned
    /// rows unless the criterion excludes them.
    fn query_links(&self, criterion: &LinkCriterion) -> Result<Vec<Association>>;

    fn insert_link(&self, link: Association) -> Result<Association>;

    fn update_links(&self, criterion: &LinkCriterion, update: &LinkUpdate) -> Result<usize>;

    /// Atomically refresh the name on rows matching `criterion`, or insert
    /// `link` when none match.
    fn upsert_link(&self, criterion: &LinkCriterion, link: Association) -> Result<UpsertOutcome>;

    fn group_links(&self, query: &GroupedQuery) -> Result<Vec<TagGroupRow>>;
}
