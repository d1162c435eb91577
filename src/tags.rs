//! Tag engine: identity resolution, link reconciliation and tag queries.
//!
//! Tags are unique by case-insensitive name and created lazily on first
//! use. A task's tags are `Association` rows that are tombstoned, never
//! removed. Every row write is recorded by the store for outbound sync, so
//! the engine only writes what actually changed:
//!
//! - `synchronize` creates links for newly desired tags and tombstones links
//!   for tags no longer desired. Links present on both sides get no write.
//! - `delete_links` issues one update per tag so each recorded change
//!   carries its own tag identifier.
//!
//! Reconciliation is read-diff-write without a transaction. Each
//! `TagService` instance serializes its own link mutations per task. Two
//! instances over one store, in the same process or in separate ones, do
//! not see each other's task locks and must serialize per task themselves
//! (the CLI holds a command lock for that).

use std::collections::{HashSet, VecDeque};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::error::Result;
use crate::lock::TaskLocks;
use crate::model::{Association, LinkUpdate, Tag, TagCount, TaskRecord, TaskTag, UpsertOutcome};
use crate::query::{
    cmp_ignore_case, GroupedQuery, LinkCriterion, TagCriterion, TagGroupRow, TagOrder,
    TaskCriterion,
};
use crate::store::TagStore;

/// Writes performed by one `synchronize` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Tag names linked by this call.
    pub created: Vec<String>,
    /// Tag uuids whose links were tombstoned.
    pub tombstoned: Vec<String>,
    /// Desired tags that were already linked.
    pub unchanged: usize,
}

impl SyncReport {
    pub fn writes(&self) -> usize {
        self.created.len() + self.tombstoned.len()
    }
}

pub struct TagService<S> {
    store: S,
    task_locks: TaskLocks,
}

impl<S: TagStore> TagService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            task_locks: TaskLocks::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Existing tag matching `name` case-insensitively, or a newly created one.
    ///
    /// The returned name is the stored one and may differ in case from the
    /// input. Blank names are not rejected here.
    pub fn resolve_or_create(&self, name: &str) -> Result<Tag> {
        if let Some(tag) = self
            .store
            .find_tag(&TagCriterion::NameIgnoreCase(name.to_string()))?
        {
            return Ok(tag);
        }

        let inserted = self
            .store
            .insert_tag(Tag::new(Ulid::new().to_string(), name))?;
        if inserted.created {
            debug!(tag = %inserted.tag.uuid, name, "created tag");
        }
        Ok(inserted.tag)
    }

    /// Stored capitalization of `name`, or `name` itself if unknown.
    ///
    /// Live links are checked first, then the tag table.
    pub fn find_canonical_case(&self, name: &str) -> Result<String> {
        let in_use = self
            .store
            .query_links(&tag_eq_ignore_case(name, LinkCriterion::Live))?;
        if let Some(link) = in_use.into_iter().next() {
            return Ok(link.tag_name);
        }

        Ok(self
            .store
            .find_tag(&TagCriterion::NameIgnoreCase(name.to_string()))?
            .map(|tag| tag.name)
            .unwrap_or_else(|| name.to_string()))
    }

    // =========================================================================
    // Links
    // =========================================================================

    /// Make the live tags of `task` exactly `desired`.
    ///
    /// Writes the symmetric difference only; calling it again with the same
    /// set writes nothing.
    pub fn synchronize(&self, task: &TaskRecord, desired: &HashSet<String>) -> Result<SyncReport> {
        self.task_locks
            .lock(&task.uuid)
            .hold(|| self.synchronize_locked(task, desired))
    }

    fn synchronize_locked(
        &self,
        task: &TaskRecord,
        desired: &HashSet<String>,
    ) -> Result<SyncReport> {
        let live = self.store.query_links(&LinkCriterion::and([
            LinkCriterion::TaskUuid(task.uuid.clone()),
            LinkCriterion::Live,
        ]))?;
        let mut existing: HashSet<String> = live.into_iter().map(|link| link.tag_uuid).collect();
        let mut linked: HashSet<String> = HashSet::new();
        let mut report = SyncReport::default();

        for name in desired {
            let tag = self.resolve_or_create(name)?;
            if existing.remove(&tag.uuid) {
                linked.insert(tag.uuid);
                report.unchanged += 1;
                continue;
            }
            // Names differing only in case resolve to one tag.
            if !linked.insert(tag.uuid.clone()) {
                continue;
            }
            self.store
                .insert_link(Association::new(task, tag.name.clone(), tag.uuid))?;
            report.created.push(tag.name);
        }

        let stale: Vec<String> = existing.into_iter().collect();
        self.delete_links_locked(task, &stale)?;
        report.tombstoned = stale;

        info!(
            task = %task.uuid,
            created = report.created.len(),
            tombstoned = report.tombstoned.len(),
            unchanged = report.unchanged,
            "synchronized tags"
        );
        Ok(report)
    }

    /// Link `task` to the tag named `tag_name`, creating the tag if needed.
    pub fn create_link(&self, task: &TaskRecord, tag_name: &str) -> Result<UpsertOutcome> {
        let tag = self.resolve_or_create(tag_name)?;
        self.create_link_with_uuid(task, &tag.name, &tag.uuid)
    }

    /// Link `task` to a known tag.
    ///
    /// An existing live link has its name refreshed in place; otherwise a
    /// new link is inserted. The store performs both steps atomically.
    pub fn create_link_with_uuid(
        &self,
        task: &TaskRecord,
        tag_name: &str,
        tag_uuid: &str,
    ) -> Result<UpsertOutcome> {
        let key = LinkCriterion::and([
            LinkCriterion::TaskId(task.id),
            LinkCriterion::TaskUuid(task.uuid.clone()),
            LinkCriterion::TagUuid(tag_uuid.to_string()),
            LinkCriterion::Live,
        ]);
        self.task_locks.lock(&task.uuid).hold(|| {
            self.store
                .upsert_link(&key, Association::new(task, tag_name, tag_uuid))
        })
    }

    /// Tombstone the live links between `task` and each of `tag_uuids`.
    ///
    /// Returns the number of links tombstoned.
    pub fn delete_links(&self, task: &TaskRecord, tag_uuids: &[String]) -> Result<usize> {
        self.task_locks
            .lock(&task.uuid)
            .hold(|| self.delete_links_locked(task, tag_uuids))
    }

    fn delete_links_locked(&self, task: &TaskRecord, tag_uuids: &[String]) -> Result<usize> {
        let update = LinkUpdate::tombstone(Utc::now());
        let mut touched = 0;
        // One update per tag: each recorded change must name its tag.
        for tag_uuid in tag_uuids {
            touched += self.store.update_links(
                &LinkCriterion::and([
                    LinkCriterion::Live,
                    LinkCriterion::TaskUuid(task.uuid.clone()),
                    LinkCriterion::TagUuid(tag_uuid.clone()),
                ]),
                &update,
            )?;
        }
        Ok(touched)
    }

    /// Rename a tag and every live link to it.
    ///
    /// Tombstoned links keep the name they had when removed. Returns the
    /// number of links updated; an unknown `tag_uuid` updates nothing.
    pub fn rename(&self, tag_uuid: &str, new_name: &str) -> Result<usize> {
        self.store
            .rename_tags(&TagCriterion::Uuid(tag_uuid.to_string()), new_name)?;
        let touched = self.store.update_links(
            &LinkCriterion::and([
                LinkCriterion::TagUuid(tag_uuid.to_string()),
                LinkCriterion::Live,
            ]),
            &LinkUpdate::rename(new_name),
        )?;
        info!(tag = %tag_uuid, name = new_name, links = touched, "renamed tag");
        Ok(touched)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Tags with the number of tasks matching `active_filter` carrying each.
    pub fn grouped_tags(
        &self,
        order: TagOrder,
        active_filter: TaskCriterion,
    ) -> Result<GroupedTags<'_, S>> {
        let rows = self.store.group_links(&GroupedQuery {
            links: LinkCriterion::Live,
            tasks: active_filter,
            order,
        })?;
        Ok(GroupedTags {
            store: &self.store,
            rows,
        })
    }

    /// Live tags on `task`, ordered by name case-insensitively.
    pub fn tags_for_task(&self, task: &TaskRecord) -> Result<Vec<TaskTag>> {
        let mut links = self.store.query_links(&LinkCriterion::and([
            LinkCriterion::TaskId(task.id),
            LinkCriterion::Live,
        ]))?;
        links.sort_by(|left, right| cmp_ignore_case(&left.tag_name, &right.tag_name));
        Ok(links
            .into_iter()
            .map(|link| TaskTag {
                name: link.tag_name,
                uuid: link.tag_uuid,
            })
            .collect())
    }

    /// Every tag with a non-blank name, ordered by name.
    pub fn all_tags(&self) -> Result<Vec<Tag>> {
        Ok(self
            .store
            .tags_by_name()?
            .into_iter()
            .filter(|tag| !tag.name.trim().is_empty())
            .collect())
    }

    /// Run a task criterion, e.g. `untagged_criterion` or `tasks_with_tag`.
    pub fn tasks_matching(&self, criterion: &TaskCriterion) -> Result<Vec<TaskRecord>> {
        self.store.query_tasks(criterion)
    }
}

/// Link criterion for rows named `tag` (any case), and `additional`.
pub fn tag_eq_ignore_case(tag: &str, additional: LinkCriterion) -> LinkCriterion {
    LinkCriterion::and([LinkCriterion::TagNameIgnoreCase(tag.to_string()), additional])
}

/// Active, visible tasks without any live tag.
pub fn untagged_criterion() -> TaskCriterion {
    TaskCriterion::and([
        TaskCriterion::not(TaskCriterion::UuidInLinks(LinkCriterion::Live)),
        TaskCriterion::Active,
        TaskCriterion::Visible,
    ])
}

/// Tasks carrying `tag` live, and matching `criterion`.
pub fn tasks_with_tag(tag: &Tag, criterion: TaskCriterion) -> TaskCriterion {
    TaskCriterion::and([
        TaskCriterion::UuidInLinks(LinkCriterion::and([
            LinkCriterion::TagUuid(tag.uuid.clone()),
            LinkCriterion::Live,
        ])),
        criterion,
    ])
}

/// Result of `grouped_tags`.
///
/// Rows are resolved to their tag lazily on each iteration; a row whose tag
/// no longer exists is skipped. Iterating again starts over.
pub struct GroupedTags<'a, S> {
    store: &'a S,
    rows: Vec<TagGroupRow>,
}

impl<'a, S: TagStore> GroupedTags<'a, S> {
    pub fn iter(&self) -> GroupedTagsIter<'_, S> {
        GroupedTagsIter {
            store: self.store,
            rows: self.rows.iter().collect(),
        }
    }

    /// Resolve every row.
    pub fn to_vec(&self) -> Result<Vec<TagCount>> {
        self.iter().collect()
    }

    /// Number of grouped rows before resolution.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

pub struct GroupedTagsIter<'a, S> {
    store: &'a S,
    rows: VecDeque<&'a TagGroupRow>,
}

impl<'a, S: TagStore> Iterator for GroupedTagsIter<'a, S> {
    type Item = Result<TagCount>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(row) = self.rows.pop_front() {
            match self.store.find_tag(&TagCriterion::Uuid(row.tag_uuid.clone())) {
                Ok(Some(tag)) => {
                    return Some(Ok(TagCount {
                        tag,
                        count: row.count,
                    }))
                }
                Ok(None) => {
                    warn!(
                        tag = %row.tag_uuid,
                        name = %row.tag_name,
                        "grouped tag no longer exists"
                    );
                }
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }
}
