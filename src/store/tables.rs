//! Row tables and the query evaluator shared by every store backend.
//!
//! Mutators push one `RowChange` per row written onto `pending`. Backends
//! deliver `pending` to their recorder only after the rows are committed.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::changes::RowChange;
use crate::error::{Error, Result};
use crate::model::{Association, LinkUpdate, Tag, TaskRecord, TaskUpdate, UpsertOutcome};
use crate::query::{
    cmp_ignore_case, eq_ignore_case, GroupedQuery, LinkCriterion, TagCriterion, TagGroupRow,
    TaskCriterion,
};

/// Outcome of inserting a tag under the case-insensitive unique name rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInsert {
    pub tag: Tag,
    /// False when an existing tag already owned the name.
    pub created: bool,
}

/// Tag, task and link tables with their id sequences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default)]
    next_tag_id: i64,
    #[serde(default)]
    next_task_id: i64,
    #[serde(default)]
    next_link_id: i64,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    tasks: Vec<TaskRecord>,
    #[serde(default)]
    links: Vec<Association>,
}

fn next_id(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Tags
    // =========================================================================

    pub fn find_tag(&self, criterion: &TagCriterion) -> Option<Tag> {
        self.tags.iter().find(|tag| criterion.matches(tag)).cloned()
    }

    pub fn tags_by_name(&self) -> Vec<Tag> {
        let mut tags = self.tags.clone();
        tags.sort_by(|left, right| cmp_ignore_case(&left.name, &right.name));
        tags
    }

    pub fn insert_tag(&mut self, mut tag: Tag, pending: &mut Vec<RowChange>) -> TagInsert {
        let existing = self.find_tag(&TagCriterion::NameIgnoreCase(tag.name.clone()));
        if let Some(existing) = existing {
            return TagInsert {
                tag: existing,
                created: false,
            };
        }

        tag.id = next_id(&mut self.next_tag_id);
        self.tags.push(tag.clone());
        debug!(tag = %tag.uuid, name = %tag.name, "inserted tag");
        pending.push(RowChange::tag_inserted(&tag));
        TagInsert { tag, created: true }
    }

    pub fn rename_tags(
        &mut self,
        criterion: &TagCriterion,
        name: &str,
        pending: &mut Vec<RowChange>,
    ) -> Result<usize> {
        let taken = self
            .tags
            .iter()
            .any(|tag| !criterion.matches(tag) && eq_ignore_case(&tag.name, name));
        if taken {
            return Err(Error::StoreFailed(format!(
                "unique constraint: tag name '{name}' already exists"
            )));
        }

        let mut touched = 0;
        for tag in self.tags.iter_mut().filter(|tag| criterion.matches(tag)) {
            tag.name = name.to_string();
            pending.push(RowChange::tag_renamed(tag));
            touched += 1;
        }
        Ok(touched)
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    pub fn insert_task(&mut self, mut task: TaskRecord) -> TaskRecord {
        task.id = next_id(&mut self.next_task_id);
        self.tasks.push(task.clone());
        task
    }

    pub fn query_tasks(&self, criterion: &TaskCriterion) -> Vec<TaskRecord> {
        let now = Utc::now();
        self.tasks
            .iter()
            .filter(|task| criterion.matches(task, &self.links, now))
            .cloned()
            .collect()
    }

    pub fn update_tasks(&mut self, criterion: &TaskCriterion, update: &TaskUpdate) -> usize {
        let now = Utc::now();
        let links = &self.links;
        let mut touched = 0;
        for task in self.tasks.iter_mut() {
            if criterion.matches(task, links, now) {
                update.apply(task);
                touched += 1;
            }
        }
        touched
    }

    // =========================================================================
    // Links
    // =========================================================================

    pub fn query_links(&self, criterion: &LinkCriterion) -> Vec<Association> {
        self.links
            .iter()
            .filter(|link| criterion.matches(link))
            .cloned()
            .collect()
    }

    pub fn insert_link(
        &mut self,
        mut link: Association,
        pending: &mut Vec<RowChange>,
    ) -> Result<Association> {
        link.id = self.next_link_id + 1;
        let change = RowChange::link_inserted(&link)?;
        self.next_link_id = link.id;
        self.links.push(link.clone());
        debug!(task = %link.task_uuid, tag = %link.tag_uuid, "inserted link");
        pending.push(change);
        Ok(link)
    }

    pub fn update_links(
        &mut self,
        criterion: &LinkCriterion,
        update: &LinkUpdate,
        pending: &mut Vec<RowChange>,
    ) -> usize {
        let mut touched = 0;
        for link in self.links.iter_mut().filter(|link| criterion.matches(link)) {
            update.apply(link);
            debug!(link = link.id, tag = %link.tag_uuid, "updated link");
            pending.push(RowChange::link_updated(link, update));
            touched += 1;
        }
        touched
    }

    /// Update rows matching `criterion` with `link`'s name, or insert `link`.
    pub fn upsert_link(
        &mut self,
        criterion: &LinkCriterion,
        link: Association,
        pending: &mut Vec<RowChange>,
    ) -> Result<UpsertOutcome> {
        let update = LinkUpdate::rename(link.tag_name.clone());
        let touched = self.update_links(criterion, &update, pending);
        if touched > 0 {
            return Ok(UpsertOutcome::Updated(touched));
        }
        self.insert_link(link, pending).map(UpsertOutcome::Inserted)
    }

    pub fn group_links(&self, query: &GroupedQuery) -> Vec<TagGroupRow> {
        let now = Utc::now();
        let tasks: HashMap<i64, &TaskRecord> =
            self.tasks.iter().map(|task| (task.id, task)).collect();

        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut rows: Vec<TagGroupRow> = Vec::new();
        for link in self.links.iter().filter(|link| query.links.matches(link)) {
            let Some(task) = tasks.get(&link.task_id) else {
                continue;
            };
            if !query.tasks.matches(task, &self.links, now) {
                continue;
            }
            match index.get(link.tag_name.as_str()) {
                Some(&slot) => rows[slot].count += 1,
                None => {
                    index.insert(link.tag_name.as_str(), rows.len());
                    rows.push(TagGroupRow {
                        tag_name: link.tag_name.clone(),
                        tag_uuid: link.tag_uuid.clone(),
                        count: 1,
                    });
                }
            }
        }

        rows.sort_by(|left, right| query.order.compare(left, right));
        rows
    }
}
