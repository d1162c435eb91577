//! Query building over the tag, task and link tables.
//!
//! Criteria are plain values: they can be built once, stored, combined and
//! evaluated by any store. `TaskCriterion::UuidInLinks` is the sub-select
//! `task.uuid IN (SELECT task_uuid FROM links WHERE ...)`.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Association, Tag, TaskRecord};

/// Case-insensitive equality used for tag identity.
pub fn eq_ignore_case(left: &str, right: &str) -> bool {
    left == right || left.to_lowercase() == right.to_lowercase()
}

/// Case-insensitive ascending order, raw name as tie break.
pub fn cmp_ignore_case(left: &str, right: &str) -> Ordering {
    left.to_uppercase()
        .cmp(&right.to_uppercase())
        .then_with(|| left.cmp(right))
}

/// Predicate over link rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCriterion {
    All,
    /// Not tombstoned.
    Live,
    TaskId(i64),
    TaskUuid(String),
    TagUuid(String),
    TagUuidIn(Vec<String>),
    TagNameIgnoreCase(String),
    And(Vec<LinkCriterion>),
    Or(Vec<LinkCriterion>),
    Not(Box<LinkCriterion>),
}

impl LinkCriterion {
    pub fn and(parts: impl IntoIterator<Item = LinkCriterion>) -> Self {
        LinkCriterion::And(parts.into_iter().collect())
    }

    pub fn or(parts: impl IntoIterator<Item = LinkCriterion>) -> Self {
        LinkCriterion::Or(parts.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: LinkCriterion) -> Self {
        LinkCriterion::Not(Box::new(inner))
    }

    pub fn matches(&self, link: &Association) -> bool {
        match self {
            LinkCriterion::All => true,
            LinkCriterion::Live => link.is_live(),
            LinkCriterion::TaskId(id) => link.task_id == *id,
            LinkCriterion::TaskUuid(uuid) => link.task_uuid == *uuid,
            LinkCriterion::TagUuid(uuid) => link.tag_uuid == *uuid,
            LinkCriterion::TagUuidIn(uuids) => uuids.iter().any(|uuid| *uuid == link.tag_uuid),
            LinkCriterion::TagNameIgnoreCase(name) => eq_ignore_case(&link.tag_name, name),
            LinkCriterion::And(parts) => parts.iter().all(|part| part.matches(link)),
            LinkCriterion::Or(parts) => parts.iter().any(|part| part.matches(link)),
            LinkCriterion::Not(inner) => !inner.matches(link),
        }
    }
}

/// Predicate over tag rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagCriterion {
    Uuid(String),
    NameIgnoreCase(String),
}

impl TagCriterion {
    pub fn matches(&self, tag: &Tag) -> bool {
        match self {
            TagCriterion::Uuid(uuid) => tag.uuid == *uuid,
            TagCriterion::NameIgnoreCase(name) => eq_ignore_case(&tag.name, name),
        }
    }
}

/// Predicate over task rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskCriterion {
    All,
    /// Neither completed nor deleted.
    Active,
    /// Not hidden at evaluation time.
    Visible,
    Id(i64),
    Uuid(String),
    /// `uuid IN (SELECT task_uuid FROM links WHERE <criterion>)`
    UuidInLinks(LinkCriterion),
    And(Vec<TaskCriterion>),
    Or(Vec<TaskCriterion>),
    Not(Box<TaskCriterion>),
}

impl TaskCriterion {
    pub fn and(parts: impl IntoIterator<Item = TaskCriterion>) -> Self {
        TaskCriterion::And(parts.into_iter().collect())
    }

    pub fn or(parts: impl IntoIterator<Item = TaskCriterion>) -> Self {
        TaskCriterion::Or(parts.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: TaskCriterion) -> Self {
        TaskCriterion::Not(Box::new(inner))
    }

    /// "Active and visible", the default filter for tag counts.
    pub fn active_visible() -> Self {
        TaskCriterion::and([TaskCriterion::Active, TaskCriterion::Visible])
    }

    /// Evaluate against one task. `links` backs the `UuidInLinks` sub-select.
    pub fn matches(&self, task: &TaskRecord, links: &[Association], now: DateTime<Utc>) -> bool {
        match self {
            TaskCriterion::All => true,
            TaskCriterion::Active => task.is_active(),
            TaskCriterion::Visible => task.is_visible(now),
            TaskCriterion::Id(id) => task.id == *id,
            TaskCriterion::Uuid(uuid) => task.uuid == *uuid,
            TaskCriterion::UuidInLinks(criterion) => links
                .iter()
                .any(|link| link.task_uuid == task.uuid && criterion.matches(link)),
            TaskCriterion::And(parts) => parts.iter().all(|part| part.matches(task, links, now)),
            TaskCriterion::Or(parts) => parts.iter().any(|part| part.matches(task, links, now)),
            TaskCriterion::Not(inner) => !inner.matches(task, links, now),
        }
    }
}

/// Ordering of grouped tag rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagOrder {
    /// Largest groups first.
    #[default]
    CountDesc,
    CountAsc,
    NameAsc,
    NameDesc,
}

impl TagOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "count_desc" | "size" => Some(TagOrder::CountDesc),
            "count_asc" => Some(TagOrder::CountAsc),
            "name_asc" | "name" => Some(TagOrder::NameAsc),
            "name_desc" => Some(TagOrder::NameDesc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TagOrder::CountDesc => "count_desc",
            TagOrder::CountAsc => "count_asc",
            TagOrder::NameAsc => "name_asc",
            TagOrder::NameDesc => "name_desc",
        }
    }

    /// Compare two grouped rows. Count orders fall back to name ascending.
    pub fn compare(&self, left: &TagGroupRow, right: &TagGroupRow) -> Ordering {
        let by_name = || cmp_ignore_case(&left.tag_name, &right.tag_name);
        match self {
            TagOrder::CountDesc => right.count.cmp(&left.count).then_with(by_name),
            TagOrder::CountAsc => left.count.cmp(&right.count).then_with(by_name),
            TagOrder::NameAsc => by_name(),
            TagOrder::NameDesc => by_name().reverse(),
        }
    }
}

/// `SELECT tag_name, tag_uuid, COUNT(*) FROM links JOIN tasks ON links.task_id = tasks.id
///  WHERE <links> AND <tasks> GROUP BY tag_name ORDER BY <order>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedQuery {
    pub links: LinkCriterion,
    pub tasks: TaskCriterion,
    pub order: TagOrder,
}

/// One row of a grouped query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagGroupRow {
    pub tag_name: String,
    pub tag_uuid: String,
    pub count: u64,
}
