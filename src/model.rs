//! Row types shared by the store and the tag engine.
//!
//! Three tables back the engine: tags, tasks and the task-to-tag links.
//! Links are never physically removed; a removed link keeps its row with a
//! tombstone so sync peers can observe the removal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel identifier for a tag that has no stable identity yet.
pub const NO_UUID: &str = "0";

/// Canonical tag entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub uuid: String,
    pub name: String,
}

impl Tag {
    /// Unsaved tag; the store assigns `id` on insert.
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            uuid: uuid.into(),
            name: name.into(),
        }
    }
}

/// Task row as seen by the tag engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: i64,
    pub uuid: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_until: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Unsaved task; the store assigns `id` on insert.
    pub fn new(uuid: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: 0,
            uuid: uuid.into(),
            title: title.into(),
            created_at: Utc::now(),
            completed_at: None,
            deleted_at: None,
            hide_until: None,
        }
    }

    /// Neither completed nor deleted.
    pub fn is_active(&self) -> bool {
        self.completed_at.is_none() && self.deleted_at.is_none()
    }

    /// Not hidden at `now`.
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.hide_until.map(|until| until <= now).unwrap_or(true)
    }
}

/// Deletion state of a link row.
///
/// The only allowed transition is `Live -> Tombstoned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Live,
    Tombstoned { at: DateTime<Utc> },
}

impl LinkState {
    pub fn is_live(&self) -> bool {
        matches!(self, LinkState::Live)
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            LinkState::Live => None,
            LinkState::Tombstoned { at } => Some(*at),
        }
    }

    /// Tombstone a live link. An existing tombstone keeps its original time.
    pub fn tombstone(self, at: DateTime<Utc>) -> LinkState {
        match self {
            LinkState::Live => LinkState::Tombstoned { at },
            tombstoned => tombstoned,
        }
    }
}

/// Stored as a nullable `deleted_at` so rows stay self-describing for peers.
mod link_state_serde {
    use super::LinkState;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(state: &LinkState, serializer: S) -> Result<S::Ok, S::Error> {
        state.deleted_at().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LinkState, D::Error> {
        let deleted_at: Option<DateTime<Utc>> = Option::deserialize(deserializer)?;
        Ok(match deleted_at {
            None => LinkState::Live,
            Some(at) => LinkState::Tombstoned { at },
        })
    }
}

/// Task-to-tag join row.
///
/// `tag_name` duplicates the tag's name so queries and sync payloads do not
/// need the tag table. It is refreshed only by an explicit rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub id: i64,
    pub task_id: i64,
    pub task_uuid: String,
    pub tag_uuid: String,
    pub tag_name: String,
    #[serde(rename = "deleted_at", default = "live", with = "link_state_serde")]
    pub state: LinkState,
}

fn live() -> LinkState {
    LinkState::Live
}

impl Association {
    /// Unsaved live link; the store assigns `id` on insert.
    pub fn new(
        task: &TaskRecord,
        tag_name: impl Into<String>,
        tag_uuid: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            task_id: task.id,
            task_uuid: task.uuid.clone(),
            tag_uuid: tag_uuid.into(),
            tag_name: tag_name.into(),
            state: LinkState::Live,
        }
    }

    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }
}

/// Column changes applied by a conditional link update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkUpdate {
    pub tag_name: Option<String>,
    pub tombstone_at: Option<DateTime<Utc>>,
}

impl LinkUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            tag_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn tombstone(at: DateTime<Utc>) -> Self {
        Self {
            tombstone_at: Some(at),
            ..Self::default()
        }
    }

    pub(crate) fn apply(&self, link: &mut Association) {
        if let Some(name) = &self.tag_name {
            link.tag_name = name.clone();
        }
        if let Some(at) = self.tombstone_at {
            link.state = link.state.tombstone(at);
        }
    }
}

/// Column changes applied by a conditional task update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub hide_until: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    pub(crate) fn apply(&self, task: &mut TaskRecord) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if self.completed_at.is_some() {
            task.completed_at = self.completed_at;
        }
        if self.deleted_at.is_some() {
            task.deleted_at = self.deleted_at;
        }
        if self.hide_until.is_some() {
            task.hide_until = self.hide_until;
        }
    }
}

/// Result of an atomic update-or-insert of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Existing rows matched and were updated in place.
    Updated(usize),
    /// No row matched; this link was inserted.
    Inserted(Association),
}

/// One live tag on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskTag {
    pub name: String,
    pub uuid: String,
}

/// A tag with the number of matching tasks carrying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: Tag,
    pub count: u64,
}
