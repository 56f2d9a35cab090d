use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Opaque partition key scoping one device's notes to one server-side account.
///
/// Instance ids double as directory names for per-instance storage, so only
/// ASCII alphanumerics, `-` and `_` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Create a new random instance id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Validate and wrap an existing id
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidInstanceId("instance id is empty".to_string()));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(Error::InvalidInstanceId(format!(
                "instance id {:?} contains invalid character {:?}",
                s, c
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current time truncated to millisecond precision (the wire precision).
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Next `updatedAt` value after `previous`.
///
/// Strictly greater than `previous` even when the wall clock has not moved
/// or has stepped backwards.
pub fn next_updated_at(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = now_millis();
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}

fn default_timestamp() -> DateTime<Utc> {
    now_millis()
}

/// A note record as stored locally and exchanged with the server.
///
/// `id` defaults to empty when absent on the wire so that one malformed record
/// fails validation on its own instead of failing the whole payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Serialized rich-text document, opaque to the store
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub synced: bool,
    #[serde(default)]
    pub owner_id: String,
}

impl Note {
    /// Build a fresh, unsynced note from a draft.
    pub fn from_draft(draft: NoteDraft, owner_id: &InstanceId) -> Self {
        let now = now_millis();
        let preview = draft
            .preview
            .unwrap_or_else(|| crate::preview::derive_preview(&draft.body));

        Self {
            id: draft.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            title: draft.title,
            preview,
            tags: draft.tags,
            body: draft.body,
            created_at: now,
            updated_at: now,
            synced: false,
            owner_id: owner_id.as_str().to_string(),
        }
    }

    /// Check the fields required before a note may be persisted.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidNote("note id is missing".to_string()));
        }
        if self.id.trim() != self.id {
            return Err(Error::InvalidNote(format!(
                "note id {:?} has surrounding whitespace",
                self.id
            )));
        }
        Ok(())
    }

    /// Apply local edits, bump `updatedAt` and mark the note dirty.
    ///
    /// Returns false (and leaves the note untouched) when the changes would not
    /// alter any field.
    pub fn apply_changes(&mut self, changes: NoteChanges) -> bool {
        let mut next = self.clone();

        if let Some(title) = changes.title {
            next.title = title;
        }
        if let Some(tags) = changes.tags {
            next.tags = tags;
        }
        if let Some(body) = changes.body {
            if changes.preview.is_none() {
                next.preview = crate::preview::derive_preview(&body);
            }
            next.body = body;
        }
        if let Some(preview) = changes.preview {
            next.preview = preview;
        }

        let unchanged = next.title == self.title
            && next.tags == self.tags
            && next.body == self.body
            && next.preview == self.preview;
        if unchanged {
            return false;
        }

        next.updated_at = next_updated_at(self.updated_at);
        next.synced = false;
        *self = next;
        true
    }
}

/// Input for creating a note locally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    /// Caller-chosen id; a UUID v4 is generated when absent
    pub id: Option<String>,
    pub title: String,
    pub tags: Vec<String>,
    pub body: String,
    /// Explicit preview; derived from the body when absent
    pub preview: Option<String>,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Field changes for a local edit; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub body: Option<String>,
    pub preview: Option<String>,
}

impl NoteChanges {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::default()
        }
    }

    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: Some(tags.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.tags.is_none() && self.body.is_none() && self.preview.is_none()
    }
}

/// Sync state of a single note id in the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteSyncState {
    /// Neither a note nor a tombstone exists locally
    Absent,
    /// Created locally, never confirmed by the server
    New,
    /// Confirmed at least once, with local changes pending
    Dirty,
    /// Local copy matches the last server confirmation
    Synced,
    /// Deleted locally; server deletion not yet confirmed
    Tombstoned,
}

impl fmt::Display for NoteSyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoteSyncState::Absent => "absent",
            NoteSyncState::New => "new",
            NoteSyncState::Dirty => "dirty",
            NoteSyncState::Synced => "synced",
            NoteSyncState::Tombstoned => "tombstoned",
        };
        f.write_str(s)
    }
}
