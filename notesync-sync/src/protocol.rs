/// Sync protocol definitions and endpoint abstractions
///
/// Defines the JSON messages exchanged with a remote sync endpoint and the
/// trait every transport implements.

use async_trait::async_trait;
use notesync_core::{InstanceId, Note};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Route for the push operation
pub const PUSH_PATH: &str = "/api/syncnotes";
/// Route for the pull operation
pub const PULL_PATH: &str = "/api/fetchnotes";
/// Route for the delete-one operation
pub const DELETE_PATH: &str = "/api/deletenote";

/// A note record that could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedNote {
    /// The record's `id`, when it had a readable one
    pub id: Option<String>,
    pub error: String,
}

/// Decode note records one at a time so a single malformed record does not
/// fail the whole message.
pub fn decode_notes(records: Vec<Value>) -> (Vec<Note>, Vec<RejectedNote>) {
    let mut notes = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();
    for record in records {
        let id = record
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string);
        match serde_json::from_value::<Note>(record) {
            Ok(note) => notes.push(note),
            Err(e) => rejected.push(RejectedNote {
                id,
                error: e.to_string(),
            }),
        }
    }
    (notes, rejected)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPushRequest {
    #[serde(default)]
    instance_id: String,
    #[serde(default)]
    notes: Vec<Value>,
    #[serde(default)]
    tombstone_ids: Vec<String>,
}

impl From<RawPushRequest> for PushRequest {
    fn from(raw: RawPushRequest) -> Self {
        let (notes, rejected) = decode_notes(raw.notes);
        Self {
            instance_id: raw.instance_id,
            notes,
            tombstone_ids: raw.tombstone_ids,
            rejected,
        }
    }
}

/// Dirty notes and pending tombstones sent in one push
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawPushRequest")]
pub struct PushRequest {
    pub instance_id: String,
    pub notes: Vec<Note>,
    pub tombstone_ids: Vec<String>,
    /// Records dropped while decoding; never sent
    #[serde(skip)]
    pub rejected: Vec<RejectedNote>,
}

impl PushRequest {
    pub fn new(instance_id: impl Into<String>, notes: Vec<Note>, tombstone_ids: Vec<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            notes,
            tombstone_ids,
            rejected: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Notes the server stored, as stored
    #[serde(default)]
    pub accepted_notes: Vec<Note>,
    /// Whether every tombstone in the request was applied
    #[serde(default)]
    pub tombstones_processed: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPullResponse {
    #[serde(default)]
    notes: Vec<Value>,
    #[serde(default)]
    tombstone_ids: Vec<String>,
}

impl From<RawPullResponse> for PullResponse {
    fn from(raw: RawPullResponse) -> Self {
        let (notes, rejected) = decode_notes(raw.notes);
        Self {
            notes,
            tombstone_ids: raw.tombstone_ids,
            rejected,
        }
    }
}

/// Full note and tombstone set of one partition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawPullResponse")]
pub struct PullResponse {
    pub notes: Vec<Note>,
    pub tombstone_ids: Vec<String>,
    /// Records dropped while decoding
    #[serde(skip)]
    pub rejected: Vec<RejectedNote>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullQuery {
    #[serde(default)]
    pub instance_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub note_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub processed: bool,
}

/// A remote sync endpoint holding notes partitioned by instance id
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Upload dirty notes and tombstones
    async fn push(&self, request: PushRequest) -> Result<PushResponse>;

    /// Fetch the partition's notes and server tombstones
    async fn pull(&self, instance_id: &InstanceId) -> Result<PullResponse>;

    /// Delete a single note immediately
    async fn delete_one(&self, request: DeleteRequest) -> Result<DeleteResponse>;

    /// Short description for logs
    fn describe(&self) -> String;
}
