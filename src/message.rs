// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Message types: the local record, the mirrored JSON envelope, and the
//! annotated views returned by the reconciliation reader.

use crate::error::Result;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Map of repository key (`owner/name`) to commit hash.
pub type CommitMap = BTreeMap<String, String>;

/// A message in the local store. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub content: String,
    /// Logical time of the message (ISO-8601); the feed sort key.
    pub timestamp: String,
    /// When the store accepted the row (ISO-8601, store-assigned).
    pub created_at: String,
}

impl Message {
    /// The JSON envelope mirrored to remote repositories.
    pub fn envelope(&self) -> MessageEnvelope {
        MessageEnvelope {
            id: self.id,
            content: self.content.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

/// Canonical file body written to each repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub id: i64,
    pub content: String,
    pub timestamp: String,
}

impl MessageEnvelope {
    /// Pretty-printed JSON (two-space indent), as stored remotely.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a file body fetched from a repository.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A message annotated with every repository it is known to be mirrored to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirroredMessage {
    #[serde(flatten)]
    pub message: Message,
    pub repositories: CommitMap,
}

/// A message envelope read back from a repository, tagged with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    #[serde(flatten)]
    pub envelope: MessageEnvelope,
    pub repository: String,
}

/// Timestamp assigned to new messages: RFC 3339, UTC, microseconds.
///
/// Fixed width so that lexical order in SQLite equals time order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Compare two timestamps by instant when both parse, else by raw text.
///
/// Parseable timestamps sort before unparseable ones.
pub fn compare_timestamps(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
