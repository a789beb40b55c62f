// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Repository targets: where messages get mirrored.
//!
//! A target is uniquely identified by `owner/name` (its *repository key*).
//! Each message lands at a deterministic path under the target's storage
//! prefix, so re-pushing the same message id updates the same file.

use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};

fn default_branch() -> String {
    "main".to_string()
}

fn default_storage_path() -> String {
    "messages".to_string()
}

/// A remote repository messages are mirrored to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryTarget {
    pub owner: String,
    pub name: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Directory inside the repository holding message files.
    #[serde(default = "default_storage_path", alias = "message_path")]
    pub storage_path: String,
}

impl RepositoryTarget {
    /// Create a target on the default branch and storage path.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            branch: default_branch(),
            storage_path: default_storage_path(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_storage_path(mut self, storage_path: impl Into<String>) -> Self {
        self.storage_path = storage_path.into();
        self
    }

    /// Build a target from a `owner/name` key.
    pub fn from_key(key: &str) -> Result<Self> {
        let (owner, name) = parse_repo_key(key)?;
        Ok(Self::new(owner, name))
    }

    /// The `owner/name` key identifying this target.
    pub fn key(&self) -> String {
        repo_key(&self.owner, &self.name)
    }

    /// Reject registrations missing an owner, name or branch.
    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            return Err(MirrorError::validation("repository owner is required"));
        }
        if self.name.trim().is_empty() {
            return Err(MirrorError::validation("repository name is required"));
        }
        if self.owner.contains('/') || self.name.contains('/') {
            return Err(MirrorError::validation(format!(
                "invalid repository {}: owner and name must not contain '/'",
                self.key()
            )));
        }
        // Keys are parsed back with surrounding whitespace trimmed, so a
        // padded owner or name would never match its own ledger rows.
        if self.owner.contains(char::is_whitespace) || self.name.contains(char::is_whitespace) {
            return Err(MirrorError::validation(format!(
                "invalid repository '{}': owner and name must not contain whitespace",
                self.key()
            )));
        }
        if self.branch.trim().is_empty() {
            return Err(MirrorError::validation("repository branch must not be empty"));
        }
        Ok(())
    }

    /// Storage directory without leading/trailing slashes.
    pub fn storage_dir(&self) -> &str {
        self.storage_path.trim_matches('/')
    }

    /// Deterministic file path for a message id.
    pub fn message_path(&self, message_id: i64) -> String {
        let file = format!("message_{}.json", message_id);
        match self.storage_dir() {
            "" => file,
            dir => format!("{}/{}", dir, file),
        }
    }
}

impl std::fmt::Display for RepositoryTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}:{}", self.owner, self.name, self.branch, self.storage_dir())
    }
}

/// Compose a repository key.
pub fn repo_key(owner: &str, name: &str) -> String {
    format!("{}/{}", owner, name)
}

/// Split an `owner/name` key into its parts.
pub fn parse_repo_key(key: &str) -> Result<(String, String)> {
    match key.split_once('/') {
        Some((owner, name))
            if !owner.trim().is_empty() && !name.trim().is_empty() && !name.contains('/') =>
        {
            Ok((owner.trim().to_string(), name.trim().to_string()))
        }
        _ => Err(MirrorError::validation(format!(
            "invalid repository key '{}': expected owner/name",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let t = RepositoryTarget::new("alice", "notes");
        assert_eq!(t.branch, "main");
        assert_eq!(t.storage_path, "messages");
        assert_eq!(t.key(), "alice/notes");
    }

    #[test]
    fn test_message_path() {
        let t = RepositoryTarget::new("alice", "notes");
        assert_eq!(t.message_path(7), "messages/message_7.json");

        let nested = t.clone().with_storage_path("/chat/archive/");
        assert_eq!(nested.message_path(7), "chat/archive/message_7.json");

        let root = t.with_storage_path("");
        assert_eq!(root.message_path(7), "message_7.json");
    }

    #[test]
    fn test_validate() {
        assert!(RepositoryTarget::new("alice", "notes").validate().is_ok());
        assert!(matches!(
            RepositoryTarget::new("", "notes").validate(),
            Err(MirrorError::Validation(_))
        ));
        assert!(matches!(
            RepositoryTarget::new("alice", "  ").validate(),
            Err(MirrorError::Validation(_))
        ));
        assert!(RepositoryTarget::new("alice", "notes").with_branch("").validate().is_err());
        assert!(RepositoryTarget::new("al/ice", "notes").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_padded_names() {
        for (owner, name) in [(" alice", "notes"), ("alice", "notes "), ("alice", "my notes")] {
            assert!(matches!(
                RepositoryTarget::new(owner, name).validate(),
                Err(MirrorError::Validation(_))
            ));
        }

        // Every valid target's key parses back to the same owner and name.
        let t = RepositoryTarget::new("alice", "notes");
        t.validate().unwrap();
        assert_eq!(parse_repo_key(&t.key()).unwrap(), (t.owner.clone(), t.name.clone()));
    }

    #[test]
    fn test_parse_repo_key() {
        assert_eq!(
            parse_repo_key("alice/notes").unwrap(),
            ("alice".to_string(), "notes".to_string())
        );
        assert!(parse_repo_key("alice").is_err());
        assert!(parse_repo_key("/notes").is_err());
        assert!(parse_repo_key("alice/").is_err());
        assert!(parse_repo_key("a/b/c").is_err());
    }

    #[test]
    fn test_deserialize_original_document_shape() {
        let json = r#"[{"owner": "dth", "name": "IAPchat", "branch": "main", "message_path": "messages"}]"#;
        let targets: Vec<RepositoryTarget> = serde_json::from_str(json).unwrap();
        assert_eq!(targets[0].key(), "dth/IAPchat");
        assert_eq!(targets[0].storage_path, "messages");
    }

    #[test]
    fn test_deserialize_minimal() {
        let json = r#"{"owner": "alice", "name": "notes"}"#;
        let t: RepositoryTarget = serde_json::from_str(json).unwrap();
        assert_eq!(t, RepositoryTarget::new("alice", "notes"));
    }
}
