// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Repository registry: the configured set of mirror targets.
//!
//! Persisted as a JSON array of targets. Mutations are rare administrative
//! operations, so the whole document is rewritten on every change
//! (last writer wins). Writes go to a sibling temp file that is then renamed
//! over the document, so a crash never leaves a half-written registry.
//!
//! ```json
//! [
//!   { "owner": "alice", "name": "notes", "branch": "main", "storage_path": "messages" }
//! ]
//! ```

use crate::error::{MirrorError, Result};
use crate::target::RepositoryTarget;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Result of adding a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new key was added.
    Added,
    /// An existing key's branch or storage path was replaced.
    Updated,
    /// Identical entry already present.
    Unchanged,
}

/// In-memory view of the registry document, written through on mutation.
#[derive(Debug)]
pub struct TargetRegistry {
    path: PathBuf,
    targets: RwLock<Vec<RepositoryTarget>>,
}

impl TargetRegistry {
    /// Load an existing registry document.
    ///
    /// A missing or corrupt document is a configuration error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(MirrorError::Config(format!(
                "Repository registry not found at {}",
                path.display()
            )));
        }
        let targets = read_document(&path)?;
        info!(path = %path.display(), targets = targets.len(), "Loaded repository registry");
        Ok(Self {
            path,
            targets: RwLock::new(targets),
        })
    }

    /// Load the registry, creating an empty document if none exists.
    pub fn open_or_init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            write_document(path, &[])?;
            info!(path = %path.display(), "Created empty repository registry");
        }
        Self::load(path)
    }

    /// Registry that is never persisted anywhere useful (tests).
    pub fn in_memory(targets: Vec<RepositoryTarget>) -> Self {
        Self {
            path: PathBuf::new(),
            targets: RwLock::new(targets),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current targets, in registration order.
    pub async fn snapshot(&self) -> Vec<RepositoryTarget> {
        self.targets.read().await.clone()
    }

    pub async fn get(&self, key: &str) -> Option<RepositoryTarget> {
        self.targets.read().await.iter().find(|t| t.key() == key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.targets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.targets.read().await.is_empty()
    }

    /// Add a target, replacing any existing entry with the same key.
    ///
    /// The document is written before the in-memory view changes; if the
    /// write fails the registry is left as it was.
    pub async fn upsert(&self, target: RepositoryTarget) -> Result<Registration> {
        target.validate()?;
        let mut targets = self.targets.write().await;

        let key = target.key();
        let mut staged = targets.clone();
        let outcome = match staged.iter_mut().find(|t| t.key() == key) {
            Some(existing) if *existing == target => return Ok(Registration::Unchanged),
            Some(existing) => {
                *existing = target;
                Registration::Updated
            }
            None => {
                staged.push(target);
                Registration::Added
            }
        };

        self.persist(&staged)?;
        *targets = staged;
        debug!(repository = %key, ?outcome, "Registry updated");
        Ok(outcome)
    }

    /// Remove a target by key. Returns the removed entry, if any.
    pub async fn remove(&self, key: &str) -> Result<Option<RepositoryTarget>> {
        let mut targets = self.targets.write().await;
        let Some(index) = targets.iter().position(|t| t.key() == key) else {
            return Ok(None);
        };
        let mut staged = targets.clone();
        let removed = staged.remove(index);
        self.persist(&staged)?;
        *targets = staged;
        debug!(repository = %key, "Removed from registry");
        Ok(Some(removed))
    }

    fn persist(&self, targets: &[RepositoryTarget]) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        write_document(&self.path, targets)
    }
}

fn read_document(path: &Path) -> Result<Vec<RepositoryTarget>> {
    let raw = std::fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let targets: Vec<RepositoryTarget> = serde_json::from_str(&raw).map_err(|e| {
        MirrorError::Config(format!("Invalid repository registry {}: {}", path.display(), e))
    })?;
    for target in &targets {
        target.validate().map_err(|e| {
            MirrorError::Config(format!("Invalid entry in {}: {}", path.display(), e))
        })?;
    }
    Ok(targets)
}

fn write_document(path: &Path, targets: &[RepositoryTarget]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(targets)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
