//! # Message Mirror
//!
//! Stores short text messages in a local SQLite log and mirrors each one as a
//! JSON file to any number of GitHub repositories, recording every
//! repository's commit hash back against the message.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                              MirrorService                                │
//! │                                                                           │
//! │  create_message ──► SqliteStore ──► Replicator ──► commit ledger          │
//! │                    (messages)       (fan-out)      (message_commits)      │
//! │                                        │                                  │
//! │                                        ▼                                  │
//! │  ┌────────────────┐   ┌──────────────────────────────────────────────┐    │
//! │  │ TargetRegistry │──►│ GuardedRemote: rate limit → bulkhead →       │    │
//! │  │ (JSON doc)     │   │ circuit (per repo) → timeout → GitHubClient  │    │
//! │  └────────────────┘   └──────────────────────────────────────────────┘    │
//! │                                        ▲                                  │
//! │  list_messages / fetch_remote ──► ReconciliationReader                    │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The local store is authoritative. Repositories are best-effort mirrors:
//! a failed repository is logged and left out of the message's commit map,
//! and `push` later replays whatever the ledger says is missing.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use message_mirror::{MirrorConfig, MirrorService};
//! use message_mirror::registry::TargetRegistry;
//! use message_mirror::remote::GitHubClient;
//! use message_mirror::store::SqliteStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> message_mirror::Result<()> {
//! let config = MirrorConfig::load()?;
//! let store = SqliteStore::open(&config.database).await?;
//! let registry = TargetRegistry::open_or_init(&config.registry.path)?;
//! let client = GitHubClient::new(&config.remote)?;
//!
//! let service = MirrorService::new(config, Arc::new(store), registry, Arc::new(client)).await?;
//! let created = service.create_message("hello").await?;
//! println!("{} mirrored to {:?}", created.id, created.repositories);
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod http;
pub mod message;
pub mod metrics;
pub mod reader;
pub mod registry;
pub mod remote;
pub mod replication;
pub mod resilience;
pub mod service;
pub mod store;
pub mod target;

// Re-exports for convenience
pub use config::MirrorConfig;
pub use error::{MirrorError, Result};
pub use message::{CommitMap, Message, MessageEnvelope, MirroredMessage, RemoteMessage};
pub use reader::{ReconciliationReader, RemoteFeed};
pub use registry::TargetRegistry;
pub use remote::{ContentService, GitHubClient};
pub use replication::{ReplicationOutcome, Replicator};
pub use service::{CreatedMessage, MirrorService, PushReport, TargetPushStatus};
pub use store::{MessageRepository, SqliteStore};
pub use target::RepositoryTarget;
