//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - An in-memory content service with failure injection
//! - A store wrapper whose repository writes can be made to fail
//! - Service construction over an in-memory SQLite store

#![allow(dead_code)]

pub mod failing_store;
pub mod mock_remote;

pub use failing_store::FailingStore;
pub use mock_remote::*;

use message_mirror::config::MirrorConfig;
use message_mirror::registry::TargetRegistry;
use message_mirror::store::SqliteStore;
use message_mirror::target::RepositoryTarget;
use message_mirror::MirrorService;
use std::sync::Arc;

/// Config with a token, no meaningful rate limit and a short timeout.
pub fn test_config() -> MirrorConfig {
    let mut config = MirrorConfig::default();
    config.database.sqlite_path = ":memory:".to_string();
    config.remote.token = Some("test-token".to_string());
    config.remote.request_timeout = "500ms".to_string();
    config.remote.rate_limit_per_sec = 10_000;
    config.remote.rate_limit_burst = 10_000;
    config
}

pub fn target(key: &str) -> RepositoryTarget {
    RepositoryTarget::from_key(key).expect("valid repo key")
}

/// Service over an in-memory store, registering `keys` as targets.
pub async fn service_with(
    remote: Arc<MockRemote>,
    keys: &[&str],
    config: MirrorConfig,
) -> (MirrorService, SqliteStore) {
    let store = SqliteStore::in_memory().await.expect("in-memory store");
    let registry = TargetRegistry::in_memory(keys.iter().map(|k| target(k)).collect());
    let service = MirrorService::new(config, Arc::new(store.clone()), registry, remote)
        .await
        .expect("service");
    (service, store)
}

/// Service over a [`FailingStore`] and a caller-built registry.
pub async fn service_over(
    remote: Arc<MockRemote>,
    registry: TargetRegistry,
) -> (MirrorService, Arc<FailingStore>, SqliteStore) {
    let inner = SqliteStore::in_memory().await.expect("in-memory store");
    let store = Arc::new(FailingStore::new(inner.clone()));
    let service = MirrorService::new(test_config(), store.clone(), registry, remote)
        .await
        .expect("service");
    (service, store, inner)
}

/// Service with the default test config.
pub async fn service(remote: Arc<MockRemote>, keys: &[&str]) -> (MirrorService, SqliteStore) {
    service_with(remote, keys, test_config()).await
}
