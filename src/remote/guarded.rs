// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote calls wrapped in the resilience stack.
//!
//! Every call to the content service goes through, in order:
//!
//! ```text
//! rate limiter (shared) → bulkhead (shared) → circuit breaker (per repository) → timeout
//! ```
//!
//! A call that times out or is rejected by an open circuit surfaces as
//! `RemoteUnavailable` for that repository, the same as a transport error,
//! so callers isolate it like any other per-repository failure.

use super::ContentService;
use crate::circuit_breaker::{CircuitError, TargetCircuits};
use crate::config::RemoteConfig;
use crate::error::{MirrorError, Result};
use crate::resilience::{Bulkhead, RateLimiter};
use crate::target::RepositoryTarget;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Content service plus the limits applied to every call.
pub struct GuardedRemote {
    service: Arc<dyn ContentService>,
    limiter: RateLimiter,
    bulkhead: Bulkhead,
    circuits: TargetCircuits,
    timeout: Duration,
}

impl GuardedRemote {
    pub fn new(service: Arc<dyn ContentService>, config: &RemoteConfig) -> Self {
        Self {
            service,
            limiter: RateLimiter::new(config.rate_limit_config()),
            bulkhead: Bulkhead::new(config.max_concurrent_calls),
            circuits: TargetCircuits::new(config.circuit_config()),
            timeout: config.request_timeout_duration(),
        }
    }

    /// The unguarded service.
    pub fn service(&self) -> &dyn ContentService {
        self.service.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn circuits(&self) -> &TargetCircuits {
        &self.circuits
    }

    /// Run one remote call for `target` under the full resilience stack.
    pub async fn call<'a, T, F, Fut>(&'a self, target: &'a RepositoryTarget, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce(&'a dyn ContentService) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = target.key();

        self.limiter.acquire().await;
        let _permit = self
            .bulkhead
            .acquire()
            .await
            .map_err(|e| MirrorError::remote(&key, e.to_string()))?;

        let breaker = self.circuits.get(&key);
        let timeout = self.timeout;
        let service = self.service.as_ref();

        // Not-found is an answer from a healthy service; it must not trip the circuit.
        let result = breaker
            .call(|| async {
                match tokio::time::timeout(timeout, f(service)).await {
                    Ok(Err(e @ MirrorError::RemoteNotFound { .. })) => Ok(Err(e)),
                    Ok(result) => result.map(Ok),
                    Err(_) => Err(MirrorError::remote(
                        &key,
                        format!("{} timed out after {}", operation, humantime::format_duration(timeout)),
                    )),
                }
            })
            .await;

        match result {
            Ok(answer) => answer,
            Err(CircuitError::Inner(e)) => Err(e),
            Err(CircuitError::Rejected) => Err(MirrorError::remote(
                &key,
                format!("circuit open, {} not attempted", operation),
            )),
        }
    }
}
