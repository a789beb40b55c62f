// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! GitHub REST v3 implementation of [`ContentService`].
//!
//! Uses the contents API for files and directories, the branches API for
//! head commits and the commits API to inspect a recorded hash. File bodies travel base64-encoded. Every request carries the
//! bearer token and is bounded by the configured request timeout.

use super::{CommitInfo, ContentService, DirEntry, EntryKind, RemoteFile, WriteOutcome};
use crate::config::RemoteConfig;
use crate::error::{MirrorError, Result};
use crate::store::BoxFuture;
use crate::target::RepositoryTarget;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Deserialize)]
struct ContentFile {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize)]
struct PutContent<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    #[serde(default)]
    commit: Option<CommitRef>,
}

#[derive(Debug, Deserialize)]
struct Branch {
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct CommitSignature {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    author: Option<CommitSignature>,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    commit: CommitDetail,
}

/// HTTP client for the GitHub API.
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("token", &crate::config::mask_secret(&self.token))
            .finish()
    }
}

impl GitHubClient {
    /// Build a client. Fails if no token is configured.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let token = config.require_token()?.to_string();
        let client = Client::builder()
            .timeout(config.request_timeout_duration())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| MirrorError::Config(format!("Cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, target: &RepositoryTarget, suffix: &str, branch: Option<&str>) -> Result<Url> {
        let raw = format!(
            "{}/repos/{}/{}{}",
            self.base_url, target.owner, target.name, suffix
        );
        let mut url = Url::parse(&raw)
            .map_err(|e| MirrorError::Config(format!("Invalid API URL {}: {}", raw, e)))?;
        if let Some(branch) = branch {
            url.query_pairs_mut().append_pair("ref", branch);
        }
        Ok(url)
    }

    fn contents_url(&self, target: &RepositoryTarget, path: &str, branch: Option<&str>) -> Result<Url> {
        let path = path.trim_matches('/');
        let suffix = if path.is_empty() {
            "/contents".to_string()
        } else {
            format!("/contents/{}", path)
        };
        self.url(target, &suffix, branch)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Send a request; returns the response only for 2xx.
    async fn send(
        &self,
        target: &RepositoryTarget,
        operation: &'static str,
        path: &str,
        request: RequestBuilder,
        is_write: bool,
    ) -> Result<reqwest::Response> {
        let repository = target.key();
        let started = Instant::now();

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                crate::metrics::record_remote_call(&repository, operation, false, started.elapsed());
                let message = if e.is_timeout() {
                    format!("{} timed out", operation)
                } else {
                    format!("{} failed: {}", operation, e)
                };
                return Err(MirrorError::remote(repository, message));
            }
        };

        let status = response.status();
        crate::metrics::record_remote_call(&repository, operation, status.is_success(), started.elapsed());
        debug!(repository = %repository, operation, status = status.as_u16(), "GitHub response");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_status(&repository, path, status, &body, is_write))
    }

    async fn write(
        &self,
        target: &RepositoryTarget,
        operation: &'static str,
        path: &str,
        content: &[u8],
        message: &str,
        revision: Option<&str>,
    ) -> Result<WriteOutcome> {
        let url = self.contents_url(target, path, None)?;
        let body = PutContent {
            message,
            content: BASE64.encode(content),
            branch: &target.branch,
            sha: revision,
        };
        let request = self.request(Method::PUT, url).json(&body);
        let response = self.send(target, operation, path, request, true).await?;

        // The write already happened; an unreadable body only loses the commit id.
        let commit_sha = match response.json::<PutResponse>().await {
            Ok(parsed) => parsed.commit.map(|c| c.sha).filter(|s| !s.is_empty()),
            Err(e) => {
                debug!(repository = %target.key(), path, error = %e, "Unreadable write response");
                None
            }
        };
        Ok(WriteOutcome { commit_sha })
    }
}

/// Map a non-2xx status onto the remote error taxonomy.
fn map_status(repository: &str, path: &str, status: StatusCode, body: &str, is_write: bool) -> MirrorError {
    match status {
        StatusCode::NOT_FOUND => MirrorError::RemoteNotFound {
            repository: repository.to_string(),
            path: path.to_string(),
        },
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY if is_write => MirrorError::RemoteConflict {
            repository: repository.to_string(),
            path: path.to_string(),
        },
        _ => {
            let snippet: String = body.chars().take(200).collect();
            MirrorError::remote(
                repository,
                format!("HTTP {} for {}: {}", status.as_u16(), path, snippet.trim()),
            )
        }
    }
}

fn unexpected(repository: &str, what: &str, e: impl std::fmt::Display) -> MirrorError {
    MirrorError::remote(repository, format!("unexpected {} response: {}", what, e))
}

fn decode_content(repository: &str, file: &ContentFile) -> Result<Vec<u8>> {
    match file.encoding.as_deref() {
        Some("base64") | None => {
            let compact: String = file.content.chars().filter(|c| !c.is_whitespace()).collect();
            BASE64
                .decode(compact.as_bytes())
                .map_err(|e| unexpected(repository, "file content", e))
        }
        Some(other) => Err(unexpected(repository, "file content", format!("encoding {}", other))),
    }
}

impl ContentService for GitHubClient {
    fn get_repository<'a>(&'a self, target: &'a RepositoryTarget) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let url = self.url(target, "", None)?;
            let request = self.request(Method::GET, url);
            self.send(target, "get_repository", "", request, false).await?;
            Ok(())
        })
    }

    fn get_file<'a>(
        &'a self,
        target: &'a RepositoryTarget,
        path: &'a str,
    ) -> BoxFuture<'a, Option<RemoteFile>> {
        Box::pin(async move {
            let url = self.contents_url(target, path, Some(target.branch.as_str()))?;
            let request = self.request(Method::GET, url);
            let response = match self.send(target, "get_file", path, request, false).await {
                Ok(response) => response,
                Err(MirrorError::RemoteNotFound { .. }) => return Ok(None),
                Err(e) => return Err(e),
            };

            let repository = target.key();
            let file: ContentFile = response
                .json()
                .await
                .map_err(|e| unexpected(&repository, "get_file", e))?;
            let content = decode_content(&repository, &file)?;
            Ok(Some(RemoteFile {
                content,
                sha: file.sha,
            }))
        })
    }

    fn create_file<'a>(
        &'a self,
        target: &'a RepositoryTarget,
        path: &'a str,
        content: &'a [u8],
        message: &'a str,
    ) -> BoxFuture<'a, WriteOutcome> {
        Box::pin(async move { self.write(target, "create_file", path, content, message, None).await })
    }

    fn update_file<'a>(
        &'a self,
        target: &'a RepositoryTarget,
        path: &'a str,
        content: &'a [u8],
        message: &'a str,
        revision: &'a str,
    ) -> BoxFuture<'a, WriteOutcome> {
        Box::pin(async move {
            self.write(target, "update_file", path, content, message, Some(revision))
                .await
        })
    }

    fn list_directory<'a>(
        &'a self,
        target: &'a RepositoryTarget,
        path: &'a str,
    ) -> BoxFuture<'a, Vec<DirEntry>> {
        Box::pin(async move {
            let url = self.contents_url(target, path, Some(target.branch.as_str()))?;
            let request = self.request(Method::GET, url);
            let response = self.send(target, "list_directory", path, request, false).await?;

            let entries: Vec<ContentEntry> = response
                .json()
                .await
                .map_err(|e| unexpected(&target.key(), "list_directory", e))?;

            Ok(entries
                .into_iter()
                .map(|entry| DirEntry {
                    kind: match entry.kind.as_str() {
                        "file" => EntryKind::File,
                        "dir" => EntryKind::Dir,
                        _ => EntryKind::Other,
                    },
                    name: entry.name,
                    path: entry.path,
                })
                .collect())
        })
    }

    fn get_branch_head<'a>(&'a self, target: &'a RepositoryTarget) -> BoxFuture<'a, String> {
        Box::pin(async move {
            let suffix = format!("/branches/{}", target.branch);
            let url = self.url(target, &suffix, None)?;
            let request = self.request(Method::GET, url);
            let response = self
                .send(target, "get_branch_head", &target.branch, request, false)
                .await?;

            let branch: Branch = response
                .json()
                .await
                .map_err(|e| unexpected(&target.key(), "get_branch_head", e))?;
            Ok(branch.commit.sha)
        })
    }

    fn get_commit<'a>(
        &'a self,
        target: &'a RepositoryTarget,
        sha: &'a str,
    ) -> BoxFuture<'a, Option<CommitInfo>> {
        Box::pin(async move {
            let suffix = format!("/commits/{}", sha);
            let url = self.url(target, &suffix, None)?;
            let request = self.request(Method::GET, url);
            let response = match self.send(target, "get_commit", sha, request, false).await {
                Ok(response) => response,
                Err(MirrorError::RemoteNotFound { .. }) => return Ok(None),
                // GitHub answers 422 for a hash it has never seen.
                Err(MirrorError::RemoteUnavailable { message, .. }) if message.starts_with("HTTP 422") => {
                    return Ok(None)
                }
                Err(e) => return Err(e),
            };

            let parsed: CommitResponse = response
                .json()
                .await
                .map_err(|e| unexpected(&target.key(), "get_commit", e))?;
            let author = parsed.commit.author;
            Ok(Some(CommitInfo {
                sha: parsed.sha,
                message: parsed.commit.message,
                author: author.as_ref().and_then(|a| a.name.clone()),
                date: author.and_then(|a| a.date),
            }))
        })
    }
}
