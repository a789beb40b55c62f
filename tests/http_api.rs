// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP surface tests against a real listener on an ephemeral port.

mod common;

use common::{service, Failure, MockRemote};
use message_mirror::http::router;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

async fn spawn(remote: Arc<MockRemote>, keys: &[&str]) -> String {
    let (service, _store) = service(remote, keys).await;
    let app = router(Arc::new(service));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn health_reports_ok() {
    let base = spawn(Arc::new(MockRemote::with_repos(&[])), &[]).await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn post_then_list_messages() {
    let remote = Arc::new(MockRemote::with_repos(&["alice/notes", "bob/log"]));
    remote.set_failure("bob/log", Failure::Unavailable).await;
    let base = spawn(remote, &["alice/notes", "bob/log"]).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/messages", base))
        .json(&json!({ "content": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    let created: Value = resp.json().await.unwrap();
    assert_eq!(created["content"], "hello");
    assert!(created["repositories"]["alice/notes"].is_string());
    assert!(created["repositories"].get("bob/log").is_none());

    let feed: Value = client
        .get(format!("{}/api/messages?limit=10", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let feed = feed.as_array().unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0]["id"], created["id"]);
    assert_eq!(feed[0]["timestamp"], created["timestamp"]);
    assert_eq!(feed[0]["repositories"], created["repositories"]);
}

#[tokio::test]
async fn blank_message_is_bad_request() {
    let base = spawn(Arc::new(MockRemote::with_repos(&[])), &[]).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/messages", base))
        .json(&json!({ "content": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn remote_feed_and_repositories() {
    let remote = Arc::new(MockRemote::with_repos(&["alice/notes"]));
    remote
        .put_file(
            "alice/notes",
            "messages/message_7.json",
            br#"{"id": 7, "content": "from remote", "timestamp": "2024-01-01T00:00:00Z"}"#,
        )
        .await;
    let base = spawn(remote, &["alice/notes"]).await;

    let feed: Value = reqwest::get(format!("{}/api/messages/remote", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(feed["messages"][0]["content"], "from remote");
    assert_eq!(feed["messages"][0]["repository"], "alice/notes");
    assert_eq!(feed["failed"], json!({}));

    let repos: Value = reqwest::get(format!("{}/api/repositories", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        repos,
        json!([{ "owner": "alice", "name": "notes", "branch": "main", "storage_path": "messages" }])
    );
}
