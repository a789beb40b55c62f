//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for all inputs,
//! helping catch edge cases that unit tests might miss.

mod common;

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use common::{service, MockRemote};
use message_mirror::message::{
    compare_timestamps, format_timestamp, parse_timestamp, MessageEnvelope, RemoteMessage,
};
use message_mirror::reader::sort_remote;
use message_mirror::store::{MessageRepository, SqliteStore};
use message_mirror::target::{parse_repo_key, repo_key};
use proptest::prelude::*;
use std::cmp::Ordering;
use std::sync::Arc;

fn base() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn ts(offset_secs: i64) -> String {
    format_timestamp(base() + ChronoDuration::seconds(offset_secs))
}

/// Any timestamp-ish string: well-formed RFC 3339, naive, or junk.
fn timestamp_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (0i64..10_000_000).prop_map(ts),
        (0i64..10_000_000).prop_map(|s| {
            (base() + ChronoDuration::seconds(s))
                .naive_utc()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        }),
        "[a-z ]{0,12}",
    ]
}

// =============================================================================
// Timestamp Comparison Properties
// =============================================================================

proptest! {
    /// Comparison is reflexive: a == a
    #[test]
    fn timestamp_comparison_reflexive(a in timestamp_strategy()) {
        prop_assert_eq!(compare_timestamps(&a, &a), Ordering::Equal);
    }

    /// Comparison is antisymmetric: if a < b then b > a
    #[test]
    fn timestamp_comparison_antisymmetric(a in timestamp_strategy(), b in timestamp_strategy()) {
        prop_assert_eq!(compare_timestamps(&a, &b).reverse(), compare_timestamps(&b, &a));
    }

    /// Comparison is transitive
    #[test]
    fn timestamp_comparison_transitive(
        a in timestamp_strategy(),
        b in timestamp_strategy(),
        c in timestamp_strategy(),
    ) {
        let ab = compare_timestamps(&a, &b);
        let bc = compare_timestamps(&b, &c);
        if ab != Ordering::Greater && bc != Ordering::Greater {
            prop_assert_ne!(compare_timestamps(&a, &c), Ordering::Greater);
        }
    }

    /// Formatted timestamps compare the same way their instants do
    #[test]
    fn formatted_timestamps_follow_time(a in 0i64..10_000_000, b in 0i64..10_000_000) {
        prop_assert_eq!(compare_timestamps(&ts(a), &ts(b)), a.cmp(&b));
        // Fixed width: lexical order matches too, which the SQL ORDER BY relies on.
        prop_assert_eq!(ts(a).cmp(&ts(b)), a.cmp(&b));
    }
}

// =============================================================================
// Remote Merge Properties
// =============================================================================

fn remote_messages() -> impl Strategy<Value = Vec<RemoteMessage>> {
    prop::collection::vec((1i64..500, 0i64..100, 0usize..3), 0..40).prop_map(|rows| {
        rows.into_iter()
            .map(|(id, offset, repo)| RemoteMessage {
                envelope: MessageEnvelope {
                    id,
                    content: format!("m{}", id),
                    timestamp: ts(offset),
                },
                repository: ["r1/a", "r2/b", "r3/c"][repo].to_string(),
            })
            .collect()
    })
}

proptest! {
    /// Merged remote feed is ascending by timestamp
    #[test]
    fn remote_merge_is_ascending(mut messages in remote_messages()) {
        sort_remote(&mut messages);
        for pair in messages.windows(2) {
            prop_assert_ne!(
                compare_timestamps(&pair[0].envelope.timestamp, &pair[1].envelope.timestamp),
                Ordering::Greater
            );
        }
    }

    /// Merge result does not depend on the order repositories answered in
    #[test]
    fn remote_merge_ignores_arrival_order(messages in remote_messages()) {
        let mut forward = messages.clone();
        let mut backward: Vec<_> = messages.into_iter().rev().collect();
        sort_remote(&mut forward);
        sort_remote(&mut backward);
        prop_assert_eq!(forward, backward);
    }

    /// Sorting keeps every message, tag included
    #[test]
    fn remote_merge_is_permutation(messages in remote_messages()) {
        let mut sorted = messages.clone();
        sort_remote(&mut sorted);
        prop_assert_eq!(sorted.len(), messages.len());
        for m in &messages {
            prop_assert!(sorted.contains(m));
        }
    }
}

// =============================================================================
// Local Feed Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Local feed is newest first, ties by highest id, whatever the insert order
    #[test]
    fn local_feed_newest_first(offsets in prop::collection::vec(0i64..50, 1..20)) {
        let feed = current_thread().block_on(async {
            let store = SqliteStore::in_memory().await.unwrap();
            for (i, offset) in offsets.iter().enumerate() {
                store.insert_message(format!("m{}", i), ts(*offset)).await.unwrap();
            }
            store.list_messages(100, 0).await.unwrap()
        });

        prop_assert_eq!(feed.len(), offsets.len());
        for pair in feed.windows(2) {
            let (a, b) = (&pair[0].message, &pair[1].message);
            prop_assert!(
                a.timestamp > b.timestamp || (a.timestamp == b.timestamp && a.id > b.id),
                "{:?} before {:?}", a, b
            );
        }
    }
}

/// RFC 3339 with an arbitrary whole-minute UTC offset, plus its instant.
fn offset_timestamp(secs: i64, offset_minutes: i32) -> (String, DateTime<Utc>) {
    let at = base() + ChronoDuration::seconds(secs);
    let zone = FixedOffset::east_opt(offset_minutes * 60).unwrap();
    (at.with_timezone(&zone).to_rfc3339(), at)
}

fn current_thread() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Offset timestamps parse to the instant they name
    #[test]
    fn offset_timestamps_parse_to_instant(secs in 0i64..10_000_000, offset in -720i32..=840) {
        let (raw, at) = offset_timestamp(secs, offset);
        prop_assert_eq!(parse_timestamp(&raw), Some(at));
    }

    /// Messages created with mixed offsets list newest instant first
    #[test]
    fn created_feed_orders_by_instant(
        rows in prop::collection::vec((0i64..86_400, -720i32..=840), 1..12)
    ) {
        let feed = current_thread().block_on(async {
            let (service, _store) = service(Arc::new(MockRemote::with_repos(&[])), &[]).await;
            for (i, (secs, offset)) in rows.iter().enumerate() {
                let (raw, _) = offset_timestamp(*secs, *offset);
                service.create_message_at(&format!("m{}", i), raw).await.unwrap();
            }
            service.list_messages(Some(100), 0).await.unwrap()
        });

        prop_assert_eq!(feed.len(), rows.len());
        for pair in feed.windows(2) {
            let (a, b) = (&pair[0].message, &pair[1].message);
            let (ta, tb) = (parse_timestamp(&a.timestamp).unwrap(), parse_timestamp(&b.timestamp).unwrap());
            prop_assert!(ta > tb || (ta == tb && a.id > b.id), "{:?} before {:?}", a, b);
        }
    }

    /// Non-blank content comes back byte-for-byte from the feed and the mirror
    #[test]
    fn created_content_is_verbatim(content in "[ \t\n]{0,3}[a-zA-Z0-9 .,!?\u{e9}\u{1f600}]{1,40}[ \t\n]{0,3}") {
        prop_assume!(!content.trim().is_empty());
        let (created, listed, mirrored) = current_thread().block_on(async {
            let remote = Arc::new(MockRemote::with_repos(&["alice/notes"]));
            let (service, _store) = service(remote.clone(), &["alice/notes"]).await;
            let created = service.create_message(&content).await.unwrap();
            let listed = service.list_messages(None, 0).await.unwrap();
            let path = format!("messages/message_{}.json", created.id);
            let body = remote.file("alice/notes", &path).await.unwrap();
            (created, listed, MessageEnvelope::from_slice(&body).unwrap())
        });

        prop_assert_eq!(&created.content, &content);
        prop_assert_eq!(&listed[0].message.content, &content);
        prop_assert_eq!(&mirrored.content, &content);
    }
}

// =============================================================================
// Parsing Robustness
// =============================================================================

proptest! {
    /// Envelope parsing never panics on arbitrary bytes
    #[test]
    fn envelope_parse_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = MessageEnvelope::from_slice(&bytes);
    }

    /// Repo keys split back into the owner and name they were built from
    #[test]
    fn repo_key_round_trip(owner in "[a-zA-Z0-9_.-]{1,20}", name in "[a-zA-Z0-9_.-]{1,30}") {
        let (o, n) = parse_repo_key(&repo_key(&owner, &name)).unwrap();
        prop_assert_eq!(o, owner);
        prop_assert_eq!(n, name);
    }

    /// Repo key parsing never panics and never accepts a key without a slash
    #[test]
    fn repo_key_parse_total(key in ".{0,40}") {
        if let Ok((owner, name)) = parse_repo_key(&key) {
            prop_assert!(key.contains('/'));
            prop_assert!(!owner.is_empty() && !name.is_empty());
        }
    }
}
