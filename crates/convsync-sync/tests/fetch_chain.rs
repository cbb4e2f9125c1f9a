// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the initial fetch chain and the history pager
//! against a scripted backend.

use convsync_core::{ConversationKey, Platform, RawBatch};
use convsync_sync::{
    FetchChain, FetchSource, FetchStrategy, HistoryPager, TimelineStore, normalize_batch,
};
use convsync_test_utils::{BackendCall, MockBackend, records};
use serde_json::json;

const PHONE: &str = "+34600111222";

fn key() -> ConversationKey {
    ConversationKey::new(Platform::Whatsapp, PHONE)
}

#[tokio::test]
async fn chain_stops_at_message_list_and_never_calls_platform() {
    let list = records::message_rows("b", PHONE, 4, 9);
    let backend = MockBackend::new()
        .with_conversation(RawBatch::default())
        .with_message_list(RawBatch::new(list.clone()))
        .with_platform(RawBatch::new(records::message_rows("c", PHONE, 2, 8)));

    let fetch = FetchChain::new(50, true).run(&backend, &key()).await;

    let expected = TimelineStore::from_messages(normalize_batch(&list, &key())).into_messages();
    assert_eq!(fetch.messages, expected);
    assert_eq!(fetch.source, FetchSource::Backend(FetchStrategy::MessageList));
    assert_eq!(
        backend.calls().await,
        vec![BackendCall::Conversation, BackendCall::MessageList { limit: 50 }]
    );
    assert_eq!(
        backend.count(|c| *c == BackendCall::Platform).await,
        0
    );
}

#[tokio::test]
async fn unusable_records_count_as_empty() {
    let backend = MockBackend::new()
        .with_conversation(RawBatch::new(vec![json!({"id": "x", "content": ""})]))
        .with_message_list(RawBatch::new(vec![json!({"id": "y"})]))
        .with_platform(RawBatch::new(records::message_rows("p", PHONE, 1, 7)));

    let fetch = FetchChain::new(50, true).run(&backend, &key()).await;

    assert_eq!(fetch.source, FetchSource::Backend(FetchStrategy::Platform));
    assert_eq!(fetch.messages.len(), 1);
}

#[tokio::test]
async fn first_strategy_wins() {
    let backend = MockBackend::new()
        .with_conversation(RawBatch::new(records::message_rows("a", PHONE, 2, 9)))
        .with_message_list(RawBatch::new(records::message_rows("b", PHONE, 2, 9)));

    let fetch = FetchChain::new(50, true).run(&backend, &key()).await;

    assert_eq!(fetch.source, FetchSource::Backend(FetchStrategy::Conversation));
    assert_eq!(backend.calls().await, vec![BackendCall::Conversation]);
}

#[tokio::test]
async fn results_are_ordered_and_deduplicated() {
    let mut rows = records::message_rows("a", PHONE, 3, 9);
    rows.reverse();
    rows.push(rows[0].clone());
    let backend = MockBackend::new().with_conversation(RawBatch::new(rows));

    let fetch = FetchChain::new(50, true).run(&backend, &key()).await;

    let ids: Vec<&str> = fetch.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["a0", "a1", "a2"]);
}

#[tokio::test]
async fn has_more_prefers_pagination_block() {
    let backend = MockBackend::new()
        .with_conversation(records::page(records::message_rows("a", PHONE, 2, 9), true, 120));
    let fetch = FetchChain::new(50, true).run(&backend, &key()).await;
    assert!(fetch.has_more);
    assert_eq!(fetch.total, Some(120));
}

#[tokio::test]
async fn has_more_falls_back_to_full_page() {
    let rows = records::message_rows("a", PHONE, 5, 9);
    let backend = MockBackend::new().with_conversation(RawBatch::new(rows));

    let full = FetchChain::new(5, true).run(&backend, &key()).await;
    assert!(full.has_more);

    let short = FetchChain::new(6, true).run(&backend, &key()).await;
    assert!(!short.has_more);
}

#[tokio::test]
async fn total_failure_falls_back_to_fixtures() {
    let backend = MockBackend::new().failing_everywhere("connection refused");

    let fetch = FetchChain::new(50, true).run(&backend, &key()).await;

    assert_eq!(fetch.source, FetchSource::Fixtures);
    assert!(!fetch.messages.is_empty());
    assert!(fetch.soft_error.is_none());
    assert!(!fetch.has_more);
}

#[tokio::test]
async fn total_failure_without_fixtures_is_a_soft_error() {
    let backend = MockBackend::new().failing_everywhere("connection refused");

    let fetch = FetchChain::new(50, false).run(&backend, &key()).await;

    assert_eq!(fetch.source, FetchSource::Empty);
    assert!(fetch.messages.is_empty());
    let soft = fetch.soft_error.expect("soft error");
    assert!(soft.contains("conversation"));
    assert!(soft.contains("platform"));
}

#[tokio::test]
async fn empty_conversation_is_not_an_error() {
    let backend = MockBackend::new().failing_conversation("404");

    let fetch = FetchChain::new(50, false).run(&backend, &key()).await;

    assert_eq!(fetch.source, FetchSource::Empty);
    assert!(fetch.messages.is_empty());
    assert!(fetch.soft_error.is_none());
}

#[tokio::test]
async fn pager_without_more_history_makes_no_call() {
    let backend = MockBackend::new();
    let mut store = TimelineStore::from_messages(normalize_batch(
        &records::message_rows("a", PHONE, 3, 9),
        &key(),
    ));
    let before = store.messages().to_vec();
    let mut pager = HistoryPager::new(20);
    pager.seed(false, None);

    let load = pager
        .load_older(&backend, &key(), &mut store, 900.0)
        .await
        .unwrap();

    assert!(load.is_none());
    assert!(backend.calls().await.is_empty());
    assert_eq!(store.messages(), before.as_slice());
}

#[tokio::test]
async fn pager_walks_offsets_from_zero_and_absorbs_overlap() {
    let initial = records::message_rows("n", PHONE, 3, 12);
    let mut first_page = initial.clone();
    first_page.extend(records::message_rows("o", PHONE, 17, 8));

    let backend = MockBackend::new();
    backend
        .push_page(records::page(first_page, true, 25))
        .await;
    backend
        .push_page(records::page(records::message_rows("p", PHONE, 5, 7), false, 25))
        .await;

    let mut store = TimelineStore::from_messages(normalize_batch(&initial, &key()));
    let mut pager = HistoryPager::new(20);
    pager.seed(true, Some(25));
    assert_eq!(pager.offset(), 0);

    let first = pager
        .load_older(&backend, &key(), &mut store, 1000.0)
        .await
        .unwrap()
        .unwrap();
    // The first page repeats the initial fetch; only the older rows are new.
    assert_eq!(first.inserted, 17);
    assert_eq!(first.restore.delta(1600.0), 600.0);
    assert_eq!(store.len(), 20);

    pager
        .load_older(&backend, &key(), &mut store, 1600.0)
        .await
        .unwrap();
    assert!(!pager.has_more());
    assert_eq!(store.len(), 25);
    assert_eq!(store.oldest().unwrap().id, "p0");

    // No more history: the third call never reaches the backend.
    assert!(
        pager
            .load_older(&backend, &key(), &mut store, 1800.0)
            .await
            .unwrap()
            .is_none()
    );

    assert_eq!(
        backend.calls().await,
        vec![
            BackendCall::Page {
                limit: 20,
                offset: 0
            },
            BackendCall::Page {
                limit: 20,
                offset: 20
            },
        ]
    );
}
