// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests of a conversation session over mock adapters.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, broadcast};
use tokio::time::timeout;

use convsync_core::{
    ChangeTable, ConversationKey, ConversationStatus, ConvsyncError, Platform, RawBatch, Topic,
};
use convsync_sync::{
    AckOutcome, ConversationSession, FetchSource, FetchStrategy, SessionCue, SessionHandle,
    SessionSettings, SessionSnapshot,
};
use convsync_test_utils::{BackendCall, MockBackend, MockTransport, records};

const PHONE: &str = "+34600111222";
const WAIT: Duration = Duration::from_secs(5);

fn key() -> ConversationKey {
    ConversationKey::new(Platform::Whatsapp, PHONE)
}

async fn open(backend: &Arc<MockBackend>, transport: &Arc<MockTransport>) -> SessionHandle {
    ConversationSession::open(
        key(),
        backend.clone(),
        transport.clone(),
        SessionSettings::default(),
    )
    .await
}

async fn wait_for(
    handle: &SessionHandle,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = handle.watch();
    timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("session dropped")
        .clone()
}

async fn next_cue(cues: &mut broadcast::Receiver<SessionCue>) -> SessionCue {
    timeout(WAIT, cues.recv())
        .await
        .expect("timed out waiting for cue")
        .expect("cue channel closed")
}

fn ids(snapshot: &SessionSnapshot) -> Vec<&str> {
    snapshot.messages.iter().map(|m| m.id.as_str()).collect()
}

#[tokio::test]
async fn open_loads_messages_state_and_notifications() {
    let backend = Arc::new(
        MockBackend::new()
            .with_conversation(records::page(records::message_rows("m", PHONE, 3, 9), true, 40))
            .with_state(records::state_row(PHONE, "main_menu"))
            .with_notifications(vec![
                records::notification_row("n1", None, "2024-01-01T10:00:00Z"),
                records::notification_row("n2", Some("+15550000000"), "2024-01-01T10:01:00Z"),
            ]),
    );
    let transport = Arc::new(MockTransport::new());

    let handle = open(&backend, &transport).await;
    let snapshot = handle.snapshot();

    assert_eq!(ids(&snapshot), vec!["m0", "m1", "m2"]);
    assert_eq!(
        snapshot.source,
        FetchSource::Backend(FetchStrategy::Conversation)
    );
    assert!(snapshot.has_more);
    assert_eq!(snapshot.total, Some(40));
    assert_eq!(
        snapshot.state.as_ref().map(|s| s.current_status.clone()),
        Some(ConversationStatus::MainMenu)
    );
    let notification_ids: Vec<&str> = snapshot
        .notifications
        .iter()
        .map(|n| n.id.as_str())
        .collect();
    assert_eq!(notification_ids, vec!["n1"]);
    assert!(snapshot.last_update.is_none());

    assert_eq!(
        transport.topics().await,
        vec![
            Topic::Messages {
                platform: Platform::Whatsapp
            },
            Topic::ConversationState {
                platform: Platform::Whatsapp,
                user_identifier: PHONE.to_string()
            },
            Topic::Notifications,
        ]
    );
    assert!(
        backend
            .calls()
            .await
            .contains(&BackendCall::Notifications {
                recipient: PHONE.to_string()
            })
    );
}

#[tokio::test]
async fn pushed_incoming_message_is_merged_then_cued() {
    let backend = Arc::new(MockBackend::new());
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;
    let mut cues = handle.cues();

    transport
        .emit(records::message_insert(records::message_row(
            "out",
            PHONE,
            "agent reply",
            "2024-06-01T10:00:00Z",
            false,
        )))
        .await;
    transport
        .emit(records::message_insert(records::message_row(
            "in",
            PHONE,
            "hola",
            "2024-06-01T10:00:05Z",
            true,
        )))
        .await;

    // Outgoing inserts do not cue; the first cue is the incoming one.
    assert_eq!(
        next_cue(&mut cues).await,
        SessionCue::IncomingMessage { id: "in".into() }
    );
    let snapshot = wait_for(&handle, |s| s.messages.iter().any(|m| m.id == "in")).await;
    assert!(snapshot.last_update.is_some());
    assert!(snapshot.messages.iter().any(|m| m.id == "out"));
}

#[tokio::test]
async fn duplicate_insert_and_unknown_update_are_noops() {
    let backend = Arc::new(
        MockBackend::new()
            .with_conversation(RawBatch::new(records::message_rows("m", PHONE, 2, 9))),
    );
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;
    let before = handle.snapshot().messages;

    let existing = records::message_rows("m", PHONE, 1, 9).remove(0);
    transport.emit(records::message_insert(existing)).await;
    transport
        .emit(records::message_update(records::message_row(
            "ghost",
            PHONE,
            "never inserted",
            "2024-01-01T09:30:00Z",
            true,
        )))
        .await;
    // A marker event processed after the two no-ops.
    transport
        .emit(records::message_insert(records::message_row(
            "marker",
            PHONE,
            "marker",
            "2024-01-01T11:00:00Z",
            true,
        )))
        .await;

    let snapshot = wait_for(&handle, |s| s.messages.iter().any(|m| m.id == "marker")).await;
    assert_eq!(&snapshot.messages[..2], before.as_slice());
    assert_eq!(ids(&snapshot), vec!["m0", "m1", "marker"]);
}

#[tokio::test]
async fn pushed_update_replaces_status() {
    let backend = Arc::new(
        MockBackend::new()
            .with_conversation(RawBatch::new(records::message_rows("m", PHONE, 1, 9))),
    );
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;

    let mut row = records::message_rows("m", PHONE, 1, 9).remove(0);
    row["status"] = "read".into();
    transport.emit(records::message_update(row)).await;

    let snapshot = wait_for(&handle, |s| {
        s.messages
            .first()
            .is_some_and(|m| m.status == convsync_core::MessageStatus::Read)
    })
    .await;
    assert_eq!(snapshot.messages.len(), 1);
}

#[tokio::test]
async fn events_for_other_conversations_are_filtered() {
    let backend = Arc::new(MockBackend::new());
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;

    transport
        .emit(records::message_insert(records::message_row(
            "foreign",
            "+15550000000",
            "wrong chat",
            "2024-06-01T10:00:00Z",
            true,
        )))
        .await;
    transport
        .emit(records::message_insert(records::message_row(
            "mine",
            "0034 600 111 222",
            "right chat",
            "2024-06-01T10:00:01Z",
            true,
        )))
        .await;

    let snapshot = wait_for(&handle, |s| !s.messages.is_empty()).await;
    assert_eq!(ids(&snapshot), vec!["mine"]);
}

#[tokio::test]
async fn five_message_interleavings_converge() {
    let rows = records::message_rows("m", PHONE, 5, 9);

    // Fetch the first three, then push the rest plus a redelivery.
    let backend_a =
        Arc::new(MockBackend::new().with_conversation(RawBatch::new(rows[..3].to_vec())));
    let transport_a = Arc::new(MockTransport::new());
    let a = open(&backend_a, &transport_a).await;
    for i in [4, 1, 3] {
        transport_a.emit(records::message_insert(rows[i].clone())).await;
    }

    // Fetch the last two, then push everything in reverse.
    let backend_b =
        Arc::new(MockBackend::new().with_conversation(RawBatch::new(rows[3..].to_vec())));
    let transport_b = Arc::new(MockTransport::new());
    let b = open(&backend_b, &transport_b).await;
    for row in rows.iter().rev() {
        transport_b.emit(records::message_insert(row.clone())).await;
    }

    let snap_a = wait_for(&a, |s| s.messages.len() == 5).await;
    let snap_b = wait_for(&b, |s| s.messages.len() == 5).await;
    assert_eq!(snap_a.messages, snap_b.messages);
    assert_eq!(ids(&snap_a), vec!["m0", "m1", "m2", "m3", "m4"]);
}

#[tokio::test]
async fn load_older_prepends_and_restores_scroll() {
    let backend = Arc::new(
        MockBackend::new()
            .with_conversation(records::page(records::message_rows("n", PHONE, 3, 12), true, 8)),
    );
    backend
        .push_page(records::page(records::message_rows("o", PHONE, 5, 8), false, 8))
        .await;
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;
    let mut cues = handle.cues();

    let restore = handle.load_older(720.0).await.unwrap().expect("page loaded");
    assert_eq!(restore.delta(1020.0), 300.0);
    assert_eq!(next_cue(&mut cues).await, SessionCue::ScrollRestore(restore));

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.messages.len(), 8);
    assert_eq!(snapshot.messages[0].id, "o0");
    assert_eq!(snapshot.messages[7].id, "n2");
    assert!(!snapshot.has_more);
    assert!(!snapshot.loading_more);

    // History exhausted: no further backend call.
    assert!(handle.load_older(1020.0).await.unwrap().is_none());
    assert_eq!(
        backend
            .count(|c| matches!(c, BackendCall::Page { .. }))
            .await,
        1
    );
    assert!(
        backend.calls().await.contains(&BackendCall::Page {
            limit: 20,
            offset: 0
        })
    );
}

#[tokio::test]
async fn load_older_without_history_makes_no_call() {
    let backend = Arc::new(
        MockBackend::new()
            .with_conversation(records::page(records::message_rows("n", PHONE, 3, 12), false, 3)),
    );
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;
    let before = handle.snapshot().messages;

    assert!(handle.load_older(500.0).await.unwrap().is_none());
    assert_eq!(
        backend
            .count(|c| matches!(c, BackendCall::Page { .. }))
            .await,
        0
    );
    assert_eq!(handle.snapshot().messages, before);
}

#[tokio::test]
async fn page_in_flight_blocks_second_page_but_not_push_events() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(
        MockBackend::new()
            .with_conversation(records::page(records::message_rows("n", PHONE, 3, 12), true, 10))
            .with_page_gate(gate.clone()),
    );
    backend
        .push_page(records::page(records::message_rows("o", PHONE, 2, 8), true, 10))
        .await;
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;

    let (first, second) = tokio::join!(handle.load_older(400.0), async {
        wait_for(&handle, |s| s.loading_more).await;
        let second = handle.load_older(400.0).await;

        transport
            .emit(records::message_insert(records::message_row(
                "live",
                PHONE,
                "while paging",
                "2024-01-01T13:00:00Z",
                true,
            )))
            .await;
        wait_for(&handle, |s| s.messages.iter().any(|m| m.id == "live")).await;

        gate.notify_one();
        second
    });

    assert!(first.unwrap().is_some());
    assert!(second.unwrap().is_none());
    assert_eq!(
        backend
            .count(|c| matches!(c, BackendCall::Page { .. }))
            .await,
        1
    );
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.messages.len(), 6);
    assert!(!snapshot.loading_more);
}

#[tokio::test]
async fn failed_page_is_retryable_and_leaves_timeline() {
    let backend = Arc::new(
        MockBackend::new()
            .with_conversation(records::page(records::message_rows("n", PHONE, 3, 12), true, 10)),
    );
    backend.push_page_error("gateway timeout").await;
    backend
        .push_page(records::page(records::message_rows("o", PHONE, 2, 8), false, 10))
        .await;
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;
    let before = handle.snapshot().messages;
    let mut cues = handle.cues();

    let err = handle.load_older(400.0).await.unwrap_err();
    assert!(matches!(err, ConvsyncError::Http { .. }));
    assert!(matches!(next_cue(&mut cues).await, SessionCue::PageFailed { .. }));

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.messages, before);
    assert!(snapshot.pager_error.is_some());

    // Same offset on retry.
    handle.load_older(400.0).await.unwrap().expect("retry loads");
    let pages: Vec<BackendCall> = backend
        .calls()
        .await
        .into_iter()
        .filter(|c| matches!(c, BackendCall::Page { .. }))
        .collect();
    assert_eq!(
        pages,
        vec![
            BackendCall::Page {
                limit: 20,
                offset: 0
            };
            2
        ]
    );
    assert!(handle.snapshot().pager_error.is_none());
}

#[tokio::test]
async fn state_changes_are_cued_after_silent_seed() {
    let backend = Arc::new(MockBackend::new().with_state(records::state_row(PHONE, "main_menu")));
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;
    let mut cues = handle.cues();

    // Same status: not a change.
    transport
        .emit(records::state_update(records::state_row(PHONE, "main_menu")))
        .await;
    // Another contact: ignored.
    transport
        .emit(records::state_update(records::state_row("+15550000000", "order_completed")))
        .await;
    transport
        .emit(records::state_update(records::state_row(PHONE, "human_agent")))
        .await;

    match next_cue(&mut cues).await {
        SessionCue::StateChanged(change) => {
            assert_eq!(change.from, ConversationStatus::MainMenu);
            assert_eq!(change.to, ConversationStatus::HumanAgent);
            assert!(!change.notice.text.is_empty());
        }
        other => panic!("expected state change, got {other:?}"),
    }
    let snapshot = handle.snapshot();
    assert_eq!(
        snapshot.state.map(|s| s.current_status),
        Some(ConversationStatus::HumanAgent)
    );
}

#[tokio::test]
async fn first_pushed_state_seeds_without_cue() {
    let backend = Arc::new(MockBackend::new());
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;
    let mut cues = handle.cues();

    transport
        .emit(records::state_update(records::state_row(PHONE, "awaiting_payment")))
        .await;
    transport
        .emit(records::state_update(records::state_row(PHONE, "order_completed")))
        .await;

    match next_cue(&mut cues).await {
        SessionCue::StateChanged(change) => {
            assert_eq!(change.from, ConversationStatus::AwaitingPayment);
            assert_eq!(change.to, ConversationStatus::OrderCompleted);
        }
        other => panic!("expected state change, got {other:?}"),
    }
}

#[tokio::test]
async fn acknowledging_twice_flips_once() {
    let backend = Arc::new(MockBackend::new().with_notifications(vec![records::notification_row(
        "n1",
        Some(PHONE),
        "2024-01-01T10:00:00Z",
    )]));
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;

    assert_eq!(handle.acknowledge("n1").await.unwrap(), AckOutcome::Acknowledged);
    assert_eq!(handle.acknowledge("n1").await.unwrap(), AckOutcome::AlreadyRead);

    assert_eq!(
        backend
            .count(|c| matches!(c, BackendCall::Acknowledge { .. }))
            .await,
        1
    );
    assert!(handle.snapshot().notifications[0].is_read);
}

async fn wait_for_ack_call(backend: &MockBackend) {
    timeout(WAIT, async {
        while backend
            .count(|c| matches!(c, BackendCall::Acknowledge { .. }))
            .await
            == 0
        {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("acknowledge never reached the backend");
}

#[tokio::test]
async fn overlapping_acknowledges_make_one_call() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(
        MockBackend::new()
            .with_notifications(vec![records::notification_row(
                "n1",
                Some(PHONE),
                "2024-01-01T10:00:00Z",
            )])
            .with_ack_gate(gate.clone()),
    );
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;

    let (first, second, ()) = tokio::join!(
        handle.acknowledge("n1"),
        handle.acknowledge("n1"),
        async {
            wait_for_ack_call(&backend).await;
            gate.notify_one();
        }
    );

    assert_eq!(first.unwrap(), AckOutcome::Acknowledged);
    assert_eq!(second.unwrap(), AckOutcome::AlreadyRead);
    assert_eq!(
        backend
            .count(|c| matches!(c, BackendCall::Acknowledge { .. }))
            .await,
        1
    );
    assert!(handle.snapshot().notifications[0].is_read);
}

#[tokio::test]
async fn overlapping_acknowledges_share_a_failure() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(
        MockBackend::new()
            .with_notifications(vec![records::notification_row(
                "n1",
                None,
                "2024-01-01T10:00:00Z",
            )])
            .with_ack_gate(gate.clone()),
    );
    backend.push_ack_error("502").await;
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;

    let (first, second, ()) = tokio::join!(
        handle.acknowledge("n1"),
        handle.acknowledge("n1"),
        async {
            wait_for_ack_call(&backend).await;
            gate.notify_one();
        }
    );

    assert!(matches!(first, Err(ConvsyncError::Http { .. })));
    assert!(second.is_err());
    assert!(!handle.snapshot().notifications[0].is_read);

    gate.notify_one();
    assert_eq!(handle.acknowledge("n1").await.unwrap(), AckOutcome::Acknowledged);
    assert_eq!(
        backend
            .count(|c| matches!(c, BackendCall::Acknowledge { .. }))
            .await,
        2
    );
}

#[tokio::test]
async fn failed_acknowledge_leaves_notification_unread() {
    let backend = Arc::new(MockBackend::new().with_notifications(vec![records::notification_row(
        "n1",
        None,
        "2024-01-01T10:00:00Z",
    )]));
    backend.push_ack_error("500").await;
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;

    assert!(handle.acknowledge("n1").await.is_err());
    assert!(!handle.snapshot().notifications[0].is_read);

    assert_eq!(handle.acknowledge("n1").await.unwrap(), AckOutcome::Acknowledged);
    assert!(handle.snapshot().notifications[0].is_read);
}

#[tokio::test]
async fn pushed_notifications_are_filtered_by_recipient() {
    let backend = Arc::new(MockBackend::new());
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;
    let mut cues = handle.cues();

    transport
        .emit(records::notification_insert(records::notification_row(
            "other",
            Some("+15550000000"),
            "2024-01-01T10:00:00Z",
        )))
        .await;
    transport
        .emit(records::notification_insert(records::notification_row(
            "broadcast",
            None,
            "2024-01-01T10:01:00Z",
        )))
        .await;

    match next_cue(&mut cues).await {
        SessionCue::Notification(n) => assert_eq!(n.id, "broadcast"),
        other => panic!("expected notification, got {other:?}"),
    }
    let snapshot = wait_for(&handle, |s| !s.notifications.is_empty()).await;
    assert_eq!(snapshot.notifications.len(), 1);
}

#[tokio::test]
async fn close_cancels_subscriptions_and_stops_merging() {
    let backend = Arc::new(MockBackend::new());
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;
    let before = handle.snapshot().messages;

    handle.close();

    assert!(handle.is_closed());
    assert!(transport.all_cancelled().await);
    let delivered = transport
        .emit(records::message_insert(records::message_row(
            "late",
            PHONE,
            "after close",
            "2024-06-01T10:00:00Z",
            true,
        )))
        .await;
    assert_eq!(delivered, 0);
    assert_eq!(handle.snapshot().messages, before);
    assert!(matches!(
        handle.load_older(1.0).await,
        Err(ConvsyncError::SessionClosed)
    ));
    assert!(matches!(
        handle.acknowledge("n1").await,
        Err(ConvsyncError::SessionClosed)
    ));

    handle.shutdown().await;
}

#[tokio::test]
async fn dropping_the_handle_closes_the_session() {
    let backend = Arc::new(MockBackend::new());
    let transport = Arc::new(MockTransport::new());
    let handle = open(&backend, &transport).await;
    drop(handle);
    assert!(transport.all_cancelled().await);
}

#[tokio::test]
async fn failed_subscription_does_not_prevent_open() {
    let backend = Arc::new(
        MockBackend::new()
            .with_conversation(RawBatch::new(records::message_rows("m", PHONE, 2, 9))),
    );
    let transport = Arc::new(MockTransport::new().failing_on(ChangeTable::Messages));
    let handle = open(&backend, &transport).await;

    assert_eq!(handle.snapshot().messages.len(), 2);
    assert_eq!(transport.topics().await.len(), 2);
}

#[tokio::test]
async fn total_fetch_failure_surfaces_soft_error() {
    let backend = Arc::new(MockBackend::new().failing_everywhere("connection refused"));
    let transport = Arc::new(MockTransport::new());
    let settings = SessionSettings {
        use_fixtures: false,
        ..SessionSettings::default()
    };
    let handle =
        ConversationSession::open(key(), backend.clone(), transport.clone(), settings).await;

    let snapshot = handle.snapshot();
    assert!(snapshot.messages.is_empty());
    assert_eq!(snapshot.source, FetchSource::Empty);
    assert!(snapshot.soft_error.is_some());
}
