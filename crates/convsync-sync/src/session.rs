// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One conversation session: the actor that owns a conversation's timeline,
//! history pager, state tracker and notifications.
//!
//! Every mutation happens on the actor task, so merges never race. Page
//! fetches and acknowledgements run as spawned sub-tasks that report back
//! through the actor's mailbox, and push events keep flowing while they are in
//! flight. Closing the session cancels the subscription tokens synchronously;
//! nothing is merged after that.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use convsync_config::model::SyncConfig;
use convsync_core::{
    ChangeEvent, ChangeKind, ConversationKey, ConversationState, ConvsyncError, Direction,
    Message, MessageBackend, Notification, PushTransport, RawBatch, Topic,
};

use crate::fetch::{FetchChain, FetchSource};
use crate::notifications::{AckOutcome, AckPlan, NotificationChannel, NotificationOutcome};
use crate::pager::{HistoryPager, PageRequest, ScrollRestore};
use crate::router::{EventRouter, RouteOutcome};
use crate::state::{StateChange, StateTracker, parse_state_row};
use crate::timeline::TimelineStore;

const COMMAND_CAPACITY: usize = 32;
const CUE_CAPACITY: usize = 64;

/// Tuning for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub initial_limit: usize,
    pub page_size: usize,
    pub use_fixtures: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SessionSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            initial_limit: config.initial_limit,
            page_size: config.page_size,
            use_fixtures: config.use_fixtures,
        }
    }
}

/// Everything the view renders, published after each change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub state: Option<ConversationState>,
    pub notifications: Vec<Notification>,
    /// When a push merge last changed the timeline.
    pub last_update: Option<DateTime<Utc>>,
    pub has_more: bool,
    pub loading_more: bool,
    pub total: Option<u64>,
    pub source: FetchSource,
    pub soft_error: Option<String>,
    pub pager_error: Option<String>,
}

/// Side effects for the view, raised after the corresponding merge.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCue {
    /// An incoming message was pushed; play a sound, scroll to bottom.
    IncomingMessage { id: String },
    StateChanged(StateChange),
    Notification(Notification),
    /// Older messages were prepended; keep the scroll anchor.
    ScrollRestore(ScrollRestore),
    /// Loading older messages failed and may be retried.
    PageFailed { error: String },
}

type Reply<T> = oneshot::Sender<Result<T, ConvsyncError>>;

enum Command {
    LoadOlder {
        scroll_height: f64,
        reply: Reply<Option<ScrollRestore>>,
    },
    PageLoaded {
        request: PageRequest,
        result: Result<RawBatch, ConvsyncError>,
        scroll_height: f64,
        reply: Reply<Option<ScrollRestore>>,
    },
    Acknowledge {
        id: String,
        reply: Reply<AckOutcome>,
    },
    AckResolved {
        id: String,
        result: Result<(), ConvsyncError>,
        reply: Reply<AckOutcome>,
    },
}

/// Entry point for opening sessions.
pub struct ConversationSession;

impl ConversationSession {
    /// Opens a session for `key`.
    ///
    /// Subscribes the messages, conversation-state and notification feeds,
    /// runs the initial fetch chain and the state and notification loads, then
    /// spawns the actor. Subscription failures leave the session without live
    /// updates for that feed; fetch failures surface in the snapshot.
    pub async fn open(
        key: ConversationKey,
        backend: Arc<dyn MessageBackend>,
        transport: Arc<dyn PushTransport>,
        settings: SessionSettings,
    ) -> SessionHandle {
        let cancel = CancellationToken::new();
        let platform = key.platform();

        let messages_rx =
            subscribe(transport.as_ref(), Topic::Messages { platform }, &cancel).await;
        let states_rx = subscribe(
            transport.as_ref(),
            Topic::ConversationState {
                platform,
                user_identifier: key.match_key().to_string(),
            },
            &cancel,
        )
        .await;
        let notifications_rx = subscribe(transport.as_ref(), Topic::Notifications, &cancel).await;

        let initial = FetchChain::new(settings.initial_limit, settings.use_fixtures)
            .run(backend.as_ref(), &key)
            .await;

        let mut tracker = StateTracker::new();
        match backend.conversation_state(&key).await {
            Ok(Some(row)) => {
                if let Some(state) = parse_state_row(&row, &key) {
                    tracker.observe(state);
                }
            }
            Ok(None) => {}
            Err(e) => warn!(conversation = %key, error = %e, "failed to load conversation state"),
        }

        let mut notifications = NotificationChannel::new(key.clone());
        match backend.notifications(key.contact_id()).await {
            Ok(rows) => {
                let loaded = notifications.load(&rows);
                debug!(conversation = %key, loaded, "loaded notifications");
            }
            Err(e) => warn!(conversation = %key, error = %e, "failed to load notifications"),
        }

        let mut pager = HistoryPager::new(settings.page_size);
        pager.seed(initial.has_more, initial.total);

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (cues_tx, _) = broadcast::channel(CUE_CAPACITY);

        let mut actor = SessionActor {
            key: key.clone(),
            backend,
            router: EventRouter::new(key.clone()),
            store: TimelineStore::from_messages(initial.messages),
            pager,
            tracker,
            notifications,
            last_update: None,
            source: initial.source,
            soft_error: initial.soft_error,
            snapshot_tx: watch::Sender::new(SessionSnapshot::default()),
            cues: cues_tx.clone(),
            mailbox: commands_tx.clone(),
            ack_waiters: HashMap::new(),
            cancel: cancel.clone(),
        };
        actor.publish();
        let snapshot_rx = actor.snapshot_tx.subscribe();

        info!(
            conversation = %key,
            messages = actor.store.len(),
            source = %actor.source,
            "conversation session opened"
        );

        let task = tokio::spawn(actor.run(commands_rx, messages_rx, states_rx, notifications_rx));

        SessionHandle {
            key,
            commands: commands_tx,
            snapshot: snapshot_rx,
            cues: cues_tx,
            cancel,
            task: Some(task),
        }
    }
}

async fn subscribe(
    transport: &dyn PushTransport,
    topic: Topic,
    cancel: &CancellationToken,
) -> Option<mpsc::Receiver<ChangeEvent>> {
    match transport.subscribe(topic.clone(), cancel.child_token()).await {
        Ok(rx) => Some(rx),
        Err(e) => {
            warn!(?topic, error = %e, "subscription failed, continuing without live updates");
            None
        }
    }
}

/// Next event from an optional feed; pends forever once the feed is gone.
async fn next_event(feed: &mut Option<mpsc::Receiver<ChangeEvent>>) -> Option<ChangeEvent> {
    match feed {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

struct SessionActor {
    key: ConversationKey,
    backend: Arc<dyn MessageBackend>,
    router: EventRouter,
    store: TimelineStore,
    pager: HistoryPager,
    tracker: StateTracker,
    notifications: NotificationChannel,
    last_update: Option<DateTime<Utc>>,
    source: FetchSource,
    soft_error: Option<String>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    cues: broadcast::Sender<SessionCue>,
    mailbox: mpsc::Sender<Command>,
    /// Callers waiting on an acknowledge another caller already sent.
    ack_waiters: HashMap<String, Vec<Reply<AckOutcome>>>,
    cancel: CancellationToken,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut messages: Option<mpsc::Receiver<ChangeEvent>>,
        mut states: Option<mpsc::Receiver<ChangeEvent>>,
        mut notifications: Option<mpsc::Receiver<ChangeEvent>>,
    ) {
        let cancel = self.cancel.clone();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(command) = commands.recv() => self.on_command(command),
                event = next_event(&mut messages) => match event {
                    Some(event) => self.on_message_event(&event),
                    None => {
                        debug!(conversation = %self.key, "messages feed closed");
                        messages = None;
                    }
                },
                event = next_event(&mut states) => match event {
                    Some(event) => self.on_state_event(&event),
                    None => {
                        debug!(conversation = %self.key, "conversation state feed closed");
                        states = None;
                    }
                },
                event = next_event(&mut notifications) => match event {
                    Some(event) => self.on_notification_event(&event),
                    None => {
                        debug!(conversation = %self.key, "notifications feed closed");
                        notifications = None;
                    }
                },
            }
        }
        info!(conversation = %self.key, "conversation session closed");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::LoadOlder {
                scroll_height,
                reply,
            } => {
                let Some(request) = self.pager.begin() else {
                    let _ = reply.send(Ok(None));
                    return;
                };
                self.publish();

                let backend = Arc::clone(&self.backend);
                let key = self.key.clone();
                let mailbox = self.mailbox.clone();
                tokio::spawn(async move {
                    let result = backend
                        .message_page(&key, request.limit, request.offset)
                        .await;
                    let _ = mailbox
                        .send(Command::PageLoaded {
                            request,
                            result,
                            scroll_height,
                            reply,
                        })
                        .await;
                });
            }
            Command::PageLoaded {
                request,
                result,
                scroll_height,
                reply,
            } => {
                let outcome =
                    self.pager
                        .complete(&mut self.store, &self.key, request, result, scroll_height);
                let response = match outcome {
                    Ok(load) => {
                        self.publish();
                        self.emit(SessionCue::ScrollRestore(load.restore));
                        Ok(Some(load.restore))
                    }
                    Err(e) => {
                        self.publish();
                        self.emit(SessionCue::PageFailed {
                            error: e.to_string(),
                        });
                        Err(e)
                    }
                };
                let _ = reply.send(response);
            }
            Command::Acknowledge { id, reply } => match self.notifications.begin_acknowledge(&id) {
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
                Ok(AckPlan::AlreadyRead) => {
                    debug!(notification = id.as_str(), "already read");
                    let _ = reply.send(Ok(AckOutcome::AlreadyRead));
                }
                Ok(AckPlan::InFlight) => {
                    debug!(notification = id.as_str(), "acknowledge already in flight");
                    self.ack_waiters.entry(id).or_default().push(reply);
                }
                Ok(AckPlan::Remote) => {
                    let backend = Arc::clone(&self.backend);
                    let mailbox = self.mailbox.clone();
                    tokio::spawn(async move {
                        let result = backend.acknowledge_notification(&id).await;
                        let _ = mailbox
                            .send(Command::AckResolved { id, result, reply })
                            .await;
                    });
                }
            },
            Command::AckResolved { id, result, reply } => {
                let waiters = self.ack_waiters.remove(&id).unwrap_or_default();
                let flipped = self.notifications.finish_acknowledge(&id, result.is_ok());
                if flipped {
                    self.publish();
                }
                match result {
                    Ok(()) => {
                        let _ = reply.send(Ok(AckOutcome::Acknowledged));
                        for waiter in waiters {
                            let _ = waiter.send(Ok(AckOutcome::AlreadyRead));
                        }
                    }
                    Err(e) => {
                        warn!(notification = id.as_str(), error = %e, "acknowledge failed");
                        for waiter in waiters {
                            let _ = waiter.send(Err(ConvsyncError::Internal(format!(
                                "acknowledge of `{id}` failed: {e}"
                            ))));
                        }
                        let _ = reply.send(Err(e));
                    }
                }
            }
        }
    }

    fn on_message_event(&mut self, event: &ChangeEvent) {
        let outcome = self.router.apply(&mut self.store, event);
        trace!(conversation = %self.key, ?outcome, "routed message event");
        if !outcome.merged() {
            return;
        }

        self.last_update = Some(Utc::now());
        self.publish();

        if let RouteOutcome::Created {
            id,
            direction: Direction::Incoming,
        } = outcome
        {
            self.emit(SessionCue::IncomingMessage { id });
        }
    }

    fn on_state_event(&mut self, event: &ChangeEvent) {
        if event.kind == ChangeKind::Delete {
            return;
        }
        let Some(state) = parse_state_row(&event.record, &self.key) else {
            trace!(conversation = %self.key, "dropping unparseable state row");
            return;
        };
        if !self.key.matches(&state.user_identifier) {
            return;
        }

        let change = self.tracker.observe(state);
        self.publish();
        if let Some(change) = change {
            info!(
                conversation = %self.key,
                from = %change.from,
                to = %change.to,
                "conversation status changed"
            );
            self.emit(SessionCue::StateChanged(change));
        }
    }

    fn on_notification_event(&mut self, event: &ChangeEvent) {
        match self.notifications.apply(event) {
            NotificationOutcome::Added(notification) => {
                self.publish();
                self.emit(SessionCue::Notification(notification));
            }
            NotificationOutcome::Updated(_) => self.publish(),
            other => trace!(outcome = ?other, "notification event not applied"),
        }
    }

    fn emit(&self, cue: SessionCue) {
        // No receivers is fine: cues are advisory.
        let _ = self.cues.send(cue);
    }

    fn publish(&mut self) {
        let snapshot = SessionSnapshot {
            messages: self.store.messages().to_vec(),
            state: self.tracker.current().cloned(),
            notifications: self.notifications.notifications().to_vec(),
            last_update: self.last_update,
            has_more: self.pager.has_more(),
            loading_more: self.pager.is_loading(),
            total: self.pager.total(),
            source: self.source,
            soft_error: self.soft_error.clone(),
            pager_error: self.pager.error().map(str::to_string),
        };
        self.snapshot_tx.send_replace(snapshot);
    }
}

/// Caller-side handle of an open session. Dropping it closes the session.
pub struct SessionHandle {
    key: ConversationKey,
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    cues: broadcast::Sender<SessionCue>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that observes every published snapshot.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Cues raised from now on.
    pub fn cues(&self) -> broadcast::Receiver<SessionCue> {
        self.cues.subscribe()
    }

    /// Loads the next page of older messages.
    ///
    /// `scroll_height` is the view's content height before the merge. Returns
    /// `Ok(None)` when a page is already loading or there is no more history.
    pub async fn load_older(
        &self,
        scroll_height: f64,
    ) -> Result<Option<ScrollRestore>, ConvsyncError> {
        self.request(|reply| Command::LoadOlder {
            scroll_height,
            reply,
        })
        .await
    }

    /// Marks a notification read. Idempotent: a read notification answers
    /// [`AckOutcome::AlreadyRead`] without contacting the backend, and a call
    /// made while another acknowledge of the same id is in flight waits for
    /// that result instead of sending a second request.
    pub async fn acknowledge(&self, id: &str) -> Result<AckOutcome, ConvsyncError> {
        let id = id.to_string();
        self.request(|reply| Command::Acknowledge { id, reply })
            .await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ConvsyncError> {
        if self.is_closed() {
            return Err(ConvsyncError::SessionClosed);
        }
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ConvsyncError::SessionClosed)?;
        response.await.map_err(|_| ConvsyncError::SessionClosed)?
    }

    /// Cancels every subscription. No merge is applied afterwards.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!(conversation = %self.key, "closing conversation session");
            self.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Closes the session and waits for the actor to stop.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(conversation = %self.key, error = %e, "session task ended abnormally");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}
