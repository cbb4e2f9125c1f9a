// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Websocket push transport for row-change events.
//!
//! Each subscription opens its own socket, joins one channel and spawns a pump
//! task that forwards decoded changes, sends heartbeats and leaves the channel
//! when the subscription's cancellation token fires. A dropped socket ends the
//! subscription; there is no reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use convsync_config::ConvsyncConfig;
use convsync_core::{
    AdapterType, ChangeEvent, ConvsyncError, HealthStatus, PluginAdapter, PushTransport, Topic,
};

use crate::frame::{self, Frame, TableNames};

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const PROTOCOL_VERSION: &str = "1.0.0";

/// Connection settings for [`RealtimeTransport`].
#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    pub url: Url,
    pub api_key: Option<String>,
    pub heartbeat: Duration,
    pub tables: TableNames,
    /// Capacity of each subscription's event channel.
    pub buffer: usize,
}

impl RealtimeSettings {
    /// Builds settings from the `[realtime]` and `[sync]` sections.
    ///
    /// Fails when no realtime URL is configured. Without a realtime API key
    /// the backend key is used.
    pub fn from_config(config: &ConvsyncConfig) -> Result<Self, ConvsyncError> {
        let raw = config
            .realtime
            .url
            .as_deref()
            .ok_or_else(|| ConvsyncError::Config("realtime.url is not set".into()))?;
        let url = Url::parse(raw)
            .map_err(|e| ConvsyncError::Config(format!("invalid realtime.url `{raw}`: {e}")))?;

        Ok(Self {
            url,
            api_key: config
                .realtime
                .api_key
                .clone()
                .or_else(|| config.backend.api_key.clone()),
            heartbeat: Duration::from_secs(config.realtime.heartbeat_secs.max(1)),
            tables: TableNames::from(&config.realtime),
            buffer: config.sync.event_buffer.max(1),
        })
    }

    /// Socket URL with the API key and protocol version in the query.
    pub fn socket_url(&self) -> Url {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(api_key) = &self.api_key {
                query.append_pair("apikey", api_key);
            }
            query.append_pair("vsn", PROTOCOL_VERSION);
        }
        url
    }
}

/// Phoenix-channel implementation of [`PushTransport`].
pub struct RealtimeTransport {
    settings: RealtimeSettings,
    refs: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl RealtimeTransport {
    pub fn new(settings: RealtimeSettings) -> Self {
        info!(url = %settings.url, "realtime transport initialized");
        Self {
            settings,
            refs: Arc::new(AtomicU64::new(1)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &RealtimeSettings {
        &self.settings
    }
}

fn next_ref(refs: &AtomicU64) -> String {
    refs.fetch_add(1, Ordering::Relaxed).to_string()
}

#[async_trait]
impl PluginAdapter for RealtimeTransport {
    fn name(&self) -> &str {
        "realtime"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, ConvsyncError> {
        let url = self.settings.socket_url();
        match timeout(JOIN_TIMEOUT, connect_async(url.as_str())).await {
            Ok(Ok((mut socket, _))) => {
                let _ = socket.close(None).await;
                Ok(HealthStatus::Healthy)
            }
            Ok(Err(e)) => Ok(HealthStatus::Unhealthy(format!("realtime connect failed: {e}"))),
            Err(_) => Ok(HealthStatus::Unhealthy("realtime connect timed out".into())),
        }
    }

    /// Leaves every open channel.
    async fn shutdown(&self) -> Result<(), ConvsyncError> {
        self.shutdown.cancel();
        Ok(())
    }
}

#[async_trait]
impl PushTransport for RealtimeTransport {
    async fn subscribe(
        &self,
        topic: Topic,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<ChangeEvent>, ConvsyncError> {
        let url = self.settings.socket_url();
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ConvsyncError::Transport {
                message: format!("failed to connect to {}: {e}", self.settings.url),
                source: Some(Box::new(e)),
            })?;
        let (mut sink, mut stream) = socket.split();

        let channel = frame::channel_name(&topic);
        let join_ref = next_ref(&self.refs);
        let join = frame::join(
            &topic,
            &self.settings.tables,
            self.settings.api_key.as_deref(),
            join_ref.clone(),
        );
        send_frame(&mut sink, &join).await?;

        timeout(JOIN_TIMEOUT, await_join(&mut stream, &channel, &join_ref))
            .await
            .map_err(|_| ConvsyncError::transport(format!("join of {channel} timed out")))??;
        info!(channel = %channel, "joined realtime channel");

        let (tx, rx) = mpsc::channel(self.settings.buffer);
        let pump = Pump {
            channel,
            tables: self.settings.tables.clone(),
            heartbeat: self.settings.heartbeat,
            refs: Arc::clone(&self.refs),
        };
        tokio::spawn(pump.run(sink, stream, tx, cancel, self.shutdown.clone()));
        Ok(rx)
    }
}

async fn send_frame<S>(sink: &mut S, frame: &Frame) -> Result<(), ConvsyncError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let text = frame.encode()?;
    sink.send(Message::text(text))
        .await
        .map_err(|e| ConvsyncError::Transport {
            message: format!("failed to send {} on {}: {e}", frame.event, frame.topic),
            source: Some(Box::new(e)),
        })
}

/// Waits for the `phx_reply` to our join.
async fn await_join<R>(stream: &mut R, channel: &str, join_ref: &str) -> Result<(), ConvsyncError>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        let message = message.map_err(|e| ConvsyncError::Transport {
            message: format!("socket error while joining {channel}: {e}"),
            source: Some(Box::new(e)),
        })?;
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(frame) = Frame::decode(text.as_str()) else {
            continue;
        };
        if frame.topic != channel || frame.reference.as_deref() != Some(join_ref) {
            continue;
        }
        return match frame.reply_status() {
            Some(("ok", _)) => Ok(()),
            Some((status, response)) => Err(ConvsyncError::transport(format!(
                "join of {channel} rejected ({status}): {response}"
            ))),
            None => Err(ConvsyncError::transport(format!(
                "unexpected {} while joining {channel}",
                frame.event
            ))),
        };
    }
    Err(ConvsyncError::transport(format!(
        "socket closed while joining {channel}"
    )))
}

/// Per-subscription socket loop.
struct Pump {
    channel: String,
    tables: TableNames,
    heartbeat: Duration,
    refs: Arc<AtomicU64>,
}

impl Pump {
    async fn run<S, R>(
        self,
        mut sink: S,
        mut stream: R,
        tx: mpsc::Sender<ChangeEvent>,
        cancel: CancellationToken,
        shutdown: CancellationToken,
    ) where
        S: Sink<Message, Error = WsError> + Unpin,
        R: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        let mut heartbeat = interval_at(Instant::now() + self.heartbeat, self.heartbeat);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = shutdown.cancelled() => break,
                _ = heartbeat.tick() => {
                    let frame = frame::heartbeat(next_ref(&self.refs));
                    if let Err(e) = send_frame(&mut sink, &frame).await {
                        warn!(
                            channel = %self.channel,
                            error = %e,
                            "heartbeat failed, ending subscription"
                        );
                        break;
                    }
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if !self.forward(text.as_str(), &tx, &cancel).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(reason))) => {
                        warn!(channel = %self.channel, ?reason, "realtime socket closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(channel = %self.channel, error = %e, "realtime socket error");
                        break;
                    }
                    None => {
                        warn!(channel = %self.channel, "realtime socket ended");
                        break;
                    }
                },
            }
        }

        let leave = frame::leave(&self.channel, next_ref(&self.refs));
        if let Err(e) = send_frame(&mut sink, &leave).await {
            debug!(channel = %self.channel, error = %e, "could not send leave");
        }
        let _ = sink.close().await;
        info!(channel = %self.channel, "left realtime channel");
    }

    /// Handles one text frame. Returns `false` when the subscription is over.
    async fn forward(
        &self,
        text: &str,
        tx: &mpsc::Sender<ChangeEvent>,
        cancel: &CancellationToken,
    ) -> bool {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "dropping malformed frame");
                return true;
            }
        };
        if frame.topic != self.channel {
            trace!(topic = %frame.topic, event = %frame.event, "frame for another topic");
            return true;
        }
        if frame.event == frame::PHX_ERROR || frame.event == frame::PHX_CLOSE {
            warn!(channel = %self.channel, event = %frame.event, "channel closed by server");
            return false;
        }

        match frame::decode_change(&frame, &self.tables) {
            Ok(Some(event)) => {
                trace!(
                    channel = %self.channel,
                    table = %event.table,
                    kind = %event.kind,
                    "change received"
                );
                tokio::select! {
                    sent = tx.send(event) => sent.is_ok(),
                    _ = cancel.cancelled() => false,
                }
            }
            Ok(None) => true,
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "dropping undecodable change");
                true
            }
        }
    }
}
