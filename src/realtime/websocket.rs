use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::{GameUpdateFeed, PushMessage, Subscription};
use crate::api::ApiError;
use crate::puzzle::PuzzleId;
use crate::spawn_named_task;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const LOG_TARGET: &str = "clover::realtime::websocket";

#[derive(Debug, Clone)]
pub struct WebSocketFeedConfig {
    pub realtime_base: Url,
    pub handshake_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl WebSocketFeedConfig {
    pub fn new(realtime_base: Url) -> Self {
        Self {
            realtime_base,
            handshake_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
        }
    }

    pub fn listen_url(&self, puzzle_id: &PuzzleId) -> Result<Url, ApiError> {
        Ok(self
            .realtime_base
            .join(&format!("ws/listen/{puzzle_id}"))?)
    }
}

/// Push channel over the backend's websocket endpoint.
pub struct WebSocketFeed {
    cfg: WebSocketFeedConfig,
}

impl WebSocketFeed {
    pub fn new(cfg: WebSocketFeedConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl GameUpdateFeed for WebSocketFeed {
    async fn subscribe(
        &self,
        puzzle_id: &PuzzleId,
        sink: mpsc::Sender<PushMessage>,
    ) -> Result<Subscription, ApiError> {
        let url = self.cfg.listen_url(puzzle_id)?;
        let stop = CancellationToken::new();
        let listener = Listener {
            url,
            handshake_timeout: self.cfg.handshake_timeout,
            reconnect_delay: self.cfg.reconnect_delay,
            sink,
            stop: stop.clone(),
        };
        let task = spawn_named_task(format!("clover-listen-{puzzle_id}"), listener.run());
        Ok(Subscription::new(stop, task))
    }
}

struct Listener {
    url: Url,
    handshake_timeout: Duration,
    reconnect_delay: Duration,
    sink: mpsc::Sender<PushMessage>,
    stop: CancellationToken,
}

impl Listener {
    fn should_stop(&self) -> bool {
        self.stop.is_cancelled() || self.sink.is_closed()
    }

    async fn run(self) {
        info!(target: LOG_TARGET, url = %self.url, "listening for game updates");
        while !self.should_stop() {
            match self.connect().await {
                Ok(stream) => {
                    if let Err(err) = self.pump(stream).await {
                        warn!(target: LOG_TARGET, error = %err, "update stream ended with error");
                    }
                }
                Err(err) => {
                    warn!(target: LOG_TARGET, error = %err, "failed to connect to update stream");
                }
            }

            if self.should_stop() {
                break;
            }

            debug!(
                target: LOG_TARGET,
                delay_secs = self.reconnect_delay.as_secs_f32(),
                "waiting before reconnect attempt"
            );
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = sleep(self.reconnect_delay) => {}
            }
        }
        info!(target: LOG_TARGET, url = %self.url, "update listener stopped");
    }

    async fn connect(&self) -> Result<WsStream> {
        let (stream, _) = timeout(self.handshake_timeout, connect_async(self.url.as_str()))
            .await
            .context("update stream handshake timed out")?
            .context("update stream handshake failed")?;
        Ok(stream)
    }

    async fn pump(&self, stream: WsStream) -> Result<()> {
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => {
                    debug!(target: LOG_TARGET, "shutdown signal received");
                    break;
                }
                msg = source.next() => {
                    match msg {
                        Some(Ok(Message::Text(txt))) => {
                            if !self.forward(&txt).await {
                                break;
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            sink.send(Message::Pong(payload)).await.ok();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(target: LOG_TARGET, ?frame, "socket closed by server");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(target: LOG_TARGET, error = %err, "websocket error");
                            break;
                        }
                        None => {
                            debug!(target: LOG_TARGET, "websocket stream ended");
                            break;
                        }
                    }
                }
            }
        }

        let _ = sink.close().await;
        Ok(())
    }

    /// Returns `false` once nobody is listening any more.
    async fn forward(&self, txt: &str) -> bool {
        match decode_frame(txt) {
            Ok(message) => self.sink.send(message).await.is_ok(),
            Err(err) => {
                debug!(target: LOG_TARGET, error = %err, "ignoring undecodable frame");
                true
            }
        }
    }
}

fn decode_frame(txt: &str) -> Result<PushMessage> {
    serde_json::from_str(txt).context("failed to deserialize push frame")
}
