//! Push channel delivering "game updated" notifications for one puzzle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::ApiError;
use crate::puzzle::PuzzleId;
use crate::state::RemoteState;

pub mod websocket;

pub use websocket::{WebSocketFeed, WebSocketFeedConfig};

/// Messages arriving on the push channel. Frames look like
/// `{"type": "GAME_UPDATE", "data": <remote state or null>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushMessage {
    GameUpdate(Option<RemoteState>),
}

#[async_trait]
pub trait GameUpdateFeed: Send + Sync {
    /// Starts delivering notifications for `puzzle_id` into `sink` until the
    /// returned subscription is cancelled or dropped.
    async fn subscribe(
        &self,
        puzzle_id: &PuzzleId,
        sink: mpsc::Sender<PushMessage>,
    ) -> Result<Subscription, ApiError>;
}

/// Owned handle on a running feed task. Dropping it stops the task.
pub struct Subscription {
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(stop: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            stop,
            task: Some(task),
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some() && !self.stop.is_cancelled()
    }

    pub fn cancel(&mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BoardState, ClientId};

    #[test]
    fn game_update_frames_decode() {
        let frame = r#"{"type":"GAME_UPDATE","data":{"client_id":"abc","data":{"guess":{"cardPositions":[[1,0],[0,3]]},"previousGuesses":[],"guessSubmitted":false}}}"#;
        let PushMessage::GameUpdate(Some(remote)) = serde_json::from_str(frame).unwrap() else {
            panic!("expected a game update with payload");
        };
        assert_eq!(remote.client_id, ClientId::new("abc"));
        assert_eq!(remote.data.placements().len(), 2);

        let empty: PushMessage = serde_json::from_str(r#"{"type":"GAME_UPDATE","data":null}"#).unwrap();
        assert_eq!(empty, PushMessage::GameUpdate(None));
    }

    #[test]
    fn unknown_frames_are_rejected() {
        assert!(serde_json::from_str::<PushMessage>(r#"{"type":"CHAT","data":"hi"}"#).is_err());
    }

    #[test]
    fn encoded_updates_keep_the_wire_shape() {
        let message = PushMessage::GameUpdate(Some(RemoteState {
            client_id: ClientId::new("x"),
            data: BoardState::default(),
            created_time: None,
        }));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "GAME_UPDATE");
        assert_eq!(value["data"]["client_id"], "x");
    }

    #[tokio::test]
    async fn dropping_a_subscription_stops_its_task() {
        let stop = CancellationToken::new();
        let watched = stop.clone();
        let task = tokio::spawn(async move { watched.cancelled().await });
        let mut subscription = Subscription::new(stop.clone(), task);
        assert!(subscription.is_active());
        subscription.cancel();
        assert!(!subscription.is_active());
        drop(subscription);
        assert!(stop.is_cancelled());
    }
}
