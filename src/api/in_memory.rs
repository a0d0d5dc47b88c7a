use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ApiError, CloverApi};
use crate::puzzle::{score_guess, FeedbackVector, Placement, Puzzle, PuzzleId};
use crate::realtime::{GameUpdateFeed, PushMessage, Subscription};
use crate::spawn_named_task;
use crate::state::{BoardState, ClientId, RemoteState};

const LOG_TARGET: &str = "clover::api::in_memory";

/// How long a pushed client state stays visible to other sessions.
pub const CLIENT_STATE_FRESHNESS_MINUTES: i64 = 5;

const UPDATE_CHANNEL_CAPACITY: usize = 64;

struct StoredPuzzle {
    puzzle: Puzzle,
    answer: Vec<Placement>,
}

struct Inner {
    puzzles: DashMap<PuzzleId, StoredPuzzle>,
    // every pushed copy, oldest first
    states: DashMap<PuzzleId, Vec<RemoteState>>,
    channels: DashMap<PuzzleId, broadcast::Sender<PushMessage>>,
    offline: AtomicBool,
    freshness: Duration,
}

/// Process-local backend: stores puzzles with their answers, scores guesses,
/// keeps the pushed client states and broadcasts an update on every push.
#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_freshness(Duration::minutes(CLIENT_STATE_FRESHNESS_MINUTES))
    }

    pub fn with_freshness(freshness: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                puzzles: DashMap::new(),
                states: DashMap::new(),
                channels: DashMap::new(),
                offline: AtomicBool::new(false),
                freshness,
            }),
        }
    }

    pub fn insert_puzzle(&self, puzzle: Puzzle, answer: Vec<Placement>) {
        self.inner
            .puzzles
            .insert(puzzle.id.clone(), StoredPuzzle { puzzle, answer });
    }

    /// A view of the backend as seen by one browser session.
    pub fn session(&self, client_id: ClientId) -> InMemorySession {
        InMemorySession {
            backend: self.clone(),
            client_id,
        }
    }

    /// While offline every call fails with [`ApiError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Latest copy still inside the freshness window.
    pub fn latest_state(&self, puzzle_id: &PuzzleId) -> Option<RemoteState> {
        let cutoff = Utc::now() - self.inner.freshness;
        self.inner.states.get(puzzle_id).and_then(|history| {
            history
                .last()
                .filter(|state| state.created_time.map_or(true, |at| at >= cutoff))
                .cloned()
        })
    }

    /// Number of copies pushed for a puzzle so far.
    pub fn push_count(&self, puzzle_id: &PuzzleId) -> usize {
        self.inner
            .states
            .get(puzzle_id)
            .map(|history| history.len())
            .unwrap_or(0)
    }

    /// Stores a copy written by `client_id` without going through a session.
    pub fn store_state(&self, puzzle_id: &PuzzleId, client_id: ClientId, data: BoardState) -> RemoteState {
        let remote = RemoteState {
            client_id,
            data,
            created_time: Some(Utc::now()),
        };
        self.inner
            .states
            .entry(puzzle_id.clone())
            .or_default()
            .push(remote.clone());
        let _ = self
            .channel(puzzle_id)
            .send(PushMessage::GameUpdate(Some(remote.clone())));
        remote
    }

    /// Publishes a bare notification with no payload.
    pub fn notify(&self, puzzle_id: &PuzzleId) {
        let _ = self.channel(puzzle_id).send(PushMessage::GameUpdate(None));
    }

    fn channel(&self, puzzle_id: &PuzzleId) -> broadcast::Sender<PushMessage> {
        self.inner
            .channels
            .entry(puzzle_id.clone())
            .or_insert_with(|| broadcast::channel(UPDATE_CHANNEL_CAPACITY).0)
            .clone()
    }

    fn ensure_online(&self) -> Result<(), ApiError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            Err(ApiError::Unavailable("in-memory backend is offline".into()))
        } else {
            Ok(())
        }
    }
}

pub struct InMemorySession {
    backend: InMemoryBackend,
    client_id: ClientId,
}

impl InMemorySession {
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }
}

#[async_trait]
impl CloverApi for InMemorySession {
    async fn fetch_puzzle(&self, puzzle_id: &PuzzleId) -> Result<Puzzle, ApiError> {
        self.backend.ensure_online()?;
        self.backend
            .inner
            .puzzles
            .get(puzzle_id)
            .map(|stored| stored.puzzle.clone())
            .ok_or_else(|| ApiError::NotFound(puzzle_id.clone()))
    }

    async fn fetch_remote_state(
        &self,
        puzzle_id: &PuzzleId,
    ) -> Result<Option<RemoteState>, ApiError> {
        self.backend.ensure_online()?;
        Ok(self.backend.latest_state(puzzle_id))
    }

    async fn push_remote_state(
        &self,
        puzzle_id: &PuzzleId,
        board: &BoardState,
    ) -> Result<RemoteState, ApiError> {
        self.backend.ensure_online()?;
        debug!(target: LOG_TARGET, %puzzle_id, client_id = %self.client_id, "storing client state");
        Ok(self
            .backend
            .store_state(puzzle_id, self.client_id.clone(), board.clone()))
    }

    async fn submit_guess(
        &self,
        puzzle_id: &PuzzleId,
        placements: &[Placement],
    ) -> Result<FeedbackVector, ApiError> {
        self.backend.ensure_online()?;
        let stored = self
            .backend
            .inner
            .puzzles
            .get(puzzle_id)
            .ok_or_else(|| ApiError::NotFound(puzzle_id.clone()))?;
        Ok(score_guess(&stored.answer, placements))
    }
}

#[async_trait]
impl GameUpdateFeed for InMemorySession {
    async fn subscribe(
        &self,
        puzzle_id: &PuzzleId,
        sink: mpsc::Sender<PushMessage>,
    ) -> Result<Subscription, ApiError> {
        self.backend.ensure_online()?;
        let mut updates = self.backend.channel(puzzle_id).subscribe();
        let stop = CancellationToken::new();
        let cancelled = stop.clone();
        let task = spawn_named_task(format!("clover-memory-listen-{puzzle_id}"), async move {
            loop {
                let message = tokio::select! {
                    _ = cancelled.cancelled() => break,
                    received = updates.recv() => match received {
                        Ok(message) => message,
                        // missed updates collapse into one bare notification
                        Err(broadcast::error::RecvError::Lagged(_)) => PushMessage::GameUpdate(None),
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });
        Ok(Subscription::new(stop, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puzzle::{FeedbackCode, Orientation};
    use crate::test_utils::sample_puzzle;

    fn backend_with_puzzle() -> (InMemoryBackend, PuzzleId) {
        let backend = InMemoryBackend::new();
        let puzzle = sample_puzzle("5", 6);
        let id = puzzle.id.clone();
        let answer = vec![
            Placement::new(4, Orientation::new(1).unwrap()),
            Placement::upright(0),
            Placement::new(2, Orientation::new(3).unwrap()),
            Placement::upright(5),
        ];
        backend.insert_puzzle(puzzle, answer);
        (backend, id)
    }

    #[tokio::test]
    async fn guesses_are_scored_against_the_answer() {
        let (backend, id) = backend_with_puzzle();
        let session = backend.session(ClientId::new("a"));
        let codes = session
            .submit_guess(
                &id,
                &[
                    Placement::new(4, Orientation::new(1).unwrap()),
                    Placement::upright(2),
                    Placement::upright(1),
                    Placement::upright(5),
                ],
            )
            .await
            .unwrap();
        assert_eq!(
            codes,
            vec![
                FeedbackCode::Exact,
                FeedbackCode::WrongCard,
                FeedbackCode::WrongCard,
                FeedbackCode::Exact,
            ]
        );
    }

    #[tokio::test]
    async fn pushes_are_echoed_with_the_writer_and_broadcast() {
        let (backend, id) = backend_with_puzzle();
        let writer = backend.session(ClientId::new("writer"));
        let reader = backend.session(ClientId::new("reader"));
        let (tx, mut rx) = mpsc::channel(4);
        let _subscription = reader.subscribe(&id, tx).await.unwrap();

        assert_eq!(reader.fetch_remote_state(&id).await.unwrap(), None);
        let board = BoardState::default();
        let echo = writer.push_remote_state(&id, &board).await.unwrap();
        assert_eq!(echo.client_id, ClientId::new("writer"));
        assert_eq!(echo.data, board);

        let PushMessage::GameUpdate(Some(update)) = rx.recv().await.unwrap() else {
            panic!("expected update payload");
        };
        assert_eq!(update, echo);
        assert_eq!(reader.fetch_remote_state(&id).await.unwrap(), Some(echo));
        assert_eq!(backend.push_count(&id), 1);
    }

    #[tokio::test]
    async fn stale_states_read_as_absent() {
        let backend = InMemoryBackend::with_freshness(Duration::zero() - Duration::seconds(1));
        let id = PuzzleId::new("old");
        backend.store_state(&id, ClientId::new("a"), BoardState::default());
        assert_eq!(backend.latest_state(&id), None);
        assert_eq!(backend.push_count(&id), 1);
    }

    #[tokio::test]
    async fn offline_backend_fails_every_call() {
        let (backend, id) = backend_with_puzzle();
        let session = backend.session(ClientId::new("a"));
        backend.set_offline(true);
        assert!(matches!(
            session.fetch_remote_state(&id).await,
            Err(ApiError::Unavailable(_))
        ));
        assert!(session
            .push_remote_state(&id, &BoardState::default())
            .await
            .is_err());
        backend.set_offline(false);
        assert!(session.fetch_puzzle(&id).await.is_ok());
        assert!(matches!(
            session.fetch_puzzle(&PuzzleId::new("missing")).await,
            Err(ApiError::NotFound(_))
        ));
    }
}
