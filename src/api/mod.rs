//! Backend operations the client depends on. The backend itself is an
//! external service; `HttpCloverApi` talks to it and `InMemoryBackend` stands
//! in for it offline and in tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::puzzle::{FeedbackVector, Placement, Puzzle, PuzzleId};
use crate::state::{BoardState, RemoteState};

pub mod http;
pub mod in_memory;

pub use http::HttpCloverApi;
pub use in_memory::{InMemoryBackend, InMemorySession};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend answered {status} for {endpoint}")]
    Status { status: u16, endpoint: String },
    #[error("failed to decode backend payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("puzzle {0} not found")]
    NotFound(PuzzleId),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::Config(err.to_string())
    }
}

#[async_trait]
pub trait CloverApi: Send + Sync {
    async fn fetch_puzzle(&self, puzzle_id: &PuzzleId) -> Result<Puzzle, ApiError>;

    /// The current remote copy, or `None` when no session has written one yet.
    async fn fetch_remote_state(
        &self,
        puzzle_id: &PuzzleId,
    ) -> Result<Option<RemoteState>, ApiError>;

    /// Stores `board` as the remote copy. The echo carries the client-identity
    /// token the backend recorded for this session.
    async fn push_remote_state(
        &self,
        puzzle_id: &PuzzleId,
        board: &BoardState,
    ) -> Result<RemoteState, ApiError>;

    async fn submit_guess(
        &self,
        puzzle_id: &PuzzleId,
        placements: &[Placement],
    ) -> Result<FeedbackVector, ApiError>;
}
