use thiserror::Error;

use crate::api::ApiError;
use crate::puzzle::BoardError;

#[derive(Debug, Error)]
pub enum ReplicatorError {
    #[error("failed to load puzzle: {0}")]
    Puzzle(#[source] ApiError),
    #[error("backend request failed: {0}")]
    Api(#[source] ApiError),
    #[error(transparent)]
    Board(#[from] BoardError),
}
