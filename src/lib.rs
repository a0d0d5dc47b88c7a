pub mod api;
pub mod config;
pub mod feedback;
pub mod puzzle;
pub mod realtime;
pub mod replicator;
pub mod state;
pub mod storage;

#[cfg(test)]
pub mod test_utils;

pub use feedback::{CardState, PositionKnowledge};
pub use puzzle::{FeedbackCode, GuessRecord, Orientation, Placement, Puzzle, PuzzleId};
pub use replicator::{ReplicatorConfig, ReplicatorError, SessionHandle, StateReplicator};
pub use state::{BoardState, ClientId, RemoteState, ReplicatedState};

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::Instrument;

/// Spawn a Tokio task inside a span carrying its name.
pub fn spawn_named_task<F, S>(name: S, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
    S: Into<String>,
{
    let span = tracing::info_span!("task", task_name = %name.into());
    tokio::spawn(future.instrument(span))
}
