use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::puzzle::board::{default_layout, rotate_slot, swap_slots, validate_layout};
use crate::puzzle::{BoardError, GuessRecord, Placement, Puzzle, PRIMARY_SLOTS};

/// Opaque token naming the browser session that wrote a remote copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuessLayout {
    pub card_positions: Vec<Placement>,
}

/// The replicated document: what every session solving a puzzle agrees on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardState {
    pub guess: GuessLayout,
    #[serde(default)]
    pub previous_guesses: Vec<GuessRecord>,
    #[serde(default)]
    pub guess_submitted: bool,
}

impl BoardState {
    pub fn for_puzzle(puzzle: &Puzzle) -> Self {
        Self {
            guess: GuessLayout {
                card_positions: default_layout(puzzle.candidate_count()),
            },
            previous_guesses: Vec::new(),
            guess_submitted: false,
        }
    }

    pub fn placements(&self) -> &[Placement] {
        &self.guess.card_positions
    }

    /// The placements a guess submits: the primary slots only.
    pub fn primary_placements(&self) -> Vec<Placement> {
        self.guess
            .card_positions
            .iter()
            .take(PRIMARY_SLOTS)
            .copied()
            .collect()
    }

    pub fn validate(&self, puzzle: &Puzzle) -> Result<(), BoardError> {
        validate_layout(&self.guess.card_positions, puzzle.candidate_count())
    }

    pub fn swap(&mut self, a: usize, b: usize) -> Result<(), BoardError> {
        swap_slots(&mut self.guess.card_positions, a, b)?;
        self.guess_submitted = false;
        Ok(())
    }

    pub fn rotate(&mut self, slot: usize, delta: i32) -> Result<(), BoardError> {
        rotate_slot(&mut self.guess.card_positions, slot, delta)?;
        self.guess_submitted = false;
        Ok(())
    }

    pub fn record_guess(&mut self, record: GuessRecord) {
        self.previous_guesses.push(record);
        self.guess_submitted = true;
    }

    pub fn is_solved(&self) -> bool {
        self.previous_guesses
            .last()
            .map(GuessRecord::is_solved)
            .unwrap_or(false)
    }
}

/// A session's replica, as cached in local storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatedState {
    /// Writer of the remote copy this replica last agreed with.
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(flatten)]
    pub board: BoardState,
    /// Local-only; never pushed.
    #[serde(default)]
    pub copied_to_clipboard: bool,
}

impl ReplicatedState {
    pub fn for_puzzle(puzzle: &Puzzle) -> Self {
        Self {
            client_id: None,
            board: BoardState::for_puzzle(puzzle),
            copied_to_clipboard: false,
        }
    }

    /// Replaces the replicated document wholesale with a remote copy. Only the
    /// local-only clipboard flag survives.
    pub fn superseded_by(&self, remote: RemoteState) -> Self {
        Self {
            client_id: Some(remote.client_id),
            board: remote.data,
            copied_to_clipboard: self.copied_to_clipboard,
        }
    }
}

/// The authoritative copy held by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteState {
    pub client_id: ClientId,
    pub data: BoardState,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
}
