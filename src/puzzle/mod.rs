//! Puzzle reference data and the per-slot guess primitives shared by the
//! board, the feedback deducer and the replicated state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod board;
pub mod scoring;

pub use board::{card_faces, clue_pairs, share_text, Selection};
pub use scoring::score_guess;

/// Number of scored slots in every puzzle.
pub const PRIMARY_SLOTS: usize = 4;
/// Number of words printed on a card.
pub const WORDS_PER_CARD: usize = 4;
/// Number of distinct orientations a card can be displayed in.
pub const ORIENTATIONS: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PuzzleId(String);

impl PuzzleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which the solver state for this puzzle is cached locally.
    pub fn state_key(&self) -> String {
        format!("{}/state", self.0)
    }
}

impl fmt::Display for PuzzleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PuzzleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

pub type Card = [String; WORDS_PER_CARD];

/// A puzzle as served by the backend. Never mutated by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Puzzle {
    pub id: PuzzleId,
    #[serde(default)]
    pub answer_cards: Vec<Card>,
    #[serde(rename = "suggested_possible_cards")]
    pub candidate_cards: Vec<Card>,
    pub clues: Option<Vec<String>>,
    #[serde(default)]
    pub author: String,
    pub suggested_num_cards: Option<usize>,
    pub last_updated_time: Option<DateTime<Utc>>,
}

impl Puzzle {
    pub fn candidate_count(&self) -> usize {
        self.candidate_cards.len()
    }

    pub fn clue(&self, slot: usize) -> Option<&str> {
        self.clues
            .as_ref()
            .and_then(|clues| clues.get(slot))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("slot {slot} is out of range for a layout of {len} slots")]
    SlotOutOfRange { slot: usize, len: usize },
    #[error("orientation {0} is outside 0..4")]
    OrientationOutOfRange(u8),
    #[error("feedback code {0} is not one of 0, 1, 2")]
    UnknownFeedbackCode(u8),
    #[error("guess record carries {placements} placements and {codes} codes, expected 4 of each")]
    RecordShape { placements: usize, codes: usize },
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
}

/// Quarter-turn rotation applied to a card's word order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Orientation(u8);

impl Orientation {
    pub const IDENTITY: Orientation = Orientation(0);

    pub fn new(steps: u8) -> Result<Self, BoardError> {
        if steps < ORIENTATIONS {
            Ok(Self(steps))
        } else {
            Err(BoardError::OrientationOutOfRange(steps))
        }
    }

    pub fn steps(self) -> u8 {
        self.0
    }

    /// Rotate by `delta` quarter-turns; negative values turn counter-clockwise.
    pub fn rotated(self, delta: i32) -> Self {
        let turned = (i32::from(self.0) + delta).rem_euclid(i32::from(ORIENTATIONS));
        // rem_euclid keeps the value in 0..4
        Self(turned as u8)
    }
}

impl TryFrom<u8> for Orientation {
    type Error = BoardError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Orientation> for u8 {
    fn from(value: Orientation) -> Self {
        value.0
    }
}

/// Which candidate card sits in a slot and how it is turned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(usize, Orientation)", into = "(usize, Orientation)")]
pub struct Placement {
    pub card: usize,
    pub orientation: Orientation,
}

impl Placement {
    pub fn new(card: usize, orientation: Orientation) -> Self {
        Self { card, orientation }
    }

    pub fn upright(card: usize) -> Self {
        Self::new(card, Orientation::IDENTITY)
    }
}

impl From<(usize, Orientation)> for Placement {
    fn from((card, orientation): (usize, Orientation)) -> Self {
        Self { card, orientation }
    }
}

impl From<Placement> for (usize, Orientation) {
    fn from(value: Placement) -> Self {
        (value.card, value.orientation)
    }
}

/// Per-slot verdict returned by the backend for one guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FeedbackCode {
    /// The card does not belong in this slot.
    WrongCard,
    /// Card and orientation both match the answer.
    Exact,
    /// Right card, wrong orientation.
    Misrotated,
}

impl FeedbackCode {
    pub fn value(self) -> u8 {
        match self {
            FeedbackCode::WrongCard => 0,
            FeedbackCode::Exact => 1,
            FeedbackCode::Misrotated => 2,
        }
    }

    pub fn is_informative(self) -> bool {
        self != FeedbackCode::WrongCard
    }

    /// Emoji used in the shareable score grid.
    pub fn glyph(self) -> &'static str {
        match self {
            FeedbackCode::Exact => "\u{1F7E9}",
            FeedbackCode::Misrotated => "\u{1F7E8}",
            FeedbackCode::WrongCard => "\u{2B1B}",
        }
    }
}

impl TryFrom<u8> for FeedbackCode {
    type Error = BoardError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FeedbackCode::WrongCard),
            1 => Ok(FeedbackCode::Exact),
            2 => Ok(FeedbackCode::Misrotated),
            other => Err(BoardError::UnknownFeedbackCode(other)),
        }
    }
}

impl From<FeedbackCode> for u8 {
    fn from(value: FeedbackCode) -> Self {
        value.value()
    }
}

pub type FeedbackVector = Vec<FeedbackCode>;

/// One submitted guess and the feedback it earned. Serialized as the pair
/// `[placements, codes]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "(Vec<Placement>, FeedbackVector)",
    into = "(Vec<Placement>, FeedbackVector)"
)]
pub struct GuessRecord {
    placements: Vec<Placement>,
    feedback: FeedbackVector,
}

impl GuessRecord {
    pub fn new(placements: Vec<Placement>, feedback: FeedbackVector) -> Result<Self, BoardError> {
        if placements.len() != PRIMARY_SLOTS || feedback.len() != PRIMARY_SLOTS {
            return Err(BoardError::RecordShape {
                placements: placements.len(),
                codes: feedback.len(),
            });
        }
        Ok(Self {
            placements,
            feedback,
        })
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn feedback(&self) -> &[FeedbackCode] {
        &self.feedback
    }

    /// Placement and code at a primary slot, paired.
    pub fn slots(&self) -> impl Iterator<Item = (Placement, FeedbackCode)> + '_ {
        self.placements
            .iter()
            .copied()
            .zip(self.feedback.iter().copied())
    }

    pub fn is_solved(&self) -> bool {
        self.feedback.iter().all(|code| *code == FeedbackCode::Exact)
    }
}

impl TryFrom<(Vec<Placement>, FeedbackVector)> for GuessRecord {
    type Error = BoardError;

    fn try_from((placements, feedback): (Vec<Placement>, FeedbackVector)) -> Result<Self, Self::Error> {
        Self::new(placements, feedback)
    }
}

impl From<GuessRecord> for (Vec<Placement>, FeedbackVector) {
    fn from(value: GuessRecord) -> Self {
        (value.placements, value.feedback)
    }
}
