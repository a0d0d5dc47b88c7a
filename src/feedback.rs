//! Turns the guess history into per-slot judgments for the cards currently on
//! the board.
//!
//! For every primary slot the deducer keeps the most informative code seen so
//! far (the lowest nonzero one, or 0 while nothing better has appeared) and
//! the placements that produced it, in the order they were guessed. The
//! current card is then judged against that evidence alone. Nothing is cached
//! between calls: the same history and layout always give the same answer.

use crate::puzzle::{FeedbackCode, GuessRecord, Placement, PRIMARY_SLOTS};

/// How a card should be marked while it sits in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardState {
    /// No applicable evidence yet.
    Unclassified,
    /// The card is known not to belong in this slot.
    Incorrect,
    /// Right card, right orientation.
    Correct,
    /// Right card, wrong orientation.
    CorrectPosition,
}

/// Best evidence collected for one primary slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotEvidence {
    best: FeedbackCode,
    placements: Vec<Placement>,
}

impl Default for SlotEvidence {
    fn default() -> Self {
        Self {
            best: FeedbackCode::WrongCard,
            placements: Vec::new(),
        }
    }
}

impl SlotEvidence {
    pub fn best(&self) -> FeedbackCode {
        self.best
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    fn observe(&mut self, placement: Placement, code: FeedbackCode) {
        let supersedes = code.is_informative()
            && (!self.best.is_informative() || code.value() < self.best.value());
        if supersedes {
            self.best = code;
            self.placements.clear();
            self.placements.push(placement);
        } else if code == self.best {
            self.placements.push(placement);
        }
    }

    /// Earliest placement of `card` among the evidence, if any.
    fn earliest_for(&self, card: usize) -> Option<&Placement> {
        self.placements.iter().find(|placement| placement.card == card)
    }

    pub fn classify(&self, current: Placement) -> CardState {
        match (self.earliest_for(current.card), self.best) {
            (Some(_), FeedbackCode::WrongCard) => CardState::Incorrect,
            (Some(recorded), FeedbackCode::Exact)
                if recorded.orientation == current.orientation =>
            {
                CardState::Correct
            }
            (Some(_), _) => CardState::CorrectPosition,
            (None, FeedbackCode::WrongCard) => CardState::Unclassified,
            (None, _) => CardState::Incorrect,
        }
    }
}

/// Accumulated evidence for all primary slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionKnowledge {
    slots: [SlotEvidence; PRIMARY_SLOTS],
}

impl PositionKnowledge {
    pub fn from_history(history: &[GuessRecord]) -> Self {
        let mut slots: [SlotEvidence; PRIMARY_SLOTS] = Default::default();
        for record in history {
            for (evidence, (placement, code)) in slots.iter_mut().zip(record.slots()) {
                evidence.observe(placement, code);
            }
        }
        Self { slots }
    }

    pub fn slot(&self, slot: usize) -> Option<&SlotEvidence> {
        self.slots.get(slot)
    }

    /// Judgment for `current` shown at `slot`. Leftover slots are never scored.
    pub fn classify(&self, slot: usize, current: Placement) -> CardState {
        self.slot(slot)
            .map(|evidence| evidence.classify(current))
            .unwrap_or(CardState::Unclassified)
    }

    /// Judgment for every displayed slot of a layout.
    pub fn classify_layout(&self, placements: &[Placement]) -> Vec<CardState> {
        placements
            .iter()
            .enumerate()
            .map(|(slot, placement)| self.classify(slot, *placement))
            .collect()
    }
}

/// One-shot convenience over [`PositionKnowledge`].
pub fn classify_layout(history: &[GuessRecord], placements: &[Placement]) -> Vec<CardState> {
    PositionKnowledge::from_history(history).classify_layout(placements)
}
