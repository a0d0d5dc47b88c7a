use std::collections::HashSet;

use super::{BoardError, GuessRecord, Placement, Puzzle, PRIMARY_SLOTS, WORDS_PER_CARD};

/// Initial layout: every candidate card in offer order, upright.
pub fn default_layout(candidate_count: usize) -> Vec<Placement> {
    (0..candidate_count).map(Placement::upright).collect()
}

/// A layout is valid when it is a permutation of the puzzle's candidates.
pub fn validate_layout(placements: &[Placement], candidate_count: usize) -> Result<(), BoardError> {
    if placements.len() != candidate_count {
        return Err(BoardError::InvalidLayout(format!(
            "{} placements for {candidate_count} candidates",
            placements.len()
        )));
    }
    let mut seen = HashSet::with_capacity(placements.len());
    for placement in placements {
        if placement.card >= candidate_count {
            return Err(BoardError::InvalidLayout(format!(
                "card {} is not among the {candidate_count} candidates",
                placement.card
            )));
        }
        if !seen.insert(placement.card) {
            return Err(BoardError::InvalidLayout(format!(
                "card {} is placed twice",
                placement.card
            )));
        }
    }
    Ok(())
}

fn check_slot(placements: &[Placement], slot: usize) -> Result<(), BoardError> {
    if slot < placements.len() {
        Ok(())
    } else {
        Err(BoardError::SlotOutOfRange {
            slot,
            len: placements.len(),
        })
    }
}

pub fn swap_slots(placements: &mut [Placement], a: usize, b: usize) -> Result<(), BoardError> {
    check_slot(placements, a)?;
    check_slot(placements, b)?;
    placements.swap(a, b);
    Ok(())
}

pub fn rotate_slot(placements: &mut [Placement], slot: usize, delta: i32) -> Result<(), BoardError> {
    check_slot(placements, slot)?;
    let placement = &mut placements[slot];
    placement.orientation = placement.orientation.rotated(delta);
    Ok(())
}

/// Words of the card in `placement`, in display order after rotation.
pub fn card_faces(puzzle: &Puzzle, placement: Placement) -> Option<[&str; WORDS_PER_CARD]> {
    let card = puzzle.candidate_cards.get(placement.card)?;
    let offset = usize::from(placement.orientation.steps());
    Some(std::array::from_fn(|i| {
        card[(i + offset) % WORDS_PER_CARD].as_str()
    }))
}

/// For each clue, the two words it has to connect under the current layout:
/// the second word of slot `k` and the first word of slot `k + 1`, wrapping
/// back to slot 0 after the last primary slot.
pub fn clue_pairs<'a>(puzzle: &'a Puzzle, placements: &[Placement]) -> Vec<Option<(&'a str, &'a str)>> {
    (0..PRIMARY_SLOTS)
        .map(|slot| {
            let upper = card_faces(puzzle, *placements.get(slot)?)?;
            let lower = card_faces(puzzle, *placements.get((slot + 1) % PRIMARY_SLOTS)?)?;
            Some((upper[1], lower[0]))
        })
        .collect()
}

/// Emoji score grid the solver can paste elsewhere.
pub fn share_text(puzzle: &Puzzle, history: &[GuessRecord], play_url: &str) -> String {
    let num_cards = puzzle
        .suggested_num_cards
        .unwrap_or_else(|| puzzle.candidate_count());
    let rows = history
        .iter()
        .map(|record| {
            record
                .feedback()
                .iter()
                .map(|code| code.glyph())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("{num_cards} card clover game\n{rows}\nPlay this puzzle at {play_url}")
}

/// Two-click card selection. The first click picks a slot, a second click on
/// another slot yields the pair to swap, a second click on the same slot
/// cancels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    selected: Option<usize>,
}

impl Selection {
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn click(&mut self, slot: usize) -> Option<(usize, usize)> {
        match self.selected.take() {
            None => {
                self.selected = Some(slot);
                None
            }
            Some(previous) if previous == slot => None,
            Some(previous) => Some((previous, slot)),
        }
    }

    pub fn clear(&mut self) {
        self.selected = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puzzle::{FeedbackCode, Orientation, PuzzleId};

    fn card(prefix: &str) -> [String; WORDS_PER_CARD] {
        std::array::from_fn(|i| format!("{prefix}{i}"))
    }

    fn sample_puzzle() -> Puzzle {
        Puzzle {
            id: PuzzleId::new("7"),
            answer_cards: Vec::new(),
            candidate_cards: vec![card("a"), card("b"), card("c"), card("d"), card("e")],
            clues: Some(vec!["one".into(), "two".into(), "three".into(), "four".into()]),
            author: "author".into(),
            suggested_num_cards: Some(5),
            last_updated_time: None,
        }
    }

    #[test]
    fn default_layout_is_upright_and_in_order() {
        let layout = default_layout(5);
        assert_eq!(layout.len(), 5);
        assert!(layout
            .iter()
            .enumerate()
            .all(|(i, p)| p.card == i && p.orientation == Orientation::IDENTITY));
        assert!(validate_layout(&layout, 5).is_ok());
    }

    #[test]
    fn validate_layout_rejects_duplicates_and_unknown_cards() {
        let duplicated = vec![
            Placement::upright(0),
            Placement::upright(1),
            Placement::upright(1),
            Placement::upright(3),
        ];
        assert!(validate_layout(&duplicated, 4).is_err());

        let unknown = vec![
            Placement::upright(0),
            Placement::upright(1),
            Placement::upright(2),
            Placement::upright(9),
        ];
        assert!(validate_layout(&unknown, 4).is_err());
    }

    #[test]
    fn swap_and_rotate_check_bounds() {
        let mut layout = default_layout(5);
        swap_slots(&mut layout, 0, 4).unwrap();
        assert_eq!(layout[0].card, 4);
        assert_eq!(layout[4].card, 0);

        rotate_slot(&mut layout, 0, -1).unwrap();
        assert_eq!(layout[0].orientation.steps(), 3);

        assert_eq!(
            swap_slots(&mut layout, 0, 5),
            Err(BoardError::SlotOutOfRange { slot: 5, len: 5 })
        );
        assert!(rotate_slot(&mut layout, 9, 1).is_err());
    }

    #[test]
    fn card_faces_rotate_left() {
        let puzzle = sample_puzzle();
        let faces = card_faces(&puzzle, Placement::new(1, Orientation::new(1).unwrap())).unwrap();
        assert_eq!(faces, ["b1", "b2", "b3", "b0"]);
        assert!(card_faces(&puzzle, Placement::upright(8)).is_none());
    }

    #[test]
    fn clue_pairs_wrap_to_first_slot() {
        let puzzle = sample_puzzle();
        let layout = default_layout(5);
        let pairs = clue_pairs(&puzzle, &layout);
        assert_eq!(pairs[0], Some(("a1", "b0")));
        assert_eq!(pairs[3], Some(("d1", "a0")));
    }

    #[test]
    fn share_text_renders_emoji_grid() {
        let puzzle = sample_puzzle();
        let record = GuessRecord::new(
            default_layout(4),
            vec![
                FeedbackCode::Exact,
                FeedbackCode::Misrotated,
                FeedbackCode::WrongCard,
                FeedbackCode::Exact,
            ],
        )
        .unwrap();
        let text = share_text(&puzzle, &[record], "http://clover.test/games/7/guess");
        assert_eq!(
            text,
            "5 card clover game\n\u{1F7E9}\u{1F7E8}\u{2B1B}\u{1F7E9}\nPlay this puzzle at http://clover.test/games/7/guess"
        );
    }

    #[test]
    fn selection_swaps_on_second_click_and_cancels_on_same_slot() {
        let mut selection = Selection::default();
        assert_eq!(selection.click(2), None);
        assert_eq!(selection.selected(), Some(2));
        assert_eq!(selection.click(2), None);
        assert_eq!(selection.selected(), None);

        selection.click(1);
        assert_eq!(selection.click(3), Some((1, 3)));
        assert_eq!(selection.selected(), None);
    }
}
