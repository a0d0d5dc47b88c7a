use super::{FeedbackCode, FeedbackVector, Placement};

/// Scores a guess against the answer layout, one code per answer slot.
/// Slots the guess does not reach count as wrong.
pub fn score_guess(answer: &[Placement], guess: &[Placement]) -> FeedbackVector {
    answer
        .iter()
        .enumerate()
        .map(|(slot, expected)| match guess.get(slot) {
            Some(guessed) if guessed == expected => FeedbackCode::Exact,
            Some(guessed) if guessed.card == expected.card => FeedbackCode::Misrotated,
            _ => FeedbackCode::WrongCard,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puzzle::Orientation;

    fn at(card: usize, steps: u8) -> Placement {
        Placement::new(card, Orientation::new(steps).unwrap())
    }

    #[test]
    fn scores_exact_misrotated_and_wrong() {
        let answer = [at(5, 2), at(2, 1), at(0, 1), at(3, 0)];
        let guess = [at(5, 2), at(2, 0), at(3, 0), at(0, 1)];
        assert_eq!(
            score_guess(&answer, &guess),
            vec![
                FeedbackCode::Exact,
                FeedbackCode::Misrotated,
                FeedbackCode::WrongCard,
                FeedbackCode::WrongCard,
            ]
        );
    }

    #[test]
    fn short_guess_scores_missing_slots_as_wrong() {
        let answer = [at(1, 0), at(2, 0), at(3, 0), at(4, 0)];
        let guess = [at(1, 0)];
        assert_eq!(
            score_guess(&answer, &guess),
            vec![
                FeedbackCode::Exact,
                FeedbackCode::WrongCard,
                FeedbackCode::WrongCard,
                FeedbackCode::WrongCard,
            ]
        );
    }
}
