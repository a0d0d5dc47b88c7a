//! Common test utilities shared across modules

use crate::puzzle::{Card, Puzzle, PuzzleId};

/// Helpers shared across test modules.
pub mod serde {
    use std::fmt::Debug;

    /// Assert that a value survives a serde_json round-trip using structural equality.
    pub fn assert_round_trip_eq<T>(value: &T)
    where
        T: ::serde::Serialize + ::serde::de::DeserializeOwned + PartialEq + Debug,
    {
        let json = serde_json::to_string(value)
            .expect("serialization should succeed during round-trip testing");
        let restored: T = serde_json::from_str(&json)
            .expect("deserialization should succeed during round-trip testing");
        assert_eq!(restored, *value, "serde_json round-trip altered the value");
    }

    /// Assert that serde_json emits the same payload before and after round-tripping.
    pub fn assert_round_trip_json<T>(value: &T)
    where
        T: ::serde::Serialize + ::serde::de::DeserializeOwned,
    {
        let json = serde_json::to_value(value)
            .expect("serialization to value should succeed during round-trip testing");
        let restored: T = serde_json::from_value(json.clone())
            .expect("deserialization from value should succeed during round-trip testing");
        let json_after = serde_json::to_value(restored)
            .expect("re-serialization should succeed during round-trip testing");
        assert_eq!(
            json_after, json,
            "serde_json round-trip altered the payload"
        );
    }
}

/// Card whose words are `{prefix}0..{prefix}3`.
pub fn card(prefix: &str) -> Card {
    std::array::from_fn(|i| format!("{prefix}{i}"))
}

/// A puzzle with `candidates` cards and four clues, nothing hidden.
pub fn sample_puzzle(id: &str, candidates: usize) -> Puzzle {
    Puzzle {
        id: PuzzleId::new(id),
        answer_cards: Vec::new(),
        candidate_cards: (0..candidates)
            .map(|i| card(&format!("c{i}w")))
            .collect(),
        clues: Some(vec![
            "north".into(),
            "east".into(),
            "south".into(),
            "west".into(),
        ]),
        author: "tester".into(),
        suggested_num_cards: Some(candidates),
        last_updated_time: None,
    }
}
