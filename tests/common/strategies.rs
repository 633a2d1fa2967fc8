#![allow(dead_code)]

use dealwatch_core::models::DealCandidate;
use proptest::prelude::*;

/// Run frequencies including values outside the accepted range
pub fn raw_run_frequency_strategy() -> impl Strategy<Value = i32> {
    prop_oneof![-100i32..5, 5i32..=1440, 1441i32..100_000]
}

/// Minimum scores including values outside 0..=100
pub fn raw_minimum_score_strategy() -> impl Strategy<Value = i32> {
    prop_oneof![-1_000i32..0, 0i32..=100, 101i32..1_000]
}

pub fn deal_score_strategy() -> impl Strategy<Value = f64> {
    (0u32..=10_000).prop_map(|hundredths| f64::from(hundredths) / 100.0)
}

/// Candidate lists with deliberately colliding item ids
pub fn candidates_strategy() -> impl Strategy<Value = Vec<DealCandidate>> {
    prop::collection::vec(("[a-e]", deal_score_strategy()), 0..20).prop_map(|items| {
        items
            .into_iter()
            .map(|(item_id, score)| DealCandidate::new(item_id.clone(), item_id, score))
            .collect()
    })
}
