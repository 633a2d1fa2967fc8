use serde::{Deserialize, Serialize};

/// A scored listing returned by the marketplace search.
///
/// Scoring happens upstream; `deal_score` is on the same 0-100 scale as a saved
/// search's `minimum_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealCandidate {
    pub item_id: String,
    pub title: String,
    pub price: f64,
    pub currency: String,
    pub url: Option<String>,
    pub deal_score: f64,
}

impl DealCandidate {
    pub fn new(item_id: impl Into<String>, title: impl Into<String>, deal_score: f64) -> Self {
        Self {
            item_id: item_id.into(),
            title: title.into(),
            price: 0.0,
            currency: "USD".to_string(),
            url: None,
            deal_score,
        }
    }
}
