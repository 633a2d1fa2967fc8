pub mod alert_record;
pub mod deal;
pub mod saved_search;

// Re-export core models for easy access
pub use alert_record::{AlertRecord, NewAlertRecord};
pub use deal::DealCandidate;
pub use saved_search::{
    clamp_minimum_score, clamp_run_frequency, FilterSet, NewSavedSearchTask, SavedSearchTask,
};
