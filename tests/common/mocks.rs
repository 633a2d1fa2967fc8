//! Scripted collaborators for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dealwatch_core::error::ProviderError;
use dealwatch_core::marketplace::{MarketplaceSearch, SearchRequest, SearchResponse};
use dealwatch_core::models::DealCandidate;
use dealwatch_core::notify::{DealAlert, Notifier};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Marketplace returning canned outcomes keyed by query text.
///
/// Queued outcomes for a query are consumed in order; once exhausted the query
/// falls back to its default outcome, then to an empty response.
#[derive(Default)]
pub struct ScriptedMarketplace {
    queued: Mutex<HashMap<String, VecDeque<Result<SearchResponse, ProviderError>>>>,
    defaults: Mutex<HashMap<String, Result<SearchResponse, ProviderError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `query` with these candidates
    pub fn respond_with(&self, query: &str, candidates: Vec<DealCandidate>) {
        self.defaults.lock().insert(
            query.to_string(),
            Ok(SearchResponse::with_candidates(candidates)),
        );
    }

    /// Always fail `query` with `error`
    pub fn fail_with(&self, query: &str, error: ProviderError) {
        self.defaults.lock().insert(query.to_string(), Err(error));
    }

    /// Answer the next call for `query` with `outcome`, ahead of the default
    pub fn enqueue(&self, query: &str, outcome: Result<SearchResponse, ProviderError>) {
        self.queued
            .lock()
            .entry(query.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl MarketplaceSearch for ScriptedMarketplace {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ProviderError> {
        self.calls.lock().push(request.query_text.clone());

        if let Some(outcome) = self
            .queued
            .lock()
            .get_mut(&request.query_text)
            .and_then(VecDeque::pop_front)
        {
            return outcome;
        }

        self.defaults
            .lock()
            .get(&request.query_text)
            .cloned()
            .unwrap_or_else(|| Ok(SearchResponse::default()))
    }
}

/// Notifier that remembers every alert it was asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<DealAlert>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<DealAlert> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn notified_item_ids(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .flat_map(|alert| alert.deals.iter().map(|deal| deal.item_id.clone()))
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn is_ready(&self) -> bool {
        true
    }

    async fn send(&self, alert: &DealAlert) -> anyhow::Result<()> {
        self.sent.lock().push(alert.clone());
        Ok(())
    }
}

/// Notifier whose transport always fails
#[derive(Default)]
pub struct FailingNotifier {
    attempts: AtomicUsize,
}

impl FailingNotifier {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for FailingNotifier {
    fn is_ready(&self) -> bool {
        false
    }

    async fn send(&self, _alert: &DealAlert) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("smtp relay refused connection")
    }
}

/// Notifier that panics, to exercise the run-level fatal guard
#[derive(Default)]
pub struct PanickingNotifier;

#[async_trait]
impl Notifier for PanickingNotifier {
    fn is_ready(&self) -> bool {
        true
    }

    async fn send(&self, _alert: &DealAlert) -> anyhow::Result<()> {
        panic!("notifier exploded")
    }
}
