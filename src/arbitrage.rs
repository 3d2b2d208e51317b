use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A time-bounded price gap for one symbol: buy on `exchange1` at `price1`, sell on
/// `exchange2` at `price2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub symbol: String,
    pub exchange1: String,
    pub exchange2: String,
    pub price1: f64,
    pub price2: f64,
    pub spread: f64,
    pub spread_percent: f64,
    pub volume: f64,
    pub profit: f64,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
}

impl ArbitrageOpportunity {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }

    fn same_route(&self, other: &ArbitrageOpportunity) -> bool {
        self.symbol == other.symbol && self.exchange1 == other.exchange1 && self.exchange2 == other.exchange2
    }
}

#[derive(Debug, Clone)]
pub struct ArbitrageTracker {
    opportunities: Arc<Mutex<VecDeque<ArbitrageOpportunity>>>,
    capacity: usize,
}

impl Default for ArbitrageTracker {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ArbitrageTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            opportunities: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    /// Adds fresh opportunities. A newer sighting of the same symbol and venue pair replaces
    /// the one already held.
    pub fn record(&self, opportunities: impl IntoIterator<Item = ArbitrageOpportunity>) {
        let now = Utc::now();
        let mut held = self.opportunities.lock();
        held.retain(|o| !o.is_expired(now));
        for opportunity in opportunities.into_iter().filter(|o| !o.is_expired(now)) {
            held.retain(|o| !o.same_route(&opportunity));
            held.push_back(opportunity);
        }
        while held.len() > self.capacity {
            held.pop_front();
        }
    }

    /// Live opportunities. Expired entries are evicted before anything is returned.
    pub fn opportunities(&self) -> Vec<ArbitrageOpportunity> {
        self.opportunities_at(Utc::now())
    }

    pub fn opportunities_at(&self, now: DateTime<Utc>) -> Vec<ArbitrageOpportunity> {
        let mut held = self.opportunities.lock();
        held.retain(|o| !o.is_expired(now));
        held.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.opportunities.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.opportunities.lock().is_empty()
    }
}
