//! Price Change Detector - flags tokens whose price rose past the threshold

use tracing::{debug, warn};

use crate::models::TokenSnapshot;
use crate::modules::snapshot_store::ComparablePair;

/// Slack (in percentage points) absorbing binary float error at the threshold
const THRESHOLD_EPSILON: f64 = 1e-9;

/// Outcome of comparing one token across two cycles
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceChange {
    /// Previous price was zero (or not finite); nothing to compare against
    NotEvaluable,
    Evaluated {
        percent_increase: f64,
        is_candidate: bool,
    },
}

/// Token whose price increase met the threshold this cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub snapshot: TokenSnapshot,
    pub previous_price: f64,
    pub percent_increase: f64,
}

#[derive(Debug, Clone)]
pub struct PriceChangeDetector {
    threshold_pct: f64,
}

impl PriceChangeDetector {
    pub fn new(threshold_pct: f64) -> Self {
        Self { threshold_pct }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold_pct
    }

    /// Compare one pair; no smoothing, only the immediately prior cycle counts
    pub fn evaluate(&self, previous: &TokenSnapshot, current: &TokenSnapshot) -> PriceChange {
        if previous.price <= 0.0 || !previous.price.is_finite() || !current.price.is_finite() {
            return PriceChange::NotEvaluable;
        }

        let percent_increase = (current.price - previous.price) / previous.price * 100.0;
        PriceChange::Evaluated {
            percent_increase,
            is_candidate: percent_increase + THRESHOLD_EPSILON >= self.threshold_pct,
        }
    }

    /// Evaluate every comparable pair and return the candidates in input order
    pub fn detect(&self, pairs: &[ComparablePair]) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for pair in pairs {
            match self.evaluate(&pair.previous, &pair.current) {
                PriceChange::NotEvaluable => {
                    warn!(
                        target: "DETECTOR",
                        "{} not comparable (previous {} / current {}), skipping",
                        pair.current.symbol,
                        pair.previous.price,
                        pair.current.price
                    );
                }
                PriceChange::Evaluated {
                    percent_increase,
                    is_candidate,
                } => {
                    debug!(
                        target: "DETECTOR",
                        "{}: ${:.8} -> ${:.8} ({:+.2}%)",
                        pair.current.symbol,
                        pair.previous.price,
                        pair.current.price,
                        percent_increase
                    );

                    if is_candidate {
                        crate::log_spike!(
                            "{} price up {:+.2}% (mcap ${:.0})",
                            pair.current.symbol,
                            percent_increase,
                            pair.current.market_cap
                        );
                        candidates.push(Candidate {
                            snapshot: pair.current.clone(),
                            previous_price: pair.previous.price,
                            percent_increase,
                        });
                    }
                }
            }
        }

        candidates
    }
}
