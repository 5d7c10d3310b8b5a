//! Alert Assembler - packages one candidate's findings into an alert

use chrono::{DateTime, Utc};

use crate::error::MonitorError;
use crate::models::{ActivityStats, AddressProfile, CabalAlert, ClusterResult};
use crate::modules::price_detector::Candidate;

/// Build the alert record. No I/O; fails only on structurally invalid input.
pub fn assemble(
    candidate: &Candidate,
    suspicious: Vec<AddressProfile>,
    activity: ActivityStats,
    cluster: ClusterResult,
    watched_tokens: Vec<String>,
    generated_at: DateTime<Utc>,
) -> Result<CabalAlert, MonitorError> {
    let token = &candidate.snapshot;

    if token.contract_address.is_empty() {
        return Err(MonitorError::InvalidAlert("empty token identity".into()));
    }
    if !candidate.percent_increase.is_finite() {
        return Err(MonitorError::InvalidAlert(format!(
            "{}: non-finite price increase",
            token.contract_address
        )));
    }
    if !cluster.candidate.is_empty() && cluster.candidate != token.contract_address {
        return Err(MonitorError::InvalidAlert(format!(
            "cluster computed for {} attached to {}",
            cluster.candidate, token.contract_address
        )));
    }
    if cluster.contains(&token.contract_address) {
        return Err(MonitorError::InvalidAlert(format!(
            "{}: listed in its own cluster",
            token.contract_address
        )));
    }
    if suspicious.iter().any(|p| p.address.is_empty()) {
        return Err(MonitorError::InvalidAlert(format!(
            "{}: suspicious profile without address",
            token.contract_address
        )));
    }

    Ok(CabalAlert {
        token: token.clone(),
        previous_price: candidate.previous_price,
        price_increase_pct: candidate.percent_increase,
        suspicious,
        activity,
        cluster,
        watched_tokens,
        generated_at,
    })
}
