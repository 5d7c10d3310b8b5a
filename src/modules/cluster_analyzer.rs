//! Cluster Analyzer - finds tokens commonly held by the suspicious traders

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

use crate::config::Config;
use crate::models::{AddressProfile, ClusterEntry, ClusterResult, GroupCluster};
use crate::utils::shorten_address;

/// Native SOL, USDC, USDT, RAY, SRM
pub const DEFAULT_EXCLUDED_TOKENS: [&str; 5] = [
    "So11111111111111111111111111111111111111112",
    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
    "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
    "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R",
    "SRMuApVNdxXokk5GT7XD5cUUgXMBCoAz2LHeuAoKWRt",
];

#[derive(Debug, Clone)]
pub struct ClusterSettings {
    pub min_addresses: usize,
    pub min_total_value_usd: f64,
    pub excluded_tokens: HashSet<String>,
    pub min_group_common_tokens: usize,
    pub max_groups: usize,
}

impl ClusterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_addresses: config.cluster_min_addresses,
            min_total_value_usd: config.cluster_min_total_value_usd,
            excluded_tokens: config.excluded_tokens.iter().cloned().collect(),
            ..Default::default()
        }
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            min_addresses: 3,
            min_total_value_usd: 10_000.0,
            excluded_tokens: DEFAULT_EXCLUDED_TOKENS.iter().map(|t| t.to_string()).collect(),
            min_group_common_tokens: 2,
            max_groups: 5,
        }
    }
}

/// Pure analysis over one candidate's suspicious profiles
#[derive(Debug, Clone)]
pub struct ClusterAnalyzer {
    settings: ClusterSettings,
}

impl ClusterAnalyzer {
    pub fn new(settings: ClusterSettings) -> Self {
        Self { settings }
    }

    fn is_countable(&self, candidate: &str, token: &str) -> bool {
        !token.is_empty() && token != candidate && !self.settings.excluded_tokens.contains(token)
    }

    /// Deterministic for a given input: entries and groups are fully ordered
    pub fn analyze(&self, candidate: &str, suspicious: &[AddressProfile]) -> ClusterResult {
        // token -> addresses that touched it
        let mut index: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for profile in suspicious {
            for token in &profile.touched_tokens {
                if self.is_countable(candidate, token) {
                    index
                        .entry(token.as_str())
                        .or_default()
                        .insert(profile.address.as_str());
                }
            }
        }

        let by_address: BTreeMap<&str, &AddressProfile> =
            suspicious.iter().map(|p| (p.address.as_str(), p)).collect();

        let mut entries: Vec<ClusterEntry> = index
            .iter()
            .filter(|(_, addresses)| addresses.len() >= self.settings.min_addresses)
            .filter_map(|(token, addresses)| {
                let total_value_usd: f64 = addresses
                    .iter()
                    .filter_map(|a| by_address.get(a))
                    .map(|p| p.held_value(token))
                    .sum();
                if total_value_usd < self.settings.min_total_value_usd {
                    return None;
                }

                let symbol = addresses
                    .iter()
                    .filter_map(|a| by_address.get(a))
                    .find_map(|p| p.token_symbols.get(*token).cloned());

                Some(ClusterEntry {
                    token: token.to_string(),
                    symbol,
                    supporting_addresses: addresses.iter().map(|a| a.to_string()).collect(),
                    total_value_usd,
                })
            })
            .collect();

        entries.sort_by(|a, b| {
            b.address_count()
                .cmp(&a.address_count())
                .then_with(|| b.total_value_usd.total_cmp(&a.total_value_usd))
                .then_with(|| a.token.cmp(&b.token))
        });

        let groups = self.group_clusters(candidate, &index, &by_address);

        debug!(
            target: "CLUSTER",
            "{}: {} common tokens, {} groups across {} suspicious addresses",
            shorten_address(candidate, 4),
            entries.len(),
            groups.len(),
            suspicious.len()
        );

        ClusterResult {
            candidate: candidate.to_string(),
            entries,
            groups,
        }
    }

    /// Addresses sharing a token, scored by how many tokens they all share
    fn group_clusters(
        &self,
        candidate: &str,
        index: &BTreeMap<&str, BTreeSet<&str>>,
        by_address: &BTreeMap<&str, &AddressProfile>,
    ) -> Vec<GroupCluster> {
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut groups = Vec::new();

        for addresses in index.values() {
            if addresses.len() < self.settings.min_addresses {
                continue;
            }

            let mut common: Option<BTreeSet<&str>> = None;
            for address in addresses {
                let Some(profile) = by_address.get(address) else {
                    continue;
                };
                let tokens: BTreeSet<&str> = profile
                    .touched_tokens
                    .iter()
                    .map(String::as_str)
                    .filter(|t| self.is_countable(candidate, t))
                    .collect();
                common = Some(match common {
                    None => tokens,
                    Some(acc) => acc.intersection(&tokens).copied().collect(),
                });
            }

            let common = common.unwrap_or_default();
            if common.len() < self.settings.min_group_common_tokens {
                continue;
            }

            let members: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
            if !seen.insert(members.clone()) {
                continue;
            }
            groups.push(GroupCluster {
                score: members.len() * common.len(),
                addresses: members,
                common_tokens: common.iter().map(|t| t.to_string()).collect(),
            });
        }

        groups.sort_by(|a, b| match b.score.cmp(&a.score) {
            Ordering::Equal => a.addresses.cmp(&b.addresses),
            other => other,
        });
        groups.truncate(self.settings.max_groups);
        groups
    }
}
