use crate::node::errors::NodeResult;
use dkg_core::primitives::GroupParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Consensus parameters, fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    pub group: GroupParams,
    /// Seconds a single height may take before the next height opens.
    pub max_cast_secs: u64,
    pub max_qn: u64,
    /// Scales a miner's stake ratio in the proposer lottery.
    pub proposer_multiplier: u64,
    pub max_transactions: usize,
    pub sign_pk_request_timeout_ms: u64,
    pub future_message_ttl_ms: u64,
    pub ticker_interval_ms: u64,
    /// Heights a verify context is kept below the chain top.
    pub context_keep_heights: u64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams {
            group: GroupParams::default(),
            max_cast_secs: 3,
            max_qn: 5,
            proposer_multiplier: 5,
            max_transactions: 100,
            sign_pk_request_timeout_ms: 60_000,
            future_message_ttl_ms: 60_000,
            ticker_interval_ms: 500,
            context_keep_heights: 20,
        }
    }
}

impl ConsensusParams {
    pub fn max_cast_ms(&self) -> u64 {
        self.max_cast_secs * 1_000
    }

    /// The latest time a cast for `height` built on a parent at
    /// `pre_height` is accepted. The first height gets twice the window.
    pub fn cast_deadline(&self, pre_timestamp: u64, pre_height: u64, height: u64) -> u64 {
        let mut window = height.saturating_sub(pre_height) * self.max_cast_ms();

        if height == 1 {
            window *= 2;
        }

        pre_timestamp.saturating_add(window)
    }

    /// The lowest height whose deadline has not passed at `now`, on top of
    /// the given parent.
    pub fn cast_height(&self, pre_timestamp: u64, pre_height: u64, now: u64) -> u64 {
        let elapsed = now.saturating_sub(pre_timestamp);

        let mut height = pre_height + 1 + elapsed / self.max_cast_ms().max(1);

        while height > pre_height + 1
            && self.cast_deadline(pre_timestamp, pre_height, height - 1) >= now
        {
            height -= 1;
        }

        height
    }
}

/// Settings of the demo binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: Option<PathBuf>,
    pub log_filter: String,
    pub nodes: usize,
    /// How many of the simulated miners form the genesis group.
    pub genesis_members: usize,
    pub rounds: u64,
    pub consensus: ConsensusParams,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            data_dir: None,
            log_filter: "info".to_string(),
            nodes: 6,
            genesis_members: 4,
            rounds: 30,
            consensus: ConsensusParams::default(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> NodeResult<Self> {
        let content = std::fs::read_to_string(path)?;

        Ok(serde_yaml::from_str(&content)?)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn test_deadline_doubles_for_first_height() {
        let params = ConsensusParams::default();

        assert_eq!(params.cast_deadline(1_000, 0, 1), 7_000);
        assert_eq!(params.cast_deadline(1_000, 4, 5), 4_000);
        assert_eq!(params.cast_deadline(1_000, 4, 6), 7_000);
    }

    #[test]
    fn test_cast_height_skips_expired_heights() {
        let params = ConsensusParams::default();

        assert_eq!(params.cast_height(1_000, 4, 1_500), 5);
        assert_eq!(params.cast_height(1_000, 4, 4_000), 5);
        assert_eq!(params.cast_height(1_000, 4, 4_001), 6);
        assert_eq!(params.cast_height(1_000, 4, 500), 5);
        assert_eq!(params.cast_height(1_000, 0, 5_000), 1);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: NodeConfig =
            serde_yaml::from_str("nodes: 4\nconsensus:\n  max_qn: 9\n  group:\n    member_min: 3\n")
                .unwrap();

        assert_eq!(config.nodes, 4);
        assert_eq!(config.consensus.max_qn, 9);
        assert_eq!(config.consensus.group.member_min, 3);
        assert_eq!(config.consensus.group.member_max, 10);
        assert_eq!(config.rounds, 30);
        assert_eq!(config.genesis_members, 4);
    }
}
