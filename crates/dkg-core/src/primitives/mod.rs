mod errors;

pub mod group;

pub mod types;

pub use errors::{DKGError, DKGResult};
pub use group::GroupInfo;
pub use types::{member_root, GroupHeader, GroupInitInfo, SharePiece, SignData};

use serde::{Deserialize, Serialize};

/// Smallest number of signers needed out of `member_count` for the given
/// percentage, rounded up.
pub fn minimum_threshold(member_count: usize, percent: usize) -> usize {
    let threshold = (member_count * percent + 99) / 100;

    threshold.clamp(1, member_count.max(1))
}

/// Parameters of group formation, fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupParams {
    pub member_min: usize,
    pub member_max: usize,
    pub threshold_percent: usize,
    /// A group creation starts at every height divisible by this.
    pub create_interval: u64,
    pub ready_gap: u64,
    pub work_gap: u64,
    pub wait_pong_gap: u64,
    pub group_life: u64,
    pub member_group_cap: usize,
    pub min_stake: u64,
    /// Heights after dismissal before a group is purged from caches.
    pub release_delay: u64,
    /// Heights to wait before asking a member for its share piece again.
    pub share_request_expiry: u64,
}

impl Default for GroupParams {
    fn default() -> Self {
        GroupParams {
            member_min: 4,
            member_max: 10,
            threshold_percent: 51,
            create_interval: 10,
            ready_gap: 5,
            work_gap: 5,
            wait_pong_gap: 2,
            group_life: 100,
            member_group_cap: 5,
            min_stake: 1,
            release_delay: 20,
            share_request_expiry: 2,
        }
    }
}

impl GroupParams {
    pub fn threshold(&self, member_count: usize) -> usize {
        minimum_threshold(member_count, self.threshold_percent)
    }

    pub fn is_create_height(&self, height: u64) -> bool {
        height > 0 && self.create_interval > 0 && height % self.create_interval == 0
    }
}
