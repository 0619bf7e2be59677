use crate::primitives::{DKGError, DKGResult, GroupParams};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use threshold_bls::{Hash, Id};

/// A miner that could join a new group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateInfo {
    pub id: Id,
    pub stake: u64,
    /// Number of live groups the miner already belongs to.
    pub group_count: usize,
}

fn seeded_rng(seed: &Hash) -> ChaCha20Rng {
    ChaCha20Rng::from_seed(*seed.as_bytes())
}

/// Picks `ceil(n / 2)` kings out of the parent group with a seeded shuffle.
/// The result is sorted by id.
pub fn select_kings(members: &[Id], seed: &Hash) -> Vec<Id> {
    let mut shuffled = members.to_vec();

    shuffled.shuffle(&mut seeded_rng(seed));

    let mut kings: Vec<Id> = shuffled
        .into_iter()
        .take((members.len() + 1) / 2)
        .collect();

    kings.sort();

    kings
}

/// Stake-weighted sampling without replacement among the miners that have
/// enough stake and room under the membership cap. Sorted by id.
pub fn select_candidates(
    pool: &[CandidateInfo],
    seed: &Hash,
    params: &GroupParams,
) -> DKGResult<Vec<Id>> {
    let mut eligible: Vec<&CandidateInfo> = pool
        .iter()
        .filter(|c| c.stake >= params.min_stake.max(1) && c.group_count < params.member_group_cap)
        .collect();

    // sampling must not depend on the caller's ordering
    eligible.sort_by_key(|c| c.id);

    if eligible.len() < params.member_min {
        return Err(DKGError::InvalidGroupSize(eligible.len()));
    }

    let mut chosen: Vec<Id> = eligible
        .choose_multiple_weighted(&mut seeded_rng(seed), params.member_max, |c| {
            c.stake as f64
        })
        .map_err(|e| DKGError::Selection(e.to_string()))?
        .map(|c| c.id)
        .collect();

    chosen.sort();

    Ok(chosen)
}
