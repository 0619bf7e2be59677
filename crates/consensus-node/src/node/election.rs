//! Proposer lottery and verify-group choice, both seeded by the parent's
//! random.
use crate::chain::types::{BlockHeader, MinerInfo};
use crate::config::ConsensusParams;
use crate::node::errors::{NodeError, NodeResult};
use ecvrf::{quality_number, StakeWeight, VrfOutput, VrfProof, VrfSecretKey};
use threshold_bls::hash::DataHasher;
use threshold_bls::Hash;

/// The VRF input for proposing at `height` on top of a parent.
pub fn vrf_alpha(pre_random: &[u8], height: u64) -> Hash {
    DataHasher::with_domain(b"vrf")
        .update_bytes(pre_random)
        .update_u64(height)
        .finalize()
}

pub fn verify_group_seed(pre_random: &[u8]) -> Hash {
    Hash::digest(pre_random)
}

fn stake_weight(miner: &MinerInfo, total_stake: u64, params: &ConsensusParams) -> StakeWeight {
    StakeWeight::new(miner.stake, total_stake, params.proposer_multiplier)
}

fn quality(
    output: &VrfOutput,
    miner: &MinerInfo,
    total_stake: u64,
    params: &ConsensusParams,
) -> Option<u64> {
    quality_number(
        output,
        &stake_weight(miner, total_stake, params),
        params.max_qn,
    )
}

/// Draws this miner's ticket. `None` when it may not propose at `height`.
pub fn draw_ticket(
    vrf_secret_key: &VrfSecretKey,
    miner: &MinerInfo,
    total_stake: u64,
    pre: &BlockHeader,
    height: u64,
    params: &ConsensusParams,
) -> NodeResult<Option<(VrfProof, u64)>> {
    if !miner.is_active(height) {
        return Ok(None);
    }

    let proof = vrf_secret_key.prove(vrf_alpha(&pre.random, height).as_bytes())?;

    Ok(quality(&proof.output(), miner, total_stake, params).map(|qn| (proof, qn)))
}

/// Checks the castor's proof for `header` and returns its QN.
pub fn verify_ticket(
    pre: &BlockHeader,
    header: &BlockHeader,
    miner: &MinerInfo,
    total_stake: u64,
    params: &ConsensusParams,
) -> NodeResult<u64> {
    if !miner.is_active(header.height) {
        return Err(NodeError::NotEligible);
    }

    let output = miner
        .vrf_public_key
        .verify_bytes(
            &header.prove_value,
            vrf_alpha(&pre.random, header.height).as_bytes(),
        )
        .map_err(|_| NodeError::InvalidProof)?;

    quality(&output, miner, total_stake, params).ok_or(NodeError::NotEligible)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::chain::types::Block;
    use threshold_bls::{Id, SecretKey};

    fn miner(seed: u8, stake: u64) -> (VrfSecretKey, MinerInfo) {
        let vrf = VrfSecretKey::from_seed([seed; 32]);

        let sk = SecretKey::from_seed(&[seed]);

        let info = MinerInfo {
            id: Id::from_public_key(&sk.public_key()),
            public_key: sk.public_key(),
            vrf_public_key: vrf.public_key(),
            stake,
            apply_height: 0,
        };

        (vrf, info)
    }

    fn params(multiplier: u64) -> ConsensusParams {
        ConsensusParams {
            proposer_multiplier: multiplier,
            max_qn: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_saturated_miner_always_draws() {
        let (vrf, info) = miner(1, 10);

        let pre = Block::genesis(Id::from_address(b"g"), 0).header;

        for height in 1..10 {
            let ticket = draw_ticket(&vrf, &info, 40, &pre, height, &params(1_000)).unwrap();

            let (proof, qn) = ticket.unwrap();

            assert!((1..=100).contains(&qn));

            let mut header = pre.clone();
            header.height = height;
            header.prove_value = proof.to_bytes().to_vec();

            assert_eq!(
                verify_ticket(&pre, &header, &info, 40, &params(1_000)).unwrap(),
                qn
            );
        }
    }

    #[test]
    fn test_ticket_is_bound_to_height_and_key() {
        let (vrf, info) = miner(2, 10);
        let (_, other) = miner(3, 10);

        let pre = Block::genesis(Id::from_address(b"g"), 0).header;

        let (proof, _) = draw_ticket(&vrf, &info, 10, &pre, 1, &params(1_000))
            .unwrap()
            .unwrap();

        let mut header = pre.clone();
        header.height = 2;
        header.prove_value = proof.to_bytes().to_vec();

        assert!(matches!(
            verify_ticket(&pre, &header, &info, 10, &params(1_000)),
            Err(NodeError::InvalidProof)
        ));

        header.height = 1;

        assert!(matches!(
            verify_ticket(&pre, &header, &other, 10, &params(1_000)),
            Err(NodeError::InvalidProof)
        ));
    }

    #[test]
    fn test_inactive_and_stakeless_miners() {
        let (vrf, mut info) = miner(4, 0);

        let pre = Block::genesis(Id::from_address(b"g"), 0).header;

        assert_eq!(
            draw_ticket(&vrf, &info, 100, &pre, 1, &params(1_000)).unwrap(),
            None
        );

        info.stake = 10;
        info.apply_height = 5;

        assert_eq!(
            draw_ticket(&vrf, &info, 100, &pre, 4, &params(1_000)).unwrap(),
            None
        );
    }

    #[test]
    fn test_seeds_differ() {
        let random = Hash::digest(b"r");

        assert_ne!(
            vrf_alpha(random.as_bytes(), 1),
            vrf_alpha(random.as_bytes(), 2)
        );
        assert_eq!(verify_group_seed(random.as_bytes()), Hash::digest(random.as_bytes()));
    }
}
