use crate::vrf::VrfOutput;

/// A miner's share of the active stake, scaled by the proposer multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeWeight {
    pub stake: u64,
    pub total_stake: u64,
    pub multiplier: u64,
}

impl StakeWeight {
    pub fn new(stake: u64, total_stake: u64, multiplier: u64) -> Self {
        StakeWeight {
            stake,
            total_stake,
            multiplier,
        }
    }

    fn scaled_stake(&self) -> u128 {
        self.stake as u128 * self.multiplier as u128
    }

    /// `stake * multiplier >= total`, i.e. the stake ratio is capped at one.
    fn saturated(&self) -> bool {
        self.scaled_stake() >= self.total_stake as u128
    }
}

/// `output / 2^64 < min(1, stake * multiplier / total)`, evaluated on the top
/// 64 bits of the output.
pub fn is_eligible(output: &VrfOutput, weight: &StakeWeight) -> bool {
    if weight.stake == 0 || weight.total_stake == 0 || weight.multiplier == 0 {
        return false;
    }

    if weight.saturated() {
        return true;
    }

    let ratio = output.top_u64() as u128 * weight.total_stake as u128;

    ratio < weight.scaled_stake() << 64
}

/// `floor(vrf_ratio / (stake_ratio / max_qn)) + 1`, clamped to `max_qn`.
/// Returns `None` when the miner is not eligible.
pub fn quality_number(output: &VrfOutput, weight: &StakeWeight, max_qn: u64) -> Option<u64> {
    if max_qn == 0 || !is_eligible(output, weight) {
        return None;
    }

    let h = output.top_u64() as u128;

    // vrf_ratio / stake_ratio as a 64-bit fraction
    let relative = if weight.saturated() {
        h
    } else {
        h * weight.total_stake as u128 / weight.scaled_stake()
    };

    let qn = ((relative * max_qn as u128) >> 64) as u64 + 1;

    Some(qn.min(max_qn))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::vrf::VrfSecretKey;

    fn output_with_top(top: u64) -> VrfOutput {
        // search a real output whose top bits fall in the wanted bucket
        let sk = VrfSecretKey::from_seed([4u8; 32]);

        (0u32..)
            .map(|i| sk.prove(&i.to_be_bytes()).unwrap().output())
            .find(|o| o.top_u64() >> 60 == top >> 60)
            .unwrap()
    }

    #[test]
    fn test_zero_stake_is_never_eligible() {
        let out = output_with_top(0);

        assert!(!is_eligible(&out, &StakeWeight::new(0, 100, 5)));
        assert!(!is_eligible(&out, &StakeWeight::new(10, 0, 5)));
        assert_eq!(quality_number(&out, &StakeWeight::new(0, 100, 5), 5), None);
    }

    #[test]
    fn test_saturated_stake_is_always_eligible() {
        let out = output_with_top(u64::MAX);

        let weight = StakeWeight::new(20, 100, 5);

        assert!(is_eligible(&out, &weight));

        // top nibble is 0xf, so the ratio is above 15/16
        assert_eq!(quality_number(&out, &weight, 5), Some(5));
    }

    #[test]
    fn test_small_stake_with_high_output_is_not_eligible() {
        let out = output_with_top(u64::MAX);

        // stake ratio 1/100
        assert!(!is_eligible(&out, &StakeWeight::new(1, 100, 1)));
    }

    #[test]
    fn test_low_output_gets_the_lowest_qn() {
        let out = output_with_top(0);

        // ratio below 1/16, stake ratio 1/2
        let weight = StakeWeight::new(1, 2, 1);

        assert!(is_eligible(&out, &weight));
        assert_eq!(quality_number(&out, &weight, 5), Some(1));
    }

    #[test]
    fn test_qn_never_exceeds_max() {
        let sk = VrfSecretKey::from_seed([8u8; 32]);

        let weight = StakeWeight::new(3, 10, 2);

        for i in 0u32..64 {
            let out = sk.prove(&i.to_be_bytes()).unwrap().output();

            if let Some(qn) = quality_number(&out, &weight, 7) {
                assert!((1..=7).contains(&qn));
            }
        }
    }
}
