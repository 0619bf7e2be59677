//! Ed25519 verifiable random function with try-and-increment hash-to-curve,
//! plus the stake-weighted eligibility rules built on its output.
pub mod eligibility;

pub mod error;

pub mod vrf;

pub use eligibility::{is_eligible, quality_number, StakeWeight};
pub use error::{VrfError, VrfResult};
pub use vrf::{VrfOutput, VrfProof, VrfPublicKey, VrfSecretKey, PROOF_LENGTH};
