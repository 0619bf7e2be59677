//! BLS threshold signatures over BLS12-381.
//!
//! Public keys live in G2 and signatures in G1. Secret keys can be split with
//! Shamir sharing ([`poly`]) and any `threshold` partial signatures produced
//! with the shares recover the signature of the shared secret ([`sig`]).
pub mod ecies;

pub mod error;

pub mod hash;

pub mod id;

pub mod keys;

pub mod poly;

pub mod sig;

pub mod sign_generator;

mod curve;

pub use error::{BLSError, BLSResult};
pub use hash::Hash;
pub use id::Id;
pub use keys::{PublicKey, SecretKey, Signature};
pub use sign_generator::GroupSignGenerator;
