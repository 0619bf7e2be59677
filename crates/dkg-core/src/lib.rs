//! Group formation: the pure state of a distributed key generation where a
//! parent group co-signs a new group header, members exchange Shamir shares
//! and the network accepts the group once a threshold of members report the
//! same public key.
pub mod creating;

pub mod inited;

pub mod messages;

pub mod primitives;

pub mod selection;

pub mod session;

pub use creating::{CreatingGroupContext, CreatingStatus};
pub use inited::{InitedGroupContext, InitedOutcome, InitedStatus};
pub use messages::{DkgMessage, MessageBody, SignedMessage};
pub use session::{AggregatedKeys, DkgSession, SessionStatus};
