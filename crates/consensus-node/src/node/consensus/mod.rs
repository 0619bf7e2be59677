//! Verification state of candidate blocks: one slot per candidate, one
//! verify context per cast, one block context per group this node is in.
pub mod block;

pub mod slot;

pub mod verify;

pub use block::{BlockContext, SharedVerifyContext, SlotKey};
pub use slot::{SlotContext, SlotStatus};
pub use verify::VerifyContext;
