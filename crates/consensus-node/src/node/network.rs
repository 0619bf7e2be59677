use super::messages::ConsensusMessage;
use threshold_bls::Id;

/// Outbound side of the peer-to-peer layer. Delivery is best effort.
pub trait NetworkService: Send + Sync {
    fn send(&self, to: Id, msg: ConsensusMessage);

    /// Sends to every listed member except this node.
    fn send_to_group(&self, members: &[Id], msg: ConsensusMessage);

    fn broadcast(&self, msg: ConsensusMessage);
}
