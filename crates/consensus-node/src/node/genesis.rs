//! The genesis group runs its key exchange in one process: every member's
//! session is driven locally and the group signs its own header.
use crate::chain::types::Block;
use crate::node::errors::{NodeError, NodeResult};
use crate::node::types::JoinedGroupInfo;
use dkg_core::primitives::{DKGError, GroupHeader, GroupInfo, GroupInitInfo, GroupParams};
use dkg_core::DkgSession;
use std::collections::BTreeMap;
use threshold_bls::{GroupSignGenerator, Id, SecretKey};
use tracing::info;

pub struct Genesis {
    pub group: GroupInfo,
    pub block: Block,
    /// What each member keeps in its joined-group store, by member id.
    pub joined: BTreeMap<Id, JoinedGroupInfo>,
}

pub fn build_genesis(
    members: &[(Id, SecretKey)],
    params: &GroupParams,
    timestamp: u64,
) -> NodeResult<Genesis> {
    let (_, first_sk) = members
        .first()
        .ok_or(DKGError::InvalidGroupSize(0))?;

    let ids: Vec<Id> = members.iter().map(|(id, _)| *id).collect();

    let threshold = params.threshold(ids.len());

    let header = GroupHeader::new("genesis".into(), None, None, 0, 0, 0, u64::MAX, &ids);

    let group_hash = header.hash;

    // replaced by the group's own signature once the keys exist
    let mut init_info = GroupInitInfo {
        parent_sign: first_sk.sign(group_hash.as_bytes()),
        header,
        members: ids.clone(),
    };

    let mut sessions = members
        .iter()
        .map(|(id, sk)| DkgSession::new(init_info.clone(), *id, sk, threshold))
        .collect::<Result<Vec<_>, _>>()?;

    let mut outbox = vec![];

    for session in sessions.iter_mut() {
        let from = session.my_id();

        for (to, piece) in session.gen_share_pieces()? {
            outbox.push((from, to, piece));
        }
    }

    for (from, to, piece) in outbox {
        if let Some(session) = sessions.iter_mut().find(|s| s.my_id() == to) {
            session.handle_share_piece(from, piece)?;
        }
    }

    let keys = sessions
        .iter_mut()
        .map(|s| s.aggregate())
        .collect::<Result<Vec<_>, _>>()?;

    let group_pk = keys[0].group_pk;

    if keys.iter().any(|k| k.group_pk != group_pk) {
        return Err(NodeError::RecoveredSignatureInvalid);
    }

    let mut generator = GroupSignGenerator::new(threshold);

    for (id, k) in ids.iter().zip(keys.iter()) {
        generator.add_witness(*id, k.sign_secret.sign(group_hash.as_bytes()))?;
    }

    let self_sign = match generator.group_sign() {
        Some(sign) if group_pk.verify(group_hash.as_bytes(), sign) => *sign,
        _ => return Err(NodeError::RecoveredSignatureInvalid),
    };

    init_info.parent_sign = self_sign;

    let member_sign_pks: BTreeMap<Id, _> = ids
        .iter()
        .zip(keys.iter())
        .map(|(id, k)| (*id, k.sign_public))
        .collect();

    let group = GroupInfo::new(group_pk, init_info, threshold);

    let joined = ids
        .iter()
        .zip(keys.into_iter())
        .map(|(id, k)| {
            let info = JoinedGroupInfo {
                group_id: group.group_id(),
                group_hash,
                group_pk,
                sign_secret: k.sign_secret,
                member_sign_pks: member_sign_pks.clone(),
            };

            (*id, info)
        })
        .collect();

    let block = Block::genesis(group.group_id(), timestamp);

    info!(
        group = ?group.group_id(),
        members = ids.len(),
        threshold,
        block = %block.hash(),
        "genesis built"
    );

    Ok(Genesis {
        group,
        block,
        joined,
    })
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub fn members(n: usize) -> Vec<(Id, SecretKey)> {
        (0..n)
            .map(|i| {
                let sk = SecretKey::from_seed(format!("genesis-member-{}", i).as_bytes());

                (Id::from_public_key(&sk.public_key()), sk)
            })
            .collect()
    }

    #[test]
    fn test_genesis_group_signs_itself() {
        let genesis = build_genesis(&members(4), &GroupParams::default(), 1_000).unwrap();

        let group = &genesis.group;

        assert_eq!(group.threshold(), 3);
        assert_eq!(group.dismiss_height(), u64::MAX);
        assert!(group.is_effective(0));
        assert_eq!(group.init_info().validate(group.group_pk()), Ok(()));
        assert_eq!(genesis.block.header.group_id, group.group_id());
        assert_eq!(genesis.block.header.timestamp, 1_000);
    }

    #[test]
    fn test_every_member_holds_a_working_share() {
        let genesis = build_genesis(&members(5), &GroupParams::default(), 0).unwrap();

        assert_eq!(genesis.joined.len(), 5);

        let mut generator = GroupSignGenerator::new(genesis.group.threshold());

        for (id, joined) in genesis.joined.iter() {
            assert_eq!(joined.member_sign_pk(id), Some(joined.sign_public()));
            assert_eq!(joined.member_sign_pks.len(), 5);

            generator
                .add_witness(*id, joined.sign_secret.sign(b"message"))
                .unwrap();
        }

        let sign = generator.group_sign().unwrap();

        assert!(genesis.group.group_pk().verify(b"message", sign));
    }

    #[test]
    fn test_empty_genesis() {
        assert!(build_genesis(&[], &GroupParams::default(), 0).is_err());
    }
}
