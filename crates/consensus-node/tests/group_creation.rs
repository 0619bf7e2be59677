use consensus_node::chain::{BlockChain, GroupChain};
use consensus_node::test_helpers::{cluster_params, Cluster};
use dkg_core::primitives::GroupInfo;
use dkg_core::SessionStatus;
use threshold_bls::GroupSignGenerator;

/// Six miners, four of them in genesis. A group of four forms at height 5.
fn formed_cluster() -> (Cluster, GroupInfo) {
    let cluster = Cluster::new(6, 4, cluster_params(4, 5)).unwrap();

    assert_eq!(cluster.run_rounds(5).unwrap(), 5);

    let genesis_id = cluster.genesis().group.group_id();

    let group = cluster
        .node(0)
        .chain
        .groups()
        .into_iter()
        .find(|g| g.group_id() != genesis_id)
        .unwrap();

    (cluster, group)
}

#[test]
fn test_group_forms_with_one_agreed_key() {
    let (cluster, group) = formed_cluster();

    assert_eq!(group.member_size(), 4);
    assert_eq!(group.threshold(), 3);
    assert_eq!(group.header().create_height, 5);
    assert_eq!(group.header().parent_id, Some(cluster.genesis().group.group_id()));
    assert_eq!(group.work_height(), 15);

    for node in cluster.nodes() {
        assert_eq!(node.chain.group_height(), 2);
        assert_eq!(node.chain.get_group_by_id(&group.group_id()), Some(group.clone()));
    }

    for member in group.members() {
        let node = cluster.node_by_id(member).unwrap();

        assert_eq!(
            node.processor
                .group_creator()
                .session_status(&group.group_hash()),
            Some(SessionStatus::Done)
        );

        let joined = node.store.get(&group.group_id()).unwrap();

        assert_eq!(&joined.group_pk, group.group_pk());
        assert_eq!(joined.group_hash, group.group_hash());
        assert_eq!(joined.member_sign_pks.len(), 4);
    }

    for node in cluster.nodes() {
        if !group.is_member(&node.id) {
            assert!(!node.store.is_joined(&group.group_id()));
        }
    }
}

#[test]
fn test_any_threshold_of_members_signs_for_the_group() {
    let (cluster, group) = formed_cluster();

    let top = cluster.agreed_top().unwrap();

    let sign_with = |members: &[threshold_bls::Id]| {
        let mut block_sign = GroupSignGenerator::new(group.threshold());
        let mut random_sign = GroupSignGenerator::new(group.threshold());

        for member in members {
            let joined = cluster
                .node_by_id(member)
                .unwrap()
                .store
                .get(&group.group_id())
                .unwrap();

            block_sign
                .add_witness(*member, joined.sign_secret.sign(top.hash.as_bytes()))
                .unwrap();
            random_sign
                .add_witness(*member, joined.sign_secret.sign(&top.random))
                .unwrap();
        }

        assert!(block_sign.is_recovered());
        assert!(random_sign.is_recovered());

        (
            *block_sign.group_sign().unwrap(),
            *random_sign.group_sign().unwrap(),
        )
    };

    let members = group.members();

    let (block_sign, random_sign) = sign_with(&members[..3]);

    assert!(group.group_pk().verify(top.hash.as_bytes(), &block_sign));
    assert!(group.group_pk().verify(&top.random, &random_sign));

    let (other_block_sign, other_random_sign) = sign_with(&members[1..]);

    assert_eq!(block_sign, other_block_sign);
    assert_eq!(random_sign, other_random_sign);
}

#[test]
fn test_chain_keeps_growing_across_groups() {
    let (cluster, _) = formed_cluster();

    assert_eq!(cluster.run_rounds(25).unwrap(), 25);

    let top = cluster.agreed_top().unwrap();

    assert_eq!(top.height, 30);

    let genesis_id = cluster.genesis().group.group_id();

    let chain = &cluster.node(0).chain;

    let mut by_formed_groups = 0;

    for height in 1..=top.height {
        let header = chain.query_block_header_by_height(height).unwrap();

        let pre = chain.query_block_header_by_hash(&header.pre_hash).unwrap();

        let verifier = chain.get_group_by_id(&header.group_id).unwrap();

        assert!(verifier.is_effective(height));
        assert!(verifier
            .group_pk()
            .verify(header.hash.as_bytes(), &header.signature.unwrap()));
        assert!(verifier.group_pk().verify(
            &pre.random,
            &threshold_bls::Signature::from_bytes(&header.random).unwrap()
        ));

        if header.group_id != genesis_id {
            by_formed_groups += 1;
        }
    }

    assert!(by_formed_groups > 0);
}
