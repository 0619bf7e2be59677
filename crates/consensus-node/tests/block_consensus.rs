use consensus_node::chain::types::Transaction;
use consensus_node::chain::BlockChain;
use consensus_node::node::consensus::SlotStatus;
use consensus_node::node::errors::NodeError;
use consensus_node::node::messages::ConsensusMessage;
use consensus_node::node::store::{FileStore, JoinedGroupStore, KeyValueStore};
use consensus_node::node::types::CastOutcome;
use consensus_node::test_helpers::{cluster_params, Cluster, ROUND_MS};
use std::sync::Arc;
use threshold_bls::Id;

/// Four miners, all in the genesis group, every one always eligible.
fn genesis_cluster(max_qn: u64) -> Cluster {
    let mut params = cluster_params(4, 1_000);
    params.max_qn = max_qn;

    Cluster::new(4, 4, params).unwrap()
}

#[test]
fn test_rounds_commit_on_every_node() {
    let cluster = genesis_cluster(5);

    assert_eq!(cluster.run_rounds(10).unwrap(), 10);

    let top = cluster.agreed_top().unwrap();

    assert_eq!(top.height, 10);
    assert!(top.is_signed());

    let chain = &cluster.node(0).chain;

    let mut total_qn = 0;

    for height in 1..=10 {
        let header = chain.query_block_header_by_height(height).unwrap();

        assert!(header.total_qn > total_qn);

        total_qn = header.total_qn;
    }

    assert_eq!(chain.total_qn(), top.total_qn);
}

#[test]
fn test_lower_qn_cast_is_not_signed() {
    let cluster = genesis_cluster(1_000);

    cluster.clock().advance(ROUND_MS);

    let mut casts: Vec<_> = (0..4)
        .map(|i| cluster.node(i).processor.build_cast().unwrap().unwrap())
        .collect();

    casts.sort_by_key(|c| c.body.header.total_qn);

    let low = casts.first().unwrap().clone();
    let high = casts.last().unwrap().clone();

    assert!(high.body.header.total_qn > low.body.header.total_qn);
    assert_ne!(high.signer(), low.signer());

    let verifier = &cluster.node(0).processor;

    assert_eq!(verifier.on_cast(high.clone()).unwrap(), CastOutcome::Signed);

    match verifier.on_cast(low.clone()) {
        Err(NodeError::LowerQN { signed, actual }) => {
            assert_eq!(signed, high.body.header.total_qn);
            assert_eq!(actual, low.body.header.total_qn);
        }
        other => panic!("expected LowerQN, got {:?}", other),
    }

    // the other order signs both
    let other = &cluster.node(1).processor;

    assert_eq!(other.on_cast(low).unwrap(), CastOutcome::Signed);
    assert_eq!(other.on_cast(high).unwrap(), CastOutcome::Signed);
}

#[test]
fn test_cast_before_parent_is_replayed() {
    let cluster = genesis_cluster(5);

    let late = cluster.node(0).id;

    cluster
        .network()
        .set_drop_filter(move |_: &Id, to: &Id, _: &ConsensusMessage| *to == late);

    assert!(cluster.propose_round().unwrap().is_some());

    cluster.network().clear_drop_filter();

    let parent = cluster.node(1).top();

    assert_eq!(parent.height, 1);
    assert_eq!(cluster.node(0).top().height, 0);

    cluster.clock().advance(ROUND_MS);

    let cast = cluster.node(2).processor.build_cast().unwrap().unwrap();

    let hash = cast.body.header.hash;
    let group_id = cast.body.header.group_id;

    let behind = &cluster.node(0).processor;
    let ahead = &cluster.node(3).processor;

    assert_eq!(behind.on_cast(cast.clone()).unwrap(), CastOutcome::Deferred);
    assert_eq!(behind.held_casts(), 1);
    assert!(behind.verify_context(&group_id, &hash).is_none());

    assert_eq!(ahead.on_cast(cast).unwrap(), CastOutcome::Signed);

    let parent_block = cluster
        .node(1)
        .chain
        .query_block_by_hash(&parent.hash)
        .unwrap();

    behind.on_new_block(parent_block).unwrap();

    assert_eq!(behind.held_casts(), 0);
    assert_eq!(cluster.node(0).top().hash, parent.hash);

    for processor in [behind, ahead].iter() {
        let vctx = processor.verify_context(&group_id, &hash).unwrap();

        let vctx = vctx.lock();

        assert!(vctx.has_signed());
        assert_eq!(vctx.status(), SlotStatus::Signed);
    }
}

#[test]
fn test_cast_waits_for_its_transactions() {
    let cluster = genesis_cluster(5);

    let source = cluster.node(1).id;

    let transactions: Vec<Transaction> = (0..3)
        .map(|nonce| Transaction::new(source, nonce, vec![nonce as u8; 8]))
        .collect();

    let proposer = &cluster.node(1).processor;

    proposer.on_transactions(transactions.clone());

    cluster.clock().advance(ROUND_MS);

    let cast = proposer.build_cast().unwrap().unwrap();

    assert_eq!(cast.body.header.tx_hashes.len(), 3);

    let hash = cast.body.header.hash;
    let group_id = cast.body.header.group_id;

    let verifier = &cluster.node(2).processor;

    assert_eq!(verifier.on_cast(cast).unwrap(), CastOutcome::Waiting);

    {
        let vctx = verifier.verify_context(&group_id, &hash).unwrap();

        let vctx = vctx.lock();

        assert_eq!(vctx.status(), SlotStatus::Waiting);
        assert_eq!(vctx.slot().missing_transactions(), 3);
    }

    verifier.on_transactions(transactions);

    let vctx = verifier.verify_context(&group_id, &hash).unwrap();

    assert_eq!(vctx.lock().status(), SlotStatus::Signed);
}

#[test]
fn test_gossiped_transactions_end_up_in_a_block() {
    let cluster = genesis_cluster(5);

    let source = cluster.node(3).id;

    let transactions: Vec<Transaction> = (0..5)
        .map(|nonce| Transaction::new(source, nonce, b"payload".to_vec()))
        .collect();

    cluster.submit_transactions(3, transactions.clone());

    assert_eq!(cluster.run_rounds(1).unwrap(), 1);

    let top = cluster.agreed_top().unwrap();

    let block = cluster.node(0).chain.query_block_by_hash(&top.hash).unwrap();

    assert_eq!(block.transactions, transactions);

    for node in cluster.nodes() {
        assert_eq!(node.chain.pending_transactions(), 0);
    }
}

#[test]
fn test_joined_groups_are_kept_on_disk() {
    let dir = tempfile::tempdir().unwrap();

    let cluster = Cluster::with_data_dir(4, 4, cluster_params(4, 1_000), dir.path()).unwrap();

    assert_eq!(cluster.run_rounds(2).unwrap(), 2);

    let group_id = cluster.genesis().group.group_id();

    let node = cluster.node(0);

    let node_dir = dir.path().join("node-0");

    let reopened = JoinedGroupStore::new(node.secret_key.clone(), move || {
        Ok(Arc::new(FileStore::open(node_dir.clone())?) as Arc<dyn KeyValueStore>)
    });

    let joined = reopened.get(&group_id).unwrap();

    assert_eq!(Some(joined), node.store.get(&group_id));
    assert_eq!(reopened.load_all().unwrap().len(), 1);
}
