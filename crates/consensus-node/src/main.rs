use consensus_node::chain::{BlockChain, GroupChain};
use consensus_node::config::NodeConfig;
use consensus_node::node::monitor::{GlobalTicker, ProposeRoutine, ReleaseRoutine};
use consensus_node::test_helpers::{Cluster, ROUND_MS};
use futures::future::join_all;
use gumdrop::Options;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Release and sweep run once every this many rounds.
const RELEASE_EVERY: u64 = 5;

#[derive(Debug, Options)]
struct DemoOpts {
    help: bool,

    #[options(help = "path to a yaml config file")]
    config: Option<PathBuf>,

    #[options(help = "number of simulated miners")]
    nodes: Option<usize>,

    #[options(help = "number of genesis group members")]
    genesis: Option<usize>,

    #[options(help = "proposal rounds to run")]
    rounds: Option<u64>,
}

/// Runs a local cluster of miners for a number of rounds and prints what
/// the chain looks like afterwards.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = DemoOpts::parse_args_default_or_exit();

    let mut config = match &opts.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };

    if let Some(nodes) = opts.nodes {
        config.nodes = nodes;
    }

    if let Some(genesis) = opts.genesis {
        config.genesis_members = genesis;
    }

    if let Some(rounds) = opts.rounds {
        config.rounds = rounds;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!(
        nodes = config.nodes,
        genesis_members = config.genesis_members,
        rounds = config.rounds,
        "starting local cluster"
    );

    let cluster = match &config.data_dir {
        Some(dir) => Cluster::with_data_dir(
            config.nodes,
            config.genesis_members,
            config.consensus.clone(),
            dir,
        )?,
        None => Cluster::new(
            config.nodes,
            config.genesis_members,
            config.consensus.clone(),
        )?,
    };

    // stepped by hand so ticks and the manual clock stay in lockstep
    let tickers: Vec<GlobalTicker> = cluster
        .nodes()
        .iter()
        .map(|node| {
            let ticker = GlobalTicker::new(config.consensus.ticker_interval_ms);

            ticker.register(Arc::new(ProposeRoutine::new(node.processor.clone())), 1);
            ticker.register(
                Arc::new(ReleaseRoutine::new(node.processor.clone())),
                RELEASE_EVERY,
            );

            ticker
        })
        .collect();

    for round in 1..=config.rounds {
        cluster.clock().advance(ROUND_MS);

        let handles: Vec<_> = tickers.iter().flat_map(|t| t.tick()).collect();

        for result in join_all(handles).await {
            result?;
        }

        let delivered = cluster.pump();

        let top = cluster.node(0).top();

        info!(round, height = top.height, delivered, "round finished");
    }

    println!("{}", serde_json::to_string_pretty(&summary(&cluster))?);

    Ok(())
}

fn summary(cluster: &Cluster) -> Value {
    let node = cluster.node(0);

    let top = node.top();

    let mut blocks_by_group: BTreeMap<String, u64> = BTreeMap::new();

    for height in 1..=top.height {
        if let Some(header) = node.chain.query_block_header_by_height(height) {
            *blocks_by_group.entry(header.group_id.to_hex()).or_default() += 1;
        }
    }

    let groups: Vec<Value> = node
        .chain
        .groups()
        .iter()
        .map(|g| {
            json!({
                "id": g.group_id().to_hex(),
                "members": g.member_size(),
                "threshold": g.threshold(),
                "work_height": g.work_height(),
                "dismiss_height": g.dismiss_height(),
            })
        })
        .collect();

    json!({
        "nodes": cluster.nodes().len(),
        "height": top.height,
        "top_hash": top.hash.to_string(),
        "total_qn": top.total_qn,
        "agreed": cluster.agreed_top().is_some(),
        "groups": groups,
        "blocks_by_group": blocks_by_group,
    })
}
