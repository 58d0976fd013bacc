//! `raftq-node`: launches a single cluster member.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use raftq::errors::*;
use raftq::node;
use raftq::state::Config;

/// A peer's id and Raft-port address, as `id=host:port`.
#[derive(Clone)]
struct Peer {
	id: u64,
	addr: SocketAddr,
}

impl std::str::FromStr for Peer {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, String> {
		let (id, addr) = s.split_once('=').ok_or_else(|| format!("expected id=host:port, got {:?}", s))?;
		let id: u64 = id.parse().map_err(|_| format!("invalid peer id {:?}", id))?;
		let addr: SocketAddr = addr.parse().map_err(|_| format!("invalid peer address {:?}", addr))?;
		Ok(Peer { id, addr })
	}
}

#[derive(Parser)]
#[command(name = "raftq-node", about = "Raft-replicated FIFO queue: one cluster member")]
struct Args {
	/// This node's id. Must also appear in --peer.
	#[arg(long)]
	id: u64,

	/// The full view of the cluster (including this node), one `id=host:port` per flag.
	#[arg(long = "peer", required = true)]
	peers: Vec<Peer>,

	/// This node's client-facing listener address.
	#[arg(long)]
	client_addr: SocketAddr,

	#[arg(long, default_value_t = 150)]
	min_election_ms: u64,

	#[arg(long, default_value_t = 300)]
	max_election_ms: u64,

	#[arg(long, default_value_t = 50)]
	heartbeat_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
	env_logger::init();
	let args = Args::parse();

	let view: HashMap<u64, SocketAddr> = args.peers.iter().map(|p| (p.id, p.addr)).collect();
	if !view.contains_key(&args.id) {
		return Err(format!("--id {} not present among --peer entries", args.id).into());
	}

	let config = Config {
		id: args.id,
		view,
		client_addr: args.client_addr,
		min_election_timeout: Duration::from_millis(args.min_election_ms),
		max_election_timeout: Duration::from_millis(args.max_election_ms),
		heartbeat_timeout: Duration::from_millis(args.heartbeat_ms),
	};

	let handle = node::serve(config).await?;
	log::info!("node {} listening: raft={} client={}", args.id, handle.raft_addr, handle.client_addr);

	// Run until killed; the listener/event-loop tasks never return on their own.
	std::future::pending::<()>().await;
	Ok(())
}
