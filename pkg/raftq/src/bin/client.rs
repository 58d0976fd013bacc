//! `raftq-client`: a thin CLI over `raftq::client::Client`, for ad hoc ops against a running
//! cluster. Takes an initial server address list and a single op to run.

use std::collections::HashMap;
use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use raftq::client::Client;
use raftq::errors::*;
use raftq::protos::Value;

#[derive(Clone)]
struct Server {
	id: u64,
	addr: SocketAddr,
}

impl std::str::FromStr for Server {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, String> {
		let (id, addr) = s.split_once('=').ok_or_else(|| format!("expected id=host:port, got {:?}", s))?;
		let id: u64 = id.parse().map_err(|_| format!("invalid server id {:?}", id))?;
		let addr: SocketAddr = addr.parse().map_err(|_| format!("invalid server address {:?}", addr))?;
		Ok(Server { id, addr })
	}
}

#[derive(Parser)]
#[command(name = "raftq-client", about = "Ad hoc client for a raftq cluster")]
struct Args {
	/// The client-facing address of every known server, one `id=host:port` per flag.
	#[arg(long = "server", required = true)]
	servers: Vec<Server>,

	/// Which server id to contact first.
	#[arg(long)]
	start: u64,

	/// Give up and exit with an error after this many redirect/failure hops, instead of retrying
	/// forever (the library itself has no such bound; see §4.9/§7).
	#[arg(long, default_value_t = 10)]
	max_attempts: u32,

	#[command(subcommand)]
	op: Op,
}

#[derive(Subcommand)]
enum Op {
	Nop,
	Enqueue { value: String },
	Dequeue,
	WhoIsLeader,
	SendState,
}

#[tokio::main]
async fn main() -> Result<()> {
	env_logger::init();
	let args = Args::parse();

	let servers: HashMap<u64, SocketAddr> = args.servers.iter().map(|s| (s.id, s.addr)).collect();
	let mut client = Client::new(servers, args.start);

	// The library's `send` loops on redirects forever; bound it here so a misconfigured CLI run
	// fails loudly instead of hanging.
	let outcome = tokio::time::timeout(
		std::time::Duration::from_secs(args.max_attempts as u64),
		run(&mut client, args.op),
	)
	.await;

	match outcome {
		Ok(result) => result,
		Err(_) => Err("timed out waiting for an authoritative reply".into()),
	}
}

async fn run(client: &mut Client, op: Op) -> Result<()> {
	match op {
		Op::Nop => {
			client.nop().await?;
			println!("ok");
		}
		Op::Enqueue { value } => {
			client.enqueue(Value::Text(value)).await?;
			println!("ok");
		}
		Op::Dequeue => match client.dequeue().await? {
			Some(v) => println!("{}", v),
			None => println!("(empty)"),
		},
		Op::WhoIsLeader => {
			let (leader, term) = client.who_is_leader().await?;
			match leader {
				Some(id) => println!("leader={} term={}", id, term),
				None => println!("leader=unknown term={}", term),
			}
		}
		Op::SendState => {
			let items = client.send_state().await?;
			println!("[{}]", items.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "));
		}
	}
	Ok(())
}
