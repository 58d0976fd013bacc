//! In-process cluster integration tests, driven over real loopback TCP sockets exactly as a
//! separate client process would see them.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use raftq::client::Client;
use raftq::node::{self, NodeHandle};
use raftq::protos::{NodeId, Value};
use raftq::state::Config;

/// Reserves an ephemeral loopback port by binding and immediately releasing it. Good enough for
/// test harnesses; a real collision would require another process to grab the exact same port in
/// the few microseconds before `node::serve` rebinds it.
fn free_port() -> u16 {
	std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

struct Cluster {
	handles: Vec<NodeHandle>,
	client_servers: HashMap<NodeId, SocketAddr>,
}

impl Cluster {
	async fn start(n: usize, min_ms: u64, max_ms: u64, heartbeat_ms: u64) -> Self {
		let view: HashMap<NodeId, SocketAddr> =
			(0..n as NodeId).map(|id| (id, format!("127.0.0.1:{}", free_port()).parse().unwrap())).collect();
		let client_servers: HashMap<NodeId, SocketAddr> =
			(0..n as NodeId).map(|id| (id, format!("127.0.0.1:{}", free_port()).parse().unwrap())).collect();

		let mut handles = Vec::new();
		for id in 0..n as NodeId {
			let config = Config {
				id,
				view: view.clone(),
				client_addr: client_servers[&id],
				min_election_timeout: Duration::from_millis(min_ms),
				max_election_timeout: Duration::from_millis(max_ms),
				heartbeat_timeout: Duration::from_millis(heartbeat_ms),
			};
			handles.push(node::serve(config).await.unwrap());
		}

		Cluster { handles, client_servers }
	}

	fn client(&self) -> Client {
		Client::new(self.client_servers.clone(), 0)
	}

	/// Replaces node `id`'s process with a fresh one sharing the same identity and view, to
	/// simulate a reconnecting node whose in-memory log was lost (§8 S6).
	async fn restart(&mut self, id: NodeId, min_ms: u64, max_ms: u64, heartbeat_ms: u64) {
		self.handles[id as usize].shutdown();
		let config = Config {
			id,
			view: self.view_snapshot(),
			client_addr: self.client_servers[&id],
			min_election_timeout: Duration::from_millis(min_ms),
			max_election_timeout: Duration::from_millis(max_ms),
			heartbeat_timeout: Duration::from_millis(heartbeat_ms),
		};
		self.handles[id as usize] = node::serve(config).await.unwrap();
	}

	fn view_snapshot(&self) -> HashMap<NodeId, SocketAddr> {
		self.handles.iter().enumerate().map(|(id, h)| (id as NodeId, h.raft_addr)).collect()
	}
}

/// Polls `f` until it returns `Some`, or panics after `timeout`.
async fn wait_for<T, F>(timeout: Duration, mut f: F) -> T
where
	F: FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = Option<T>> + '_>>,
{
	let deadline = tokio::time::Instant::now() + timeout;
	loop {
		if let Some(v) = f().await {
			return v;
		}
		if tokio::time::Instant::now() >= deadline {
			panic!("condition never became true within {:?}", timeout);
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
	}
}

#[tokio::test]
async fn boot_and_heartbeat() {
	let cluster = Cluster::start(3, 150, 300, 50).await;
	let mut client = cluster.client();

	let (leader, term) = wait_for(Duration::from_millis(1500), || {
		let client = &mut client;
		Box::pin(async move {
			let (leader, term) = client.who_is_leader().await.ok()?;
			leader.map(|l| (l, term))
		})
	})
	.await;

	assert!(term >= 1);
	// Every node should agree on the same leader shortly after boot.
	for &id in cluster.client_servers.keys() {
		let mut c = Client::new(cluster.client_servers.clone(), id);
		let (their_leader, _) = c.who_is_leader().await.unwrap();
		assert_eq!(their_leader, Some(leader));
	}
}

#[tokio::test]
async fn enqueue_is_replicated() {
	let cluster = Cluster::start(3, 150, 300, 50).await;
	let mut client = cluster.client();

	client.enqueue(Value::Text("x".into())).await.unwrap();

	for &id in cluster.client_servers.keys() {
		let mut c = Client::new(cluster.client_servers.clone(), id);
		let state = c.send_state().await.unwrap();
		assert_eq!(state, vec![Value::Text("x".into())]);
	}
}

#[tokio::test]
async fn dequeue_empty_then_filled() {
	let cluster = Cluster::start(3, 150, 300, 50).await;
	let mut client = cluster.client();

	assert_eq!(client.dequeue().await.unwrap(), None);

	client.enqueue(Value::Integer(7)).await.unwrap();
	assert_eq!(client.dequeue().await.unwrap(), Some(Value::Integer(7)));

	for &id in cluster.client_servers.keys() {
		let mut c = Client::new(cluster.client_servers.clone(), id);
		assert!(c.send_state().await.unwrap().is_empty());
	}
}

#[tokio::test]
async fn redirect_converges_from_a_follower() {
	let cluster = Cluster::start(3, 150, 300, 50).await;

	// Discover the leader first so we can reliably start the test client pointed at a follower.
	let mut probe = cluster.client();
	let (leader, _) = probe.who_is_leader().await.unwrap();
	let leader = leader.expect("cluster should have elected a leader");
	let follower = cluster.client_servers.keys().copied().find(|id| *id != leader).unwrap();

	let mut client = Client::new(cluster.client_servers.clone(), follower);
	client.nop().await.unwrap();
}

#[tokio::test]
async fn leader_failure_triggers_reelection() {
	let mut cluster = Cluster::start(3, 150, 300, 50).await;
	let mut client = cluster.client();

	client.enqueue(Value::Integer(1)).await.unwrap();
	client.enqueue(Value::Integer(2)).await.unwrap();

	let (leader, first_term) = client.who_is_leader().await.unwrap();
	let leader = leader.unwrap();

	cluster.handles[leader as usize].shutdown();

	let survivors: Vec<NodeId> = cluster.client_servers.keys().copied().filter(|id| *id != leader).collect();
	let mut survivor_client = Client::new(cluster.client_servers.clone(), survivors[0]);

	let (new_leader, new_term) = wait_for(Duration::from_millis(2000), || {
		let survivor_client = &mut survivor_client;
		Box::pin(async move {
			let (leader, term) = survivor_client.who_is_leader().await.ok()?;
			leader.filter(|l| survivors.contains(l)).map(|l| (l, term))
		})
	})
	.await;

	assert!(new_term > first_term);
	assert_ne!(new_leader, leader);

	survivor_client.enqueue(Value::Integer(3)).await.unwrap();
	let state = survivor_client.send_state().await.unwrap();
	assert_eq!(state, vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
}

#[tokio::test]
async fn rejoining_node_catches_up_via_backtracking() {
	let mut cluster = Cluster::start(3, 150, 300, 50).await;
	let mut client = cluster.client();

	client.nop().await.unwrap(); // force an early leader to settle

	let straggler: NodeId = 2;
	cluster.handles[straggler as usize].shutdown();

	for i in 0..6 {
		client.enqueue(Value::Integer(i)).await.unwrap();
	}

	cluster.restart(straggler, 150, 300, 50).await;

	let mut straggler_client = Client::new(cluster.client_servers.clone(), straggler);
	let expected: Vec<Value> = (0..6).map(Value::Integer).collect();

	let state = wait_for(Duration::from_millis(2000), || {
		let straggler_client = &mut straggler_client;
		let expected = expected.clone();
		Box::pin(async move {
			let state = straggler_client.send_state().await.ok()?;
			if state == expected {
				Some(state)
			} else {
				None
			}
		})
	})
	.await;

	assert_eq!(state, expected);
}
