//! The Raft state record: persistent + volatile fields, the role tag, and the applied queue.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;
use tokio::sync::oneshot;

use crate::log::Log;
use crate::protos::{ClientResponse, LogIndex, NodeId, Term};
use crate::queue::Queue;

/// Static configuration supplied at node creation. Immutable except for the two timeout fields,
/// which the admin `set_election_timeout`/`set_heartbeat_timeout` queries may adjust.
#[derive(Debug, Clone)]
pub struct Config {
	pub id: NodeId,
	/// The complete peer set, including this node's own Raft-port address.
	pub view: HashMap<NodeId, SocketAddr>,
	/// This node's own client-facing listener address, distinct from its Raft port.
	pub client_addr: SocketAddr,
	pub min_election_timeout: Duration,
	pub max_election_timeout: Duration,
	pub heartbeat_timeout: Duration,
}

impl Config {
	/// Number of votes needed to win an election, or of replicas needed to commit an entry:
	/// more than half of `view`, counting the local node.
	pub fn majority_size(&self) -> usize {
		(self.view.len() / 2) + 1
	}

	pub fn peers(&self) -> impl Iterator<Item = &NodeId> {
		self.view.keys().filter(move |id| **id != self.id)
	}
}

/// Votes accumulated so far, reinitialized every time a candidacy starts.
#[derive(Debug, Clone, Default)]
pub struct CandidateState {
	pub votes_received: HashSet<NodeId>,
}

/// Per-peer replication bookkeeping, reinitialized every time a node becomes leader.
#[derive(Default)]
pub struct LeaderState {
	pub next_index: HashMap<NodeId, LogIndex>,
	pub match_index: HashMap<NodeId, LogIndex>,
	/// Reply channel for each client op this node has appended and not yet applied, keyed by the
	/// entry's log index. Never replicated; dropped wholesale on step-down, per §9 ("the original
	/// requester's connection simply never gets a reply for that attempt").
	pub pending_replies: HashMap<LogIndex, oneshot::Sender<ClientResponse>>,
}

impl std::fmt::Debug for LeaderState {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		f.debug_struct("LeaderState")
			.field("next_index", &self.next_index)
			.field("match_index", &self.match_index)
			.field("pending_replies", &self.pending_replies.keys().collect::<Vec<_>>())
			.finish()
	}
}

#[derive(Debug)]
pub enum Role {
	Follower,
	Candidate(CandidateState),
	Leader(LeaderState),
}

impl Role {
	pub fn tag(&self) -> crate::protos::RoleTag {
		match self {
			Role::Follower => crate::protos::RoleTag::Follower,
			Role::Candidate(_) => crate::protos::RoleTag::Candidate,
			Role::Leader(_) => crate::protos::RoleTag::Leader,
		}
	}

	pub fn is_leader(&self) -> bool {
		matches!(self, Role::Leader(_))
	}
}

/// Everything a node owns: persistent fields (`current_term`, `voted_for`, `log`), volatile
/// fields common to all roles, leader-only bookkeeping nested in `Role::Leader`, and the derived
/// `queue`. Exclusively owned by the single task that runs the node's event loop — see `node.rs`.
pub struct NodeState {
	pub config: Config,

	pub current_term: Term,
	pub voted_for: Option<NodeId>,
	pub log: Log,

	pub commit_index: LogIndex,
	pub last_applied: LogIndex,
	pub current_leader: Option<NodeId>,

	pub role: Role,
	pub queue: Queue,
}

impl NodeState {
	pub fn new(config: Config) -> Self {
		NodeState {
			config,
			current_term: 1,
			voted_for: None,
			log: Log::new(),
			commit_index: 0,
			last_applied: 0,
			current_leader: None,
			role: Role::Follower,
			queue: Queue::new(),
		}
	}

	pub fn last_log_index(&self) -> LogIndex {
		self.log.last_index()
	}

	pub fn last_log_term(&self) -> Term {
		self.log.last_term()
	}

	/// Bumps the term and clears `voted_for`, as required any time a higher term is observed.
	pub fn adopt_term(&mut self, term: Term) {
		debug_assert!(term > self.current_term);
		self.current_term = term;
		self.voted_for = None;
	}

	/// Whether a candidate whose log ends at `(last_log_index, last_log_term)` is at least as
	/// up-to-date as ours: a strictly higher last term wins outright; on equal terms, the longer
	/// (or equal) log wins.
	pub fn is_candidate_log_up_to_date(&self, last_log_index: LogIndex, last_log_term: Term) -> bool {
		let our_term = self.last_log_term();
		last_log_term > our_term || (last_log_term == our_term && last_log_index >= self.last_log_index())
	}
}

/// `min_election_timeout + uniform(0, max - min)`, freshly sampled on every call.
pub fn election_time(min: Duration, max: Duration) -> Duration {
	if max <= min {
		return min;
	}
	let span = (max - min).as_millis() as u64;
	let jitter = rand::thread_rng().gen_range(0..=span);
	min + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(n: usize) -> Config {
		let mut view = HashMap::new();
		for i in 0..n {
			view.insert(i as NodeId, "127.0.0.1:0".parse().unwrap());
		}
		Config {
			id: 0,
			view,
			client_addr: "127.0.0.1:0".parse().unwrap(),
			min_election_timeout: Duration::from_millis(150),
			max_election_timeout: Duration::from_millis(300),
			heartbeat_timeout: Duration::from_millis(50),
		}
	}

	#[test]
	fn majority_size_is_more_than_half() {
		assert_eq!(config(1).majority_size(), 1);
		assert_eq!(config(2).majority_size(), 2);
		assert_eq!(config(3).majority_size(), 2);
		assert_eq!(config(5).majority_size(), 3);
	}

	#[test]
	fn new_node_starts_as_follower_in_term_one() {
		let state = NodeState::new(config(3));
		assert_eq!(state.current_term, 1);
		assert!(matches!(state.role, Role::Follower));
		assert_eq!(state.commit_index, 0);
		assert_eq!(state.last_applied, 0);
	}

	#[test]
	fn up_to_date_log_comparison() {
		let state = NodeState::new(config(3));
		// empty local log: anything is at least as up to date
		assert!(state.is_candidate_log_up_to_date(0, 0));
		assert!(state.is_candidate_log_up_to_date(5, 0));
	}

	#[test]
	fn election_time_falls_within_bounds() {
		let min = Duration::from_millis(150);
		let max = Duration::from_millis(300);
		for _ in 0..100 {
			let t = election_time(min, max);
			assert!(t >= min && t <= max);
		}
	}
}
