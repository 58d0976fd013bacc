//! Wire types shared between nodes and between a node and its clients.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identifies a single server in the cluster. Assigned by configuration, not auto-discovered.
pub type NodeId = u64;

pub type Term = u64;

pub type LogIndex = u64;

/// Payload carried by an `Enqueue` and returned by a successful `Dequeue`.
///
/// Kept as a small closed set rather than an opaque byte blob so that it serializes compactly
/// and prints usefully in logs and the CLI.
/// `Bytes` is reference-counted internally, so a byte-valued entry is cheap to clone as it flows
/// from `LogEntry` through the commit/apply pipeline into a client reply.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Value {
	Bytes(Bytes),
	Integer(i64),
	Text(String),
}

impl std::fmt::Display for Value {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Value::Bytes(b) => write!(f, "{:?}", b.as_ref()),
			Value::Integer(i) => write!(f, "{}", i),
			Value::Text(s) => write!(f, "{}", s),
		}
	}
}

/// A single client-originated operation, as it will be committed to the replicated log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Op {
	Nop,
	Enqueue(Value),
	Dequeue,
}

/// A request or response RPC exchanged between nodes.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum RaftMessage {
	RequestVote(RequestVoteRequest),
	RequestVoteResponse(RequestVoteResponse),
	AppendEntries(AppendEntriesRequest),
	AppendEntriesResponse(AppendEntriesResponse),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RequestVoteRequest {
	pub term: Term,
	pub candidate_id: NodeId,
	pub last_log_index: LogIndex,
	pub last_log_term: Term,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RequestVoteResponse {
	pub term: Term,
	pub vote_granted: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppendEntriesRequest {
	pub term: Term,
	pub leader_id: NodeId,
	pub prev_log_index: LogIndex,
	pub prev_log_term: Term,
	/// Empty for a heartbeat. Assumed sequential starting at `prev_log_index + 1`.
	pub entries: Vec<crate::log::LogEntry>,
	pub leader_commit: LogIndex,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppendEntriesResponse {
	pub term: Term,
	/// Echoes the request's `prev_log_index` so the leader can correlate the reply with the
	/// `next_index` it was sent against, even once more entries have been appended in between.
	pub log_index: LogIndex,
	pub success: bool,
}

/// Request sent by a client (or the `raftq-client` CLI) to a node's client-facing listener.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ClientRequest {
	Nop,
	Enqueue(Value),
	Dequeue,
	SendState,
	SendLog,
	WhoIsLeader,
	CurrentProcessType,
	SetElectionTimeout { min_ms: u64, max_ms: u64 },
	SetHeartbeatTimeout { ms: u64 },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ClientResponse {
	Ok,
	Empty,
	Value(Value),
	Redirect(Option<NodeId>),
	State(Vec<Value>),
	Log(Vec<crate::log::LogEntry>),
	Leader { leader: Option<NodeId>, term: Term },
	Role(RoleTag),
	Ack,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleTag {
	Follower,
	Candidate,
	Leader,
}
