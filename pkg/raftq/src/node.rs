//! The node event loop: the single task that owns a `NodeState` and runs the Follower / Candidate
//! / Leader message handlers of §4.5-4.7 as synchronous functions over `&mut NodeState`, with the
//! async boundary confined to the transport layer and the two listener accept loops around it.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::errors::*;
use crate::log::LogEntry;
use crate::protos::{
	AppendEntriesRequest, AppendEntriesResponse, ClientRequest, ClientResponse, LogIndex, NodeId,
	Op, RaftMessage, RequestVoteRequest, RequestVoteResponse, RoleTag, Term,
};
use crate::state::{election_time, CandidateState, Config, LeaderState, NodeState, Role};
use crate::timer::Timer;
use crate::transport::{read_framed, write_framed, Transport};

type RaftReply = oneshot::Sender<RaftMessage>;
type ClientReply = oneshot::Sender<ClientResponse>;

/// Outcome of an RPC this node sent to a peer, routed back into the event loop.
enum PeerEvent {
	VoteReply(NodeId, Result<RaftMessage>),
	/// `sent_up_to` is `prev_log_index + entries.len()` of the request this reply answers: the
	/// log index the peer's log now reaches if `success`. Threaded through separately from the
	/// response rather than recomputed from `AppendEntriesResponse::log_index` (which only ever
	/// echoes `prev_log_index`, per §6) because `log_index + 1` is only the right successor for a
	/// request that carried exactly one entry — it would over-advance `match_index` after an
	/// empty heartbeat and under-advance it after a multi-entry backtrack batch.
	AppendReply(NodeId, LogIndex, Result<RaftMessage>),
}

/// Handle to a running node's network listeners and event loop task.
pub struct NodeHandle {
	pub raft_addr: SocketAddr,
	pub client_addr: SocketAddr,
	raft_listener_task: JoinHandle<()>,
	client_listener_task: JoinHandle<()>,
	event_loop_task: JoinHandle<()>,
}

impl NodeHandle {
	/// Aborts the listener and event loop tasks. Connections already accepted run to completion
	/// of their current request before noticing the node is gone.
	pub fn shutdown(&self) {
		self.raft_listener_task.abort();
		self.client_listener_task.abort();
		self.event_loop_task.abort();
	}
}

/// Binds both listener sockets and spawns the event loop. `config.view[&config.id]` is the Raft
/// port to bind; `config.client_addr` is the client-facing port.
pub async fn serve(config: Config) -> Result<NodeHandle> {
	let raft_addr =
		*config.view.get(&config.id).ok_or_else(|| format!("own id {} missing from view", config.id))?;

	let raft_listener = TcpListener::bind(raft_addr).await?;
	let client_listener = TcpListener::bind(config.client_addr).await?;
	let raft_addr = raft_listener.local_addr()?;
	let client_addr = client_listener.local_addr()?;

	let transport = Arc::new(Transport::new(config.id, config.view.clone()));

	let (raft_tx, raft_rx) = mpsc::unbounded_channel();
	let (client_tx, client_rx) = mpsc::unbounded_channel();

	let raft_listener_task = tokio::spawn(accept_raft_connections(raft_listener, raft_tx));
	let client_listener_task = tokio::spawn(accept_client_connections(client_listener, client_tx));
	let event_loop_task = tokio::spawn(run_event_loop(config, transport, raft_rx, client_rx));

	Ok(NodeHandle { raft_addr, client_addr, raft_listener_task, client_listener_task, event_loop_task })
}

async fn accept_raft_connections(
	listener: TcpListener,
	raft_tx: mpsc::UnboundedSender<(RaftMessage, RaftReply)>,
) {
	loop {
		let (stream, peer_addr) = match listener.accept().await {
			Ok(pair) => pair,
			Err(e) => {
				warn!("raft listener accept failed: {}", e);
				continue;
			}
		};
		tokio::spawn(serve_raft_connection(stream, peer_addr, raft_tx.clone()));
	}
}

async fn serve_raft_connection(
	mut stream: TcpStream,
	peer_addr: SocketAddr,
	raft_tx: mpsc::UnboundedSender<(RaftMessage, RaftReply)>,
) {
	loop {
		let msg: RaftMessage = match read_framed(&mut stream).await {
			Ok(m) => m,
			Err(_) => {
				debug!("raft connection from {} closed", peer_addr);
				return;
			}
		};
		let (reply_tx, reply_rx) = oneshot::channel();
		if raft_tx.send((msg, reply_tx)).is_err() {
			return;
		}
		let resp = match reply_rx.await {
			Ok(r) => r,
			Err(_) => return,
		};
		if write_framed(&mut stream, &resp).await.is_err() {
			return;
		}
	}
}

async fn accept_client_connections(
	listener: TcpListener,
	client_tx: mpsc::UnboundedSender<(ClientRequest, ClientReply)>,
) {
	loop {
		let (stream, peer_addr) = match listener.accept().await {
			Ok(pair) => pair,
			Err(e) => {
				warn!("client listener accept failed: {}", e);
				continue;
			}
		};
		tokio::spawn(serve_client_connection(stream, peer_addr, client_tx.clone()));
	}
}

async fn serve_client_connection(
	mut stream: TcpStream,
	peer_addr: SocketAddr,
	client_tx: mpsc::UnboundedSender<(ClientRequest, ClientReply)>,
) {
	loop {
		let req: ClientRequest = match read_framed(&mut stream).await {
			Ok(r) => r,
			Err(_) => {
				debug!("client connection from {} closed", peer_addr);
				return;
			}
		};
		let (reply_tx, reply_rx) = oneshot::channel();
		if client_tx.send((req, reply_tx)).is_err() {
			return;
		}
		let resp = match reply_rx.await {
			Ok(r) => r,
			Err(_) => return,
		};
		if write_framed(&mut stream, &resp).await.is_err() {
			return;
		}
	}
}

/// The single task that owns `NodeState` for the node's lifetime.
async fn run_event_loop(
	config: Config,
	transport: Arc<Transport>,
	mut raft_rx: mpsc::UnboundedReceiver<(RaftMessage, RaftReply)>,
	mut client_rx: mpsc::UnboundedReceiver<(ClientRequest, ClientReply)>,
) {
	let mut state = NodeState::new(config);
	let (peer_tx, mut peer_rx) = mpsc::unbounded_channel::<PeerEvent>();

	let mut election_timer = Timer::disabled();
	let mut heartbeat_timer = Timer::disabled();
	reset_election_timer(&state, &mut election_timer);

	info!("node {} starting as follower in term {}", state.config.id, state.current_term);

	loop {
		tokio::select! {
			Some((msg, reply)) = raft_rx.recv() => {
				let resp = handle_raft_request(&mut state, &mut election_timer, &mut heartbeat_timer, msg);
				let _ = reply.send(resp);
			}
			Some((req, reply)) = client_rx.recv() => {
				handle_client_request(&mut state, &transport, &mut election_timer, &mut heartbeat_timer, &peer_tx, req, reply);
			}
			gen = election_timer.fired(), if election_timer.is_active() => {
				debug!("node {} election timer fired (generation {})", state.config.id, gen);
				enter_candidate(&mut state, &mut election_timer, &mut heartbeat_timer, &transport, &peer_tx);
			}
			gen = heartbeat_timer.fired(), if heartbeat_timer.is_active() => {
				debug!("node {} heartbeat timer fired (generation {})", state.config.id, gen);
				send_heartbeat(&state, &transport, &peer_tx);
				heartbeat_timer.reset(state.config.heartbeat_timeout);
			}
			Some(event) = peer_rx.recv() => {
				match event {
					PeerEvent::VoteReply(from, result) => {
						handle_vote_reply(&mut state, &mut election_timer, &mut heartbeat_timer, &transport, &peer_tx, from, result);
					}
					PeerEvent::AppendReply(from, sent_up_to, result) => {
						handle_append_reply(&mut state, &mut election_timer, &mut heartbeat_timer, &transport, &peer_tx, from, sent_up_to, result);
					}
				}
			}
		}
	}
}

fn reset_election_timer(state: &NodeState, timer: &mut Timer) {
	timer.reset(election_time(state.config.min_election_timeout, state.config.max_election_timeout));
}

/// Transition to Follower: clears leader-only bookkeeping, disarms the heartbeat timer, and
/// rearms the election timer (§4.4: "transition to follower" is itself a reset trigger).
fn step_down(state: &mut NodeState, election_timer: &mut Timer, heartbeat_timer: &mut Timer) {
	if !matches!(state.role, Role::Follower) {
		info!("node {} stepping down to follower in term {}", state.config.id, state.current_term);
	}
	state.role = Role::Follower;
	heartbeat_timer.disable();
	reset_election_timer(state, election_timer);
}

// ---------------------------------------------------------------------------------------------
// Inbound RPC handling (§4.5-4.7, common term-adoption rules)
// ---------------------------------------------------------------------------------------------

fn handle_raft_request(
	state: &mut NodeState,
	election_timer: &mut Timer,
	heartbeat_timer: &mut Timer,
	msg: RaftMessage,
) -> RaftMessage {
	match msg {
		RaftMessage::RequestVote(req) => {
			debug!("node {} handling RequestVote from {} for term {}", state.config.id, req.candidate_id, req.term);
			RaftMessage::RequestVoteResponse(on_request_vote(state, election_timer, heartbeat_timer, req))
		}
		RaftMessage::AppendEntries(req) => {
			debug!("node {} handling AppendEntries from {} for term {}", state.config.id, req.leader_id, req.term);
			RaftMessage::AppendEntriesResponse(on_append_entries(state, election_timer, heartbeat_timer, req))
		}
		RaftMessage::RequestVoteResponse(_) | RaftMessage::AppendEntriesResponse(_) => {
			warn!("node {} received a response variant on its request listener; ignoring", state.config.id);
			RaftMessage::AppendEntriesResponse(AppendEntriesResponse {
				term: state.current_term,
				log_index: 0,
				success: false,
			})
		}
	}
}

fn on_request_vote(
	state: &mut NodeState,
	election_timer: &mut Timer,
	heartbeat_timer: &mut Timer,
	req: RequestVoteRequest,
) -> RequestVoteResponse {
	if req.term > state.current_term {
		state.adopt_term(req.term);
		state.current_leader = None;
		step_down(state, election_timer, heartbeat_timer);
	} else if req.term < state.current_term {
		return RequestVoteResponse { term: state.current_term, vote_granted: false };
	}

	let can_vote = state.voted_for.is_none() || state.voted_for == Some(req.candidate_id);
	let up_to_date = state.is_candidate_log_up_to_date(req.last_log_index, req.last_log_term);

	if can_vote && up_to_date {
		state.voted_for = Some(req.candidate_id);
		reset_election_timer(state, election_timer);
		RequestVoteResponse { term: state.current_term, vote_granted: true }
	} else {
		RequestVoteResponse { term: state.current_term, vote_granted: false }
	}
}

fn on_append_entries(
	state: &mut NodeState,
	election_timer: &mut Timer,
	heartbeat_timer: &mut Timer,
	req: AppendEntriesRequest,
) -> AppendEntriesResponse {
	if req.term > state.current_term {
		state.adopt_term(req.term);
		step_down(state, election_timer, heartbeat_timer);
	} else if req.term < state.current_term {
		return AppendEntriesResponse { term: state.current_term, log_index: req.prev_log_index, success: false };
	} else {
		match &state.role {
			Role::Leader(_) => {
				// Equal term, different purported leader: election safety rules this out in
				// practice. Ignore rather than step down.
				warn!("node {} (leader, term {}) saw AppendEntries from {} at the same term", state.config.id, state.current_term, req.leader_id);
				return AppendEntriesResponse { term: state.current_term, log_index: req.prev_log_index, success: false };
			}
			Role::Candidate(_) => step_down(state, election_timer, heartbeat_timer),
			Role::Follower => reset_election_timer(state, election_timer),
		}
	}

	state.current_leader = Some(req.leader_id);

	if req.prev_log_index > 0 {
		match state.log.get(req.prev_log_index) {
			None => {
				return AppendEntriesResponse { term: state.current_term, log_index: req.prev_log_index, success: false }
			}
			Some(e) if e.term != req.prev_log_term => {
				return AppendEntriesResponse { term: state.current_term, log_index: req.prev_log_index, success: false }
			}
			_ => {}
		}
	}

	if !req.entries.is_empty() {
		state.log.truncate_from(req.prev_log_index + 1);
		state.log.append(req.entries);
	}

	if req.leader_commit > state.commit_index {
		state.commit_index = req.leader_commit.min(state.log.last_index());
		apply_committed(state);
	}

	AppendEntriesResponse { term: state.current_term, log_index: req.prev_log_index, success: true }
}

// ---------------------------------------------------------------------------------------------
// Candidate role (§4.6)
// ---------------------------------------------------------------------------------------------

fn enter_candidate(
	state: &mut NodeState,
	election_timer: &mut Timer,
	heartbeat_timer: &mut Timer,
	transport: &Arc<Transport>,
	peer_tx: &mpsc::UnboundedSender<PeerEvent>,
) {
	state.current_term += 1;
	state.voted_for = Some(state.config.id);
	state.current_leader = None;
	let mut votes = std::collections::HashSet::new();
	votes.insert(state.config.id);
	state.role = Role::Candidate(CandidateState { votes_received: votes });
	heartbeat_timer.disable();
	reset_election_timer(state, election_timer);

	info!("node {} starting candidacy for term {}", state.config.id, state.current_term);

	let term = state.current_term;
	let candidate_id = state.config.id;
	let last_log_index = state.last_log_index();
	let last_log_term = state.last_log_term();
	let tx = peer_tx.clone();
	transport.broadcast_others(
		move |_peer| {
			RaftMessage::RequestVote(RequestVoteRequest { term, candidate_id, last_log_index, last_log_term })
		},
		move |peer, result| {
			let _ = tx.send(PeerEvent::VoteReply(peer, result));
		},
	);
}

fn handle_vote_reply(
	state: &mut NodeState,
	election_timer: &mut Timer,
	heartbeat_timer: &mut Timer,
	transport: &Arc<Transport>,
	peer_tx: &mpsc::UnboundedSender<PeerEvent>,
	from: NodeId,
	result: Result<RaftMessage>,
) {
	let resp = match result {
		Ok(RaftMessage::RequestVoteResponse(r)) => r,
		Ok(_) => return,
		Err(e) => {
			debug!("node {} vote request to {} failed: {}", state.config.id, from, e);
			return;
		}
	};

	if resp.term > state.current_term {
		state.adopt_term(resp.term);
		state.current_leader = None;
		step_down(state, election_timer, heartbeat_timer);
		return;
	}
	if resp.term < state.current_term || !resp.vote_granted {
		return;
	}

	let won = if let Role::Candidate(ref mut c) = state.role {
		c.votes_received.insert(from);
		c.votes_received.len() >= state.config.majority_size()
	} else {
		false
	};

	if won {
		become_leader(state, election_timer, heartbeat_timer, transport, peer_tx);
	}
}

// ---------------------------------------------------------------------------------------------
// Leader role (§4.7)
// ---------------------------------------------------------------------------------------------

fn become_leader(
	state: &mut NodeState,
	election_timer: &mut Timer,
	heartbeat_timer: &mut Timer,
	transport: &Arc<Transport>,
	peer_tx: &mpsc::UnboundedSender<PeerEvent>,
) {
	let next = state.last_log_index() + 1;
	let mut leader = LeaderState::default();
	for peer in state.config.peers().copied().collect::<Vec<_>>() {
		leader.next_index.insert(peer, next);
		leader.match_index.insert(peer, 0);
	}
	state.role = Role::Leader(leader);
	state.current_leader = Some(state.config.id);
	election_timer.disable();

	info!("node {} became leader for term {}", state.config.id, state.current_term);

	send_heartbeat(state, transport, peer_tx);
	heartbeat_timer.reset(state.config.heartbeat_timeout);
}

fn send_heartbeat(state: &NodeState, transport: &Arc<Transport>, peer_tx: &mpsc::UnboundedSender<PeerEvent>) {
	broadcast_append_entries(state, transport, peer_tx, state.log.last_index(), state.log.last_term(), Vec::new());
}

fn broadcast_append_entries(
	state: &NodeState,
	transport: &Arc<Transport>,
	peer_tx: &mpsc::UnboundedSender<PeerEvent>,
	prev_log_index: LogIndex,
	prev_log_term: Term,
	entries: Vec<LogEntry>,
) {
	let term = state.current_term;
	let leader_id = state.config.id;
	let leader_commit = state.commit_index;
	let sent_up_to = prev_log_index + entries.len() as LogIndex;
	let tx = peer_tx.clone();
	transport.broadcast_others(
		move |_peer| {
			RaftMessage::AppendEntries(AppendEntriesRequest {
				term,
				leader_id,
				prev_log_index,
				prev_log_term,
				entries: entries.clone(),
				leader_commit,
			})
		},
		move |peer, result| {
			let _ = tx.send(PeerEvent::AppendReply(peer, sent_up_to, result));
		},
	);
}

fn send_append_entries_to(
	transport: &Arc<Transport>,
	peer: NodeId,
	req: AppendEntriesRequest,
	peer_tx: &mpsc::UnboundedSender<PeerEvent>,
) {
	let sent_up_to = req.prev_log_index + req.entries.len() as LogIndex;
	let transport = Arc::clone(transport);
	let tx = peer_tx.clone();
	tokio::spawn(async move {
		let result = transport.send(peer, RaftMessage::AppendEntries(req)).await;
		let _ = tx.send(PeerEvent::AppendReply(peer, sent_up_to, result));
	});
}

fn handle_append_reply(
	state: &mut NodeState,
	election_timer: &mut Timer,
	heartbeat_timer: &mut Timer,
	transport: &Arc<Transport>,
	peer_tx: &mpsc::UnboundedSender<PeerEvent>,
	from: NodeId,
	sent_up_to: LogIndex,
	result: Result<RaftMessage>,
) {
	let resp = match result {
		Ok(RaftMessage::AppendEntriesResponse(r)) => r,
		Ok(_) => return,
		Err(e) => {
			debug!("node {} append request to {} failed: {}", state.config.id, from, e);
			return;
		}
	};

	if resp.term > state.current_term {
		state.adopt_term(resp.term);
		state.current_leader = None;
		step_down(state, election_timer, heartbeat_timer);
		return;
	}
	if resp.term < state.current_term {
		return;
	}

	if resp.success {
		if let Role::Leader(ref mut leader) = state.role {
			// Replies for concurrently in-flight requests (a heartbeat racing a client-op append)
			// can land out of order; never let a stale, smaller `sent_up_to` regress bookkeeping
			// that a later reply already advanced.
			let match_index = leader.match_index.entry(from).or_insert(0);
			*match_index = (*match_index).max(sent_up_to);
			let next_index = leader.next_index.entry(from).or_insert(1);
			*next_index = (*next_index).max(sent_up_to + 1);
		} else {
			return;
		}
		advance_commit_index(state);
	} else {
		let (prev_index, prev_term, entries, leader_commit) = {
			let leader = match &mut state.role {
				Role::Leader(l) => l,
				_ => return,
			};
			let current_next = leader.next_index.get(&from).copied().unwrap_or(1);
			let new_next = current_next.saturating_sub(1).max(1);
			leader.next_index.insert(from, new_next);
			let prev_index = new_next - 1;
			let prev_term = if prev_index == 0 { 0 } else { state.log.get(prev_index).map(|e| e.term).unwrap_or(0) };
			(prev_index, prev_term, state.log.suffix_from(new_next).to_vec(), state.commit_index)
		};
		let req = AppendEntriesRequest {
			term: state.current_term,
			leader_id: state.config.id,
			prev_log_index: prev_index,
			prev_log_term: prev_term,
			entries,
			leader_commit,
		};
		send_append_entries_to(transport, from, req, peer_tx);
	}
}

/// §4.7's majority scan, restricted to entries of the current term: the largest `N` with
/// `N > commit_index`, `log[N].term == current_term`, and a strict majority of `match_index`
/// (counting self, always caught up) at least `N`.
fn advance_commit_index(state: &mut NodeState) {
	let majority = state.config.majority_size();
	let current_term = state.current_term;
	let last_log_index = state.log.last_index();

	let match_indices: Vec<LogIndex> = match &state.role {
		Role::Leader(leader) => {
			let mut v: Vec<LogIndex> = leader.match_index.values().copied().collect();
			v.push(last_log_index);
			v
		}
		_ => return,
	};

	let mut candidate = state.commit_index;
	for n in (state.commit_index + 1)..=last_log_index {
		let count = match_indices.iter().filter(|&&m| m >= n).count();
		if count >= majority {
			if let Some(entry) = state.log.get(n) {
				if entry.term == current_term {
					candidate = n;
				}
			}
		}
	}

	if candidate > state.commit_index {
		state.commit_index = candidate;
		info!("node {} advanced commit_index to {}", state.config.id, candidate);
		apply_committed(state);
	}
}

// ---------------------------------------------------------------------------------------------
// Commit / apply pipeline (§4.3) and client reply delivery
// ---------------------------------------------------------------------------------------------

fn apply_committed(state: &mut NodeState) {
	while state.last_applied < state.commit_index {
		let index = state.last_applied + 1;
		let entry = state.log.get(index).cloned().expect("committed entry must exist in the log");
		let result = state.queue.apply(&entry);
		state.last_applied = index;

		if let Role::Leader(ref mut leader) = state.role {
			if let Some(reply) = leader.pending_replies.remove(&index) {
				let response = match result {
					crate::queue::ApplyResult::Ok => ClientResponse::Ok,
					crate::queue::ApplyResult::Empty => ClientResponse::Empty,
					crate::queue::ApplyResult::Value(v) => ClientResponse::Value(v),
				};
				let _ = reply.send(response);
			}
		}
	}
}

// ---------------------------------------------------------------------------------------------
// Client + admin request handling (§4.9, §4.10)
// ---------------------------------------------------------------------------------------------

fn handle_client_request(
	state: &mut NodeState,
	transport: &Arc<Transport>,
	election_timer: &mut Timer,
	heartbeat_timer: &mut Timer,
	peer_tx: &mpsc::UnboundedSender<PeerEvent>,
	req: ClientRequest,
	reply: ClientReply,
) {
	match req {
		ClientRequest::Nop => submit_op(state, transport, peer_tx, Op::Nop, reply),
		ClientRequest::Enqueue(v) => submit_op(state, transport, peer_tx, Op::Enqueue(v), reply),
		ClientRequest::Dequeue => submit_op(state, transport, peer_tx, Op::Dequeue, reply),

		ClientRequest::SendState => {
			let _ = reply.send(ClientResponse::State(state.queue.snapshot()));
		}
		ClientRequest::SendLog => {
			let _ = reply.send(ClientResponse::Log(state.log.snapshot()));
		}
		ClientRequest::WhoIsLeader => {
			let _ = reply.send(ClientResponse::Leader { leader: state.current_leader, term: state.current_term });
		}
		ClientRequest::CurrentProcessType => {
			let tag: RoleTag = state.role.tag();
			let _ = reply.send(ClientResponse::Role(tag));
		}
		ClientRequest::SetElectionTimeout { min_ms, max_ms } => {
			state.config.min_election_timeout = std::time::Duration::from_millis(min_ms);
			state.config.max_election_timeout = std::time::Duration::from_millis(max_ms);
			if !state.role.is_leader() {
				reset_election_timer(state, election_timer);
			}
			let _ = reply.send(ClientResponse::Ack);
		}
		ClientRequest::SetHeartbeatTimeout { ms } => {
			state.config.heartbeat_timeout = std::time::Duration::from_millis(ms);
			if state.role.is_leader() {
				heartbeat_timer.reset(state.config.heartbeat_timeout);
			}
			let _ = reply.send(ClientResponse::Ack);
		}
	}
}

fn submit_op(
	state: &mut NodeState,
	transport: &Arc<Transport>,
	peer_tx: &mpsc::UnboundedSender<PeerEvent>,
	op: Op,
	reply: ClientReply,
) {
	match &state.role {
		Role::Follower => {
			let _ = reply.send(ClientResponse::Redirect(state.current_leader));
			return;
		}
		Role::Candidate(_) => {
			let _ = reply.send(ClientResponse::Redirect(Some(state.config.id)));
			return;
		}
		Role::Leader(_) => {}
	}

	let prev_index = state.log.last_index();
	let prev_term = state.log.last_term();
	let index = prev_index + 1;
	// Clients have no `NodeId` of their own in this design (see DESIGN.md); delivery of the
	// apply result runs entirely through `LeaderState::pending_replies` keyed by log index, so
	// `requester` plays no role in reply routing. Left as the unused sentinel rather than the
	// leader's own id, which would misreport every entry as leader-originated to `send_log`.
	let entry = LogEntry { index, term: state.current_term, requester: 0, op };
	state.log.append(vec![entry.clone()]);

	if let Role::Leader(ref mut leader) = state.role {
		leader.pending_replies.insert(index, reply);
	}

	// A single-node cluster (majority_size() == 1) commits off the leader's own log alone, with
	// no peer ever sending back an AppendEntriesResponse to trigger the scan.
	advance_commit_index(state);

	broadcast_append_entries(state, transport, peer_tx, prev_index, prev_term, vec![entry]);
}
