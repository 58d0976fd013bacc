//! Redirect-following client, usable both as a library (from tests and other programs) and as
//! the basis of the `raftq-client` CLI.

use std::collections::HashMap;
use std::net::SocketAddr;

use log::debug;
use tokio::net::TcpStream;

use crate::errors::*;
use crate::protos::{ClientRequest, ClientResponse, NodeId, Value};
use crate::transport::{read_framed, write_framed};

/// Talks to one node at a time, following `Redirect` replies until an authoritative answer
/// arrives. Keeps no connection open between calls: each op is a fresh TCP round trip, since
/// nodes change identity (leader) far more often than a long-lived connection would be useful.
pub struct Client {
	servers: HashMap<NodeId, SocketAddr>,
	current: NodeId,
}

impl Client {
	/// `servers` is the client's initial address book (client-facing ports, not Raft ports);
	/// `current` is which of them to try first.
	pub fn new(servers: HashMap<NodeId, SocketAddr>, current: NodeId) -> Self {
		Client { servers, current }
	}

	async fn call(&mut self, target: NodeId, req: &ClientRequest) -> Result<ClientResponse> {
		let addr = *self
			.servers
			.get(&target)
			.ok_or_else(|| format!("no known address for server {}", target))?;
		let mut stream = TcpStream::connect(addr).await?;
		write_framed(&mut stream, req).await?;
		read_framed(&mut stream).await
	}

	/// Sends `req`, following `Redirect` replies until a non-redirect response is returned. Loops
	/// indefinitely on redirect/transport-error, per §4.9 ("the client assumes ... redirects
	/// converge"): it is the caller's job (the CLI, in practice) to bound this with a retry count.
	pub async fn send(&mut self, req: ClientRequest) -> Result<ClientResponse> {
		loop {
			match self.call(self.current, &req).await {
				Ok(ClientResponse::Redirect(Some(leader))) if self.servers.contains_key(&leader) => {
					debug!("client redirected from {} to {}", self.current, leader);
					self.current = leader;
				}
				Ok(ClientResponse::Redirect(_)) => {
					// No leader known yet, or the named leader isn't in our address book: try
					// every other known server in turn until one answers with something useful.
					self.current = self.next_server();
				}
				Ok(resp) => return Ok(resp),
				Err(e) => {
					debug!("request to {} failed ({}), trying another server", self.current, e);
					self.current = self.next_server();
				}
			}
		}
	}

	fn next_server(&self) -> NodeId {
		let mut ids: Vec<NodeId> = self.servers.keys().copied().collect();
		ids.sort_unstable();
		match ids.iter().position(|id| *id == self.current) {
			Some(pos) => ids[(pos + 1) % ids.len()],
			None => ids[0],
		}
	}

	pub async fn nop(&mut self) -> Result<()> {
		match self.send(ClientRequest::Nop).await? {
			ClientResponse::Ok => Ok(()),
			other => Err(format!("unexpected response to nop: {:?}", other).into()),
		}
	}

	pub async fn enqueue(&mut self, value: Value) -> Result<()> {
		match self.send(ClientRequest::Enqueue(value)).await? {
			ClientResponse::Ok => Ok(()),
			other => Err(format!("unexpected response to enqueue: {:?}", other).into()),
		}
	}

	/// `None` if the queue was empty.
	pub async fn dequeue(&mut self) -> Result<Option<Value>> {
		match self.send(ClientRequest::Dequeue).await? {
			ClientResponse::Value(v) => Ok(Some(v)),
			ClientResponse::Empty => Ok(None),
			other => Err(format!("unexpected response to dequeue: {:?}", other).into()),
		}
	}

	pub async fn who_is_leader(&mut self) -> Result<(Option<NodeId>, u64)> {
		match self.send(ClientRequest::WhoIsLeader).await? {
			ClientResponse::Leader { leader, term } => Ok((leader, term)),
			other => Err(format!("unexpected response to whois_leader: {:?}", other).into()),
		}
	}

	pub async fn send_state(&mut self) -> Result<Vec<Value>> {
		match self.send(ClientRequest::SendState).await? {
			ClientResponse::State(items) => Ok(items),
			other => Err(format!("unexpected response to send_state: {:?}", other).into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn next_server_wraps_around() {
		let mut servers = HashMap::new();
		servers.insert(0u64, "127.0.0.1:1".parse().unwrap());
		servers.insert(1u64, "127.0.0.1:2".parse().unwrap());
		servers.insert(2u64, "127.0.0.1:3".parse().unwrap());
		let client = Client::new(servers, 2);
		assert_eq!(client.next_server(), 0);
	}
}
