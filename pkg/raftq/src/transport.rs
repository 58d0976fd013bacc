//! Point-to-point RPC transport: one persistent TCP connection per peer, carrying length-prefixed
//! MessagePack frames. FIFO-per-pair ordering (assumed by the protocol, §5) falls out of using a
//! single connection per directed peer pair rather than being implemented explicitly.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::errors::*;
use crate::protos::{NodeId, RaftMessage};

/// Arbitrary cap well above anything this protocol ever sends, to keep a corrupt length prefix
/// from making us allocate unboundedly.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

pub async fn write_framed<T: Serialize>(stream: &mut TcpStream, value: &T) -> Result<()> {
	let body = rmp_serde::to_vec(value)?;
	let mut header = [0u8; 4];
	BigEndian::write_u32(&mut header, body.len() as u32);
	stream.write_all(&header).await?;
	stream.write_all(&body).await?;
	stream.flush().await?;
	Ok(())
}

pub async fn read_framed<T: DeserializeOwned>(stream: &mut TcpStream) -> Result<T> {
	let mut header = [0u8; 4];
	stream.read_exact(&mut header).await?;
	let len = BigEndian::read_u32(&header);
	if len > MAX_FRAME_LEN {
		return Err(format!("frame of {} bytes exceeds the {} byte cap", len, MAX_FRAME_LEN).into());
	}
	let mut body = vec![0u8; len as usize];
	stream.read_exact(&mut body).await?;
	Ok(rmp_serde::from_slice(&body)?)
}

/// Inter-node RPC transport. Owns a lazily-established, reused connection per peer.
pub struct Transport {
	id: NodeId,
	view: HashMap<NodeId, SocketAddr>,
	conns: Mutex<HashMap<NodeId, TcpStream>>,
}

impl Transport {
	pub fn new(id: NodeId, view: HashMap<NodeId, SocketAddr>) -> Self {
		Transport { id, view, conns: Mutex::new(HashMap::new()) }
	}

	pub fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
		self.view.keys().copied().filter(move |p| *p != self.id)
	}

	fn addr_of(&self, peer: NodeId) -> Result<SocketAddr> {
		self.view.get(&peer).copied().ok_or_else(|| format!("no address configured for peer {}", peer).into())
	}

	async fn exchange(&self, mut stream: TcpStream, msg: &RaftMessage) -> Result<(TcpStream, RaftMessage)> {
		write_framed(&mut stream, msg).await?;
		let resp = read_framed::<RaftMessage>(&mut stream).await?;
		Ok((stream, resp))
	}

	/// Sends `msg` to `peer` and waits for its reply, reusing a cached connection when possible
	/// and transparently reconnecting once if the cached connection turns out to be dead.
	pub async fn send(&self, peer: NodeId, msg: RaftMessage) -> Result<RaftMessage> {
		let addr = self.addr_of(peer)?;

		let cached = self.conns.lock().await.remove(&peer);
		let stream = match cached {
			Some(s) => s,
			None => TcpStream::connect(addr).await?,
		};

		match self.exchange(stream, &msg).await {
			Ok((stream, resp)) => {
				self.conns.lock().await.insert(peer, stream);
				Ok(resp)
			}
			Err(_) => {
				let stream = TcpStream::connect(addr).await?;
				let (stream, resp) = self.exchange(stream, &msg).await?;
				self.conns.lock().await.insert(peer, stream);
				Ok(resp)
			}
		}
	}

	/// Fires `msg_for(peer)` at every peer other than self, concurrently. Each peer's outcome is
	/// delivered to `on_reply` as soon as it resolves rather than waited on here, so a single slow
	/// or unreachable peer never delays delivery of the others' replies back into the node's event
	/// loop.
	pub fn broadcast_others<M, R>(self: &Arc<Self>, msg_for: M, on_reply: R)
	where
		M: Fn(NodeId) -> RaftMessage,
		R: Fn(NodeId, Result<RaftMessage>) + Send + Sync + 'static,
	{
		let on_reply = Arc::new(on_reply);
		for peer in self.peers().collect::<Vec<_>>() {
			let transport = Arc::clone(self);
			let msg = msg_for(peer);
			let on_reply = Arc::clone(&on_reply);
			tokio::spawn(async move {
				let result = transport.send(peer, msg).await;
				on_reply(peer, result);
			});
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protos::{AppendEntriesRequest, AppendEntriesResponse};
	use tokio::net::TcpListener;

	#[tokio::test]
	async fn round_trip_over_loopback() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();

		tokio::spawn(async move {
			let (mut stream, _) = listener.accept().await.unwrap();
			let req: RaftMessage = read_framed(&mut stream).await.unwrap();
			assert!(matches!(req, RaftMessage::AppendEntries(_)));
			let resp = RaftMessage::AppendEntriesResponse(AppendEntriesResponse {
				term: 1,
				log_index: 0,
				success: true,
			});
			write_framed(&mut stream, &resp).await.unwrap();
		});

		let mut view = HashMap::new();
		view.insert(1u64, addr);
		view.insert(0u64, "127.0.0.1:0".parse().unwrap());
		let transport = Transport::new(0, view);

		let req = RaftMessage::AppendEntries(AppendEntriesRequest {
			term: 1,
			leader_id: 0,
			prev_log_index: 0,
			prev_log_term: 0,
			entries: vec![],
			leader_commit: 0,
		});
		let resp = transport.send(1, req).await.unwrap();
		match resp {
			RaftMessage::AppendEntriesResponse(r) => assert!(r.success),
			_ => panic!("unexpected response"),
		}
	}
}
