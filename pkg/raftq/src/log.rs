//! In-memory replicated log.
//!
//! Indices are 1-based; index 0 denotes the empty sentinel entry (term 0) that every log is
//! conceptually prefixed with, so `prev_log_index == 0` always "matches".

use serde::{Deserialize, Serialize};

use crate::protos::{LogIndex, NodeId, Op, Term};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogEntry {
	pub index: LogIndex,
	pub term: Term,
	/// Carried over from the wire format §3 describes; unused for reply delivery in this design
	/// since clients have no `NodeId` of their own (see `NodeState::submit_op`'s sentinel and
	/// `DESIGN.md`). Delivery runs instead through `LeaderState::pending_replies`, keyed by index.
	pub requester: NodeId,
	pub op: Op,
}

/// An ordered, contiguous, 1-based run of `LogEntry` values.
#[derive(Debug, Clone, Default)]
pub struct Log {
	entries: Vec<LogEntry>,
}

impl Log {
	pub fn new() -> Self {
		Log { entries: Vec::new() }
	}

	pub fn last_index(&self) -> LogIndex {
		self.entries.last().map(|e| e.index).unwrap_or(0)
	}

	pub fn last_term(&self) -> Term {
		self.entries.last().map(|e| e.term).unwrap_or(0)
	}

	/// `None` if `index` is 0 or past the end of the log.
	pub fn get(&self, index: LogIndex) -> Option<&LogEntry> {
		if index == 0 || index > self.last_index() {
			return None;
		}
		self.entries.get((index - 1) as usize)
	}

	pub fn has(&self, index: LogIndex) -> bool {
		index > 0 && index <= self.last_index()
	}

	/// Entries with index >= `from`. Empty if `from` is past the end of the log.
	pub fn suffix_from(&self, from: LogIndex) -> &[LogEntry] {
		if from > self.last_index() {
			return &[];
		}
		let start = from.saturating_sub(1) as usize;
		&self.entries[start..]
	}

	/// Drops every entry with index >= `from`. No-op if `from` is past the end of the log.
	pub fn truncate_from(&mut self, from: LogIndex) {
		if from == 0 {
			self.entries.clear();
			return;
		}
		if from > self.last_index() {
			return;
		}
		self.entries.truncate((from - 1) as usize);
	}

	/// `entries` must be contiguous and start immediately after the current tail.
	pub fn append(&mut self, entries: impl IntoIterator<Item = LogEntry>) {
		let mut next = self.last_index() + 1;
		for e in entries {
			debug_assert_eq!(e.index, next, "log entries must be appended contiguously");
			next += 1;
			self.entries.push(e);
		}
	}

	/// Full copy of the log, for the `send_log` admin query.
	pub fn snapshot(&self) -> Vec<LogEntry> {
		self.entries.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry(index: LogIndex, term: Term) -> LogEntry {
		LogEntry { index, term, requester: 0, op: Op::Nop }
	}

	#[test]
	fn empty_log_reports_zero() {
		let log = Log::new();
		assert_eq!(log.last_index(), 0);
		assert_eq!(log.last_term(), 0);
		assert!(!log.has(1));
		assert!(log.get(1).is_none());
		assert!(log.suffix_from(1).is_empty());
	}

	#[test]
	fn append_and_get() {
		let mut log = Log::new();
		log.append(vec![entry(1, 1), entry(2, 1), entry(3, 2)]);
		assert_eq!(log.last_index(), 3);
		assert_eq!(log.last_term(), 2);
		assert!(log.has(2));
		assert_eq!(log.get(2).unwrap().term, 1);
		assert_eq!(log.suffix_from(2).len(), 2);
		assert!(log.suffix_from(10).is_empty());
	}

	#[test]
	fn truncate_from_drops_suffix() {
		let mut log = Log::new();
		log.append(vec![entry(1, 1), entry(2, 1), entry(3, 2)]);
		log.truncate_from(2);
		assert_eq!(log.last_index(), 1);
		assert_eq!(log.last_term(), 1);
		log.append(vec![entry(2, 5)]);
		assert_eq!(log.last_term(), 5);
	}

	#[test]
	fn truncate_from_past_end_is_noop() {
		let mut log = Log::new();
		log.append(vec![entry(1, 1)]);
		log.truncate_from(5);
		assert_eq!(log.last_index(), 1);
	}
}
