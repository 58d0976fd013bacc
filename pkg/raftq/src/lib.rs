#[macro_use]
extern crate error_chain;

pub mod errors {
	error_chain! {
		foreign_links {
			Io(::std::io::Error);
			Encode(::rmp_serde::encode::Error);
			Decode(::rmp_serde::decode::Error);
		}
	}
}

pub mod protos;
pub mod log;
pub mod queue;
pub mod state;
pub mod timer;
pub mod transport;
pub mod node;
pub mod client;
