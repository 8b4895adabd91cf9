//! # Summary
//!
//! A Multi-Paxos replicated state machine: library users implement
//! `state::Command`/`state::Response`/`state::State` for their own
//! application and hand it to `Config` to run a cluster member over TCP,
//! or wire the component roles (`acceptor`, `scout`, `commander`,
//! `leader`, `replica`) directly over `transport::Local` for testing.
//!
//! See `message::Ballot` for the total order driving the protocol and
//! `node::Node` for how one member's three roles compose.

#[macro_use]
extern crate derivative;

pub mod acceptor;
pub mod client;
pub mod commander;
pub mod config;
pub mod error;
pub mod leader;
pub mod message;
pub mod node;
pub mod replica;
pub mod scout;
pub mod slots;
pub mod state;
pub mod storage;
pub mod transport;

pub use crate::config::Config;
pub use crate::node::Node;
pub use crate::state::{Command, Identifier, Response, State};
