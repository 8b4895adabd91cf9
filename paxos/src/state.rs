//! # Summary
//!
//! This module defines the traits that together describe a replicated
//! state machine. Library users implement `Command`, `Response`, and
//! `State` for their own application, then hand a `State` to
//! `paxos::Config` to run it under Multi-Paxos.

/// A hashable, totally-comparable identifier: client addresses, local
/// request ids, and acceptor/leader addresses are all one of these.
pub trait Identifier: std::hash::Hash + std::fmt::Debug + Clone + Eq + Send + Sync + 'static {}

impl<T> Identifier for T where T: std::hash::Hash + std::fmt::Debug + Clone + Eq + Send + Sync + 'static {}

/// An operation that can be proposed to the replicated log.
///
/// `client_id` and `local_id` together give a command identity distinct
/// from its contents, a client address paired with a per-client request
/// id. The Replica deduplicates on this pair, not on `PartialEq` of the
/// whole command.
pub trait Command: Send + Sync + Clone + std::fmt::Debug + serde::Serialize + serde::de::DeserializeOwned + 'static {
    type ClientId: Identifier;
    type LocalId: Identifier;
    fn client_id(&self) -> Self::ClientId;
    fn local_id(&self) -> Self::LocalId;
}

/// The result of applying a `Command` to a `State`.
pub trait Response: Send + std::fmt::Debug + serde::Serialize + 'static {}

impl<T> Response for T where T: Send + std::fmt::Debug + serde::Serialize + 'static {}

/// The user-supplied, deterministic state-transition function the
/// cluster replicates. `execute` must be total and deterministic: every
/// correct replica that executes the same sequence of commands must
/// reach the same sequence of responses.
pub trait State: Default + Send + 'static {
    type Command: Command;
    type Response: Response;

    /// Apply `command`, decided for `slot`, to the state machine and
    /// return the response to deliver to the client that issued it.
    fn execute(&mut self, slot: usize, command: Self::Command) -> Self::Response;
}
