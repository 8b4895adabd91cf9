//! # Summary
//!
//! Message and identifier types exchanged between the Acceptor, Scout,
//! Commander, Leader, and Replica roles (and, externally, between a
//! client and a Replica). Almost all of these types are equivalent to
//! those described in *Paxos Made Moderately Complex*; `Command` is a
//! Rust implementation detail.

use serde::{Deserialize, Serialize};

use crate::state;

/// Wrapper around a user-supplied command that defines equality and
/// hashing over a command's client id and local (per-client) id only,
/// rather than its full contents. This is what lets the Replica detect
/// "the same client request, proposed twice" without requiring the
/// user's command type to implement a cheap equality check of its own.
#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
#[derive(Clone, Debug)]
pub struct Command<C: state::Command>(C);

impl<C: state::Command> Command<C> {
    pub fn into_inner(self) -> C {
        self.0
    }
}

impl<C: state::Command> From<C> for Command<C> {
    fn from(command: C) -> Self {
        Command(command)
    }
}

impl<C: state::Command> Eq for Command<C> {}

impl<C: state::Command> PartialEq for Command<C> {
    fn eq(&self, rhs: &Self) -> bool {
        self.0.client_id() == rhs.0.client_id() && self.0.local_id() == rhs.0.local_id()
    }
}

impl<C: state::Command> std::hash::Hash for Command<C> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.client_id().hash(state);
        self.0.local_id().hash(state);
    }
}

impl<C: state::Command> std::ops::Deref for Command<C> {
    type Target = C;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A ballot is totally ordered by its sequence number first and the
/// proposing leader's address as a tiebreaker. Larger ballots dominate.
///
/// The conceptual sentinel `(-1, -1)` ballot, meaning "nothing seen yet",
/// has no natural representation for an unsigned sequence number;
/// `Acceptor` represents that state as `Option<Ballot>` instead (`None`
/// sorts below every `Some`).
#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ballot {
    /// Leader-local sequence number.
    pub num: u64,
    /// Address of the proposing leader; breaks ties between equal `num`.
    pub leader: usize,
}

impl Ballot {
    pub fn new(num: u64, leader: usize) -> Self {
        Ballot { num, leader }
    }
}

/// A commander is uniquely determined by the ballot its leader held when
/// it was spawned and the slot it is driving to agreement.
#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommanderId {
    pub ballot: Ballot,
    pub slot: usize,
}

/// A proposed binding from slot to command, tagged with the ballot under
/// which an acceptor last accepted it.
#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
#[derive(Derivative)]
#[derivative(Clone(bound = ""), Debug(bound = ""), Hash(bound = ""), PartialEq(bound = ""), Eq(bound = ""))]
pub struct PValue<C: state::Command> {
    /// Targeted slot.
    pub slot: usize,
    /// Ballot under which this value was accepted.
    pub ballot: Ballot,
    /// Proposed command.
    pub command: Command<C>,
}

/// p1a: scout to acceptor. A scout's identity is just this ballot: its
/// `leader` field already names the owning leader, so no separate id is
/// needed to route a reply back.
pub type Prepare = Ballot;

/// p1b: acceptor to scout. `requested` echoes the ballot the scout asked
/// about, so a scout that has since moved on to a higher ballot can
/// recognize and drop a promise that answers an older, superseded
/// `Prepare` instead of mistaking it for a preemption of its *current*
/// ballot.
#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
#[derive(Derivative)]
#[derivative(Clone(bound = ""), Debug(bound = ""), PartialEq(bound = ""), Eq(bound = ""))]
pub struct Promise<C: state::Command> {
    pub acceptor: usize,
    pub requested: Ballot,
    pub ballot: Ballot,
    pub accepted: Vec<PValue<C>>,
}

/// p2a: commander to acceptor.
pub type Accept<C> = PValue<C>;

/// p2b: acceptor to commander.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Accepted {
    /// Acceptor id.
    pub acceptor: usize,
    /// Acceptor's currently adopted ballot.
    pub ballot: Ballot,
}

/// A proposed binding from slot to command, as broadcast by a Replica to
/// every Leader, or as decided and broadcast by a Commander to every
/// Replica.
#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
#[derive(Derivative)]
#[derivative(Clone(bound = ""), Debug(bound = ""), Hash(bound = ""), PartialEq(bound = ""), Eq(bound = ""))]
pub struct Proposal<C: state::Command> {
    /// Targeted slot.
    pub slot: usize,
    /// Proposed command.
    pub command: Command<C>,
}
