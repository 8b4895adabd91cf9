//! # Summary
//!
//! A cluster member's address identity, best-effort send/broadcast with
//! no ordering guarantee, and a dispatch loop that routes inbound
//! messages to the right role by kind. This module defines the
//! `Transport` trait plus two implementations: `local` (in-process,
//! channel-backed, full mesh, what the core's own tests run the
//! protocol over) and `tcp` (length-delimited, bincode-encoded TCP,
//! used by `demos/chatroom`).

pub mod local;
pub mod tcp;

use serde::{Deserialize, Serialize};

use crate::message::{self, CommanderId};
use crate::state;

/// Every message kind that crosses the wire between cluster members,
/// tagged so a receiving `Node` can route it to the right role.
#[derive(Derivative, Deserialize, Serialize)]
#[derivative(Clone(bound = ""), Debug(bound = ""))]
#[serde(bound(serialize = "", deserialize = ""))]
pub enum Wire<C: state::Command> {
    /// p1a: scout to acceptor.
    Prepare(message::Prepare),
    /// p1b: acceptor to scout (routed through the scout's leader).
    Promise(message::Promise<C>),
    /// p2a: commander to acceptor.
    Accept(CommanderId, message::Accept<C>),
    /// p2b: acceptor to commander (routed through the commander's leader).
    Accepted(CommanderId, message::Accepted),
    /// Replica to every Leader.
    Propose(message::Proposal<C>),
    /// Commander to every Replica.
    Decision(message::Proposal<C>),
}

/// Abstract transport a `Node` sends and receives through. Delivery is
/// best-effort: a correct implementation may drop, duplicate, or reorder
/// messages, and callers may not rely on any particular transit delay.
/// The protocol's retransmission and quorum logic is the only recovery
/// mechanism.
pub trait Transport<C: state::Command>: Clone + Send + Sync + 'static {
    /// This member's own address.
    fn address(&self) -> usize;

    /// Total number of cluster members, used to compute quorums.
    fn cluster_size(&self) -> usize;

    /// Send `message` to the single member `to`. A `Transport` is free to
    /// treat `to == self.address()` as a loopback delivery rather than an
    /// actual network round trip.
    fn send(&self, to: usize, message: Wire<C>);

    /// Send `message` to every cluster member, including this one. A
    /// local Leader handles its own Replica's `PROPOSE` exactly like any
    /// other member's.
    fn broadcast(&self, message: Wire<C>) {
        for to in 0..self.cluster_size() {
            self.send(to, message.clone());
        }
    }

    /// Send `message` to exactly the members named by `to`, skipping
    /// those who have already replied (used by `Scout`/`Commander`
    /// retransmission to avoid re-pinging acceptors that already
    /// answered).
    fn narrowcast<I: IntoIterator<Item = usize>>(&self, to: I, message: Wire<C>) {
        for id in to {
            self.send(id, message.clone());
        }
    }
}

/// `floor(count / 2) + 1`, computed with integer division: a majority of
/// the current static cluster size.
pub fn quorum(count: usize) -> usize {
    count / 2 + 1
}
