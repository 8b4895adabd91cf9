//! # Summary
//!
//! `Node` wires one `Acceptor`, one `Leader`, and one `Replica` together
//! behind a single `Transport`: a cluster member is exactly these three
//! roles plus the dispatch loop that routes inbound wire messages to the
//! right one by kind. This is the level `Config` (and `demos/chatroom`)
//! construct against; nothing outside this module needs to know the
//! three roles are separate tasks.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::acceptor::{self, Acceptor};
use crate::leader::{self, Leader};
use crate::replica::{self, Replica};
use crate::state;
use crate::transport::{Transport, Wire};

/// A running cluster member. Dropping this drops every inbound channel,
/// which causes all four spawned tasks (acceptor, leader, replica,
/// dispatch) to drain and exit.
pub struct Node<S: state::State, T: Transport<S::Command>> {
    replica_tx: mpsc::UnboundedSender<replica::In<S>>,
    acceptor: JoinHandle<()>,
    leader: JoinHandle<()>,
    replica: JoinHandle<()>,
    dispatch: JoinHandle<()>,
    _transport: std::marker::PhantomData<T>,
}

impl<S: state::State, T: Transport<S::Command>> Node<S, T> {
    /// Spawns the Acceptor, Leader, and Replica tasks for this member and a
    /// dispatch loop draining `inbound` (every `Wire` message addressed to
    /// this member, regardless of which peer, or itself, sent it).
    pub fn spawn(
        transport: T,
        period: std::time::Duration,
        storage_dir: Option<&std::path::Path>,
        inbound: mpsc::UnboundedReceiver<Wire<S::Command>>,
    ) -> Self {
        let address = transport.address();

        let (acceptor_tx, acceptor_rx) = mpsc::unbounded_channel();
        let (leader_tx, leader_rx) = mpsc::unbounded_channel();
        let (replica_tx, replica_rx) = mpsc::unbounded_channel();

        let acceptor_instance = Acceptor::new(address, storage_dir);
        let leader_instance = Leader::new(transport.clone(), period, storage_dir, leader_tx.clone());
        let replica_instance = Replica::new(transport.clone(), storage_dir);

        let acceptor = tokio::spawn(acceptor::run(acceptor_instance, transport, acceptor_rx));
        let leader = tokio::spawn(leader::run(leader_instance, leader_rx));
        let replica = tokio::spawn(replica::run(replica_instance, replica_rx));
        let dispatch = tokio::spawn(dispatch::<S>(inbound, acceptor_tx, leader_tx, replica_tx.clone()));

        Node { replica_tx, acceptor, leader, replica, dispatch, _transport: std::marker::PhantomData }
    }

    /// Submits a client request to this member's Replica. `response`
    /// receives exactly one `S::Response` once the request's slot has
    /// been decided and executed, or nothing at all if this member
    /// crashes or the request is never proposed to a majority.
    pub fn invoke(&self, command: S::Command, response: mpsc::UnboundedSender<S::Response>) {
        let _ = self.replica_tx.send(replica::In::Invoke(command, response));
    }

    /// Waits for every spawned task to finish (only happens once every
    /// inbound channel, including `inbound` itself, has been dropped).
    pub async fn join(self) {
        let _ = tokio::join!(self.acceptor, self.leader, self.replica, self.dispatch);
    }
}

/// Routes each inbound wire message to the one role that handles it, by
/// kind: PREPARE/ACCEPT to the Acceptor, PROMISE/ACCEPTED/PROPOSE to the
/// Leader, DECISION to the Replica.
async fn dispatch<S: state::State>(
    mut inbound: mpsc::UnboundedReceiver<Wire<S::Command>>,
    acceptor_tx: mpsc::UnboundedSender<acceptor::In<S::Command>>,
    leader_tx: mpsc::UnboundedSender<leader::In<S::Command>>,
    replica_tx: mpsc::UnboundedSender<replica::In<S>>,
) {
    while let Some(message) = inbound.recv().await {
        match message {
            Wire::Prepare(ballot) => {
                let _ = acceptor_tx.send(acceptor::In::Prepare(ballot));
            }
            Wire::Promise(promise) => {
                let _ = leader_tx.send(leader::In::Promise(promise));
            }
            Wire::Accept(id, pvalue) => {
                let _ = acceptor_tx.send(acceptor::In::Accept(id, pvalue));
            }
            Wire::Accepted(id, accepted) => {
                let _ = leader_tx.send(leader::In::Accepted(id, accepted));
            }
            Wire::Propose(proposal) => {
                let _ = leader_tx.send(leader::In::Propose(proposal));
            }
            Wire::Decision(proposal) => {
                let _ = replica_tx.send(replica::In::Decision(proposal));
            }
        }
    }
}
