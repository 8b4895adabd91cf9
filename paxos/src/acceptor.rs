//! # Summary
//!
//! The `Acceptor` role: Paxos's distributed memory. Tracks the highest
//! ballot it has promised and the most recently accepted proposal per
//! slot, and replies to every `Prepare`/`Accept` it receives. Acceptors
//! never gossip unsolicited, a pure request/reply server, single owner,
//! no timers.

use hashbrown::HashMap as Map;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::message::{self, Ballot, CommanderId};
use crate::state;
use crate::storage::Storage;
use crate::transport::{Transport, Wire};

/// Inbound messages an Acceptor can receive: p1a from a scout, p2a from a
/// commander.
#[derive(Debug)]
pub enum In<C: state::Command> {
    Prepare(message::Prepare),
    Accept(CommanderId, message::Accept<C>),
}

/// Persisted Acceptor state, optionally written to stable storage before
/// each reply (see `crate::storage`).
#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
#[derive(Derivative)]
#[derivative(Default(bound = ""))]
struct Stable<C: state::Command> {
    /// Highest ballot promised so far. `None` stands in for the
    /// conceptual `(-1, -1)` sentinel: it compares below every `Some(_)`
    /// ballot.
    ballot: Option<Ballot>,
    /// Most recently accepted proposal per slot. Because an acceptor only
    /// ever honors an `Accept` at a ballot `>= ballot`, and `ballot` is
    /// non-decreasing, the ballot recorded here for a given slot is
    /// always the highest one the acceptor has seen for that slot. A map
    /// keyed by slot alone carries the same information as a full
    /// `(Ballot, Slot) -> Proposal` map without ever needing to retain
    /// dominated entries.
    accepted: Map<usize, message::PValue<C>>,
}

fn promised(current: Option<Ballot>, ballot: Ballot) -> bool {
    match current {
        None => true,
        Some(current) => ballot >= current,
    }
}

pub struct Acceptor<C: state::Command> {
    id: usize,
    stable: Stable<C>,
    storage: Option<Storage<Stable<C>>>,
}

impl<C: state::Command> Acceptor<C> {
    /// `storage_dir`, if given, enables crash recovery: `(ballot, accepted)`
    /// is persisted to `<dir>/acceptor-<id>.paxos` before every reply.
    pub fn new(id: usize, storage_dir: Option<&std::path::Path>) -> Self {
        let storage = storage_dir
            .map(|dir| dir.join(format!("acceptor-{:02}.paxos", id)))
            .and_then(|path| match Storage::open(&path) {
                Ok(storage) => Some(storage),
                Err(error) => {
                    log::error!("acceptor {}: failed to open stable storage: {}", id, error);
                    None
                }
            });
        let stable = storage.as_ref().and_then(Storage::load).unwrap_or_default();
        Acceptor { id, stable, storage }
    }

    fn persist(&mut self) {
        if let Some(storage) = self.storage.as_mut() {
            if let Err(error) = storage.save(&self.stable) {
                log::error!("acceptor {}: failed to persist state: {}", self.id, error);
            }
        }
    }

    /// p1a: update the highest-seen ballot and return the promise to
    /// send back to the scout (addressed via `ballot.leader`).
    fn handle_prepare(&mut self, ballot: Ballot) -> (usize, message::Promise<C>) {
        if promised(self.stable.ballot, ballot) {
            self.stable.ballot = Some(ballot);
        }
        self.persist();
        let reply = message::Promise {
            acceptor: self.id,
            requested: ballot,
            ballot: self.stable.ballot.expect("ballot set by promised() above"),
            accepted: self.stable.accepted.values().cloned().collect(),
        };
        (ballot.leader, reply)
    }

    /// p2a: accept `pvalue` if its ballot is at least as high as the one
    /// we last promised. A leader's own scout-adopted ballot must still
    /// be able to drive accepts, so equal is honored too, not just
    /// strictly higher. Return the acceptance to send back to the
    /// commander.
    fn handle_accept(&mut self, commander_id: CommanderId, pvalue: message::PValue<C>) -> (usize, message::Accepted) {
        if promised(self.stable.ballot, pvalue.ballot) {
            self.stable.ballot = Some(pvalue.ballot);
            self.stable.accepted.insert(pvalue.slot, pvalue);
            self.persist();
        }
        let reply = message::Accepted {
            acceptor: self.id,
            ballot: self.stable.ballot.expect("ballot set by promised() above"),
        };
        (commander_id.ballot.leader, reply)
    }
}

/// Runs the Acceptor's event loop until `rx` closes. One inbound message
/// is fully handled (state updated, reply sent) before the next.
pub async fn run<C, T>(mut acceptor: Acceptor<C>, transport: T, mut rx: mpsc::UnboundedReceiver<In<C>>)
where
    C: state::Command,
    T: Transport<C>,
{
    while let Some(message) = rx.recv().await {
        match message {
            In::Prepare(ballot) => {
                let (to, promise) = acceptor.handle_prepare(ballot);
                transport.send(to, Wire::Promise(promise));
            }
            In::Accept(commander_id, pvalue) => {
                let (to, accepted) = acceptor.handle_accept(commander_id, pvalue);
                transport.send(to, Wire::Accepted(commander_id, accepted));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Command as WireCommand;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct TestCommand {
        client: usize,
        local: usize,
        value: u64,
    }

    impl state::Command for TestCommand {
        type ClientId = usize;
        type LocalId = usize;
        fn client_id(&self) -> usize {
            self.client
        }
        fn local_id(&self) -> usize {
            self.local
        }
    }

    fn proposal(slot: usize, ballot: Ballot, client: usize, local: usize, value: u64) -> message::PValue<TestCommand> {
        message::PValue {
            slot,
            ballot,
            command: WireCommand::from(TestCommand { client, local, value }),
        }
    }

    /// S1: PREPARE without adoption of a higher ballot.
    #[test]
    fn s1_prepare_without_adoption() {
        let mut acceptor: Acceptor<TestCommand> = Acceptor::new(0, None);
        acceptor.stable.ballot = Some(Ballot::new(11, 20));

        let (to, promise) = acceptor.handle_prepare(Ballot::new(10, 20));

        assert_eq!(to, 20);
        assert_eq!(promise.ballot, Ballot::new(11, 20));
        assert!(promise.accepted.is_empty());
        assert_eq!(acceptor.stable.ballot, Some(Ballot::new(11, 20)));
    }

    /// S2: PREPARE adopts a fresh ballot from the initial sentinel.
    #[test]
    fn s2_prepare_adopts() {
        let mut acceptor: Acceptor<TestCommand> = Acceptor::new(0, None);
        assert_eq!(acceptor.stable.ballot, None);

        let (to, promise) = acceptor.handle_prepare(Ballot::new(10, 20));

        assert_eq!(to, 20);
        assert_eq!(promise.ballot, Ballot::new(10, 20));
        assert!(promise.accepted.is_empty());
        assert_eq!(acceptor.stable.ballot, Some(Ballot::new(10, 20)));
    }

    /// S3: ACCEPT honored from the initial sentinel.
    #[test]
    fn s3_accept_honored() {
        let mut acceptor: Acceptor<TestCommand> = Acceptor::new(0, None);
        let ballot = Ballot::new(10, 20);
        let pvalue = proposal(8, ballot, 99, 1, 42);
        let commander_id = CommanderId { ballot, slot: 8 };

        let (to, accepted) = acceptor.handle_accept(commander_id, pvalue.clone());

        assert_eq!(to, 20);
        assert_eq!(accepted.ballot, ballot);
        assert_eq!(acceptor.stable.ballot, Some(ballot));
        assert_eq!(acceptor.stable.accepted.get(&8), Some(&pvalue));
    }

    /// S4: ACCEPT rejected by a higher standing promise.
    #[test]
    fn s4_accept_rejected_by_higher_promise() {
        let mut acceptor: Acceptor<TestCommand> = Acceptor::new(0, None);
        acceptor.stable.ballot = Some(Ballot::new(11, 20));
        let ballot = Ballot::new(10, 20);
        let pvalue = proposal(8, ballot, 99, 1, 42);
        let commander_id = CommanderId { ballot, slot: 8 };

        let (to, accepted) = acceptor.handle_accept(commander_id, pvalue);

        assert_eq!(to, 20);
        assert_eq!(accepted.ballot, Ballot::new(11, 20));
        assert!(acceptor.stable.accepted.is_empty());
    }

    /// An ACCEPT at an equal ballot is honored (needed so a leader's own
    /// adopted ballot can still drive accepts after its scout completes).
    #[test]
    fn accept_at_equal_ballot_is_honored() {
        let mut acceptor: Acceptor<TestCommand> = Acceptor::new(0, None);
        let ballot = Ballot::new(10, 20);
        acceptor.stable.ballot = Some(ballot);
        let pvalue = proposal(3, ballot, 1, 1, 7);
        let commander_id = CommanderId { ballot, slot: 3 };

        let (_, accepted) = acceptor.handle_accept(commander_id, pvalue.clone());

        assert_eq!(accepted.ballot, ballot);
        assert_eq!(acceptor.stable.accepted.get(&3), Some(&pvalue));
    }
}
