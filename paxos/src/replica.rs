//! # Summary
//!
//! The `Replica` role: sequences client requests into proposals, executes
//! decided slots in order against the user's state machine, deduplicates
//! repeat client requests, and re-proposes any of its own proposals that
//! lost their slot to a different value.
//!
//! A response channel travels with every pending proposal (keyed by the
//! proposal's own `(client, local)` identity via `message::Command`'s
//! `Hash`/`Eq`) rather than through any separate client registry: whichever
//! slot eventually decides a given proposal, the first one it's assigned,
//! or a later one after a re-propose, is what delivers its INVOKED.

use hashbrown::HashMap as Map;
use hashbrown::HashSet as Set;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::message;
use crate::slots::SlotLog;
use crate::state;
use crate::storage::Storage;
use crate::transport::{Transport, Wire};

/// Inbound messages a Replica can receive: a client's own request (with the
/// channel its response should go out on), and a DECISION broadcast by
/// some Commander.
pub enum In<S: state::State> {
    Invoke(S::Command, mpsc::UnboundedSender<S::Response>),
    Decision(message::Proposal<S::Command>),
}

#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
struct Stable<S: state::State> {
    slot_num: usize,
    proposals: SlotLog<message::Command<S::Command>>,
    decisions: SlotLog<message::Command<S::Command>>,
}

impl<S: state::State> Default for Stable<S> {
    fn default() -> Self {
        Stable { slot_num: 0, proposals: SlotLog::new(), decisions: SlotLog::new() }
    }
}

pub struct Replica<S: state::State, T: Transport<S::Command>> {
    address: usize,
    state: S,
    stable: Stable<S>,
    /// Every distinct proposal identity this replica has ever proposed.
    /// A re-propose inserts the same identity again under a new slot, so
    /// this check stays correct across re-proposals without rescanning
    /// `proposals`.
    proposed: Set<message::Command<S::Command>>,
    /// Every distinct proposal identity this replica has ever executed or
    /// skipped as a duplicate, in slot order. An O(1) stand-in for
    /// rescanning every prior decided slot to check for a repeat.
    seen: Set<message::Command<S::Command>>,
    pending: Map<message::Command<S::Command>, mpsc::UnboundedSender<S::Response>>,
    storage: Option<Storage<Stable<S>>>,
    transport: T,
}

impl<S: state::State, T: Transport<S::Command>> Replica<S, T> {
    /// `storage_dir`, if given, enables crash recovery: `(slot_num,
    /// proposals, decisions)` is persisted to `<dir>/replica-<id>.paxos`
    /// on every update, and decided slots are replayed into a fresh `S`
    /// on startup.
    pub fn new(transport: T, storage_dir: Option<&std::path::Path>) -> Self {
        let address = transport.address();
        let storage = storage_dir
            .map(|dir| dir.join(format!("replica-{:02}.paxos", address)))
            .and_then(|path| match Storage::open(&path) {
                Ok(storage) => Some(storage),
                Err(error) => {
                    log::error!("replica {}: failed to open stable storage: {}", address, error);
                    None
                }
            });
        let stable: Stable<S> = storage.as_ref().and_then(Storage::load).unwrap_or_default();

        let mut state = S::default();
        let mut seen = Set::default();
        for slot in 0..stable.slot_num {
            if let Some(decided) = stable.decisions.get(slot) {
                if seen.insert(decided.clone()) {
                    state.execute(slot, decided.clone().into_inner());
                }
            }
        }
        let proposed = stable.proposals.values().cloned().collect();

        Replica { address, state, stable, proposed, seen, pending: Map::default(), storage, transport }
    }

    fn persist(&mut self) {
        if let Some(storage) = self.storage.as_mut() {
            if let Err(error) = storage.save(&self.stable) {
                log::error!("replica {}: failed to persist state: {}", self.address, error);
            }
        }
    }

    /// do_INVOKE.
    fn do_invoke(&mut self, command: S::Command, response: mpsc::UnboundedSender<S::Response>) {
        let proposal = message::Command::from(command);
        if self.proposed.contains(&proposal) {
            return;
        }
        self.pending.insert(proposal.clone(), response);
        self.propose(proposal);
    }

    /// Assigns `proposal` the next free slot (one past the highest slot
    /// written in either `proposals` or `decisions`) and broadcasts
    /// PROPOSE to every Leader.
    fn propose(&mut self, proposal: message::Command<S::Command>) {
        let slot = self.stable.proposals.len().max(self.stable.decisions.len());
        self.stable.proposals.insert(slot, proposal.clone());
        self.proposed.insert(proposal.clone());
        self.persist();
        log::info!("replica {}: proposing {:?} for slot {}", self.address, proposal, slot);
        self.transport.broadcast(Wire::Propose(message::Proposal { slot, command: proposal }));
    }

    /// do_DECISION.
    fn do_decision(&mut self, slot: usize, proposal: message::Command<S::Command>) {
        match self.stable.decisions.get(slot) {
            Some(existing) => assert_eq!(
                *existing, proposal,
                "replica {}: conflicting decisions for slot {}: {:?} vs {:?}",
                self.address, slot, existing, proposal
            ),
            None => {
                self.stable.decisions.insert(slot, proposal);
                self.persist();
            }
        }
        self.drain();
    }

    fn drain(&mut self) {
        while let Some(decided) = self.stable.decisions.get(self.stable.slot_num).cloned() {
            if let Some(mine) = self.stable.proposals.get(self.stable.slot_num) {
                if *mine != decided {
                    let lost = mine.clone();
                    self.propose(lost);
                }
            }
            if self.seen.insert(decided.clone()) {
                self.perform(decided);
            }
            self.stable.slot_num += 1;
            self.persist();
        }
    }

    fn perform(&mut self, command: message::Command<S::Command>) {
        let slot = self.stable.slot_num;
        log::info!("replica {}: executing {:?} in slot {}", self.address, command, slot);
        let response = self.pending.remove(&command);
        let output = self.state.execute(slot, command.into_inner());
        if let Some(tx) = response {
            let _ = tx.send(output);
        }
    }
}

/// Runs the Replica's event loop until `rx` closes.
pub async fn run<S, T>(mut replica: Replica<S, T>, mut rx: mpsc::UnboundedReceiver<In<S>>)
where
    S: state::State,
    T: Transport<S::Command>,
{
    while let Some(message) = rx.recv().await {
        match message {
            In::Invoke(command, response) => replica.do_invoke(command, response),
            In::Decision(proposal) => replica.do_decision(proposal.slot, proposal.command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::local;

    #[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct Echo {
        client: usize,
        local: usize,
        value: u64,
    }

    impl state::Command for Echo {
        type ClientId = usize;
        type LocalId = usize;
        fn client_id(&self) -> usize {
            self.client
        }
        fn local_id(&self) -> usize {
            self.local
        }
    }

    #[derive(Default)]
    struct Sum(u64);

    impl state::State for Sum {
        type Command = Echo;
        type Response = u64;
        fn execute(&mut self, _slot: usize, command: Echo) -> u64 {
            self.0 += command.value;
            self.0
        }
    }

    fn command(client: usize, local: usize, value: u64) -> message::Command<Echo> {
        message::Command::from(Echo { client, local, value })
    }

    fn replica() -> Replica<Sum, local::Local<Echo>> {
        let transport = local::cluster::<Echo>(1).remove(0).0;
        Replica::new(transport, None)
    }

    #[test]
    fn duplicate_invoke_is_not_reproposed() {
        let mut replica = replica();
        let (tx, _rx) = mpsc::unbounded_channel();
        replica.do_invoke(Echo { client: 1, local: 1, value: 5 }, tx);
        assert_eq!(replica.stable.proposals.len(), 1);

        let (tx2, _rx2) = mpsc::unbounded_channel();
        replica.do_invoke(Echo { client: 1, local: 1, value: 5 }, tx2);
        assert_eq!(replica.stable.proposals.len(), 1);
    }

    /// S6: a replica's own proposal loses its slot to a different value:
    /// it re-proposes at a fresh slot, and the decided value executes.
    #[test]
    fn s6_reproposes_lost_value() {
        let mut replica = replica();
        let p1 = command(1, 1, 10);
        let p2 = command(2, 1, 99);
        let (tx, _rx) = mpsc::unbounded_channel();
        replica.pending.insert(p1.clone(), tx);
        replica.stable.proposals.insert(0, p1.clone());
        replica.proposed.insert(p1.clone());

        replica.do_decision(0, p2.clone());

        assert_eq!(replica.stable.decisions.get(0), Some(&p2));
        assert_eq!(replica.stable.slot_num, 1);
        // the lost proposal was re-assigned to slot 1
        assert_eq!(replica.stable.proposals.get(1), Some(&p1));
    }

    #[test]
    fn executing_a_decision_delivers_response_and_advances_slot() {
        let mut replica = replica();
        let p = command(1, 1, 7);
        let (tx, mut rx) = mpsc::unbounded_channel();
        replica.pending.insert(p.clone(), tx);
        replica.stable.proposals.insert(0, p.clone());
        replica.proposed.insert(p.clone());

        replica.do_decision(0, p);

        assert_eq!(replica.stable.slot_num, 1);
        assert_eq!(rx.try_recv(), Ok(7));
    }

    #[test]
    #[should_panic]
    fn conflicting_decisions_for_the_same_slot_panics() {
        let mut replica = replica();
        replica.do_decision(0, command(1, 1, 1));
        replica.do_decision(0, command(2, 1, 2));
    }

    #[test]
    fn duplicate_decision_across_slots_executes_once() {
        let mut replica = replica();
        let p = command(1, 1, 3);
        replica.do_decision(0, p.clone());
        // A second round decides the same proposal again at slot 1 (e.g.
        // after a leader change during re-propose).
        replica.do_decision(1, p);
        assert_eq!(replica.stable.slot_num, 2);
        assert_eq!(replica.state.0, 3);
    }
}
