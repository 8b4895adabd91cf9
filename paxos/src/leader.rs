//! # Summary
//!
//! The `Leader` role: owns the ballot lifecycle and arbitrates which
//! proposal is driven to agreement in each slot. Spawns at most one live
//! `Scout` (acquiring a ballot) and any number of live `Commander`s (one
//! per slot it is actively proposing for), and routes their replies back
//! in by consulting its own tables rather than through any shared
//! cross-task registry, keeping per-member state single-owner.

use hashbrown::HashMap as Map;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::commander;
use crate::message::{self, Ballot, CommanderId};
use crate::scout;
use crate::slots::SlotLog;
use crate::state;
use crate::storage::Storage;
use crate::transport::Transport;

/// Inbound messages a Leader can receive: a proposal from its own Replica,
/// PROMISE/ACCEPTED forwarded by the Node's dispatch loop, and the
/// termination reports of its own Scout/Commander children.
#[derive(Debug)]
pub enum In<C: state::Command> {
    Propose(message::Proposal<C>),
    Promise(message::Promise<C>),
    Accepted(CommanderId, message::Accepted),
    ScoutFinished(scout::Finished<C>),
    CommanderFinished(CommanderId, Ballot),
    /// A commander reached quorum and broadcast its DECISION; nothing to
    /// retreat from, just bookkeeping so `live.commanders` doesn't grow
    /// without bound over a long-running leadership.
    CommanderDone(CommanderId),
}

/// Persisted Leader state: the current ballot and the slot-indexed
/// proposals it intends (or has already started) to drive to agreement.
#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
struct Stable<C: state::Command> {
    ballot: Ballot,
    proposals: SlotLog<message::Command<C>>,
}

impl<C: state::Command> Stable<C> {
    fn new(address: usize) -> Self {
        Stable { ballot: Ballot::new(0, address), proposals: SlotLog::new() }
    }
}

struct Live<C: state::Command> {
    scout: Option<(Ballot, mpsc::UnboundedSender<scout::In<C>>)>,
    commanders: Map<CommanderId, mpsc::UnboundedSender<commander::In>>,
}

impl<C: state::Command> Default for Live<C> {
    fn default() -> Self {
        Live { scout: None, commanders: Map::default() }
    }
}

pub struct Leader<C: state::Command, T: Transport<C>> {
    address: usize,
    cluster_size: usize,
    period: std::time::Duration,
    /// Delay, in milliseconds, before the next scout's first PREPARE
    /// broadcast. Starts at a small random jitter and grows
    /// multiplicatively on every preemption, so that two leaders racing
    /// to adopt a ballot increasingly diverge in timing instead of
    /// perpetually preempting each other.
    backoff: f32,
    active: bool,
    stable: Stable<C>,
    live: Live<C>,
    storage: Option<Storage<Stable<C>>>,
    transport: T,
    tx: mpsc::UnboundedSender<In<C>>,
}

impl<C: state::Command, T: Transport<C>> Leader<C, T> {
    /// `storage_dir`, if given, enables crash recovery: `(ballot,
    /// proposals)` is persisted to `<dir>/leader-<id>.paxos` on every
    /// update.
    pub fn new(
        transport: T,
        period: std::time::Duration,
        storage_dir: Option<&std::path::Path>,
        tx: mpsc::UnboundedSender<In<C>>,
    ) -> Self {
        let address = transport.address();
        let cluster_size = transport.cluster_size();
        let storage = storage_dir
            .map(|dir| dir.join(format!("leader-{:02}.paxos", address)))
            .and_then(|path| match Storage::open(&path) {
                Ok(storage) => Some(storage),
                Err(error) => {
                    log::error!("leader {}: failed to open stable storage: {}", address, error);
                    None
                }
            });
        let stable = storage.as_ref().and_then(Storage::load).unwrap_or_else(|| Stable::new(address));
        let mut leader = Leader {
            address,
            cluster_size,
            period,
            backoff: 100.0 * rand::random::<f32>(),
            active: false,
            stable,
            live: Live::default(),
            storage,
            transport,
            tx,
        };
        leader.spawn_scout();
        leader
    }

    fn persist(&mut self) {
        if let Some(storage) = self.storage.as_mut() {
            if let Err(error) = storage.save(&self.stable) {
                log::error!("leader {}: failed to persist state: {}", self.address, error);
            }
        }
    }

    fn spawn_scout(&mut self) {
        let ballot = self.stable.ballot;
        let delay = std::time::Duration::from_millis(self.backoff.round() as u64);
        let (scout_tx, scout_rx) = mpsc::unbounded_channel();
        self.live.scout = Some((ballot, scout_tx));
        tokio::spawn(scout::run(
            ballot,
            self.cluster_size,
            delay,
            self.period,
            self.transport.clone(),
            self.tx.clone(),
            scout_rx,
        ));
    }

    fn spawn_commander(&mut self, slot: usize, command: message::Command<C>) {
        let pvalue = message::PValue { slot, ballot: self.stable.ballot, command };
        let id = CommanderId { ballot: pvalue.ballot, slot };
        let (commander_tx, commander_rx) = mpsc::unbounded_channel();
        self.live.commanders.insert(id, commander_tx);
        tokio::spawn(commander::run(
            pvalue,
            self.cluster_size,
            self.period,
            self.transport.clone(),
            self.tx.clone(),
            commander_rx,
        ));
    }

    /// do_PROPOSE: first writer wins locally; the Replica re-proposes on
    /// loss, which is how the correct value eventually converges.
    fn do_propose(&mut self, proposal: message::Proposal<C>) {
        if self.stable.proposals.contains(proposal.slot) {
            return;
        }
        self.stable.proposals.insert(proposal.slot, proposal.command.clone());
        self.persist();
        if self.active {
            self.spawn_commander(proposal.slot, proposal.command);
        }
    }

    /// do_PROMISE: route to the live scout only if its ballot still
    /// matches (a stale channel send is simply ignored by the scout).
    fn do_promise(&self, promise: message::Promise<C>) {
        if let Some((ballot, tx)) = self.live.scout.as_ref() {
            if *ballot == promise.requested {
                let _ = tx.send(promise);
            }
        }
    }

    /// do_ACCEPTED: route to the commander found by `commander_id`; unknown
    /// correlations (a commander that has already finished) are dropped.
    fn do_accepted(&self, id: CommanderId, accepted: message::Accepted) {
        if let Some(tx) = self.live.commanders.get(&id) {
            let _ = tx.send(accepted);
        }
    }

    /// scout_finished: on adoption, install the highest-ballot proposal per
    /// slot (the adopted value always wins over any local guess) and spawn
    /// a commander for every proposed slot; on preemption, delegate to
    /// `preempted`.
    fn scout_finished(&mut self, finished: scout::Finished<C>) {
        self.live.scout = None;
        match finished {
            scout::Finished::Adopted { ballot, pvals } => {
                debug_assert_eq!(ballot, self.stable.ballot);
                for (slot, command) in pmax(pvals) {
                    self.stable.proposals.insert(slot, command);
                }
                self.persist();
                self.active = true;
                let slots: Vec<usize> = self.stable.proposals.iter().map(|(slot, _)| slot).collect();
                for slot in slots {
                    let command = self.stable.proposals.get(&slot).expect("slot listed above").clone();
                    self.spawn_commander(slot, command);
                }
            }
            scout::Finished::Preempted(ballot) => self.preempted(ballot),
        }
    }

    fn commander_finished(&mut self, id: CommanderId, ballot: Ballot) {
        self.live.commanders.remove(&id);
        self.preempted(ballot);
    }

    fn commander_done(&mut self, id: CommanderId) {
        self.live.commanders.remove(&id);
    }

    /// preempted: only a ballot strictly higher than ours forces a retreat.
    /// A stale report from an already-superseded round is a no-op.
    /// Growing `backoff` before respawning spreads out leaders that keep
    /// preempting each other over the same ballot sequence.
    fn preempted(&mut self, other: Ballot) {
        if other <= self.stable.ballot {
            return;
        }
        self.active = false;
        self.stable.ballot = Ballot::new(other.num + 1, self.address);
        self.persist();
        self.backoff *= 1.0 + rand::random::<f32>() / 2.0;
        if self.live.scout.is_none() {
            self.spawn_scout();
        }
    }
}

/// For each slot, pick the `PValue` with the greatest ballot. Iteration
/// order is irrelevant: two entries can never share both a slot and a
/// ballot (an acceptor records at most one accepted value per
/// `(ballot, slot)`), so "greatest wins" is well defined regardless of
/// visitation order. Multi-Paxos requires the highest-ballot value to win
/// adoption per slot; a naive reversed-order overwrite would silently
/// keep the lowest instead, so this picks the max explicitly.
fn pmax<C: state::Command>(
    pvals: Vec<message::PValue<C>>,
) -> impl Iterator<Item = (usize, message::Command<C>)> {
    let mut highest: Map<usize, (Ballot, message::Command<C>)> = Map::default();
    for pvalue in pvals {
        match highest.get_mut(&pvalue.slot) {
            Some((ballot, command)) if pvalue.ballot > *ballot => {
                *ballot = pvalue.ballot;
                *command = pvalue.command;
            }
            Some(_) => {}
            None => {
                highest.insert(pvalue.slot, (pvalue.ballot, pvalue.command));
            }
        }
    }
    highest.into_iter().map(|(slot, (_, command))| (slot, command))
}

/// Runs the Leader's event loop until `rx` closes.
pub async fn run<C, T>(mut leader: Leader<C, T>, mut rx: mpsc::UnboundedReceiver<In<C>>)
where
    C: state::Command,
    T: Transport<C>,
{
    while let Some(message) = rx.recv().await {
        match message {
            In::Propose(proposal) => leader.do_propose(proposal),
            In::Promise(promise) => leader.do_promise(promise),
            In::Accepted(id, accepted) => leader.do_accepted(id, accepted),
            In::ScoutFinished(finished) => leader.scout_finished(finished),
            In::CommanderFinished(id, ballot) => leader.commander_finished(id, ballot),
            In::CommanderDone(id) => leader.commander_done(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::local;

    #[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct TestCommand(u64);

    impl state::Command for TestCommand {
        type ClientId = usize;
        type LocalId = usize;
        fn client_id(&self) -> usize {
            0
        }
        fn local_id(&self) -> usize {
            0
        }
    }

    fn pvalue(slot: usize, ballot: Ballot, value: u64) -> message::PValue<TestCommand> {
        message::PValue { slot, ballot, command: message::Command::from(TestCommand(value)) }
    }

    fn value(command: Option<&message::Command<TestCommand>>) -> u64 {
        command.cloned().expect("slot present").into_inner().0
    }

    #[test]
    fn pmax_picks_highest_ballot_per_slot() {
        let low = Ballot::new(1, 0);
        let high = Ballot::new(2, 0);
        let picked: Map<usize, message::Command<TestCommand>> =
            pmax(vec![pvalue(0, low, 10), pvalue(0, high, 20), pvalue(1, low, 30)]).collect();
        assert_eq!(value(picked.get(&0)), 20);
        assert_eq!(value(picked.get(&1)), 30);
    }

    #[test]
    fn pmax_is_order_independent() {
        let low = Ballot::new(1, 0);
        let high = Ballot::new(2, 0);
        let forward: Map<usize, message::Command<TestCommand>> =
            pmax(vec![pvalue(0, low, 1), pvalue(0, high, 2)]).collect();
        let backward: Map<usize, message::Command<TestCommand>> =
            pmax(vec![pvalue(0, high, 2), pvalue(0, low, 1)]).collect();
        assert_eq!(value(forward.get(&0)), value(backward.get(&0)));
        assert_eq!(value(forward.get(&0)), 2);
    }

    /// S7: a commander reports a higher ballot than the active leader's own.
    #[tokio::test]
    async fn s7_leader_preemption() {
        let address = 0;
        let mut members = local::cluster::<TestCommand>(3);
        let (transport, _rx) = members.remove(address);
        let (tx, _leader_rx) = mpsc::unbounded_channel();
        let mut leader = Leader::new(transport, std::time::Duration::from_millis(50), None, tx);

        leader.stable.ballot = Ballot::new(3, address);
        leader.active = true;
        leader.live.scout = None;

        let commander_id = CommanderId { ballot: Ballot::new(5, 1), slot: 0 };
        leader.commander_finished(commander_id, Ballot::new(5, 1));

        assert!(!leader.active);
        assert_eq!(leader.stable.ballot, Ballot::new(6, address));
        assert!(leader.live.scout.is_some());
    }
}
