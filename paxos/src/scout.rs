//! # Summary
//!
//! The `Scout` role: a short-lived task that tries to get a single ballot
//! adopted by a majority of acceptors. Spawned by the `Leader` whenever it
//! needs a fresh ballot (startup, or after a preemption); reports back
//! exactly once, either `Adopted` (with the union of accepted pvalues the
//! quorum reported) or `Preempted` (with the higher ballot an acceptor
//! revealed), and then exits.

use hashbrown::HashMap as Map;
use hashbrown::HashSet as Set;
use tokio::sync::mpsc;
use tokio::time;

use crate::leader;
use crate::message::{self, Ballot};
use crate::state;
use crate::transport::{self, Transport, Wire};

/// Scouts only ever receive PROMISE.
pub type In<C> = message::Promise<C>;

/// What a scout tells its leader once it stops running.
#[derive(Debug)]
pub enum Finished<C: state::Command> {
    Adopted {
        ballot: Ballot,
        pvals: Vec<message::PValue<C>>,
    },
    Preempted(Ballot),
}

struct Scout<C: state::Command> {
    ballot: Ballot,
    quorum: usize,
    /// Union of accepted `(ballot, slot)` entries reported by a matching
    /// PROMISE, keyed so a later PROMISE for the same key simply
    /// overwrites (entries for one key never actually differ, since an
    /// acceptor records at most one accepted value per key).
    pvals: Map<(Ballot, usize), message::PValue<C>>,
    matched: Set<usize>,
    waiting: Set<usize>,
}

impl<C: state::Command> Scout<C> {
    fn new(ballot: Ballot, cluster_size: usize) -> Self {
        Scout {
            ballot,
            quorum: transport::quorum(cluster_size),
            pvals: Map::default(),
            matched: Set::default(),
            waiting: (0..cluster_size).collect(),
        }
    }

    /// Returns `Some` once the scout should stop: either quorum was
    /// reached, or an acceptor revealed a higher ballot. A promise that
    /// answers a since-superseded `Prepare` (its `requested` ballot isn't
    /// this scout's own) is silently dropped.
    fn handle_promise(&mut self, promise: message::Promise<C>) -> Option<Finished<C>> {
        if promise.requested != self.ballot {
            return None;
        }
        if promise.ballot > self.ballot {
            return Some(Finished::Preempted(promise.ballot));
        }
        self.waiting.remove(&promise.acceptor);
        if self.matched.insert(promise.acceptor) {
            for pvalue in promise.accepted {
                self.pvals.insert((pvalue.ballot, pvalue.slot), pvalue);
            }
        }
        if self.matched.len() >= self.quorum {
            Some(Finished::Adopted {
                ballot: self.ballot,
                pvals: self.pvals.drain().map(|(_, v)| v).collect(),
            })
        } else {
            None
        }
    }
}

/// Runs a scout for `ballot` until it adopts or is preempted, reporting the
/// outcome to `leader_tx`. Waits `delay` before its first PREPARE broadcast,
/// then rebroadcasts to every acceptor that hasn't yet matched on every tick
/// of `period` after that.
pub async fn run<C, T>(
    ballot: Ballot,
    cluster_size: usize,
    delay: std::time::Duration,
    period: std::time::Duration,
    transport: T,
    leader_tx: mpsc::UnboundedSender<leader::In<C>>,
    mut rx: mpsc::UnboundedReceiver<In<C>>,
) where
    C: state::Command,
    T: Transport<C>,
{
    let mut scout = Scout::new(ballot, cluster_size);
    let mut tick = time::interval_at(time::Instant::now() + delay, period);

    let finished = loop {
        tokio::select! {
            _ = tick.tick() => {
                transport.narrowcast(scout.waiting.iter().copied(), Wire::Prepare(ballot));
            }
            message = rx.recv() => {
                let promise = match message {
                    Some(promise) => promise,
                    None => return,
                };
                if let Some(finished) = scout.handle_promise(promise) {
                    break finished;
                }
            }
        }
    };

    let _ = leader_tx.send(leader::In::ScoutFinished(finished));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Command as WireCommand;

    #[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct TestCommand {
        client: usize,
        local: usize,
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

    fn promise(acceptor: usize, requested: Ballot, ballot: Ballot) -> message::Promise<TestCommand> {
        message::Promise { acceptor, requested, ballot, accepted: Vec::new() }
    }

    /// S5: scout quorum in a 3-member cluster (quorum = 2).
    #[test]
    fn s5_scout_quorum() {
        let ballot = Ballot::new(0, 0);
        let mut scout: Scout<TestCommand> = Scout::new(ballot, 3);

        assert!(scout.handle_promise(promise(0, ballot, ballot)).is_none());
        match scout.handle_promise(promise(1, ballot, ballot)) {
            Some(Finished::Adopted { ballot: b, pvals }) => {
                assert_eq!(b, ballot);
                assert!(pvals.is_empty());
            }
            other => panic!("expected Adopted, got {:?}", other),
        }
    }

    #[test]
    fn stale_promise_for_superseded_ballot_is_dropped() {
        let ballot = Ballot::new(5, 0);
        let mut scout: Scout<TestCommand> = Scout::new(ballot, 3);
        let stale = promise(0, Ballot::new(1, 0), Ballot::new(1, 0));
        assert!(scout.handle_promise(stale).is_none());
        assert!(scout.waiting.contains(&0));
    }

    #[test]
    fn higher_ballot_preempts() {
        let ballot = Ballot::new(0, 0);
        let mut scout: Scout<TestCommand> = Scout::new(ballot, 3);
        let higher = Ballot::new(1, 2);
        match scout.handle_promise(promise(0, ballot, higher)) {
            Some(Finished::Preempted(b)) => assert_eq!(b, higher),
            other => panic!("expected Preempted, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_promise_from_same_acceptor_does_not_double_count() {
        let ballot = Ballot::new(0, 0);
        let mut scout: Scout<TestCommand> = Scout::new(ballot, 5); // quorum = 3
        assert!(scout.handle_promise(promise(0, ballot, ballot)).is_none());
        assert!(scout.handle_promise(promise(0, ballot, ballot)).is_none());
        assert!(scout.handle_promise(promise(1, ballot, ballot)).is_none());
        assert!(scout.handle_promise(promise(2, ballot, ballot)).is_some());
    }
}
