//! # Summary
//!
//! The `Commander` role: a short-lived task that drives a single
//! `(ballot, slot, proposal)` to agreement. Spawned by the `Leader` for
//! every slot it proposes while active; reports back exactly once, either
//! by broadcasting the DECISION (quorum reached) or by telling its leader
//! it was preempted, and then exits.

use hashbrown::HashSet as Set;
use tokio::sync::mpsc;
use tokio::time;

use crate::leader;
use crate::message::{self, Ballot, CommanderId};
use crate::state;
use crate::transport::{self, Transport, Wire};

/// Commanders only ever receive ACCEPTED.
pub type In = message::Accepted;

struct Commander {
    id: CommanderId,
    quorum: usize,
    matched: Set<usize>,
    waiting: Set<usize>,
}

impl Commander {
    fn new(id: CommanderId, cluster_size: usize) -> Self {
        Commander {
            id,
            quorum: transport::quorum(cluster_size),
            matched: Set::default(),
            waiting: (0..cluster_size).collect(),
        }
    }

    /// Returns `Ok(true)` once quorum is reached, `Ok(false)` if there's
    /// nothing more to do yet, or `Err` with the preempting ballot.
    fn handle_accepted(&mut self, accepted: message::Accepted) -> Result<bool, Ballot> {
        if accepted.ballot > self.id.ballot {
            return Err(accepted.ballot);
        }
        self.waiting.remove(&accepted.acceptor);
        self.matched.insert(accepted.acceptor);
        Ok(self.matched.len() >= self.quorum)
    }
}

/// Runs a commander for `(ballot, slot, proposal)` until it decides or is
/// preempted. Rebroadcasts ACCEPT to unresponsive acceptors on every tick
/// of `period`.
pub async fn run<C, T>(
    pvalue: message::PValue<C>,
    cluster_size: usize,
    period: std::time::Duration,
    transport: T,
    leader_tx: mpsc::UnboundedSender<leader::In<C>>,
    mut rx: mpsc::UnboundedReceiver<In>,
) where
    C: state::Command,
    T: Transport<C>,
{
    let id = CommanderId { ballot: pvalue.ballot, slot: pvalue.slot };
    let mut commander = Commander::new(id, cluster_size);
    let mut tick = time::interval(period);

    transport.narrowcast(commander.waiting.iter().copied(), Wire::Accept(id, pvalue.clone()));

    loop {
        tokio::select! {
            _ = tick.tick() => {
                transport.narrowcast(commander.waiting.iter().copied(), Wire::Accept(id, pvalue.clone()));
            }
            message = rx.recv() => {
                let accepted = match message {
                    Some(accepted) => accepted,
                    None => return,
                };
                match commander.handle_accepted(accepted) {
                    Ok(false) => continue,
                    Ok(true) => {
                        let decision = message::Proposal { slot: pvalue.slot, command: pvalue.command.clone() };
                        transport.broadcast(Wire::Decision(decision));
                        let _ = leader_tx.send(leader::In::CommanderDone(id));
                        return;
                    }
                    Err(ballot) => {
                        let _ = leader_tx.send(leader::In::CommanderFinished(id, ballot));
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(acceptor: usize, ballot: Ballot) -> message::Accepted {
        message::Accepted { acceptor, ballot }
    }

    #[test]
    fn reaches_quorum_in_three_member_cluster() {
        let id = CommanderId { ballot: Ballot::new(0, 0), slot: 4 };
        let mut commander = Commander::new(id, 3);
        assert_eq!(commander.handle_accepted(accepted(0, id.ballot)), Ok(false));
        assert_eq!(commander.handle_accepted(accepted(1, id.ballot)), Ok(true));
    }

    #[test]
    fn higher_ballot_preempts() {
        let id = CommanderId { ballot: Ballot::new(0, 0), slot: 4 };
        let mut commander = Commander::new(id, 3);
        let higher = Ballot::new(1, 1);
        assert_eq!(commander.handle_accepted(accepted(0, higher)), Err(higher));
    }
}
