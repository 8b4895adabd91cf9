//! An in-process, full-mesh `Transport` backed by one `mpsc` channel per
//! member. Used by the core crate's own tests to drive the protocol
//! without touching a real socket; `demos/harness` uses the same idea one
//! level up, over real TCP, via `super::tcp`.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::state;

use super::{Transport, Wire};

/// A handle to one member of a local cluster. Sending to `self.address()`
/// loops back through the same channel as any other member; there is no
/// shortcut that skips the mesh.
pub struct Local<C: state::Command> {
    address: usize,
    senders: Arc<Vec<mpsc::UnboundedSender<Wire<C>>>>,
}

impl<C: state::Command> Clone for Local<C> {
    fn clone(&self) -> Self {
        Local { address: self.address, senders: Arc::clone(&self.senders) }
    }
}

impl<C: state::Command> Transport<C> for Local<C> {
    fn address(&self) -> usize {
        self.address
    }

    fn cluster_size(&self) -> usize {
        self.senders.len()
    }

    fn send(&self, to: usize, message: Wire<C>) {
        if let Some(sender) = self.senders.get(to) {
            // A receiver dropped (its member shut down) is not an error.
            // Delivery is best-effort.
            let _ = sender.send(message);
        }
    }
}

/// Builds a `size`-member cluster, returning each member's `Transport`
/// handle paired with the receiving end it should feed into its dispatch
/// loop.
pub fn cluster<C: state::Command>(size: usize) -> Vec<(Local<C>, mpsc::UnboundedReceiver<Wire<C>>)> {
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| mpsc::unbounded_channel()).unzip();
    let senders = Arc::new(senders);
    receivers
        .into_iter()
        .enumerate()
        .map(|(address, rx)| (Local { address, senders: Arc::clone(&senders) }, rx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct TestCommand;

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

    #[tokio::test]
    async fn broadcast_reaches_every_member_including_self() {
        let mut members = cluster::<TestCommand>(3);
        let (transport, mut rx0) = members.remove(0);
        transport.broadcast(Wire::Prepare(crate::message::Ballot::new(1, 0)));

        assert!(matches!(rx0.recv().await, Some(Wire::Prepare(_))));
        let (transport1, mut rx1) = members.remove(0);
        drop(transport1);
        assert!(matches!(rx1.recv().await, Some(Wire::Prepare(_))));
    }

    #[tokio::test]
    async fn send_to_unknown_address_is_silently_dropped() {
        let members = cluster::<TestCommand>(1);
        let (transport, _rx) = &members[0];
        transport.send(5, Wire::Prepare(crate::message::Ballot::new(1, 0)));
    }
}
