//! # Summary
//!
//! This module defines a single replicated Paxos server. A library user
//! creates a `Config` naming their `State` implementation, the TCP
//! addresses of every cluster member, and the address clients should
//! connect to, then calls `run` to launch the Acceptor/Leader/Replica
//! trio behind a real socket `Transport` plus the client-facing listener
//! (`crate::client`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::client;
use crate::error::TransportError;
use crate::node::Node;
use crate::state;
use crate::transport::tcp::{self, Tcp};

const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(750);

/// Defines a single Paxos cluster member with state type `S`, identified
/// by its index into `addrs`.
pub struct Config<S: state::State> {
    address: usize,
    addrs: Vec<SocketAddr>,
    client_addr: SocketAddr,
    timeout: std::time::Duration,
    storage_dir: Option<PathBuf>,
    _marker: std::marker::PhantomData<S>,
}

impl<S: state::State> Config<S> {
    /// Creates a new member at `addrs[address]`, out of a cluster whose
    /// members listen at the other addresses in `addrs`, accepting client
    /// requests at `client_addr`.
    pub fn new(address: usize, addrs: Vec<SocketAddr>, client_addr: SocketAddr) -> Self {
        Config {
            address,
            addrs,
            client_addr,
            timeout: DEFAULT_TIMEOUT,
            storage_dir: None,
            _marker: std::marker::PhantomData,
        }
    }

    /// Configures the retransmission period Scouts and Commanders use for
    /// unanswered Acceptors.
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables crash recovery: Acceptor/Leader/Replica state is persisted
    /// under `dir` and reloaded on the next `run`. Off by default.
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Binds the member-to-member listener, dials every peer, spawns this
    /// member's Acceptor, Leader, and Replica tasks, and spawns the
    /// client-facing listener at `client_addr`. The returned `Node` is
    /// also exposed for callers (e.g. in-process tests) that want to
    /// submit requests without going over a socket.
    pub async fn run(self) -> Result<Arc<Node<S, Tcp<S::Command>>>, TransportError> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let transport = tcp::bind(self.address, self.addrs, inbound_tx).await?;
        let node = Arc::new(Node::spawn(transport, self.timeout, self.storage_dir.as_deref(), inbound_rx));
        let client_addr = self.client_addr;
        let client_node = Arc::clone(&node);
        tokio::spawn(async move {
            if let Err(error) = client::serve(client_addr, client_node).await {
                log::error!("client listener on {}: failed to bind: {}", client_addr, error);
            }
        });
        Ok(node)
    }
}
