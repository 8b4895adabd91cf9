//! A real-socket `Transport`: every cluster member dials every other
//! member directly and separately accepts inbound connections, so each
//! ordered pair `(from, to)` has its own one-way TCP connection. Built on
//! `tokio_util`'s length-delimited codec with manual bincode encode/decode.
//!
//! Paxos messages are idempotent under retransmission, so a connection
//! that drops is simply allowed to retry via redial rather than treated
//! as a fatal error.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::error::TransportError;
use crate::state;

use super::{Transport, Wire};

const REDIAL_DELAY: Duration = Duration::from_millis(500);

pub struct Tcp<C: state::Command> {
    address: usize,
    outbound: Arc<Vec<mpsc::UnboundedSender<Wire<C>>>>,
}

impl<C: state::Command> Clone for Tcp<C> {
    fn clone(&self) -> Self {
        Tcp { address: self.address, outbound: Arc::clone(&self.outbound) }
    }
}

impl<C: state::Command> Transport<C> for Tcp<C> {
    fn address(&self) -> usize {
        self.address
    }

    fn cluster_size(&self) -> usize {
        self.outbound.len()
    }

    fn send(&self, to: usize, message: Wire<C>) {
        if let Some(tx) = self.outbound.get(to) {
            let _ = tx.send(message);
        }
    }
}

/// Binds a listener on `addrs[address]`, spawns an accept loop to receive
/// inbound frames from every member, dials every other member to carry
/// outbound frames, and returns once every outbound writer has been
/// spawned (individual dials continue retrying in the background if a
/// peer isn't listening yet).
pub async fn bind<C: state::Command>(
    address: usize,
    addrs: Vec<SocketAddr>,
    inbound: mpsc::UnboundedSender<Wire<C>>,
) -> Result<Tcp<C>, TransportError> {
    let listener = TcpListener::bind(addrs[address]).await?;
    tokio::spawn(accept_loop(address, listener, inbound.clone()));

    let mut outbound = Vec::with_capacity(addrs.len());
    for (peer, &addr) in addrs.iter().enumerate() {
        let (tx, rx) = mpsc::unbounded_channel();
        outbound.push(tx);
        if peer == address {
            tokio::spawn(loopback(rx, inbound.clone()));
        } else {
            tokio::spawn(dial(address, peer, addr, rx));
        }
    }

    Ok(Tcp { address, outbound: Arc::new(outbound) })
}

/// A member's own frames are handed straight back without a socket round
/// trip. A Leader's own Replica is just another cluster member, not a
/// privileged local shortcut.
async fn loopback<C: state::Command>(
    mut rx: mpsc::UnboundedReceiver<Wire<C>>,
    inbound: mpsc::UnboundedSender<Wire<C>>,
) {
    while let Some(message) = rx.recv().await {
        let _ = inbound.send(message);
    }
}

async fn accept_loop<C: state::Command>(
    address: usize,
    listener: TcpListener,
    inbound: mpsc::UnboundedSender<Wire<C>>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                log::debug!("member {}: accepted connection from {}", address, peer);
                tokio::spawn(read_loop(stream, inbound.clone()));
            }
            Err(error) => log::warn!("member {}: accept failed: {}", address, error),
        }
    }
}

/// Connects to `peer` at `addr`, retrying on a fixed delay until it
/// succeeds, then drains `rx` onto the socket until either the channel or
/// the connection closes, redialing if the latter happens first.
async fn dial<C: state::Command>(
    address: usize,
    peer: usize,
    addr: SocketAddr,
    mut rx: mpsc::UnboundedReceiver<Wire<C>>,
) {
    loop {
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(error) => {
                log::debug!("member {}: failed to connect to {} at {}: {}", address, peer, addr, error);
                tokio::time::sleep(REDIAL_DELAY).await;
                continue;
            }
        };
        log::debug!("member {}: connected to {} at {}", address, peer, addr);
        let mut framed = FramedWrite::new(stream, LengthDelimitedCodec::new());
        loop {
            let message = match rx.recv().await {
                Some(message) => message,
                None => return,
            };
            let bytes = match encode(&message) {
                Ok(bytes) => bytes,
                Err(error) => {
                    log::error!("member {}: failed to encode message to {}: {}", address, peer, error);
                    continue;
                }
            };
            if let Err(error) = framed.send(bytes).await {
                log::warn!("member {}: connection to {} dropped: {}", address, peer, error);
                break;
            }
        }
    }
}

async fn read_loop<C: state::Command>(stream: TcpStream, inbound: mpsc::UnboundedSender<Wire<C>>) {
    let mut framed = FramedRead::new(stream, LengthDelimitedCodec::new());
    while let Some(frame) = framed.next().await {
        match frame {
            Ok(bytes) => match decode(bytes) {
                Ok(message) => {
                    let _ = inbound.send(message);
                }
                Err(error) => log::warn!("dropping undecodable frame: {}", error),
            },
            Err(error) => {
                log::debug!("connection read ended: {}", error);
                break;
            }
        }
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Bytes, TransportError> {
    bincode::serialize(value).map(Bytes::from).map_err(TransportError::Encode)
}

fn decode<T: serde::de::DeserializeOwned>(bytes: BytesMut) -> Result<T, TransportError> {
    bincode::deserialize(&bytes).map_err(TransportError::Decode)
}
