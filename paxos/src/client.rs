//! # Summary
//!
//! The server-to-client half of a cluster member: accepting connections
//! from clients and forwarding each decoded command into the local
//! `Replica`'s invoke handler, then relaying whatever response eventually
//! comes back. Generic over any `state::State`, unlike the member-to-member
//! `transport` module, so every demo built on this crate gets client
//! connectivity for free.
//!
//! Framing matches `transport::tcp`: length-delimited, bincode-encoded.
//! A client may pipeline any number of in-flight requests on one
//! connection; responses are written back in whatever order they are
//! decided, not necessarily request order, since that's the only order
//! the replicated log can promise.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use futures::{SinkExt, StreamExt};

use crate::error::TransportError;
use crate::node::Node;
use crate::state;
use crate::transport::Transport;

/// Binds `addr` and serves client connections against `node` until the
/// listener itself fails. Each connection is handled independently;
/// one client disconnecting never affects another.
pub async fn serve<S, T>(addr: SocketAddr, node: Arc<Node<S, T>>) -> Result<(), TransportError>
where
    S: state::State,
    T: Transport<S::Command>,
{
    let listener = TcpListener::bind(addr).await?;
    loop {
        let (stream, peer) = listener.accept().await?;
        log::debug!("client listener: accepted connection from {}", peer);
        let node = Arc::clone(&node);
        tokio::spawn(handle(stream, node));
    }
}

async fn handle<S, T>(stream: TcpStream, node: Arc<Node<S, T>>)
where
    S: state::State,
    T: Transport<S::Command>,
{
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, LengthDelimitedCodec::new());
    let mut writer = FramedWrite::new(write_half, LengthDelimitedCodec::new());
    let (response_tx, mut response_rx) = mpsc::unbounded_channel::<S::Response>();

    loop {
        tokio::select! {
            frame = reader.next() => {
                match frame {
                    Some(Ok(bytes)) => match bincode::deserialize::<S::Command>(&bytes) {
                        Ok(command) => node.invoke(command, response_tx.clone()),
                        Err(error) => log::warn!("client listener: dropping undecodable command: {}", error),
                    },
                    Some(Err(error)) => {
                        log::debug!("client listener: read error, closing connection: {}", error);
                        return;
                    }
                    None => return,
                }
            }
            response = response_rx.recv() => {
                let response = match response {
                    Some(response) => response,
                    // response_tx is also held by this task, so recv never returns None.
                    None => return,
                };
                match bincode::serialize(&response) {
                    Ok(bytes) => {
                        if let Err(error) = writer.send(bytes.into()).await {
                            log::debug!("client listener: write error, closing connection: {}", error);
                            return;
                        }
                    }
                    Err(error) => log::error!("client listener: failed to encode response: {}", error),
                }
            }
        }
    }
}
