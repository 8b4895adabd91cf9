//! A persistent connection to one `chatroom-server`'s client port: a
//! length-delimited, bincode-encoded stream, matching the framing
//! `paxos::client` speaks on the server side. Replies are drained by a
//! background task into an unbounded channel so the harness's command
//! loop never blocks waiting for one in-flight reply before issuing the
//! next command.

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

pub struct Connection {
    writer: FramedWrite<tokio::net::tcp::OwnedWriteHalf, LengthDelimitedCodec>,
    reader: tokio::task::JoinHandle<()>,
    pub replies: mpsc::UnboundedReceiver<chatroom::Response>,
}

impl Connection {
    pub async fn connect(port: u16) -> std::io::Result<Self> {
        let stream = TcpStream::connect(format!("127.0.0.1:{}", port)).await?;
        let (read_half, write_half) = stream.into_split();
        let writer = FramedWrite::new(write_half, LengthDelimitedCodec::new());
        let mut framed_reader = FramedRead::new(read_half, LengthDelimitedCodec::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            while let Some(Ok(bytes)) = framed_reader.next().await {
                if let Ok(response) = decode(bytes) {
                    let _ = tx.send(response);
                }
            }
        });
        Ok(Connection { writer, reader, replies: rx })
    }

    pub async fn send(&mut self, command: &chatroom::Command) -> Result<(), bincode::Error> {
        let bytes = bincode::serialize(command)?;
        self.writer.send(bytes.into()).await.map_err(|_| bincode::ErrorKind::Custom("connection closed".into()))?;
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn decode(bytes: BytesMut) -> Result<chatroom::Response, bincode::Error> {
    bincode::deserialize(&bytes)
}
