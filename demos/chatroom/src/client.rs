//! The `chatroom-client` binary: an interactive REPL that connects to
//! one cluster member's client port and issues `connect`/`disconnect`/
//! `get`/`put` commands, speaking the same length-delimited framing
//! `paxos::client` uses on the server side.

use std::io::Write;

use bytes::BytesMut;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

enum Input {
    Connect { port: u16 },
    Disconnect,
    Get,
    Put { message: String },
    Help,
}

fn usage() {
    println!(
        "{}",
        concat!(
            "--------------------------------------------------------------\n",
            "Possible commands:\n",
            "connect <PORT> | c <PORT>  -- Connect to server at <PORT>\n",
            "disconnect     | d         -- Disconnect from current server\n",
            "get            | g         -- Get chat log from current server\n",
            "put <MSG>      | p <MSG>   -- Write <MSG> to current server\n",
            "--------------------------------------------------------------",
        )
    );
}

impl std::str::FromStr for Input {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut iter = s.trim().splitn(2, ' ');
        match iter.next() {
            Some("help") | Some("h") => Ok(Input::Help),
            Some("get") | Some("g") => Ok(Input::Get),
            Some("disconnect") | Some("d") => Ok(Input::Disconnect),
            Some("connect") | Some("c") => {
                iter.next().ok_or(()).and_then(|port| port.parse().map_err(|_| ())).map(|port| Input::Connect { port })
            }
            Some("put") | Some("p") => iter.next().map(|message| Input::Put { message: message.to_string() }).ok_or(()),
            _ => Err(()),
        }
    }
}

struct Connection {
    writer: FramedWrite<tokio::net::tcp::OwnedWriteHalf, LengthDelimitedCodec>,
    // Kept alive for the duration of the connection; replies are drained
    // into `replies` by a background task rather than polled here directly,
    // so the REPL can keep reading stdin between requests.
    _reader: tokio::task::JoinHandle<()>,
    replies: mpsc::UnboundedReceiver<chatroom::Response>,
}

async fn connect(port: u16) -> std::io::Result<Connection> {
    let addr = format!("127.0.0.1:{}", port);
    let stream = TcpStream::connect(&addr).await?;
    let (read_half, write_half) = stream.into_split();
    let writer = FramedWrite::new(write_half, LengthDelimitedCodec::new());
    let mut reader = FramedRead::new(read_half, LengthDelimitedCodec::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        while let Some(Ok(bytes)) = reader.next().await {
            if let Ok(response) = decode(bytes) {
                let _ = tx.send(response);
            }
        }
    });
    Ok(Connection { writer, _reader: task, replies: rx })
}

fn decode(bytes: BytesMut) -> Result<chatroom::Response, bincode::Error> {
    bincode::deserialize(&bytes)
}

async fn run(id: usize) {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut connection: Option<Connection> = None;
    let mut counter = 0usize;

    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            _ => break,
        };
        let Ok(input) = line.parse::<Input>() else {
            println!("[ERROR]: could not parse command");
            continue;
        };
        match input {
            Input::Connect { port } => match connect(port).await {
                Ok(new_connection) => connection = Some(new_connection),
                Err(error) => println!("[ERROR]: could not connect to server: {}", error),
            },
            Input::Disconnect => connection = None,
            Input::Help => usage(),
            Input::Get => {
                let Some(connection) = connection.as_mut() else {
                    println!("[ERROR]: not connected to a server");
                    continue;
                };
                counter += 1;
                let command = chatroom::Command { client_id: id, local_id: counter, mode: chatroom::Mode::Get };
                if send(connection, &command).await.is_err() {
                    println!("[ERROR]: failed to send request");
                    continue;
                }
                if let Some(chatroom::Response::Messages(messages)) = connection.replies.recv().await {
                    println!("[RESPONSE]: {:?}", messages);
                }
            }
            Input::Put { message } => {
                let Some(connection) = connection.as_mut() else {
                    println!("[ERROR]: not connected to a server");
                    continue;
                };
                counter += 1;
                let command = chatroom::Command { client_id: id, local_id: counter, mode: chatroom::Mode::Put(message) };
                if send(connection, &command).await.is_err() {
                    println!("[ERROR]: failed to send request");
                    continue;
                }
                if let Some(chatroom::Response::Appended(slot)) = connection.replies.recv().await {
                    println!("[RESPONSE]: appended at slot {}", slot);
                }
            }
        }
    }
}

async fn send(connection: &mut Connection, command: &chatroom::Command) -> Result<(), ()> {
    let bytes = bincode::serialize(command).map_err(|_| ())?;
    connection.writer.send(bytes.into()).await.map_err(|_| ())
}

#[derive(Parser)]
#[command(name = "chatroom-client")]
struct Opt {
    /// Unique client ID used to tag every request this process sends.
    #[arg(short, long)]
    id: usize,
}

#[tokio::main]
async fn main() {
    let opt = Opt::parse();
    run(opt.id).await
}
