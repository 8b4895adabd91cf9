//! The `harness` binary: drives a `chatroom` cluster through a scripted
//! sequence of `Start`/`Connect`/`Get`/`Put`/`Crash`/`Sleep` commands read
//! from a JSON file, speaking the same length-delimited framing
//! `socket::Connection` (and `paxos::client`) use.

use std::collections::HashMap as Map;

use clap::Parser;

mod command;
mod server;
mod socket;

use crate::command::{Command, Execution};

#[derive(Parser)]
#[command(name = "harness")]
struct Opt {
    /// Paxos server binary (the `chatroom-server` produced by `demos/chatroom`).
    #[arg(short, long)]
    server: std::path::PathBuf,

    /// Test script, a JSON-encoded `Execution`.
    #[arg(short, long)]
    file: std::path::PathBuf,

    /// Logging verbosity forwarded to every spawned server.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

async fn run(opt: Opt) {
    let execution: Execution =
        serde_json::from_reader(std::fs::File::open(&opt.file).expect("could not open test file"))
            .expect("could not parse test file");

    let mut servers: Map<usize, server::Server> = Map::default();
    let mut client_ports: Map<usize, u16> = Map::default();
    let mut connections: Map<usize, socket::Connection> = Map::default();
    let mut counter = 0usize;

    for command in execution.0 {
        println!("executing command {:?}", command);
        match command {
            Command::Start { id, base_port, port, count } => {
                servers.insert(id, server::Server::new(&opt.server, id, base_port, port, count, opt.verbose));
                client_ports.insert(id, port);
            }
            Command::Connect { id } => {
                let port = client_ports[&id];
                match socket::Connection::connect(port).await {
                    Ok(connection) => {
                        connections.insert(id, connection);
                    }
                    Err(error) => println!("[ERROR]: could not connect to server {}: {}", id, error),
                }
            }
            Command::Disconnect { id } => {
                connections.remove(&id);
            }
            Command::Get { id } => {
                let Some(connection) = connections.get_mut(&id) else {
                    println!("[ERROR]: not connected to server {}", id);
                    continue;
                };
                let request = chatroom::Command { client_id: id, local_id: counter, mode: chatroom::Mode::Get };
                counter += 1;
                if connection.send(&request).await.is_err() {
                    println!("[ERROR]: failed to send request to server {}", id);
                    continue;
                }
                if let Some(chatroom::Response::Messages(messages)) = connection.replies.recv().await {
                    println!("client {} received message log {:?}", id, messages);
                }
            }
            Command::Put { id, message } => {
                let Some(connection) = connections.get_mut(&id) else {
                    println!("[ERROR]: not connected to server {}", id);
                    continue;
                };
                let request = chatroom::Command { client_id: id, local_id: counter, mode: chatroom::Mode::Put(message) };
                counter += 1;
                if connection.send(&request).await.is_err() {
                    println!("[ERROR]: failed to send request to server {}", id);
                    continue;
                }
                if let Some(chatroom::Response::Appended(slot)) = connection.replies.recv().await {
                    println!("client {} appended at slot {}", id, slot);
                }
            }
            Command::Crash { id } => {
                servers.remove(&id);
                connections.remove(&id);
            }
            Command::Sleep { ms } => {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let opt = Opt::parse();
    run(opt).await
}
