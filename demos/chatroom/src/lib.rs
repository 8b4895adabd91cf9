//! # Summary
//!
//! A minimal chat log built on top of `paxos::State`: `Get` returns the
//! full message history, `Put` appends one message.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Command {
    pub client_id: usize,
    pub local_id: usize,
    pub mode: Mode,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Mode {
    Get,
    Put(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Messages(Vec<String>),
    Appended(usize),
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct State {
    messages: Vec<String>,
}

impl paxos::Command for Command {
    type ClientId = usize;
    type LocalId = usize;
    fn client_id(&self) -> usize {
        self.client_id
    }
    fn local_id(&self) -> usize {
        self.local_id
    }
}

impl paxos::State for State {
    type Command = Command;
    type Response = Response;
    fn execute(&mut self, slot: usize, command: Command) -> Response {
        match command.mode {
            Mode::Get => Response::Messages(self.messages.clone()),
            Mode::Put(message) => {
                self.messages.push(message);
                Response::Appended(slot)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paxos::State as _;

    #[test]
    fn put_appends_and_get_reads_back() {
        let mut state = State::default();
        assert!(matches!(state.execute(0, Command { client_id: 1, local_id: 1, mode: Mode::Put("hi".into()) }), Response::Appended(0)));
        match state.execute(1, Command { client_id: 1, local_id: 2, mode: Mode::Get }) {
            Response::Messages(messages) => assert_eq!(messages, vec!["hi".to_string()]),
            other => panic!("expected Messages, got {:?}", other),
        }
    }
}
