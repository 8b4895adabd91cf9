use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Execution(pub Vec<Command>);

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Start a replica with the given parameters.
    Start { id: usize, base_port: u16, port: u16, count: usize },

    /// Connect to the given replica's client port.
    Connect { id: usize },

    /// Disconnect from the given replica.
    Disconnect { id: usize },

    /// Send a GET request to the specified replica.
    Get { id: usize },

    /// Send a PUT request to the specified replica.
    Put { id: usize, message: String },

    /// Crash the specified replica (kill its process).
    Crash { id: usize },

    /// Sleep the test harness for `ms` milliseconds.
    Sleep { ms: u64 },
}
