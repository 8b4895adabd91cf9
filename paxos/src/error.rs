//! # Summary
//!
//! Narrow error types for the boundaries where failure is actually
//! recoverable: wire encoding/decoding and stable-storage I/O. Protocol
//! invariant violations are not represented here, they are modeled as
//! `panic!`, since a conflicting decision for the same slot is a bug
//! rather than a condition a caller can meaningfully handle (see
//! `Replica::do_decision`).

/// Failure decoding or transmitting a message at the transport boundary.
/// The core protocol never observes this type: `transport::Tcp` logs and
/// drops the offending frame, which is indistinguishable from ordinary
/// message loss as far as Acceptor/Scout/Commander/Leader/Replica are
/// concerned.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] bincode::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[source] bincode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure reading or writing stable storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to open stable storage at {path}: {source}")]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize stable state: {0}")]
    Serialize(#[source] bincode::Error),

    #[error("failed to write stable state: {0}")]
    Write(#[source] std::io::Error),
}
