use std::time::Duration;

use thiserror::Error;

/// Announcement or lookup failure. Fatal to `Session::join`.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to set up the network stack: {0}")]
    Setup(String),
    #[error("failed to listen on `{addr}`: {reason}")]
    Listen { addr: String, reason: String },
    #[error("failed to announce room topic: {0}")]
    Announce(String),
    #[error("room announcement did not complete within {0:?}")]
    AnnounceTimeout(Duration),
    #[error("network event stream ended before the room was announced")]
    Interrupted,
}

/// Malformed inbound bytes. The record is dropped, the connection stays open.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("chat record is missing `{0}`")]
    MissingField(&'static str),
    #[error("unsupported record type `{0}`")]
    UnknownType(String),
}

/// A single peer's write failed. That peer is skipped for this broadcast only.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("connection to {0} is closed")]
    Closed(String),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fault reported by the underlying stream. Never removes a peer on its own.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("outbound frame to {peer} failed: {reason}")]
    Outbound { peer: String, reason: String },
    #[error("inbound frame from {peer} failed: {reason}")]
    Inbound { peer: String, reason: String },
    #[error("connection to {peer} closed with error: {reason}")]
    Closed { peer: String, reason: String },
}

impl From<Box<dyn std::error::Error>> for DiscoveryError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        DiscoveryError::Setup(err.to_string())
    }
}
