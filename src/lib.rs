//! Serverless chat rooms: peers that join the same room name find each other
//! over a Kademlia DHT (or mDNS on the LAN) and exchange JSON records directly.
//!
//! [`network::Session`] is the entry point for front-ends. The transport-free
//! state machine behind it lives in [`session`].

pub mod common;
pub mod config;
pub mod error;
pub mod headless;
pub mod network;
pub mod session;
pub mod ui;
