//! Trusted-peer and blacklist control for a P2P node.
//!
//! The daemon in `main.rs` wires these pieces together; everything is exposed
//! here so integration tests can drive the same stack in-process.

pub mod config;
pub mod control;
pub mod error;
pub mod network;
pub mod peer_manager;
pub mod rpc;
pub mod shutdown;

pub use control::{ControlError, PeerControl};
pub use peer_manager::PeerManager;
