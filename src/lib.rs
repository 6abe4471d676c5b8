//! Multiplay bridge
//!
//! Keeps a live, typed snapshot of a Multiplay show-control device's status
//! (elapsed/remaining time, current cue, transport lamps) from its OSC
//! feedback stream, and exposes it as variables and feedback indicators.

pub mod bridge;
pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod listener;
pub mod notifier;
pub mod osc;
pub mod state;

pub use bridge::{InstanceStatus, MultiplayBridge};
pub use error::{BridgeError, Result};
