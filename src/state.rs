//! State management module - live device status
//!
//! Holds the typed value of every tracked Multiplay status field. Written by
//! the OSC message path, read by the variable and feedback layers.

mod store;
mod types;

pub use store::{StateStore, StatusSnapshot};
pub use types::{Field, FieldKind, FieldUpdate, FieldValue};
