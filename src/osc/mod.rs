//! OSC message decoding
//!
//! Maps inbound OSC addresses and arguments to typed field updates.

pub mod decoder;

pub use decoder::{decode, flatten_packet, BooleanCoercion, Decoded};
