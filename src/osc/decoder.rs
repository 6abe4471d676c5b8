//! Message decoder - OSC address + arguments to a typed field update
//!
//! Dispatch is an exact-match table over the tracked status addresses. No
//! pattern matching is performed. Only the first argument is consumed.

use rosc::{OscMessage, OscPacket, OscType};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::state::{Field, FieldKind, FieldUpdate, FieldValue};

/// How boolean fields interpret their argument
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanCoercion {
    /// Only an OSC `true` literal (type tag `T`) is true
    #[default]
    Strict,
    /// Non-zero numbers, non-empty strings and `true` are true
    Truthy,
}

impl BooleanCoercion {
    pub fn coerce(self, arg: &OscType) -> bool {
        match self {
            BooleanCoercion::Strict => matches!(arg, OscType::Bool(true)),
            BooleanCoercion::Truthy => is_truthy(arg),
        }
    }
}

/// Outcome of decoding one message
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Message targets a tracked field
    Update(FieldUpdate),
    /// Address outside the tracked surface; expected noise
    Unrecognized,
}

/// Exact-match lookup of the field reported on `address`
pub fn field_for_address(address: &str) -> Option<Field> {
    Field::all().iter().copied().find(|f| f.address() == address)
}

/// Decode one OSC message into a field update
///
/// Unrecognized addresses are not an error. A tracked address with no
/// arguments fails with `MalformedMessage`.
pub fn decode(address: &str, args: &[OscType], coercion: BooleanCoercion) -> Result<Decoded> {
    let Some(field) = field_for_address(address) else {
        return Ok(Decoded::Unrecognized);
    };

    let arg = args
        .first()
        .ok_or_else(|| BridgeError::malformed(address, "no arguments"))?;

    let value = match field.kind() {
        FieldKind::String => FieldValue::String(coerce_string(address, arg)?),
        FieldKind::Boolean => FieldValue::Boolean(coercion.coerce(arg)),
    };

    Ok(Decoded::Update(FieldUpdate::new(field, value)))
}

/// Flatten a packet into its messages, depth first, in bundle order
pub fn flatten_packet(packet: OscPacket) -> Vec<OscMessage> {
    match packet {
        OscPacket::Message(msg) => vec![msg],
        OscPacket::Bundle(bundle) => bundle
            .content
            .into_iter()
            .flat_map(flatten_packet)
            .collect(),
    }
}

/// Text fields take strings verbatim; scalars are rendered as text
fn coerce_string(address: &str, arg: &OscType) -> Result<String> {
    match arg {
        OscType::String(s) => Ok(s.clone()),
        OscType::Char(c) => Ok(c.to_string()),
        OscType::Int(i) => Ok(i.to_string()),
        OscType::Long(l) => Ok(l.to_string()),
        OscType::Float(f) => Ok(f.to_string()),
        OscType::Double(d) => Ok(d.to_string()),
        OscType::Bool(b) => Ok(b.to_string()),
        OscType::Nil => Ok(String::new()),
        other => Err(BridgeError::malformed(
            address,
            format!("unsupported argument type for text field: {:?}", other),
        )),
    }
}

fn is_truthy(arg: &OscType) -> bool {
    match arg {
        OscType::Bool(b) => *b,
        OscType::Int(i) => *i != 0,
        OscType::Long(l) => *l != 0,
        OscType::Float(f) => *f != 0.0 && !f.is_nan(),
        OscType::Double(d) => *d != 0.0 && !d.is_nan(),
        OscType::String(s) => !s.is_empty(),
        OscType::Char(_) => true,
        OscType::Nil => false,
        // Impulse, blobs, timetags, colors, MIDI and arrays are objects
        _ => true,
    }
}
