//! Status field type definitions
//!
//! Defines the fixed set of tracked device fields, their kinds, values and the
//! OSC addresses they are sourced from.

use serde::{Deserialize, Serialize};

/// Kind of value a field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Boolean,
}

/// Tracked device status fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    ElapsedTime,
    RemainingTime,
    CurrentCueDescription,
    StopAllActive,
    FadeAllActive,
    GoActive,
    SelectPrevActive,
    SelectNextActive,
}

impl Field {
    /// All tracked fields, in display order
    pub fn all() -> &'static [Field] {
        &[
            Field::ElapsedTime,
            Field::RemainingTime,
            Field::CurrentCueDescription,
            Field::StopAllActive,
            Field::FadeAllActive,
            Field::GoActive,
            Field::SelectPrevActive,
            Field::SelectNextActive,
        ]
    }

    /// Stable name used by consumers
    pub fn name(&self) -> &'static str {
        match self {
            Field::ElapsedTime => "elapsed time",
            Field::RemainingTime => "remaining time",
            Field::CurrentCueDescription => "current cue description",
            Field::StopAllActive => "stop-all active",
            Field::FadeAllActive => "fade-all active",
            Field::GoActive => "go active",
            Field::SelectPrevActive => "select-previous active",
            Field::SelectNextActive => "select-next active",
        }
    }

    /// Variable id exposed to the control surface
    pub fn variable_id(&self) -> &'static str {
        match self {
            Field::ElapsedTime => "t_elapsed",
            Field::RemainingTime => "t_remain",
            Field::CurrentCueDescription => "q_description",
            Field::StopAllActive => "st_stopAll",
            Field::FadeAllActive => "st_fadeAll",
            Field::GoActive => "st_go",
            Field::SelectPrevActive => "st_prev",
            Field::SelectNextActive => "st_next",
        }
    }

    /// OSC address the device reports this field on
    pub fn address(&self) -> &'static str {
        match self {
            Field::ElapsedTime => "/status/elapsed",
            Field::RemainingTime => "/status/remaining",
            Field::CurrentCueDescription => "/status/current/qdesc",
            Field::StopAllActive => "/status/stopall",
            Field::FadeAllActive => "/status/fadeall",
            Field::GoActive => "/status/go",
            Field::SelectPrevActive => "/status/select/prev",
            Field::SelectNextActive => "/status/select/next",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::ElapsedTime | Field::RemainingTime | Field::CurrentCueDescription => {
                FieldKind::String
            },
            _ => FieldKind::Boolean,
        }
    }

    /// Value a field holds before the device reports anything
    pub fn default_value(&self) -> FieldValue {
        match self.kind() {
            FieldKind::String => FieldValue::String(String::new()),
            FieldKind::Boolean => FieldValue::Boolean(false),
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Current value of a field, typed per `FieldKind`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    String(String),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::String(_) => FieldKind::String,
            FieldValue::Boolean(_) => FieldKind::Boolean,
        }
    }

    /// JSON form used by feedback conditions
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Boolean(b) => serde_json::Value::Bool(*b),
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::String(s) => f.write_str(s),
        }
    }
}

/// A decoded, typed update for one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUpdate {
    pub field: Field,
    pub value: FieldValue,
}

impl FieldUpdate {
    pub fn new(field: Field, value: FieldValue) -> Self {
        Self { field, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_addresses_and_ids_are_unique() {
        let addresses: HashSet<_> = Field::all().iter().map(|f| f.address()).collect();
        let ids: HashSet<_> = Field::all().iter().map(|f| f.variable_id()).collect();
        assert_eq!(addresses.len(), Field::all().len());
        assert_eq!(ids.len(), Field::all().len());
    }

    #[test]
    fn test_default_values_match_kind() {
        for field in Field::all() {
            assert_eq!(field.default_value().kind(), field.kind());
        }
        assert_eq!(
            Field::ElapsedTime.default_value(),
            FieldValue::String(String::new())
        );
        assert_eq!(Field::GoActive.default_value(), FieldValue::Boolean(false));
    }

    #[test]
    fn test_field_serde_names() {
        let field: Field = serde_yaml::from_str("current_cue_description").unwrap();
        assert_eq!(field, Field::CurrentCueDescription);
    }
}
