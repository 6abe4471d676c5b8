//! Feedback indicators evaluated against the status snapshot
//!
//! A feedback is a named boolean derived from one field. The registry runs a
//! full pass on every re-evaluation and remembers the previous result so
//! callers can react to indicators that flipped.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::FeedbackConfig;
use crate::error::{BridgeError, Result};
use crate::state::{Field, FieldKind, StatusSnapshot};

/// Condition under which a feedback is lit
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackCondition {
    /// Boolean field is `true`
    Active,
    /// Field equals the value (strings compared trimmed)
    Equals(Value),
    /// Field is truthy (non-empty string, `true`)
    Truthy,
    /// Field matches any of the values
    In(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackDefinition {
    pub id: String,
    pub field: Field,
    pub condition: FeedbackCondition,
}

impl FeedbackDefinition {
    pub fn new(id: impl Into<String>, field: Field, condition: FeedbackCondition) -> Self {
        Self {
            id: id.into(),
            field,
            condition,
        }
    }

    /// Built-in lamp feedbacks, one per boolean field
    pub fn builtin() -> Vec<FeedbackDefinition> {
        [
            ("stop_all_active", Field::StopAllActive),
            ("fade_all_active", Field::FadeAllActive),
            ("go_active", Field::GoActive),
            ("select_prev_active", Field::SelectPrevActive),
            ("select_next_active", Field::SelectNextActive),
        ]
        .into_iter()
        .map(|(id, field)| FeedbackDefinition::new(id, field, FeedbackCondition::Active))
        .collect()
    }

    pub fn evaluate(&self, snapshot: &StatusSnapshot) -> bool {
        let value = snapshot.get(self.field).to_json();
        match &self.condition {
            FeedbackCondition::Active => value == Value::Bool(true),
            FeedbackCondition::Truthy => match &value {
                Value::Bool(b) => *b,
                Value::Null => false,
                Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
                Value::String(s) => !s.is_empty(),
                Value::Array(a) => !a.is_empty(),
                Value::Object(o) => !o.is_empty(),
            },
            FeedbackCondition::Equals(expected) => values_match(expected, &value),
            FeedbackCondition::In(candidates) => {
                candidates.iter().any(|c| values_match(c, &value))
            },
        }
    }
}

fn values_match(expected: &Value, actual: &Value) -> bool {
    if let (Value::String(a), Value::String(b)) = (expected, actual) {
        a.trim() == b.trim()
    } else {
        expected == actual
    }
}

impl TryFrom<&FeedbackConfig> for FeedbackDefinition {
    type Error = BridgeError;

    fn try_from(cfg: &FeedbackConfig) -> Result<Self> {
        let condition = if let Some(values) = &cfg.in_array {
            FeedbackCondition::In(values.clone())
        } else if let Some(expected) = &cfg.equals {
            FeedbackCondition::Equals(expected.clone())
        } else if cfg.truthy == Some(true) {
            FeedbackCondition::Truthy
        } else if cfg.field.kind() == FieldKind::Boolean {
            FeedbackCondition::Active
        } else {
            return Err(BridgeError::InvalidConfig(format!(
                "feedback '{}' on text field '{}' needs 'equals', 'in' or 'truthy'",
                cfg.id, cfg.field
            )));
        };

        Ok(FeedbackDefinition::new(cfg.id.clone(), cfg.field, condition))
    }
}

/// Registered feedbacks plus their last evaluated state
#[derive(Clone, Default)]
pub struct FeedbackRegistry {
    definitions: Arc<RwLock<Vec<FeedbackDefinition>>>,
    states: Arc<RwLock<BTreeMap<String, bool>>>,
}

impl FeedbackRegistry {
    pub fn new(definitions: Vec<FeedbackDefinition>) -> Self {
        Self {
            definitions: Arc::new(RwLock::new(definitions)),
            states: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Built-in feedbacks followed by configured ones
    pub fn from_config(configs: &[FeedbackConfig]) -> Result<Self> {
        Ok(Self::new(Self::definitions_from_config(configs)?))
    }

    pub fn definitions_from_config(configs: &[FeedbackConfig]) -> Result<Vec<FeedbackDefinition>> {
        let mut definitions = FeedbackDefinition::builtin();
        for cfg in configs {
            definitions.push(FeedbackDefinition::try_from(cfg)?);
        }
        Ok(definitions)
    }

    /// Replace definitions, dropping remembered states
    pub fn replace(&self, definitions: Vec<FeedbackDefinition>) {
        *self.definitions.write() = definitions;
        self.states.write().clear();
    }

    /// Evaluate every feedback; returns the ones whose state flipped
    pub fn check_feedbacks(&self, snapshot: &StatusSnapshot) -> Vec<(String, bool)> {
        let definitions = self.definitions.read();
        let mut states = self.states.write();
        let mut flipped = Vec::new();

        for def in definitions.iter() {
            let lit = def.evaluate(snapshot);
            if states.insert(def.id.clone(), lit) != Some(lit) {
                flipped.push((def.id.clone(), lit));
            }
        }

        flipped
    }

    /// Last evaluated state of every feedback
    pub fn states(&self) -> BTreeMap<String, bool> {
        self.states.read().clone()
    }
}
