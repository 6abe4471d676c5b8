//! Change notifier - fans applied updates out to variable and feedback consumers
//!
//! Delivery is fire-and-forget. A consumer returning an error is logged and
//! does not stop delivery to the others.

use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::state::{FieldUpdate, FieldValue, StatusSnapshot};

/// Variable value pushed to the binding layer
#[derive(Debug, Clone, PartialEq)]
pub struct VariableUpdate {
    /// Variable id (e.g., "st_go")
    pub id: &'static str,
    pub value: FieldValue,
}

/// Callback receiving the variables changed by one message
pub type VariableCallback = Arc<dyn Fn(&[VariableUpdate]) -> Result<()> + Send + Sync>;

/// Callback running a full feedback re-evaluation pass
pub type FeedbackCallback = Arc<dyn Fn(&StatusSnapshot) -> Result<()> + Send + Sync>;

/// When consumers are notified about a decoded update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// Every recognized message, even if the value is unchanged
    #[default]
    Always,
    /// Only when the applied value differs from the stored one
    OnChange,
}

impl NotifyPolicy {
    pub fn should_notify(self, changed: bool) -> bool {
        match self {
            NotifyPolicy::Always => true,
            NotifyPolicy::OnChange => changed,
        }
    }
}

#[derive(Clone, Default)]
pub struct ChangeNotifier {
    variable_subscribers: Arc<RwLock<Vec<VariableCallback>>>,
    feedback_subscribers: Arc<RwLock<Vec<FeedbackCallback>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to variable value pushes
    pub fn subscribe_variables<F>(&self, callback: F)
    where
        F: Fn(&[VariableUpdate]) -> Result<()> + Send + Sync + 'static,
    {
        self.variable_subscribers.write().push(Arc::new(callback));
    }

    /// Subscribe to feedback re-evaluation passes
    pub fn subscribe_feedbacks<F>(&self, callback: F)
    where
        F: Fn(&StatusSnapshot) -> Result<()> + Send + Sync + 'static,
    {
        self.feedback_subscribers.write().push(Arc::new(callback));
    }

    /// Re-evaluate all feedbacks, then push the field changed by one message
    ///
    /// Feedback states already reflect the update when variables are pushed.
    pub fn notify(&self, update: &FieldUpdate, snapshot: &StatusSnapshot) {
        self.reevaluate(snapshot);

        let variables = [VariableUpdate {
            id: update.field.variable_id(),
            value: update.value.clone(),
        }];

        // Clone the lists so callbacks may subscribe without deadlocking
        let variable_subscribers = self.variable_subscribers.read().clone();
        for callback in &variable_subscribers {
            if let Err(e) = callback(&variables) {
                error!(variable = variables[0].id, "Variable consumer failed: {:#}", e);
            }
        }
    }

    /// Run a feedback pass without a variable push
    pub fn reevaluate(&self, snapshot: &StatusSnapshot) {
        let feedback_subscribers = self.feedback_subscribers.read().clone();
        for callback in &feedback_subscribers {
            if let Err(e) = callback(snapshot) {
                error!("Feedback consumer failed: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Field, StateStore};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_pushes_variable_and_reevaluates() {
        let notifier = ChangeNotifier::new();
        let pushed = Arc::new(Mutex::new(Vec::new()));
        let passes = Arc::new(AtomicUsize::new(0));

        let pushed_clone = pushed.clone();
        notifier.subscribe_variables(move |vars| {
            pushed_clone.lock().extend_from_slice(vars);
            Ok(())
        });
        let passes_clone = passes.clone();
        notifier.subscribe_feedbacks(move |_snapshot| {
            passes_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let store = StateStore::new();
        let update = FieldUpdate::new(Field::GoActive, FieldValue::Boolean(true));
        store.apply(&update);
        notifier.notify(&update, &store.snapshot());

        assert_eq!(
            *pushed.lock(),
            vec![VariableUpdate {
                id: "st_go",
                value: FieldValue::Boolean(true)
            }]
        );
        assert_eq!(passes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_consumer_does_not_block_others() {
        let notifier = ChangeNotifier::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        notifier.subscribe_feedbacks(|_| anyhow::bail!("consumer bug"));
        let delivered_clone = delivered.clone();
        notifier.subscribe_feedbacks(move |_| {
            delivered_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        notifier.reevaluate(&StateStore::new().snapshot());
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_notify_policy() {
        assert!(NotifyPolicy::Always.should_notify(false));
        assert!(NotifyPolicy::Always.should_notify(true));
        assert!(!NotifyPolicy::OnChange.should_notify(false));
        assert!(NotifyPolicy::OnChange.should_notify(true));
    }
}
