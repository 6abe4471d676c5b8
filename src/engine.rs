//! Status engine - the per-message pipeline
//!
//! decode → apply → notify, run to completion for each message before the
//! next one. Decode failures are isolated to the message that caused them.

use parking_lot::RwLock;
use rosc::OscMessage;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{BridgeError, Result};
use crate::notifier::{ChangeNotifier, NotifyPolicy};
use crate::osc::{decode, flatten_packet, BooleanCoercion, Decoded};
use crate::state::{Field, FieldUpdate, StateStore};

/// Decoding and notification settings, replaced on reconfiguration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineSettings {
    pub coercion: BooleanCoercion,
    pub notify: NotifyPolicy,
}

#[derive(Clone)]
pub struct StatusEngine {
    store: StateStore,
    notifier: ChangeNotifier,
    settings: Arc<RwLock<EngineSettings>>,
}

impl StatusEngine {
    pub fn new(store: StateStore, notifier: ChangeNotifier, settings: EngineSettings) -> Self {
        Self {
            store,
            notifier,
            settings: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn settings(&self) -> EngineSettings {
        *self.settings.read()
    }

    pub fn set_settings(&self, settings: EngineSettings) {
        *self.settings.write() = settings;
    }

    /// Handle one UDP datagram; returns the number of field updates applied
    pub fn handle_datagram(&self, datagram: &[u8]) -> usize {
        let packet = match rosc::decoder::decode_udp(datagram) {
            Ok((_, packet)) => packet,
            Err(e) => {
                debug!(len = datagram.len(), "Dropping undecodable datagram: {:?}", e);
                return 0;
            },
        };

        let mut applied = 0;
        for msg in flatten_packet(packet) {
            match self.handle_message(&msg) {
                Ok(Some(_)) => applied += 1,
                Ok(None) => {},
                Err(e) => debug!("Dropping message: {}", e),
            }
        }
        applied
    }

    /// Decode and apply a single message
    ///
    /// Returns the applied update, `None` for unrecognized addresses, or
    /// `MalformedMessage` when the message could not be decoded.
    pub fn handle_message(&self, msg: &OscMessage) -> Result<Option<FieldUpdate>> {
        log_inbound(msg);

        let settings = self.settings();
        let update = match decode(&msg.addr, &msg.args, settings.coercion)? {
            Decoded::Update(update) => update,
            Decoded::Unrecognized => {
                trace!(address = %msg.addr, "{}", BridgeError::UnrecognizedAddress(msg.addr.clone()));
                return Ok(None);
            },
        };

        let changed = self.store.apply(&update);
        if settings.notify.should_notify(changed) {
            self.notifier.notify(&update, &self.store.snapshot());
        }

        Ok(Some(update))
    }
}

fn log_inbound(msg: &OscMessage) {
    // Time counters arrive several times per second
    let high_rate =
        msg.addr == Field::ElapsedTime.address() || msg.addr == Field::RemainingTime.address();
    if high_rate {
        trace!(address = %msg.addr, args = ?msg.args, "OSC in");
    } else {
        debug!(address = %msg.addr, args = ?msg.args, "OSC in");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FieldValue;
    use rosc::{OscPacket, OscType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn msg(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    fn engine_with_counter(notify: NotifyPolicy) -> (StatusEngine, Arc<AtomicUsize>) {
        let engine = StatusEngine::new(
            StateStore::new(),
            ChangeNotifier::new(),
            EngineSettings {
                coercion: BooleanCoercion::Strict,
                notify,
            },
        );
        let passes = Arc::new(AtomicUsize::new(0));
        let passes_clone = passes.clone();
        engine.notifier().subscribe_feedbacks(move |_| {
            passes_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (engine, passes)
    }

    #[test]
    fn test_go_on_then_off() {
        let (engine, _) = engine_with_counter(NotifyPolicy::Always);

        engine.handle_message(&msg("/status/go", vec![OscType::Bool(true)])).unwrap();
        assert_eq!(engine.store().read(Field::GoActive), FieldValue::Boolean(true));

        engine.handle_message(&msg("/status/go", vec![OscType::Bool(false)])).unwrap();
        assert_eq!(engine.store().read(Field::GoActive), FieldValue::Boolean(false));
    }

    #[test]
    fn test_unknown_address_changes_nothing() {
        let (engine, passes) = engine_with_counter(NotifyPolicy::Always);
        let before = engine.store().snapshot();

        let result = engine
            .handle_message(&msg("/status/unknown/address", vec![OscType::Int(42)]))
            .unwrap();

        assert!(result.is_none());
        assert_eq!(engine.store().snapshot(), before);
        assert_eq!(passes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_malformed_leaves_state_unchanged() {
        let (engine, passes) = engine_with_counter(NotifyPolicy::Always);
        let before = engine.store().snapshot();

        let err = engine.handle_message(&msg("/status/elapsed", vec![])).unwrap_err();

        assert!(matches!(err, BridgeError::MalformedMessage { .. }));
        assert_eq!(engine.store().snapshot(), before);
        assert_eq!(passes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_notify_always_vs_on_change() {
        let (always, always_passes) = engine_with_counter(NotifyPolicy::Always);
        let (on_change, on_change_passes) = engine_with_counter(NotifyPolicy::OnChange);
        let go = msg("/status/go", vec![OscType::Bool(true)]);

        for _ in 0..3 {
            always.handle_message(&go).unwrap();
            on_change.handle_message(&go).unwrap();
        }

        assert_eq!(always_passes.load(Ordering::SeqCst), 3);
        assert_eq!(on_change_passes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bad_message_does_not_affect_rest_of_bundle() {
        let (engine, _) = engine_with_counter(NotifyPolicy::Always);
        let packet = OscPacket::Bundle(rosc::OscBundle {
            timetag: (0, 1).into(),
            content: vec![
                OscPacket::Message(msg("/status/elapsed", vec![])),
                OscPacket::Message(msg("/status/elapsed", vec![OscType::String("00:12".into())])),
                OscPacket::Message(msg("/status/stopall", vec![OscType::Bool(true)])),
            ],
        });
        let bytes = rosc::encoder::encode(&packet).unwrap();

        assert_eq!(engine.handle_datagram(&bytes), 2);
        assert_eq!(
            engine.store().read(Field::ElapsedTime),
            FieldValue::String("00:12".to_string())
        );
        assert_eq!(engine.store().read(Field::StopAllActive), FieldValue::Boolean(true));
    }

    #[test]
    fn test_garbage_datagram_is_dropped() {
        let (engine, passes) = engine_with_counter(NotifyPolicy::Always);
        assert_eq!(engine.handle_datagram(b"not osc at all"), 0);
        assert_eq!(passes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_settings_switch_coercion() {
        let (engine, _) = engine_with_counter(NotifyPolicy::Always);
        let numeric = msg("/status/go", vec![OscType::Int(1)]);

        engine.handle_message(&numeric).unwrap();
        assert_eq!(engine.store().read(Field::GoActive), FieldValue::Boolean(false));

        engine.set_settings(EngineSettings {
            coercion: BooleanCoercion::Truthy,
            notify: NotifyPolicy::Always,
        });
        engine.handle_message(&numeric).unwrap();
        assert_eq!(engine.store().read(Field::GoActive), FieldValue::Boolean(true));
    }
}
