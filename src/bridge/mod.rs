//! Bridge instance - host lifecycle hooks around the status engine
//!
//! `init` allocates the state and binds the feedback port, `config_updated`
//! swaps the endpoint (rebinding only when the listen side changed), and
//! `destroy` releases every socket. A bind failure leaves the instance loaded
//! in a degraded `ConnectionFailure` state until the next reconfiguration.

use parking_lot::RwLock;
use rosc::OscType;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::commands::CommandSender;
use crate::config::{BridgeConfig, EndpointConfig};
use crate::engine::{EngineSettings, StatusEngine};
use crate::error::{BridgeError, Result};
use crate::feedback::FeedbackRegistry;
use crate::listener::{ListenerState, OscListener};
use crate::notifier::{ChangeNotifier, VariableUpdate};
use crate::state::{Field, FieldValue, StateStore, StatusSnapshot};

#[cfg(test)]
mod tests;

/// Instance status reported to the host
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceStatus {
    Ok,
    Connecting,
    BadConfig(String),
    ConnectionFailure(String),
    Disconnected,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Ok => write!(f, "ok"),
            InstanceStatus::Connecting => write!(f, "connecting"),
            InstanceStatus::BadConfig(msg) => write!(f, "bad config: {}", msg),
            InstanceStatus::ConnectionFailure(msg) => write!(f, "connection failure: {}", msg),
            InstanceStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Type alias for instance status callbacks
pub type StatusCallback = Arc<dyn Fn(&InstanceStatus) + Send + Sync>;

/// Full validation, including feedback id uniqueness and reserved ids
fn validate(config: &BridgeConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| BridgeError::InvalidConfig(format!("{:#}", e)))
}

fn settings_of(config: &BridgeConfig) -> EngineSettings {
    EngineSettings {
        coercion: config.boolean_coercion,
        notify: config.notify,
    }
}

pub struct MultiplayBridge {
    config: RwLock<BridgeConfig>,
    endpoint: RwLock<EndpointConfig>,
    engine: StatusEngine,
    feedbacks: FeedbackRegistry,
    listener: Mutex<OscListener>,
    commands: RwLock<Option<CommandSender>>,
    status: RwLock<InstanceStatus>,
    status_callbacks: RwLock<Vec<StatusCallback>>,
}

impl MultiplayBridge {
    /// Build an instance from a validated configuration without binding anything
    pub fn new(config: BridgeConfig) -> Result<Self> {
        validate(&config)?;
        let endpoint = config.endpoint()?;
        let feedbacks = FeedbackRegistry::from_config(&config.feedbacks)?;

        let engine = StatusEngine::new(StateStore::new(), ChangeNotifier::new(), settings_of(&config));

        let registry = feedbacks.clone();
        engine.notifier().subscribe_feedbacks(move |snapshot| {
            for (id, lit) in registry.check_feedbacks(snapshot) {
                info!(feedback = %id, lit, "💡 Feedback changed");
            }
            Ok(())
        });

        Ok(Self {
            listener: Mutex::new(OscListener::new(engine.clone())),
            config: RwLock::new(config),
            endpoint: RwLock::new(endpoint),
            engine,
            feedbacks,
            commands: RwLock::new(None),
            status: RwLock::new(InstanceStatus::Disconnected),
            status_callbacks: RwLock::new(Vec::new()),
        })
    }

    /// Host `init` hook: reset state, open the command socket, bind the feedback port
    pub async fn init(&self) -> Result<()> {
        let endpoint = *self.endpoint.read();
        info!(
            "🎬 Multiplay bridge starting (device {}, feedback port {})",
            endpoint.command_addr(),
            endpoint.feedback_port
        );

        self.engine.store().initialize();
        self.engine.notifier().reevaluate(&self.engine.store().snapshot());
        self.emit_status(InstanceStatus::Connecting);

        // Status tracking does not depend on the outbound socket
        let commands = CommandSender::open(&endpoint)
            .await
            .map(|sender| *self.commands.write() = Some(sender));

        let mut listener = self.listener.lock().await;
        let result = listener.start(&endpoint).await;
        self.report_startup(result, commands);
        Ok(())
    }

    /// Host `configUpdated` hook
    ///
    /// The endpoint is replaced wholesale. The listener is rebuilt when the
    /// listen side changed or when it is not currently listening.
    pub async fn config_updated(&self, new_config: BridgeConfig) -> Result<()> {
        // Held for the whole update so concurrent reconfigurations serialize
        let mut listener = self.listener.lock().await;

        let new_endpoint = match validate(&new_config).and_then(|_| new_config.endpoint()) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("Rejected configuration: {}", e);
                self.emit_status(InstanceStatus::BadConfig(e.to_string()));
                return Err(e);
            },
        };
        let definitions = match FeedbackRegistry::definitions_from_config(&new_config.feedbacks) {
            Ok(definitions) => definitions,
            Err(e) => {
                self.emit_status(InstanceStatus::BadConfig(e.to_string()));
                return Err(e);
            },
        };

        let old_endpoint = *self.endpoint.read();

        self.engine.set_settings(settings_of(&new_config));
        self.feedbacks.replace(definitions);
        self.feedbacks.check_feedbacks(&self.engine.store().snapshot());

        if let Some(sender) = self.commands.read().as_ref() {
            sender.retarget(&new_endpoint);
        }

        *self.endpoint.write() = new_endpoint;
        *self.config.write() = new_config;

        let needs_restart =
            old_endpoint.requires_rebind(&new_endpoint) || listener.state() != ListenerState::Listening;
        if needs_restart {
            let result = listener.restart(&new_endpoint).await;
            self.report_listener_result(result);
        } else {
            debug!("Listen endpoint unchanged, keeping socket");
            if !matches!(*self.status.read(), InstanceStatus::Ok) {
                self.emit_status(InstanceStatus::Ok);
            }
        }

        Ok(())
    }

    /// Host `destroy` hook: close every socket
    pub async fn destroy(&self) {
        self.listener.lock().await.stop().await;
        if let Some(sender) = self.commands.write().take() {
            sender.close();
        }
        self.emit_status(InstanceStatus::Disconnected);
        debug!("destroy");
    }

    /// Status after `init`: listener failures first, then the command socket
    fn report_startup(&self, listener: Result<SocketAddr>, commands: Result<()>) {
        match (listener, commands) {
            (Ok(_), Err(e)) => {
                error!("Failed to open OSC command socket: {}", e);
                self.emit_status(InstanceStatus::ConnectionFailure(format!(
                    "command socket: {}",
                    e
                )));
            },
            (listener, _) => self.report_listener_result(listener),
        }
    }

    fn report_listener_result(&self, result: Result<SocketAddr>) {
        match result {
            Ok(_) => self.emit_status(InstanceStatus::Ok),
            Err(e @ BridgeError::Bind { .. }) => {
                error!("{} (fix the configuration to retry)", e);
                self.emit_status(InstanceStatus::ConnectionFailure(e.to_string()));
            },
            Err(e) => {
                error!("Listener failed to start: {}", e);
                self.emit_status(InstanceStatus::ConnectionFailure(e.to_string()));
            },
        }
    }

    /// Emit instance status to all subscribers
    fn emit_status(&self, status: InstanceStatus) {
        info!("Instance status: {}", status);
        *self.status.write() = status.clone();
        let callbacks = self.status_callbacks.read().clone();
        for callback in &callbacks {
            callback(&status);
        }
    }

    pub fn subscribe_status<F>(&self, callback: F)
    where
        F: Fn(&InstanceStatus) + Send + Sync + 'static,
    {
        self.status_callbacks.write().push(Arc::new(callback));
    }

    /// Subscribe to variable value pushes
    pub fn subscribe_variables<F>(&self, callback: F)
    where
        F: Fn(&[VariableUpdate]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.engine.notifier().subscribe_variables(callback);
    }

    pub fn status(&self) -> InstanceStatus {
        self.status.read().clone()
    }

    pub fn config(&self) -> BridgeConfig {
        self.config.read().clone()
    }

    pub fn endpoint(&self) -> EndpointConfig {
        *self.endpoint.read()
    }

    pub fn read(&self, field: Field) -> FieldValue {
        self.engine.store().read(field)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.engine.store().snapshot()
    }

    /// Current variable values keyed by variable id
    pub fn variables(&self) -> BTreeMap<&'static str, FieldValue> {
        self.snapshot()
            .iter()
            .map(|(field, value)| (field.variable_id(), value.clone()))
            .collect()
    }

    pub fn feedback_states(&self) -> BTreeMap<String, bool> {
        self.feedbacks.states()
    }

    pub async fn listener_state(&self) -> ListenerState {
        self.listener.lock().await.state()
    }

    pub async fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.lock().await.local_addr()
    }

    /// Send an OSC command to the device
    pub async fn send_command(&self, address: &str, args: Vec<OscType>) -> Result<()> {
        let sender = self
            .commands
            .read()
            .clone()
            .ok_or(BridgeError::EndpointClosed)?;
        sender.send(address, args).await
    }
}
