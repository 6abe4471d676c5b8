//! Configuration management for the Multiplay bridge
//!
//! Handles loading, parsing, validation and hot-reloading of the YAML
//! configuration file.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;
use tokio::fs;

use crate::error::BridgeError;
use crate::notifier::NotifyPolicy;
use crate::osc::BooleanCoercion;
use crate::state::Field;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BridgeConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub boolean_coercion: BooleanCoercion,
    #[serde(default)]
    pub notify: NotifyPolicy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feedbacks: Vec<FeedbackConfig>,
}

/// Device endpoint as entered by the operator
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Target IP
    pub host: String,
    /// Target port for commands
    pub port: PortSetting,
    /// Local port the device sends status to
    pub feedback_port: PortSetting,
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

/// Port number (numeric or string, as text inputs store it)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PortSetting {
    Number(i64),
    Text(String),
}

impl PortSetting {
    /// Validate as a 1-65535 port
    pub fn port(&self) -> Option<u16> {
        let n = match self {
            PortSetting::Number(n) => *n,
            PortSetting::Text(s) => s.trim().parse::<i64>().ok()?,
        };
        u16::try_from(n).ok().filter(|p| *p != 0)
    }
}

impl std::fmt::Display for PortSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortSetting::Number(n) => write!(f, "{}", n),
            PortSetting::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// Extra feedback indicator
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FeedbackConfig {
    pub id: String,
    pub field: Field,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equals: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truthy: Option<bool>,
    #[serde(rename = "in")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_array: Option<Vec<serde_json::Value>>,
}

/// Validated device endpoint; replaced wholesale on reconfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    pub host: Ipv4Addr,
    pub command_port: u16,
    pub feedback_port: u16,
    pub listen_address: Ipv4Addr,
}

impl EndpointConfig {
    pub fn command_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.host, self.command_port)
    }

    /// Whether moving to `other` needs the listening socket rebuilt
    pub fn requires_rebind(&self, other: &EndpointConfig) -> bool {
        self.feedback_port != other.feedback_port || self.listen_address != other.listen_address
    }
}

impl BridgeConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: BridgeConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        self.endpoint()?;

        let mut ids = HashSet::new();
        for feedback in &self.feedbacks {
            if feedback.id.is_empty() {
                anyhow::bail!("Feedback id cannot be empty");
            }
            if !ids.insert(feedback.id.as_str()) {
                anyhow::bail!("Duplicate feedback id '{}'", feedback.id);
            }
            crate::feedback::FeedbackDefinition::try_from(feedback)?;
        }

        // Built-in ids are reserved
        for builtin in crate::feedback::FeedbackDefinition::builtin() {
            if ids.contains(builtin.id.as_str()) {
                anyhow::bail!("Feedback id '{}' is reserved", builtin.id);
            }
        }

        Ok(())
    }

    /// Validated endpoint
    pub fn endpoint(&self) -> std::result::Result<EndpointConfig, BridgeError> {
        let device = &self.device;

        let host = parse_ipv4(&device.host)
            .ok_or_else(|| BridgeError::InvalidConfig(format!("host '{}' is not an IPv4 address", device.host)))?;
        let listen_address = parse_ipv4(&device.listen_address).ok_or_else(|| {
            BridgeError::InvalidConfig(format!(
                "listen_address '{}' is not an IPv4 address",
                device.listen_address
            ))
        })?;
        let command_port = device.port.port().ok_or_else(|| {
            BridgeError::InvalidConfig(format!("port {} must be 1-65535", device.port))
        })?;
        let feedback_port = device.feedback_port.port().ok_or_else(|| {
            BridgeError::InvalidConfig(format!("feedback_port {} must be 1-65535", device.feedback_port))
        })?;

        Ok(EndpointConfig {
            host,
            command_port,
            feedback_port,
            listen_address,
        })
    }
}

/// Strict dotted-quad parse (no surrounding whitespace)
fn parse_ipv4(s: &str) -> Option<Ipv4Addr> {
    Ipv4Addr::from_str(s).ok()
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}
