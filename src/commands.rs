//! Outbound OSC command sender
//!
//! Sends OSC messages to the device's command port. The socket is bound to an
//! ephemeral local port; the destination can be swapped on reconfiguration.

use parking_lot::RwLock;
use rosc::{OscMessage, OscPacket, OscType};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::config::EndpointConfig;
use crate::error::{BridgeError, Result};

#[derive(Clone)]
pub struct CommandSender {
    socket: Arc<RwLock<Option<Arc<UdpSocket>>>>,
    target: Arc<RwLock<SocketAddrV4>>,
}

impl CommandSender {
    /// Open a sending socket targeting the endpoint's command port
    pub async fn open(endpoint: &EndpointConfig) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?;
        let target = endpoint.command_addr();
        debug!("OSC command sender bound to {:?}, target {}", socket.local_addr().ok(), target);

        Ok(Self {
            socket: Arc::new(RwLock::new(Some(Arc::new(socket)))),
            target: Arc::new(RwLock::new(target)),
        })
    }

    pub fn target(&self) -> SocketAddrV4 {
        *self.target.read()
    }

    /// Point subsequent sends at a new endpoint
    pub fn retarget(&self, endpoint: &EndpointConfig) {
        let target = endpoint.command_addr();
        let mut current = self.target.write();
        if *current != target {
            info!("OSC commands now sent to {}", target);
            *current = target;
        }
    }

    /// Encode and send one message
    pub async fn send(&self, address: &str, args: Vec<OscType>) -> Result<()> {
        let socket = self
            .socket
            .read()
            .clone()
            .ok_or(BridgeError::EndpointClosed)?;
        let target = SocketAddr::V4(self.target());

        let packet = OscPacket::Message(OscMessage {
            addr: address.to_string(),
            args,
        });
        let bytes = rosc::encoder::encode(&packet).map_err(|e| BridgeError::Osc(format!("{:?}", e)))?;

        socket.send_to(&bytes, target).await?;
        debug!(address, %target, "OSC out");
        Ok(())
    }

    /// Release the socket; later sends fail with `EndpointClosed`
    pub fn close(&self) {
        self.socket.write().take();
    }
}

/// Parse a console argument into an OSC value
///
/// Integers, floats and `true`/`false` are typed; anything else is a string.
pub fn parse_arg(raw: &str) -> OscType {
    if let Ok(i) = raw.parse::<i32>() {
        OscType::Int(i)
    } else if let Ok(f) = raw.parse::<f32>() {
        OscType::Float(f)
    } else {
        match raw {
            "true" => OscType::Bool(true),
            "false" => OscType::Bool(false),
            _ => OscType::String(raw.to_string()),
        }
    }
}
