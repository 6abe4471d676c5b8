//! Listener lifecycle - owns the inbound UDP endpoint
//!
//! One receive task at a time. `stop` waits for the task to exit, so the old
//! socket is closed and no further state mutation can happen before a
//! restart binds the new one.

use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::EndpointConfig;
use crate::engine::StatusEngine;
use crate::error::{BridgeError, Result};

/// Lifecycle state of the listening endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Listening,
    Stopping,
}

impl std::fmt::Display for ListenerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerState::Stopped => write!(f, "stopped"),
            ListenerState::Starting => write!(f, "starting"),
            ListenerState::Listening => write!(f, "listening"),
            ListenerState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Largest UDP payload; datagrams are never truncated
const MAX_DATAGRAM_SIZE: usize = 65_536;

/// Delay after the first consecutive receive error, doubled up to the cap
const RECV_ERROR_BASE_DELAY: Duration = Duration::from_millis(10);
const RECV_ERROR_MAX_DELAY: Duration = Duration::from_secs(1);
/// Consecutive errors between repeated warnings
const RECV_ERROR_LOG_EVERY: u32 = 100;

/// Backoff and log rate limiting for consecutive `recv_from` failures
#[derive(Debug, Default)]
struct RecvErrorBackoff {
    consecutive: u32,
}

impl RecvErrorBackoff {
    /// Record a failure; returns the delay to wait and whether to log it
    fn on_error(&mut self) -> (Duration, bool) {
        self.consecutive = self.consecutive.saturating_add(1);
        let shift = (self.consecutive - 1).min(16);
        let delay = RECV_ERROR_BASE_DELAY
            .saturating_mul(1u32 << shift)
            .min(RECV_ERROR_MAX_DELAY);
        let log = self.consecutive == 1 || self.consecutive % RECV_ERROR_LOG_EVERY == 0;
        (delay, log)
    }

    fn on_success(&mut self) {
        if self.consecutive > 0 {
            debug!("OSC receive recovered after {} errors", self.consecutive);
        }
        self.consecutive = 0;
    }
}

struct ReceiveTask {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the bound feedback socket and its receive task
pub struct OscListener {
    engine: StatusEngine,
    state: ListenerState,
    task: Option<ReceiveTask>,
}

impl OscListener {
    pub fn new(engine: StatusEngine) -> Self {
        Self {
            engine,
            state: ListenerState::Stopped,
            task: None,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.task
            .as_ref()
            .map(|t| t.local_addr)
            .ok_or(BridgeError::EndpointClosed)
    }

    /// Bind the feedback port and start receiving
    ///
    /// Any socket still open is closed first.
    pub async fn start(&mut self, endpoint: &EndpointConfig) -> Result<SocketAddr> {
        if self.task.is_some() {
            self.stop().await;
        }

        self.state = ListenerState::Starting;
        let bind_addr = SocketAddrV4::new(endpoint.listen_address, endpoint.feedback_port);

        let socket = match UdpSocket::bind(bind_addr).await {
            Ok(socket) => socket,
            Err(source) => {
                return Err(self.abort_start(BridgeError::Bind {
                    port: endpoint.feedback_port,
                    source,
                }));
            },
        };
        let local_addr = match socket.local_addr() {
            Ok(addr) => addr,
            Err(e) => return Err(self.abort_start(e.into())),
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(receive_loop(socket, self.engine.clone(), shutdown_rx));

        self.task = Some(ReceiveTask {
            local_addr,
            shutdown_tx,
            handle,
        });
        self.state = ListenerState::Listening;

        info!("🎧 Listening for OSC feedback on {}", local_addr);
        Ok(local_addr)
    }

    /// Leave `Starting` after a failed start
    fn abort_start(&mut self, err: BridgeError) -> BridgeError {
        self.state = ListenerState::Stopped;
        err
    }

    /// Close the socket; no-op when already stopped
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            debug!("OSC listener already stopped");
            return;
        };

        self.state = ListenerState::Stopping;
        // The task may have exited on its own; a closed channel is fine
        let _ = task.shutdown_tx.send(());
        if let Err(e) = task.handle.await {
            error!("OSC receive task ended abnormally: {}", e);
        }

        self.state = ListenerState::Stopped;
        info!("OSC listener on {} stopped", task.local_addr);
    }

    /// Stop then start on a new endpoint
    pub async fn restart(&mut self, endpoint: &EndpointConfig) -> Result<SocketAddr> {
        info!(
            "🔄 Restarting OSC listener on port {}",
            endpoint.feedback_port
        );
        self.stop().await;
        self.start(endpoint).await
    }
}

impl Drop for OscListener {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.handle.abort();
        }
    }
}

async fn receive_loop(
    socket: UdpSocket,
    engine: StatusEngine,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut backoff = RecvErrorBackoff::default();

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((size, peer)) => {
                    backoff.on_success();
                    trace!(%peer, size, "Datagram received");
                    engine.handle_datagram(&buf[..size]);
                },
                Err(e) => {
                    // e.g. ICMP port unreachable reported on the next recv
                    let (delay, log) = backoff.on_error();
                    if log {
                        warn!(consecutive = backoff.consecutive, "OSC receive error: {}", e);
                    }
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    debug!("OSC receive task exiting");
}
