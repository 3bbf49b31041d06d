//! Sync connection supervisor.
//!
//! Keeps one push connection per list alive, feeding its frames to a
//! [`SyncListener`] and reconnecting with exponential backoff when it drops.
//!
//! ```text
//!            connect ok                      frames ─▶ SyncListener
//!   ┌──────────────────────────▶ Connected ──────────────┐
//!   │                                │ closed / error    │
//!   │                                ▼                   │
//!   │     sleep(backoff)       Disconnected              │
//!   └──── Reconnecting{n} ◀──────────┘                   │
//!              │ close 4001/4003 or attempts exhausted   │
//!              ▼                                         │
//!          Error(msg) ◀──────────────────────────────────┘ (close 4001/4003)
//! ```
//!
//! Every successful (re)connect invalidates the list's keys, since events
//! may have been missed while disconnected.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use larder_types::EntityId;
use rand::Rng;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::constants::{CLOSE_ACCESS_DENIED, CLOSE_INVALID_TOKEN, STATUS_CHANNEL_CAPACITY};
use crate::sync::{FrameOutcome, SyncListener};

/// Connection lifecycle as seen by the UI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },
    /// Terminal: the supervisor has stopped.
    Error(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("closed by server with code {code}: {reason}")]
    Closed { code: u16, reason: String },
}

impl ConnectError {
    /// The server refused the session; retrying will not help.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ConnectError::Closed { code, .. } if *code == CLOSE_INVALID_TOKEN || *code == CLOSE_ACCESS_DENIED
        )
    }
}

/// Why a supervisor stopped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("sync rejected: {0}")]
    Unauthorized(ConnectError),

    #[error("gave up after {attempts} reconnect attempts")]
    GaveUp { attempts: u32 },
}

/// An open push connection.
#[async_trait]
pub trait SyncConnection: Send {
    /// Next text frame, or `None` once the server closed cleanly.
    async fn next_frame(&mut self) -> Result<Option<String>, ConnectError>;

    async fn send_frame(&mut self, text: String) -> Result<(), ConnectError>;
}

/// Opens push connections (the WebSocket transport in production).
#[async_trait]
pub trait SyncConnector: Send + Sync {
    async fn connect(&self, list_id: EntityId) -> Result<Box<dyn SyncConnection>, ConnectError>;
}

/// Exponential backoff: `initial * 2^(attempt - 1)`, capped at `max`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// Proportional spread in `[0, 1]`.
    pub jitter: f64,
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_backoff_ms),
            max: Duration::from_millis(config.max_backoff_ms),
            // NaN would poison every delay.
            jitter: if config.jitter.is_nan() { 0.0 } else { config.jitter.clamp(0.0, 1.0) },
            max_attempts: config.max_attempts,
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// [`base_delay`](Self::base_delay) with jitter applied, still capped at `max`.
    pub fn delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter.is_nan() || self.jitter <= 0.0 {
            return base;
        }
        let jitter = self.jitter.min(1.0);
        let spread = rng.gen_range(-jitter..=jitter);
        Duration::try_from_secs_f64(base.as_secs_f64() * (1.0 + spread))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }
}

pub struct SyncSupervisor {
    connector: Arc<dyn SyncConnector>,
    listener: SyncListener,
    policy: ReconnectPolicy,
    list_id: EntityId,
    status: broadcast::Sender<ConnectionStatus>,
}

impl SyncSupervisor {
    pub fn new(
        connector: Arc<dyn SyncConnector>,
        listener: SyncListener,
        policy: ReconnectPolicy,
        list_id: EntityId,
    ) -> Self {
        let (status, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self { connector, listener, policy, list_id, status }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn spawn(self) -> JoinHandle<Result<(), SupervisorError>> {
        tokio::spawn(self.run())
    }

    /// Connect and keep reconnecting until an auth failure or the attempt
    /// limit. Only returns on those terminal conditions.
    pub async fn run(self) -> Result<(), SupervisorError> {
        let mut attempt: u32 = 0;
        loop {
            match self.connector.connect(self.list_id).await {
                Ok(mut connection) => {
                    attempt = 0;
                    info!(list = %self.list_id, "sync connected");
                    self.publish(ConnectionStatus::Connected);
                    self.listener.invalidate_list(self.list_id);

                    let ended = self.pump(connection.as_mut()).await;
                    self.publish(ConnectionStatus::Disconnected);
                    match ended {
                        Ok(()) => info!(list = %self.list_id, "sync connection closed"),
                        Err(error) if error.is_auth_failure() => return Err(self.unauthorized(error)),
                        Err(error) => warn!(list = %self.list_id, %error, "sync connection lost"),
                    }
                }
                Err(error) if error.is_auth_failure() => return Err(self.unauthorized(error)),
                Err(error) => warn!(list = %self.list_id, attempt, %error, "sync connect failed"),
            }

            attempt += 1;
            if !self.policy.allows(attempt) {
                let attempts = attempt - 1;
                self.publish(ConnectionStatus::Error(format!(
                    "gave up after {attempts} reconnect attempts"
                )));
                return Err(SupervisorError::GaveUp { attempts });
            }
            self.publish(ConnectionStatus::Reconnecting { attempt });
            let delay = self.policy.delay(attempt, &mut rand::thread_rng());
            debug!(list = %self.list_id, attempt, ?delay, "waiting before reconnect");
            tokio::time::sleep(delay).await;
        }
    }

    async fn pump(&self, connection: &mut dyn SyncConnection) -> Result<(), ConnectError> {
        while let Some(frame) = connection.next_frame().await? {
            if let FrameOutcome::Reply(reply) = self.listener.handle_frame(&frame) {
                connection.send_frame(reply).await?;
            }
        }
        Ok(())
    }

    fn unauthorized(&self, error: ConnectError) -> SupervisorError {
        warn!(list = %self.list_id, %error, "sync rejected by server, not retrying");
        self.publish(ConnectionStatus::Error(error.to_string()));
        SupervisorError::Unauthorized(error)
    }

    fn publish(&self, status: ConnectionStatus) {
        let _ = self.status.send(status);
    }
}
