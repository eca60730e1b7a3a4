//! Remote agent
//!
//! Connects out to the server, registers as one platform, and executes the
//! commands it receives on a local [`Shell`]. Lost connections are retried a
//! bounded number of times.

use super::protocol::{CommandEnvelope, HostInfo, Message};
use crate::config::{AgentConfig, ShellConfig};
use crate::error::{Error, Result};
use crate::shell::{ExecutionResult, Shell, ShellVariant};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub server_url: String,
    pub platform: ShellVariant,
    /// Connection attempts allowed without a successful registration
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub heartbeat_interval: Duration,
}

impl AgentOptions {
    /// Build options from config, detecting the platform when none is set
    #[must_use]
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            server_url: config.server_url.clone(),
            platform: config.platform.unwrap_or_else(ShellVariant::detect),
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
            heartbeat_interval: config.heartbeat_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Disconnected,
    Connecting,
    Registered,
    Running,
    Terminated,
}

/// Why [`Agent::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentExit {
    /// The server sent `shutdown`
    Shutdown,
    /// `attempts` consecutive connections failed before registering
    RetriesExhausted { attempts: u32 },
    /// The cancellation token fired
    Cancelled,
}

/// How one connection ended
enum ConnectionEnd {
    Closed,
    Shutdown,
    Cancelled,
}

pub struct Agent {
    options: AgentOptions,
    host: HostInfo,
    shell: Arc<Mutex<Shell>>,
    state: AgentState,
    connections: u32,
    cancel: CancellationToken,
}

impl Agent {
    #[must_use]
    pub fn new(options: AgentOptions, shell_config: &ShellConfig) -> Self {
        let shell = Shell::new(options.platform, shell_config);

        Self {
            options,
            host: HostInfo::detect(),
            shell: Arc::new(Mutex::new(shell)),
            state: AgentState::Disconnected,
            connections: 0,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn platform(&self) -> ShellVariant {
        self.options.platform
    }

    #[must_use]
    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Total connection attempts made so far
    #[must_use]
    pub fn connection_attempts(&self) -> u32 {
        self.connections
    }

    /// Token that stops [`Agent::run`] when cancelled
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn shell(&self) -> Arc<Mutex<Shell>> {
        self.shell.clone()
    }

    fn set_state(&mut self, state: AgentState) {
        if self.state != state {
            debug!(platform = %self.options.platform, "Agent state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Connect, serve, and reconnect until shut down or out of retries.
    ///
    /// The retry budget resets after every successful registration.
    pub async fn run(&mut self) -> AgentExit {
        let mut retries = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                self.set_state(AgentState::Terminated);
                return AgentExit::Cancelled;
            }

            let mut registered = false;
            let end = self.connect_once(&mut registered).await;
            if registered {
                retries = 0;
            }

            match end {
                Ok(ConnectionEnd::Shutdown) => {
                    info!(platform = %self.options.platform, "Shutdown requested by server");
                    self.set_state(AgentState::Terminated);
                    return AgentExit::Shutdown;
                }
                Ok(ConnectionEnd::Cancelled) => {
                    self.set_state(AgentState::Terminated);
                    return AgentExit::Cancelled;
                }
                Ok(ConnectionEnd::Closed) => info!("Connection to {} closed", self.options.server_url),
                Err(e) => warn!("Connection to {} failed: {}", self.options.server_url, e),
            }
            self.set_state(AgentState::Disconnected);

            let attempts = retries + 1;
            if attempts >= self.options.max_retries {
                error!(attempts, "Giving up on {}", self.options.server_url);
                self.set_state(AgentState::Terminated);
                return AgentExit::RetriesExhausted { attempts };
            }
            retries = attempts;

            info!(
                "Reconnecting in {:?} (attempt {}/{})",
                self.options.retry_delay,
                retries + 1,
                self.options.max_retries
            );
            tokio::select! {
                _ = tokio::time::sleep(self.options.retry_delay) => {}
                _ = self.cancel.cancelled() => {
                    self.set_state(AgentState::Terminated);
                    return AgentExit::Cancelled;
                }
            }
        }
    }

    async fn connect_once(&mut self, registered: &mut bool) -> Result<ConnectionEnd> {
        self.set_state(AgentState::Connecting);
        self.connections += 1;
        let platform = self.options.platform;

        let (ws, _) = tokio_tungstenite::connect_async(self.options.server_url.as_str()).await?;
        let (mut sink, mut stream) = ws.split();

        let register = Message::Register {
            platform,
            host: self.host.clone(),
            timestamp: Utc::now(),
        };
        sink.send(register.to_frame()?).await?;

        let ack = loop {
            let frame = stream.next().await.ok_or(Error::TransportClosed)??;
            if let Some(message) = Message::from_frame(frame)? {
                break message;
            }
        };
        match ack {
            Message::Registered { .. } => {
                *registered = true;
                self.set_state(AgentState::Registered);
                info!(%platform, "Registered with {}", self.options.server_url);
            }
            other => {
                return Err(Error::Protocol(format!("expected registered, got {}", other.kind())));
            }
        }

        // Commands run off the connection loop so heartbeats and pings keep flowing
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(String, ExecutionResult)>();

        let period = self.options.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.set_state(AgentState::Running);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink.close().await;
                    return Ok(ConnectionEnd::Cancelled);
                }
                _ = heartbeat.tick() => {
                    sink.send(Message::heartbeat(platform).to_frame()?).await?;
                }
                Some((command_id, result)) = done_rx.recv() => {
                    debug!(%command_id, success = result.success, "Sending result");
                    sink.send(Message::CommandResult { command_id, result }.to_frame()?).await?;
                }
                frame = stream.next() => {
                    let Some(frame) = frame else {
                        return Ok(ConnectionEnd::Closed);
                    };
                    match Message::from_frame(frame?) {
                        Ok(Some(Message::Execute { envelope, .. })) => self.spawn_execution(envelope, done_tx.clone()),
                        Ok(Some(Message::Ping { .. })) => sink.send(Message::pong().to_frame()?).await?,
                        Ok(Some(Message::Shutdown)) => {
                            let _ = sink.close().await;
                            return Ok(ConnectionEnd::Shutdown);
                        }
                        Ok(Some(other)) => debug!("Ignoring {} message", other.kind()),
                        Ok(None) => {}
                        Err(Error::TransportClosed) => return Ok(ConnectionEnd::Closed),
                        Err(e) => warn!("Dropping malformed message: {}", e),
                    }
                }
            }
        }
    }

    /// Run one command on the local shell.
    ///
    /// Commands on one agent run one at a time in arrival order.
    fn spawn_execution(&self, envelope: CommandEnvelope, done: mpsc::UnboundedSender<(String, ExecutionResult)>) {
        let shell = self.shell.clone();
        info!(command_id = %envelope.command_id, "Executing: {}", envelope.command);

        tokio::spawn(async move {
            let budget = Duration::from_secs(envelope.timeout_seconds);
            let result = shell.lock().await.execute_with_timeout(&envelope.command, budget).await;
            let _ = done.send((envelope.command_id, result));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(url: String, max_retries: u32) -> AgentOptions {
        AgentOptions {
            server_url: url,
            platform: ShellVariant::Linux,
            max_retries,
            retry_delay: Duration::from_millis(10),
            heartbeat_interval: Duration::from_secs(30),
        }
    }

    async fn unused_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_options_from_config() {
        let config = AgentConfig {
            platform: Some(ShellVariant::Mobile),
            max_retries: 0,
            ..AgentConfig::default()
        };
        let options = AgentOptions::from_config(&config);
        assert_eq!(options.platform, ShellVariant::Mobile);
        assert_eq!(options.max_retries, 1);
        assert_eq!(options.retry_delay, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let port = unused_port().await;
        let mut agent = Agent::new(options(format!("ws://127.0.0.1:{port}"), 3), &ShellConfig::default());

        let exit = agent.run().await;
        assert_eq!(exit, AgentExit::RetriesExhausted { attempts: 3 });
        assert_eq!(agent.connection_attempts(), 3);
        assert_eq!(agent.state(), AgentState::Terminated);
    }

    #[tokio::test]
    async fn test_cancel_stops_retrying() {
        let port = unused_port().await;
        let mut opts = options(format!("ws://127.0.0.1:{port}"), 1000);
        opts.retry_delay = Duration::from_secs(60);
        let mut agent = Agent::new(opts, &ShellConfig::default());

        let token = agent.cancellation_token();
        token.cancel();
        assert_eq!(agent.run().await, AgentExit::Cancelled);
    }
}
