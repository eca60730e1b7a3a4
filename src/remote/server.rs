//! Remote server
//!
//! Accepts agent connections, keeps at most one live session per platform,
//! dispatches commands and correlates the asynchronous replies back to the
//! waiting caller by `command_id`.

use super::protocol::{CommandEnvelope, HostInfo, Message};
use crate::error::{whole_seconds, Error, Result};
use crate::session::SessionStore;
use crate::shell::{ExecutionResult, ShellVariant};
use chrono::{DateTime, Utc};
use futures::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How long a connection may stay open without registering
pub const REGISTRATION_TIMEOUT_SECS: u64 = 10;

/// One live agent connection
#[derive(Debug)]
struct AgentSession {
    connection_id: u64,
    host: HostInfo,
    outbound: mpsc::UnboundedSender<Message>,
    registered_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

/// A dispatch waiting for its reply
#[derive(Debug)]
struct PendingDispatch {
    connection_id: u64,
    reply: oneshot::Sender<ExecutionResult>,
}

/// Public view of a connected agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub platform: ShellVariant,
    pub hostname: String,
    pub system: String,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub connected_agents: Vec<AgentSummary>,
    pub pending_commands: usize,
    pub session_root: PathBuf,
    pub server_time: DateTime<Utc>,
}

#[derive(Debug)]
struct Inner {
    agents: Mutex<HashMap<ShellVariant, AgentSession>>,
    pending: Mutex<HashMap<String, PendingDispatch>>,
    store: SessionStore,
    next_connection: AtomicU64,
    registration_timeout: Duration,
}

/// Cheaply cloneable handle to the server state
#[derive(Debug, Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait for the `register` message that must open every connection
async fn read_registration<S>(source: &mut S) -> Result<(ShellVariant, HostInfo)>
where
    S: Stream<Item = std::result::Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = source.next().await {
        match Message::from_frame(frame?)? {
            Some(Message::Register { platform, host, .. }) => return Ok((platform, host)),
            Some(other) => {
                return Err(Error::Protocol(format!("expected register, got {}", other.kind())));
            }
            None => continue,
        }
    }
    Err(Error::TransportClosed)
}

/// Removes the pending slot when the dispatch finishes, whatever the outcome
struct PendingGuard<'a> {
    server: &'a Server,
    command_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(&self.server.inner.pending).remove(&self.command_id);
    }
}

impl Server {
    #[must_use]
    pub fn new(store: SessionStore) -> Self {
        Self::with_registration_timeout(store, Duration::from_secs(REGISTRATION_TIMEOUT_SECS))
    }

    /// Like [`Server::new`], with a custom deadline for the `register` message
    #[must_use]
    pub fn with_registration_timeout(store: SessionStore, registration_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                agents: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                store,
                next_connection: AtomicU64::new(1),
                registration_timeout,
            }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    /// Accept agent connections until `shutdown` is cancelled
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            info!("Server ready on ws://{}", addr);
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Server shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = self.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream, peer, shutdown).await {
                                warn!(%peer, "Agent connection ended with error: {}", e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, shutdown: CancellationToken) -> Result<()> {
        let ws = tokio_tungstenite::accept_async(stream).await?;
        let (mut sink, mut source) = ws.split();

        let deadline = self.inner.registration_timeout;
        let (platform, host) = tokio::time::timeout(deadline, read_registration(&mut source))
            .await
            .map_err(|_| Error::Protocol(format!("no register within {}s", whole_seconds(deadline))))??;

        // Queue the acknowledgement before the session is visible to dispatchers
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let _ = outbound.send(Message::Registered {
            platform,
            server_time: Utc::now(),
        });
        let connection_id = self.register_session(platform, host.clone(), outbound.clone());
        info!(%platform, %peer, hostname = %host.hostname, "Agent registered");
        self.log_event("agent_registered", json!({"platform": platform, "hostname": host.hostname, "peer": peer.to_string()}))
            .await;

        // Messages on one connection leave in the order they were queued
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let frame = match message.to_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("Failed to encode {} message: {}", message.kind(), e);
                        continue;
                    }
                };
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        loop {
            let frame = tokio::select! {
                _ = shutdown.cancelled() => break,
                frame = source.next() => frame,
            };
            let Some(frame) = frame else { break };
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(%platform, "Transport error: {}", e);
                    break;
                }
            };

            match Message::from_frame(frame) {
                Ok(Some(message)) => self.handle_agent_message(platform, connection_id, message, &outbound),
                Ok(None) => {}
                Err(Error::TransportClosed) => break,
                Err(e) => warn!(%platform, "Dropping malformed message: {}", e),
            }
        }

        drop(outbound);
        if self.unregister_session(platform, connection_id) {
            info!(%platform, "Agent unregistered");
            self.log_event("agent_unregistered", json!({"platform": platform})).await;
        }
        writer.abort();

        Ok(())
    }

    fn handle_agent_message(
        &self,
        platform: ShellVariant,
        connection_id: u64,
        message: Message,
        outbound: &mpsc::UnboundedSender<Message>,
    ) {
        self.touch(platform, connection_id);

        match message {
            Message::CommandResult { command_id, result } => {
                self.resolve(&command_id, result);
            }
            Message::Heartbeat { .. } => debug!(%platform, "Heartbeat"),
            Message::Status { status, .. } => info!(%platform, "Status: {}", status),
            Message::Ping { .. } => {
                let _ = outbound.send(Message::pong());
            }
            Message::Pong { .. } => debug!(%platform, "Pong"),
            other => warn!(%platform, "Ignoring unexpected {} message", other.kind()),
        }
    }

    /// Attach an outbound channel as the session for `platform`.
    ///
    /// Any previous session for the same platform is replaced without notice.
    pub(crate) fn register_session(
        &self,
        platform: ShellVariant,
        host: HostInfo,
        outbound: mpsc::UnboundedSender<Message>,
    ) -> u64 {
        let connection_id = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let previous = lock(&self.inner.agents).insert(
            platform,
            AgentSession {
                connection_id,
                host,
                outbound,
                registered_at: now,
                last_seen: now,
            },
        );
        if previous.is_some() {
            info!(%platform, "Replaced existing agent session");
        }
        connection_id
    }

    /// Drop the session if it is still the one identified by `connection_id`.
    ///
    /// Dispatches still waiting on that connection are failed right away.
    pub(crate) fn unregister_session(&self, platform: ShellVariant, connection_id: u64) -> bool {
        let removed = {
            let mut agents = lock(&self.inner.agents);
            match agents.get(&platform) {
                Some(session) if session.connection_id == connection_id => agents.remove(&platform).is_some(),
                _ => false,
            }
        };

        lock(&self.inner.pending).retain(|_, pending| pending.connection_id != connection_id);
        removed
    }

    fn touch(&self, platform: ShellVariant, connection_id: u64) {
        if let Some(session) = lock(&self.inner.agents).get_mut(&platform) {
            if session.connection_id == connection_id {
                session.last_seen = Utc::now();
            }
        }
    }

    /// Deliver a reply to its waiting dispatch.
    ///
    /// Returns `false` when no dispatch is waiting for `command_id`, e.g. a
    /// reply that arrives after its dispatch timed out. Such replies are
    /// discarded.
    pub fn resolve(&self, command_id: &str, result: ExecutionResult) -> bool {
        let pending = lock(&self.inner.pending).remove(command_id);
        match pending {
            Some(pending) => pending.reply.send(result).is_ok(),
            None => {
                debug!(%command_id, "Discarding late or unknown result");
                false
            }
        }
    }

    fn outbound_for(&self, platform: ShellVariant) -> Option<(u64, mpsc::UnboundedSender<Message>)> {
        lock(&self.inner.agents)
            .get(&platform)
            .map(|session| (session.connection_id, session.outbound.clone()))
    }

    /// Send a command to the agent for `platform` and wait for its reply.
    ///
    /// # Errors
    /// - [`Error::NoAgent`] if no agent is registered for `platform`
    /// - [`Error::DispatchTimeout`] if no reply arrives within `timeout`
    /// - [`Error::TransportClosed`] if the agent disconnects first
    pub async fn try_dispatch(&self, platform: ShellVariant, command: &str, timeout: Duration) -> Result<ExecutionResult> {
        let (connection_id, outbound) = self.outbound_for(platform).ok_or(Error::NoAgent(platform))?;

        let command_id = format!("{platform}_{}", Uuid::new_v4().simple());
        let (reply, waiter) = oneshot::channel();
        lock(&self.inner.pending).insert(command_id.clone(), PendingDispatch { connection_id, reply });
        let _guard = PendingGuard {
            server: self,
            command_id: command_id.clone(),
        };

        let envelope = CommandEnvelope {
            command_id: command_id.clone(),
            command: command.to_string(),
            timeout_seconds: whole_seconds(timeout).max(1),
        };
        outbound.send(Message::execute(envelope)).map_err(|_| Error::TransportClosed)?;
        info!(%platform, %command_id, "Command sent: {}", command);

        let result = match tokio::time::timeout(timeout, waiter).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => return Err(Error::TransportClosed),
            Err(_) => return Err(Error::dispatch_timeout(timeout)),
        };

        info!(%platform, %command_id, success = result.success, "Command completed");
        if let Err(e) = self.inner.store.append(platform, command, &result).await {
            warn!(%platform, "Failed to persist session entry: {:#}", e);
        }

        Ok(result)
    }

    /// Like [`Server::try_dispatch`], with every error folded into a failed result
    pub async fn dispatch(&self, platform: ShellVariant, command: &str, timeout: Duration) -> ExecutionResult {
        match self.try_dispatch(platform, command, timeout).await {
            Ok(result) => result,
            Err(e @ (Error::NoAgent(_) | Error::DispatchTimeout(_))) => {
                error!(%platform, "{}", e);
                ExecutionResult::failure(platform, e.to_string())
            }
            Err(e) => {
                error!(%platform, "Command execution failed: {}", e);
                ExecutionResult::failure(platform, format!("Command execution failed: {e}"))
            }
        }
    }

    /// Ask an agent to answer with `pong`
    ///
    /// # Errors
    /// Returns [`Error::NoAgent`] if no agent is registered for `platform`
    pub fn ping(&self, platform: ShellVariant) -> Result<()> {
        self.send_to(platform, Message::ping())
    }

    /// Ask an agent to stop
    ///
    /// # Errors
    /// Returns [`Error::NoAgent`] if no agent is registered for `platform`
    pub fn shutdown_agent(&self, platform: ShellVariant) -> Result<()> {
        self.send_to(platform, Message::Shutdown)
    }

    fn send_to(&self, platform: ShellVariant, message: Message) -> Result<()> {
        let (_, outbound) = self.outbound_for(platform).ok_or(Error::NoAgent(platform))?;
        outbound.send(message).map_err(|_| Error::TransportClosed)
    }

    #[must_use]
    pub fn connected_agents(&self) -> Vec<ShellVariant> {
        let mut platforms: Vec<_> = lock(&self.inner.agents).keys().copied().collect();
        platforms.sort();
        platforms
    }

    #[must_use]
    pub fn pending_commands(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    #[must_use]
    pub fn status(&self) -> ServerStatus {
        let mut connected_agents: Vec<AgentSummary> = lock(&self.inner.agents)
            .iter()
            .map(|(platform, session)| AgentSummary {
                platform: *platform,
                hostname: session.host.hostname.clone(),
                system: session.host.system.clone(),
                registered_at: session.registered_at,
                last_seen: session.last_seen,
            })
            .collect();
        connected_agents.sort_by_key(|agent| agent.platform);

        ServerStatus {
            connected_agents,
            pending_commands: self.pending_commands(),
            session_root: self.inner.store.root().to_path_buf(),
            server_time: Utc::now(),
        }
    }

    async fn log_event(&self, event_type: &str, data: serde_json::Value) {
        if let Err(e) = self.inner.store.log_event(event_type, data).await {
            warn!("Failed to record {} event: {:#}", event_type, e);
        }
    }
}
