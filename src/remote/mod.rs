//! Remote execution over a persistent WebSocket connection
//!
//! - [`server`]: accepts agents and dispatches commands to them
//! - [`agent`]: runs on a target host and executes what the server sends
//! - [`protocol`]: the JSON messages both sides exchange

pub mod agent;
pub mod protocol;
pub mod server;

pub use agent::{Agent, AgentExit, AgentOptions, AgentState};
pub use protocol::{CommandEnvelope, HostInfo, Message};
pub use server::{AgentSummary, Server, ServerStatus};
