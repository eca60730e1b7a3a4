//! Polyshell - cross-shell command dispatch and translation
//!
//! This library runs commands against Linux, macOS, mobile and Windows
//! shells, translates command text between them, converts paths between
//! POSIX and Windows syntax, and forwards commands to remote agents.
//!
//! # Modules
//!
//! - [`config`]: Configuration management and serialization
//! - [`shell`]: Shell variants and local command execution
//! - [`translator`]: Prefix rule tables for command translation
//! - [`paths`]: POSIX and Windows path conversion
//! - [`orchestrator`]: One shell per variant behind a single interface
//! - [`remote`]: Agent and server over WebSocket
//! - [`session`]: Persisted session and event logs

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod paths;
pub mod remote;
pub mod session;
pub mod shell;
pub mod translator;

pub use error::{Error, Result};
