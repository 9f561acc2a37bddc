//! Status inference for interactive coding-agent sessions.
//!
//! Agents report through two kinds of files in a shared directory: a
//! periodic heartbeat written by the status-line probe and a lifecycle
//! record written by hooks. The [`registry`] scans those files, checks that
//! the owning processes are still alive and publishes one [`status`] per
//! session.

pub mod command;
pub mod config;
pub mod error;
pub mod hook;
pub mod liveness;
pub mod probe;
pub mod records;
pub mod registry;
pub mod status;
pub mod tmux;

pub use config::Config;
pub use error::{BeaconError, Result};
pub use registry::{Registry, RegistrySettings, SessionView};
pub use status::SessionStatus;
