//! VLC rc module - spawns and controls an external VLC player over its
//! line-oriented remote-control interface.
//!
//! Architecture:
//! - `process.rs` - Platform launch strategy, binary detection and spawning
//! - `supervisor.rs` - Process lifecycle (attached / daemonized / stopped)
//! - `connection.rs` - Lazily opened TCP connection to the rc socket
//! - `protocol.rs` - Command lines, reply patterns and lenient parsing
//! - `client.rs` - High-level VLC client with command methods

mod client;
mod connection;
mod process;
mod protocol;
mod supervisor;

pub use client::{VlcClient, VlcError};
pub use connection::{Connection, ConnectionError};
pub use process::{Invocation, LaunchStrategy, Platform, ProcessError, MACOS_BUNDLE_EXECUTABLE};
pub use protocol::{
  parse_int, parse_int_lenient, progress_percent, strip_prompt, PlaybackState, RcCommand,
  StatusError, StatusField, StatusReply, LENIENT_DEFAULT, STATUS_LINES,
};
pub use supervisor::{LifecycleEvent, ProcessState, Supervisor, EVENT_CAPACITY};
