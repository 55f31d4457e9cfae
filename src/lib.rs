//! Bridge between Rust callers and an external, line-oriented scientific name parser
//!
//! The engine runs as a long-lived child process. Names are written to it one
//! per line and each answer line is decoded into a [`ParseResult`]. The bridge
//! serializes access per session, respawns the engine when the current process
//! is no longer the one that started it, and returns batch results in input
//! order whatever order the engine answers in.
//!
//! [`ParseResult`]: format::ParseResult

pub mod bridge;
pub mod config;
pub mod demux;
pub mod engine;
pub mod error;
pub mod format;
pub mod sanitize;
pub mod session;
pub mod util;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::bridge::Bridge;
    pub use crate::config::{BridgeConfig, ConfigBuilder, EngineConfig, LogLevel};
    pub use crate::engine::{EngineLauncher, EngineStreams, IdentitySource, ProcessIdentity};
    pub use crate::error::{BridgeError, Result};
    pub use crate::format::{Canonical, OutputFormat, ParseResult};
    pub use crate::sanitize::sanitize;
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
