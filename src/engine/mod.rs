//! Engine process lifecycle
//!
//! This module starts the external parsing engine, exposes its request,
//! result and diagnostic streams, and reports the identity of the process
//! that owns them.

mod command;
mod error;
mod launcher;

pub use command::{EngineCommand, EngineProcess, drain_diagnostics};
pub use error::{EngineError, EngineResult};
pub use launcher::{BoxedReader, BoxedWriter, EngineLauncher, EngineStreams, ProcessLauncher};

/// Source of the identity token of the current process
///
/// A session records the token it was created under. When the token read at
/// the start of a call differs, the process image has been duplicated since
/// (typically by `fork`) and the inherited pipes must not be used.
pub trait IdentitySource: Send + Sync + 'static {
    fn current(&self) -> u32;
}

/// Identity backed by the OS process id
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessIdentity;

impl IdentitySource for ProcessIdentity {
    fn current(&self) -> u32 {
        std::process::id()
    }
}
