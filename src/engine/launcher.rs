use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::EngineConfig;
use crate::format::OutputFormat;

use super::command::{EngineCommand, EngineProcess};
use super::error::EngineResult;

/// Boxed request sink
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Boxed result or diagnostic source
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// The three streams of a freshly started engine
pub struct EngineStreams {
    /// Request sink (engine stdin)
    pub requests: BoxedWriter,

    /// Result source (engine stdout)
    pub results: BoxedReader,

    /// Diagnostic source (engine stderr), if there is one
    pub diagnostics: Option<BoxedReader>,

    /// The OS process behind the streams, if there is one
    pub process: Option<EngineProcess>,
}

/// Something that can start a parsing engine for a given output format
#[async_trait]
pub trait EngineLauncher: Send + Sync + 'static {
    /// Start a new engine instance
    async fn launch(&self, format: OutputFormat) -> EngineResult<EngineStreams>;

    /// Version string reported by the engine, if it reports one
    async fn version(&self) -> EngineResult<Option<String>> {
        Ok(None)
    }

    /// Short name used in log lines
    fn label(&self) -> String {
        "engine".to_string()
    }
}

/// Launches the engine as a child process
pub struct ProcessLauncher {
    config: EngineConfig,
}

impl ProcessLauncher {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn base_command(&self) -> EngineCommand {
        let mut command = EngineCommand::new(self.config.program.clone())
            .args(self.config.args.iter().cloned())
            .envs(self.config.environment.clone());

        if let Some(dir) = &self.config.working_dir {
            command = command.current_dir(dir);
        }

        command
    }

    /// Full command for one output format
    pub fn command_for(&self, format: OutputFormat) -> EngineCommand {
        let command = self
            .base_command()
            .arg("--format")
            .arg(format.as_arg());

        match self.config.jobs {
            Some(jobs) => command.arg(format!("-j{}", jobs)),
            None => command,
        }
    }
}

#[async_trait]
impl EngineLauncher for ProcessLauncher {
    async fn launch(&self, format: OutputFormat) -> EngineResult<EngineStreams> {
        let command = self.command_for(format);
        let mut process = command.spawn().inspect_err(|e| {
            error!("Failed to start {}: {}", command.program(), e);
        })?;
        let (stdin, stdout, stderr) = process.take_pipes()?;

        debug!(
            "Started {} ({}) as pid {:?}",
            process.program(),
            format,
            process.id()
        );

        Ok(EngineStreams {
            requests: Box::new(stdin),
            results: Box::new(stdout),
            diagnostics: Some(Box::new(stderr)),
            process: Some(process),
        })
    }

    async fn version(&self) -> EngineResult<Option<String>> {
        self.base_command()
            .arg("--version")
            .first_output_line(Duration::from_secs(10))
            .await
    }

    fn label(&self) -> String {
        self.config.program.clone()
    }
}
