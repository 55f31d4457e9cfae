use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, trace};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::error::{EngineError, EngineResult};

/// Command line used to start an engine process
#[derive(Debug, Clone)]
pub struct EngineCommand {
    /// Program to execute
    program: String,

    /// Arguments to pass to the program
    args: Vec<String>,

    /// Current working directory
    current_dir: Option<PathBuf>,

    /// Environment variables
    env_vars: HashMap<String, String>,
}

impl EngineCommand {
    /// Create a new command
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env_vars: HashMap::new(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for arg in args {
            self.args.push(arg.into());
        }
        self
    }

    /// Set the current working directory
    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add multiple environment variables
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, val) in vars {
            self.env_vars.insert(key.into(), val.into());
        }
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    fn to_tokio(&self) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args);

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        for (key, val) in &self.env_vars {
            cmd.env(key, val);
        }

        cmd
    }

    /// Spawn the engine with all three standard streams piped
    pub fn spawn(&self) -> EngineResult<EngineProcess> {
        debug!("Spawning engine: {} {:?}", self.program, self.args);

        let child = self
            .to_tokio()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        Ok(EngineProcess {
            child,
            program: self.program.clone(),
        })
    }

    /// Run the command to completion and return the first line it printed
    pub async fn first_output_line(&self, limit: Duration) -> EngineResult<Option<String>> {
        let mut cmd = self.to_tokio();
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::null());

        let output = match timeout(limit, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => return Err(EngineError::Timeout(limit)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string))
    }
}

/// Handle to a running engine process
pub struct EngineProcess {
    /// Child process
    child: Child,

    /// Program name
    program: String,
}

impl EngineProcess {
    /// OS process id, if the process has not been reaped yet
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Detach the request, result and diagnostic pipes from the child
    pub fn take_pipes(&mut self) -> EngineResult<(ChildStdin, ChildStdout, ChildStderr)> {
        let stdin = self.child.stdin.take().ok_or(EngineError::MissingPipe("stdin"))?;
        let stdout = self.child.stdout.take().ok_or(EngineError::MissingPipe("stdout"))?;
        let stderr = self.child.stderr.take().ok_or(EngineError::MissingPipe("stderr"))?;
        Ok((stdin, stdout, stderr))
    }

    /// Wait for the process to exit with a timeout
    pub async fn wait_with_timeout(&mut self, limit: Duration) -> EngineResult<ExitStatus> {
        match timeout(limit, self.child.wait()).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(e)) => Err(EngineError::ReadError(e)),
            Err(_) => Err(EngineError::Timeout(limit)),
        }
    }

    /// Send a kill signal without waiting for the process to exit
    pub fn start_kill(&mut self) -> EngineResult<()> {
        self.child.start_kill().map_err(EngineError::KillError)
    }

    /// Kill the process
    pub async fn kill(&mut self) -> EngineResult<()> {
        self.child.kill().await.map_err(EngineError::KillError)
    }
}

/// Forward every line of an engine's diagnostic stream to the log
pub fn drain_diagnostics<R>(label: String, stream: R) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => debug!("[{}] stderr: {}", label, line),
                Ok(None) => break,
                Err(e) => {
                    trace!("[{}] stderr closed: {}", label, e);
                    break;
                }
            }
        }
    })
}
