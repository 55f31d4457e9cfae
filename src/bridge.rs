use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Mutex;

use crate::config::BridgeConfig;
use crate::demux;
use crate::engine::{EngineLauncher, IdentitySource, ProcessIdentity, ProcessLauncher};
use crate::error::{BridgeError, Result};
use crate::format::{OutputFormat, ParseResult};
use crate::sanitize::sanitize;
use crate::session::EngineSession;

type SessionSlot = Mutex<Option<EngineSession>>;

/// Entry point for parsing names through the external engine
///
/// Each output format has its own engine session behind its own lock. A call
/// holds that lock from the identity check until its last response is read,
/// so requests and responses of different callers never interleave.
pub struct Bridge {
    launcher: Arc<dyn EngineLauncher>,
    identity: Arc<dyn IdentitySource>,
    compact: SessionSlot,
    csv: SessionSlot,
    started: AtomicUsize,
    exit_timeout: Duration,
}

impl Bridge {
    /// Bridge that spawns the engine described by `config`
    pub fn new(config: &BridgeConfig) -> Self {
        Self::with_launcher(ProcessLauncher::new(config.engine.clone()), ProcessIdentity)
            .exit_timeout(config.exit_timeout())
    }

    /// Bridge over a custom launcher and identity source
    pub fn with_launcher<L, I>(launcher: L, identity: I) -> Self
    where
        L: EngineLauncher,
        I: IdentitySource,
    {
        Self {
            launcher: Arc::new(launcher),
            identity: Arc::new(identity),
            compact: Mutex::new(None),
            csv: Mutex::new(None),
            started: AtomicUsize::new(0),
            exit_timeout: Duration::from_secs(5),
        }
    }

    /// How long `shutdown` waits for an engine before killing it
    pub fn exit_timeout(mut self, limit: Duration) -> Self {
        self.exit_timeout = limit;
        self
    }

    fn slot(&self, format: OutputFormat) -> &SessionSlot {
        match format {
            OutputFormat::Compact => &self.compact,
            OutputFormat::Csv => &self.csv,
        }
    }

    /// Make sure `slot` holds a session usable by the current process
    async fn ensure_started<'a>(
        &self,
        slot: &'a mut Option<EngineSession>,
        format: OutputFormat,
    ) -> Result<&'a mut EngineSession> {
        let identity = self.identity.current();

        if !slot.as_ref().is_some_and(|s| s.is_usable(identity)) {
            if let Some(old) = slot.take() {
                if old.owner() != identity {
                    warn!(
                        "Process identity changed from {} to {}, respawning {} engine",
                        old.owner(),
                        identity,
                        format
                    );
                } else {
                    debug!("Replacing unusable {} session {}", old.format(), old.id());
                }
                old.discard(identity);
            }

            let session = EngineSession::start(self.launcher.as_ref(), format, identity).await?;
            self.started.fetch_add(1, Ordering::SeqCst);
            *slot = Some(session);
        }

        slot.as_mut()
            .ok_or_else(|| BridgeError::Unavailable(format!("no {} session", format)))
    }

    /// Parse one name; `simple` selects the csv format
    pub async fn parse(&self, name: &str, simple: bool) -> Result<ParseResult> {
        self.parse_as(name, OutputFormat::from_simple(simple)).await
    }

    /// Parse one name in the given format
    pub async fn parse_as(&self, name: &str, format: OutputFormat) -> Result<ParseResult> {
        let line = sanitize(name);
        let mut slot = self.slot(format).lock().await;
        let session = self.ensure_started(&mut slot, format).await?;
        demux::exchange_one(session, &line).await
    }

    /// Parse many names; results come back in input order
    pub async fn parse_batch<S: AsRef<str>>(
        &self,
        names: &[S],
        simple: bool,
    ) -> Result<Vec<ParseResult>> {
        self.parse_batch_as(names, OutputFormat::from_simple(simple)).await
    }

    /// Parse many names in the given format
    pub async fn parse_batch_as<S: AsRef<str>>(
        &self,
        names: &[S],
        format: OutputFormat,
    ) -> Result<Vec<ParseResult>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let lines: Arc<[String]> = names
            .iter()
            .map(|name| sanitize(name.as_ref()).into_owned())
            .collect();

        let mut slot = self.slot(format).lock().await;
        let session = self.ensure_started(&mut slot, format).await?;
        demux::exchange_batch(session, lines).await
    }

    /// Version string reported by the engine
    pub async fn engine_version(&self) -> Result<Option<String>> {
        self.launcher
            .version()
            .await
            .map_err(|e| BridgeError::Unavailable(e.to_string()))
    }

    /// Number of engine sessions this bridge has started
    pub fn sessions_started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Stop every engine owned by the current process
    ///
    /// Sessions inherited from another process image are dropped without
    /// touching their engine. Later calls start fresh sessions.
    pub async fn shutdown(&self) {
        let identity = self.identity.current();

        for format in [OutputFormat::Compact, OutputFormat::Csv] {
            let mut slot = self.slot(format).lock().await;
            let Some(session) = slot.take() else {
                continue;
            };

            if session.owner() != identity {
                session.discard(identity);
                continue;
            }

            debug!("Shutting down {} session {}", format, session.id());
            if let Err(e) = session.close(self.exit_timeout).await {
                warn!("Error stopping {} engine: {}", format, e);
            }
        }
    }
}
