use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

use crate::engine::{
    BoxedReader, BoxedWriter, EngineError, EngineLauncher, EngineProcess, EngineResult,
    drain_diagnostics,
};
use crate::error::{BridgeError, Result};
use crate::format::{CompactDecoder, FieldMapping, OutputFormat, RecordDecoder, decoder_for};

/// Buffered request sink of a session
pub type RequestSink = BufWriter<BoxedWriter>;

/// How long a failed exchange waits for the engine's exit status
const EXIT_GRACE: Duration = Duration::from_millis(250);

/// One running engine instance and everything derived from it
pub struct EngineSession {
    /// Correlates log lines of one engine instance
    id: Uuid,

    /// Engine name for log lines
    label: String,

    format: OutputFormat,

    /// Identity token of the process that created the session
    owner: u32,

    /// Request sink; `None` while a batch writer task holds it
    requests: Option<RequestSink>,

    results: BufReader<BoxedReader>,

    /// Bytes of a response line read so far
    pending: Vec<u8>,

    mapping: Option<Arc<FieldMapping>>,

    decoder: Arc<dyn RecordDecoder>,

    process: Option<EngineProcess>,

    /// Set after a pipe failure; the next call replaces the session
    stale: bool,

    /// Set while requests are written and their responses not yet all read
    in_flight: bool,

    /// Response lines read so far, header excluded
    answered: usize,

    _diagnostics: Option<JoinHandle<()>>,
}

impl EngineSession {
    /// Launch an engine and read its header row if the format has one
    pub async fn start(
        launcher: &dyn EngineLauncher,
        format: OutputFormat,
        owner: u32,
    ) -> Result<Self> {
        let label = launcher.label();
        let streams = launcher
            .launch(format)
            .await
            .map_err(|e| BridgeError::Unavailable(e.to_string()))?;

        let diagnostics = streams
            .diagnostics
            .map(|stream| drain_diagnostics(label.clone(), stream));

        let mut session = Self {
            id: Uuid::new_v4(),
            label,
            format,
            owner,
            requests: Some(BufWriter::new(streams.requests)),
            results: BufReader::new(streams.results),
            pending: Vec::new(),
            mapping: None,
            // replaced below once the header mapping is known
            decoder: Arc::new(CompactDecoder),
            process: streams.process,
            stale: false,
            in_flight: false,
            answered: 0,
            _diagnostics: diagnostics,
        };

        if format.emits_header() {
            let header = match session.read_line().await {
                Ok(header) => header,
                Err(e) => {
                    let reason = format!(
                        "{} exited before printing its header: {}",
                        session.label, e
                    );
                    session.discard(owner);
                    return Err(BridgeError::Unavailable(reason));
                }
            };
            let mapping = match FieldMapping::from_header(&header) {
                Ok(mapping) => mapping,
                Err(e) => {
                    let reason = format!(
                        "{} printed an unusable header {:?}: {}",
                        session.label, header, e
                    );
                    session.discard(owner);
                    return Err(BridgeError::Unavailable(reason));
                }
            };
            trace!("[{}] csv columns {:?}", session.label, mapping.columns());
            let missing = mapping.missing_required();
            if !missing.is_empty() {
                warn!(
                    "[{}] header lacks columns {:?}; rows will not decode",
                    session.label, missing
                );
            }
            session.mapping = Some(Arc::new(mapping));
        }

        session.decoder = decoder_for(format, session.mapping.clone())?;

        debug!(
            "[{}] session {} started for {} format (owner {})",
            session.label, session.id, format, owner
        );

        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn owner(&self) -> u32 {
        self.owner
    }

    pub fn mapping(&self) -> Option<&Arc<FieldMapping>> {
        self.mapping.as_ref()
    }

    /// Decoder bound to this session's field mapping
    pub fn decoder(&self) -> Arc<dyn RecordDecoder> {
        Arc::clone(&self.decoder)
    }

    /// Whether the session may serve a call made under `identity`
    pub fn is_usable(&self, identity: u32) -> bool {
        !self.stale && !self.in_flight && self.owner == identity
    }

    /// Mark the start of an exchange
    ///
    /// Until `end_exchange` the session is unusable. A call dropped in between
    /// leaves responses nobody will read, so the next call replaces the engine.
    pub fn begin_exchange(&mut self) {
        self.in_flight = true;
    }

    /// Mark that every response of the current exchange has been read
    pub fn end_exchange(&mut self) {
        self.in_flight = false;
    }

    pub fn mark_stale(&mut self) {
        if !self.stale {
            warn!("[{}] session {} marked stale", self.label, self.id);
        }
        self.stale = true;
    }

    /// Write one request line and flush it
    pub async fn write_line(&mut self, line: &str) -> EngineResult<()> {
        let sink = self
            .requests
            .as_mut()
            .ok_or_else(|| EngineError::WriterTask("request stream is held by a writer".to_string()))?;

        trace!("[{}] > {}", self.label, line);
        sink.write_all(line.as_bytes()).await.map_err(EngineError::WriteError)?;
        sink.write_all(b"\n").await.map_err(EngineError::WriteError)?;
        sink.flush().await.map_err(EngineError::WriteError)
    }

    /// Read one response line, without its terminator
    ///
    /// Cancel safe: bytes of a partially read line are kept for the next call.
    pub async fn read_line(&mut self) -> EngineResult<String> {
        let read = self
            .results
            .read_until(b'\n', &mut self.pending)
            .await
            .map_err(EngineError::ReadError)?;

        if read == 0 || self.pending.last() != Some(&b'\n') {
            return Err(EngineError::Closed);
        }

        let mut bytes = std::mem::take(&mut self.pending);
        bytes.pop();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }

        let line = String::from_utf8(bytes).map_err(|e| {
            EngineError::ReadError(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        trace!("[{}] < {}", self.label, line);
        Ok(line)
    }

    /// Read the response to a request
    pub async fn read_response(&mut self) -> EngineResult<String> {
        let line = self.read_line().await?;
        self.answered += 1;
        Ok(line)
    }

    /// Error reported for a pipe failure during an exchange
    ///
    /// An engine that exited unsuccessfully before answering anything never
    /// came up, which makes it unavailable rather than a broken conversation.
    pub async fn failure(&mut self, err: EngineError) -> BridgeError {
        let detail = err.to_string();
        let mut reported = BridgeError::from(err);

        if self.answered == 0 {
            if let Some(process) = self.process.as_mut() {
                match process.wait_with_timeout(EXIT_GRACE).await {
                    Ok(status) if !status.success() => {
                        reported = BridgeError::Unavailable(format!(
                            "{} exited with {} before answering: {}",
                            self.label, status, detail
                        ));
                    }
                    Ok(_) => {}
                    Err(e) => trace!("[{}] no exit status: {}", self.label, e),
                }
            }
        }

        if reported.invalidates_session() {
            self.mark_stale();
        }
        reported
    }

    /// Hand the request sink to a writer task
    pub fn take_requests(&mut self) -> EngineResult<RequestSink> {
        self.requests
            .take()
            .ok_or_else(|| EngineError::WriterTask("request stream is held by a writer".to_string()))
    }

    /// Take back the request sink from a finished writer task
    pub fn finish_writer(
        &mut self,
        joined: std::result::Result<(RequestSink, EngineResult<()>), JoinError>,
    ) -> EngineResult<()> {
        let (sink, outcome) = joined?;
        self.requests = Some(sink);
        outcome
    }

    /// Drop a session that will not be used again
    ///
    /// An engine owned by `identity` is told to terminate. One inherited from
    /// another process image is left alone, since it belongs to that process.
    pub fn discard(mut self, identity: u32) {
        if self.owner != identity {
            debug!(
                "[{}] abandoning session {} inherited from {}",
                self.label, self.id, self.owner
            );
            return;
        }

        if let Some(process) = self.process.as_mut() {
            if let Err(e) = process.start_kill() {
                debug!("[{}] engine already gone: {}", self.label, e);
            }
        }
    }

    /// Close the request stream and wait for the engine to exit, killing it on timeout
    pub async fn close(mut self, limit: Duration) -> EngineResult<()> {
        if let Some(mut sink) = self.requests.take() {
            if let Err(e) = sink.shutdown().await {
                debug!("[{}] closing requests: {}", self.label, e);
            }
        }

        let Some(mut process) = self.process.take() else {
            return Ok(());
        };

        match process.wait_with_timeout(limit).await {
            Ok(status) => {
                debug!("[{}] session {} exited with {}", self.label, self.id, status);
                Ok(())
            }
            Err(EngineError::Timeout(_)) => {
                warn!(
                    "[{}] engine did not exit within {:?}, killing it",
                    self.label, limit
                );
                process.kill().await
            }
            Err(e) => Err(e),
        }
    }
}
