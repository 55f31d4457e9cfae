//! Pairing of engine responses with the requests that produced them
//!
//! A batch is written by a separate task while the caller reads, so neither
//! side can fill a pipe buffer and wait on the other. The engine may answer
//! in any order; every response echoes its input, and results are handed
//! back in submission order by looking each input up by that echo.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace, warn};
use tokio::io::AsyncWriteExt;
use tokio::task::{JoinError, JoinHandle};

use crate::engine::{EngineError, EngineResult};
use crate::error::{BridgeError, Result};
use crate::format::ParseResult;
use crate::session::{EngineSession, RequestSink};

type WriterOutcome = (RequestSink, EngineResult<()>);

enum Event {
    Line(EngineResult<String>),
    Written(std::result::Result<WriterOutcome, JoinError>),
}

/// Send one sanitized name and decode the single response
pub async fn exchange_one(session: &mut EngineSession, line: &str) -> Result<ParseResult> {
    session.begin_exchange();
    if let Err(e) = session.write_line(line).await {
        return Err(session.failure(e).await);
    }

    let response = match session.read_response().await {
        Ok(response) => response,
        Err(e) => return Err(session.failure(e).await),
    };
    session.end_exchange();

    session.decoder().decode(&response).inspect_err(|e| {
        warn!("Undecodable response for {:?}: {}", line, e);
    })
}

async fn write_requests(mut sink: RequestSink, lines: Arc<[String]>) -> WriterOutcome {
    let result = async {
        for line in lines.iter() {
            trace!("> {}", line);
            sink.write_all(line.as_bytes()).await?;
            sink.write_all(b"\n").await?;
        }
        sink.flush().await
    }
    .await
    .map_err(EngineError::WriteError);

    (sink, result)
}

/// Send a batch of sanitized names and return results in the same order
///
/// Exactly `lines.len()` responses are read even when some fail to decode,
/// so the stream stays aligned for the next call; the first decode error is
/// reported afterwards.
pub async fn exchange_batch(
    session: &mut EngineSession,
    lines: Arc<[String]>,
) -> Result<Vec<ParseResult>> {
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let decoder = session.decoder();
    session.begin_exchange();
    let sink = match session.take_requests() {
        Ok(sink) => sink,
        Err(e) => return Err(session.failure(e).await),
    };
    let mut writer: Option<JoinHandle<WriterOutcome>> =
        Some(tokio::spawn(write_requests(sink, Arc::clone(&lines))));

    let mut keyed: HashMap<String, ParseResult> = HashMap::with_capacity(lines.len());
    let mut first_error: Option<BridgeError> = None;
    let mut received = 0;

    debug!("Session {}: batch of {} names", session.id(), lines.len());

    while received < lines.len() {
        let event = match writer.as_mut() {
            Some(handle) => tokio::select! {
                line = session.read_response() => Event::Line(line),
                joined = handle => Event::Written(joined),
            },
            None => Event::Line(session.read_response().await),
        };

        match event {
            Event::Written(joined) => {
                writer = None;
                if let Err(e) = session.finish_writer(joined) {
                    warn!(
                        "Batch writer failed with {} responses pending",
                        lines.len() - received
                    );
                    return Err(session.failure(e).await);
                }
            }
            Event::Line(Ok(response)) => {
                received += 1;
                match decoder.decode(&response) {
                    Ok(result) => {
                        keyed.insert(result.verbatim.clone(), result);
                    }
                    Err(e) => {
                        warn!("Undecodable response in batch: {}", e);
                        first_error.get_or_insert(e);
                    }
                }
            }
            Event::Line(Err(e)) => {
                if let Some(handle) = writer.take() {
                    handle.abort();
                }
                return Err(session.failure(e).await);
            }
        }
    }

    if let Some(handle) = writer {
        if let Err(e) = session.finish_writer(handle.await) {
            return Err(session.failure(e).await);
        }
    }
    session.end_exchange();

    if let Some(e) = first_error {
        return Err(e);
    }

    reassemble(&lines, keyed)
}

/// Order results by the inputs that produced them
pub fn reassemble(
    lines: &[String],
    keyed: HashMap<String, ParseResult>,
) -> Result<Vec<ParseResult>> {
    lines
        .iter()
        .map(|line| {
            keyed.get(line).cloned().ok_or_else(|| {
                BridgeError::MalformedResponse(format!("no response echoed input {:?}", line))
            })
        })
        .collect()
}
