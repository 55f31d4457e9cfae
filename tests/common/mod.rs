//! In-memory stand-in for the parsing engine
#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};
use tokio::time::timeout;
use uuid::Uuid;

use namebridge::engine::{EngineError, EngineLauncher, EngineResult, EngineStreams, IdentitySource};
use namebridge::format::OutputFormat;

pub const HEADER: &str =
    "Id,Verbatim,Cardinality,CanonicalFull,CanonicalSimple,CanonicalStem,Authorship,Year,Quality";

/// How the engine emits the responses for a window of requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    InOrder,
    Reversed,
    Shuffled(u64),
}

#[derive(Debug, Clone)]
pub struct FakeOptions {
    /// Requests collected before answering; an idle input flushes early
    pub window: usize,
    pub emission: Emission,
    /// Close the result stream after answering this many requests
    pub die_after: Option<usize>,
    /// Stop reading requests after answering this many, keeping results open
    pub stop_reading_after: Option<usize>,
    /// Answer this input with a line that is not a record
    pub garbage_for: Option<String>,
    pub header: String,
    /// Capacity of the in-memory pipes, in bytes
    pub pipe_capacity: usize,
    pub version: Option<String>,
}

impl Default for FakeOptions {
    fn default() -> Self {
        Self {
            window: 1,
            emission: Emission::InOrder,
            die_after: None,
            stop_reading_after: None,
            garbage_for: None,
            header: HEADER.to_string(),
            pipe_capacity: 4096,
            version: Some("test_version".to_string()),
        }
    }
}

/// What the fake engines have seen so far
#[derive(Default)]
pub struct FakeState {
    pub launches: AtomicUsize,
    pub fail_launch: AtomicBool,
    /// Request lines received, one transcript per launched engine
    pub transcripts: Mutex<Vec<Arc<Mutex<Vec<String>>>>>,
}

impl FakeState {
    pub fn transcript(&self, session: usize) -> Vec<String> {
        let transcripts = self.transcripts.lock().unwrap();
        transcripts[session].lock().unwrap().clone()
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

pub struct FakeLauncher {
    pub state: Arc<FakeState>,
    options: FakeOptions,
}

impl FakeLauncher {
    pub fn new(options: FakeOptions) -> (Self, Arc<FakeState>) {
        let state = Arc::new(FakeState::default());
        (
            Self {
                state: Arc::clone(&state),
                options,
            },
            state,
        )
    }
}

#[async_trait]
impl EngineLauncher for FakeLauncher {
    async fn launch(&self, format: OutputFormat) -> EngineResult<EngineStreams> {
        if self.state.fail_launch.load(Ordering::SeqCst) {
            return Err(EngineError::SpawnError(io::Error::new(
                io::ErrorKind::NotFound,
                "fake engine binary not found",
            )));
        }
        self.state.launches.fetch_add(1, Ordering::SeqCst);

        let transcript = Arc::new(Mutex::new(Vec::new()));
        self.state.transcripts.lock().unwrap().push(Arc::clone(&transcript));

        let (requests, engine_in) = duplex(self.options.pipe_capacity);
        let (engine_out, results) = duplex(self.options.pipe_capacity);
        tokio::spawn(run_engine(
            format,
            self.options.clone(),
            engine_in,
            engine_out,
            transcript,
        ));

        Ok(EngineStreams {
            requests: Box::new(requests),
            results: Box::new(results),
            diagnostics: None,
            process: None,
        })
    }

    async fn version(&self) -> EngineResult<Option<String>> {
        Ok(self.options.version.clone())
    }

    fn label(&self) -> String {
        "fake-engine".to_string()
    }
}

/// Identity whose value can be changed to simulate a fork
#[derive(Clone, Default)]
pub struct FakeIdentity(pub Arc<AtomicU32>);

impl FakeIdentity {
    pub fn fork(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl IdentitySource for FakeIdentity {
    fn current(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

async fn run_engine(
    format: OutputFormat,
    options: FakeOptions,
    input: DuplexStream,
    mut output: DuplexStream,
    transcript: Arc<Mutex<Vec<String>>>,
) {
    if format == OutputFormat::Csv
        && output
            .write_all(format!("{}\n", options.header).as_bytes())
            .await
            .is_err()
    {
        return;
    }

    let mut rng = match options.emission {
        Emission::Shuffled(seed) => Some(StdRng::seed_from_u64(seed)),
        _ => None,
    };
    let mut lines = BufReader::new(input).lines();
    let mut window: Vec<String> = Vec::new();
    let mut answered = 0usize;

    loop {
        let input = if window.is_empty() {
            match lines.next_line().await {
                Ok(Some(line)) => Input::Line(line),
                _ => Input::Closed,
            }
        } else {
            match timeout(Duration::from_millis(20), lines.next_line()).await {
                Ok(Ok(Some(line))) => Input::Line(line),
                Ok(_) => Input::Closed,
                Err(_) => Input::Idle,
            }
        };

        let closing = matches!(input, Input::Closed);
        if let Input::Line(line) = input {
            transcript.lock().unwrap().push(line.clone());
            window.push(line);
            if window.len() < options.window {
                continue;
            }
        }

        match options.emission {
            Emission::InOrder => {}
            Emission::Reversed => window.reverse(),
            Emission::Shuffled(_) => {
                if let Some(rng) = rng.as_mut() {
                    window.shuffle(rng);
                }
            }
        }

        for name in window.drain(..) {
            if options.die_after == Some(answered) {
                return;
            }
            let response = respond(format, &options, &name);
            if output.write_all(response.as_bytes()).await.is_err() {
                return;
            }
            answered += 1;
        }

        if closing {
            return;
        }

        if options.stop_reading_after == Some(answered) {
            drop(lines);
            return std::future::pending::<()>().await;
        }
    }
}

enum Input {
    Line(String),
    /// No request arrived for a while; answer what is buffered
    Idle,
    Closed,
}

fn respond(format: OutputFormat, options: &FakeOptions, name: &str) -> String {
    if options.garbage_for.as_deref() == Some(name) {
        return "%% not a record %%\n".to_string();
    }

    let record = fake_parse(name);
    match format {
        OutputFormat::Compact => format!("{}\n", record.to_json()),
        OutputFormat::Csv => format!("{}\n", record.to_csv(&options.header)),
    }
}

/// Toy grammar: a capitalized genus followed by lowercase epithets, then authorship
pub struct FakeRecord {
    pub id: String,
    pub verbatim: String,
    pub canonical: Option<String>,
    pub cardinality: usize,
    pub authorship: Option<String>,
    pub year: Option<String>,
}

pub fn fake_parse(name: &str) -> FakeRecord {
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string();
    let words: Vec<&str> = name.split_whitespace().collect();

    let is_genus = |w: &str| {
        let mut chars = w.chars();
        chars.next().is_some_and(|c| c.is_ascii_uppercase())
            && chars.all(|c| c.is_ascii_lowercase())
            && w.len() > 1
    };
    let is_epithet = |w: &str| w.chars().all(|c| c.is_ascii_lowercase());

    let parsed = words.first().is_some_and(|w| is_genus(w));
    if !parsed {
        return FakeRecord {
            id,
            verbatim: name.to_string(),
            canonical: None,
            cardinality: 0,
            authorship: None,
            year: None,
        };
    }

    let epithets = words[1..].iter().take_while(|w| is_epithet(w)).count();
    let name_words = &words[..1 + epithets];
    let rest: Vec<&str> = words[1 + epithets..].to_vec();
    let year = rest
        .iter()
        .map(|w| w.trim_matches(|c: char| !c.is_ascii_digit()))
        .find(|w| w.len() == 4)
        .map(str::to_string);
    let authorship = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" ").replace(',', ""))
    };

    FakeRecord {
        id,
        verbatim: name.to_string(),
        canonical: Some(name_words.join(" ")),
        cardinality: name_words.len(),
        authorship,
        year,
    }
}

impl FakeRecord {
    pub fn to_json(&self) -> String {
        let value = match &self.canonical {
            Some(canonical) => serde_json::json!({
                "id": self.id,
                "parsed": true,
                "quality": 1,
                "verbatim": self.verbatim,
                "normalized": canonical,
                "canonical": {"full": canonical, "simple": canonical, "stemmed": canonical},
                "cardinality": self.cardinality,
                "authorship": self.authorship.as_ref().map(|a| serde_json::json!({
                    "verbatim": a,
                    "normalized": a,
                    "year": self.year,
                })),
                "parserVersion": "test_version",
            }),
            None => serde_json::json!({
                "id": self.id,
                "parsed": false,
                "parserVersion": "test_version",
                "verbatim": self.verbatim,
            }),
        };
        value.to_string()
    }

    pub fn to_csv(&self, header: &str) -> String {
        let canonical = self.canonical.clone().unwrap_or_default();
        let quality = if self.canonical.is_some() { "1" } else { "0" };
        let fields: HashMap<&str, String> = HashMap::from([
            ("Id", self.id.clone()),
            ("Verbatim", self.verbatim.clone()),
            ("Cardinality", self.cardinality.to_string()),
            ("CanonicalFull", canonical.clone()),
            ("CanonicalSimple", canonical.clone()),
            ("CanonicalStem", canonical),
            ("Authorship", self.authorship.clone().unwrap_or_default()),
            ("Year", self.year.clone().unwrap_or_default()),
            ("Quality", quality.to_string()),
        ]);

        header
            .split(',')
            .map(|column| quote(fields.get(column).map(String::as_str).unwrap_or("")))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn quote(field: &str) -> String {
    if field.contains([',', '"']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
