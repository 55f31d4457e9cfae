use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use namebridge::prelude::*;
use namebridge::util::logging;

/// Parse scientific names through an external parsing engine
#[derive(Debug, Parser)]
#[command(name = "namebridge", version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Engine executable, overriding the configuration
    #[arg(long)]
    engine: Option<String>,

    /// Use the engine's csv output instead of compact JSON
    #[arg(short, long)]
    simple: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Names read from stdin are sent to the engine in batches of this size
    #[arg(long, default_value_t = 500)]
    batch_size: usize,

    /// Print the engine's version and exit
    #[arg(long)]
    engine_version: bool,

    /// Names to parse; read from stdin, one per line, when none are given
    names: Vec<String>,
}

async fn emit(stdout: &mut tokio::io::Stdout, results: &[ParseResult]) -> anyhow::Result<()> {
    for result in results {
        let mut line = serde_json::to_string(result)?;
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
    }
    stdout.flush().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut builder = ConfigBuilder::new().add_defaults();
    if let Some(path) = &cli.config {
        builder = builder.add_file(path);
    }
    let mut config = builder
        .add_env("NAMEBRIDGE")
        .build()
        .context("loading configuration")?;

    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(engine) = cli.engine {
        config.engine.program = engine;
    }
    logging::init(&config.log_level);
    debug!("namebridge {} using {}", namebridge::VERSION, config.engine.program);

    let bridge = Bridge::new(&config);

    if cli.engine_version {
        let version = bridge.engine_version().await?;
        println!("{}", version.unwrap_or_else(|| "unknown".to_string()));
        return Ok(());
    }

    let mut stdout = tokio::io::stdout();

    if !cli.names.is_empty() {
        let results = bridge.parse_batch(&cli.names, cli.simple).await?;
        emit(&mut stdout, &results).await?;
    } else {
        let batch_size = cli.batch_size.max(1);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut batch = Vec::with_capacity(batch_size);
        let mut total = 0usize;

        while let Some(line) = lines.next_line().await? {
            batch.push(line);
            if batch.len() == batch_size {
                let results = bridge.parse_batch(&batch, cli.simple).await?;
                emit(&mut stdout, &results).await?;
                total += batch.len();
                batch.clear();
            }
        }

        if !batch.is_empty() {
            let results = bridge.parse_batch(&batch, cli.simple).await?;
            emit(&mut stdout, &results).await?;
            total += batch.len();
        }

        info!("Parsed {} names", total);
    }

    bridge.shutdown().await;
    Ok(())
}
