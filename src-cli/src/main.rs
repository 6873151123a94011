//! audioflow - raw audio between devices and stdio
//!
//! `record` writes captured sample bytes to stdout, `play` sends stdin to an
//! output device, `loopback` feeds a device's input straight to its output.
//! Logs go to stderr (`RUST_LOG` controls the filter).

mod options;

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::BytesMut;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use audioflow_core::{StreamEvent, StreamEvents};
use audioflow_engine::{get_devices, get_host_apis, open};

use crate::options::{Directions, StreamArgs};

#[derive(Parser, Debug)]
#[command(author, version, about = "Flow-controlled raw audio streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List audio devices as JSON
    Devices,

    /// List host APIs as JSON
    Hosts,

    /// Capture raw samples to stdout
    Record {
        #[command(flatten)]
        stream: StreamArgs,

        /// Stop after this many seconds (Ctrl-C stops earlier)
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },

    /// Play raw samples from stdin until end of input
    Play {
        #[command(flatten)]
        stream: StreamArgs,
    },

    /// Route a device's input to its output
    Loopback {
        #[command(flatten)]
        stream: StreamArgs,

        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("audioflow=info,audioflow_core=info,audioflow_engine=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Devices => print_json(&get_devices()),
        Command::Hosts => print_json(&get_host_apis()),
        Command::Record { stream, seconds } => record(&stream, Duration::from_secs(seconds)).await,
        Command::Play { stream } => play(&stream).await,
        Command::Loopback { stream, seconds } => {
            loopback(&stream, Duration::from_secs(seconds)).await
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn record(args: &StreamArgs, duration: Duration) -> Result<()> {
    let stream = open(args.options(Directions::Input)?)?
        .into_readable()
        .context("record needs an input stream")?;
    let mut stdout = tokio::io::stdout();

    stream.start()?;
    info!(?duration, "Recording");

    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    let mut total = 0usize;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            buffer = stream.read() => match buffer {
                Some(buffer) => {
                    let buffer = buffer?;
                    total += buffer.len();
                    stdout.write_all(buffer.data()).await?;
                }
                None => break,
            },
        }
    }

    stream.quit().await?;
    // Buffers captured before the engine stopped are still ours
    while let Some(buffer) = stream.read().await {
        let buffer = buffer?;
        total += buffer.len();
        stdout.write_all(buffer.data()).await?;
    }
    stdout.flush().await?;

    report_events(stream.events());
    info!(bytes = total, "Recording finished");
    Ok(())
}

async fn play(args: &StreamArgs) -> Result<()> {
    let stream = open(args.options(Directions::Output)?)?
        .into_writable()
        .context("play needs an output stream")?;
    let config = stream.config().clone();
    let bytes_per_frame = config.bytes_per_frame();
    let chunk_size = (config.high_water_mark / 4).max(bytes_per_frame);

    stream.start()?;
    info!(rate = config.sample_rate, channels = config.channel_count, "Playing stdin");

    let mut stdin = tokio::io::stdin();
    let mut pending = BytesMut::with_capacity(chunk_size * 2);
    let mut total = 0usize;
    loop {
        pending.reserve(chunk_size);
        let read = stdin.read_buf(&mut pending).await?;
        let whole = pending.len() / bytes_per_frame * bytes_per_frame;
        if whole >= chunk_size || (read == 0 && whole > 0) {
            total += whole;
            // Errors also surface as events; the stream decides whether it closes
            let _ack = stream.write(pending.split_to(whole).freeze()).await?;
        }
        if read == 0 {
            break;
        }
    }
    if !pending.is_empty() {
        warn!(bytes = pending.len(), "Dropping trailing partial frame");
    }

    stream.end().await?;
    report_events(stream.events());
    info!(bytes = total, "Playback finished");
    Ok(())
}

async fn loopback(args: &StreamArgs, duration: Duration) -> Result<()> {
    let stream = open(args.options(Directions::Duplex)?)?
        .into_duplex()
        .context("loopback needs a duplex stream")?;

    stream.start()?;
    info!(?duration, "Looping input to output");

    tokio::select! {
        piped = stream.loopback() => {
            let bytes = piped?;
            debug!(bytes, "Input ended");
        }
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    stream.quit().await?;
    report_events(stream.events());
    Ok(())
}

fn report_events(events: &StreamEvents) {
    for event in events.drain() {
        match event {
            StreamEvent::Error(err) => warn!("Stream error: {}", err),
            StreamEvent::DataAvailable { .. } => {}
            other => debug!(event = ?other, "Stream event"),
        }
    }
}
