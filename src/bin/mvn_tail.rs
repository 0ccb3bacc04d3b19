//! mvn-tail: print frames from a motion-capture stream.
//!
//! Connects to a capture server, prints one line per decoded frame and a
//! counter summary on exit. Stops on Ctrl-C or after `--count` frames, and
//! exits with a failure status if the connection cannot be opened or is lost
//! while streaming.

use std::future::Future;
use std::process::ExitCode;
use std::time::UNIX_EPOCH;

use clap::Parser;
use mvn_stream::prelude::*;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "mvn-tail")]
#[command(version)]
#[command(about = "Print frames from a motion-capture stream", long_about = None)]
struct Cli {
    /// Host to bind (UDP) or connect to (TCP)
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port number
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Transport protocol (udp, tcp)
    #[arg(long, default_value = "udp")]
    protocol: Protocol,

    /// Receive buffer size in bytes
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Read timeout in seconds
    #[arg(short, long, default_value_t = 1.0)]
    timeout: f64,

    /// Exit after this many frames
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Print payload bytes as hex
    #[arg(long)]
    hex: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, Error)]
enum TailError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

async fn run(cli: Cli) -> Result<(), TailError> {
    let config = SessionConfig::builder()
        .host(cli.host)
        .port(cli.port)
        .protocol(cli.protocol)
        .buffer_size(cli.buffer_size)
        .timeout_secs(cli.timeout)
        .build()?;

    let mut tail = Tail::new(config);
    tracing::info!("Listening for frames ({})", tail.session.status().config);
    let result = tail.run(cli.count, cli.hex, tokio::signal::ctrl_c()).await;

    let stats = tail.session.stats();
    println!(
        "frames: {} decoded, {} dropped, {} observer failures, {} idle timeouts",
        stats.frames_decoded, stats.frames_dropped, stats.observer_failures, stats.idle_timeouts
    );
    result.map(|_| ())
}

/// A session wired to channels: frames to print, and reasons the connection
/// went down.
struct Tail {
    session: Session,
    frames: mpsc::UnboundedReceiver<Frame>,
    lost: mpsc::UnboundedReceiver<String>,
}

impl Tail {
    fn new(config: SessionConfig) -> Self {
        let session = Session::new(config);
        let (frame_tx, frames) = mpsc::unbounded_channel();
        let (lost_tx, lost) = mpsc::unbounded_channel();

        session.set_connection_observer(move |connected: bool, message: &str| {
            if connected {
                tracing::info!("{message}");
            } else {
                tracing::warn!("{message}");
                let _ = lost_tx.send(message.to_string());
            }
        });
        session.register_frame_observer(move |frame: &Frame| {
            let _ = frame_tx.send(frame.clone());
        });

        Self {
            session,
            frames,
            lost,
        }
    }

    /// Stream until `interrupt` fires, `count` frames are printed or the
    /// connection drops. Returns the number of frames printed.
    async fn run(
        &mut self,
        count: Option<u64>,
        hex: bool,
        interrupt: impl Future,
    ) -> Result<u64, TailError> {
        self.session.connect().await?;
        if !self.session.start_streaming().await {
            self.session.disconnect().await?;
            return Err(StreamError::InvalidState("stream loop failed to start").into());
        }

        tokio::pin!(interrupt);
        let mut printed = 0u64;
        let mut lost = None;
        loop {
            if count.is_some_and(|count| printed >= count) {
                break;
            }
            tokio::select! {
                _ = &mut interrupt => {
                    tracing::info!("Interrupted");
                    break;
                }
                reason = self.lost.recv() => {
                    lost = reason;
                    break;
                }
                frame = self.frames.recv() => {
                    let Some(frame) = frame else { break };
                    print_frame(&frame, hex);
                    printed += 1;
                }
            }
        }

        self.session.disconnect().await?;
        match lost {
            Some(reason) => Err(TailError::ConnectionLost(reason)),
            None => Ok(printed),
        }
    }
}

fn print_frame(frame: &Frame, with_hex: bool) {
    let millis = frame
        .timestamp
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    if with_hex {
        println!(
            "{millis} header=0x{:08X} len={} {}",
            frame.header,
            frame.payload_len,
            hex::encode(frame.payload.as_bytes())
        );
    } else {
        println!("{millis} header=0x{:08X} len={}", frame.header, frame.payload_len);
    }
}
