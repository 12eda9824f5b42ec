//! AVO command-line tool.
//!
//! ```text
//! avo serve                    Stream the test pattern over UDP
//! avo watch                    Connect to a server and log frames
//! avo record <file.avo>        Record the test pattern to an archive
//! avo play <file.avo>          Play an archive at its recorded cadence
//! avo inspect <file.avo>       Print archive metadata
//! avo --gen-config             Write the default config to stdout
//! ```

mod config;
mod pattern;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use avo_core::{
    diff_percentage, ArchiveReader, ArchiveWriter, FrameSink, PlaybackScheduler, StreamClient,
    StreamServer,
};

use config::AvoConfig;
use pattern::PatternGenerator;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "avo", about = "AVO UDP video streaming and archive tool")]
struct Cli {
    /// Path to the configuration TOML file.
    #[arg(short, long, default_value = "avo.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream the synthetic test pattern to the registered receiver.
    Serve {
        /// Bind address, `IP:PORT` (overrides the config).
        #[arg(long)]
        bind: Option<String>,
    },
    /// Connect to a server and log the received stream.
    Watch {
        /// Server host (overrides the config).
        #[arg(long)]
        host: Option<String>,
        /// Server port (overrides the config).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Record the synthetic test pattern into an `.avo` archive.
    Record {
        /// Output archive path.
        output: PathBuf,
        /// Number of frames to record.
        #[arg(long, default_value_t = 90)]
        frames: u32,
    },
    /// Play an `.avo` archive at its recorded cadence.
    Play {
        /// Input archive path.
        input: PathBuf,
    },
    /// Print an archive's header and frame statistics.
    Inspect {
        /// Input archive path.
        input: PathBuf,
    },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        println!("{}", AvoConfig::default_toml()?);
        return Ok(());
    }

    let cfg = AvoConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Some(Command::Serve { bind }) => serve(&cfg, bind).await,
        Some(Command::Watch { host, port }) => watch(&cfg, host, port).await,
        Some(Command::Record { output, frames }) => record(&cfg, &output, frames),
        Some(Command::Play { input }) => play(&input),
        Some(Command::Inspect { input }) => inspect(&input),
        None => {
            eprintln!("no command given; try `avo --help`");
            std::process::exit(2);
        }
    }
}

// ── Serve ────────────────────────────────────────────────────────

async fn serve(cfg: &AvoConfig, bind: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = bind.unwrap_or_else(|| cfg.network.bind_addr.clone()).parse()?;
    let server = StreamServer::start(addr, cfg.server_config()).await?;
    info!(addr = %server.local_addr()?, "serving; waiting for a receiver (Ctrl-C to stop)");

    let mut source = PatternGenerator::new(cfg.video.width, cfg.video.height);
    let frame_interval = (1000 / u64::from(cfg.video.fps.max(1))).max(1);
    let mut ticker = tokio::time::interval(Duration::from_millis(frame_interval));
    let mut last_stats = Instant::now();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                server.submit(source.next_frame())?;
                if last_stats.elapsed() >= Duration::from_secs(2) {
                    let stats = server.stats();
                    info!(
                        frames = stats.frames_processed,
                        sent_kib = stats.bytes_sent / 1024,
                        packets = stats.packets_sent,
                        dropped = stats.buffer_dropped,
                        client = server.has_client(),
                        "stats"
                    );
                    last_stats = Instant::now();
                }
            }
        }
    }

    let stats = server.stats();
    server.stop().await;
    info!(
        frames = stats.frames_processed,
        sent_kib = stats.bytes_sent / 1024,
        "streaming finished"
    );
    Ok(())
}

// ── Watch ────────────────────────────────────────────────────────

async fn watch(
    cfg: &AvoConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let host = host.unwrap_or_else(|| cfg.network.server_host.clone());
    let port = port.unwrap_or(cfg.network.server_port);

    let mut client = StreamClient::connect(&host, port, cfg.client_config()).await?;
    info!(%host, port, "connected; receiving (Ctrl-C to stop)");

    let received = Arc::new(AtomicU64::new(0));
    let sink: FrameSink = {
        let received = Arc::clone(&received);
        Arc::new(move |_frame, width, height, is_full| {
            let count = received.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 30 == 0 {
                info!(count, width, height, is_full, "frame");
            }
        })
    };
    client.start_receiver(sink);

    tokio::signal::ctrl_c().await?;

    let stats = client.stats();
    client.disconnect().await;
    info!(
        decoded = stats.frames_decoded,
        packets = stats.packets_received,
        received_kib = stats.bytes_received / 1024,
        dropped = stats.frames_dropped,
        "receive finished"
    );
    Ok(())
}

// ── Record ───────────────────────────────────────────────────────

fn record(
    cfg: &AvoConfig,
    output: &PathBuf,
    frames: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let (width, height, fps) = (cfg.video.width, cfg.video.height, cfg.video.fps);
    let delay_ms = 1000 / fps.max(1);

    let mut writer = ArchiveWriter::create(output, width, height, fps)?;
    let mut source = PatternGenerator::new(width, height);
    let mut prev: Option<Vec<u8>> = None;

    for index in 0..frames {
        let frame = source.next_frame();
        writer.record(&frame.data, if index == 0 { 0 } else { delay_ms })?;
        if let Some(prev) = &prev {
            debug!(
                index,
                changed_pct = diff_percentage(prev, &frame.data, width, height),
                "recorded"
            );
        }
        prev = Some(frame.data);
    }
    writer.finish()?;

    let raw_bytes = u64::from(frames) * avo_core::frame_len(width, height) as u64;
    let file_bytes = std::fs::metadata(output)?.len();
    info!(
        path = %output.display(),
        frames,
        file_kib = file_bytes / 1024,
        ratio_pct = file_bytes * 100 / raw_bytes.max(1),
        "archive written"
    );
    Ok(())
}

// ── Play ─────────────────────────────────────────────────────────

fn play(input: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let reader = ArchiveReader::open(input)?;
    let header = *reader.header();
    let frames = reader.read_all()?;
    info!(
        width = header.width,
        height = header.height,
        fps = header.fps,
        frames = frames.len(),
        "playing"
    );

    let scheduler = PlaybackScheduler::new();
    let started = Instant::now();
    let mut shown = 0u32;
    scheduler.play(&frames, |frame| {
        shown += 1;
        debug!(shown, delay_ms = frame.delay_ms, "frame");
    });

    info!(
        shown,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "playback finished"
    );
    Ok(())
}

// ── Inspect ──────────────────────────────────────────────────────

fn inspect(input: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let reader = ArchiveReader::open(input)?;
    let header = *reader.header();
    println!("{}", input.display());
    println!("  geometry:     {}x{}", header.width, header.height);
    println!("  fps:          {} (0 = use recorded delays)", header.fps);
    println!("  frames:       {}", header.total_frames);
    println!("  keyframe:     {} bytes", header.first_frame_size);

    let frames = reader.read_all()?;
    let total_delay: u64 = frames.iter().map(|f| u64::from(f.delay_ms)).sum();
    println!("  duration:     {} ms (recorded delays)", total_delay);
    println!(
        "  file size:    {} bytes",
        std::fs::metadata(input)?.len()
    );
    Ok(())
}
