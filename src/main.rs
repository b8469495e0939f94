use anyhow::Result;
use clap::Parser;
use qrdrone_bridge::config::DecoderKind;
use qrdrone_bridge::scan::SymbolScanner;
use qrdrone_bridge::{BridgeConfig, DroneSession};
use std::io::BufRead;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Headless QR-to-drone bridge; each stdin line is treated as a decoded symbol
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Drone command endpoint
    #[arg(long)]
    drone: Option<SocketAddr>,

    /// Local address for drone responses
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Forward distance in centimeters
    #[arg(long)]
    forward: Option<u32>,

    /// Turn angle in degrees
    #[arg(long)]
    turn: Option<u32>,

    /// Consumer tick interval in milliseconds
    #[arg(long)]
    scan_interval_ms: Option<u64>,

    /// Video source passed to the decoder
    #[arg(long)]
    video_url: Option<String>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Path to the ffmpeg executable
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Run without decoding video
    #[arg(long)]
    no_video: bool,
}

impl Args {
    fn into_config(self) -> BridgeConfig {
        let mut config = BridgeConfig::default();

        if let Some(addr) = self.drone {
            config.drone.address = addr;
        }
        if let Some(addr) = self.listen {
            config.drone.listen_addr = addr;
        }
        if let Some(cm) = self.forward {
            config.command.forward_distance_cm = cm;
        }
        if let Some(deg) = self.turn {
            config.command.turn_angle_deg = deg;
        }
        if let Some(ms) = self.scan_interval_ms {
            config.scan.interval = Duration::from_millis(ms);
        }
        if let Some(url) = self.video_url {
            config.video.source_url = url;
        }
        if let Some(width) = self.width {
            config.video.width = width;
        }
        if let Some(height) = self.height {
            config.video.height = height;
        }
        if let Some(path) = self.ffmpeg {
            config.video.executable = path;
        }
        if self.no_video {
            config.video.decoder = DecoderKind::Disabled;
        }

        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Args::parse().into_config();

    info!("QR drone bridge starting");
    info!("  Drone: {}", config.drone.address);
    info!("  Listen: {}", config.drone.listen_addr);
    info!("  Video: {:?} {}", config.video.decoder, config.video.source_url);

    let tick_interval = config.scan.interval;
    let mut scanner = SymbolScanner::new(config.scan.max_failed_scans);
    let mut session = DroneSession::open(config).await?;

    session.on_response(|response| info!("[DRONE] {}", response));

    // Blocking stdin reads stay off the runtime
    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let mut ticker = tokio::time::interval(tick_interval);
    let mut last_status = session.status().clone();
    let mut last_frame = 0u64;

    info!("Ready: type forward, left or right (blank line = no symbol)");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break;
            }

            line = line_rx.recv() => {
                let Some(line) = line else {
                    info!("Input closed, shutting down");
                    break;
                };
                let decoded = Some(line.as_str()).filter(|l| !l.trim().is_empty());
                let outcome = scanner.observe(decoded);
                session.apply_scan(outcome).await;
            }

            _ = ticker.tick() => {
                session.tick();

                let sequence = session.current_frame().sequence();
                if sequence != last_frame {
                    debug!("Frame #{} ({} skipped)", sequence, sequence - last_frame - 1);
                    last_frame = sequence;
                }
            }
        }

        if session.status() != &last_status {
            last_status = session.status().clone();
            info!("[STATUS] {}", last_status);
        }
    }

    session.close().await;
    info!("QR drone bridge stopped");
    Ok(())
}
