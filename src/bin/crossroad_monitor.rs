//! crossroad_monitor - Stream live vehicle detections for up to four crossroad lanes.
//!
//! For each lane given on the command line this tool:
//! 1. Uploads the lane's video to the detection service
//! 2. Opens a live detection channel for the returned resource
//! 3. Renders the per-lane counts and crossroad totals as they stream in
//!
//! Ctrl-C closes every channel before exiting.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crossroad_monitor::{dashboard, Coordinator, Lane, MonitorConfig, VideoPayload};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stream live vehicle detections for up to four crossroad lanes"
)]
struct Args {
    /// Video for the north lane.
    #[arg(long, value_name = "FILE")]
    north: Option<PathBuf>,

    /// Video for the south lane.
    #[arg(long, value_name = "FILE")]
    south: Option<PathBuf>,

    /// Video for the east lane.
    #[arg(long, value_name = "FILE")]
    east: Option<PathBuf>,

    /// Video for the west lane.
    #[arg(long, value_name = "FILE")]
    west: Option<PathBuf>,

    /// JSON config file (service URLs, channel timing, refresh rate).
    #[arg(long, env = "CROSSROAD_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Upload endpoint; overrides the config file.
    #[arg(long, value_name = "URL")]
    upload_url: Option<String>,

    /// Streaming endpoint (ws://); overrides the config file.
    #[arg(long, value_name = "URL")]
    stream_url: Option<String>,

    /// Dashboard refresh interval in milliseconds.
    #[arg(long, value_name = "MS")]
    refresh_ms: Option<u64>,

    /// Exit once every upload has settled and every channel has closed.
    #[arg(long)]
    exit_when_idle: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

impl Args {
    fn lane_inputs(&self) -> Vec<(Lane, PathBuf)> {
        [
            (Lane::North, &self.north),
            (Lane::South, &self.south),
            (Lane::East, &self.east),
            (Lane::West, &self.west),
        ]
        .into_iter()
        .filter_map(|(lane, path)| path.clone().map(|path| (lane, path)))
        .collect()
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = MonitorConfig::load_from(args.config.as_deref())?;
    if let Some(url) = &args.upload_url {
        config.upload_url = url.clone();
    }
    if let Some(url) = &args.stream_url {
        config.stream_url = url.clone();
    }
    if let Some(ms) = args.refresh_ms {
        config.refresh = Duration::from_millis(ms);
    }
    config.validate()?;

    let inputs = args.lane_inputs();
    if inputs.is_empty() {
        return Err(anyhow!(
            "no lane videos given; pass at least one of --north, --south, --east, --west"
        ));
    }

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    log::info!("Crossroad monitor starting");
    log::info!("  Upload endpoint: {}", config.upload_url);
    log::info!("  Stream endpoint: {}", config.stream_url);
    log::info!(
        "  Lanes: {}",
        inputs
            .iter()
            .map(|(lane, _)| lane.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut coordinator = Coordinator::connect(&config).context("configure detection service")?;

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("install Ctrl-C handler")?;

    {
        let _stage = ui.stage("Submit lane videos");
        for (lane, path) in inputs {
            let payload = VideoPayload::from_path(&path)
                .with_context(|| format!("read {} video {}", lane, path.display()))?;
            if let Err(e) = coordinator.submit(lane, payload) {
                log::warn!("Skipping lane: {}", e);
            }
        }
    }

    let mut live = ui.live("Streaming detections");
    let mut last_board = String::new();
    let mut last_render: Option<Instant> = None;
    loop {
        if stop_rx.try_recv().is_ok() {
            log::info!("shutdown signal received, closing channels...");
            break;
        }

        coordinator.wait_event(config.refresh);

        let due = last_render.map_or(true, |at| at.elapsed() >= config.refresh);
        if due {
            let board = dashboard::render(&coordinator);
            if board != last_board {
                live.show(&board);
                last_board = board;
            }
            live.update(&dashboard::summary(coordinator.aggregate()));
            last_render = Some(Instant::now());
        }

        if args.exit_when_idle && coordinator.is_idle() {
            log::info!("all lanes settled and closed");
            break;
        }
    }
    drop(live);

    coordinator.shutdown();
    Ok(())
}
