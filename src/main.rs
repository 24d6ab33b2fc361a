use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use opencv::core::Size;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use focus_guardian::app::FrameLoop;
use focus_guardian::audio::LoopingAudio;
use focus_guardian::camera::Camera;
use focus_guardian::config::{Config, Overrides};
use focus_guardian::display::{self, Window};
use focus_guardian::inference::FaceLandmarker;
use focus_guardian::penalty::{PenaltyPlayer, VideoFile};
use focus_guardian::timer::AttentionTimer;

/// Watches the webcam and plays a penalty video while you look away.
#[derive(Parser)]
#[command(name = "focus-guardian")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file. Defaults to `focus-guardian.toml` in the working directory if present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera device index.
    #[arg(long)]
    camera: Option<i32>,

    /// Seconds of looking away before the penalty starts.
    #[arg(long)]
    look_away_limit: Option<f64>,

    /// Write the effective config to this path and exit.
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(&cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let look_away_limit = config.look_away_limit()?;

    if let Some(path) = &cli.write_config {
        config
            .save(path)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        info!("config written to {}", path.display());
        return Ok(());
    }

    let landmarker = FaceLandmarker::load(&config.model_path, config.min_face_presence)
        .context("failed to load face landmark model")?;
    let camera = Camera::new(config.camera_id).context("failed to open camera")?;
    let audio = LoopingAudio::load(&config.audio_path).context("failed to load penalty audio")?;

    let video = VideoFile::new(&config.video_path);
    video.probe().context("failed to open penalty video")?;
    debug!(path = %video.path().display(), "penalty video ready");

    let [width, height] = config.penalty_frame_size;
    let penalty = PenaltyPlayer::new(
        video,
        audio,
        Window::new(&config.penalty_window_title),
        Size::new(width as i32, height as i32),
    );

    let mut frame_loop = FrameLoop::new(
        camera,
        landmarker,
        penalty,
        Window::new(&config.window_title),
        config.thresholds(),
        AttentionTimer::new(look_away_limit),
        config.key_poll_ms,
    );
    let outcome = frame_loop.run();
    drop(frame_loop);

    if let Err(e) = display::close_all() {
        debug!("closing windows failed: {e}");
    }
    outcome.context("monitor loop failed")
}

fn load_config(cli: &Cli) -> Result<Config> {
    let cwd = std::env::current_dir().context("failed to read working directory")?;
    let overrides = Overrides {
        camera_id: cli.camera,
        look_away_limit: cli.look_away_limit,
    };
    Config::layered(cli.config.as_deref(), &overrides, &cwd)
        .context("failed to load configuration")
}
