//! pcfusion
//!
//! Fuses synchronized multi-camera depth+color recordings into rendered views.
//!
//! Features:
//! - Calibrated PNG-sequence recordings or a procedural camera rig
//! - BlendPCR, plain mesh or point splat rendering, mono or stereo
//! - Configurable filter chain
//! - PNG output and stage telemetry

mod app;
mod config;
mod errors;
mod presenter;

use app::{RunOptions, SourceSpec};
use clap::{Parser, ValueEnum};
use config::{AppConfig, RendererKind};
use pcfusion_capture::Pacing;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RendererArg {
    BlendPcr,
    SimpleMesh,
    Splats,
}

impl From<RendererArg> for RendererKind {
    fn from(arg: RendererArg) -> Self {
        match arg {
            RendererArg::BlendPcr => RendererKind::BlendPcr,
            RendererArg::SimpleMesh => RendererKind::SimpleMesh,
            RendererArg::Splats => RendererKind::Splats,
        }
    }
}

/// pcfusion - multi-camera point cloud fusion
#[derive(Parser, Debug)]
#[command(name = "pcfusion")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Calibration JSON naming one recording directory per camera
    #[arg(long, conflicts_with = "synthetic")]
    calibration: Option<PathBuf>,

    /// Use a procedural rig with this many cameras
    #[arg(long)]
    synthetic: Option<usize>,

    /// Session configuration JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to write rendered PNG frames into
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after this many rendered frames
    #[arg(short, long)]
    frames: Option<usize>,

    /// Integrate every frame instead of skipping to the newest
    #[arg(long)]
    lockstep: bool,

    /// Restart the recording when it ends
    #[arg(long = "loop")]
    looping: bool,

    /// Number of output views (1 = mono, 2 = stereo)
    #[arg(long)]
    views: Option<usize>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long, value_enum)]
    renderer: Option<RendererArg>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Send spans to Tracy (needs the `tracy` feature)
    #[arg(long)]
    tracy: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if self.lockstep {
            config.session.pacing = Pacing::Lockstep;
        }
        if self.looping {
            config.session.looping = true;
        }
        if let Some(views) = self.views {
            config.views = views;
        }
        if let Some(width) = self.width {
            config.output_width = width;
        }
        if let Some(height) = self.height {
            config.output_height = height;
        }
        if let Some(renderer) = self.renderer {
            config.renderer = renderer.into();
        }
    }

    fn source_spec(&self) -> SourceSpec {
        match (&self.calibration, self.synthetic) {
            (Some(path), _) => SourceSpec::Calibration(path.clone()),
            (None, Some(count)) => SourceSpec::Synthetic(count),
            (None, None) => SourceSpec::Synthetic(2),
        }
    }
}

fn init_logging(level: &str, enable_tracy: bool) {
    #[cfg(feature = "tracy")]
    {
        if enable_tracy {
            use tracing_subscriber::Layer;
            use tracing_subscriber::layer::SubscriberExt;
            use tracing_subscriber::util::SubscriberInitExt;
            tracing_subscriber::registry()
                .with(tracing_tracy::TracyLayer::default())
                .with(
                    tracing_subscriber::fmt::layer().with_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env()
                            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
                    ),
                )
                .init();
            return;
        }
    }
    #[cfg(not(feature = "tracy"))]
    {
        if enable_tracy {
            eprintln!("--tracy ignored: built without the `tracy` feature");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level, args.tracy);

    let mut config = match &args.config {
        Some(path) => match AppConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Application error: {}", e);
                std::process::exit(1);
            }
        },
        None => AppConfig::default(),
    };
    args.apply(&mut config);

    let options = RunOptions {
        sources: args.source_spec(),
        output: args.output.clone(),
        frames: args.frames,
    };
    match app::run(config, options) {
        Ok(summary) => {
            let t = summary.telemetry;
            println!("Rendered {} frames", summary.rendered);
            println!(
                "  streaming {:.2} ms | filters {:.2} ms | integration {:.2} ms | render {:.2} ms",
                t.streaming_ms, t.filter_ms, t.integration_ms, t.render_ms
            );
            println!(
                "  processed {} | dropped {} | incomplete {} (skipped {})",
                t.processed, t.dropped, t.incomplete, t.skipped
            );
        }
        Err(e) => {
            eprintln!("Application error: {}", e);
            std::process::exit(1);
        }
    }
}
