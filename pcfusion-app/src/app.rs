//! Session setup and the render loop.

use crate::config::{AppConfig, RendererKind};
use crate::errors::AppError;
use crate::presenter::PngPresenter;
use pcfusion_blend::{
    BlendPcr, Compositor, Integrator, Presenter, SharedParams, SimpleMeshRenderer, SplatRenderer, ViewCamera,
};
use pcfusion_capture::{FrameSource, image_sequence_sources, synthetic_rig};
use pcfusion_data::CalibrationDescriptor;
use pcfusion_pipeline::{FilterChain, Pipeline, TelemetrySnapshot};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span};

/// How long the render loop waits for a new result before it assumes the stream ended.
const IDLE_TIMEOUT: Duration = Duration::from_secs(3);

/// Where camera frames come from.
#[derive(Debug, Clone)]
pub enum SourceSpec {
    /// Calibration descriptor naming one image-sequence directory per camera.
    Calibration(PathBuf),
    /// Procedural rig with this many cameras.
    Synthetic(usize),
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub sources: SourceSpec,
    /// Directory for PNG output; nothing is written when unset.
    pub output: Option<PathBuf>,
    /// Stop after this many rendered frames; `None` runs until the stream goes idle.
    pub frames: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub rendered: usize,
    pub telemetry: TelemetrySnapshot,
}

fn open_sources(spec: &SourceSpec, config: &AppConfig) -> Result<Vec<Box<dyn FrameSource>>, AppError> {
    match spec {
        SourceSpec::Synthetic(count) => {
            info!(cameras = count, "Using synthetic rig");
            Ok(synthetic_rig(*count, &config.session)?)
        }
        SourceSpec::Calibration(path) => {
            let calibration = CalibrationDescriptor::load(path)?;
            Ok(image_sequence_sources(
                &calibration,
                config.recording_fov_degrees,
                &config.session,
            )?)
        }
    }
}

pub fn run(config: AppConfig, options: RunOptions) -> Result<RunSummary, AppError> {
    config.validate()?;
    let sources = open_sources(&options.sources, &config)?;
    let chain = FilterChain::from_settings(&config.filters);
    let params = SharedParams::new(config.blend.clone());
    let views = config.view.camera(config.aspect()).views(config.views);
    let mut presenter = options.output.as_ref().map(PngPresenter::new).transpose()?;

    info!(
        renderer = ?config.renderer,
        width = config.output_width,
        height = config.output_height,
        views = views.len(),
        filters = chain.len(),
        "Starting session"
    );

    match config.renderer {
        RendererKind::BlendPcr => {
            let (integrator, compositor) =
                BlendPcr::with_params(params, config.output_width, config.output_height)?.into_parts();
            drive(sources, &config, chain, integrator, compositor, &views, presenter.as_mut(), options.frames)
        }
        RendererKind::SimpleMesh => {
            let (integrator, compositor) =
                SimpleMeshRenderer::with_params(params, config.output_width, config.output_height)?.into_parts();
            drive(sources, &config, chain, integrator, compositor, &views, presenter.as_mut(), options.frames)
        }
        RendererKind::Splats => {
            let (integrator, compositor) =
                SplatRenderer::with_params(params, config.output_width, config.output_height)?.into_parts();
            drive(sources, &config, chain, integrator, compositor, &views, presenter.as_mut(), options.frames)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn drive<I, C>(
    sources: Vec<Box<dyn FrameSource>>,
    config: &AppConfig,
    chain: FilterChain,
    integrator: I,
    mut compositor: C,
    views: &[ViewCamera],
    mut presenter: Option<&mut PngPresenter>,
    frames: Option<usize>,
) -> Result<RunSummary, AppError>
where
    I: Integrator,
    C: Compositor<Input = I::Output>,
{
    let mut pipeline = Pipeline::start(sources, &config.session, chain, integrator)?;
    if !pipeline.control().is_playing() {
        pipeline.control().play();
    }

    let mut seen = 0;
    let mut rendered = 0;
    while frames.is_none_or(|n| rendered < n) {
        let Some((generation, scene)) = pipeline.wait_for_output(seen, IDLE_TIMEOUT) else {
            info!(rendered, "No new output, stopping");
            break;
        };
        if generation > seen + 1 && seen > 0 {
            debug!(skipped = generation - seen - 1, "Render loop fell behind the pipeline");
        }
        seen = generation;

        let _span = info_span!("render", generation).entered();
        let started = Instant::now();
        let frame = compositor.render(&scene, views)?;
        pipeline.record_render(started.elapsed());
        if let Some(presenter) = presenter.as_deref_mut() {
            presenter.present(frame)?;
        }
        rendered += 1;
    }

    let telemetry = pipeline.telemetry();
    pipeline.shutdown();
    Ok(RunSummary { rendered, telemetry })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_calibration_fails_before_start() {
        let options = RunOptions {
            sources: SourceSpec::Calibration(PathBuf::from("/nonexistent/pcfusion/calibration.json")),
            output: None,
            frames: Some(1),
        };
        assert!(matches!(run(AppConfig::default(), options), Err(AppError::Data(_))));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = AppConfig {
            output_width: 0,
            ..AppConfig::default()
        };
        let options = RunOptions {
            sources: SourceSpec::Synthetic(1),
            output: None,
            frames: Some(1),
        };
        assert!(matches!(run(config, options), Err(AppError::Config(_))));
    }
}
