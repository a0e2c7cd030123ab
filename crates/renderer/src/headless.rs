//! Still-frame export without a window or GPU.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::camera::OrbitCamera;
use crate::pipeline::{BloomPipeline, FrameContext, FrameReport, PipelineSetup};
use crate::software::SoftwareBackend;
use crate::texture::SceneImage;
use crate::types::RendererConfig;

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct StillFrame {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub report: FrameReport,
}

/// Renders one frame of `config` on the software backend and writes the
/// display image to `output` as PNG.
pub fn render_still(config: &RendererConfig, output: &Path) -> Result<StillFrame> {
    let (requested_width, requested_height) = config.surface_size;
    let mut backend = SoftwareBackend::new(requested_width.max(1), requested_height.max(1));
    let scene = SceneImage::load_or_placeholder(config.scene_image.as_deref());
    let mut pipeline = BloomPipeline::new(
        &mut backend,
        &PipelineSetup {
            scene,
            clear_color: config.clear_color,
            sigma_step: config.sigma_step,
            fovy_degrees: config.camera.fovy_degrees,
        },
    )
    .context("failed to build bloom pipeline")?;

    let view = OrbitCamera::from_settings(&config.camera).view();
    let report = pipeline
        .execute(
            &mut backend,
            &FrameContext {
                view,
                params: config.params,
            },
        )
        .context("failed to render still frame")?;

    let display = backend.display();
    let (width, height) = (display.width(), display.height());
    let image = image::RgbaImage::from_raw(width, height, display.to_rgba8())
        .context("display buffer does not match its dimensions")?;
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    image
        .save_with_format(output, image::ImageFormat::Png)
        .with_context(|| format!("failed to write {}", output.display()))?;
    pipeline.release(&mut backend)?;

    tracing::info!(
        path = %output.display(),
        width,
        height,
        blur = %config.params.blur,
        "exported still frame"
    );
    Ok(StillFrame {
        path: output.to_path_buf(),
        width,
        height,
        report,
    })
}
