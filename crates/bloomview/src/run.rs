use std::path::Path;

use anyhow::{Context, Result};
use bloomconfig::{BloomConfig, BlurSetting, PowerSetting};
use renderer::{BlurMode, GpuPowerPreference, Renderer, RendererConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::{ExportArgs, RunArgs};
use crate::paths::AppPaths;

pub fn run(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    tracing::info!(
        width = config.surface_size.0,
        height = config.surface_size.1,
        blur = %config.params.blur,
        image = ?config.scene_image,
        "launching bloom viewer"
    );
    let mut renderer = Renderer::new(config);
    renderer.run()
}

pub fn export(args: RunArgs, export: ExportArgs) -> Result<()> {
    let mut config = resolve_config(&args)?;
    if let Some(size) = export.size {
        config.surface_size = size;
    }
    let renderer = Renderer::new(config);
    let still = renderer.export_still(&export.output)?;
    println!(
        "{} ({}x{}, {} passes)",
        still.path.display(),
        still.width,
        still.height,
        still.report.passes.len()
    );
    Ok(())
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Loads the configuration file and layers the command-line flags on top.
fn resolve_config(args: &RunArgs) -> Result<RendererConfig> {
    let file = match args.config.as_deref() {
        Some(path) => Some(
            BloomConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
        ),
        None => discover_config()?,
    };
    let mut config = RendererConfig::default();
    if let Some(file) = &file {
        apply_file(&mut config, file);
    }
    apply_args(&mut config, args);
    Ok(config)
}

fn discover_config() -> Result<Option<BloomConfig>> {
    let paths = AppPaths::discover()?;
    tracing::debug!(config = %paths.config_dir().display(), "resolved bloomview paths");
    let path = paths.config_file();
    let loaded = load_if_present(&path)?;
    if loaded.is_none() {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
    }
    Ok(loaded)
}

fn load_if_present(path: &Path) -> Result<Option<BloomConfig>> {
    let loaded = BloomConfig::load_optional(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    if loaded.is_some() {
        tracing::debug!(path = %path.display(), "loaded config file");
    }
    Ok(loaded)
}

fn apply_file(config: &mut RendererConfig, file: &BloomConfig) {
    let (width, height) = config.surface_size;
    config.surface_size = (
        file.window.width.unwrap_or(width),
        file.window.height.unwrap_or(height),
    );
    if let Some(title) = &file.window.title {
        config.title = title.clone();
    }
    if let Some(image) = &file.scene.image {
        config.scene_image = Some(image.clone());
    }
    if let Some(color) = file.scene.clear_color {
        config.clear_color = color;
    }

    let params = &mut config.params;
    if let Some(blur) = file.bloom.blur {
        params.blur = map_blur(blur);
    }
    if let Some(value) = file.bloom.tone_scale {
        params.tone_scale = value;
    }
    if let Some(value) = file.bloom.min_bright {
        params.min_bright = value;
    }
    if let Some(value) = file.bloom.offset {
        params.offset = value;
    }
    if let Some(step) = file.kernel.sigma_step {
        config.sigma_step = step;
    }

    let camera = &mut config.camera;
    if let Some(distance) = file.camera.distance {
        camera.distance = distance;
    }
    if let Some(fovy) = file.camera.fovy_degrees {
        camera.fovy_degrees = fovy;
    }
    if let Some(speed) = file.camera.spin_speed {
        camera.spin_speed = speed;
    }
    if let Some(power) = file.gpu.power {
        config.gpu_power = map_power(power);
    }
}

fn apply_args(config: &mut RendererConfig, args: &RunArgs) {
    if let Some(size) = args.size {
        config.surface_size = size;
    }
    if let Some(image) = &args.image {
        config.scene_image = Some(image.clone());
    }
    if let Some(blur) = args.blur {
        config.params.blur = blur;
    }
    if let Some(value) = args.tone_scale {
        config.params.tone_scale = value;
    }
    if let Some(value) = args.min_bright {
        config.params.min_bright = value;
    }
    if let Some(value) = args.offset {
        config.params.offset = value;
    }
    if let Some(step) = args.sigma_step {
        config.sigma_step = step;
    }
    if let Some(power) = args.gpu_power {
        config.gpu_power = power;
    }
}

fn map_blur(setting: BlurSetting) -> BlurMode {
    match setting {
        BlurSetting::Kawase => BlurMode::Kawase,
        BlurSetting::DualKawase => BlurMode::DualKawase,
    }
}

fn map_power(setting: PowerSetting) -> GpuPowerPreference {
    match setting {
        PowerSetting::Low => GpuPowerPreference::Low,
        PowerSetting::High => GpuPowerPreference::High,
    }
}
