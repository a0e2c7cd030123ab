//! TOML configuration for the bloom viewer.
//!
//! Every field is optional; unset values fall back to the renderer's
//! defaults and command-line flags override whatever the file sets.

use std::fs;
use std::io;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

const MAX_DIMENSION: u32 = 16_384;
const UNIT_RANGE: RangeInclusive<f32> = 0.0..=1.0;
const OFFSET_RANGE: RangeInclusive<f32> = 0.0..=10.0;
const DISTANCE_RANGE: RangeInclusive<f32> = 1.0..=10.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlurSetting {
    Kawase,
    DualKawase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSetting {
    Low,
    High,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BloomConfig {
    pub version: u32,
    #[serde(default)]
    pub window: WindowSection,
    #[serde(default)]
    pub scene: SceneSection,
    #[serde(default)]
    pub bloom: BloomSection,
    #[serde(default)]
    pub kernel: KernelSection,
    #[serde(default)]
    pub camera: CameraSection,
    #[serde(default)]
    pub gpu: GpuSection,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            window: WindowSection::default(),
            scene: SceneSection::default(),
            bloom: BloomSection::default(),
            kernel: KernelSection::default(),
            camera: CameraSection::default(),
            gpu: GpuSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WindowSection {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SceneSection {
    /// Relative paths resolve against the config file's directory.
    pub image: Option<PathBuf>,
    pub clear_color: Option<[f32; 4]>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BloomSection {
    pub blur: Option<BlurSetting>,
    pub tone_scale: Option<f32>,
    pub min_bright: Option<f32>,
    pub offset: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KernelSection {
    pub sigma_step: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CameraSection {
    pub distance: Option<f32>,
    pub fovy_degrees: Option<f32>,
    pub spin_speed: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GpuSection {
    pub power: Option<PowerSetting>,
}

impl BloomConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: BloomConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads and validates `path`. A relative scene image is rebased onto
    /// the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        if let (Some(image), Some(base)) = (config.scene.image.as_mut(), path.parent()) {
            if image.is_relative() {
                *image = base.join(&*image);
            }
        }
        Ok(config)
    }

    /// Like [`BloomConfig::load`], but a missing file yields `None`.
    pub fn load_optional(path: &Path) -> Result<Option<Self>, ConfigError> {
        match Self::load(path) {
            Ok(config) => Ok(Some(config)),
            Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        for (name, value) in [("width", self.window.width), ("height", self.window.height)] {
            if let Some(value) = value {
                if value == 0 || value > MAX_DIMENSION {
                    return Err(ConfigError::Invalid(format!(
                        "window.{name} must be between 1 and {MAX_DIMENSION}, got {value}"
                    )));
                }
            }
        }

        if let Some(color) = self.scene.clear_color {
            if color.iter().any(|channel| !UNIT_RANGE.contains(channel)) {
                return Err(ConfigError::Invalid(
                    "scene.clear_color components must be within [0, 1]".into(),
                ));
            }
        }

        check_range("bloom.tone_scale", self.bloom.tone_scale, &UNIT_RANGE)?;
        check_range("bloom.min_bright", self.bloom.min_bright, &UNIT_RANGE)?;
        check_range("bloom.offset", self.bloom.offset, &OFFSET_RANGE)?;
        check_range("camera.distance", self.camera.distance, &DISTANCE_RANGE)?;

        if let Some(step) = self.kernel.sigma_step {
            if !step.is_finite() || step <= 0.0 {
                return Err(ConfigError::Invalid(
                    "kernel.sigma_step must be a positive number".into(),
                ));
            }
        }
        if let Some(fovy) = self.camera.fovy_degrees {
            if !(fovy > 0.0 && fovy < 180.0) {
                return Err(ConfigError::Invalid(format!(
                    "camera.fovy_degrees must be within (0, 180), got {fovy}"
                )));
            }
        }
        if let Some(speed) = self.camera.spin_speed {
            if !speed.is_finite() {
                return Err(ConfigError::Invalid(
                    "camera.spin_speed must be finite".into(),
                ));
            }
        }
        Ok(())
    }
}

fn check_range(
    name: &str,
    value: Option<f32>,
    range: &RangeInclusive<f32>,
) -> Result<(), ConfigError> {
    match value {
        Some(value) if !range.contains(&value) => Err(ConfigError::Invalid(format!(
            "{name} must be within [{}, {}], got {value}",
            range.start(),
            range.end()
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[window]
width = 1024
height = 768
title = "Bloom test"

[scene]
image = "textures/city.jpg"
clear_color = [0.0, 0.0, 0.1, 1.0]

[bloom]
blur = "dual-kawase"
tone_scale = 0.75
min_bright = 0.3
offset = 4.5

[kernel]
sigma_step = 0.001

[camera]
distance = 3.0
spin_speed = 0.25

[gpu]
power = "low"
"#;

    #[test]
    fn parses_sample_config() {
        let config = BloomConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.window.width, Some(1024));
        assert_eq!(config.window.title.as_deref(), Some("Bloom test"));
        assert_eq!(config.bloom.blur, Some(BlurSetting::DualKawase));
        assert_eq!(config.bloom.offset, Some(4.5));
        assert_eq!(config.kernel.sigma_step, Some(0.001));
        assert_eq!(config.camera.fovy_degrees, None);
        assert_eq!(config.gpu.power, Some(PowerSetting::Low));
    }

    #[test]
    fn sections_are_optional() {
        let config = BloomConfig::from_toml_str("version = 1\n").expect("parse config");
        assert!(config.bloom.blur.is_none());
        assert!(config.scene.image.is_none());
    }

    #[test]
    fn rejects_unknown_version() {
        let err = BloomConfig::from_toml_str("version = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_out_of_range_tone_scale() {
        let err = BloomConfig::from_toml_str("version = 1\n[bloom]\ntone_scale = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("bloom.tone_scale"));
    }

    #[test]
    fn rejects_unknown_blur_name() {
        let err = BloomConfig::from_toml_str("version = 1\n[bloom]\nblur = \"box\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_zero_window_size() {
        let err = BloomConfig::from_toml_str("version = 1\n[window]\nwidth = 0\n").unwrap_err();
        assert!(err.to_string().contains("window.width"));
    }

    #[test]
    fn load_rebases_relative_image_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, SAMPLE).expect("write config");

        let config = BloomConfig::load(&path).expect("load");
        assert_eq!(
            config.scene.image,
            Some(dir.path().join("textures/city.jpg"))
        );
    }

    #[test]
    fn load_optional_tolerates_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent.toml");
        assert!(BloomConfig::load_optional(&missing).expect("load").is_none());
    }
}
