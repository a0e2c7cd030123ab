use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;

use crate::kernel::DEFAULT_SIGMA_STEP;

/// Ranges offered by the interactive controls.
pub const TONE_SCALE_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const MIN_BRIGHT_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const OFFSET_RANGE: RangeInclusive<f32> = 0.0..=10.0;

/// Blur algorithm applied between bright extraction and compositing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlurMode {
    /// Separable Gaussian-weighted blur at full resolution.
    #[default]
    Kawase,
    /// Downsample to quarter resolution and back up.
    DualKawase,
}

impl BlurMode {
    pub fn toggled(self) -> Self {
        match self {
            BlurMode::Kawase => BlurMode::DualKawase,
            BlurMode::DualKawase => BlurMode::Kawase,
        }
    }
}

impl fmt::Display for BlurMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlurMode::Kawase => f.write_str("kawase"),
            BlurMode::DualKawase => f.write_str("dual-kawase"),
        }
    }
}

impl FromStr for BlurMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "kawase" => Ok(BlurMode::Kawase),
            "dual-kawase" | "dual_kawase" | "dualkawase" => Ok(BlurMode::DualKawase),
            other => Err(format!(
                "unknown blur mode '{other}' (expected kawase or dual-kawase)"
            )),
        }
    }
}

/// Values the bloom chain reads each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineParameters {
    pub blur: BlurMode,
    /// Multiplier applied to the blurred highlights before they are added back.
    pub tone_scale: f32,
    /// Luminance threshold for the bright pass.
    pub min_bright: f32,
    /// Sample spread of the dual Kawase passes, in half-texels.
    pub offset: f32,
}

impl Default for PipelineParameters {
    fn default() -> Self {
        Self {
            blur: BlurMode::Kawase,
            tone_scale: 0.5,
            min_bright: 0.2,
            offset: 3.0,
        }
    }
}

impl PipelineParameters {
    /// Replaces non-finite values with defaults and negative ones with zero.
    /// Values above the control ranges are kept.
    pub fn sanitised(self) -> Self {
        let defaults = Self::default();
        let fix = |value: f32, fallback: f32| {
            if !value.is_finite() {
                fallback
            } else {
                value.max(0.0)
            }
        };
        Self {
            blur: self.blur,
            tone_scale: fix(self.tone_scale, defaults.tone_scale),
            min_bright: fix(self.min_bright, defaults.min_bright),
            offset: fix(self.offset, defaults.offset),
        }
    }

    /// Moves one knob by `delta`, clamped to its control range.
    pub fn nudge(&mut self, knob: ParameterKnob, delta: f32) {
        let (value, range) = match knob {
            ParameterKnob::ToneScale => (&mut self.tone_scale, TONE_SCALE_RANGE),
            ParameterKnob::MinBright => (&mut self.min_bright, MIN_BRIGHT_RANGE),
            ParameterKnob::Offset => (&mut self.offset, OFFSET_RANGE),
        };
        let stepped = *value + delta;
        *value = stepped.clamp(*range.start(), *range.end());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKnob {
    ToneScale,
    MinBright,
    Offset,
}

impl ParameterKnob {
    /// Increment applied per key press.
    pub fn step(self) -> f32 {
        match self {
            ParameterKnob::ToneScale | ParameterKnob::MinBright => 0.01,
            ParameterKnob::Offset => 0.1,
        }
    }
}

/// Adapter power preference forwarded to wgpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSettings {
    /// Distance from the orbit centre, clamped to `[1, 10]`.
    pub distance: f32,
    pub fovy_degrees: f32,
    /// Auto-spin in radians per second; zero keeps the camera still.
    pub spin_speed: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            distance: 4.0,
            fovy_degrees: 45.0,
            spin_speed: 0.0,
        }
    }
}

/// Immutable configuration passed to the renderer at start-up.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window or export size in physical pixels.
    pub surface_size: (u32, u32),
    pub title: String,
    /// Scene texture; `None` selects the built-in checkerboard.
    pub scene_image: Option<PathBuf>,
    pub clear_color: [f32; 4],
    pub params: PipelineParameters,
    pub sigma_step: f32,
    pub camera: CameraSettings,
    pub gpu_power: GpuPowerPreference,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            title: "Kawase Bloom".to_string(),
            scene_image: None,
            clear_color: [0.02, 0.0, 0.05, 1.0],
            params: PipelineParameters::default(),
            sigma_step: DEFAULT_SIGMA_STEP,
            camera: CameraSettings::default(),
            gpu_power: GpuPowerPreference::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitised_replaces_non_finite_and_negative_values() {
        let params = PipelineParameters {
            blur: BlurMode::DualKawase,
            tone_scale: f32::NAN,
            min_bright: -0.4,
            offset: f32::INFINITY,
        }
        .sanitised();
        assert_eq!(params.blur, BlurMode::DualKawase);
        assert_eq!(params.tone_scale, 0.5);
        assert_eq!(params.min_bright, 0.0);
        assert_eq!(params.offset, 3.0);
    }

    #[test]
    fn sanitised_keeps_large_values() {
        let params = PipelineParameters {
            tone_scale: 4.0,
            ..PipelineParameters::default()
        };
        assert_eq!(params.sanitised().tone_scale, 4.0);
    }

    #[test]
    fn nudge_clamps_to_control_range() {
        let mut params = PipelineParameters::default();
        params.nudge(ParameterKnob::ToneScale, 2.0);
        assert_eq!(params.tone_scale, 1.0);
        params.nudge(ParameterKnob::Offset, -20.0);
        assert_eq!(params.offset, 0.0);
    }

    #[test]
    fn blur_mode_parses_and_toggles() {
        assert_eq!("Dual-Kawase".parse::<BlurMode>(), Ok(BlurMode::DualKawase));
        assert_eq!("kawase".parse::<BlurMode>(), Ok(BlurMode::Kawase));
        assert!("gaussian".parse::<BlurMode>().is_err());
        assert_eq!(BlurMode::Kawase.toggled(), BlurMode::DualKawase);
        assert_eq!(BlurMode::DualKawase.to_string(), "dual-kawase");
    }
}
