//! Kawase bloom renderer.
//!
//! A textured plane is rendered offscreen, its highlights are extracted,
//! blurred with either a separable Kawase blur or a dual Kawase
//! down/upsample chain, and added back on top of the scene:
//!
//! ```text
//!   scene ──▶ bright pass ──▶ blur (kawase | dual kawase) ──▶ composite ──▶ display
//!     │                                                          ▲
//!     └──────────────────────────────────────────────────────────┘
//! ```
//!
//! [`BloomPipeline`] owns the pass sequence and draws through any
//! [`Backend`]. Two backends ship with the crate: [`GpuBackend`] presents to
//! a window through wgpu and [`SoftwareBackend`] rasterises on the CPU for
//! headless export and tests. [`Renderer`] is the entry point binaries use.

mod backend;
mod camera;
mod error;
mod frame;
mod geometry;
mod gpu;
mod headless;
mod kernel;
mod pass;
mod pipeline;
mod program;
mod software;
mod targets;
mod texture;
mod types;
mod window;

use std::path::Path;

use anyhow::Result;

pub use backend::{
    Backend, BufferId, DrawCommand, DrawTarget, FramebufferId, LoadAction, ProgramId,
    ProgramSource, TextureBinding, TextureId, Topology, UniformLocation, UniformValue,
    VertexBinding,
};
pub use camera::{Camera, OrbitCamera};
pub use error::{PipelineError, PipelineResult};
pub use frame::{ActiveFlag, FrameDriver, FrameTiming};
pub use geometry::QuadGeometry;
pub use gpu::GpuBackend;
pub use headless::{render_still, StillFrame};
pub use kernel::{
    generate as generate_kernel, AxisKernel, BlurKernel, DEFAULT_SIGMA_STEP, SAMPLE_COUNT,
};
pub use pass::{DrawMode, Pass, PassExecutor, Target};
pub use pipeline::{
    stages, BloomPipeline, FrameContext, FrameReport, PassStage, PassSummary, PipelineSetup,
};
pub use program::{Attribute, ProgramInterface, ProgramKind, ProgramSet, ShaderProgram, Uniform};
pub use software::{Canvas, PassRecord, SoftwareBackend};
pub use targets::{RenderSurface, RenderTargetPool, ResolutionTier, TargetSet, TargetSlot};
pub use texture::SceneImage;
pub use types::{
    BlurMode, CameraSettings, GpuPowerPreference, ParameterKnob, PipelineParameters,
    RendererConfig, MIN_BRIGHT_RANGE, OFFSET_RANGE, TONE_SCALE_RANGE,
};

/// High-level entry point that owns the chosen configuration.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Opens the viewer window and blocks until it closes.
    ///
    /// Fails if no window system or GPU adapter is available.
    pub fn run(&mut self) -> Result<()> {
        window::run(&self.config)
    }

    /// Renders a single frame without a window and writes it to `output`.
    pub fn export_still(&self, output: &Path) -> Result<StillFrame> {
        headless::render_still(&self.config, output)
    }
}
