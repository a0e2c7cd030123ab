//! The bloom chain.
//!
//! Every frame runs the same state machine: render the scene into an
//! offscreen surface, keep the texels above a luminance threshold, blur them
//! with the selected [`BlurMode`], then add the blurred highlights back on top
//! of the scene while drawing to the display. Stages run strictly in order and
//! each one names its program, source and target explicitly.

use glam::Mat4;

use crate::backend::{Backend, DrawTarget, LoadAction, TextureId, UniformValue};
use crate::error::PipelineResult;
use crate::geometry::QuadGeometry;
use crate::kernel::{self, BlurKernel, SAMPLE_COUNT};
use crate::pass::{DrawMode, Pass, PassExecutor, Target};
use crate::program::{ProgramKind, ProgramSet, Uniform};
use crate::targets::{RenderTargetPool, TargetSet, TargetSlot};
use crate::texture::SceneImage;
use crate::types::{BlurMode, PipelineParameters};

pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 10.0;

/// One draw of the bloom chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassStage {
    SceneRender,
    BrightExtract,
    KawaseVertical,
    KawaseHorizontal,
    DownsampleHalf,
    DownsampleQuarter,
    UpsampleHalf,
    UpsampleFull,
    Composite,
}

const KAWASE_STAGES: [PassStage; 5] = [
    PassStage::SceneRender,
    PassStage::BrightExtract,
    PassStage::KawaseVertical,
    PassStage::KawaseHorizontal,
    PassStage::Composite,
];

const DUAL_KAWASE_STAGES: [PassStage; 7] = [
    PassStage::SceneRender,
    PassStage::BrightExtract,
    PassStage::DownsampleHalf,
    PassStage::DownsampleQuarter,
    PassStage::UpsampleHalf,
    PassStage::UpsampleFull,
    PassStage::Composite,
];

/// Ordered stages for a frame blurred with `mode`.
pub fn stages(mode: BlurMode) -> &'static [PassStage] {
    match mode {
        BlurMode::Kawase => &KAWASE_STAGES,
        BlurMode::DualKawase => &DUAL_KAWASE_STAGES,
    }
}

impl PassStage {
    pub fn label(self) -> &'static str {
        match self {
            PassStage::SceneRender => "scene",
            PassStage::BrightExtract => "bright",
            PassStage::KawaseVertical => "kawase-vertical",
            PassStage::KawaseHorizontal => "kawase-horizontal",
            PassStage::DownsampleHalf => "downsample-half",
            PassStage::DownsampleQuarter => "downsample-quarter",
            PassStage::UpsampleHalf => "upsample-half",
            PassStage::UpsampleFull => "upsample-full",
            PassStage::Composite => "composite",
        }
    }

    pub fn program(self) -> ProgramKind {
        match self {
            PassStage::SceneRender => ProgramKind::Normal,
            PassStage::BrightExtract => ProgramKind::BrightPass,
            PassStage::KawaseVertical | PassStage::KawaseHorizontal => ProgramKind::KawaseBlur,
            PassStage::DownsampleHalf | PassStage::DownsampleQuarter => {
                ProgramKind::DualDownsample
            }
            PassStage::UpsampleHalf | PassStage::UpsampleFull => ProgramKind::DualUpsample,
            PassStage::Composite => ProgramKind::Composite,
        }
    }

    /// Surface the stage reads from; `None` is the scene texture. The
    /// composite stage also reads the scene surface.
    pub fn source(self) -> Option<TargetSlot> {
        match self {
            PassStage::SceneRender => None,
            PassStage::Composite => Some(TargetSlot::Ping),
            PassStage::BrightExtract => Some(TargetSlot::Scene),
            PassStage::KawaseVertical | PassStage::DownsampleHalf => Some(TargetSlot::Ping),
            PassStage::KawaseHorizontal => Some(TargetSlot::Pong),
            PassStage::DownsampleQuarter | PassStage::UpsampleFull => Some(TargetSlot::Half),
            PassStage::UpsampleHalf => Some(TargetSlot::Quarter),
        }
    }

    /// Surface the stage writes; `None` is the display.
    pub fn target(self) -> Option<TargetSlot> {
        match self {
            PassStage::SceneRender => Some(TargetSlot::Scene),
            PassStage::BrightExtract | PassStage::KawaseHorizontal | PassStage::UpsampleFull => {
                Some(TargetSlot::Ping)
            }
            PassStage::KawaseVertical => Some(TargetSlot::Pong),
            PassStage::DownsampleHalf | PassStage::UpsampleHalf => Some(TargetSlot::Half),
            PassStage::DownsampleQuarter => Some(TargetSlot::Quarter),
            PassStage::Composite => None,
        }
    }
}

/// Inputs fixed for the lifetime of a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSetup {
    pub scene: SceneImage,
    pub clear_color: [f32; 4],
    pub sigma_step: f32,
    pub fovy_degrees: f32,
}

/// Per-frame inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    pub view: Mat4,
    pub params: PipelineParameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub stage: PassStage,
    pub program: ProgramKind,
    pub target: DrawTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub passes: Vec<PassSummary>,
}

pub struct BloomPipeline {
    programs: ProgramSet,
    quad: QuadGeometry,
    scene_texture: TextureId,
    scene_size: [f32; 2],
    kernel: BlurKernel,
    targets: RenderTargetPool,
    executor: PassExecutor,
    clear_color: [f32; 4],
    fovy: f32,
}

impl BloomPipeline {
    /// Compiles every program, uploads the quad and scene texture, derives
    /// the blur kernel, and sizes the targets to the backend's display.
    pub fn new<B: Backend + ?Sized>(
        backend: &mut B,
        setup: &PipelineSetup,
    ) -> PipelineResult<Self> {
        let programs = ProgramSet::create(backend)?;
        let quad = QuadGeometry::upload(backend)?;
        let scene_texture = backend.create_texture(&setup.scene)?;
        let kernel = kernel::generate(SAMPLE_COUNT, setup.sigma_step);

        let (width, height) = backend.display_size();
        let mut targets = RenderTargetPool::new();
        targets.resize_all(backend, width, height)?;
        tracing::info!(
            width,
            height,
            scene_width = setup.scene.width(),
            scene_height = setup.scene.height(),
            "bloom pipeline ready"
        );

        Ok(Self {
            programs,
            quad,
            scene_texture,
            scene_size: [setup.scene.width() as f32, setup.scene.height() as f32],
            kernel,
            targets,
            executor: PassExecutor::new(),
            clear_color: setup.clear_color,
            fovy: setup.fovy_degrees.to_radians(),
        })
    }

    /// Reallocates every render target for a display of `width`×`height`.
    pub fn resize<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> PipelineResult<()> {
        self.targets.resize_all(backend, width, height)?;
        tracing::info!(width, height, "resized bloom targets");
        Ok(())
    }

    pub fn targets(&self) -> &RenderTargetPool {
        &self.targets
    }

    pub fn kernel(&self) -> &BlurKernel {
        &self.kernel
    }

    pub fn scene_texture(&self) -> TextureId {
        self.scene_texture
    }

    pub fn projection(&self) -> Mat4 {
        let (width, height) = self.targets.base_size();
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        Mat4::perspective_rh(self.fovy, aspect, NEAR_PLANE, FAR_PLANE)
    }

    /// Runs one frame. Fails with `TargetsNotAllocated` before anything is
    /// submitted if the targets have been released.
    pub fn execute<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        ctx: &FrameContext,
    ) -> PipelineResult<FrameReport> {
        let targets = self.targets.snapshot()?;
        let params = ctx.params.sanitised();
        let mvp = self.projection() * ctx.view;

        backend.begin_frame()?;
        let mut report = FrameReport::default();
        for &stage in stages(params.blur) {
            let target = self.run_stage(backend, &targets, stage, &mvp, &params)?;
            tracing::debug!(stage = stage.label(), ?target, "pass complete");
            report.passes.push(PassSummary {
                stage,
                program: stage.program(),
                target,
            });
        }
        backend.end_frame()?;
        Ok(report)
    }

    /// Frees the render targets.
    pub fn release<B: Backend + ?Sized>(&mut self, backend: &mut B) -> PipelineResult<()> {
        self.targets.release_all(backend)
    }

    fn run_stage<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        targets: &TargetSet,
        stage: PassStage,
        mvp: &Mat4,
        params: &PipelineParameters,
    ) -> PipelineResult<DrawTarget> {
        let clear = LoadAction::Clear {
            color: self.clear_color,
            depth: 1.0,
        };
        let attributes = self.quad.bindings();
        let program = self.programs.get(stage.program());
        let target_surface = stage.target().map(|slot| targets.get(slot));
        let target = match &target_surface {
            Some(surface) => Target::Surface(surface),
            None => Target::Display,
        };
        let (source, source_size) = match stage.source() {
            Some(slot) => {
                let surface = targets.get(slot);
                (surface.color, surface.dimensions())
            }
            None => (self.scene_texture, self.scene_size),
        };

        match stage {
            PassStage::SceneRender => self.executor.execute(
                backend,
                Pass {
                    program,
                    target,
                    attributes: &attributes,
                    uniforms: &[(Uniform::MvpMatrix, UniformValue::Mat4(mvp.to_cols_array()))],
                    textures: &[(Uniform::SceneTexture, 0, source)],
                    mode: DrawMode::quad(clear),
                },
            )?,
            PassStage::BrightExtract => self.executor.execute(
                backend,
                Pass {
                    program,
                    target,
                    attributes: &attributes,
                    uniforms: &[(Uniform::MinBright, UniformValue::Float(params.min_bright))],
                    textures: &[(Uniform::SourceTexture, 0, source)],
                    mode: DrawMode::quad(LoadAction::Load),
                },
            )?,
            PassStage::KawaseVertical | PassStage::KawaseHorizontal => {
                let vertical = i32::from(stage == PassStage::KawaseVertical);
                let BlurKernel {
                    horizontal,
                    vertical: vertical_axis,
                } = &self.kernel;
                self.executor.execute(
                    backend,
                    Pass {
                        program,
                        target,
                        attributes: &attributes,
                        uniforms: &[
                            (Uniform::Resolution, UniformValue::Vec2(source_size)),
                            (Uniform::IsVertical, UniformValue::Int(vertical)),
                            (Uniform::OffsetsH, UniformValue::Vec2s(&horizontal.offsets)),
                            (Uniform::WeightsH, UniformValue::Floats(&horizontal.weights)),
                            (Uniform::OffsetsV, UniformValue::Vec2s(&vertical_axis.offsets)),
                            (Uniform::WeightsV, UniformValue::Floats(&vertical_axis.weights)),
                        ],
                        textures: &[(Uniform::SourceTexture, 0, source)],
                        mode: DrawMode::quad(LoadAction::Load),
                    },
                )?;
            }
            PassStage::DownsampleHalf
            | PassStage::DownsampleQuarter
            | PassStage::UpsampleHalf
            | PassStage::UpsampleFull => self.executor.execute(
                backend,
                Pass {
                    program,
                    target,
                    attributes: &attributes,
                    uniforms: &[
                        (Uniform::Resolution, UniformValue::Vec2(source_size)),
                        (Uniform::Offset, UniformValue::Float(params.offset)),
                    ],
                    textures: &[(Uniform::SourceTexture, 0, source)],
                    mode: DrawMode::quad(LoadAction::Load),
                },
            )?,
            PassStage::Composite => self.executor.execute(
                backend,
                Pass {
                    program,
                    target,
                    attributes: &attributes,
                    uniforms: &[(Uniform::ToneScale, UniformValue::Float(params.tone_scale))],
                    textures: &[
                        (Uniform::OriginalTexture, 0, targets.get(TargetSlot::Scene).color),
                        (Uniform::BloomTexture, 1, source),
                    ],
                    mode: DrawMode::quad(clear),
                },
            )?,
        }
        Ok(target.draw_target())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::software::SoftwareBackend;

    fn setup() -> PipelineSetup {
        PipelineSetup {
            scene: SceneImage::solid(8, 8, [255, 255, 255, 255]),
            clear_color: [0.02, 0.0, 0.05, 1.0],
            sigma_step: kernel::DEFAULT_SIGMA_STEP,
            fovy_degrees: 45.0,
        }
    }

    #[test]
    fn stages_chain_sources_to_previous_targets() {
        for mode in [BlurMode::Kawase, BlurMode::DualKawase] {
            let stages = stages(mode);
            assert_eq!(stages.first(), Some(&PassStage::SceneRender));
            assert_eq!(stages.last(), Some(&PassStage::Composite));
            for pair in stages.windows(2) {
                if let Some(source) = pair[1].source() {
                    assert_eq!(pair[0].target(), Some(source), "{mode}: {:?}", pair[1]);
                    assert_ne!(pair[1].target(), Some(source));
                }
            }
        }
    }

    #[test]
    fn blur_result_always_lands_in_ping() {
        for mode in [BlurMode::Kawase, BlurMode::DualKawase] {
            let stages = stages(mode);
            let last_blur = stages[stages.len() - 2];
            assert_eq!(last_blur.target(), Some(TargetSlot::Ping));
        }
    }

    #[test]
    fn report_lists_every_stage() {
        let mut backend = SoftwareBackend::new(16, 12);
        let mut pipeline = BloomPipeline::new(&mut backend, &setup()).expect("pipeline");
        let ctx = FrameContext {
            view: Mat4::look_at_rh(glam::Vec3::Z * 4.0, glam::Vec3::ZERO, glam::Vec3::Y),
            params: PipelineParameters {
                blur: BlurMode::DualKawase,
                ..PipelineParameters::default()
            },
        };
        let report = pipeline.execute(&mut backend, &ctx).expect("frame");
        let stages: Vec<_> = report.passes.iter().map(|pass| pass.stage).collect();
        assert_eq!(stages, DUAL_KAWASE_STAGES.to_vec());
        assert_eq!(report.passes.last().map(|pass| pass.target), Some(DrawTarget::Display));
        assert_eq!(backend.frames_presented(), 1);
    }

    #[test]
    fn projection_tracks_target_aspect() {
        let mut backend = SoftwareBackend::new(20, 10);
        let mut pipeline = BloomPipeline::new(&mut backend, &setup()).expect("pipeline");
        let wide = pipeline.projection();
        pipeline.resize(&mut backend, 10, 10).expect("resize");
        let square = pipeline.projection();
        assert!((square.x_axis.x - 2.0 * wide.x_axis.x).abs() < 1e-5);
        assert_eq!(square.y_axis.y, wide.y_axis.y);
    }

    #[test]
    fn released_targets_fail_before_the_frame_starts() {
        let mut backend = SoftwareBackend::new(16, 12);
        let mut pipeline = BloomPipeline::new(&mut backend, &setup()).expect("pipeline");
        pipeline.release(&mut backend).expect("release");
        backend.clear_pass_log();

        let ctx = FrameContext {
            view: Mat4::IDENTITY,
            params: PipelineParameters::default(),
        };
        assert!(matches!(
            pipeline.execute(&mut backend, &ctx),
            Err(PipelineError::TargetsNotAllocated)
        ));
        assert!(backend.pass_log().is_empty());
        assert_eq!(backend.frames_presented(), 0);

        pipeline.resize(&mut backend, 16, 12).expect("reallocate");
        pipeline.execute(&mut backend, &ctx).expect("frame");
        assert_eq!(backend.frames_presented(), 1);
    }

    #[test]
    fn composite_reads_the_blurred_ping_surface() {
        assert_eq!(PassStage::Composite.source(), Some(TargetSlot::Ping));
        assert_eq!(PassStage::SceneRender.source(), None);
    }
}
