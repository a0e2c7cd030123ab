//! CPU reference backend.
//!
//! Runs the same draws as the wgpu backend on float RGBA canvases, so the
//! bloom chain can be exercised and exported without a GPU. Programs are not
//! parsed: a compiled program reports the interface its kind declares and
//! draws dispatch to the matching routine in `shading`.

mod raster;
mod shading;

use std::collections::HashMap;

use glam::{Mat4, Vec2, Vec3};

pub use raster::Canvas;

use crate::backend::{
    Backend, BufferId, DrawCommand, DrawTarget, FramebufferId, HandleSequence, LoadAction,
    ProgramId, ProgramSource, TextureId, UniformLocation, UniformValue,
};
use crate::error::{PipelineError, PipelineResult};
use crate::program::{Attribute, ProgramInterface, ProgramKind, Uniform};
use crate::texture::SceneImage;
use raster::ClipVertex;
use shading::Inputs;

/// One executed draw, kept for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassRecord {
    pub program: ProgramKind,
    pub target: DrawTarget,
}

#[derive(Debug)]
struct ProgramRecord {
    kind: ProgramKind,
    bindings: Vec<(UniformLocation, Uniform)>,
}

#[derive(Debug)]
pub struct SoftwareBackend {
    ids: HandleSequence,
    programs: HashMap<ProgramId, ProgramRecord>,
    buffers: HashMap<BufferId, Vec<f32>>,
    textures: HashMap<TextureId, Canvas>,
    framebuffers: HashMap<FramebufferId, TextureId>,
    display: Canvas,
    in_frame: bool,
    frames: u64,
    pass_log: Vec<PassRecord>,
}

impl SoftwareBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            ids: HandleSequence::default(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            display: Canvas::new(width, height),
            in_frame: false,
            frames: 0,
            pass_log: Vec::new(),
        }
    }

    pub fn display(&self) -> &Canvas {
        &self.display
    }

    pub fn texture(&self, texture: TextureId) -> PipelineResult<&Canvas> {
        self.textures.get(&texture).ok_or_else(|| texture.unknown())
    }

    pub fn read_pixel(&self, texture: TextureId, x: u32, y: u32) -> PipelineResult<[f32; 4]> {
        Ok(self.texture(texture)?.texel(x, y).to_array())
    }

    /// Draws since construction or the last [`SoftwareBackend::clear_pass_log`].
    pub fn pass_log(&self) -> &[PassRecord] {
        &self.pass_log
    }

    pub fn clear_pass_log(&mut self) {
        self.pass_log.clear();
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }

    fn stream(
        &self,
        command: &DrawCommand<'_>,
        attribute: Attribute,
    ) -> PipelineResult<Option<(&[f32], usize)>> {
        let Some(binding) = command
            .vertices
            .iter()
            .find(|binding| binding.location == attribute.location())
        else {
            return Ok(None);
        };
        let data = self
            .buffers
            .get(&binding.buffer)
            .ok_or_else(|| binding.buffer.unknown())?;
        Ok(Some((data.as_slice(), binding.components as usize)))
    }

    fn gather_vertices(
        &self,
        kind: ProgramKind,
        command: &DrawCommand<'_>,
        inputs: &Inputs<'_>,
    ) -> PipelineResult<Vec<ClipVertex>> {
        let positions = self.stream(command, Attribute::Position)?;
        let texcoords = self.stream(command, Attribute::TextureCoord)?;
        let component = |stream: Option<(&[f32], usize)>, vertex: usize, index: usize| {
            stream
                .filter(|(_, components)| index < *components)
                .and_then(|(data, components)| data.get(vertex * components + index))
                .copied()
                .unwrap_or(0.0)
        };

        Ok((0..command.vertex_count as usize)
            .map(|vertex| {
                let position = Vec3::new(
                    component(positions, vertex, 0),
                    component(positions, vertex, 1),
                    component(positions, vertex, 2),
                );
                ClipVertex {
                    position: shading::vertex(kind, inputs, position),
                    uv: Vec2::new(
                        component(texcoords, vertex, 0),
                        component(texcoords, vertex, 1),
                    ),
                }
            })
            .collect())
    }

    fn render(
        &self,
        canvas: &mut Canvas,
        record: &ProgramRecord,
        command: &DrawCommand<'_>,
    ) -> PipelineResult<()> {
        let mut inputs = Inputs::default();
        for &(location, value) in command.uniforms {
            let Some(&(_, uniform)) = record
                .bindings
                .iter()
                .find(|(candidate, _)| *candidate == location)
            else {
                continue;
            };
            match (uniform, value) {
                (Uniform::MvpMatrix, UniformValue::Mat4(matrix)) => {
                    inputs.mvp = Mat4::from_cols_array(&matrix);
                }
                (Uniform::MinBright, UniformValue::Float(value)) => inputs.min_bright = value,
                (Uniform::Resolution, UniformValue::Vec2(value)) => {
                    inputs.resolution = Vec2::from_array(value);
                }
                (Uniform::IsVertical, UniformValue::Int(value)) => inputs.is_vertical = value != 0,
                (Uniform::OffsetsH, UniformValue::Vec2s(values)) => inputs.offsets_h = values,
                (Uniform::WeightsH, UniformValue::Floats(values)) => inputs.weights_h = values,
                (Uniform::OffsetsV, UniformValue::Vec2s(values)) => inputs.offsets_v = values,
                (Uniform::WeightsV, UniformValue::Floats(values)) => inputs.weights_v = values,
                (Uniform::Offset, UniformValue::Float(value)) => inputs.offset = value,
                (Uniform::ToneScale, UniformValue::Float(value)) => inputs.tone_scale = value,
                (sampler, UniformValue::Sampler(_)) => {
                    let Some(texture) = command.texture_for(location) else {
                        continue;
                    };
                    let canvas = Some(self.texture(texture)?);
                    match sampler {
                        Uniform::SceneTexture => inputs.scene = canvas,
                        Uniform::SourceTexture => inputs.source = canvas,
                        Uniform::OriginalTexture => inputs.original = canvas,
                        Uniform::BloomTexture => inputs.bloom = canvas,
                        _ => return Err(PipelineError::UniformType { uniform: sampler }),
                    }
                }
                (uniform, _) => return Err(PipelineError::UniformType { uniform }),
            }
        }

        let vertices = self.gather_vertices(record.kind, command, &inputs)?;
        if let LoadAction::Clear { color, depth } = command.load {
            canvas.clear(color, depth);
        }
        raster::draw_triangle_strip(canvas, &vertices, record.kind.uses_depth(), &mut |uv| {
            shading::fragment(record.kind, &inputs, uv)
        });
        Ok(())
    }
}

impl Backend for SoftwareBackend {
    fn compile_program(
        &mut self,
        source: &ProgramSource,
    ) -> PipelineResult<(ProgramId, ProgramInterface)> {
        let interface = ProgramInterface::declared(source.kind);
        let bindings = source
            .kind
            .uniforms()
            .iter()
            .zip(&interface.uniforms)
            .map(|(uniform, (_, location))| (*location, *uniform))
            .collect();
        let id = self.ids.program();
        self.programs.insert(
            id,
            ProgramRecord {
                kind: source.kind,
                bindings,
            },
        );
        Ok((id, interface))
    }

    fn create_vertex_buffer(&mut self, _label: &str, data: &[f32]) -> PipelineResult<BufferId> {
        let id = self.ids.buffer();
        self.buffers.insert(id, data.to_vec());
        Ok(id)
    }

    fn create_texture(&mut self, image: &SceneImage) -> PipelineResult<TextureId> {
        let id = self.ids.texture();
        self.textures.insert(id, Canvas::from_image(image));
        Ok(id)
    }

    fn create_framebuffer(
        &mut self,
        width: u32,
        height: u32,
    ) -> PipelineResult<(FramebufferId, TextureId)> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidSurfaceSize { width, height });
        }
        let framebuffer = self.ids.framebuffer();
        let color = self.ids.texture();
        self.textures.insert(color, Canvas::new(width, height));
        self.framebuffers.insert(framebuffer, color);
        Ok((framebuffer, color))
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) -> PipelineResult<()> {
        let color = self
            .framebuffers
            .remove(&framebuffer)
            .ok_or_else(|| framebuffer.unknown())?;
        self.textures.remove(&color);
        Ok(())
    }

    fn begin_frame(&mut self) -> PipelineResult<()> {
        self.in_frame = true;
        Ok(())
    }

    fn draw(&mut self, command: &DrawCommand<'_>) -> PipelineResult<()> {
        if !self.in_frame {
            return Err(PipelineError::NoFrameInFlight);
        }
        let record = self
            .programs
            .get(&command.program)
            .ok_or_else(|| command.program.unknown())?;

        // The target is detached while it is drawn into so sources can be
        // borrowed from the texture map.
        match command.target {
            DrawTarget::Display => {
                let mut canvas = std::mem::take(&mut self.display);
                let result = self.render(&mut canvas, record, command);
                self.display = canvas;
                result?;
            }
            DrawTarget::Framebuffer(framebuffer) => {
                let color = *self
                    .framebuffers
                    .get(&framebuffer)
                    .ok_or_else(|| framebuffer.unknown())?;
                let mut canvas = self
                    .textures
                    .remove(&color)
                    .ok_or_else(|| color.unknown())?;
                let result = self.render(&mut canvas, record, command);
                self.textures.insert(color, canvas);
                result?;
            }
        }

        let kind = record.kind;
        self.pass_log.push(PassRecord {
            program: kind,
            target: command.target,
        });
        Ok(())
    }

    fn end_frame(&mut self) -> PipelineResult<()> {
        if !self.in_frame {
            return Err(PipelineError::NoFrameInFlight);
        }
        self.in_frame = false;
        self.frames += 1;
        Ok(())
    }

    fn resize_display(&mut self, width: u32, height: u32) -> PipelineResult<()> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidSurfaceSize { width, height });
        }
        self.display = Canvas::new(width, height);
        Ok(())
    }

    fn display_size(&self) -> (u32, u32) {
        (self.display.width(), self.display.height())
    }

    fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }
}
