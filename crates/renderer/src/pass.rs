//! One validated draw.
//!
//! A [`Pass`] spells out everything a draw reads: program, target, vertex
//! streams, uniform values and textures. [`PassExecutor::execute`] resolves
//! each name through the program's binding table and only submits once the
//! whole pass checks out, so a bad binding never reaches the backend.

use crate::backend::{
    Backend, BufferId, DrawCommand, DrawTarget, LoadAction, TextureBinding, TextureId, Topology,
    UniformLocation, UniformValue, VertexBinding,
};
use crate::error::{PipelineError, PipelineResult};
use crate::program::{Attribute, ShaderProgram, Uniform, UniformType};
use crate::targets::RenderSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Surface(&'a RenderSurface),
    Display,
}

impl Target<'_> {
    pub fn draw_target(&self) -> DrawTarget {
        match self {
            Target::Surface(surface) => DrawTarget::Framebuffer(surface.framebuffer),
            Target::Display => DrawTarget::Display,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawMode {
    pub topology: Topology,
    pub vertex_count: u32,
    pub load: LoadAction,
}

impl DrawMode {
    /// Four-vertex triangle strip.
    pub fn quad(load: LoadAction) -> Self {
        Self {
            topology: Topology::TriangleStrip,
            vertex_count: 4,
            load,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pass<'a> {
    pub program: &'a ShaderProgram,
    pub target: Target<'a>,
    pub attributes: &'a [(Attribute, BufferId, u32)],
    pub uniforms: &'a [(Uniform, UniformValue<'a>)],
    /// `(sampler uniform, texture unit, texture)`.
    pub textures: &'a [(Uniform, u32, TextureId)],
    pub mode: DrawMode,
}

#[derive(Debug, Default)]
pub struct PassExecutor {
    bound_target: Option<DrawTarget>,
}

impl PassExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target of the most recent successful draw.
    pub fn bound_target(&self) -> Option<DrawTarget> {
        self.bound_target
    }

    pub fn execute<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        pass: Pass<'_>,
    ) -> PipelineResult<()> {
        let program = pass.program;
        let kind = program.kind();

        let mut vertices = Vec::with_capacity(pass.attributes.len());
        for &(attribute, buffer, components) in pass.attributes {
            let slot = program
                .attribute(attribute)
                .ok_or(PipelineError::UnboundAttribute {
                    program: kind,
                    attribute,
                })?;
            if slot.components != components {
                return Err(PipelineError::AttributeMismatch {
                    attribute,
                    expected: slot.components,
                    actual: components,
                });
            }
            vertices.push(VertexBinding {
                location: slot.location,
                buffer,
                components,
            });
        }

        let mut uniforms: Vec<(UniformLocation, UniformValue<'_>)> =
            Vec::with_capacity(pass.uniforms.len() + pass.textures.len());
        for &(uniform, value) in pass.uniforms {
            let location = resolve_uniform(program, uniform)?;
            if !value_matches(uniform.ty(), &value) {
                return Err(PipelineError::UniformType { uniform });
            }
            uniforms.push((location, value));
        }

        let mut textures = Vec::with_capacity(pass.textures.len());
        for &(uniform, unit, texture) in pass.textures {
            let location = resolve_uniform(program, uniform)?;
            if !uniform.ty().is_sampler() {
                return Err(PipelineError::UniformType { uniform });
            }
            uniforms.push((location, UniformValue::Sampler(unit)));
            textures.push(TextureBinding { unit, texture });
        }

        let target = pass.target.draw_target();
        tracing::trace!(
            program = %kind,
            ?target,
            uniforms = uniforms.len(),
            textures = textures.len(),
            "executing pass"
        );
        backend.draw(&DrawCommand {
            program: program.id(),
            target,
            load: pass.mode.load,
            vertices: &vertices,
            uniforms: &uniforms,
            textures: &textures,
            topology: pass.mode.topology,
            vertex_count: pass.mode.vertex_count,
        })?;
        self.bound_target = Some(target);
        Ok(())
    }
}

fn resolve_uniform(program: &ShaderProgram, uniform: Uniform) -> PipelineResult<UniformLocation> {
    program
        .uniform(uniform)
        .ok_or(PipelineError::UnboundUniform {
            program: program.kind(),
            uniform,
        })
}

fn value_matches(ty: UniformType, value: &UniformValue<'_>) -> bool {
    match (ty, value) {
        (UniformType::Float, UniformValue::Float(_))
        | (UniformType::Int, UniformValue::Int(_))
        | (UniformType::Vec2, UniformValue::Vec2(_))
        | (UniformType::Mat4, UniformValue::Mat4(_))
        | (UniformType::Sampler2d, UniformValue::Sampler(_)) => true,
        (UniformType::FloatArray(len), UniformValue::Floats(values)) => values.len() == len,
        (UniformType::Vec2Array(len), UniformValue::Vec2s(values)) => values.len() == len,
        _ => false,
    }
}
