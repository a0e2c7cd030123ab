//! The device seam the bloom pipeline draws through.
//!
//! A backend owns every GPU-side object and hands out opaque ids. Ids are
//! never reused within a backend, so a handle that outlived a release is
//! rejected with [`PipelineError::UnknownHandle`] instead of aliasing a newer
//! object.

use std::fmt;

use crate::error::{PipelineError, PipelineResult};
use crate::program::{ProgramInterface, ProgramKind};
use crate::texture::SceneImage;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub const KIND: &'static str = $kind;

            pub fn raw(self) -> u32 {
                self.0
            }

            pub(crate) fn unknown(self) -> PipelineError {
                PipelineError::UnknownHandle {
                    kind: Self::KIND,
                    id: self.0,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $kind, self.0)
            }
        }
    };
}

handle!(
    /// A linked vertex + fragment program.
    ProgramId,
    "program"
);
handle!(
    /// A sampled colour texture.
    TextureId,
    "texture"
);
handle!(
    /// An offscreen render target with colour and depth attachments.
    FramebufferId,
    "framebuffer"
);
handle!(
    /// Immutable vertex data.
    BufferId,
    "buffer"
);

/// Monotonic id source shared by all handle kinds of one backend.
#[derive(Debug, Default)]
pub struct HandleSequence {
    next: u32,
}

impl HandleSequence {
    fn bump(&mut self) -> u32 {
        self.next += 1;
        self.next
    }

    pub fn program(&mut self) -> ProgramId {
        ProgramId(self.bump())
    }

    pub fn texture(&mut self) -> TextureId {
        TextureId(self.bump())
    }

    pub fn framebuffer(&mut self) -> FramebufferId {
        FramebufferId(self.bump())
    }

    pub fn buffer(&mut self) -> BufferId {
        BufferId(self.bump())
    }
}

/// GLSL sources for one program kind, binding prologue included.
#[derive(Debug, Clone)]
pub struct ProgramSource {
    pub kind: ProgramKind,
    pub vertex: String,
    pub fragment: String,
}

/// Where a uniform lives once the program is compiled.
///
/// `Block` indexes a member of the per-pass uniform block, `Sampler` is the
/// binding slot of a texture. Backends interpret both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformLocation {
    Block(u32),
    Sampler(u32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue<'a> {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Mat4([f32; 16]),
    Floats(&'a [f32]),
    Vec2s(&'a [[f32; 2]]),
    /// Texture unit a sampler reads from.
    Sampler(u32),
}

impl UniformValue<'_> {
    pub fn as_float(&self) -> Option<f32> {
        match self {
            UniformValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            UniformValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<[f32; 2]> {
        match self {
            UniformValue::Vec2(value) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawTarget {
    Framebuffer(FramebufferId),
    Display,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadAction {
    Clear { color: [f32; 4], depth: f32 },
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBinding {
    pub location: u32,
    pub buffer: BufferId,
    pub components: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub unit: u32,
    pub texture: TextureId,
}

/// A fully resolved draw. Nothing is inherited from earlier draws.
#[derive(Debug, Clone)]
pub struct DrawCommand<'a> {
    pub program: ProgramId,
    pub target: DrawTarget,
    pub load: LoadAction,
    pub vertices: &'a [VertexBinding],
    pub uniforms: &'a [(UniformLocation, UniformValue<'a>)],
    pub textures: &'a [TextureBinding],
    pub topology: Topology,
    pub vertex_count: u32,
}

impl DrawCommand<'_> {
    /// Texture bound to the unit that `sampler` was set to.
    pub fn texture_for(&self, sampler: UniformLocation) -> Option<TextureId> {
        let unit = self.uniforms.iter().find_map(|(location, value)| {
            match (*location == sampler, value) {
                (true, UniformValue::Sampler(unit)) => Some(*unit),
                _ => None,
            }
        })?;
        self.textures
            .iter()
            .find(|binding| binding.unit == unit)
            .map(|binding| binding.texture)
    }
}

/// Everything the bloom pipeline needs from a device.
pub trait Backend {
    fn compile_program(
        &mut self,
        source: &ProgramSource,
    ) -> PipelineResult<(ProgramId, ProgramInterface)>;

    fn create_vertex_buffer(&mut self, label: &str, data: &[f32]) -> PipelineResult<BufferId>;

    fn create_texture(&mut self, image: &SceneImage) -> PipelineResult<TextureId>;

    /// Allocates a colour + depth target and returns it with its colour texture.
    fn create_framebuffer(
        &mut self,
        width: u32,
        height: u32,
    ) -> PipelineResult<(FramebufferId, TextureId)>;

    /// Frees the framebuffer and its colour texture.
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) -> PipelineResult<()>;

    fn begin_frame(&mut self) -> PipelineResult<()>;

    fn draw(&mut self, command: &DrawCommand<'_>) -> PipelineResult<()>;

    /// Submits the frame and presents the display target.
    fn end_frame(&mut self) -> PipelineResult<()>;

    fn resize_display(&mut self, width: u32, height: u32) -> PipelineResult<()>;

    fn display_size(&self) -> (u32, u32);

    fn live_framebuffers(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_sequence_never_repeats_across_kinds() {
        let mut ids = HandleSequence::default();
        let program = ids.program();
        let texture = ids.texture();
        let framebuffer = ids.framebuffer();
        let raw = [program.raw(), texture.raw(), framebuffer.raw(), ids.buffer().raw()];
        for (index, id) in raw.iter().enumerate() {
            assert!(raw[index + 1..].iter().all(|other| other != id));
        }
        assert_eq!(framebuffer.to_string(), format!("framebuffer#{}", framebuffer.raw()));
    }

    #[test]
    fn texture_for_follows_the_sampler_unit() {
        let mut ids = HandleSequence::default();
        let scene = ids.texture();
        let bloom = ids.texture();
        let uniforms = [
            (UniformLocation::Sampler(2), UniformValue::Sampler(0)),
            (UniformLocation::Sampler(3), UniformValue::Sampler(1)),
        ];
        let textures = [
            TextureBinding {
                unit: 1,
                texture: bloom,
            },
            TextureBinding {
                unit: 0,
                texture: scene,
            },
        ];
        let command = DrawCommand {
            program: ids.program(),
            target: DrawTarget::Display,
            load: LoadAction::Load,
            vertices: &[],
            uniforms: &uniforms,
            textures: &textures,
            topology: Topology::TriangleStrip,
            vertex_count: 4,
        };
        assert_eq!(command.texture_for(UniformLocation::Sampler(2)), Some(scene));
        assert_eq!(command.texture_for(UniformLocation::Sampler(3)), Some(bloom));
        assert_eq!(command.texture_for(UniformLocation::Sampler(4)), None);
    }
}
