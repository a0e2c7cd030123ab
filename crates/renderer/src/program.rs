//! Shader programs used by the bloom passes.
//!
//! Each [`ProgramKind`] declares the uniforms and vertex attributes its GLSL
//! expects. [`ShaderProgram::create`] compiles the pair through a backend and
//! resolves every declared name against what the backend reflected, so a
//! binding mismatch surfaces at startup instead of at draw time. The result
//! is an enum-indexed table: lookups during a frame are array reads.

use std::fmt;

use crate::backend::{Backend, ProgramId, ProgramSource, UniformLocation};
use crate::error::{PipelineError, PipelineResult};
use crate::kernel::SAMPLE_COUNT;

/// The distinct shader pairs created at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Normal,
    BrightPass,
    KawaseBlur,
    DualDownsample,
    DualUpsample,
    Composite,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 6] = [
        ProgramKind::Normal,
        ProgramKind::BrightPass,
        ProgramKind::KawaseBlur,
        ProgramKind::DualDownsample,
        ProgramKind::DualUpsample,
        ProgramKind::Composite,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProgramKind::Normal => "normal",
            ProgramKind::BrightPass => "bright-pass",
            ProgramKind::KawaseBlur => "kawase-blur",
            ProgramKind::DualDownsample => "dual-kawase-downsample",
            ProgramKind::DualUpsample => "dual-kawase-upsample",
            ProgramKind::Composite => "composite",
        }
    }

    /// Only the scene draw depth-tests; the full-screen passes ignore depth.
    pub fn uses_depth(self) -> bool {
        matches!(self, ProgramKind::Normal)
    }

    /// Uniforms in declaration order. Block members come first and keep this
    /// order inside the generated std140 block.
    pub fn uniforms(self) -> &'static [Uniform] {
        match self {
            ProgramKind::Normal => &[Uniform::MvpMatrix, Uniform::SceneTexture],
            ProgramKind::BrightPass => &[Uniform::MinBright, Uniform::SourceTexture],
            ProgramKind::KawaseBlur => &[
                Uniform::Resolution,
                Uniform::IsVertical,
                Uniform::OffsetsH,
                Uniform::WeightsH,
                Uniform::OffsetsV,
                Uniform::WeightsV,
                Uniform::SourceTexture,
            ],
            ProgramKind::DualDownsample | ProgramKind::DualUpsample => &[
                Uniform::Resolution,
                Uniform::Offset,
                Uniform::SourceTexture,
            ],
            ProgramKind::Composite => &[
                Uniform::ToneScale,
                Uniform::OriginalTexture,
                Uniform::BloomTexture,
            ],
        }
    }

    pub fn attributes(self) -> &'static [Attribute] {
        &[Attribute::Position, Attribute::TextureCoord]
    }

    fn vertex_body(self) -> &'static str {
        match self {
            ProgramKind::Normal => include_str!("../shaders/normal.vert"),
            _ => include_str!("../shaders/quad.vert"),
        }
    }

    fn fragment_body(self) -> &'static str {
        match self {
            ProgramKind::Normal => include_str!("../shaders/normal.frag"),
            ProgramKind::BrightPass => include_str!("../shaders/bright.frag"),
            ProgramKind::KawaseBlur => include_str!("../shaders/kawase.frag"),
            ProgramKind::DualDownsample => include_str!("../shaders/downsample.frag"),
            ProgramKind::DualUpsample => include_str!("../shaders/upsample.frag"),
            ProgramKind::Composite => include_str!("../shaders/composite.frag"),
        }
    }

    /// Full GLSL sources with the generated binding prologue prepended.
    pub fn source(self) -> ProgramSource {
        let header = binding_header(self);
        ProgramSource {
            kind: self,
            vertex: format!(
                "{VERSION}{header}{inputs}\n{body}",
                inputs = VERTEX_INTERFACE,
                body = self.vertex_body()
            ),
            fragment: format!(
                "{VERSION}{header}{inputs}\n{body}",
                inputs = FRAGMENT_INTERFACE,
                body = self.fragment_body()
            ),
        }
    }
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// GLSL value types a uniform may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    Float,
    Int,
    Vec2,
    Mat4,
    FloatArray(usize),
    Vec2Array(usize),
    Sampler2d,
}

impl UniformType {
    /// Block member declaration; `None` for samplers, which live outside
    /// the uniform block.
    fn block_member(self, name: &str) -> Option<String> {
        let decl = match self {
            UniformType::Float => format!("float {name};"),
            UniformType::Int => format!("int {name};"),
            UniformType::Vec2 => format!("vec2 {name};"),
            UniformType::Mat4 => format!("mat4 {name};"),
            UniformType::FloatArray(len) => format!("float {name}[{len}];"),
            UniformType::Vec2Array(len) => format!("vec2 {name}[{len}];"),
            UniformType::Sampler2d => return None,
        };
        Some(decl)
    }

    pub fn is_sampler(self) -> bool {
        matches!(self, UniformType::Sampler2d)
    }
}

/// Every uniform any bloom program declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uniform {
    MvpMatrix,
    SceneTexture,
    SourceTexture,
    MinBright,
    Resolution,
    IsVertical,
    OffsetsH,
    WeightsH,
    OffsetsV,
    WeightsV,
    Offset,
    ToneScale,
    OriginalTexture,
    BloomTexture,
}

impl Uniform {
    pub const COUNT: usize = 14;

    fn index(self) -> usize {
        self as usize
    }

    /// Name used in GLSL and in backend reflection.
    pub fn name(self) -> &'static str {
        match self {
            Uniform::MvpMatrix => "mvpMatrix",
            Uniform::SceneTexture => "sceneTexture",
            Uniform::SourceTexture => "sourceTexture",
            Uniform::MinBright => "minBright",
            Uniform::Resolution => "uResolution",
            Uniform::IsVertical => "isVertical",
            Uniform::OffsetsH => "offsetsH",
            Uniform::WeightsH => "weightsH",
            Uniform::OffsetsV => "offsetsV",
            Uniform::WeightsV => "weightsV",
            Uniform::Offset => "uOffset",
            Uniform::ToneScale => "toneScale",
            Uniform::OriginalTexture => "originalTexture",
            Uniform::BloomTexture => "bloomTexture",
        }
    }

    pub fn ty(self) -> UniformType {
        match self {
            Uniform::MvpMatrix => UniformType::Mat4,
            Uniform::SceneTexture
            | Uniform::SourceTexture
            | Uniform::OriginalTexture
            | Uniform::BloomTexture => UniformType::Sampler2d,
            Uniform::MinBright | Uniform::Offset | Uniform::ToneScale => UniformType::Float,
            Uniform::Resolution => UniformType::Vec2,
            Uniform::IsVertical => UniformType::Int,
            Uniform::OffsetsH | Uniform::OffsetsV => UniformType::Vec2Array(SAMPLE_COUNT),
            Uniform::WeightsH | Uniform::WeightsV => UniformType::FloatArray(SAMPLE_COUNT),
        }
    }
}

impl fmt::Display for Uniform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-vertex inputs shared by every program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Position,
    TextureCoord,
}

impl Attribute {
    pub const COUNT: usize = 2;

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Attribute::Position => "position",
            Attribute::TextureCoord => "textureCoord",
        }
    }

    pub fn components(self) -> u32 {
        match self {
            Attribute::Position => 3,
            Attribute::TextureCoord => 2,
        }
    }

    pub fn location(self) -> u32 {
        self.index() as u32
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a backend found in a compiled program: uniform names mapped to
/// locations and attribute names mapped to `(location, components)`.
#[derive(Debug, Clone, Default)]
pub struct ProgramInterface {
    pub uniforms: Vec<(String, UniformLocation)>,
    pub attributes: Vec<(String, u32, u32)>,
}

impl ProgramInterface {
    /// The interface a program kind declares, with block members numbered in
    /// declaration order and samplers numbered by binding slot.
    pub fn declared(kind: ProgramKind) -> Self {
        let mut uniforms = Vec::new();
        let mut block = 0;
        let mut sampler = 0;
        for uniform in kind.uniforms() {
            let location = if uniform.ty().is_sampler() {
                sampler += 1;
                UniformLocation::Sampler(SAMPLER_BINDING_BASE + sampler - 1)
            } else {
                block += 1;
                UniformLocation::Block(block - 1)
            };
            uniforms.push((uniform.name().to_string(), location));
        }
        let attributes = kind
            .attributes()
            .iter()
            .map(|attribute| {
                (
                    attribute.name().to_string(),
                    attribute.location(),
                    attribute.components(),
                )
            })
            .collect();
        Self {
            uniforms,
            attributes,
        }
    }

    fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, location)| *location)
    }

    fn attribute(&self, name: &str) -> Option<(u32, u32)> {
        self.attributes
            .iter()
            .find(|(candidate, _, _)| candidate == name)
            .map(|(_, location, components)| (*location, *components))
    }
}

/// Resolved location of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSlot {
    pub location: u32,
    pub components: u32,
}

/// A compiled program plus its validated binding tables.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    id: ProgramId,
    kind: ProgramKind,
    uniforms: [Option<UniformLocation>; Uniform::COUNT],
    attributes: [Option<AttributeSlot>; Attribute::COUNT],
}

impl ShaderProgram {
    /// Compiles `kind` and checks that the backend exposes every declared
    /// uniform and attribute.
    pub fn create<B: Backend + ?Sized>(backend: &mut B, kind: ProgramKind) -> PipelineResult<Self> {
        let (id, interface) = backend.compile_program(&kind.source())?;

        let mut uniforms = [None; Uniform::COUNT];
        for &uniform in kind.uniforms() {
            let location = interface
                .uniform(uniform.name())
                .ok_or(PipelineError::MissingUniform {
                    program: kind,
                    uniform,
                })?;
            uniforms[uniform.index()] = Some(location);
        }

        let mut attributes = [None; Attribute::COUNT];
        for &attribute in kind.attributes() {
            let (location, components) = interface.attribute(attribute.name()).ok_or(
                PipelineError::MissingAttribute {
                    program: kind,
                    attribute,
                },
            )?;
            attributes[attribute.index()] = Some(AttributeSlot {
                location,
                components,
            });
        }

        tracing::debug!(program = %kind, ?id, "created shader program");
        Ok(Self {
            id,
            kind,
            uniforms,
            attributes,
        })
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn kind(&self) -> ProgramKind {
        self.kind
    }

    pub fn uniform(&self, uniform: Uniform) -> Option<UniformLocation> {
        self.uniforms[uniform.index()]
    }

    pub fn attribute(&self, attribute: Attribute) -> Option<AttributeSlot> {
        self.attributes[attribute.index()]
    }
}

/// One program per [`ProgramKind`], created together at startup.
#[derive(Debug, Clone)]
pub struct ProgramSet {
    pub normal: ShaderProgram,
    pub bright: ShaderProgram,
    pub kawase: ShaderProgram,
    pub downsample: ShaderProgram,
    pub upsample: ShaderProgram,
    pub composite: ShaderProgram,
}

impl ProgramSet {
    pub fn create<B: Backend + ?Sized>(backend: &mut B) -> PipelineResult<Self> {
        Ok(Self {
            normal: ShaderProgram::create(backend, ProgramKind::Normal)?,
            bright: ShaderProgram::create(backend, ProgramKind::BrightPass)?,
            kawase: ShaderProgram::create(backend, ProgramKind::KawaseBlur)?,
            downsample: ShaderProgram::create(backend, ProgramKind::DualDownsample)?,
            upsample: ShaderProgram::create(backend, ProgramKind::DualUpsample)?,
            composite: ShaderProgram::create(backend, ProgramKind::Composite)?,
        })
    }

    pub fn get(&self, kind: ProgramKind) -> &ShaderProgram {
        match kind {
            ProgramKind::Normal => &self.normal,
            ProgramKind::BrightPass => &self.bright,
            ProgramKind::KawaseBlur => &self.kawase,
            ProgramKind::DualDownsample => &self.downsample,
            ProgramKind::DualUpsample => &self.upsample,
            ProgramKind::Composite => &self.composite,
        }
    }
}

/// Binding slot of the shared sampler; textures follow it.
pub const SAMPLER_BINDING: u32 = 1;
pub const SAMPLER_BINDING_BASE: u32 = 2;
/// Suffix of the `texture2D` global backing each sampler uniform.
pub const TEXTURE_SUFFIX: &str = "_texture";
/// Instance name of the std140 uniform block.
pub const BLOCK_INSTANCE: &str = "params";

const VERSION: &str = "#version 450\n";

const VERTEX_INTERFACE: &str = r"layout(location = 0) in vec3 position;
layout(location = 1) in vec2 textureCoord;
layout(location = 0) out vec2 vTextureCoord;
";

const FRAGMENT_INTERFACE: &str = r"layout(location = 0) in vec2 vTextureCoord;
layout(location = 0) out vec4 fragColor;
";

/// Generates the uniform block, sampler and texture declarations for `kind`
/// plus macros mapping the plain uniform names onto them.
fn binding_header(kind: ProgramKind) -> String {
    let mut block = String::new();
    let mut aliases = String::new();
    let mut textures = String::new();
    let mut binding = SAMPLER_BINDING_BASE;

    for uniform in kind.uniforms() {
        let name = uniform.name();
        match uniform.ty().block_member(name) {
            Some(member) => {
                block.push_str("    ");
                block.push_str(&member);
                block.push('\n');
                aliases.push_str(&format!("#define {name} {BLOCK_INSTANCE}.{name}\n"));
            }
            None => {
                textures.push_str(&format!(
                    "layout(set = 0, binding = {binding}) uniform texture2D {name}{TEXTURE_SUFFIX};\n\
                     #define {name} sampler2D({name}{TEXTURE_SUFFIX}, passSampler)\n"
                ));
                binding += 1;
            }
        }
    }

    format!(
        "#define SAMPLE_COUNT {SAMPLE_COUNT}\n\
         layout(std140, set = 0, binding = 0) uniform PassParams {{\n{block}}} {BLOCK_INSTANCE};\n\
         {aliases}\
         layout(set = 0, binding = {SAMPLER_BINDING}) uniform sampler passSampler;\n\
         {textures}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_declares_block_members_in_order() {
        let source = ProgramKind::KawaseBlur.source();
        let resolution = source.fragment.find("vec2 uResolution;").expect("resolution");
        let vertical = source.fragment.find("int isVertical;").expect("isVertical");
        let weights = source.fragment.find("float weightsV[15];").expect("weightsV");
        assert!(resolution < vertical && vertical < weights);
        assert!(source
            .fragment
            .contains("#define sourceTexture sampler2D(sourceTexture_texture, passSampler)"));
    }

    #[test]
    fn composite_textures_take_consecutive_bindings() {
        let source = ProgramKind::Composite.source();
        assert!(source
            .fragment
            .contains("layout(set = 0, binding = 2) uniform texture2D originalTexture_texture;"));
        assert!(source
            .fragment
            .contains("layout(set = 0, binding = 3) uniform texture2D bloomTexture_texture;"));
    }

    #[test]
    fn vertex_stage_declares_both_attributes() {
        for kind in ProgramKind::ALL {
            let source = kind.source();
            assert!(source.vertex.contains("in vec3 position;"), "{kind}");
            assert!(source.vertex.contains("in vec2 textureCoord;"), "{kind}");
            assert!(source.fragment.contains("out vec4 fragColor;"), "{kind}");
        }
    }

    #[test]
    fn declared_interface_numbers_block_and_samplers_separately() {
        let interface = ProgramInterface::declared(ProgramKind::Composite);
        assert_eq!(
            interface.uniform("toneScale"),
            Some(UniformLocation::Block(0))
        );
        assert_eq!(
            interface.uniform("originalTexture"),
            Some(UniformLocation::Sampler(2))
        );
        assert_eq!(
            interface.uniform("bloomTexture"),
            Some(UniformLocation::Sampler(3))
        );
        assert_eq!(interface.attribute("textureCoord"), Some((1, 2)));
    }
}
