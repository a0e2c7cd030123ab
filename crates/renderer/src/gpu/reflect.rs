//! Reads binding layouts back out of the generated GLSL.
//!
//! Both stages are parsed with naga's GLSL frontend. The uniform block gives
//! member offsets and array strides, `texture2D` globals give sampler
//! bindings and the vertex entry point gives attribute locations.

use wgpu::naga::{self, front::glsl, AddressSpace, Binding, Module, ShaderStage, TypeInner};

use crate::backend::{ProgramSource, UniformLocation};
use crate::error::{PipelineError, PipelineResult};
use crate::program::{Attribute, ProgramInterface, ProgramKind, TEXTURE_SUFFIX};

/// One member of the std140 uniform block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockMember {
    pub name: String,
    pub offset: u32,
    /// Distance between array elements; zero for non-array members.
    pub stride: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ProgramLayout {
    pub block_size: u32,
    pub members: Vec<BlockMember>,
    /// `(sampler uniform name, texture binding)`.
    pub textures: Vec<(String, u32)>,
    /// `(location, components)` sorted by location.
    pub inputs: Vec<(u32, u32)>,
}

impl ProgramLayout {
    pub fn interface(&self) -> ProgramInterface {
        let mut uniforms: Vec<(String, UniformLocation)> = self
            .members
            .iter()
            .enumerate()
            .map(|(index, member)| (member.name.clone(), UniformLocation::Block(index as u32)))
            .collect();
        uniforms.extend(
            self.textures
                .iter()
                .map(|(name, binding)| (name.clone(), UniformLocation::Sampler(*binding))),
        );

        // Inputs are declared with explicit locations, so the location names
        // the attribute.
        let attributes = [Attribute::Position, Attribute::TextureCoord]
            .into_iter()
            .filter_map(|attribute| {
                self.inputs
                    .iter()
                    .find(|(location, _)| *location == attribute.location())
                    .map(|&(location, components)| {
                        (attribute.name().to_string(), location, components)
                    })
            })
            .collect();

        ProgramInterface {
            uniforms,
            attributes,
        }
    }

    pub fn member(&self, index: u32) -> Option<&BlockMember> {
        self.members.get(index as usize)
    }
}

pub(crate) fn reflect(source: &ProgramSource) -> PipelineResult<ProgramLayout> {
    let vertex = parse(source.kind, ShaderStage::Vertex, &source.vertex)?;
    let fragment = parse(source.kind, ShaderStage::Fragment, &source.fragment)?;

    let (block_size, members) = uniform_block(&fragment)
        .or_else(|| uniform_block(&vertex))
        .unwrap_or_default();

    let mut textures = textures(&fragment);
    textures.sort_by_key(|(_, binding)| *binding);

    let mut inputs = vertex_inputs(&vertex);
    inputs.sort_unstable();

    Ok(ProgramLayout {
        block_size,
        members,
        textures,
        inputs,
    })
}

fn parse(kind: ProgramKind, stage: ShaderStage, source: &str) -> PipelineResult<Module> {
    let mut frontend = glsl::Frontend::default();
    frontend
        .parse(&glsl::Options::from(stage), source)
        .map_err(|errors| PipelineError::ShaderCompile {
            program: kind,
            message: errors
                .errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        })
}

fn uniform_block(module: &Module) -> Option<(u32, Vec<BlockMember>)> {
    module.global_variables.iter().find_map(|(_, global)| {
        if global.space != AddressSpace::Uniform {
            return None;
        }
        let TypeInner::Struct { members, span } = &module.types[global.ty].inner else {
            return None;
        };
        let members = members
            .iter()
            .map(|member| BlockMember {
                name: member.name.clone().unwrap_or_default(),
                offset: member.offset,
                stride: match module.types[member.ty].inner {
                    TypeInner::Array { stride, .. } => stride,
                    _ => 0,
                },
            })
            .collect();
        Some((*span, members))
    })
}

fn textures(module: &Module) -> Vec<(String, u32)> {
    module
        .global_variables
        .iter()
        .filter_map(|(_, global)| {
            if !matches!(module.types[global.ty].inner, TypeInner::Image { .. }) {
                return None;
            }
            let name = global.name.as_deref()?.strip_suffix(TEXTURE_SUFFIX)?;
            let binding = global.binding.as_ref()?.binding;
            Some((name.to_string(), binding))
        })
        .collect()
}

fn vertex_inputs(module: &Module) -> Vec<(u32, u32)> {
    let Some(entry) = module
        .entry_points
        .iter()
        .find(|entry| entry.stage == ShaderStage::Vertex)
    else {
        return Vec::new();
    };
    entry
        .function
        .arguments
        .iter()
        .filter_map(|argument| {
            let Some(Binding::Location { location, .. }) = argument.binding else {
                return None;
            };
            let components = match module.types[argument.ty].inner {
                TypeInner::Scalar(_) => 1,
                TypeInner::Vector { size, .. } => vector_len(size),
                _ => return None,
            };
            Some((location, components))
        })
        .collect()
}

fn vector_len(size: naga::VectorSize) -> u32 {
    match size {
        naga::VectorSize::Bi => 2,
        naga::VectorSize::Tri => 3,
        naga::VectorSize::Quad => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kawase_block_uses_std140_array_strides() {
        let layout = reflect(&ProgramKind::KawaseBlur.source()).expect("reflect");
        let names: Vec<_> = layout.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            ["uResolution", "isVertical", "offsetsH", "weightsH", "offsetsV", "weightsV"]
        );
        assert_eq!(layout.members[0].offset, 0);
        assert_eq!(layout.members[1].offset, 8);
        assert_eq!(layout.members[2].offset, 16);
        assert_eq!(layout.members[2].stride, 16);
        assert_eq!(layout.members[3].stride, 16);
        assert!(layout.block_size >= layout.members[5].offset + 15 * 16 - 12);
    }

    #[test]
    fn composite_interface_matches_declaration() {
        let layout = reflect(&ProgramKind::Composite.source()).expect("reflect");
        let interface = layout.interface();
        let declared = ProgramInterface::declared(ProgramKind::Composite);
        assert_eq!(interface.uniforms, declared.uniforms);
        assert_eq!(interface.attributes, declared.attributes);
    }

    #[test]
    fn every_program_reflects_both_attributes() {
        for kind in ProgramKind::ALL {
            let layout = reflect(&kind.source()).expect("reflect");
            assert_eq!(layout.inputs, vec![(0, 3), (1, 2)], "{kind}");
        }
    }

    #[test]
    fn syntax_errors_surface_as_compile_failures() {
        let mut source = ProgramKind::BrightPass.source();
        source.fragment.push_str("\nvoid broken( {");
        assert!(matches!(
            reflect(&source),
            Err(PipelineError::ShaderCompile {
                program: ProgramKind::BrightPass,
                ..
            })
        ));
    }
}
