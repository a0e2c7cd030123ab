use std::borrow::Cow;

use wgpu::naga::ShaderStage;

use crate::backend::ProgramSource;
use crate::error::{PipelineError, PipelineResult};
use crate::program::{ProgramKind, SAMPLER_BINDING};

use super::context::DEPTH_FORMAT;
use super::reflect::ProgramLayout;
use super::uniforms::UniformBlock;

/// GPU objects of one compiled program: a render pipeline per colour format
/// it draws into, plus the uniform buffer its block is copied into.
pub(crate) struct ProgramPipeline {
    pub kind: ProgramKind,
    pub layout: ProgramLayout,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub uniform_buffer: wgpu::Buffer,
    pub uniform_size: u64,
    /// Whether draws need a depth attachment.
    pub depth: bool,
    offscreen: wgpu::RenderPipeline,
    display: wgpu::RenderPipeline,
    offscreen_format: wgpu::TextureFormat,
}

impl ProgramPipeline {
    /// Compiles both stages and builds pipelines for the offscreen and
    /// display formats inside a validation scope.
    pub fn new(
        device: &wgpu::Device,
        source: &ProgramSource,
        layout: ProgramLayout,
        offscreen_format: wgpu::TextureFormat,
        display_format: wgpu::TextureFormat,
    ) -> PipelineResult<Self> {
        let kind = source.kind;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex = compile_stage(device, kind, ShaderStage::Vertex, &source.vertex);
        let fragment = compile_stage(device, kind, ShaderStage::Fragment, &source.fragment);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(kind.label()),
            entries: &layout_entries(&layout),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(kind.label()),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let attributes: Vec<[wgpu::VertexAttribute; 1]> = layout
            .inputs
            .iter()
            .map(|&(location, components)| {
                [wgpu::VertexAttribute {
                    format: vertex_format(components),
                    offset: 0,
                    shader_location: location,
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = layout
            .inputs
            .iter()
            .zip(&attributes)
            .map(|(&(_, components), attribute)| wgpu::VertexBufferLayout {
                array_stride: u64::from(components) * 4,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attribute,
            })
            .collect();

        let build = |format: wgpu::TextureFormat| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(kind.label()),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex,
                    entry_point: Some("main"),
                    buffers: &buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: depth_state(kind),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            })
        };
        let offscreen = build(offscreen_format);
        let display = build(display_format);

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(PipelineError::ShaderCompile {
                program: kind,
                message: err.to_string(),
            });
        }

        let uniform_size = UniformBlock::new(&layout).size();
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pass uniforms"),
            size: uniform_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            kind,
            layout,
            bind_group_layout,
            uniform_buffer,
            uniform_size,
            depth: kind.uses_depth(),
            offscreen,
            display,
            offscreen_format,
        })
    }

    pub fn pipeline_for(&self, format: wgpu::TextureFormat) -> &wgpu::RenderPipeline {
        if format == self.offscreen_format {
            &self.offscreen
        } else {
            &self.display
        }
    }
}

fn compile_stage(
    device: &wgpu::Device,
    kind: ProgramKind,
    stage: ShaderStage,
    source: &str,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(kind.label()),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source.to_owned()),
            stage,
            defines: &[],
        },
    })
}

fn depth_state(kind: ProgramKind) -> Option<wgpu::DepthStencilState> {
    kind.uses_depth().then(|| wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: true,
        depth_compare: wgpu::CompareFunction::LessEqual,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    })
}

fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

fn layout_entries(layout: &ProgramLayout) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(layout.textures.len() + 2);
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: SAMPLER_BINDING,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    });
    for &(_, binding) in &layout.textures {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_scene_program_depth_tests() {
        let scene = depth_state(ProgramKind::Normal).expect("scene depth");
        assert_eq!(scene.format, DEPTH_FORMAT);
        assert!(scene.depth_write_enabled);
        assert_eq!(scene.depth_compare, wgpu::CompareFunction::LessEqual);
        for kind in ProgramKind::ALL {
            if kind != ProgramKind::Normal {
                assert!(depth_state(kind).is_none(), "{kind}");
            }
        }
    }
}
