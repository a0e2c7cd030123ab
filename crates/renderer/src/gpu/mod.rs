//! wgpu implementation of [`Backend`].
//!
//! - `context` owns the instance, device and window surface.
//! - `reflect` reads uniform block layouts, texture bindings and vertex
//!   inputs out of the generated GLSL with naga.
//! - `pipeline` turns a reflected program into render pipelines for the
//!   offscreen and display formats.
//! - `uniforms` packs draw values into the reflected std140 block.
//!
//! Every draw is encoded as its own render pass. Uniforms reach the GPU
//! through a staging copy recorded on the frame encoder, so consecutive
//! draws of one program each see their own values.

mod context;
mod pipeline;
mod reflect;
mod uniforms;

use std::collections::HashMap;

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::util::DeviceExt;

use crate::backend::{
    Backend, BufferId, DrawCommand, DrawTarget, FramebufferId, HandleSequence, LoadAction,
    ProgramId, ProgramSource, TextureId, UniformLocation,
};
use crate::error::{PipelineError, PipelineResult};
use crate::program::{ProgramInterface, SAMPLER_BINDING};
use crate::texture::SceneImage;
use crate::types::GpuPowerPreference;

use context::{GpuContext, DEPTH_FORMAT, OFFSCREEN_FORMAT};
use pipeline::ProgramPipeline;
use uniforms::UniformBlock;

struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuFramebuffer {
    color: TextureId,
    depth: wgpu::TextureView,
}

struct FrameInFlight {
    surface: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

pub struct GpuBackend {
    context: GpuContext,
    ids: HandleSequence,
    programs: HashMap<ProgramId, ProgramPipeline>,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    textures: HashMap<TextureId, GpuTexture>,
    framebuffers: HashMap<FramebufferId, GpuFramebuffer>,
    sampler: wgpu::Sampler,
    /// Bound to samplers a draw leaves unset; reads opaque black.
    fallback: GpuTexture,
    display_depth: wgpu::TextureView,
    frame: Option<FrameInFlight>,
}

impl GpuBackend {
    /// Opens a device presenting to `target`, which must outlive the backend.
    pub fn new<T>(target: &T, size: (u32, u32), gpu_power: GpuPowerPreference) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, size, gpu_power)?;
        let sampler = context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("pass sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let fallback = upload_texture(
            &context,
            "fallback texture",
            &SceneImage::solid(1, 1, [0, 0, 0, 255]),
        );
        let (width, height) = context.size();
        let display_depth = depth_view(&context.device, width, height);
        tracing::info!(adapter = %context.adapter_name, width, height, "GPU backend ready");

        Ok(Self {
            context,
            ids: HandleSequence::default(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            sampler,
            fallback,
            display_depth,
            frame: None,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.context.adapter_name
    }

    fn acquire(&self) -> Result<wgpu::SurfaceTexture, wgpu::SurfaceError> {
        match self.context.surface.get_current_texture() {
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost or outdated; reconfiguring");
                self.context.reconfigure();
                self.context.surface.get_current_texture()
            }
            other => other,
        }
    }

    fn bind_group(
        &self,
        program: &ProgramPipeline,
        command: &DrawCommand<'_>,
    ) -> PipelineResult<wgpu::BindGroup> {
        let mut views = Vec::with_capacity(program.layout.textures.len());
        for &(_, binding) in &program.layout.textures {
            let view = match command.texture_for(UniformLocation::Sampler(binding)) {
                Some(texture) => {
                    &self
                        .textures
                        .get(&texture)
                        .ok_or_else(|| texture.unknown())?
                        .view
                }
                None => &self.fallback.view,
            };
            views.push((binding, view));
        }

        let mut entries = Vec::with_capacity(views.len() + 2);
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: program.uniform_buffer.as_entire_binding(),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: SAMPLER_BINDING,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });
        entries.extend(views.into_iter().map(|(binding, view)| wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::TextureView(view),
        }));

        Ok(self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(program.kind.label()),
                layout: &program.bind_group_layout,
                entries: &entries,
            }))
    }
}

impl Backend for GpuBackend {
    fn compile_program(
        &mut self,
        source: &ProgramSource,
    ) -> PipelineResult<(ProgramId, ProgramInterface)> {
        let layout = reflect::reflect(source)?;
        let interface = layout.interface();
        let program = ProgramPipeline::new(
            &self.context.device,
            source,
            layout,
            OFFSCREEN_FORMAT,
            self.context.surface_format,
        )?;
        let id = self.ids.program();
        self.programs.insert(id, program);
        Ok((id, interface))
    }

    fn create_vertex_buffer(&mut self, label: &str, data: &[f32]) -> PipelineResult<BufferId> {
        let buffer = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let id = self.ids.buffer();
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn create_texture(&mut self, image: &SceneImage) -> PipelineResult<TextureId> {
        let texture = upload_texture(&self.context, "scene texture", image);
        let id = self.ids.texture();
        self.textures.insert(id, texture);
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
        let device = &self.context.device;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("render target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let color = self.ids.texture();
        let framebuffer = self.ids.framebuffer();
        self.textures.insert(
            color,
            GpuTexture {
                _texture: texture,
                view,
            },
        );
        self.framebuffers.insert(
            framebuffer,
            GpuFramebuffer {
                color,
                depth: depth_view(device, width, height),
            },
        );
        Ok((framebuffer, color))
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) -> PipelineResult<()> {
        let removed = self
            .framebuffers
            .remove(&framebuffer)
            .ok_or_else(|| framebuffer.unknown())?;
        self.textures.remove(&removed.color);
        Ok(())
    }

    fn begin_frame(&mut self) -> PipelineResult<()> {
        if self.frame.take().is_some() {
            tracing::warn!("discarding unfinished frame");
        }
        let surface = self
            .acquire()
            .map_err(|err| PipelineError::Surface(err.to_string()))?;
        let view = surface
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("bloom frame"),
            });
        self.frame = Some(FrameInFlight {
            surface,
            view,
            encoder,
        });
        Ok(())
    }

    fn draw(&mut self, command: &DrawCommand<'_>) -> PipelineResult<()> {
        // Detached so the encoder can be borrowed next to the resource maps.
        let mut frame = self.frame.take().ok_or(PipelineError::NoFrameInFlight)?;
        let result = self.encode(&mut frame, command);
        self.frame = Some(frame);
        result
    }

    fn end_frame(&mut self) -> PipelineResult<()> {
        let frame = self.frame.take().ok_or(PipelineError::NoFrameInFlight)?;
        self.context
            .queue
            .submit(std::iter::once(frame.encoder.finish()));
        frame.surface.present();
        Ok(())
    }

    fn resize_display(&mut self, width: u32, height: u32) -> PipelineResult<()> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidSurfaceSize { width, height });
        }
        self.context.resize(width, height);
        self.display_depth = depth_view(&self.context.device, width, height);
        Ok(())
    }

    fn display_size(&self) -> (u32, u32) {
        self.context.size()
    }

    fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }
}

impl GpuBackend {
    fn encode(&self, frame: &mut FrameInFlight, command: &DrawCommand<'_>) -> PipelineResult<()> {
        let program = self
            .programs
            .get(&command.program)
            .ok_or_else(|| command.program.unknown())?;

        let (color, depth, format) = match command.target {
            DrawTarget::Display => (
                &frame.view,
                &self.display_depth,
                self.context.surface_format,
            ),
            DrawTarget::Framebuffer(framebuffer) => {
                let target = self
                    .framebuffers
                    .get(&framebuffer)
                    .ok_or_else(|| framebuffer.unknown())?;
                let texture = self
                    .textures
                    .get(&target.color)
                    .ok_or_else(|| target.color.unknown())?;
                (&texture.view, &target.depth, OFFSCREEN_FORMAT)
            }
        };

        let mut vertex_buffers = Vec::with_capacity(program.layout.inputs.len());
        for &(location, _) in &program.layout.inputs {
            let binding = command
                .vertices
                .iter()
                .find(|binding| binding.location == location)
                .ok_or(PipelineError::MissingVertexStream {
                    program: program.kind,
                    location,
                })?;
            let buffer = self
                .buffers
                .get(&binding.buffer)
                .ok_or_else(|| binding.buffer.unknown())?;
            vertex_buffers.push(buffer);
        }

        let bind_group = self.bind_group(program, command)?;

        let mut block = UniformBlock::new(&program.layout);
        block.write_all(&program.layout, command.uniforms);
        let staging = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("uniform staging"),
                contents: block.bytes(),
                usage: wgpu::BufferUsages::COPY_SRC,
            });
        frame.encoder.copy_buffer_to_buffer(
            &staging,
            0,
            &program.uniform_buffer,
            0,
            program.uniform_size,
        );

        let (color_load, depth_load) = match command.load {
            LoadAction::Clear { color, depth } => (
                wgpu::LoadOp::Clear(wgpu::Color {
                    r: f64::from(color[0]),
                    g: f64::from(color[1]),
                    b: f64::from(color[2]),
                    a: f64::from(color[3]),
                }),
                wgpu::LoadOp::Clear(depth),
            ),
            LoadAction::Load => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
        };

        let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(program.kind.label()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: program.depth.then(|| {
                wgpu::RenderPassDepthStencilAttachment {
                    view: depth,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(program.pipeline_for(format));
        render_pass.set_bind_group(0, &bind_group, &[]);
        for (slot, buffer) in vertex_buffers.into_iter().enumerate() {
            render_pass.set_vertex_buffer(slot as u32, buffer.slice(..));
        }
        render_pass.draw(0..command.vertex_count, 0..1);
        Ok(())
    }
}

fn upload_texture(context: &GpuContext, label: &str, image: &SceneImage) -> GpuTexture {
    let texture = context.device.create_texture_with_data(
        &context.queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: image.width(),
                height: image.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        image.pixels(),
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        _texture: texture,
        view,
    }
}

fn depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("depth"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}
