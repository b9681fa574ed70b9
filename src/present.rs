use std::borrow::Cow;

use crate::gpu::{Backend, WgpuBackend};

/// Turns the framebuffer storage buffer into something visible.
///
/// Called once per frame with the frame's pending commands; anything it
/// encodes is submitted together with the compute passes.
pub trait Presenter<B: Backend> {
    type Target: ?Sized;

    fn present(
        &mut self,
        backend: &B,
        resolution: u32,
        framebuffer: &B::Buffer,
        target: &Self::Target,
        commands: &mut B::Commands,
    );
}

#[repr(C)]
#[derive(Copy, Clone)]
struct DrawParams {
    resolution: u32,
    _padding: [u32; 3],
}

unsafe impl bytemuck::Zeroable for DrawParams {}
unsafe impl bytemuck::Pod for DrawParams {}

/// Draws the framebuffer across a surface texture with a full-screen
/// triangle that reads the storage buffer in the fragment stage.
pub struct SurfacePresenter {
    render_pipeline: wgpu::RenderPipeline,
    render_bind_group_layout: wgpu::BindGroupLayout,
    draw_params_buffer: wgpu::Buffer,
    render_bind_group: Option<wgpu::BindGroup>,
}

impl SurfacePresenter {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let draw_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("draw.wgsl"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("draw.wgsl"))),
        });

        let render_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Render bind group layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: wgpu::BufferSize::new(
                                std::mem::size_of::<DrawParams>() as _,
                            ),
                        },
                        count: None,
                    },
                ],
            });

        let render_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Render pipeline layout"),
                bind_group_layouts: &[&render_bind_group_layout],
                push_constant_ranges: &[],
            });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Render pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &draw_shader,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &draw_shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(format.into())],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let draw_params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw params buffer"),
            size: std::mem::size_of::<DrawParams>() as _,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            render_pipeline,
            render_bind_group_layout,
            draw_params_buffer,
            render_bind_group: None,
        }
    }
}

impl Presenter<WgpuBackend> for SurfacePresenter {
    type Target = wgpu::TextureView;

    fn present(
        &mut self,
        backend: &WgpuBackend,
        resolution: u32,
        framebuffer: &wgpu::Buffer,
        target: &wgpu::TextureView,
        commands: &mut wgpu::CommandEncoder,
    ) {
        // the framebuffer never moves, so the bind group is built on first use
        let render_bind_group = self.render_bind_group.get_or_insert_with(|| {
            let params = DrawParams {
                resolution,
                _padding: [0; 3],
            };
            backend
                .queue()
                .write_buffer(&self.draw_params_buffer, 0, bytemuck::bytes_of(&params));

            backend.device().create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Render bind group"),
                layout: &self.render_bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: framebuffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: self.draw_params_buffer.as_entire_binding(),
                    },
                ],
            })
        });

        commands.push_debug_group("render framebuffer");
        {
            let mut rpass = commands.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Present pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            rpass.set_pipeline(&self.render_pipeline);
            rpass.set_bind_group(0, &*render_bind_group, &[]);
            rpass.draw(0..3, 0..1);
        }
        commands.pop_debug_group();
    }
}
