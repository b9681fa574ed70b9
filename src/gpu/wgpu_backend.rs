use std::sync::mpsc;

use crate::error::{Error, Result};
use crate::stages::Stage;

use super::{Backend, BindingGroup, BufferSpec, BufferUsage, ComputeProgram, Dispatch};

/// Bind group layouts for the three groups plus the pipeline layout built
/// from them. Shared by every compute stage.
pub struct SharedLayout {
    pub groups: [wgpu::BindGroupLayout; 3],
    pub pipeline_layout: wgpu::PipelineLayout,
}

/// [`Backend`] over a real device and queue.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    /// Device without a surface, for offline checks. `None` if the machine
    /// has no usable adapter.
    pub async fn headless() -> Option<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await?;
        log::info!("headless adapter: {:?}", adapter.get_info());
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .ok()?;
        Some(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Runs `f` inside validation and out-of-memory error scopes so a rejected
    /// object comes back as an error instead of hitting the uncaptured handler.
    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> std::result::Result<T, wgpu::Error> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        match validation.or(out_of_memory) {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }

    fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }

    fn uniform_entry(binding: u32, size: u64) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(size),
            },
            count: None,
        }
    }
}

impl Backend for WgpuBackend {
    type Buffer = wgpu::Buffer;
    type Layout = SharedLayout;
    type BindGroup = wgpu::BindGroup;
    type Module = wgpu::ShaderModule;
    type Pipeline = wgpu::ComputePipeline;
    type Commands = wgpu::CommandEncoder;

    fn create_buffer(&self, spec: &BufferSpec<'_>) -> Result<wgpu::Buffer> {
        let limits = self.device.limits();
        if spec.size == 0 {
            return Err(Error::allocation(spec.label, "zero-sized buffer"));
        }
        let max = match spec.usage {
            BufferUsage::Uniform => limits.max_uniform_buffer_binding_size as u64,
            BufferUsage::Storage => limits.max_storage_buffer_binding_size as u64,
        };
        if spec.size > max.min(limits.max_buffer_size) {
            return Err(Error::allocation(
                spec.label,
                format!("{} bytes exceeds the device limit of {}", spec.size, max),
            ));
        }

        let usage = match spec.usage {
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
            BufferUsage::Storage => wgpu::BufferUsages::STORAGE,
        } | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;

        self.scoped(|device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(spec.label),
                size: spec.size,
                usage,
                mapped_at_creation: false,
            })
        })
        .map_err(|err| Error::allocation(spec.label, err))
    }

    fn write_buffer(&self, buffer: &wgpu::Buffer, bytes: &[u8]) {
        self.queue.write_buffer(buffer, 0, bytes);
    }

    fn read_buffer(&self, buffer: &wgpu::Buffer) -> Result<Vec<u8>> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback staging buffer"),
            size: buffer.size(),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, buffer.size());
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|err| Error::Readback(err.to_string()))?
            .map_err(|err| Error::Readback(err.to_string()))?;
        let bytes = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(bytes)
    }

    fn create_layout(&self, parameter_sizes: &[u64]) -> Result<SharedLayout> {
        let parameter_entries: Vec<_> = parameter_sizes
            .iter()
            .enumerate()
            .map(|(binding, size)| Self::uniform_entry(binding as u32, *size))
            .collect();

        self.scoped(|device| {
            let framebuffer = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Framebuffer bind group layout"),
                entries: &[Self::storage_entry(0)],
            });
            let parameters = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Parameter bind group layout"),
                entries: &parameter_entries,
            });
            let agents = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Agent bind group layout"),
                entries: &[Self::storage_entry(0), Self::storage_entry(1)],
            });
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Shared compute pipeline layout"),
                bind_group_layouts: &[&framebuffer, &parameters, &agents],
                push_constant_ranges: &[],
            });
            SharedLayout {
                groups: [framebuffer, parameters, agents],
                pipeline_layout,
            }
        })
        .map_err(|err| Error::allocation("Shared compute pipeline layout", err))
    }

    fn create_bind_group(
        &self,
        layout: &SharedLayout,
        group: BindingGroup,
        buffers: &[&wgpu::Buffer],
    ) -> Result<wgpu::BindGroup> {
        let entries: Vec<_> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        self.scoped(|device| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(group.label()),
                layout: &layout.groups[group.index() as usize],
                entries: &entries,
            })
        })
        .map_err(|err| Error::allocation(group.label(), err))
    }

    fn create_module(&self, program: &dyn ComputeProgram) -> Result<wgpu::ShaderModule> {
        let source = program.source();
        self.scoped(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(program.label()),
                source: wgpu::ShaderSource::Wgsl(source),
            })
        })
        .map_err(|err| Error::shader_module(program.label(), err))
    }

    fn create_pipeline(
        &self,
        layout: &SharedLayout,
        module: &wgpu::ShaderModule,
        stage: Stage,
        entry_point: &str,
    ) -> Result<wgpu::ComputePipeline> {
        let label = format!("{} compute pipeline", stage.name());
        self.scoped(|device| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label.as_str()),
                layout: Some(&layout.pipeline_layout),
                module,
                entry_point: Some(entry_point),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        })
        .map_err(|err| Error::compile(stage.name(), err))
    }

    fn begin_commands(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn encode_compute(
        &self,
        commands: &mut wgpu::CommandEncoder,
        label: &str,
        bind_groups: [&wgpu::BindGroup; 3],
        dispatches: &[Dispatch<'_, wgpu::ComputePipeline>],
    ) {
        commands.push_debug_group(label);
        {
            let mut cpass = commands.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            for (index, bind_group) in bind_groups.into_iter().enumerate() {
                cpass.set_bind_group(index as u32, bind_group, &[]);
            }
            for dispatch in dispatches {
                cpass.set_pipeline(dispatch.pipeline);
                cpass.dispatch_workgroups(dispatch.workgroups, 1, 1);
            }
        }
        commands.pop_debug_group();
    }

    fn submit(&self, commands: wgpu::CommandEncoder) -> Result<()> {
        self.scoped(|_| {
            self.queue.submit(Some(commands.finish()));
        })
        .map_err(|err| Error::Submission(err.to_string()))
    }
}
