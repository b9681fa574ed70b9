use crate::constants::{workgroups_for, AGENT_VECTOR_BYTES, PIXEL_BYTES};
use crate::error::Result;
use crate::gpu::{Backend, BindingGroup, BufferSpec, BufferUsage};
use crate::params::ParameterRegistry;

/// Every buffer the compute stages touch, and the groups that bind them.
///
/// Shapes are decided once in [`ResourceLayout::build`]; afterwards only
/// buffer contents change.
pub struct ResourceLayout<B: Backend> {
    shared: B::Layout,
    framebuffer: B::Buffer,
    positions: B::Buffer,
    headings: B::Buffer,
    bind_groups: [B::BindGroup; 3],
    resolution: u32,
    agent_capacity: u32,
}

impl<B: Backend> ResourceLayout<B> {
    /// Allocates the framebuffer (`resolution²` cells) and the agent buffers
    /// (`agent_count` entries each) and wires them, plus every registered
    /// parameter, into the three bind groups. Seals the registry.
    ///
    /// On failure every buffer created here is dropped before the error is
    /// returned.
    pub fn build(
        backend: &B,
        registry: &mut ParameterRegistry<B>,
        resolution: u32,
        agent_count: u32,
    ) -> Result<Self> {
        let cells = resolution as u64 * resolution as u64;

        let framebuffer = backend.create_buffer(&BufferSpec {
            label: "Framebuffer",
            size: cells * PIXEL_BYTES,
            usage: BufferUsage::Storage,
        })?;
        let positions = backend.create_buffer(&BufferSpec {
            label: "Agent positions",
            size: agent_count as u64 * AGENT_VECTOR_BYTES,
            usage: BufferUsage::Storage,
        })?;
        let headings = backend.create_buffer(&BufferSpec {
            label: "Agent headings",
            size: agent_count as u64 * AGENT_VECTOR_BYTES,
            usage: BufferUsage::Storage,
        })?;

        let parameter_sizes: Vec<u64> = registry.iter().map(|p| p.byte_size()).collect();
        let shared = backend.create_layout(&parameter_sizes)?;

        let parameter_buffers: Vec<&B::Buffer> = registry.iter().map(|p| p.buffer()).collect();
        let bind_groups = [
            backend.create_bind_group(&shared, BindingGroup::Framebuffer, &[&framebuffer])?,
            backend.create_bind_group(&shared, BindingGroup::Parameters, &parameter_buffers)?,
            backend.create_bind_group(&shared, BindingGroup::Agents, &[&positions, &headings])?,
        ];
        registry.seal();

        log::info!(
            "resource layout: {}x{} framebuffer ({} bytes), {} agents, {} parameters",
            resolution,
            resolution,
            cells * PIXEL_BYTES,
            agent_count,
            parameter_sizes.len()
        );

        Ok(Self {
            shared,
            framebuffer,
            positions,
            headings,
            bind_groups,
            resolution,
            agent_capacity: agent_count,
        })
    }

    pub fn shared(&self) -> &B::Layout {
        &self.shared
    }

    pub fn framebuffer(&self) -> &B::Buffer {
        &self.framebuffer
    }

    pub fn positions(&self) -> &B::Buffer {
        &self.positions
    }

    pub fn headings(&self) -> &B::Buffer {
        &self.headings
    }

    /// Bind groups in `@group` order.
    pub fn bind_groups(&self) -> [&B::BindGroup; 3] {
        let [framebuffer, parameters, agents] = &self.bind_groups;
        [framebuffer, parameters, agents]
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Number of agents the position/heading buffers hold.
    pub fn agent_capacity(&self) -> u32 {
        self.agent_capacity
    }

    /// Workgroups covering every framebuffer cell.
    pub fn pixel_workgroups(&self) -> u32 {
        workgroups_for(self.resolution as u64 * self.resolution as u64)
    }

    /// Workgroups covering the allocated agents.
    pub fn agent_capacity_workgroups(&self) -> u32 {
        workgroups_for(self.agent_capacity as u64)
    }
}
