//! The slice of the GPU the orchestrator talks to.
//!
//! Everything above this module (registry, layout, stages, scheduler) is
//! written against [`Backend`] and never names a `wgpu` type directly.
//! [`WgpuBackend`] is the real device; tests swap in a recording backend that
//! keeps buffer contents in host memory and logs every command.

use std::borrow::Cow;

use crate::error::Result;
use crate::stages::Stage;

mod wgpu_backend;
pub use wgpu_backend::{SharedLayout, WgpuBackend};

#[cfg(test)]
pub(crate) mod recording;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Small host-written block, bound as `var<uniform>`.
    Uniform,
    /// Compute-written storage, bound as `var<storage, read_write>`.
    Storage,
}

#[derive(Clone, Copy, Debug)]
pub struct BufferSpec<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: BufferUsage,
}

/// The three bind groups every stage sees, in `@group` order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingGroup {
    Framebuffer = 0,
    Parameters = 1,
    Agents = 2,
}

impl BindingGroup {
    pub const ALL: [BindingGroup; 3] = [
        BindingGroup::Framebuffer,
        BindingGroup::Parameters,
        BindingGroup::Agents,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn label(self) -> &'static str {
        match self {
            BindingGroup::Framebuffer => "Framebuffer bind group",
            BindingGroup::Parameters => "Parameter bind group",
            BindingGroup::Agents => "Agent bind group",
        }
    }
}

/// A compute program the orchestrator can bind against the shared layout.
///
/// Only the source text and entry point names are visible here; whatever
/// the program computes is its own business.
pub trait ComputeProgram {
    fn label(&self) -> &str;

    fn source(&self) -> Cow<'_, str>;

    fn entry_point(&self, stage: Stage) -> &str {
        stage.name()
    }
}

/// WGSL text plus its label.
#[derive(Clone, Debug)]
pub struct WgslProgram {
    label: String,
    source: Cow<'static, str>,
}

impl WgslProgram {
    pub fn new(label: impl Into<String>, source: impl Into<Cow<'static, str>>) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
        }
    }

    /// The slime program shipped with the crate.
    pub fn bundled() -> Self {
        Self::new("compute.wgsl", include_str!("../compute.wgsl"))
    }
}

impl ComputeProgram for WgslProgram {
    fn label(&self) -> &str {
        &self.label
    }

    fn source(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.source)
    }
}

/// One dispatch inside a compute pass.
pub struct Dispatch<'a, P> {
    pub stage: Stage,
    pub pipeline: &'a P,
    pub workgroups: u32,
}

pub trait Backend {
    type Buffer;
    type Layout;
    type BindGroup;
    type Module;
    type Pipeline;
    type Commands;

    fn create_buffer(&self, spec: &BufferSpec<'_>) -> Result<Self::Buffer>;

    /// Queues a host write into `buffer`; it lands before the next submission.
    fn write_buffer(&self, buffer: &Self::Buffer, bytes: &[u8]);

    /// Blocks until the current contents of `buffer` are back on the host.
    fn read_buffer(&self, buffer: &Self::Buffer) -> Result<Vec<u8>>;

    /// Builds the three bind group layouts and the pipeline layout over them.
    /// `parameter_sizes[i]` is the byte size bound at `@group(1) @binding(i)`.
    fn create_layout(&self, parameter_sizes: &[u64]) -> Result<Self::Layout>;

    fn create_bind_group(
        &self,
        layout: &Self::Layout,
        group: BindingGroup,
        buffers: &[&Self::Buffer],
    ) -> Result<Self::BindGroup>;

    fn create_module(&self, program: &dyn ComputeProgram) -> Result<Self::Module>;

    fn create_pipeline(
        &self,
        layout: &Self::Layout,
        module: &Self::Module,
        stage: Stage,
        entry_point: &str,
    ) -> Result<Self::Pipeline>;

    fn begin_commands(&self, label: &str) -> Self::Commands;

    /// Records one compute pass with all three groups bound and the given
    /// dispatches issued in order.
    fn encode_compute(
        &self,
        commands: &mut Self::Commands,
        label: &str,
        bind_groups: [&Self::BindGroup; 3],
        dispatches: &[Dispatch<'_, Self::Pipeline>],
    );

    fn submit(&self, commands: Self::Commands) -> Result<()>;
}
