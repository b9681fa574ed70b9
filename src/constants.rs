use std::f64::consts::PI;

/// Threads per workgroup for every compute entry point in `compute.wgsl`.
pub const WORKGROUP_SIZE: u32 = 256;

/// Default `max_compute_workgroups_per_dimension`.
pub const MAX_WORKGROUPS_PER_DISPATCH: u32 = 65535;

/// Bytes per framebuffer cell (`vec4<f32>`).
pub const PIXEL_BYTES: u64 = 16;
/// Bytes per agent position / heading (`vec2<f32>`).
pub const AGENT_VECTOR_BYTES: u64 = 8;

pub const RESOLUTION: f64 = 512.0;
pub const NUM_AGENTS: f64 = 10000.0;

pub const ALPHA: f64 = PI;
pub const BETA: f64 = -0.023;
pub const RADIUS: f64 = 24.0;
pub const VELOCITY: f64 = 1.0;

pub const RESOLUTION_PARAM: &str = "rez";
pub const TIME_PARAM: &str = "time";
pub const COUNT_PARAM: &str = "count";

pub const DEFAULT_PRESET: &str = "default";

/// Past 2^24 an f32 can no longer represent `time + 1`.
pub const TIME_WRAP: f64 = 16_777_216.0;

/// Fraction of the smaller monitor side the window takes up.
pub const WINDOW_FILL: f64 = 0.95;

/// Number of workgroups needed to cover `items` invocations.
pub fn workgroups_for(items: u64) -> u32 {
    items.div_ceil(WORKGROUP_SIZE as u64) as u32
}
