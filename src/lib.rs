pub mod config;
pub mod constants;
pub mod controls;
pub mod error;
pub mod framework;
pub mod gpu;
pub mod layout;
pub mod orchestrator;
pub mod params;
pub mod present;
pub mod presets;
pub mod scheduler;
pub mod shader;
pub mod stages;

pub use config::SimulationConfig;
pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
pub use params::{ElementType, ParamValue, ParameterRegistry};
