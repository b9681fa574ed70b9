//! Startup configuration: the parameter schema and the named presets.
//!
//! Both are fixed once the orchestrator is built. The default configuration
//! matches the bundled `compute.wgsl`; a JSON file with the same shape can
//! replace it.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::params::{check_declared, ElementType, ParamValue};

/// Which parameters carry the values the orchestrator itself relies on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterRoles {
    pub resolution: String,
    pub time: String,
    pub agent_count: String,
}

impl Default for ParameterRoles {
    fn default() -> Self {
        Self {
            resolution: RESOLUTION_PARAM.to_owned(),
            time: TIME_PARAM.to_owned(),
            agent_count: COUNT_PARAM.to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub value: ParamValue,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    /// Explicit byte size; derived from the value when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl ParameterSpec {
    pub fn new(name: &str, value: impl Into<ParamValue>, element_type: ElementType) -> Self {
        Self {
            name: name.to_owned(),
            value: value.into(),
            element_type,
            size: None,
        }
    }

    pub fn byte_size(&self) -> u64 {
        self.size
            .unwrap_or(self.value.components().len() as u64 * 4)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresetSpec {
    pub name: String,
    pub overrides: BTreeMap<String, ParamValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub presets: Vec<PresetSpec>,
    #[serde(default)]
    pub roles: ParameterRoles,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let parameters = vec![
            ParameterSpec::new(RESOLUTION_PARAM, RESOLUTION, ElementType::F32),
            ParameterSpec::new(TIME_PARAM, 0.0, ElementType::F32),
            ParameterSpec::new(COUNT_PARAM, NUM_AGENTS, ElementType::U32),
            ParameterSpec::new("alpha", ALPHA, ElementType::F32),
            ParameterSpec::new("beta", BETA, ElementType::F32),
            ParameterSpec::new("radius", RADIUS, ElementType::F32),
            ParameterSpec::new("velocity", VELOCITY, ElementType::F32),
        ];

        let overrides = [
            (COUNT_PARAM, NUM_AGENTS),
            ("alpha", ALPHA),
            ("beta", BETA),
            ("radius", RADIUS),
            ("velocity", VELOCITY),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_owned(), ParamValue::Scalar(value)))
        .collect();

        Self {
            parameters,
            presets: vec![PresetSpec {
                name: DEFAULT_PRESET.to_owned(),
                overrides,
            }],
            roles: ParameterRoles::default(),
        }
    }
}

impl SimulationConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: SimulationConfig = serde_json::from_str(&text)?;
        config.validate()?;
        log::info!(
            "loaded {} parameters and {} presets from {}",
            config.parameters.len(),
            config.presets.len(),
            path.as_ref().display()
        );
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Initial value of a role parameter, as an integer.
    fn role_value(&self, role: &str) -> Result<u64> {
        let spec = self
            .parameter(role)
            .ok_or_else(|| Error::Config(format!("role parameter `{}` is not declared", role)))?;
        match spec.value.as_scalar() {
            Some(value) if value >= 0.0 && value.is_finite() => Ok(value as u64),
            _ => Err(Error::Config(format!(
                "role parameter `{}` must be a non-negative scalar",
                role
            ))),
        }
    }

    pub fn initial_resolution(&self) -> Result<u32> {
        Ok(self.role_value(&self.roles.resolution)? as u32)
    }

    pub fn initial_agent_count(&self) -> Result<u32> {
        Ok(self.role_value(&self.roles.agent_count)? as u32)
    }

    /// Structural checks that do not need a device: unique names, role
    /// parameters present and scalar, presets whose overrides could all be
    /// applied, and a framebuffer small enough to dispatch in one dimension.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.parameters {
            if !seen.insert(spec.name.as_str()) {
                return Err(Error::Config(format!(
                    "parameter `{}` declared twice",
                    spec.name
                )));
            }
        }

        let resolution = self.role_value(&self.roles.resolution)?;
        self.role_value(&self.roles.time)?;
        self.role_value(&self.roles.agent_count)?;

        let pixel_workgroups = workgroups_for(resolution * resolution);
        if pixel_workgroups > MAX_WORKGROUPS_PER_DISPATCH {
            return Err(Error::Config(format!(
                "resolution {} needs {} workgroups, more than {} per dispatch",
                resolution, pixel_workgroups, MAX_WORKGROUPS_PER_DISPATCH
            )));
        }

        let mut preset_names = HashSet::new();
        for preset in &self.presets {
            if !preset_names.insert(preset.name.as_str()) {
                return Err(Error::Config(format!(
                    "preset `{}` declared twice",
                    preset.name
                )));
            }
            for (name, value) in &preset.overrides {
                let spec = self.parameter(name).ok_or_else(|| {
                    Error::Config(format!(
                        "preset `{}` overrides unknown parameter `{}`",
                        preset.name, name
                    ))
                })?;
                if *name == self.roles.resolution || *name == self.roles.time {
                    return Err(Error::Config(format!(
                        "preset `{}` overrides locked parameter `{}`",
                        preset.name, name
                    )));
                }
                check_declared(name, spec.element_type, &spec.value, value)
                    .map_err(|err| Error::Config(format!("preset `{}`: {}", preset.name, err)))?;
            }
        }
        Ok(())
    }
}
