use std::collections::BTreeMap;

use crate::config::PresetSpec;
use crate::error::{Error, Result};
use crate::gpu::Backend;
use crate::params::{ParamValue, ParameterRegistry};

/// A named bundle of parameter overrides.
#[derive(Clone, Debug, PartialEq)]
pub struct Preset {
    name: String,
    overrides: BTreeMap<String, ParamValue>,
}

impl Preset {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn overrides(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.overrides.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<&PresetSpec> for Preset {
    fn from(spec: &PresetSpec) -> Self {
        Self {
            name: spec.name.clone(),
            overrides: spec.overrides.clone(),
        }
    }
}

/// Presets in declaration order; immutable after construction.
#[derive(Clone, Debug, Default)]
pub struct PresetStore {
    presets: Vec<Preset>,
}

impl PresetStore {
    pub fn new(specs: &[PresetSpec]) -> Self {
        Self {
            presets: specs.iter().map(Preset::from).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Writes every override of `name` into the registry, then syncs once.
    ///
    /// All overrides are checked before the first write, so an unknown preset
    /// or a bad override leaves the registry untouched.
    pub fn apply<B: Backend>(
        &self,
        name: &str,
        registry: &mut ParameterRegistry<B>,
        backend: &B,
    ) -> Result<()> {
        let preset = self
            .get(name)
            .ok_or_else(|| Error::UnknownPreset(name.to_owned()))?;

        for (parameter, value) in preset.overrides() {
            registry.check(parameter, value)?;
        }
        for (parameter, value) in preset.overrides() {
            registry.set(parameter, value.clone())?;
        }
        registry.sync(backend);

        log::info!("applied preset {} ({} overrides)", name, preset.overrides.len());
        Ok(())
    }
}
