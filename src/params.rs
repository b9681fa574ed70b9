//! Named, typed simulation parameters and their GPU mirrors.
//!
//! The registry is the only writer of parameter values. `set` changes the
//! host copy, `sync` pushes every host copy to its uniform buffer, and the
//! time parameter gets its own single-buffer write from the frame loop.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{ParameterRoles, SimulationConfig};
use crate::constants::{workgroups_for, TIME_WRAP};
use crate::error::{Error, Result};
use crate::gpu::{Backend, BufferSpec, BufferUsage};

/// Bytes per component; every supported element type is 32 bits wide.
const COMPONENT_BYTES: u64 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    F32,
    U32,
    I32,
}

impl ElementType {
    /// Whether `value` survives encoding as this type.
    fn represents(self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            ElementType::F32 => value.abs() <= f32::MAX as f64,
            ElementType::U32 => value.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&value),
            ElementType::I32 => {
                value.fract() == 0.0 && (i32::MIN as f64..=i32::MAX as f64).contains(&value)
            }
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ElementType::F32 => "f32",
            ElementType::U32 => "u32",
            ElementType::I32 => "i32",
        })
    }
}

/// Host-side value of a parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl ParamValue {
    pub fn components(&self) -> &[f64] {
        match self {
            ParamValue::Scalar(value) => std::slice::from_ref(value),
            ParamValue::Vector(values) => values,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            ParamValue::Scalar(value) => Some(*value),
            ParamValue::Vector(_) => None,
        }
    }

    fn shape(&self) -> Shape {
        match self {
            ParamValue::Scalar(_) => Shape::Scalar,
            ParamValue::Vector(values) => Shape::Vector(values.len()),
        }
    }

    /// Little-endian bytes of every component in `element_type`.
    pub fn encode(&self, element_type: ElementType) -> Vec<u8> {
        let components = self.components();
        match element_type {
            ElementType::F32 => {
                let words: Vec<f32> = components.iter().map(|v| *v as f32).collect();
                bytemuck::cast_slice(&words).to_vec()
            }
            ElementType::U32 => {
                let words: Vec<u32> = components.iter().map(|v| *v as u32).collect();
                bytemuck::cast_slice(&words).to_vec()
            }
            ElementType::I32 => {
                let words: Vec<i32> = components.iter().map(|v| *v as i32).collect();
                bytemuck::cast_slice(&words).to_vec()
            }
        }
    }

    /// The value as it reads back after a round trip through
    /// `element_type`; f32 components lose their extra f64 precision.
    pub fn quantized(&self, element_type: ElementType) -> ParamValue {
        let round = |v: f64| match element_type {
            ElementType::F32 => v as f32 as f64,
            ElementType::U32 | ElementType::I32 => v,
        };
        match self {
            ParamValue::Scalar(value) => ParamValue::Scalar(round(*value)),
            ParamValue::Vector(values) => {
                ParamValue::Vector(values.iter().map(|v| round(*v)).collect())
            }
        }
    }

    /// Inverse of [`ParamValue::encode`]; a single word decodes to a scalar
    /// unless `vector` is set.
    pub fn decode(bytes: &[u8], element_type: ElementType, vector: bool) -> ParamValue {
        let components: Vec<f64> = bytes
            .chunks_exact(COMPONENT_BYTES as usize)
            .map(|word| match element_type {
                ElementType::F32 => bytemuck::pod_read_unaligned::<f32>(word) as f64,
                ElementType::U32 => bytemuck::pod_read_unaligned::<u32>(word) as f64,
                ElementType::I32 => bytemuck::pod_read_unaligned::<i32>(word) as f64,
            })
            .collect();
        match (vector, components.as_slice()) {
            (false, [value]) => ParamValue::Scalar(*value),
            _ => ParamValue::Vector(components),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Scalar(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Scalar(value as f64)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Scalar(value as f64)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(values: Vec<f64>) -> Self {
        ParamValue::Vector(values)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shape {
    Scalar,
    Vector(usize),
}

impl Shape {
    fn components(self) -> usize {
        match self {
            Shape::Scalar => 1,
            Shape::Vector(n) => n,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => f.write_str("a scalar"),
            Shape::Vector(n) => write!(f, "{} components", n),
        }
    }
}

pub struct Parameter<B: Backend> {
    name: String,
    value: ParamValue,
    element_type: ElementType,
    shape: Shape,
    byte_size: u64,
    buffer: B::Buffer,
}

impl<B: Backend> Parameter<B> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ParamValue {
        &self.value
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn buffer(&self) -> &B::Buffer {
        &self.buffer
    }

    pub fn encoded(&self) -> Vec<u8> {
        self.value.encode(self.element_type)
    }

    fn check(&self, value: &ParamValue) -> Result<()> {
        check_value(&self.name, self.element_type, self.shape, value)
    }
}

fn check_value(
    name: &str,
    element_type: ElementType,
    shape: Shape,
    value: &ParamValue,
) -> Result<()> {
    if value.shape() != shape {
        return Err(Error::mismatch(
            name,
            element_type,
            shape.components(),
            value.shape(),
        ));
    }
    if let Some(bad) = value
        .components()
        .iter()
        .find(|v| !element_type.represents(**v))
    {
        return Err(Error::mismatch(name, element_type, shape.components(), bad));
    }
    Ok(())
}

/// Checks `value` against a parameter declared with `declared` as its initial
/// value, before any registry exists.
pub(crate) fn check_declared(
    name: &str,
    element_type: ElementType,
    declared: &ParamValue,
    value: &ParamValue,
) -> Result<()> {
    check_value(name, element_type, declared.shape(), value)
}

fn step_time(time: f64) -> f64 {
    let next = time + 1.0;
    if next >= TIME_WRAP {
        0.0
    } else {
        next
    }
}

pub struct ParameterRegistry<B: Backend> {
    parameters: Vec<Parameter<B>>,
    by_name: HashMap<String, usize>,
    roles: ParameterRoles,
    agent_workgroups: u32,
    sealed: bool,
}

impl<B: Backend> ParameterRegistry<B> {
    pub fn new(roles: ParameterRoles) -> Self {
        Self {
            parameters: Vec::new(),
            by_name: HashMap::new(),
            roles,
            agent_workgroups: 0,
            sealed: false,
        }
    }

    /// Registers every parameter of `config` in order and pushes the initial
    /// values to the GPU.
    pub fn from_config(backend: &B, config: &SimulationConfig) -> Result<Self> {
        let mut registry = Self::new(config.roles.clone());
        for spec in &config.parameters {
            registry.register(
                backend,
                &spec.name,
                spec.value.clone(),
                spec.element_type,
                spec.byte_size(),
            )?;
        }
        registry.sync(backend);
        Ok(registry)
    }

    /// Allocates the uniform buffer for a new parameter and returns its
    /// binding index inside the parameter group.
    pub fn register(
        &mut self,
        backend: &B,
        name: &str,
        initial: ParamValue,
        element_type: ElementType,
        byte_size: u64,
    ) -> Result<u32> {
        if self.sealed {
            return Err(Error::RegistrySealed(name.to_owned()));
        }
        if self.by_name.contains_key(name) {
            return Err(Error::DuplicateParameter(name.to_owned()));
        }

        let shape = initial.shape();
        if shape.components() as u64 * COMPONENT_BYTES != byte_size {
            return Err(Error::mismatch(
                name,
                element_type,
                (byte_size / COMPONENT_BYTES) as usize,
                shape,
            ));
        }
        check_value(name, element_type, shape, &initial)?;

        let buffer = backend.create_buffer(&BufferSpec {
            label: name,
            size: byte_size,
            usage: BufferUsage::Uniform,
        })?;

        let binding = self.parameters.len() as u32;
        self.by_name.insert(name.to_owned(), self.parameters.len());
        self.parameters.push(Parameter {
            name: name.to_owned(),
            value: initial.quantized(element_type),
            element_type,
            shape,
            byte_size,
            buffer,
        });
        log::debug!(
            "registered {} ({}, {} bytes) at binding {}",
            name,
            element_type,
            byte_size,
            binding
        );
        Ok(binding)
    }

    /// Stops further registration; the parameter bind group now exists.
    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn roles(&self) -> &ParameterRoles {
        &self.roles
    }

    pub fn is_locked(&self, name: &str) -> bool {
        name == self.roles.time || name == self.roles.resolution
    }

    fn lookup(&self, name: &str) -> Result<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownParameter(name.to_owned()))
    }

    /// Validates an external write without performing it.
    pub fn check(&self, name: &str, value: &ParamValue) -> Result<()> {
        let index = self.lookup(name)?;
        if self.is_locked(name) {
            return Err(Error::LockedParameter(name.to_owned()));
        }
        self.parameters[index].check(value)
    }

    /// Host-side write. The GPU copy is stale until the next [`sync`].
    ///
    /// [`sync`]: ParameterRegistry::sync
    pub fn set(&mut self, name: &str, value: ParamValue) -> Result<()> {
        self.check(name, &value)?;
        let parameter = &mut self.parameters[self.by_name[name]];
        parameter.value = value.quantized(parameter.element_type);
        Ok(())
    }

    /// Writes every parameter to its buffer and refreshes the agent dispatch
    /// size from the live count.
    pub fn sync(&mut self, backend: &B) {
        for parameter in &self.parameters {
            backend.write_buffer(&parameter.buffer, &parameter.encoded());
        }
        self.agent_workgroups = workgroups_for(self.agent_count() as u64);
        log::debug!(
            "synced {} parameters, {} agent workgroups",
            self.parameters.len(),
            self.agent_workgroups
        );
    }

    /// Steps the time parameter by one (wrapping at 2^24) and writes only its
    /// buffer. Returns the new time.
    pub fn advance_time(&mut self, backend: &B) -> f64 {
        let Some(&index) = self.by_name.get(&self.roles.time) else {
            return 0.0;
        };
        let parameter = &mut self.parameters[index];
        let time = step_time(parameter.value.as_scalar().unwrap_or(0.0));
        parameter.value = ParamValue::Scalar(time);
        backend.write_buffer(&parameter.buffer, &parameter.encoded());
        time
    }

    fn scalar(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|p| p.value.as_scalar())
    }

    /// Current host value of the agent count, 0 if it is not registered.
    pub fn agent_count(&self) -> u32 {
        self.scalar(&self.roles.agent_count).unwrap_or(0.0) as u32
    }

    pub fn resolution(&self) -> u32 {
        self.scalar(&self.roles.resolution).unwrap_or(0.0) as u32
    }

    pub fn time(&self) -> f64 {
        self.scalar(&self.roles.time).unwrap_or(0.0)
    }

    /// `ceil(count / WORKGROUP_SIZE)` as of the last [`sync`].
    ///
    /// [`sync`]: ParameterRegistry::sync
    pub fn agent_workgroups(&self) -> u32 {
        self.agent_workgroups
    }

    pub fn get(&self, name: &str) -> Option<&Parameter<B>> {
        self.by_name.get(name).map(|&index| &self.parameters[index])
    }

    pub fn value(&self, name: &str) -> Option<&ParamValue> {
        self.get(name).map(Parameter::value)
    }

    /// Parameters in registration (binding) order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter<B>> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Encoded bytes of every parameter, in binding order.
    pub fn snapshot(&self) -> Vec<(String, Vec<u8>)> {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.encoded()))
            .collect()
    }

    /// Reads a parameter's buffer back and decodes it under its declared type.
    pub fn readback(&self, backend: &B, name: &str) -> Result<ParamValue> {
        let parameter = &self.parameters[self.lookup(name)?];
        let bytes = backend.read_buffer(&parameter.buffer)?;
        let vector = matches!(parameter.shape, Shape::Vector(_));
        Ok(ParamValue::decode(&bytes, parameter.element_type, vector))
    }
}
