//! Keyboard stand-in for the slider panel: one slider is selected at a time,
//! arrow keys step it and another key cycles through the presets.

use std::f64::consts::PI;

use crate::gpu::Backend;
use crate::params::{ParamValue, ParameterRegistry};

#[derive(Clone, Debug, PartialEq)]
pub struct Slider {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    /// Only whole values are produced.
    pub integral: bool,
}

impl Slider {
    const fn new(name: &'static str, min: f64, max: f64, step: f64) -> Self {
        Self {
            name,
            min,
            max,
            step,
            integral: false,
        }
    }

    fn nudge(&self, current: f64, direction: f64) -> f64 {
        let next = (current + direction * self.step).clamp(self.min, self.max);
        if self.integral {
            next.round()
        } else {
            next
        }
    }
}

pub fn default_sliders() -> Vec<Slider> {
    vec![
        Slider::new("alpha", 0.0, PI, PI / 128.0),
        Slider::new("beta", -PI / 6.0, PI / 6.0, PI / 128.0),
        Slider::new("radius", 0.0, 64.0, 1.0),
        Slider {
            integral: true,
            ..Slider::new("count", 0.0, 40000.0, 1000.0)
        },
        Slider::new("velocity", 0.0, 2.0, 0.05),
    ]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlInput {
    NextSlider,
    Increase,
    Decrease,
    NextPreset,
}

/// What the panel wants done; the caller routes it to the orchestrator.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlEvent {
    Set { name: String, value: ParamValue },
    ApplyPreset(String),
}

pub struct ControlPanel {
    sliders: Vec<Slider>,
    selected: usize,
    presets: Vec<String>,
    preset: usize,
}

impl ControlPanel {
    pub fn new<'a>(presets: impl IntoIterator<Item = &'a str>) -> Self {
        Self::with_sliders(default_sliders(), presets)
    }

    pub fn with_sliders<'a>(
        sliders: Vec<Slider>,
        presets: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            sliders,
            selected: 0,
            presets: presets.into_iter().map(str::to_owned).collect(),
            preset: 0,
        }
    }

    pub fn selected(&self) -> Option<&Slider> {
        self.sliders.get(self.selected)
    }

    pub fn handle<B: Backend>(
        &mut self,
        input: ControlInput,
        registry: &ParameterRegistry<B>,
    ) -> Option<ControlEvent> {
        match input {
            ControlInput::NextSlider => {
                if !self.sliders.is_empty() {
                    self.selected = (self.selected + 1) % self.sliders.len();
                }
                if let Some(slider) = self.selected() {
                    log::info!("selected slider `{}`", slider.name);
                }
                None
            }
            ControlInput::Increase => self.step(1.0, registry),
            ControlInput::Decrease => self.step(-1.0, registry),
            ControlInput::NextPreset => {
                if self.presets.is_empty() {
                    return None;
                }
                self.preset = (self.preset + 1) % self.presets.len();
                Some(ControlEvent::ApplyPreset(self.presets[self.preset].clone()))
            }
        }
    }

    fn step<B: Backend>(
        &self,
        direction: f64,
        registry: &ParameterRegistry<B>,
    ) -> Option<ControlEvent> {
        let slider = self.selected()?;
        // sliders only drive scalar parameters that exist in this config
        let parameter = registry.get(slider.name)?;
        let current = parameter.value().as_scalar()?;
        let value = ParamValue::Scalar(slider.nudge(current, direction))
            .quantized(parameter.element_type());
        if value == *parameter.value() {
            return None;
        }
        Some(ControlEvent::Set {
            name: slider.name.to_owned(),
            value,
        })
    }
}
