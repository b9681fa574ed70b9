use winit::{
    event::{ElementState, KeyEvent, WindowEvent},
    keyboard::{Key, NamedKey},
    window::Window,
};

use crate::config::SimulationConfig;
use crate::constants::RESOLUTION;
use crate::controls::{ControlEvent, ControlInput, ControlPanel};
use crate::error::Result;
use crate::framework;
use crate::gpu::{WgpuBackend, WgslProgram};
use crate::orchestrator::Orchestrator;
use crate::present::SurfacePresenter;

pub struct Options {
    pub config: SimulationConfig,
    /// Applied right after the reset stage.
    pub preset: Option<String>,
    /// Close the window after this many frames.
    pub frames: Option<u64>,
}

/// Holds the orchestrator on a real device and wires window input to it
pub struct SlimeShader {
    orchestrator: Orchestrator<WgpuBackend>,
    presenter: SurfacePresenter,
    controls: ControlPanel,
    frame_limit: Option<u64>,
}

fn control_input(key: &Key) -> Option<ControlInput> {
    match key {
        Key::Named(NamedKey::Tab) => Some(ControlInput::NextSlider),
        Key::Named(NamedKey::ArrowUp | NamedKey::ArrowRight) => Some(ControlInput::Increase),
        Key::Named(NamedKey::ArrowDown | NamedKey::ArrowLeft) => Some(ControlInput::Decrease),
        Key::Character(c) if c.eq_ignore_ascii_case("p") => Some(ControlInput::NextPreset),
        _ => None,
    }
}

impl framework::Shader for SlimeShader {
    type Options = Options;

    fn preferred_size(options: &Options) -> u32 {
        options
            .config
            .initial_resolution()
            .unwrap_or(RESOLUTION as u32)
    }

    /// builds every GPU resource and runs the reset stage once
    fn init(
        config: &wgpu::SurfaceConfiguration,
        _adapter: &wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        options: Options,
    ) -> anyhow::Result<Self> {
        let backend = WgpuBackend::new(device, queue);
        let mut orchestrator =
            Orchestrator::new(backend, &options.config, &WgslProgram::bundled())?;
        orchestrator.prime()?;
        if let Some(preset) = &options.preset {
            orchestrator.apply_preset(preset)?;
            log::info!("applied preset `{}`", preset);
        }

        let presenter = SurfacePresenter::new(orchestrator.backend().device(), config.format);
        let controls = ControlPanel::new(orchestrator.presets().names());

        Ok(SlimeShader {
            orchestrator,
            presenter,
            controls,
            frame_limit: options.frames,
        })
    }

    fn device(&self) -> &wgpu::Device {
        self.orchestrator.backend().device()
    }

    /// maps key presses onto the control panel
    fn update(&mut self, event: &WindowEvent) {
        let input = match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => control_input(logical_key),
            _ => None,
        };
        let Some(input) = input else {
            return;
        };

        let result = match self.controls.handle(input, self.orchestrator.registry()) {
            Some(ControlEvent::Set { name, value }) => {
                log::debug!("{} = {:?}", name, value);
                self.orchestrator.set(&name, value)
            }
            Some(ControlEvent::ApplyPreset(name)) => {
                log::info!("switching to preset `{}`", name);
                self.orchestrator.apply_preset(&name)
            }
            None => Ok(()),
        };
        if let Err(err) = result {
            log::warn!("{}", err);
        }
    }

    /// the framebuffer is drawn stretched, so nothing depends on the surface size
    fn resize(&mut self, config: &wgpu::SurfaceConfiguration) {
        log::debug!("surface resized to {}x{}", config.width, config.height);
    }

    fn render(&mut self, view: &wgpu::TextureView, window: &Window) -> Result<()> {
        self.orchestrator.tick(&mut self.presenter, view, window)
    }

    fn finished(&self) -> bool {
        self.frame_limit
            .is_some_and(|limit| self.orchestrator.frames() >= limit)
    }

    fn exit(&mut self) {
        let time_param = &self.orchestrator.registry().roles().time;
        match self.orchestrator.readback(time_param) {
            Ok(time) => log::info!(
                "stopped after {} frames, GPU time reads {:?}",
                self.orchestrator.frames(),
                time
            ),
            Err(err) => log::warn!("stopped after {} frames: {}", self.orchestrator.frames(), err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::keyboard::SmolStr;

    #[test]
    fn maps_keys_to_controls() {
        let cases = [
            (Key::Named(NamedKey::Tab), Some(ControlInput::NextSlider)),
            (Key::Named(NamedKey::ArrowLeft), Some(ControlInput::Decrease)),
            (Key::Character(SmolStr::new("P")), Some(ControlInput::NextPreset)),
            (Key::Character(SmolStr::new("q")), None),
        ];
        for (key, expected) in cases {
            assert_eq!(control_input(&key), expected, "{:?}", key);
        }
    }
}
