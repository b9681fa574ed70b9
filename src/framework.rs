use std::sync::Arc;

use anyhow::Context;
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Window, WindowBuilder},
};

use crate::constants::WINDOW_FILL;
use crate::error::Result;
use crate::scheduler::FrameRequester;

/// A window-driven program: built once the surface exists, rendered on every
/// redraw it asks for.
pub trait Shader: 'static + Sized {
    type Options;

    /// Side of the square the program would like to draw into.
    fn preferred_size(options: &Self::Options) -> u32;

    fn init(
        config: &wgpu::SurfaceConfiguration,
        adapter: &wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        options: Self::Options,
    ) -> anyhow::Result<Self>;

    /// The device handed to `init`; the surface is configured against it.
    fn device(&self) -> &wgpu::Device;

    /// update is called for any WindowEvent not handled by the framework
    fn update(&mut self, event: &WindowEvent);

    /// resize is called on WindowEvent::Resized events
    fn resize(&mut self, config: &wgpu::SurfaceConfiguration);

    /// render is called on every redraw request
    fn render(&mut self, view: &wgpu::TextureView, window: &Window) -> Result<()>;

    /// Stops the loop once true.
    fn finished(&self) -> bool {
        false
    }

    /// Called once as the loop shuts down.
    fn exit(&mut self) {}
}

impl FrameRequester for Window {
    fn request_frame(&self) {
        self.request_redraw();
    }
}

/// Square window side that fills most of the smaller monitor dimension.
pub fn window_side(monitor: Option<PhysicalSize<u32>>, resolution: u32) -> u32 {
    match monitor {
        Some(size) => ((WINDOW_FILL * size.width.min(size.height) as f64).round() as u32).max(1),
        None => resolution.max(1),
    }
}

struct Setup {
    window: Arc<Window>,
    event_loop: EventLoop<()>,
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

async fn setup(title: &str, preferred_size: u32) -> anyhow::Result<Setup> {
    let event_loop = EventLoop::new()?;
    let monitor = event_loop.primary_monitor().map(|monitor| monitor.size());
    let side = window_side(monitor, preferred_size);
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(side, side))
            .build(&event_loop)?,
    );

    log::info!("Initializing the surface...");

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = instance.create_surface(Arc::clone(&window))?;
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: Some(&surface),
        })
        .await
        .context("no suitable GPU adapters found on the system")?;

    let adapter_info = adapter.get_info();
    log::info!("Using {} ({:?})", adapter_info.name, adapter_info.backend);

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Simulation device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        )
        .await
        .context("unable to find a suitable GPU device")?;

    Ok(Setup {
        window,
        event_loop,
        instance,
        surface,
        adapter,
        device,
        queue,
    })
}

fn start<E: Shader>(
    Setup {
        window,
        event_loop,
        instance,
        surface,
        adapter,
        device,
        queue,
    }: Setup,
    options: E::Options,
) -> anyhow::Result<()> {
    let size = window.inner_size();
    let mut config = surface
        .get_default_config(&adapter, size.width.max(1), size.height.max(1))
        .context("surface is not supported by the adapter")?;
    surface.configure(&device, &config);

    log::info!("Initializing the simulation...");
    let mut shader = E::init(&config, &adapter, device, queue, options)?;
    // the instance must outlive the surface
    let _instance = instance;

    window.request_redraw();
    log::info!("Entering render loop...");
    event_loop.run(move |event, target| {
        target.set_control_flow(ControlFlow::Wait);
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::Resized(size) => {
                    config.width = size.width.max(1);
                    config.height = size.height.max(1);
                    surface.configure(shader.device(), &config);
                    shader.resize(&config);
                    window.request_redraw();
                }
                WindowEvent::CloseRequested
                | WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            logical_key: Key::Named(NamedKey::Escape),
                            state: ElementState::Pressed,
                            ..
                        },
                    ..
                } => target.exit(),
                WindowEvent::RedrawRequested => {
                    let frame = match surface.get_current_texture() {
                        Ok(frame) => frame,
                        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                            surface.configure(shader.device(), &config);
                            window.request_redraw();
                            return;
                        }
                        Err(wgpu::SurfaceError::Timeout) => {
                            log::warn!("surface timed out, skipping frame");
                            window.request_redraw();
                            return;
                        }
                        Err(err) => {
                            log::error!("failed to acquire next surface texture: {}", err);
                            target.exit();
                            return;
                        }
                    };
                    let view = frame
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default());

                    if let Err(err) = shader.render(&view, &window) {
                        if err.is_fatal() {
                            log::error!("{}", err);
                            target.exit();
                            return;
                        }
                        log::warn!("{}", err);
                    }
                    frame.present();

                    if shader.finished() {
                        target.exit();
                    }
                }
                other => shader.update(&other),
            },
            Event::LoopExiting => shader.exit(),
            _ => {}
        }
    })?;
    Ok(())
}

pub fn run<E: Shader>(title: &str, options: E::Options) -> anyhow::Result<()> {
    let setup = pollster::block_on(setup(title, E::preferred_size(&options)))?;
    start::<E>(setup, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_fills_smaller_monitor_side() {
        assert_eq!(window_side(Some(PhysicalSize::new(1920, 1080)), 512), 1026);
        assert_eq!(window_side(Some(PhysicalSize::new(800, 1200)), 512), 760);
    }

    #[test]
    fn window_falls_back_to_resolution() {
        assert_eq!(window_side(None, 512), 512);
        assert_eq!(window_side(Some(PhysicalSize::new(0, 0)), 512), 1);
    }
}
