//! The frame loop as a state machine.
//!
//! `prime` runs the reset stage once; every `tick` after that encodes fade
//! then simulate, hands the framebuffer to the presenter, submits, advances
//! time and asks the environment for the next frame. Nothing here waits on
//! the GPU: the queue executes submissions in order and that is all the
//! stages rely on.

use crate::error::{Error, Result};
use crate::gpu::{Backend, Dispatch};
use crate::layout::ResourceLayout;
use crate::params::ParameterRegistry;
use crate::present::Presenter;
use crate::stages::{Stage, StageSet};

/// Whatever can schedule another call to `tick` (a window's redraw request,
/// an animation-frame callback, a test counter).
pub trait FrameRequester {
    fn request_frame(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Uninitialized,
    Primed,
    Running,
}

/// Workgroup counts for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchSize {
    /// Covers every framebuffer cell; fixed for the process lifetime.
    pub pixel_workgroups: u32,
    /// `ceil(count / WORKGROUP_SIZE)` from the live count at the last sync.
    pub agent_workgroups: u32,
    /// Covers the agents the buffers were allocated for.
    pub agent_capacity_workgroups: u32,
}

impl DispatchSize {
    pub fn new<B: Backend>(layout: &ResourceLayout<B>, registry: &ParameterRegistry<B>) -> Self {
        Self {
            pixel_workgroups: layout.pixel_workgroups(),
            agent_workgroups: registry.agent_workgroups(),
            agent_capacity_workgroups: layout.agent_capacity_workgroups(),
        }
    }

    /// Agent workgroups actually dispatched: the live count, clamped to the
    /// allocated capacity.
    pub fn agent_dispatch(&self) -> u32 {
        self.agent_workgroups.min(self.agent_capacity_workgroups)
    }

    pub fn is_clamped(&self) -> bool {
        self.agent_workgroups > self.agent_capacity_workgroups
    }
}

/// Borrowed view of the immutable pieces a frame is encoded against.
pub struct FrameResources<'a, B: Backend> {
    pub backend: &'a B,
    pub layout: &'a ResourceLayout<B>,
    pub stages: &'a StageSet<B>,
}

pub struct FrameScheduler {
    state: SchedulerState,
    frames: u64,
    clamp_warned: Option<u32>,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Uninitialized,
            frames: 0,
            clamp_warned: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Frames submitted so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn warn_if_clamped(&mut self, size: &DispatchSize) {
        if !size.is_clamped() {
            self.clamp_warned = None;
            return;
        }
        if self.clamp_warned != Some(size.agent_workgroups) {
            log::warn!(
                "agent count needs {} workgroups but only {} fit the agent buffers; clamping",
                size.agent_workgroups,
                size.agent_capacity_workgroups
            );
            self.clamp_warned = Some(size.agent_workgroups);
        }
    }

    /// Dispatches the reset stage once. A second call is rejected with
    /// [`Error::AlreadyPrimed`] and submits nothing.
    pub fn prime<B: Backend>(
        &mut self,
        frame: &FrameResources<'_, B>,
        registry: &ParameterRegistry<B>,
    ) -> Result<()> {
        if self.state != SchedulerState::Uninitialized {
            return Err(Error::AlreadyPrimed);
        }

        let size = DispatchSize::new(frame.layout, registry);
        self.warn_if_clamped(&size);

        let backend = frame.backend;
        let mut commands = backend.begin_commands("Reset encoder");
        backend.encode_compute(
            &mut commands,
            "reset agents",
            frame.layout.bind_groups(),
            &[Dispatch {
                stage: Stage::Reset,
                pipeline: frame.stages.pipeline(Stage::Reset),
                workgroups: size.agent_dispatch(),
            }],
        );
        backend.submit(commands)?;

        self.state = SchedulerState::Primed;
        log::info!("primed {} agent workgroups", size.agent_dispatch());
        Ok(())
    }

    /// Encodes and submits one frame, then advances time and requests the
    /// next frame from `next`.
    pub fn tick<B: Backend, P: Presenter<B>>(
        &mut self,
        frame: &FrameResources<'_, B>,
        registry: &mut ParameterRegistry<B>,
        presenter: &mut P,
        target: &P::Target,
        next: &dyn FrameRequester,
    ) -> Result<()> {
        if self.state == SchedulerState::Uninitialized {
            return Err(Error::NotPrimed);
        }

        let size = DispatchSize::new(frame.layout, registry);
        self.warn_if_clamped(&size);

        let backend = frame.backend;
        let mut commands = backend.begin_commands("Frame encoder");
        backend.encode_compute(
            &mut commands,
            "fade and simulate",
            frame.layout.bind_groups(),
            &[
                Dispatch {
                    stage: Stage::Fade,
                    pipeline: frame.stages.pipeline(Stage::Fade),
                    workgroups: size.pixel_workgroups,
                },
                Dispatch {
                    stage: Stage::Simulate,
                    pipeline: frame.stages.pipeline(Stage::Simulate),
                    workgroups: size.agent_dispatch(),
                },
            ],
        );

        presenter.present(
            backend,
            frame.layout.resolution(),
            frame.layout.framebuffer(),
            target,
            &mut commands,
        );

        backend.submit(commands)?;

        // read by the next frame's submission
        let time = registry.advance_time(backend);

        self.state = SchedulerState::Running;
        self.frames += 1;
        log::trace!("frame {} submitted, time now {}", self.frames, time);

        next.request_frame();
        Ok(())
    }
}
