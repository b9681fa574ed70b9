use crate::config::SimulationConfig;
use crate::error::Result;
use crate::gpu::{Backend, ComputeProgram};
use crate::layout::ResourceLayout;
use crate::params::{ParamValue, ParameterRegistry};
use crate::present::Presenter;
use crate::presets::PresetStore;
use crate::scheduler::{
    DispatchSize, FrameRequester, FrameResources, FrameScheduler, SchedulerState,
};
use crate::stages::StageSet;

/// Owns the backend and everything built on it, and is the only entry point
/// for parameter changes coming from outside the frame loop.
pub struct Orchestrator<B: Backend> {
    backend: B,
    registry: ParameterRegistry<B>,
    layout: ResourceLayout<B>,
    stages: StageSet<B>,
    presets: PresetStore,
    scheduler: FrameScheduler,
}

impl<B: Backend> Orchestrator<B> {
    /// Registers and syncs the parameters, builds the resource layout from
    /// their initial values and compiles the stages. Nothing is dispatched
    /// until [`prime`](Orchestrator::prime).
    pub fn new(
        backend: B,
        config: &SimulationConfig,
        program: &dyn ComputeProgram,
    ) -> Result<Self> {
        config.validate()?;

        let mut registry = ParameterRegistry::from_config(&backend, config)?;
        let layout = ResourceLayout::build(
            &backend,
            &mut registry,
            config.initial_resolution()?,
            config.initial_agent_count()?,
        )?;
        let stages = StageSet::compile(&backend, &layout, program)?;

        Ok(Self {
            backend,
            registry,
            layout,
            stages,
            presets: PresetStore::new(&config.presets),
            scheduler: FrameScheduler::new(),
        })
    }

    pub fn prime(&mut self) -> Result<()> {
        let frame = FrameResources {
            backend: &self.backend,
            layout: &self.layout,
            stages: &self.stages,
        };
        self.scheduler.prime(&frame, &self.registry)
    }

    pub fn tick<P: Presenter<B>>(
        &mut self,
        presenter: &mut P,
        target: &P::Target,
        next: &dyn FrameRequester,
    ) -> Result<()> {
        let frame = FrameResources {
            backend: &self.backend,
            layout: &self.layout,
            stages: &self.stages,
        };
        self.scheduler
            .tick(&frame, &mut self.registry, presenter, target, next)
    }

    /// Sets one parameter and immediately syncs the whole registry.
    pub fn set(&mut self, name: &str, value: ParamValue) -> Result<()> {
        self.registry.set(name, value)?;
        self.registry.sync(&self.backend);
        Ok(())
    }

    pub fn apply_preset(&mut self, name: &str) -> Result<()> {
        self.presets.apply(name, &mut self.registry, &self.backend)
    }

    pub fn dispatch_size(&self) -> DispatchSize {
        DispatchSize::new(&self.layout, &self.registry)
    }

    /// Decodes a parameter's current GPU contents.
    pub fn readback(&self, name: &str) -> Result<ParamValue> {
        self.registry.readback(&self.backend, name)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &ParameterRegistry<B> {
        &self.registry
    }

    pub fn layout(&self) -> &ResourceLayout<B> {
        &self.layout
    }

    pub fn presets(&self) -> &PresetStore {
        &self.presets
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn frames(&self) -> u64 {
        self.scheduler.frames()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::gpu::recording::{Command, FrameCounter, RecordingBackend, RecordingPresenter};
    use crate::gpu::WgslProgram;
    use crate::stages::Stage;

    fn orchestrator(backend: RecordingBackend) -> Result<Orchestrator<RecordingBackend>> {
        Orchestrator::new(
            backend,
            &SimulationConfig::default(),
            &WgslProgram::new("test", ""),
        )
    }

    #[test]
    fn startup_scenario() {
        let orchestrator = orchestrator(RecordingBackend::new()).unwrap();
        assert_eq!(orchestrator.state(), SchedulerState::Uninitialized);
        assert_eq!(
            orchestrator.dispatch_size(),
            DispatchSize {
                pixel_workgroups: 1024,
                agent_workgroups: 40,
                agent_capacity_workgroups: 40,
            }
        );
        assert!(orchestrator.backend().submissions().is_empty());
        assert_eq!(orchestrator.readback("count").unwrap(), ParamValue::Scalar(10000.0));
    }

    #[test]
    fn startup_failures_are_fatal_and_leak_nothing() {
        let backend = RecordingBackend::new().failing_allocation("Agent headings");
        let live = backend.live_counter();
        let err = orchestrator(backend).err().unwrap();
        assert!(matches!(err, Error::Allocation { .. }));
        assert!(err.is_fatal());
        assert_eq!(live.get(), 0);

        let err = orchestrator(RecordingBackend::new().failing_entry_point("fade"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Compile { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn invalid_config_is_rejected_before_allocation() {
        let mut config = SimulationConfig::default();
        config.roles.agent_count = "agents".into();
        let result = Orchestrator::new(
            RecordingBackend::new(),
            &config,
            &WgslProgram::new("test", ""),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn external_set_syncs_and_resizes_dispatch() {
        let mut orchestrator = orchestrator(RecordingBackend::new()).unwrap();
        orchestrator.prime().unwrap();

        orchestrator.set("count", 50000u32.into()).unwrap();
        let size = orchestrator.dispatch_size();
        assert_eq!(size.agent_workgroups, 196);
        assert_eq!(size.agent_dispatch(), 40);
        assert_eq!(orchestrator.layout().agent_capacity(), 10000);
        assert_eq!(orchestrator.readback("count").unwrap(), ParamValue::Scalar(50000.0));

        let before = orchestrator.registry().snapshot();
        assert!(orchestrator.set("count", (-5.0).into()).is_err());
        assert_eq!(orchestrator.registry().snapshot(), before);
    }

    #[test]
    fn runs_frames_between_external_events() {
        let mut orchestrator = orchestrator(RecordingBackend::new()).unwrap();
        let mut presenter = RecordingPresenter::default();
        let counter = FrameCounter::default();
        orchestrator.prime().unwrap();

        orchestrator.tick(&mut presenter, &(), &counter).unwrap();
        orchestrator.set("radius", 8.0.into()).unwrap();
        orchestrator.apply_preset("default").unwrap();
        assert!(matches!(
            orchestrator.apply_preset("doesNotExist"),
            Err(Error::UnknownPreset(_))
        ));
        orchestrator.tick(&mut presenter, &(), &counter).unwrap();

        assert_eq!(orchestrator.frames(), 2);
        assert_eq!(orchestrator.state(), SchedulerState::Running);
        assert_eq!(orchestrator.readback("radius").unwrap(), ParamValue::Scalar(24.0));
        assert_eq!(orchestrator.readback("time").unwrap(), ParamValue::Scalar(2.0));

        let submissions = orchestrator.backend().submissions();
        assert_eq!(submissions.len(), 3);
        assert_eq!(
            submissions[0].1,
            vec![Command::Dispatch {
                stage: Stage::Reset,
                workgroups: 40
            }]
        );
        for (_, commands) in &submissions[1..] {
            assert_eq!(commands.len(), 3);
            assert!(matches!(commands[0], Command::Dispatch { stage: Stage::Fade, .. }));
            assert!(matches!(commands[1], Command::Dispatch { stage: Stage::Simulate, .. }));
            assert!(matches!(commands[2], Command::Present { .. }));
        }
    }

    #[test]
    fn full_sync_keeps_time_in_step() {
        let mut orchestrator = orchestrator(RecordingBackend::new()).unwrap();
        let mut presenter = RecordingPresenter::default();
        let counter = FrameCounter::default();
        orchestrator.prime().unwrap();
        for _ in 0..3 {
            orchestrator.tick(&mut presenter, &(), &counter).unwrap();
        }
        orchestrator.set("alpha", 1.0.into()).unwrap();
        assert_eq!(orchestrator.readback("time").unwrap(), ParamValue::Scalar(3.0));
    }
}
