use std::fmt;

use crate::error::Result;
use crate::gpu::{Backend, ComputeProgram};
use crate::layout::ResourceLayout;

/// The three compute entry points the pipeline runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Reset,
    Simulate,
    Fade,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Reset => "reset",
            Stage::Simulate => "simulate",
            Stage::Fade => "fade",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compiled pipelines for every stage, all against the layout's shared
/// pipeline layout. Built once and reused by every frame.
pub struct StageSet<B: Backend> {
    reset: B::Pipeline,
    simulate: B::Pipeline,
    fade: B::Pipeline,
}

impl<B: Backend> StageSet<B> {
    pub fn compile(
        backend: &B,
        layout: &ResourceLayout<B>,
        program: &dyn ComputeProgram,
    ) -> Result<Self> {
        let module = backend.create_module(program)?;

        let setup = |stage: Stage| -> Result<B::Pipeline> {
            let entry_point = program.entry_point(stage);
            let pipeline = backend.create_pipeline(layout.shared(), &module, stage, entry_point)?;
            log::debug!("compiled {} from {}::{}", stage, program.label(), entry_point);
            Ok(pipeline)
        };

        let stages = StageSet {
            reset: setup(Stage::Reset)?,
            simulate: setup(Stage::Simulate)?,
            fade: setup(Stage::Fade)?,
        };
        log::info!("compute stages ready from {}", program.label());
        Ok(stages)
    }

    pub fn pipeline(&self, stage: Stage) -> &B::Pipeline {
        match stage {
            Stage::Reset => &self.reset,
            Stage::Simulate => &self.simulate,
            Stage::Fade => &self.fade,
        }
    }
}
