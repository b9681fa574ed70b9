//! Host-memory [`Backend`] that records everything asked of it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::present::Presenter;
use crate::scheduler::FrameRequester;
use crate::stages::Stage;

use super::{Backend, BindingGroup, BufferSpec, ComputeProgram, Dispatch};

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Dispatch { stage: Stage, workgroups: u32 },
    Present { resolution: u32, framebuffer: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    CreateBuffer { label: String, size: u64 },
    Write { label: String, bytes: Vec<u8> },
    CreateBindGroup { group: BindingGroup, buffers: Vec<String> },
    CreatePipeline { stage: Stage, entry_point: String },
    Submit { label: String, commands: Vec<Command> },
}

pub struct RecordedBuffer {
    label: String,
    size: u64,
    data: RefCell<Vec<u8>>,
    live: Rc<Cell<usize>>,
}

impl Drop for RecordedBuffer {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

pub struct RecordedLayout {
    pub parameter_sizes: Vec<u64>,
}

pub struct RecordedBindGroup {
    pub group: BindingGroup,
}

pub struct RecordedModule;

pub struct RecordedPipeline {
    pub stage: Stage,
    pub entry_point: String,
}

pub struct RecordedCommands {
    label: String,
    commands: Vec<Command>,
}

impl RecordedCommands {
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }
}

#[derive(Default)]
pub struct RecordingBackend {
    events: RefCell<Vec<Event>>,
    live: Rc<Cell<usize>>,
    modules: Cell<usize>,
    layout_sizes: RefCell<Vec<u64>>,
    fail_allocation: Option<String>,
    fail_entry_point: Option<String>,
    fail_module: bool,
    fail_submit: Cell<bool>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer or bind group creation with this label fails.
    pub fn failing_allocation(mut self, label: &str) -> Self {
        self.fail_allocation = Some(label.to_owned());
        self
    }

    /// Pipeline creation for this entry point fails.
    pub fn failing_entry_point(mut self, entry_point: &str) -> Self {
        self.fail_entry_point = Some(entry_point.to_owned());
        self
    }

    /// Every shader module fails to compile.
    pub fn failing_module(mut self) -> Self {
        self.fail_module = true;
        self
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submit.set(fail);
    }

    fn record(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn writes(&self) -> Vec<(String, Vec<u8>)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Write { label, bytes } => Some((label, bytes)),
                _ => None,
            })
            .collect()
    }

    pub fn submissions(&self) -> Vec<(String, Vec<Command>)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Submit { label, commands } => Some((label, commands)),
                _ => None,
            })
            .collect()
    }

    pub fn contents(&self, buffer: &RecordedBuffer) -> Vec<u8> {
        buffer.data.borrow().clone()
    }

    pub fn size_of(&self, buffer: &RecordedBuffer) -> u64 {
        buffer.size
    }

    pub fn live_buffers(&self) -> usize {
        self.live.get()
    }

    /// Live buffer count that outlives the backend itself.
    pub fn live_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.live)
    }

    pub fn modules_created(&self) -> usize {
        self.modules.get()
    }

    pub fn layout_parameter_sizes(&self) -> Vec<u64> {
        self.layout_sizes.borrow().clone()
    }

    fn fails(&self, label: &str) -> bool {
        self.fail_allocation.as_deref() == Some(label)
    }
}

impl Backend for RecordingBackend {
    type Buffer = RecordedBuffer;
    type Layout = RecordedLayout;
    type BindGroup = RecordedBindGroup;
    type Module = RecordedModule;
    type Pipeline = RecordedPipeline;
    type Commands = RecordedCommands;

    fn create_buffer(&self, spec: &BufferSpec<'_>) -> Result<RecordedBuffer> {
        if self.fails(spec.label) {
            return Err(Error::allocation(spec.label, "injected failure"));
        }
        self.record(Event::CreateBuffer {
            label: spec.label.to_owned(),
            size: spec.size,
        });
        self.live.set(self.live.get() + 1);
        Ok(RecordedBuffer {
            label: spec.label.to_owned(),
            size: spec.size,
            data: RefCell::new(vec![0; spec.size as usize]),
            live: Rc::clone(&self.live),
        })
    }

    fn write_buffer(&self, buffer: &RecordedBuffer, bytes: &[u8]) {
        assert!(
            bytes.len() as u64 <= buffer.size,
            "write of {} bytes overruns `{}`",
            bytes.len(),
            buffer.label
        );
        buffer.data.borrow_mut()[..bytes.len()].copy_from_slice(bytes);
        self.record(Event::Write {
            label: buffer.label.clone(),
            bytes: bytes.to_vec(),
        });
    }

    fn read_buffer(&self, buffer: &RecordedBuffer) -> Result<Vec<u8>> {
        Ok(self.contents(buffer))
    }

    fn create_layout(&self, parameter_sizes: &[u64]) -> Result<RecordedLayout> {
        *self.layout_sizes.borrow_mut() = parameter_sizes.to_vec();
        Ok(RecordedLayout {
            parameter_sizes: parameter_sizes.to_vec(),
        })
    }

    fn create_bind_group(
        &self,
        layout: &RecordedLayout,
        group: BindingGroup,
        buffers: &[&RecordedBuffer],
    ) -> Result<RecordedBindGroup> {
        if self.fails(group.label()) {
            return Err(Error::allocation(group.label(), "injected failure"));
        }
        if group == BindingGroup::Parameters {
            assert_eq!(layout.parameter_sizes.len(), buffers.len());
        }
        self.record(Event::CreateBindGroup {
            group,
            buffers: buffers.iter().map(|b| b.label.clone()).collect(),
        });
        Ok(RecordedBindGroup { group })
    }

    fn create_module(&self, program: &dyn ComputeProgram) -> Result<RecordedModule> {
        if self.fail_module {
            return Err(Error::shader_module(program.label(), "injected failure"));
        }
        self.modules.set(self.modules.get() + 1);
        Ok(RecordedModule)
    }

    fn create_pipeline(
        &self,
        _layout: &RecordedLayout,
        _module: &RecordedModule,
        stage: Stage,
        entry_point: &str,
    ) -> Result<RecordedPipeline> {
        if self.fail_entry_point.as_deref() == Some(entry_point) {
            return Err(Error::compile(stage.name(), "entry point not found"));
        }
        self.record(Event::CreatePipeline {
            stage,
            entry_point: entry_point.to_owned(),
        });
        Ok(RecordedPipeline {
            stage,
            entry_point: entry_point.to_owned(),
        })
    }

    fn begin_commands(&self, label: &str) -> RecordedCommands {
        RecordedCommands {
            label: label.to_owned(),
            commands: Vec::new(),
        }
    }

    fn encode_compute(
        &self,
        commands: &mut RecordedCommands,
        _label: &str,
        bind_groups: [&RecordedBindGroup; 3],
        dispatches: &[Dispatch<'_, RecordedPipeline>],
    ) {
        for (group, bound) in BindingGroup::ALL.iter().zip(bind_groups) {
            assert_eq!(*group, bound.group);
        }
        for dispatch in dispatches {
            assert_eq!(dispatch.stage, dispatch.pipeline.stage);
            commands.push(Command::Dispatch {
                stage: dispatch.stage,
                workgroups: dispatch.workgroups,
            });
        }
    }

    fn submit(&self, commands: RecordedCommands) -> Result<()> {
        if self.fail_submit.get() {
            return Err(Error::Submission("injected failure".into()));
        }
        self.record(Event::Submit {
            label: commands.label,
            commands: commands.commands,
        });
        Ok(())
    }
}

/// Presenter that appends a marker to the frame's commands.
#[derive(Default)]
pub struct RecordingPresenter {
    pub presented: usize,
}

impl Presenter<RecordingBackend> for RecordingPresenter {
    type Target = ();

    fn present(
        &mut self,
        _backend: &RecordingBackend,
        resolution: u32,
        framebuffer: &RecordedBuffer,
        _target: &(),
        commands: &mut RecordedCommands,
    ) {
        self.presented += 1;
        commands.push(Command::Present {
            resolution,
            framebuffer: framebuffer.label.clone(),
        });
    }
}

/// Counts how often the loop asked for another frame.
#[derive(Default)]
pub struct FrameCounter {
    pub requested: Cell<usize>,
}

impl FrameRequester for FrameCounter {
    fn request_frame(&self) {
        self.requested.set(self.requested.get() + 1);
    }
}
