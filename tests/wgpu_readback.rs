//! Runs the orchestrator against a real device. Every test returns early when
//! the machine has no adapter.

use slime_orchestrator::gpu::{Backend, WgpuBackend, WgslProgram};
use slime_orchestrator::present::Presenter;
use slime_orchestrator::scheduler::{FrameRequester, SchedulerState};
use slime_orchestrator::{Error, Orchestrator, ParamValue, SimulationConfig};

struct NoPresenter;

impl Presenter<WgpuBackend> for NoPresenter {
    type Target = ();

    fn present(
        &mut self,
        _backend: &WgpuBackend,
        _resolution: u32,
        _framebuffer: &wgpu::Buffer,
        _target: &(),
        _commands: &mut wgpu::CommandEncoder,
    ) {
    }
}

struct NoRequests;

impl FrameRequester for NoRequests {
    fn request_frame(&self) {}
}

fn orchestrator() -> Option<Orchestrator<WgpuBackend>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let Some(backend) = pollster::block_on(WgpuBackend::headless()) else {
        eprintln!("no GPU adapter available, skipping");
        return None;
    };
    Some(
        Orchestrator::new(backend, &SimulationConfig::default(), &WgslProgram::bundled())
            .expect("bundled program builds"),
    )
}

#[test]
fn parameters_reach_the_device() {
    let Some(mut orchestrator) = orchestrator() else {
        return;
    };
    assert_eq!(orchestrator.readback("rez").unwrap(), ParamValue::Scalar(512.0));
    assert_eq!(orchestrator.readback("count").unwrap(), ParamValue::Scalar(10000.0));

    orchestrator.set("count", 20000u32.into()).unwrap();
    assert_eq!(orchestrator.readback("count").unwrap(), ParamValue::Scalar(20000.0));

    assert!(matches!(
        orchestrator.set("rez", 1024.0.into()),
        Err(Error::LockedParameter(_))
    ));
}

#[test]
fn frames_advance_time_and_draw_agents() {
    let Some(mut orchestrator) = orchestrator() else {
        return;
    };
    orchestrator.prime().unwrap();
    for _ in 0..3 {
        orchestrator.tick(&mut NoPresenter, &(), &NoRequests).unwrap();
    }
    assert_eq!(orchestrator.state(), SchedulerState::Running);
    assert_eq!(orchestrator.readback("time").unwrap(), ParamValue::Scalar(3.0));

    let framebuffer = orchestrator
        .backend()
        .read_buffer(orchestrator.layout().framebuffer())
        .unwrap();
    assert_eq!(framebuffer.len(), 512 * 512 * 16);
    assert!(framebuffer.iter().any(|byte| *byte != 0));
}
