// tests/core_controller.rs

use std::sync::Arc;

use chrono::Utc;

use taskdag::dag::{TargetState, TaskState};
use taskdag::engine::{
    ControllerEvent, ControllerOptions, CoreCommand, CoreController, TickReason,
};
use taskdag::errors::TaskdagError;
use taskdag::rebalance::{ClusterSnapshot, CurrentStateOutput, RebalancerRegistry, ReplicaState};
use taskdag_test_utils::builders::{JobConfigBuilder, ObservedStateBuilder, WorkflowBuilder};
use taskdag_test_utils::init_tracing;

fn core(options: ControllerOptions) -> CoreController {
    let mut core = CoreController::new(RebalancerRegistry::with_builtin(), options);
    core.update_cluster(
        Arc::new(ClusterSnapshot::new(["node_0"])),
        Arc::new(CurrentStateOutput::new()),
    );
    core
}

fn chain(name: &str) -> Arc<taskdag::config::WorkflowDefinition> {
    Arc::new(
        WorkflowBuilder::new(name)
            .with_job("A", JobConfigBuilder::new())
            .with_job("B", JobConfigBuilder::new().after("A"))
            .build(),
    )
}

#[test]
fn tick_events_become_run_tick_commands() {
    let mut core = core(ControllerOptions::default());

    let step = core.step(ControllerEvent::Tick {
        reason: TickReason::Manual,
    });
    assert!(step.keep_running);
    assert!(matches!(
        step.commands.as_slice(),
        [CoreCommand::RunTick(TickReason::Manual)]
    ));
}

#[test]
fn changes_only_tick_when_asked_to() {
    let mut quiet = core(ControllerOptions::default());
    let step = quiet.step(ControllerEvent::WorkflowSubmitted(chain("wf")));
    assert!(step.commands.is_empty());

    let mut eager = core(ControllerOptions {
        tick_on_change: true,
        ..ControllerOptions::default()
    });
    let step = eager.step(ControllerEvent::WorkflowSubmitted(chain("wf")));
    assert!(matches!(
        step.commands.as_slice(),
        [CoreCommand::RunTick(TickReason::ConfigChange)]
    ));
}

#[test]
fn tick_produces_assignments_and_transitions() {
    init_tracing();
    let mut core = core(ControllerOptions::default());
    core.submit_workflow(chain("wf")).unwrap();

    let step = core.tick(Utc::now());
    assert!(step.keep_running);
    assert_eq!(core.ticks(), 1);

    let assignments = step
        .commands
        .iter()
        .find_map(|c| match c {
            CoreCommand::ApplyAssignments(a) => Some(a),
            _ => None,
        })
        .expect("assignments");
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].resource, "wf_A");

    assert!(
        step.commands
            .iter()
            .any(|c| matches!(c, CoreCommand::PublishTransitions(t) if !t.is_empty()))
    );
    assert_eq!(
        core.context("wf").unwrap().job_state("A"),
        Some(TaskState::InProgress)
    );
}

#[test]
fn workflows_are_ticked_independently() {
    let mut core = core(ControllerOptions::default());
    core.submit_workflow(chain("one")).unwrap();
    core.submit_workflow(chain("two")).unwrap();

    let ticks = core.begin_tick(Utc::now());
    assert_eq!(ticks.len(), 2);

    // Only "two" comes back; "one" keeps its pre-tick context.
    let outputs = ticks
        .into_iter()
        .filter(|t| t.workflow() == "two")
        .map(|t| t.run())
        .collect();
    core.finish_tick(outputs);

    assert_eq!(core.context("one").unwrap().job_state("A"), None);
    assert_eq!(
        core.context("two").unwrap().job_state("A"),
        Some(TaskState::InProgress)
    );
}

#[test]
fn active_workflow_cannot_be_resubmitted() {
    let mut core = core(ControllerOptions::default());
    core.submit_workflow(chain("wf")).unwrap();
    core.tick(Utc::now());

    assert!(matches!(
        core.submit_workflow(chain("wf")),
        Err(TaskdagError::ConfigError(_))
    ));
}

#[test]
fn reported_states_drive_the_workflow_to_completion() {
    init_tracing();
    let mut core = core(ControllerOptions {
        exit_when_idle: true,
        ..ControllerOptions::default()
    });
    core.submit_workflow(chain("wf")).unwrap();

    core.tick(Utc::now());
    core.report_job_state("wf", "A", TaskState::Completed).unwrap();
    core.tick(Utc::now());
    assert_eq!(
        core.context("wf").unwrap().job_state("B"),
        Some(TaskState::InProgress)
    );

    core.step(ControllerEvent::JobStateReported {
        workflow: "wf".to_string(),
        job: "B".to_string(),
        state: TaskState::Completed,
    });
    let step = core.tick(Utc::now());

    assert_eq!(
        core.context("wf").unwrap().workflow_state(),
        TaskState::Completed
    );
    assert!(core.is_idle());
    assert!(!step.keep_running);
    assert!(matches!(step.commands.last(), Some(CoreCommand::RequestExit)));
}

#[test]
fn reports_for_unknown_targets_are_rejected() {
    let mut core = core(ControllerOptions::default());
    core.submit_workflow(chain("wf")).unwrap();

    assert!(matches!(
        core.report_job_state("nope", "A", TaskState::Completed),
        Err(TaskdagError::UnknownWorkflow(_))
    ));
    assert!(matches!(
        core.report_job_state("wf", "Z", TaskState::Completed),
        Err(TaskdagError::UnknownJob { .. })
    ));
    // A job cannot jump from NOT_STARTED to COMPLETED.
    assert!(matches!(
        core.report_job_state("wf", "A", TaskState::Completed),
        Err(TaskdagError::InvalidTransition { .. })
    ));
}

#[test]
fn removed_workflow_is_forgotten() {
    let mut core = core(ControllerOptions::default());
    core.submit_workflow(chain("wf")).unwrap();

    core.step(ControllerEvent::WorkflowRemoved {
        workflow: "wf".to_string(),
    });
    assert!(core.workflow("wf").is_none());
    assert!(core.context("wf").is_none());
    assert!(matches!(
        core.remove_workflow("wf"),
        Err(TaskdagError::UnknownWorkflow(_))
    ));
}

#[test]
fn max_ticks_requests_exit() {
    let mut core = core(ControllerOptions {
        max_ticks: Some(2),
        ..ControllerOptions::default()
    });
    core.submit_workflow(chain("wf")).unwrap();

    assert!(core.tick(Utc::now()).keep_running);
    assert!(!core.tick(Utc::now()).keep_running);
}

#[test]
fn shutdown_stops_the_loop() {
    let mut core = core(ControllerOptions::default());
    let step = core.step(ControllerEvent::ShutdownRequested);
    assert!(!step.keep_running);
    assert!(step.commands.is_empty());
}

#[test]
fn stop_request_winds_a_running_workflow_down() {
    init_tracing();
    let mut core = core(ControllerOptions::default());
    core.submit_workflow(chain("wf")).unwrap();
    core.tick(Utc::now());
    assert_eq!(
        core.context("wf").unwrap().job_state("A"),
        Some(TaskState::InProgress)
    );

    core.step(ControllerEvent::WorkflowStopRequested {
        workflow: "wf".to_string(),
    });
    assert_eq!(
        core.workflow("wf").unwrap().config.target_state,
        TargetState::Stop
    );

    core.update_cluster(
        Arc::new(ClusterSnapshot::new(["node_0"])),
        Arc::new(
            ObservedStateBuilder::new()
                .replica("wf_A", "p0", "node_0", "RUNNING")
                .build(),
        ),
    );
    let step = core.tick(Utc::now());
    let ctx = core.context("wf").unwrap();
    assert_eq!(ctx.job_state("A"), Some(TaskState::Stopping));
    assert_eq!(ctx.workflow_state(), TaskState::Stopping);

    let teardown = step
        .commands
        .iter()
        .find_map(|c| match c {
            CoreCommand::ApplyAssignments(a) => a.iter().find(|a| a.resource == "wf_A"),
            _ => None,
        })
        .expect("teardown assignment");
    assert_eq!(
        teardown.replica_map("p0").unwrap().get("node_0"),
        Some(&ReplicaState::Dropped)
    );

    core.update_cluster(
        Arc::new(ClusterSnapshot::new(["node_0"])),
        Arc::new(CurrentStateOutput::new()),
    );
    core.tick(Utc::now());
    let ctx = core.context("wf").unwrap();
    assert_eq!(ctx.job_state("A"), Some(TaskState::Stopped));
    assert_eq!(ctx.job_state("B"), None);
    assert_eq!(ctx.workflow_state(), TaskState::Stopped);
}

#[test]
fn stop_requests_for_unknown_or_finished_workflows_do_nothing() {
    let mut core = core(ControllerOptions {
        tick_on_change: true,
        ..ControllerOptions::default()
    });
    assert!(matches!(
        core.stop_workflow("nope"),
        Err(TaskdagError::UnknownWorkflow(_))
    ));

    core.submit_workflow(chain("wf")).unwrap();
    let step = core.step(ControllerEvent::WorkflowStopRequested {
        workflow: "wf".to_string(),
    });
    assert!(matches!(
        step.commands.as_slice(),
        [CoreCommand::RunTick(TickReason::ConfigChange)]
    ));
    // Already stopping.
    assert!(!core.stop_workflow("wf").unwrap());

    core.tick(Utc::now());
    assert_eq!(
        core.context("wf").unwrap().workflow_state(),
        TaskState::Stopped
    );
    assert!(!core.stop_workflow("wf").unwrap());
}
