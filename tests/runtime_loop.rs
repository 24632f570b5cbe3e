// tests/runtime_loop.rs

use std::error::Error;
use std::sync::Arc;

use tokio::sync::mpsc;

use taskdag::config::WorkflowDefinition;
use taskdag::dag::TaskState;
use taskdag::engine::{ControllerEvent, ControllerOptions, CoreController, Runtime, TickReason};
use taskdag::exec::{ChannelAssignmentSink, SimulatedExecutor};
use taskdag::rebalance::{ClusterSnapshot, CurrentStateOutput, RebalancerRegistry};
use taskdag_test_utils::builders::{JobConfigBuilder, WorkflowBuilder};
use taskdag_test_utils::recording_sink::{RecordingSink, StaticSelector};
use taskdag_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// Very simple chain: A -> B
fn simple_chain() -> WorkflowDefinition {
    WorkflowBuilder::new("wf")
        .with_job("A", JobConfigBuilder::new())
        .with_job("B", JobConfigBuilder::new().after("A"))
        .build()
}

#[tokio::test]
async fn runtime_hands_assignments_and_notifications_to_sink() -> TestResult {
    init_tracing();

    let (tx, rx) = mpsc::channel(16);
    let sink = RecordingSink::new();
    let selector = StaticSelector::new().with_replica("wf_A", "p0", "node_0", "RUNNING");

    let core = CoreController::new(
        RebalancerRegistry::with_builtin(),
        ControllerOptions {
            max_ticks: Some(2),
            ..ControllerOptions::default()
        },
    );
    let runtime = Runtime::new(core, rx, sink.clone()).with_selector(Arc::new(selector));

    tx.send(ControllerEvent::ClusterChanged {
        snapshot: Arc::new(ClusterSnapshot::new(["node_0"])),
        current_state: Arc::new(CurrentStateOutput::new()),
    })
    .await?;
    tx.send(ControllerEvent::WorkflowSubmitted(Arc::new(simple_chain())))
        .await?;
    for _ in 0..2 {
        tx.send(ControllerEvent::Tick {
            reason: TickReason::Manual,
        })
        .await?;
    }

    let core = with_timeout(runtime.run()).await?;

    assert_eq!(core.ticks(), 2);
    // A is re-asserted every tick while it runs; B waits.
    assert_eq!(sink.applied_resources(), vec!["wf_A", "wf_A"]);

    let notifications = sink.notifications.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].transition.job.as_deref(), Some("A"));
    assert_eq!(notifications[0].transition.to, TaskState::InProgress);
    assert_eq!(notifications[0].recipients[0].instance_name, "node_0");

    Ok(())
}

fn simulated_run(executor: impl FnOnce(SimulatedExecutor) -> SimulatedExecutor) -> (
    Runtime<SimulatedExecutor>,
    mpsc::Sender<ControllerEvent>,
    ControllerEvent,
) {
    let (tx, rx) = mpsc::channel(16);
    let cluster = ClusterSnapshot::new(["node_0", "node_1"]);
    let executor = executor(SimulatedExecutor::new(cluster, tx.clone()));
    let cluster_event = executor.cluster_event();

    let core = CoreController::new(
        RebalancerRegistry::with_builtin(),
        ControllerOptions {
            tick_on_change: true,
            exit_when_idle: true,
            max_ticks: Some(50),
        },
    );
    (Runtime::new(core, rx, executor), tx, cluster_event)
}

#[tokio::test]
async fn simulated_cluster_runs_chain_to_completion() -> TestResult {
    init_tracing();

    let (runtime, tx, cluster_event) = simulated_run(|e| e);
    tx.send(cluster_event).await?;
    tx.send(ControllerEvent::WorkflowSubmitted(Arc::new(simple_chain())))
        .await?;

    let core = with_timeout(runtime.run()).await?;
    let ctx = core.context("wf").expect("context");

    assert_eq!(ctx.job_state("A"), Some(TaskState::Completed));
    assert_eq!(ctx.job_state("B"), Some(TaskState::Completed));
    assert_eq!(ctx.workflow_state(), TaskState::Completed);
    assert!(core.ticks() < 50);

    Ok(())
}

#[tokio::test]
async fn simulated_task_error_fails_the_workflow() -> TestResult {
    init_tracing();

    let (runtime, tx, cluster_event) = simulated_run(|e| e.fail_partition("wf_A", "p0"));
    tx.send(cluster_event).await?;
    tx.send(ControllerEvent::WorkflowSubmitted(Arc::new(simple_chain())))
        .await?;

    let core = with_timeout(runtime.run()).await?;
    let ctx = core.context("wf").expect("context");

    assert_eq!(ctx.job_state("A"), Some(TaskState::Failed));
    assert_eq!(ctx.job_state("B"), Some(TaskState::Failed));
    assert_eq!(ctx.workflow_state(), TaskState::Failed);

    Ok(())
}

#[tokio::test]
async fn channel_sink_forwards_assignments_and_notifications() -> TestResult {
    init_tracing();

    let (tx, rx) = mpsc::channel(16);
    let (assign_tx, mut assign_rx) = mpsc::channel(16);
    let (notify_tx, mut notify_rx) = mpsc::channel(16);
    let sink = ChannelAssignmentSink::new(assign_tx).with_notifications(notify_tx);
    let selector = StaticSelector::new().with_replica("wf_A", "p0", "node_0", "RUNNING");

    let core = CoreController::new(
        RebalancerRegistry::with_builtin(),
        ControllerOptions {
            max_ticks: Some(1),
            ..ControllerOptions::default()
        },
    );
    let runtime = Runtime::new(core, rx, sink).with_selector(Arc::new(selector));

    tx.send(ControllerEvent::ClusterChanged {
        snapshot: Arc::new(ClusterSnapshot::new(["node_0"])),
        current_state: Arc::new(CurrentStateOutput::new()),
    })
    .await?;
    tx.send(ControllerEvent::WorkflowSubmitted(Arc::new(simple_chain())))
        .await?;
    tx.send(ControllerEvent::Tick {
        reason: TickReason::Timer,
    })
    .await?;

    with_timeout(runtime.run()).await?;

    let assignment = assign_rx.recv().await.expect("assignment");
    assert_eq!(assignment.resource, "wf_A");
    assert!(assign_rx.try_recv().is_err());

    let notification = notify_rx.recv().await.expect("notification");
    assert_eq!(notification.transition.job.as_deref(), Some("A"));

    Ok(())
}
