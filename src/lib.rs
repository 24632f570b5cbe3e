// src/lib.rs

pub mod cli;
pub mod config;
pub mod criteria;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod rebalance;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{WorkflowDefinition, load_and_validate};
use crate::engine::{ControllerEvent, ControllerOptions, CoreController, Runtime, TickReason};
use crate::exec::SimulatedExecutor;
use crate::rebalance::{ClusterSnapshot, RebalancerRegistry};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - workflow loading
/// - the core controller and its async runtime
/// - the simulated executor standing in for the cluster
/// - a recurring timer tick
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let workflows = args
        .workflows
        .iter()
        .map(load_and_validate)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if args.dry_run {
        print_dry_run(&workflows);
        return Ok(());
    }

    let (tx, rx) = mpsc::channel::<ControllerEvent>(256);

    let cluster = ClusterSnapshot::new(args.instances.iter().cloned());
    let executor = SimulatedExecutor::new(cluster, tx.clone());

    let options = ControllerOptions {
        tick_on_change: true,
        exit_when_idle: true,
        max_ticks: Some(args.ticks),
    };
    let core = CoreController::new(RebalancerRegistry::with_builtin(), options);

    // Announce the cluster before any workflow so the first tick can place work.
    tx.send(executor.cluster_event()).await?;
    for workflow in workflows {
        tx.send(ControllerEvent::WorkflowSubmitted(Arc::new(workflow)))
            .await?;
    }

    // Recurring timer.
    {
        let tx = tx.clone();
        let period = Duration::from_millis(args.interval_ms.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if tx
                    .send(ControllerEvent::Tick {
                        reason: TickReason::Timer,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
    }

    // Ctrl-C → graceful shutdown.
    {
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(ControllerEvent::ShutdownRequested).await;
        });
    }
    drop(tx);

    let runtime = Runtime::new(core, rx, executor);
    let core = runtime.run().await?;

    info!(ticks = core.ticks(), "scheduling finished");
    print_report(&core);
    Ok(())
}

/// Final job and workflow states, one workflow per block.
fn print_report(core: &CoreController) {
    for name in core.workflow_names() {
        let Some(context) = core.context(name) else {
            continue;
        };
        println!("workflow {name}: {}", context.workflow_state());

        if let Some(workflow) = core.workflow(name) {
            for job in workflow.dag.all_nodes() {
                let state = context.job_state(job).unwrap_or_default();
                match context.failure_cause(job) {
                    Some(cause) => println!("  - {job}: {state} ({cause})"),
                    None => println!("  - {job}: {state}"),
                }
            }
        }
    }
}

/// Simple dry-run output: print workflows, their policy and DAG.
fn print_dry_run(workflows: &[WorkflowDefinition]) {
    println!("taskdag dry-run");

    for workflow in workflows {
        println!();
        println!("workflow {}", workflow.name);
        println!("  job_queue = {}", workflow.config.job_queue);
        println!("  parallel_jobs = {}", workflow.config.parallel_jobs);
        if let Some(start) = workflow.config.start_time {
            println!("  start_time = {start}");
        }
        println!("  target_state = {:?}", workflow.config.target_state);

        println!("  jobs ({}):", workflow.dag.len());
        for job in workflow.dag.all_nodes() {
            println!("    - {job}");
            let parents = workflow.dag.direct_parents(job);
            if !parents.is_empty() {
                println!("        after: {parents:?}");
            }
            if let Some(cfg) = workflow.jobs.get(job) {
                println!("        job_model: {}", cfg.job_model);
                if !cfg.partitions.is_empty() {
                    println!("        partitions: {:?}", cfg.partitions);
                }
                if cfg.ignore_dependent_job_failure {
                    println!("        ignore_dependent_job_failure: true");
                }
                if let Some(timeout) = cfg.timeout_secs {
                    println!("        timeout_secs: {timeout}");
                }
            }
        }
    }

    debug!("dry-run complete (nothing scheduled)");
}
