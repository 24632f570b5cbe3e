// tests/scheduler_properties.rs

use std::collections::BTreeSet;

use chrono::Utc;
use proptest::prelude::*;

use taskdag::config::WorkflowDefinition;
use taskdag::dag::{TaskState, WorkflowContext, WorkflowScheduler};
use taskdag::rebalance::{ClusterSnapshot, CurrentStateOutput, RebalancerRegistry};
use taskdag_test_utils::builders::{JobConfigBuilder, WorkflowBuilder};

// Strategy to generate a valid workflow.
// Acyclicity is guaranteed by only letting job N depend on jobs 0..N-1.
fn workflow_strategy(max_jobs: usize) -> impl Strategy<Value = WorkflowDefinition> {
    (1..=max_jobs, any::<bool>(), 1..=3usize).prop_flat_map(|(num_jobs, job_queue, parallel)| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..3), num_jobs)
            .prop_map(move |raw_deps| {
                let mut builder = WorkflowBuilder::new("prop");
                if job_queue {
                    builder = builder.job_queue(parallel);
                }
                for (i, potential) in raw_deps.into_iter().enumerate() {
                    let deps: BTreeSet<usize> = if i == 0 {
                        BTreeSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    };
                    let mut job = JobConfigBuilder::new();
                    for d in deps {
                        job = job.after(&format!("job_{d}"));
                    }
                    builder = builder.with_job(&format!("job_{i}"), job);
                }
                builder.build()
            })
    })
}

proptest! {
    #[test]
    fn scheduling_respects_dependencies_and_queue_limit(
        wf in workflow_strategy(8),
        // Outcome per (tick, job) of running jobs: true = fail.
        failures in proptest::collection::vec(any::<bool>(), 64),
    ) {
        let registry = RebalancerRegistry::with_builtin();
        let cluster = ClusterSnapshot::new(["node_0"]);
        let current = CurrentStateOutput::new();
        let scheduler = WorkflowScheduler::new(&wf, &registry, &cluster, &current);
        let mut ctx = WorkflowContext::new("prop");
        let jobs: Vec<String> = wf.dag.all_nodes().map(str::to_string).collect();
        let mut outcome = failures.iter().cycle();

        // Every tick either starts a job or settles one DAG level, so this
        // bound is generous.
        let max_ticks = jobs.len() * 3 + 3;

        for _ in 0..max_ticks {
            scheduler.tick(&mut ctx, Utc::now()).unwrap();

            if wf.config.job_queue {
                prop_assert!(ctx.incomplete_job_count(&wf.dag) <= wf.config.parallel_jobs);
            } else {
                for job in &jobs {
                    let started = matches!(
                        ctx.job_state(job),
                        Some(TaskState::InProgress) | Some(TaskState::Completed)
                    );
                    if started {
                        for parent in wf.dag.direct_parents(job) {
                            prop_assert_eq!(ctx.job_state(parent), Some(TaskState::Completed));
                        }
                    }
                }
            }

            if ctx.workflow_state().is_terminal() {
                break;
            }

            // Finish every running job.
            for job in &jobs {
                if ctx.job_state(job) == Some(TaskState::InProgress) {
                    let next = if *outcome.next().unwrap() {
                        TaskState::Failed
                    } else {
                        TaskState::Completed
                    };
                    ctx.set_job_state(job, next).unwrap();
                }
            }
        }

        prop_assert!(ctx.workflow_state().is_terminal());
        for job in &jobs {
            prop_assert!(ctx.job_state(job).is_some_and(TaskState::is_terminal));
        }
    }
}
