//! The dispatch loop.
//!
//! A single coordinating loop walks the graph and hands ready targets to
//! worker tasks. It suspends in exactly two places: waiting for a token when
//! nothing of its own is in flight, and waiting for any in-flight worker to
//! report. Prerequisite-before-dependent ordering always holds; with one
//! token the dispatch order is exactly the graph's topological order.

use std::collections::BTreeSet;
use std::sync::Arc;

use actions::{CapturedOutput, Outcome};
use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dag::DependencyGraph;
use crate::executor::Executor;
use crate::models::{ExecutionRecord, Policy, RunResult, TargetState};
use crate::pool::TokenPool;

/// Per-target records and dispatch order of one scheduled graph.
#[derive(Debug)]
pub struct Schedule {
    pub records: Vec<ExecutionRecord>,
    pub dispatch_order: Vec<String>,
}

impl Schedule {
    /// Succeeded only if every target in the graph succeeded.
    pub fn result(&self) -> RunResult {
        if self.records.iter().all(|r| r.state == TargetState::Succeeded) {
            RunResult::Succeeded
        } else {
            RunResult::Failed
        }
    }
}

pub struct Scheduler<'g> {
    graph: &'g DependencyGraph,
    policy: Policy,
    pool: TokenPool,
}

impl<'g> Scheduler<'g> {
    pub fn new(graph: &'g DependencyGraph, policy: Policy, pool: &TokenPool) -> Self {
        Self {
            graph,
            policy,
            pool: pool.clone(),
        }
    }

    /// Run the graph to completion. Never fails: action failures are folded
    /// into the records according to the policy.
    pub async fn run(&self, executor: Executor) -> Schedule {
        let graph = self.graph;
        let mut records: Vec<ExecutionRecord> =
            graph.targets().map(|t| ExecutionRecord::pending(t)).collect();
        let mut waiting_on: Vec<usize> = (0..graph.len()).map(|i| graph.prerequisites(i).len()).collect();

        // Ordered by graph index so the lowest topological position goes first.
        let mut ready: BTreeSet<usize> = BTreeSet::new();
        for (idx, record) in records.iter_mut().enumerate() {
            if waiting_on[idx] == 0 {
                record.state = TargetState::Ready;
                ready.insert(idx);
            }
        }

        let mut in_flight: JoinSet<(usize, Outcome)> = JoinSet::new();
        let mut dispatch_order: Vec<String> = Vec::with_capacity(graph.len());
        let mut halted = false;

        loop {
            // --------------------------------------------------------------
            // Dispatch every ready target we can get a token for.
            // --------------------------------------------------------------
            while !halted {
                let Some(&idx) = ready.first() else { break };

                let token = if in_flight.is_empty() {
                    // Nothing of ours will free a slot; wait for one.
                    self.pool.acquire().await
                } else {
                    match self.pool.try_acquire() {
                        Some(token) => token,
                        None => break,
                    }
                };

                ready.remove(&idx);
                let target = Arc::clone(graph.target(idx));
                let record = &mut records[idx];
                record.state = TargetState::Running;
                record.started_at = Some(Utc::now());
                dispatch_order.push(target.name.clone());
                debug!(target_name = %target.name, "dispatching");

                let executor = executor.clone();
                in_flight.spawn(async move {
                    // Inner task so a panicking action still reports its index.
                    let worker = tokio::spawn(async move { executor.execute(&target).await });
                    let outcome = match worker.await {
                        Ok(outcome) => outcome,
                        Err(err) => Outcome::failed(CapturedOutput {
                            stdout: String::new(),
                            stderr: format!("worker aborted: {err}"),
                        }),
                    };
                    drop(token);
                    (idx, outcome)
                });
            }

            // --------------------------------------------------------------
            // Wait for the next completion.
            // --------------------------------------------------------------
            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (idx, outcome) = match joined {
                Ok(done) => done,
                Err(err) => {
                    error!("scheduler task lost: {err}");
                    continue;
                }
            };

            let name = graph.target(idx).name.clone();
            records[idx].finished_at = Some(Utc::now());

            if outcome.success {
                info!(target_name = %name, "succeeded in {:?}", outcome.duration);
                records[idx].state = TargetState::Succeeded;
                for &dependent in graph.dependents(idx) {
                    waiting_on[dependent] -= 1;
                    if waiting_on[dependent] == 0 && records[dependent].state == TargetState::Pending {
                        records[dependent].state = TargetState::Ready;
                        ready.insert(dependent);
                    }
                }
            } else {
                warn!(target_name = %name, exit_code = ?outcome.exit_code, "failed");
                records[idx].state = TargetState::Failed;
                skip_dependents(graph, idx, &mut records);

                if self.policy == Policy::FailFast && !halted {
                    warn!("fail-fast: no further targets will be dispatched");
                    halted = true;
                }
            }
            records[idx].outcome = Some(outcome);
        }

        // ------------------------------------------------------------------
        // Anything still waiting was never dispatched.
        // ------------------------------------------------------------------
        for record in &mut records {
            match record.state {
                TargetState::Pending | TargetState::Ready => {
                    record.state = TargetState::Skipped;
                    record
                        .skip_reason
                        .get_or_insert_with(|| "not dispatched after an earlier failure".to_owned());
                }
                TargetState::Running => {
                    record.state = TargetState::Failed;
                    record.finished_at = Some(Utc::now());
                }
                _ => {}
            }
        }

        Schedule {
            records,
            dispatch_order,
        }
    }
}

/// Mark everything downstream of `failed` as skipped.
fn skip_dependents(graph: &DependencyGraph, failed: usize, records: &mut [ExecutionRecord]) {
    let failed_name = graph.target(failed).name.clone();
    let mut stack: Vec<usize> = graph.dependents(failed).to_vec();

    while let Some(idx) = stack.pop() {
        let record = &mut records[idx];
        if record.state != TargetState::Pending {
            continue;
        }
        record.state = TargetState::Skipped;
        record.skip_reason = Some(format!("prerequisite '{failed_name}' failed"));
        stack.extend_from_slice(graph.dependents(idx));
    }
}
