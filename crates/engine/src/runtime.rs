//! The engine context object and the requests it runs.
//!
//! `Engine` holds nothing mutable: a read-only catalog snapshot and the
//! configuration. Everything that changes during a run (token pool, execution
//! records, in-flight workers) belongs to a single [`Request`], which is what
//! makes nested invocations safe to run inside the same process.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dag::{self, DependencyGraph};
use crate::executor::Executor;
use crate::models::{Policy, RunReport, RunResult};
use crate::pool::TokenPool;
use crate::registry::{Catalog, ROOT_NAMESPACE};
use crate::scheduler::Scheduler;
use crate::EngineError;

/// Top-level target names plus the policy and token pool to run them with.
#[derive(Debug)]
pub struct Request {
    pub id: Uuid,
    pub namespace: String,
    pub targets: Vec<String>,
    pub policy: Policy,
    pub pool: TokenPool,
    pub depth: u32,
}

impl Request {
    /// A request against the root namespace at depth 0.
    pub fn new<I, S>(targets: I, policy: Policy, pool: TokenPool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: Uuid::new_v4(),
            namespace: ROOT_NAMESPACE.to_owned(),
            targets: targets.into_iter().map(Into::into).collect(),
            policy,
            pool,
            depth: 0,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn at_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }
}

/// Re-entrant engine instance. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Engine {
    catalog: Arc<Catalog>,
    config: Arc<EngineConfig>,
}

impl Engine {
    /// # Errors
    /// Returns the configuration's validation error, if any.
    pub fn new(catalog: Catalog, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            catalog: Arc::new(catalog),
            config: Arc::new(config),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A top-level request for `targets`, sized and policed by the config.
    pub fn request<I, S>(&self, namespace: &str, targets: I) -> Result<Request, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pool = TokenPool::new(self.config.jobs)?;
        Ok(Request::new(targets, self.config.policy, pool)
            .in_namespace(namespace)
            .at_depth(self.config.depth))
    }

    /// Build the dependency graph for `targets` without running anything.
    pub fn graph(&self, namespace: &str, targets: &[String]) -> Result<DependencyGraph, EngineError> {
        let registry = self.catalog.namespace(namespace)?;
        dag::build(registry, targets)
    }

    /// Resolve and execute one request.
    ///
    /// # Errors
    /// Only structural problems (unknown namespace or target, cycle) are
    /// returned as errors, and always before any action has run. Action
    /// failures show up in the report.
    #[instrument(
        skip_all,
        fields(request_id = %request.id, namespace = %request.namespace, depth = request.depth)
    )]
    pub async fn run(&self, request: Request) -> Result<RunReport, EngineError> {
        let graph = self.graph(&request.namespace, &request.targets)?;
        info!(
            "graph resolved: {} targets, -j {}, {:?}",
            graph.len(),
            request.pool.capacity(),
            request.policy
        );

        let executor = Executor::new(self.clone(), &request);
        let schedule = Scheduler::new(&graph, request.policy, &request.pool)
            .run(executor)
            .await;

        let report = RunReport {
            request_id: request.id,
            namespace: request.namespace,
            depth: request.depth,
            result: schedule.result(),
            records: schedule.records,
            dispatch_order: schedule.dispatch_order,
        };
        match report.result {
            RunResult::Succeeded => info!("request succeeded"),
            RunResult::Failed => warn!(
                "request failed: {}",
                report.failed_targets().collect::<Vec<_>>().join(", ")
            ),
        }
        Ok(report)
    }

    /// Shorthand for a root-namespace request built from the config.
    pub async fn run_targets<I, S>(&self, targets: I) -> Result<RunReport, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = self.request(ROOT_NAMESPACE, targets)?;
        self.run(request).await
    }
}
