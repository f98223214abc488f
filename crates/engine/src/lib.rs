//! `engine` crate: target registry, graph building, scheduling and the
//! recursion bridge.
//!
//! A request flows through [`dag::build`] into a [`scheduler::Scheduler`],
//! which hands ready targets to an [`executor::Executor`]. Recursive actions
//! go through [`bridge`] and come back as a single pass/fail outcome.

pub mod models;
pub mod error;
pub mod config;
pub mod registry;
pub mod dag;
pub mod pool;
pub mod scheduler;
pub mod executor;
mod bridge;
pub mod runtime;
pub mod loader;
pub mod report;

pub use models::{
    Action, ExecutionRecord, Isolation, Policy, RecursiveSpec, RunReport, RunResult, Target, TargetState,
};
pub use error::EngineError;
pub use config::EngineConfig;
pub use registry::{Catalog, Registry, ROOT_NAMESPACE};
pub use dag::{build, DependencyGraph};
pub use pool::TokenPool;
pub use runtime::{Engine, Request};
