//! Recursion bridge: a target whose action re-enters the engine.
//!
//! The nested request gets its own token pool, sized by the recursive
//! action. It never borrows from the parent pool: the parent already holds a
//! token for this branch for as long as the nested run lasts. Whatever
//! happens inside, the parent sees one outcome; the nested report is passed
//! up only as captured output.

use std::future::Future;
use std::pin::Pin;

use actions::{ActionContext, CapturedOutput, ExternalCommand, Outcome, Runnable};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::executor::Executor;
use crate::models::{Isolation, Policy, RecursiveSpec};
use crate::pool::TokenPool;
use crate::report;
use crate::runtime::Request;

/// Run `spec` as a nested request and collapse it into one outcome.
///
/// Boxed because the nested run re-enters the scheduler that called us.
pub(crate) fn invoke_nested<'a>(
    parent: &'a Executor,
    spec: &'a RecursiveSpec,
    ctx: &'a ActionContext,
) -> Pin<Box<dyn Future<Output = Outcome> + Send + 'a>> {
    Box::pin(async move {
        let depth = ctx.depth + 1;
        let max_depth = parent.engine.config().max_depth;
        if depth > max_depth {
            warn!(target_name = %ctx.target, "nesting depth {depth} exceeds limit {max_depth}");
            return failure(format!(
                "recursion depth limit of {max_depth} exceeded by '{}'",
                ctx.target
            ));
        }

        let policy = spec.policy().unwrap_or(parent.policy);
        let namespace = spec.namespace.clone().unwrap_or_else(|| parent.namespace.clone());

        match spec.isolation {
            Isolation::InProcess => in_process(parent, spec, namespace, policy, depth).await,
            Isolation::ChildProcess => child_process(parent, spec, namespace, policy, depth, ctx).await,
        }
    })
}

async fn in_process(
    parent: &Executor,
    spec: &RecursiveSpec,
    namespace: String,
    policy: Policy,
    depth: u32,
) -> Outcome {
    let pool = match TokenPool::new(spec.jobs) {
        Ok(pool) => pool,
        Err(err) => return failure(err.to_string()),
    };
    let request = Request::new(spec.targets.iter().cloned(), policy, pool)
        .in_namespace(namespace)
        .at_depth(depth);
    info!(
        nested_request = %request.id,
        "entering nested request for {:?} in namespace '{}'",
        request.targets,
        request.namespace
    );

    match parent.engine.run(request).await {
        Ok(report) => {
            let output = CapturedOutput::from_stdout(report::render(&report));
            if report.succeeded() {
                Outcome::succeeded(output)
            } else {
                Outcome::failed(output)
            }
        }
        // A malformed nested graph fails this target, not the parent request.
        Err(err) => failure(format!("nested request rejected: {err}")),
    }
}

async fn child_process(
    parent: &Executor,
    spec: &RecursiveSpec,
    namespace: String,
    policy: Policy,
    depth: u32,
    ctx: &ActionContext,
) -> Outcome {
    let Some(self_command) = parent.engine.config().self_command.as_ref() else {
        return failure("child-process recursion needs a self command, none configured".to_owned());
    };
    let Some((program, base_args)) = self_command.split_first() else {
        return failure("self command is empty".to_owned());
    };

    let config = parent.engine.config();
    let cmd = ExternalCommand::new(
        program.clone(),
        child_args(base_args, spec, &namespace, policy, ctx.dry_run, config),
    );

    // The child decides about dry-run itself; we always spawn it.
    let child_ctx = ActionContext {
        depth,
        dry_run: false,
        ..ctx.clone()
    };
    info!("spawning nested engine: {}", cmd.command_line());
    match cmd.run(&child_ctx).await {
        Ok(outcome) => outcome,
        Err(err) => Outcome::from_error(&err),
    }
}

/// argv after the program for a child engine process.
///
/// The nesting level travels in `JOBTREE_LEVEL`; everything else the child
/// must share with this engine is spelled out here.
fn child_args(
    base_args: &[String],
    spec: &RecursiveSpec,
    namespace: &str,
    policy: Policy,
    dry_run: bool,
    config: &EngineConfig,
) -> Vec<String> {
    let mut args: Vec<String> = base_args.to_vec();
    args.push("--jobs".to_owned());
    args.push(spec.jobs.to_string());
    args.push("--max-depth".to_owned());
    args.push(config.max_depth.to_string());
    if let Some(dir) = &config.log_dir {
        args.push("--log-dir".to_owned());
        args.push(dir.to_string_lossy().into_owned());
    }
    if policy == Policy::KeepGoing {
        args.push("--keep-going".to_owned());
    }
    if dry_run {
        args.push("--dry-run".to_owned());
    }
    if !namespace.is_empty() {
        args.push("--namespace".to_owned());
        args.push(namespace.to_owned());
    }
    args.push("--".to_owned());
    args.extend(spec.targets.iter().cloned());
    args
}

fn failure(message: String) -> Outcome {
    Outcome::failed(CapturedOutput {
        stdout: String::new(),
        stderr: message + "\n",
    })
}
