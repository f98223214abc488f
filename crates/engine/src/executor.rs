//! Target execution.
//!
//! `Executor` runs one target's action and always comes back with an
//! [`Outcome`]: action errors are converted to failed outcomes here, so the
//! scheduler never sees anything but pass/fail. Each outcome carries the
//! output of exactly one target, which keeps concurrent logs separate.

use std::path::{Path, PathBuf};
use std::time::Instant;

use actions::{ActionContext, CapturedOutput, Outcome, Runnable};
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::bridge;
use crate::models::{Action, Policy, Target};
use crate::registry::ROOT_NAMESPACE;
use crate::runtime::{Engine, Request};

/// Runs targets on behalf of one request. Cloned into every worker.
#[derive(Debug, Clone)]
pub struct Executor {
    pub(crate) engine: Engine,
    pub(crate) request_id: Uuid,
    pub(crate) namespace: String,
    pub(crate) depth: u32,
    pub(crate) policy: Policy,
}

impl Executor {
    pub(crate) fn new(engine: Engine, request: &Request) -> Self {
        Self {
            engine,
            request_id: request.id,
            namespace: request.namespace.clone(),
            depth: request.depth,
            policy: request.policy,
        }
    }

    fn context(&self, target: &Target) -> ActionContext {
        ActionContext {
            target: target.name.clone(),
            request_id: self.request_id,
            depth: self.depth,
            dry_run: self.engine.config().dry_run,
        }
    }

    /// Run `target`'s action to completion.
    #[instrument(skip_all, fields(target_name = %target.name))]
    pub async fn execute(&self, target: &Target) -> Outcome {
        let ctx = self.context(target);
        let started_at = Utc::now();
        let clock = Instant::now();

        let result = match &target.action {
            Action::None => Ok(Outcome::succeeded(CapturedOutput::default())),
            Action::Command(cmd) => cmd.run(&ctx).await,
            Action::Custom(runnable) if ctx.dry_run => Ok(Outcome::succeeded(
                CapturedOutput::from_stdout(format!("would run: {}\n", runnable.describe())),
            )),
            Action::Custom(runnable) => runnable.run(&ctx).await,
            Action::Recursive(spec) => Ok(bridge::invoke_nested(self, spec, &ctx).await),
        };

        let mut outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("action error: {err}");
                Outcome::from_error(&err)
            }
        };
        if outcome.duration.is_zero() {
            outcome.duration = clock.elapsed();
        }

        if let Some(dir) = &self.engine.config().log_dir {
            if !matches!(target.action, Action::None) {
                let path = log_path(dir, &self.namespace, &target.name, started_at);
                if let Err(err) = write_log(&path, &target.action.describe(), started_at, &outcome).await {
                    warn!("could not write log file {}: {err}", path.display());
                } else {
                    debug!("log written to {}", path.display());
                }
            }
        }

        outcome
    }
}

/// `<dir>/[<namespace>.]<target>.<timestamp>.log`, with path-hostile
/// characters in names replaced.
pub(crate) fn log_path(dir: &Path, namespace: &str, target: &str, started_at: DateTime<Utc>) -> PathBuf {
    let sanitize = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() || "-_".contains(c) { c } else { '_' })
            .collect()
    };
    let stamp = started_at.format("%Y%m%dT%H%M%S%.6fZ");
    let file = if namespace == ROOT_NAMESPACE {
        format!("{}.{stamp}.log", sanitize(target))
    } else {
        format!("{}.{}.{stamp}.log", sanitize(namespace), sanitize(target))
    };
    dir.join(file)
}

async fn write_log(
    path: &Path,
    command: &str,
    started_at: DateTime<Utc>,
    outcome: &Outcome,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let rule = "-".repeat(75);
    let mut text = format!(
        "Starting @ {}\nRunning {}\n{}\n",
        started_at.to_rfc3339(),
        command,
        rule
    );
    text.push_str(&outcome.output.stdout);
    if !outcome.output.stderr.is_empty() {
        text.push_str(&format!("{rule}\nstderr:\n"));
        text.push_str(&outcome.output.stderr);
    }
    text.push_str(&format!(
        "{rule}\nFinished: {} (exit code {}) after {:?}\n",
        if outcome.success { "success" } else { "failure" },
        outcome
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_owned()),
        outcome.duration
    ));

    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn log_path_sanitises_and_prefixes_namespace() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let root = log_path(Path::new("/logs"), ROOT_NAMESPACE, "test/bot 1", at);
        assert_eq!(root, PathBuf::from("/logs/test_bot_1.20240501T120000.000000Z.log"));

        let nested = log_path(Path::new("/logs"), "mid", "all", at);
        assert_eq!(nested, PathBuf::from("/logs/mid.all.20240501T120000.000000Z.log"));
    }

    #[tokio::test]
    async fn log_file_has_header_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t.log");
        let at = Utc::now();
        let outcome = Outcome::from_exit_code(
            Some(2),
            CapturedOutput {
                stdout: "out\n".into(),
                stderr: "err\n".into(),
            },
        );

        write_log(&path, "sh -c false", at, &outcome).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Starting @ "));
        assert_eq!(lines[1], "Running sh -c false");
        assert_eq!(lines[2], "-".repeat(75));
        assert_eq!(lines[3], "out");
        assert!(text.contains("stderr:\nerr\n"));
        assert!(text.contains("Finished: failure (exit code 2)"));
    }
}
