//! `MockAction`: a test double for `Runnable`.
//!
//! Useful in unit and integration tests where spawning real processes is
//! either unavailable or irrelevant. Mocks can share a [`Journal`] to record
//! the global start order and a [`Gauge`] to record peak concurrency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::{ActionContext, ActionError, CapturedOutput, Outcome, Runnable};

/// Behaviour injected into `MockAction` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Exit with status 0.
    Succeed,
    /// Exit with the given non-zero status.
    ExitWith(i32),
    /// Fail without an exit status.
    Error(String),
}

/// Shared start-order log.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, name: &str) {
        self.0.lock().unwrap().push(name.to_owned());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Counts actions currently inside `run` and remembers the peak.
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// A mock action that records every call it receives and returns a
/// programmer-specified result.
#[derive(Debug, Clone)]
pub struct MockAction {
    /// Label used in test assertions.
    pub name: String,
    /// What the action will do when `run` is called.
    pub behaviour: MockBehaviour,
    /// How long `run` sleeps before reporting.
    pub delay: Duration,
    calls: Arc<AtomicUsize>,
    journal: Option<Journal>,
    gauge: Option<Gauge>,
}

impl MockAction {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            journal: None,
            gauge: None,
        }
    }

    /// Create a mock that always exits 0.
    pub fn succeeding(name: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Succeed)
    }

    /// Create a mock that always exits with `code`.
    pub fn exiting(name: impl Into<String>, code: i32) -> Self {
        Self::with_behaviour(name, MockBehaviour::ExitWith(code))
    }

    /// Create a mock that always fails with an `ActionError`.
    pub fn erroring(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Error(msg.into()))
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn journal(mut self, journal: &Journal) -> Self {
        self.journal = Some(journal.clone());
        self
    }

    pub fn gauge(mut self, gauge: &Gauge) -> Self {
        self.gauge = Some(gauge.clone());
        self
    }

    /// Number of times this action has been run (clones share the counter).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Runnable for MockAction {
    fn describe(&self) -> String {
        format!("mock {}", self.name)
    }

    async fn run(&self, ctx: &ActionContext) -> Result<Outcome, ActionError> {
        if ctx.dry_run {
            return Ok(Outcome::succeeded(CapturedOutput::from_stdout(format!(
                "would run: {}\n",
                self.describe()
            ))));
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(journal) = &self.journal {
            journal.push(&self.name);
        }
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(gauge) = &self.gauge {
            gauge.leave();
        }

        let output = CapturedOutput::from_stdout(format!("{} ran\n", self.name));
        match &self.behaviour {
            MockBehaviour::Succeed => Ok(Outcome::from_exit_code(Some(0), output)),
            MockBehaviour::ExitWith(code) => Ok(Outcome::from_exit_code(Some(*code), output)),
            MockBehaviour::Error(msg) => Err(ActionError::Failed(msg.clone())),
        }
    }
}
