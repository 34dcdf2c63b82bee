//! Crash-only task supervision.
//!
//! Every watcher runs as one OS thread executing its body in an unbounded
//! restart loop. A body that returns (error or not) or panics is logged and
//! immediately re-entered; no backoff, no retry cap. The process-wide
//! invariant lives in the durable ledger, so a restart can only ever skip
//! work, never repeat a reply.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;

use tracing::{error, info, warn};

use crate::error::{SupervisorError, SupervisorResult, WatchResult};

/// A named, restartable unit of work.
pub struct TaskSpec {
    name: String,
    body: Box<dyn Fn() -> WatchResult<()> + Send + 'static>,
}

impl TaskSpec {
    /// Define a task. The body is re-invoked from the top on every restart.
    pub fn new(
        name: impl Into<String>,
        body: impl Fn() -> WatchResult<()> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }
}

/// Owns the task roster and runs each task in its own supervised thread.
pub struct Supervisor {
    tasks: Vec<TaskSpec>,
    /// Restart limit per task; 0 means restart forever. Production always
    /// uses 0; the limit exists so tests can drive a task to completion.
    max_restarts: u64,
}

impl Supervisor {
    /// A supervisor that restarts every task forever.
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            max_restarts: 0,
        }
    }

    /// Cap restarts per task. Zero keeps the unbounded production behavior.
    pub fn with_max_restarts(mut self, max_restarts: u64) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    /// Add a task to the roster.
    pub fn register(&mut self, task: TaskSpec) {
        self.tasks.push(task);
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Spawn every task thread and block until all of them finish.
    ///
    /// With unbounded restarts this never returns except on spawn failure.
    pub fn run(self) -> SupervisorResult<()> {
        let max_restarts = self.max_restarts;
        let mut handles = Vec::with_capacity(self.tasks.len());

        for task in self.tasks {
            let name = task.name.clone();
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || supervise(task, max_restarts))
                .map_err(|e| SupervisorError::Spawn {
                    task: name,
                    source: e,
                })?;
            handles.push(handle);
        }

        for handle in handles {
            if handle.join().is_err() {
                // supervise() catches body panics; this would be a panic in
                // the supervision loop itself.
                error!("supervision thread panicked");
            }
        }
        Ok(())
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// The per-thread restart loop.
fn supervise(task: TaskSpec, max_restarts: u64) {
    let mut restarts: u64 = 0;
    loop {
        info!(task = %task.name, restarts, "starting task");
        match catch_unwind(AssertUnwindSafe(&task.body)) {
            Ok(Ok(())) => warn!(task = %task.name, "task returned without error"),
            Ok(Err(e)) => warn!(task = %task.name, error = %e, "task failed"),
            Err(panic) => {
                let message = panic_message(&panic);
                error!(task = %task.name, panic = %message, "task panicked");
            }
        }

        restarts += 1;
        if max_restarts != 0 && restarts >= max_restarts {
            info!(task = %task.name, restarts, "restart limit reached, task retired");
            return;
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
