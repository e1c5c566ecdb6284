//! Task collection and concurrent execution
//!
//! Collecting a model produces a forest of task groups: every task lists
//! the tasks that must finish before it may start. Building the forest is
//! pure bookkeeping. Scheduling happens only in
//! [`TokioTaskCollector::start_and_wait`], which runs independent branches
//! concurrently under a concurrency limit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{Result, SchemaError};

/// Deferred unit of work
pub type Runnable = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Reference to a task created by a [`TaskCollector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(usize);

impl TaskHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Receives task groups during model collection
pub trait TaskCollector {
    /// Register `runnable` to run once every task in `children` completed
    /// successfully
    fn make_task_group(&mut self, name: String, runnable: Runnable, children: &[TaskHandle]) -> TaskHandle;
}

/// What happens to pending tasks after a task fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Skip the dependents of a failed task, keep running everything else
    #[default]
    BestEffort,
    /// Skip every task that has not started yet
    FailFast,
}

/// Final state of one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed(String),
    /// Not run because a prerequisite did not complete
    Skipped,
}

/// Result of one task in a [`TaskReport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub name: String,
    pub outcome: TaskOutcome,
}

/// Outcome of a [`TokioTaskCollector::start_and_wait`] run, in handle order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReport {
    pub results: Vec<TaskResult>,
}

impl TaskReport {
    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.with_outcome(|o| matches!(o, TaskOutcome::Completed))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.with_outcome(|o| matches!(o, TaskOutcome::Skipped))
    }

    /// Failed task names with their error messages
    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            TaskOutcome::Failed(msg) => Some((r.name.as_str(), msg.as_str())),
            _ => None,
        })
    }

    pub fn outcome(&self, handle: TaskHandle) -> Option<&TaskOutcome> {
        self.results.get(handle.0).map(|r| &r.outcome)
    }

    /// True if every task completed
    pub fn is_success(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.outcome == TaskOutcome::Completed)
    }

    /// `Err` naming the failed tasks, if any task did not complete
    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            return Ok(());
        }
        let failed: Vec<String> = self
            .failed()
            .map(|(name, msg)| format!("{}: {}", name, msg))
            .collect();
        let skipped = self.skipped().count();
        Err(SchemaError::task(format!(
            "{} task(s) failed, {} skipped: {}",
            failed.len(),
            skipped,
            failed.join("; ")
        )))
    }

    fn with_outcome<'a>(&'a self, pred: impl Fn(&TaskOutcome) -> bool + 'a) -> impl Iterator<Item = &'a str> {
        self.results
            .iter()
            .filter(move |r| pred(&r.outcome))
            .map(|r| r.name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Pending,
    Completed,
    Failed,
    Skipped,
}

struct TaskNode {
    name: String,
    children: Vec<TaskHandle>,
    runnable: Runnable,
}

/// Collector that runs the forest on the tokio runtime
pub struct TokioTaskCollector {
    nodes: Vec<TaskNode>,
    max_concurrency: usize,
    failure_policy: FailurePolicy,
}

impl TokioTaskCollector {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            nodes: Vec::new(),
            max_concurrency: max_concurrency.max(1),
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name(&self, handle: TaskHandle) -> Option<&str> {
        self.nodes.get(handle.0).map(|n| n.name.as_str())
    }

    pub fn children(&self, handle: TaskHandle) -> &[TaskHandle] {
        self.nodes
            .get(handle.0)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    /// Run every task, each one as soon as its children completed, and wait
    /// for all of them
    pub async fn start_and_wait(self) -> TaskReport {
        let total = self.nodes.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let abort = Arc::new(AtomicBool::new(false));
        let fail_fast = self.failure_policy == FailurePolicy::FailFast;

        info!(
            tasks = total,
            max_concurrency = self.max_concurrency,
            policy = ?self.failure_policy,
            "Starting tasks"
        );

        let mut receivers: Vec<watch::Receiver<TaskState>> = Vec::with_capacity(total);
        let mut join_set = JoinSet::new();
        let mut names = Vec::with_capacity(total);

        for (index, node) in self.nodes.into_iter().enumerate() {
            let (state_tx, state_rx) = watch::channel(TaskState::Pending);
            let children: Vec<watch::Receiver<TaskState>> = node
                .children
                .iter()
                .map(|child| receivers[child.0].clone())
                .collect();
            receivers.push(state_rx);
            names.push(node.name.clone());

            let semaphore = Arc::clone(&semaphore);
            let abort = Arc::clone(&abort);
            let name = node.name;
            let runnable = node.runnable;

            join_set.spawn(async move {
                let mut blocked = false;
                for mut child in children {
                    let state = match child.wait_for(|s| *s != TaskState::Pending).await {
                        Ok(state) => *state,
                        Err(_) => TaskState::Failed,
                    };
                    if state != TaskState::Completed {
                        blocked = true;
                    }
                }

                if blocked || (fail_fast && abort.load(Ordering::SeqCst)) {
                    debug!(task = %name, "Skipping task");
                    state_tx.send_replace(TaskState::Skipped);
                    return (index, TaskOutcome::Skipped);
                }

                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        state_tx.send_replace(TaskState::Failed);
                        return (index, TaskOutcome::Failed(e.to_string()));
                    }
                };
                if fail_fast && abort.load(Ordering::SeqCst) {
                    state_tx.send_replace(TaskState::Skipped);
                    return (index, TaskOutcome::Skipped);
                }

                debug!(task = %name, "Running task");
                match runnable().await {
                    Ok(()) => {
                        state_tx.send_replace(TaskState::Completed);
                        (index, TaskOutcome::Completed)
                    }
                    Err(e) => {
                        warn!(task = %name, error = %e, "Task failed");
                        if fail_fast {
                            abort.store(true, Ordering::SeqCst);
                        }
                        state_tx.send_replace(TaskState::Failed);
                        (index, TaskOutcome::Failed(e.to_string()))
                    }
                }
            });
        }

        let mut outcomes: Vec<Option<TaskOutcome>> = vec![None; total];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => warn!(error = %e, "Task panicked"),
            }
        }

        let report = TaskReport {
            results: names
                .into_iter()
                .zip(outcomes)
                .map(|(name, outcome)| TaskResult {
                    name,
                    outcome: outcome.unwrap_or_else(|| TaskOutcome::Failed("task panicked".to_string())),
                })
                .collect(),
        };

        info!(
            completed = report.completed().count(),
            failed = report.failed().count(),
            skipped = report.skipped().count(),
            "Tasks finished"
        );
        report
    }
}

impl TaskCollector for TokioTaskCollector {
    fn make_task_group(&mut self, name: String, runnable: Runnable, children: &[TaskHandle]) -> TaskHandle {
        let handle = TaskHandle(self.nodes.len());
        let mut valid = Vec::with_capacity(children.len());
        for child in children {
            if child.0 < handle.0 {
                if !valid.contains(child) {
                    valid.push(*child);
                }
            } else {
                warn!(task = %name, child = child.0, "Ignoring unknown child task");
            }
        }
        self.nodes.push(TaskNode {
            name,
            children: valid,
            runnable,
        });
        handle
    }
}

impl std::fmt::Debug for TokioTaskCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioTaskCollector")
            .field("tasks", &self.nodes.len())
            .field("max_concurrency", &self.max_concurrency)
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}
