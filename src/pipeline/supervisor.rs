//! Runs task pipelines concurrently, at most one run per task.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::pipeline::runner::StagePipeline;
use crate::progress::{ProgressStore, Task};

pub struct Supervisor {
    pipeline: Arc<StagePipeline>,
    active: Arc<Mutex<HashSet<i64>>>,
}

/// Removes a task id from the active set when its run ends, including
/// when the run panics.
struct ActiveGuard {
    id: i64,
    active: Arc<Mutex<HashSet<i64>>>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.id);
    }
}

fn lock(active: &Mutex<HashSet<i64>>) -> MutexGuard<'_, HashSet<i64>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Supervisor {
    pub fn new(pipeline: Arc<StagePipeline>) -> Self {
        Self {
            pipeline,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_active(&self, id: i64) -> bool {
        lock(&self.active).contains(&id)
    }

    /// Start `task` on `set` unless it is already running. Returns whether
    /// a run was started.
    pub fn spawn(&self, task: Task, set: &mut JoinSet<()>) -> bool {
        if !lock(&self.active).insert(task.id) {
            warn!(task_id = task.id, "task already running, not starting it again");
            return false;
        }
        let guard = ActiveGuard {
            id: task.id,
            active: self.active.clone(),
        };
        let pipeline = self.pipeline.clone();
        set.spawn(async move {
            let _guard = guard;
            pipeline.run(&task).await;
        });
        true
    }

    /// Run `task` to completion in the current task.
    pub async fn run_one(&self, task: Task) -> bool {
        let mut set = JoinSet::new();
        let started = self.spawn(task, &mut set);
        drain(&mut set).await;
        started
    }

    /// Start every unfinished task once and wait for all of them.
    /// Returns the number of runs started.
    pub async fn resume_all(&self, progress: &dyn ProgressStore) -> Result<usize> {
        let tasks = progress.unfinished().await?;
        info!(count = tasks.len(), "resuming unfinished tasks");

        let mut set = JoinSet::new();
        let mut started = 0;
        for task in tasks {
            if self.spawn(task, &mut set) {
                started += 1;
            }
        }
        drain(&mut set).await;
        Ok(started)
    }
}

async fn drain(set: &mut JoinSet<()>) {
    while let Some(result) = set.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "task worker panicked");
        }
    }
}
