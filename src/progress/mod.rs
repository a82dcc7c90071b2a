//! Durable task progress.
//!
//! `TaskDb` is the SQLite schema and queries; `ProgressStore` is the narrow
//! view the pipeline depends on.

pub mod db;
pub mod models;

use anyhow::Result;
use async_trait::async_trait;

pub use db::{DbHandle, TaskDb};
pub use models::{StageTransition, Task};

use crate::stage::Stage;

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn load(&self, id: i64) -> Result<Option<Task>>;

    /// Durably move `id` to `stage`. Must not return before the write is
    /// committed.
    async fn advance(&self, id: i64, stage: Stage) -> Result<()>;

    async fn record_failure(&self, id: i64, reason: &str) -> Result<()>;

    async fn clear_failure(&self, id: i64) -> Result<()>;

    /// Tasks not yet in the terminal stage.
    async fn unfinished(&self) -> Result<Vec<Task>>;
}

#[async_trait]
impl ProgressStore for DbHandle {
    async fn load(&self, id: i64) -> Result<Option<Task>> {
        self.call(move |db| db.get_task(id)).await
    }

    async fn advance(&self, id: i64, stage: Stage) -> Result<()> {
        self.call(move |db| db.advance(id, stage).map(|_| ())).await
    }

    async fn record_failure(&self, id: i64, reason: &str) -> Result<()> {
        let reason = reason.to_string();
        self.call(move |db| db.record_failure(id, &reason)).await
    }

    async fn clear_failure(&self, id: i64) -> Result<()> {
        self.call(move |db| db.clear_failure(id)).await
    }

    async fn unfinished(&self) -> Result<Vec<Task>> {
        self.call(|db| db.unfinished_tasks()).await
    }
}
