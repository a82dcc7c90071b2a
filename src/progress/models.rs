use serde::{Deserialize, Serialize};

use crate::stage::Stage;

/// One long-running generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    /// Directory name under the artifact root, derived from `name`.
    pub slug: String,
    pub description: String,
    pub stage: Stage,
    pub last_error: Option<String>,
    pub created_at: String,
    pub modified_at: String,
}

impl Task {
    pub fn is_finished(&self) -> bool {
        self.stage.is_terminal()
    }
}

/// Intermediate row type for reading tasks from SQLite before the stage
/// column is parsed.
pub struct TaskRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub stage: String,
    pub last_error: Option<String>,
    pub created_at: String,
    pub modified_at: String,
}

impl TaskRow {
    pub fn into_task(self) -> anyhow::Result<Task> {
        Ok(Task {
            id: self.id,
            name: self.name,
            slug: self.slug,
            description: self.description,
            stage: self.stage.parse()?,
            last_error: self.last_error,
            created_at: self.created_at,
            modified_at: self.modified_at,
        })
    }
}

/// A durable stage advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub id: i64,
    pub task_id: i64,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub at: String,
}
