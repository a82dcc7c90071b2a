use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params};

use super::models::*;
use crate::stage::Stage;

/// Async-safe handle to the task database.
///
/// Wraps `TaskDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<TaskDb>>,
}

impl DbHandle {
    pub fn new(db: TaskDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&TaskDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. For startup, CLI reads and
    /// tests; never from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, TaskDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

pub struct TaskDb {
    conn: Connection,
}

const TASK_COLUMNS: &str =
    "id, name, slug, description, stage, last_error, created_at, modified_at";

fn read_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
        stage: row.get(4)?,
        last_error: row.get(5)?,
        created_at: row.get(6)?,
        modified_at: row.get(7)?,
    })
}

impl TaskDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = FULL;")
            .context("Failed to configure journal")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    description TEXT NOT NULL DEFAULT '',
                    stage TEXT NOT NULL,
                    last_error TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    modified_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS stage_transitions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                    from_stage TEXT NOT NULL,
                    to_stage TEXT NOT NULL,
                    at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_tasks_stage ON tasks(stage);
                CREATE INDEX IF NOT EXISTS idx_transitions_task ON stage_transitions(task_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Task CRUD ─────────────────────────────────────────────────────

    pub fn create_task(
        &self,
        name: &str,
        slug: &str,
        description: &str,
        stage: Stage,
    ) -> Result<Task> {
        self.conn
            .execute(
                "INSERT INTO tasks (name, slug, description, stage) VALUES (?1, ?2, ?3, ?4)",
                params![name, slug, description, stage.as_str()],
            )
            .with_context(|| format!("Failed to insert task '{}'", slug))?;
        let id = self.conn.last_insert_rowid();
        self.get_task(id)?.context("Task not found after insert")
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS))
            .context("Failed to prepare get_task")?;
        let mut rows = stmt
            .query_map(params![id], read_task_row)
            .context("Failed to query task")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read task row")?.into_task()?)),
            None => Ok(None),
        }
    }

    pub fn get_task_by_slug(&self, slug: &str) -> Result<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM tasks WHERE slug = ?1", TASK_COLUMNS))
            .context("Failed to prepare get_task_by_slug")?;
        let mut rows = stmt
            .query_map(params![slug], read_task_row)
            .context("Failed to query task")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read task row")?.into_task()?)),
            None => Ok(None),
        }
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        self.query_tasks(&format!("SELECT {} FROM tasks ORDER BY id", TASK_COLUMNS))
    }

    /// Every task whose stage is not terminal, oldest first.
    pub fn unfinished_tasks(&self) -> Result<Vec<Task>> {
        self.query_tasks(&format!(
            "SELECT {} FROM tasks WHERE stage != '{}' ORDER BY id",
            TASK_COLUMNS,
            Stage::Done.as_str()
        ))
    }

    fn query_tasks(&self, sql: &str) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare task query")?;
        let rows = stmt
            .query_map([], read_task_row)
            .context("Failed to query tasks")?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.context("Failed to read task row")?.into_task()?);
        }
        Ok(tasks)
    }

    // ── Stage progress ────────────────────────────────────────────────

    /// Move a task to `to`, recording the transition. Runs in one
    /// transaction. Regressions are rejected; advancing to the current
    /// stage is a no-op and returns `false`.
    pub fn advance(&self, id: i64, to: Stage) -> Result<bool> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin advance transaction")?;

        let current: String = tx
            .query_row("SELECT stage FROM tasks WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .with_context(|| format!("Task {} not found", id))?;
        let from: Stage = current.parse()?;

        if to < from {
            bail!("Refusing to move task {} back from {} to {}", id, from, to);
        }
        if to == from {
            return Ok(false);
        }

        tx.execute(
            "UPDATE tasks SET stage = ?1, modified_at = datetime('now') WHERE id = ?2",
            params![to.as_str(), id],
        )
        .context("Failed to update task stage")?;
        tx.execute(
            "INSERT INTO stage_transitions (task_id, from_stage, to_stage) VALUES (?1, ?2, ?3)",
            params![id, from.as_str(), to.as_str()],
        )
        .context("Failed to record stage transition")?;
        tx.commit().context("Failed to commit stage advance")?;
        Ok(true)
    }

    pub fn record_failure(&self, id: i64, reason: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE tasks SET last_error = ?1, modified_at = datetime('now') WHERE id = ?2",
                params![reason, id],
            )
            .context("Failed to record task failure")?;
        if changed == 0 {
            bail!("Task {} not found", id);
        }
        Ok(())
    }

    pub fn clear_failure(&self, id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE tasks SET last_error = NULL WHERE id = ?1",
                params![id],
            )
            .context("Failed to clear task failure")?;
        Ok(())
    }

    pub fn transitions(&self, task_id: i64) -> Result<Vec<StageTransition>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, task_id, from_stage, to_stage, at FROM stage_transitions
                 WHERE task_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare transitions")?;
        let rows = stmt
            .query_map(params![task_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .context("Failed to query transitions")?;
        let mut transitions = Vec::new();
        for row in rows {
            let (id, task_id, from, to, at) = row.context("Failed to read transition row")?;
            transitions.push(StageTransition {
                id,
                task_id,
                from_stage: from.parse()?,
                to_stage: to.parse()?,
                at,
            });
        }
        Ok(transitions)
    }
}
