//! Registering a new task: its artifact tree and its progress row.

use anyhow::{Context, Result};
use tracing::warn;

use crate::artifacts::{ArtifactStore, sanitize_name, validate_slug};
use crate::progress::{DbHandle, Task};
use crate::stage::Stage;

/// Scaffold the tree for `name` and record the task at `stage`.
///
/// A tree exists only for a recorded task: when the row cannot be inserted
/// the freshly scaffolded directory is removed again.
pub async fn register_task(
    db: &DbHandle,
    artifacts: &ArtifactStore,
    name: &str,
    description: &str,
    stage: Stage,
) -> Result<Task> {
    let slug = sanitize_name(name);
    validate_slug(&slug)?;

    let scaffold_slug = slug.clone();
    artifacts
        .call(move |store| store.initialize(&scaffold_slug))
        .await?;

    let (name, row_slug, description) = (
        name.trim().to_string(),
        slug.clone(),
        description.trim().to_string(),
    );
    let inserted = db
        .call(move |db| db.create_task(&name, &row_slug, &description, stage))
        .await;

    match inserted {
        Ok(task) => Ok(task),
        Err(e) => {
            let cleanup_slug = slug.clone();
            if let Err(cleanup) = artifacts
                .call(move |store| store.remove(&cleanup_slug))
                .await
            {
                warn!(slug = %slug, error = %cleanup, "failed to remove orphaned task directory");
            }
            Err(e).context("Failed to record the new task")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::TaskDb;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_register_creates_tree_and_row() {
        let root = tempdir().unwrap();
        let artifacts = ArtifactStore::new(root.path());
        let db = DbHandle::new(TaskDb::new_in_memory().unwrap());

        let task = register_task(
            &db,
            &artifacts,
            " Echo Service ",
            "echoes messages ",
            Stage::InterfaceDefinition,
        )
        .await
        .unwrap();

        assert_eq!(task.slug, "echo_service");
        assert_eq!(task.name, "Echo Service");
        assert_eq!(task.description, "echoes messages");
        assert!(artifacts.exists("echo_service"));
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_no_tree() {
        let root = tempdir().unwrap();
        let artifacts = ArtifactStore::new(root.path());
        let db = DbHandle::new(TaskDb::new_in_memory().unwrap());
        // A row whose directory is gone: the tree scaffolds, the insert hits
        // the unique slug.
        db.lock_sync()
            .unwrap()
            .create_task("echo", "echo", "older echo", Stage::InterfaceDefinition)
            .unwrap();

        let result =
            register_task(&db, &artifacts, "echo", "echoes", Stage::InterfaceDefinition).await;

        assert!(result.is_err());
        assert!(!artifacts.exists("echo"));
        assert_eq!(db.lock_sync().unwrap().list_tasks().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_tree_is_refused_untouched() {
        let root = tempdir().unwrap();
        let artifacts = ArtifactStore::new(root.path());
        let db = DbHandle::new(TaskDb::new_in_memory().unwrap());
        artifacts.initialize("echo").unwrap();

        let result =
            register_task(&db, &artifacts, "echo", "echoes", Stage::InterfaceDefinition).await;

        assert!(result.is_err());
        assert!(artifacts.exists("echo"));
        assert!(db.lock_sync().unwrap().list_tasks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unusable_name_is_refused() {
        let root = tempdir().unwrap();
        let artifacts = ArtifactStore::new(root.path());
        let db = DbHandle::new(TaskDb::new_in_memory().unwrap());

        assert!(
            register_task(&db, &artifacts, "..", "x", Stage::InterfaceDefinition)
                .await
                .is_err()
        );
        assert!(db.lock_sync().unwrap().list_tasks().unwrap().is_empty());
    }
}
