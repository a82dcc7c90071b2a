//! Artifact store: one versioned directory per task.
//!
//! Each task directory under the store root is its own git repository.
//! Writes replace file contents exactly; `commit` records the tree and is a
//! no-op when nothing changed.

pub mod git;
pub mod scaffold;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{debug, info};

pub use git::{ArtifactRepo, CommitEntry};

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_.\-]").expect("literal pattern compiles"));

/// Turn a free-text task name into a directory-safe slug: trimmed, spaces
/// become `_`, anything outside `[a-z0-9_.-]` is removed, lowercased.
pub fn sanitize_name(name: &str) -> String {
    let spaced = name.trim().replace(' ', "_");
    UNSAFE_CHARS.replace_all(&spaced, "").to_lowercase()
}

/// Reject slugs that would escape or alias the store root.
pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.chars().all(|c| c == '.') {
        bail!("Task name '{}' does not produce a usable directory name", slug);
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn task_dir(&self, slug: &str) -> PathBuf {
        self.root.join(slug)
    }

    pub fn exists(&self, slug: &str) -> bool {
        self.task_dir(slug).is_dir()
    }

    /// Create the task directory, write the starter files and make the
    /// initial commit. Fails if the directory already exists.
    pub fn initialize(&self, slug: &str) -> Result<PathBuf> {
        validate_slug(slug)?;
        let dir = self.task_dir(slug);
        if dir.exists() {
            bail!("Task directory {} already exists", dir.display());
        }

        for sub in scaffold::SCAFFOLD_DIRS {
            fs::create_dir_all(dir.join(sub))
                .with_context(|| format!("Failed to create {}/{}", dir.display(), sub))?;
        }
        for file in scaffold::scaffold_files(slug) {
            let path = dir.join(&file.path);
            fs::write(&path, &file.contents)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        let repo = ArtifactRepo::init(&dir)?;
        repo.commit_all("initial commit")?;
        info!(slug, dir = %dir.display(), "task directory initialized");
        Ok(dir)
    }

    /// Write `content` to `rel` inside the task directory, replacing any
    /// previous contents. Executable artifacts get mode 0755.
    pub fn write_artifact(
        &self,
        slug: &str,
        rel: &Path,
        content: &str,
        executable: bool,
    ) -> Result<PathBuf> {
        let dir = self.task_dir(slug);
        if !dir.is_dir() {
            bail!("Task directory {} does not exist", dir.display());
        }
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;

        if executable {
            set_executable(&path)?;
        }
        debug!(path = %path.display(), bytes = content.len(), "artifact written");
        Ok(path)
    }

    pub fn read_artifact(&self, slug: &str, rel: &Path) -> Result<String> {
        let path = self.task_dir(slug).join(rel);
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Read an artifact if it exists, `None` otherwise.
    pub fn try_read_artifact(&self, slug: &str, rel: &Path) -> Option<String> {
        fs::read_to_string(self.task_dir(slug).join(rel)).ok()
    }

    /// Commit the task tree. `None` when nothing changed since HEAD.
    pub fn commit(&self, slug: &str, message: &str) -> Result<Option<String>> {
        let repo = ArtifactRepo::open(&self.task_dir(slug))?;
        let sha = repo.commit_all(message)?;
        match &sha {
            Some(sha) => debug!(slug, sha = %sha, message, "committed"),
            None => debug!(slug, "nothing to commit"),
        }
        Ok(sha)
    }

    pub fn history(&self, slug: &str, limit: usize) -> Result<Vec<CommitEntry>> {
        ArtifactRepo::open(&self.task_dir(slug))?.history(limit)
    }

    /// Delete a task directory and everything in it. Missing is not an error.
    pub fn remove(&self, slug: &str) -> Result<()> {
        validate_slug(slug)?;
        let dir = self.task_dir(slug);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to remove {}", dir.display()))?;
            info!(slug, dir = %dir.display(), "task directory removed");
        }
        Ok(())
    }

    /// Run filesystem and git work on the blocking pool. All data passed
    /// into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ArtifactStore) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .context("Artifact task panicked")?
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Failed to chmod {}", path.display()))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  Echo Service "), "echo_service");
        assert_eq!(sanitize_name("My/App: v1.2!"), "myapp_v1.2");
        assert_eq!(sanitize_name("weather-API"), "weather-api");
        assert_eq!(sanitize_name("../../etc"), "....etc");
    }

    #[test]
    fn test_validate_slug() {
        assert!(validate_slug("echo").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("..").is_err());
        assert!(validate_slug(".").is_err());
    }

    #[test]
    fn test_initialize_scaffolds_and_commits() {
        let root = tempdir().unwrap();
        let store = ArtifactStore::new(root.path());
        let dir = store.initialize("echo").unwrap();

        assert!(dir.join("protobufs/echo.proto").is_file());
        assert!(dir.join("server/main.go").is_file());
        assert!(dir.join("client/main.go").is_file());
        assert!(dir.join("docker-compose.yaml").is_file());
        let history = store.history("echo", 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "initial commit");
    }

    #[test]
    fn test_initialize_twice_fails() {
        let root = tempdir().unwrap();
        let store = ArtifactStore::new(root.path());
        store.initialize("echo").unwrap();
        assert!(store.initialize("echo").is_err());
    }

    #[test]
    fn test_write_then_read_is_byte_identical() {
        let root = tempdir().unwrap();
        let store = ArtifactStore::new(root.path());
        store.initialize("echo").unwrap();

        let content = "package main\n\n// naïve ünïcode ✓\nfunc main() {}\n";
        store
            .write_artifact("echo", Path::new("server/main.go"), content, false)
            .unwrap();
        assert_eq!(
            store
                .read_artifact("echo", Path::new("server/main.go"))
                .unwrap(),
            content
        );
    }

    #[test]
    fn test_rewrite_same_artifact_then_commit_is_noop() {
        let root = tempdir().unwrap();
        let store = ArtifactStore::new(root.path());
        store.initialize("echo").unwrap();

        store
            .write_artifact("echo", Path::new("Dockerfile"), "FROM scratch\n", false)
            .unwrap();
        assert!(store.commit("echo", "container_build update").unwrap().is_some());
        store
            .write_artifact("echo", Path::new("Dockerfile"), "FROM scratch\n", false)
            .unwrap();
        assert!(store.commit("echo", "container_build update").unwrap().is_none());
        assert_eq!(store.history("echo", 10).unwrap().len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_artifact_mode() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempdir().unwrap();
        let store = ArtifactStore::new(root.path());
        store.initialize("echo").unwrap();
        let path = store
            .write_artifact(
                "echo",
                Path::new("example-client-call.sh"),
                "#!/bin/sh\ncurl localhost\n",
                true,
            )
            .unwrap();
        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_write_into_missing_task_dir_fails() {
        let root = tempdir().unwrap();
        let store = ArtifactStore::new(root.path());
        assert!(
            store
                .write_artifact("ghost", Path::new("Dockerfile"), "FROM scratch\n", false)
                .is_err()
        );
        assert!(!store.exists("ghost"));
    }

    #[test]
    fn test_remove_deletes_tree() {
        let root = tempdir().unwrap();
        let store = ArtifactStore::new(root.path());
        store.initialize("echo").unwrap();
        store.remove("echo").unwrap();
        assert!(!store.exists("echo"));
        store.remove("echo").unwrap();
        assert!(store.initialize("echo").is_ok());
    }

    #[tokio::test]
    async fn test_commit_runs_on_blocking_pool() {
        let root = tempdir().unwrap();
        let store = ArtifactStore::new(root.path());
        store.initialize("echo").unwrap();
        store
            .write_artifact("echo", Path::new("Dockerfile"), "FROM scratch\n", false)
            .unwrap();

        let sha = store
            .call(|s| s.commit("echo", "container_build update"))
            .await
            .unwrap();
        assert!(sha.is_some());
        assert_eq!(store.history("echo", 10).unwrap().len(), 2);
    }
}
