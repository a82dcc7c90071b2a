use anyhow::{Context, Result};
use git2::{Repository, Signature};
use std::path::Path;

/// One entry of a task's commit history, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    pub sha: String,
    pub message: String,
}

/// Version history of a single task directory.
pub struct ArtifactRepo {
    repo: Repository,
}

impl ArtifactRepo {
    pub fn open(dir: &Path) -> Result<Self> {
        let repo = Repository::open(dir)
            .with_context(|| format!("Failed to open git repository at {}", dir.display()))?;
        Ok(Self { repo })
    }

    pub fn init(dir: &Path) -> Result<Self> {
        let repo = Repository::init(dir)
            .with_context(|| format!("Failed to init git repository at {}", dir.display()))?;
        Ok(Self { repo })
    }

    /// Stage the whole working tree and commit it.
    ///
    /// Returns `None` without creating a commit when the tree matches HEAD.
    pub fn commit_all(&self, message: &str) -> Result<Option<String>> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = Signature::now("garden", "garden@localhost")?;

        // Handle unborn branch (new repo with no commits yet)
        let commit_id = match self.head_commit() {
            Some(parent) => {
                if parent.tree_id() == tree_id {
                    return Ok(None);
                }
                self.repo
                    .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?
            }
            None => self
                .repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[])?,
        };

        Ok(Some(commit_id.to_string()))
    }

    fn head_commit(&self) -> Option<git2::Commit<'_>> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
    }

    /// Current HEAD SHA (`None` before the first commit).
    pub fn head_sha(&self) -> Option<String> {
        self.head_commit().map(|c| c.id().to_string())
    }

    /// Walk first parents from HEAD, newest first.
    pub fn history(&self, limit: usize) -> Result<Vec<CommitEntry>> {
        let mut entries = Vec::new();
        let mut next = self.head_commit();
        while let Some(commit) = next {
            if entries.len() >= limit {
                break;
            }
            entries.push(CommitEntry {
                sha: commit.id().to_string(),
                message: commit.message().unwrap_or_default().trim().to_string(),
            });
            next = commit.parent(0).ok();
        }
        Ok(entries)
    }
}
