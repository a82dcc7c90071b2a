//! Stage verification: run the stage's command against the artifact tree.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::process::run_shell;
use crate::stage::StageSpec;

/// Classified result of a verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Success,
    Failure { output: String },
}

impl VerifyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Checks a stage's artifact. Implementations never error: every problem,
/// including failing to start the command, is a `Failure`.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, spec: &StageSpec, root: &Path) -> VerifyOutcome;
}

/// Runs `spec.command` with `sh -c` in the task directory.
///
/// Stages that use the shared container builder first take a permit from
/// `container_slots`, which is shared by every task in the process.
pub struct CommandVerifier {
    container_slots: Arc<Semaphore>,
}

impl CommandVerifier {
    pub fn new(container_build_slots: usize) -> Self {
        Self {
            container_slots: Arc::new(Semaphore::new(container_build_slots.max(1))),
        }
    }
}

#[async_trait]
impl Verifier for CommandVerifier {
    async fn verify(&self, spec: &StageSpec, root: &Path) -> VerifyOutcome {
        let _permit = if spec.uses_container_builder {
            match self.container_slots.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    return VerifyOutcome::Failure {
                        output: format!("container builder unavailable: {}", e),
                    };
                }
            }
        } else {
            None
        };

        info!(stage = %spec.stage, command = %spec.command, "verifying");
        match run_shell(&spec.command, root, spec.timeout).await {
            Ok(out) if out.success() => VerifyOutcome::Success,
            Ok(out) => {
                warn!(stage = %spec.stage, exit_code = ?out.exit_code, timed_out = out.timed_out, "verification failed");
                VerifyOutcome::Failure { output: out.output }
            }
            Err(e) => {
                warn!(stage = %spec.stage, error = %e, "verification command could not start");
                VerifyOutcome::Failure {
                    output: format!("{:#}", e),
                }
            }
        }
    }
}
