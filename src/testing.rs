//! Scripted collaborators and fixtures for pipeline tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tempfile::TempDir;

use crate::artifacts::ArtifactStore;
use crate::errors::{OracleError, QualityError};
use crate::oracle::{CompletionRequest, OracleClient};
use crate::pipeline::{Collaborators, LaunchReport, Launcher, PipelineSettings, StagePipeline};
use crate::progress::{DbHandle, Task, TaskDb};
use crate::quality::{QualityGate, QualityVerdict};
use crate::stage::{Stage, StagePlan, StageSpec};
use crate::verifier::{Verifier, VerifyOutcome};

/// Oracle that replays scripted responses, then `fallback` forever.
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<String, OracleError>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(script: Vec<Result<String, OracleError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(text: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl OracleClient for ScriptedOracle {
    async fn complete(&self, request: CompletionRequest) -> Result<String, OracleError> {
        self.prompts.lock().unwrap().push(request.prompt);
        match self.script.lock().unwrap().pop_front() {
            Some(response) => response,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| OracleError::Response("script exhausted".into())),
        }
    }
}

/// Gate that replays verdicts, then accepts everything.
pub struct ScriptedGate {
    verdicts: Mutex<VecDeque<Result<QualityVerdict, QualityError>>>,
    calls: AtomicU32,
}

impl ScriptedGate {
    pub fn new(verdicts: Vec<Result<QualityVerdict, QualityError>>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn accepting() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QualityGate for ScriptedGate {
    async fn assess(&self, _candidate: &str, _intent: &str) -> Result<QualityVerdict, QualityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdicts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(QualityVerdict::good()))
    }
}

/// Verifier that replays outcomes, then `fallback` forever. Records the
/// stage of every call.
pub struct ScriptedVerifier {
    outcomes: Mutex<VecDeque<VerifyOutcome>>,
    fallback: VerifyOutcome,
    calls: Mutex<Vec<Stage>>,
}

impl ScriptedVerifier {
    pub fn passing() -> Self {
        Self::new(Vec::new())
    }

    pub fn new(outcomes: Vec<VerifyOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            fallback: VerifyOutcome::Success,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing(output: &str) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            fallback: VerifyOutcome::Failure {
                output: output.to_string(),
            },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Stage> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, stage: Stage) -> usize {
        self.calls().iter().filter(|s| **s == stage).count()
    }
}

pub fn failure(output: &str) -> VerifyOutcome {
    VerifyOutcome::Failure {
        output: output.to_string(),
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    async fn verify(&self, spec: &StageSpec, _root: &Path) -> VerifyOutcome {
        self.calls.lock().unwrap().push(spec.stage);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[derive(Default)]
pub struct RecordingLauncher {
    pub fail: bool,
    launches: Mutex<Vec<String>>,
}

impl RecordingLauncher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            launches: Mutex::new(Vec::new()),
        }
    }

    pub fn launches(&self) -> Vec<String> {
        self.launches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Launcher for RecordingLauncher {
    async fn launch(&self, slug: &str, _dir: &Path) -> Result<LaunchReport> {
        self.launches.lock().unwrap().push(slug.to_string());
        if self.fail {
            bail!("docker run failed: port already allocated");
        }
        Ok(LaunchReport {
            container_id: format!("{}-container", slug),
            ports: vec![("8001/tcp".into(), "49155".into())],
        })
    }
}

/// A scratch artifact root and in-memory progress store holding one
/// initialized task.
pub struct Fixture {
    pub root: TempDir,
    pub artifacts: Arc<ArtifactStore>,
    pub db: DbHandle,
    pub task: Task,
}

impl Fixture {
    pub fn new() -> Self {
        Self::at_stage(Stage::InterfaceDefinition)
    }

    pub fn at_stage(stage: Stage) -> Self {
        let root = tempfile::tempdir().unwrap();
        let artifacts = Arc::new(ArtifactStore::new(root.path().join("repos")));
        artifacts.initialize("echo").unwrap();
        let db = DbHandle::new(TaskDb::new_in_memory().unwrap());
        let task = {
            let conn = db.lock_sync().unwrap();
            let task = conn
                .create_task("echo", "echo", "echoes every message back to the caller", Stage::InterfaceDefinition)
                .unwrap();
            if stage != Stage::InterfaceDefinition {
                conn.advance(task.id, stage).unwrap();
            }
            conn.get_task(task.id).unwrap().unwrap()
        };
        Self {
            root,
            artifacts,
            db,
            task,
        }
    }

    pub fn pipeline(
        &self,
        plan: StagePlan,
        settings: PipelineSettings,
        oracle: Arc<dyn OracleClient>,
        gate: Arc<dyn QualityGate>,
        verifier: Arc<dyn Verifier>,
        launcher: Arc<dyn Launcher>,
    ) -> StagePipeline {
        StagePipeline::new(
            plan,
            settings,
            Collaborators {
                oracle,
                quality_gate: gate,
                verifier,
                progress: Arc::new(self.db.clone()),
                artifacts: self.artifacts.clone(),
                launcher,
            },
        )
    }

    pub fn reload(&self) -> Task {
        self.db
            .lock_sync()
            .unwrap()
            .get_task(self.task.id)
            .unwrap()
            .unwrap()
    }

    pub fn transitions(&self) -> Vec<(Stage, Stage)> {
        self.db
            .lock_sync()
            .unwrap()
            .transitions(self.task.id)
            .unwrap()
            .into_iter()
            .map(|t| (t.from_stage, t.to_stage))
            .collect()
    }
}

/// Settings for tests: no docs lookup, no real timeouts.
pub fn test_settings(error_budget: u32, diagnostic_lines: usize) -> PipelineSettings {
    PipelineSettings {
        error_budget,
        diagnostic_lines,
        max_tokens: 256,
        docs_command: None,
        docs_timeout: std::time::Duration::from_secs(5),
        launch_on_done: true,
    }
}
