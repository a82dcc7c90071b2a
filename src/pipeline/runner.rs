//! The generate, build, verify, retry loop for one task.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::artifacts::ArtifactStore;
use crate::errors::{AttemptFailure, PipelineError, QualityError};
use crate::garden_config::{OracleSection, PipelineSection};
use crate::oracle::{CompletionRequest, OracleClient};
use crate::pipeline::budget::ErrorBudget;
use crate::pipeline::context::Context;
use crate::pipeline::definitions::{is_noisy_import, non_std_imports, type_definitions};
use crate::pipeline::extract::extract_code;
use crate::pipeline::launch::{LaunchReport, Launcher};
use crate::pipeline::prompts;
use crate::process::run_shell;
use crate::progress::{ProgressStore, Task};
use crate::quality::QualityGate;
use crate::stage::{Stage, StagePlan, StageSpec};
use crate::verifier::{Verifier, VerifyOutcome};

/// Everything the pipeline talks to, supplied at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub oracle: Arc<dyn OracleClient>,
    pub quality_gate: Arc<dyn QualityGate>,
    pub verifier: Arc<dyn Verifier>,
    pub progress: Arc<dyn ProgressStore>,
    pub artifacts: Arc<ArtifactStore>,
    pub launcher: Arc<dyn Launcher>,
}

/// Retry and prompt policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub error_budget: u32,
    pub diagnostic_lines: usize,
    pub max_tokens: u32,
    /// Documentation command with an `{import}` placeholder.
    pub docs_command: Option<String>,
    pub docs_timeout: Duration,
    pub launch_on_done: bool,
}

impl PipelineSettings {
    pub fn from_sections(pipeline: &PipelineSection, oracle: &OracleSection) -> Self {
        let docs_command = Some(pipeline.docs_command.trim().to_string()).filter(|c| !c.is_empty());
        Self {
            error_budget: pipeline.error_budget,
            diagnostic_lines: pipeline.diagnostic_lines,
            max_tokens: oracle.max_tokens,
            docs_command,
            docs_timeout: Duration::from_secs(pipeline.verify_timeout_secs),
            launch_on_done: pipeline.launch_on_done,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_sections(&PipelineSection::default(), &OracleSection::default())
    }
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub final_stage: Stage,
    pub oracle_calls: u32,
    pub errors: u32,
    pub launch: Option<LaunchReport>,
}

enum AttemptOutcome {
    Accepted {
        code: String,
    },
    Rejected {
        code: Option<String>,
        failure: AttemptFailure,
    },
}

/// Per-stage state that survives retries within the stage.
#[derive(Default)]
struct StageState {
    attempts: u32,
    docs_added: bool,
}

pub struct StagePipeline {
    plan: StagePlan,
    settings: PipelineSettings,
    deps: Collaborators,
}

impl StagePipeline {
    pub fn new(plan: StagePlan, settings: PipelineSettings, deps: Collaborators) -> Self {
        Self {
            plan,
            settings,
            deps,
        }
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    /// Drive `task` from its persisted stage to done or to a fatal abort.
    ///
    /// Nothing is returned; outcomes are visible through the progress
    /// store, the artifact history and the log.
    pub async fn run(&self, task: &Task) {
        let span = info_span!("task", task_id = task.id, slug = %task.slug);
        async {
            match self.drive(task).await {
                Ok(summary) => info!(
                    stage = %summary.final_stage,
                    oracle_calls = summary.oracle_calls,
                    errors = summary.errors,
                    "task finished"
                ),
                Err(e) => {
                    error!(error = %e, "task aborted");
                    if let Err(record_err) = self
                        .deps
                        .progress
                        .record_failure(task.id, &e.to_string())
                        .await
                    {
                        error!(error = %record_err, "failed to record task failure");
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// The state machine behind `run`.
    pub async fn drive(&self, task: &Task) -> Result<RunSummary, PipelineError> {
        let progress = &self.deps.progress;
        let stored = progress
            .load(task.id)
            .await
            .map_err(PipelineError::Progress)?
            .ok_or(PipelineError::UnknownTask { id: task.id })?;
        progress
            .clear_failure(task.id)
            .await
            .map_err(PipelineError::Progress)?;

        let mut summary = RunSummary {
            final_stage: stored.stage,
            oracle_calls: 0,
            errors: 0,
            launch: None,
        };
        if stored.stage.is_terminal() {
            debug!("task already done");
            return Ok(summary);
        }

        let sequence = self.plan.sequence();
        let mut stage = stored.stage;
        if !sequence.contains(stage) {
            let next = sequence.next_after(stage);
            info!(from = %stage, to = %next, "stage not configured, skipping ahead");
            progress
                .advance(task.id, next)
                .await
                .map_err(PipelineError::Progress)?;
            stage = next;
        }

        let mut ctx = Context::new();
        let mut budget = ErrorBudget::new(self.settings.error_budget);
        if stage != sequence.first() && !stage.is_terminal() {
            self.restore_prior(task, stage, &mut ctx).await;
        }

        while let Some(spec) = self.plan.resolve(stage, &task.slug) {
            let mut state = StageState::default();
            ctx.push_instructions(self.stage_instructions(task, &spec).await);
            info!(stage = %stage, "stage started");

            loop {
                self.ensure_task_dir(task)?;
                state.attempts += 1;

                let request =
                    CompletionRequest::new(ctx.prompt_for(spec.content_tag), self.settings.max_tokens);
                let raw = self.deps.oracle.complete(request).await?;
                summary.oracle_calls += 1;

                match self.attempt(task, &spec).run(&raw).await? {
                    AttemptOutcome::Accepted { code } => {
                        let (slug, message) = (task.slug.clone(), format!("{} update", stage));
                        self.deps
                            .artifacts
                            .call(move |store| store.commit(&slug, &message))
                            .await
                            .map_err(PipelineError::Artifact)?;
                        ctx.push_success(spec.content_tag, code);

                        let next = sequence.next_after(stage);
                        progress
                            .advance(task.id, next)
                            .await
                            .map_err(PipelineError::Progress)?;
                        info!(stage = %stage, next = %next, attempts = state.attempts, "stage passed");
                        stage = next;
                        break;
                    }
                    AttemptOutcome::Rejected { code, failure } => {
                        let errors = budget.record();
                        summary.errors = budget.errors();
                        warn!(
                            stage = %stage,
                            attempt = state.attempts,
                            errors = budget.errors(),
                            budget = budget.budget(),
                            kind = failure.kind(),
                            "attempt failed"
                        );
                        errors?;

                        ctx.push_failure(
                            spec.content_tag,
                            code,
                            failure.diagnostic(self.settings.diagnostic_lines),
                        );
                        if spec.stage == Stage::ServerImplementation && !state.docs_added {
                            state.docs_added = true;
                            if let Some(docs) = self.lookup_docs(task, &spec).await {
                                ctx.push_reference(docs);
                            }
                        }
                    }
                }
            }
        }

        summary.final_stage = stage;
        if self.settings.launch_on_done {
            summary.launch = self.launch(task).await;
        }
        Ok(summary)
    }

    fn attempt<'a>(&'a self, task: &'a Task, spec: &'a StageSpec) -> Attempt<'a> {
        Attempt {
            pipeline: self,
            task,
            spec,
        }
    }

    fn task_dir(&self, task: &Task) -> PathBuf {
        self.deps.artifacts.task_dir(&task.slug)
    }

    fn ensure_task_dir(&self, task: &Task) -> Result<(), PipelineError> {
        let dir = self.task_dir(task);
        if !dir.is_dir() {
            return Err(PipelineError::TaskDirectoryMissing { path: dir });
        }
        Ok(())
    }

    /// Instructions for the first entry into a stage. Reads generated
    /// sources from the tree, so it runs once per stage, not per attempt.
    async fn stage_instructions(&self, task: &Task, spec: &StageSpec) -> String {
        match spec.stage {
            Stage::InterfaceDefinition => {
                prompts::interface_definition(&task.slug, &task.description)
            }
            Stage::ServerImplementation => {
                let generated = |suffix: &str| {
                    PathBuf::from("protobufs").join(format!("{}{}", task.slug, suffix))
                };
                let messages = self
                    .read_optional(task, generated(".pb.go"))
                    .await
                    .map(|src| type_definitions(&src))
                    .unwrap_or_default();
                let services = self
                    .read_optional(task, generated("_grpc.pb.go"))
                    .await
                    .map(|src| type_definitions(&src))
                    .unwrap_or_default();
                debug!(
                    messages = messages.len(),
                    services = services.len(),
                    "extracted generated type definitions"
                );
                prompts::server_implementation(&messages, &services)
            }
            Stage::ContainerBuild => prompts::container_build(),
            Stage::UsageExample => {
                let server = match Stage::ServerImplementation.artifact_path(&task.slug) {
                    Some(rel) => self.read_optional(task, rel).await,
                    None => None,
                };
                prompts::usage_example(&task.slug, server.as_deref())
            }
            Stage::Done => String::new(),
        }
    }

    /// Rebuild context for a task resumed mid-pipeline from the artifacts
    /// earlier stages committed.
    async fn restore_prior(&self, task: &Task, stage: Stage, ctx: &mut Context) {
        ctx.push_instructions(prompts::resumed(&task.slug, &task.description, stage));
        for earlier in self.plan.sequence().stages() {
            if *earlier >= stage {
                break;
            }
            let (Some(rel), Some(tag)) = (earlier.artifact_path(&task.slug), earlier.content_tag())
            else {
                continue;
            };
            if let Some(code) = self.read_optional(task, rel).await {
                ctx.push_prior(tag, code);
            }
        }
    }

    /// Look up documentation for the third-party packages the server
    /// imports. Returns `None` unless at least one lookup ran and all
    /// succeeded.
    async fn lookup_docs(&self, task: &Task, spec: &StageSpec) -> Option<String> {
        let template = self.settings.docs_command.as_deref()?;
        let source = self.read_optional(task, spec.artifact.clone()).await?;
        let imports: Vec<String> = non_std_imports(&source)
            .into_iter()
            .filter(|i| !is_noisy_import(i))
            .collect();
        if imports.is_empty() {
            return None;
        }

        let dir = self.task_dir(task);
        let mut docs = String::new();
        for import in &imports {
            let command = template.replace("{import}", import);
            match run_shell(&command, &dir, self.settings.docs_timeout).await {
                Ok(out) if out.success() => docs.push_str(&out.output),
                Ok(out) => {
                    warn!(import = %import, exit_code = ?out.exit_code, "documentation lookup failed");
                    return None;
                }
                Err(e) => {
                    warn!(import = %import, error = %e, "documentation lookup failed");
                    return None;
                }
            }
        }
        info!(imports = imports.len(), "added package documentation to context");
        Some(docs)
    }

    /// Read an artifact on the blocking pool; `None` when it is absent.
    async fn read_optional(&self, task: &Task, rel: PathBuf) -> Option<String> {
        let slug = task.slug.clone();
        match self
            .deps
            .artifacts
            .call(move |store| Ok(store.try_read_artifact(&slug, &rel)))
            .await
        {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "artifact read failed");
                None
            }
        }
    }

    async fn launch(&self, task: &Task) -> Option<LaunchReport> {
        match self
            .deps
            .launcher
            .launch(&task.slug, &self.task_dir(task))
            .await
        {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "container launch failed");
                let reason = format!("Launch failed: {:#}", e);
                if let Err(record_err) = self.deps.progress.record_failure(task.id, &reason).await {
                    error!(error = %record_err, "failed to record launch failure");
                }
                None
            }
        }
    }
}

/// One oracle output taken through extract, write, gate and verify.
struct Attempt<'a> {
    pipeline: &'a StagePipeline,
    task: &'a Task,
    spec: &'a StageSpec,
}

impl Attempt<'_> {
    async fn run(&self, raw: &str) -> Result<AttemptOutcome, PipelineError> {
        let deps = &self.pipeline.deps;
        let spec = self.spec;

        let code = match extract_code(raw, spec.content_tag) {
            Ok(code) => code,
            Err(failure) => {
                return Ok(AttemptOutcome::Rejected {
                    code: None,
                    failure,
                });
            }
        };

        let (slug, rel, content, executable) = (
            self.task.slug.clone(),
            spec.artifact.clone(),
            code.clone(),
            spec.executable,
        );
        deps.artifacts
            .call(move |store| store.write_artifact(&slug, &rel, &content, executable))
            .await
            .map_err(PipelineError::Artifact)?;

        if spec.quality_gate {
            match deps
                .quality_gate
                .assess(&code, &self.task.description)
                .await
            {
                Ok(verdict) if verdict.is_good() => {
                    debug!(stage = %spec.stage, "quality gate passed");
                }
                Ok(verdict) => {
                    return Ok(AttemptOutcome::Rejected {
                        code: Some(code),
                        failure: AttemptFailure::QualityRejected {
                            reason: verdict.reason,
                            suggestions: verdict.suggestions,
                        },
                    });
                }
                Err(QualityError::Unparseable { attempts, .. }) => {
                    return Ok(AttemptOutcome::Rejected {
                        code: Some(code),
                        failure: AttemptFailure::VerdictUnavailable { attempts },
                    });
                }
                Err(QualityError::Oracle(e)) => return Err(PipelineError::Oracle(e)),
            }
        }

        let dir = self.pipeline.task_dir(self.task);
        match deps.verifier.verify(spec, &dir).await {
            VerifyOutcome::Success => Ok(AttemptOutcome::Accepted { code }),
            VerifyOutcome::Failure { output } => Ok(AttemptOutcome::Rejected {
                code: Some(code),
                failure: AttemptFailure::VerificationFailed { output },
            }),
        }
    }
}
