//! Project initialization, task creation and resumption.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::info;

use garden::artifacts::{ArtifactStore, sanitize_name, validate_slug};
use garden::config::Config;
use garden::garden_config::GardenToml;
use garden::intake::register_task;
use garden::oracle::{OpenAiCompletionClient, OracleClient};
use garden::pipeline::{
    Collaborators, DockerLauncher, PipelineSettings, StagePipeline, Supervisor,
};
use garden::preflight::run_checks;
use garden::progress::DbHandle;
use garden::quality::OracleQualityGate;
use garden::verifier::CommandVerifier;

use super::open_store;

pub fn cmd_init(config: &Config) -> Result<()> {
    let was_initialized = config.is_initialized();
    config.ensure_directories()?;

    let config_file = config.config_file();
    if !config_file.exists() {
        GardenToml::default().save(&config_file)?;
    }

    if was_initialized {
        println!(
            "Garden already initialized at {}",
            config.garden_dir.display()
        );
        println!("Directory structure verified.");
    } else {
        println!("Initialized garden at {}", config.garden_dir.display());
        println!();
        println!("Created:");
        println!("  .garden/garden.toml   # Oracle, pipeline and stage settings");
        println!("  .garden/logs/         # Daily JSON logs");
        println!("  repos/                # One git repository per task");
        println!();
        println!("Next steps:");
        println!("  1. Export OPENAI_API_KEY (or put it in .env)");
        println!("  2. Run `garden create --name <name> --description <what it does>`");
    }
    Ok(())
}

/// Wire the production collaborators from configuration.
fn build_pipeline(config: &Config, store: &DbHandle) -> Result<StagePipeline> {
    let settings = &config.settings;
    for warning in config.validate() {
        tracing::warn!(warning = %warning, "configuration warning");
    }
    let plan = settings.stage_plan()?;

    let client = OpenAiCompletionClient::from_settings(&settings.oracle)?;
    let oracle: Arc<dyn OracleClient> = Arc::new(client);
    let quality_gate = OracleQualityGate::new(
        oracle.clone(),
        settings.oracle.max_tokens,
        settings.pipeline.quality_parse_retries,
    );

    let deps = Collaborators {
        oracle,
        quality_gate: Arc::new(quality_gate),
        verifier: Arc::new(CommandVerifier::new(settings.pipeline.container_build_slots)),
        progress: Arc::new(store.clone()),
        artifacts: Arc::new(ArtifactStore::new(config.repos_dir.clone())),
        launcher: Arc::new(DockerLauncher::new(Duration::from_secs(
            settings.pipeline.verify_timeout_secs,
        ))),
    };
    Ok(StagePipeline::new(
        plan,
        PipelineSettings::from_sections(&settings.pipeline, &settings.oracle),
        deps,
    ))
}

async fn preflight(config: &Config, skip: bool) -> Result<()> {
    if skip {
        info!("preflight checks skipped");
        return Ok(());
    }
    run_checks(&config.settings.preflight, &config.root).await
}

pub async fn cmd_create(
    config: &Config,
    name: &str,
    description: &str,
    skip_preflight: bool,
) -> Result<()> {
    let store = open_store(config)?;
    let slug = sanitize_name(name);
    validate_slug(&slug)?;
    if description.trim().is_empty() {
        bail!("The description must say what the service does.");
    }

    let lookup = slug.clone();
    let existing = store.call(move |db| db.get_task_by_slug(&lookup)).await?;
    if existing.is_some() {
        bail!(
            "A task named '{}' already exists. Use 'garden resume' to continue it.",
            slug
        );
    }

    preflight(config, skip_preflight).await?;
    let pipeline = build_pipeline(config, &store)?;

    let artifacts = ArtifactStore::new(config.repos_dir.clone());
    let first = pipeline.plan().sequence().first();
    let task = register_task(&store, &artifacts, name, description, first).await?;
    let dir = artifacts.task_dir(&task.slug);

    println!(
        "Created task {} ({}) at {}",
        task.id,
        console::style(&task.slug).bold(),
        dir.display()
    );

    let id = task.id;
    Supervisor::new(Arc::new(pipeline)).run_one(task).await;
    report(&store, id).await
}

pub async fn cmd_resume(config: &Config, skip_preflight: bool) -> Result<()> {
    let store = open_store(config)?;
    preflight(config, skip_preflight).await?;
    let pipeline = build_pipeline(config, &store)?;

    let started = Supervisor::new(Arc::new(pipeline))
        .resume_all(&store)
        .await?;
    if started == 0 {
        println!("No unfinished tasks.");
    } else {
        println!("Resumed {} task(s). Run 'garden list' for results.", started);
    }
    Ok(())
}

/// Print where a run left its task; a recorded failure becomes the exit
/// status.
async fn report(store: &DbHandle, id: i64) -> Result<()> {
    let task = store
        .call(move |db| db.get_task(id))
        .await?
        .with_context(|| format!("Task {} disappeared from the progress store", id))?;

    let stage = if task.is_finished() {
        console::style(task.stage.to_string()).green()
    } else {
        console::style(task.stage.to_string()).yellow()
    };
    println!("Task {} is at stage {}", task.id, stage);
    match task.last_error {
        Some(reason) if !task.is_finished() => bail!("Task {} stopped: {}", task.id, reason),
        Some(reason) => {
            println!("{} {}", console::style("warning:").yellow(), reason);
            Ok(())
        }
        None => Ok(()),
    }
}
