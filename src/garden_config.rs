//! File-level configuration read from `.garden/garden.toml`.
//!
//! Every field has a default, so an empty or missing file is valid.
//!
//! # Configuration File Format
//!
//! ```toml
//! [oracle]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-3.5-turbo-instruct"
//! api_key_env = "OPENAI_API_KEY"
//! max_tokens = 2048
//! temperature = 0.3
//! timeout_secs = 120
//!
//! [pipeline]
//! stages = ["interface_definition", "server_implementation", "container_build", "usage_example"]
//! error_budget = 15
//! diagnostic_lines = 25
//! verify_timeout_secs = 900
//! quality_parse_retries = 5
//! container_build_slots = 1
//! launch_on_done = true
//! docs_command = "go get ./... && go doc -short {import}"
//!
//! [stages.server_implementation]
//! command = "go vet ./... && go build -o /tmp/{name}-server ./server"
//! quality_gate = true
//! timeout_secs = 600
//!
//! [preflight]
//! commands = ["docker ps"]
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::stage::{Stage, StageOverride, StagePlan, StageSequence};

/// `[oracle]`: the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-3.5-turbo-instruct".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_temperature() -> f64 {
    0.3
}
fn default_oracle_timeout() -> u64 {
    120
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_oracle_timeout(),
        }
    }
}

/// `[pipeline]`: stage sequence and retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Stage names in pipeline order. `done` is implied.
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,
    /// Failed attempts tolerated per task before it is abandoned.
    #[serde(default = "default_error_budget")]
    pub error_budget: u32,
    /// Trailing lines of failure output folded into the next prompt.
    #[serde(default = "default_diagnostic_lines")]
    pub diagnostic_lines: usize,
    #[serde(default = "default_verify_timeout")]
    pub verify_timeout_secs: u64,
    #[serde(default = "default_quality_parse_retries")]
    pub quality_parse_retries: u32,
    /// Concurrent container builds allowed across all tasks.
    #[serde(default = "default_container_build_slots")]
    pub container_build_slots: usize,
    #[serde(default = "default_true")]
    pub launch_on_done: bool,
    /// Documentation lookup run once per server stage after its first
    /// failure. `{import}` is replaced by the package path. Empty disables.
    #[serde(default = "default_docs_command")]
    pub docs_command: String,
}

fn default_stages() -> Vec<String> {
    Stage::ALL
        .iter()
        .filter(|s| !s.is_terminal())
        .map(|s| s.as_str().to_string())
        .collect()
}
fn default_error_budget() -> u32 {
    15
}
fn default_diagnostic_lines() -> usize {
    25
}
fn default_verify_timeout() -> u64 {
    900
}
fn default_quality_parse_retries() -> u32 {
    5
}
fn default_container_build_slots() -> usize {
    1
}
fn default_true() -> bool {
    true
}
fn default_docs_command() -> String {
    "go get ./... && go doc -short {import}".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            error_budget: default_error_budget(),
            diagnostic_lines: default_diagnostic_lines(),
            verify_timeout_secs: default_verify_timeout(),
            quality_parse_retries: default_quality_parse_retries(),
            container_build_slots: default_container_build_slots(),
            launch_on_done: true,
            docs_command: default_docs_command(),
        }
    }
}

/// `[preflight]`: infrastructure checks run before any task starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreflightSection {
    #[serde(default = "default_preflight_commands")]
    pub commands: Vec<String>,
    #[serde(default = "default_preflight_timeout")]
    pub timeout_secs: u64,
}

fn default_preflight_commands() -> Vec<String> {
    vec!["docker ps".to_string()]
}
fn default_preflight_timeout() -> u64 {
    30
}

impl Default for PreflightSection {
    fn default() -> Self {
        Self {
            commands: default_preflight_commands(),
            timeout_secs: default_preflight_timeout(),
        }
    }
}

/// Root of `garden.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GardenToml {
    #[serde(default)]
    pub oracle: OracleSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// Per-stage overrides keyed by stage name.
    #[serde(default)]
    pub stages: HashMap<String, StageOverride>,
    #[serde(default)]
    pub preflight: PreflightSection,
}

impl GardenToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse garden.toml")
    }

    /// Load `.garden/garden.toml`, or defaults when the file doesn't exist.
    pub fn load_or_default(garden_dir: &Path) -> Result<Self> {
        let config_path = garden_dir.join("garden.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize garden.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Resolve the configured stage names and overrides into a plan.
    pub fn stage_plan(&self) -> Result<StagePlan> {
        let mut stages = Vec::new();
        for name in &self.pipeline.stages {
            let stage: Stage = name.parse()?;
            if !stage.is_terminal() {
                stages.push(stage);
            }
        }
        let sequence = StageSequence::new(stages)?;

        let mut overrides = HashMap::new();
        for (name, cfg) in &self.stages {
            let stage: Stage = name
                .parse()
                .with_context(|| format!("Invalid [stages.{}] section", name))?;
            overrides.insert(stage, cfg.clone());
        }

        Ok(StagePlan::new(
            sequence,
            overrides,
            Duration::from_secs(self.pipeline.verify_timeout_secs),
        ))
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.pipeline.error_budget == 0 {
            warnings.push(
                "error_budget = 0: every task is abandoned after its first failed attempt"
                    .to_string(),
            );
        }
        if self.pipeline.diagnostic_lines == 0 {
            warnings.push(
                "diagnostic_lines = 0: failure output will not reach the next prompt".to_string(),
            );
        }
        if self.pipeline.quality_parse_retries == 0 {
            warnings.push("quality_parse_retries = 0 is treated as 1".to_string());
        }
        if self.pipeline.container_build_slots == 0 {
            warnings.push("container_build_slots = 0 is treated as 1".to_string());
        }
        if self.pipeline.stages.is_empty() {
            warnings.push("No stages configured: tasks go straight to done".to_string());
        }

        let mut parsed = Vec::new();
        for name in &self.pipeline.stages {
            match name.parse::<Stage>() {
                Ok(stage) => parsed.push(stage),
                Err(_) => warnings.push(format!("Unknown stage '{}' in [pipeline].stages", name)),
            }
        }
        if parsed.windows(2).any(|pair| pair[0] >= pair[1]) {
            warnings.push(
                "[pipeline].stages must be listed once each in pipeline order".to_string(),
            );
        }

        for name in self.stages.keys() {
            match name.parse::<Stage>() {
                Ok(stage) if stage.is_terminal() => warnings.push(format!(
                    "[stages.{}] has no effect: the terminal stage has no verification",
                    name
                )),
                Ok(_) => {}
                Err(_) => warnings.push(format!("Unknown stage section [stages.{}]", name)),
            }
        }

        if !(0.0..=2.0).contains(&self.oracle.temperature) {
            warnings.push(format!(
                "temperature {} is outside the usual 0.0-2.0 range",
                self.oracle.temperature
            ));
        }

        warnings
    }
}
