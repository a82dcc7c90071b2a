//! Stage definitions for the generation pipeline.
//!
//! This module provides:
//! - `Stage`, the fixed, ordered enumeration of pipeline phases
//! - `StageSequence`, the ordered subset of stages a deployment runs
//! - `StagePlan` / `StageSpec`, the per-task resolution of artifact paths,
//!   verification commands and gate flags

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// One ordered phase of artifact generation.
///
/// Declaration order is the pipeline order; `Ord` follows it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    InterfaceDefinition,
    ServerImplementation,
    ContainerBuild,
    UsageExample,
    Done,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::InterfaceDefinition,
        Stage::ServerImplementation,
        Stage::ContainerBuild,
        Stage::UsageExample,
        Stage::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InterfaceDefinition => "interface_definition",
            Self::ServerImplementation => "server_implementation",
            Self::ContainerBuild => "container_build",
            Self::UsageExample => "usage_example",
            Self::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Fence tag the oracle is asked to answer in.
    pub fn content_tag(&self) -> Option<&'static str> {
        match self {
            Self::InterfaceDefinition => Some("protobuf"),
            Self::ServerImplementation => Some("go"),
            Self::ContainerBuild => Some("dockerfile"),
            Self::UsageExample => Some("bash"),
            Self::Done => None,
        }
    }

    /// Artifact path relative to the task directory.
    pub fn artifact_path(&self, slug: &str) -> Option<PathBuf> {
        match self {
            Self::InterfaceDefinition => {
                Some(PathBuf::from("protobufs").join(format!("{}.proto", slug)))
            }
            Self::ServerImplementation => Some(PathBuf::from("server").join("main.go")),
            Self::ContainerBuild => Some(PathBuf::from("Dockerfile")),
            Self::UsageExample => Some(PathBuf::from("example-client-call.sh")),
            Self::Done => None,
        }
    }

    /// Default verification command template.
    ///
    /// Placeholders: `{name}` (task slug), `{artifact}` (artifact path),
    /// `{dir}` (task directory).
    pub fn default_command(&self) -> Option<&'static str> {
        match self {
            Self::InterfaceDefinition => {
                Some("protoc -I=. --go_out=. --go-grpc_out=. {artifact}")
            }
            Self::ServerImplementation => {
                Some("go get ./... && go build -o /tmp/{name}-server ./server")
            }
            Self::ContainerBuild => {
                if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
                    Some("docker buildx build --platform linux/amd64 -t {name} .")
                } else {
                    Some("docker build -t {name} .")
                }
            }
            Self::UsageExample => Some("sh -n {artifact}"),
            Self::Done => None,
        }
    }

    pub fn default_quality_gate(&self) -> bool {
        matches!(self, Self::ServerImplementation)
    }

    /// Verification runs on the shared container builder.
    pub fn uses_container_builder(&self) -> bool {
        matches!(self, Self::ContainerBuild)
    }

    pub fn is_executable_artifact(&self) -> bool {
        matches!(self, Self::UsageExample)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "interface_definition" => Ok(Self::InterfaceDefinition),
            "server_implementation" => Ok(Self::ServerImplementation),
            "container_build" => Ok(Self::ContainerBuild),
            "usage_example" => Ok(Self::UsageExample),
            "done" => Ok(Self::Done),
            other => bail!(
                "Invalid stage '{}'. Valid values: interface_definition, server_implementation, container_build, usage_example, done",
                other
            ),
        }
    }
}

/// The ordered stages a deployment runs. Always ends with `Stage::Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSequence {
    stages: Vec<Stage>,
}

impl StageSequence {
    /// Build a sequence from stages in pipeline order. `Done` is appended
    /// when missing; duplicates and out-of-order entries are rejected.
    pub fn new(mut stages: Vec<Stage>) -> Result<Self> {
        if stages.last() != Some(&Stage::Done) {
            stages.push(Stage::Done);
        }
        for pair in stages.windows(2) {
            if pair[0] >= pair[1] {
                bail!(
                    "Stage order must strictly follow the pipeline order: {} cannot precede {}",
                    pair[0],
                    pair[1]
                );
            }
        }
        Ok(Self { stages })
    }

    pub fn first(&self) -> Stage {
        self.stages[0]
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    /// The configured stage that follows `stage`. A stage outside the
    /// sequence maps to the next configured stage after it.
    pub fn next_after(&self, stage: Stage) -> Stage {
        self.stages
            .iter()
            .copied()
            .find(|s| *s > stage)
            .unwrap_or(Stage::Done)
    }
}

impl Default for StageSequence {
    fn default() -> Self {
        Self {
            stages: Stage::ALL.to_vec(),
        }
    }
}

/// Per-stage overrides of the built-in catalogue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_gate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// A stage resolved for one task: concrete paths and command.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub stage: Stage,
    pub artifact: PathBuf,
    pub content_tag: &'static str,
    pub command: String,
    pub quality_gate: bool,
    pub uses_container_builder: bool,
    pub executable: bool,
    pub timeout: Duration,
}

/// Stage sequence plus the overrides needed to resolve `StageSpec`s.
#[derive(Debug, Clone)]
pub struct StagePlan {
    sequence: StageSequence,
    overrides: HashMap<Stage, StageOverride>,
    default_timeout: Duration,
}

impl StagePlan {
    pub fn new(
        sequence: StageSequence,
        overrides: HashMap<Stage, StageOverride>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            sequence,
            overrides,
            default_timeout,
        }
    }

    pub fn sequence(&self) -> &StageSequence {
        &self.sequence
    }

    /// Resolve `stage` for the task `slug`. Returns `None` for the terminal
    /// stage, which has no artifact or verification step.
    pub fn resolve(&self, stage: Stage, slug: &str) -> Option<StageSpec> {
        let artifact = stage.artifact_path(slug)?;
        let content_tag = stage.content_tag()?;
        let overrides = self.overrides.get(&stage);

        let template = overrides
            .and_then(|o| o.command.clone())
            .or_else(|| stage.default_command().map(str::to_string))
            .unwrap_or_default();
        let command = render_template(&template, slug, &artifact.to_string_lossy());

        let quality_gate = overrides
            .and_then(|o| o.quality_gate)
            .unwrap_or_else(|| stage.default_quality_gate());
        let timeout = overrides
            .and_then(|o| o.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        Some(StageSpec {
            stage,
            artifact,
            content_tag,
            command,
            quality_gate,
            uses_container_builder: stage.uses_container_builder(),
            executable: stage.is_executable_artifact(),
            timeout,
        })
    }
}

impl Default for StagePlan {
    fn default() -> Self {
        Self::new(
            StageSequence::default(),
            HashMap::new(),
            Duration::from_secs(900),
        )
    }
}

/// Substitute `{name}` and `{artifact}` in a command template. `{dir}` is
/// replaced with `.` since commands run inside the task directory.
pub fn render_template(template: &str, slug: &str, artifact: &str) -> String {
    template
        .replace("{name}", slug)
        .replace("{artifact}", artifact)
        .replace("{dir}", ".")
}
