//! The stage pipeline: prompt context, the retry loop and task supervision.

pub mod budget;
pub mod context;
pub mod definitions;
pub mod extract;
pub mod launch;
pub mod prompts;
pub mod runner;
pub mod supervisor;

pub use context::Context;
pub use launch::{DockerLauncher, LaunchReport, Launcher};
pub use runner::{Collaborators, PipelineSettings, RunSummary, StagePipeline};
pub use supervisor::Supervisor;
