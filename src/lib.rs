pub mod artifacts;
pub mod config;
pub mod errors;
pub mod garden_config;
pub mod intake;
pub mod logging;
pub mod oracle;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod progress;
pub mod quality;
pub mod stage;
pub mod util;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;
