//! CLI command implementations.
//!
//! | Module    | Commands handled              |
//! |-----------|-------------------------------|
//! | `project` | `Init`, `Create`, `Resume`    |
//! | `task`    | `List`, `Status`              |
//! | `config`  | `Config`                      |

pub mod config;
pub mod project;
pub mod task;

pub use config::cmd_config;
pub use project::{cmd_create, cmd_init, cmd_resume};
pub use task::{cmd_list, cmd_status};

use anyhow::{Result, bail};
use garden::config::Config;
use garden::progress::{DbHandle, TaskDb};

/// Open the progress store, refusing to run before `garden init`.
pub fn open_store(config: &Config) -> Result<DbHandle> {
    if !config.is_initialized() {
        bail!("No .garden directory found. Run 'garden init' first.");
    }
    Ok(DbHandle::new(TaskDb::new(&config.db_path)?))
}
