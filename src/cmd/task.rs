//! Task listing and status.

use anyhow::{Result, bail};

use garden::config::Config;

use super::open_store;

pub fn cmd_list(config: &Config) -> Result<()> {
    if !config.is_initialized() {
        println!();
        println!("No tasks found. Run 'garden init' first to initialize.");
        println!();
        return Ok(());
    }

    let store = open_store(config)?;
    let tasks = store.lock_sync()?.list_tasks()?;
    if tasks.is_empty() {
        println!();
        println!("No tasks yet. Create one with 'garden create'.");
        println!();
        return Ok(());
    }

    println!();
    println!("{:<6} {:<24} {:<24} Description", "ID", "Name", "Stage");
    println!(
        "{:<6} {:<24} {:<24} -----------",
        "------", "------------------------", "------------------------"
    );
    for task in &tasks {
        let stage = if task.is_finished() {
            console::style(task.stage.to_string()).green()
        } else if task.last_error.is_some() {
            console::style(task.stage.to_string()).red()
        } else {
            console::style(task.stage.to_string()).yellow()
        };
        println!(
            "{:<6} {:<24} {:<24} {}",
            task.id,
            task.slug,
            stage,
            task.description.chars().take(60).collect::<String>()
        );
    }
    println!();

    let done = tasks.iter().filter(|t| t.is_finished()).count();
    println!("{} task(s), {} done", tasks.len(), done);
    println!();
    Ok(())
}

pub fn cmd_status(config: &Config, id: i64) -> Result<()> {
    let store = open_store(config)?;
    let db = store.lock_sync()?;
    let Some(task) = db.get_task(id)? else {
        bail!("Task {} not found. Run 'garden list' to see task ids.", id);
    };
    let transitions = db.transitions(id)?;

    println!();
    println!("Task {}: {}", task.id, console::style(&task.name).bold());
    println!("================");
    println!();
    println!("Directory:   {}", config.repos_dir.join(&task.slug).display());
    println!("Description: {}", task.description);
    println!("Stage:       {}", task.stage);
    println!("Created:     {}", task.created_at);
    println!("Modified:    {}", task.modified_at);
    if let Some(reason) = &task.last_error {
        println!("Last error:  {}", console::style(reason).red());
    }
    println!();

    if transitions.is_empty() {
        println!("No stage transitions yet.");
    } else {
        println!("History:");
        for t in &transitions {
            println!(
                "  {}  {} -> {}",
                t.at,
                t.from_stage,
                t.to_stage
            );
        }
    }
    println!();
    Ok(())
}
