//! `affinity run`: one experiment end to end.

use crate::commands::types::RunArgs;
use affinity_core::{run_with_linear_backend, ExperimentReport};
use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;

pub async fn execute(args: RunArgs) -> Result<()> {
    let config = args.to_config()?;
    let plan = config.resolve().context("Invalid experiment configuration")?;
    let report = run_with_linear_backend(&plan).await.context("Experiment failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
        return Ok(());
    }

    println!();
    println!("{}", "Experiment complete".bold().green());
    println!("  Mode:    {}", report.mode.to_string().cyan());
    println!("  Model:   {}", report.model.cyan());
    println!("  Dataset: {}", if report.from_cache { "cached bundle".dimmed() } else { "rebuilt".normal() });
    println!();
    println!("{:<24} {:>12} {:>12} {:>12}", "Task", "Train", "Valid", "Test");
    println!("{}", "─".repeat(64));
    for row in &report.rows {
        let test = row.test.map_or_else(|| "-".to_string(), |t| format!("{t:.4}"));
        println!("{:<24} {:>12.4} {:>12.4} {:>12}", row.task, row.train, row.valid, test);
    }
    println!();
    println!("  Results:  {}", report.results_path.display().to_string().dimmed());
    if let Some(path) = &report.snapshot_path {
        println!("  Snapshot: {}", path.display().to_string().dimmed());
    }
    println!();
    Ok(())
}

fn report_json(report: &ExperimentReport) -> serde_json::Value {
    json!({
        "mode": report.mode.name(),
        "model": report.model,
        "from_cache": report.from_cache,
        "results_path": report.results_path,
        "snapshot_path": report.snapshot_path,
        "hyper_parameters": report.hyper_parameters,
        "search_trials": report.search.as_ref().map(|s| s.trials.len()),
        "rows": report.rows.iter().map(|r| json!({
            "task": r.task,
            "train": r.train,
            "valid": r.valid,
            "test": r.test,
            "seconds": r.elapsed.as_secs_f64(),
            "optimal_epoch": r.optimal_epoch,
        })).collect::<Vec<_>>(),
    })
}
