//! `affinity presets`: list the built-in hyperparameter presets.

use affinity_core::LinearTrainer;
use affinity_training::PresetRegistry;
use anyhow::Result;
use colored::Colorize;
use std::collections::BTreeMap;

pub fn execute(json_output: bool) -> Result<()> {
    let registry = PresetRegistry::builtin();

    if json_output {
        let all = registry
            .names()
            .map(|name| Ok((name, registry.get(name)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        println!("{}", serde_json::to_string_pretty(&all)?);
        return Ok(());
    }

    println!();
    println!("{}", "Hyperparameter presets".bold().cyan());
    for name in registry.names() {
        let backend = if LinearTrainer::MODELS.contains(&name) { "linear backend".green() } else { "preset only".dimmed() };
        println!();
        println!("  {} ({})", name.bold(), backend);
        for (key, value) in registry.get(name)?.iter() {
            println!("    {:<24} {}", key, value);
        }
    }
    println!();
    Ok(())
}
