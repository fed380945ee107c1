//! Config command

use anyhow::{anyhow, Context, Result};
use camino::Utf8Path;
use keyferry_core::KeyferryConfig;

use super::load_config;
use crate::cli::{ConfigCommands, ConfigInitArgs, ConfigShowArgs};
use crate::output;

pub async fn run(cmd: ConfigCommands, config: Option<&Utf8Path>) -> Result<()> {
    match cmd {
        ConfigCommands::Init(args) => init(args),
        ConfigCommands::Show(args) => show(args, config),
    }
}

fn init(args: ConfigInitArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        return Err(anyhow!(
            "File {} already exists. Use --force to overwrite.",
            args.output
        ));
    }

    let content = KeyferryConfig::default().to_yaml()?;
    std::fs::write(&args.output, content)
        .with_context(|| format!("Failed to write {}", args.output))?;

    output::success(&format!("Created {}", args.output));
    output::info("Set project-id, target.service-account and target.key-file before running");

    Ok(())
}

fn show(args: ConfigShowArgs, config: Option<&Utf8Path>) -> Result<()> {
    let loaded = load_config(config, &args.resources.overrides())?;

    match &loaded.config_path {
        Some(path) => output::info(&format!("Loaded from {}", path)),
        None => output::info("No keyferry.yaml found, showing defaults"),
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&loaded.settings)?);
    } else {
        println!("{}", loaded.to_yaml()?);
    }

    if let Err(e) = loaded.settings.validate() {
        output::warning(&e.to_string());
    }

    Ok(())
}
