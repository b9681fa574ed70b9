use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use slime_orchestrator::config::SimulationConfig;
use slime_orchestrator::framework;
use slime_orchestrator::shader::{Options, SlimeShader};

/// Primordial particle system simulation on compute shaders.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// JSON file with the parameter schema and presets.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Preset to apply after the reset stage.
    #[arg(long)]
    preset: Option<String>,

    /// Exit after this many frames.
    #[arg(long)]
    frames: Option<u64>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SimulationConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => SimulationConfig::default(),
    };

    if cli.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    framework::run::<SlimeShader>(
        "Slime Shader",
        Options {
            config,
            preset: cli.preset,
            frames: cli.frames,
        },
    )
}
