//! Darwin CLI: evaluate strategy graphs against an OHLCV CSV.
//!
//! Commands:
//! - `evaluate`: baseline evaluation of one or more graphs
//! - `robust`: multi-episode evaluation of a single graph
//! - `nodes`: dump the node registry as JSON
//!
//! Results go to stdout as JSON; logs go to stderr (`RUST_LOG`, default `darwin=info`).

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use darwin_core::domain::OhlcvFrame;
use darwin_core::graph::{registry, GraphDefinition, GraphPreset, NodeSpec, StrategyGraph};
use darwin_runner::{
    dataset_hash, evaluate_many, evaluate_robust_with, rank_by_fitness, read_ohlcv_csv,
    EpisodeConfig, EvaluationConfig, StrategyEvaluationResult,
};

#[derive(Parser)]
#[command(name = "darwin", about = "Darwin: strategy graph evaluation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Baseline evaluation: train/holdout, stability, jitter, gate.
    Evaluate {
        /// Graph JSON files. Repeatable.
        #[arg(long = "graph")]
        graphs: Vec<PathBuf>,

        /// Named presets: sma_crossover, rsi_reversion, bollinger_breakout. Repeatable.
        #[arg(long = "preset")]
        presets: Vec<String>,

        /// OHLCV CSV file.
        #[arg(long)]
        data: PathBuf,

        /// TOML config with optional [evaluation] and [episodes] tables.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Sort results by fitness, best first.
        #[arg(long, default_value_t = false)]
        rank: bool,
    },
    /// Robust evaluation across sampled market episodes.
    Robust {
        /// Graph JSON file.
        #[arg(long, conflicts_with = "preset")]
        graph: Option<PathBuf>,

        /// Named preset.
        #[arg(long)]
        preset: Option<String>,

        /// OHLCV CSV file.
        #[arg(long)]
        data: PathBuf,

        /// TOML config with optional [evaluation] and [episodes] tables.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Generation index for sampling and leniency schedules.
        #[arg(long, default_value_t = 0)]
        generation: usize,
    },
    /// Print every registered node spec as JSON.
    Nodes,
}

/// On-disk config: both tables optional, each defaulting field by field.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    evaluation: EvaluationConfig,
    episodes: EpisodeConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("darwin=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate {
            graphs,
            presets,
            data,
            config,
            rank,
        } => run_evaluate(&graphs, &presets, &data, config.as_deref(), rank),
        Commands::Robust {
            graph,
            preset,
            data,
            config,
            generation,
        } => run_robust(graph.as_deref(), preset.as_deref(), &data, config.as_deref(), generation),
        Commands::Nodes => run_nodes(),
    }
}

fn run_evaluate(
    graph_paths: &[PathBuf],
    preset_names: &[String],
    data_path: &Path,
    config_path: Option<&Path>,
    rank: bool,
) -> Result<()> {
    if graph_paths.is_empty() && preset_names.is_empty() {
        bail!("at least one --graph or --preset is required");
    }
    let config = load_config(config_path)?;
    let data = load_data(data_path)?;

    let mut graphs = graph_paths
        .iter()
        .map(|p| load_graph(p))
        .collect::<Result<Vec<_>>>()?;
    for name in preset_names {
        graphs.push(build_preset(name)?);
    }

    // Batches keep their order through the parallel collect.
    let chunk = graphs.len().div_ceil(rayon::current_num_threads()).max(1);
    let mut results: Vec<StrategyEvaluationResult> = graphs
        .par_chunks(chunk)
        .flat_map_iter(|batch| evaluate_many(batch, &data, &config.evaluation))
        .collect();
    if rank {
        rank_by_fitness(&mut results);
    }

    print_json(&results)
}

fn run_robust(
    graph_path: Option<&Path>,
    preset_name: Option<&str>,
    data_path: &Path,
    config_path: Option<&Path>,
    generation: usize,
) -> Result<()> {
    let graph = match (graph_path, preset_name) {
        (Some(path), None) => load_graph(path)?,
        (None, Some(name)) => build_preset(name)?,
        _ => bail!("exactly one of --graph or --preset is required"),
    };
    let config = load_config(config_path)?;
    let data = load_data(data_path)?;

    let result = evaluate_robust_with(
        &graph,
        &data,
        &config.episodes,
        &config.evaluation,
        generation,
    )
    .with_context(|| format!("robust evaluation of graph '{}'", graph.graph_id()))?;

    print_json(&result)
}

fn run_nodes() -> Result<()> {
    let specs: Vec<&NodeSpec> = registry().specs().collect();
    print_json(&specs)
}

// ─── Loading ────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<ConfigFile> {
    let Some(path) = path else {
        return Ok(ConfigFile::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let config: ConfigFile =
        toml::from_str(&content).with_context(|| format!("parse config {}", path.display()))?;
    config
        .evaluation
        .validate()
        .with_context(|| format!("[evaluation] in {}", path.display()))?;
    config
        .episodes
        .validate()
        .with_context(|| format!("[episodes] in {}", path.display()))?;
    Ok(config)
}

fn load_data(path: &Path) -> Result<OhlcvFrame> {
    let file = File::open(path).with_context(|| format!("open data {}", path.display()))?;
    let frame = read_ohlcv_csv(file).with_context(|| format!("read data {}", path.display()))?;
    info!(
        path = %path.display(),
        bars = frame.len(),
        hash = %dataset_hash(&frame),
        "loaded dataset"
    );
    Ok(frame)
}

fn load_graph(path: &Path) -> Result<StrategyGraph> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read graph {}", path.display()))?;
    let definition: GraphDefinition = serde_json::from_str(&content)
        .with_context(|| format!("parse graph {}", path.display()))?;
    StrategyGraph::new(definition).with_context(|| format!("invalid graph {}", path.display()))
}

fn build_preset(name: &str) -> Result<StrategyGraph> {
    let Some(preset) = GraphPreset::from_name(name) else {
        let known: Vec<&str> = GraphPreset::ALL.iter().map(|p| p.name()).collect();
        bail!("unknown preset '{name}' (expected one of: {})", known.join(", "));
    };
    preset
        .build()
        .with_context(|| format!("build preset '{name}'"))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{json}");
    Ok(())
}
