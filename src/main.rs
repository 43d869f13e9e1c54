use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use limb_arena::{
    parallel_rollouts, ArenaSettings, BallEnv, ReacherEnv, Trajectory, WalkerEnv,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EnvKind {
    Reacher,
    Walker,
    Ball,
}

/// Run random-policy rollouts in one of the arenas.
#[derive(Debug, Parser)]
#[command(name = "limb-arena", version, about)]
struct Cli {
    #[arg(long, value_enum, default_value = "reacher")]
    env: EnvKind,

    /// YAML settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Episodes per worker.
    #[arg(long, default_value_t = 4)]
    episodes: usize,

    /// Overrides the seed from the settings file.
    #[arg(long)]
    seed: Option<u64>,

    /// Parallel environments, each seeded `seed + i`.
    #[arg(long, default_value_t = 1)]
    workers: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let mut settings = match &cli.config {
        Some(path) => ArenaSettings::from_yaml(path)?,
        None => ArenaSettings::default(),
    };
    if let Some(seed) = cli.seed {
        settings.seed = seed;
    }

    let seeds: Vec<u64> = (0..cli.workers.max(1) as u64)
        .map(|i| settings.seed.wrapping_add(i))
        .collect();
    info!(env = ?cli.env, workers = seeds.len(), episodes = cli.episodes, "starting rollouts");

    let start = Instant::now();
    let runs = match cli.env {
        EnvKind::Reacher => parallel_rollouts(&seeds, cli.episodes, |seed| {
            ReacherEnv::from_settings(&ArenaSettings { seed, ..settings.clone() })
        })?,
        EnvKind::Walker => parallel_rollouts(&seeds, cli.episodes, |seed| {
            WalkerEnv::from_settings(&ArenaSettings { seed, ..settings.clone() })
        })?,
        EnvKind::Ball => parallel_rollouts(&seeds, cli.episodes, |seed| {
            BallEnv::from_settings(&ArenaSettings { seed, ..settings.clone() })
        })?,
    };

    for (seed, run) in seeds.iter().zip(&runs) {
        for summary in &run.summaries {
            info!(
                seed,
                episode = summary.index,
                steps = summary.steps,
                reward = summary.cumulative_reward,
                termination = %summary.termination,
                "episode"
            );
        }
    }

    let steps: usize = runs.iter().map(Trajectory::steps).sum();
    let duration = start.elapsed();
    info!(
        steps,
        seconds = duration.as_secs_f64(),
        steps_per_sec = steps as f64 / duration.as_secs_f64().max(1e-9),
        "done"
    );
    Ok(())
}
