use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{bail, Context};
use arbiter::api::{builtin_script, load_script, run_script};
use arbiter::balance::encounter_balance;
use arbiter::spatial::{circle_tiles, find_path, PathOptions, PathOutcome, Point, Tile};
use arbiter::{AdMode, Dice, EngineConfig};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, ValueEnum)]
enum Adv {
    Normal,
    Advantage,
    Disadvantage,
}

#[derive(Subcommand)]
enum Cmd {
    /// Roll a dice expression such as 2d6+3
    Roll {
        expr: String,
        /// Seed string for determinism
        #[arg(long, default_value = "42")]
        seed: String,
        /// Advantage mode (only meaningful for 1d20)
        #[arg(long, value_enum, default_value_t = Adv::Normal)]
        adv: Adv,
        /// Number of times to roll
        #[arg(long, default_value_t = 1)]
        times: u32,
    },
    /// Classify encounter difficulty
    Balance {
        /// Party levels, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        levels: Vec<u32>,
        /// Enemy challenge ratings, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        crs: Vec<f64>,
    },
    /// List tiles inside a circle
    Circle {
        #[arg(long, allow_hyphen_values = true)]
        x: f64,
        #[arg(long, allow_hyphen_values = true)]
        y: f64,
        #[arg(long)]
        radius: f64,
    },
    /// Find a path between two tiles ("x,y")
    Path {
        #[arg(long, allow_hyphen_values = true)]
        from: Tile,
        #[arg(long, allow_hyphen_values = true)]
        to: Tile,
        /// Obstacle tile, repeatable
        #[arg(long = "obstacle", allow_hyphen_values = true)]
        obstacles: Vec<Tile>,
        /// Difficult terrain tile, repeatable
        #[arg(long = "difficult", allow_hyphen_values = true)]
        difficult: Vec<Tile>,
    },
    /// Run an encounter script (YAML/JSON) or a builtin one
    Run {
        /// Path to a script file
        #[arg(long, conflicts_with = "builtin")]
        script: Option<PathBuf>,
        /// Builtin script id, e.g. goblin_ambush
        #[arg(long)]
        builtin: Option<String>,
    },
}

#[derive(Parser)]
#[command(name = "arbiter")]
#[command(about = "Deterministic tactical combat adjudicator")]
struct Cli {
    /// Engine config file (YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

fn to_mode(a: Adv) -> AdMode {
    match a {
        Adv::Normal => AdMode::Normal,
        Adv::Advantage => AdMode::Advantage,
        Adv::Disadvantage => AdMode::Disadvantage,
    }
}

fn emit<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    tracing::debug!(?config, "engine config");

    match cli.cmd {
        Cmd::Roll {
            expr,
            seed,
            adv,
            times,
        } => {
            let parsed = arbiter::parse(&expr)?.with_mode(to_mode(adv));
            parsed.check_limits(&config)?;
            let mut dice = Dice::from_seed_str(&seed);
            let results = (0..times)
                .map(|_| dice.roll(&parsed))
                .collect::<Result<Vec<_>, _>>()?;
            emit(&results, cli.pretty)?;
        }
        Cmd::Balance { levels, crs } => {
            let report = encounter_balance(&levels, &crs)?;
            emit(&report, cli.pretty)?;
        }
        Cmd::Circle { x, y, radius } => {
            let tiles = circle_tiles(Point::new(x, y), radius)?;
            emit(&tiles, cli.pretty)?;
        }
        Cmd::Path {
            from,
            to,
            obstacles,
            difficult,
        } => {
            let obstacles: BTreeSet<Tile> = obstacles.into_iter().collect();
            let difficult: BTreeSet<Tile> = difficult.into_iter().collect();
            let options = PathOptions {
                max_iterations: config.max_path_iterations,
                difficult: Some(&difficult),
                ..PathOptions::default()
            };
            match find_path(from, to, &obstacles, &options) {
                PathOutcome::Found(path) => emit(&path, cli.pretty)?,
                PathOutcome::Unreachable { iterations } => {
                    bail!("no path from {} to {} ({} iterations)", from, to, iterations)
                }
                PathOutcome::BudgetExhausted { iterations } => {
                    bail!("path search gave up after {} iterations", iterations)
                }
            }
        }
        Cmd::Run { script, builtin } => {
            let script = match (script, builtin) {
                (Some(path), _) => load_script(&path)?,
                (None, Some(id)) => builtin_script(&id)?,
                (None, None) => bail!("pass --script <file> or --builtin <id>"),
            };
            let report = run_script(&script, config).context("script run failed")?;
            emit(&report, cli.pretty)?;
        }
    }
    Ok(())
}
