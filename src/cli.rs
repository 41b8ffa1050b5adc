use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Hospital weekly meal planner", long_about = None)]
pub struct Cli {
    /// In-memory configuration override, e.g. `--define VITE_APP_ID=ward-7`. Repeatable.
    #[arg(short = 'D', long = "define", value_name = "NAME=VALUE", value_parser = parse_define, global = true)]
    pub defines: Vec<(String, String)>,

    /// Directory holding the local document store.
    #[arg(long, default_value = ".meal_planner", global = true)]
    pub store_dir: PathBuf,

    /// User whose settings are read and written.
    #[arg(long, default_value = "anonymous", global = true)]
    pub user_id: String,

    /// Retries after the first failed request to the generative API.
    #[arg(long, default_value_t = 5, global = true)]
    pub retries: u32,

    /// Delay before the first retry, in milliseconds. Doubles on each retry.
    #[arg(long, default_value_t = 1000, global = true)]
    pub initial_backoff_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Show the resolved runtime configuration.
    Config,
    /// Generate this week's meal plan and record it in the history.
    Plan,
    /// Transcribe a photographed past menu into the history.
    Learn {
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Generate a recipe for a dish and save it.
    Recipe {
        #[arg(short, long)]
        dish: String,
    },
    /// List saved recipes, optionally filtered.
    Recipes {
        #[arg(short, long)]
        search: Option<String>,
    },
    /// List recorded meal plans, newest first.
    History {
        /// Print every day of each plan.
        #[arg(long)]
        full: bool,
    },
    /// Save a personal generative API key in the user's settings.
    SetKey { key: String },
}

fn parse_define(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty name in '{}'", raw));
    }
    Ok((name.to_string(), value.to_string()))
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
