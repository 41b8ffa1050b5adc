use anyhow::{bail, Context, Result};
use meal_planner::api_connection::{GeminiClient, RetryPolicy};
use meal_planner::cli::{parse_args, Cli, Command};
use meal_planner::config::{ConfigResolver, RuntimeConfig};
use meal_planner::meal_plan::{
    generate_weekly_plan, learn_from_menu_image, load_history, mime_type_for, record_plan,
    render_plan, PlanSource, WeeklyPlan,
};
use meal_planner::recipe::{generate_recipe, load_recipes, render_recipe, save_recipe, search_recipes};
use meal_planner::settings::{choose_api_key, load_settings, mask_secret, save_settings, UserSettings};
use meal_planner::store::JsonFileStore;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

/// Opens the local store only when a connection descriptor was resolved.
fn open_store(cli: &Cli, runtime: &RuntimeConfig) -> Result<Option<JsonFileStore>> {
    let Some(connection) = &runtime.connection else {
        return Ok(None);
    };
    let file_name = format!("{}.json", connection.project_id().unwrap_or("default"));
    let path = cli.store_dir.join(file_name);
    let store = JsonFileStore::open(&path)
        .with_context(|| format!("Failed to open document store at '{}'", path.display()))?;
    Ok(Some(store))
}

fn require_store<'a>(
    store: &'a mut Option<JsonFileStore>,
    runtime: &RuntimeConfig,
) -> Result<&'a mut JsonFileStore> {
    match store {
        Some(store) => Ok(store),
        None => bail!(
            "Persistence is disabled: {}",
            runtime
                .connection_error
                .as_deref()
                .unwrap_or("no connection descriptor")
        ),
    }
}

fn build_client(
    cli: &Cli,
    runtime: &RuntimeConfig,
    store: &Option<JsonFileStore>,
) -> Result<GeminiClient> {
    let settings = match store {
        Some(store) => load_settings(store, &runtime.namespace_id, &cli.user_id)?,
        None => UserSettings::default(),
    };
    let api_key = choose_api_key(&settings, runtime)?;
    let policy = RetryPolicy::new(cli.retries, Duration::from_millis(cli.initial_backoff_ms));
    Ok(GeminiClient::new(api_key).with_retry_policy(policy))
}

fn record_or_warn(
    store: &mut Option<JsonFileStore>,
    runtime: &RuntimeConfig,
    user_id: &str,
    plan: &WeeklyPlan,
    source: PlanSource,
) -> Result<()> {
    match store {
        Some(store) => {
            let id = record_plan(store, &runtime.namespace_id, user_id, plan, source)
                .context("Failed to record meal plan in history")?;
            println!("\nRecorded in history as {}.", id);
        }
        None => warn!("persistence disabled; plan was not recorded"),
    }
    Ok(())
}

fn print_config(runtime: &RuntimeConfig, store: &Option<JsonFileStore>) {
    println!("namespace:            {}", runtime.namespace_id);
    match (&runtime.connection, &runtime.connection_error) {
        (Some(connection), _) => println!(
            "connection:           project {} (apiKey {})",
            connection.project_id().unwrap_or("<unnamed>"),
            mask_secret(connection.api_key())
        ),
        (None, Some(error)) => println!("connection:           unavailable ({})", error),
        (None, None) => println!("connection:           unavailable"),
    }
    println!("bootstrap credential: {}", runtime.describe_bootstrap());
    println!(
        "default API key:      {}",
        runtime
            .generative_api_key
            .as_deref()
            .map(mask_secret)
            .unwrap_or_else(|| "none".to_string())
    );
    match store {
        Some(store) => println!("store:                {}", store.path().display()),
        None => println!("store:                disabled"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let cli = parse_args();

    let mut resolver = ConfigResolver::from_process_env();
    for (name, value) in &cli.defines {
        resolver.set_global(name, value);
    }
    let runtime = RuntimeConfig::resolve(&resolver);
    if runtime.bootstrap_credential.is_some() {
        info!(
            user_id = %cli.user_id,
            "bootstrap credential resolved but not used; session is named by --user-id"
        );
    }

    let mut store = open_store(&cli, &runtime)?;

    match &cli.command {
        Command::Config => print_config(&runtime, &store),
        Command::Plan => {
            let client = build_client(&cli, &runtime, &store)?;
            println!("Generating weekly meal plan...");
            let plan = generate_weekly_plan(&client)
                .await
                .context("Meal plan generation failed")?;
            println!("\n{}", render_plan(&plan));
            record_or_warn(&mut store, &runtime, &cli.user_id, &plan, PlanSource::Generated)?;
        }
        Command::Learn { image } => {
            let mime_type = mime_type_for(image)
                .with_context(|| format!("Unsupported image type: '{}'", image.display()))?;
            let bytes = tokio::fs::read(image)
                .await
                .with_context(|| format!("Failed to read image '{}'", image.display()))?;
            let client = build_client(&cli, &runtime, &store)?;
            println!("Reading menu from {}...", image.display());
            let plan = learn_from_menu_image(&client, &bytes, mime_type)
                .await
                .context("Menu image analysis failed")?;
            println!("\n{}", render_plan(&plan));
            record_or_warn(&mut store, &runtime, &cli.user_id, &plan, PlanSource::MenuImage)?;
        }
        Command::Recipe { dish } => {
            let client = build_client(&cli, &runtime, &store)?;
            println!("Generating recipe for '{}'...", dish);
            let recipe = generate_recipe(&client, dish)
                .await
                .context("Recipe generation failed")?;
            println!("\n{}", render_recipe(&recipe));
            match &mut store {
                Some(store) => {
                    save_recipe(store, &runtime.namespace_id, &recipe)
                        .context("Failed to save recipe")?;
                }
                None => warn!("persistence disabled; recipe was not saved"),
            }
        }
        Command::Recipes { search } => {
            let store = require_store(&mut store, &runtime)?;
            let recipes = load_recipes(store, &runtime.namespace_id)?;
            let matches = search_recipes(&recipes, search.as_deref().unwrap_or(""));
            if matches.is_empty() {
                println!("No saved recipes match.");
            }
            for recipe in matches {
                println!("- {} ({} ingredients)", recipe.title, recipe.ingredients.len());
            }
        }
        Command::History { full } => {
            let store = require_store(&mut store, &runtime)?;
            let history = load_history(store, &runtime.namespace_id)?;
            if history.is_empty() {
                println!("No meal plans recorded yet.");
            }
            for entry in history {
                let first_day = entry.plan.days.first().map(|d| d.date.as_str()).unwrap_or("-");
                println!(
                    "{}  created {}  {} days from {}  by {}",
                    entry.id,
                    entry.created_at.map(|s| s.to_string()).unwrap_or_else(|| "?".to_string()),
                    entry.plan.days.len(),
                    first_day,
                    entry.user_id.as_deref().unwrap_or("unknown")
                );
                if *full {
                    println!("{}", render_plan(&entry.plan));
                }
            }
        }
        Command::SetKey { key } => {
            let store = require_store(&mut store, &runtime)?;
            let settings = UserSettings {
                gemini_key: key.trim().to_string(),
            };
            save_settings(store, &runtime.namespace_id, &cli.user_id, &settings)
                .context("Failed to save settings")?;
            println!("Saved API key {} for user '{}'.", mask_secret(&settings.gemini_key), cli.user_id);
        }
    }

    Ok(())
}
