mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    IngredientArgs, cmd_catalog_export, cmd_catalog_import, cmd_catalog_refresh, cmd_catalog_show,
    cmd_meal_add, cmd_meal_delete, cmd_meal_edit, cmd_meal_inspire, cmd_meal_list,
    cmd_meal_search, cmd_meal_show, cmd_plan_create, cmd_plan_delete, cmd_plan_made,
    cmd_plan_saved, cmd_plan_show,
};
use crate::config::Config;
use thali_core::error::QuantityPolicy;
use thali_core::service::Planner;

const DEFAULT_LOG_FILTER: &str = "thali=info,thali_core=info";

#[derive(Parser)]
#[command(
    name = "thali",
    version,
    about = "Plan meals and build a shopping list",
    long_about = "Plan meals and build a shopping list.\n\n\
        Pick meals from your collection, say how many servings of each, and thali \
        scales and merges their ingredients into one list grouped by fresh, tinned, \
        dry and dairy."
)]
struct Cli {
    /// Directory holding the database, saved plans and API key
    #[arg(long, global = true, env = "THALI_DATA_DIR", value_name = "PATH")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add, edit and browse meals
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// Build, save and review meal plans
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Ingredient catalog and sample data
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
        /// Fail plan requests on non-numeric quantities instead of dropping them
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Add a meal
    Add {
        /// Meal name
        name: String,
        #[command(flatten)]
        fields: IngredientArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a meal. Only the given fields change; ingredient flags replace
    /// that whole category.
    Edit {
        /// Current meal name
        name: String,
        /// New name
        #[arg(long)]
        rename: Option<String>,
        #[command(flatten)]
        fields: IngredientArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one meal with its ingredients
    Show {
        /// Meal name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all meals
    List {
        /// Group meal names by staple
        #[arg(long)]
        by_staple: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete meals by name
    Delete {
        /// Meal names
        #[arg(required = true)]
        names: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find meals that use an ingredient
    Search {
        /// Ingredient name (e.g. "Chickpeas")
        ingredient: String,
        /// Restrict to one category: fresh, tinned, dry, dairy
        #[arg(short, long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List meals carrying a tag (Spring/Summer, Autumn/Winter, Quick/Easy, Special)
    Inspire {
        /// Tag name
        tag: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Build a shopping list from selected meals
    Create {
        /// Meal names
        #[arg(required = true)]
        meals: Vec<String>,
        /// Servings for each meal, in the same order (missing ones default to 1)
        #[arg(short, long = "quantity", value_name = "N")]
        quantities: Vec<String>,
        /// Extra items to buy, added to the list as-is
        #[arg(short, long = "extra", value_name = "ITEM")]
        extras: Vec<String>,
        /// Save the plan (under --name, or a timestamp)
        #[arg(long)]
        save: bool,
        /// Name to save the plan under
        #[arg(long, requires = "save")]
        name: Option<String>,
        /// Fail on non-numeric quantities instead of dropping them
        #[arg(long)]
        strict: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a saved plan, or a single meal as a plan ("plan:<name>" or "meal:<name>")
    Show {
        /// Plan or meal name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List saved plans
    Saved {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete saved plans
    Delete {
        /// Plan names
        #[arg(required = true)]
        names: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record that the meals in a plan were made
    Made {
        /// Plan or meal name ("plan:<name>" or "meal:<name>")
        name: String,
        /// Date made (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CatalogCommands {
    /// Show the built-in ingredient catalog with units
    Show {
        /// Only one category: fresh, tinned, dry, dairy
        #[arg(short, long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record every ingredient and tag in use in the catalog tables
    Refresh {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import meals from a sample-data JSON file
    Import {
        /// Path to the JSON file
        file: PathBuf,
        /// Remove all existing meals first
        #[arg(long)]
        replace: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export all meals in the sample-data format
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Output the export summary as JSON (with --output)
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.data_dir)?;
    let planner = Planner::open(&config.db_path, Box::new(config.plan_store()))?;

    match cli.command {
        Commands::Meal { command } => match command {
            MealCommands::Add { name, fields, json } => cmd_meal_add(&planner, &name, &fields, json),
            MealCommands::Edit {
                name,
                rename,
                fields,
                json,
            } => cmd_meal_edit(&planner, &name, rename, &fields, json),
            MealCommands::Show { name, json } => cmd_meal_show(&planner, &name, json),
            MealCommands::List { by_staple, json } => cmd_meal_list(&planner, by_staple, json),
            MealCommands::Delete { names, json } => cmd_meal_delete(&planner, &names, json),
            MealCommands::Search {
                ingredient,
                category,
                json,
            } => cmd_meal_search(&planner, &ingredient, category.as_deref(), json),
            MealCommands::Inspire { tag, json } => cmd_meal_inspire(&planner, &tag, json),
        },
        Commands::Plan { command } => match command {
            PlanCommands::Create {
                meals,
                quantities,
                extras,
                save,
                name,
                strict,
                json,
            } => {
                let planner = if strict {
                    planner.with_policy(QuantityPolicy::Reject)
                } else {
                    planner
                };
                let save_as = save.then_some(name);
                cmd_plan_create(&planner, &meals, &quantities, &extras, save_as, json)
            }
            PlanCommands::Show { name, json } => cmd_plan_show(&planner, &name, json),
            PlanCommands::Saved { json } => cmd_plan_saved(&planner, json),
            PlanCommands::Delete { names, json } => cmd_plan_delete(&planner, &names, json),
            PlanCommands::Made { name, date, json } => cmd_plan_made(&planner, &name, date, json),
        },
        Commands::Catalog { command } => match command {
            CatalogCommands::Show { category, json } => cmd_catalog_show(category.as_deref(), json),
            CatalogCommands::Refresh { json } => cmd_catalog_refresh(&planner, json),
            CatalogCommands::Import {
                file,
                replace,
                json,
            } => cmd_catalog_import(&planner, &file, replace, json),
            CatalogCommands::Export { output, json } => {
                cmd_catalog_export(&planner, output.as_deref(), json)
            }
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
            strict,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?.0)
            };
            let planner = if strict {
                planner.with_policy(QuantityPolicy::Reject)
            } else {
                planner
            };
            server::start_server(planner, port, &bind, api_key).await
        }
    }
}
