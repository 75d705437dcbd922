mod auth;
mod commands;
mod config;
mod gemini;
mod server;

use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{cmd_ingredients, cmd_seed, cmd_targets, cmd_user_active};
use crate::config::Config;
use crate::gemini::GeminiClient;
use nutrifit_core::ai::{GeneratorHandle, TextGenerator};
use nutrifit_core::db::Database;

const DEFAULT_LOG_FILTER: &str = "nutrifit=info,nutrifit_core=info,tower_http=info";

#[derive(Parser)]
#[command(
    name = "nutrifit",
    version,
    about = "AI diet planner: REST API, ingredient catalog and nutrition targets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,
        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Load the built-in ingredient catalog (skips names already present)
    Seed {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List catalog ingredients
    Ingredients {
        /// Case-insensitive name search
        #[arg(short, long)]
        search: Option<String>,
        /// Category: protein, carbs, vegetables, fruits, dairy, fats, grains, nuts, other
        #[arg(short, long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Calculate daily calorie and macro targets
    Targets {
        /// Age in years
        #[arg(long)]
        age: f64,
        /// Weight in kg
        #[arg(long)]
        weight: f64,
        /// Height in cm
        #[arg(long)]
        height: f64,
        /// Sex: male, female, other
        #[arg(long)]
        sex: Option<String>,
        /// Activity level: sedentary, light, moderate, active, very_active
        #[arg(long)]
        activity: Option<String>,
        /// Goal: lose_weight, gain_weight, maintain, muscle_gain, health_management
        #[arg(long)]
        goal: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Allow the account to log in again
    Activate {
        /// Account email
        email: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Block logins and reject the account's outstanding tokens
    Deactivate {
        /// Account email
        email: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// The Gemini client is built on first use so the server starts without an
/// API key and reports the missing key per request.
fn gemini_handle(config: &Config) -> GeneratorHandle {
    let api_key = config.gemini_api_key.clone();
    let model = config.gemini_model.clone();
    GeneratorHandle::lazy(move || {
        let client = GeminiClient::new(api_key.as_deref(), &model)?;
        let generator: Arc<dyn TextGenerator> = Arc::new(client);
        Ok(generator)
    })
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Serve { port, bind } => {
            let db = Database::open(&config.db_path)?;
            let jwt_secret = config.load_or_create_jwt_secret()?;
            if config.gemini_api_key.is_none() {
                tracing::warn!("GEMINI_API_KEY is not set; AI plan generation will fail");
            }
            server::start_server(db, gemini_handle(&config), &jwt_secret, port, &bind).await
        }
        Commands::Seed { json } => {
            let db = Database::open(&config.db_path)?;
            cmd_seed(&db, json)
        }
        Commands::Ingredients {
            search,
            category,
            json,
        } => {
            let db = Database::open(&config.db_path)?;
            cmd_ingredients(&db, search.as_deref(), category.as_deref(), json)
        }
        Commands::Targets {
            age,
            weight,
            height,
            sex,
            activity,
            goal,
            json,
        } => cmd_targets(
            age,
            weight,
            height,
            sex.as_deref(),
            activity.as_deref(),
            goal.as_deref(),
            json,
        ),
        Commands::User { command } => {
            let db = Database::open(&config.db_path)?;
            match command {
                UserCommands::Activate { email, json } => cmd_user_active(&db, &email, true, json),
                UserCommands::Deactivate { email, json } => {
                    cmd_user_active(&db, &email, false, json)
                }
            }
        }
    }
}
