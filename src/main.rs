use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use saaspro_api::app::{app, AppState};
use saaspro_api::auth;
use saaspro_api::config::AppConfig;
use saaspro_api::database::{self, migrations, seed, PgStorage};

#[derive(Parser)]
#[command(name = "saaspro-api")]
#[command(about = "SaaSPro project management API server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Override the configured listen port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Apply the database schema
    Migrate,
    /// Create the initial admin account
    Seed {
        #[arg(long, default_value = "admin")]
        username: String,
        #[arg(long, default_value = "admin123")]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    let pool = database::connect(&config).await?;
    let storage = Arc::new(PgStorage::new(pool.clone()));

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            migrations::run(&pool).await?;

            let port = port.unwrap_or(config.server.port);
            let state = AppState::new(storage, config);

            let listener = TcpListener::bind(("0.0.0.0", port)).await?;
            info!("Listening on {}", listener.local_addr()?);
            axum::serve(listener, app(state)).await?;
        }
        Commands::Migrate => {
            migrations::run(&pool).await?;
        }
        Commands::Seed { username, password } => {
            migrations::run(&pool).await?;

            let hash = auth::hash_password(&password)?;
            seed::seed_admin(storage.as_ref(), &username, &hash).await?;
        }
    }

    Ok(())
}
