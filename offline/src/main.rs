//! Tether Offline - administrative tool for offline stores.
//!
//! Inspects pending changes, prints the changeset a sync would send, and
//! resets a store. Configuration comes from the environment (see
//! [`OfflineConfig::from_env`]).

use clap::{Parser, Subcommand};
use tether_offline::{admin, OfflineConfig, OfflineServiceFactory};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tether-offline")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print pending records as JSON lines
    Inspect {
        /// Only this entity type
        #[arg(short, long)]
        collection: Option<String>,
    },
    /// Print the changeset for an entity type
    Changeset {
        /// Entity type
        #[arg(short, long)]
        collection: String,
    },
    /// Delete the configured store
    Reset,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether_offline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = OfflineConfig::from_env()?;

    match args.command {
        Command::Inspect { collection } => {
            let factory = OfflineServiceFactory::new(config);
            let result = admin::inspect(&factory, collection.as_deref(), &mut std::io::stdout()).await;
            factory.close().await;
            result?;
        }
        Command::Changeset { collection } => {
            let factory = OfflineServiceFactory::new(config);
            let result = admin::changeset(&factory, &collection).await;
            factory.close().await;
            println!("{}", serde_json::to_string_pretty(&result?)?);
        }
        Command::Reset => {
            if !admin::reset(&config).await {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
