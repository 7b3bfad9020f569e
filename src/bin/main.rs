use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use manpower_bridge::transport::NatsTransport;
use manpower_bridge::{Bridge, BridgeSettings, RpcClient, load_settings};
use std::path::PathBuf;
use std::sync::Arc;

/// Request/reply bridge between the manpower backend and its remote services
#[derive(Parser)]
#[command(name = "manpower-bridge")]
#[command(version)]
#[command(about = "Request/reply bridge between the manpower backend and its remote services")]
struct Cli {
    /// Settings file (default: ./manpower-bridge.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the broker and keep the bridge running until Ctrl-C
    Serve,
    /// Perform a single lookup and print the result as JSON
    Lookup {
        /// What to look up
        kind: LookupKind,
        /// Identifier of the record
        id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LookupKind {
    Organization,
    OrganizationLocation,
    OrganizationStructure,
    Job,
    JobLevel,
    Employee,
    User,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let outcome = load_settings(cli.config.as_deref())?;
    for event in &outcome.events {
        event.log();
    }

    let bridge = start_bridge(outcome.settings).await?;
    let result: CliResult<()> = match cli.command {
        Commands::Serve => {
            info!("Bridge ready, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.map_err(Into::into)
        }
        Commands::Lookup { kind, id } => lookup(&bridge.client(), kind, &id).await,
    };

    bridge.shutdown().await;
    result
}

async fn start_bridge(settings: BridgeSettings) -> CliResult<Bridge> {
    let transport = Arc::new(NatsTransport::connect(&settings.broker_url).await?);
    Ok(Bridge::start(transport, settings).await?)
}

async fn lookup(client: &RpcClient, kind: LookupKind, id: &str) -> CliResult<()> {
    let value = match kind {
        LookupKind::Organization => serde_json::to_value(client.find_organization_by_id(id).await?)?,
        LookupKind::OrganizationLocation => {
            serde_json::to_value(client.find_organization_location_by_id(id).await?)?
        }
        LookupKind::OrganizationStructure => {
            serde_json::to_value(client.find_organization_structure_by_id(id).await?)?
        }
        LookupKind::Job => serde_json::to_value(client.find_job_by_id(id).await?)?,
        LookupKind::JobLevel => serde_json::to_value(client.find_job_level_by_id(id).await?)?,
        LookupKind::Employee => serde_json::to_value(client.find_employee_by_id(id).await?)?,
        LookupKind::User => serde_json::to_value(client.find_user_by_id(id).await?)?,
    };

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
