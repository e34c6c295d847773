mod cmd;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fogbugz_alerts::config::AppConfig;
use fogbugz_alerts::context::AppContext;
use fogbugz_alerts::error::AppResult;
use fogbugz_alerts::infra::http::ReqwestTransport;
use fogbugz_alerts::infra::secrets::{CredentialChain, EnvCredentials, KeyringCredentials};

use crate::cmd::cases::{AlertsArgs, CallArgs, CreateArgs, ForwardArgs, SearchArgs, ShowArgs};
use crate::cmd::config::{self as config_cmd, ConfigArgs};

#[derive(Parser)]
#[command(name = "fbz", author, version, about = "FogBugz alerts and case CLI")]
struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List active alert cases, newest first.
    Alerts(AlertsArgs),
    /// Search cases.
    Search(SearchArgs),
    /// Show one case with its summary and history.
    Show(ShowArgs),
    /// Create a case.
    Create(CreateArgs),
    /// Forward a message on an existing case.
    Forward(ForwardArgs),
    /// Send a raw data command and print the XML reply.
    Call(CallArgs),
    /// Manage CLI configuration.
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    if let Commands::Config(args) = cli.command {
        return config_cmd::run(args.command);
    }

    let config = AppConfig::load()?;
    let credentials = CredentialChain::new()
        .with("environment", EnvCredentials::new())
        .with("keyring", KeyringCredentials::from_config(&config.stored));
    let ctx = AppContext::new(
        config,
        Arc::new(ReqwestTransport::default()),
        Arc::new(credentials),
    );

    match cli.command {
        Commands::Alerts(args) => cmd::cases::alerts(&ctx, args).await,
        Commands::Search(args) => cmd::cases::search(&ctx, args).await,
        Commands::Show(args) => cmd::cases::show(&ctx, args).await,
        Commands::Create(args) => cmd::cases::create(&ctx, args).await,
        Commands::Forward(args) => cmd::cases::forward(&ctx, args).await,
        Commands::Call(args) => cmd::cases::call(&ctx, args).await,
        Commands::Config(_) => Ok(()),
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_env("FBZ_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
