use clap::{Parser, Subcommand};
use gambit::adapters::broker::AlpacaBroker;
use gambit::adapters::dexmon::{DexScreenerProvider, SolPriceCache};
use gambit::agent::{self, AgentDeps};
use gambit::api;
use gambit::config::AppConfig;
use gambit::crisis::indicators::IndicatorClient;
use gambit::error::Result;
use gambit::llm::OpenAiClient;
use gambit::notify::Notifier;
use gambit::persistence::FileStore;
use gambit::signals::twitter::NoopTwitterSource;
use gambit::signals::SignalGatherers;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gambit", version, about = "Autonomous multi-venue trading agent")]
struct Cli {
    /// Path to the bootstrap config (defaults to ./gambit.toml when present)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent and the admin API (default)
    Run,
    /// Load and validate the bootstrap config, then exit
    CheckConfig,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("GAMBIT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info,gambit=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            let config = AppConfig::load(cli.config.as_deref())?;
            println!("config ok: listening on :{}", config.listen_port);
            println!(
                "broker: {} (keys {})",
                config.broker.base_url,
                if config.broker.api_key.is_empty() { "missing" } else { "present" }
            );
            println!(
                "llm: {} (key {})",
                config.llm.base_url,
                if config.llm.api_key.is_empty() { "missing" } else { "present" }
            );
            Ok(())
        }
        Commands::Run => run(cli.config.as_deref()).await.map_err(Into::into),
    }
}

async fn run(config_path: Option<&str>) -> Result<()> {
    let config = AppConfig::load(config_path)?;

    if config.api_token.is_empty() {
        warn!("api_token is empty: every mutating admin route will be rejected");
    }
    if config.broker.api_key.is_empty() {
        warn!("broker credentials missing: broker calls will fail and be logged per tick");
    }

    let deps = AgentDeps {
        broker: Arc::new(AlpacaBroker::new(&config.broker)?),
        llm: Arc::new(OpenAiClient::new(
            config.llm.api_key.clone(),
            config.llm.base_url.clone(),
        )?),
        dex_provider: Arc::new(DexScreenerProvider::new()?),
        sol_price: SolPriceCache::new()?,
        twitter: Arc::new(NoopTwitterSource),
        indicators: IndicatorClient::new(config.fred_api_key.clone())?,
        gatherers: SignalGatherers::new()?,
        store: Arc::new(FileStore::new(&config.state_dir)),
        notifier: Arc::new(Notifier::new(
            config.discord_webhook_url.clone(),
            config.telegram_bot_token.clone(),
            config.telegram_chat_id.clone(),
        )?),
    };

    let handle = agent::spawn(deps).await?;
    info!("gambit agent up; admin API on :{}", config.listen_port);

    tokio::select! {
        result = api::serve(
            handle,
            config.api_token.clone(),
            config.kill_switch_secret.clone(),
            config.listen_port,
        ) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    }
}
