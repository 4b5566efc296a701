use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley CLI - live-translated pay-per-minute chat engine", long_about = None)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `parley_application=trace`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or create the engine configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run a scripted payer/earner conversation against the in-memory backend
    Simulate {
        /// Mother tongue of the payer
        #[arg(long, default_value = "en")]
        payer_lang: String,
        /// Mother tongue of the earner
        #[arg(long, default_value = "hi")]
        earner_lang: String,
        /// Alternating lines, payer first
        #[arg(long = "line")]
        lines: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration if none exists
    Init,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let repository = commands::config::repository(cli.config)?;
    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&repository)?,
            ConfigAction::Init => commands::config::init(&repository)?,
            ConfigAction::Path => println!("{}", repository.path().display()),
        },
        Commands::Simulate {
            payer_lang,
            earner_lang,
            lines,
        } => {
            let config = repository.load()?;
            commands::simulate::run(config, &payer_lang, &earner_lang, lines).await?
        }
    }

    Ok(())
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "parley_application=info,parley_infrastructure=info".into()),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
