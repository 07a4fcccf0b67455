use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use slotboard::config::SlotboardConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "slotboard")]
#[command(version, about = "Live appointment status board")]
pub struct Cli {
    /// Log at info level (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Backend API base URL. Overrides slotboard.toml and SLOTBOARD_API_URL.
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Live-update WebSocket URL. Overrides slotboard.toml and SLOTBOARD_WS_URL.
    #[arg(long, global = true)]
    pub ws_url: Option<String>,

    /// Hide the WAITLIST column
    #[arg(long, global = true)]
    pub hide_waitlist: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the reference backend
    Serve {
        /// Port to serve on (defaults to [server] port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path (defaults to [server] db_path)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Bind all interfaces and allow any CORS origin
        #[arg(long)]
        dev: bool,
    },
    /// Print the board once
    Board {
        /// Print columns as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move an appointment to another status column
    Move {
        id: i64,
        /// Target status, any casing (e.g. CONFIRMED, in_progress)
        status: String,
    },
    /// Change an appointment's service or start time
    Edit {
        id: i64,

        #[arg(long)]
        service: Option<i64>,

        /// New start time, RFC 3339 (e.g. 2024-05-01T09:00:00Z)
        #[arg(long)]
        start: Option<String>,
    },
    /// Book a new appointment
    Book {
        #[arg(long)]
        service: i64,

        /// Start time, RFC 3339
        #[arg(long)]
        start: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        phone: String,

        #[arg(long)]
        telegram_id: Option<i64>,

        #[arg(long, default_value = "1")]
        shop: i64,
    },
    /// Follow the board live, redrawing on every change
    Watch,
    /// List or add bookable services
    Services {
        #[command(subcommand)]
        command: Option<ServicesCommands>,
    },
    /// List clients known to the backend
    Clients {
        /// Clients to skip
        #[arg(long, default_value = "0")]
        skip: usize,

        /// Page size (the backend caps it at 500)
        #[arg(long, default_value = "100")]
        limit: usize,

        /// Print clients as JSON
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ServicesCommands {
    /// List services
    List,
    /// Add a service
    Add {
        name: String,

        #[arg(long)]
        duration: i64,

        #[arg(long, default_value = "0")]
        price: f64,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default slotboard.toml
    Init,
}

impl Cli {
    /// File and environment configuration with this invocation's flags applied.
    pub fn config(&self, project_dir: &std::path::Path) -> Result<SlotboardConfig> {
        let mut config = SlotboardConfig::resolve(project_dir)?;
        if let Some(url) = &self.api_url {
            config.server.api_url = url.clone();
        }
        if let Some(url) = &self.ws_url {
            config.server.ws_url = url.clone();
        }
        if self.hide_waitlist {
            config.board.hide_waitlist = true;
        }
        Ok(config)
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Serve { port, db_path, dev } => {
            let config = cli.config(&project_dir)?;
            cmd::cmd_serve(&config, *port, db_path.clone(), *dev).await?;
        }
        Commands::Board { json } => {
            cmd::cmd_board(&cli.config(&project_dir)?, *json).await?;
        }
        Commands::Move { id, status } => {
            cmd::cmd_move(&cli.config(&project_dir)?, *id, status).await?;
        }
        Commands::Edit { id, service, start } => {
            cmd::cmd_edit(&cli.config(&project_dir)?, *id, *service, start.as_deref()).await?;
        }
        Commands::Book {
            service,
            start,
            name,
            phone,
            telegram_id,
            shop,
        } => {
            let booking = cmd::parse_booking(*shop, *service, start, name, phone, *telegram_id)?;
            cmd::cmd_book(&cli.config(&project_dir)?, booking).await?;
        }
        Commands::Watch => cmd::cmd_watch(&cli.config(&project_dir)?).await?,
        Commands::Services { command } => {
            cmd::cmd_services(&cli.config(&project_dir)?, command.clone()).await?;
        }
        Commands::Clients { skip, limit, json } => {
            cmd::cmd_clients(&cli.config(&project_dir)?, *skip, *limit, *json).await?;
        }
        Commands::Config { command } => cmd::cmd_config(&cli, &project_dir, command.clone())?,
    }

    Ok(())
}
