//! brisk CLI - static site asset builder with live reload.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "brisk")]
#[command(about = "Build HTML, Sass, scripts and images into a static site")]
#[command(version)]
pub struct Cli {
    /// Defaults to `dev`
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to brisk.toml config file
    #[arg(short, long, default_value = "brisk.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the site once
    Build {
        /// Destination directory (defaults to config or "docs")
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },

    /// Build, then watch sources and serve the site with live reload
    Dev {
        /// Destination directory (defaults to config or "docs")
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let config = config::load_config(&cli.config)?;

    match cli.command {
        Some(Commands::Build { dest }) => {
            commands::build::run(&config, dest).await?;
        }
        Some(Commands::Dev {
            dest,
            port,
            host,
            no_open,
        }) => {
            let options = commands::dev::DevOptions {
                dest,
                port,
                host,
                no_open,
            };
            commands::dev::run(&config, options).await?;
        }
        None => {
            commands::dev::run(&config, Default::default()).await?;
        }
    }

    Ok(())
}
