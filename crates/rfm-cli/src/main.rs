//! RFM CLI - operation host, probe and animation launcher
//!
//! Configures logging, builds the application for the chosen subcommand and
//! runs it.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod animate;
mod app;
mod config;
mod logging;

use animate::OutputFormat;
use app::{AnimateApp, AnimateOverrides, Application, HostApp, HostOverrides, ProbeApp};

/// RFM Architecture tooling
#[derive(Parser)]
#[command(name = "rfm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "RFM_CONFIG")]
    config: Option<PathBuf>,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the operation host
    Host {
        /// Bind address
        #[arg(short, long)]
        bind: Option<String>,

        /// Stop in-flight operations when they are canceled
        #[arg(long)]
        cooperative: bool,

        /// Greet each client with a connection_status frame
        #[arg(long)]
        announce: bool,
    },

    /// Run the probe scenario against a host
    Probe {
        /// Host URL
        #[arg(short, long)]
        url: Option<String>,
    },

    /// Render the architecture animation
    Animate {
        /// Rendering script
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Output format (asked interactively when omitted)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Open the result without asking
        #[arg(long, conflicts_with = "no_open")]
        open: bool,

        /// Do not open the result
        #[arg(long)]
        no_open: bool,
    },
}

impl Commands {
    fn into_app(self, config: Option<PathBuf>) -> Box<dyn Application> {
        match self {
            Commands::Host {
                bind,
                cooperative,
                announce,
            } => Box::new(HostApp::new(
                config,
                HostOverrides {
                    bind,
                    cooperative,
                    announce,
                },
            )),
            Commands::Probe { url } => Box::new(ProbeApp::new(config, url)),
            Commands::Animate {
                script,
                format,
                open,
                no_open,
            } => {
                let open = match (open, no_open) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                };
                Box::new(AnimateApp::new(
                    config,
                    AnimateOverrides {
                        script,
                        format,
                        open,
                    },
                ))
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match logging::init_logging(cli.debug, cli.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut app = cli.command.into_app(cli.config);
    let code = app::run_app(app.as_mut()).await;

    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
