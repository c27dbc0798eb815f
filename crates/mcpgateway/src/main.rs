//! The `mcpgateway` binary: serve the dataplane, bridge stdio servers,
//! or collect a sanitized support bundle.

mod bundle;
mod serve;

use clap::{Parser, Subcommand};
use mcpgateway_config::{CliOverrides, ConfigError, GatewayConfig};
use std::path::PathBuf;
use std::process::ExitCode;

/// Process exit codes per the CLI contract.
mod exit {
    /// Success
    pub const OK: u8 = 0;
    /// Generic failure
    pub const FAILURE: u8 = 1;
    /// Configuration invalid
    pub const CONFIG: u8 = 2;
    /// Entity store unavailable at startup
    pub const STORE: u8 = 3;
}

#[derive(Parser)]
#[command(name = "mcpgateway", version, about = "MCP gateway dataplane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the gateway dataplane
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,
        /// Bind port
        #[arg(long)]
        port: Option<u16>,
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Wrap a stdio MCP server and re-expose it over HTTP
    Translate {
        /// Bind host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Bind port
        #[arg(long, default_value_t = 9000)]
        port: u16,
        /// Command to spawn, plus its arguments
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Collect sanitized diagnostics into a directory
    SupportBundle {
        /// Skip log collection
        #[arg(long)]
        no_logs: bool,
        /// Log lines to include from the tail
        #[arg(long, default_value_t = 500)]
        log_lines: usize,
        /// Destination directory
        #[arg(long)]
        output_dir: PathBuf,
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(
    host: Option<String>,
    port: Option<u16>,
    config: Option<PathBuf>,
) -> Result<GatewayConfig, ConfigError> {
    GatewayConfig::load(&CliOverrides {
        host,
        port,
        config_file: config,
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let code = match cli.command {
        Command::Serve { host, port, config } => match load_config(host, port, config) {
            Ok(config) => {
                init_tracing(&config);
                serve::run(config)
            }
            Err(error) => {
                eprintln!("configuration error: {error}");
                exit::CONFIG
            }
        },
        Command::Translate {
            host,
            port,
            command,
        } => {
            let config = GatewayConfig::default();
            init_tracing(&config);
            serve::translate(&host, port, &command)
        }
        Command::SupportBundle {
            no_logs,
            log_lines,
            output_dir,
            config,
        } => match load_config(None, None, config) {
            Ok(config) => match bundle::collect(&config, &output_dir, no_logs, log_lines) {
                Ok(path) => {
                    println!("support bundle written to {}", path.display());
                    exit::OK
                }
                Err(error) => {
                    eprintln!("support bundle failed: {error}");
                    exit::FAILURE
                }
            },
            Err(error) => {
                eprintln!("configuration error: {error}");
                exit::CONFIG
            }
        },
    };
    ExitCode::from(code)
}

fn init_tracing(config: &GatewayConfig) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.to_file {
        let appender =
            tracing_appender::rolling::daily(&config.logging.file_dir, "mcpgateway.log");
        registry
            .with(fmt::layer().json().with_writer(appender))
            .with(fmt::layer())
            .init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
