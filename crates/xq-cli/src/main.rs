//! Diagnostics CLI for xq-engine
//!
//! ```bash
//! # List and validate the configured processors
//! xq processors
//! xq check --config ./processors.toml
//!
//! # Normalize a BaseX error message
//! xq translate "Stopped at ., 1/5: [XPST0003] Unexpected end of query."
//!
//! # Parse a saved query-info block
//! xq info plan.txt
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use xq_engine::ProcessorsConfig;

/// Inspect engine configuration and diagnostics
#[derive(Parser, Debug)]
#[command(name = "xq", version, about = "Diagnostics for the xq-engine adapters")]
struct Args {
    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the configured processors
    Processors {
        /// Processors file (defaults to the user config directory)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Validate the processors file without loading any engine
    Check {
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Translate a BaseX error message into a normalized query error
    Translate {
        /// The message; read from --file or stdin when absent
        message: Option<String>,
        #[arg(short, long, value_name = "FILE", conflicts_with = "message")]
        file: Option<PathBuf>,
    },
    /// Parse a BaseX query-info block into run metadata
    Info {
        /// File with the info text; stdin when absent
        file: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("xq=debug,xq_engine=debug,basex_adapter=debug,saxon_adapter=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// Returns whether the command succeeded.
fn run(command: Command) -> Result<bool> {
    match command {
        Command::Processors { config } => {
            let config = load_config(config.as_deref())?;
            for processor in &config.processors {
                let target = processor
                    .connection
                    .as_ref()
                    .map_or_else(|| "local".to_string(), |c| c.display_string());
                println!(
                    "{}\t{}\t{}\t{}",
                    processor.name,
                    processor.backend,
                    processor.distribution.display(),
                    target
                );
            }
            Ok(true)
        }
        Command::Check { config } => {
            let config = load_config(config.as_deref())?;
            let issues = config.validate();
            for issue in &issues {
                println!("{}", issue);
            }
            if issues.is_empty() {
                println!("{} processor(s) ok", config.processors.len());
            }
            Ok(issues.is_empty())
        }
        Command::Translate { message, file } => {
            let message = match message {
                Some(message) => message,
                None => read_input(file.as_deref())?,
            };
            let error = xq_engine_traits::translate::from_diagnostic(&message);
            println!("{}", serde_json::to_string_pretty(&error)?);
            Ok(true)
        }
        Command::Info { file } => {
            let text = read_input(file.as_deref())?;
            let info = basex_adapter::parse_info(&text);
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(true)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ProcessorsConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading processors");
            ProcessorsConfig::load(path).with_context(|| format!("cannot load {}", path.display()))
        }
        None => {
            debug!(path = %ProcessorsConfig::default_path().display(), "loading default processors");
            Ok(ProcessorsConfig::load_default()?)
        }
    }
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}
