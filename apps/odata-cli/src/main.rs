use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod compile;
mod config;
mod logging;

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(name = "odata")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a JSON query description to a url
    Compile(compile::CompileArgs),
    /// Compile a JSON permission description to an authorization string
    Auth(compile::AuthArgs),
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = config::CliConfig::load(cli.config.as_deref())?;
    logging::init(&config.log_level);
    tracing::debug!(
        api_prefix = %config.api_prefix,
        log_level = %config.log_level,
        "Configuration loaded"
    );

    let output = match &cli.command {
        Commands::Compile(compile) => compile.run(&config),
        Commands::Auth(auth) => auth.run(),
    };
    match output {
        Ok(output) => {
            println!("{output}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            Ok(ExitCode::FAILURE)
        }
    }
}
