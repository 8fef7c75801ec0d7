use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use odata_query::{AuthParams, QueryCompiler, QueryParams, TracingDiagnostics};
use serde_json::Value;

use crate::config::CliConfig;

#[derive(Args)]
pub struct InputArgs {
    /// JSON file with the query description; `-` or nothing reads stdin
    #[arg(short, long)]
    input: Option<PathBuf>,
}

impl InputArgs {
    fn read(&self) -> anyhow::Result<Value> {
        let file = self
            .input
            .as_deref()
            .filter(|path| *path != Path::new("-"));
        let text = match file {
            None => {
                tracing::debug!("Reading query description from stdin");
                read_stdin()?
            }
            Some(path) => {
                tracing::debug!(path = %path.display(), "Reading query description");
                std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read {}", path.display()))?
            }
        };
        serde_json::from_str(&text).context("input is not valid JSON")
    }
}

fn read_stdin() -> anyhow::Result<String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("cannot read stdin")?;
    Ok(text)
}

#[derive(Args)]
pub struct CompileArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Overrides the configured api prefix
    #[arg(short = 'p', long)]
    api_prefix: Option<String>,
}

impl CompileArgs {
    pub fn run(&self, config: &CliConfig) -> anyhow::Result<String> {
        let params = QueryParams::try_from(&self.input.read()?)?;
        let url = QueryCompiler::new(&TracingDiagnostics).compile(&params)?;
        let prefix = self.api_prefix.as_deref().unwrap_or(&config.api_prefix);
        Ok(format!("{prefix}{url}"))
    }
}

#[derive(Args)]
pub struct AuthArgs {
    #[command(flatten)]
    input: InputArgs,
}

impl AuthArgs {
    pub fn run(&self) -> anyhow::Result<String> {
        let params = AuthParams::try_from(&self.input.read()?)?;
        Ok(QueryCompiler::new(&TracingDiagnostics).compile_auth(&params)?)
    }
}
