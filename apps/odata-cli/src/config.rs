use std::path::Path;

use anyhow::{Context, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

/// Environment variables with this prefix override file values,
/// e.g. `ODATA_API_PREFIX`.
pub const ENV_PREFIX: &str = "ODATA_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Prepended to every compiled url
    pub api_prefix: String,
    /// Used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api_prefix: String::new(),
            log_level: "warn".to_owned(),
        }
    }
}

impl CliConfig {
    /// Defaults, then the YAML file at `path`, then `ODATA_*` variables.
    ///
    /// # Errors
    /// Fails when `path` does not exist or any layer has invalid values.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.is_file() {
                bail!("config file not found: {}", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .context("invalid configuration")
    }
}
