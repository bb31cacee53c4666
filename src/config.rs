use std::{env, fs, path::Path};

use anyhow::{Context, Result};
use comms::specs::store::{ResourceHints, StoreSpec};
use serde::Deserialize;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8765";

/// What the `serve` command runs: one store and where to place it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelayConfig {
    pub store: StoreSpec,
    #[serde(default)]
    pub resources: ResourceHints,
}

impl RelayConfig {
    /// Reads a `RelayConfig` from the json file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;

        Self::parse(&raw).with_context(|| format!("invalid config at {}", path.display()))
    }

    fn parse(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;

        if config.store.world_size == 0 {
            anyhow::bail!("world_size must be at least 1");
        }

        Ok(config)
    }
}

/// The address the store listens at, taken from the `HOST` and `PORT` variables.
pub fn listen_addr() -> String {
    let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
    format!("{host}:{port}")
}
