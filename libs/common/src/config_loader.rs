//! Configuration loading helper functions
//!
//! Services describe their configuration as a serde type with defaults and
//! load it through figment. Sources, lowest priority first:
//!
//! 1. `T::default()`
//! 2. The configuration file (format chosen by extension)
//! 3. Environment variables `{PREFIX}_*`, nested keys separated by `__`
//!
//! `SAMPLERSRV_SAMPLER__CLOCK_INTERVAL_MS=50` overrides
//! `sampler.clock_interval_ms`.

use std::path::Path;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Build the figment for `T` without extracting it
pub fn figment_for<T>(path: Option<&Path>, env_prefix: &str) -> Result<Figment>
where
    T: Serialize + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Config("Config file must have an extension".to_string()))?;

        figment = match extension {
            "toml" => figment.merge(Toml::file(path)),
            "yaml" | "yml" => figment.merge(Yaml::file(path)),
            "json" => figment.merge(Json::file(path)),
            _ => {
                return Err(Error::Config(format!(
                    "Unsupported config file format: {}",
                    extension
                )))
            },
        };
        info!("Loading configuration from {}", path.display());
    } else {
        debug!("No config file given, using defaults and environment");
    }

    let prefix = format!("{}_", env_prefix.to_uppercase());
    Ok(figment.merge(Env::prefixed(&prefix).split("__")))
}

/// Load configuration for a service
pub fn load_config<T>(path: Option<&Path>, env_prefix: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Serialize + Default,
{
    figment_for::<T>(path, env_prefix)?
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))
}

/// Load configuration from a specific file
pub fn load_config_from_file<T, P>(path: P, env_prefix: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Serialize + Default,
    P: AsRef<Path>,
{
    load_config(Some(path.as_ref()), env_prefix)
}
