//! Configuration loading helpers
//!
//! Layering (lowest to highest): `T::default()`, the config file, then
//! prefixed environment variables. Nested keys in the environment are
//! separated by `__`, e.g. `GWSRV_SCHEDULER__INTERVAL_MS=250`.

use std::path::Path;

use errors::{VoltageError, VoltageResult};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

/// Build the figment for a config file plus environment overrides
///
/// The file format is picked from the extension (`toml`, `yaml`/`yml`, `json`).
pub fn build_figment<T, P>(path: P, env_prefix: &str) -> VoltageResult<Figment>
where
    T: Serialize + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(VoltageError::FileNotFound(path.display().to_string()));
    }

    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| VoltageError::InvalidConfig {
            field: "path".to_string(),
            reason: format!("{} has no extension", path.display()),
        })?;

    let base = Figment::from(Serialized::defaults(T::default()));
    let figment = match extension {
        "toml" => base.merge(Toml::file(path)),
        "yaml" | "yml" => base.merge(Yaml::file(path)),
        "json" => base.merge(Json::file(path)),
        other => {
            return Err(VoltageError::InvalidConfig {
                field: "path".to_string(),
                reason: format!("unsupported config file format: {}", other),
            })
        },
    };

    Ok(figment.merge(Env::prefixed(env_prefix).split("__")))
}

/// Load a typed configuration from `path`, overridden by `env_prefix` variables
pub fn load_config<T, P>(path: P, env_prefix: &str) -> VoltageResult<T>
where
    T: DeserializeOwned + Serialize + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());

    build_figment::<T, _>(path, env_prefix)?
        .extract()
        .map_err(|e| VoltageError::ParseError {
            file: path.display().to_string(),
            error: e.to_string(),
        })
}
