//! Data-warehouse destination engine resolution
//!
//! The destination is configured through `DW_*` environment variables,
//! optionally layered with a config file. Two engine kinds are supported:
//! `postgres` (the default) and `sqlite` for single-node setups, selected
//! by the `engine` key.

use crate::cache::EngineCache;
use crate::config::{ConfigLoader, ConnectorConfig};
use crate::engine::{build_postgres_url, DwEngine};
use crate::error::{ConnectError, Result};
use std::path::Path;
use tracing::info;

/// Environment prefix for destination settings (`DW_HOST`, `DW_DATABASE`, ...)
pub const DW_ENV_PREFIX: &str = "DW";

/// Resolve the destination engine from env/file config, through the cache
pub fn resolve(
    file_path: Option<&Path>,
    cache: &EngineCache,
    reuse: bool,
) -> Result<DwEngine> {
    let mut loader = ConfigLoader::new()
        .default_value("engine", serde_json::json!("postgres"))
        .default_value("port", serde_json::json!(5432));

    if let Some(path) = file_path {
        loader = loader.file(path);
    }

    let config = loader.env_prefix(DW_ENV_PREFIX).load()?;
    let kind = config.str_or("engine", "postgres").to_lowercase();

    match kind.as_str() {
        "postgres" => {
            ensure_keys(&config, &["host", "database", "username", "password"])?;
            let url = build_postgres_url(&config)?;
            cache.get_or_create("dw_postgres", &config, reuse, || {
                DwEngine::postgres_lazy(&url)
            })
        }
        "sqlite" => {
            ensure_keys(&config, &["database_path"])?;
            let path = config.require_str("database_path")?;
            cache.get_or_create("dw_sqlite", &config, reuse, || DwEngine::sqlite(&path))
        }
        other => Err(ConnectError::configuration(format!(
            "Unsupported DW engine '{other}'. Use 'postgres' or 'sqlite'"
        ))),
    }
}

/// Probe the destination connection, swallowing failures into a boolean
pub async fn test_connection(
    file_path: Option<&Path>,
    cache: &EngineCache,
    reuse: bool,
) -> bool {
    match resolve(file_path, cache, reuse) {
        Ok(engine) => {
            let healthy = engine.is_healthy().await;
            info!(healthy, "DW connection probe finished");
            healthy
        }
        Err(error) => {
            info!(error = %error, "DW connection probe failed to resolve config");
            false
        }
    }
}

fn ensure_keys(config: &ConnectorConfig, required: &[&str]) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .filter(|key| {
            config
                .get_str(key)
                .map_or(true, |value| value.trim().is_empty())
        })
        .copied()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConnectError::configuration(format!(
            "Missing required connection config keys: {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_dw_env() {
        for key in [
            "DW_ENGINE",
            "DW_HOST",
            "DW_DATABASE",
            "DW_USERNAME",
            "DW_PASSWORD",
            "DW_DATABASE_PATH",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_sqlite_destination_from_env() {
        clear_dw_env();
        std::env::set_var("DW_ENGINE", "sqlite");
        std::env::set_var("DW_DATABASE_PATH", ":memory:");

        let cache = EngineCache::new();
        let engine = resolve(None, &cache, true).unwrap();
        assert_eq!(engine.dialect().as_str(), "sqlite");
        assert_eq!(cache.len(), 1);

        clear_dw_env();
    }

    #[test]
    #[serial]
    fn test_postgres_destination_requires_credentials() {
        clear_dw_env();
        std::env::set_var("DW_HOST", "db.internal");

        let cache = EngineCache::new();
        let err = resolve(None, &cache, true).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("database"));
        assert!(message.contains("username"));
        assert!(message.contains("password"));

        clear_dw_env();
    }

    #[test]
    #[serial]
    fn test_unknown_engine_kind_rejected() {
        clear_dw_env();
        std::env::set_var("DW_ENGINE", "duckdb");

        let cache = EngineCache::new();
        let err = resolve(None, &cache, true).unwrap_err();
        assert!(err.to_string().contains("Unsupported DW engine"));

        clear_dw_env();
    }
}
