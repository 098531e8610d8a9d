//! `silo test-connection` - probe the warehouse or a source connection

use crate::commands::{EXIT_FAILURE, EXIT_SUCCESS, EXIT_USAGE};
use serde_json::json;
use silo_connect::config::load_config_file;
use silo_connect::{dw, ConnectorContext, ConnectorRegistry};
use std::path::Path;

pub async fn run(
    source: Option<&str>,
    config: Option<&Path>,
    dw_config: Option<&Path>,
) -> i32 {
    let context = ConnectorContext::new();

    let (success, label) = if source == Some("dw") {
        let healthy = dw::test_connection(dw_config, &context.engines, true).await;
        (healthy, "Data Warehouse".to_string())
    } else if let Some(config_path) = config {
        match probe_source(&context, config_path).await {
            Ok(pair) => pair,
            Err(message) => {
                eprintln!("Error loading config: {message}");
                return EXIT_FAILURE;
            }
        }
    } else {
        eprintln!("Error: must specify --source dw or --config <path>");
        return EXIT_USAGE;
    };

    let rendered = json!({"success": success, "label": label});
    println!("{rendered}");

    context.engines.dispose_all().await;
    context.sessions.close_all();

    if success {
        eprintln!("Connection to {label} successful.");
        EXIT_SUCCESS
    } else {
        eprintln!("Connection to {label} failed.");
        EXIT_FAILURE
    }
}

async fn probe_source(
    context: &ConnectorContext,
    config_path: &Path,
) -> Result<(bool, String), String> {
    let connector_config =
        load_config_file(config_path).map_err(|error| error.to_string())?;
    let protocol = connector_config
        .protocol()
        .map_err(|error| error.to_string())?;
    let label = format!("Source ({protocol}) from {}", config_path.display());

    let registry = ConnectorRegistry::builtin(context.clone());
    let mut connector = registry
        .create(&connector_config)
        .map_err(|error| error.to_string())?;

    let connected = connector.connect().await.is_ok();
    connector.close().await;

    Ok((connected, label))
}
