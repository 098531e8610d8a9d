//! `silo run` - execute one pipeline run end to end

use crate::commands::{EXIT_FAILURE, EXIT_SUCCESS};
use serde_json::json;
use silo_connect::config::load_config_file;
use silo_connect::{dw, ConnectorContext, ConnectorRegistry};
use silo_pipeline::{run_pipeline, PipelineParams};
use silo_stage::AuditStatus;
use std::path::{Path, PathBuf};
use tracing::error;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    config: &Path,
    query: &str,
    source: &str,
    table: &str,
    lake: &Path,
    schema: &str,
    pipeline: &str,
    dw_config: Option<&Path>,
) -> i32 {
    let connector_config = match load_config_file(config) {
        Ok(connector_config) => connector_config,
        Err(load_error) => {
            eprintln!("Error loading connector config: {load_error}");
            return EXIT_FAILURE;
        }
    };

    let context = ConnectorContext::new();
    let registry = ConnectorRegistry::builtin(context.clone());

    let dw_engine = match dw::resolve(dw_config, &context.engines, true) {
        Ok(engine) => engine,
        Err(resolve_error) => {
            eprintln!("Error resolving warehouse engine: {resolve_error}");
            return EXIT_FAILURE;
        }
    };

    let params = PipelineParams::new(
        connector_config,
        query,
        source,
        table,
        PathBuf::from(lake),
    )
    .with_schema(Some(schema.to_string()))
    .with_pipeline_name(pipeline);

    let exit_code = match run_pipeline(&registry, &dw_engine, params).await {
        Ok(outcome) => {
            match serde_json::to_string(&outcome) {
                Ok(rendered) => println!("{rendered}"),
                Err(encode_error) => error!(error = %encode_error, "Failed to encode outcome"),
            }

            match outcome.status {
                AuditStatus::Success => {
                    eprintln!(
                        "Pipeline finished successfully. Rows loaded: {}",
                        outcome.rows_loaded
                    );
                    EXIT_SUCCESS
                }
                AuditStatus::Failure => {
                    eprintln!(
                        "Pipeline failed: {}",
                        outcome.error.as_deref().unwrap_or("unknown")
                    );
                    EXIT_FAILURE
                }
            }
        }
        Err(pipeline_error) => {
            let rendered = json!({
                "status": "failure",
                "error": pipeline_error.to_string(),
            });
            println!("{rendered}");
            eprintln!("Unexpected error: {pipeline_error}");
            EXIT_FAILURE
        }
    };

    // Release pooled connections and sessions before the process exits
    context.engines.dispose_all().await;
    context.sessions.close_all();

    exit_code
}
