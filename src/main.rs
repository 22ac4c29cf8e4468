//! Credit Risk Pipeline - Main Entry Point
//!
//! Reads one JSON request from stdin, runs both prediction stages and writes
//! one JSON response to stdout. Logs go to stderr.

use anyhow::{anyhow, Context, Result};
use credit_risk_pipeline::config::{AppConfig, LogFormat, LoggingConfig};
use credit_risk_pipeline::{CreditRiskPipeline, ModelRegistry, PredictionResult};
use std::io::{self, Read};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, info_span, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!(
            "credit_risk_pipeline={0},credit_risk={0}",
            logging.level
        ))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.compact().try_init(),
    }
    .map_err(|e| anyhow!("{e}"))
}

fn emit(result: &PredictionResult) -> ExitCode {
    match serde_json::to_string(result) {
        Ok(line) => println!("{line}"),
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            println!(r#"{{"success":false,"error":"Failed to serialize response"}}"#);
            return ExitCode::FAILURE;
        }
    }

    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn build_pipeline(config: &AppConfig) -> Result<CreditRiskPipeline> {
    let paths = config
        .models
        .resolve_paths()
        .context("Failed to resolve model paths")?;
    info!(
        score_model = %paths.score_model.display(),
        default_model = %paths.default_model.display(),
        "Model paths resolved"
    );

    let models = Arc::new(ModelRegistry::new(paths));
    Ok(CreditRiskPipeline::new(models, &config.prediction))
}

fn main() -> ExitCode {
    let config = AppConfig::load();

    let logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    if let Err(e) = init_tracing(&logging) {
        // Usually an unparseable level; keep going with the defaults.
        let _ = init_tracing(&LoggingConfig::default());
        warn!(error = %e, level = %logging.level, "Invalid logging configuration");
    }

    let span = info_span!("request", request_id = %Uuid::new_v4());
    let _guard = span.enter();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return emit(&PredictionResult::failure(format!("{e:#}")));
        }
    };

    let pipeline = match build_pipeline(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Failed to initialise pipeline");
            return emit(&PredictionResult::failure(format!("{e:#}")));
        }
    };

    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        error!(error = %e, "Failed to read stdin");
        return emit(&PredictionResult::failure(format!("Failed to read input: {e}")));
    }

    emit(&pipeline.handle(&input))
}
