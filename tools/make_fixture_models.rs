//! Fixture Model Writer
//!
//! Writes random-weight stand-ins for both model artifacts so the pipeline
//! can be exercised without trained models.
//!
//! Usage: make-fixture-models [OUTPUT_DIR] [SEED]

use anyhow::Context;
use credit_risk_pipeline::config::AppConfig;
use credit_risk_pipeline::models::fixtures;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use tracing::info;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("make_fixture_models=info".parse()?)
                .add_directive("credit_risk_pipeline=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let out_dir = match args.get(1) {
        Some(dir) => PathBuf::from(dir),
        None => AppConfig::load()?.models.project_root()?,
    };
    let seed: Option<u64> = args
        .get(2)
        .map(|s| s.parse().context("SEED must be an unsigned integer"))
        .transpose()?;

    info!(out_dir = %out_dir.display(), seed = ?seed, "Writing fixture models");

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let paths = fixtures::write_fixture_models(&out_dir, &mut rng)
        .with_context(|| format!("Failed to write fixtures to {}", out_dir.display()))?;

    println!("{}", paths.score_model.display());
    println!("{}", paths.default_model.display());
    Ok(())
}
