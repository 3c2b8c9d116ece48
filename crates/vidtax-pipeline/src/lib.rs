//! The vidtax pipeline: annotate records, build and refine a topic taxonomy,
//! assign ids, map records onto it and index them for vector search.
//!
//! Every stage checkpoints its unit of work, so `vidtax run` can be
//! interrupted at any point and simply started again.
pub mod annotator;
mod commit;
pub mod config;
pub mod error;
pub mod indexer;
pub mod mapper;
pub mod pipeline;
pub mod records;
pub mod tracing_setup;

pub use annotator::{AnnotateReport, Annotator};
pub use config::{ArtifactPaths, PipelineConfig};
pub use error::PipelineError;
pub use indexer::{IndexDocument, IndexReport, VectorIndexer, build_documents};
pub use mapper::{MapReport, map_records};
pub use pipeline::{Pipeline, PipelineReport, Services, Stage};

use std::path::Path;

use color_eyre::eyre::WrapErr;
use tracing::info;

/// Entry point behind `vidtax run`.
pub async fn try_main(stage: Option<Stage>, config_path: Option<&Path>) -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();

    let config = PipelineConfig::load(config_path).wrap_err("failed to load configuration")?;
    let _guards = tracing_setup::init_tracing(&config.artifacts().logs)
        .wrap_err("failed to set up logging")?;

    let stages: Vec<Stage> = match stage {
        Some(s) => vec![s],
        None => Stage::ALL.to_vec(),
    };
    let services = Services::from_config(&config, &stages)?;
    info!(stages = ?stages, data_dir = %config.data_dir.display(), "starting pipeline");

    let pipeline = Pipeline::new(config, services);
    let started = std::time::Instant::now();
    let report = match stage {
        Some(s) => pipeline.run_stage(s).await?,
        None => pipeline.run_all().await?,
    };
    info!(elapsed_secs = started.elapsed().as_secs_f64(), "pipeline finished");
    println!("{}", report.render());
    Ok(())
}
