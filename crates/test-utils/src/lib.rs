//! Deterministic stand-ins for the pipeline's external services, plus small
//! fixture builders shared by the workspace's tests.
pub mod fakes;
pub mod fixtures;

pub use fakes::{
    FakeEmbedder, InMemoryVectorStore, ScriptedConsolidator, ScriptedRefiner,
    ScriptedTopicGenerator,
};
pub use fixtures::{annotation, node, record, tree};

use tracing::{level_filters::LevelFilter, Level};

/// Scoped subscriber for a single test. Hold the guard for the test's duration.
pub fn init_test_tracing(
    level: impl Into<LevelFilter> + Into<Level> + Copy,
) -> tracing::subscriber::DefaultGuard {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::filter::Targets::new()
        .with_target("vidtax", level)
        .with_target("vidtax_io", level)
        .with_target("vidtax_llm", level)
        .with_target("vidtax_embed", level)
        .with_target("vidtax_taxonomy", level)
        .with_target("vidtax_pipeline", level)
        .with_target("llm_raw", Level::ERROR);

    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_level(true)
        .without_time()
        .pretty();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt)
        .set_default()
}
