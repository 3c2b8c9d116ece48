//! Stage orchestration.
//!
//! Each stage reads its predecessor's complete persisted output and writes
//! its own before returning, so any stage can be re-run on its own and a
//! crashed run resumes from the checkpoints on disk.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};
use vidtax_core::{AnnotationLedger, Assignments, IndexCheckpoint, TaxonomyTree, Usage};
use vidtax_embed::{
    EmbeddingProcessor, EmbeddingService, QdrantRestStore, RemoteEmbeddingBackend, VectorStore,
};
use vidtax_error::{ErrorPolicy, TracingPolicy};
use vidtax_io::{CheckpointStore, JsonArtifact};
use vidtax_llm::{
    CategoryConsolidator, ChatClient, ChatHttpConfig, LlmTaxonomyServices, LlmTopicGenerator,
    OpenRouter, SubtreeRefiner, TopicGenerator,
};
use vidtax_taxonomy::{
    PathIndex, RefineStats, Refiner, TaxonomyStore, assign_ids, build_draft,
};

use crate::annotator::{AnnotateReport, Annotator};
use crate::config::{ArtifactPaths, PipelineConfig};
use crate::error::PipelineError;
use crate::indexer::{IndexReport, VectorIndexer, build_documents};
use crate::mapper::{MapReport, map_records};
use crate::records::load_records;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Annotate,
    Draft,
    Refine,
    Assign,
    Map,
    Index,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Annotate,
        Stage::Draft,
        Stage::Refine,
        Stage::Assign,
        Stage::Map,
        Stage::Index,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Annotate => "annotate",
            Stage::Draft => "draft",
            Stage::Refine => "refine",
            Stage::Assign => "assign",
            Stage::Map => "map",
            Stage::Index => "index",
        }
    }

    fn needs_llm(self) -> bool {
        matches!(self, Stage::Annotate | Stage::Refine)
    }

    fn needs_vectors(self) -> bool {
        matches!(self, Stage::Index)
    }
}

impl std::str::FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PipelineError::UnknownStage(s.to_string()))
    }
}

/// The external services, each present only when a stage that uses it will run.
#[derive(Clone, Default)]
pub struct Services {
    topics: Option<Arc<dyn TopicGenerator>>,
    consolidator: Option<Arc<dyn CategoryConsolidator>>,
    refiner: Option<Arc<dyn SubtreeRefiner>>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    store: Option<Arc<dyn VectorStore>>,
}

impl Services {
    /// Build the live clients `stages` need. Keys are read from the environment here.
    pub fn from_config(cfg: &PipelineConfig, stages: &[Stage]) -> Result<Self, PipelineError> {
        let mut services = Services::default();
        if stages.iter().any(|s| s.needs_llm()) {
            let http = reqwest::Client::new();
            let http_cfg = ChatHttpConfig {
                timeout: std::time::Duration::from_secs(cfg.llm.timeout_secs),
                ..ChatHttpConfig::default()
            };
            let client = |model: &str| -> Result<ChatClient, PipelineError> {
                let client = ChatClient::for_router::<OpenRouter>(
                    http.clone(),
                    model,
                    Some(cfg.llm.base_url.as_str()),
                    Some(cfg.llm.api_key_env.as_str()),
                )?
                .with_config(http_cfg);
                Ok(match cfg.llm.temperature {
                    Some(t) => client.with_temperature(t),
                    None => client,
                })
            };
            services.topics = Some(Arc::new(LlmTopicGenerator::new(
                client(&cfg.llm.topic_model)?,
                cfg.llm.topic_rates,
                cfg.annotator.transcript_max_chars,
            )));
            let taxonomy = Arc::new(LlmTaxonomyServices::new(
                client(&cfg.llm.taxonomy_model)?,
                cfg.llm.taxonomy_rates,
                cfg.refine.max_categories,
            ));
            services.consolidator = Some(taxonomy.clone());
            services.refiner = Some(taxonomy);
        }
        if stages.iter().any(|s| s.needs_vectors()) {
            services.embedder = Some(Arc::new(RemoteEmbeddingBackend::new(&cfg.embedding)?));
            services.store = Some(Arc::new(QdrantRestStore::new(&cfg.vector_store)?));
        }
        Ok(services)
    }

    pub fn with_topics(mut self, topics: Arc<dyn TopicGenerator>) -> Self {
        self.topics = Some(topics);
        self
    }

    pub fn with_taxonomy(
        mut self,
        consolidator: Arc<dyn CategoryConsolidator>,
        refiner: Arc<dyn SubtreeRefiner>,
    ) -> Self {
        self.consolidator = Some(consolidator);
        self.refiner = Some(refiner);
        self
    }

    pub fn with_vectors(
        mut self,
        embedder: Arc<dyn EmbeddingService>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        self.embedder = Some(embedder);
        self.store = Some(store);
        self
    }
}

fn unavailable(what: &str, stage: Stage) -> PipelineError {
    PipelineError::Config(format!("stage `{}` needs a {what}, none configured", stage.name()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeSummary {
    pub categories: usize,
    pub nodes: usize,
}

/// Per-stage results of one invocation; stages that did not run are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    pub annotate: Option<AnnotateReport>,
    pub draft: Option<TreeSummary>,
    pub refine: Option<RefineStats>,
    pub assign: Option<TreeSummary>,
    pub map: Option<MapReport>,
    pub index: Option<IndexReport>,
}

impl PipelineReport {
    fn annotate_usage(&self) -> Usage {
        self.annotate.as_ref().map(|r| r.usage).unwrap_or_default()
    }

    pub fn total_tokens(&self) -> u64 {
        self.annotate_usage().total_tokens
            + self.refine.as_ref().map_or(0, |r| r.total_tokens)
    }

    pub fn total_cost(&self) -> f64 {
        self.annotate_usage().cost_usd + self.refine.as_ref().map_or(0.0, |r| r.total_cost)
    }

    /// Human-readable token and cost summary.
    pub fn render(&self) -> String {
        let mut out = String::from("=== FINAL REPORT ===\n");
        let ann = self.annotate_usage();
        let (ref_tokens, ref_cost, ref_time) = self
            .refine
            .as_ref()
            .map_or((0, 0.0, 0.0), |r| (r.total_tokens, r.total_cost, r.total_time));
        let _ = writeln!(out, "Annotation tokens:      {}", ann.total_tokens);
        let _ = writeln!(out, "Refinement tokens:      {ref_tokens}");
        let _ = writeln!(out, "Total tokens:           {}", self.total_tokens());
        let _ = writeln!(out, "Annotation cost:        ${:.8}", ann.cost_usd);
        let _ = writeln!(out, "Refinement cost:        ${ref_cost:.8}");
        let _ = writeln!(out, "Total LLM cost:         ${:.8}", self.total_cost());
        let _ = writeln!(out, "Refinement model time:  {ref_time:.2}s");
        if let Some(a) = &self.annotate {
            let _ = writeln!(
                out,
                "Annotated: {} done, {} failed, {} to retry, {} already done",
                a.outcomes.done, a.outcomes.failed_terminal, a.outcomes.failed_retryable, a.skipped
            );
        }
        if let Some(r) = &self.refine {
            let _ = writeln!(
                out,
                "Categories: {} refined, {} degraded, {} to retry, {} already done",
                r.outcomes.done - r.degraded,
                r.degraded,
                r.outcomes.failed_retryable,
                r.skipped
            );
        }
        if let Some(m) = &self.map {
            let _ = writeln!(
                out,
                "Mapped: {} records, {} unresolved, {} already done",
                m.outcomes.done, m.outcomes.failed_retryable, m.skipped
            );
        }
        if let Some(i) = &self.index {
            let _ = writeln!(
                out,
                "Indexed: {} records, {} to retry, {} already done",
                i.outcomes.done, i.outcomes.failed_retryable, i.skipped
            );
        }
        out.push_str("====================");
        out
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    paths: ArtifactPaths,
    services: Services,
    canonical: TaxonomyStore,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, services: Services) -> Self {
        let paths = config.artifacts();
        let canonical = TaxonomyStore::at(&paths.canonical, TaxonomyTree::new());
        Self {
            config,
            paths,
            services,
            canonical,
        }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Every stage in order. Stops at the first stage that cannot proceed.
    pub async fn run_all(&self) -> Result<PipelineReport, PipelineError> {
        let mut report = PipelineReport::default();
        for stage in Stage::ALL {
            self.run_into(stage, &mut report).await?;
        }
        Ok(report)
    }

    pub async fn run_stage(&self, stage: Stage) -> Result<PipelineReport, PipelineError> {
        let mut report = PipelineReport::default();
        self.run_into(stage, &mut report).await?;
        Ok(report)
    }

    #[instrument(skip_all, fields(stage = stage.name()))]
    async fn run_into(&self, stage: Stage, report: &mut PipelineReport) -> Result<(), PipelineError> {
        let started = std::time::Instant::now();
        let outcome = match stage {
            Stage::Annotate => self.annotate().await.map(|r| report.annotate = Some(r)),
            Stage::Draft => self.draft().map(|r| report.draft = Some(r)),
            Stage::Refine => self.refine().await.map(|r| report.refine = Some(r)),
            Stage::Assign => self.assign().map(|r| report.assign = Some(r)),
            Stage::Map => self.map().map(|r| report.map = Some(r)),
            Stage::Index => self.index().await.map(|r| report.index = Some(r)),
        };
        outcome.inspect_err(|e| TracingPolicy.emit(&vidtax_error::Error::from(e.clone())))?;
        info!(elapsed_secs = started.elapsed().as_secs_f64(), "stage complete");
        Ok(())
    }

    fn require(&self, stage: Stage, path: &Path) -> Result<(), PipelineError> {
        if JsonArtifact::exists(path) {
            Ok(())
        } else {
            Err(PipelineError::MissingArtifact {
                stage: stage.name(),
                path: path.to_path_buf(),
            })
        }
    }

    async fn annotate(&self) -> Result<AnnotateReport, PipelineError> {
        let topics = self
            .services
            .topics
            .clone()
            .ok_or_else(|| unavailable("topic generator", Stage::Annotate))?;
        let cfg = &self.config.annotator;
        let records = load_records(
            &self.config.records_file,
            cfg.transcript_min_length,
            cfg.sample_size,
        )?;
        let mut checkpoint = CheckpointStore::<AnnotationLedger>::open(&self.paths.annotations)?;
        Annotator::new(topics, cfg.concurrency)
            .run(&records, &mut checkpoint)
            .await
    }

    fn draft(&self) -> Result<TreeSummary, PipelineError> {
        self.require(Stage::Draft, &self.paths.annotations)?;
        let annotations: AnnotationLedger = JsonArtifact::read(&self.paths.annotations)?;
        let tree = build_draft(annotations.values());
        JsonArtifact::write(&self.paths.draft, &tree)?;
        Ok(TreeSummary {
            categories: tree.len(),
            nodes: tree.node_count(),
        })
    }

    async fn refine(&self) -> Result<RefineStats, PipelineError> {
        let (consolidator, refiner) = match (&self.services.consolidator, &self.services.refiner) {
            (Some(c), Some(r)) => (c.clone(), r.clone()),
            _ => return Err(unavailable("taxonomy service", Stage::Refine)),
        };
        self.require(Stage::Refine, &self.paths.draft)?;
        let draft: TaxonomyTree = JsonArtifact::read(&self.paths.draft)?;
        let mut checkpoint = CheckpointStore::<TaxonomyTree>::open(&self.paths.canonical)?;
        let stats = Refiner::new(consolidator, refiner, self.config.refine)
            .run(&draft, &mut checkpoint)
            .await;

        let canonical = self.canonical.replace(checkpoint.into_state())?;
        let master = if canonical.is_empty() { &draft } else { canonical.as_ref() };
        JsonArtifact::write(&self.paths.master, master)?;
        Ok(stats)
    }

    fn canonical_tree(&self, stage: Stage) -> Result<Arc<TaxonomyTree>, PipelineError> {
        self.require(stage, &self.paths.canonical)?;
        Ok(self.canonical.reload()?)
    }

    fn assign(&self) -> Result<TreeSummary, PipelineError> {
        let tree = self.canonical_tree(Stage::Assign)?;
        let identified = assign_ids(&tree);
        let index = PathIndex::from_identified(&identified);
        JsonArtifact::write(&self.paths.taxonomy_with_ids, &identified)?;
        JsonArtifact::write(&self.paths.path_index, &index)?;
        info!(entries = index.len(), "path index written");
        Ok(TreeSummary {
            categories: tree.len(),
            nodes: index.len(),
        })
    }

    fn map(&self) -> Result<MapReport, PipelineError> {
        let tree = self.canonical_tree(Stage::Map)?;
        self.require(Stage::Map, &self.paths.annotations)?;
        let index = PathIndex::build(&tree);
        let annotations: AnnotationLedger = JsonArtifact::read(&self.paths.annotations)?;
        let mut checkpoint = CheckpointStore::<Assignments>::open(&self.paths.assignments)?;
        Ok(map_records(&annotations, &index, &mut checkpoint))
    }

    async fn index(&self) -> Result<IndexReport, PipelineError> {
        let (embedder, store) = match (&self.services.embedder, &self.services.store) {
            (Some(e), Some(s)) => (e.clone(), s.clone()),
            _ => return Err(unavailable("embedding service and vector store", Stage::Index)),
        };
        self.require(Stage::Index, &self.paths.annotations)?;
        self.require(Stage::Index, &self.paths.assignments)?;
        let cfg = &self.config.annotator;
        let records = load_records(
            &self.config.records_file,
            cfg.transcript_min_length,
            cfg.sample_size,
        )?;
        let annotations: AnnotationLedger = JsonArtifact::read(&self.paths.annotations)?;
        let assignments: Assignments = JsonArtifact::read(&self.paths.assignments)?;
        let docs = build_documents(&records, &annotations, &assignments);

        let processor = EmbeddingProcessor::new(embedder, self.config.embedding.max_batch);
        let mut checkpoint = CheckpointStore::<IndexCheckpoint>::open(&self.paths.indexed)?;
        VectorIndexer::new(processor, store, self.config.indexer.upsert_batch)
            .run(&docs, &mut checkpoint)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_parse_by_name() {
        assert_eq!("Refine".parse::<Stage>().unwrap(), Stage::Refine);
        assert_eq!(" index ".parse::<Stage>().unwrap(), Stage::Index);
        assert!(matches!(
            "publish".parse::<Stage>(),
            Err(PipelineError::UnknownStage(_))
        ));
    }

    #[test]
    fn report_sums_both_llm_stages() {
        let report = PipelineReport {
            annotate: Some(AnnotateReport {
                usage: Usage {
                    total_tokens: 100,
                    cost_usd: 0.5,
                    ..Usage::default()
                },
                ..AnnotateReport::default()
            }),
            refine: Some(RefineStats {
                total_tokens: 40,
                total_cost: 0.25,
                ..RefineStats::default()
            }),
            ..PipelineReport::default()
        };
        assert_eq!(report.total_tokens(), 140);
        assert!((report.total_cost() - 0.75).abs() < 1e-12);
        let text = report.render();
        assert!(text.contains("Total tokens:           140"));
    }
}
