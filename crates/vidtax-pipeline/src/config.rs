//! Layered pipeline configuration.
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file
//! (`--config <path>`, else `<config_dir>/vidtax/config.toml`), then
//! `VIDTAX_*` environment variables with `__` separating nested keys, e.g.
//! `VIDTAX_ANNOTATOR__CONCURRENCY=8`. API keys never live here, only the
//! names of the variables that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vidtax_embed::{EmbeddingConfig, VectorStoreConfig};
use vidtax_llm::{CostRates, LLM_TIMEOUT_SECS, OpenRouter, Router};
use vidtax_taxonomy::RefineSettings;

use crate::error::PipelineError;

pub const ENV_PREFIX: &str = "VIDTAX";
pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-lite-001";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding every checkpoint and artifact.
    pub data_dir: PathBuf,
    /// JSON array of input records.
    pub records_file: PathBuf,
    pub annotator: AnnotatorConfig,
    pub llm: LlmConfig,
    pub refine: RefineSettings,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub indexer: IndexerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            records_file: PathBuf::from("input/records.json"),
            annotator: AnnotatorConfig::default(),
            llm: LlmConfig::default(),
            refine: RefineSettings::default(),
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            indexer: IndexerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    /// Most generator calls in flight at once.
    pub concurrency: usize,
    /// Records with shorter transcripts (in chars) are not annotated.
    pub transcript_min_length: usize,
    pub transcript_max_chars: usize,
    /// Keep only the first N records.
    pub sample_size: Option<usize>,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            concurrency: 50,
            transcript_min_length: 30,
            transcript_max_chars: 4000,
            sample_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Defaults to the OpenRouter endpoint.
    pub base_url: String,
    pub api_key_env: String,
    pub topic_model: String,
    pub taxonomy_model: String,
    pub topic_rates: CostRates,
    pub taxonomy_rates: CostRates,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: OpenRouter::BASE_URL.to_string(),
            api_key_env: OpenRouter::API_KEY_NAME.to_string(),
            topic_model: DEFAULT_MODEL.to_string(),
            taxonomy_model: DEFAULT_MODEL.to_string(),
            topic_rates: CostRates::default(),
            taxonomy_rates: CostRates::default(),
            timeout_secs: LLM_TIMEOUT_SECS,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Records per embed, upsert and checkpoint unit.
    pub upsert_batch: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self { upsert_batch: 64 }
    }
}

impl PipelineConfig {
    /// Load from `explicit` (which must exist) or the user config file (which may not).
    pub fn load(explicit: Option<&Path>) -> Result<Self, PipelineError> {
        let file = match explicit {
            Some(path) => config::File::from(path).required(true),
            None => {
                let path = dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("vidtax/config.toml");
                config::File::from(path).required(false)
            }
        };
        let cfg = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<PipelineConfig>()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document over the defaults, without consulting the environment.
    pub fn from_toml_str(doc: &str) -> Result<Self, PipelineError> {
        let cfg: PipelineConfig =
            toml::from_str(doc).map_err(|e| PipelineError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.annotator.concurrency == 0 {
            return Err(PipelineError::Config(
                "annotator.concurrency must be at least 1".into(),
            ));
        }
        if self.indexer.upsert_batch == 0 {
            return Err(PipelineError::Config(
                "indexer.upsert_batch must be at least 1".into(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(PipelineError::Config(
                "embedding.dimensions must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn artifacts(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.data_dir)
    }
}

/// Fixed artifact locations under the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub annotations: PathBuf,
    pub draft: PathBuf,
    pub canonical: PathBuf,
    pub master: PathBuf,
    pub taxonomy_with_ids: PathBuf,
    pub path_index: PathBuf,
    pub assignments: PathBuf,
    pub indexed: PathBuf,
    pub logs: PathBuf,
}

impl ArtifactPaths {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            annotations: data_dir.join("processed_videos.json"),
            draft: data_dir.join("draft_taxonomy.json"),
            canonical: data_dir.join("canonical_taxonomy.json"),
            master: data_dir.join("master_taxonomy.json"),
            taxonomy_with_ids: data_dir.join("taxonomy_with_ids.json"),
            path_index: data_dir.join("path_index.json"),
            assignments: data_dir.join("video_to_taxonomy_map.json"),
            indexed: data_dir.join("indexed_ytids.json"),
            logs: data_dir.join("logs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use vidtax_taxonomy::MergeStrategy;

    use super::*;

    #[test]
    fn defaults_match_production_settings() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.annotator.concurrency, 50);
        assert_eq!(cfg.annotator.transcript_max_chars, 4000);
        assert_eq!(cfg.refine.max_categories, 10);
        assert_eq!(cfg.embedding.dimensions, 1536);
        assert_eq!(cfg.embedding.max_batch, 1000);
        assert_eq!(cfg.indexer.upsert_batch, 64);
        assert_eq!(cfg.vector_store.collection, "videos_viewstats");
        assert_eq!(cfg.llm.api_key_env, "OPENROUTER_API_KEY");
    }

    #[test]
    fn partial_toml_overrides_only_named_keys() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
            data_dir = "/tmp/vidtax"

            [annotator]
            concurrency = 4

            [refine]
            merge = "deep"
            accept_degraded = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/vidtax"));
        assert_eq!(cfg.annotator.concurrency, 4);
        assert_eq!(cfg.annotator.transcript_min_length, 30);
        assert_eq!(cfg.refine.merge, MergeStrategy::Deep);
        assert!(!cfg.refine.accept_degraded);
        assert_eq!(cfg.refine.max_categories, 10);
        assert_eq!(
            cfg.artifacts().canonical,
            PathBuf::from("/tmp/vidtax/canonical_taxonomy.json")
        );
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = PipelineConfig::from_toml_str("[annotator]\nconcurrency = 0").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vidtax.toml");
        std::fs::write(&path, "[indexer]\nupsert_batch = 16\n").unwrap();
        let cfg = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.indexer.upsert_batch, 16);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PipelineConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
