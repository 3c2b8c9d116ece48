//! LLM access for the vidtax pipeline.
//!
//! A thin OpenAI-compatible chat client ([`ChatClient`], OpenRouter by
//! default) plus the three services the pipeline consumes, each behind a trait
//! so stages can be driven by scripted fakes in tests:
//! - [`TopicGenerator`]: per-record description, entities, intention and topic paths
//! - [`CategoryConsolidator`]: draft top-level names to a bounded canonical set
//! - [`SubtreeRefiner`]: reorganize one category subtree without inventing topics
pub mod cost;
pub mod error;
pub mod json;
pub mod prompts;
pub mod response;
pub mod router;
pub mod services;
pub mod session;

pub use cost::{CostRates, approx_tokens};
pub use error::LlmError;
pub use router::{OpenRouter, Router};
pub use services::{
    CategoryConsolidator, LlmTaxonomyServices, LlmTopicGenerator, Reply, SubtreeRefiner,
    TopicContent, TopicGenerator,
};
pub use session::{ChatClient, ChatHttpConfig, ChatReply, chat_step, parse_chat_outcome};

use serde::{Deserialize, Serialize};

/// Default number of seconds before an LLM request is abandoned.
pub const LLM_TIMEOUT_SECS: u64 = 45;

