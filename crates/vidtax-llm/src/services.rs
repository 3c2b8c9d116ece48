//! The external services the pipeline consumes, and their LLM-backed implementations.

use futures::future::BoxFuture;
use tracing::{instrument, warn};
use vidtax_core::{
    Annotation, MAX_TOPIC_PATHS, NamedEntity, Record, RecordId, TaxonomyNode, Usage,
};

use super::*;
use crate::json::{extract_json_array, extract_json_object, strip_code_fences};
use crate::prompts::{subtree_prompt, top_level_prompt, topic_prompt};
use crate::session::ChatReply;

/// A parsed service answer plus the accounting of the call that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub value: T,
    pub usage: Usage,
}

/// The structured fields the topic generator is asked for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicContent {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub named_entities: Vec<NamedEntity>,
    #[serde(default)]
    pub intention: String,
    #[serde(default)]
    pub hierarchical_topics: Vec<String>,
}

impl TopicContent {
    pub fn into_annotation(self, record_id: RecordId, usage: Usage) -> Annotation {
        let mut topics = self.hierarchical_topics;
        topics.truncate(MAX_TOPIC_PATHS);
        Annotation {
            record_id,
            description: self.description,
            named_entities: self.named_entities,
            intention: self.intention,
            hierarchical_topics: topics,
            usage,
            error: None,
            raw_response: None,
        }
    }
}

/// Per-record topic/metadata generation.
///
/// Unusable model output is reported as [`LlmError::MalformedOutput`], so
/// callers can tell it apart from transport failures.
pub trait TopicGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        record: &'a Record,
    ) -> BoxFuture<'a, Result<Reply<TopicContent>, LlmError>>;
}

/// Top-level category consolidation.
pub trait CategoryConsolidator: Send + Sync {
    fn consolidate<'a>(
        &'a self,
        categories: &'a [String],
    ) -> BoxFuture<'a, Result<Reply<Vec<String>>, LlmError>>;
}

/// Subtree refinement for one canonical category.
///
/// Implementations only parse; checking the answer against the input subtree
/// is the caller's job.
pub trait SubtreeRefiner: Send + Sync {
    fn refine<'a>(
        &'a self,
        category: &'a str,
        subtree: &'a TaxonomyNode,
    ) -> BoxFuture<'a, Result<Reply<TaxonomyNode>, LlmError>>;
}

fn malformed(message: impl ToString, raw: &str, usage: Usage) -> LlmError {
    LlmError::MalformedOutput {
        message: message.to_string(),
        raw: raw.to_string(),
        usage,
    }
}

/// Parse `text` as `T`, retrying on the span selected by `extract` before giving up.
fn parse_lenient<T: serde::de::DeserializeOwned>(
    text: &str,
    extract: fn(&str) -> &str,
) -> Result<T, serde_json::Error> {
    let cleaned = strip_code_fences(text);
    serde_json::from_str(&cleaned).or_else(|e| {
        let candidate = extract(&cleaned);
        if candidate.len() == cleaned.len() {
            Err(e)
        } else {
            serde_json::from_str(candidate)
        }
    })
}

#[derive(Debug, Clone)]
pub struct LlmTopicGenerator {
    client: ChatClient,
    rates: CostRates,
    transcript_max_chars: usize,
}

impl LlmTopicGenerator {
    pub fn new(client: ChatClient, rates: CostRates, transcript_max_chars: usize) -> Self {
        Self {
            client,
            rates,
            transcript_max_chars,
        }
    }

    #[instrument(skip_all, fields(record_id = %record.record_id))]
    async fn generate_inner(&self, record: &Record) -> Result<Reply<TopicContent>, LlmError> {
        let prompt = topic_prompt(record, self.transcript_max_chars);
        let ChatReply {
            content,
            usage,
            elapsed,
        } = self.client.complete(&prompt).await?;
        let usage = self.rates.usage_for(usage, &prompt, &content, elapsed);
        match parse_lenient::<TopicContent>(&content, extract_json_object) {
            Ok(value) => Ok(Reply { value, usage }),
            Err(e) => {
                warn!(error = %e, "topic generator returned unparsable output");
                Err(malformed(e, &content, usage))
            }
        }
    }
}

impl TopicGenerator for LlmTopicGenerator {
    fn generate<'a>(
        &'a self,
        record: &'a Record,
    ) -> BoxFuture<'a, Result<Reply<TopicContent>, LlmError>> {
        Box::pin(self.generate_inner(record))
    }
}

/// Category consolidation and subtree refinement over one chat model.
#[derive(Debug, Clone)]
pub struct LlmTaxonomyServices {
    client: ChatClient,
    rates: CostRates,
    max_categories: usize,
}

impl LlmTaxonomyServices {
    pub fn new(client: ChatClient, rates: CostRates, max_categories: usize) -> Self {
        Self {
            client,
            rates,
            max_categories,
        }
    }

    #[instrument(skip_all, fields(categories = categories.len()))]
    async fn consolidate_inner(&self, categories: &[String]) -> Result<Reply<Vec<String>>, LlmError> {
        let prompt = top_level_prompt(categories, self.max_categories);
        let reply = self.client.complete(&prompt).await?;
        let usage = self
            .rates
            .usage_for(reply.usage, &prompt, &reply.content, reply.elapsed);
        parse_lenient::<Vec<String>>(&reply.content, extract_json_array)
            .map(|value| Reply { value, usage })
            .map_err(|e| malformed(e, &reply.content, usage))
    }

    #[instrument(skip_all, fields(category = %category))]
    async fn refine_inner(
        &self,
        category: &str,
        subtree: &TaxonomyNode,
    ) -> Result<Reply<TaxonomyNode>, LlmError> {
        let prompt = subtree_prompt(category, subtree);
        let reply = self.client.complete(&prompt).await?;
        // refinement accounting has always been word-count based
        let usage = self
            .rates
            .usage_for(None, &prompt, &reply.content, reply.elapsed);
        let cleaned = strip_code_fences(&reply.content);
        let mut node: TaxonomyNode = serde_json::from_str(extract_json_object(&cleaned))
            .map_err(|e| malformed(e, &reply.content, usage))?;
        if node.is_leaf() {
            return Err(malformed("expected a JSON object", &reply.content, usage));
        }
        node.normalize();
        Ok(Reply { value: node, usage })
    }
}

impl CategoryConsolidator for LlmTaxonomyServices {
    fn consolidate<'a>(
        &'a self,
        categories: &'a [String],
    ) -> BoxFuture<'a, Result<Reply<Vec<String>>, LlmError>> {
        Box::pin(self.consolidate_inner(categories))
    }
}

impl SubtreeRefiner for LlmTaxonomyServices {
    fn refine<'a>(
        &'a self,
        category: &'a str,
        subtree: &'a TaxonomyNode,
    ) -> BoxFuture<'a, Result<Reply<TaxonomyNode>, LlmError>> {
        Box::pin(self.refine_inner(category, subtree))
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;

    fn body(content: &str, with_usage: bool) -> String {
        let mut v = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        });
        if with_usage {
            v["usage"] = serde_json::json!({"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120});
        }
        v.to_string()
    }

    fn client(server: &MockServer) -> ChatClient {
        ChatClient::new(reqwest::Client::new(), &server.url("/api/v1"), "k", "m").unwrap()
    }

    #[tokio::test]
    async fn topic_generator_parses_fenced_json() {
        let server = MockServer::start();
        let content = "```json\n{\"description\": \"a guide\", \"named_entities\": [{\"name\": \"Intel\", \"type\": \"brand\"}], \"intention\": \"tutorial\", \"hierarchical_topics\": [\"technology > hardware\", \"a\", \"b\", \"c\"]}\n```";
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/chat/completions");
            then.status(200).body(body(content, true));
        });
        let generator = LlmTopicGenerator::new(client(&server), CostRates::default(), 4000);
        let record = Record::new("v1", "How to build a PC");
        let reply = generator.generate(&record).await.unwrap();
        assert_eq!(reply.value.intention, "tutorial");
        assert_eq!(reply.usage.total_tokens, 120);

        let annotation = reply.value.into_annotation(record.record_id.clone(), reply.usage);
        assert_eq!(annotation.hierarchical_topics.len(), MAX_TOPIC_PATHS);
        assert!(!annotation.is_error());
    }

    #[tokio::test]
    async fn topic_generator_reports_malformed_output() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/chat/completions");
            then.status(200).body(body("I cannot help with that.", true));
        });
        let generator = LlmTopicGenerator::new(client(&server), CostRates::default(), 4000);
        let err = generator
            .generate(&Record::new("v1", "t"))
            .await
            .unwrap_err();
        match err {
            LlmError::MalformedOutput { raw, usage, .. } => {
                assert_eq!(raw, "I cannot help with that.");
                assert_eq!(usage.total_tokens, 120);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn consolidation_extracts_array_from_prose() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/chat/completions");
            then.status(200)
                .body(body("Sure: [\"gaming\", \"music\"] done", false));
        });
        let services = LlmTaxonomyServices::new(client(&server), CostRates::default(), 10);
        let reply = services
            .consolidate(&["Gaming".into(), "Music".into()])
            .await
            .unwrap();
        assert_eq!(reply.value, vec!["gaming", "music"]);
        assert!(reply.usage.input_tokens > 0, "word-count estimate used");
    }

    #[tokio::test]
    async fn refinement_takes_largest_object_and_normalizes() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/chat/completions");
            then.status(200).body(body(
                "Here it is:\n{\"esports\": {\"apex legends\": null}, \"gameplay\": {}}\nThanks",
                true,
            ));
        });
        let services = LlmTaxonomyServices::new(client(&server), CostRates::default(), 10);
        let input: TaxonomyNode =
            serde_json::from_str(r#"{"esports": {"apex legends": null}, "gameplay": null}"#).unwrap();
        let reply = services.refine("gaming", &input).await.unwrap();
        assert_eq!(reply.value, input);
        // word counts, not provider usage
        assert_ne!(reply.usage.total_tokens, 120);
    }

    #[tokio::test]
    async fn refinement_rejects_non_object() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/chat/completions");
            then.status(200).body(body("null", true));
        });
        let services = LlmTaxonomyServices::new(client(&server), CostRates::default(), 10);
        let err = services
            .refine("gaming", &TaxonomyNode::Leaf)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MalformedOutput { .. }));
    }
}
