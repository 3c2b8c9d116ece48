//! Scripted service doubles. Each counts its calls so tests can assert that a
//! resumed run did no repeated work.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use uuid::Uuid;
use vidtax_core::{normalize_segment, Record, RecordId, TaxonomyNode, Usage};
use vidtax_embed::{
    Distance, EmbedError, EmbeddingService, PayloadFilter, ScoredPoint, StoredPoint, VectorPoint,
    VectorStore,
};
use vidtax_llm::{
    CategoryConsolidator, LlmError, Reply, SubtreeRefiner, TopicContent, TopicGenerator,
};

/// Accounting attached to every scripted success.
pub fn scripted_usage() -> Usage {
    Usage {
        input_tokens: 100,
        output_tokens: 20,
        total_tokens: 120,
        cost_usd: 0.000_013_5,
        elapsed_secs: 0.25,
    }
}

pub fn transport_error() -> LlmError {
    LlmError::Request {
        message: "connection reset by peer".to_string(),
        url: None,
        is_timeout: false,
    }
}

pub fn malformed_error(raw: &str) -> LlmError {
    LlmError::MalformedOutput {
        message: "expected value at line 1 column 1".to_string(),
        raw: raw.to_string(),
        usage: scripted_usage(),
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Topic generator with per-record scripted answers.
///
/// Unscripted records get a single path `General > <title>`. Queued
/// failures are consumed one per call before falling back to the fixed answer.
#[derive(Debug, Default)]
pub struct ScriptedTopicGenerator {
    fixed: Mutex<HashMap<RecordId, Vec<String>>>,
    queued: Mutex<HashMap<RecordId, VecDeque<LlmError>>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    seen: Mutex<Vec<RecordId>>,
}

impl ScriptedTopicGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paths(self, id: &str, paths: &[&str]) -> Self {
        lock(&self.fixed).insert(
            RecordId::from(id),
            paths.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn fail_next(self, id: &str, error: LlmError) -> Self {
        lock(&self.queued)
            .entry(RecordId::from(id))
            .or_default()
            .push_back(error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<RecordId> {
        lock(&self.seen).clone()
    }

    /// Highest number of `generate` calls that were pending at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn answer(&self, record: &Record) -> Result<Reply<TopicContent>, LlmError> {
        if let Some(err) = lock(&self.queued)
            .get_mut(&record.record_id)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        let paths = lock(&self.fixed)
            .get(&record.record_id)
            .cloned()
            .unwrap_or_else(|| vec![format!("General > {}", record.title)]);
        Ok(Reply {
            value: TopicContent {
                description: format!("About {}", record.title),
                named_entities: Vec::new(),
                intention: "inform".to_string(),
                hierarchical_topics: paths,
            },
            usage: scripted_usage(),
        })
    }
}

impl TopicGenerator for ScriptedTopicGenerator {
    fn generate<'a>(
        &'a self,
        record: &'a Record,
    ) -> BoxFuture<'a, Result<Reply<TopicContent>, LlmError>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            lock(&self.seen).push(record.record_id.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            // stay pending for one poll so overlapping calls are observable
            tokio::task::yield_now().await;
            let answer = self.answer(record);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            answer
        }
        .boxed()
    }
}

/// Consolidator that answers with a fixed list, or fails when given none.
#[derive(Debug)]
pub struct ScriptedConsolidator {
    answer: Result<Vec<String>, LlmError>,
    calls: AtomicUsize,
}

impl ScriptedConsolidator {
    pub fn answering(categories: &[&str]) -> Self {
        Self {
            answer: Ok(categories.iter().map(|c| c.to_string()).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: LlmError) -> Self {
        Self {
            answer: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CategoryConsolidator for ScriptedConsolidator {
    fn consolidate<'a>(
        &'a self,
        _categories: &'a [String],
    ) -> BoxFuture<'a, Result<Reply<Vec<String>>, LlmError>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone().map(|value| Reply {
                value,
                usage: scripted_usage(),
            })
        }
        .boxed()
    }
}

#[derive(Debug, Clone)]
enum RefineScript {
    Answer(TaxonomyNode),
    Fail(LlmError),
}

/// Refiner that echoes its input unless a category is scripted otherwise.
#[derive(Debug, Default)]
pub struct ScriptedRefiner {
    scripts: Mutex<HashMap<String, RefineScript>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedRefiner {
    pub fn echo() -> Self {
        Self::default()
    }

    pub fn answer(self, category: &str, node: TaxonomyNode) -> Self {
        lock(&self.scripts).insert(normalize_segment(category), RefineScript::Answer(node));
        self
    }

    pub fn fail(self, category: &str, error: LlmError) -> Self {
        lock(&self.scripts).insert(normalize_segment(category), RefineScript::Fail(error));
        self
    }

    /// Drop the script for `category`, so later calls echo.
    pub fn heal(&self, category: &str) {
        lock(&self.scripts).remove(&normalize_segment(category));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Categories in call order.
    pub fn seen(&self) -> Vec<String> {
        lock(&self.seen).clone()
    }
}

impl SubtreeRefiner for ScriptedRefiner {
    fn refine<'a>(
        &'a self,
        category: &'a str,
        subtree: &'a TaxonomyNode,
    ) -> BoxFuture<'a, Result<Reply<TaxonomyNode>, LlmError>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            lock(&self.seen).push(category.to_string());
            let script = lock(&self.scripts).get(&normalize_segment(category)).cloned();
            match script {
                Some(RefineScript::Fail(e)) => Err(e),
                Some(RefineScript::Answer(node)) => Ok(Reply {
                    value: node,
                    usage: scripted_usage(),
                }),
                None => Ok(Reply {
                    value: subtree.clone(),
                    usage: scripted_usage(),
                }),
            }
        }
        .boxed()
    }
}

/// Deterministic embedder: equal texts map to equal vectors.
#[derive(Debug)]
pub struct FakeEmbedder {
    dimensions: usize,
    calls: AtomicUsize,
    texts: AtomicUsize,
    fail_on_call: Option<usize>,
}

impl FakeEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
            fail_on_call: None,
        }
    }

    /// Fail the `n`th call (1-based) with a transient network error.
    pub fn failing_on_call(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts_embedded(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();
        (0..self.dimensions)
            .map(|i| {
                let byte = (seed.rotate_left((i % 64) as u32) & 0xff) as f32;
                byte / 255.0 + 0.01
            })
            .collect()
    }
}

impl EmbeddingService for FakeEmbedder {
    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, EmbedError>> {
        async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(call) {
                return Err(EmbedError::Network("scripted embedder outage".to_string()));
            }
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| self.vector_for(t)).collect())
        }
        .boxed()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Vector store kept in memory. Records every upsert batch.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    points: Mutex<BTreeMap<Uuid, VectorPoint>>,
    batches: Mutex<Vec<Vec<Uuid>>>,
    collection: Mutex<Option<(usize, Distance)>>,
    ensure_calls: AtomicUsize,
    reject_upserts: AtomicBool,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following upsert fail until called again with `false`.
    pub fn reject_upserts(&self, reject: bool) {
        self.reject_upserts.store(reject, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        lock(&self.points).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn payload(&self, id: &Uuid) -> Option<Value> {
        lock(&self.points).get(id).map(|p| p.payload.clone())
    }

    pub fn upsert_batches(&self) -> Vec<Vec<Uuid>> {
        lock(&self.batches).clone()
    }

    /// Ids in upsert order, with repeats.
    pub fn upserted_ids(&self) -> Vec<Uuid> {
        lock(&self.batches).iter().flatten().copied().collect()
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn collection(&self) -> Option<(usize, Distance)> {
        *lock(&self.collection)
    }
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        dimension: usize,
        distance: Distance,
    ) -> BoxFuture<'_, Result<bool, EmbedError>> {
        async move {
            self.ensure_calls.fetch_add(1, Ordering::SeqCst);
            let mut collection = lock(&self.collection);
            match *collection {
                Some((dim, _)) if dim != dimension => Err(EmbedError::DimensionMismatch {
                    expected: dim,
                    actual: dimension,
                }),
                Some(_) => Ok(false),
                None => {
                    *collection = Some((dimension, distance));
                    Ok(true)
                }
            }
        }
        .boxed()
    }

    fn upsert(
        &self,
        points: Vec<VectorPoint>,
        _wait: bool,
    ) -> BoxFuture<'_, Result<(), EmbedError>> {
        async move {
            if self.reject_upserts.load(Ordering::SeqCst) {
                return Err(EmbedError::Store {
                    operation: "upsert",
                    message: "scripted store outage".to_string(),
                });
            }
            lock(&self.batches).push(points.iter().map(|p| p.id).collect());
            let mut stored = lock(&self.points);
            for point in points {
                stored.insert(point.id, point);
            }
            Ok(())
        }
        .boxed()
    }

    fn search<'a>(
        &'a self,
        vector: &'a [f32],
        filter: Option<&'a PayloadFilter>,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<ScoredPoint>, EmbedError>> {
        async move {
            let mut hits: Vec<ScoredPoint> = lock(&self.points)
                .values()
                .filter(|p| filter.is_none_or(|f| f.matches(&p.payload)))
                .map(|p| ScoredPoint {
                    id: p.id,
                    score: cosine(vector, &p.vector),
                    payload: p.payload.clone(),
                })
                .collect();
            hits.sort_by(|a, b| b.score.total_cmp(&a.score));
            hits.truncate(limit);
            Ok(hits)
        }
        .boxed()
    }

    fn scroll<'a>(
        &'a self,
        filter: Option<&'a PayloadFilter>,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<StoredPoint>, EmbedError>> {
        async move {
            Ok(lock(&self.points)
                .values()
                .filter(|p| filter.is_none_or(|f| f.matches(&p.payload)))
                .take(limit)
                .map(|p| StoredPoint {
                    id: p.id,
                    payload: p.payload.clone(),
                })
                .collect())
        }
        .boxed()
    }
}
