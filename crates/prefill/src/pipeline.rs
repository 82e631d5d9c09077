//! Per-document orchestration.
//!
//! For each document the pipeline builds the layout matrix once, asks the
//! heuristic cache to pre-fill what it can, sends only the unresolved fields
//! to the extraction oracle, and feeds the oracle's confirmed values back
//! into the cache so later documents of the same label pay less.
//!
//! Cache mutations are serialized behind a single mutex shared across
//! workers: `preprocess` and `update` read-then-write the same nested
//! records non-atomically, and cache contention is cheap relative to oracle
//! latency. Matrix construction and the oracle call itself run outside the
//! lock, so documents of a batch still overlap where it matters.

use crate::config::{LayoutConfig, PrefillConfig};
use crate::error::Result;
use crate::heuristics::{CacheSnapshot, HeuristicCache};
use crate::layout::{Matrix, TextBox};
use crate::oracle::{ExtractionOracle, FieldSpec, OracleRequest, Usage};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Outcome of processing one document.
#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub label: String,
    /// Every requested key, `None` where no value could be established
    pub values: HashMap<String, Option<String>>,
    /// Keys answered by the heuristic cache
    pub prefilled_keys: Vec<String>,
    /// Keys sent to the oracle
    pub oracle_keys: Vec<String>,
    pub latency: Duration,
    pub usage: Usage,
}

/// Shared extraction pipeline.
///
/// One instance serves a whole batch; it owns the cache behind its lock and
/// may be shared across workers by reference.
pub struct Pipeline {
    layout: LayoutConfig,
    cache: Mutex<HeuristicCache>,
    oracle: Option<Box<dyn ExtractionOracle>>,
}

impl Pipeline {
    /// Build a pipeline with an empty cache. `oracle` may be `None` for
    /// cache-only (offline) runs.
    pub fn new(config: &PrefillConfig, oracle: Option<Box<dyn ExtractionOracle>>) -> Result<Self> {
        Ok(Self {
            layout: config.layout.clone(),
            cache: Mutex::new(HeuristicCache::new(config.cache.clone())?),
            oracle,
        })
    }

    /// Build a pipeline whose cache is restored from `snapshot`.
    pub fn with_snapshot(
        config: &PrefillConfig,
        snapshot: CacheSnapshot,
        oracle: Option<Box<dyn ExtractionOracle>>,
    ) -> Result<Self> {
        Ok(Self {
            layout: config.layout.clone(),
            cache: Mutex::new(HeuristicCache::from_snapshot(config.cache.clone(), snapshot)?),
            oracle,
        })
    }

    /// Process one document: prefill from cache, oracle the rest, learn.
    pub async fn process_document(
        &self,
        label: &str,
        schema: &BTreeMap<String, String>,
        boxes: &[TextBox],
    ) -> Result<DocumentReport> {
        let started = Instant::now();
        let matrix = Matrix::build(boxes, &self.layout);
        let requested: Vec<String> = schema.keys().cloned().collect();

        let (prefilled, remaining_fields) = self.prefill(label, &requested, schema, &matrix);

        let mut values: HashMap<String, Option<String>> = prefilled
            .iter()
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect();
        let mut prefilled_keys: Vec<String> = prefilled.keys().cloned().collect();
        prefilled_keys.sort();
        let mut oracle_keys: Vec<String> = remaining_fields.keys().cloned().collect();
        let mut usage = Usage::default();

        if !remaining_fields.is_empty() {
            match &self.oracle {
                Some(oracle) => {
                    let request = OracleRequest {
                        label: label.to_string(),
                        fields: remaining_fields,
                        matrix: matrix.clone(),
                    };
                    let response = oracle.extract(request).await?;
                    usage = response.usage;

                    self.cache.lock().update(label, &response.values, &matrix);
                    values.extend(response.values);
                }
                None => {
                    // Offline: unresolved keys stay null and nothing new is
                    // learned for them.
                    for key in &oracle_keys {
                        values.insert(key.clone(), None);
                    }
                    oracle_keys.clear();
                }
            }
        }

        tracing::info!(
            %label,
            prefilled = prefilled_keys.len(),
            oracled = oracle_keys.len(),
            "processed document"
        );

        Ok(DocumentReport {
            label: label.to_string(),
            values,
            prefilled_keys,
            oracle_keys,
            latency: started.elapsed(),
            usage,
        })
    }

    /// Cache pass under the lock: pre-fill what the heuristics answer and
    /// build oracle field specs (descriptions plus cached examples) for the
    /// rest.
    fn prefill(
        &self,
        label: &str,
        requested: &[String],
        schema: &BTreeMap<String, String>,
        matrix: &Matrix,
    ) -> (HashMap<String, String>, BTreeMap<String, FieldSpec>) {
        let mut cache = self.cache.lock();
        let prefilled = cache.preprocess(label, requested, matrix);

        let remaining = schema
            .iter()
            .filter(|(key, _)| !prefilled.contains_key(*key))
            .map(|(key, description)| {
                let spec = FieldSpec {
                    description: description.clone(),
                    examples: cache.examples_for_key(label, key).to_vec(),
                };
                (key.clone(), spec)
            })
            .collect();

        (prefilled, remaining)
    }

    /// Snapshot the cache for persistence.
    pub fn export_cache(&self) -> CacheSnapshot {
        self.cache.lock().export()
    }
}
