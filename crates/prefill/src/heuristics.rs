//! Learned positional heuristics keyed by (template label, field key).
//!
//! The cache remembers where confirmed field values sat in past documents of
//! the same label and what kind of value they were. `preprocess` replays
//! those heuristics against a fresh document's matrix to pre-fill fields
//! without an oracle call; `update` learns from the oracle's confirmed
//! results. The cache compounds value across a batch of same-label
//! documents: the first document pays full oracle cost, later ones
//! progressively less as heuristics mature.
//!
//! Every lookup failure in here is a soft cache miss. Missing labels, missing
//! keys, positions that fall outside the current matrix and heuristics whose
//! type no longer corroborates are all skipped silently; the only error this
//! module ever raises is an invalid capacity at construction time.

use crate::config::CacheConfig;
use crate::error::{PrefillError, Result};
use crate::layout::{Matrix, Position};
use crate::typing::{self, ValueKind};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A remembered (position, match count) pair believed likely to hold a
/// field's value in documents of one label.
///
/// `mean_length` tracks a running mean of observed value lengths and is only
/// populated for text-typed fields. It is advisory: recorded for future
/// similarity gating, not yet enforced during matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicRecord {
    pub position: Position,
    pub match_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_length: Option<f64>,
}

/// Per-(label, key) learning state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Confirmed observations seen for this key, never decreasing
    pub observation_count: u64,

    /// Kind a cached position must still yield to be trusted.
    /// `None` means this key has never observed a non-empty value.
    pub expected_type: Option<ValueKind>,

    /// Consecutive observations that disagreed with `expected_type`
    pub type_mismatch_streak: u32,

    /// Bounded ordered set of confirmed values, evicted uniformly at random
    pub example_values: Vec<String>,

    /// Ranked heuristics, sorted descending by `match_count`
    pub heuristics: Vec<HeuristicRecord>,
}

/// Deep copy of the cache structure, for persistence by the caller.
///
/// The snapshot round-trips the full data model through serde; the file
/// format helpers below use JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub labels: HashMap<String, HashMap<String, KeyRecord>>,
}

impl CacheSnapshot {
    pub fn load_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&content).map_err(|e| {
            PrefillError::serialization_with_source(
                format!("Invalid cache snapshot in {}", path.as_ref().display()),
                e,
            )
        })
    }

    pub fn save_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

/// The learned heuristic cache.
///
/// Plain in-memory state with no built-in concurrency control: both
/// `preprocess` and `update` read-then-write the same nested records, so a
/// multi-worker deployment must serialize all calls for one instance behind
/// a single lock. Cache contention is cheap next to oracle latency.
#[derive(Debug)]
pub struct HeuristicCache {
    config: CacheConfig,
    labels: HashMap<String, HashMap<String, KeyRecord>>,
}

impl HeuristicCache {
    /// Create an empty cache.
    ///
    /// The only fatal condition in this module: a heuristics-per-key
    /// capacity below 1 is a configuration error.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            labels: HashMap::new(),
        })
    }

    /// Restore a cache from a previously exported snapshot.
    ///
    /// Capacity invariants are re-enforced on the way in, so a snapshot
    /// written under larger caps loads cleanly under smaller ones.
    pub fn from_snapshot(config: CacheConfig, snapshot: CacheSnapshot) -> Result<Self> {
        let mut cache = Self::new(config)?;
        cache.labels = snapshot.labels;
        for keys in cache.labels.values_mut() {
            for record in keys.values_mut() {
                record
                    .heuristics
                    .sort_by(|a, b| b.match_count.cmp(&a.match_count));
                record.heuristics.truncate(cache.config.max_heuristics_per_key);
                record.example_values.truncate(cache.config.max_examples_per_key);
            }
        }
        Ok(cache)
    }

    /// Export a deep copy of the cache structure for persistence.
    pub fn export(&self) -> CacheSnapshot {
        CacheSnapshot {
            labels: self.labels.clone(),
        }
    }

    /// Try to fill `requested_keys` from cached heuristics against `matrix`.
    ///
    /// For each key with learning state under `label`, heuristics are tried
    /// in rank order and the first one whose position yields a value of the
    /// expected kind wins; its counters are reinforced and the value is
    /// recorded as an example. Keys with no accepting heuristic are simply
    /// absent from the result, left for the oracle. The caller's schema is
    /// never touched: it must exclude returned keys itself before invoking
    /// the oracle.
    pub fn preprocess(
        &mut self,
        label: &str,
        requested_keys: &[String],
        matrix: &Matrix,
    ) -> HashMap<String, String> {
        let max_examples = self.config.max_examples_per_key;
        let mut filled = HashMap::new();

        let Some(keys) = self.labels.get_mut(label) else {
            return filled;
        };

        for key in requested_keys {
            let Some(record) = keys.get_mut(key) else {
                continue;
            };
            let Some(expected) = record.expected_type else {
                continue;
            };

            let accepted = record.heuristics.iter().enumerate().find_map(|(rank, h)| {
                // Out-of-range positions are soft misses: the next heuristic
                // may still fit this document's layout.
                let candidate = matrix.value_at(h.position)?;
                (typing::resolve(&candidate) == Some(expected)).then_some((rank, candidate))
            });

            if let Some((rank, value)) = accepted {
                record.heuristics[rank].match_count += 1;
                record.observation_count += 1;
                push_example(&mut record.example_values, max_examples, &value);
                tracing::debug!(%label, %key, rank, "prefilled field from cached heuristic");
                filled.insert(key.clone(), value);
            }
        }

        filled
    }

    /// Learn from confirmed field values for a document of `label`.
    ///
    /// Empty and null values are skipped. Type learning and example
    /// recording happen even when the value cannot be located in the matrix;
    /// only the positional heuristic is skipped in that case.
    pub fn update(
        &mut self,
        label: &str,
        confirmed_values: &HashMap<String, Option<String>>,
        matrix: &Matrix,
    ) {
        let max_heuristics = self.config.max_heuristics_per_key;
        let max_examples = self.config.max_examples_per_key;
        let flip_threshold = self.config.type_flip_threshold;

        for (key, value) in confirmed_values {
            let Some(value) = value.as_deref() else {
                continue;
            };
            let Some(kind) = typing::resolve(value) else {
                continue;
            };

            let record = self
                .labels
                .entry(label.to_string())
                .or_default()
                .entry(key.clone())
                .or_default();

            record.observation_count += 1;
            adapt_expected_type(record, kind, flip_threshold);
            push_example(&mut record.example_values, max_examples, value);

            let Some(position) = matrix.locate(value) else {
                tracing::debug!(%label, %key, "confirmed value not found in matrix, no heuristic learned");
                continue;
            };

            match record.heuristics.iter_mut().find(|h| h.position == position) {
                Some(existing) => {
                    existing.match_count += 1;
                    if kind == ValueKind::Text {
                        let length = value.chars().count() as f64;
                        let mean = existing.mean_length.get_or_insert(length);
                        *mean += (length - *mean) / existing.match_count as f64;
                    }
                }
                None => record.heuristics.push(HeuristicRecord {
                    position,
                    match_count: 1,
                    mean_length: (kind == ValueKind::Text).then(|| value.chars().count() as f64),
                }),
            }

            record
                .heuristics
                .sort_by(|a, b| b.match_count.cmp(&a.match_count));
            record.heuristics.truncate(max_heuristics);
        }
    }

    /// Previously confirmed values for a key, used to enrich oracle prompts.
    pub fn examples_for_key(&self, label: &str, key: &str) -> &[String] {
        self.labels
            .get(label)
            .and_then(|keys| keys.get(key))
            .map(|record| record.example_values.as_slice())
            .unwrap_or(&[])
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(String::as_str)
    }

    pub fn key_record(&self, label: &str, key: &str) -> Option<&KeyRecord> {
        self.labels.get(label)?.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Flip `expected_type` only after the mismatch streak strictly exceeds the
/// threshold; a matching observation breaks the streak.
fn adapt_expected_type(record: &mut KeyRecord, observed: ValueKind, flip_threshold: u32) {
    match record.expected_type {
        None => record.expected_type = Some(observed),
        Some(current) if current == observed => record.type_mismatch_streak = 0,
        Some(_) => {
            record.type_mismatch_streak += 1;
            if record.type_mismatch_streak > flip_threshold {
                record.expected_type = Some(observed);
                record.type_mismatch_streak = 0;
            }
        }
    }
}

/// Bounded ordered-set insertion with uniform-random eviction.
///
/// Random replacement is a deliberate diversity mechanism: old and new
/// examples survive with equal probability instead of the set degenerating
/// into the most recent N values.
fn push_example(examples: &mut Vec<String>, capacity: usize, value: &str) {
    if capacity == 0 || examples.iter().any(|e| e == value) {
        return;
    }
    if examples.len() >= capacity {
        let evict = rand::thread_rng().gen_range(0..examples.len());
        examples.remove(evict);
    }
    examples.push(value.to_string());
}
