//! Extraction oracle boundary.
//!
//! The oracle is the external LLM service that authoritatively extracts
//! field values when the heuristic cache cannot. This module carries only
//! the boundary: the request/response shapes, the prompt rendering, the
//! token/cost accounting, and a reqwest-backed implementation against an
//! OpenAI-compatible endpoint.

mod openai;
mod prompt;

pub use openai::OpenAiOracle;
pub use prompt::render_prompt;

use crate::error::Result;
use crate::layout::Matrix;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// USD per 1M input tokens for the default model (as of 2025-11-02).
pub const PRICE_PER_1M_INPUT_TOKENS: f64 = 0.25;
/// USD per 1M output tokens for the default model (as of 2025-11-02).
pub const PRICE_PER_1M_OUTPUT_TOKENS: f64 = 2.0;

/// One requested field: what it means, and previously confirmed values the
/// cache has seen for it. Examples guide the oracle towards the patterns
/// earlier documents of the same label established.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

/// A single extraction request: the unresolved fields of one document,
/// together with the document's matrix representation.
///
/// Fields are kept in a `BTreeMap` so the rendered request is deterministic.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub label: String,
    pub fields: BTreeMap<String, FieldSpec>,
    pub matrix: Matrix,
}

/// Token accounting for one oracle call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    /// Estimated cost of this usage in USD.
    pub fn cost_usd(&self) -> f64 {
        (self.input_tokens as f64 / 1_000_000.0) * PRICE_PER_1M_INPUT_TOKENS
            + (self.output_tokens as f64 / 1_000_000.0) * PRICE_PER_1M_OUTPUT_TOKENS
    }

    pub fn accumulate(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// The oracle's answer: one entry per requested field, `None` where the
/// document does not contain the information.
#[derive(Debug, Clone, Default)]
pub struct OracleResponse {
    pub values: HashMap<String, Option<String>>,
    pub usage: Usage,
}

/// External extraction service.
///
/// Implementations must answer every requested key, using `None` for fields
/// absent from the document, and must never invent keys the request did not
/// ask for.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    async fn extract(&self, request: OracleRequest) -> Result<OracleResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_cost() {
        let usage = Usage {
            input_tokens: 1_000_000,
            output_tokens: 500_000,
        };
        assert!((usage.cost_usd() - 1.25).abs() < 1e-9);
        assert_eq!(Usage::default().cost_usd(), 0.0);
    }

    #[test]
    fn test_usage_accumulate() {
        let mut total = Usage::default();
        total.accumulate(Usage {
            input_tokens: 100,
            output_tokens: 10,
        });
        total.accumulate(Usage {
            input_tokens: 50,
            output_tokens: 5,
        });
        assert_eq!(total.input_tokens, 150);
        assert_eq!(total.output_tokens, 15);
    }
}
