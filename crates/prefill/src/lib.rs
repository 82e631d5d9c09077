//! Prefill: a learned positional heuristic cache for document field
//! extraction.
//!
//! Documents of the same label (invoices from one vendor, a recurring report
//! format) tend to carry each field in the same visual position. Prefill
//! exploits that: the first documents of a label are extracted by an LLM
//! oracle, the confirmed values are traced back to positions in a layout
//! matrix, and later documents are pre-filled from those positions without
//! calling the oracle at all.
//!
//! The crate is organized around three pieces:
//!
//! - [`layout`]: groups positioned text boxes into a row/cell [`Matrix`]
//!   and locates values in it,
//! - [`heuristics`]: the per-label, per-key [`HeuristicCache`] that learns
//!   positions, expected value types, and example values,
//! - [`pipeline`]: the per-document orchestration tying the cache to an
//!   [`ExtractionOracle`].
//!
//! ```no_run
//! use prefill::{Pipeline, PrefillConfig, TextBox};
//! use std::collections::BTreeMap;
//!
//! # async fn run() -> prefill::Result<()> {
//! let config = PrefillConfig::default();
//! let pipeline = Pipeline::new(&config, None)?;
//!
//! let boxes = vec![
//!     TextBox::new(0.0, 95.0, 20.0, 105.0, "Total"),
//!     TextBox::new(50.0, 95.0, 70.0, 105.0, "100.00"),
//! ];
//! let mut schema = BTreeMap::new();
//! schema.insert("total".to_string(), "Invoice total amount".to_string());
//!
//! let report = pipeline.process_document("invoice", &schema, &boxes).await?;
//! println!("{:?}", report.values);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod heuristics;
pub mod layout;
pub mod oracle;
pub mod pipeline;
pub mod typing;

pub use config::{CacheConfig, LayoutConfig, OracleConfig, PrefillConfig};
pub use error::{PrefillError, Result};
pub use heuristics::{CacheSnapshot, HeuristicCache, HeuristicRecord, KeyRecord};
pub use layout::{normalize_text, Matrix, Position, TextBox};
pub use oracle::{ExtractionOracle, FieldSpec, OpenAiOracle, OracleRequest, OracleResponse, Usage};
pub use pipeline::{DocumentReport, Pipeline};
pub use typing::ValueKind;
