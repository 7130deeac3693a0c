//! Core pipeline orchestration and domain logic for bookmark-reorg.
//!
//! This crate ties the record store, metadata enrichment, LLM categorization,
//! rendering and validation together into the staged pipeline (see
//! [`pipeline::Pipeline`]).

pub mod cache;
pub mod categorize;
pub mod llm;
pub mod pipeline;
pub mod validate;

pub use cache::reuse_metadata;
pub use categorize::{BatchOutcome, BatchState, CategorizeReport, Categorizer, RetryPolicy};
pub use llm::{ChatMessage, ChatRequest, LlmClient, OpenAiClient};
pub use pipeline::{Mode, Pipeline, RunConfig, RunOutcome};
pub use validate::{Check, ValidationReport, Validator, Violation};
