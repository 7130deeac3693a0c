//! LLM categorization stage.
//!
//! Records are sent to the model in fixed-size batches, one batch at a time
//! and in collection order. Each batch moves through a small state machine:
//!
//! ```text
//! Pending -> Sent -> Validated -> Committed
//!              |
//!              +--> SchemaInvalid -> Sent ...   (bounded by the retry policy)
//!              +--> Pending -> Sent ...         (transport failure)
//!                                     exhausted: Skipped
//! ```
//!
//! A skipped batch leaves its records untouched and never stops later
//! batches.

pub mod prompt;
pub mod retry;
pub mod schema;

use std::ops::Range;

use bookmark_reorg_shared::{BookmarkRecord, CategorizeConfig, LlmError, ProgressReporter};
use tracing::{debug, error, info, instrument, warn};

use crate::llm::{ChatMessage, ChatRequest, LlmClient};

pub use prompt::{StructureSummary, build_messages, summarise_structure, system_prompt};
pub use retry::RetryPolicy;
pub use schema::{CategorizedEntry, decode_response};

// ---------------------------------------------------------------------------
// Batch state
// ---------------------------------------------------------------------------

/// Where a batch is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchState {
    Pending,
    Sent,
    Validated,
    SchemaInvalid,
    Committed,
    Skipped,
}

impl BatchState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_move_to(self, next: BatchState) -> bool {
        use BatchState::*;
        matches!(
            (self, next),
            (Pending, Sent)
                | (Sent, Validated)
                | (Sent, SchemaInvalid)
                | (Sent, Pending)
                | (SchemaInvalid, Sent)
                | (Validated, Committed)
                | (Pending | SchemaInvalid, Skipped)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Skipped)
    }
}

/// The record of one batch's trip through the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Collection positions covered by the batch.
    pub range: Range<usize>,
    /// Every state visited, starting with `Pending`.
    pub history: Vec<BatchState>,
    /// Requests sent for this batch.
    pub attempts: u32,
    /// Model that produced the final answer (or was last tried).
    pub model: String,
    /// Last failure seen, if any.
    pub last_error: Option<String>,
}

impl BatchOutcome {
    fn new(range: Range<usize>, model: &str) -> Self {
        Self {
            range,
            history: vec![BatchState::Pending],
            attempts: 0,
            model: model.to_string(),
            last_error: None,
        }
    }

    pub fn state(&self) -> BatchState {
        self.history.last().copied().unwrap_or(BatchState::Pending)
    }

    /// Attempts beyond the first.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    fn advance(&mut self, next: BatchState) {
        debug_assert!(
            self.state().can_move_to(next),
            "illegal batch transition {:?} -> {next:?}",
            self.state()
        );
        self.history.push(next);
    }
}

/// Summary of a categorization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorizeReport {
    pub batches: Vec<BatchOutcome>,
}

impl CategorizeReport {
    pub fn committed(&self) -> usize {
        self.count(BatchState::Committed)
    }

    pub fn skipped(&self) -> usize {
        self.count(BatchState::Skipped)
    }

    pub fn total_retries(&self) -> u32 {
        self.batches.iter().map(BatchOutcome::retries).sum()
    }

    /// Records whose batch was committed.
    pub fn records_categorized(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.state() == BatchState::Committed)
            .map(|b| b.range.len())
            .sum()
    }

    fn count(&self, state: BatchState) -> usize {
        self.batches.iter().filter(|b| b.state() == state).count()
    }
}

// ---------------------------------------------------------------------------
// Categorizer
// ---------------------------------------------------------------------------

/// Batched LLM categorizer.
///
/// Model and temperature are negotiated during the run: a missing primary
/// model switches to the fallback model, and a model that rejects custom
/// temperatures gets requests without one. Both stick for the rest of the run.
pub struct Categorizer<C> {
    client: C,
    config: CategorizeConfig,
    retry: RetryPolicy,
    system_prompt: String,
    instructions: String,
    model: String,
    temperature: Option<f32>,
}

impl<C: LlmClient> Categorizer<C> {
    pub fn new(client: C, config: CategorizeConfig) -> Self {
        Self {
            retry: RetryPolicy::from(&config),
            system_prompt: system_prompt(config.max_folder_depth, None),
            instructions: prompt::default_instructions(config.max_folder_depth),
            model: config.model.clone(),
            temperature: config.temperature,
            client,
            config,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Free-form operator instructions sent with every batch.
    pub fn with_instructions(mut self, instructions: Option<&str>) -> Self {
        if let Some(text) = instructions.map(str::trim).filter(|t| !t.is_empty()) {
            self.instructions = text.to_string();
        }
        self
    }

    /// Extra directives appended to the built-in system prompt.
    pub fn with_system_extension(mut self, extension: Option<&str>) -> Self {
        self.system_prompt = system_prompt(self.config.max_folder_depth, extension);
        self
    }

    /// Model currently in use.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Temperature currently sent, `None` once the model rejected it.
    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Categorize `records` in place, batch by batch.
    #[instrument(skip_all, fields(records = records.len(), batch_size = self.config.batch_size))]
    pub async fn categorize(
        &mut self,
        records: &mut [BookmarkRecord],
        progress: &dyn ProgressReporter,
    ) -> CategorizeReport {
        let batch_size = self.config.batch_size.max(1);
        let total_batches = records.len().div_ceil(batch_size);
        let mut report = CategorizeReport::default();

        for (number, start) in (0..records.len()).step_by(batch_size).enumerate() {
            let end = (start + batch_size).min(records.len());
            progress.item(number + 1, total_batches, &format!("entries {start}-{}", end - 1));
            info!(model = %self.model, start, end = end - 1, "requesting categorization");

            let structure = summarise_structure(&records[..start]);
            let messages = build_messages(
                &self.system_prompt,
                &self.instructions,
                &records[start..end],
                start,
                &structure,
            );

            let (mut outcome, entries) = self.run_batch(messages, start..end).await;
            match entries {
                Some(entries) => {
                    apply_entries(records, entries);
                    outcome.advance(BatchState::Committed);
                }
                None => {
                    error!(
                        start,
                        end = end - 1,
                        attempts = outcome.attempts,
                        error = outcome.last_error.as_deref().unwrap_or("unknown"),
                        "batch exhausted its retries; leaving records unchanged"
                    );
                    outcome.advance(BatchState::Skipped);
                }
            }
            report.batches.push(outcome);
        }

        info!(
            batches = report.batches.len(),
            committed = report.committed(),
            skipped = report.skipped(),
            retries = report.total_retries(),
            "categorization complete"
        );
        report
    }

    async fn run_batch(
        &mut self,
        messages: Vec<ChatMessage>,
        range: Range<usize>,
    ) -> (BatchOutcome, Option<Vec<CategorizedEntry>>) {
        let mut outcome = BatchOutcome::new(range.clone(), &self.model);

        while outcome.attempts < self.retry.max_attempts {
            outcome.attempts += 1;
            let attempt = outcome.attempts;
            let request = ChatRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                temperature: self.temperature,
            };
            outcome.model = request.model.clone();
            outcome.advance(BatchState::Sent);
            debug!(attempt, model = %request.model, "sending batch");

            match self.client.complete(&request).await {
                Ok(content) => {
                    match decode_response(&content, range.clone(), self.config.max_folder_depth) {
                        Ok(entries) => {
                            outcome.advance(BatchState::Validated);
                            return (outcome, Some(entries));
                        }
                        Err(e) => {
                            warn!(attempt, max = self.retry.max_attempts, error = %e, "response failed schema validation");
                            outcome.advance(BatchState::SchemaInvalid);
                            outcome.last_error = Some(e.to_string());
                        }
                    }
                }
                Err(LlmError::UnsupportedTemperature) if self.temperature.is_some() => {
                    warn!(model = %self.model, "model rejects custom temperature; omitting it from now on");
                    self.temperature = None;
                    outcome.advance(BatchState::Pending);
                    outcome.last_error = Some(LlmError::UnsupportedTemperature.to_string());
                    continue;
                }
                Err(LlmError::ModelNotFound(model)) if attempt == 1 => {
                    outcome.advance(BatchState::Pending);
                    outcome.last_error = Some(LlmError::ModelNotFound(model.clone()).to_string());
                    match self.config.fallback_model.clone().filter(|f| *f != self.model) {
                        Some(fallback) => {
                            warn!(primary = %model, %fallback, "model unavailable; switching to fallback");
                            self.model = fallback;
                        }
                        None => warn!(%model, "model unavailable and no fallback configured"),
                    }
                }
                Err(e) => {
                    warn!(attempt, max = self.retry.max_attempts, error = %e, "LLM request failed");
                    outcome.advance(BatchState::Pending);
                    outcome.last_error = Some(e.to_string());
                }
            }

            if self.retry.allows_retry_after(attempt) {
                let delay = self.retry.delay_after(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                tokio::time::sleep(delay).await;
            }
        }

        (outcome, None)
    }
}

/// Write validated entries onto their records.
fn apply_entries(records: &mut [BookmarkRecord], entries: Vec<CategorizedEntry>) {
    for entry in entries {
        let record = &mut records[entry.index];
        let title = entry
            .title_after
            .unwrap_or_else(|| record.title_before().to_string());
        record.title_after = Some(title);
        record.location_after = Some(entry.location_after);
        record.tags_after = Some(entry.tags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookmark_reorg_shared::SilentProgress;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted replies and records every request.
    struct ScriptedClient {
        replies: Mutex<VecDeque<std::result::Result<String, LlmError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<std::result::Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl LlmClient for &ScriptedClient {
        async fn complete(&self, request: &ChatRequest) -> std::result::Result<String, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::Transport("script exhausted".into())))
        }
    }

    fn config(batch_size: usize) -> CategorizeConfig {
        CategorizeConfig {
            model: "primary".into(),
            fallback_model: Some("fallback".into()),
            batch_size,
            max_folder_depth: 4,
            temperature: Some(0.2),
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }

    fn records(n: usize) -> Vec<BookmarkRecord> {
        (0..n)
            .map(|i| BookmarkRecord::new(format!("https://{i}.example"), format!("Title {i}"), vec![]))
            .collect()
    }

    fn valid(range: Range<usize>) -> std::result::Result<String, LlmError> {
        let entries: Vec<_> = range
            .map(|i| {
                serde_json::json!({
                    "index": i,
                    "title_after": format!("New {i}"),
                    "location_after": format!("Folder{}/Sub", i % 2),
                    "tags": ["t"],
                })
            })
            .collect();
        Ok(serde_json::Value::Array(entries).to_string())
    }

    fn categorizer(client: &ScriptedClient, batch_size: usize) -> Categorizer<&ScriptedClient> {
        Categorizer::new(client, config(batch_size)).with_retry_policy(RetryPolicy::immediate(3))
    }

    #[test]
    fn state_machine_transitions() {
        use BatchState::*;
        assert!(Pending.can_move_to(Sent));
        assert!(Sent.can_move_to(SchemaInvalid));
        assert!(SchemaInvalid.can_move_to(Sent));
        assert!(Validated.can_move_to(Committed));
        assert!(!Sent.can_move_to(Committed));
        assert!(!Committed.can_move_to(Sent));
        assert!(Committed.is_terminal() && Skipped.is_terminal());
    }

    #[tokio::test]
    async fn malformed_twice_then_valid_counts_two_retries() {
        let client = ScriptedClient::new(vec![
            Ok(r#"{"oops": 1}"#.into()),
            Ok("not json".into()),
            valid(0..2),
        ]);
        let mut collection = records(2);

        let report = categorizer(&client, 25)
            .categorize(&mut collection, &SilentProgress)
            .await;

        let batch = &report.batches[0];
        assert_eq!(batch.attempts, 3);
        assert_eq!(batch.retries(), 2);
        assert_eq!(batch.state(), BatchState::Committed);
        assert_eq!(
            batch.history,
            vec![
                BatchState::Pending,
                BatchState::Sent,
                BatchState::SchemaInvalid,
                BatchState::Sent,
                BatchState::SchemaInvalid,
                BatchState::Sent,
                BatchState::Validated,
                BatchState::Committed,
            ]
        );
        assert_eq!(collection[1].location_after, Some(vec!["Folder1".into(), "Sub".into()]));
        assert_eq!(collection[1].title_after.as_deref(), Some("New 1"));
        assert_eq!(collection[1].tags_after, Some(vec!["t".into()]));
    }

    #[tokio::test]
    async fn exhausted_batch_is_skipped_and_later_batches_run() {
        let client = ScriptedClient::new(vec![
            Ok("[]".into()),
            Ok("[]".into()),
            Ok("[]".into()),
            valid(2..4),
        ]);
        let mut collection = records(4);

        let report = categorizer(&client, 2)
            .categorize(&mut collection, &SilentProgress)
            .await;

        assert_eq!(report.batches.len(), 2);
        assert_eq!(report.batches[0].state(), BatchState::Skipped);
        assert_eq!(report.batches[0].attempts, 3);
        assert!(report.batches[0].last_error.as_deref().unwrap().contains("no entry for index 0"));
        assert_eq!(report.batches[1].state(), BatchState::Committed);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.records_categorized(), 2);

        assert!(collection[0].location_after.is_none());
        assert!(collection[0].title_after.is_none());
        assert!(collection[3].has_location());
    }

    #[tokio::test]
    async fn batches_carry_global_indexes_and_prior_structure() {
        let client = ScriptedClient::new(vec![valid(0..2), valid(2..3)]);
        let mut collection = records(3);

        categorizer(&client, 2)
            .categorize(&mut collection, &SilentProgress)
            .await;

        let requests = client.requests();
        assert_eq!(requests.len(), 2);

        let first: serde_json::Value = serde_json::from_str(&requests[0].messages[1].content).unwrap();
        assert_eq!(first["existing_structure"]["folders"], serde_json::json!([]));

        let second: serde_json::Value = serde_json::from_str(&requests[1].messages[1].content).unwrap();
        assert_eq!(second["entries"][0]["index"], 2);
        assert_eq!(second["existing_structure"]["folders"][0]["path"], "Folder0/Sub");
        assert_eq!(second["existing_structure"]["folders"][0]["examples"][0], "New 0");
    }

    #[tokio::test]
    async fn missing_model_switches_to_fallback() {
        let client = ScriptedClient::new(vec![
            Err(LlmError::ModelNotFound("primary".into())),
            valid(0..1),
            valid(1..2),
        ]);
        let mut collection = records(2);
        let mut categorizer = categorizer(&client, 1);

        let report = categorizer.categorize(&mut collection, &SilentProgress).await;

        let models: Vec<_> = client.requests().into_iter().map(|r| r.model).collect();
        assert_eq!(models, vec!["primary", "fallback", "fallback"]);
        assert_eq!(categorizer.model(), "fallback");
        assert_eq!(report.batches[0].model, "fallback");
        assert_eq!(report.committed(), 2);
    }

    #[tokio::test]
    async fn rejected_temperature_is_dropped_for_the_run() {
        let client = ScriptedClient::new(vec![
            Err(LlmError::UnsupportedTemperature),
            valid(0..1),
            valid(1..2),
        ]);
        let mut collection = records(2);
        let mut categorizer = categorizer(&client, 1);

        categorizer.categorize(&mut collection, &SilentProgress).await;

        let temperatures: Vec<_> = client.requests().into_iter().map(|r| r.temperature).collect();
        assert_eq!(temperatures, vec![Some(0.2), None, None]);
        assert_eq!(categorizer.temperature(), None);
    }

    #[tokio::test]
    async fn transport_failures_are_retried() {
        let client = ScriptedClient::new(vec![
            Err(LlmError::Http {
                status: 503,
                body: "busy".into(),
            }),
            valid(0..1),
        ]);
        let mut collection = records(1);

        let report = categorizer(&client, 5)
            .categorize(&mut collection, &SilentProgress)
            .await;

        assert_eq!(report.batches[0].retries(), 1);
        assert_eq!(
            report.batches[0].history[..4],
            [BatchState::Pending, BatchState::Sent, BatchState::Pending, BatchState::Sent]
        );
        assert!(collection[0].has_location());
    }

    #[tokio::test]
    async fn blank_title_falls_back_to_original() {
        let client = ScriptedClient::new(vec![Ok(
            r#"[{"index": 0, "title_after": "  ", "location_after": ["Dev"], "tags": []}]"#.into(),
        )]);
        let mut collection = records(1);

        categorizer(&client, 5)
            .categorize(&mut collection, &SilentProgress)
            .await;

        assert_eq!(collection[0].title_after.as_deref(), Some("Title 0"));
        assert_eq!(collection[0].tags_after, Some(vec![]));
    }

    #[tokio::test]
    async fn urls_survive_categorization() {
        let client = ScriptedClient::new(vec![valid(0..3)]);
        let mut collection = records(3);
        let before: Vec<String> = collection.iter().map(|r| r.url().to_string()).collect();

        categorizer(&client, 25)
            .categorize(&mut collection, &SilentProgress)
            .await;

        let after: Vec<String> = collection.iter().map(|r| r.url().to_string()).collect();
        assert_eq!(before, after);
        assert!(collection.iter().all(|r| r.location().is_some_and(|l| l.len() <= 4)));
    }
}
