//! Stage orchestration: parse → enrich → categorize → render → validate.
//!
//! Every stage works on the whole record collection and the collection is
//! saved after each one, so a later stage (or a later run in a narrower
//! mode) always starts from the last committed state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use bookmark_reorg_enricher::{EnrichOptions, EnrichReport, Enricher, PageFetcher};
use bookmark_reorg_netscape::{parse_bookmark_file, write_html};
use bookmark_reorg_shared::{
    BookmarkRecord, EnrichMode, ProgressReporter, ReorgError, Result, RunId,
};
use bookmark_reorg_store::RecordStore;
use tracing::{Span, error, info, instrument, warn};

use crate::cache::reuse_metadata;
use crate::categorize::{CategorizeReport, Categorizer};
use crate::llm::LlmClient;
use crate::validate::{ValidationReport, Validator};

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Parse the export and save the collection.
    Parse,
    /// Parse, then fetch page metadata.
    Metadata,
    /// Parse, enrich, categorize, render; validation is advisory.
    #[default]
    Llm,
    /// Render the saved collection.
    Html,
    /// Validate an already rendered file against the export.
    Compare,
    /// Like `llm`, but validation violations fail the run.
    All,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Metadata => "metadata",
            Self::Llm => "llm",
            Self::Html => "html",
            Self::Compare => "compare",
            Self::All => "all",
        }
    }

    /// Modes that talk to the language model.
    pub fn needs_llm(&self) -> bool {
        matches!(self, Self::Llm | Self::All)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one run needs to know, resolved from config and flags.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: Mode,
    /// Netscape bookmark export.
    pub input: Option<PathBuf>,
    /// Persisted record collection.
    pub json_output: PathBuf,
    /// Reorganized bookmark HTML.
    pub html_output: PathBuf,
    pub enrich_mode: EnrichMode,
    /// Seed metadata from the existing collection before it is overwritten.
    pub use_json_cache: bool,
    /// Refetch every page and drop metadata that cannot be refreshed.
    pub fresh_scrape: bool,
    pub max_folder_depth: usize,
}

impl RunConfig {
    /// Reject flag combinations the mode cannot honour.
    pub fn check(&self) -> Result<()> {
        let flag = match self.mode {
            Mode::Parse | Mode::Compare if self.use_json_cache => Some("--use-json-cache"),
            Mode::Parse | Mode::Html | Mode::Compare if self.fresh_scrape => Some("--fresh-scrape"),
            _ => None,
        };

        match flag {
            Some(flag) => Err(ReorgError::conflict(format!(
                "{flag} cannot be combined with mode={}",
                self.mode
            ))),
            None => Ok(()),
        }
    }

    /// The export path, which must exist.
    pub fn input(&self) -> Result<&Path> {
        let input = self.input.as_deref().ok_or_else(|| {
            ReorgError::config("no bookmark export given; pass --input or set BOOKMARKS_EXPORT_FILE")
        })?;
        if !input.is_file() {
            return Err(ReorgError::precondition(format!(
                "bookmark export {} does not exist",
                input.display()
            )));
        }
        Ok(input)
    }

    fn enrich_options(&self) -> EnrichOptions {
        if self.fresh_scrape {
            EnrichOptions::forced()
        } else {
            EnrichOptions {
                mode: self.enrich_mode,
                force_refresh: false,
            }
        }
    }
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub mode: Mode,
    /// Records in the collection the run ended with.
    pub records: usize,
    /// Records whose metadata came from the JSON cache.
    pub reused_metadata: usize,
    pub enrich: Option<EnrichReport>,
    pub categorize: Option<CategorizeReport>,
    pub validation: Option<ValidationReport>,
    pub html_written: Option<PathBuf>,
}

impl RunOutcome {
    fn new(run_id: RunId, mode: Mode) -> Self {
        Self {
            run_id,
            mode,
            records: 0,
            reused_metadata: 0,
            enrich: None,
            categorize: None,
            validation: None,
            html_written: None,
        }
    }
}

/// The staged pipeline over a page fetcher and an optional LLM client.
pub struct Pipeline<F, C> {
    enricher: Enricher<F>,
    categorizer: Option<Categorizer<C>>,
}

impl<F: PageFetcher + 'static, C: LlmClient> Pipeline<F, C> {
    pub fn new(enricher: Enricher<F>) -> Self {
        Self {
            enricher,
            categorizer: None,
        }
    }

    /// Enable the `llm` and `all` modes.
    pub fn with_categorizer(mut self, categorizer: Categorizer<C>) -> Self {
        self.categorizer = Some(categorizer);
        self
    }

    /// Run the stages of `config.mode`.
    ///
    /// Flag conflicts and unmet preconditions fail before anything is read
    /// or written.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty, mode = %config.mode))]
    pub async fn run(
        &mut self,
        config: &RunConfig,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome> {
        let run_id = RunId::new();
        Span::current().record("run_id", tracing::field::display(&run_id));
        let start = Instant::now();

        config.check()?;
        let input = config.input()?;
        if config.mode.needs_llm() && self.categorizer.is_none() {
            return Err(ReorgError::precondition(format!(
                "mode={} needs an LLM client; configure an API key",
                config.mode
            )));
        }
        if config.mode == Mode::Compare && !config.html_output.is_file() {
            return Err(ReorgError::precondition(format!(
                "reorganized bookmarks {} do not exist; run with --mode llm first",
                config.html_output.display()
            )));
        }

        info!(%run_id, input = %input.display(), "starting run");
        let mut outcome = RunOutcome::new(run_id, config.mode);
        let result = self.run_stages(config, input, progress, &mut outcome).await;
        progress.finish();
        result?;

        info!(
            records = outcome.records,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "run complete"
        );
        Ok(outcome)
    }

    async fn run_stages(
        &mut self,
        config: &RunConfig,
        input: &Path,
        progress: &dyn ProgressReporter,
        outcome: &mut RunOutcome,
    ) -> Result<()> {
        let store = RecordStore::new(&config.json_output);
        let validator = Validator::new(config.max_folder_depth);

        match config.mode {
            Mode::Parse => {
                progress.stage("Parsing bookmark export");
                let records = parse_bookmark_file(input)?;
                outcome.records = records.len();
                store.save(&records)?;
            }

            Mode::Html => {
                progress.stage("Loading record collection");
                let records = store.load()?;
                outcome.records = records.len();

                progress.stage("Rendering bookmark HTML");
                write_html(&records, &config.html_output, config.max_folder_depth)?;
                outcome.html_written = Some(config.html_output.clone());

                progress.stage("Validating");
                let report = validate_rendered(&validator, input, &config.html_output, &records)?;
                record_validation(outcome, report, false)?;
            }

            Mode::Compare => {
                progress.stage("Comparing bookmark files");
                let original = parse_bookmark_file(input)?;
                let reorganized = read_rendered(&config.html_output)?;
                outcome.records = reorganized.len();

                let mut report = validator.validate(&original, &reorganized, true);
                match store.load_if_exists() {
                    Ok(Some(collection)) => {
                        validator.cross_check(&collection, &reorganized, &mut report)
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "skipping collection cross-check"),
                }
                record_validation(outcome, report, false)?;
            }

            Mode::Metadata | Mode::Llm | Mode::All => {
                // --- Stage: cache (read before parse overwrites it) ---
                let cached = if config.use_json_cache && !config.fresh_scrape {
                    load_cache(&store)
                } else {
                    if config.use_json_cache {
                        info!("--fresh-scrape set, ignoring JSON cache");
                    }
                    None
                };

                // --- Stage: parse ---
                progress.stage("Parsing bookmark export");
                let mut records = parse_bookmark_file(input)?;
                outcome.records = records.len();
                if let Some(cached) = cached {
                    outcome.reused_metadata = reuse_metadata(&mut records, &cached);
                    info!(reused = outcome.reused_metadata, "seeded metadata from JSON cache");
                }
                store.save(&records)?;

                // --- Stage: enrich ---
                progress.stage("Fetching page metadata");
                let report = self
                    .enricher
                    .enrich(&mut records, config.enrich_options(), progress)
                    .await;
                outcome.enrich = Some(report);
                store.save(&records)?;

                if config.mode == Mode::Metadata {
                    return Ok(());
                }

                // --- Stage: categorize ---
                let categorizer = self.categorizer.as_mut().ok_or_else(|| {
                    ReorgError::precondition("no LLM client configured")
                })?;
                progress.stage("Categorizing with LLM");
                let report = categorizer.categorize(&mut records, progress).await;
                if report.skipped() > 0 {
                    warn!(
                        skipped = report.skipped(),
                        "some batches were skipped; their records have no location"
                    );
                }
                outcome.categorize = Some(report);
                store.save(&records)?;

                // --- Stage: render ---
                progress.stage("Rendering bookmark HTML");
                write_html(&records, &config.html_output, config.max_folder_depth)?;
                outcome.html_written = Some(config.html_output.clone());

                // --- Stage: validate ---
                progress.stage("Validating");
                let report = validate_rendered(&validator, input, &config.html_output, &records)?;
                record_validation(outcome, report, config.mode == Mode::All)?;
            }
        }

        Ok(())
    }
}

/// Read the previous collection, treating a missing or unreadable file as
/// no cache.
fn load_cache(store: &RecordStore) -> Option<Vec<BookmarkRecord>> {
    match store.load_if_exists() {
        Ok(Some(records)) => Some(records),
        Ok(None) => {
            info!(path = %store.path().display(), "no JSON cache to reuse");
            None
        }
        Err(e) => {
            warn!(error = %e, "ignoring unreadable JSON cache");
            None
        }
    }
}

/// Parse a rendered file, taking each bookmark's folder as its location.
fn read_rendered(path: &Path) -> Result<Vec<BookmarkRecord>> {
    let mut records = parse_bookmark_file(path)?;
    for record in &mut records {
        record.location_after = Some(record.folder_path_before().to_vec());
    }
    Ok(records)
}

/// Validate the file written to `html_output` against the export, then
/// against the collection it was rendered from.
fn validate_rendered(
    validator: &Validator,
    input: &Path,
    html_output: &Path,
    collection: &[BookmarkRecord],
) -> Result<ValidationReport> {
    let original = parse_bookmark_file(input)?;
    let rendered = read_rendered(html_output)?;
    let mut report = validator.validate(&original, &rendered, true);
    validator.cross_check(collection, &rendered, &mut report);
    Ok(report)
}

fn record_validation(
    outcome: &mut RunOutcome,
    report: ValidationReport,
    strict: bool,
) -> Result<()> {
    let violations = report.violations.len();
    for violation in &report.violations {
        warn!(%violation, "validation");
    }
    outcome.validation = Some(report);

    if violations == 0 {
        info!("validation passed");
        Ok(())
    } else if strict {
        error!(violations, "validation failed");
        Err(ReorgError::ValidationFailed(violations))
    } else {
        warn!(violations, "validation reported problems");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::RetryPolicy;
    use crate::llm::ChatRequest;
    use crate::validate::{Check, Violation};
    use bookmark_reorg_enricher::FetchResult;
    use bookmark_reorg_shared::{
        CategorizeConfig, EnrichConfig, LlmError, PageMetadata, SilentProgress,
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const EXPORT: &str = r#"<!DOCTYPE NETSCAPE-Bookmark-file-1>
<TITLE>Bookmarks</TITLE>
<H1>Bookmarks</H1>
<DL><p>
    <DT><H3>Bar</H3>
    <DL><p>
        <DT><A HREF="https://rust.example/book">Book</A>
        <DT><A HREF="https://news.example/">News</A>
    </DL><p>
    <DT><A HREF="https://rust.example/book">Book again</A>
    <DT><A HREF="https://blog.example/post">Post</A>
</DL><p>
"#;

    /// Answers every page with a title derived from its URL.
    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl PageFetcher for CountingFetcher {
        async fn fetch(&self, url: &str) -> FetchResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PageMetadata {
                page_title: format!("Page {url}"),
                description: String::new(),
                tags: vec!["web".into()],
            })
        }
    }

    /// Files every entry under `Sorted/<host>/a/b/c`.
    #[derive(Default)]
    struct FolderByHost {
        calls: AtomicUsize,
    }

    impl LlmClient for FolderByHost {
        async fn complete(&self, request: &ChatRequest) -> std::result::Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let payload: Value = serde_json::from_str(&request.messages[1].content)
                .map_err(|e| LlmError::Transport(e.to_string()))?;

            let answers: Vec<Value> = payload["entries"]
                .as_array()
                .into_iter()
                .flatten()
                .map(|entry| {
                    let url = entry["url"].as_str().unwrap_or_default();
                    let host = url.split("//").nth(1).and_then(|rest| rest.split('/').next());
                    json!({
                        "index": entry["index"],
                        "title_after": entry["title_before"],
                        "location_after": ["Sorted", host.unwrap_or("misc"), "a", "b", "c"],
                        "tags": ["sorted"],
                    })
                })
                .collect();
            Ok(Value::Array(answers).to_string())
        }
    }

    /// Answers every batch with an empty list.
    struct EmptyAnswers;

    impl LlmClient for EmptyAnswers {
        async fn complete(&self, _request: &ChatRequest) -> std::result::Result<String, LlmError> {
            Ok("[]".into())
        }
    }

    struct Fixture {
        dir: PathBuf,
        fetcher: Arc<CountingFetcher>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("br-pipeline-test-{}", uuid::Uuid::now_v7()));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("export.html"), EXPORT).unwrap();
            Self {
                dir,
                fetcher: Arc::new(CountingFetcher::default()),
            }
        }

        fn config(&self, mode: Mode) -> RunConfig {
            RunConfig {
                mode,
                input: Some(self.dir.join("export.html")),
                json_output: self.dir.join("bookmarks.json"),
                html_output: self.dir.join("reorganised.html"),
                enrich_mode: EnrichMode::OnlyMissing,
                use_json_cache: false,
                fresh_scrape: false,
                max_folder_depth: 4,
            }
        }

        fn pipeline(&self) -> Pipeline<CountingFetcher, FolderByHost> {
            self.pipeline_for()
        }

        fn pipeline_for<C: LlmClient>(&self) -> Pipeline<CountingFetcher, C> {
            let enrich = EnrichConfig {
                workers: 4,
                sequential_cutoff: 3,
                timeout: Duration::from_secs(5),
                tag_limit: 20,
                user_agent: "test".into(),
            };
            Pipeline::new(Enricher::with_shared(Arc::clone(&self.fetcher), enrich))
        }

        fn llm_pipeline(&self) -> Pipeline<CountingFetcher, FolderByHost> {
            self.llm_pipeline_with(FolderByHost::default())
        }

        fn llm_pipeline_with<C: LlmClient>(&self, client: C) -> Pipeline<CountingFetcher, C> {
            let categorize = CategorizeConfig {
                model: "test-model".into(),
                fallback_model: None,
                batch_size: 3,
                max_folder_depth: 4,
                temperature: Some(0.2),
                max_attempts: 3,
                backoff: Duration::ZERO,
            };
            let categorizer =
                Categorizer::new(client, categorize).with_retry_policy(RetryPolicy::immediate(3));
            self.pipeline_for().with_categorizer(categorizer)
        }

        fn fetches(&self) -> usize {
            self.fetcher.calls.load(Ordering::SeqCst)
        }

        fn saved(&self) -> Vec<BookmarkRecord> {
            RecordStore::new(self.dir.join("bookmarks.json")).load().unwrap()
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    #[test]
    fn conflicting_flags_are_rejected() {
        let fixture = Fixture::new();

        let mut config = fixture.config(Mode::Parse);
        config.use_json_cache = true;
        assert!(matches!(config.check(), Err(ReorgError::ConfigConflict(_))));

        let mut config = fixture.config(Mode::Html);
        config.fresh_scrape = true;
        let err = config.check().unwrap_err();
        assert!(err.to_string().contains("--fresh-scrape cannot be combined with mode=html"));

        let mut config = fixture.config(Mode::Compare);
        config.use_json_cache = true;
        assert!(config.check().is_err());

        let mut config = fixture.config(Mode::Metadata);
        config.use_json_cache = true;
        config.fresh_scrape = true;
        assert!(config.check().is_ok());
    }

    #[tokio::test]
    async fn conflict_fails_before_any_work() {
        let fixture = Fixture::new();
        let mut config = fixture.config(Mode::Parse);
        config.fresh_scrape = true;

        let err = fixture.pipeline().run(&config, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, ReorgError::ConfigConflict(_)));
        assert!(!config.json_output.exists());
    }

    #[tokio::test]
    async fn missing_input_is_reported() {
        let fixture = Fixture::new();
        let mut config = fixture.config(Mode::Parse);
        config.input = None;
        assert!(matches!(
            fixture.pipeline().run(&config, &SilentProgress).await,
            Err(ReorgError::Config { .. })
        ));

        config.input = Some(fixture.dir.join("nope.html"));
        assert!(matches!(
            fixture.pipeline().run(&config, &SilentProgress).await,
            Err(ReorgError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn parse_mode_saves_collection() {
        let fixture = Fixture::new();

        let outcome = fixture
            .pipeline()
            .run(&fixture.config(Mode::Parse), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(outcome.records, 4);
        assert!(outcome.enrich.is_none());
        let saved = fixture.saved();
        assert_eq!(saved[0].folder_path_before(), ["Bar".to_string()]);
        assert_eq!(saved[2].title_before(), "Book again");
        assert_eq!(fixture.fetches(), 0);
    }

    #[tokio::test]
    async fn cached_metadata_makes_rerun_free() {
        let fixture = Fixture::new();
        let config = fixture.config(Mode::Metadata);

        let first = fixture.pipeline().run(&config, &SilentProgress).await.unwrap();
        assert_eq!(first.enrich.as_ref().unwrap().enriched, 4);
        assert_eq!(fixture.fetches(), 4);
        let enriched = fixture.saved();

        let mut cached = config.clone();
        cached.use_json_cache = true;
        let second = fixture.pipeline().run(&cached, &SilentProgress).await.unwrap();

        assert_eq!(second.reused_metadata, 4);
        assert_eq!(second.enrich.unwrap().selected, 0);
        assert_eq!(fixture.fetches(), 4);
        assert_eq!(fixture.saved(), enriched);
    }

    #[tokio::test]
    async fn fresh_scrape_ignores_cache() {
        let fixture = Fixture::new();
        let config = fixture.config(Mode::Metadata);
        fixture.pipeline().run(&config, &SilentProgress).await.unwrap();

        let mut fresh = config.clone();
        fresh.use_json_cache = true;
        fresh.fresh_scrape = true;
        let outcome = fixture.pipeline().run(&fresh, &SilentProgress).await.unwrap();

        assert_eq!(outcome.reused_metadata, 0);
        assert_eq!(fixture.fetches(), 8);
    }

    #[tokio::test]
    async fn llm_mode_runs_every_stage() {
        let fixture = Fixture::new();
        let config = fixture.config(Mode::Llm);

        let outcome = fixture.llm_pipeline().run(&config, &SilentProgress).await.unwrap();

        let categorize = outcome.categorize.unwrap();
        assert_eq!(categorize.batches.len(), 2);
        assert_eq!(categorize.records_categorized(), 4);
        let validation = outcome.validation.unwrap();
        assert!(validation.is_ok(), "{:?}", validation.violations);
        assert_eq!(
            validation.checks,
            vec![
                Check::UrlMultiset,
                Check::Location,
                Check::Grouping,
                Check::Depth,
                Check::Collection
            ]
        );
        assert_eq!(outcome.html_written.as_deref(), Some(config.html_output.as_path()));

        let saved = fixture.saved();
        assert!(saved.iter().all(|r| r.metadata.is_some()));
        assert!(saved.iter().all(|r| r.location().is_some_and(|l| l.len() <= 4)));

        let rendered = parse_bookmark_file(&config.html_output).unwrap();
        let mut before: Vec<_> = saved.iter().map(|r| r.url().to_string()).collect();
        let mut after: Vec<_> = rendered.iter().map(|r| r.url().to_string()).collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn llm_mode_needs_a_client() {
        let fixture = Fixture::new();

        let err = fixture
            .pipeline()
            .run(&fixture.config(Mode::Llm), &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, ReorgError::Precondition(_)));
        assert!(!fixture.dir.join("bookmarks.json").exists());
    }

    #[tokio::test]
    async fn html_mode_requires_locations() {
        let fixture = Fixture::new();
        fixture
            .pipeline()
            .run(&fixture.config(Mode::Metadata), &SilentProgress)
            .await
            .unwrap();

        let config = fixture.config(Mode::Html);
        let err = fixture.pipeline().run(&config, &SilentProgress).await.unwrap_err();

        assert!(matches!(err, ReorgError::Precondition(_)));
        assert!(err.to_string().contains("run the llm stage first"));
        assert!(!config.html_output.exists());
    }

    #[tokio::test]
    async fn html_mode_without_collection_is_store_error() {
        let fixture = Fixture::new();
        let err = fixture
            .pipeline()
            .run(&fixture.config(Mode::Html), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ReorgError::Store { .. }));
    }

    #[tokio::test]
    async fn html_and_compare_after_llm_run() {
        let fixture = Fixture::new();
        fixture
            .llm_pipeline()
            .run(&fixture.config(Mode::Llm), &SilentProgress)
            .await
            .unwrap();
        let fetches = fixture.fetches();

        let html = fixture
            .pipeline()
            .run(&fixture.config(Mode::Html), &SilentProgress)
            .await
            .unwrap();
        assert!(html.validation.unwrap().is_ok());

        let compare = fixture
            .pipeline()
            .run(&fixture.config(Mode::Compare), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(compare.records, 4);
        assert!(compare.validation.unwrap().is_ok());
        assert_eq!(fixture.fetches(), fetches);
    }

    #[tokio::test]
    async fn compare_needs_rendered_file() {
        let fixture = Fixture::new();
        let err = fixture
            .pipeline()
            .run(&fixture.config(Mode::Compare), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ReorgError::Precondition(_)));
    }

    #[tokio::test]
    async fn shallow_runs_validate_the_trimmed_file() {
        let fixture = Fixture::new();

        // Categorizer allows four levels, the run only two.
        let mut shallow = fixture.config(Mode::All);
        shallow.max_folder_depth = 2;
        let outcome = fixture.llm_pipeline().run(&shallow, &SilentProgress).await.unwrap();

        let validation = outcome.validation.unwrap();
        assert!(validation.is_ok(), "{:?}", validation.violations);
        assert!(fixture.saved().iter().all(|r| r.location().unwrap().len() == 4));
        let rendered = parse_bookmark_file(&shallow.html_output).unwrap();
        assert!(rendered.iter().all(|r| r.folder_path_before().len() == 2));
    }

    #[tokio::test]
    async fn compare_reports_a_diverging_rendered_file() {
        let fixture = Fixture::new();
        fixture
            .llm_pipeline()
            .run(&fixture.config(Mode::Llm), &SilentProgress)
            .await
            .unwrap();

        let config = fixture.config(Mode::Compare);
        std::fs::write(
            &config.html_output,
            r#"<!DOCTYPE NETSCAPE-Bookmark-file-1>
<DL><p>
    <DT><H3>Sorted</H3>
    <DL><p>
        <DT><A HREF="https://blog.example/post">Post</A>
        <DT><A HREF="https://news.example/">News</A>
        <DT><A HREF="https://rust.example/book">Book</A>
    </DL><p>
</DL><p>
"#,
        )
        .unwrap();

        let outcome = fixture.pipeline().run(&config, &SilentProgress).await.unwrap();
        let report = outcome.validation.unwrap();
        assert_eq!(outcome.records, 3);
        assert_eq!(report.violations_of(Check::UrlMultiset).count(), 1);
        assert_eq!(report.violations_of(Check::Grouping).count(), 3);

        let collection: Vec<_> = report
            .violations_of(Check::Collection)
            .map(|v| v.detail.as_str())
            .collect();
        assert_eq!(
            collection,
            vec![
                "saved collection has 4 records, rendered file has 3",
                "missing 1 of 2 occurrence(s)",
            ]
        );
    }

    #[tokio::test]
    async fn skipped_batches_stop_at_render_after_saving() {
        let fixture = Fixture::new();
        let config = fixture.config(Mode::Llm);

        let err = fixture
            .llm_pipeline_with(EmptyAnswers)
            .run(&config, &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, ReorgError::Precondition(_)));
        assert!(err.to_string().contains("4 of 4 records have no location_after"));
        let saved = fixture.saved();
        assert_eq!(saved.len(), 4);
        assert!(saved.iter().all(|r| r.metadata.is_some() && !r.has_location()));
        assert!(!config.html_output.exists());
    }

    #[test]
    fn violations_fail_only_strict_runs() {
        let report = || ValidationReport {
            checked: 1,
            checks: vec![Check::Collection],
            violations: vec![Violation {
                check: Check::Collection,
                index: None,
                url: None,
                detail: "saved collection has 2 records, rendered file has 1".into(),
            }],
        };

        let mut advisory = RunOutcome::new(RunId::new(), Mode::Llm);
        record_validation(&mut advisory, report(), false).unwrap();
        assert_eq!(advisory.validation, Some(report()));

        let mut strict = RunOutcome::new(RunId::new(), Mode::All);
        let err = record_validation(&mut strict, report(), true).unwrap_err();
        assert!(matches!(err, ReorgError::ValidationFailed(1)));
        assert!(strict.validation.is_some());

        let mut clean = RunOutcome::new(RunId::new(), Mode::All);
        record_validation(&mut clean, ValidationReport::default(), true).unwrap();
    }
}
