use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::budget::TokenBudget;
use crate::client::ExtractionClient;
use crate::error::{PipelineError, Result};
use crate::prompt::SYSTEM_PROMPT;
use crate::router::{files_with_extension, DocumentRouter, Route};
use crate::settings::Layout;
use crate::validate::validate;

/// Where a single document ended up after one attempt.
#[derive(Debug)]
pub enum DocumentOutcome {
    Finished(PathBuf),
    Failed(PathBuf),
    Skipped { path: PathBuf, tokens: usize },
    /// Service call failed; the document stays in `to_analyze`.
    Unanswered(String),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub finished: usize,
    pub failed: usize,
    pub skipped: usize,
    pub unanswered: usize,
    pub errors: usize,
}

impl RunSummary {
    pub fn attempted(&self) -> usize {
        self.finished + self.failed + self.skipped + self.unanswered + self.errors
    }

    fn record(&mut self, outcome: &DocumentOutcome) {
        match outcome {
            DocumentOutcome::Finished(_) => self.finished += 1,
            DocumentOutcome::Failed(_) => self.failed += 1,
            DocumentOutcome::Skipped { .. } => self.skipped += 1,
            DocumentOutcome::Unanswered(_) => self.unanswered += 1,
        }
    }

    pub fn print(&self) {
        println!(
            "{} attempted: {} finished, {} failed, {} skipped, {} unanswered, {} errors.",
            self.attempted(),
            self.finished,
            self.failed,
            self.skipped,
            self.unanswered,
            self.errors,
        );
    }
}

pub struct Pipeline<C> {
    router: DocumentRouter,
    budget: TokenBudget,
    client: C,
}

impl<C: ExtractionClient> Pipeline<C> {
    pub fn new(layout: Layout, budget: TokenBudget, client: C) -> Self {
        Pipeline {
            router: DocumentRouter::new(layout),
            budget,
            client,
        }
    }

    /// `*.md` files waiting in `to_analyze`. A missing directory is fatal.
    pub fn pending(&self) -> Result<Vec<PathBuf>> {
        let dir = self.router.layout().pending_dir();
        if !dir.is_dir() {
            return Err(PipelineError::InputMissing(dir));
        }
        files_with_extension(&dir, "md")
    }

    /// One pass over the given documents. Only fatal errors stop the pass.
    pub async fn run(&self, documents: &[PathBuf]) -> Result<RunSummary> {
        info!(
            documents = documents.len(),
            token_limit = self.budget.limit(),
            "Starting run"
        );
        if self.budget.is_approximate() {
            info!("No tokenizer available, estimating tokens as chars/4");
        }

        let pb = ProgressBar::new(documents.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        let mut summary = RunSummary::default();
        for path in documents {
            match self.process_document(path).await {
                Ok(outcome) => {
                    log_outcome(path, &outcome);
                    summary.record(&outcome);
                }
                Err(e) if e.is_fatal() => {
                    pb.finish_and_clear();
                    return Err(e);
                }
                Err(e) => {
                    warn!("Error processing {}: {}", path.display(), e);
                    summary.errors += 1;
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!(
            finished = summary.finished,
            failed = summary.failed,
            skipped = summary.skipped,
            unanswered = summary.unanswered,
            errors = summary.errors,
            "Run complete"
        );
        Ok(summary)
    }

    /// Gate, extract, validate, route. At most one service call per document.
    pub async fn process_document(&self, path: &Path) -> Result<DocumentOutcome> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let markdown = fs::read_to_string(path)?;

        let tokens = match self.budget.check(&name, &markdown) {
            Ok(tokens) => tokens,
            Err(PipelineError::BudgetExceeded { tokens, .. }) => {
                let path = self.router.route(path, Route::Skip)?;
                return Ok(DocumentOutcome::Skipped { path, tokens });
            }
            Err(e) => return Err(e),
        };

        let raw = match self.client.extract(SYSTEM_PROMPT, &markdown).await {
            Ok(raw) => raw,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(DocumentOutcome::Unanswered(e.to_string())),
        };

        match validate(&name, &raw) {
            Ok(result) => {
                let dest = self.router.route(path, Route::Success(&result))?;
                info!(
                    document = %name,
                    tokens,
                    emails = result.emails().len(),
                    contact_links = result.contact_links().len(),
                    "extracted contacts"
                );
                Ok(DocumentOutcome::Finished(dest))
            }
            Err(e) => {
                warn!("{}", e);
                let dest = self.router.route(path, Route::Fail)?;
                Ok(DocumentOutcome::Failed(dest))
            }
        }
    }
}

fn log_outcome(path: &Path, outcome: &DocumentOutcome) {
    match outcome {
        DocumentOutcome::Finished(dest) => info!("Moved to finished_sites: {}", dest.display()),
        DocumentOutcome::Failed(dest) => info!("Moved to failed_jsons: {}", dest.display()),
        DocumentOutcome::Skipped { path, tokens } => {
            info!("Skipped (tokens={}): {}", tokens, path.display())
        }
        DocumentOutcome::Unanswered(reason) => warn!(
            "Extraction failed for {}, left in to_analyze: {}",
            path.display(),
            reason
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::TokenCounter;
    use crate::state::DocumentState;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replies keyed by the exact document text; unknown text is a service error.
    #[derive(Default)]
    struct ScriptedClient {
        replies: HashMap<String, Result<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn reply(mut self, document: &str, raw: &str) -> Self {
            self.replies.insert(document.to_string(), Ok(raw.to_string()));
            self
        }

        fn fail(mut self, document: &str, err: PipelineError) -> Self {
            self.replies.insert(document.to_string(), Err(err));
            self
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ExtractionClient for ScriptedClient {
        async fn extract(&self, system_prompt: &str, document: &str) -> Result<String> {
            assert_eq!(system_prompt, SYSTEM_PROMPT);
            self.calls.lock().unwrap().push(document.to_string());
            match self.replies.get(document) {
                Some(Ok(raw)) => Ok(raw.clone()),
                Some(Err(PipelineError::Configuration(m))) => {
                    Err(PipelineError::Configuration(m.clone()))
                }
                Some(Err(e)) => Err(PipelineError::Service(e.to_string())),
                None => Err(PipelineError::Service("no scripted reply".into())),
            }
        }
    }

    const VALID: &str = r#"{"emails":["jane@janedoe.com"],"contact_links":["https://janedoe.com/contact"]}"#;

    struct Fixture {
        _tmp: TempDir,
        layout: Layout,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let layout = Layout::new(tmp.path().join("outputs"), tmp.path().join("logs"));
            fs::create_dir_all(layout.pending_dir()).unwrap();
            Fixture { _tmp: tmp, layout }
        }

        fn add(&self, name: &str, body: &str) {
            fs::write(self.layout.pending_dir().join(name), body).unwrap();
        }

        fn count(&self, dir: PathBuf) -> usize {
            if !dir.is_dir() {
                return 0;
            }
            fs::read_dir(dir).unwrap().count()
        }

        fn in_state(&self, state: DocumentState) -> usize {
            self.count(self.layout.dir(state))
        }

        fn results(&self) -> usize {
            self.count(self.layout.results_dir())
        }

        fn pipeline(&self, limit: usize, client: ScriptedClient) -> Pipeline<ScriptedClient> {
            Pipeline::new(
                self.layout.clone(),
                TokenBudget::new(limit, TokenCounter::Approximate),
                client,
            )
        }
    }

    async fn run_all(p: &Pipeline<ScriptedClient>) -> RunSummary {
        let docs = p.pending().unwrap();
        p.run(&docs).await.unwrap()
    }

    #[tokio::test]
    async fn one_under_budget_one_over() {
        let fx = Fixture::new();
        let small = "Source: https://janedoe.com\nEmail jane [at] janedoe [dot] com";
        let huge = "x".repeat(4 * 100 + 4);
        fx.add("https_janedoe_com.md", small);
        fx.add("https_bigsite_com.md", &huge);

        let client = ScriptedClient::default().reply(small, VALID);
        let p = fx.pipeline(100, client);
        let summary = run_all(&p).await;

        assert_eq!(summary.finished, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(fx.in_state(DocumentState::Finished), 1);
        assert_eq!(fx.in_state(DocumentState::Skipped), 1);
        assert_eq!(fx.in_state(DocumentState::Pending), 0);
        assert_eq!(fx.results(), 1);
        // oversized documents never reach the service
        assert_eq!(p.client.call_count(), 1);
    }

    #[tokio::test]
    async fn valid_response_is_stored_canonically() {
        let fx = Fixture::new();
        fx.add("https_janedoe_com.md", "jane");
        let pretty = "{\n  \"emails\": [\"jane@janedoe.com\"]\n}\n";
        let p = fx.pipeline(1_000, ScriptedClient::default().reply("jane", pretty));
        run_all(&p).await;

        let stored = fs::read_to_string(fx.layout.results_dir().join("https_janedoe_com.json")).unwrap();
        assert_eq!(stored, r#"{"emails":["jane@janedoe.com"]}"#);
        assert!(fx
            .layout
            .dir(DocumentState::Finished)
            .join("https_janedoe_com.md")
            .exists());
    }

    #[tokio::test]
    async fn invalid_json_goes_to_failed_without_result() {
        let fx = Fixture::new();
        fx.add("chatty.md", "chatty");
        let p = fx.pipeline(
            1_000,
            ScriptedClient::default().reply("chatty", "Sure! Here are the contacts: none"),
        );
        let summary = run_all(&p).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(fx.in_state(DocumentState::Failed), 1);
        assert_eq!(fx.results(), 0);
    }

    #[tokio::test]
    async fn service_error_leaves_document_pending() {
        let fx = Fixture::new();
        fx.add("flaky.md", "flaky");
        fx.add("fine.md", "fine");
        let client = ScriptedClient::default()
            .fail("flaky", PipelineError::Service("HTTP 502".into()))
            .reply("fine", VALID);
        let p = fx.pipeline(1_000, client);
        let summary = run_all(&p).await;

        assert_eq!(
            summary,
            RunSummary {
                finished: 1,
                unanswered: 1,
                ..Default::default()
            }
        );
        assert!(fx.layout.pending_dir().join("flaky.md").exists());
        assert_eq!(fx.results(), 1);
    }

    #[tokio::test]
    async fn every_document_failing_still_completes_the_pass() {
        let fx = Fixture::new();
        for i in 0..3 {
            fx.add(&format!("doc{}.md", i), &format!("body {}", i));
        }
        let client = ScriptedClient::default()
            .reply("body 0", "not json")
            .reply("body 1", "{oops");
        let p = fx.pipeline(1_000, client);
        let summary = run_all(&p).await;

        assert_eq!(summary.attempted(), 3);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.unanswered, 1);
        assert_eq!(p.client.call_count(), 3);
    }

    #[tokio::test]
    async fn rejected_credentials_abort_the_run() {
        let fx = Fixture::new();
        fx.add("a.md", "a");
        fx.add("b.md", "b");
        let client = ScriptedClient::default()
            .fail("a", PipelineError::Configuration("bad key".into()))
            .reply("b", VALID);
        let p = fx.pipeline(1_000, client);
        let docs = p.pending().unwrap();

        let err = p.run(&docs).await.unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert_eq!(p.client.call_count(), 1);
        assert_eq!(fx.in_state(DocumentState::Pending), 2);
    }

    #[tokio::test]
    async fn rerun_after_new_crawl_keeps_both_copies() {
        let fx = Fixture::new();
        fx.add("https_janedoe_com.md", "first crawl");
        let client = ScriptedClient::default()
            .reply("first crawl", VALID)
            .reply("second crawl", VALID);
        let p = fx.pipeline(1_000, client);
        run_all(&p).await;

        fx.add("https_janedoe_com.md", "second crawl");
        run_all(&p).await;

        let finished = fx.layout.dir(DocumentState::Finished);
        assert_eq!(
            fs::read_to_string(finished.join("https_janedoe_com.md")).unwrap(),
            "first crawl"
        );
        assert_eq!(
            fs::read_to_string(finished.join("https_janedoe_com_1.md")).unwrap(),
            "second crawl"
        );
        assert_eq!(fx.results(), 1);
    }

    #[tokio::test]
    async fn ignores_non_markdown_files() {
        let fx = Fixture::new();
        fx.add("notes.txt", "not a document");
        let p = fx.pipeline(1_000, ScriptedClient::default());
        let summary = run_all(&p).await;
        assert_eq!(summary.attempted(), 0);
        assert!(fx.layout.pending_dir().join("notes.txt").exists());
    }

    #[test]
    fn missing_input_dir_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::new(tmp.path().join("absent"), tmp.path().join("logs"));
        let p = Pipeline::new(
            layout,
            TokenBudget::new(10, TokenCounter::Approximate),
            ScriptedClient::default(),
        );
        let err = p.pending().unwrap_err();
        assert!(matches!(err, PipelineError::InputMissing(_)));
        assert!(err.is_fatal());
    }
}
