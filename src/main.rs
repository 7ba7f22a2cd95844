mod budget;
mod client;
mod error;
mod export;
mod logging;
mod pipeline;
mod prompt;
mod router;
mod settings;
mod state;
mod validate;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use crate::budget::{TokenBudget, TokenCounter};
use crate::client::{OpenRouterClient, API_KEY_VAR};
use crate::error::PipelineError;
use crate::logging::RunLog;
use crate::pipeline::Pipeline;
use crate::router::{document_base, files_with_extension, DocumentRouter};
use crate::settings::{Layout, Settings};
use crate::state::DocumentState;

#[derive(Parser)]
#[command(
    name = "author_contacts",
    about = "Extract author contact info from crawled Markdown via an LLM"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send pending documents to the extraction service and route them
    Analyze {
        /// Max documents to attempt (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Flatten extracted JSON results into one CSV and archive them
    Export,
    /// Show document counts per lifecycle location
    Stats,
    /// Move failed or skipped documents back to the pending queue
    Requeue {
        /// Location to take documents from
        #[arg(long, value_enum)]
        from: RequeueFrom,
        /// Only requeue this document (file stem, e.g. https_janedoe_com)
        #[arg(long)]
        name: Option<String>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Analyze { .. } => "analyze",
            Commands::Export => "export",
            Commands::Stats => "stats",
            Commands::Requeue { .. } => "requeue",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RequeueFrom {
    Failed,
    Skipped,
}

impl From<RequeueFrom> for DocumentState {
    fn from(from: RequeueFrom) -> Self {
        match from {
            RequeueFrom::Failed => DocumentState::Failed,
            RequeueFrom::Skipped => DocumentState::Skipped,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    let layout = settings.layout();
    let command = cli.command.name();

    // the run log is opened only once a command's prerequisites hold
    let result = match cli.command {
        Commands::Analyze { limit } => {
            let (client, _run_log) =
                start_analyze(&settings, &layout, std::env::var(API_KEY_VAR).ok())?;
            let budget = TokenBudget::new(settings.token_limit, TokenCounter::detect());
            let pipeline = Pipeline::new(layout.clone(), budget, client);

            let mut documents = pipeline.pending()?;
            if let Some(n) = limit {
                documents.truncate(n);
            }
            if documents.is_empty() {
                println!("No documents waiting in {}.", layout.pending_dir().display());
                return Ok(());
            }

            println!("Analyzing {} documents...", documents.len());
            let summary = pipeline.run(&documents).await?;
            summary.print();
            Ok(())
        }
        Commands::Export => {
            require_dir(layout.results_dir())?;
            let _run_log = logging::init_with_run_log(&layout.log_path(), command)?;
            let summary = export::export(&layout)?;
            match summary.csv_path {
                Some(path) => {
                    println!(
                        "Exported {} rows ({} files failed) to {}",
                        summary.rows,
                        summary.failed,
                        path.display()
                    );
                    println!("Processed files moved to: {}", layout.processed_dir().display());
                }
                None => println!("No JSON files found in {}", layout.results_dir().display()),
            }
            Ok(())
        }
        Commands::Stats => {
            logging::init_console();
            print_stats(&layout)
        }
        Commands::Requeue { from, name } => {
            let _run_log = logging::init_with_run_log(&layout.log_path(), command)?;
            let n = requeue(&layout, from.into(), name.as_deref())?;
            println!("Requeued {} documents.", n);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Input directory first, then the credential. Nothing is logged to disk unless both hold.
fn start_analyze(
    settings: &Settings,
    layout: &Layout,
    api_key: Option<String>,
) -> anyhow::Result<(OpenRouterClient, RunLog)> {
    require_dir(layout.pending_dir())?;
    let client = OpenRouterClient::new(settings, api_key)?;
    let run_log = logging::init_with_run_log(&layout.log_path(), "analyze")?;
    Ok((client, run_log))
}

fn require_dir(dir: PathBuf) -> Result<PathBuf, PipelineError> {
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(PipelineError::InputMissing(dir))
    }
}

fn print_stats(layout: &Layout) -> anyhow::Result<()> {
    for state in DocumentState::ALL {
        let n = files_with_extension(&layout.dir(state), "md")?.len();
        println!("{:<10} {}", format!("{}:", state_label(state)), n);
    }
    let results = files_with_extension(&layout.results_dir(), "json")?.len();
    let exported = files_with_extension(&layout.processed_dir(), "json")?.len();
    println!("{:<10} {}", "Results:", results);
    println!("{:<10} {}", "Exported:", exported);
    Ok(())
}

fn state_label(state: DocumentState) -> &'static str {
    match state {
        DocumentState::Pending => "Pending",
        DocumentState::Finished => "Finished",
        DocumentState::Failed => "Failed",
        DocumentState::Skipped => "Skipped",
    }
}

fn requeue(layout: &Layout, from: DocumentState, name: Option<&str>) -> anyhow::Result<usize> {
    let router = DocumentRouter::new(layout.clone());
    let mut moved = 0;
    for path in files_with_extension(&layout.dir(from), "md")? {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        if let Some(wanted) = name {
            if stem != wanted && document_base(&stem) != wanted {
                continue;
            }
        }
        let dest = router
            .requeue(from, &path)
            .with_context(|| format!("Failed to requeue {}", path.display()))?;
        tracing::info!("Requeued {} -> {}", path.display(), dest.display());
        moved += 1;
    }
    Ok(moved)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
