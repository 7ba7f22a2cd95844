use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::router::{files_with_extension, unique_path};
use crate::settings::Layout;

static DOMAIN_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"_(com|org|net|edu|info|biz|co_uk|blogspot_com)$").unwrap()
});

#[derive(Debug, Serialize, PartialEq)]
pub struct CsvRow {
    pub source: String,
    pub emails: String,
    pub contact_links: String,
}

#[derive(Debug)]
pub struct ExportSummary {
    /// `None` when there was nothing to export and no CSV was written.
    pub csv_path: Option<PathBuf>,
    pub rows: usize,
    pub failed: usize,
}

/// Best-effort guess at whether a result file name is an encoded site URL,
/// e.g. `https_janedoe_com.json`. Heuristic only: a name can match without
/// being a URL and a URL-derived name can miss.
pub fn source_from_filename(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(".json").unwrap_or(file_name);
    if stem.starts_with("http") && DOMAIN_SUFFIX_RE.is_match(stem) {
        Some(stem.to_string())
    } else {
        None
    }
}

/// Flatten a stored result into a CSV row. Missing lists become `[]`.
pub fn to_row(file_name: &str, data: &Value) -> Result<CsvRow> {
    let list = |key: &str| -> Result<String> {
        let field = data.get(key).cloned().unwrap_or_else(|| Value::Array(Vec::new()));
        serde_json::to_string(&field).map_err(|e| PipelineError::ExportRead {
            path: PathBuf::from(file_name),
            message: e.to_string(),
        })
    };
    Ok(CsvRow {
        source: source_from_filename(file_name).unwrap_or_default(),
        emails: list("emails")?,
        contact_links: list("contact_links")?,
    })
}

/// Write every result in the store to one CSV and archive the consumed files.
/// A bad result file is logged and left where it is.
pub fn export(layout: &Layout) -> Result<ExportSummary> {
    let results_dir = layout.results_dir();
    if !results_dir.is_dir() {
        return Err(PipelineError::InputMissing(results_dir));
    }

    let files = files_with_extension(&results_dir, "json")?;
    if files.is_empty() {
        info!("No JSON files found in {}", results_dir.display());
        return Ok(ExportSummary {
            csv_path: None,
            rows: 0,
            failed: 0,
        });
    }
    info!("Found {} JSON files to process", files.len());

    let csv_path = layout.csv_path();
    if let Some(parent) = csv_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&csv_path)?;
    writer.write_record(["source", "emails", "contact_links"])?;

    let mut written = Vec::new();
    let mut failed = 0;
    for path in &files {
        match read_row(path) {
            Ok(row) => {
                writer.serialize(&row)?;
                written.push(path);
            }
            Err(e) => {
                failed += 1;
                warn!("{}", e);
            }
        }
    }
    writer.flush()?;
    drop(writer);
    let rows = written.len();

    // rows are on disk before any result leaves the store
    let processed_dir = layout.processed_dir();
    fs::create_dir_all(&processed_dir)?;
    for path in written {
        match archive(path, &processed_dir) {
            Ok(_) => info!("Processed: {}", path.display()),
            Err(e) => warn!("{}; row kept, file left in {}", e, results_dir.display()),
        }
    }

    info!(
        rows,
        failed,
        csv = %csv_path.display(),
        "Export complete"
    );
    Ok(ExportSummary {
        csv_path: Some(csv_path),
        rows,
        failed,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn read_err(path: &Path, message: String) -> PipelineError {
    PipelineError::ExportRead {
        path: path.to_path_buf(),
        message,
    }
}

fn read_row(path: &Path) -> Result<CsvRow> {
    let err = |message: String| read_err(path, message);

    let text = fs::read_to_string(path).map_err(|e| err(e.to_string()))?;
    let data: Value = serde_json::from_str(&text).map_err(|e| err(e.to_string()))?;
    if !data.is_object() {
        return Err(err("expected a JSON object".into()));
    }
    to_row(&file_name(path), &data)
}

/// Move a consumed result into the processed dir without replacing anything there.
fn archive(path: &Path, processed_dir: &Path) -> Result<PathBuf> {
    let name = file_name(path);
    let stem = name.strip_suffix(".json").unwrap_or(&name);
    let archived = unique_path(processed_dir, stem, ".json");
    fs::rename(path, &archived)
        .map_err(|e| read_err(path, format!("archive failed: {}", e)))?;
    Ok(archived)
}
