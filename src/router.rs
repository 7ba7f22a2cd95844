//! Moves documents between lifecycle directories.
//!
//! Every move goes through `unique_path`, so routing never replaces a file that
//! already sits in the destination. A same-named document gets `_1`, `_2`, ...

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::error::Result;
use crate::settings::Layout;
use crate::state::{DocumentState, Outcome};
use crate::validate::ExtractionResult;

const SKIPPED_MARKER: &str = "_SKIPPED";
const STAGED_EXT: &str = "partial";

/// `_SKIPPED` plus the counter `unique_path` may have added after it.
static SKIPPED_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_SKIPPED(_\d+)?$").unwrap());

pub enum Route<'a> {
    Skip,
    Fail,
    Success(&'a ExtractionResult),
}

impl Route<'_> {
    pub fn outcome(&self) -> Outcome {
        match self {
            Route::Skip => Outcome::Skip,
            Route::Fail => Outcome::Fail,
            Route::Success(_) => Outcome::Success,
        }
    }
}

pub struct DocumentRouter {
    layout: Layout,
}

impl DocumentRouter {
    pub fn new(layout: Layout) -> Self {
        DocumentRouter { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Route a pending document. Returns where it ended up.
    pub fn route(&self, document: &Path, route: Route<'_>) -> Result<PathBuf> {
        let target = DocumentState::Pending.after(route.outcome())?;
        let (stem, ext) = split_name(document);
        let dir = self.layout.dir(target);
        fs::create_dir_all(&dir)?;

        match route {
            Route::Skip => {
                let dest = unique_path(&dir, &format!("{}{}", stem, SKIPPED_MARKER), &ext);
                fs::rename(document, &dest)?;
                Ok(dest)
            }
            Route::Fail => {
                let dest = unique_path(&dir, &stem, &ext);
                fs::rename(document, &dest)?;
                Ok(dest)
            }
            Route::Success(result) => {
                // the previous result under this stem stays until the document has moved
                let staged = self.stage_result(&stem, result)?;
                let dest = unique_path(&dir, &stem, &ext);
                if let Err(e) = fs::rename(document, &dest) {
                    discard(&staged);
                    return Err(e.into());
                }
                let result_path = self.layout.results_dir().join(format!("{}.json", stem));
                if let Err(e) = fs::rename(&staged, &result_path) {
                    if let Err(undo) = fs::rename(&dest, document) {
                        warn!("Could not return {} to pending: {}", dest.display(), undo);
                    }
                    discard(&staged);
                    return Err(e.into());
                }
                Ok(dest)
            }
        }
    }

    /// Explicit re-queue of a failed or skipped document back into `to_analyze`.
    pub fn requeue(&self, from: DocumentState, document: &Path) -> Result<PathBuf> {
        let target = from.requeue()?;
        let (stem, ext) = split_name(document);
        let base = document_base(&stem);
        let dir = self.layout.dir(target);
        fs::create_dir_all(&dir)?;
        let dest = unique_path(&dir, base, &ext);
        fs::rename(document, &dest)?;
        Ok(dest)
    }

    /// Written beside the result store under an extension the exporter never lists.
    fn stage_result(&self, stem: &str, result: &ExtractionResult) -> Result<PathBuf> {
        let dir = self.layout.results_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json.{}", stem, STAGED_EXT));
        fs::write(&path, result.canonical())?;
        Ok(path)
    }
}

fn discard(staged: &Path) {
    if let Err(e) = fs::remove_file(staged) {
        warn!("Could not remove {}: {}", staged.display(), e);
    }
}

/// Document stem without a trailing `_SKIPPED` or `_SKIPPED_<n>`.
pub fn document_base(stem: &str) -> &str {
    match SKIPPED_SUFFIX_RE.find(stem) {
        Some(m) => &stem[..m.start()],
        None => stem,
    }
}

/// `<base><ext>`, else `<base>_1<ext>`, `<base>_2<ext>`, ... whichever is free first.
/// Check-then-act: only safe with a single writer.
pub fn unique_path(dir: &Path, base: &str, ext: &str) -> PathBuf {
    let candidate = dir.join(format!("{}{}", base, ext));
    if !candidate.exists() {
        return candidate;
    }
    (1u64..)
        .map(|i| dir.join(format!("{}_{}{}", base, i, ext)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Files with the given extension in `dir`, sorted by name. Missing dir → empty.
pub fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == extension))
        .collect();
    files.sort();
    Ok(files)
}

/// (stem, ".ext") with an empty extension when the file has none.
fn split_name(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}
