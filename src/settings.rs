use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

use crate::state::DocumentState;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "meituan/longcat-flash-chat:free";
pub const DEFAULT_TOKEN_LIMIT: usize = 122_000;

const RESULTS_DIR: &str = "jsons";
const PROCESSED_DIR: &str = "processed_jsons";
const CSV_NAME: &str = "authors_contacts.csv";
const LOG_NAME: &str = "run_log.txt";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub model: String,
    pub base_url: String,
    pub token_limit: usize,
    pub request_timeout_secs: u64,
}

impl Settings {
    /// Defaults, then `CONTACTS_*` variables, then `OPENROUTER_BASE_URL`.
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .set_default("data_dir", "data/outputs")?
            .set_default("logs_dir", "logs")?
            .set_default("model", DEFAULT_MODEL)?
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("token_limit", DEFAULT_TOKEN_LIMIT as i64)?
            .set_default("request_timeout_secs", 300i64)?
            .add_source(Environment::with_prefix("CONTACTS").try_parsing(true))
            .set_override_option("base_url", std::env::var("OPENROUTER_BASE_URL").ok())?
            .build()
            .context("Failed to build settings")?;

        settings
            .try_deserialize()
            .context("Invalid CONTACTS_* settings")
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.data_dir, &self.logs_dir)
    }
}

/// Where every lifecycle location lives on disk.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    logs: PathBuf,
}

impl Layout {
    pub fn new(root: impl AsRef<Path>, logs: impl AsRef<Path>) -> Self {
        Layout {
            root: root.as_ref().to_path_buf(),
            logs: logs.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self, state: DocumentState) -> PathBuf {
        self.root.join(state.dir_name())
    }

    pub fn pending_dir(&self) -> PathBuf {
        self.dir(DocumentState::Pending)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join(RESULTS_DIR)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join(PROCESSED_DIR)
    }

    pub fn csv_path(&self) -> PathBuf {
        self.root.join(CSV_NAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.logs.join(LOG_NAME)
    }
}
