use crate::error::{AssistantError, Result};
use std::path::{Path, PathBuf};

/// Pinned assistant version the deployed capabilities were built against.
pub const ASSISTANT_VERSION: &str = "6.0.0";

/// Model key pinned for the SQL generation capability.
pub const GENERATION_MODEL_KEY: &str = "openai-gpt-4o-2024-08-06";

/// Per-request timeout used for every capability invocation.
pub const CAPABILITY_TIMEOUT_SECS: u64 = 600;

pub const DEFAULT_BASE_URL: &str = "https://api.conva.ai";

pub const TRANSACTIONS_TABLE: &str = "phonepe_transactions_data";
pub const USERS_TABLE: &str = "phonepe_users_data";

/// Runtime configuration for one assistant process. Secrets come from the
/// environment; paths and overrides come from the CLI.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub assistant_id: String,
    pub api_key: String,
    pub assistant_version: String,
    pub base_url: String,
    pub generation_model_key: String,
    pub capability_timeout_secs: u64,
    pub transactions_csv: PathBuf,
    pub users_csv: PathBuf,
    pub related_seed: PathBuf,
}

impl AssistantConfig {
    /// Build the configuration from `CONVA_*` environment variables plus the
    /// data directory selected on the command line.
    pub fn from_env(data_dir: &Path, base_url_override: Option<String>) -> Result<Self> {
        let assistant_id = std::env::var("CONVA_ASSISTANT_ID")
            .map_err(|_| AssistantError::Config("CONVA_ASSISTANT_ID is not set".to_string()))?;
        let api_key = std::env::var("CONVA_API_KEY")
            .map_err(|_| AssistantError::Config("CONVA_API_KEY is not set".to_string()))?;
        let base_url = base_url_override
            .or_else(|| std::env::var("CONVA_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            assistant_id,
            api_key,
            assistant_version: ASSISTANT_VERSION.to_string(),
            base_url,
            generation_model_key: GENERATION_MODEL_KEY.to_string(),
            capability_timeout_secs: CAPABILITY_TIMEOUT_SECS,
            transactions_csv: data_dir.join("pp_transactions.csv"),
            users_csv: data_dir.join("pp_users.csv"),
            related_seed: data_dir.join("related.json"),
        })
    }
}
