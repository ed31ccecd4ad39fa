use crate::error::{AppError, Result};
use crate::profiles::ExtractionProfile;
use std::path::PathBuf;
use std::time::Duration;

pub const API_KEY_VAR: &str = "GOOGLE_API_KEY";
pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODELS: &[&str] = &["gemini-1.5-pro", "gemini-1.5-flash", "gemini-2.0-flash"];
pub const DEFAULT_TRUTH_MODEL: &str = "gemini-1.5-pro";

pub const RESULTS_FILE: &str = "extraction_results.json";
pub const COMPARISON_FILE: &str = "comparison_results.json";
pub const REPORT_FILE: &str = "accuracy_report.md";
pub const HISTORY_FILE: &str = "extractions.db";

/// Loads `.env` from the working directory if present.
pub fn load_env() {
    let _ = dotenvy::dotenv();
}

/// Reads the credential stored in `var`. Absence is fatal for a run.
pub fn api_key_from_env(var: &'static str) -> Result<String> {
    api_key_from(var, std::env::var(var).ok())
}

/// Trims `value`; absent, empty and whitespace-only values are a missing credential.
pub fn api_key_from(var: &'static str, value: Option<String>) -> Result<String> {
    value
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or(AppError::MissingCredential(var))
}

/// Deterministic generation parameters sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_output_tokens: 8192,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub models: Vec<String>,
    pub truth_model: String,
    pub profile: ExtractionProfile,
    pub generation: GenerationSettings,
    pub call_delay: Duration,
    pub request_timeout: Duration,
    pub api_base: String,
    pub openai_api_base: String,
    /// SQLite history location; `None` disables history and resume.
    pub history_db: Option<PathBuf>,
    pub resume: bool,
}

impl Config {
    /// Splits a comma-separated model list, trimming blanks and dropping repeats.
    pub fn parse_models(list: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for m in list.split(',').map(str::trim).filter(|m| !m.is_empty()) {
            if !out.iter().any(|o| o == m) {
                out.push(m.to_string());
            }
        }
        out
    }

    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(AppError::Config("model list is empty".to_string()));
        }
        if !self.models.iter().any(|m| m == &self.truth_model) {
            return Err(AppError::Config(format!(
                "truth model '{}' is not in the model list ({})",
                self.truth_model,
                self.models.join(", ")
            )));
        }
        if !self.generation.temperature.is_finite() || self.generation.temperature < 0.0 {
            return Err(AppError::Config("temperature must be a non-negative number".to_string()));
        }
        if self.generation.max_output_tokens == 0 {
            return Err(AppError::Config("max output tokens must be positive".to_string()));
        }
        if self.resume && self.history_db.is_none() {
            return Err(AppError::Config("--resume needs the extraction history database".to_string()));
        }
        Ok(())
    }

    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join(RESULTS_FILE)
    }

    pub fn comparison_path(&self) -> PathBuf {
        self.output_dir.join(COMPARISON_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(REPORT_FILE)
    }
}
