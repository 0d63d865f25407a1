//! Pipeline configuration
//!
//! All settings live in one explicit struct handed to each component's
//! constructor. Environment overrides are resolved once, at process start,
//! by [`PipelineConfig::from_env`].

use crate::cohort::{CohortDef, CohortFilter};
use crate::error::{QcrError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Audit reason marking a no-questions-asked return inside the 7-day window.
pub const REASON_SEVEN_DAY: &str = "7天无理由";
/// Quality-driven audit reasons.
pub const REASON_QUALITY_EXCHANGE_15D: &str = "15天质量换新";
pub const REASON_EXCHANGE_ONLY_180D: &str = "180天只换不修";
pub const REASON_QUALITY_REPAIR: &str = "质量维修";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub store: StoreConfig,
    pub llm: LlmConfig,
    pub output: OutputConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file holding previously ingested service orders
    pub db_path: PathBuf,
    pub table_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f64,
    /// How many leading categories the summary may call out
    pub top_n: usize,
    pub coverage_threshold: f64,
    pub focus_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    pub mapping_file: PathBuf,
    pub charts: ChartStyle,
}

/// Chart sizes (inches, as the external renderer expects them).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChartStyle {
    pub pie_size: (u32, u32),
    pub bar_size: (u32, u32),
    pub reason_size: (u32, u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Cohort definitions; the first two drive the weekly two-cohort report
    pub cohorts: Vec<CohortDef>,
    /// Fixed audit-reason list for the reason table, in display order
    pub audit_reasons: Vec<String>,
    pub top_issue_k: usize,
    pub top_model_k: usize,
    /// First-cell values that mark a header row in the identifier map table
    pub mapping_header_labels: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/qcr_store.db"),
            table_name: "qcr_data".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.moonshot.cn/v1".to_string(),
            model: "kimi-k2-0905-preview".to_string(),
            timeout_secs: 60,
            temperature: 0.2,
            top_n: 3,
            coverage_threshold: 80.0,
            focus_threshold: 10.0,
        }
    }
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            pie_size: (8, 8),
            bar_size: (12, 6),
            reason_size: (6, 6),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            mapping_file: PathBuf::from("mtm.csv"),
            charts: ChartStyle::default(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            cohorts: vec![
                CohortDef::new("fast-return", [REASON_SEVEN_DAY]),
                CohortDef::new(
                    "quality-issue",
                    [
                        REASON_QUALITY_EXCHANGE_15D,
                        REASON_EXCHANGE_ONLY_180D,
                        REASON_QUALITY_REPAIR,
                    ],
                )
                .with_filter(CohortFilter::NonEmptyDescription),
            ],
            audit_reasons: vec![
                REASON_QUALITY_EXCHANGE_15D.to_string(),
                REASON_EXCHANGE_ONLY_180D.to_string(),
                REASON_SEVEN_DAY.to_string(),
                REASON_QUALITY_REPAIR.to_string(),
            ],
            top_issue_k: 10,
            top_model_k: 15,
            mapping_header_labels: vec!["MTM".to_string(), "机型名称".to_string()],
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            llm: LlmConfig::default(),
            output: OutputConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load `.env` (if present) and apply environment overrides on top of the
    /// defaults. Call once at process start.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("QCR_DB_PATH") {
            config.store.db_path = PathBuf::from(path);
        }
        if let Some(table) = lookup("QCR_TABLE_NAME") {
            config.store.table_name = table;
        }
        if let Some(dir) = lookup("QCR_OUTPUT_DIR") {
            config.output.output_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("QCR_MTM_FILE") {
            config.output.mapping_file = PathBuf::from(file);
        }

        config.llm.api_key = lookup("LLM_API_KEY").filter(|k| !k.trim().is_empty());
        if let Some(url) = lookup("LLM_API_URL") {
            config.llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Some(raw) = lookup("LLM_TIMEOUT_SECS") {
            config.llm.timeout_secs = parse_override("LLM_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = lookup("LLM_TOP_N") {
            config.llm.top_n = parse_override("LLM_TOP_N", &raw)?;
        }
        if let Some(raw) = lookup("LLM_COVERAGE_THRESHOLD") {
            config.llm.coverage_threshold = parse_override("LLM_COVERAGE_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("LLM_FOCUS_THRESHOLD") {
            config.llm.focus_threshold = parse_override("LLM_FOCUS_THRESHOLD", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later, mid-pipeline.
    pub fn validate(&self) -> Result<()> {
        let ident = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
            .map_err(|e| QcrError::Config(format!("Failed to create regex: {}", e)))?;
        if !ident.is_match(&self.store.table_name) {
            return Err(QcrError::Config(format!(
                "table name '{}' is not a plain SQL identifier",
                self.store.table_name
            )));
        }
        if self.analysis.cohorts.len() < 2 {
            return Err(QcrError::Config(
                "at least two cohort definitions are required".to_string(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(QcrError::Config("LLM timeout must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| QcrError::Config(format!("{} has unparsable value '{}'", key, raw)))
}
