//! Advisory text summaries of distribution tables
//!
//! The LLM is never on the critical path: a missing client, a timeout or any
//! [`LlmError`] yields a fixed local text instead, and the report carries on.

use crate::config::LlmConfig;
use crate::distribution::Distribution;
use crate::error::LlmError;
use crate::llm::TextGenerator;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    Llm,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryText {
    pub subject: String,
    pub text: String,
    pub source: SummarySource,
}

/// What the table handed to [`Summarizer::summarize_as`] holds; each kind
/// gets its own instructions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SummaryPrompt<'a> {
    /// Category distribution of one model or cohort
    Categories,

    /// Model distribution inside one ranked issue
    IssueModels {
        issue: &'a str,
        count: usize,

        /// The issue's share of all records
        percentage: f64,
    },

    /// The ranked issue table itself
    IssueOverview,
}

/// Rows of the model table quoted in an issue prompt.
const ISSUE_MODEL_ROWS: usize = 10;

/// Rows of the issue table quoted in the overview prompt.
const OVERVIEW_ROWS: usize = 5;

pub struct Summarizer {
    generator: Option<Box<dyn TextGenerator>>,
    timeout: Duration,
    top_n: usize,
    coverage_threshold: f64,
    focus_threshold: f64,
}

impl Summarizer {
    pub fn new(generator: Box<dyn TextGenerator>, config: &LlmConfig) -> Self {
        Self {
            generator: Some(generator),
            ..Self::disabled(config)
        }
    }

    /// Summarizer that always returns the fallback text.
    pub fn disabled(config: &LlmConfig) -> Self {
        Self {
            generator: None,
            timeout: Duration::from_secs(config.timeout_secs),
            top_n: config.top_n,
            coverage_threshold: config.coverage_threshold,
            focus_threshold: config.focus_threshold,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.generator.is_some()
    }

    /// Summarize one category distribution. Never fails.
    pub async fn summarize(&self, subject: &str, distribution: &Distribution) -> SummaryText {
        self.summarize_as(subject, distribution, SummaryPrompt::Categories)
            .await
    }

    /// Summarize `distribution` with the instructions for `kind`. Never fails.
    pub async fn summarize_as(
        &self,
        subject: &str,
        distribution: &Distribution,
        kind: SummaryPrompt<'_>,
    ) -> SummaryText {
        let Some(generator) = self.generator.as_ref() else {
            return fallback(subject, distribution.population);
        };

        match self.request(generator.as_ref(), distribution, kind).await {
            Ok(text) => {
                info!("LLM summary generated for '{}'", subject);
                SummaryText {
                    subject: subject.to_string(),
                    text,
                    source: SummarySource::Llm,
                }
            }
            Err(e) => {
                warn!("LLM summary for '{}' failed ({}); using fallback text", subject, e);
                fallback(subject, distribution.population)
            }
        }
    }

    async fn request(
        &self,
        generator: &dyn TextGenerator,
        distribution: &Distribution,
        kind: SummaryPrompt<'_>,
    ) -> Result<String, LlmError> {
        if distribution.is_empty() {
            return Err(LlmError::EmptyInput(format!(
                "{} table is empty",
                distribution.label_column
            )));
        }

        let prompt = self.prompt(distribution, kind);
        let text = tokio::time::timeout(self.timeout, generator.generate(&prompt))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))??;

        if text.trim().is_empty() {
            return Err(LlmError::Malformed("empty completion".to_string()));
        }
        Ok(text)
    }

    pub fn prompt(&self, distribution: &Distribution, kind: SummaryPrompt<'_>) -> String {
        match kind {
            SummaryPrompt::Categories => self.category_prompt(distribution),
            SummaryPrompt::IssueModels {
                issue,
                count,
                percentage,
            } => issue_models_prompt(issue, count, percentage, distribution),
            SummaryPrompt::IssueOverview => issue_overview_prompt(distribution),
        }
    }

    fn category_prompt(&self, distribution: &Distribution) -> String {
        format!(
            r#"You are a quality engineer reviewing PC product returns.
Work only from the table below (columns: category, count, share %). Do not add
categories, do not recompute shares, and quote category names exactly.

{table}

1. State the sample size, then name the leading categories in the form
   "category*count (share%)". Always name the first; name the next ones only
   while they are at least {focus}% each, and stop after {top_n} or once the
   named categories reach {coverage}% combined.
2. Say whether the remaining categories are scattered or concentrated.
3. Give short, actionable interception advice for the named quality issues.
   Skip advice for no-reason returns.
Answer in under 300 words."#,
            table = distribution_tsv(distribution, usize::MAX),
            focus = self.focus_threshold,
            top_n = self.top_n,
            coverage = self.coverage_threshold,
        )
    }
}

fn issue_models_prompt(
    issue: &str,
    count: usize,
    percentage: f64,
    models: &Distribution,
) -> String {
    format!(
        r#"You are a quality engineer reviewing PC product returns.
Issue: {issue}
Affected units: {count} ({percentage:.2}% of all returns)

How this issue spreads over product models (columns: model, count, share %
within this issue; top {rows} models):

{table}

Answer in four short parts of at most four sentences each:
1. Symptoms: how the issue typically shows up.
2. Impact: how severe and how widespread it is.
3. Model concentration: whether a few models carry most of it, and what that
   suggests.
4. Likely causes: three candidates across design, supply chain, manufacturing
   and usage.
Quote model names exactly and do not recompute shares."#,
        rows = ISSUE_MODEL_ROWS,
        table = distribution_tsv(models, ISSUE_MODEL_ROWS),
    )
}

fn issue_overview_prompt(issues: &Distribution) -> String {
    format!(
        r#"You are a product quality manager.
The table below ranks the top return issues (columns: issue, count, share %
of all returns, cumulative share %).

{table}

In one sentence of at most 50 words, summarise how the returns are spread
over these issues and name the ones that need attention first."#,
        table = distribution_tsv(issues, OVERVIEW_ROWS),
    )
}

/// Header row named after the label column, then up to `limit`
/// `label\tcount\tshare` lines. A cumulative column is added when the
/// distribution carries one.
pub fn distribution_tsv(distribution: &Distribution, limit: usize) -> String {
    let decimals = distribution.precision.decimals() as usize;
    let cumulative = distribution
        .rows
        .iter()
        .any(|row| row.cumulative_percentage.is_some());

    let mut header = format!("{}\tcount\tshare", distribution.label_column);
    if cumulative {
        header.push_str("\tcumulative");
    }

    let mut lines = vec![header];
    lines.extend(distribution.rows.iter().take(limit).map(|row| {
        let mut line = format!(
            "{}\t{}\t{:.*}",
            row.label, row.count, decimals, row.percentage
        );
        if let Some(running) = row.cumulative_percentage {
            line.push_str(&format!("\t{:.*}", decimals, running));
        }
        line
    }));
    lines.join("\n")
}

/// Deterministic text used whenever no LLM summary is available.
pub fn fallback(subject: &str, records: usize) -> SummaryText {
    SummaryText {
        subject: subject.to_string(),
        text: format!(
            "Core insights\n\
             - Sample: {} has {} records; no automated summary was generated.\n\
             - Review the category table manually.",
            subject, records
        ),
        source: SummarySource::Fallback,
    }
}
