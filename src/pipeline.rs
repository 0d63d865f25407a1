//! End-to-end run: load, resolve, dedup/persist, analyse, publish
//!
//! Preparation is synchronous and the only place a run can stop early (the
//! input file's hard-stop checks). Publishing never fails: each artifact and
//! each summary degrades on its own.

use crate::analysis::{Analysis, TopIssueReport, TopModelReport, WeeklyReport};
use crate::cohort::CohortPartition;
use crate::artifacts::{ArtifactManifest, ArtifactWriter, ChartRenderer, ChartSpec};
use crate::config::{ChartStyle, PipelineConfig};
use crate::error::Result;
use crate::ingestion::CsvRecordSource;
use crate::record::{GroupKey, ResolvedRecord};
use crate::report::{render_top_issue, render_top_model, render_weekly};
use crate::resolver::{retain_mapped, IdentifierMap, IdentifierResolver, ResolutionReport};
use crate::store::{IngestionGateway, PersistOutcome};
use crate::summary::{Summarizer, SummaryPrompt, SummaryText};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub data_file: PathBuf,
    pub mapping_file: PathBuf,

    /// Drop records whose identifier has no mapping
    pub filter_unmapped: bool,

    /// Append never-seen records to the store
    pub persist: bool,

    /// Analyse only records the store had not seen
    pub new_only: bool,
}

impl PipelineOptions {
    pub fn new(data_file: impl Into<PathBuf>, config: &PipelineConfig) -> Self {
        Self {
            data_file: data_file.into(),
            mapping_file: config.output.mapping_file.clone(),
            filter_unmapped: false,
            persist: true,
            new_only: false,
        }
    }
}

/// Resolved records ready for the orchestrators.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub source_id: String,
    pub records: Vec<ResolvedRecord>,
    pub resolution: ResolutionReport,

    /// Records the store had not seen; every record when there is no store
    pub new_records: usize,

    pub persist: Option<PersistOutcome>,
}

/// Load and resolve the input, then dedup and persist through `gateway`.
pub fn prepare(
    config: &PipelineConfig,
    options: &PipelineOptions,
    gateway: Option<&IngestionGateway>,
) -> Result<PreparedBatch> {
    let batch = CsvRecordSource::from_path(&options.data_file).load()?;
    let map = IdentifierMap::load(&options.mapping_file, &config.analysis.mapping_header_labels);
    let resolver = IdentifierResolver::new(map);

    let (mut resolved, resolution) = resolver.resolve(batch.records);
    if options.filter_unmapped {
        resolved = retain_mapped(resolved);
    }

    let Some(gateway) = gateway else {
        return Ok(PreparedBatch {
            source_id: batch.source_id,
            new_records: resolved.len(),
            records: resolved,
            resolution,
            persist: None,
        });
    };

    let (records, new_records, persist) = if options.new_only {
        let fresh = gateway.filter_new(resolved, |r| r.record().business_key());
        let outcome = options
            .persist
            .then(|| gateway.persist(fresh.iter().map(|r| r.record())));
        let count = fresh.len();
        (fresh, count, outcome)
    } else {
        let (count, outcome) = {
            let fresh = gateway.filter_new(resolved.iter().collect::<Vec<_>>(), |r| {
                r.record().business_key()
            });
            let outcome = options
                .persist
                .then(|| gateway.persist(fresh.iter().map(|r| r.record())));
            (fresh.len(), outcome)
        };
        (resolved, count, outcome)
    };

    info!(
        "Prepared {} records from '{}' ({} new)",
        records.len(),
        batch.source_id,
        new_records
    );

    Ok(PreparedBatch {
        source_id: batch.source_id,
        records,
        resolution,
        new_records,
        persist,
    })
}

/// JSON payload handed to the slide/chart generators.
#[derive(Serialize)]
pub struct RunPayload<'a, T: Serialize> {
    pub analysis: &'static str,
    pub batch_name: &'a str,
    pub source_id: &'a str,
    pub generated_at: NaiveDateTime,
    pub resolution: &'a ResolutionReport,
    pub persist: Option<&'a PersistOutcome>,
    pub report: &'a T,
    pub summaries: &'a [SummaryText],
}

/// Everything the publish step needs besides the report itself.
pub struct Publisher<'a> {
    pub writer: ArtifactWriter,
    pub renderer: &'a dyn ChartRenderer,
    pub summarizer: &'a Summarizer,
    pub style: ChartStyle,
    pub batch_name: String,
}

impl<'a> Publisher<'a> {
    fn payload<'p, T: Serialize>(
        &'p self,
        analysis: &'static str,
        prepared: &'p PreparedBatch,
        report: &'p T,
        summaries: &'p [SummaryText],
        generated_at: NaiveDateTime,
    ) -> RunPayload<'p, T> {
        RunPayload {
            analysis,
            batch_name: &self.batch_name,
            source_id: &prepared.source_id,
            generated_at,
            resolution: &prepared.resolution,
            persist: prepared.persist.as_ref(),
            report,
            summaries,
        }
    }

    /// Each model's filtered cohort records next to its category table, as
    /// `<model>_<cohort>_records.csv`.
    pub fn weekly_records(&mut self, partition: &CohortPartition<'_>) {
        for cohort in &partition.cohorts {
            let mut index: HashMap<&str, usize> = HashMap::new();
            let mut by_model: Vec<(&str, Vec<&ResolvedRecord>)> = Vec::new();
            for record in cohort.filtered() {
                let model = record.field(GroupKey::ModelName);
                let slot = *index.entry(model).or_insert_with(|| {
                    by_model.push((model, Vec::new()));
                    by_model.len() - 1
                });
                by_model[slot].1.push(record);
            }

            for (model, records) in &by_model {
                self.writer
                    .write_records(&format!("{}_{}_records", model, cohort.name), records);
            }
        }
    }

    pub async fn weekly(
        mut self,
        prepared: &PreparedBatch,
        report: &WeeklyReport,
    ) -> ArtifactManifest {
        let generated_at = Local::now().naive_local();

        self.writer.write_distribution("audit_reasons", &report.reasons);
        self.writer.render_chart(
            self.renderer,
            &ChartSpec::reasons("audit_reasons", &self.style),
            &report.reasons,
        );

        let mut summaries = Vec::new();
        for cohort in &report.cohorts {
            self.writer
                .write_distribution(&format!("{}_models", cohort.name), &cohort.by_model);
            self.writer.render_chart(
                self.renderer,
                &ChartSpec::pie(format!("{}_models", cohort.name), &self.style),
                &cohort.by_model,
            );
            self.writer.write_nested(
                &format!("{}_model_categories", cohort.name),
                "model_name",
                &cohort.model_categories,
            );

            for model in &cohort.model_categories {
                let title = format!("{}_{}", model.label, cohort.name);
                self.writer.render_chart(
                    self.renderer,
                    &ChartSpec::bar(title.clone(), &self.style),
                    &model.distribution,
                );
                summaries.push(self.summarizer.summarize(&title, &model.distribution).await);
            }
        }

        let mut text = render_weekly(report, generated_at);
        append_summaries(&mut text, &summaries);

        let payload = self.payload("weekly", prepared, report, &summaries, generated_at);
        match serde_json::to_value(&payload) {
            Ok(value) => {
                self.writer.write_json("weekly_payload", &value);
            }
            Err(e) => warn!("Failed to serialize weekly payload: {}", e),
        }
        self.writer.write_text("weekly_report", &text);
        self.writer.finish()
    }

    pub async fn top_issue(
        mut self,
        prepared: &PreparedBatch,
        report: &TopIssueReport,
    ) -> ArtifactManifest {
        let generated_at = Local::now().naive_local();

        self.writer.write_distribution("top_issues", &report.issues);
        self.writer.render_chart(
            self.renderer,
            &ChartSpec::bar("top_issues", &self.style),
            &report.issues,
        );

        let mut summaries = vec![
            self.summarizer
                .summarize_as("top_issues", &report.issues, SummaryPrompt::IssueOverview)
                .await,
        ];
        for issue in &report.breakdowns {
            let title = format!("{:02}_{}", issue.rank, issue.category);
            self.writer
                .write_distribution(&format!("{}_models", title), &issue.models);
            self.writer.render_chart(
                self.renderer,
                &ChartSpec::pie(format!("{}_models", title), &self.style),
                &issue.models,
            );
            let kind = SummaryPrompt::IssueModels {
                issue: &issue.category,
                count: issue.count,
                percentage: issue.percentage,
            };
            summaries.push(
                self.summarizer
                    .summarize_as(&issue.category, &issue.models, kind)
                    .await,
            );
        }

        let mut text = render_top_issue(report);
        append_summaries(&mut text, &summaries);

        let payload = self.payload("top_issue", prepared, report, &summaries, generated_at);
        match serde_json::to_value(&payload) {
            Ok(value) => {
                self.writer.write_json("top_issue_payload", &value);
            }
            Err(e) => warn!("Failed to serialize top issue payload: {}", e),
        }
        self.writer.write_text("top_issue_report", &text);
        self.writer.finish()
    }

    pub async fn top_model(
        mut self,
        prepared: &PreparedBatch,
        report: &TopModelReport,
    ) -> ArtifactManifest {
        let generated_at = Local::now().naive_local();

        let mut summaries = Vec::new();
        for profile in &report.profiles {
            let title = format!("{:02}_{}", profile.summary.rank, profile.summary.model_name);
            self.writer
                .write_distribution(&format!("{}_categories", title), &profile.categories);
            self.writer.render_chart(
                self.renderer,
                &ChartSpec::bar(format!("{}_categories", title), &self.style),
                &profile.categories,
            );
            summaries.push(
                self.summarizer
                    .summarize(&profile.summary.model_name, &profile.categories)
                    .await,
            );
        }

        let mut text = render_top_model(report);
        append_summaries(&mut text, &summaries);

        let payload = self.payload("top_model", prepared, report, &summaries, generated_at);
        match serde_json::to_value(&payload) {
            Ok(value) => {
                self.writer.write_json("top_model_payload", &value);
            }
            Err(e) => warn!("Failed to serialize top model payload: {}", e),
        }
        self.writer.write_text("top_model_report", &text);
        self.writer.finish()
    }
}

fn append_summaries(text: &mut String, summaries: &[SummaryText]) {
    for summary in summaries {
        text.push_str("\n\n[");
        text.push_str(&summary.subject);
        text.push_str("]\n");
        text.push_str(&summary.text);
    }
}

/// Run one orchestrator over a prepared batch.
pub fn analyse<A: Analysis>(analysis: &A, prepared: &PreparedBatch) -> Result<A::Payload> {
    info!(
        "Running {} analysis over {} records",
        analysis.name(),
        prepared.records.len()
    );
    analysis.run(&prepared.records)
}
