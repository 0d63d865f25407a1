//! Windowed two-cohort report
//!
//! Restricts records to a date window, splits them into the first two
//! configured cohorts and, per cohort, ranks models and each model's issue
//! categories. The quality cohort's description filter applies to the
//! per-model breakdown only; the overall model ranking counts every member.

use crate::analysis::{Analysis, CoveragePeriod, DateWindow, WorkWeek};
use crate::cohort::{classify, Cohort, CohortDef, CohortPartition};
use crate::config::AnalysisConfig;
use crate::distribution::{aggregate_nested, Distribution, NestedDistribution, Precision};
use crate::error::{QcrError, Result};
use crate::record::{GroupKey, ResolvedRecord};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortReport {
    pub name: String,

    /// Cohort size before the secondary filter
    pub population: usize,

    /// Cohort size after the secondary filter
    pub filtered_population: usize,

    /// Model ranking over the whole cohort (one decimal)
    pub by_model: Distribution,

    /// Category ranking within each model, over the filtered cohort (one decimal)
    pub model_categories: Vec<NestedDistribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub window: DateWindow,
    pub coverage: CoveragePeriod,
    pub work_week: WorkWeek,

    /// Records inside the window
    pub total_records: usize,

    /// Windowed records in neither cohort
    pub unassigned: usize,

    /// Fixed audit-reason table (two decimals)
    pub reasons: Distribution,

    pub cohorts: Vec<CohortReport>,
}

impl WeeklyReport {
    pub fn cohort(&self, name: &str) -> Option<&CohortReport> {
        self.cohorts.iter().find(|c| c.name == name)
    }
}

pub struct WeeklyAnalysis {
    cohorts: Vec<CohortDef>,
    audit_reasons: Vec<String>,
    window: DateWindow,
    today: NaiveDate,
}

impl WeeklyAnalysis {
    pub fn new(config: &AnalysisConfig, window: DateWindow) -> Self {
        Self {
            cohorts: config.cohorts.clone(),
            audit_reasons: config.audit_reasons.clone(),
            window,
            today: Local::now().date_naive(),
        }
    }

    /// Reference date for the work-week range
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Records inside the window, split into the first two cohorts.
    pub fn partition<'r>(&self, records: &'r [ResolvedRecord]) -> CohortPartition<'r> {
        let defs = &self.cohorts[..self.cohorts.len().min(2)];
        classify(self.window.apply(records), defs)
    }

    fn cohort_report(cohort: &Cohort<'_>) -> CohortReport {
        let filtered = cohort.filtered();
        CohortReport {
            name: cohort.name.clone(),
            population: cohort.len(),
            filtered_population: filtered.len(),
            by_model: Distribution::aggregate(
                cohort.iter(),
                GroupKey::ModelName,
                Precision::OneDecimal,
            ),
            model_categories: aggregate_nested(
                filtered,
                GroupKey::ModelName,
                GroupKey::Category,
                Precision::OneDecimal,
            ),
        }
    }
}

impl Analysis for WeeklyAnalysis {
    type Payload = WeeklyReport;

    fn name(&self) -> &'static str {
        "weekly"
    }

    fn run(&self, records: &[ResolvedRecord]) -> Result<WeeklyReport> {
        if self.cohorts.len() < 2 {
            return Err(QcrError::Config(
                "weekly report needs two cohort definitions".to_string(),
            ));
        }

        let windowed = self.window.apply(records);
        info!(
            "Weekly window {}: {} of {} records",
            CoveragePeriod {
                start: self.window.start,
                end: self.window.end
            }
            .label(),
            windowed.len(),
            records.len()
        );

        let partition = classify(windowed.iter().copied(), &self.cohorts[..2]);
        for cohort in &partition.cohorts {
            info!("Cohort '{}': {} records", cohort.name, cohort.len());
        }

        let reasons = Distribution::tally_fixed(
            windowed.iter().copied(),
            GroupKey::AuditReason,
            &self.audit_reasons,
            Precision::TwoDecimals,
        );

        Ok(WeeklyReport {
            window: self.window,
            coverage: CoveragePeriod::of(windowed.iter().copied(), &self.window),
            work_week: WorkWeek::containing(self.today),
            total_records: windowed.len(),
            unassigned: partition.unassigned,
            reasons,
            cohorts: partition.cohorts.iter().map(Self::cohort_report).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{REASON_QUALITY_REPAIR, REASON_SEVEN_DAY};
    use crate::record::ServiceRecord;

    fn record(
        day: u32,
        reason: &str,
        model: &str,
        category: &str,
        description: &str,
    ) -> ResolvedRecord {
        ResolvedRecord::new(
            ServiceRecord {
                date: NaiveDate::from_ymd_opt(2025, 3, day),
                audit_reason: reason.to_string(),
                mtm: model.to_string(),
                category: category.to_string(),
                issue_description: description.to_string(),
                ..Default::default()
            },
            model.to_string(),
        )
    }

    fn records() -> Vec<ResolvedRecord> {
        vec![
            record(3, REASON_SEVEN_DAY, "A", "changed mind", ""),
            record(4, REASON_SEVEN_DAY, "B", "changed mind", ""),
            record(4, REASON_SEVEN_DAY, "A", "too heavy", ""),
            record(5, REASON_QUALITY_REPAIR, "A", "hinge", "cracked hinge"),
            record(5, REASON_QUALITY_REPAIR, "A", "screen", ""),
            record(6, "other", "C", "misc", "x"),
            record(20, REASON_QUALITY_REPAIR, "B", "battery", "swollen"),
        ]
    }

    fn analysis(window: DateWindow) -> WeeklyAnalysis {
        WeeklyAnalysis::new(&AnalysisConfig::default(), window)
            .with_today(NaiveDate::from_ymd_opt(2025, 3, 12).unwrap())
    }

    #[test]
    fn test_window_and_cohorts() {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2025, 3, 1),
            NaiveDate::from_ymd_opt(2025, 3, 10),
        );
        let report = analysis(window).run(&records()).unwrap();

        assert_eq!(report.total_records, 6);
        assert_eq!(report.unassigned, 1);

        let fast = report.cohort("fast-return").unwrap();
        assert_eq!(fast.population, 3);
        assert_eq!(fast.by_model.rows[0].label, "A");
        assert_eq!(fast.by_model.rows[0].percentage, 66.7);

        assert_eq!(report.work_week.label(), "2025/03/10 - 2025/03/14");
        assert_eq!(report.coverage.label(), "2025/03/01 - 2025/03/10");
    }

    #[test]
    fn test_description_filter_only_affects_model_breakdown() {
        let report = analysis(DateWindow::unbounded()).run(&records()).unwrap();
        let quality = report.cohort("quality-issue").unwrap();

        assert_eq!(quality.population, 3);
        assert_eq!(quality.filtered_population, 2);
        assert_eq!(quality.by_model.total_count(), 3);

        let a = &quality.model_categories[0];
        assert_eq!(a.label, "A");
        assert_eq!(a.population, 1);
        assert_eq!(a.distribution.get("hinge").map(|r| r.percentage), Some(100.0));
    }

    #[test]
    fn test_reason_table_keeps_configured_order() {
        let report = analysis(DateWindow::unbounded()).run(&records()).unwrap();
        let labels: Vec<&str> = report.reasons.labels().collect();
        let configured = AnalysisConfig::default().audit_reasons;
        assert_eq!(
            labels,
            configured.iter().map(String::as_str).collect::<Vec<_>>()
        );
        assert_eq!(report.reasons.get(REASON_SEVEN_DAY).map(|r| r.count), Some(3));
        assert_eq!(report.reasons.get(REASON_SEVEN_DAY).map(|r| r.percentage), Some(50.0));
    }

    #[test]
    fn test_partition_matches_report_populations() {
        let window = DateWindow::new(None, NaiveDate::from_ymd_opt(2025, 3, 10));
        let analysis = analysis(window);
        let records = records();
        let report = analysis.run(&records).unwrap();
        let partition = analysis.partition(&records);

        for cohort in &report.cohorts {
            let members = partition.get(&cohort.name).unwrap();
            assert_eq!(members.len(), cohort.population);
            assert_eq!(members.filtered().len(), cohort.filtered_population);
        }
        assert_eq!(partition.unassigned, report.unassigned);
    }

    #[test]
    fn test_empty_window_yields_empty_distributions() {
        let window = DateWindow::new(NaiveDate::from_ymd_opt(2026, 1, 1), None);
        let report = analysis(window).run(&records()).unwrap();
        assert_eq!(report.total_records, 0);
        assert!(report.cohorts.iter().all(|c| c.by_model.is_empty()));
    }
}
