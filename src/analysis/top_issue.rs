//! Top-K issue categories and the models each one hits

use crate::analysis::Analysis;
use crate::distribution::{Distribution, Precision};
use crate::error::Result;
use crate::record::{GroupKey, ResolvedRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// One ranked issue and its model distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueBreakdown {
    pub rank: usize,
    pub category: String,
    pub count: usize,

    /// Share of the whole population (two decimals)
    pub percentage: f64,
    pub cumulative_percentage: f64,

    /// Models within this issue; denominator is `count`
    pub models: Distribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopIssueReport {
    pub total_records: usize,

    /// Distinct categories before truncation to `k`
    pub total_categories: usize,

    pub k: usize,

    /// Top-k category table with cumulative column
    pub issues: Distribution,

    pub breakdowns: Vec<IssueBreakdown>,
}

pub struct TopIssueAnalysis {
    k: usize,
}

impl TopIssueAnalysis {
    pub fn new(k: usize) -> Self {
        Self { k }
    }
}

impl Analysis for TopIssueAnalysis {
    type Payload = TopIssueReport;

    fn name(&self) -> &'static str {
        "top_issue"
    }

    fn run(&self, records: &[ResolvedRecord]) -> Result<TopIssueReport> {
        // Blank categories are not an issue, but they stay in the denominator
        let ranked =
            Distribution::aggregate_non_blank(records, GroupKey::Category, Precision::TwoDecimals)
                .with_cumulative();
        let total_categories = ranked.len();
        let issues = ranked.top(self.k);

        let mut by_category: HashMap<&str, Vec<&ResolvedRecord>> = HashMap::new();
        for record in records {
            by_category
                .entry(record.field(GroupKey::Category))
                .or_default()
                .push(record);
        }

        let breakdowns = issues
            .rows
            .iter()
            .map(|row| {
                let members = by_category.remove(row.label.as_str()).unwrap_or_default();
                IssueBreakdown {
                    rank: row.rank,
                    category: row.label.clone(),
                    count: row.count,
                    percentage: row.percentage,
                    cumulative_percentage: row.cumulative_percentage.unwrap_or(row.percentage),
                    models: Distribution::aggregate(
                        members,
                        GroupKey::ModelName,
                        Precision::TwoDecimals,
                    ),
                }
            })
            .collect();

        info!(
            "Top issues: {} of {} categories over {} records",
            issues.len(),
            total_categories,
            records.len()
        );

        Ok(TopIssueReport {
            total_records: records.len(),
            total_categories,
            k: self.k,
            issues,
            breakdowns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ServiceRecord;

    fn record(model: &str, category: &str) -> ResolvedRecord {
        ResolvedRecord::new(
            ServiceRecord {
                mtm: model.to_string(),
                category: category.to_string(),
                ..Default::default()
            },
            model.to_string(),
        )
    }

    #[test]
    fn test_top_issues_with_model_breakdown() {
        let records = vec![
            record("A", "hinge"),
            record("B", "hinge"),
            record("A", "hinge"),
            record("A", "screen"),
            record("C", "battery"),
            record("B", "screen"),
            record("C", "keyboard"),
            record("A", "hinge"),
        ];
        let report = TopIssueAnalysis::new(2).run(&records).unwrap();

        assert_eq!(report.total_categories, 4);
        assert_eq!(report.issues.len(), 2);
        assert_eq!(report.breakdowns[0].category, "hinge");
        assert_eq!(report.breakdowns[0].percentage, 50.0);
        assert_eq!(report.breakdowns[1].cumulative_percentage, 75.0);

        let hinge_models = &report.breakdowns[0].models;
        assert_eq!(hinge_models.population, 4);
        assert_eq!(hinge_models.get("A").map(|r| r.percentage), Some(75.0));
        assert_eq!(hinge_models.get("B").map(|r| r.percentage), Some(25.0));
    }

    #[test]
    fn test_k_larger_than_categories() {
        let records = vec![record("A", "hinge")];
        let report = TopIssueAnalysis::new(10).run(&records).unwrap();
        assert_eq!(report.breakdowns.len(), 1);
        assert_eq!(report.breakdowns[0].cumulative_percentage, 100.0);
    }

    #[test]
    fn test_blank_category_is_not_ranked() {
        let mut records = vec![
            record("X", "a"),
            record("X", "b"),
            record("Y", "a"),
            record("Y", "b"),
        ];
        for model in ["X", "Y", "Z", "Z", "Z"] {
            records.push(record(model, " "));
        }
        let report = TopIssueAnalysis::new(5).run(&records).unwrap();

        let ranked: Vec<(&str, usize)> = report
            .breakdowns
            .iter()
            .map(|b| (b.category.as_str(), b.count))
            .collect();
        assert_eq!(ranked, vec![("a", 2), ("b", 2)]);
        assert_eq!(report.total_categories, 2);
        assert_eq!(report.total_records, 9);
        assert_eq!(report.breakdowns[0].percentage, 22.22);
        assert_eq!(report.breakdowns[1].cumulative_percentage, 44.44);
    }

    #[test]
    fn test_empty_population() {
        let report = TopIssueAnalysis::new(5).run(&[]).unwrap();
        assert!(report.issues.is_empty());
        assert!(report.breakdowns.is_empty());
    }
}
