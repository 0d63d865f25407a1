//! Top-K models by issue diversity
//!
//! Models rank by how many distinct categories they show, not by how many
//! records they have. Equal diversity keeps first-encountered order.

use crate::analysis::Analysis;
use crate::cohort::{classify, CohortDef};
use crate::config::AnalysisConfig;
use crate::distribution::{percentage, Distribution, Precision};
use crate::error::Result;
use crate::record::{GroupKey, ResolvedRecord};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Diversity line for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDiversity {
    pub rank: usize,
    pub model_name: String,
    pub distinct_categories: usize,
    pub record_count: usize,

    /// `record_count / distinct_categories`, one decimal
    pub avg_per_category: f64,
}

/// Records of one model falling into one cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortShare {
    pub cohort: String,
    pub count: usize,

    /// Share of the model's records, one decimal
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub summary: ModelDiversity,

    /// Category distribution within the model (two decimals)
    pub categories: Distribution,

    pub cohorts: Vec<CohortShare>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopModelReport {
    pub total_records: usize,
    pub k: usize,

    /// Every model, ranked
    pub ranking: Vec<ModelDiversity>,

    /// Detail for the top `k`
    pub profiles: Vec<ModelProfile>,
}

pub struct TopModelAnalysis {
    k: usize,
    cohorts: Vec<CohortDef>,
}

impl TopModelAnalysis {
    pub fn new(k: usize, config: &AnalysisConfig) -> Self {
        Self {
            k,
            cohorts: config.cohorts.clone(),
        }
    }

    fn profile(&self, summary: ModelDiversity, members: &[&ResolvedRecord]) -> ModelProfile {
        let partition = classify(members.iter().copied(), &self.cohorts);
        let cohorts = partition
            .cohorts
            .iter()
            .map(|c| CohortShare {
                cohort: c.name.clone(),
                count: c.len(),
                percentage: percentage(c.len(), members.len(), Precision::OneDecimal),
            })
            .collect();

        ModelProfile {
            categories: Distribution::aggregate_non_blank(
                members.iter().copied(),
                GroupKey::Category,
                Precision::TwoDecimals,
            ),
            cohorts,
            summary,
        }
    }
}

impl Analysis for TopModelAnalysis {
    type Payload = TopModelReport;

    fn name(&self) -> &'static str {
        "top_model"
    }

    fn run(&self, records: &[ResolvedRecord]) -> Result<TopModelReport> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<(&str, Vec<&ResolvedRecord>, HashSet<&str>)> = Vec::new();

        for record in records {
            let model = record.field(GroupKey::ModelName);
            let slot = *index.entry(model).or_insert_with(|| {
                groups.push((model, Vec::new(), HashSet::new()));
                groups.len() - 1
            });
            groups[slot].1.push(record);
            let category = record.field(GroupKey::Category);
            if !category.is_empty() {
                groups[slot].2.insert(category);
            }
        }

        // Stable: equal diversity keeps first-encountered order
        groups.sort_by(|a, b| b.2.len().cmp(&a.2.len()));

        let ranking: Vec<ModelDiversity> = groups
            .iter()
            .enumerate()
            .map(|(idx, (model, members, categories))| ModelDiversity {
                rank: idx + 1,
                model_name: model.to_string(),
                distinct_categories: categories.len(),
                record_count: members.len(),
                avg_per_category: if categories.is_empty() {
                    0.0
                } else {
                    Precision::OneDecimal.round(members.len() as f64 / categories.len() as f64)
                },
            })
            .collect();

        let profiles: Vec<ModelProfile> = ranking
            .iter()
            .zip(&groups)
            .take(self.k)
            .map(|(summary, (_, members, _))| self.profile(summary.clone(), members))
            .collect();

        info!(
            "Top models: {} of {} models by category diversity",
            profiles.len(),
            ranking.len()
        );

        Ok(TopModelReport {
            total_records: records.len(),
            k: self.k,
            ranking,
            profiles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{REASON_QUALITY_REPAIR, REASON_SEVEN_DAY};
    use crate::record::ServiceRecord;

    fn record(model: &str, category: &str, reason: &str) -> ResolvedRecord {
        ResolvedRecord::new(
            ServiceRecord {
                mtm: model.to_string(),
                category: category.to_string(),
                audit_reason: reason.to_string(),
                ..Default::default()
            },
            model.to_string(),
        )
    }

    #[test]
    fn test_diversity_beats_raw_count() {
        let mut records = Vec::new();
        for category in ["a", "b", "c", "a", "b", "c", "a", "b", "c", "a"] {
            records.push(record("X", category, REASON_SEVEN_DAY));
        }
        for category in ["a", "b", "c", "d", "e"] {
            records.push(record("Y", category, REASON_QUALITY_REPAIR));
        }

        let report = TopModelAnalysis::new(2, &AnalysisConfig::default())
            .run(&records)
            .unwrap();

        assert_eq!(report.profiles.len(), 2);
        assert_eq!(report.profiles[0].summary.model_name, "Y");
        assert_eq!(report.profiles[0].summary.distinct_categories, 5);
        assert_eq!(report.profiles[1].summary.model_name, "X");
        assert_eq!(report.profiles[1].summary.record_count, 10);
        assert_eq!(report.profiles[1].summary.avg_per_category, 3.3);
    }

    #[test]
    fn test_profile_cohort_shares_and_categories() {
        let records = vec![
            record("X", "hinge", REASON_SEVEN_DAY),
            record("X", "hinge", REASON_QUALITY_REPAIR),
            record("X", "screen", REASON_QUALITY_REPAIR),
            record("X", "fan", "other"),
        ];
        let report = TopModelAnalysis::new(1, &AnalysisConfig::default())
            .run(&records)
            .unwrap();
        let profile = &report.profiles[0];

        assert_eq!(profile.categories.get("hinge").map(|r| r.percentage), Some(50.0));
        let shares: Vec<(&str, usize, f64)> = profile
            .cohorts
            .iter()
            .map(|c| (c.cohort.as_str(), c.count, c.percentage))
            .collect();
        assert_eq!(shares, vec![("fast-return", 1, 25.0), ("quality-issue", 2, 50.0)]);
    }

    #[test]
    fn test_blank_category_adds_no_diversity() {
        let mut records = vec![
            record("X", "a", ""),
            record("X", "b", ""),
            record("Y", "a", ""),
            record("Y", "b", ""),
        ];
        for model in ["X", "Y", "Z", "Z", "Z"] {
            records.push(record(model, "", ""));
        }
        let report = TopModelAnalysis::new(3, &AnalysisConfig::default())
            .run(&records)
            .unwrap();

        let ranking: Vec<(&str, usize)> = report
            .ranking
            .iter()
            .map(|m| (m.model_name.as_str(), m.distinct_categories))
            .collect();
        assert_eq!(ranking, vec![("X", 2), ("Y", 2), ("Z", 0)]);
        assert_eq!(report.ranking[2].avg_per_category, 0.0);

        let x = &report.profiles[0];
        assert_eq!(x.summary.record_count, 3);
        assert!(x.categories.get("").is_none());
        assert_eq!(x.categories.population, 3);
    }

    #[test]
    fn test_ties_in_first_seen_order() {
        let records = vec![
            record("P", "a", ""),
            record("Q", "a", ""),
            record("Q", "b", ""),
            record("R", "a", ""),
            record("R", "b", ""),
        ];
        let report = TopModelAnalysis::new(3, &AnalysisConfig::default())
            .run(&records)
            .unwrap();
        let order: Vec<&str> = report.ranking.iter().map(|m| m.model_name.as_str()).collect();
        assert_eq!(order, vec!["Q", "R", "P"]);
    }
}
