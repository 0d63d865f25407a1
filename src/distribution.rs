//! Distribution Aggregator
//!
//! Ranked (label, count, percentage) tables. Rules downstream reports rely on:
//! - labels are grouped by exact string match after trimming
//! - rows sort by count descending; ties keep first-encountered order
//! - each percentage is rounded on its own, and the cumulative column is the
//!   running sum of those rounded values, so it may land a few tenths off 100
//! - an empty population yields an empty distribution, not an error

use crate::record::{GroupKey, ResolvedRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rounding applied to percentages. Chart labels use one decimal, textual
/// reports two; the caller decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    OneDecimal,
    TwoDecimals,
}

impl Precision {
    pub fn decimals(&self) -> u32 {
        match self {
            Precision::OneDecimal => 1,
            Precision::TwoDecimals => 2,
        }
    }

    /// Round half-to-even on the scaled value, matching the spreadsheet
    /// tooling the numbers are compared against.
    pub fn round(&self, value: f64) -> f64 {
        let factor = 10_f64.powi(self.decimals() as i32);
        (value * factor).round_ties_even() / factor
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRow {
    /// 1-based position after ranking
    pub rank: usize,
    pub label: String,
    pub count: usize,
    pub percentage: f64,
    pub cumulative_percentage: Option<f64>,
}

/// Derived, read-only aggregate. Regenerated on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    /// Name of the grouped field, used as the label column header
    pub label_column: String,

    /// Denominator for every percentage in the table
    pub population: usize,

    pub precision: Precision,
    pub rows: Vec<DistributionRow>,
}

impl Distribution {
    pub fn empty(label_column: impl Into<String>, precision: Precision) -> Self {
        Self {
            label_column: label_column.into(),
            population: 0,
            precision,
            rows: Vec::new(),
        }
    }

    /// Group records by `key` and rank the groups.
    pub fn aggregate<'a, I>(records: I, key: GroupKey, precision: Precision) -> Self
    where
        I: IntoIterator<Item = &'a ResolvedRecord>,
    {
        Self::from_labels(
            key.column_name(),
            records.into_iter().map(|r| r.field(key)),
            precision,
        )
    }

    /// Like [`aggregate`](Self::aggregate), but blank values get no row.
    /// They still count towards the population, so every share stays
    /// relative to all of `records`.
    pub fn aggregate_non_blank<'a, I>(records: I, key: GroupKey, precision: Precision) -> Self
    where
        I: IntoIterator<Item = &'a ResolvedRecord>,
    {
        let mut population = 0usize;
        let labels: Vec<&str> = records
            .into_iter()
            .inspect(|_| population += 1)
            .map(|r| r.field(key))
            .filter(|label| !label.is_empty())
            .collect();

        let (groups, _) = count_labels(labels);
        Self::from_counts(key.column_name(), groups, population, precision)
    }

    /// Rank an arbitrary label sequence; one label per population member.
    pub fn from_labels<I, S>(label_column: &str, labels: I, precision: Precision) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (groups, population) = count_labels(labels);
        Self::from_counts(label_column, groups, population, precision)
    }

    /// Fixed-label table in caller order, keeping zero-count labels. The
    /// denominator is the number of records matching one of `labels`.
    pub fn tally_fixed<'a, I>(
        records: I,
        key: GroupKey,
        labels: &[String],
        precision: Precision,
    ) -> Self
    where
        I: IntoIterator<Item = &'a ResolvedRecord>,
    {
        let mut counts = vec![0usize; labels.len()];
        for record in records {
            let value = record.field(key);
            if let Some(pos) = labels.iter().position(|l| l.trim() == value) {
                counts[pos] += 1;
            }
        }
        let population = counts.iter().sum();
        let groups = labels.iter().map(|l| l.trim().to_string()).zip(counts).collect();

        Self::from_counts(key.column_name(), groups, population, precision)
    }

    fn from_counts(
        label_column: &str,
        groups: Vec<(String, usize)>,
        population: usize,
        precision: Precision,
    ) -> Self {
        let rows = groups
            .into_iter()
            .enumerate()
            .map(|(idx, (label, count))| DistributionRow {
                rank: idx + 1,
                label,
                count,
                percentage: percentage(count, population, precision),
                cumulative_percentage: None,
            })
            .collect();

        Self {
            label_column: label_column.to_string(),
            population,
            precision,
            rows,
        }
    }

    /// Fill the cumulative column: running sum of the rounded percentages.
    pub fn with_cumulative(mut self) -> Self {
        let mut running = 0.0;
        for row in &mut self.rows {
            running += row.percentage;
            row.cumulative_percentage = Some(self.precision.round(running));
        }
        self
    }

    /// Keep the first `k` rows. Percentages keep the full-population denominator.
    pub fn top(mut self, k: usize) -> Self {
        self.rows.truncate(k);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn total_count(&self) -> usize {
        self.rows.iter().map(|r| r.count).sum()
    }

    pub fn get(&self, label: &str) -> Option<&DistributionRow> {
        self.rows.iter().find(|r| r.label == label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.label.as_str())
    }
}

/// Trimmed labels with their counts, ranked, plus the number of labels seen.
fn count_labels<I, S>(labels: I) -> (Vec<(String, usize)>, usize)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, usize)> = Vec::new();
    let mut seen = 0usize;

    for label in labels {
        let label = label.as_ref().trim();
        seen += 1;
        match index.get(label) {
            Some(&i) => groups[i].1 += 1,
            None => {
                index.insert(label.to_string(), groups.len());
                groups.push((label.to_string(), 1));
            }
        }
    }

    // Stable: equal counts stay in first-encountered order
    groups.sort_by(|a, b| b.1.cmp(&a.1));
    (groups, seen)
}

/// `count / population * 100`, rounded. Zero population gives zero.
pub fn percentage(count: usize, population: usize, precision: Precision) -> f64 {
    if population == 0 {
        return 0.0;
    }
    precision.round(count as f64 / population as f64 * 100.0)
}

/// Distribution of one field inside one value of another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedDistribution {
    pub label: String,

    /// Size of this sub-population; the denominator of `distribution`
    pub population: usize,

    pub distribution: Distribution,
}

/// Secondary aggregation: for each distinct `outer` value (first-encountered
/// order), the distribution of `inner` within that value's records.
pub fn aggregate_nested<'a, I>(
    records: I,
    outer: GroupKey,
    inner: GroupKey,
    precision: Precision,
) -> Vec<NestedDistribution>
where
    I: IntoIterator<Item = &'a ResolvedRecord>,
{
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut buckets: Vec<(&'a str, Vec<&'a ResolvedRecord>)> = Vec::new();

    for record in records {
        let label = record.field(outer);
        match index.get(label) {
            Some(&i) => buckets[i].1.push(record),
            None => {
                index.insert(label, buckets.len());
                buckets.push((label, vec![record]));
            }
        }
    }

    buckets
        .into_iter()
        .map(|(label, members)| NestedDistribution {
            label: label.to_string(),
            population: members.len(),
            distribution: Distribution::aggregate(members, inner, precision),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ServiceRecord;

    fn resolved(model: &str, category: &str) -> ResolvedRecord {
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
    fn test_ranked_with_cumulative() {
        let labels = ["R1", "R2", "R1", "R3", "R1", "R2", "R4", "R3", "R2", "R1"];
        let dist = Distribution::from_labels("audit_reason", labels, Precision::TwoDecimals)
            .with_cumulative();

        let rows: Vec<(&str, usize, f64, Option<f64>)> = dist
            .rows
            .iter()
            .map(|r| (r.label.as_str(), r.count, r.percentage, r.cumulative_percentage))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("R1", 4, 40.0, Some(40.0)),
                ("R2", 3, 30.0, Some(70.0)),
                ("R3", 2, 20.0, Some(90.0)),
                ("R4", 1, 10.0, Some(100.0)),
            ]
        );
        assert_eq!(dist.total_count(), dist.population);
    }

    #[test]
    fn test_ties_keep_first_encountered_order() {
        let dist =
            Distribution::from_labels("x", ["b", "a", "c", "a", "b"], Precision::OneDecimal);
        let order: Vec<&str> = dist.labels().collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert_eq!(dist.rows[2].rank, 3);
    }

    #[test]
    fn test_labels_trimmed_not_case_folded() {
        let dist =
            Distribution::from_labels("x", ["Hinge", " Hinge ", "hinge"], Precision::OneDecimal);
        assert_eq!(dist.len(), 2);
        assert_eq!(dist.get("Hinge").map(|r| r.count), Some(2));
    }

    #[test]
    fn test_rounding_precision_is_caller_selected() {
        let labels = ["a", "b", "b"];
        let one = Distribution::from_labels("x", labels, Precision::OneDecimal);
        let two = Distribution::from_labels("x", labels, Precision::TwoDecimals);
        assert_eq!(one.get("a").map(|r| r.percentage), Some(33.3));
        assert_eq!(two.get("a").map(|r| r.percentage), Some(33.33));
        assert_eq!(two.get("b").map(|r| r.percentage), Some(66.67));
    }

    #[test]
    fn test_cumulative_keeps_rounding_drift() {
        // Three equal thirds round to 33.3 each; the running total stops at 99.9
        let dist = Distribution::from_labels("x", ["a", "b", "c"], Precision::OneDecimal)
            .with_cumulative();
        assert_eq!(dist.rows[2].cumulative_percentage, Some(99.9));
    }

    #[test]
    fn test_empty_population() {
        let dist = Distribution::from_labels("x", Vec::<String>::new(), Precision::OneDecimal)
            .with_cumulative();
        assert!(dist.is_empty());
        assert_eq!(dist.population, 0);
    }

    #[test]
    fn test_top_keeps_full_denominator() {
        let dist = Distribution::from_labels("x", ["a", "a", "b", "c"], Precision::TwoDecimals)
            .with_cumulative()
            .top(2);
        assert_eq!(dist.len(), 2);
        assert_eq!(dist.population, 4);
        assert_eq!(dist.rows[1].percentage, 25.0);
        assert_eq!(dist.rows[1].cumulative_percentage, Some(75.0));
    }

    #[test]
    fn test_tally_fixed_keeps_zero_rows_in_order() {
        let records = vec![resolved("M", "x"), resolved("M", "y"), resolved("M", "x")];
        let labels = vec!["z".to_string(), "x".to_string(), "y".to_string()];
        let dist = Distribution::tally_fixed(
            &records,
            GroupKey::Category,
            &labels,
            Precision::TwoDecimals,
        );
        let rows: Vec<(&str, usize)> =
            dist.rows.iter().map(|r| (r.label.as_str(), r.count)).collect();
        assert_eq!(rows, vec![("z", 0), ("x", 2), ("y", 1)]);
        assert_eq!(dist.get("x").map(|r| r.percentage), Some(66.67));
    }

    #[test]
    fn test_nested_uses_sub_population_denominator() {
        let records = vec![
            resolved("A", "hinge"),
            resolved("B", "screen"),
            resolved("A", "screen"),
            resolved("A", "hinge"),
        ];
        let nested = aggregate_nested(
            &records,
            GroupKey::ModelName,
            GroupKey::Category,
            Precision::OneDecimal,
        );

        assert_eq!(nested.len(), 2);
        assert_eq!(nested[0].label, "A");
        assert_eq!(nested[0].population, 3);
        assert_eq!(
            nested[0].distribution.get("hinge").map(|r| r.percentage),
            Some(66.7)
        );
        assert_eq!(nested[1].label, "B");
        assert_eq!(
            nested[1].distribution.get("screen").map(|r| r.percentage),
            Some(100.0)
        );
    }

    #[test]
    fn test_non_blank_skips_rows_but_keeps_denominator() {
        let records = vec![
            resolved("A", ""),
            resolved("A", "hinge"),
            resolved("B", "  "),
            resolved("B", "screen"),
        ];
        let dist =
            Distribution::aggregate_non_blank(&records, GroupKey::Category, Precision::TwoDecimals);

        assert_eq!(dist.labels().collect::<Vec<_>>(), vec!["hinge", "screen"]);
        assert_eq!(dist.population, 4);
        assert_eq!(dist.get("hinge").map(|r| r.percentage), Some(25.0));
        assert_eq!(dist.total_count(), 2);
    }
}
