//! Plain-text reports, one per orchestrator run

use crate::analysis::{TopIssueReport, TopModelReport, WeeklyReport};
use crate::distribution::Distribution;
use chrono::NaiveDateTime;
use itertools::Itertools;
use std::fmt::Write;

const RULE_WIDTH: usize = 60;
const MODEL_LIST_LIMIT: usize = 10;
const COHORT_TOP: usize = 5;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

fn bound(date: Option<chrono::NaiveDate>, open: &str) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| open.to_string())
}

fn ranked_lines(out: &mut String, distribution: &Distribution, limit: usize) {
    let decimals = distribution.precision.decimals() as usize;
    for row in distribution.rows.iter().take(limit) {
        let _ = writeln!(
            out,
            "  {}: {} records ({:.*}%)",
            row.label, row.count, decimals, row.percentage
        );
    }
}

pub fn render_weekly(report: &WeeklyReport, generated_at: NaiveDateTime) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "QCR weekly report");
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(
        out,
        "Window: {} to {}",
        bound(report.window.start, "earliest"),
        bound(report.window.end, "latest")
    );
    let _ = writeln!(out, "Coverage: {}", report.coverage.label());
    let _ = writeln!(out, "Work week: {}", report.work_week.label());
    let _ = writeln!(out, "Records: {}", report.total_records);
    let _ = writeln!(out);

    let models: Vec<&str> = report
        .cohorts
        .iter()
        .flat_map(|c| c.by_model.labels())
        .unique()
        .collect();
    let _ = writeln!(out, "Models in cohorts: {}", models.len());
    let _ = writeln!(
        out,
        "Model list: {}",
        models.iter().take(MODEL_LIST_LIMIT).join(", ")
    );
    if models.len() > MODEL_LIST_LIMIT {
        let _ = writeln!(out, "            ... {} models in total", models.len());
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Audit reasons:");
    ranked_lines(&mut out, &report.reasons, report.reasons.len());
    let _ = writeln!(out);

    for cohort in &report.cohorts {
        if cohort.population == 0 {
            continue;
        }
        let _ = writeln!(out, "Top {} models, {}:", COHORT_TOP, cohort.name);
        ranked_lines(&mut out, &cohort.by_model, COHORT_TOP);
        let _ = writeln!(out);
    }

    if report.unassigned > 0 {
        let _ = writeln!(out, "Records outside both cohorts: {}", report.unassigned);
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "End of report");
    let _ = write!(out, "{}", rule());
    out
}

pub fn render_top_issue(report: &TopIssueReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "Top issue report");
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "Records: {}", report.total_records);
    let _ = writeln!(
        out,
        "Top N: {} of {} categories",
        report.issues.len(),
        report.total_categories
    );
    let _ = writeln!(out);

    for issue in &report.breakdowns {
        let _ = writeln!(
            out,
            "{}. {}: {} records ({:.2}%, cumulative {:.2}%)",
            issue.rank, issue.category, issue.count, issue.percentage, issue.cumulative_percentage
        );
        for row in issue.models.rows.iter().take(COHORT_TOP) {
            let _ = writeln!(out, "     {}: {} ({:.2}%)", row.label, row.count, row.percentage);
        }
    }
    out
}

pub fn render_top_model(report: &TopModelReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "Top {} model report", report.k);
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "Models: {}", report.ranking.len());
    let _ = writeln!(out);

    for profile in &report.profiles {
        let summary = &profile.summary;
        let _ = writeln!(
            out,
            "{}. {}: {} categories, {} records, {:.1} per category",
            summary.rank,
            summary.model_name,
            summary.distinct_categories,
            summary.record_count,
            summary.avg_per_category
        );
        if !profile.cohorts.is_empty() {
            let shares = profile
                .cohorts
                .iter()
                .map(|c| format!("{} {} ({:.1}%)", c.cohort, c.count, c.percentage))
                .join(", ");
            let _ = writeln!(out, "     {}", shares);
        }
    }
    out
}
