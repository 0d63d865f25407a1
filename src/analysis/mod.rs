//! Analysis Orchestrators
//!
//! Three read-only views over resolved records. Each run is a pure function of
//! (records, configuration) to a serializable payload; persistence happens
//! before, in the ingestion gateway, and artifacts after, in the writer.

pub mod top_issue;
pub mod top_model;
pub mod weekly;

pub use top_issue::{IssueBreakdown, TopIssueAnalysis, TopIssueReport};
pub use top_model::{ModelProfile, TopModelAnalysis, TopModelReport};
pub use weekly::{CohortReport, WeeklyAnalysis, WeeklyReport};

use crate::error::Result;
use crate::record::ResolvedRecord;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// An orchestrator: records in, payload out.
pub trait Analysis {
    type Payload: Serialize;

    /// Short name used for artifact folders and logs
    fn name(&self) -> &'static str;

    fn run(&self, records: &[ResolvedRecord]) -> Result<Self::Payload>;
}

/// Inclusive date filter. A missing bound leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Undated records pass only when the window has no bound at all.
    pub fn contains(&self, date: Option<NaiveDate>) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let Some(date) = date else {
            return false;
        };
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }

    pub fn apply<'a>(&self, records: &'a [ResolvedRecord]) -> Vec<&'a ResolvedRecord> {
        records.iter().filter(|r| self.contains(r.date())).collect()
    }
}

/// Date range a report covers: the requested bounds, with open sides filled
/// from the earliest/latest record date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoveragePeriod {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl CoveragePeriod {
    pub fn of<'a, I>(records: I, window: &DateWindow) -> Self
    where
        I: IntoIterator<Item = &'a ResolvedRecord>,
    {
        let dates: Vec<NaiveDate> = records.into_iter().filter_map(|r| r.date()).collect();
        if dates.is_empty() {
            return Self {
                start: None,
                end: None,
            };
        }
        Self {
            start: window.start.or_else(|| dates.iter().min().copied()),
            end: window.end.or_else(|| dates.iter().max().copied()),
        }
    }

    /// `YYYY/MM/DD - YYYY/MM/DD`, or `-` for an unknown side.
    pub fn label(&self) -> String {
        format!("{} - {}", format_day(self.start), format_day(self.end))
    }
}

/// Monday..Friday of the week containing `today`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkWeek {
    pub monday: NaiveDate,
    pub friday: NaiveDate,
}

impl WorkWeek {
    pub fn containing(today: NaiveDate) -> Self {
        let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        Self {
            monday,
            friday: monday + Duration::days(4),
        }
    }

    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.monday.format("%Y/%m/%d"),
            self.friday.format("%Y/%m/%d")
        )
    }
}

fn format_day(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y/%m/%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}
