//! Cohort Classifier
//!
//! Partitions resolved records by audit reason. Definitions are expected to be
//! disjoint; that is a configuration invariant and is not checked here. A
//! record matching no definition belongs to no cohort.

use crate::record::{GroupKey, ResolvedRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Extra filter applied to one cohort before per-model aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortFilter {
    #[default]
    None,
    /// Drop records whose issue description is blank
    NonEmptyDescription,
}

impl CohortFilter {
    pub fn admits(&self, record: &ResolvedRecord) -> bool {
        match self {
            CohortFilter::None => true,
            CohortFilter::NonEmptyDescription => {
                !record.record().issue_description.trim().is_empty()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortDef {
    pub name: String,
    pub reasons: BTreeSet<String>,
    #[serde(default)]
    pub filter: CohortFilter,
}

impl CohortDef {
    pub fn new<I, S>(name: impl Into<String>, reasons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            reasons: reasons.into_iter().map(|r| r.into().trim().to_string()).collect(),
            filter: CohortFilter::None,
        }
    }

    pub fn with_filter(mut self, filter: CohortFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn matches(&self, record: &ResolvedRecord) -> bool {
        self.reasons.contains(record.field(GroupKey::AuditReason))
    }
}

/// One cohort's members, borrowed from the resolved population.
#[derive(Debug, Clone)]
pub struct Cohort<'a> {
    pub name: String,
    pub filter: CohortFilter,
    pub members: Vec<&'a ResolvedRecord>,
}

impl<'a> Cohort<'a> {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a ResolvedRecord> + '_ {
        self.members.iter().copied()
    }

    /// Members passing this cohort's secondary filter.
    pub fn filtered(&self) -> Vec<&'a ResolvedRecord> {
        self.members
            .iter()
            .copied()
            .filter(|r| self.filter.admits(r))
            .collect()
    }
}

/// Cohorts in definition order.
#[derive(Debug, Clone)]
pub struct CohortPartition<'a> {
    pub cohorts: Vec<Cohort<'a>>,

    /// Records that matched no definition
    pub unassigned: usize,
}

impl<'a> CohortPartition<'a> {
    pub fn get(&self, name: &str) -> Option<&Cohort<'a>> {
        self.cohorts.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cohorts.iter().map(|c| c.name.as_str())
    }
}

/// Assign each record to the first definition whose reason set contains its
/// audit reason.
pub fn classify<'a, I>(records: I, defs: &[CohortDef]) -> CohortPartition<'a>
where
    I: IntoIterator<Item = &'a ResolvedRecord>,
{
    let mut cohorts: Vec<Cohort<'a>> = defs
        .iter()
        .map(|def| Cohort {
            name: def.name.clone(),
            filter: def.filter,
            members: Vec::new(),
        })
        .collect();
    let mut unassigned = 0usize;

    for record in records {
        match defs.iter().position(|def| def.matches(record)) {
            Some(idx) => cohorts[idx].members.push(record),
            None => unassigned += 1,
        }
    }

    CohortPartition { cohorts, unassigned }
}
