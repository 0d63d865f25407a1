//! Identifier Resolver
//!
//! Maps raw product identifiers (MTM codes) to canonical model names using a
//! two-column table. A missing or malformed table is not an error: every
//! record then keeps its raw identifier as its canonical name and coverage is
//! reported as 0%.

use crate::error::{QcrError, Result};
use crate::record::{ResolvedRecord, ServiceRecord};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Raw identifier -> canonical name. Built once per run; only [`reload`]
/// mutates it.
///
/// [`reload`]: IdentifierMap::reload
#[derive(Debug, Clone, Default)]
pub struct IdentifierMap {
    entries: HashMap<String, String>,
    source: Option<PathBuf>,
    header_labels: Vec<String>,
}

impl IdentifierMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from in-memory pairs; a repeated key keeps the last value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries = HashMap::new();
        for (raw, name) in pairs {
            let raw = raw.into().trim().to_string();
            let name = name.into().trim().to_string();
            if !raw.is_empty() && !name.is_empty() {
                entries.insert(raw, name);
            }
        }
        Self {
            entries,
            source: None,
            header_labels: Vec::new(),
        }
    }

    /// Load the table, degrading to an empty map on any failure.
    pub fn load(path: impl AsRef<Path>, header_labels: &[String]) -> Self {
        let path = path.as_ref();
        match Self::try_load(path, header_labels) {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    "Identifier map '{}' unavailable ({}); \
                     canonical names fall back to raw identifiers",
                    path.display(),
                    e
                );
                Self {
                    entries: HashMap::new(),
                    source: Some(path.to_path_buf()),
                    header_labels: header_labels.to_vec(),
                }
            }
        }
    }

    /// Load the table, surfacing the underlying error.
    pub fn try_load(path: impl AsRef<Path>, header_labels: &[String]) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let entries = Self::parse_table(&text, header_labels)?;
        info!(
            "Loaded {} identifier mappings from '{}'",
            entries.len(),
            path.display()
        );
        Ok(Self {
            entries,
            source: Some(path.to_path_buf()),
            header_labels: header_labels.to_vec(),
        })
    }

    /// Re-read the source table. Returns the new entry count.
    pub fn reload(&mut self) -> usize {
        if let Some(path) = self.source.clone() {
            *self = Self::load(&path, &self.header_labels);
        }
        self.entries.len()
    }

    pub fn get(&self, raw: &str) -> Option<&str> {
        self.entries.get(raw.trim()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn parse_table(text: &str, header_labels: &[String]) -> Result<HashMap<String, String>> {
        let text = text.trim_start_matches('\u{feff}');
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut entries = HashMap::new();
        let mut data_rows = 0usize;
        let mut narrow_rows = 0usize;

        for row in rdr.records() {
            let row = row?;
            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            data_rows += 1;

            let (Some(raw), Some(name)) = (row.get(0), row.get(1)) else {
                narrow_rows += 1;
                continue;
            };
            let raw = raw.trim();
            let name = name.trim();

            // A first cell equal to a header label is always a header row,
            // even if a real identifier happens to share the text
            if header_labels.iter().any(|label| label == raw) {
                continue;
            }
            if raw.is_empty() || name.is_empty() {
                continue;
            }
            entries.insert(raw.to_string(), name.to_string());
        }

        if data_rows > 0 && narrow_rows == data_rows {
            return Err(QcrError::Config(
                "identifier map needs two columns (raw identifier, canonical name)".to_string(),
            ));
        }

        Ok(entries)
    }
}

/// Per-canonical-name coverage line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCoverage {
    pub model_name: String,
    pub records: usize,
    pub mapped: bool,
}

/// Resolution coverage: how many records got a name different from their raw
/// identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub total: usize,
    pub mapped: usize,
    pub unmapped: usize,
    pub map_entries: usize,

    /// Canonical names ordered by record count (ties in first-seen order)
    pub models: Vec<ModelCoverage>,
}

impl ResolutionReport {
    pub fn mapped_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.mapped as f64 / self.total as f64
        }
    }

    pub fn mapped_percent(&self) -> f64 {
        self.mapped_fraction() * 100.0
    }
}

pub struct IdentifierResolver {
    map: IdentifierMap,
}

impl IdentifierResolver {
    pub fn new(map: IdentifierMap) -> Self {
        Self { map }
    }

    pub fn map(&self) -> &IdentifierMap {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut IdentifierMap {
        &mut self.map
    }

    /// Annotate every record with its canonical name. No record is dropped.
    pub fn resolve(&self, records: Vec<ServiceRecord>) -> (Vec<ResolvedRecord>, ResolutionReport) {
        let resolved: Vec<ResolvedRecord> = records
            .into_iter()
            .map(|record| {
                let name = self
                    .map
                    .get(&record.mtm)
                    .map(str::to_string)
                    .unwrap_or_else(|| record.mtm.clone());
                ResolvedRecord::new(record, name)
            })
            .collect();

        let report = self.coverage(&resolved);
        info!(
            "MTM mapping: {}/{} records mapped ({:.1}%), {} unmapped",
            report.mapped,
            report.total,
            report.mapped_percent(),
            report.unmapped
        );
        if report.unmapped > 0 {
            info!("Unmapped records keep their raw MTM as model name");
        }

        (resolved, report)
    }

    fn coverage(&self, resolved: &[ResolvedRecord]) -> ResolutionReport {
        let mapped = resolved.iter().filter(|r| r.is_mapped()).count();

        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut models: Vec<ModelCoverage> = Vec::new();
        for record in resolved {
            match index.get(record.model_name()) {
                Some(&i) => models[i].records += 1,
                None => {
                    index.insert(record.model_name(), models.len());
                    models.push(ModelCoverage {
                        model_name: record.model_name().to_string(),
                        records: 1,
                        mapped: record.is_mapped(),
                    });
                }
            }
        }
        models.sort_by(|a, b| b.records.cmp(&a.records));

        ResolutionReport {
            total: resolved.len(),
            mapped,
            unmapped: resolved.len() - mapped,
            map_entries: self.map.len(),
            models,
        }
    }
}

/// Keep only records whose identifier was mapped (`--filter-unmapped`).
pub fn retain_mapped(records: Vec<ResolvedRecord>) -> Vec<ResolvedRecord> {
    let before = records.len();
    let kept: Vec<ResolvedRecord> = records.into_iter().filter(|r| r.is_mapped()).collect();
    info!(
        "Filtered {} unmapped records, {} remain",
        before - kept.len(),
        kept.len()
    );
    kept
}
