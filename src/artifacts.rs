//! Reporting artifacts
//!
//! Tabular exports go through polars, payloads through serde_json, charts
//! through a [`ChartRenderer`]. A failed artifact is logged and recorded as
//! skipped; the remaining artifacts are still written.

use crate::config::ChartStyle;
use crate::distribution::{Distribution, NestedDistribution};
use crate::error::{QcrError, Result};
use crate::record::ResolvedRecord;
use lazy_static::lazy_static;
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

lazy_static! {
    static ref UNSAFE_FILENAME_CHARS: Regex = Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap();
}

const MAX_FILENAME_CHARS: usize = 50;

/// Make a label usable as a file name: path-hostile characters become `_`,
/// the result is capped in length.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(name.trim(), "_");
    let capped: String = cleaned.chars().take(MAX_FILENAME_CHARS).collect();
    let capped = capped.trim().to_string();
    if capped.is_empty() {
        "unnamed".to_string()
    } else {
        capped
    }
}

/// Table for one distribution: rank, label, count, percentage and, when
/// filled, the cumulative column.
pub fn distribution_frame(distribution: &Distribution) -> Result<DataFrame> {
    let ranks: Vec<u32> = distribution.rows.iter().map(|r| r.rank as u32).collect();
    let labels: Vec<&str> = distribution.rows.iter().map(|r| r.label.as_str()).collect();
    let counts: Vec<u64> = distribution.rows.iter().map(|r| r.count as u64).collect();
    let shares: Vec<f64> = distribution.rows.iter().map(|r| r.percentage).collect();

    let mut df = df!(
        "rank" => ranks,
        distribution.label_column.as_str() => labels,
        "count" => counts,
        "percentage" => shares
    )?;

    if distribution.rows.iter().any(|r| r.cumulative_percentage.is_some()) {
        let cumulative: Vec<Option<f64>> = distribution
            .rows
            .iter()
            .map(|r| r.cumulative_percentage)
            .collect();
        df.with_column(Series::new("cumulative_percentage", cumulative))?;
    }

    Ok(df)
}

/// Nested distributions flattened into one long table.
pub fn nested_frame(outer_column: &str, nested: &[NestedDistribution]) -> Result<DataFrame> {
    let mut outer: Vec<&str> = Vec::new();
    let mut populations: Vec<u64> = Vec::new();
    let mut labels: Vec<&str> = Vec::new();
    let mut counts: Vec<u64> = Vec::new();
    let mut shares: Vec<f64> = Vec::new();

    for group in nested {
        for row in &group.distribution.rows {
            outer.push(group.label.as_str());
            populations.push(group.population as u64);
            labels.push(row.label.as_str());
            counts.push(row.count as u64);
            shares.push(row.percentage);
        }
    }

    let inner_column = nested
        .first()
        .map(|n| n.distribution.label_column.clone())
        .unwrap_or_else(|| "label".to_string());

    let df = df!(
        outer_column => outer,
        "population" => populations,
        inner_column.as_str() => labels,
        "count" => counts,
        "percentage" => shares
    )?;
    Ok(df)
}

/// Raw records, one row each, for manual review next to a category table.
pub fn records_frame(records: &[&ResolvedRecord]) -> Result<DataFrame> {
    let dates: Vec<Option<String>> = records
        .iter()
        .map(|r| r.date().map(|d| d.format("%Y-%m-%d").to_string()))
        .collect();

    let df = df!(
        "date" => dates,
        "service_order_id" => text_column(records, |r| r.record().service_order_id.as_str()),
        "mtm" => text_column(records, |r| r.record().mtm.as_str()),
        "model_name" => text_column(records, |r| r.model_name()),
        "audit_reason" => text_column(records, |r| r.record().audit_reason.as_str()),
        "category" => text_column(records, |r| r.record().category.as_str()),
        "issue_description" => text_column(records, |r| r.record().issue_description.as_str())
    )?;
    Ok(df)
}

fn text_column<'r, F>(records: &[&'r ResolvedRecord], get: F) -> Vec<&'r str>
where
    F: Fn(&'r ResolvedRecord) -> &'r str,
{
    records.iter().map(|r| get(*r)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Pie,
    Bar,
}

/// What the external chart generator needs besides the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: String,
    pub kind: ChartKind,
    pub width: u32,
    pub height: u32,
}

impl ChartSpec {
    pub fn pie(title: impl Into<String>, style: &ChartStyle) -> Self {
        Self::sized(title, ChartKind::Pie, style.pie_size)
    }

    pub fn bar(title: impl Into<String>, style: &ChartStyle) -> Self {
        Self::sized(title, ChartKind::Bar, style.bar_size)
    }

    pub fn reasons(title: impl Into<String>, style: &ChartStyle) -> Self {
        Self::sized(title, ChartKind::Pie, style.reason_size)
    }

    fn sized(title: impl Into<String>, kind: ChartKind, (width, height): (u32, u32)) -> Self {
        Self {
            title: title.into(),
            kind,
            width,
            height,
        }
    }
}

/// Interface to the chart generator. `path` has no extension; the renderer
/// picks one and returns the file it wrote.
pub trait ChartRenderer {
    fn render(&self, spec: &ChartSpec, distribution: &Distribution, path: &Path) -> Result<PathBuf>;
}

/// Writes a JSON chart request (spec plus rows) for a downstream plotting
/// tool to pick up.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChartRequestRenderer;

#[derive(Serialize)]
struct ChartRequest<'a> {
    spec: &'a ChartSpec,
    distribution: &'a Distribution,
}

impl ChartRenderer for ChartRequestRenderer {
    fn render(
        &self,
        spec: &ChartSpec,
        distribution: &Distribution,
        path: &Path,
    ) -> Result<PathBuf> {
        let mut name = path.as_os_str().to_owned();
        name.push(".chart.json");
        let path = PathBuf::from(name);
        let file = File::create(&path)?;
        serde_json::to_writer_pretty(file, &ChartRequest { spec, distribution })?;
        Ok(path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedArtifact {
    pub name: String,
    pub reason: String,
}

/// What an orchestrator run left on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<SkippedArtifact>,
}

pub struct ArtifactWriter {
    root: PathBuf,
    manifest: ArtifactManifest,
}

impl ArtifactWriter {
    /// Artifacts land under `root`, which is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest: ArtifactManifest::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write_distribution(
        &mut self,
        name: &str,
        distribution: &Distribution,
    ) -> Option<PathBuf> {
        self.attempt(name, "csv", |path| {
            let mut df = distribution_frame(distribution)?;
            write_csv(&mut df, path)?;
            Ok(path.to_path_buf())
        })
    }

    pub fn write_nested(
        &mut self,
        name: &str,
        outer_column: &str,
        nested: &[NestedDistribution],
    ) -> Option<PathBuf> {
        self.attempt(name, "csv", |path| {
            let mut df = nested_frame(outer_column, nested)?;
            write_csv(&mut df, path)?;
            Ok(path.to_path_buf())
        })
    }

    pub fn write_records(&mut self, name: &str, records: &[&ResolvedRecord]) -> Option<PathBuf> {
        self.attempt(name, "csv", |path| {
            let mut df = records_frame(records)?;
            write_csv(&mut df, path)?;
            Ok(path.to_path_buf())
        })
    }

    pub fn write_json<T: Serialize>(&mut self, name: &str, payload: &T) -> Option<PathBuf> {
        self.attempt(name, "json", |path| {
            let file = File::create(path)?;
            serde_json::to_writer_pretty(file, payload)?;
            Ok(path.to_path_buf())
        })
    }

    pub fn write_text(&mut self, name: &str, text: &str) -> Option<PathBuf> {
        self.attempt(name, "txt", |path| {
            std::fs::write(path, text)?;
            Ok(path.to_path_buf())
        })
    }

    pub fn render_chart(
        &mut self,
        renderer: &dyn ChartRenderer,
        spec: &ChartSpec,
        distribution: &Distribution,
    ) -> Option<PathBuf> {
        if distribution.is_empty() {
            self.skip(&spec.title, "no data to plot".to_string());
            return None;
        }
        let name = spec.title.clone();
        self.attempt(&name, "", |path| renderer.render(spec, distribution, path))
    }

    pub fn finish(self) -> ArtifactManifest {
        info!(
            "Artifacts under {}: {} written, {} skipped",
            self.root.display(),
            self.manifest.written.len(),
            self.manifest.skipped.len()
        );
        self.manifest
    }

    fn attempt<F>(&mut self, name: &str, extension: &str, write: F) -> Option<PathBuf>
    where
        F: FnOnce(&Path) -> Result<PathBuf>,
    {
        let file_name = match extension {
            "" => sanitize_filename(name),
            ext => format!("{}.{}", sanitize_filename(name), ext),
        };
        let path = self.root.join(file_name);

        let result = std::fs::create_dir_all(&self.root)
            .map_err(QcrError::from)
            .and_then(|_| write(&path));

        match result {
            Ok(written) => {
                self.manifest.written.push(written.clone());
                Some(written)
            }
            Err(e) => {
                self.skip(name, e.to_string());
                None
            }
        }
    }

    fn skip(&mut self, name: &str, reason: String) {
        warn!("Skipping artifact '{}': {}", name, reason);
        self.manifest.skipped.push(SkippedArtifact {
            name: name.to_string(),
            reason,
        });
    }
}

fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)
        .map_err(|e| QcrError::Artifact(format!("{}: {}", path.display(), e)))?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}
