use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::record::AnalysisResult;
use crate::util::text::ellipsize;
use crate::util::time::export_stamp;

pub const EXPORT_PREFIX: &str = "brand_intelligence";
pub const OVERVIEW_SUMMARY_CHARS: usize = 200;

const CSV_HEADER: [&str; 12] = [
    "title",
    "link",
    "source",
    "sentiment",
    "confidence",
    "archetype",
    "sentiment_reasoning",
    "archetype_reasoning",
    "category",
    "insight",
    "recommendation",
    "summary",
];

/// A directory (existing, or spelled with a trailing separator) gets a
/// timestamped file name; anything else is used as given.
pub fn resolve_export_path(arg: &Path, ext: &str, now: DateTime<Utc>) -> PathBuf {
    let as_dir = arg.is_dir() || arg.as_os_str().to_string_lossy().ends_with(std::path::MAIN_SEPARATOR);
    if as_dir {
        arg.join(format!("{EXPORT_PREFIX}_{}.{ext}", export_stamp(now)))
    } else {
        arg.to_path_buf()
    }
}

/// Pretty JSON array of the records exactly as the backend returned them.
pub fn write_json(path: &Path, raw: &[Value]) -> Result<()> {
    let mut body = serde_json::to_vec_pretty(raw).context("serialize export")?;
    body.push(b'\n');
    write_atomic(path, &body)
}

pub fn write_csv(path: &Path, results: &[AnalysisResult]) -> Result<()> {
    write_atomic(path, to_csv(results).as_bytes())
}

/// Canonical fields, one row per record, RFC 4180 quoting, CRLF line ends.
pub fn to_csv(results: &[AnalysisResult]) -> String {
    let mut out = String::new();
    push_row(&mut out, CSV_HEADER.iter().map(|h| h.to_string()));
    for r in results {
        push_row(&mut out, [
            r.title.clone(),
            r.link.clone(),
            r.source.clone(),
            r.sentiment.to_string(),
            format!("{:.2}", r.confidence),
            r.archetype.clone(),
            r.sentiment_reasoning.clone(),
            r.archetype_reasoning.clone(),
            r.category.clone(),
            r.insight.clone(),
            r.recommendation.clone(),
            r.summary.clone(),
        ]);
    }
    out
}

fn push_row(out: &mut String, fields: impl IntoIterator<Item = String>) {
    let row: Vec<String> = fields.into_iter().map(|f| csv_field(&f)).collect();
    out.push_str(&row.join(","));
    out.push_str("\r\n");
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

// Write next to the target, then rename over it.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "export".into());
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));
    let written = fs::File::create(&tmp)
        .with_context(|| format!("create {}", tmp.display()))
        .and_then(|mut f| {
            f.write_all(bytes).with_context(|| format!("write {}", tmp.display()))?;
            f.sync_all().with_context(|| format!("sync {}", tmp.display()))
        })
        .and_then(|()| fs::rename(&tmp, path).with_context(|| format!("rename {} -> {}", tmp.display(), path.display())));
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

/// One line of the human overview table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OverviewRow {
    pub title: String,
    pub sentiment: String,
    pub confidence: String,
    pub archetype: String,
    pub insight: String,
    pub summary: String,
}

pub fn overview_rows(results: &[AnalysisResult], limit: usize) -> Vec<OverviewRow> {
    results
        .iter()
        .take(limit)
        .map(|r| OverviewRow {
            title: r.title.clone(),
            sentiment: r.sentiment.as_str().to_uppercase(),
            confidence: format!("{:.2}", r.confidence),
            archetype: r.archetype.clone(),
            insight: r.insight.clone(),
            summary: ellipsize(&r.summary, OVERVIEW_SUMMARY_CHARS),
        })
        .collect()
}
