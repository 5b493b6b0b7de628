//! Benchmark results decoding and comparison-table rendering.
//!
//! Results follow the Google Benchmark JSON layout:
//!
//! ```json
//! {
//!   "context": { "caches": [ { "type": "Data", "level": 1, "size": 32768 } ] },
//!   "benchmarks": [ { "name": "BM_Map", "real_time": 12.5, "time_unit": "ns" } ]
//! }
//! ```

use crate::error::RenderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Turns one variant's results file into one rendered output file.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `results` for the variant labelled `label` into `output`.
    async fn render(&self, results: &Path, label: &str, output: &Path) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkResults {
    #[serde(default)]
    pub context: BenchmarkContext,
    #[serde(default)]
    pub benchmarks: Vec<BenchmarkRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkContext {
    #[serde(default)]
    pub caches: Vec<CacheInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub level: u32,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkRecord {
    pub name: String,
    pub real_time: f64,
    #[serde(default = "default_time_unit")]
    pub time_unit: String,
}

fn default_time_unit() -> String {
    "ns".to_string()
}

/// One table row: a benchmark and its speed relative to the fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub name: String,
    pub real_time: f64,
    pub time_unit: String,
    pub relative: f64,
}

/// Sort records fastest first and compute relative speed (two decimals).
pub fn comparison_rows(records: &[BenchmarkRecord]) -> Vec<ComparisonRow> {
    let mut sorted: Vec<&BenchmarkRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.real_time.total_cmp(&b.real_time));

    let fastest = sorted.first().map(|r| r.real_time).unwrap_or(0.0);
    sorted
        .into_iter()
        .map(|record| {
            let relative = if fastest > 0.0 {
                round2(record.real_time / fastest)
            } else {
                1.0
            };
            ComparisonRow {
                name: record.name.clone(),
                real_time: record.real_time,
                time_unit: record.time_unit.clone(),
                relative,
            }
        })
        .collect()
}

/// "L1 Data 32 KiB" style description of the CPU caches.
pub fn describe_caches(caches: &[CacheInfo]) -> Vec<String> {
    caches
        .iter()
        .map(|c| format!("L{} {} {} KiB", c.level, c.kind, c.size / 1024))
        .collect()
}

/// Render the Markdown comparison table for one variant.
pub fn render_table(label: &str, caches: &[CacheInfo], rows: &[ComparisonRow]) -> String {
    let mut lines = vec![format!("# C++{label}"), String::new()];
    lines.extend(describe_caches(caches).into_iter().map(|cache| format!("- {cache}")));
    if !caches.is_empty() {
        lines.push(String::new());
    }
    lines.push("| Benchmark | Time | Relative speed |".to_string());
    lines.push("|---|---:|---:|".to_string());
    lines.extend(rows.iter().map(|row| {
        format!(
            "| {} | {} {} | {} x |",
            escape_cell(&row.name),
            round2(row.real_time),
            row.time_unit,
            row.relative
        )
    }));

    let mut table = lines.join("\n");
    table.push('\n');
    table
}

/// Escape characters that would end a Markdown table cell.
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Writes a Markdown table per variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableRenderer;

impl TableRenderer {
    /// Decode a results file.
    pub async fn decode(results: &Path) -> Result<BenchmarkResults, RenderError> {
        let bytes = tokio::fs::read(results).await.map_err(|source| RenderError::Io {
            path: results.to_path_buf(),
            source,
        })?;
        let decoded: BenchmarkResults =
            serde_json::from_slice(&bytes).map_err(|source| RenderError::Decode {
                path: results.to_path_buf(),
                source,
            })?;
        if decoded.benchmarks.is_empty() {
            return Err(RenderError::NoRecords {
                path: results.to_path_buf(),
            });
        }
        Ok(decoded)
    }

    async fn write(results: &Path, label: &str, output: &Path) -> Result<(), RenderError> {
        let decoded = Self::decode(results).await?;
        let rows = comparison_rows(&decoded.benchmarks);
        let table = render_table(label, &decoded.context.caches, &rows);

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| RenderError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(output, table)
            .await
            .map_err(|source| RenderError::Io {
                path: output.to_path_buf(),
                source,
            })?;

        info!(output = %output.display(), "Successfully created {}", output.display());
        Ok(())
    }
}

#[async_trait]
impl Renderer for TableRenderer {
    async fn render(&self, results: &Path, label: &str, output: &Path) -> anyhow::Result<()> {
        Self::write(results, label, output).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, real_time: f64) -> BenchmarkRecord {
        BenchmarkRecord {
            name: name.to_string(),
            real_time,
            time_unit: "ns".to_string(),
        }
    }

    #[test]
    fn test_rows_sorted_fastest_first() {
        let rows = comparison_rows(&[record("slow", 30.0), record("fast", 10.0), record("mid", 15.0)]);
        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["fast", "mid", "slow"]);
        assert_eq!(rows[0].relative, 1.0);
        assert_eq!(rows[1].relative, 1.5);
        assert_eq!(rows[2].relative, 3.0);
    }

    #[test]
    fn test_relative_rounded_to_two_decimals() {
        let rows = comparison_rows(&[record("a", 3.0), record("b", 10.0)]);
        assert_eq!(rows[1].relative, 3.33);
    }

    #[test]
    fn test_zero_fastest_does_not_divide() {
        let rows = comparison_rows(&[record("a", 0.0), record("b", 5.0)]);
        assert!(rows.iter().all(|r| r.relative == 1.0));
    }

    #[test]
    fn test_render_table_layout() {
        let caches = vec![CacheInfo {
            kind: "Data".to_string(),
            level: 1,
            size: 32 * 1024,
        }];
        let rows = comparison_rows(&[record("BM_Map", 12.3456), record("BM_Filter", 24.69)]);
        let table = render_table("17", &caches, &rows);

        assert!(table.starts_with("# C++17\n"));
        assert!(table.contains("- L1 Data 32 KiB"));
        assert!(table.contains("| BM_Map | 12.35 ns | 1 x |"));
        assert!(table.contains("| BM_Filter | 24.69 ns | 2 x |"));
        assert!(table.ends_with("| 2 x |\n"));
    }

    #[test]
    fn test_pipe_in_benchmark_name_is_escaped() {
        let rows = comparison_rows(&[record("BM_Split<a|b>/64", 5.0)]);
        let table = render_table("20", &[], &rows);

        assert!(table.contains("| BM_Split<a\\|b>/64 | 5 ns | 1 x |"));
        let row = table.lines().last().unwrap();
        assert_eq!(row.matches(" | ").count(), 2);
    }

    #[tokio::test]
    async fn test_renderer_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("benchmark-20.json");
        std::fs::write(
            &results,
            r#"{"context":{"caches":[]},"benchmarks":[{"name":"BM_Zip","real_time":7.0,"time_unit":"us"}]}"#,
        )
        .unwrap();
        let output = dir.path().join("out").join("benchmarks-20.md");

        TableRenderer
            .render(&results, "20", &output)
            .await
            .expect("render failed");

        let table = std::fs::read_to_string(&output).unwrap();
        assert!(table.contains("# C++20"));
        assert!(table.contains("| BM_Zip | 7 us | 1 x |"));
    }

    #[tokio::test]
    async fn test_empty_results_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("benchmark.json");
        std::fs::write(&results, r#"{"benchmarks":[]}"#).unwrap();

        let err = TableRenderer::decode(&results).await.unwrap_err();
        assert!(matches!(err, RenderError::NoRecords { .. }));
    }

    #[tokio::test]
    async fn test_invalid_json_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("benchmark.json");
        std::fs::write(&results, "name,iterations,real_time").unwrap();

        let err = TableRenderer::decode(&results).await.unwrap_err();
        assert!(matches!(err, RenderError::Decode { .. }));
    }
}
