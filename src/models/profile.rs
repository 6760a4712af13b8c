use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Summary statistics for a single column of the uploaded dataset.
///
/// Statistics that are undefined for a column's type stay `None` and are
/// rendered as an explicit `N/A` marker instead of being omitted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ColumnSummary {
    pub name: String,
    pub data_type: String,
    pub null_count: usize,
    pub unique_count: usize,
    pub min: Option<String>,
    pub max: Option<String>,
    pub mean: Option<String>,
    pub median: Option<String>,
    pub std_dev: Option<String>,
    pub frequent_values: Option<HashMap<String, u32>>,
}

impl ColumnSummary {
    /// One prompt line for this column, with `N/A` standing in for
    /// statistics that do not apply.
    pub fn describe(&self) -> String {
        let na = || "N/A".to_string();
        format!(
            "{} ({}): nulls={}, unique={}, min={}, max={}, mean={}, median={}, std={}, top_values={}",
            self.name,
            self.data_type,
            self.null_count,
            self.unique_count,
            self.min.clone().unwrap_or_else(na),
            self.max.clone().unwrap_or_else(na),
            self.mean.clone().unwrap_or_else(na),
            self.median.clone().unwrap_or_else(na),
            self.std_dev.clone().unwrap_or_else(na),
            self.frequent_values
                .as_ref()
                .map(|freq| {
                    // Sorted for a stable prompt string.
                    let mut pairs: Vec<_> = freq.iter().collect();
                    pairs.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
                    let rendered: Vec<String> =
                        pairs.iter().map(|(v, c)| format!("{}={}", v, c)).collect();
                    format!("{{{}}}", rendered.join(", "))
                })
                .unwrap_or_else(na),
        )
    }
}

/// Read-only snapshot of an uploaded table used to ground prompts.
///
/// Built once per upload and immutable for the lifetime of that dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub row_count: usize,
    pub column_count: usize,
    /// Human-readable shape line, quoted verbatim into every prompt.
    pub shape_text: String,
    /// Columns in dataframe order.
    pub columns: Vec<ColumnSummary>,
    /// First rows of the table as a JSON array of records.
    pub sample_rows: serde_json::Value,
}

impl DatasetProfile {
    /// Column name to declared storage type, in dataframe order.
    pub fn dtype_lines(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("  - {}: {}", c.name, c.data_type))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn summary_lines(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("  - {}", c.describe()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
