use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::chart_types::VizType;
use crate::utils::error::{ChartError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregate {
    Sum,
    Avg,
    Count,
}

impl Aggregate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregate::Sum => "SUM",
            Aggregate::Avg => "AVG",
            Aggregate::Count => "COUNT",
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregate {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sum" | "total" | "jumlah" => Ok(Aggregate::Sum),
            "avg" | "average" | "rata-rata" | "rata rata" | "mean" => Ok(Aggregate::Avg),
            "count" | "hitung" | "banyaknya" => Ok(Aggregate::Count),
            _ => Err(ChartError::invalid_field(
                "metrics",
                s,
                "unknown aggregate, expected SUM, AVG or COUNT",
            )),
        }
    }
}

/// One `<agg> dari column <col>` item of a prompt. `column == None` is `*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub aggregate: Aggregate,
    pub column: Option<String>,
}

impl MetricSpec {
    pub fn new(aggregate: Aggregate, column: impl Into<String>) -> Self {
        Self {
            aggregate,
            column: Some(column.into()),
        }
    }

    pub fn count_all() -> Self {
        Self {
            aggregate: Aggregate::Count,
            column: None,
        }
    }

    pub fn label(&self) -> String {
        format!(
            "{}({})",
            self.aggregate,
            self.column.as_deref().unwrap_or("*")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeGrain {
    #[serde(rename = "P1D")]
    Day,
    #[serde(rename = "P1W")]
    Week,
    #[serde(rename = "P1M")]
    Month,
    #[serde(rename = "P3M")]
    Quarter,
    #[serde(rename = "P1Y")]
    Year,
}

impl TimeGrain {
    pub fn iso_duration(&self) -> &'static str {
        match self {
            TimeGrain::Day => "P1D",
            TimeGrain::Week => "P1W",
            TimeGrain::Month => "P1M",
            TimeGrain::Quarter => "P3M",
            TimeGrain::Year => "P1Y",
        }
    }
}

impl fmt::Display for TimeGrain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.iso_duration())
    }
}

impl FromStr for TimeGrain {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        let grain = match normalized.as_str() {
            "p1d" | "day" | "daily" | "hari" | "harian" => TimeGrain::Day,
            "p1w" | "week" | "weekly" | "minggu" | "mingguan" => TimeGrain::Week,
            "p1m" | "month" | "monthly" | "bulan" | "bulanan" => TimeGrain::Month,
            "p3m" | "quarter" | "quarterly" | "kuartal" | "triwulan" => TimeGrain::Quarter,
            "p1y" | "year" | "yearly" | "tahun" | "tahunan" => TimeGrain::Year,
            _ => {
                return Err(ChartError::invalid_field(
                    "time grain",
                    s,
                    "expected day, week, month, quarter or year",
                ))
            }
        };
        Ok(grain)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Aggregate,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContributionMode {
    #[default]
    Column,
    Row,
}

impl ContributionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContributionMode::Column => "column",
            ContributionMode::Row => "row",
        }
    }
}

/// A parsed chart prompt. Column names are kept as written; they are checked
/// against the catalog when the request is planned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRequest {
    pub chart_type: String,
    pub viz_type: VizType,
    pub dataset: String,
    pub time_axis: Option<String>,
    pub time_grain: Option<TimeGrain>,
    pub metrics: Vec<MetricSpec>,
    pub groupby: Vec<String>,
    pub dimension: Option<String>,
    pub columns: Vec<String>,
    pub row_limit: Option<u32>,
    pub slice_name: Option<String>,
    pub contribution_mode: Option<String>,
    pub unrecognized: Vec<String>,
}

impl ChartRequest {
    pub fn new(viz_type: VizType, dataset: impl Into<String>) -> Self {
        Self {
            chart_type: viz_type.as_str().to_string(),
            viz_type,
            dataset: dataset.into(),
            time_axis: None,
            time_grain: None,
            metrics: Vec::new(),
            groupby: Vec::new(),
            dimension: None,
            columns: Vec::new(),
            row_limit: None,
            slice_name: None,
            contribution_mode: None,
            unrecognized: Vec::new(),
        }
    }

    pub fn title(&self) -> String {
        self.slice_name
            .clone()
            .unwrap_or_else(|| format!("{} on {}", self.chart_type, self.dataset))
    }
}

/// The body accepted by the BI platform's chart-create endpoint. `params` and
/// `query_context` are JSON documents encoded as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPayload {
    pub viz_type: VizType,
    pub slice_name: String,
    pub datasource_id: i64,
    pub datasource_type: String,
    pub params: String,
    pub query_context: String,
}

impl ChartPayload {
    pub fn params_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.params)?)
    }

    pub fn query_context_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.query_context)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledChart {
    pub payload: ChartPayload,
    pub dataset: String,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explore_url: Option<String>,
}

impl CompiledChart {
    /// File-system friendly name derived from the slice name.
    pub fn slug(&self) -> String {
        slugify(&self.payload.slice_name)
    }
}

pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "chart".to_string()
    } else {
        slug
    }
}

/// A prompt document read during extraction.
#[derive(Debug, Clone)]
pub struct PromptSource {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptFailure {
    pub source: String,
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct CompileResult {
    pub charts: Vec<CompiledChart>,
    pub failures: Vec<PromptFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_synonyms() {
        assert_eq!("jumlah".parse::<Aggregate>().unwrap(), Aggregate::Sum);
        assert_eq!("Rata-Rata".parse::<Aggregate>().unwrap(), Aggregate::Avg);
        assert_eq!("COUNT".parse::<Aggregate>().unwrap(), Aggregate::Count);
        assert!("median".parse::<Aggregate>().is_err());
    }

    #[test]
    fn test_time_grain_synonyms() {
        assert_eq!("bulanan".parse::<TimeGrain>().unwrap(), TimeGrain::Month);
        assert_eq!("Quarter".parse::<TimeGrain>().unwrap(), TimeGrain::Quarter);
        assert_eq!("P1W".parse::<TimeGrain>().unwrap(), TimeGrain::Week);
        assert_eq!(TimeGrain::Quarter.iso_duration(), "P3M");
        assert!("fortnight".parse::<TimeGrain>().is_err());
    }

    #[test]
    fn test_metric_label() {
        assert_eq!(MetricSpec::count_all().label(), "COUNT(*)");
        assert_eq!(
            MetricSpec::new(Aggregate::Sum, "balance").label(),
            "SUM(balance)"
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Distribusi Status Rekening"), "distribusi-status-rekening");
        assert_eq!(slugify("  Loan / Month (2024) "), "loan-month-2024");
        assert_eq!(slugify("!!!"), "chart");
    }
}
