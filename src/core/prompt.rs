//! Parser for the structured chart prompt format:
//!
//! ```text
//! Buatkan sebuah Chart dengan description seperti berikut:
//! - tipe chart: pie
//! - dengan dataset: saving account
//! - dengan metrics: count dari column *
//! - dengan dimension groupby: account_status
//! - dengan row limit: 100
//! - nama chart: Distribusi Status Rekening
//! ```

use regex::Regex;
use std::sync::LazyLock;

use crate::core::chart_types::detect_viz_type;
use crate::domain::model::{Aggregate, ChartRequest, MetricSpec, TimeGrain};
use crate::utils::error::{ChartError, Result};

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:#+\s*)?buatkan\s+(?:sebuah\s+)?chart\b").expect("valid header regex")
});

static BULLET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+([^:]+?)\s*:\s*(.*?)\s*$").expect("valid bullet regex")
});

static ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\(\s*(?:optional|raw mode only)\s*\)\s*$").expect("valid annotation regex"));

static METRIC_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<agg>[a-z][a-z\- ]*?)\s+(?:dari|of)\s+(?:(?:column|kolom)\s+)?(?P<col>.+)$")
        .expect("valid metric regex")
});

static METRIC_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<agg>[a-z][a-z\-]*)\s*\(\s*(?P<col>[^)]*?)\s*\)$")
        .expect("valid metric function regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKey {
    ChartType,
    Dataset,
    TimeAxis,
    TimeGrain,
    Metrics,
    GroupBy,
    Dimension,
    Columns,
    RowLimit,
    ChartName,
    ContributionMode,
}

impl PromptKey {
    fn parse(raw: &str) -> Option<Self> {
        let without_annotation = ANNOTATION.replace(raw, "");
        let lowered = without_annotation.trim().to_lowercase();
        let key = lowered.strip_prefix("dengan ").unwrap_or(&lowered);
        let key = key.split_whitespace().collect::<Vec<_>>().join(" ");

        let parsed = match key.as_str() {
            "tipe chart" | "chart type" | "jenis chart" => PromptKey::ChartType,
            "dataset" => PromptKey::Dataset,
            "time axis column" | "time axis" | "kolom waktu" => PromptKey::TimeAxis,
            "time grain" | "granularitas waktu" => PromptKey::TimeGrain,
            "metrics" | "metric" | "metrik" => PromptKey::Metrics,
            "dimension groupby" | "groupby" | "group by" => PromptKey::GroupBy,
            "dimension column" | "dimension" => PromptKey::Dimension,
            "columns" | "kolom" => PromptKey::Columns,
            "row limit" | "limit" => PromptKey::RowLimit,
            "nama chart" | "chart name" | "judul chart" => PromptKey::ChartName,
            "contribution mode" => PromptKey::ContributionMode,
            _ => return None,
        };
        Some(parsed)
    }

    fn label(&self) -> &'static str {
        match self {
            PromptKey::ChartType => "tipe chart",
            PromptKey::Dataset => "dataset",
            PromptKey::TimeAxis => "time axis column",
            PromptKey::TimeGrain => "time grain",
            PromptKey::Metrics => "metrics",
            PromptKey::GroupBy => "dimension groupby",
            PromptKey::Dimension => "dimension column",
            PromptKey::Columns => "columns",
            PromptKey::RowLimit => "row limit",
            PromptKey::ChartName => "nama chart",
            PromptKey::ContributionMode => "contribution mode",
        }
    }
}

fn clean_value(raw: &str) -> String {
    let value = ANNOTATION.replace(raw, "");
    value
        .trim()
        .trim_matches(|c| c == '`' || c == '"' || c == '\'')
        .trim()
        .to_string()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(clean_value)
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_metric_item(item: &str) -> Result<MetricSpec> {
    let malformed = || {
        ChartError::invalid_field(
            "metrics",
            item,
            "expected '<agg> dari column <col>' or '<agg>(<col>)'",
        )
    };

    let (aggregate, column) = if let Some(caps) = METRIC_CLAUSE.captures(item) {
        (caps["agg"].trim().to_string(), Some(clean_value(&caps["col"])))
    } else if let Some(caps) = METRIC_FUNCTION.captures(item) {
        (caps["agg"].trim().to_string(), Some(clean_value(&caps["col"])))
    } else if item.chars().all(|c| c.is_alphabetic() || c == '-' || c == ' ') {
        (item.trim().to_string(), None)
    } else {
        return Err(malformed());
    };

    let aggregate: Aggregate = aggregate.parse()?;
    let column = column.filter(|c| c != "*" && !c.is_empty());

    if column.is_none() && aggregate != Aggregate::Count {
        return Err(ChartError::invalid_field(
            "metrics",
            item,
            format!("{} needs a column", aggregate),
        ));
    }
    if column.as_deref().is_some_and(|c| c.contains(char::is_whitespace)) {
        return Err(malformed());
    }

    Ok(MetricSpec { aggregate, column })
}

fn parse_metrics(value: &str) -> Result<Vec<MetricSpec>> {
    let items = split_list(value);
    if items.is_empty() {
        return Err(ChartError::invalid_field(
            "metrics",
            value,
            "at least one metric is required when the line is present",
        ));
    }
    items.iter().map(|item| parse_metric_item(item)).collect()
}

fn parse_row_limit(value: &str) -> Result<u32> {
    let digits: String = value
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | '_' | ' '))
        .collect();
    match digits.parse::<u32>() {
        Ok(0) => Err(ChartError::invalid_field(
            "row limit",
            value,
            "must be greater than zero",
        )),
        Ok(limit) => Ok(limit),
        Err(_) => Err(ChartError::invalid_field(
            "row limit",
            value,
            "must be a whole number",
        )),
    }
}

#[derive(Default)]
struct Fields {
    chart_type: Option<String>,
    dataset: Option<String>,
    time_axis: Option<String>,
    time_grain: Option<TimeGrain>,
    metrics: Vec<MetricSpec>,
    groupby: Vec<String>,
    dimension: Option<String>,
    columns: Vec<String>,
    row_limit: Option<u32>,
    slice_name: Option<String>,
    contribution_mode: Option<String>,
    unrecognized: Vec<String>,
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Parses exactly one prompt. The header line is optional; only bullet lines
/// of the form `- key: value` are read.
pub fn parse_prompt(text: &str) -> Result<ChartRequest> {
    if text.trim().is_empty() {
        return Err(ChartError::EmptyPrompt);
    }

    let mut fields = Fields::default();
    let mut saw_bullet = false;

    for line in text.lines() {
        if HEADER.is_match(line) {
            continue;
        }
        let Some(caps) = BULLET.captures(line) else {
            continue;
        };
        saw_bullet = true;
        let raw_key = &caps[1];
        let value = clean_value(&caps[2]);

        let Some(key) = PromptKey::parse(raw_key) else {
            tracing::warn!("Ignoring unknown prompt line '{}'", line.trim());
            fields.unrecognized.push(line.trim().to_string());
            continue;
        };

        match key {
            PromptKey::ChartType => fields.chart_type = non_empty(value),
            PromptKey::Dataset => fields.dataset = non_empty(value),
            PromptKey::TimeAxis => fields.time_axis = non_empty(value),
            PromptKey::TimeGrain => {
                if !value.is_empty() {
                    fields.time_grain = Some(value.parse()?);
                }
            }
            PromptKey::Metrics => fields.metrics.extend(parse_metrics(&value)?),
            PromptKey::GroupBy => fields.groupby.extend(split_list(&value)),
            PromptKey::Dimension => fields.dimension = non_empty(value),
            PromptKey::Columns => fields.columns.extend(split_list(&value)),
            PromptKey::RowLimit => fields.row_limit = Some(parse_row_limit(&value)?),
            PromptKey::ChartName => fields.slice_name = non_empty(value),
            PromptKey::ContributionMode => fields.contribution_mode = non_empty(value),
        }
        tracing::trace!("Parsed prompt field '{}'", key.label());
    }

    if !saw_bullet {
        return Err(ChartError::EmptyPrompt);
    }

    let chart_type = fields.chart_type.ok_or_else(|| ChartError::MissingField {
        field: PromptKey::ChartType.label().to_string(),
    })?;
    let dataset = fields.dataset.ok_or_else(|| ChartError::MissingField {
        field: PromptKey::Dataset.label().to_string(),
    })?;
    let viz_type = detect_viz_type(&chart_type).ok_or_else(|| {
        ChartError::invalid_field("tipe chart", &chart_type, "unknown chart type")
    })?;

    Ok(ChartRequest {
        chart_type,
        viz_type,
        dataset,
        time_axis: fields.time_axis,
        time_grain: fields.time_grain,
        metrics: fields.metrics,
        groupby: fields.groupby,
        dimension: fields.dimension,
        columns: fields.columns,
        row_limit: fields.row_limit,
        slice_name: fields.slice_name,
        contribution_mode: fields.contribution_mode,
        unrecognized: fields.unrecognized,
    })
}

/// Splits a document holding several prompts. Every header line starts a new
/// prompt; a document without header lines is a single prompt.
pub fn split_prompts(text: &str) -> Vec<String> {
    let mut prompts = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if HEADER.is_match(line) && !current.is_empty() {
            prompts.push(current.join("\n"));
            current.clear();
        }
        current.push(line);
    }
    if !current.is_empty() {
        prompts.push(current.join("\n"));
    }

    prompts
        .into_iter()
        .filter(|section| section.lines().any(|line| BULLET.is_match(line)))
        .collect()
}

pub fn parse_prompt_document(text: &str) -> Vec<Result<ChartRequest>> {
    let sections = split_prompts(text);
    if sections.is_empty() {
        return vec![Err(ChartError::EmptyPrompt)];
    }
    sections.iter().map(|section| parse_prompt(section)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chart_types::VizType;

    const PIE_PROMPT: &str = "Buatkan sebuah Chart dengan description seperti berikut:
- tipe chart: pie
- dengan dataset: saving account
- dengan metrics: count dari column *
- dengan dimension groupby: account_status
- dengan row limit: 100
- nama chart: Distribusi Status Rekening";

    #[test]
    fn test_parse_pie_prompt() {
        let request = parse_prompt(PIE_PROMPT).unwrap();
        assert_eq!(request.viz_type, VizType::Pie);
        assert_eq!(request.dataset, "saving account");
        assert_eq!(request.metrics, vec![MetricSpec::count_all()]);
        assert_eq!(request.groupby, vec!["account_status"]);
        assert_eq!(request.row_limit, Some(100));
        assert_eq!(request.slice_name.as_deref(), Some("Distribusi Status Rekening"));
        assert!(request.unrecognized.is_empty());
    }

    #[test]
    fn test_parse_line_prompt_with_time_axis() {
        let prompt = "- tipe chart: line
- dengan dataset: loan order
- dengan time axis column: order_date
- dengan time grain: month
- dengan metrics: sum dari column plafond, avg dari column interest_rate
- dengan dimension column: branch_name
- dengan row limit: 10.000
- nama chart: Tren Plafon Bulanan";
        let request = parse_prompt(prompt).unwrap();
        assert_eq!(request.viz_type, VizType::EchartsTimeseriesLine);
        assert_eq!(request.time_axis.as_deref(), Some("order_date"));
        assert_eq!(request.time_grain, Some(TimeGrain::Month));
        assert_eq!(
            request.metrics,
            vec![
                MetricSpec::new(Aggregate::Sum, "plafond"),
                MetricSpec::new(Aggregate::Avg, "interest_rate"),
            ]
        );
        assert_eq!(request.dimension.as_deref(), Some("branch_name"));
        assert_eq!(request.row_limit, Some(10_000));
    }

    #[test]
    fn test_parse_raw_table_columns() {
        let prompt = "- tipe chart: table
- dengan dataset: collateral
- dengan columns: collateral_no, collateral_type, appraisal_value,
- dengan row limit: 500";
        let request = parse_prompt(prompt).unwrap();
        assert_eq!(request.viz_type, VizType::Table);
        assert_eq!(
            request.columns,
            vec!["collateral_no", "collateral_type", "appraisal_value"]
        );
        assert!(request.metrics.is_empty());
    }

    #[test]
    fn test_metric_variants() {
        assert_eq!(parse_metric_item("count").unwrap(), MetricSpec::count_all());
        assert_eq!(parse_metric_item("count(*)").unwrap(), MetricSpec::count_all());
        assert_eq!(
            parse_metric_item("SUM(balance)").unwrap(),
            MetricSpec::new(Aggregate::Sum, "balance")
        );
        assert_eq!(
            parse_metric_item("rata-rata dari kolom `balance`").unwrap(),
            MetricSpec::new(Aggregate::Avg, "balance")
        );
        assert_eq!(
            parse_metric_item("total of column balance").unwrap(),
            MetricSpec::new(Aggregate::Sum, "balance")
        );
        assert!(parse_metric_item("median dari column balance").is_err());
        assert!(parse_metric_item("sum").is_err());
        assert!(parse_metric_item("sum dari column saldo akhir").is_err());
    }

    #[test]
    fn test_annotations_are_stripped() {
        let prompt = "- tipe chart: bar
- dengan dataset: loan order
- dengan time grain (optional): quarter (optional)
- dengan metrics: count dari column order_no";
        let request = parse_prompt(prompt).unwrap();
        assert_eq!(request.time_grain, Some(TimeGrain::Quarter));
    }

    #[test]
    fn test_function_form_metrics_in_prompt() {
        let prompt = "- tipe chart: bar
- dengan dataset: loan order
- dengan metrics: sum(plafond), avg(interest_rate)
- dengan columns: order_no (raw mode only)";
        let request = parse_prompt(prompt).unwrap();
        assert_eq!(
            request.metrics,
            vec![
                MetricSpec::new(Aggregate::Sum, "plafond"),
                MetricSpec::new(Aggregate::Avg, "interest_rate"),
            ]
        );
        assert_eq!(request.columns, vec!["order_no"]);
    }

    #[test]
    fn test_chart_name_keeps_parentheses() {
        let request = parse_prompt(
            "- tipe chart: big number total\n- dengan dataset: loan order\n\
             - dengan metrics: sum(plafond)\n- nama chart: Total Plafond (IDR)",
        )
        .unwrap();
        assert_eq!(request.slice_name.as_deref(), Some("Total Plafond (IDR)"));
        assert_eq!(request.metrics, vec![MetricSpec::new(Aggregate::Sum, "plafond")]);
    }

    #[test]
    fn test_missing_required_fields() {
        let err = parse_prompt("- dengan dataset: loan order").unwrap_err();
        assert!(matches!(err, ChartError::MissingField { ref field } if field == "tipe chart"));

        let err = parse_prompt("- tipe chart: pie").unwrap_err();
        assert!(matches!(err, ChartError::MissingField { ref field } if field == "dataset"));

        assert!(matches!(parse_prompt("   "), Err(ChartError::EmptyPrompt)));
        assert!(matches!(
            parse_prompt("Buatkan sebuah Chart dengan description seperti berikut:"),
            Err(ChartError::EmptyPrompt)
        ));
    }

    #[test]
    fn test_invalid_values() {
        let base = "- tipe chart: pie\n- dengan dataset: loan order\n";
        assert!(parse_prompt(&format!("{base}- dengan row limit: banyak")).is_err());
        assert!(parse_prompt(&format!("{base}- dengan row limit: 0")).is_err());
        assert!(parse_prompt(&format!("{base}- dengan time grain: fortnight")).is_err());
        assert!(parse_prompt("- tipe chart: hologram\n- dengan dataset: loan order").is_err());
    }

    #[test]
    fn test_unknown_lines_are_recorded() {
        let request = parse_prompt(&format!("{PIE_PROMPT}\n- dengan warna: biru")).unwrap();
        assert_eq!(request.unrecognized, vec!["- dengan warna: biru"]);
    }

    #[test]
    fn test_document_with_several_prompts() {
        let document = format!(
            "# Contoh prompt\n\nBeberapa contoh.\n\n{PIE_PROMPT}\n\n## Kedua\n\n\
             Buatkan sebuah Chart dengan description seperti berikut:\n\
             - tipe chart: big number\n- dengan dataset: loan order\n\n\
             Buatkan sebuah Chart dengan description seperti berikut:\n\
             - dengan dataset: collateral\n"
        );
        let results = parse_prompt_document(&document);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().viz_type, VizType::Pie);
        assert_eq!(results[1].as_ref().unwrap().viz_type, VizType::BigNumber);
        assert!(results[2].is_err());
    }

    #[test]
    fn test_document_without_prompts() {
        let results = parse_prompt_document("# nothing here\n\njust prose");
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(ChartError::EmptyPrompt)));
    }
}
