use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use crate::core::catalog::{Column, Dataset};
use crate::domain::model::{Aggregate, MetricSpec};
use crate::utils::error::{ChartError, Result};

static FUNCTION_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(count|sum|avg)\s*\(\s*([^)]*?)\s*\)\s*$").expect("valid metric regex")
});

/// Column metadata as the BI platform embeds it inside SIMPLE metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub advanced_data_type: Option<String>,
    pub certification_details: Option<String>,
    pub certified_by: Option<String>,
    pub column_name: String,
    pub description: Option<String>,
    pub expression: Option<String>,
    pub filterable: bool,
    pub groupby: bool,
    pub id: i64,
    pub is_certified: bool,
    pub is_dttm: bool,
    pub python_date_format: Option<String>,
    #[serde(rename = "type")]
    pub column_type: String,
    pub type_generic: i64,
    pub verbose_name: Option<String>,
    pub warning_markdown: Option<String>,
}

impl From<&Column> for ColumnMetadata {
    fn from(column: &Column) -> Self {
        Self {
            advanced_data_type: None,
            certification_details: None,
            certified_by: None,
            column_name: column.column_name.clone(),
            description: column.description.clone(),
            expression: column.expression.clone(),
            filterable: column.filterable,
            groupby: column.groupby,
            id: column.effective_id(),
            is_certified: false,
            is_dttm: column.is_dttm,
            python_date_format: column.python_date_format.clone(),
            column_type: column.column_type.clone(),
            type_generic: column.type_generic,
            verbose_name: column.verbose_name.clone(),
            warning_markdown: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleMetric {
    pub column: ColumnMetadata,
    pub aggregate: Aggregate,
    pub sql_expression: Option<String>,
    pub datasource_warning: bool,
    pub has_custom_label: bool,
    pub label: String,
    pub option_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlMetric {
    pub sql_expression: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expressionType")]
pub enum Metric {
    #[serde(rename = "SIMPLE")]
    Simple(SimpleMetric),
    #[serde(rename = "SQL")]
    Sql(SqlMetric),
}

impl Metric {
    pub fn label(&self) -> &str {
        match self {
            Metric::Simple(m) => &m.label,
            Metric::Sql(m) => &m.label,
        }
    }

    pub fn sql(expression: impl Into<String>) -> Self {
        let expression = expression.into();
        Metric::Sql(SqlMetric {
            label: expression.to_uppercase(),
            sql_expression: expression,
        })
    }
}

/// `metric_<10 hex>_<13 hex>`, derived from label and column so repeated
/// compiles of the same prompt produce identical payloads.
pub fn option_name(label: &str, column_name: &str) -> String {
    let digest = Sha256::digest(format!("{}_{}", label, column_name).as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("metric_{}_{}", &hex[..10], &hex[10..23])
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MetricBuilder;

impl MetricBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, aggregate: Aggregate, column: &Column, label: impl Into<String>) -> Metric {
        let label = label.into();
        Metric::Simple(SimpleMetric {
            option_name: option_name(&label, &column.column_name),
            column: ColumnMetadata::from(column),
            aggregate,
            sql_expression: None,
            datasource_warning: false,
            has_custom_label: false,
            label,
        })
    }

    /// COUNT over the first column, the form the BI platform uses for `count(*)`.
    pub fn count_rows(&self, dataset: &Dataset) -> Metric {
        match dataset.first_column() {
            Some(first) => self.build(
                Aggregate::Count,
                first,
                format!("COUNT({})", first.column_name),
            ),
            None => Metric::Sql(SqlMetric {
                sql_expression: "count(*)".to_string(),
                label: "COUNT(*)".to_string(),
            }),
        }
    }

    pub fn resolve(&self, spec: &MetricSpec, dataset: &Dataset) -> Result<Metric> {
        match (&spec.aggregate, spec.column.as_deref()) {
            (Aggregate::Count, None) => Ok(self.count_rows(dataset)),
            (aggregate, None) => Err(ChartError::invalid_field(
                "metrics",
                spec.label(),
                format!("{} needs a column", aggregate),
            )),
            (aggregate, Some(name)) => {
                let column = dataset.require_column(name)?;
                Ok(self.build(
                    *aggregate,
                    column,
                    format!("{}({})", aggregate, column.column_name),
                ))
            }
        }
    }

    pub fn resolve_all(&self, specs: &[MetricSpec], dataset: &Dataset) -> Result<Vec<Metric>> {
        specs.iter().map(|spec| self.resolve(spec, dataset)).collect()
    }

    /// Resolves the string forms `count(*)`, `count(x)`, `sum(x)` and
    /// `avg(x)`. Anything else is kept as a SQL metric.
    pub fn from_expression(&self, text: &str, dataset: &Dataset) -> Metric {
        if let Some(caps) = FUNCTION_FORM.captures(text) {
            let aggregate = match caps[1].to_lowercase().as_str() {
                "sum" => Aggregate::Sum,
                "avg" => Aggregate::Avg,
                _ => Aggregate::Count,
            };
            let argument = &caps[2];
            if aggregate == Aggregate::Count && argument == "*" {
                return self.count_rows(dataset);
            }
            if let Some(column) = dataset.column(argument) {
                return self.build(
                    aggregate,
                    column,
                    format!("{}({})", aggregate, column.column_name),
                );
            }
        }
        tracing::debug!("Keeping metric '{}' as SQL expression", text);
        Metric::sql(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset() -> Dataset {
        Dataset {
            id: 11,
            table_name: "sav_trn_accounts".to_string(),
            display_name: None,
            aliases: vec![],
            description: None,
            database: None,
            schema: None,
            columns_csv: None,
            columns: vec![
                Column::new("account_no", "VARCHAR(30)"),
                Column::new("balance", "DECIMAL(18,2)"),
            ],
        }
    }

    #[test]
    fn test_simple_metric_wire_format() {
        let metric = MetricBuilder::new()
            .resolve(&MetricSpec::new(Aggregate::Sum, "balance"), &dataset())
            .unwrap();
        let value = serde_json::to_value(&metric).unwrap();

        assert_eq!(value["expressionType"], json!("SIMPLE"));
        assert_eq!(value["aggregate"], json!("SUM"));
        assert_eq!(value["label"], json!("SUM(balance)"));
        assert_eq!(value["sqlExpression"], json!(null));
        assert_eq!(value["hasCustomLabel"], json!(false));
        assert_eq!(value["datasourceWarning"], json!(false));
        assert_eq!(value["column"]["column_name"], json!("balance"));
        assert_eq!(value["column"]["type"], json!("DECIMAL(18,2)"));
        assert_eq!(value["column"]["advanced_data_type"], json!(null));
        assert_eq!(value["column"]["is_certified"], json!(false));
        assert_eq!(value["column"]["type_generic"], json!(1));

        let option_name = value["optionName"].as_str().unwrap();
        let parts: Vec<&str> = option_name.split('_').collect();
        assert_eq!(parts[0], "metric");
        assert_eq!(parts[1].len(), 10);
        assert_eq!(parts[2].len(), 13);
    }

    #[test]
    fn test_option_name_is_deterministic() {
        assert_eq!(option_name("SUM(balance)", "balance"), option_name("SUM(balance)", "balance"));
        assert_ne!(option_name("SUM(balance)", "balance"), option_name("AVG(balance)", "balance"));
    }

    #[test]
    fn test_count_star_uses_first_column() {
        let metric = MetricBuilder::new()
            .resolve(&MetricSpec::count_all(), &dataset())
            .unwrap();
        assert_eq!(metric.label(), "COUNT(account_no)");
    }

    #[test]
    fn test_resolve_errors() {
        let builder = MetricBuilder::new();
        let missing = builder.resolve(&MetricSpec::new(Aggregate::Avg, "rate"), &dataset());
        assert!(matches!(missing, Err(ChartError::UnknownColumn { .. })));

        let no_column = MetricSpec {
            aggregate: Aggregate::Sum,
            column: None,
        };
        assert!(matches!(
            builder.resolve(&no_column, &dataset()),
            Err(ChartError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_from_expression() {
        let builder = MetricBuilder::new();
        let ds = dataset();
        assert_eq!(builder.from_expression("count(*)", &ds).label(), "COUNT(account_no)");
        assert_eq!(builder.from_expression("sum(balance)", &ds).label(), "SUM(balance)");
        assert_eq!(builder.from_expression("AVG( balance )", &ds).label(), "AVG(balance)");

        let fallback = builder.from_expression("sum(balance) / 1000", &ds);
        assert_eq!(
            fallback,
            Metric::Sql(SqlMetric {
                sql_expression: "sum(balance) / 1000".to_string(),
                label: "SUM(BALANCE) / 1000".to_string(),
            })
        );
        let value = serde_json::to_value(&fallback).unwrap();
        assert_eq!(value["expressionType"], json!("SQL"));
    }

    #[test]
    fn test_metric_deserializes_from_wire() {
        let metric = MetricBuilder::new().count_rows(&dataset());
        let encoded = serde_json::to_string(&metric).unwrap();
        let decoded: Metric = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, metric);
    }
}
