//! Typed model of the Superset chart-data query context and the builder that
//! derives it from a [`ChartPlan`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::core::catalog::Dataset;
use crate::core::chart_types::{ChartFamily, VizType};
use crate::core::metric::Metric;
use crate::core::validator::ChartPlan;
use crate::domain::model::{QueryMode, TimeGrain};
use crate::utils::error::Result;

const COUNT_STAR: &str = "count(*)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasourceRef {
    pub id: i64,
    #[serde(rename = "type")]
    pub datasource_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    pub datasource: DatasourceRef,
    pub force: bool,
    pub queries: Vec<QueryObject>,
    pub result_format: String,
    pub result_type: String,
}

impl QueryContext {
    /// Context with a single default query, used when nothing better is known.
    pub fn minimal(dataset_id: i64) -> Self {
        Self {
            datasource: DatasourceRef {
                id: dataset_id,
                datasource_type: "table".to_string(),
            },
            force: false,
            queries: vec![QueryObject::default()],
            result_format: "json".to_string(),
            result_type: "full".to_string(),
        }
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Either a plain column name or an axis column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryColumn {
    Name(String),
    Axis(AxisColumn),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisColumn {
    #[serde(rename = "timeGrain")]
    pub time_grain: String,
    #[serde(rename = "columnType")]
    pub column_type: String,
    #[serde(rename = "sqlExpression")]
    pub sql_expression: String,
    pub label: String,
    #[serde(rename = "expressionType")]
    pub expression_type: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub column: Option<AxisColumnInfo>,
}

impl AxisColumn {
    fn base_axis(column_name: &str, grain: TimeGrain, expression_type: &str) -> Self {
        Self {
            time_grain: grain.iso_duration().to_string(),
            column_type: "BASE_AXIS".to_string(),
            sql_expression: column_name.to_string(),
            label: column_name.to_string(),
            expression_type: expression_type.to_string(),
            column: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisColumnInfo {
    pub column_name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub is_dttm: bool,
    pub python_date_format: String,
    pub description: String,
    pub filterable: bool,
    pub groupby: bool,
    pub verbose_name: String,
}

/// A metric object or a bare expression such as `count(*)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryMetric {
    Metric(Metric),
    Expression(String),
}

impl QueryMetric {
    pub fn label(&self) -> &str {
        match self {
            QueryMetric::Metric(metric) => metric.label(),
            QueryMetric::Expression(expression) => expression,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub col: String,
    pub op: String,
    pub val: String,
}

impl QueryFilter {
    fn temporal_range(column: &str) -> Self {
        Self {
            col: column.to_string(),
            op: "TEMPORAL_RANGE".to_string(),
            val: "No filter".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryExtras {
    pub having: String,
    #[serde(rename = "where")]
    pub where_clause: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub time_grain_sqla: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateOperator {
    pub operator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotOptions {
    pub index: Vec<String>,
    pub columns: Vec<String>,
    pub aggregates: BTreeMap<String, AggregateOperator>,
    pub drop_missing_columns: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameOptions {
    pub columns: BTreeMap<String, Option<String>>,
    pub level: u32,
    pub inplace: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributionOptions {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub orientation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub time_shifts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rename_columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "options", rename_all = "snake_case")]
pub enum PostProcessing {
    Pivot(PivotOptions),
    Rename(RenameOptions),
    Contribution(ContributionOptions),
    Flatten,
}

impl PostProcessing {
    fn pivot_mean(index: &str, columns: Vec<String>, labels: &[&str], drop_missing: bool) -> Self {
        let aggregates = labels
            .iter()
            .map(|label| {
                (
                    label.to_string(),
                    AggregateOperator {
                        operator: "mean".to_string(),
                    },
                )
            })
            .collect();
        PostProcessing::Pivot(PivotOptions {
            index: vec![index.to_string()],
            columns,
            aggregates,
            drop_missing_columns: drop_missing,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryObject {
    pub filters: Vec<QueryFilter>,
    pub extras: QueryExtras,
    pub applied_time_extras: Map<String, Value>,
    pub columns: Vec<QueryColumn>,
    pub metrics: Vec<QueryMetric>,
    pub orderby: Vec<(QueryMetric, bool)>,
    pub annotation_layers: Vec<Value>,
    pub row_limit: u32,
    pub series_limit: u32,
    pub order_desc: bool,
    pub url_params: Map<String, Value>,
    pub custom_params: Map<String, Value>,
    pub custom_form_data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub series_columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub series_limit_metric: Option<QueryMetric>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub post_processing: Vec<PostProcessing>,
}

impl Default for QueryObject {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            extras: QueryExtras::default(),
            applied_time_extras: Map::new(),
            columns: Vec::new(),
            metrics: vec![QueryMetric::Expression(COUNT_STAR.to_string())],
            orderby: Vec::new(),
            annotation_layers: Vec::new(),
            row_limit: 10_000,
            series_limit: 0,
            order_desc: true,
            url_params: Map::new(),
            custom_params: Map::new(),
            custom_form_data: Map::new(),
            series_columns: None,
            series_limit_metric: None,
            post_processing: Vec::new(),
        }
    }
}

impl QueryObject {
    fn set_metrics(&mut self, metrics: &[Metric]) {
        self.metrics = metrics.iter().cloned().map(QueryMetric::Metric).collect();
    }

    fn set_grain(&mut self, grain: TimeGrain) {
        self.extras.time_grain_sqla = Some(grain.iso_duration().to_string());
    }

    fn add_temporal_filter(&mut self, column: &str) {
        self.filters.push(QueryFilter::temporal_range(column));
    }
}

fn axis_info(dataset: &Dataset, x_axis: &str) -> AxisColumnInfo {
    let column = dataset.column(x_axis);
    AxisColumnInfo {
        column_name: x_axis.to_string(),
        column_type: column
            .map(|c| c.column_type.clone())
            .unwrap_or_else(|| "DATE".to_string()),
        is_dttm: column.map(|c| c.is_temporal()).unwrap_or(true),
        python_date_format: column
            .and_then(|c| c.python_date_format.clone())
            .unwrap_or_else(|| "mixed".to_string()),
        description: column
            .and_then(|c| c.description.clone())
            .unwrap_or_default(),
        filterable: column.map(|c| c.filterable).unwrap_or(true),
        groupby: column.map(|c| c.groupby).unwrap_or(true),
        verbose_name: column
            .and_then(|c| c.verbose_name.clone())
            .unwrap_or_else(|| x_axis.to_string()),
    }
}

pub fn build_query_context(plan: &ChartPlan, dataset: &Dataset) -> QueryContext {
    let mut query = QueryObject {
        row_limit: plan.row_limit,
        ..QueryObject::default()
    };

    match plan.family() {
        ChartFamily::SingleMetric => build_single_metric(&mut query, plan),
        ChartFamily::Timeseries => build_timeseries(&mut query, plan, dataset),
        ChartFamily::Table => build_table(&mut query, plan),
        ChartFamily::Generic => build_generic(&mut query, plan),
    }

    let mut context = QueryContext::minimal(dataset.id);
    context.queries = vec![query];
    context
}

fn build_single_metric(query: &mut QueryObject, plan: &ChartPlan) {
    if let Some(metric) = plan.primary_metric() {
        query.set_metrics(std::slice::from_ref(metric));
    }
    query.columns = plan.groupby.iter().cloned().map(QueryColumn::Name).collect();

    if plan.viz_type != VizType::BigNumber {
        return;
    }
    if let (Some(x_axis), Some(grain)) = (plan.x_axis.as_deref(), plan.time_grain) {
        query.columns = vec![QueryColumn::Axis(AxisColumn::base_axis(x_axis, grain, "SQL"))];
        query.set_grain(grain);
        query.add_temporal_filter(x_axis);
        let label = plan.primary_metric().map(Metric::label).unwrap_or(COUNT_STAR);
        query.post_processing = vec![
            PostProcessing::pivot_mean(x_axis, Vec::new(), &[label], true),
            PostProcessing::Flatten,
        ];
    }
}

fn build_timeseries(query: &mut QueryObject, plan: &ChartPlan, dataset: &Dataset) {
    query.set_metrics(&plan.metrics);
    let grain = plan.time_grain.unwrap_or(TimeGrain::Week);

    let mut columns = Vec::with_capacity(plan.groupby.len() + 1);
    if let Some(x_axis) = plan.x_axis.as_deref() {
        let mut axis = AxisColumn::base_axis(x_axis, grain, "SIMPLE");
        axis.column = Some(axis_info(dataset, x_axis));
        columns.push(QueryColumn::Axis(axis));
        query.add_temporal_filter(x_axis);
    }
    columns.extend(plan.groupby.iter().cloned().map(QueryColumn::Name));
    query.columns = columns;
    if !plan.groupby.is_empty() {
        query.series_columns = Some(plan.groupby.clone());
    }
    query.set_grain(grain);

    // Series are pivoted only when there is something to split by.
    let Some(x_axis) = plan.x_axis.as_deref() else {
        return;
    };
    let labels: Vec<&str> = plan.metrics.iter().map(Metric::label).collect();
    if labels.is_empty() || plan.groupby.is_empty() {
        return;
    }
    let first = labels[0].to_string();
    let rename_to = if labels.len() == 1 { None } else { Some(first.clone()) };
    let mut steps = vec![
        PostProcessing::pivot_mean(x_axis, plan.groupby.clone(), &labels, false),
        PostProcessing::Rename(RenameOptions {
            columns: BTreeMap::from([(first, rename_to)]),
            level: 0,
            inplace: true,
        }),
    ];
    if let Some(mode) = plan.contribution_mode {
        steps.push(PostProcessing::Contribution(ContributionOptions {
            orientation: Some(mode.as_str().to_string()),
            time_shifts: Some(Vec::new()),
            ..ContributionOptions::default()
        }));
    }
    steps.push(PostProcessing::Flatten);
    query.post_processing = steps;
}

fn build_table(query: &mut QueryObject, plan: &ChartPlan) {
    if plan.query_mode == QueryMode::Raw {
        query.metrics = Vec::new();
        query.columns = plan.columns.iter().cloned().map(QueryColumn::Name).collect();
        // Raw rows still honor the dashboard time range on a date-like column.
        let temporal = plan.columns.iter().find(|name| {
            let lower = name.to_lowercase();
            lower.contains("date") || lower.contains("time")
        });
        if let Some(column) = temporal {
            query.add_temporal_filter(column);
            query.set_grain(plan.time_grain.unwrap_or(TimeGrain::Day));
        }
        return;
    }

    query.set_metrics(&plan.metrics);
    query.columns = plan.groupby.iter().cloned().map(QueryColumn::Name).collect();
    if let Some(first) = plan.metrics.first() {
        query.orderby = vec![(QueryMetric::Metric(first.clone()), false)];
    }
    query.series_limit_metric = plan
        .timeseries_limit_metric
        .clone()
        .or_else(|| plan.metrics.first().cloned())
        .map(QueryMetric::Metric);
    if !plan.percent_metrics.is_empty() {
        let labels: Vec<String> = plan
            .percent_metrics
            .iter()
            .map(|m| m.label().to_string())
            .collect();
        query.post_processing = vec![PostProcessing::Contribution(ContributionOptions {
            rename_columns: Some(labels.iter().map(|l| format!("%{}", l)).collect()),
            columns: Some(labels),
            ..ContributionOptions::default()
        })];
    }
    if let Some(column) = plan.temporal_lookup.as_deref() {
        query.add_temporal_filter(column);
    }
    if let Some(grain) = plan.time_grain {
        query.set_grain(grain);
    }
}

fn build_generic(query: &mut QueryObject, plan: &ChartPlan) {
    if plan.metrics.is_empty() {
        query.metrics = vec![QueryMetric::Expression(COUNT_STAR.to_string())];
    } else {
        query.set_metrics(&plan.metrics);
    }
    query.columns = plan.groupby.iter().cloned().map(QueryColumn::Name).collect();
    if let Some(x_axis) = plan.x_axis.as_deref() {
        query.add_temporal_filter(x_axis);
    }
    if let Some(grain) = plan.time_grain {
        query.set_grain(grain);
    }
}
