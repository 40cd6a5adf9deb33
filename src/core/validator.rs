//! Normalizes a chart request against its dataset into a [`ChartPlan`]: fills
//! in what the prompt left out (time axis, grain, default metrics, series
//! dimension) according to the chart family, and rejects plans that lack the
//! parameters their chart type requires.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::catalog::Dataset;
use crate::core::chart_types::{ChartFamily, VizType};
use crate::core::compiler::CompilerSettings;
use crate::core::metric::{Metric, MetricBuilder};
use crate::domain::model::{Aggregate, ChartRequest, ContributionMode, QueryMode, TimeGrain};
use crate::utils::error::{ChartError, Result};

pub const MAX_ROW_LIMIT: u32 = 100_000;
pub const RAW_MODE_DEFAULT_COLUMNS: usize = 7;
const TIMESERIES_ROW_LIMIT: u32 = 1000;
const QUERY_ROW_LIMIT: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdhocFilter {
    pub clause: String,
    pub subject: String,
    pub operator: String,
    pub comparator: String,
    #[serde(rename = "expressionType")]
    pub expression_type: String,
}

impl AdhocFilter {
    pub fn temporal_range(subject: impl Into<String>) -> Self {
        Self {
            clause: "WHERE".to_string(),
            subject: subject.into(),
            operator: "TEMPORAL_RANGE".to_string(),
            comparator: "No filter".to_string(),
            expression_type: "SIMPLE".to_string(),
        }
    }

    pub fn is_temporal(&self) -> bool {
        self.operator == "TEMPORAL_RANGE"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartPlan {
    pub viz_type: VizType,
    pub slice_name: String,
    pub metrics: Vec<Metric>,
    pub groupby: Vec<String>,
    pub x_axis: Option<String>,
    pub time_grain: Option<TimeGrain>,
    pub row_limit: u32,
    pub query_mode: QueryMode,
    pub columns: Vec<String>,
    pub percent_metrics: Vec<Metric>,
    pub timeseries_limit_metric: Option<Metric>,
    pub temporal_lookup: Option<String>,
    pub contribution_mode: Option<ContributionMode>,
    pub adhoc_filters: Vec<AdhocFilter>,
    pub warnings: Vec<String>,
}

impl ChartPlan {
    fn new(viz_type: VizType, slice_name: String, row_limit: u32) -> Self {
        Self {
            viz_type,
            slice_name,
            metrics: Vec::new(),
            groupby: Vec::new(),
            x_axis: None,
            time_grain: None,
            row_limit,
            query_mode: QueryMode::Aggregate,
            columns: Vec::new(),
            percent_metrics: Vec::new(),
            timeseries_limit_metric: None,
            temporal_lookup: None,
            contribution_mode: None,
            adhoc_filters: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn family(&self) -> ChartFamily {
        self.viz_type.family()
    }

    /// The single metric of pie, funnel and big number charts.
    pub fn primary_metric(&self) -> Option<&Metric> {
        self.metrics.first()
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    fn add_temporal_filter(&mut self, subject: &str) {
        let exists = self
            .adhoc_filters
            .iter()
            .any(|f| f.is_temporal() && f.subject == subject);
        if !exists {
            self.adhoc_filters.push(AdhocFilter::temporal_range(subject));
        }
    }
}

/// Request fields after column names were checked and canonicalized.
struct Inputs {
    viz_type: VizType,
    slice_name: Option<String>,
    metrics: Vec<Metric>,
    groupby: Vec<String>,
    time_axis: Option<String>,
    time_grain: Option<TimeGrain>,
    columns: Vec<String>,
    row_limit: Option<u32>,
    contribution_mode: Option<String>,
    query_mode: Option<QueryMode>,
    percent_metrics: Option<Vec<Metric>>,
    timeseries_limit_metric: Option<Metric>,
    adhoc_filters: Vec<AdhocFilter>,
}

#[derive(Debug, Default, Clone)]
pub struct ChartValidator {
    metrics: MetricBuilder,
}

fn canonical(dataset: &Dataset, name: &str) -> Result<String> {
    Ok(dataset.require_column(name)?.column_name.clone())
}

fn canonical_all(dataset: &Dataset, names: &[String]) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let column = canonical(dataset, name)?;
        if !out.contains(&column) {
            out.push(column);
        }
    }
    Ok(out)
}

impl ChartValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plans a parsed prompt. Unknown columns and unmet chart requirements
    /// are errors.
    pub fn plan(
        &self,
        request: &ChartRequest,
        dataset: &Dataset,
        settings: &CompilerSettings,
    ) -> Result<ChartPlan> {
        let mut groupby = canonical_all(dataset, &request.groupby)?;
        if let Some(dimension) = request.dimension.as_deref() {
            let dimension = canonical(dataset, dimension)?;
            if !groupby.contains(&dimension) {
                groupby.push(dimension);
            }
        }

        let inputs = Inputs {
            viz_type: request.viz_type,
            slice_name: request.slice_name.clone(),
            metrics: self.metrics.resolve_all(&request.metrics, dataset)?,
            groupby,
            time_axis: request
                .time_axis
                .as_deref()
                .map(|axis| canonical(dataset, axis))
                .transpose()?,
            time_grain: request.time_grain,
            columns: canonical_all(dataset, &request.columns)?,
            row_limit: request.row_limit,
            contribution_mode: request.contribution_mode.clone(),
            query_mode: None,
            percent_metrics: None,
            timeseries_limit_metric: None,
            adhoc_filters: Vec::new(),
        };

        let mut plan = self.normalize(inputs, dataset, settings)?;
        for line in &request.unrecognized {
            plan.warnings.push(format!("Ignored prompt line: {}", line));
        }
        Ok(plan)
    }

    /// Plans externally authored form data. Metrics may be strings such as
    /// `sum(balance)` or metric objects.
    pub fn plan_from_params(
        &self,
        viz_type: VizType,
        slice_name: Option<String>,
        params: &Map<String, Value>,
        dataset: &Dataset,
        settings: &CompilerSettings,
    ) -> Result<ChartPlan> {
        let string_list = |key: &str| -> Vec<String> {
            match params.get(key) {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
                Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
                _ => Vec::new(),
            }
        };
        let metric_list = |key: &str| -> Option<Vec<Metric>> {
            match params.get(key) {
                Some(Value::Array(items)) => Some(
                    items
                        .iter()
                        .map(|item| self.metric_from_value(item, dataset))
                        .collect(),
                ),
                Some(Value::Null) | None => None,
                Some(other) => Some(vec![self.metric_from_value(other, dataset)]),
            }
        };

        let mut metrics = metric_list("metrics").unwrap_or_default();
        if metrics.is_empty() {
            metrics = metric_list("metric").unwrap_or_default();
        }

        let time_axis = params
            .get("x_axis")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(|axis| canonical(dataset, axis))
            .transpose()?;
        let time_grain = params
            .get("time_grain_sqla")
            .and_then(Value::as_str)
            .map(str::parse::<TimeGrain>)
            .transpose()?;
        let query_mode = match params.get("query_mode").and_then(Value::as_str) {
            Some("raw") => Some(QueryMode::Raw),
            Some(_) => Some(QueryMode::Aggregate),
            None => None,
        };
        let mut columns = string_list("columns");
        if columns.is_empty() {
            columns = string_list("all_columns");
        }
        let row_limit = params
            .get("row_limit")
            .and_then(Value::as_u64)
            .map(|limit| u32::try_from(limit).unwrap_or(u32::MAX));
        let contribution_mode = params
            .get("contributionMode")
            .or_else(|| params.get("contribution_mode"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let adhoc_filters = params
            .get("adhoc_filters")
            .cloned()
            .and_then(|v| serde_json::from_value::<Vec<AdhocFilter>>(v).ok())
            .unwrap_or_default();

        let inputs = Inputs {
            viz_type,
            slice_name,
            metrics,
            groupby: canonical_all(dataset, &string_list("groupby"))?,
            time_axis,
            time_grain,
            columns: canonical_all(dataset, &columns)?,
            row_limit,
            contribution_mode,
            query_mode,
            percent_metrics: metric_list("percent_metrics"),
            timeseries_limit_metric: params
                .get("timeseries_limit_metric")
                .filter(|v| !v.is_null())
                .map(|v| self.metric_from_value(v, dataset)),
            adhoc_filters,
        };
        self.normalize(inputs, dataset, settings)
    }

    fn metric_from_value(&self, value: &Value, dataset: &Dataset) -> Metric {
        match value {
            Value::String(text) => self.metrics.from_expression(text, dataset),
            Value::Object(object) => {
                if let Ok(metric) = serde_json::from_value::<Metric>(value.clone()) {
                    return metric;
                }
                // Partial metric objects: rebuild from aggregate and column.
                let aggregate = object
                    .get("aggregate")
                    .and_then(Value::as_str)
                    .unwrap_or("COUNT");
                let column_name = object
                    .get("column")
                    .and_then(|c| c.get("column_name"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| {
                        object
                            .get("label")
                            .and_then(Value::as_str)
                            .and_then(|label| {
                                let start = label.find('(')? + 1;
                                let end = label.rfind(')')?;
                                label.get(start..end).map(str::to_string)
                            })
                    })
                    .unwrap_or_else(|| "*".to_string());
                if let Some(sql) = object.get("sqlExpression").and_then(Value::as_str) {
                    if object.get("aggregate").is_none() {
                        return Metric::sql(sql);
                    }
                }
                self.metrics
                    .from_expression(&format!("{}({})", aggregate, column_name), dataset)
            }
            _ => self.metrics.count_rows(dataset),
        }
    }

    fn default_row_limit(viz_type: VizType) -> u32 {
        if viz_type.family() == ChartFamily::Timeseries {
            return TIMESERIES_ROW_LIMIT;
        }
        viz_type
            .config()
            .and_then(|config| config.default_params.get("row_limit").and_then(Value::as_u64))
            .and_then(|limit| u32::try_from(limit).ok())
            .unwrap_or(QUERY_ROW_LIMIT)
    }

    /// Plans a chart of `viz_type` from nothing but its defaults. Required
    /// parameters are not enforced; used for payloads that carry no params.
    pub fn plan_defaults(
        &self,
        viz_type: VizType,
        slice_name: Option<String>,
        dataset: &Dataset,
        settings: &CompilerSettings,
    ) -> Result<ChartPlan> {
        let inputs = Inputs {
            viz_type,
            slice_name,
            metrics: Vec::new(),
            groupby: Vec::new(),
            time_axis: None,
            time_grain: None,
            columns: Vec::new(),
            row_limit: None,
            contribution_mode: None,
            query_mode: None,
            percent_metrics: None,
            timeseries_limit_metric: None,
            adhoc_filters: Vec::new(),
        };
        self.shape(inputs, dataset, settings)
    }

    fn normalize(
        &self,
        inputs: Inputs,
        dataset: &Dataset,
        settings: &CompilerSettings,
    ) -> Result<ChartPlan> {
        let plan = self.shape(inputs, dataset, settings)?;
        check_required_params(&plan)?;
        Ok(plan)
    }

    fn shape(
        &self,
        inputs: Inputs,
        dataset: &Dataset,
        settings: &CompilerSettings,
    ) -> Result<ChartPlan> {
        let row_limit = inputs
            .row_limit
            .or(settings.default_row_limit)
            .unwrap_or_else(|| Self::default_row_limit(inputs.viz_type));
        if row_limit == 0 || row_limit > MAX_ROW_LIMIT {
            return Err(ChartError::invalid_field(
                "row limit",
                row_limit.to_string(),
                format!("must be between 1 and {}", MAX_ROW_LIMIT),
            ));
        }

        let slice_name = inputs
            .slice_name
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("{} - {}", settings.slice_prefix, dataset.table_name));

        let mut plan = ChartPlan::new(inputs.viz_type, slice_name, row_limit);
        plan.adhoc_filters = inputs.adhoc_filters.clone();

        match inputs.viz_type.family() {
            ChartFamily::SingleMetric => self.normalize_single_metric(&mut plan, inputs, dataset),
            ChartFamily::Timeseries => self.normalize_timeseries(&mut plan, inputs, dataset)?,
            ChartFamily::Table => self.normalize_table(&mut plan, inputs, dataset),
            ChartFamily::Generic => self.normalize_generic(&mut plan, inputs, dataset),
        }

        tracing::debug!(
            "Planned {}: metrics={}, groupby={:?}, x_axis={:?}, row_limit={}",
            plan.viz_type,
            plan.metrics.len(),
            plan.groupby,
            plan.x_axis,
            plan.row_limit
        );
        Ok(plan)
    }

    fn normalize_single_metric(&self, plan: &mut ChartPlan, inputs: Inputs, dataset: &Dataset) {
        let mut metrics = inputs.metrics;
        if metrics.len() > 1 {
            plan.warn(format!(
                "{} shows a single metric, keeping {} and dropping {} more",
                plan.viz_type,
                metrics[0].label(),
                metrics.len() - 1
            ));
            metrics.truncate(1);
        }
        if metrics.is_empty() {
            metrics.push(self.metrics.count_rows(dataset));
        }
        plan.metrics = metrics;
        plan.groupby = inputs.groupby;

        let wants_time = inputs.time_axis.is_some() || inputs.time_grain.is_some();
        if plan.viz_type == VizType::BigNumber && wants_time {
            let x_axis = inputs
                .time_axis
                .or_else(|| dataset.time_column().map(|c| c.column_name.clone()));
            match x_axis {
                Some(x_axis) => {
                    plan.time_grain = Some(inputs.time_grain.unwrap_or(TimeGrain::Day));
                    plan.add_temporal_filter(&x_axis);
                    plan.x_axis = Some(x_axis);
                }
                None => plan.warn(format!(
                    "{} has no temporal column, big number shows a plain total",
                    dataset.table_name
                )),
            }
        } else if wants_time {
            plan.warn(format!("{} ignores the time axis and time grain", plan.viz_type));
        }
    }

    fn normalize_timeseries(
        &self,
        plan: &mut ChartPlan,
        inputs: Inputs,
        dataset: &Dataset,
    ) -> Result<()> {
        let x_axis = inputs
            .time_axis
            .or_else(|| dataset.time_column().map(|c| c.column_name.clone()))
            .or_else(|| dataset.first_column().map(|c| c.column_name.clone()))
            .ok_or_else(|| {
                ChartError::validation(format!("{} has no columns", dataset.table_name))
            })?;
        plan.time_grain = Some(inputs.time_grain.unwrap_or(TimeGrain::Week));

        plan.metrics = if inputs.metrics.is_empty() {
            let default = match dataset.first_numeric() {
                Some(numeric) => self.metrics.build(
                    Aggregate::Sum,
                    numeric,
                    format!("SUM({})", numeric.column_name),
                ),
                None => self.metrics.count_rows(dataset),
            };
            plan.warn(format!("No metric given, using {}", default.label()));
            vec![default]
        } else {
            inputs.metrics
        };

        plan.groupby = if inputs.groupby.is_empty() {
            match dataset.first_categorical(Some(&x_axis)) {
                Some(column) => {
                    plan.warn(format!(
                        "No series dimension given, grouping by {}",
                        column.column_name
                    ));
                    vec![column.column_name.clone()]
                }
                None => Vec::new(),
            }
        } else {
            inputs.groupby
        };

        plan.contribution_mode = match inputs.contribution_mode.as_deref() {
            None => None,
            Some(mode) => match mode.trim().to_lowercase().as_str() {
                "column" => Some(ContributionMode::Column),
                "row" => Some(ContributionMode::Row),
                other => {
                    plan.warn(format!(
                        "Invalid contribution mode '{}', correcting to 'column'",
                        other
                    ));
                    Some(ContributionMode::Column)
                }
            },
        };

        // A temporal filter that targets another column follows the axis.
        if let Some(existing) = plan.adhoc_filters.iter_mut().find(|f| f.is_temporal()) {
            existing.subject = x_axis.clone();
        }
        plan.add_temporal_filter(&x_axis);
        plan.x_axis = Some(x_axis);
        Ok(())
    }

    fn normalize_table(&self, plan: &mut ChartPlan, inputs: Inputs, dataset: &Dataset) {
        let raw = match inputs.query_mode {
            Some(mode) => mode == QueryMode::Raw,
            None => {
                !inputs.columns.is_empty()
                    || (inputs.metrics.is_empty() && inputs.groupby.is_empty())
            }
        };

        plan.time_grain = inputs.time_grain;

        if raw {
            plan.query_mode = QueryMode::Raw;
            if !inputs.metrics.is_empty() || !inputs.groupby.is_empty() {
                plan.warn("Raw table ignores metrics and groupby".to_string());
            }
            plan.columns = if inputs.columns.is_empty() {
                dataset
                    .columns
                    .iter()
                    .take(RAW_MODE_DEFAULT_COLUMNS)
                    .map(|c| c.column_name.clone())
                    .collect()
            } else {
                inputs.columns
            };
            return;
        }

        plan.query_mode = QueryMode::Aggregate;
        plan.groupby = inputs.groupby;
        plan.metrics = inputs.metrics;
        plan.percent_metrics = inputs
            .percent_metrics
            .unwrap_or_else(|| plan.metrics.clone());
        plan.timeseries_limit_metric = inputs
            .timeseries_limit_metric
            .or_else(|| plan.metrics.first().cloned());
        plan.temporal_lookup = inputs
            .time_axis
            .or_else(|| dataset.time_column().map(|c| c.column_name.clone()));
    }

    fn normalize_generic(&self, plan: &mut ChartPlan, inputs: Inputs, dataset: &Dataset) {
        plan.metrics = if inputs.metrics.is_empty() {
            vec![self.metrics.count_rows(dataset)]
        } else {
            inputs.metrics
        };
        plan.groupby = inputs.groupby;
        plan.time_grain = inputs.time_grain;
        if let Some(x_axis) = inputs.time_axis {
            plan.add_temporal_filter(&x_axis);
            plan.x_axis = Some(x_axis);
        }
    }
}

fn check_required_params(plan: &ChartPlan) -> Result<()> {
    let Some(config) = plan.viz_type.config() else {
        return Ok(());
    };
    for param in config.required_params {
        let satisfied = match *param {
            "groupby" => plan.query_mode == QueryMode::Raw || !plan.groupby.is_empty(),
            "metric" | "metrics" => !plan.metrics.is_empty(),
            "x_axis" => plan.x_axis.is_some(),
            _ => true,
        };
        if !satisfied {
            let hint = match *param {
                "groupby" => "dengan dimension groupby",
                "x_axis" => "dengan time axis column",
                _ => "dengan metrics",
            };
            return Err(ChartError::validation(format!(
                "{} requires '{}' (add a '{}' line)",
                plan.viz_type, param, hint
            )));
        }
    }
    Ok(())
}
