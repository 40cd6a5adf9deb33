//! Renders a [`ChartPlan`] into Superset form data (`params`).

use serde_json::{json, Map, Value};

use crate::core::catalog::Dataset;
use crate::core::chart_types::{timeseries_defaults, ChartFamily};
use crate::core::metric::Metric;
use crate::core::validator::ChartPlan;
use crate::domain::model::QueryMode;
use crate::utils::error::Result;

/// Keys older clients send that the current form data no longer uses.
const OBSOLETE_KEYS: [&str; 3] = ["series", "x_axis_object", "y_axis"];

pub fn datasource_key(dataset: &Dataset) -> String {
    format!("{}__table", dataset.id)
}

fn metrics_value(metrics: &[Metric]) -> Result<Value> {
    Ok(serde_json::to_value(metrics)?)
}

pub fn render_params(plan: &ChartPlan, dataset: &Dataset) -> Result<Map<String, Value>> {
    let mut params = plan
        .viz_type
        .config()
        .map(|config| config.default_params)
        .unwrap_or_default();
    if plan.family() == ChartFamily::Timeseries {
        params.extend(timeseries_defaults());
    }

    params.insert("datasource".into(), json!(datasource_key(dataset)));
    params.insert("viz_type".into(), json!(plan.viz_type.as_str()));
    params.insert("slice_name".into(), json!(plan.slice_name));
    params.insert("row_limit".into(), json!(plan.row_limit));
    params.insert("adhoc_filters".into(), serde_json::to_value(&plan.adhoc_filters)?);

    match plan.family() {
        ChartFamily::SingleMetric => {
            params.remove("metrics");
            if let Some(metric) = plan.primary_metric() {
                params.insert("metric".into(), serde_json::to_value(metric)?);
            }
            params.insert("groupby".into(), json!(plan.groupby));
            if let (Some(x_axis), Some(grain)) = (&plan.x_axis, plan.time_grain) {
                params.insert("x_axis".into(), json!(x_axis));
                params.insert("time_grain_sqla".into(), json!(grain.iso_duration()));
            }
        }
        ChartFamily::Timeseries => {
            params.insert("metrics".into(), metrics_value(&plan.metrics)?);
            params.insert("groupby".into(), json!(plan.groupby));
            if let Some(x_axis) = &plan.x_axis {
                params.insert("x_axis".into(), json!(x_axis));
            }
            if let Some(grain) = plan.time_grain {
                params.insert("time_grain_sqla".into(), json!(grain.iso_duration()));
            }
            if let Some(mode) = plan.contribution_mode {
                params.insert("contributionMode".into(), json!(mode.as_str()));
            }
        }
        ChartFamily::Table => match plan.query_mode {
            QueryMode::Aggregate => {
                params.insert("query_mode".into(), json!("aggregate"));
                params.insert("groupby".into(), json!(plan.groupby));
                params.insert("metrics".into(), metrics_value(&plan.metrics)?);
                params.insert(
                    "percent_metrics".into(),
                    metrics_value(&plan.percent_metrics)?,
                );
                params.insert(
                    "timeseries_limit_metric".into(),
                    serde_json::to_value(&plan.timeseries_limit_metric)?,
                );
                let mut lookup = Map::new();
                if let Some(column) = &plan.temporal_lookup {
                    lookup.insert(column.clone(), json!(true));
                }
                params.insert("temporal_columns_lookup".into(), Value::Object(lookup));
                params.insert("all_columns".into(), json!([]));
                if let Some(grain) = plan.time_grain {
                    params.insert("time_grain_sqla".into(), json!(grain.iso_duration()));
                }
            }
            QueryMode::Raw => {
                params.insert("query_mode".into(), json!("raw"));
                params.insert("groupby".into(), json!([]));
                params.insert("metrics".into(), json!([]));
                params.insert("columns".into(), json!(plan.columns));
                params.insert("all_columns".into(), json!(plan.columns));
            }
        },
        ChartFamily::Generic => {
            params.insert("metrics".into(), metrics_value(&plan.metrics)?);
            params.insert("groupby".into(), json!(plan.groupby));
            if let Some(x_axis) = &plan.x_axis {
                params.insert("x_axis".into(), json!(x_axis));
            }
            if let Some(grain) = plan.time_grain {
                params.insert("time_grain_sqla".into(), json!(grain.iso_duration()));
            }
        }
    }

    for key in OBSOLETE_KEYS {
        params.remove(key);
    }
    Ok(params)
}

/// Keys the plan always decides. Everything else in supplied form data
/// (colors, labels, formatting) is kept as the author wrote it.
const PLAN_KEYS: [&str; 16] = [
    "datasource",
    "viz_type",
    "slice_name",
    "row_limit",
    "adhoc_filters",
    "metric",
    "metrics",
    "groupby",
    "x_axis",
    "time_grain_sqla",
    "contributionMode",
    "query_mode",
    "percent_metrics",
    "timeseries_limit_metric",
    "columns",
    "all_columns",
];

/// Re-renders externally supplied form data on top of its plan.
pub fn merge_params(
    plan: &ChartPlan,
    dataset: &Dataset,
    supplied: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let mut params = render_params(plan, dataset)?;
    for (key, value) in supplied {
        if PLAN_KEYS.contains(&key.as_str()) || OBSOLETE_KEYS.contains(&key.as_str()) {
            continue;
        }
        params.insert(key.clone(), value.clone());
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::Catalog;
    use crate::core::chart_types::VizType;
    use crate::core::compiler::CompilerSettings;
    use crate::core::validator::ChartValidator;
    use crate::domain::model::{Aggregate, ChartRequest, MetricSpec, TimeGrain};

    fn render(request: &ChartRequest) -> Map<String, Value> {
        let catalog = Catalog::builtin().unwrap();
        let dataset = catalog.resolve(&request.dataset).unwrap();
        let plan = ChartValidator::new()
            .plan(request, dataset, &CompilerSettings::default())
            .unwrap();
        render_params(&plan, dataset).unwrap()
    }

    #[test]
    fn test_pie_params_carry_singular_metric() {
        let mut request = ChartRequest::new(VizType::Pie, "saving account");
        request.groupby = vec!["product_name".to_string()];
        request.metrics = vec![MetricSpec::new(Aggregate::Sum, "balance")];
        let params = render(&request);

        assert_eq!(params["datasource"], json!("11__table"));
        assert_eq!(params["viz_type"], json!("pie"));
        assert_eq!(params["metric"]["label"], json!("SUM(balance)"));
        assert!(!params.contains_key("metrics"));
        assert_eq!(params["groupby"], json!(["product_name"]));
        assert_eq!(params["color_scheme"], json!("d3Category20c"));
        assert_eq!(params["row_limit"], json!(50));
    }

    #[test]
    fn test_timeseries_params_merge_defaults_under_plan() {
        let mut request = ChartRequest::new(VizType::EchartsTimeseriesLine, "loan order");
        request.time_grain = Some(TimeGrain::Month);
        request.groupby = vec!["branch_name".to_string()];
        request.row_limit = Some(500);
        let params = render(&request);

        assert_eq!(params["x_axis"], json!("order_date"));
        assert_eq!(params["time_grain_sqla"], json!("P1M"));
        assert_eq!(params["row_limit"], json!(500));
        assert_eq!(params["contributionMode"], json!("column"));
        assert_eq!(params["line_interpolation"], json!("linear"));
        assert_eq!(params["y_axis_format"], json!(",.2f"));
        assert_eq!(params["adhoc_filters"][0]["operator"], json!("TEMPORAL_RANGE"));
        assert_eq!(params["adhoc_filters"][0]["subject"], json!("order_date"));
        assert_eq!(params["adhoc_filters"][0]["expressionType"], json!("SIMPLE"));
        assert_eq!(params["metrics"][0]["label"], json!("SUM(plafond)"));
    }

    #[test]
    fn test_table_params_by_mode() {
        let mut aggregate = ChartRequest::new(VizType::Table, "collateral");
        aggregate.groupby = vec!["collateral_type".to_string()];
        aggregate.metrics = vec![MetricSpec::new(Aggregate::Avg, "market_value")];
        let params = render(&aggregate);
        assert_eq!(params["query_mode"], json!("aggregate"));
        assert_eq!(params["percent_metrics"][0]["label"], json!("AVG(market_value)"));
        assert_eq!(params["timeseries_limit_metric"]["label"], json!("AVG(market_value)"));
        assert_eq!(params["temporal_columns_lookup"], json!({"appraisal_date": true}));

        let mut raw = ChartRequest::new(VizType::Table, "collateral");
        raw.columns = vec!["collateral_no".to_string(), "appraisal_value".to_string()];
        let params = render(&raw);
        assert_eq!(params["query_mode"], json!("raw"));
        assert_eq!(params["all_columns"], json!(["collateral_no", "appraisal_value"]));
        assert_eq!(params["metrics"], json!([]));
    }

    #[test]
    fn test_merge_params_keeps_presentation_keys() {
        let catalog = Catalog::builtin().unwrap();
        let dataset = catalog.resolve("saving account").unwrap();
        let supplied = json!({
            "groupby": ["branch_name"],
            "metrics": ["sum(balance)"],
            "color_scheme": "supersetColors",
            "show_labels": false,
            "series": "branch_name"
        });
        let supplied = supplied.as_object().unwrap();
        let plan = ChartValidator::new()
            .plan_from_params(
                VizType::Pie,
                None,
                supplied,
                dataset,
                &CompilerSettings::default(),
            )
            .unwrap();
        let params = merge_params(&plan, dataset, supplied).unwrap();
        assert_eq!(params["color_scheme"], json!("supersetColors"));
        assert_eq!(params["show_labels"], json!(false));
        assert_eq!(params["metric"]["label"], json!("SUM(balance)"));
        assert!(!params.contains_key("metrics"));
        assert!(!params.contains_key("series"));
    }
}
