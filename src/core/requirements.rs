use serde::Serialize;

use crate::core::catalog::{Column, Dataset};
use crate::core::chart_types::VizType;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParamSuggestions {
    pub groupby: Vec<String>,
    pub metric: Vec<String>,
    pub metrics: Vec<String>,
    pub x_axis: Vec<String>,
}

/// Whether a chart type can be built on a dataset, and which columns fit
/// each of its parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequirementReport {
    pub chart_type: String,
    pub dataset: String,
    pub valid: bool,
    pub required_params: Vec<String>,
    pub suggestions: ParamSuggestions,
    pub message: String,
}

fn names<'a>(columns: impl Iterator<Item = &'a Column>) -> Vec<String> {
    columns.map(|c| c.column_name.clone()).collect()
}

pub fn check_requirements(viz_type: &str, dataset: &Dataset) -> RequirementReport {
    let mut report = RequirementReport {
        chart_type: viz_type.to_string(),
        dataset: dataset.table_name.clone(),
        valid: false,
        required_params: Vec::new(),
        suggestions: ParamSuggestions::default(),
        message: format!("Chart type {} not supported", viz_type),
    };
    let Some(config) = viz_type.parse::<VizType>().ok().and_then(|viz| viz.config()) else {
        return report;
    };

    let categorical = names(dataset.columns.iter().filter(|c| c.is_categorical()));
    let numeric = names(dataset.columns.iter().filter(|c| c.is_numeric()));
    let mut missing = Vec::new();
    for param in config.required_params {
        report.required_params.push(param.to_string());
        let candidates = match *param {
            "groupby" => {
                report.suggestions.groupby = categorical.clone();
                &report.suggestions.groupby
            }
            "metric" => {
                report.suggestions.metric = numeric.clone();
                &report.suggestions.metric
            }
            "metrics" => {
                report.suggestions.metrics = numeric.clone();
                &report.suggestions.metrics
            }
            "x_axis" => {
                report.suggestions.x_axis = names(dataset.columns.iter());
                &report.suggestions.x_axis
            }
            _ => continue,
        };
        // COUNT(*) needs no numeric column.
        if candidates.is_empty() && *param == "groupby" {
            missing.push(param.to_string());
        }
    }

    report.valid = missing.is_empty();
    report.message = if report.valid {
        format!(
            "{} can be built on {}",
            config.viz_type, dataset.table_name
        )
    } else {
        format!(
            "{} has no columns suitable for: {}",
            dataset.table_name,
            missing.join(", ")
        )
    };
    report
}
