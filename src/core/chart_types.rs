//! Registry of the Superset visualization types the compiler knows about,
//! their default form data and the keyword table used to map informal chart
//! names ("lingkaran", "tren", "angka besar") onto them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::{ChartError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VizType {
    EchartsTimeseriesBar,
    BigNumber,
    BigNumberTotal,
    EchartsFunnel,
    EchartsGauge,
    Pie,
    PivotTableV2,
    Table,
    EchartsTreemap,
    MixedTimeseries,
    EchartsTimeseriesArea,
    EchartsTimeseriesLine,
    EchartsTimeseriesScatter,
    EchartsTimeseriesSmooth,
    EchartsTimeseriesStep,
    EchartsGraph,
    EchartsRadar,
    EchartsSankey,
    EchartsTree,
}

pub const ALL_VIZ_TYPES: [VizType; 19] = [
    VizType::EchartsTimeseriesBar,
    VizType::BigNumber,
    VizType::BigNumberTotal,
    VizType::EchartsFunnel,
    VizType::EchartsGauge,
    VizType::Pie,
    VizType::PivotTableV2,
    VizType::Table,
    VizType::EchartsTreemap,
    VizType::MixedTimeseries,
    VizType::EchartsTimeseriesArea,
    VizType::EchartsTimeseriesLine,
    VizType::EchartsTimeseriesScatter,
    VizType::EchartsTimeseriesSmooth,
    VizType::EchartsTimeseriesStep,
    VizType::EchartsGraph,
    VizType::EchartsRadar,
    VizType::EchartsSankey,
    VizType::EchartsTree,
];

impl VizType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VizType::EchartsTimeseriesBar => "echarts_timeseries_bar",
            VizType::BigNumber => "big_number",
            VizType::BigNumberTotal => "big_number_total",
            VizType::EchartsFunnel => "echarts_funnel",
            VizType::EchartsGauge => "echarts_gauge",
            VizType::Pie => "pie",
            VizType::PivotTableV2 => "pivot_table_v2",
            VizType::Table => "table",
            VizType::EchartsTreemap => "echarts_treemap",
            VizType::MixedTimeseries => "mixed_timeseries",
            VizType::EchartsTimeseriesArea => "echarts_timeseries_area",
            VizType::EchartsTimeseriesLine => "echarts_timeseries_line",
            VizType::EchartsTimeseriesScatter => "echarts_timeseries_scatter",
            VizType::EchartsTimeseriesSmooth => "echarts_timeseries_smooth",
            VizType::EchartsTimeseriesStep => "echarts_timeseries_step",
            VizType::EchartsGraph => "echarts_graph",
            VizType::EchartsRadar => "echarts_radar",
            VizType::EchartsSankey => "echarts_sankey",
            VizType::EchartsTree => "echarts_tree",
        }
    }

    pub fn family(&self) -> ChartFamily {
        match self {
            VizType::Pie | VizType::EchartsFunnel | VizType::BigNumber | VizType::BigNumberTotal => {
                ChartFamily::SingleMetric
            }
            VizType::EchartsTimeseriesLine
            | VizType::EchartsTimeseriesBar
            | VizType::EchartsTimeseriesArea => ChartFamily::Timeseries,
            VizType::Table => ChartFamily::Table,
            _ => ChartFamily::Generic,
        }
    }

    pub fn config(&self) -> Option<ChartTypeConfig> {
        chart_config(*self)
    }
}

impl fmt::Display for VizType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VizType {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        ALL_VIZ_TYPES
            .iter()
            .copied()
            .find(|viz| viz.as_str() == wanted)
            .ok_or_else(|| ChartError::invalid_field("viz_type", s, "not a known Superset viz type"))
    }
}

/// How the normalizer and the query builder treat a viz type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartFamily {
    /// Form data carries a singular `metric`.
    SingleMetric,
    Timeseries,
    Table,
    Generic,
}

#[derive(Debug, Clone)]
pub struct ChartTypeConfig {
    pub viz_type: VizType,
    pub required_params: &'static [&'static str],
    pub default_params: Map<String, Value>,
    pub description: &'static str,
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn timeseries_config(viz_type: VizType, description: &'static str) -> ChartTypeConfig {
    let mut defaults = object(json!({
        "adhoc_filters": [],
        "datasource": "",
        "granularity_sqla": "",
        "x_axis": "",
        "metrics": [],
        "row_limit": 10000,
        "sort_by": "",
        "x_axis_sort_asc": true,
        "y_axis_format": "",
        "show_legend": true,
        "rich_tooltip": true,
        "show_controls": true
    }));
    if viz_type == VizType::EchartsTimeseriesLine {
        defaults.insert("line_interpolation".to_string(), json!("linear"));
    }
    ChartTypeConfig {
        viz_type,
        required_params: &["x_axis", "metrics"],
        default_params: defaults,
        description,
    }
}

fn big_number_config(viz_type: VizType, description: &'static str) -> ChartTypeConfig {
    ChartTypeConfig {
        viz_type,
        required_params: &["metrics"],
        default_params: object(json!({
            "adhoc_filters": [],
            "datasource": "",
            "granularity_sqla": "",
            "metrics": ["count(*)"],
            "subheader": "",
            "y_axis_format": "",
            "force_categorical": false
        })),
        description,
    }
}

/// Default form data for the viz types the compiler fully configures.
pub fn chart_config(viz_type: VizType) -> Option<ChartTypeConfig> {
    let config = match viz_type {
        VizType::Pie => ChartTypeConfig {
            viz_type,
            required_params: &["groupby", "metric"],
            default_params: object(json!({
                "adhoc_filters": [],
                "color_scheme": "d3Category20c",
                "datasource": "",
                "granularity_sqla": "",
                "groupby": [],
                "innerRadius": 30,
                "metric": "count(*)",
                "outerRadius": 300,
                "row_limit": 50,
                "show_labels": true,
                "show_legend": true,
                "show_values": true,
                "sort_by_metric": true
            })),
            description: "Chart lingkaran untuk menampilkan proporsi data kategorik",
        },
        VizType::Table => ChartTypeConfig {
            viz_type,
            required_params: &["groupby"],
            default_params: object(json!({
                "adhoc_filters": [],
                "all_columns": [],
                "datasource": "",
                "granularity_sqla": "",
                "groupby": [],
                "metrics": [],
                "order_by_cols": [],
                "row_limit": 1000,
                "show_totals": true,
                "table_timestamp_format": "%Y-%m-%d %H:%M:%S"
            })),
            description: "Tabel untuk menampilkan data dalam format tabular",
        },
        VizType::EchartsTimeseriesBar => {
            timeseries_config(viz_type, "Bar chart berbasis waktu menggunakan ECharts")
        }
        VizType::EchartsTimeseriesLine => {
            timeseries_config(viz_type, "Line chart berbasis waktu menggunakan ECharts")
        }
        VizType::BigNumber => {
            big_number_config(viz_type, "Menampilkan satu angka besar sebagai KPI")
        }
        VizType::BigNumberTotal => {
            big_number_config(viz_type, "Menampilkan total agregat sebagai angka besar")
        }
        VizType::EchartsFunnel => ChartTypeConfig {
            viz_type,
            required_params: &["groupby", "metrics"],
            default_params: object(json!({
                "adhoc_filters": [],
                "datasource": "",
                "granularity_sqla": "",
                "groupby": [],
                "metrics": ["count(*)"],
                "row_limit": 50,
                "sort_by_metric": true,
                "label_type": "key_value"
            })),
            description: "Funnel chart untuk menampilkan alur konversi",
        },
        _ => return None,
    };
    Some(config)
}

pub const CONFIGURED_VIZ_TYPES: [VizType; 7] = [
    VizType::Pie,
    VizType::Table,
    VizType::EchartsTimeseriesBar,
    VizType::EchartsTimeseriesLine,
    VizType::BigNumber,
    VizType::BigNumberTotal,
    VizType::EchartsFunnel,
];

/// Defaults merged underneath explicit values for timeseries charts.
pub fn timeseries_defaults() -> Map<String, Value> {
    object(json!({
        "x_axis_sort_asc": true,
        "x_axis_sort_series": "name",
        "x_axis_sort_series_ascending": true,
        "order_desc": true,
        "row_limit": 1000,
        "truncate_metric": true,
        "show_empty_columns": true,
        "comparison_type": "values",
        "contributionMode": "column",
        "annotation_layers": [],
        "forecastPeriods": 10,
        "forecastInterval": 0.8,
        "x_axis_title_margin": 15,
        "y_axis_title_margin": 30,
        "y_axis_title_position": "Left",
        "sort_series_type": "sum",
        "color_scheme": "bnbColors",
        "time_shift_color": true,
        "seriesType": "line",
        "only_total": true,
        "opacity": 0.2,
        "markerSize": 6,
        "show_legend": true,
        "legendType": "scroll",
        "legendOrientation": "top",
        "x_axis_time_format": "smart_date",
        "rich_tooltip": true,
        "showTooltipTotal": true,
        "tooltipTimeFormat": "smart_date",
        "y_axis_format": ",.2f",
        "truncateXAxis": true,
        "y_axis_bounds": [null, null]
    }))
}

pub const CHART_TYPE_KEYWORDS: &[(VizType, &[&str])] = &[
    (VizType::Pie, &["pie", "lingkaran", "proporsi", "persentase", "bagian"]),
    (VizType::Table, &["table", "tabel", "list", "daftar", "data mentah"]),
    (
        VizType::EchartsTimeseriesBar,
        &["bar", "batang", "kolom", "histogram", "waktu"],
    ),
    (
        VizType::EchartsTimeseriesLine,
        &["line", "garis", "trend", "tren", "perkembangan"],
    ),
    (
        VizType::BigNumber,
        &["big number", "angka besar", "kpi", "total", "jumlah"],
    ),
    (VizType::EchartsFunnel, &["funnel", "corong", "konversi", "alur"]),
    (
        VizType::EchartsGauge,
        &["gauge", "speedometer", "meter", "indikator"],
    ),
    (
        VizType::PivotTableV2,
        &["pivot", "cross tab", "tabulasi silang"],
    ),
    (VizType::EchartsTreemap, &["treemap", "hierarchy", "hierarki"]),
    (VizType::EchartsRadar, &["radar", "spider", "laba-laba"]),
];

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        let boundary = |c: Option<char>| c.map_or(true, |c| !c.is_alphanumeric());
        boundary(before) && boundary(after)
    })
}

/// Maps an informal chart name to a viz type.
///
/// An exact viz type name wins. Otherwise the longest keyword found as a
/// whole word wins, so "big number" is not read as "bar" or "number".
pub fn detect_viz_type(text: &str) -> Option<VizType> {
    let normalized = text.trim().to_lowercase();
    if let Ok(viz) = normalized.parse::<VizType>() {
        return Some(viz);
    }
    let spaced = normalized.replace('_', " ");

    let mut best: Option<(VizType, usize)> = None;
    for (viz, keywords) in CHART_TYPE_KEYWORDS {
        for keyword in keywords.iter() {
            if contains_word(&spaced, keyword) && best.map_or(true, |(_, len)| keyword.len() > len) {
                best = Some((*viz, keyword.len()));
            }
        }
    }
    best.map(|(viz, _)| viz)
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartTypeInfo {
    #[serde(rename = "type")]
    pub viz_type: VizType,
    pub description: String,
    pub required_params: Vec<String>,
}

pub fn supported_chart_types() -> Vec<ChartTypeInfo> {
    CONFIGURED_VIZ_TYPES
        .iter()
        .filter_map(|viz| chart_config(*viz))
        .map(|config| ChartTypeInfo {
            viz_type: config.viz_type,
            description: config.description.to_string(),
            required_params: config
                .required_params
                .iter()
                .map(|p| p.to_string())
                .collect(),
        })
        .collect()
}
