use serde_json::{json, Map, Value};
use url::Url;

use crate::core::catalog::{Catalog, Dataset};
use crate::core::chart_types::VizType;
use crate::core::form_data::{datasource_key, merge_params, render_params};
use crate::core::prompt::{parse_prompt, parse_prompt_document};
use crate::core::query_context::{build_query_context, QueryContext};
use crate::core::validator::{ChartPlan, ChartValidator};
use crate::domain::model::{ChartPayload, ChartRequest, CompiledChart};
use crate::utils::error::{ChartError, Result};

pub const DEFAULT_SLICE_PREFIX: &str = "Generated Chart";

#[derive(Debug, Clone)]
pub struct CompilerSettings {
    /// Row limit used when a prompt gives none. Chart defaults apply otherwise.
    pub default_row_limit: Option<u32>,
    pub slice_prefix: String,
    /// When set, compiled charts carry an explore link into this instance.
    pub superset_base_url: Option<String>,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            default_row_limit: None,
            slice_prefix: DEFAULT_SLICE_PREFIX.to_string(),
            superset_base_url: None,
        }
    }
}

/// Turns chart prompts into chart-create payloads against a dataset catalog.
#[derive(Debug, Clone)]
pub struct ChartCompiler {
    catalog: Catalog,
    settings: CompilerSettings,
    validator: ChartValidator,
}

impl ChartCompiler {
    pub fn new(catalog: Catalog, settings: CompilerSettings) -> Self {
        Self {
            catalog,
            settings,
            validator: ChartValidator::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    pub fn compile(&self, request: &ChartRequest) -> Result<CompiledChart> {
        let dataset = self.catalog.resolve(&request.dataset)?;
        let plan = self.validator.plan(request, dataset, &self.settings)?;
        let params = render_params(&plan, dataset)?;
        let chart = self.assemble(&plan, dataset, params)?;
        tracing::info!(
            "📊 Compiled '{}' ({}) on {}",
            chart.payload.slice_name,
            chart.payload.viz_type,
            dataset.table_name
        );
        Ok(chart)
    }

    pub fn compile_prompt(&self, text: &str) -> Result<CompiledChart> {
        let request = parse_prompt(text)?;
        self.compile(&request)
    }

    /// Compiles every prompt of a document. One failing prompt does not stop
    /// the others.
    pub fn compile_document(&self, text: &str) -> Vec<Result<CompiledChart>> {
        parse_prompt_document(text)
            .into_iter()
            .map(|request| request.and_then(|request| self.compile(&request)))
            .collect()
    }

    fn assemble(
        &self,
        plan: &ChartPlan,
        dataset: &Dataset,
        params: Map<String, Value>,
    ) -> Result<CompiledChart> {
        let query_context = build_query_context(plan, dataset);
        let payload = ChartPayload {
            viz_type: plan.viz_type,
            slice_name: plan.slice_name.clone(),
            datasource_id: dataset.id,
            datasource_type: "table".to_string(),
            params: serde_json::to_string(&params)?,
            query_context: query_context.to_json_string()?,
        };
        Ok(CompiledChart {
            explore_url: self.explore_url(&payload)?,
            payload,
            dataset: dataset.table_name.clone(),
            warnings: plan.warnings.clone(),
        })
    }

    fn explore_url(&self, payload: &ChartPayload) -> Result<Option<String>> {
        let Some(base) = self.settings.superset_base_url.as_deref() else {
            return Ok(None);
        };
        let mut url = Url::parse(base)
            .and_then(|base| base.join("explore/"))
            .map_err(|e| ChartError::InvalidConfigValueError {
                field: "superset.base_url".to_string(),
                value: base.to_string(),
                reason: e.to_string(),
            })?;
        url.query_pairs_mut()
            .append_pair("datasource_type", &payload.datasource_type)
            .append_pair("datasource_id", &payload.datasource_id.to_string())
            .append_pair("viz_type", payload.viz_type.as_str());
        Ok(Some(url.to_string()))
    }

    /// Repairs a loosely formed chart payload so the BI platform accepts it.
    /// Never fails: anything that cannot be repaired becomes a minimal table
    /// chart on the dataset.
    pub fn sanitize_payload(&self, raw: &Value, dataset: &Dataset) -> CompiledChart {
        match self.try_sanitize(raw, dataset) {
            Ok(chart) => chart,
            Err(e) => {
                tracing::warn!("⚠️ Payload could not be repaired, using minimal table: {}", e);
                self.minimal_chart(dataset, e.to_string())
            }
        }
    }

    fn try_sanitize(&self, raw: &Value, dataset: &Dataset) -> Result<CompiledChart> {
        let object = raw
            .as_object()
            .ok_or_else(|| ChartError::validation("payload must be a JSON object"))?;
        let mut warnings = Vec::new();

        for key in ["dataset_id", "table_name"] {
            if object.contains_key(key) {
                warnings.push(format!("Removed unsupported field '{}'", key));
            }
        }

        if let Some(supplied_id) = object.get("datasource_id").and_then(Value::as_i64) {
            if supplied_id != dataset.id {
                warnings.push(format!(
                    "datasource_id {} replaced with {} ({})",
                    supplied_id, dataset.id, dataset.table_name
                ));
            }
        }

        let viz_type = match object.get("viz_type").and_then(Value::as_str) {
            Some(name) => match name.parse::<VizType>() {
                Ok(viz_type) => viz_type,
                Err(_) => {
                    warnings.push(format!("Unknown viz_type '{}', falling back to table", name));
                    VizType::Table
                }
            },
            None => {
                warnings.push("Missing viz_type, falling back to table".to_string());
                VizType::Table
            }
        };

        let slice_name = object
            .get("slice_name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string);

        let supplied = match object.get("params") {
            Some(Value::Object(params)) => Some(params.clone()),
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text)? {
                Value::Object(params) => Some(params),
                _ => return Err(ChartError::validation("params must encode a JSON object")),
            },
            _ => None,
        };

        let (plan, params) = match supplied {
            Some(supplied) => {
                let plan = self.validator.plan_from_params(
                    viz_type,
                    slice_name,
                    &supplied,
                    dataset,
                    &self.settings,
                )?;
                let params = merge_params(&plan, dataset, &supplied)?;
                (plan, params)
            }
            None => {
                warnings.push(format!("Missing params, using {} defaults", viz_type));
                let plan =
                    self.validator
                        .plan_defaults(viz_type, slice_name, dataset, &self.settings)?;
                let params = render_params(&plan, dataset)?;
                (plan, params)
            }
        };
        warnings.extend(plan.warnings.iter().cloned());

        let query_context = match object.get("query_context") {
            Some(Value::String(text)) if serde_json::from_str::<Value>(text).is_ok() => text.clone(),
            Some(Value::String(_)) => {
                warnings.push("query_context is not valid JSON, regenerated".to_string());
                build_query_context(&plan, dataset).to_json_string()?
            }
            Some(value @ Value::Object(_)) => serde_json::to_string(value)?,
            _ => build_query_context(&plan, dataset).to_json_string()?,
        };

        let payload = ChartPayload {
            viz_type,
            slice_name: plan.slice_name.clone(),
            datasource_id: dataset.id,
            datasource_type: object
                .get("datasource_type")
                .and_then(Value::as_str)
                .unwrap_or("table")
                .to_string(),
            params: serde_json::to_string(&params)?,
            query_context,
        };
        Ok(CompiledChart {
            explore_url: self.explore_url(&payload)?,
            payload,
            dataset: dataset.table_name.clone(),
            warnings,
        })
    }

    fn minimal_chart(&self, dataset: &Dataset, reason: String) -> CompiledChart {
        let params = json!({
            "datasource": datasource_key(dataset),
            "viz_type": VizType::Table.as_str(),
        });
        let query_context = QueryContext::minimal(dataset.id);
        CompiledChart {
            payload: ChartPayload {
                viz_type: VizType::Table,
                slice_name: format!("{} - {}", self.settings.slice_prefix, dataset.table_name),
                datasource_id: dataset.id,
                datasource_type: "table".to_string(),
                params: params.to_string(),
                query_context: serde_json::to_string(&query_context).unwrap_or_default(),
            },
            dataset: dataset.table_name.clone(),
            warnings: vec![reason],
            explore_url: None,
        }
    }
}
