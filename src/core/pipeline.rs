use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;

use crate::core::bundle::{BundleExporter, ExportResult};
use crate::core::compiler::ChartCompiler;
use crate::core::{ConfigProvider, Pipeline, Storage};
use crate::domain::model::{CompileResult, CompiledChart, PromptFailure, PromptSource};
use crate::utils::error::{ChartError, Result};
use crate::utils::validation::validate_file_extensions;

pub const PROMPT_EXTENSIONS: [&str; 2] = ["md", "txt"];
pub const EXPORT_TIMEOUT: Duration = Duration::from_secs(30);
pub const REPORT_FILE: &str = "compile_report.json";

#[derive(Debug, Serialize)]
struct ChartEntry<'a> {
    file: String,
    slice_name: &'a str,
    viz_type: &'a str,
    dataset: &'a str,
    warnings: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    explore_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CompileReport<'a> {
    generated_at: String,
    compiled: usize,
    failed: usize,
    charts: Vec<ChartEntry<'a>>,
    failures: &'a [PromptFailure],
    #[serde(skip_serializing_if = "Option::is_none")]
    bundle: Option<ExportResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bundle_error: Option<String>,
}

/// Compiles prompt documents read through storage and writes one payload
/// file per chart plus a run report.
pub struct PromptPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    compiler: ChartCompiler,
    exporter: Option<BundleExporter>,
}

impl<S: Storage, C: ConfigProvider> PromptPipeline<S, C> {
    pub fn new(storage: S, config: C, compiler: ChartCompiler) -> Self {
        Self {
            storage,
            config,
            compiler,
            exporter: None,
        }
    }

    pub fn with_exporter(mut self, exporter: BundleExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn compiler(&self) -> &ChartCompiler {
        &self.compiler
    }

    /// Runs the export on the blocking pool. Failures and timeouts are
    /// reported, never propagated.
    async fn export_bundle(
        &self,
        charts: &[CompiledChart],
    ) -> (Option<ExportResult>, Option<String>) {
        let (Some(exporter), Some(name)) = (self.exporter.clone(), self.config.bundle_name())
        else {
            return (None, None);
        };
        let name = name.to_string();
        let charts = charts.to_vec();
        let task = tokio::task::spawn_blocking(move || exporter.export(&name, &charts));

        match tokio::time::timeout(EXPORT_TIMEOUT, task).await {
            Ok(Ok(Ok(result))) => (Some(result), None),
            Ok(Ok(Err(e))) => {
                tracing::warn!("⚠️ Bundle export failed: {}", e);
                (None, Some(e.to_string()))
            }
            Ok(Err(e)) => {
                tracing::warn!("⚠️ Bundle export task failed: {}", e);
                (None, Some(e.to_string()))
            }
            Err(_) => {
                tracing::warn!("⚠️ Bundle export timed out after {:?}", EXPORT_TIMEOUT);
                (None, Some(format!("timed out after {:?}", EXPORT_TIMEOUT)))
            }
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for PromptPipeline<S, C> {
    async fn extract(&self) -> Result<Vec<PromptSource>> {
        let inputs = self.config.inputs();
        if inputs.is_empty() {
            return Err(ChartError::MissingConfigError {
                field: "inputs".to_string(),
            });
        }
        validate_file_extensions("inputs", inputs, &PROMPT_EXTENSIONS)?;

        let mut sources = Vec::with_capacity(inputs.len());
        for path in inputs {
            tracing::debug!("Reading prompt file {}", path);
            let bytes = self.storage.read_file(path).await?;
            let content = String::from_utf8(bytes).map_err(|e| ChartError::ProcessingError {
                message: format!("{} is not valid UTF-8: {}", path, e),
            })?;
            sources.push(PromptSource {
                path: path.clone(),
                content,
            });
        }
        Ok(sources)
    }

    async fn transform(&self, sources: Vec<PromptSource>) -> Result<CompileResult> {
        let mut result = CompileResult::default();
        for source in sources {
            for (index, compiled) in self
                .compiler
                .compile_document(&source.content)
                .into_iter()
                .enumerate()
            {
                match compiled {
                    Ok(chart) => {
                        for warning in &chart.warnings {
                            tracing::warn!("{} #{}: {}", source.path, index + 1, warning);
                        }
                        result.charts.push(chart);
                    }
                    Err(e) => {
                        tracing::error!("❌ {} #{}: {}", source.path, index + 1, e);
                        result.failures.push(PromptFailure {
                            source: source.path.clone(),
                            index: index + 1,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
        Ok(result)
    }

    async fn load(&self, result: CompileResult) -> Result<String> {
        let output = self.config.output_path().trim_end_matches('/');

        let mut used = HashSet::new();
        let mut entries = Vec::with_capacity(result.charts.len());
        for chart in &result.charts {
            let slug = chart.slug();
            let mut name = slug.clone();
            let mut suffix = 2;
            while !used.insert(name.clone()) {
                name = format!("{}-{}", slug, suffix);
                suffix += 1;
            }
            let file = format!("{}/charts/{}.json", output, name);
            let data = serde_json::to_vec_pretty(&chart.payload)?;
            self.storage.write_file(&file, &data).await?;
            entries.push(ChartEntry {
                file,
                slice_name: &chart.payload.slice_name,
                viz_type: chart.payload.viz_type.as_str(),
                dataset: &chart.dataset,
                warnings: &chart.warnings,
                explore_url: chart.explore_url.as_deref(),
            });
        }

        let (bundle, bundle_error) = if result.charts.is_empty() {
            (None, None)
        } else {
            self.export_bundle(&result.charts).await
        };

        let report = CompileReport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            compiled: result.charts.len(),
            failed: result.failures.len(),
            charts: entries,
            failures: &result.failures,
            bundle,
            bundle_error,
        };
        let report_path = format!("{}/{}", output, REPORT_FILE);
        self.storage
            .write_file(&report_path, &serde_json::to_vec_pretty(&report)?)
            .await?;
        tracing::debug!("Report written to {}", report_path);

        if self.config.strict() && !result.failures.is_empty() {
            return Err(ChartError::ProcessingError {
                message: format!(
                    "{} prompt(s) failed in strict mode, see {}",
                    result.failures.len(),
                    report_path
                ),
            });
        }
        Ok(report_path)
    }
}
