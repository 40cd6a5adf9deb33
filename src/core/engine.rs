use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::StageMonitor;

pub struct ChartEngine<P: Pipeline> {
    pipeline: P,
    monitor: StageMonitor,
}

impl<P: Pipeline> ChartEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline,
            monitor: StageMonitor::default(),
        }
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: StageMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting chart compilation...");
        self.monitor.log_stage("start");

        tracing::info!("📥 Reading prompt files...");
        let sources = self.pipeline.extract().await?;
        tracing::info!("Read {} prompt files", sources.len());
        self.monitor.log_stage("extract");

        tracing::info!("⚙️ Compiling prompts...");
        let result = self.pipeline.transform(sources).await?;
        tracing::info!(
            "Compiled {} charts, {} prompts failed",
            result.charts.len(),
            result.failures.len()
        );
        self.monitor.log_stage("transform");

        tracing::info!("💾 Writing payloads...");
        let report_path = self.pipeline.load(result).await?;
        tracing::info!("✅ Report saved to: {}", report_path);
        self.monitor.log_stage("load");
        self.monitor.log_final();

        Ok(report_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{CompileResult, PromptSource};
    use crate::utils::error::ChartError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPipeline {
        stages: AtomicUsize,
        fail_transform: bool,
    }

    #[async_trait::async_trait]
    impl Pipeline for CountingPipeline {
        async fn extract(&self) -> Result<Vec<PromptSource>> {
            self.stages.fetch_add(1, Ordering::SeqCst);
            Ok(vec![PromptSource {
                path: "a.md".to_string(),
                content: String::new(),
            }])
        }

        async fn transform(&self, _sources: Vec<PromptSource>) -> Result<CompileResult> {
            self.stages.fetch_add(1, Ordering::SeqCst);
            if self.fail_transform {
                return Err(ChartError::ProcessingError {
                    message: "boom".to_string(),
                });
            }
            Ok(CompileResult::default())
        }

        async fn load(&self, _result: CompileResult) -> Result<String> {
            self.stages.fetch_add(1, Ordering::SeqCst);
            Ok("out/compile_report.json".to_string())
        }
    }

    #[tokio::test]
    async fn test_engine_runs_all_stages() {
        let engine = ChartEngine::new_with_monitoring(
            CountingPipeline {
                stages: AtomicUsize::new(0),
                fail_transform: false,
            },
            true,
        );
        assert_eq!(engine.run().await.unwrap(), "out/compile_report.json");
        assert_eq!(engine.pipeline.stages.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_engine_stops_on_stage_error() {
        let engine = ChartEngine::new(CountingPipeline {
            stages: AtomicUsize::new(0),
            fail_transform: true,
        });
        assert!(engine.run().await.is_err());
        assert_eq!(engine.pipeline.stages.load(Ordering::SeqCst), 2);
    }
}
