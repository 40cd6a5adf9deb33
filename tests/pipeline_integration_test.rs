use chart_compiler::core::ConfigProvider;
use chart_compiler::utils::validation::Validate;
use chart_compiler::{
    Catalog, ChartCompiler, ChartEngine, ChartError, LocalStorage, PromptPipeline, RunConfig,
    TomlConfig,
};
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

const BROKEN_PROMPT: &str = "Buatkan sebuah Chart dengan description seperti berikut:
- tipe chart: pie
- dengan dataset: gudang
- dengan dimension column: branch_name
";

fn copy_demo_prompts(root: &Path) {
    std::fs::create_dir_all(root.join("prompts")).unwrap();
    for name in ["saving_account.md", "loan_order.md", "collateral.md"] {
        std::fs::copy(
            Path::new("demos/prompts").join(name),
            root.join("prompts").join(name),
        )
        .unwrap();
    }
}

fn batch_toml(cache_dir: &Path, strict: bool, extra_input: Option<&str>) -> String {
    let mut inputs = vec![
        "\"prompts/saving_account.md\"".to_string(),
        "\"prompts/loan_order.md\"".to_string(),
        "\"prompts/collateral.md\"".to_string(),
    ];
    if let Some(extra) = extra_input {
        inputs.push(format!("\"{}\"", extra));
    }
    format!(
        r#"
[compiler]
strict = {strict}

[export]
enabled = true
cache_dir = "{cache}"
bundle_name = "core_banking"

[output]
path = "out"
inputs = [{inputs}]

[superset]
base_url = "https://bi.example.com/"
"#,
        strict = strict,
        cache = cache_dir.display(),
        inputs = inputs.join(", ")
    )
}

fn read_report(root: &Path) -> Value {
    let data = std::fs::read(root.join("out/compile_report.json")).unwrap();
    serde_json::from_slice(&data).unwrap()
}

#[test]
fn test_demo_config_loads_and_validates() {
    let config = TomlConfig::from_file("demos/chart-compiler.toml").unwrap();
    config.validate().unwrap();

    assert_eq!(config.inputs().len(), 3);
    assert_eq!(config.output_path(), "./output");
    assert_eq!(config.catalog_path(), Some("demos/catalog.toml"));
    assert_eq!(config.bundle_name(), Some("core_banking_dashboard"));
    assert_eq!(config.default_row_limit(), Some(1000));
    assert!(!config.strict());
    assert!(!config.monitoring_enabled());

    let run = RunConfig::from_toml(&config);
    assert_eq!(run.cache_dir, "cache/chart_export");
    assert_eq!(run.slice_prefix, "Generated Chart");
    run.validate().unwrap();
}

#[tokio::test]
async fn test_end_to_end_compile_with_bundle() {
    let workspace = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    copy_demo_prompts(workspace.path());

    let config = TomlConfig::from_toml_str(&batch_toml(cache.path(), false, None)).unwrap();
    config.validate().unwrap();

    let exporter = config.exporter();
    let compiler = ChartCompiler::new(Catalog::builtin().unwrap(), config.compiler_settings());
    let pipeline = PromptPipeline::new(LocalStorage::new(workspace.path()), config, compiler)
        .with_exporter(exporter.clone());
    let engine = ChartEngine::new_with_monitoring(pipeline, false);

    let report_path = engine.run().await.unwrap();
    assert_eq!(report_path, "out/compile_report.json");

    // Verify one payload file per compiled chart
    let report = read_report(workspace.path());
    assert_eq!(report["compiled"], 8);
    assert_eq!(report["failed"], 0);
    let charts = report["charts"].as_array().unwrap();
    assert_eq!(charts.len(), 8);
    for entry in charts {
        let file = entry["file"].as_str().unwrap();
        assert!(file.starts_with("out/charts/"));
        assert!(workspace.path().join(file).exists());
        assert!(entry["explore_url"]
            .as_str()
            .unwrap()
            .starts_with("https://bi.example.com/explore/"));
    }

    let pie: Value = serde_json::from_slice(
        &std::fs::read(workspace.path().join("out/charts/komposisi-saldo-per-produk.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(pie["viz_type"], "pie");
    assert_eq!(pie["datasource_id"], 11);
    assert!(pie["params"].is_string());
    assert!(pie["query_context"].is_string());

    // Verify the bundle was written and extracted
    assert!(report["bundle"]["success"].as_bool().unwrap());
    assert!(report.get("bundle_error").is_none());
    let zip_path = exporter.zip_path("core_banking");
    assert!(zip_path.exists());

    let archive = zip::ZipArchive::new(std::fs::File::open(&zip_path).unwrap()).unwrap();
    assert_eq!(archive.len(), 9);
    let names: Vec<&str> = archive.file_names().collect();
    assert!(names.contains(&"metadata.json"));
    assert!(names.contains(&"charts/daftar-agunan.json"));

    let info = exporter.export_info("core_banking").unwrap().unwrap();
    assert!(info.is_extracted);
    assert_eq!(info.total_files, 9);
}

#[tokio::test]
async fn test_failed_prompt_is_reported_not_fatal() {
    let workspace = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    copy_demo_prompts(workspace.path());
    std::fs::write(workspace.path().join("prompts/broken.md"), BROKEN_PROMPT).unwrap();

    let config =
        TomlConfig::from_toml_str(&batch_toml(cache.path(), false, Some("prompts/broken.md")))
            .unwrap();
    let compiler = ChartCompiler::new(Catalog::builtin().unwrap(), config.compiler_settings());
    let pipeline = PromptPipeline::new(LocalStorage::new(workspace.path()), config, compiler);
    let engine = ChartEngine::new(pipeline);

    engine.run().await.unwrap();

    let report = read_report(workspace.path());
    assert_eq!(report["compiled"], 8);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["failures"][0]["source"], "prompts/broken.md");
    assert_eq!(report["failures"][0]["index"], 1);
    // No exporter configured on the pipeline
    assert!(report.get("bundle").is_none());
}

#[tokio::test]
async fn test_strict_mode_fails_after_writing_report() {
    let workspace = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    copy_demo_prompts(workspace.path());
    std::fs::write(workspace.path().join("prompts/broken.md"), BROKEN_PROMPT).unwrap();

    let config =
        TomlConfig::from_toml_str(&batch_toml(cache.path(), true, Some("prompts/broken.md")))
            .unwrap();
    let compiler = ChartCompiler::new(Catalog::builtin().unwrap(), config.compiler_settings());
    let pipeline = PromptPipeline::new(LocalStorage::new(workspace.path()), config, compiler);
    let engine = ChartEngine::new(pipeline);

    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, ChartError::ProcessingError { .. }));
    assert_eq!(read_report(workspace.path())["failed"], 1);
}

#[test]
fn test_missing_prompt_file_fails_extract() {
    let workspace = TempDir::new().unwrap();
    let config = RunConfig {
        inputs: vec!["prompts/none.md".to_string()],
        output_path: "out".to_string(),
        ..RunConfig::default()
    };
    let compiler = ChartCompiler::new(Catalog::builtin().unwrap(), config.compiler_settings());
    let pipeline = PromptPipeline::new(LocalStorage::new(workspace.path()), config, compiler);

    let engine = ChartEngine::new(pipeline);
    let err = tokio_test::block_on(engine.run()).unwrap_err();
    assert!(matches!(err, ChartError::IoError(_)));
    assert!(!workspace.path().join("out").exists());
}
