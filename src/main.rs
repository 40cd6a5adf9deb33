use chart_compiler::config::{CatalogFormat, CliConfig, Command, CompileArgs};
use chart_compiler::core::chart_types::supported_chart_types;
use chart_compiler::core::requirements::check_requirements;
use chart_compiler::utils::error::ErrorSeverity;
use chart_compiler::utils::{logger, validation::Validate};
use chart_compiler::{
    BundleExporter, Catalog, ChartCompiler, ChartEngine, ChartError, LocalStorage, PromptPipeline,
    RunConfig, TomlConfig,
};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = CliConfig::parse();

    let toml = match cli.config.as_deref().map(TomlConfig::from_file).transpose() {
        Ok(toml) => toml,
        Err(e) => {
            eprintln!("❌ Failed to load config file: {}", e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    let json_logs = cli.json_logs || toml.as_ref().is_some_and(TomlConfig::json_logs);
    let level = toml.as_ref().and_then(TomlConfig::log_level);
    logger::init_logger(cli.verbose, level, json_logs);
    tracing::debug!("CLI arguments: {:?}", cli);

    if let Some(toml) = &toml {
        if let Err(e) = toml.validate() {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    }

    if let Err(e) = run(&cli, toml.as_ref()).await {
        tracing::error!(
            "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
    Ok(())
}

fn catalog_path<'a>(flag: &'a Option<String>, toml: Option<&'a TomlConfig>) -> Option<&'a str> {
    flag.as_deref()
        .or_else(|| toml.and_then(|t| t.catalog.path.as_deref()))
}

fn exporter(cache_dir: &Option<String>, toml: Option<&TomlConfig>) -> BundleExporter {
    match (cache_dir, toml) {
        (Some(dir), _) => BundleExporter::new(dir),
        (None, Some(toml)) => toml.exporter(),
        (None, None) => BundleExporter::default(),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), ChartError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: &CliConfig, toml: Option<&TomlConfig>) -> Result<(), ChartError> {
    match &cli.command {
        Command::Compile(args) => compile(cli, toml, args).await,
        Command::Check { files, catalog } => {
            let settings = toml.map(TomlConfig::compiler_settings).unwrap_or_default();
            let compiler = ChartCompiler::new(Catalog::load(catalog_path(catalog, toml))?, settings);
            let mut failed = 0;
            for file in files {
                let content = std::fs::read_to_string(file)?;
                for (index, result) in compiler.compile_document(&content).into_iter().enumerate() {
                    match result {
                        Ok(chart) => {
                            println!(
                                "✅ {} #{}: {} ({}) on {}",
                                file,
                                index + 1,
                                chart.payload.slice_name,
                                chart.payload.viz_type,
                                chart.dataset
                            );
                            for warning in &chart.warnings {
                                println!("   ⚠️ {}", warning);
                            }
                        }
                        Err(e) => {
                            failed += 1;
                            println!("❌ {} #{}: {}", file, index + 1, e);
                        }
                    }
                }
            }
            if failed > 0 {
                return Err(ChartError::validation(format!("{} prompt(s) failed", failed)));
            }
            Ok(())
        }
        Command::ChartTypes => {
            for info in supported_chart_types() {
                println!(
                    "{:<24} {} (requires: {})",
                    info.viz_type.as_str(),
                    info.description,
                    info.required_params.join(", ")
                );
            }
            Ok(())
        }
        Command::Catalog { catalog, format } => {
            let catalog = Catalog::load(catalog_path(catalog, toml))?;
            match format {
                CatalogFormat::Text => {
                    for dataset in &catalog.datasets {
                        println!("{}\n", dataset.describe());
                    }
                }
                CatalogFormat::Summary => println!("{}", catalog.format_summary()),
                CatalogFormat::Csv => catalog.write_columns_csv(std::io::stdout())?,
            }
            Ok(())
        }
        Command::Requirements {
            chart_type,
            dataset,
            catalog,
        } => {
            let catalog = Catalog::load(catalog_path(catalog, toml))?;
            let report = check_requirements(chart_type, catalog.resolve(dataset)?);
            print_json(&report)
        }
        Command::Sanitize {
            payload,
            dataset,
            catalog,
        } => {
            let settings = toml.map(TomlConfig::compiler_settings).unwrap_or_default();
            let compiler = ChartCompiler::new(Catalog::load(catalog_path(catalog, toml))?, settings);
            let dataset = compiler.catalog().resolve(dataset)?.clone();
            let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(payload)?)?;
            let chart = compiler.sanitize_payload(&raw, &dataset);
            for warning in &chart.warnings {
                tracing::warn!("{}", warning);
            }
            print_json(&chart.payload)
        }
        Command::ExportInfo { name, cache_dir } => {
            match exporter(cache_dir, toml).export_info(name)? {
                Some(info) => print_json(&info),
                None => {
                    println!("No bundle named '{}'", name);
                    Ok(())
                }
            }
        }
        Command::Cleanup { name, cache_dir } => {
            if exporter(cache_dir, toml).cleanup(name)? {
                println!("🧹 Removed bundle '{}'", name);
            } else {
                println!("Nothing to remove for '{}'", name);
            }
            Ok(())
        }
    }
}

async fn compile(
    cli: &CliConfig,
    toml: Option<&TomlConfig>,
    args: &CompileArgs,
) -> Result<(), ChartError> {
    let mut config = toml.map(RunConfig::from_toml).unwrap_or_default();
    config.apply_args(args);
    config.validate()?;

    let catalog = Catalog::load(config.catalog_path.as_deref())?;
    let compiler = ChartCompiler::new(catalog, config.compiler_settings());

    if args.stdout {
        let mut charts = Vec::new();
        for file in &config.inputs {
            let content = std::fs::read_to_string(file)?;
            for result in compiler.compile_document(&content) {
                match result {
                    Ok(chart) => charts.push(chart),
                    Err(e) if config.strict => return Err(e),
                    Err(e) => tracing::error!("❌ {}: {}", file, e),
                }
            }
        }
        return print_json(&charts);
    }

    let monitor_enabled = cli.monitor || toml.is_some_and(TomlConfig::monitoring_enabled);
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let exporter = toml
        .map(TomlConfig::exporter)
        .unwrap_or_else(|| BundleExporter::new(&config.cache_dir));
    let pipeline =
        PromptPipeline::new(LocalStorage::current_dir(), config, compiler).with_exporter(exporter);
    let engine = ChartEngine::new_with_monitoring(pipeline, monitor_enabled);

    let report_path = engine.run().await?;
    println!("✅ Compilation completed successfully!");
    println!("📁 Report saved to: {}", report_path);
    Ok(())
}
