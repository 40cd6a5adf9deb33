use chart_compiler::core::ConfigProvider;
use chart_compiler::utils::error::ErrorSeverity;
use chart_compiler::utils::{logger, validation::Validate};
use chart_compiler::{Catalog, ChartCompiler, ChartEngine, LocalStorage, PromptPipeline, TomlConfig};
use clap::Parser;

#[derive(Parser)]
#[command(name = "chart-batch")]
#[command(about = "Compiles the prompt files listed in a TOML configuration")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "chart-compiler.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Override strict mode from config
    #[arg(long)]
    strict: Option<bool>,

    /// Parse and plan every prompt without writing anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    logger::init_logger(args.verbose, config.log_level(), config.json_logs());
    tracing::info!("🚀 Starting chart batch");
    tracing::info!("📁 Loaded configuration from: {}", args.config);

    if let Some(strict) = args.strict {
        config.compiler.strict = strict;
        tracing::info!("🔧 Strict mode overridden to: {}", strict);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }
    tracing::info!("✅ Configuration loaded and validated successfully");

    display_config_summary(&config, &args);

    let catalog = match Catalog::load(config.catalog_path()) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };
    let compiler = ChartCompiler::new(catalog, config.compiler_settings());

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be written");
        perform_dry_run(&config, &compiler);
        return Ok(());
    }

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let exporter = config.exporter();
    let pipeline =
        PromptPipeline::new(LocalStorage::current_dir(), config, compiler).with_exporter(exporter);
    let engine = ChartEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(report_path) => {
            println!("✅ Chart batch completed successfully!");
            println!("📁 Report saved to: {}", report_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ Chart batch failed: {} (Category: {:?}, Severity: {:?})",
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
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!("  Inputs: {}", config.inputs().join(", "));
    println!("  Output: {}", config.output_path());
    println!(
        "  Catalog: {}",
        config.catalog_path().unwrap_or("builtin")
    );
    println!("  Strict: {}", config.strict());
    if let Some(limit) = config.default_row_limit() {
        println!("  Default Row Limit: {}", limit);
    }
    match config.bundle_name() {
        Some(name) => println!("  Bundle: {} (in {})", name, config.cache_dir()),
        None => println!("  Bundle: disabled"),
    }
    if let Some(url) = config.superset_base_url() {
        println!("  Superset: {}", url);
    }
    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }
    println!();
}

fn perform_dry_run(config: &TomlConfig, compiler: &ChartCompiler) {
    println!("🔍 Dry Run Analysis:");
    let mut compiled = 0;
    let mut failed = 0;

    for path in config.inputs() {
        println!();
        println!("📄 {}", path);
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                println!("  ❌ cannot read: {}", e);
                failed += 1;
                continue;
            }
        };
        for (index, result) in compiler.compile_document(&content).into_iter().enumerate() {
            match result {
                Ok(chart) => {
                    compiled += 1;
                    println!(
                        "  ✅ #{} {} [{}] on {}",
                        index + 1,
                        chart.payload.slice_name,
                        chart.payload.viz_type,
                        chart.dataset
                    );
                    for warning in &chart.warnings {
                        println!("     ⚠️ {}", warning);
                    }
                }
                Err(e) => {
                    failed += 1;
                    println!("  ❌ #{} {}", index + 1, e);
                }
            }
        }
    }

    println!();
    println!("📊 {} charts would be written, {} prompts failed", compiled, failed);
    if let Some(name) = config.bundle_name() {
        println!("📦 Bundle '{}' would be exported", name);
    }
}
