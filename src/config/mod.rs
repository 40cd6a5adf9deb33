pub mod cli;
pub mod toml_config;

use serde::{Deserialize, Serialize};

use crate::config::toml_config::TomlConfig;
use crate::core::bundle::DEFAULT_CACHE_DIR;
use crate::core::compiler::{CompilerSettings, DEFAULT_SLICE_PREFIX};
use crate::core::validator::MAX_ROW_LIMIT;
use crate::core::ConfigProvider;
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};

#[cfg(feature = "cli")]
use clap::{Args, Parser, Subcommand, ValueEnum};

#[cfg(feature = "cli")]
#[derive(Debug, Parser)]
#[command(name = "chart-compiler", version)]
#[command(about = "Compiles chart prompts into Superset chart payloads")]
pub struct CliConfig {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Log CPU and memory per pipeline stage
    #[arg(long, global = true)]
    pub monitor: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compile prompt files into chart payloads
    Compile(CompileArgs),
    /// Parse and plan prompts without writing anything
    Check {
        #[arg(required = true)]
        files: Vec<String>,
        #[arg(long)]
        catalog: Option<String>,
    },
    /// List the chart types with full configuration
    ChartTypes,
    /// Show the dataset catalog
    Catalog {
        #[arg(long)]
        catalog: Option<String>,
        #[arg(long, value_enum, default_value = "text")]
        format: CatalogFormat,
    },
    /// Check whether a chart type fits a dataset
    Requirements {
        #[arg(long)]
        chart_type: String,
        #[arg(long)]
        dataset: String,
        #[arg(long)]
        catalog: Option<String>,
    },
    /// Repair a hand-written chart payload
    Sanitize {
        payload: String,
        #[arg(long)]
        dataset: String,
        #[arg(long)]
        catalog: Option<String>,
    },
    /// Show an exported bundle
    ExportInfo {
        name: String,
        #[arg(long)]
        cache_dir: Option<String>,
    },
    /// Remove an exported bundle
    Cleanup {
        name: String,
        #[arg(long)]
        cache_dir: Option<String>,
    },
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CatalogFormat {
    Text,
    Summary,
    Csv,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Args)]
pub struct CompileArgs {
    /// Prompt files (.md or .txt)
    pub files: Vec<String>,

    #[arg(long)]
    pub catalog: Option<String>,

    #[arg(short, long)]
    pub output: Option<String>,

    /// Export the compiled payloads as a zip bundle with this name
    #[arg(long)]
    pub bundle: Option<String>,

    /// Fail when any prompt fails
    #[arg(long)]
    pub strict: bool,

    /// Print payloads to stdout instead of writing files
    #[arg(long)]
    pub stdout: bool,

    #[arg(long)]
    pub row_limit: Option<u32>,
}

/// Effective settings of a compile run: TOML values overridden by flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub inputs: Vec<String>,
    pub output_path: String,
    pub catalog_path: Option<String>,
    pub bundle_name: Option<String>,
    pub cache_dir: String,
    pub strict: bool,
    pub default_row_limit: Option<u32>,
    pub slice_prefix: String,
    pub superset_base_url: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            output_path: "./output".to_string(),
            catalog_path: None,
            bundle_name: None,
            cache_dir: DEFAULT_CACHE_DIR.to_string(),
            strict: false,
            default_row_limit: None,
            slice_prefix: DEFAULT_SLICE_PREFIX.to_string(),
            superset_base_url: None,
        }
    }
}

impl RunConfig {
    pub fn from_toml(config: &TomlConfig) -> Self {
        let settings = config.compiler_settings();
        Self {
            inputs: config.inputs().to_vec(),
            output_path: config.output_path().to_string(),
            catalog_path: config.catalog_path().map(str::to_string),
            bundle_name: config.bundle_name().map(str::to_string),
            cache_dir: config.cache_dir().to_string(),
            strict: config.strict(),
            default_row_limit: settings.default_row_limit,
            slice_prefix: settings.slice_prefix,
            superset_base_url: settings.superset_base_url,
        }
    }

    #[cfg(feature = "cli")]
    pub fn apply_args(&mut self, args: &CompileArgs) {
        if !args.files.is_empty() {
            self.inputs = args.files.clone();
        }
        if let Some(output) = &args.output {
            self.output_path = output.clone();
        }
        if let Some(catalog) = &args.catalog {
            self.catalog_path = Some(catalog.clone());
        }
        if let Some(bundle) = &args.bundle {
            self.bundle_name = Some(bundle.clone());
        }
        if args.row_limit.is_some() {
            self.default_row_limit = args.row_limit;
        }
        self.strict |= args.strict;
    }

    pub fn compiler_settings(&self) -> CompilerSettings {
        CompilerSettings {
            default_row_limit: self.default_row_limit,
            slice_prefix: self.slice_prefix.clone(),
            superset_base_url: self.superset_base_url.clone(),
        }
    }
}

impl ConfigProvider for RunConfig {
    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn catalog_path(&self) -> Option<&str> {
        self.catalog_path.as_deref()
    }

    fn bundle_name(&self) -> Option<&str> {
        self.bundle_name.as_deref()
    }

    fn strict(&self) -> bool {
        self.strict
    }

    fn default_row_limit(&self) -> Option<u32> {
        self.default_row_limit
    }

    fn superset_base_url(&self) -> Option<&str> {
        self.superset_base_url.as_deref()
    }
}

impl Validate for RunConfig {
    fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(crate::utils::error::ChartError::MissingConfigError {
                field: "inputs".to_string(),
            });
        }
        validation::validate_file_extensions("inputs", &self.inputs, &["md", "txt"])?;
        validation::validate_path("output_path", &self.output_path)?;
        validation::validate_path("cache_dir", &self.cache_dir)?;
        if let Some(name) = &self.bundle_name {
            validation::validate_bundle_name(name)?;
        }
        if let Some(limit) = self.default_row_limit {
            validation::validate_range("row_limit", limit, 1, MAX_ROW_LIMIT)?;
        }
        if let Some(url) = &self.superset_base_url {
            validation::validate_url("superset.base_url", url)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_config() -> RunConfig {
        RunConfig {
            inputs: vec!["demos/prompts/saving_account.md".to_string()],
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_run_config_validation() {
        assert!(run_config().validate().is_ok());
        assert!(RunConfig::default().validate().is_err());

        let mut bad = run_config();
        bad.bundle_name = Some("a/b".to_string());
        assert!(bad.validate().is_err());

        let mut bad = run_config();
        bad.default_row_limit = Some(0);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_run_config_from_toml() {
        let toml = TomlConfig::from_toml_str(
            "[output]\npath = \"out\"\ninputs = [\"a.md\"]\n\n[export]\nenabled = true\nbundle_name = \"kpi\"\n",
        )
        .unwrap();
        let config = RunConfig::from_toml(&toml);
        assert_eq!(config.inputs, vec!["a.md"]);
        assert_eq!(config.output_path, "out");
        assert_eq!(config.bundle_name.as_deref(), Some("kpi"));
        assert_eq!(config.cache_dir, DEFAULT_CACHE_DIR);
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_flags_override_toml() {
        let cli = CliConfig::parse_from([
            "chart-compiler",
            "compile",
            "b.md",
            "--output",
            "elsewhere",
            "--strict",
            "--row-limit",
            "250",
        ]);
        let Command::Compile(args) = cli.command else {
            panic!("expected compile");
        };
        let toml = TomlConfig::from_toml_str("[output]\npath = \"out\"\ninputs = [\"a.md\"]\n").unwrap();
        let mut config = RunConfig::from_toml(&toml);
        config.apply_args(&args);
        assert_eq!(config.inputs, vec!["b.md"]);
        assert_eq!(config.output_path, "elsewhere");
        assert!(config.strict);
        assert_eq!(config.default_row_limit, Some(250));
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = CliConfig::parse_from(["chart-compiler", "chart-types", "--verbose", "--json-logs"]);
        assert!(cli.verbose);
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Command::ChartTypes));
    }
}
