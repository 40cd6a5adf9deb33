use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

use crate::core::bundle::{BundleExporter, BundleLimits, DEFAULT_CACHE_DIR};
use crate::core::compiler::{CompilerSettings, DEFAULT_SLICE_PREFIX};
use crate::core::validator::MAX_ROW_LIMIT;
use crate::core::ConfigProvider;
use crate::utils::error::{ChartError, Result};
use crate::utils::logger::LOG_LEVELS;
use crate::utils::validation::{self, Validate};

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var regex"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub compiler: CompilerSection,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub export: ExportSection,
    pub output: OutputSection,
    #[serde(default)]
    pub superset: SupersetSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub monitoring: MonitoringSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilerSection {
    pub default_row_limit: Option<u32>,
    #[serde(default)]
    pub strict: bool,
    pub default_slice_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSection {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportSection {
    #[serde(default)]
    pub enabled: bool,
    pub cache_dir: Option<String>,
    pub bundle_name: Option<String>,
    pub max_zip_size_mb: Option<u64>,
    pub max_files: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSection {
    pub path: String,
    #[serde(default)]
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupersetSection {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringSection {
    #[serde(default)]
    pub enabled: bool,
}

/// Values still holding `${VAR}` after substitution count as unset.
fn resolved(value: Option<&String>) -> Option<&str> {
    value
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty() && !ENV_VAR.is_match(v))
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        toml::from_str(&processed).map_err(|e| ChartError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value. Unknown variables are
    /// left in place.
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let name = &caps[1];
                std::env::var(name).unwrap_or_else(|_| format!("${{{}}}", name))
            })
            .into_owned()
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_path("output.path", &self.output.path)?;

        if let Some(limit) = self.compiler.default_row_limit {
            validation::validate_range("compiler.default_row_limit", limit, 1, MAX_ROW_LIMIT)?;
        }
        if let Some(prefix) = &self.compiler.default_slice_prefix {
            validation::validate_non_empty_string("compiler.default_slice_prefix", prefix)?;
        }
        if let Some(path) = &self.catalog.path {
            validation::validate_path("catalog.path", path)?;
            validation::validate_file_extensions("catalog.path", std::slice::from_ref(path), &["toml"])?;
        }
        if !self.output.inputs.is_empty() {
            validation::validate_file_extensions("output.inputs", &self.output.inputs, &["md", "txt"])?;
        }

        if self.export.enabled {
            let name = validation::validate_required_field(
                "export.bundle_name",
                &self.export.bundle_name,
            )?;
            validation::validate_bundle_name(name)?;
        }
        if let Some(size) = self.export.max_zip_size_mb {
            validation::validate_positive_number("export.max_zip_size_mb", size as usize, 1)?;
        }
        if let Some(files) = self.export.max_files {
            validation::validate_positive_number("export.max_files", files, 1)?;
        }

        match resolved(self.superset.base_url.as_ref()) {
            Some(url) => validation::validate_url("superset.base_url", url)?,
            None if self.superset.base_url.is_some() => {
                tracing::warn!("superset.base_url is unresolved, explore links are disabled")
            }
            None => {}
        }

        if let Some(level) = &self.logging.level {
            validation::validate_one_of("logging.level", level, &LOG_LEVELS)?;
        }
        if let Some(format) = &self.logging.format {
            validation::validate_one_of("logging.format", format, &["compact", "json"])?;
        }
        Ok(())
    }

    pub fn compiler_settings(&self) -> CompilerSettings {
        CompilerSettings {
            default_row_limit: self.compiler.default_row_limit,
            slice_prefix: self
                .compiler
                .default_slice_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_SLICE_PREFIX.to_string()),
            superset_base_url: resolved(self.superset.base_url.as_ref()).map(str::to_string),
        }
    }

    pub fn cache_dir(&self) -> &str {
        self.export.cache_dir.as_deref().unwrap_or(DEFAULT_CACHE_DIR)
    }

    pub fn exporter(&self) -> BundleExporter {
        let defaults = BundleLimits::default();
        BundleExporter::new(self.cache_dir()).with_limits(BundleLimits {
            max_zip_bytes: self
                .export
                .max_zip_size_mb
                .map(|mb| mb.saturating_mul(1024 * 1024))
                .unwrap_or(defaults.max_zip_bytes),
            max_files: self.export.max_files.unwrap_or(defaults.max_files),
        })
    }

    pub fn json_logs(&self) -> bool {
        self.logging.format.as_deref() == Some("json")
    }

    pub fn log_level(&self) -> Option<&str> {
        self.logging.level.as_deref()
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.enabled
    }
}

impl ConfigProvider for TomlConfig {
    fn inputs(&self) -> &[String] {
        &self.output.inputs
    }

    fn output_path(&self) -> &str {
        &self.output.path
    }

    fn catalog_path(&self) -> Option<&str> {
        self.catalog.path.as_deref()
    }

    fn bundle_name(&self) -> Option<&str> {
        if self.export.enabled {
            self.export.bundle_name.as_deref()
        } else {
            None
        }
    }

    fn strict(&self) -> bool {
        self.compiler.strict
    }

    fn default_row_limit(&self) -> Option<u32> {
        self.compiler.default_row_limit
    }

    fn superset_base_url(&self) -> Option<&str> {
        resolved(self.superset.base_url.as_ref())
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
