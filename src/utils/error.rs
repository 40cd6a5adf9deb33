use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for '{field}': {reason} (got '{value}')")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("Prompt is missing required field '{field}'")]
    MissingField { field: String },

    #[error("Invalid {field} '{value}': {reason}")]
    InvalidField {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unknown dataset '{name}' (known: {known})")]
    UnknownDataset { name: String, known: String },

    #[error("Column '{column}' does not exist in dataset '{dataset}'")]
    UnknownColumn { dataset: String, column: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Export error: {message}")]
    ExportError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Prompt,
    Catalog,
    Validation,
    Io,
    Export,
    Serialization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ChartError {
    pub fn invalid_field(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ChartError::InvalidField {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ChartError::ValidationError {
            message: message.into(),
        }
    }

    pub fn export(message: impl Into<String>) -> Self {
        ChartError::ExportError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ChartError::ConfigError { .. }
            | ChartError::InvalidConfigValueError { .. }
            | ChartError::MissingConfigError { .. }
            | ChartError::ConfigValidationError { .. }
            | ChartError::TomlError(_) => ErrorCategory::Config,
            ChartError::EmptyPrompt
            | ChartError::MissingField { .. }
            | ChartError::InvalidField { .. } => ErrorCategory::Prompt,
            ChartError::UnknownDataset { .. } | ChartError::UnknownColumn { .. } => {
                ErrorCategory::Catalog
            }
            ChartError::ValidationError { .. } | ChartError::ProcessingError { .. } => {
                ErrorCategory::Validation
            }
            ChartError::IoError(_) => ErrorCategory::Io,
            ChartError::ZipError(_) | ChartError::ExportError { .. } => ErrorCategory::Export,
            ChartError::SerializationError(_) | ChartError::CsvError(_) => {
                ErrorCategory::Serialization
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Prompt | ErrorCategory::Catalog | ErrorCategory::Validation => {
                ErrorSeverity::High
            }
            ErrorCategory::Export => ErrorSeverity::Medium,
            ErrorCategory::Config | ErrorCategory::Serialization => ErrorSeverity::High,
            ErrorCategory::Io => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            ChartError::EmptyPrompt => {
                "Write at least the 'tipe chart' and 'dengan dataset' lines".to_string()
            }
            ChartError::MissingField { field } => {
                format!("Add a '- {}: ...' line to the prompt", field)
            }
            ChartError::InvalidField { field, .. } => {
                format!("Check the value written for '{}'", field)
            }
            ChartError::UnknownDataset { known, .. } => {
                format!("Use one of the catalog datasets: {}", known)
            }
            ChartError::UnknownColumn { dataset, .. } => format!(
                "Run `chart-compiler catalog` to list the columns of '{}'",
                dataset
            ),
            ChartError::InvalidConfigValueError { field, .. }
            | ChartError::MissingConfigError { field }
            | ChartError::ConfigValidationError { field, .. } => {
                format!("Fix '{}' in the configuration file or CLI flags", field)
            }
            ChartError::ConfigError { .. } | ChartError::TomlError(_) => {
                "Check the TOML configuration syntax".to_string()
            }
            ChartError::ValidationError { .. } => {
                "Run `chart-compiler requirements` to see what the chart type needs".to_string()
            }
            ChartError::ZipError(_) | ChartError::ExportError { .. } => {
                "Remove the bundle with `chart-compiler cleanup` and export again".to_string()
            }
            ChartError::IoError(_) => {
                "Check that the paths exist and are readable/writable".to_string()
            }
            ChartError::SerializationError(_) | ChartError::CsvError(_) => {
                "Check the input file format".to_string()
            }
            ChartError::ProcessingError { .. } => "Re-run with --verbose for details".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Prompt => format!("The chart prompt could not be read: {}", self),
            ErrorCategory::Catalog => format!("The dataset catalog does not match: {}", self),
            ErrorCategory::Validation => format!("The chart cannot be built: {}", self),
            ErrorCategory::Config => format!("Invalid configuration: {}", self),
            ErrorCategory::Io => format!("File system error: {}", self),
            ErrorCategory::Export => format!("Bundle export failed: {}", self),
            ErrorCategory::Serialization => format!("Malformed input data: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_errors_are_high_severity() {
        let err = ChartError::MissingField {
            field: "tipe chart".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Prompt);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.recovery_suggestion().contains("tipe chart"));
    }

    #[test]
    fn test_export_errors_are_retryable() {
        let err = ChartError::export("Export response is empty");
        assert_eq!(err.category(), ErrorCategory::Export);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.user_friendly_message().contains("Export response is empty"));
    }

    #[test]
    fn test_io_errors_are_critical() {
        let err: ChartError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }
}
