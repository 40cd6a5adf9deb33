use crate::utils::error::{ChartError, Result};
use std::collections::HashSet;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: impl ToString, reason: impl Into<String>) -> ChartError {
    ChartError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(invalid(
            field_name,
            url_str,
            format!("Invalid URL format: {}", e),
        )),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

/// Every file must carry one of `allowed_extensions` (compared case-insensitively).
pub fn validate_file_extensions(
    field_name: &str,
    files: &[String],
    allowed_extensions: &[&str],
) -> Result<()> {
    let allowed_set: HashSet<String> = allowed_extensions
        .iter()
        .map(|ext| ext.to_ascii_lowercase())
        .collect();

    for file in files {
        let extension = std::path::Path::new(file)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension {
            Some(ext) if allowed_set.contains(&ext) => {}
            Some(ext) => {
                return Err(invalid(
                    field_name,
                    file,
                    format!(
                        "Unsupported file extension: {}. Allowed extensions: {}",
                        ext,
                        allowed_extensions.join(", ")
                    ),
                ))
            }
            None => {
                return Err(invalid(
                    field_name,
                    file,
                    "File has no extension or invalid filename",
                ))
            }
        }
    }

    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| ChartError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

pub fn validate_one_of(field_name: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if !allowed.contains(&value) {
        return Err(invalid(
            field_name,
            value,
            format!("Expected one of: {}", allowed.join(", ")),
        ));
    }
    Ok(())
}

/// Bundle names become file names, so only `[A-Za-z0-9_-]` is allowed.
pub fn validate_bundle_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 128 {
        return Err(ChartError::invalid_field(
            "bundle name",
            name,
            "must be 1 to 128 characters long",
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ChartError::invalid_field(
            "bundle name",
            name,
            "only letters, digits, '_' and '-' are allowed",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("superset.base_url", "https://bi.example.com").is_ok());
        assert!(validate_url("superset.base_url", "http://localhost:8088").is_ok());
        assert!(validate_url("superset.base_url", "").is_err());
        assert!(validate_url("superset.base_url", "invalid-url").is_err());
        assert!(validate_url("superset.base_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("export.max_files", 5, 1).is_ok());
        assert!(validate_positive_number("export.max_files", 0, 1).is_err());
    }

    #[test]
    fn test_validate_file_extensions() {
        let files = vec!["prompts.md".to_string(), "pie.TXT".to_string()];
        assert!(validate_file_extensions("inputs", &files, &["md", "txt"]).is_ok());

        let invalid_files = vec!["prompts.sql".to_string()];
        assert!(validate_file_extensions("inputs", &invalid_files, &["md", "txt"]).is_err());

        let no_extension = vec!["README".to_string()];
        assert!(validate_file_extensions("inputs", &no_extension, &["md"]).is_err());
    }

    #[test]
    fn test_validate_required_field() {
        let present = Some("catalog.toml".to_string());
        assert_eq!(
            validate_required_field("catalog.path", &present).unwrap(),
            "catalog.toml"
        );

        let missing: Option<String> = None;
        let err = validate_required_field("catalog.path", &missing).unwrap_err();
        assert!(matches!(err, ChartError::MissingConfigError { .. }));
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("compiler.default_row_limit", 100u32, 1, 100_000).is_ok());
        assert!(validate_range("compiler.default_row_limit", 0u32, 1, 100_000).is_err());
        assert!(validate_range("compiler.default_row_limit", 100_001u32, 1, 100_000).is_err());
    }

    #[test]
    fn test_validate_one_of() {
        assert!(validate_one_of("logging.format", "json", &["compact", "json"]).is_ok());
        assert!(validate_one_of("logging.format", "xml", &["compact", "json"]).is_err());
    }

    #[test]
    fn test_validate_bundle_name() {
        assert!(validate_bundle_name("loan-orders_2024").is_ok());
        assert!(validate_bundle_name("").is_err());
        assert!(validate_bundle_name("../escape").is_err());
        assert!(validate_bundle_name(&"a".repeat(129)).is_err());
    }
}
