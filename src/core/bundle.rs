//! Export bundles: a zip of compiled chart payloads written to a cache
//! directory, extracted next to it for inspection.

use serde::Serialize;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};
use zip::write::{FileOptions, ZipWriter};

use crate::domain::model::CompiledChart;
use crate::utils::error::{ChartError, Result};
use crate::utils::validation::validate_bundle_name;

pub const DEFAULT_CACHE_DIR: &str = "cache/chart_export";
pub const BUNDLE_FORMAT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BundleLimits {
    pub max_zip_bytes: u64,
    pub max_files: usize,
}

impl Default for BundleLimits {
    fn default() -> Self {
        Self {
            max_zip_bytes: 100 * 1024 * 1024,
            max_files: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedFile {
    pub filename: String,
    pub path: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedFiles {
    pub extract_directory: String,
    pub files: Vec<ExtractedFile>,
    pub total_files: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub success: bool,
    pub bundle_name: String,
    pub zip_file_path: String,
    pub extracted_files: ExtractedFiles,
    pub export_timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportInfo {
    pub bundle_name: String,
    pub zip_file_path: String,
    pub zip_file_size: u64,
    pub zip_file_modified: String,
    pub extract_directory: String,
    pub is_extracted: bool,
    pub files: Vec<String>,
    pub total_files: usize,
}

#[derive(Debug, Clone)]
pub struct BundleExporter {
    cache_dir: PathBuf,
    limits: BundleLimits,
}

impl Default for BundleExporter {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DIR)
    }
}

impl BundleExporter {
    pub fn new<P: Into<PathBuf>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            limits: BundleLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: BundleLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn limits(&self) -> &BundleLimits {
        &self.limits
    }

    pub fn zip_path(&self, bundle_name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.zip", bundle_name))
    }

    pub fn extract_dir(&self, bundle_name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}_extracted", bundle_name))
    }

    /// Writes `<name>.zip` with one payload per chart and extracts it.
    pub fn export(&self, bundle_name: &str, charts: &[CompiledChart]) -> Result<ExportResult> {
        validate_bundle_name(bundle_name)?;
        if charts.is_empty() {
            return Err(ChartError::export("Export response is empty"));
        }

        let timestamp = chrono::Utc::now().to_rfc3339();
        let zip_data = build_archive(charts, &timestamp)?;

        fs::create_dir_all(&self.cache_dir)?;
        let zip_path = self.zip_path(bundle_name);
        fs::write(&zip_path, &zip_data)?;
        tracing::info!(
            "📦 Wrote bundle {} ({} bytes, {} charts)",
            zip_path.display(),
            zip_data.len(),
            charts.len()
        );

        let extracted_files = self.extract(&zip_path, bundle_name)?;
        Ok(ExportResult {
            success: true,
            bundle_name: bundle_name.to_string(),
            zip_file_path: zip_path.display().to_string(),
            extracted_files,
            export_timestamp: timestamp,
        })
    }

    /// Unpacks a bundle into `<name>_extracted`, replacing earlier contents.
    pub fn extract(&self, zip_path: &Path, bundle_name: &str) -> Result<ExtractedFiles> {
        validate_bundle_name(bundle_name)?;
        let size = fs::metadata(zip_path)?.len();
        if size > self.limits.max_zip_bytes {
            return Err(ChartError::export("Export file is too large"));
        }

        let data = fs::read(zip_path)?;
        let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
        if archive.len() > self.limits.max_files {
            return Err(ChartError::export("Too many files in ZIP archive"));
        }

        let extract_dir = self.extract_dir(bundle_name);
        if extract_dir.exists() {
            fs::remove_dir_all(&extract_dir)?;
        }
        fs::create_dir_all(&extract_dir)?;

        let mut files = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_string();
            let relative = safe_relative_path(&name)?;
            let target = extract_dir.join(&relative);

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut content = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut content)?;
            fs::write(&target, &content)?;

            let parsed = if name.ends_with(".json") {
                serde_json::from_slice(&content).ok()
            } else {
                None
            };
            files.push(ExtractedFile {
                filename: name,
                path: target.display().to_string(),
                size: content.len() as u64,
                content: parsed,
            });
        }

        tracing::debug!(
            "Extracted {} files into {}",
            files.len(),
            extract_dir.display()
        );
        Ok(ExtractedFiles {
            extract_directory: extract_dir.display().to_string(),
            total_files: files.len(),
            files,
        })
    }

    pub fn export_info(&self, bundle_name: &str) -> Result<Option<ExportInfo>> {
        validate_bundle_name(bundle_name)?;
        let zip_path = self.zip_path(bundle_name);
        if !zip_path.exists() {
            return Ok(None);
        }

        let metadata = fs::metadata(&zip_path)?;
        let modified: chrono::DateTime<chrono::Utc> = metadata.modified()?.into();
        let extract_dir = self.extract_dir(bundle_name);
        let is_extracted = extract_dir.is_dir();

        let mut files = Vec::new();
        if is_extracted {
            collect_files(&extract_dir, &extract_dir, &mut files)?;
            files.sort();
        }

        Ok(Some(ExportInfo {
            bundle_name: bundle_name.to_string(),
            zip_file_path: zip_path.display().to_string(),
            zip_file_size: metadata.len(),
            zip_file_modified: modified.to_rfc3339(),
            extract_directory: extract_dir.display().to_string(),
            is_extracted,
            total_files: files.len(),
            files,
        }))
    }

    /// Removes the zip and its extracted directory. Returns whether anything
    /// was there to remove.
    pub fn cleanup(&self, bundle_name: &str) -> Result<bool> {
        validate_bundle_name(bundle_name)?;
        let mut removed = false;

        let zip_path = self.zip_path(bundle_name);
        if zip_path.exists() {
            fs::remove_file(&zip_path)?;
            tracing::info!("🧹 Removed {}", zip_path.display());
            removed = true;
        }
        let extract_dir = self.extract_dir(bundle_name);
        if extract_dir.exists() {
            fs::remove_dir_all(&extract_dir)?;
            tracing::info!("🧹 Removed {}", extract_dir.display());
            removed = true;
        }
        if !removed {
            tracing::debug!("Nothing to clean up for bundle {}", bundle_name);
        }
        Ok(removed)
    }
}

fn build_archive(charts: &[CompiledChart], timestamp: &str) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    let metadata = serde_json::json!({
        "version": BUNDLE_FORMAT_VERSION,
        "type": "chart_export",
        "timestamp": timestamp,
        "chart_count": charts.len(),
    });
    zip.start_file::<_, ()>("metadata.json", FileOptions::default())?;
    zip.write_all(serde_json::to_string_pretty(&metadata)?.as_bytes())?;

    let mut used = std::collections::HashSet::new();
    for chart in charts {
        let slug = chart.slug();
        let mut name = slug.clone();
        let mut suffix = 2;
        while !used.insert(name.clone()) {
            name = format!("{}-{}", slug, suffix);
            suffix += 1;
        }
        zip.start_file::<_, ()>(format!("charts/{}.json", name), FileOptions::default())?;
        zip.write_all(serde_json::to_string_pretty(&chart.payload)?.as_bytes())?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Entry names must stay inside the extract directory.
fn safe_relative_path(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => {
                return Err(ChartError::export(format!(
                    "ZIP entry escapes the extract directory: {}",
                    name
                )))
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(ChartError::export(format!("Invalid ZIP entry name: {}", name)));
    }
    Ok(relative)
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, files)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            files.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}
