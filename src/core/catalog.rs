//! Dataset catalog: the reference tables prompts may name, with the column
//! metadata the metric and query builders need.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

use crate::utils::error::{ChartError, Result};
use crate::utils::validation::{validate_non_empty_string, Validate};

const BUILTIN_CATALOG: &str = include_str!("../../demos/catalog.toml");

const SUMMARY_MAX_COLUMNS: usize = 15;
const SUMMARY_DISPLAY_COLUMNS: usize = 8;
const SUMMARY_MAX_DESCRIPTION: usize = 80;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    #[serde(default)]
    pub id: Option<i64>,
    pub column_name: String,
    #[serde(rename = "type", default = "default_column_type")]
    pub column_type: String,
    #[serde(default)]
    pub is_dttm: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub verbose_name: Option<String>,
    #[serde(default)]
    pub python_date_format: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default = "default_true")]
    pub filterable: bool,
    #[serde(default = "default_true")]
    pub groupby: bool,
    #[serde(default = "default_type_generic")]
    pub type_generic: i64,
}

fn default_column_type() -> String {
    "VARCHAR".to_string()
}

fn default_true() -> bool {
    true
}

fn default_type_generic() -> i64 {
    1
}

impl Column {
    pub fn new(column_name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            id: None,
            column_name: column_name.into(),
            column_type: column_type.into(),
            is_dttm: false,
            description: None,
            verbose_name: None,
            python_date_format: None,
            expression: None,
            filterable: true,
            groupby: true,
            type_generic: 1,
        }
    }

    pub fn temporal(mut self) -> Self {
        self.is_dttm = true;
        self
    }

    /// Explicit id, or a stable id in `0..10000` derived from the column name.
    pub fn effective_id(&self) -> i64 {
        if let Some(id) = self.id {
            return id;
        }
        let digest = Sha256::digest(self.column_name.as_bytes());
        let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        i64::from(value % 10_000)
    }

    fn type_lower(&self) -> String {
        self.column_type.to_lowercase()
    }

    pub fn is_temporal(&self) -> bool {
        self.is_dttm || self.type_lower().contains("date")
    }

    pub fn has_date_like_name(&self) -> bool {
        let name = self.column_name.to_lowercase();
        ["date", "time", "created", "updated"]
            .iter()
            .any(|word| name.contains(word))
    }

    pub fn is_numeric(&self) -> bool {
        let ty = self.type_lower();
        ["int", "float", "decimal", "numeric", "double", "number"]
            .iter()
            .any(|t| ty.contains(t))
    }

    pub fn is_categorical(&self) -> bool {
        let ty = self.type_lower();
        ["varchar", "text", "string", "char"]
            .iter()
            .any(|t| ty.contains(t))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: i64,
    pub table_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    /// CSV file (`column_name,type,is_dttm,description`) relative to the
    /// catalog file; read when `columns` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns_csv: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Dataset {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.column_name == name)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|c| c.column_name.eq_ignore_ascii_case(name))
            })
    }

    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| ChartError::UnknownColumn {
            dataset: self.table_name.clone(),
            column: name.to_string(),
        })
    }

    pub fn first_column(&self) -> Option<&Column> {
        self.columns.first()
    }

    pub fn first_temporal(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_temporal())
    }

    pub fn first_date_named(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.has_date_like_name())
    }

    /// Temporal column by type first, then by name.
    pub fn time_column(&self) -> Option<&Column> {
        self.first_temporal().or_else(|| self.first_date_named())
    }

    pub fn first_numeric(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_numeric())
    }

    pub fn first_categorical(&self, excluding: Option<&str>) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.is_categorical() && Some(c.column_name.as_str()) != excluding)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.table_name.as_str())
            .chain(self.display_name.as_deref())
            .chain(self.aliases.iter().map(String::as_str))
    }

    /// Multi-line description of the dataset and its columns.
    pub fn describe(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|col| match col.description.as_deref() {
                Some(desc) if !desc.is_empty() => {
                    format!("- {} ({}): {}", col.column_name, col.column_type, desc)
                }
                _ => format!("- {} ({})", col.column_name, col.column_type),
            })
            .collect();

        format!(
            "Dataset: {}\nDatabase: {}\nColumns:\n{}\n\nDataset ID: {}\nTotal Columns: {}",
            self.table_name,
            self.database.as_deref().unwrap_or("Unknown"),
            columns.join("\n"),
            self.id,
            self.columns.len()
        )
    }

    /// One-line summary: `name(description): [col(type), ..., +N_more] [DB:db]`.
    pub fn summary_line(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .take(SUMMARY_MAX_COLUMNS)
            .map(|c| format!("{}({})", c.column_name, c.column_type))
            .collect();

        let columns_formatted = if columns.is_empty() {
            "[no_columns_available]".to_string()
        } else {
            let mut shown = columns
                .iter()
                .take(SUMMARY_DISPLAY_COLUMNS)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            if columns.len() > SUMMARY_DISPLAY_COLUMNS {
                shown.push_str(&format!(
                    ", +{}_more",
                    columns.len() - SUMMARY_DISPLAY_COLUMNS
                ));
            }
            format!("[{}]", shown)
        };

        let description = self
            .description
            .as_deref()
            .map(|d| d.replace(['\n', '\r'], " ").trim().to_string())
            .filter(|d| !d.is_empty());

        let mut line = match description {
            Some(desc) if desc.chars().count() > SUMMARY_MAX_DESCRIPTION => {
                let truncated: String = desc.chars().take(SUMMARY_MAX_DESCRIPTION).collect();
                format!("{}({}...): {}", self.table_name, truncated, columns_formatted)
            }
            Some(desc) => format!("{}({}): {}", self.table_name, desc, columns_formatted),
            None => format!("{}(no description): {}", self.table_name, columns_formatted),
        };

        if let Some(db) = self.database.as_deref() {
            if !db.is_empty() && db != "Unknown" {
                line.push_str(&format!(" [DB:{}]", db));
            }
        }
        line
    }
}

#[derive(Debug, Deserialize)]
struct CsvColumn {
    column_name: String,
    #[serde(rename = "type")]
    column_type: Option<String>,
    is_dttm: Option<bool>,
    description: Option<String>,
}

impl From<CsvColumn> for Column {
    fn from(row: CsvColumn) -> Self {
        let mut column = Column::new(
            row.column_name,
            row.column_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(default_column_type),
        );
        column.is_dttm = row.is_dttm.unwrap_or(false);
        column.description = row.description.filter(|d| !d.is_empty());
        column
    }
}

pub fn read_columns_csv<R: std::io::Read>(reader: R) -> Result<Vec<Column>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut columns = Vec::new();
    for row in csv_reader.deserialize::<CsvColumn>() {
        columns.push(row?.into());
    }
    Ok(columns)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub datasets: Vec<Dataset>,
}

fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl Catalog {
    pub fn new(datasets: Vec<Dataset>) -> Self {
        Self { datasets }
    }

    /// The catalog compiled into the binary: saving account, loan order and
    /// collateral.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG, None)
    }

    /// A catalog file when one is configured, the builtin catalog otherwise.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml_str(&content, path.parent())?;
        tracing::debug!(
            "Loaded catalog {} with {} datasets",
            path.display(),
            catalog.datasets.len()
        );
        Ok(catalog)
    }

    /// Parses a catalog. `base_dir` resolves `columns_csv` references; without
    /// one those references are an error.
    pub fn from_toml_str(content: &str, base_dir: Option<&Path>) -> Result<Self> {
        let mut catalog: Catalog = toml::from_str(content)?;

        for dataset in &mut catalog.datasets {
            let Some(csv_path) = dataset.columns_csv.as_deref() else {
                continue;
            };
            if !dataset.columns.is_empty() {
                tracing::warn!(
                    "Dataset {} has inline columns, ignoring {}",
                    dataset.table_name,
                    csv_path
                );
                continue;
            }
            let base = base_dir.ok_or_else(|| ChartError::ConfigValidationError {
                field: format!("datasets.{}.columns_csv", dataset.table_name),
                message: "CSV column files need a catalog file location".to_string(),
            })?;
            let file = std::fs::File::open(base.join(csv_path))?;
            dataset.columns = read_columns_csv(file)?;
        }

        catalog.validate()?;
        Ok(catalog)
    }

    pub fn resolve(&self, name: &str) -> Result<&Dataset> {
        let wanted = normalize_name(name);
        self.datasets
            .iter()
            .find(|d| d.names().any(|n| normalize_name(n) == wanted))
            .ok_or_else(|| ChartError::UnknownDataset {
                name: name.to_string(),
                known: self.known_names(),
            })
    }

    pub fn known_names(&self) -> String {
        self.datasets
            .iter()
            .map(|d| match d.display_name.as_deref() {
                Some(display) => format!("{} ({})", display, d.table_name),
                None => d.table_name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn format_summary(&self) -> String {
        self.datasets
            .iter()
            .map(Dataset::summary_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every column of every dataset as CSV rows.
    pub fn write_columns_csv<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record([
            "dataset",
            "column_name",
            "type",
            "is_dttm",
            "description",
        ])?;
        for dataset in &self.datasets {
            for column in &dataset.columns {
                let is_dttm = column.is_temporal().to_string();
                csv_writer.write_record([
                    dataset.table_name.as_str(),
                    column.column_name.as_str(),
                    column.column_type.as_str(),
                    is_dttm.as_str(),
                    column.description.as_deref().unwrap_or(""),
                ])?;
            }
        }
        csv_writer.flush()?;
        Ok(())
    }
}

impl Validate for Catalog {
    fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for dataset in &self.datasets {
            validate_non_empty_string("datasets.table_name", &dataset.table_name)?;
            if dataset.id <= 0 {
                return Err(ChartError::InvalidConfigValueError {
                    field: format!("datasets.{}.id", dataset.table_name),
                    value: dataset.id.to_string(),
                    reason: "Dataset id must be positive".to_string(),
                });
            }
            if !ids.insert(dataset.id) {
                return Err(ChartError::ConfigValidationError {
                    field: format!("datasets.{}.id", dataset.table_name),
                    message: format!("Duplicate dataset id {}", dataset.id),
                });
            }
            if dataset.columns.is_empty() {
                return Err(ChartError::ConfigValidationError {
                    field: format!("datasets.{}.columns", dataset.table_name),
                    message: "Dataset has no columns".to_string(),
                });
            }
            let mut names = HashSet::new();
            for column in &dataset.columns {
                validate_non_empty_string("columns.column_name", &column.column_name)?;
                if !names.insert(column.column_name.as_str()) {
                    return Err(ChartError::ConfigValidationError {
                        field: format!("datasets.{}.columns", dataset.table_name),
                        message: format!("Duplicate column {}", column.column_name),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn sample_dataset() -> Dataset {
        Dataset {
            id: 7,
            table_name: "loan_trn_orders".to_string(),
            display_name: Some("loan order".to_string()),
            aliases: vec!["pinjaman".to_string()],
            description: Some("Loan orders".to_string()),
            database: Some("core".to_string()),
            schema: None,
            columns_csv: None,
            columns: vec![
                Column::new("order_id", "BIGINT"),
                Column::new("branch_name", "VARCHAR(100)"),
                Column::new("order_date", "TIMESTAMP").temporal(),
                Column::new("loan_amount", "DECIMAL(18,2)"),
            ],
        }
    }

    #[test]
    fn test_builtin_catalog_has_reference_datasets() {
        let catalog = Catalog::builtin().unwrap();
        assert!(catalog.resolve("saving account").is_ok());
        assert!(catalog.resolve("loan order").is_ok());
        assert!(catalog.resolve("collateral").is_ok());
        assert_eq!(
            catalog.resolve("sav_trn_accounts").unwrap().table_name,
            "sav_trn_accounts"
        );
    }

    #[test]
    fn test_resolve_normalizes_names() {
        let catalog = Catalog::new(vec![sample_dataset()]);
        assert_eq!(catalog.resolve("Loan  Order").unwrap().id, 7);
        assert_eq!(catalog.resolve("LOAN-TRN-ORDERS").unwrap().id, 7);
        assert_eq!(catalog.resolve("pinjaman").unwrap().id, 7);

        let err = catalog.resolve("deposits").unwrap_err();
        match err {
            ChartError::UnknownDataset { known, .. } => {
                assert!(known.contains("loan order (loan_trn_orders)"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_column_lookups() {
        let dataset = sample_dataset();
        assert_eq!(dataset.first_temporal().unwrap().column_name, "order_date");
        assert_eq!(dataset.first_numeric().unwrap().column_name, "order_id");
        assert_eq!(
            dataset.first_categorical(None).unwrap().column_name,
            "branch_name"
        );
        assert!(dataset.first_categorical(Some("branch_name")).is_none());
        assert!(dataset.require_column("missing").is_err());
        assert_eq!(
            dataset.column("LOAN_AMOUNT").unwrap().column_name,
            "loan_amount"
        );
    }

    #[test]
    fn test_effective_id_is_stable() {
        let column = Column::new("branch_name", "VARCHAR");
        assert_eq!(column.effective_id(), column.clone().effective_id());
        assert!((0..10_000).contains(&column.effective_id()));

        let mut explicit = column;
        explicit.id = Some(42);
        assert_eq!(explicit.effective_id(), 42);
    }

    #[test]
    fn test_summary_line_format() {
        let mut dataset = sample_dataset();
        assert_eq!(
            dataset.summary_line(),
            "loan_trn_orders(Loan orders): [order_id(BIGINT), branch_name(VARCHAR(100)), \
             order_date(TIMESTAMP), loan_amount(DECIMAL(18,2))] [DB:core]"
        );

        dataset.description = Some("x".repeat(90));
        dataset.database = None;
        for i in 0..20 {
            dataset.columns.push(Column::new(format!("c{i}"), "INT"));
        }
        let line = dataset.summary_line();
        assert!(line.starts_with(&format!("loan_trn_orders({}...)", "x".repeat(80))));
        assert!(line.ends_with(", +7_more]"));
        assert!(!line.contains("[DB:"));
    }

    #[test]
    fn test_describe_dataset() {
        let text = sample_dataset().describe();
        assert!(text.starts_with("Dataset: loan_trn_orders\nDatabase: core\nColumns:\n"));
        assert!(text.contains("- order_date (TIMESTAMP)"));
        assert!(text.ends_with("Dataset ID: 7\nTotal Columns: 4"));
    }

    #[test]
    fn test_validation_rejects_duplicates() {
        let mut duplicate = sample_dataset();
        duplicate.columns.push(Column::new("order_id", "BIGINT"));
        assert!(Catalog::new(vec![duplicate]).validate().is_err());

        let catalog = Catalog::new(vec![sample_dataset(), sample_dataset()]);
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_columns_from_csv_file() {
        let dir = TempDir::new().unwrap();
        let mut csv_file = std::fs::File::create(dir.path().join("coll.csv")).unwrap();
        writeln!(csv_file, "column_name,type,is_dttm,description").unwrap();
        writeln!(csv_file, "collateral_id,BIGINT,false,").unwrap();
        writeln!(csv_file, "appraisal_date,DATE,true,Tanggal taksasi").unwrap();
        writeln!(csv_file, "collateral_type,,,").unwrap();

        let toml_content = r#"
[[datasets]]
id = 3
table_name = "coll_collaterals"
columns_csv = "coll.csv"
"#;
        let catalog_path = dir.path().join("catalog.toml");
        std::fs::write(&catalog_path, toml_content).unwrap();

        let catalog = Catalog::from_file(&catalog_path).unwrap();
        let dataset = catalog.resolve("coll_collaterals").unwrap();
        assert_eq!(dataset.columns.len(), 3);
        assert!(dataset.columns[1].is_dttm);
        assert_eq!(dataset.columns[2].column_type, "VARCHAR");
        assert_eq!(
            dataset.columns[1].description.as_deref(),
            Some("Tanggal taksasi")
        );
    }

    #[test]
    fn test_csv_reference_needs_base_dir() {
        let toml_content = r#"
[[datasets]]
id = 3
table_name = "coll_collaterals"
columns_csv = "coll.csv"
"#;
        assert!(Catalog::from_toml_str(toml_content, None).is_err());
    }

    #[test]
    fn test_write_columns_csv() {
        let catalog = Catalog::new(vec![sample_dataset()]);
        let mut out = Vec::new();
        catalog.write_columns_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("dataset,column_name,type,is_dttm,description\n"));
        assert!(text.contains("loan_trn_orders,order_date,TIMESTAMP,true,"));
    }
}
