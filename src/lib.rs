pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::cli::LocalStorage;
#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{toml_config::TomlConfig, RunConfig};

pub use core::bundle::BundleExporter;
pub use core::catalog::Catalog;
pub use core::compiler::{ChartCompiler, CompilerSettings};
pub use core::{engine::ChartEngine, pipeline::PromptPipeline};
pub use domain::model::{ChartPayload, ChartRequest, CompiledChart};
pub use utils::error::{ChartError, Result};
