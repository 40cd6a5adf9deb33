pub mod bundle;
pub mod catalog;
pub mod chart_types;
pub mod compiler;
pub mod engine;
pub mod form_data;
pub mod metric;
pub mod pipeline;
pub mod prompt;
pub mod query_context;
pub mod requirements;
pub mod validator;

pub use crate::domain::model::{CompileResult, CompiledChart, PromptSource};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
