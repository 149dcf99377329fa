mod adapter;
mod dryrun;
mod engine;
mod gemini;

pub use adapter::{default_adapter_registry, AdapterRegistry, EditAdapter, EditFailure, EditRequest};
pub use dryrun::DryrunAdapter;
pub use engine::{EditEngine, EngineOptions, SubmitError};
pub use gemini::{GeminiAdapter, GeminiConfig};
