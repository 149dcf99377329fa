use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use retouch_contracts::images::ImageData;

use crate::dryrun::DryrunAdapter;
use crate::gemini::{GeminiAdapter, GeminiConfig};

/// One edit/generation call: images in submission order (source first, then
/// references) and a single prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    pub model: String,
    pub images: Vec<ImageData>,
    pub prompt: String,
}

/// Classified adapter failure. The message of each variant is what the user
/// sees; none of them is retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditFailure {
    #[error(
        "Your request was blocked for safety reasons. Please try a different image or prompt. (Details: {})",
        .reason.as_deref().unwrap_or("Not provided")
    )]
    BlockedBySafety { reason: Option<String> },

    #[error("The AI couldn't generate a unique image. This can happen if the result is too similar to a copyrighted image. Please try a more descriptive or different prompt.")]
    BlockedByRecitation,

    #[error("The AI model did not return an image.{}", empty_detail(.detail))]
    EmptyResponse { detail: Option<String> },

    #[error("{0}")]
    TransportError(String),
}

fn empty_detail(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(" ({detail})"),
        None => String::new(),
    }
}

pub trait EditAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn edit(&self, request: &EditRequest) -> Result<ImageData, EditFailure>;
}

impl<T: EditAdapter + ?Sized> EditAdapter for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn edit(&self, request: &EditRequest) -> Result<ImageData, EditFailure> {
        (**self).edit(request)
    }
}

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Box<dyn EditAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<A: EditAdapter + 'static>(&mut self, adapter: A) {
        self.adapters
            .insert(adapter.name().to_string(), Box::new(adapter));
    }

    pub fn get(&self, name: &str) -> Option<&dyn EditAdapter> {
        self.adapters.get(name).map(|adapter| adapter.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }
}

pub fn default_adapter_registry(request_timeout: Option<Duration>) -> AdapterRegistry {
    let mut adapters = AdapterRegistry::new();
    adapters.register(DryrunAdapter);
    let mut gemini = GeminiConfig::from_env();
    gemini.timeout = request_timeout;
    adapters.register(GeminiAdapter::new(gemini));
    adapters
}
