use std::fmt;

use indexmap::IndexMap;

/// What a turn asks of the model: a fresh image from text, or a change to
/// supplied images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Generate,
    Edit,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Generate => "generation",
            Capability::Edit => "editing",
        })
    }
}

/// Image model the session can submit to, and the adapter that serves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<Capability>,
}

impl ModelSpec {
    pub fn new(name: &str, provider: &str, capabilities: &[Capability]) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            capabilities: capabilities.to_vec(),
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("No image model available for {0}.")]
    NoModelFor(Capability),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    /// Set when a model was asked for by name but could not be used.
    pub unavailable: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::from_models([
            ModelSpec::new("gemini-2.5-flash-image", "gemini", &BOTH),
            ModelSpec::new("gemini-3-pro-image-preview", "gemini", &BOTH),
            ModelSpec::new("dryrun-image-1", "dryrun", &BOTH),
        ])
    }
}

const BOTH: [Capability; 2] = [Capability::Generate, Capability::Edit];

impl ModelRegistry {
    /// Registration order matters: the first model supporting a capability is
    /// its default.
    pub fn from_models(models: impl IntoIterator<Item = ModelSpec>) -> Self {
        Self {
            models: models
                .into_iter()
                .map(|model| (model.name.clone(), model))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name.trim())
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn default_for(&self, capability: Capability) -> Option<&ModelSpec> {
        self.models.values().find(|model| model.supports(capability))
    }

    /// Resolves the requested model, falling back to the capability default
    /// when it is unknown or cannot serve `capability`.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: Capability,
    ) -> Result<ModelSelection, ModelError> {
        if let Some(model) = requested
            .and_then(|name| self.get(name))
            .filter(|model| model.supports(capability))
        {
            return Ok(ModelSelection {
                model: model.clone(),
                unavailable: None,
            });
        }
        let model = self
            .default_for(capability)
            .ok_or(ModelError::NoModelFor(capability))?;
        Ok(ModelSelection {
            model: model.clone(),
            unavailable: requested.map(|name| name.trim().to_string()),
        })
    }
}
