use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Edits chain off a user-supplied main image.
    Editor,
    /// Text-to-image; later turns refine the previous result.
    Generator,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Editor => "editor",
            SessionMode::Generator => "generator",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "editor" | "edit" => Ok(SessionMode::Editor),
            "generator" | "generate" => Ok(SessionMode::Generator),
            other => Err(format!(
                "unknown session mode '{other}' (expected 'editor' or 'generator')"
            )),
        }
    }
}

/// One completed prompt → image step.
///
/// Field names serialize in camelCase so persisted ledgers keep the same shape
/// the history has always had on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: u64,
    /// Anchor of the chain this turn belongs to.
    pub original_url: String,
    /// Image fed to the model for this turn; `None` for pure generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub prompt: String,
    pub edited_url: String,
    #[serde(default)]
    pub reference_image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SessionMode>,
}
