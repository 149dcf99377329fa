use super::turn::{SessionMode, Turn};

/// Where the next turn's `original_url` comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainAnchor {
    Known(String),
    /// First generation of a ledger: the chain is anchored on its own result.
    FromResult,
}

/// Outcome of [`compute_source_for_next_turn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePlan {
    pub source_url: Option<String>,
    pub anchor: ChainAnchor,
}

impl SourcePlan {
    pub fn original_url(&self, edited_url: &str) -> String {
        match &self.anchor {
            ChainAnchor::Known(url) => url.clone(),
            ChainAnchor::FromResult => edited_url.to_string(),
        }
    }

    /// True when the plan starts a chain rather than extending the last turn's.
    pub fn starts_chain(&self, last_turn: Option<&Turn>) -> bool {
        match (&self.anchor, last_turn) {
            (ChainAnchor::FromResult, _) | (_, None) => true,
            (ChainAnchor::Known(url), Some(last)) => *url != last.original_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("Something went wrong, the main image is missing.")]
    MissingAnchor,
}

/// Decides which image feeds the next edit and which anchor the new turn
/// belongs to.
pub fn compute_source_for_next_turn(
    mode: SessionMode,
    anchor_url: Option<&str>,
    last_turn: Option<&Turn>,
) -> Result<SourcePlan, SourceError> {
    match mode {
        SessionMode::Editor => {
            let anchor = anchor_url.ok_or(SourceError::MissingAnchor)?;
            let source = match last_turn {
                Some(last) if last.original_url == anchor => last.edited_url.clone(),
                _ => anchor.to_string(),
            };
            Ok(SourcePlan {
                source_url: Some(source),
                anchor: ChainAnchor::Known(anchor.to_string()),
            })
        }
        SessionMode::Generator => Ok(match last_turn {
            None => SourcePlan {
                source_url: None,
                anchor: ChainAnchor::FromResult,
            },
            Some(last) => SourcePlan {
                source_url: Some(last.edited_url.clone()),
                anchor: ChainAnchor::Known(last.original_url.clone()),
            },
        }),
    }
}
