mod chain;
mod source;
mod turn;

use serde::{Deserialize, Serialize};

pub use chain::{group_by_chain, ChainGroup};
pub use source::{compute_source_for_next_turn, ChainAnchor, SourceError, SourcePlan};
pub use turn::{SessionMode, Turn};

/// Flat, creation-ordered list of completed turns.
///
/// Chain consistency is the caller's responsibility; `append` does not check it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    turns: Vec<Turn>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        self.turns.as_slice()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn chains(&self) -> Vec<ChainGroup<'_>> {
        group_by_chain(&self.turns)
    }

    /// Next turn id for a clock reading of `now_ms`, strictly greater than the
    /// last stored id (saturating at `u64::MAX`).
    pub fn next_turn_id(&self, now_ms: u64) -> u64 {
        match self.last() {
            Some(last) if last.id >= now_ms => last.id.saturating_add(1),
            _ => now_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Ledger, Turn};

    fn turn(id: u64) -> Turn {
        Turn {
            id,
            original_url: "a.png".to_string(),
            source_url: Some("a.png".to_string()),
            prompt: "p".to_string(),
            edited_url: format!("e{id}.png"),
            reference_image_urls: Vec::new(),
            mode: None,
        }
    }

    #[test]
    fn append_preserves_creation_order() {
        let mut ledger = Ledger::new();
        ledger.append(turn(1));
        ledger.append(turn(2));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.last().map(|t| t.id), Some(2));
        ledger.clear();
        assert!(ledger.is_empty());
    }

    #[test]
    fn next_turn_id_is_strictly_increasing() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.next_turn_id(100), 100);
        ledger.append(turn(100));
        assert_eq!(ledger.next_turn_id(100), 101);
        assert_eq!(ledger.next_turn_id(50), 101);
        assert_eq!(ledger.next_turn_id(500), 500);
    }

    #[test]
    fn next_turn_id_saturates_on_max_stored_id() {
        let ledger = Ledger::from_turns(vec![turn(u64::MAX)]);
        assert_eq!(ledger.next_turn_id(100), u64::MAX);
    }

    #[test]
    fn ledger_serializes_as_plain_array() -> anyhow::Result<()> {
        let ledger = Ledger::from_turns(vec![turn(1)]);
        let value = serde_json::to_value(&ledger)?;
        assert!(value.is_array());
        let parsed: Ledger = serde_json::from_value(value)?;
        assert_eq!(parsed, ledger);
        Ok(())
    }
}
