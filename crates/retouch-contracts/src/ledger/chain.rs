use super::turn::Turn;

/// A maximal run of consecutive turns sharing one anchor image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainGroup<'a> {
    pub original_url: &'a str,
    pub turns: Vec<&'a Turn>,
}

/// Partitions the ledger into consecutive runs that share `original_url`.
///
/// Only adjacent turns are merged: an anchor that reappears after a different
/// chain opens a new group.
pub fn group_by_chain(turns: &[Turn]) -> Vec<ChainGroup<'_>> {
    let mut groups: Vec<ChainGroup<'_>> = Vec::new();
    for turn in turns {
        match groups.last_mut() {
            Some(group) if group.original_url == turn.original_url => group.turns.push(turn),
            _ => groups.push(ChainGroup {
                original_url: turn.original_url.as_str(),
                turns: vec![turn],
            }),
        }
    }
    groups
}
