use crate::types::{CandidateRecord, CatalogEntry};
use serde::Serialize;

/// Which tie-break rule selected the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    InventoryNumber,
    Title,
    FirstResult,
}

impl MatchRule {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchRule::InventoryNumber => "inventory_number",
            MatchRule::Title => "title",
            MatchRule::FirstResult => "first_result",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome<'a> {
    Matched {
        candidate: &'a CandidateRecord,
        rule: MatchRule,
    },
    NoMatch,
}

impl<'a> MatchOutcome<'a> {
    pub fn candidate(&self) -> Option<&'a CandidateRecord> {
        match self {
            MatchOutcome::Matched { candidate, .. } => Some(*candidate),
            MatchOutcome::NoMatch => None,
        }
    }
}

/// Removes every whitespace character, so `"암사 123"` and `"암사123\n"`
/// compare equal.
pub fn squash_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Containment in either direction. Empty strings never match.
fn mutually_contains(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

/// Among the candidates whose `key` satisfies containment against `needle`,
/// returns the one with the shortest key; ties go to the earliest.
fn closest<'a>(
    needle: &str,
    candidates: &'a [CandidateRecord],
    key: impl Fn(&CandidateRecord) -> &str,
) -> Option<&'a CandidateRecord> {
    let needle = squash_whitespace(needle);
    if needle.is_empty() {
        return None;
    }
    candidates
        .iter()
        .map(|c| (c, squash_whitespace(key(c))))
        .filter(|(_, k)| mutually_contains(&needle, k))
        .min_by_key(|(_, k)| k.chars().count())
        .map(|(c, _)| c)
}

/// Picks the remote record that best corresponds to `entry`.
///
/// Rules, first hit wins: inventory-number containment, title containment,
/// then the service's own first result. An empty candidate list is the only
/// way to get [`MatchOutcome::NoMatch`].
pub fn match_candidate<'a>(entry: &CatalogEntry, candidates: &'a [CandidateRecord]) -> MatchOutcome<'a> {
    if let Some(candidate) = closest(&entry.inventory_number, candidates, |c| c.collection_number.as_str()) {
        return MatchOutcome::Matched {
            candidate,
            rule: MatchRule::InventoryNumber,
        };
    }

    if let Some(candidate) = closest(&entry.title, candidates, |c| c.name.as_str()) {
        return MatchOutcome::Matched {
            candidate,
            rule: MatchRule::Title,
        };
    }

    match candidates.first() {
        Some(candidate) => MatchOutcome::Matched {
            candidate,
            rule: MatchRule::FirstResult,
        },
        None => MatchOutcome::NoMatch,
    }
}
