//! Vote-choice normalization: every ballot shape becomes `label -> power`.

use govscore_core::{Vote, VoteChoice, VoteDistribution, UNKNOWN_LABEL};
use serde_json::Value as JsonValue;
use tracing::debug;

/// How a single 1-origin index from a ballot resolves against the choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// 0-origin position in the proposal's `choices`.
    Resolved(usize),
    /// Parsed, but outside the choice list. Credited to [`UNKNOWN_LABEL`].
    OutOfRange,
    /// Not an index at all. The entry is dropped.
    Malformed,
}

pub fn resolve_index(raw_index: i64, choice_count: usize) -> IndexOutcome {
    let position = raw_index
        .checked_sub(1)
        .and_then(|zero_based| usize::try_from(zero_based).ok());
    match position {
        Some(position) if position < choice_count => IndexOutcome::Resolved(position),
        _ => IndexOutcome::OutOfRange,
    }
}

fn resolve_entry(value: &JsonValue, choice_count: usize) -> IndexOutcome {
    match parse_entry_index(value) {
        Some(raw) => resolve_index(raw, choice_count),
        None => IndexOutcome::Malformed,
    }
}

/// Integers, integral-valued floats (truncated) and numeric strings.
fn parse_entry_index(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Per-vote normalization result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedVote<'a> {
    pub contributions: Vec<(&'a str, f64)>,
    pub malformed_entries: usize,
}

impl<'a> NormalizedVote<'a> {
    fn push(&mut self, outcome: IndexOutcome, choices: &'a [String], power: f64) {
        match outcome {
            IndexOutcome::Resolved(position) => {
                self.contributions.push((choices[position].as_str(), power))
            }
            IndexOutcome::OutOfRange => self.contributions.push((UNKNOWN_LABEL, power)),
            IndexOutcome::Malformed => self.malformed_entries += 1,
        }
    }
}

/// Splits one ballot into label contributions.
///
/// Single and ranked ballots credit the full `vp` to every selected label;
/// weighted ballots credit `weight * vp` per entry, weights used as given.
pub fn normalize_choice<'a>(choice: &VoteChoice, vp: f64, choices: &'a [String]) -> NormalizedVote<'a> {
    let mut normalized = NormalizedVote::default();
    let count = choices.len();
    match choice {
        VoteChoice::Single(index) => normalized.push(resolve_index(*index, count), choices, vp),
        VoteChoice::OversizedSingle(_) => normalized.push(IndexOutcome::OutOfRange, choices, vp),
        VoteChoice::Ranked(items) => {
            for item in items {
                match item {
                    JsonValue::Array(nested) => {
                        for inner in nested {
                            normalized.push(resolve_entry(inner, count), choices, vp);
                        }
                    }
                    other => normalized.push(resolve_entry(other, count), choices, vp),
                }
            }
        }
        VoteChoice::Weighted(map) => {
            for (key, weight) in map {
                let outcome = match (key.trim().parse::<i64>(), weight.as_f64()) {
                    (Ok(raw), Some(_)) => resolve_index(raw, count),
                    _ => IndexOutcome::Malformed,
                };
                let weight = weight.as_f64().unwrap_or(0.0);
                normalized.push(outcome, choices, weight * vp);
            }
        }
        VoteChoice::Unrecognized(_) => {}
    }
    normalized
}

/// Accumulated distribution over a proposal's votes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tally {
    pub distribution: VoteDistribution,
    pub malformed_entries: usize,
    pub unrecognized_votes: usize,
}

/// Folds all votes into one distribution ordered by choice position, with
/// [`UNKNOWN_LABEL`] after every real choice.
pub fn tally_votes(votes: &[&Vote], choices: &[String]) -> Tally {
    let mut tally = Tally::default();
    for vote in votes {
        if let VoteChoice::Unrecognized(raw) = &vote.choice {
            debug!(vote_id = ?vote.id, raw = %raw, "unrecognized choice shape excluded from distribution");
            tally.unrecognized_votes += 1;
            continue;
        }
        let normalized = normalize_choice(&vote.choice, vote.voting_power(), choices);
        if normalized.malformed_entries > 0 {
            debug!(
                vote_id = ?vote.id,
                kind = vote.choice.kind(),
                skipped = normalized.malformed_entries,
                "malformed choice entries skipped"
            );
        }
        tally.malformed_entries += normalized.malformed_entries;
        for (label, power) in normalized.contributions {
            tally.distribution.credit(label, power);
        }
    }
    tally.distribution.sort_by_rank(|label| {
        choices
            .iter()
            .position(|choice| choice == label)
            .unwrap_or(choices.len())
    });
    tally
}
