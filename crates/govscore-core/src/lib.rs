//! Core domain model for govscore: forum posts, proposals, votes and the
//! derived joined records and scorecards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

pub mod choice;
pub mod distribution;

pub use choice::VoteChoice;
pub use distribution::{round_to, VoteDistribution, UNKNOWN_LABEL};

pub const CRATE_NAME: &str = "govscore-core";

/// Tunable constants shared by the linker and the scorecard builder.
///
/// Defaults describe the Optimism Collective space; every other governance
/// space needs at least its own `reference_supply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Half-width of the forum matching window around `Proposal::created`.
    pub day_window_days: i64,
    /// Token supply used as the turnout denominator.
    pub reference_supply: f64,
    /// Votes strictly below this power count as low-vp votes.
    pub low_vp_threshold: f64,
    /// Votes at or above this power are reported as whale support.
    pub whale_threshold: f64,
    pub summary_max_chars: usize,
    pub discourse_base_url: String,
    pub snapshot_base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            day_window_days: 3,
            reference_supply: 10_000_000.0,
            low_vp_threshold: 0.01,
            whale_threshold: 500_000.0,
            summary_max_chars: 280,
            discourse_base_url: "https://gov.optimism.io".to_string(),
            snapshot_base_url: "https://snapshot.org".to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("reference_supply must be positive, got {0}")]
    ReferenceSupply(f64),
    #[error("day_window_days must be between 0 and 36500, got {0}")]
    DayWindow(i64),
    #[error("summary_max_chars must be at least 1")]
    SummaryLength,
    #[error("{name} must be a finite non-negative number, got {value}")]
    Threshold { name: &'static str, value: f64 },
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.reference_supply.is_finite() && self.reference_supply > 0.0) {
            return Err(ConfigError::ReferenceSupply(self.reference_supply));
        }
        if !(0..=36_500).contains(&self.day_window_days) {
            return Err(ConfigError::DayWindow(self.day_window_days));
        }
        if self.summary_max_chars == 0 {
            return Err(ConfigError::SummaryLength);
        }
        for (name, value) in [
            ("low_vp_threshold", self.low_vp_threshold),
            ("whale_threshold", self.whale_threshold),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Threshold { name, value });
            }
        }
        Ok(())
    }

    pub fn day_window_millis(&self) -> i64 {
        self.day_window_days.saturating_mul(86_400_000)
    }

    pub fn discourse_url(&self, topic_slug: &str, topic_id: i64, post_number: i64) -> String {
        format!(
            "{}/t/{topic_slug}/{topic_id}/{post_number}",
            self.discourse_base_url.trim_end_matches('/')
        )
    }

    pub fn snapshot_url(&self, space_id: &str, proposal_id: &str) -> String {
        format!(
            "{}/#/{space_id}/proposal/{proposal_id}",
            self.snapshot_base_url.trim_end_matches('/')
        )
    }
}

/// Violations of the proposal input contract. These are never papered over.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("proposal record is not a JSON object")]
    NotAnObject,
    #[error("proposal {id} is missing required field `{field}`")]
    MissingField { id: String, field: &'static str },
    #[error("proposal {id} has invalid field `{field}`: expected {expected}")]
    InvalidField {
        id: String,
        field: &'static str,
        expected: &'static str,
    },
    #[error("proposal {id} could not be decoded: {source}")]
    Malformed {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One forum post as emitted by the forum crawler. Every field is optional at
/// the boundary; unknown fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ForumPost {
    #[serde(default)]
    pub topic_id: Option<i64>,
    #[serde(default)]
    pub topic_slug: Option<String>,
    #[serde(default)]
    pub topic_title: Option<String>,
    #[serde(default)]
    pub post_number: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub raw: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl ForumPost {
    /// Parsed `created_at`; `None` when absent or not RFC 3339.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Space {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// A governance proposal from the voting platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    pub created: i64,
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub end: Option<i64>,
    /// Choice labels; vote encodings index them from 1.
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<String>,
    #[serde(rename = "type", default)]
    pub voting_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub strategies: Vec<JsonValue>,
    #[serde(default)]
    pub space: Option<Space>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Proposal {
    /// Decodes a raw proposal record, enforcing the `id`/`created` contract.
    pub fn from_json(value: JsonValue) -> Result<Self, ContractError> {
        let object = value.as_object().ok_or(ContractError::NotAnObject)?;
        let id = match object.get("id") {
            None | Some(JsonValue::Null) => {
                return Err(ContractError::MissingField {
                    id: "<unknown>".to_string(),
                    field: "id",
                })
            }
            Some(JsonValue::String(id)) if !id.is_empty() => id.clone(),
            Some(_) => {
                return Err(ContractError::InvalidField {
                    id: "<unknown>".to_string(),
                    field: "id",
                    expected: "a non-empty string",
                })
            }
        };
        match object.get("created") {
            None | Some(JsonValue::Null) => {
                return Err(ContractError::MissingField {
                    id,
                    field: "created",
                })
            }
            Some(created) if created.as_i64().is_none() => {
                return Err(ContractError::InvalidField {
                    id,
                    field: "created",
                    expected: "integer epoch seconds",
                })
            }
            Some(_) => {}
        }
        serde_json::from_value(value).map_err(|source| ContractError::Malformed { id, source })
    }

    pub fn space_id(&self) -> Option<&str> {
        self.space.as_ref().and_then(|space| space.id.as_deref())
    }
}

/// One vote record. `proposal_id` is added by the crawler, not the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub voter: String,
    #[serde(default)]
    pub choice: VoteChoice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    pub proposal_id: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Vote {
    /// Voting power with a missing `vp` read as zero.
    pub fn voting_power(&self) -> f64 {
        self.vp.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingResult {
    pub winning_choice: Option<String>,
    pub total_voters: usize,
    pub total_voting_power: f64,
    pub turnout_percent: f64,
    pub vote_distribution: VoteDistribution,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VoterStats {
    pub unique_voters: usize,
    pub voters_with_multiple_votes: usize,
    pub low_vp_votes: usize,
    /// Choice entries dropped because their index or weight did not parse.
    #[serde(default)]
    pub malformed_choice_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingBlock {
    #[serde(rename = "type")]
    pub voting_type: Option<String>,
    pub strategies: Vec<JsonValue>,
    pub start_utc: Option<String>,
    pub end_utc: Option<String>,
    pub choices: Vec<String>,
    pub result: VotingResult,
    pub voter_stats: VoterStats,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Engagement {
    pub discourse_post_count: usize,
    pub unique_posters: usize,
    pub discussion_start: Option<String>,
    pub discussion_end: Option<String>,
}

/// Linker output: one proposal with its forum discussion and votes attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedProposal {
    pub proposal_id: String,
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    pub discourse_url: Option<String>,
    pub created: i64,
    pub snapshot_author: Option<String>,
    pub choices: Vec<String>,
    #[serde(default)]
    pub space: Space,
    pub voting: VotingBlock,
    pub engagement: Engagement,
    pub votes: Vec<Vote>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorecardStatus {
    Passed,
    Undecided,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SybilSignals {
    pub num_low_vp_votes: usize,
    pub threshold_vp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotableBehaviors {
    pub whale_support: Vec<String>,
    pub sybil_signals: SybilSignals,
    pub repeat_voters: usize,
    pub controversy_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorecardVoting {
    #[serde(rename = "type")]
    pub voting_type: Option<String>,
    pub start_utc: Option<String>,
    pub end_utc: Option<String>,
    pub choices: Vec<String>,
    pub result: VotingResult,
}

/// Report-facing projection of a [`JoinedProposal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    pub proposal_id: String,
    pub dao_space: String,
    pub snapshot_url: String,
    pub discourse_url: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Proposal creation time, epoch seconds.
    pub created_utc: i64,
    pub summary: String,
    pub voting: ScorecardVoting,
    pub engagement: Engagement,
    pub notable_behaviors: NotableBehaviors,
    pub status: ScorecardStatus,
}

/// Reads an explicit `null` the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// RFC 3339 rendering of epoch seconds, e.g. `2024-01-01T00:00:00+00:00`.
pub fn format_epoch_utc(ts: Option<i64>) -> Option<String> {
    ts.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn proposal_without_created_is_a_contract_violation() {
        let err = Proposal::from_json(json!({"id": "0xabc", "title": "t"})).unwrap_err();
        assert!(matches!(err, ContractError::MissingField { field: "created", .. }));
        assert!(err.to_string().contains("0xabc"));
    }

    #[test]
    fn proposal_without_id_is_a_contract_violation() {
        let err = Proposal::from_json(json!({"created": 1})).unwrap_err();
        assert!(matches!(err, ContractError::MissingField { field: "id", .. }));
        let err = Proposal::from_json(json!({"id": 7, "created": 1})).unwrap_err();
        assert!(matches!(err, ContractError::InvalidField { field: "id", .. }));
    }

    #[test]
    fn proposal_decodes_space_and_passthrough_fields() {
        let proposal = Proposal::from_json(json!({
            "id": "p1",
            "created": 1_000_000,
            "choices": ["Yes", "No"],
            "type": "single-choice",
            "space": {"id": "opcollective.eth", "name": "Optimism Collective"},
            "plugins": {}
        }))
        .unwrap();
        assert_eq!(proposal.space_id(), Some("opcollective.eth"));
        assert_eq!(proposal.voting_type.as_deref(), Some("single-choice"));
        assert!(proposal.extra.contains_key("plugins"));
    }

    #[test]
    fn null_choices_and_strategies_decode_as_empty() {
        let proposal = Proposal::from_json(json!({
            "id": "p1", "created": 1, "choices": null, "strategies": null, "space": null
        }))
        .unwrap();
        assert!(proposal.choices.is_empty());
        assert!(proposal.strategies.is_empty());
        assert_eq!(proposal.space_id(), None);
    }

    #[test]
    fn vote_without_id_or_created_serializes_without_nulls() {
        let raw = json!({"voter": "a", "choice": 1, "proposal_id": "p1"});
        let vote: Vote = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&vote).unwrap(), raw);
    }

    #[test]
    fn day_window_saturates_instead_of_overflowing() {
        let config = EngineConfig {
            day_window_days: i64::MAX,
            ..Default::default()
        };
        assert_eq!(config.day_window_millis(), i64::MAX);
        assert_eq!(EngineConfig::default().day_window_millis(), 259_200_000);
    }

    #[test]
    fn vote_missing_vp_reads_as_zero_and_keeps_extra_fields() {
        let vote: Vote = serde_json::from_value(json!({
            "id": "v1", "voter": "0xa", "choice": 1, "created": 5,
            "proposal_id": "p1", "reason": "lgtm"
        }))
        .unwrap();
        assert_eq!(vote.voting_power(), 0.0);
        let back = serde_json::to_value(&vote).unwrap();
        assert_eq!(back["reason"], "lgtm");
        assert_eq!(back["choice"], 1);
    }

    #[test]
    fn forum_post_timestamp_parsing_accepts_zulu_and_offsets() {
        let post = ForumPost {
            created_at: Some("2024-03-01T12:00:00.250Z".into()),
            ..Default::default()
        };
        assert_eq!(post.created_at_utc().unwrap().timestamp_millis(), 1_709_294_400_250);
        let bad = ForumPost {
            created_at: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(bad.created_at_utc().is_none());
    }

    #[test]
    fn engine_config_validation_and_partial_yaml() {
        let config: EngineConfig = serde_yaml::from_str("reference_supply: 4000000\n").unwrap();
        assert_eq!(config.reference_supply, 4_000_000.0);
        assert_eq!(config.day_window_days, 3);
        assert!(config.validate().is_ok());

        let bad = EngineConfig {
            reference_supply: 0.0,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(ConfigError::ReferenceSupply(0.0)));
    }

    #[test]
    fn urls_tolerate_trailing_slashes() {
        let config = EngineConfig {
            discourse_base_url: "https://gov.optimism.io/".into(),
            ..Default::default()
        };
        assert_eq!(
            config.discourse_url("season-5", 42, 1),
            "https://gov.optimism.io/t/season-5/42/1"
        );
        assert_eq!(
            config.snapshot_url("opcollective.eth", "0x1"),
            "https://snapshot.org/#/opcollective.eth/proposal/0x1"
        );
    }

    #[test]
    fn epoch_formatting_matches_offset_style() {
        assert_eq!(
            format_epoch_utc(Some(0)).as_deref(),
            Some("1970-01-01T00:00:00+00:00")
        );
        assert_eq!(format_epoch_utc(None), None);
    }
}
