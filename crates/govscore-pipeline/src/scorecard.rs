//! Projects joined proposals into report-facing scorecards.

use govscore_core::{
    round_to, EngineConfig, JoinedProposal, NotableBehaviors, Scorecard, ScorecardStatus,
    ScorecardVoting, SybilSignals, Vote, VoteDistribution,
};

pub struct ScorecardBuilder {
    config: EngineConfig,
}

impl ScorecardBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn build_all(&self, joined: &[JoinedProposal]) -> Vec<Scorecard> {
        joined.iter().map(|record| self.build(record)).collect()
    }

    pub fn build(&self, joined: &JoinedProposal) -> Scorecard {
        let dao_space = joined.space.id.clone().unwrap_or_else(|| "unknown".to_string());
        let result = &joined.voting.result;
        let status = match result.winning_choice.as_deref() {
            Some(label) if !label.is_empty() => ScorecardStatus::Passed,
            _ => ScorecardStatus::Undecided,
        };

        Scorecard {
            snapshot_url: self.config.snapshot_url(&dao_space, &joined.proposal_id),
            proposal_id: joined.proposal_id.clone(),
            dao_space,
            discourse_url: joined.discourse_url.clone(),
            title: joined.title.clone(),
            author: joined.snapshot_author.clone(),
            created_utc: joined.created,
            summary: extract_summary(
                joined.body.as_deref().unwrap_or_default(),
                self.config.summary_max_chars,
            ),
            voting: ScorecardVoting {
                voting_type: joined.voting.voting_type.clone(),
                start_utc: joined.voting.start_utc.clone(),
                end_utc: joined.voting.end_utc.clone(),
                choices: joined.voting.choices.clone(),
                result: result.clone(),
            },
            engagement: joined.engagement.clone(),
            notable_behaviors: NotableBehaviors {
                whale_support: detect_whales(&joined.votes, self.config.whale_threshold),
                sybil_signals: SybilSignals {
                    num_low_vp_votes: joined.voting.voter_stats.low_vp_votes,
                    threshold_vp: self.config.low_vp_threshold,
                },
                repeat_voters: joined.voting.voter_stats.voters_with_multiple_votes,
                controversy_score: controversy_score(&result.vote_distribution),
            },
            status,
        }
    }
}

/// Collapses `body` onto one line and caps it at `max_chars` characters.
///
/// Over-long text is cut at `max_chars`, backed off to the last space before
/// the cut, and suffixed with `...`.
pub fn extract_summary(body: &str, max_chars: usize) -> String {
    let normalized = body.replace("\r\n", "\n").replace('\r', "\n");
    let summary = normalized.trim().lines().collect::<Vec<_>>().join(" ");
    if summary.chars().count() <= max_chars {
        return summary;
    }
    let cut: String = summary.chars().take(max_chars).collect();
    let head = match cut.rfind(' ') {
        Some(boundary) => &cut[..boundary],
        None => cut.as_str(),
    };
    format!("{head}...")
}

/// Voter address of every vote at or above `threshold`, in vote order.
pub fn detect_whales(votes: &[Vote], threshold: f64) -> Vec<String> {
    votes
        .iter()
        .filter(|vote| vote.voting_power() >= threshold)
        .map(|vote| vote.voter.clone())
        .collect()
}

/// Closeness of the two leading choices: 1.0 for a dead heat, approaching 0.0
/// as one choice dominates. Exactly 0.0 with fewer than two nonzero choices.
pub fn controversy_score(distribution: &VoteDistribution) -> f64 {
    let nonzero = distribution.iter().filter(|(_, power)| *power > 0.0).count();
    if nonzero < 2 {
        return 0.0;
    }
    let mut shares: Vec<f64> = distribution
        .percentages()
        .iter()
        .map(|(_, share)| share)
        .collect();
    shares.sort_by(|a, b| b.total_cmp(a));
    let (top, second) = (shares[0], shares[1]);
    round_to(1.0 - (top - second).abs() / 100.0, 4)
}
