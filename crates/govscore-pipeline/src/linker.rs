//! Joins proposals with forum discussion and their votes.

use std::collections::{HashMap, HashSet};

use govscore_adapters::index_votes_by_proposal;
use govscore_core::{
    format_epoch_utc, round_to, EngineConfig, Engagement, ForumPost, JoinedProposal, Proposal,
    Vote, VoterStats, VotingBlock, VotingResult,
};
use tracing::{debug, warn};

use crate::normalize::tally_votes;

/// Forum post with its timestamp parsed once up front.
#[derive(Debug, Clone, Copy)]
struct TimedPost<'a> {
    post: &'a ForumPost,
    created_ms: i64,
}

pub struct Linker {
    config: EngineConfig,
}

impl Linker {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// One joined record per proposal, in input order.
    pub fn link(
        &self,
        proposals: &[Proposal],
        forum_posts: &[ForumPost],
        votes: &[Vote],
    ) -> Vec<JoinedProposal> {
        let timed = timed_posts(forum_posts);
        let votes_by_proposal = index_votes_by_proposal(votes);
        proposals
            .iter()
            .map(|proposal| {
                let proposal_votes = votes_by_proposal
                    .get(proposal.id.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                self.link_one(proposal, &timed, proposal_votes)
            })
            .collect()
    }

    fn link_one(
        &self,
        proposal: &Proposal,
        posts: &[TimedPost<'_>],
        votes: &[&Vote],
    ) -> JoinedProposal {
        let matching = self.matching_posts(proposal.created, posts);
        let discourse_url = matching.iter().find_map(|timed| {
            let post = timed.post;
            match (&post.topic_slug, post.topic_id, post.post_number) {
                (Some(slug), Some(topic_id), Some(post_number)) => {
                    Some(self.config.discourse_url(slug, topic_id, post_number))
                }
                _ => None,
            }
        });

        let (result, voter_stats) = self.voting_result(proposal, votes);
        debug!(
            proposal_id = %proposal.id,
            matched_posts = matching.len(),
            votes = votes.len(),
            "proposal linked"
        );

        JoinedProposal {
            proposal_id: proposal.id.clone(),
            title: proposal.title.clone(),
            body: proposal.body.clone(),
            discourse_url,
            created: proposal.created,
            snapshot_author: proposal.author.clone(),
            choices: proposal.choices.clone(),
            space: proposal.space.clone().unwrap_or_default(),
            voting: VotingBlock {
                voting_type: proposal.voting_type.clone(),
                strategies: proposal.strategies.clone(),
                start_utc: format_epoch_utc(proposal.start),
                end_utc: format_epoch_utc(proposal.end),
                choices: proposal.choices.clone(),
                result,
                voter_stats,
            },
            engagement: engagement(&matching),
            votes: votes.iter().map(|vote| (*vote).clone()).collect(),
        }
    }

    /// Posts whose `created_at` lies within the inclusive window around
    /// `created`, in input order.
    fn matching_posts<'a>(&self, created: i64, posts: &[TimedPost<'a>]) -> Vec<TimedPost<'a>> {
        let center = created.saturating_mul(1000);
        let window = self.config.day_window_millis();
        let (earliest, latest) = (center.saturating_sub(window), center.saturating_add(window));
        posts
            .iter()
            .filter(|timed| (earliest..=latest).contains(&timed.created_ms))
            .copied()
            .collect()
    }

    fn voting_result(&self, proposal: &Proposal, votes: &[&Vote]) -> (VotingResult, VoterStats) {
        let tally = tally_votes(votes, &proposal.choices);
        if tally.unrecognized_votes > 0 {
            debug!(
                proposal_id = %proposal.id,
                unrecognized = tally.unrecognized_votes,
                "votes with unrecognized choice shapes counted in totals only"
            );
        }
        let total_vp: f64 = votes.iter().map(|vote| vote.voting_power()).sum();
        let turnout_percent = if total_vp == 0.0 {
            0.0
        } else {
            round_to(total_vp / self.config.reference_supply * 100.0, 2)
        };

        let mut per_voter: HashMap<&str, usize> = HashMap::new();
        for vote in votes {
            *per_voter.entry(vote.voter.as_str()).or_default() += 1;
        }
        let low_vp_votes = votes
            .iter()
            .filter(|vote| vote.voting_power() < self.config.low_vp_threshold)
            .count();

        let result = VotingResult {
            winning_choice: tally.distribution.leader().map(str::to_string),
            total_voters: votes.len(),
            total_voting_power: round_to(total_vp, 2),
            turnout_percent,
            vote_distribution: tally.distribution.rounded(2),
        };
        let stats = VoterStats {
            unique_voters: per_voter.len(),
            voters_with_multiple_votes: per_voter.values().filter(|count| **count > 1).count(),
            low_vp_votes,
            malformed_choice_entries: tally.malformed_entries,
        };
        (result, stats)
    }
}

fn timed_posts(forum_posts: &[ForumPost]) -> Vec<TimedPost<'_>> {
    let mut unparseable = 0usize;
    let timed = forum_posts
        .iter()
        .filter_map(|post| {
            post.created_at.as_ref()?;
            match post.created_at_utc() {
                Some(ts) => Some(TimedPost {
                    post,
                    created_ms: ts.timestamp_millis(),
                }),
                None => {
                    unparseable += 1;
                    None
                }
            }
        })
        .collect();
    if unparseable > 0 {
        warn!(unparseable, "forum posts with unparseable created_at never match a proposal");
    }
    timed
}

fn engagement(matching: &[TimedPost<'_>]) -> Engagement {
    let unique_posters: HashSet<&str> = matching
        .iter()
        .filter_map(|timed| timed.post.username.as_deref())
        .collect();
    let first = matching.iter().min_by_key(|timed| timed.created_ms);
    let last = matching.iter().rev().max_by_key(|timed| timed.created_ms);
    Engagement {
        discourse_post_count: matching.len(),
        unique_posters: unique_posters.len(),
        discussion_start: first.and_then(|timed| timed.post.created_at.clone()),
        discussion_end: last.and_then(|timed| timed.post.created_at.clone()),
    }
}
