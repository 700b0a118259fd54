//! Source adapter contracts for the forum and voting-platform corpora.
//!
//! Crawlers run elsewhere; adapters only read what they leave behind and turn
//! it into typed records, enforcing the proposal input contract on the way.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use govscore_core::{ContractError, ForumPost, Proposal, Vote};
use govscore_storage::JsonlStore;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

pub const CRATE_NAME: &str = "govscore-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{path}:{line}: {source}")]
    Contract {
        path: String,
        line: usize,
        #[source]
        source: ContractError,
    },
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Everything the engine needs from the two crawlers, fully materialized.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub forum_posts: Vec<ForumPost>,
    pub proposals: Vec<Proposal>,
    pub votes: Vec<Vote>,
}

#[async_trait]
pub trait CorpusSource: Send + Sync {
    fn source_id(&self) -> &str;

    async fn load_forum_posts(&self) -> Result<Vec<ForumPost>, AdapterError>;

    async fn load_proposals(&self) -> Result<Vec<Proposal>, AdapterError>;

    async fn load_votes(&self) -> Result<Vec<Vote>, AdapterError>;
}

#[derive(Debug, Clone)]
pub struct CorpusPaths {
    pub forum_posts: PathBuf,
    pub proposals: PathBuf,
    pub votes: PathBuf,
}

impl Default for CorpusPaths {
    fn default() -> Self {
        Self {
            forum_posts: PathBuf::from("discourse_posts.jsonl"),
            proposals: PathBuf::from("proposals.jsonl"),
            votes: PathBuf::from("votes.jsonl"),
        }
    }
}

/// Corpus backed by the crawlers' JSONL output files.
#[derive(Debug, Clone)]
pub struct JsonlCorpus {
    source_id: String,
    store: JsonlStore,
    paths: CorpusPaths,
}

impl JsonlCorpus {
    pub fn new(source_id: impl Into<String>, store: JsonlStore, paths: CorpusPaths) -> Self {
        Self {
            source_id: source_id.into(),
            store,
            paths,
        }
    }
}

#[async_trait]
impl CorpusSource for JsonlCorpus {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn load_forum_posts(&self) -> Result<Vec<ForumPost>, AdapterError> {
        Ok(self.store.read_jsonl(&self.paths.forum_posts).await?)
    }

    async fn load_proposals(&self) -> Result<Vec<Proposal>, AdapterError> {
        let records: Vec<(usize, JsonValue)> =
            self.store.read_jsonl_numbered(&self.paths.proposals).await?;
        decode_proposals(records, &self.store.resolve(&self.paths.proposals))
    }

    async fn load_votes(&self) -> Result<Vec<Vote>, AdapterError> {
        Ok(self.store.read_jsonl(&self.paths.votes).await?)
    }
}

/// Decodes raw proposal lines. The first contract violation aborts the load.
pub fn decode_proposals(
    records: Vec<(usize, JsonValue)>,
    origin: &Path,
) -> Result<Vec<Proposal>, AdapterError> {
    records
        .into_iter()
        .map(|(line, value)| {
            Proposal::from_json(value).map_err(|source| AdapterError::Contract {
                path: origin.display().to_string(),
                line,
                source,
            })
        })
        .collect()
}

pub async fn load_corpus(source: &dyn CorpusSource) -> Result<Corpus, AdapterError> {
    let forum_posts = source.load_forum_posts().await?;
    let proposals = source.load_proposals().await?;
    let votes = source.load_votes().await?;
    info!(
        source_id = source.source_id(),
        forum_posts = forum_posts.len(),
        proposals = proposals.len(),
        votes = votes.len(),
        "corpus loaded"
    );
    Ok(Corpus {
        forum_posts,
        proposals,
        votes,
    })
}

/// Groups votes by `proposal_id`, keeping input order within each group.
pub fn index_votes_by_proposal(votes: &[Vote]) -> HashMap<&str, Vec<&Vote>> {
    let mut by_proposal: HashMap<&str, Vec<&Vote>> = HashMap::new();
    for vote in votes {
        by_proposal
            .entry(vote.proposal_id.as_str())
            .or_default()
            .push(vote);
    }
    by_proposal
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).expect("write fixture");
    }

    fn corpus_in(dir: &Path) -> JsonlCorpus {
        JsonlCorpus::new("opcollective", JsonlStore::new(dir), CorpusPaths::default())
    }

    #[tokio::test]
    async fn loads_all_three_collections() {
        let dir = tempdir().expect("tempdir");
        write(
            dir.path(),
            "discourse_posts.jsonl",
            "{\"topic_id\":1,\"topic_slug\":\"s\",\"post_number\":1,\"username\":\"u\",\"created_at\":\"2024-01-01T00:00:00Z\",\"raw\":\"hi\",\"likes\":3}\n",
        );
        write(
            dir.path(),
            "proposals.jsonl",
            "{\"id\":\"p1\",\"created\":1704067200,\"choices\":[\"Yes\",\"No\"]}\n",
        );
        write(
            dir.path(),
            "votes.jsonl",
            "{\"id\":\"v1\",\"voter\":\"0xa\",\"choice\":1,\"vp\":10.0,\"created\":1704067300,\"proposal_id\":\"p1\"}\n",
        );

        let corpus = load_corpus(&corpus_in(dir.path())).await.expect("load");
        assert_eq!(corpus.forum_posts.len(), 1);
        assert_eq!(corpus.forum_posts[0].extra["likes"], 3);
        assert_eq!(corpus.proposals[0].choices, vec!["Yes", "No"]);
        assert_eq!(corpus.votes[0].voting_power(), 10.0);
    }

    #[tokio::test]
    async fn proposal_contract_violation_names_the_line() {
        let dir = tempdir().expect("tempdir");
        write(
            dir.path(),
            "proposals.jsonl",
            "{\"id\":\"p1\",\"created\":1}\n\n{\"id\":\"p2\"}\n",
        );
        let err = corpus_in(dir.path()).load_proposals().await.unwrap_err();
        match &err {
            AdapterError::Contract { line, source, .. } => {
                assert_eq!(*line, 3);
                assert!(matches!(source, ContractError::MissingField { field: "created", .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("proposals.jsonl:3"));
    }

    #[test]
    fn vote_index_groups_in_input_order() {
        let votes: Vec<Vote> = serde_json::from_str(
            r#"[
                {"voter":"a","choice":1,"vp":1.0,"proposal_id":"p1"},
                {"voter":"b","choice":2,"vp":2.0,"proposal_id":"p2"},
                {"voter":"c","choice":1,"vp":3.0,"proposal_id":"p1"}
            ]"#,
        )
        .unwrap();
        let index = index_votes_by_proposal(&votes);
        let p1: Vec<_> = index["p1"].iter().map(|v| v.voter.as_str()).collect();
        assert_eq!(p1, vec!["a", "c"]);
        assert_eq!(index["p2"].len(), 1);
        assert!(!index.contains_key("p3"));
    }
}
