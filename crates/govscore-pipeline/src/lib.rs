//! Link-and-score pipeline: corpus in, joined proposals and scorecards out.

pub mod config;
pub mod linker;
pub mod normalize;
pub mod scorecard;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use govscore_adapters::{load_corpus, CorpusSource, JsonlCorpus};
use govscore_core::{EngineConfig, JoinedProposal};
use govscore_storage::{JsonlStore, WrittenFile};
use serde::Serialize;
use tokio::fs;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub use config::PipelineConfig;
pub use linker::Linker;
pub use scorecard::ScorecardBuilder;

pub const CRATE_NAME: &str = "govscore-pipeline";

#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub records: usize,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub proposals: usize,
    pub linked_path: String,
    pub scorecards_path: String,
    pub manifest_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub source_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub engine: EngineConfig,
    pub files: Vec<RunManifestFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunManifestFile {
    pub name: String,
    pub path: String,
    pub records: usize,
    pub sha256: String,
    pub bytes: u64,
}

pub struct Pipeline {
    config: PipelineConfig,
    engine: EngineConfig,
    store: JsonlStore,
    corpus: Box<dyn CorpusSource>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, engine: EngineConfig) -> Result<Self> {
        engine
            .validate()
            .context("validating engine configuration")?;
        let store = JsonlStore::new(config.data_dir.clone());
        let corpus = JsonlCorpus::new(config.source_id.clone(), store.clone(), config.corpus.clone());
        Ok(Self {
            config,
            engine,
            store,
            corpus: Box::new(corpus),
        })
    }

    /// Swaps the corpus source, e.g. for an in-memory one in tests.
    pub fn with_corpus(mut self, corpus: Box<dyn CorpusSource>) -> Self {
        self.corpus = corpus;
        self
    }

    pub async fn link(&self) -> Result<StageSummary> {
        let (joined, written) = self.link_stage().await?;
        Ok(StageSummary {
            records: joined.len(),
            output: written.absolute_path.display().to_string(),
        })
    }

    pub async fn score(&self) -> Result<StageSummary> {
        let joined: Vec<JoinedProposal> = self
            .store
            .read_jsonl(&self.config.linked_out)
            .await
            .context("loading joined proposals")?;
        let written = self.score_stage(&joined).await?;
        Ok(StageSummary {
            records: written.records,
            output: written.absolute_path.display().to_string(),
        })
    }

    /// Link, score, then record both outputs in the run manifest.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let span = info_span!("govscore_run", %run_id, source_id = %self.config.source_id);

        let (linked, scored) = async {
            let (joined, linked) = self.link_stage().await?;
            let scored = self.score_stage(&joined).await?;
            anyhow::Ok((linked, scored))
        }
        .instrument(span)
        .await?;

        let finished_at = Utc::now();
        let manifest = RunManifest {
            schema_version: 1,
            run_id,
            source_id: self.config.source_id.clone(),
            started_at,
            finished_at,
            engine: self.engine.clone(),
            files: vec![
                manifest_entry("linked_proposals", self.store.root(), &linked),
                manifest_entry("scorecards", self.store.root(), &scored),
            ],
        };
        let manifest_path = self.write_manifest(&manifest).await?;
        info!(%run_id, proposals = linked.records, "run complete");

        Ok(RunSummary {
            run_id,
            started_at,
            finished_at,
            proposals: linked.records,
            linked_path: linked.absolute_path.display().to_string(),
            scorecards_path: scored.absolute_path.display().to_string(),
            manifest_path: manifest_path.display().to_string(),
        })
    }

    async fn link_stage(&self) -> Result<(Vec<JoinedProposal>, WrittenFile)> {
        let corpus = load_corpus(self.corpus.as_ref())
            .await
            .with_context(|| format!("loading corpus for {}", self.corpus.source_id()))?;
        let joined = {
            let _guard = info_span!("link").entered();
            Linker::new(self.engine.clone()).link(&corpus.proposals, &corpus.forum_posts, &corpus.votes)
        };
        let written = self
            .store
            .write_jsonl(&self.config.linked_out, &joined)
            .await
            .context("writing joined proposals")?;
        info!(proposals = joined.len(), path = %written.absolute_path.display(), "joined proposals written");
        Ok((joined, written))
    }

    async fn score_stage(&self, joined: &[JoinedProposal]) -> Result<WrittenFile> {
        let scorecards = {
            let _guard = info_span!("score").entered();
            ScorecardBuilder::new(self.engine.clone()).build_all(joined)
        };
        let written = self
            .store
            .write_jsonl(&self.config.scorecards_out, &scorecards)
            .await
            .context("writing scorecards")?;
        info!(scorecards = scorecards.len(), path = %written.absolute_path.display(), "scorecards written");
        Ok(written)
    }

    async fn write_manifest(&self, manifest: &RunManifest) -> Result<PathBuf> {
        let path = self.store.resolve(&self.config.manifest_out);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(manifest).context("serializing run manifest")?;
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}

/// Output paths are recorded as given, relative to the data dir when they
/// point inside it.
fn manifest_entry(name: &str, root: &Path, written: &WrittenFile) -> RunManifestFile {
    let path = written
        .relative_path
        .strip_prefix(root)
        .unwrap_or(&written.relative_path)
        .display()
        .to_string();
    RunManifestFile {
        name: name.to_string(),
        path,
        records: written.records,
        sha256: written.content_hash.clone(),
        bytes: written.byte_size as u64,
    }
}
