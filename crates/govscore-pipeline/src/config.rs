use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use govscore_adapters::CorpusPaths;
use govscore_core::EngineConfig;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_id: String,
    pub data_dir: PathBuf,
    pub corpus: CorpusPaths,
    pub linked_out: PathBuf,
    pub scorecards_out: PathBuf,
    pub manifest_out: PathBuf,
    pub engine_config_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_id: "opcollective".to_string(),
            data_dir: PathBuf::from("./data"),
            corpus: CorpusPaths::default(),
            linked_out: PathBuf::from("linked_proposals.jsonl"),
            scorecards_out: PathBuf::from("scorecards.jsonl"),
            manifest_out: PathBuf::from("run_manifest.json"),
            engine_config_path: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let path_var = |name: &str, fallback: PathBuf| {
            std::env::var(name).map(PathBuf::from).unwrap_or(fallback)
        };
        Self {
            source_id: std::env::var("GOVSCORE_SOURCE_ID").unwrap_or(defaults.source_id),
            data_dir: path_var("GOVSCORE_DATA_DIR", defaults.data_dir),
            corpus: CorpusPaths {
                forum_posts: path_var("GOVSCORE_FORUM_POSTS", defaults.corpus.forum_posts),
                proposals: path_var("GOVSCORE_PROPOSALS", defaults.corpus.proposals),
                votes: path_var("GOVSCORE_VOTES", defaults.corpus.votes),
            },
            linked_out: path_var("GOVSCORE_LINKED_OUT", defaults.linked_out),
            scorecards_out: path_var("GOVSCORE_SCORECARDS_OUT", defaults.scorecards_out),
            manifest_out: path_var("GOVSCORE_MANIFEST_OUT", defaults.manifest_out),
            engine_config_path: std::env::var("GOVSCORE_CONFIG").ok().map(PathBuf::from),
        }
    }

    /// Engine thresholds from `engine_config_path`, or defaults when unset or
    /// when the file does not exist. Invalid YAML or values are errors.
    pub fn load_engine_config(&self) -> Result<EngineConfig> {
        let config = match &self.engine_config_path {
            Some(path) if path.exists() => load_engine_yaml(path)?,
            _ => EngineConfig::default(),
        };
        config
            .validate()
            .context("validating engine configuration")?;
        Ok(config)
    }
}

pub fn load_engine_yaml(path: &Path) -> Result<EngineConfig> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
