//! Line-delimited JSON storage for crawler corpora and engine outputs.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "govscore-storage";

#[derive(Debug, Error)]
pub enum JsonlError {
    #[error("{path}:{line}: invalid JSON record: {source}")]
    Parse {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct WrittenFile {
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub records: usize,
    pub byte_size: usize,
    pub content_hash: String,
}

/// Directory-rooted JSONL store. Relative paths resolve against `root`;
/// absolute paths are used as given.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    root: PathBuf,
}

impl JsonlStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Reads one record per non-blank line, keeping `(line_number, record)`.
    pub async fn read_jsonl_numbered<T: DeserializeOwned>(
        &self,
        path: impl AsRef<Path>,
    ) -> anyhow::Result<Vec<(usize, T)>> {
        let absolute_path = self.resolve(path);
        let span = info_span!("jsonl_read", path = %absolute_path.display());
        let text = fs::read_to_string(&absolute_path)
            .instrument(span.clone())
            .await
            .with_context(|| format!("reading {}", absolute_path.display()))?;
        let _guard = span.enter();
        let records = parse_jsonl_numbered(&text, &absolute_path.display().to_string())?;
        debug!(records = records.len(), "loaded jsonl");
        Ok(records)
    }

    pub async fn read_jsonl<T: DeserializeOwned>(
        &self,
        path: impl AsRef<Path>,
    ) -> anyhow::Result<Vec<T>> {
        let numbered = self.read_jsonl_numbered(path).await?;
        Ok(numbered.into_iter().map(|(_, record)| record).collect())
    }

    /// Replaces `path` with the serialized records via temp file + rename.
    pub async fn write_jsonl<T: Serialize>(
        &self,
        path: impl AsRef<Path>,
        items: &[T],
    ) -> anyhow::Result<WrittenFile> {
        let relative_path = path.as_ref().to_path_buf();
        let absolute_path = self.resolve(&relative_path);
        let bytes = encode_jsonl(items)?;

        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating output directory {}", parent.display()))?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp output file {}", temp_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing temp output file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp output file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &absolute_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "atomically renaming temp output {} -> {}",
                    temp_path.display(),
                    absolute_path.display()
                )
            });
        }

        Ok(WrittenFile {
            relative_path,
            absolute_path,
            records: items.len(),
            byte_size: bytes.len(),
            content_hash: Self::sha256_hex(&bytes),
        })
    }

    /// Appends records to `path`, creating it when missing.
    pub async fn append_jsonl<T: Serialize>(
        &self,
        path: impl AsRef<Path>,
        items: &[T],
    ) -> anyhow::Result<usize> {
        let absolute_path = self.resolve(path);
        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }
        let bytes = encode_jsonl(items)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&absolute_path)
            .await
            .with_context(|| format!("opening {} for append", absolute_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("appending to {}", absolute_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing {}", absolute_path.display()))?;
        Ok(items.len())
    }
}

pub fn parse_jsonl_numbered<T: DeserializeOwned>(
    text: &str,
    origin: &str,
) -> Result<Vec<(usize, T)>, JsonlError> {
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|source| JsonlError::Parse {
            path: origin.to_string(),
            line: index + 1,
            source,
        })?;
        records.push((index + 1, record));
    }
    Ok(records)
}

pub fn encode_jsonl<T: Serialize>(items: &[T]) -> anyhow::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for (index, item) in items.iter().enumerate() {
        serde_json::to_writer(&mut bytes, item)
            .with_context(|| format!("serializing record {}", index + 1))?;
        bytes.push(b'\n');
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: u32,
        name: String,
    }

    #[test]
    fn hashing_is_stable() {
        let hash = JsonlStore::sha256_hex(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn parse_skips_blank_lines_and_reports_line_numbers() {
        let text = "{\"id\":1,\"name\":\"a\"}\n\n{\"id\":2,\"name\":\"b\"}\n";
        let rows: Vec<(usize, Row)> = parse_jsonl_numbered(text, "mem").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].0, 3);

        let err = parse_jsonl_numbered::<Row>("{\"id\":1,\"name\":\"a\"}\n{oops\n", "mem")
            .unwrap_err();
        assert!(err.to_string().starts_with("mem:2:"));
    }

    #[tokio::test]
    async fn atomic_write_then_read_back() {
        let dir = tempdir().expect("tempdir");
        let store = JsonlStore::new(dir.path());
        let rows = vec![
            Row { id: 1, name: "a".into() },
            Row { id: 2, name: "b".into() },
        ];

        let written = store.write_jsonl("out/rows.jsonl", &rows).await.expect("write");
        assert_eq!(written.records, 2);
        assert!(written.absolute_path.exists());

        let text = std::fs::read_to_string(&written.absolute_path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert_eq!(written.content_hash, JsonlStore::sha256_hex(text.as_bytes()));

        let back: Vec<Row> = store.read_jsonl("out/rows.jsonl").await.expect("read");
        assert_eq!(back, rows);

        let leftovers = std::fs::read_dir(dir.path().join("out")).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn append_extends_existing_file() {
        let dir = tempdir().expect("tempdir");
        let store = JsonlStore::new(dir.path());
        store
            .append_jsonl("rows.jsonl", &[Row { id: 1, name: "a".into() }])
            .await
            .expect("first append");
        store
            .append_jsonl("rows.jsonl", &[Row { id: 2, name: "b".into() }])
            .await
            .expect("second append");
        let back: Vec<Row> = store.read_jsonl("rows.jsonl").await.expect("read");
        assert_eq!(back.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
    }
}
