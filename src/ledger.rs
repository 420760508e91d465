//! Append-only record of source URLs that have already been published.
//!
//! The ledger is a plain UTF-8 file with one URL per line. It is read once
//! when the worker starts and appended to after every successful post, so it
//! survives restarts and is the only authority on "already handled".

use crate::error::LedgerError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    urls: HashSet<String>,
}

impl Ledger {
    /// Load the ledger at `path`. A missing file is an empty ledger.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(LedgerError::Read { path, source }),
        };

        let urls = parse_lines(&contents);
        info!(count = urls.len(), "Loaded published URL ledger");
        Ok(Self { path, urls })
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add `url` to the in-memory set and append it to the file.
    ///
    /// The set is updated first: once recorded, a URL is treated as published
    /// for the rest of the run even if the append fails and an error is
    /// returned.
    pub async fn record(&mut self, url: &str) -> Result<(), LedgerError> {
        if !self.urls.insert(url.to_string()) {
            return Ok(());
        }

        let append = async {
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(format!("{url}\n").as_bytes()).await?;
            file.flush().await
        };
        append.await.map_err(|source| LedgerError::Append {
            path: self.path.clone(),
            source,
        })?;

        debug!(%url, "Recorded published URL");
        Ok(())
    }
}

fn parse_lines(contents: &str) -> HashSet<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::load(dir.path().join("posted.txt")).await.unwrap();
        assert_eq!(ledger.len(), 0);
    }

    #[tokio::test]
    async fn test_recorded_url_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posted.txt");

        let mut ledger = Ledger::load(&path).await.unwrap();
        ledger.record("https://example.com/a").await.unwrap();
        ledger.record("https://example.com/b").await.unwrap();
        assert!(ledger.contains("https://example.com/a"));

        let reloaded = Ledger::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("https://example.com/a"));
        assert!(reloaded.contains("https://example.com/b"));
    }

    #[tokio::test]
    async fn test_recording_twice_appends_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posted.txt");

        let mut ledger = Ledger::load(&path).await.unwrap();
        ledger.record("https://example.com/a").await.unwrap();
        ledger.record("https://example.com/a").await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "https://example.com/a\n");
    }

    #[tokio::test]
    async fn test_load_ignores_blank_lines_and_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posted.txt");
        std::fs::write(&path, "https://example.com/a  \n\n  https://example.com/b\n").unwrap();

        let ledger = Ledger::load(&path).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains("https://example.com/b"));
    }

    #[tokio::test]
    async fn test_append_failure_keeps_url_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let mut ledger = Ledger::load(dir.path()).await.unwrap_or_else(|_| Ledger {
            path: dir.path().to_path_buf(),
            urls: HashSet::new(),
        });
        let err = ledger.record("https://example.com/a").await.unwrap_err();
        assert!(matches!(err, LedgerError::Append { .. }));
        assert!(ledger.contains("https://example.com/a"));
        assert!(ledger.record("https://example.com/a").await.is_ok());
    }
}
