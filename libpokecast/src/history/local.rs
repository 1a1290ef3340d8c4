//! Local file history: newline-delimited ids, append-only

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::HistoryError;
use crate::history::HistoryStore;
use crate::types::CandidateId;

/// History kept in a local text file, one id per line
///
/// The whole file is read at load time; each `record` appends a single line
/// and syncs it to disk before returning. The file is never rewritten, so a
/// crash mid-write can at worst leave a truncated last line.
pub struct LocalHistory {
    path: PathBuf,
    state: Mutex<LocalState>,
}

struct LocalState {
    published: HashSet<CandidateId>,
    // File ends without '\n' (hand-edited or truncated)
    needs_newline: bool,
}

impl LocalHistory {
    /// Load history from `path`; a missing file is an empty history
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(HistoryError::Load {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let published = parse_history(&content, &path);
        debug!(
            path = %path.display(),
            count = published.len(),
            "Loaded local publish history"
        );

        Ok(Self {
            path,
            state: Mutex::new(LocalState {
                published,
                needs_newline: !content.is_empty() && !content.ends_with('\n'),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All recorded ids in ascending order
    pub async fn published(&self) -> Vec<CandidateId> {
        let state = self.state.lock().await;
        let mut ids: Vec<CandidateId> = state.published.iter().copied().collect();
        ids.sort();
        ids
    }

    async fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_all().await
    }
}

fn parse_history(content: &str, path: &Path) -> HashSet<CandidateId> {
    let mut published = HashSet::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<CandidateId>() {
            Ok(id) => {
                published.insert(id);
            }
            Err(_) => warn!(
                path = %path.display(),
                line = index + 1,
                content = line,
                "Skipping unparsable history line"
            ),
        }
    }
    published
}

#[async_trait]
impl HistoryStore for LocalHistory {
    async fn exists(&self, id: CandidateId) -> Result<bool, HistoryError> {
        Ok(self.state.lock().await.published.contains(&id))
    }

    async fn record(&self, id: CandidateId) -> Result<(), HistoryError> {
        let mut state = self.state.lock().await;
        if state.published.contains(&id) {
            return Ok(());
        }

        let line = if state.needs_newline {
            format!("\n{}\n", id)
        } else {
            format!("{}\n", id)
        };

        self.append_line(&line)
            .await
            .map_err(|e| HistoryError::Write {
                backend: self.name().to_string(),
                id,
                reason: format!("{}: {}", self.path.display(), e),
            })?;

        state.needs_newline = false;
        state.published.insert(id);
        Ok(())
    }

    fn name(&self) -> &str {
        "local"
    }
}
