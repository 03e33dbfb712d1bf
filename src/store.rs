//! Per-identifier artifact store.
//!
//! One raw-content artifact and one score artifact per submission
//! identifier, plus a human-readable failure log per failing stage.
//! Presence of an artifact is the sole cache-hit signal; the "exists →
//! skip" contract is what lets a restarted multi-hour batch resume from
//! the first identifier lacking an artifact.
//!
//! Layout under the work directory:
//!
//! ```text
//! content/<id>.txt        raw submission text
//! scores/<id>.json        validated ScoreRecord
//! failures/fetch/<id>.log
//! failures/score/<id>.log
//! ```

use crate::records::{ScoreRecord, Stage};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct WorkStore {
    root: PathBuf,
}

impl WorkStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn new(root: &Path) -> Result<Self> {
        for dir in ["content", "scores", "failures/fetch", "failures/score"] {
            std::fs::create_dir_all(root.join(dir))
                .with_context(|| format!("creating {}/{}", root.display(), dir))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn content_path(&self, id: &str) -> PathBuf {
        self.root.join("content").join(format!("{}.txt", id))
    }

    pub fn has_content(&self, id: &str) -> bool {
        self.content_path(id).exists()
    }

    pub fn read_content(&self, id: &str) -> Result<String> {
        std::fs::read_to_string(self.content_path(id))
            .with_context(|| format!("reading content artifact for {}", id))
    }

    fn score_path(&self, id: &str) -> PathBuf {
        self.root.join("scores").join(format!("{}.json", id))
    }

    pub fn has_score(&self, id: &str) -> bool {
        self.score_path(id).exists()
    }

    pub fn read_score(&self, id: &str) -> Option<ScoreRecord> {
        let content = std::fs::read_to_string(self.score_path(id)).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn put_score(&self, id: &str, record: &ScoreRecord) -> Result<()> {
        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(self.score_path(id), content)
            .with_context(|| format!("writing score artifact for {}", id))?;
        Ok(())
    }

    fn failure_path(&self, stage: Stage, id: &str) -> PathBuf {
        self.root
            .join("failures")
            .join(stage.as_str())
            .join(format!("{}.log", id))
    }

    /// Append a human-readable failure record. The log is diagnostic
    /// output for selective re-runs, never consumed by downstream stages.
    pub fn record_failure(&self, stage: Stage, id: &str, error: &str) -> Result<()> {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.failure_path(stage, id))
            .with_context(|| format!("opening {} failure log for {}", stage.as_str(), id))?;
        writeln!(
            file,
            "{} stage: {} {}\n{}\n",
            chrono::Utc::now().to_rfc3339(),
            stage.as_str(),
            id,
            error
        )?;
        Ok(())
    }

    /// Drop a stale failure log once the stage has succeeded for this id.
    pub fn clear_failure(&self, stage: Stage, id: &str) -> Result<()> {
        let path = self.failure_path(stage, id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn has_failure(&self, stage: Stage, id: &str) -> bool {
        self.failure_path(stage, id).exists()
    }

    fn list_ids(&self, dir: &str, ext: &str) -> Vec<String> {
        let mut ids = Vec::new();
        if let Ok(entries) = std::fs::read_dir(self.root.join(dir)) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some(ext) {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        ids.push(stem.to_string());
                    }
                }
            }
        }
        ids.sort();
        ids
    }

    pub fn fetched_ids(&self) -> Vec<String> {
        self.list_ids("content", "txt")
    }

    pub fn scored_ids(&self) -> Vec<String> {
        self.list_ids("scores", "json")
    }

    pub fn failed_ids(&self, stage: Stage) -> Vec<String> {
        self.list_ids(&format!("failures/{}", stage.as_str()), "log")
    }

    /// Remove artifacts. With `scores_only`, raw content survives so only
    /// evaluations are re-run.
    pub fn clear(&self, scores_only: bool) -> Result<()> {
        let mut dirs = vec!["scores", "failures/score"];
        if !scores_only {
            dirs.push("content");
            dirs.push("failures/fetch");
        }
        for dir in dirs {
            let path = self.root.join(dir);
            for entry in std::fs::read_dir(&path)? {
                let entry_path = entry?.path();
                if entry_path.is_file() {
                    std::fs::remove_file(entry_path)?;
                }
            }
        }
        Ok(())
    }
}
