//! Repository-content retrieval boundary.
//!
//! The extraction tool is an opaque text producer behind the
//! [`ContentSource`] trait; the production implementation shells out to
//! `gitingest`, which writes the flattened repository text to the
//! destination path itself.

use crate::submission::RepoId;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Retrieve the repository's text into `dest`. On error the caller
    /// removes any partial file so artifact presence stays a truthful
    /// cache signal.
    async fn fetch_into(&self, repo: &RepoId, dest: &Path) -> Result<()>;
}

/// Subprocess-backed source: `<command> [args...] <url> -o <dest>`.
pub struct GitingestSource {
    pub command: String,
    pub args: Vec<String>,
}

impl GitingestSource {
    pub fn new(command: &str, args: &[String]) -> Self {
        Self {
            command: command.to_string(),
            args: args.to_vec(),
        }
    }
}

#[async_trait]
impl ContentSource for GitingestSource {
    async fn fetch_into(&self, repo: &RepoId, dest: &Path) -> Result<()> {
        // kill_on_drop: when the caller's timeout drops this future the
        // child must die with it, or it could write `dest` after the
        // failure was recorded and forge a cache hit on the next run.
        let output = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .arg(repo.url())
            .arg("-o")
            .arg(dest)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawning {}", self.command))?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} exited with {}: {}{}",
                self.command,
                output.status,
                tail(&stdout, 500),
                tail(&stderr, 500)
            );
        }
        if !dest.exists() {
            bail!("{} reported success but wrote no output", self.command);
        }
        Ok(())
    }
}

fn tail(s: &str, limit: usize) -> &str {
    let start = s.len().saturating_sub(limit);
    // keep to a char boundary
    match s.char_indices().find(|(i, _)| *i >= start) {
        Some((i, _)) => &s[i..],
        None => "",
    }
}
