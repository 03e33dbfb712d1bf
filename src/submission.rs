//! Roster parsing and submission identifiers.
//!
//! The roster is a CSV with at least one URL-bearing column (the name is
//! configuration, not hardcoded). Every other column is passthrough
//! metadata carried untouched into the aggregate.

use crate::error::GradeError;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// First GitHub repository URL in a cell, tolerant of surrounding text,
/// `www.` prefixes, trailing paths, fragments and query strings.
fn repo_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)https?://(?:www\.)?github\.com/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)(?:[/#?]\S*)?",
        )
        .expect("repo url regex")
    })
}

/// Normalized submission identifier derived from the source URL.
///
/// The `owner.repo` key is filesystem-safe (the URL pattern only admits
/// `[A-Za-z0-9_.-]`) and is the cache key for every pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    pub fn key(&self) -> String {
        format!("{}.{}", self.owner, self.repo)
    }

    pub fn url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.repo)
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Extract the first repository reference from free text.
///
/// Strips a `.git` suffix and trailing dots from the repo segment, the
/// same normalization the artifacts on disk are keyed by.
pub fn find_repo(text: &str) -> Option<RepoId> {
    let caps = repo_url_re().captures(text)?;
    let owner = caps[1].to_string();
    let repo = caps[2]
        .trim_end_matches(".git")
        .trim_end_matches('.')
        .to_string();
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some(RepoId { owner, repo })
}

/// One roster row. `repo` is `None` when the configured column holds no
/// recognizable repository URL; such submissions are classified
/// `invalid_source` and never consume fetch or scoring capacity.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Zero-based input position, the aggregate's ordering key.
    pub index: usize,
    pub repo: Option<RepoId>,
    /// All cells of the row, aligned with `Roster::headers`.
    pub values: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Roster {
    pub headers: Vec<String>,
    pub submissions: Vec<Submission>,
}

impl Roster {
    /// Unique repo identifiers in first-appearance order. Duplicate rows
    /// share one identifier and therefore one set of artifacts; the
    /// pipeline dispatches each identifier exactly once (write-once cache
    /// guarantee), while aggregation still emits one row per input row.
    pub fn unique_repos(&self) -> Vec<RepoId> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for sub in &self.submissions {
            if let Some(repo) = &sub.repo {
                if seen.insert(repo.key()) {
                    out.push(repo.clone());
                }
            }
        }
        out
    }
}

/// Read the roster CSV, resolving `url_column` against the header row.
pub fn load_roster(path: &Path, url_column: &str) -> Result<Roster, GradeError> {
    let unreadable = |reason: String| GradeError::RosterUnreadable {
        path: path.display().to_string(),
        reason,
    };

    let mut reader = csv::Reader::from_path(path).map_err(|e| unreadable(e.to_string()))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| unreadable(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let url_idx = headers
        .iter()
        .position(|h| h == url_column)
        .ok_or_else(|| unreadable(format!("no column named '{}'", url_column)))?;

    let mut submissions = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| unreadable(format!("row {}: {}", index + 1, e)))?;
        let values: Vec<String> = record.iter().map(|c| c.to_string()).collect();
        let repo = values.get(url_idx).and_then(|cell| find_repo(cell));
        submissions.push(Submission {
            index,
            repo,
            values,
        });
    }

    Ok(Roster {
        headers,
        submissions,
    })
}
