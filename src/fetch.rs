//! Fetch stage: bounded-concurrency retrieval with idempotent caching.
//!
//! Identifiers are deduplicated before dispatch so each artifact has
//! exactly one writer. Workers only perform the external call; all store
//! writes (artifacts kept, partial files removed, failure logs) happen in
//! the driver loop as completions arrive, so no shared mutable state
//! exists between workers.

use crate::records::{Stage, StageFailure};
use crate::source::ContentSource;
use crate::store::WorkStore;
use crate::submission::{RepoId, Roster};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Maximum fetches in flight at once.
    pub parallel: usize,
    /// Per-fetch timeout; a timeout is a fetch failure for that
    /// submission only.
    pub timeout_secs: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            parallel: 5,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Default)]
pub struct FetchReport {
    /// Identifiers fetched by this run.
    pub fetched: Vec<String>,
    /// Identifiers skipped because the artifact already existed.
    pub cached: Vec<String>,
    /// Roster rows with no recognizable repository URL.
    pub invalid_source: usize,
    pub failures: Vec<StageFailure>,
}

/// Fetch every unique repository in the roster that has no content
/// artifact yet. Always completes; per-item failures are recorded and
/// surfaced in the report, never propagated.
pub async fn run_fetch(
    roster: &Roster,
    source: Arc<dyn ContentSource>,
    store: &WorkStore,
    opts: &FetchOptions,
) -> Result<FetchReport> {
    let mut report = FetchReport {
        invalid_source: roster.submissions.iter().filter(|s| s.repo.is_none()).count(),
        ..Default::default()
    };

    let sem = Arc::new(Semaphore::new(opts.parallel.max(1)));
    let mut join_set: JoinSet<(RepoId, Result<(), String>)> = JoinSet::new();
    let deadline = Duration::from_secs(opts.timeout_secs);

    let mut pending = 0usize;
    for repo in roster.unique_repos() {
        let key = repo.key();
        if store.has_content(&key) {
            report.cached.push(key);
            continue;
        }

        // Queue in input order; the permit bounds how many run at once.
        let permit = sem.clone().acquire_owned().await?;
        let source = source.clone();
        let dest = store.content_path(&key);
        pending += 1;
        join_set.spawn(async move {
            let _permit = permit;
            let result = match timeout(deadline, source.fetch_into(&repo, &dest)).await {
                Err(_) => Err(format!("timed out after {}s", deadline.as_secs())),
                Ok(Err(e)) => Err(format!("{:#}", e)),
                Ok(Ok(())) => Ok(()),
            };
            (repo, result)
        });
    }

    let mut done = 0usize;
    while let Some(joined) = join_set.join_next().await {
        let (repo, result) = joined?;
        let key = repo.key();
        done += 1;
        match result {
            Ok(()) => {
                store.clear_failure(Stage::Fetch, &key)?;
                info!(repo = %key, done, total = pending, "fetched");
                report.fetched.push(key);
            }
            Err(error) => {
                // A partial output file must not masquerade as a cache hit.
                let dest = store.content_path(&key);
                if dest.exists() {
                    std::fs::remove_file(&dest)?;
                }
                store.record_failure(Stage::Fetch, &key, &error)?;
                warn!(repo = %key, %error, "fetch failed");
                report.failures.push(StageFailure {
                    repo: key,
                    stage: Stage::Fetch,
                    error,
                });
            }
        }
    }

    report.fetched.sort();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::{load_roster, Submission};
    use async_trait::async_trait;
    use std::io::Write;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted source: writes a canned payload, optionally failing for
    /// chosen repos, and tracks call count plus the in-flight high-water
    /// mark.
    struct ScriptedSource {
        fail_repos: Vec<String>,
        hang_repos: Vec<String>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedSource {
        fn new() -> Self {
            Self {
                fail_repos: Vec::new(),
                hang_repos: Vec::new(),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn failing(repos: &[&str]) -> Self {
            Self {
                fail_repos: repos.iter().map(|r| r.to_string()).collect(),
                ..Self::new()
            }
        }

        fn hanging(repos: &[&str]) -> Self {
            Self {
                hang_repos: repos.iter().map(|r| r.to_string()).collect(),
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl ContentSource for ScriptedSource {
        async fn fetch_into(&self, repo: &RepoId, dest: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.hang_repos.contains(&repo.key()) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.fail_repos.contains(&repo.key()) {
                anyhow::bail!("scripted fetch error");
            }
            std::fs::write(dest, format!("content of {}", repo.key()))?;
            Ok(())
        }
    }

    fn roster_of(n: usize) -> Roster {
        let submissions = (0..n)
            .map(|i| Submission {
                index: i,
                repo: Some(RepoId {
                    owner: "owner".to_string(),
                    repo: format!("repo{}", i),
                }),
                values: vec![format!("https://github.com/owner/repo{}", i)],
            })
            .collect();
        Roster {
            headers: vec!["repo_url".to_string()],
            submissions,
        }
    }

    fn test_store() -> (tempfile::TempDir, WorkStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn second_run_issues_zero_external_calls() {
        let (_dir, store) = test_store();
        let roster = roster_of(3);
        let opts = FetchOptions::default();

        let source = Arc::new(ScriptedSource::new());
        let report = run_fetch(&roster, source.clone(), &store, &opts)
            .await
            .unwrap();
        assert_eq!(report.fetched.len(), 3);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        let before: Vec<String> = (0..3)
            .map(|i| store.read_content(&format!("owner.repo{}", i)).unwrap())
            .collect();

        let source = Arc::new(ScriptedSource::new());
        let report = run_fetch(&roster, source.clone(), &store, &opts)
            .await
            .unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.cached.len(), 3);
        assert!(report.fetched.is_empty());

        // byte-identical artifacts on reuse
        for (i, expected) in before.iter().enumerate() {
            assert_eq!(
                &store.read_content(&format!("owner.repo{}", i)).unwrap(),
                expected
            );
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_affect_the_rest() {
        let (_dir, store) = test_store();
        let roster = roster_of(10);
        let source = Arc::new(ScriptedSource::failing(&["owner.repo2"]));

        let report = run_fetch(&roster, source, &store, &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(report.fetched.len(), 9);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].repo, "owner.repo2");
        assert!(store.has_failure(Stage::Fetch, "owner.repo2"));
        assert!(!store.has_content("owner.repo2"));
        for i in (0..10).filter(|i| *i != 2) {
            let id = format!("owner.repo{}", i);
            assert_eq!(
                store.read_content(&id).unwrap(),
                format!("content of {}", id)
            );
        }
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_pool_width() {
        let (_dir, store) = test_store();
        let roster = roster_of(20);
        let source = Arc::new(ScriptedSource::new());
        let opts = FetchOptions {
            parallel: 5,
            timeout_secs: 30,
        };

        run_fetch(&roster, source.clone(), &store, &opts)
            .await
            .unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 20);
        assert!(source.max_in_flight.load(Ordering::SeqCst) <= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_an_isolated_fetch_failure() {
        let (_dir, store) = test_store();
        let roster = roster_of(2);
        let source = Arc::new(ScriptedSource::hanging(&["owner.repo0"]));
        let opts = FetchOptions {
            parallel: 2,
            timeout_secs: 5,
        };

        let report = run_fetch(&roster, source, &store, &opts).await.unwrap();

        assert_eq!(report.fetched, vec!["owner.repo1"]);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].error.contains("timed out after 5s"));
        assert!(!store.has_content("owner.repo0"));
    }

    #[tokio::test]
    async fn invalid_source_consumes_no_capacity() {
        let mut roster = roster_of(2);
        roster.submissions.push(Submission {
            index: 2,
            repo: None,
            values: vec!["no url here".to_string()],
        });
        let (_dir, store) = test_store();
        let source = Arc::new(ScriptedSource::new());

        let report = run_fetch(&roster, source.clone(), &store, &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(report.invalid_source, 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn successful_refetch_clears_stale_failure_log() {
        let (_dir, store) = test_store();
        let roster = roster_of(1);

        let failing = Arc::new(ScriptedSource::failing(&["owner.repo0"]));
        run_fetch(&roster, failing, &store, &FetchOptions::default())
            .await
            .unwrap();
        assert!(store.has_failure(Stage::Fetch, "owner.repo0"));

        let ok = Arc::new(ScriptedSource::new());
        run_fetch(&roster, ok, &store, &FetchOptions::default())
            .await
            .unwrap();
        assert!(!store.has_failure(Stage::Fetch, "owner.repo0"));
        assert!(store.has_content("owner.repo0"));
    }

    #[test]
    fn roster_duplicates_share_one_fetch() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "repo_url").unwrap();
        writeln!(f, "https://github.com/a/one").unwrap();
        writeln!(f, "https://github.com/a/one").unwrap();
        let roster = load_roster(f.path(), "repo_url").unwrap();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (_dir, store) = test_store();
            let source = Arc::new(ScriptedSource::new());
            run_fetch(&roster, source.clone(), &store, &FetchOptions::default())
                .await
                .unwrap();
            assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        });
    }
}
