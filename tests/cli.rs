mod support;

use crate::support::repo_grader;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const RUBRIC: &str = r#"
instructions = "Grade the repository."

[[criteria]]
name = "readme"
max = 0.15
instruction = "Has a useful README."

[[criteria]]
name = "tests"
max = 0.2
instruction = "Has meaningful tests."
"#;

fn write_inputs(dir: &Path) {
    fs::write(
        dir.join("roster.csv"),
        "email,repo_url\n\
         a@x.org,https://github.com/a/one\n\
         b@x.org,not a repository url\n",
    )
    .unwrap();
    fs::write(dir.join("rubric.toml"), RUBRIC).unwrap();
}

#[test]
fn test_cli_help() {
    repo_grader().arg("--help").assert().success();
}

#[test]
fn test_run_accepts_fetch_timeout_flag() {
    repo_grader()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--timeout-secs"));
}

#[test]
fn test_cli_version() {
    repo_grader()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("repo-grader"));
}

#[test]
fn test_aggregate_empty_workdir_still_covers_every_row() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());

    repo_grader()
        .current_dir(dir.path())
        .args([
            "aggregate",
            "--roster",
            "roster.csv",
            "--rubric",
            "rubric.toml",
            "--workdir",
            "work",
            "--out",
            "scores.csv",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rows: 2"));

    let csv = fs::read_to_string(dir.path().join("scores.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "email,repo_url,repo,readme,tests,total,complete,status"
    );
    assert!(lines[1].ends_with("fetch_failed"));
    assert!(lines[2].ends_with("invalid_source"));
}

#[test]
fn test_malformed_rubric_aborts_before_any_work() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());
    fs::write(
        dir.path().join("rubric.toml"),
        "[[criteria]]\nname = \"a\"\ninstruction = \"no max\"\n",
    )
    .unwrap();

    repo_grader()
        .current_dir(dir.path())
        .args([
            "aggregate",
            "--roster",
            "roster.csv",
            "--rubric",
            "rubric.toml",
            "--workdir",
            "work",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed rubric"));
    assert!(!dir.path().join("work").exists());
}

#[test]
fn test_missing_roster_is_fatal() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("rubric.toml"), RUBRIC).unwrap();

    repo_grader()
        .current_dir(dir.path())
        .args([
            "aggregate",
            "--roster",
            "nope.csv",
            "--rubric",
            "rubric.toml",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unreadable roster"));
}

#[test]
fn test_evaluate_requires_api_key() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());

    repo_grader()
        .current_dir(dir.path())
        .env_remove("OPENAI_API_KEY")
        .env_remove("REPO_GRADER_API_KEY")
        .args([
            "evaluate",
            "--roster",
            "roster.csv",
            "--rubric",
            "rubric.toml",
            "--workdir",
            "work",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("OPENAI_API_KEY"));
}

#[test]
fn test_status_reports_inventory() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());
    fs::create_dir_all(dir.path().join("work/content")).unwrap();
    fs::write(dir.path().join("work/content/a.one.txt"), "raw").unwrap();

    repo_grader()
        .current_dir(dir.path())
        .args([
            "status",
            "--roster",
            "roster.csv",
            "--rubric",
            "rubric.toml",
            "--workdir",
            "work",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Submissions: 2 (1 unique repos)"))
        .stdout(predicate::str::contains("Fetched: 1/1"))
        .stdout(predicate::str::contains("Scored: 0/1"));
}

#[test]
fn test_clean_scores_only_keeps_content() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("work/content")).unwrap();
    fs::create_dir_all(dir.path().join("work/scores")).unwrap();
    fs::write(dir.path().join("work/content/a.one.txt"), "raw").unwrap();
    fs::write(dir.path().join("work/scores/a.one.json"), "{}").unwrap();

    repo_grader()
        .current_dir(dir.path())
        .args(["clean", "--workdir", "work", "--scores-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kept raw content"));

    assert!(dir.path().join("work/content/a.one.txt").exists());
    assert!(!dir.path().join("work/scores/a.one.json").exists());
}

#[test]
fn test_unknown_column_is_fatal() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());

    repo_grader()
        .current_dir(dir.path())
        .args([
            "aggregate",
            "--roster",
            "roster.csv",
            "--rubric",
            "rubric.toml",
            "--column",
            "github_link",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no column named 'github_link'"));
}
