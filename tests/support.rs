use assert_cmd::Command;

pub fn repo_grader() -> Command {
    Command::cargo_bin("repo-grader").expect("binary under test")
}
