use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pipeline configuration, read from `repo-grader.toml` when present.
/// Every field has a default; CLI flags override file values.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Roster column holding the repository URL.
    pub url_column: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            url_column: "repo_url".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub parallel: usize,
    pub timeout_secs: u64,
    /// Content-extraction command; must accept `<url> -o <dest>`.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            parallel: 5,
            timeout_secs: 300,
            command: "gitingest".to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    pub model: String,
    pub api_base: String,
    pub parallel: usize,
    pub timeout_secs: u64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-5-mini".to_string(),
            api_base: "https://api.openai.com".to_string(),
            parallel: 4,
            timeout_secs: 120,
        }
    }
}

const DEFAULT_CONFIG_FILE: &str = "repo-grader.toml";

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Load an explicit config file (errors are fatal) or fall back to
    /// `repo-grader.toml` in the working directory, then to defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            match Self::load(default_path) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    eprintln!("Warning: {:#}", e);
                    eprintln!("Using default configuration");
                }
            }
        }
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.input.url_column, "repo_url");
        assert_eq!(config.fetch.parallel, 5);
        assert_eq!(config.fetch.command, "gitingest");
        assert_eq!(config.scorer.api_base, "https://api.openai.com");
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo-grader.toml");
        std::fs::write(
            &path,
            r#"
[input]
url_column = "github"

[scorer]
model = "gpt-4o"
api_base = "https://proxy.example"
parallel = 8
timeout_secs = 60
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.input.url_column, "github");
        assert_eq!(config.scorer.model, "gpt-4o");
        assert_eq!(config.fetch.parallel, 5);
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let err = Config::load_or_default(Some(Path::new("/nonexistent.toml"))).unwrap_err();
        assert!(err.to_string().contains("reading config file"));
    }
}
