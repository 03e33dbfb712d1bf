//! Scorer boundary: the external language model that converts submission
//! content into per-criterion scores.
//!
//! The request combines the rubric's instruction block with one line per
//! criterion, and constrains the response with a JSON schema requiring a
//! `{score, max, reason}` object for every declared criterion. The
//! response is still treated as untrusted (schema enforcement is a
//! request to the provider, not a guarantee), so all validation happens
//! downstream in the evaluator.

use crate::rubric::Rubric;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Scorer: Send + Sync {
    /// Score `content` against the rubric, returning the raw response
    /// document (criterion name → score object) without validation.
    async fn score(&self, rubric: &Rubric, content: &str) -> Result<serde_json::Value>;

    /// Model identifier recorded in score artifacts.
    fn model(&self) -> &str;
}

/// System prompt: overall instructions followed by one line per criterion.
pub fn build_system_prompt(rubric: &Rubric) -> String {
    let mut prompt = rubric.instructions.trim().to_string();
    for c in &rubric.criteria {
        prompt.push_str(&format!(
            "\n\n[{}] (max {}): {}",
            c.name,
            c.max,
            c.instruction.trim()
        ));
    }
    prompt
}

/// Structured-output schema: an object with exactly the declared criteria,
/// each a `{score, max, reason}` object with the max pinned to the
/// declared value.
pub fn build_response_schema(rubric: &Rubric) -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for c in &rubric.criteria {
        properties.insert(
            c.name.clone(),
            serde_json::json!({
                "type": "object",
                "properties": {
                    "score": { "type": "number" },
                    "max": { "type": "number", "const": c.max },
                    "reason": { "type": "string" },
                },
                "required": ["score", "max", "reason"],
                "additionalProperties": false,
            }),
        );
        required.push(serde_json::Value::String(c.name.clone()));
    }
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// OpenAI-compatible chat-completions scorer.
pub struct OpenAiScorer {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiScorer {
    /// Build a scorer against `api_base` (no trailing slash). The timeout
    /// covers the whole request; a timeout surfaces as a score failure
    /// for the single submission being scored.
    pub fn new(api_base: &str, api_key: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Resolve the API key from `OPENAI_API_KEY`, falling back to
    /// `REPO_GRADER_API_KEY`.
    pub fn api_key_from_env() -> Result<String> {
        std::env::var("OPENAI_API_KEY")
            .or_else(|_| std::env::var("REPO_GRADER_API_KEY"))
            .context("OPENAI_API_KEY or REPO_GRADER_API_KEY environment variable must be set")
    }
}

#[async_trait]
impl Scorer for OpenAiScorer {
    async fn score(&self, rubric: &Rubric, content: &str) -> Result<serde_json::Value> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": build_system_prompt(rubric) },
                { "role": "user", "content": content },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": { "name": "criteria", "schema": build_response_schema(rubric) },
            },
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("calling scorer API")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("scorer API request failed: {} - {}", status, text);
        }

        let envelope: serde_json::Value = response
            .json()
            .await
            .context("parsing scorer API response")?;
        let content = envelope
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .context("scorer response missing message content")?;

        let document: serde_json::Value = serde_json::from_str(content)
            .with_context(|| format!("scorer returned invalid JSON: {}", snippet(content)))?;
        if !document.is_object() {
            bail!("scorer returned a non-object document: {}", snippet(content));
        }
        Ok(document)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn snippet(s: &str) -> &str {
    match s.char_indices().nth(500) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
