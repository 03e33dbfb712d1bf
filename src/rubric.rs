//! Rubric loading and validation.
//!
//! A rubric is a TOML document declaring an overall instruction block and
//! an ordered list of scoring criteria, each with a unique name, a numeric
//! maximum and instruction text:
//!
//! ```toml
//! instructions = "You are grading student repositories..."
//!
//! [[criteria]]
//! name = "readme"
//! max = 0.15
//! instruction = "The repository has a README explaining how to run it."
//! ```

use crate::error::GradeError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rubric {
    /// Free-text overall instruction block, prepended to every scorer request.
    #[serde(default)]
    pub instructions: String,
    pub criteria: Vec<Criterion>,
    /// Hex sha256 of the raw rubric source, for stale-cache detection.
    #[serde(skip)]
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    pub max: f64,
    pub instruction: String,
}

impl Rubric {
    pub fn criterion(&self, name: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.name == name)
    }

    /// Sum of declared maxima, the ceiling for any complete total.
    pub fn max_total(&self) -> f64 {
        self.criteria.iter().map(|c| c.max).sum()
    }
}

/// Load and validate a rubric from a TOML file.
///
/// Fails with [`GradeError::MalformedRubric`] if the file is unreadable or
/// unparsable, declares no criteria, a maximum is negative or non-finite,
/// or two criteria share a name. Criterion order is the declaration order.
pub fn load_rubric(path: &Path) -> Result<Rubric, GradeError> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        GradeError::MalformedRubric(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_rubric(&source)
}

pub fn parse_rubric(source: &str) -> Result<Rubric, GradeError> {
    let mut rubric: Rubric =
        toml::from_str(source).map_err(|e| GradeError::MalformedRubric(e.to_string()))?;

    if rubric.criteria.is_empty() {
        return Err(GradeError::MalformedRubric(
            "rubric declares no criteria".to_string(),
        ));
    }

    for c in &rubric.criteria {
        if c.name.trim().is_empty() {
            return Err(GradeError::MalformedRubric(
                "criterion with empty name".to_string(),
            ));
        }
        if !c.max.is_finite() || c.max < 0.0 {
            return Err(GradeError::MalformedRubric(format!(
                "criterion '{}' has invalid max {}",
                c.name, c.max
            )));
        }
    }

    let mut seen = std::collections::HashSet::new();
    for c in &rubric.criteria {
        if !seen.insert(c.name.as_str()) {
            return Err(GradeError::MalformedRubric(format!(
                "duplicate criterion name '{}'",
                c.name
            )));
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    rubric.fingerprint = format!("{:x}", hasher.finalize());

    Ok(rubric)
}
