//! Batch LLM-as-judge grading for student repository submissions.
//!
//! Pipeline: roster → fetch (cached raw content per repository) →
//! evaluate (rubric-constrained, validated scores, also cached) →
//! aggregate (one CSV row per input submission, failures included).
//! Every external artifact is keyed by a normalized `owner.repo`
//! identifier, so an interrupted batch resumes where it left off.

pub mod aggregate;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod fetch;
pub mod output;
pub mod records;
pub mod rubric;
pub mod scorer;
pub mod source;
pub mod store;
pub mod submission;
