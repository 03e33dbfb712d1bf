use thiserror::Error;

/// Fatal, pre-flight errors. Everything that goes wrong after the batch
/// starts is per-submission and recorded as a [`crate::records::StageFailure`]
/// instead of being raised.
#[derive(Debug, Error)]
pub enum GradeError {
    /// A misconfigured rubric makes every subsequent score meaningless,
    /// so this aborts before any external work starts.
    #[error("malformed rubric: {0}")]
    MalformedRubric(String),

    #[error("unreadable roster {path}: {reason}")]
    RosterUnreadable { path: String, reason: String },
}
