use thiserror::Error;

/// Domain failure taxonomy. Every operation returns these as typed results;
/// nothing is retried internally and business failures are never logged as
/// errors.
#[derive(Debug, Error)]
pub(crate) enum ExamError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("a submission already exists for this exam")]
    AlreadySubmitted,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("end time must be after start time")]
    InvalidWindow,
    #[error("exam is not available for submission")]
    NotAvailable,
    #[error("exam is not currently active")]
    WindowClosed,
    #[error("no results to publish")]
    NothingToPublish,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl ExamError {
    /// Maps the store-level unique violation on (exam_id, student_id) to the
    /// duplicate-submission failure, so a race loser never sees a generic
    /// database error.
    pub(crate) fn from_submission_insert(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.constraint() == Some("submissions_exam_student_key") {
                return ExamError::AlreadySubmitted;
            }
        }
        ExamError::Db(err)
    }
}
