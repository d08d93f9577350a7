//! Results workflow: human grading of attempts, bulk publication per exam,
//! and student-initiated re-evaluation.

use sqlx::PgPool;

use crate::core::security::Principal;
use crate::db::models::{Submission, SubmissionAnswer};
use crate::db::types::SubmissionStatus;
use crate::repositories;
use crate::schemas::submission::GradeRequest;
use crate::services::error::ExamError;
use crate::services::lifecycle;

/// A grade may land on any attempt, including one already published; the
/// correction supersedes the published score and the row drops back to
/// `graded` until the next publication. Drafts are not gradeable.
pub(crate) fn gradeable(status: SubmissionStatus) -> bool {
    status.is_attempt()
}

/// Re-evaluation only makes sense once a human grade exists.
pub(crate) fn reevaluation_allowed(status: SubmissionStatus) -> bool {
    matches!(status, SubmissionStatus::Graded | SubmissionStatus::Published)
}

pub(crate) fn validate_score(total_score: f64, max_score: f64) -> Result<(), ExamError> {
    if !(0.0..=max_score).contains(&total_score) {
        return Err(ExamError::Conflict(format!(
            "Score must be between 0 and {max_score}"
        )));
    }
    Ok(())
}

pub(crate) async fn grade_submission(
    pool: &PgPool,
    submission_id: &str,
    payload: GradeRequest,
    grader: &Principal,
) -> Result<(Submission, Vec<SubmissionAnswer>), ExamError> {
    if !grader.is_authority() {
        return Err(ExamError::Forbidden("Only teachers and admins may grade"));
    }

    let submission = repositories::submissions::find_by_id(pool, submission_id)
        .await?
        .ok_or(ExamError::NotFound("Submission"))?;
    if !gradeable(submission.status) {
        return Err(ExamError::Conflict("Submission is not gradeable".to_string()));
    }
    validate_score(payload.total_score, submission.max_score)?;

    let now = crate::core::time::primitive_now_utc();
    let updated = repositories::submissions::apply_grade(
        pool,
        submission_id,
        payload.total_score,
        payload.feedback.as_deref(),
        &grader.id,
        now,
    )
    .await?;
    if updated == 0 {
        return Err(ExamError::Conflict("Submission is not gradeable".to_string()));
    }

    let submission = repositories::submissions::fetch_one_by_id(pool, submission_id).await?;
    let answers = repositories::submissions::list_answers(pool, submission_id).await?;

    tracing::info!(
        submission_id = %submission.id,
        grader_id = %grader.id,
        total_score = submission.total_score,
        "submission graded manually"
    );
    Ok((submission, answers))
}

/// Zero matched rows means the exam has no attempts to publish; anything
/// else is the number of rows now carrying the published status.
pub(crate) fn publish_outcome(matched: u64) -> Result<u64, ExamError> {
    if matched == 0 {
        return Err(ExamError::NothingToPublish);
    }
    Ok(matched)
}

/// Flips every attempt for the exam to `published` in one statement. The
/// write is idempotent: re-publishing after a correction simply republishes
/// the corrected rows.
pub(crate) async fn publish_results(
    pool: &PgPool,
    exam_id: &str,
    principal: &Principal,
) -> Result<u64, ExamError> {
    let exam = repositories::exams::find_by_id(pool, exam_id)
        .await?
        .ok_or(ExamError::NotFound("Exam"))?;
    lifecycle::require_manager(principal, &exam)?;

    let now = crate::core::time::primitive_now_utc();
    let matched = repositories::submissions::publish_for_exam(pool, exam_id, now).await?;
    let published = publish_outcome(matched)?;

    tracing::info!(exam_id = %exam_id, count = published, "results published");
    Ok(published)
}

pub(crate) async fn request_reevaluation(
    pool: &PgPool,
    submission_id: &str,
    principal: &Principal,
) -> Result<Submission, ExamError> {
    let submission = repositories::submissions::find_by_id(pool, submission_id)
        .await?
        .ok_or(ExamError::NotFound("Submission"))?;
    if submission.student_id != principal.id {
        return Err(ExamError::Forbidden("Only the submission owner may request re-evaluation"));
    }
    if !reevaluation_allowed(submission.status) {
        return Err(ExamError::Conflict(
            "Re-evaluation can only be requested for a graded submission".to_string(),
        ));
    }

    let now = crate::core::time::primitive_now_utc();
    let updated =
        repositories::submissions::mark_reevaluation_requested(pool, submission_id, now).await?;
    if updated == 0 {
        return Err(ExamError::Conflict(
            "Re-evaluation can only be requested for a graded submission".to_string(),
        ));
    }

    Ok(repositories::submissions::fetch_one_by_id(pool, submission_id).await?)
}

/// A student's own published result. Hidden until publication, and withheld
/// entirely when the exam opts out of showing results.
pub(crate) async fn view_result(
    pool: &PgPool,
    exam_id: &str,
    principal: &Principal,
) -> Result<(Submission, Vec<SubmissionAnswer>), ExamError> {
    let exam = repositories::exams::find_by_id(pool, exam_id)
        .await?
        .ok_or(ExamError::NotFound("Exam"))?;
    if !exam.show_results && !principal.is_authority() {
        return Err(ExamError::Forbidden("Results are not visible for this exam"));
    }

    let submission = repositories::submissions::find_attempt(pool, exam_id, &principal.id)
        .await?
        .ok_or(ExamError::NotFound("Submission"))?;
    if submission.status != SubmissionStatus::Published {
        return Err(ExamError::Conflict("Results have not been published".to_string()));
    }

    let answers = repositories::submissions::list_answers(pool, &submission.id).await?;
    Ok((submission, answers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drafts_are_not_gradeable() {
        assert!(!gradeable(SubmissionStatus::Draft));
        assert!(gradeable(SubmissionStatus::Submitted));
        assert!(gradeable(SubmissionStatus::Graded));
        assert!(gradeable(SubmissionStatus::Published));
        assert!(gradeable(SubmissionStatus::ReevalRequested));
    }

    #[test]
    fn reevaluation_needs_an_existing_grade() {
        assert!(reevaluation_allowed(SubmissionStatus::Graded));
        assert!(reevaluation_allowed(SubmissionStatus::Published));
        assert!(!reevaluation_allowed(SubmissionStatus::Submitted));
        assert!(!reevaluation_allowed(SubmissionStatus::Draft));
        assert!(!reevaluation_allowed(SubmissionStatus::ReevalRequested));
    }

    #[test]
    fn publishing_with_no_attempts_is_an_error() {
        assert!(matches!(publish_outcome(0), Err(ExamError::NothingToPublish)));
        assert_eq!(publish_outcome(4).unwrap(), 4);
    }

    #[test]
    fn republishing_is_a_safe_no_op() {
        // The bulk update matches every non-draft row, published ones
        // included, so a rerun reports the same count instead of failing.
        assert!(SubmissionStatus::Published.is_attempt());
        assert!(SubmissionStatus::Graded.is_attempt());
        assert!(!SubmissionStatus::Draft.is_attempt());
        assert_eq!(publish_outcome(2).unwrap(), 2);
    }

    #[test]
    fn scores_are_bounded_by_the_attempt_maximum() {
        assert!(validate_score(0.0, 10.0).is_ok());
        assert!(validate_score(10.0, 10.0).is_ok());
        assert!(validate_score(7.5, 10.0).is_ok());
        assert!(matches!(validate_score(10.5, 10.0), Err(ExamError::Conflict(_))));
        assert!(matches!(validate_score(-1.0, 10.0), Err(ExamError::Conflict(_))));
    }
}
