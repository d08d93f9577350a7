//! Exam lifecycle: status transitions (draft -> scheduled -> published ->
//! completed) and the activity-window predicate shared by every admission and
//! visibility check.

use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::security::Principal;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, ExamQuestion};
use crate::db::types::ExamStatus;
use crate::repositories;
use crate::schemas::exam::{ExamCreate, ExamUpdate};
use crate::services::error::ExamError;
use sqlx::PgPool;

/// The one activity predicate: `scheduled_at <= now <= ends_at`, inclusive on
/// both ends, false while the window is unset. Shared so admission checks and
/// content-visibility checks cannot drift.
pub(crate) fn is_active(exam: &Exam, now: PrimitiveDateTime) -> bool {
    matches!(
        (exam.scheduled_at, exam.ends_at),
        (Some(start), Some(end)) if start <= now && now <= end
    )
}

/// Status as observed by callers: an exam whose window has elapsed reads as
/// completed without a stored transition.
pub(crate) fn effective_status(exam: &Exam, now: PrimitiveDateTime) -> ExamStatus {
    match exam.status {
        ExamStatus::Scheduled | ExamStatus::Published
            if exam.ends_at.is_some_and(|end| now > end) =>
        {
            ExamStatus::Completed
        }
        status => status,
    }
}

pub(crate) fn validate_window(
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
) -> Result<(), ExamError> {
    if end <= start {
        return Err(ExamError::InvalidWindow);
    }
    Ok(())
}

pub(crate) fn require_manager(principal: &Principal, exam: &Exam) -> Result<(), ExamError> {
    if principal.is_admin() || exam.created_by == principal.id {
        Ok(())
    } else {
        Err(ExamError::Forbidden("Only the exam creator or an admin may manage this exam"))
    }
}

pub(crate) async fn create_exam(
    pool: &PgPool,
    payload: ExamCreate,
    creator: &Principal,
) -> Result<(Exam, Vec<ExamQuestion>), ExamError> {
    let now = primitive_now_utc();
    let exam_id = Uuid::new_v4().to_string();
    let questions: Vec<(String, f64)> =
        payload.questions.iter().map(|item| (item.question_id.clone(), item.points)).collect();

    let mut tx = pool.begin().await?;
    let exam = repositories::exams::create(
        &mut *tx,
        repositories::exams::CreateExam {
            id: &exam_id,
            title: &payload.title,
            class_id: &payload.class_id,
            subject_id: &payload.subject_id,
            created_by: &creator.id,
            duration_minutes: payload.duration_minutes,
            instructions: &payload.instructions,
            total_questions: questions.len() as i32,
            total_marks: payload.total_marks,
            passing_marks: payload.passing_marks,
            shuffle_questions: payload.shuffle_questions,
            show_results: payload.show_results,
            created_at: now,
        },
    )
    .await?;
    repositories::exams::insert_questions(&mut *tx, &exam.id, &questions).await?;
    tx.commit().await?;

    let exam_questions = repositories::exams::list_questions(pool, &exam.id).await?;

    tracing::info!(exam_id = %exam.id, creator_id = %creator.id, "exam created");
    Ok((exam, exam_questions))
}

pub(crate) async fn schedule_exam(
    pool: &PgPool,
    exam_id: &str,
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
    principal: &Principal,
) -> Result<Exam, ExamError> {
    validate_window(start, end)?;

    let exam = repositories::exams::find_by_id(pool, exam_id)
        .await?
        .ok_or(ExamError::NotFound("Exam"))?;
    require_manager(principal, &exam)?;

    let now = primitive_now_utc();
    let updated = repositories::exams::set_schedule(pool, exam_id, start, end, now).await?;
    if updated == 0 {
        // Lost to a concurrent transition, or the exam is already past
        // scheduling; the current-status check at write time decides.
        return Err(ExamError::Conflict(format!(
            "Exam cannot be scheduled from status {:?}",
            exam.status
        )));
    }

    Ok(repositories::exams::fetch_one_by_id(pool, exam_id).await?)
}

pub(crate) async fn publish_exam(
    pool: &PgPool,
    exam_id: &str,
    principal: &Principal,
) -> Result<Exam, ExamError> {
    let exam = repositories::exams::find_by_id(pool, exam_id)
        .await?
        .ok_or(ExamError::NotFound("Exam"))?;
    require_manager(principal, &exam)?;

    let now = primitive_now_utc();
    let updated = repositories::exams::set_published(pool, exam_id, now).await?;
    if updated == 0 {
        return Err(ExamError::Conflict(format!(
            "Exam cannot be published from status {:?}",
            exam.status
        )));
    }

    let exam = repositories::exams::fetch_one_by_id(pool, exam_id).await?;
    tracing::info!(exam_id = %exam.id, user_id = %principal.id, "exam published");
    Ok(exam)
}

/// Explicit termination; otherwise `completed` is only ever computed from the
/// elapsed window.
pub(crate) async fn complete_exam(
    pool: &PgPool,
    exam_id: &str,
    principal: &Principal,
) -> Result<Exam, ExamError> {
    if !principal.is_admin() {
        return Err(ExamError::Forbidden("Only an admin may complete an exam"));
    }

    let exam = repositories::exams::find_by_id(pool, exam_id)
        .await?
        .ok_or(ExamError::NotFound("Exam"))?;

    let now = primitive_now_utc();
    let updated = repositories::exams::set_completed(pool, exam_id, now).await?;
    if updated == 0 {
        return Err(ExamError::Conflict(format!("Exam is already {:?}", exam.status)));
    }

    Ok(repositories::exams::fetch_one_by_id(pool, exam_id).await?)
}

pub(crate) async fn update_exam(
    pool: &PgPool,
    exam_id: &str,
    payload: ExamUpdate,
    principal: &Principal,
) -> Result<(Exam, Vec<ExamQuestion>), ExamError> {
    let exam = repositories::exams::find_by_id(pool, exam_id)
        .await?
        .ok_or(ExamError::NotFound("Exam"))?;
    require_manager(principal, &exam)?;

    // Question-set and duration edits are frozen once an attempt exists;
    // otherwise existing submissions' max_score would silently drift.
    if payload.questions.is_some() || payload.duration_minutes.is_some() {
        let attempts = repositories::submissions::count_attempts_for_exam(pool, exam_id).await?;
        if attempts > 0 {
            return Err(ExamError::Conflict(
                "Questions and duration are immutable once submissions exist".to_string(),
            ));
        }
    }

    let now = primitive_now_utc();
    let mut tx = pool.begin().await?;

    let question_count = payload.questions.as_ref().map(Vec::len);
    repositories::exams::update_fields(
        &mut *tx,
        exam_id,
        repositories::exams::UpdateExamFields {
            title: payload.title,
            instructions: payload.instructions,
            duration_minutes: payload.duration_minutes,
            total_marks: payload.total_marks,
            passing_marks: payload.passing_marks,
            shuffle_questions: payload.shuffle_questions,
            show_results: payload.show_results,
        },
        now,
    )
    .await?;

    if let Some(items) = payload.questions {
        let questions: Vec<(String, f64)> =
            items.iter().map(|item| (item.question_id.clone(), item.points)).collect();
        repositories::exams::delete_questions(&mut *tx, exam_id).await?;
        repositories::exams::insert_questions(&mut *tx, exam_id, &questions).await?;
        sqlx::query("UPDATE exams SET total_questions = $1 WHERE id = $2")
            .bind(question_count.unwrap_or(0) as i32)
            .bind(exam_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    let exam = repositories::exams::fetch_one_by_id(pool, exam_id).await?;
    let exam_questions = repositories::exams::list_questions(pool, exam_id).await?;
    Ok((exam, exam_questions))
}

pub(crate) async fn delete_exam(
    pool: &PgPool,
    exam_id: &str,
    principal: &Principal,
) -> Result<(), ExamError> {
    let exam = repositories::exams::find_by_id(pool, exam_id)
        .await?
        .ok_or(ExamError::NotFound("Exam"))?;
    require_manager(principal, &exam)?;

    let submissions = repositories::submissions::count_for_exam(pool, exam_id).await?;
    if submissions > 0 {
        return Err(ExamError::Conflict(
            "Exam cannot be deleted while submissions reference it".to_string(),
        ));
    }

    repositories::exams::delete_by_id(pool, exam_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures::{exam_with_window, fixed_now, Window};
    use time::Duration;

    #[test]
    fn window_bounds_are_inclusive() {
        let (mut exam, _) = exam_with_window(ExamStatus::Published, Window::Open);
        let start = fixed_now();
        let end = start + Duration::hours(2);
        exam.scheduled_at = Some(start);
        exam.ends_at = Some(end);

        assert!(is_active(&exam, start));
        assert!(is_active(&exam, end));
        assert!(is_active(&exam, start + Duration::hours(1)));
        assert!(!is_active(&exam, start - Duration::seconds(1)));
        assert!(!is_active(&exam, end + Duration::seconds(1)));
    }

    #[test]
    fn activity_ignores_status() {
        let (exam, now) = exam_with_window(ExamStatus::Draft, Window::Open);
        assert!(is_active(&exam, now));
    }

    #[test]
    fn unset_window_is_never_active() {
        let (exam, now) = exam_with_window(ExamStatus::Published, Window::Unset);
        assert!(!is_active(&exam, now));
    }

    #[test]
    fn validate_window_rejects_inverted_and_empty_ranges() {
        let start = fixed_now();
        assert!(matches!(validate_window(start, start), Err(ExamError::InvalidWindow)));
        assert!(matches!(
            validate_window(start, start - Duration::minutes(5)),
            Err(ExamError::InvalidWindow)
        ));
        assert!(validate_window(start, start + Duration::minutes(5)).is_ok());
    }

    #[test]
    fn elapsed_window_reads_as_completed() {
        let (exam, now) = exam_with_window(ExamStatus::Published, Window::Closed);
        assert_eq!(effective_status(&exam, now), ExamStatus::Completed);

        let (draft, now) = exam_with_window(ExamStatus::Draft, Window::Closed);
        assert_eq!(effective_status(&draft, now), ExamStatus::Draft);

        let (open, now) = exam_with_window(ExamStatus::Published, Window::Open);
        assert_eq!(effective_status(&open, now), ExamStatus::Published);
    }
}
