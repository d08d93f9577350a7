use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::{Submission, SubmissionAnswer};
use crate::db::types::{ProctorWarning, SubmissionStatus};

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, start_time, time_spent_seconds, warnings, status, \
    total_score, max_score, feedback, graded_by, reevaluation_requested, \
    created_at, updated_at";

pub(crate) struct NewSubmission<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) time_spent_seconds: i32,
    pub(crate) warnings: Vec<ProctorWarning>,
    pub(crate) total_score: f64,
    pub(crate) max_score: f64,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug)]
pub(crate) struct NewAnswer {
    pub(crate) question_id: String,
    pub(crate) answer: String,
    pub(crate) is_correct: bool,
    pub(crate) awarded_marks: f64,
    pub(crate) reviewed: bool,
}

#[derive(Debug, Default)]
pub(crate) struct SubmissionFilters {
    pub(crate) exam_id: Option<String>,
    pub(crate) student_id: Option<String>,
    pub(crate) status: Option<SubmissionStatus>,
}

/// Inserts the submission and its graded answers in one transaction. The
/// partial unique index on (exam_id, student_id) makes the duplicate check and
/// the insert atomic; a concurrent duplicate surfaces as a unique violation.
pub(crate) async fn insert_attempt(
    pool: &PgPool,
    params: NewSubmission<'_>,
    answers: &[NewAnswer],
) -> Result<Submission, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let submission = sqlx::query_as::<_, Submission>(&format!(
        "INSERT INTO submissions (id, exam_id, student_id, start_time, time_spent_seconds, \
         warnings, status, total_score, max_score, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.student_id)
    .bind(params.start_time)
    .bind(params.time_spent_seconds)
    .bind(Json(params.warnings))
    .bind(SubmissionStatus::Submitted)
    .bind(params.total_score)
    .bind(params.max_score)
    .bind(params.created_at)
    .fetch_one(&mut *tx)
    .await?;

    if !answers.is_empty() {
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO submission_answers (id, submission_id, question_id, answer, is_correct, \
             awarded_marks, reviewed, position) ",
        );
        builder.push_values(answers.iter().enumerate(), |mut row, (position, answer)| {
            row.push_bind(Uuid::new_v4().to_string())
                .push_bind(params.id)
                .push_bind(&answer.question_id)
                .push_bind(&answer.answer)
                .push_bind(answer.is_correct)
                .push_bind(answer.awarded_marks)
                .push_bind(answer.reviewed)
                .push_bind(position as i32);
        });
        builder.build().execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(submission)
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!("SELECT {COLUMNS} FROM submissions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// As `find_by_id`, for callers that have already proven existence.
pub(crate) async fn fetch_one_by_id(pool: &PgPool, id: &str) -> Result<Submission, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!("SELECT {COLUMNS} FROM submissions WHERE id = $1"))
        .bind(id)
        .fetch_one(pool)
        .await
}

/// The student's non-draft submission for an exam, if any.
pub(crate) async fn find_attempt(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE exam_id = $1 AND student_id = $2 AND status <> $3"
    ))
    .bind(exam_id)
    .bind(student_id)
    .bind(SubmissionStatus::Draft)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list(
    pool: &PgPool,
    filters: SubmissionFilters,
) -> Result<Vec<Submission>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM submissions WHERE TRUE"));

    if let Some(exam_id) = filters.exam_id {
        builder.push(" AND exam_id = ");
        builder.push_bind(exam_id);
    }
    if let Some(student_id) = filters.student_id {
        builder.push(" AND student_id = ");
        builder.push_bind(student_id);
    }
    if let Some(status) = filters.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }

    builder.push(" ORDER BY created_at DESC");
    builder.build_query_as::<Submission>().fetch_all(pool).await
}

pub(crate) async fn list_answers(
    pool: &PgPool,
    submission_id: &str,
) -> Result<Vec<SubmissionAnswer>, sqlx::Error> {
    sqlx::query_as::<_, SubmissionAnswer>(
        "SELECT id, submission_id, question_id, answer, is_correct, awarded_marks, reviewed, \
         position
         FROM submission_answers
         WHERE submission_id = $1
         ORDER BY position",
    )
    .bind(submission_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_for_exam(pool: &PgPool, exam_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM submissions WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(pool)
        .await
}

/// Full grading override: replaces score and feedback, records the grader and
/// clears any pending re-evaluation request.
pub(crate) async fn apply_grade(
    pool: &PgPool,
    id: &str,
    total_score: f64,
    feedback: Option<&str>,
    graded_by: &str,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE submissions
         SET status = $1,
             total_score = $2,
             feedback = $3,
             graded_by = $4,
             reevaluation_requested = FALSE,
             updated_at = $5
         WHERE id = $6 AND status <> $7",
    )
    .bind(SubmissionStatus::Graded)
    .bind(total_score)
    .bind(feedback)
    .bind(graded_by)
    .bind(now)
    .bind(id)
    .bind(SubmissionStatus::Draft)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Bulk publication for an exam. Rows already published still count as
/// matched, so re-running after a partial failure is a safe no-op. Drafts
/// are deliberately left out: they are not attempts, and promoting one
/// would collide with the one-attempt-per-student unique index.
pub(crate) async fn publish_for_exam(
    pool: &PgPool,
    exam_id: &str,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE submissions
         SET status = $1, updated_at = $2
         WHERE exam_id = $3 AND status <> $4",
    )
    .bind(SubmissionStatus::Published)
    .bind(now)
    .bind(exam_id)
    .bind(SubmissionStatus::Draft)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn count_attempts_for_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM submissions WHERE exam_id = $1 AND status <> $2")
        .bind(exam_id)
        .bind(SubmissionStatus::Draft)
        .fetch_one(pool)
        .await
}

pub(crate) async fn mark_reevaluation_requested(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE submissions
         SET status = $1, reevaluation_requested = TRUE, updated_at = $2
         WHERE id = $3 AND status IN ($4, $5)",
    )
    .bind(SubmissionStatus::ReevalRequested)
    .bind(now)
    .bind(id)
    .bind(SubmissionStatus::Graded)
    .bind(SubmissionStatus::Published)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
