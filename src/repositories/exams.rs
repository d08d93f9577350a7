use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::{Exam, ExamQuestion};
use crate::db::types::ExamStatus;

pub(crate) const COLUMNS: &str = "\
    id, title, class_id, subject_id, created_by, duration_minutes, instructions, \
    total_questions, total_marks, passing_marks, shuffle_questions, show_results, \
    status, scheduled_at, ends_at, published_at, created_at, updated_at";

pub(crate) struct CreateExam<'a> {
    pub(crate) id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) class_id: &'a str,
    pub(crate) subject_id: &'a str,
    pub(crate) created_by: &'a str,
    pub(crate) duration_minutes: i32,
    pub(crate) instructions: &'a str,
    pub(crate) total_questions: i32,
    pub(crate) total_marks: f64,
    pub(crate) passing_marks: f64,
    pub(crate) shuffle_questions: bool,
    pub(crate) show_results: bool,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Default)]
pub(crate) struct ExamFilters {
    pub(crate) class_id: Option<String>,
    pub(crate) subject_id: Option<String>,
    pub(crate) status: Option<ExamStatus>,
}

#[derive(Debug, Default)]
pub(crate) struct UpdateExamFields {
    pub(crate) title: Option<String>,
    pub(crate) instructions: Option<String>,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) total_marks: Option<f64>,
    pub(crate) passing_marks: Option<f64>,
    pub(crate) shuffle_questions: Option<bool>,
    pub(crate) show_results: Option<bool>,
}

pub(crate) async fn create<'e>(
    executor: impl PgExecutor<'e>,
    params: CreateExam<'_>,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "INSERT INTO exams (id, title, class_id, subject_id, created_by, duration_minutes, \
         instructions, total_questions, total_marks, passing_marks, shuffle_questions, \
         show_results, status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.title)
    .bind(params.class_id)
    .bind(params.subject_id)
    .bind(params.created_by)
    .bind(params.duration_minutes)
    .bind(params.instructions)
    .bind(params.total_questions)
    .bind(params.total_marks)
    .bind(params.passing_marks)
    .bind(params.shuffle_questions)
    .bind(params.show_results)
    .bind(ExamStatus::Draft)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn fetch_one_by_id(pool: &PgPool, id: &str) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_one(pool)
        .await
}

pub(crate) async fn list(pool: &PgPool, filters: ExamFilters) -> Result<Vec<Exam>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM exams WHERE TRUE"));

    if let Some(class_id) = filters.class_id {
        builder.push(" AND class_id = ");
        builder.push_bind(class_id);
    }
    if let Some(subject_id) = filters.subject_id {
        builder.push(" AND subject_id = ");
        builder.push_bind(subject_id);
    }
    if let Some(status) = filters.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }

    builder.push(" ORDER BY created_at DESC");
    builder.build_query_as::<Exam>().fetch_all(pool).await
}

/// Exams currently accepting submissions for a class: published, with the
/// activity window containing `now`.
pub(crate) async fn list_active_for_class(
    pool: &PgPool,
    class_id: &str,
    now: PrimitiveDateTime,
) -> Result<Vec<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "SELECT {COLUMNS} FROM exams
         WHERE class_id = $1
           AND status = $2
           AND scheduled_at <= $3
           AND ends_at >= $3
         ORDER BY scheduled_at"
    ))
    .bind(class_id)
    .bind(ExamStatus::Published)
    .bind(now)
    .fetch_all(pool)
    .await
}

pub(crate) async fn update_fields<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    fields: UpdateExamFields,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE exams SET updated_at = ");
    builder.push_bind(now);

    if let Some(title) = fields.title {
        builder.push(", title = ");
        builder.push_bind(title);
    }
    if let Some(instructions) = fields.instructions {
        builder.push(", instructions = ");
        builder.push_bind(instructions);
    }
    if let Some(duration_minutes) = fields.duration_minutes {
        builder.push(", duration_minutes = ");
        builder.push_bind(duration_minutes);
    }
    if let Some(total_marks) = fields.total_marks {
        builder.push(", total_marks = ");
        builder.push_bind(total_marks);
    }
    if let Some(passing_marks) = fields.passing_marks {
        builder.push(", passing_marks = ");
        builder.push_bind(passing_marks);
    }
    if let Some(shuffle_questions) = fields.shuffle_questions {
        builder.push(", shuffle_questions = ");
        builder.push_bind(shuffle_questions);
    }
    if let Some(show_results) = fields.show_results {
        builder.push(", show_results = ");
        builder.push_bind(show_results);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.build().execute(executor).await?;
    Ok(())
}

/// Status transitions validate the current status at write time, so a
/// concurrent transition loses instead of clobbering.
pub(crate) async fn set_schedule(
    pool: &PgPool,
    id: &str,
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exams
         SET status = $1, scheduled_at = $2, ends_at = $3, updated_at = $4
         WHERE id = $5 AND status IN ($6, $1)",
    )
    .bind(ExamStatus::Scheduled)
    .bind(start)
    .bind(end)
    .bind(now)
    .bind(id)
    .bind(ExamStatus::Draft)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn set_published(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exams
         SET status = $1, published_at = $2, updated_at = $2
         WHERE id = $3 AND status IN ($4, $5)",
    )
    .bind(ExamStatus::Published)
    .bind(now)
    .bind(id)
    .bind(ExamStatus::Draft)
    .bind(ExamStatus::Scheduled)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn set_completed(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exams
         SET status = $1, updated_at = $2
         WHERE id = $3 AND status <> $1",
    )
    .bind(ExamStatus::Completed)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exams WHERE id = $1").bind(id).execute(pool).await?;
    Ok(())
}

pub(crate) async fn insert_questions<'e>(
    executor: impl PgExecutor<'e>,
    exam_id: &str,
    items: &[(String, f64)],
) -> Result<(), sqlx::Error> {
    if items.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO exam_questions (exam_id, question_id, points, position) ",
    );
    builder.push_values(items.iter().enumerate(), |mut row, (position, (question_id, points))| {
        row.push_bind(exam_id)
            .push_bind(question_id)
            .push_bind(points)
            .push_bind(position as i32);
    });
    builder.build().execute(executor).await?;
    Ok(())
}

pub(crate) async fn delete_questions<'e>(
    executor: impl PgExecutor<'e>,
    exam_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exam_questions WHERE exam_id = $1")
        .bind(exam_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn list_questions(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<ExamQuestion>, sqlx::Error> {
    sqlx::query_as::<_, ExamQuestion>(
        "SELECT exam_id, question_id, points, position
         FROM exam_questions
         WHERE exam_id = $1
         ORDER BY position",
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await
}
