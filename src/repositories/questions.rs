use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::{Question, QuestionOption};
use crate::db::types::{DifficultyLevel, QuestionKind};

pub(crate) const COLUMNS: &str = "\
    id, text, kind, expected_answer, subject_id, topic, difficulty, created_by, \
    created_at, updated_at";

pub(crate) struct CreateQuestion<'a> {
    pub(crate) id: &'a str,
    pub(crate) text: &'a str,
    pub(crate) kind: QuestionKind,
    pub(crate) expected_answer: Option<&'a str>,
    pub(crate) subject_id: &'a str,
    pub(crate) topic: Option<&'a str>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) created_by: &'a str,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Default)]
pub(crate) struct QuestionFilters {
    pub(crate) subject_id: Option<String>,
    pub(crate) topic: Option<String>,
    pub(crate) difficulty: Option<DifficultyLevel>,
}

pub(crate) async fn create<'e>(
    executor: impl PgExecutor<'e>,
    params: CreateQuestion<'_>,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (id, text, kind, expected_answer, subject_id, topic, difficulty, \
         created_by, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.text)
    .bind(params.kind)
    .bind(params.expected_answer)
    .bind(params.subject_id)
    .bind(params.topic)
    .bind(params.difficulty)
    .bind(params.created_by)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_many_by_ids(
    pool: &PgPool,
    ids: &[String],
) -> Result<Vec<Question>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = ANY($1)"))
        .bind(ids)
        .fetch_all(pool)
        .await
}

/// Question-bank listing: a caller sees questions they own, plus (when
/// `include_shared`) questions shared with them.
pub(crate) async fn list_bank(
    pool: &PgPool,
    user_id: &str,
    include_shared: bool,
    filters: QuestionFilters,
) -> Result<Vec<Question>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM questions WHERE ("));
    builder.push("created_by = ");
    builder.push_bind(user_id.to_string());
    if include_shared {
        builder.push(
            " OR EXISTS (SELECT 1 FROM question_shares qs \
             WHERE qs.question_id = questions.id AND qs.user_id = ",
        );
        builder.push_bind(user_id.to_string());
        builder.push(")");
    }
    builder.push(")");

    if let Some(subject_id) = filters.subject_id {
        builder.push(" AND subject_id = ");
        builder.push_bind(subject_id);
    }
    if let Some(topic) = filters.topic {
        builder.push(" AND topic ILIKE ");
        builder.push_bind(format!("%{topic}%"));
    }
    if let Some(difficulty) = filters.difficulty {
        builder.push(" AND difficulty = ");
        builder.push_bind(difficulty);
    }

    builder.push(" ORDER BY created_at DESC");
    builder.build_query_as::<Question>().fetch_all(pool).await
}

pub(crate) struct UpdateQuestion<'a> {
    pub(crate) text: Option<&'a str>,
    pub(crate) kind: Option<QuestionKind>,
    pub(crate) expected_answer: Option<Option<&'a str>>,
    pub(crate) subject_id: Option<&'a str>,
    pub(crate) topic: Option<Option<&'a str>>,
    pub(crate) difficulty: Option<DifficultyLevel>,
}

pub(crate) async fn update<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    fields: UpdateQuestion<'_>,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE questions SET updated_at = ");
    builder.push_bind(now);

    if let Some(text) = fields.text {
        builder.push(", text = ");
        builder.push_bind(text.to_string());
    }
    if let Some(kind) = fields.kind {
        builder.push(", kind = ");
        builder.push_bind(kind);
    }
    if let Some(expected_answer) = fields.expected_answer {
        builder.push(", expected_answer = ");
        builder.push_bind(expected_answer.map(str::to_string));
    }
    if let Some(subject_id) = fields.subject_id {
        builder.push(", subject_id = ");
        builder.push_bind(subject_id.to_string());
    }
    if let Some(topic) = fields.topic {
        builder.push(", topic = ");
        builder.push_bind(topic.map(str::to_string));
    }
    if let Some(difficulty) = fields.difficulty {
        builder.push(", difficulty = ");
        builder.push_bind(difficulty);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id.to_string());
    builder.build().execute(executor).await?;
    Ok(())
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM questions WHERE id = $1").bind(id).execute(pool).await?;
    Ok(())
}

pub(crate) async fn insert_options<'e>(
    executor: impl PgExecutor<'e>,
    question_id: &str,
    options: &[(String, String, bool)],
) -> Result<(), sqlx::Error> {
    if options.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO question_options (id, question_id, text, is_correct, position) ",
    );
    builder.push_values(options.iter().enumerate(), |mut row, (position, (id, text, is_correct))| {
        row.push_bind(id)
            .push_bind(question_id)
            .push_bind(text)
            .push_bind(is_correct)
            .push_bind(position as i32);
    });
    builder.build().execute(executor).await?;
    Ok(())
}

pub(crate) async fn delete_options<'e>(
    executor: impl PgExecutor<'e>,
    question_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM question_options WHERE question_id = $1")
        .bind(question_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn list_options(
    pool: &PgPool,
    question_id: &str,
) -> Result<Vec<QuestionOption>, sqlx::Error> {
    sqlx::query_as::<_, QuestionOption>(
        "SELECT id, question_id, text, is_correct, position
         FROM question_options
         WHERE question_id = $1
         ORDER BY position",
    )
    .bind(question_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_options_for_questions(
    pool: &PgPool,
    question_ids: &[String],
) -> Result<Vec<QuestionOption>, sqlx::Error> {
    if question_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, QuestionOption>(
        "SELECT id, question_id, text, is_correct, position
         FROM question_options
         WHERE question_id = ANY($1)
         ORDER BY question_id, position",
    )
    .bind(question_ids)
    .fetch_all(pool)
    .await
}

pub(crate) async fn add_shares(
    pool: &PgPool,
    question_id: &str,
    user_ids: &[String],
) -> Result<(), sqlx::Error> {
    if user_ids.is_empty() {
        return Ok(());
    }

    let mut builder =
        QueryBuilder::<Postgres>::new("INSERT INTO question_shares (question_id, user_id) ");
    builder.push_values(user_ids, |mut row, user_id| {
        row.push_bind(question_id).push_bind(user_id);
    });
    builder.push(" ON CONFLICT DO NOTHING");
    builder.build().execute(pool).await?;
    Ok(())
}

pub(crate) async fn list_shares(
    pool: &PgPool,
    question_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT user_id FROM question_shares WHERE question_id = $1 ORDER BY user_id")
        .bind(question_id)
        .fetch_all(pool)
        .await
}

pub(crate) async fn is_shared_with(
    pool: &PgPool,
    question_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    let found: Option<i32> = sqlx::query_scalar(
        "SELECT 1 FROM question_shares WHERE question_id = $1 AND user_id = $2",
    )
    .bind(question_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(found.is_some())
}
