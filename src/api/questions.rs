use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAuthority;
use crate::core::security::Principal;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Question, QuestionOption};
use crate::repositories;
use crate::schemas::question::{
    check_option_shape, QuestionBankQuery, QuestionCreate, QuestionResponse, QuestionUpdate,
    ShareRequest,
};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_question).get(list_bank))
        .route("/:question_id", get(get_question).patch(update_question).delete(delete_question))
        .route("/:question_id/share", post(share_question))
}

async fn create_question(
    CurrentAuthority(principal): CurrentAuthority,
    State(state): State<AppState>,
    Json(payload): Json<QuestionCreate>,
) -> Result<(StatusCode, Json<QuestionResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    payload.check_option_shape().map_err(|message| ApiError::BadRequest(message.to_string()))?;

    let now = primitive_now_utc();
    let question_id = Uuid::new_v4().to_string();
    let options: Vec<(String, String, bool)> = payload
        .options
        .iter()
        .map(|option| (Uuid::new_v4().to_string(), option.text.clone(), option.is_correct))
        .collect();

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    let question = repositories::questions::create(
        &mut *tx,
        repositories::questions::CreateQuestion {
            id: &question_id,
            text: &payload.text,
            kind: payload.kind,
            expected_answer: payload.expected_answer.as_deref(),
            subject_id: &payload.subject_id,
            topic: payload.topic.as_deref(),
            difficulty: payload.difficulty,
            created_by: &principal.id,
            created_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create question"))?;
    repositories::questions::insert_options(&mut *tx, &question.id, &options)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create question options"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    let stored = repositories::questions::list_options(state.db(), &question.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load question options"))?;
    Ok((StatusCode::CREATED, Json(QuestionResponse::new(&question, &stored))))
}

async fn list_bank(
    CurrentAuthority(principal): CurrentAuthority,
    State(state): State<AppState>,
    Query(params): Query<QuestionBankQuery>,
) -> Result<Json<Vec<QuestionResponse>>, ApiError> {
    let questions = repositories::questions::list_bank(
        state.db(),
        &principal.id,
        params.include_shared,
        repositories::questions::QuestionFilters {
            subject_id: params.subject_id,
            topic: params.topic,
            difficulty: params.difficulty,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to list questions"))?;

    let ids: Vec<String> = questions.iter().map(|question| question.id.clone()).collect();
    let mut options_by_question: HashMap<String, Vec<QuestionOption>> = HashMap::new();
    for option in repositories::questions::list_options_for_questions(state.db(), &ids)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load question options"))?
    {
        options_by_question.entry(option.question_id.clone()).or_default().push(option);
    }

    let responses = questions
        .iter()
        .map(|question| {
            let options =
                options_by_question.get(&question.id).map(Vec::as_slice).unwrap_or(&[]);
            QuestionResponse::new(question, options)
        })
        .collect();
    Ok(Json(responses))
}

async fn get_question(
    CurrentAuthority(principal): CurrentAuthority,
    State(state): State<AppState>,
    Path(question_id): Path<String>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let question = load_question(&state, &question_id).await?;
    require_view_access(&state, &principal, &question).await?;

    let options = repositories::questions::list_options(state.db(), &question.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load question options"))?;
    Ok(Json(QuestionResponse::new(&question, &options)))
}

async fn update_question(
    CurrentAuthority(principal): CurrentAuthority,
    State(state): State<AppState>,
    Path(question_id): Path<String>,
    Json(payload): Json<QuestionUpdate>,
) -> Result<Json<QuestionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let question = load_question(&state, &question_id).await?;
    require_manage_access(&principal, &question)?;

    if let Some(options) = &payload.options {
        check_option_shape(question.kind, options)
            .map_err(|message| ApiError::BadRequest(message.to_string()))?;
    }

    let now = primitive_now_utc();
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    repositories::questions::update(
        &mut *tx,
        &question.id,
        repositories::questions::UpdateQuestion {
            text: payload.text.as_deref(),
            kind: None,
            expected_answer: payload.expected_answer.as_ref().map(Option::as_deref),
            subject_id: None,
            topic: payload.topic.as_ref().map(Option::as_deref),
            difficulty: payload.difficulty,
        },
        now,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update question"))?;

    if let Some(options) = payload.options {
        let replacements: Vec<(String, String, bool)> = options
            .iter()
            .map(|option| (Uuid::new_v4().to_string(), option.text.clone(), option.is_correct))
            .collect();
        repositories::questions::delete_options(&mut *tx, &question.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to replace question options"))?;
        repositories::questions::insert_options(&mut *tx, &question.id, &replacements)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to replace question options"))?;
    }
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    let question = load_question(&state, &question_id).await?;
    let options = repositories::questions::list_options(state.db(), &question.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load question options"))?;
    Ok(Json(QuestionResponse::new(&question, &options)))
}

async fn delete_question(
    CurrentAuthority(principal): CurrentAuthority,
    State(state): State<AppState>,
    Path(question_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let question = load_question(&state, &question_id).await?;
    require_manage_access(&principal, &question)?;

    match repositories::questions::delete_by_id(state.db(), &question.id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        // Foreign-key violation: the question is still referenced by an exam.
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23503") => {
            Err(ApiError::Conflict("Question is used by an exam".to_string()))
        }
        Err(err) => Err(ApiError::internal(err, "Failed to delete question")),
    }
}

async fn share_question(
    CurrentAuthority(principal): CurrentAuthority,
    State(state): State<AppState>,
    Path(question_id): Path<String>,
    Json(payload): Json<ShareRequest>,
) -> Result<Json<Vec<String>>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let question = load_question(&state, &question_id).await?;
    require_manage_access(&principal, &question)?;

    repositories::questions::add_shares(state.db(), &question.id, &payload.teacher_ids)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to share question"))?;

    let shares = repositories::questions::list_shares(state.db(), &question.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load question shares"))?;
    Ok(Json(shares))
}

async fn load_question(state: &AppState, question_id: &str) -> Result<Question, ApiError> {
    repositories::questions::find_by_id(state.db(), question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load question"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))
}

async fn require_view_access(
    state: &AppState,
    principal: &Principal,
    question: &Question,
) -> Result<(), ApiError> {
    if principal.is_admin() || question.created_by == principal.id {
        return Ok(());
    }

    let shared = repositories::questions::is_shared_with(state.db(), &question.id, &principal.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check question shares"))?;
    if shared {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Question belongs to another teacher".to_string()))
    }
}

fn require_manage_access(principal: &Principal, question: &Question) -> Result<(), ApiError> {
    if principal.is_admin() || question.created_by == principal.id {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Only the question owner or an admin may modify it".to_string()))
    }
}
