use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::seq::SliceRandom;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentAuthority, CurrentPrincipal};
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, to_primitive_utc};
use crate::db::models::{Exam, Question, QuestionOption};
use crate::repositories;
use crate::schemas::exam::{
    ExamCreate, ExamListQuery, ExamQuestionDetail, ExamResponse, ExamUpdate, ScheduleRequest,
};
use crate::schemas::submission::{SubmissionResponse, SubmitRequest};
use crate::services::{access, grading, lifecycle, results};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_exam).get(list_exams))
        .route("/active", get(list_active_exams))
        .route("/:exam_id", get(get_exam).patch(update_exam).delete(delete_exam))
        .route("/:exam_id/schedule", post(schedule_exam))
        .route("/:exam_id/publish", post(publish_exam))
        .route("/:exam_id/complete", post(complete_exam))
        .route("/:exam_id/submit", post(submit_exam))
        .route("/:exam_id/submissions", get(list_exam_submissions))
        .route("/:exam_id/my-result", get(my_result))
}

async fn create_exam(
    CurrentAuthority(principal): CurrentAuthority,
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let question_ids: Vec<String> =
        payload.questions.iter().map(|item| item.question_id.clone()).collect();
    let known = repositories::questions::find_many_by_ids(state.db(), &question_ids)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load questions"))?;
    if known.len() != question_ids.len() {
        return Err(ApiError::BadRequest("One or more question ids are unknown".to_string()));
    }

    let (exam, _) = lifecycle::create_exam(state.db(), payload, &principal).await?;
    let questions = question_details(&state, &exam, true, false).await?;
    let response = ExamResponse::new(&exam, exam.status, Some(questions));
    Ok((StatusCode::CREATED, Json(response)))
}

async fn list_exams(
    CurrentPrincipal(principal): CurrentPrincipal,
    State(state): State<AppState>,
    Query(params): Query<ExamListQuery>,
) -> Result<Json<Vec<ExamResponse>>, ApiError> {
    let now = primitive_now_utc();

    let mut filters = repositories::exams::ExamFilters {
        class_id: params.class_id,
        subject_id: params.subject_id,
        status: params.status,
    };
    // Students only ever see their own class.
    if !principal.is_authority() {
        let Some(class_id) = principal.class_id.clone() else {
            return Ok(Json(Vec::new()));
        };
        filters.class_id = Some(class_id);
    }

    let exams = repositories::exams::list(state.db(), filters)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;

    let responses = exams
        .iter()
        .filter(|exam| principal.is_authority() || exam.status != crate::db::types::ExamStatus::Draft)
        .map(|exam| ExamResponse::new(exam, lifecycle::effective_status(exam, now), None))
        .collect();
    Ok(Json(responses))
}

/// Exams a student can sit right now.
async fn list_active_exams(
    CurrentPrincipal(principal): CurrentPrincipal,
    State(state): State<AppState>,
) -> Result<Json<Vec<ExamResponse>>, ApiError> {
    let Some(class_id) = principal.class_id.as_deref() else {
        return Ok(Json(Vec::new()));
    };

    let now = primitive_now_utc();
    let exams = repositories::exams::list_active_for_class(state.db(), class_id, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list active exams"))?;

    let responses =
        exams.iter().map(|exam| ExamResponse::new(exam, exam.status, None)).collect();
    Ok(Json(responses))
}

async fn get_exam(
    CurrentPrincipal(principal): CurrentPrincipal,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    let now = primitive_now_utc();
    let visibility = access::can_view(&principal, &exam, now);
    if !visibility.visible {
        return Err(ApiError::NotFound("Exam not found".to_string()));
    }

    let questions = if visibility.questions_visible {
        let reveal_answers = principal.is_authority();
        let shuffle = exam.shuffle_questions && !principal.is_authority();
        Some(question_details(&state, &exam, reveal_answers, shuffle).await?)
    } else {
        None
    };

    Ok(Json(ExamResponse::new(&exam, lifecycle::effective_status(&exam, now), questions)))
}

async fn update_exam(
    CurrentAuthority(principal): CurrentAuthority,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
    Json(payload): Json<ExamUpdate>,
) -> Result<Json<ExamResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let (exam, _) = lifecycle::update_exam(state.db(), &exam_id, payload, &principal).await?;
    let questions = question_details(&state, &exam, true, false).await?;
    Ok(Json(ExamResponse::new(&exam, exam.status, Some(questions))))
}

async fn delete_exam(
    CurrentAuthority(principal): CurrentAuthority,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    lifecycle::delete_exam(state.db(), &exam_id, &principal).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn schedule_exam(
    CurrentAuthority(principal): CurrentAuthority,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
    Json(payload): Json<ScheduleRequest>,
) -> Result<Json<ExamResponse>, ApiError> {
    let start = to_primitive_utc(payload.scheduled_at);
    let end = to_primitive_utc(payload.ends_at);

    let exam = lifecycle::schedule_exam(state.db(), &exam_id, start, end, &principal).await?;
    Ok(Json(ExamResponse::new(&exam, exam.status, None)))
}

async fn publish_exam(
    CurrentAuthority(principal): CurrentAuthority,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = lifecycle::publish_exam(state.db(), &exam_id, &principal).await?;
    Ok(Json(ExamResponse::new(&exam, exam.status, None)))
}

async fn complete_exam(
    CurrentAdmin(principal): CurrentAdmin,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = lifecycle::complete_exam(state.db(), &exam_id, &principal).await?;
    Ok(Json(ExamResponse::new(&exam, exam.status, None)))
}

async fn submit_exam(
    CurrentPrincipal(principal): CurrentPrincipal,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
    Json(payload): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let (submission, answers) =
        grading::submit(state.db(), &exam_id, &principal, payload).await?;
    Ok((StatusCode::CREATED, Json(SubmissionResponse::new(&submission, Some(&answers)))))
}

async fn list_exam_submissions(
    CurrentAuthority(_principal): CurrentAuthority,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<Vec<SubmissionResponse>>, ApiError> {
    let submissions = repositories::submissions::list(
        state.db(),
        repositories::submissions::SubmissionFilters {
            exam_id: Some(exam_id),
            ..Default::default()
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to list submissions"))?;

    let responses =
        submissions.iter().map(|submission| SubmissionResponse::new(submission, None)).collect();
    Ok(Json(responses))
}

async fn my_result(
    CurrentPrincipal(principal): CurrentPrincipal,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let (submission, answers) = results::view_result(state.db(), &exam_id, &principal).await?;
    Ok(Json(SubmissionResponse::new(&submission, Some(&answers))))
}

/// Loads an exam's question list with options, projected for the caller.
async fn question_details(
    state: &AppState,
    exam: &Exam,
    reveal_answers: bool,
    shuffle: bool,
) -> Result<Vec<ExamQuestionDetail>, ApiError> {
    let entries = repositories::exams::list_questions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam questions"))?;
    let ids: Vec<String> = entries.iter().map(|entry| entry.question_id.clone()).collect();

    let questions: HashMap<String, Question> =
        repositories::questions::find_many_by_ids(state.db(), &ids)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load questions"))?
            .into_iter()
            .map(|question| (question.id.clone(), question))
            .collect();

    let mut options_by_question: HashMap<String, Vec<QuestionOption>> = HashMap::new();
    for option in repositories::questions::list_options_for_questions(state.db(), &ids)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load question options"))?
    {
        options_by_question.entry(option.question_id.clone()).or_default().push(option);
    }

    let mut details: Vec<ExamQuestionDetail> = entries
        .iter()
        .filter_map(|entry| {
            let question = questions.get(&entry.question_id)?;
            let options =
                options_by_question.get(&entry.question_id).map(Vec::as_slice).unwrap_or(&[]);
            Some(ExamQuestionDetail::assemble(entry, question, options, reveal_answers))
        })
        .collect();

    if shuffle {
        details.shuffle(&mut rand::thread_rng());
    }

    Ok(details)
}
