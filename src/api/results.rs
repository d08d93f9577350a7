use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAuthority, CurrentPrincipal};
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::submission::{GradeRequest, SubmissionListQuery, SubmissionResponse};
use crate::services::results;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_submissions))
        .route("/:submission_id", get(get_submission))
        .route("/:submission_id/grade", post(grade_submission))
        .route("/:submission_id/reevaluate", post(request_reevaluation))
        .route("/exams/:exam_id/publish", post(publish_results))
}

async fn list_submissions(
    CurrentAuthority(_principal): CurrentAuthority,
    State(state): State<AppState>,
    Query(params): Query<SubmissionListQuery>,
) -> Result<Json<Vec<SubmissionResponse>>, ApiError> {
    let submissions = repositories::submissions::list(
        state.db(),
        repositories::submissions::SubmissionFilters {
            exam_id: params.exam_id,
            student_id: params.student_id,
            status: params.status,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to list submissions"))?;

    let responses =
        submissions.iter().map(|submission| SubmissionResponse::new(submission, None)).collect();
    Ok(Json(responses))
}

async fn get_submission(
    CurrentPrincipal(principal): CurrentPrincipal,
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = repositories::submissions::find_by_id(state.db(), &submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load submission"))?
        .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;

    if !principal.is_authority() && submission.student_id != principal.id {
        return Err(ApiError::NotFound("Submission not found".to_string()));
    }

    let answers = repositories::submissions::list_answers(state.db(), &submission.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load submission answers"))?;
    Ok(Json(SubmissionResponse::new(&submission, Some(&answers))))
}

async fn grade_submission(
    CurrentAuthority(principal): CurrentAuthority,
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
    Json(payload): Json<GradeRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let (submission, answers) =
        results::grade_submission(state.db(), &submission_id, payload, &principal).await?;
    Ok(Json(SubmissionResponse::new(&submission, Some(&answers))))
}

async fn request_reevaluation(
    CurrentPrincipal(principal): CurrentPrincipal,
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission =
        results::request_reevaluation(state.db(), &submission_id, &principal).await?;
    Ok(Json(SubmissionResponse::new(&submission, None)))
}

#[derive(Debug, Serialize)]
struct PublishResultsResponse {
    published: u64,
}

async fn publish_results(
    CurrentAuthority(principal): CurrentAuthority,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<PublishResultsResponse>, ApiError> {
    let published = results::publish_results(state.db(), &exam_id, &principal).await?;
    Ok(Json(PublishResultsResponse { published }))
}
