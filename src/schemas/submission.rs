use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Submission, SubmissionAnswer};
use crate::db::types::{ProctorWarning, SubmissionStatus};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub(crate) struct AnswerInput {
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[serde(deserialize_with = "deserialize_answer_flexible")]
    pub(crate) answer: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubmitRequest {
    #[validate(length(min = 1, message = "a submission needs at least one answer"), nested)]
    pub(crate) answers: Vec<AnswerInput>,
    #[serde(alias = "timeSpentSeconds")]
    #[validate(range(min = 1, message = "time_spent_seconds must be positive"))]
    pub(crate) time_spent_seconds: i32,
    #[serde(default)]
    pub(crate) warnings: Vec<ProctorWarning>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradeRequest {
    #[serde(alias = "totalScore")]
    #[validate(range(min = 0.0, message = "total_score must be non-negative"))]
    pub(crate) total_score: f64,
    #[serde(default)]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmissionListQuery {
    #[serde(default, alias = "examId")]
    pub(crate) exam_id: Option<String>,
    #[serde(default, alias = "studentId")]
    pub(crate) student_id: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<SubmissionStatus>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerView {
    pub(crate) question_id: String,
    pub(crate) answer: String,
    pub(crate) is_correct: bool,
    pub(crate) awarded_marks: f64,
    pub(crate) reviewed: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) start_time: String,
    pub(crate) time_spent_seconds: i32,
    pub(crate) warnings: Vec<ProctorWarning>,
    pub(crate) status: SubmissionStatus,
    pub(crate) total_score: f64,
    pub(crate) max_score: f64,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_by: Option<String>,
    pub(crate) reevaluation_requested: bool,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) answers: Option<Vec<AnswerView>>,
}

impl SubmissionResponse {
    pub(crate) fn new(submission: &Submission, answers: Option<&[SubmissionAnswer]>) -> Self {
        Self {
            id: submission.id.clone(),
            exam_id: submission.exam_id.clone(),
            student_id: submission.student_id.clone(),
            start_time: format_primitive(submission.start_time),
            time_spent_seconds: submission.time_spent_seconds,
            warnings: submission.warnings.0.clone(),
            status: submission.status,
            total_score: submission.total_score,
            max_score: submission.max_score,
            feedback: submission.feedback.clone(),
            graded_by: submission.graded_by.clone(),
            reevaluation_requested: submission.reevaluation_requested,
            created_at: format_primitive(submission.created_at),
            updated_at: format_primitive(submission.updated_at),
            answers: answers.map(|answers| {
                answers
                    .iter()
                    .map(|answer| AnswerView {
                        question_id: answer.question_id.clone(),
                        answer: answer.answer.clone(),
                        is_correct: answer.is_correct,
                        awarded_marks: answer.awarded_marks,
                        reviewed: answer.reviewed,
                    })
                    .collect()
            }),
        }
    }
}

/// Clients send answer values as strings, numbers or booleans depending on
/// the question widget; everything is compared as text downstream.
fn deserialize_answer_flexible<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(text) => Ok(text),
        serde_json::Value::Number(number) => Ok(number.to_string()),
        serde_json::Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(D::Error::custom(format!("unsupported answer value: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_values_coerce_to_text() {
        let body = r#"{
            "timeSpentSeconds": 120,
            "answers": [
                {"questionId": "q1", "answer": "A"},
                {"questionId": "q2", "answer": 42},
                {"questionId": "q3", "answer": true}
            ]
        }"#;
        let request: SubmitRequest = serde_json::from_str(body).unwrap();
        let values: Vec<&str> =
            request.answers.iter().map(|answer| answer.answer.as_str()).collect();
        assert_eq!(values, ["A", "42", "true"]);
        assert!(request.warnings.is_empty());
    }

    #[test]
    fn structured_answer_values_are_rejected() {
        let body = r#"{
            "timeSpentSeconds": 120,
            "answers": [{"questionId": "q1", "answer": {"nested": true}}]
        }"#;
        assert!(serde_json::from_str::<SubmitRequest>(body).is_err());
    }

    #[test]
    fn proctor_warnings_deserialize_from_kebab_case() {
        let body = r#"{
            "timeSpentSeconds": 60,
            "answers": [{"questionId": "q1", "answer": "A"}],
            "warnings": ["switched-tab", "idle-time", "screenshot-detected"]
        }"#;
        let request: SubmitRequest = serde_json::from_str(body).unwrap();
        assert_eq!(
            request.warnings,
            [
                ProctorWarning::SwitchedTab,
                ProctorWarning::IdleTime,
                ProctorWarning::ScreenshotDetected
            ]
        );
    }
}
