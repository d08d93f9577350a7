use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Exam, ExamQuestion, Question, QuestionOption};
use crate::db::types::{ExamStatus, QuestionKind};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub(crate) struct ExamQuestionItem {
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[serde(default = "default_points")]
    #[validate(range(min = 0.5, message = "points must be at least 0.5"))]
    pub(crate) points: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 3, max = 200, message = "title must be 3-200 characters"))]
    pub(crate) title: String,
    #[serde(alias = "classId")]
    #[validate(length(min = 1, message = "class_id must not be empty"))]
    pub(crate) class_id: String,
    #[serde(alias = "subjectId")]
    #[validate(length(min = 1, message = "subject_id must not be empty"))]
    pub(crate) subject_id: String,
    #[serde(alias = "durationMinutes")]
    #[validate(range(min = 5, max = 300, message = "duration_minutes must be 5-300"))]
    pub(crate) duration_minutes: i32,
    #[serde(default)]
    pub(crate) instructions: String,
    #[serde(alias = "totalMarks")]
    #[validate(range(exclusive_min = 0.0, message = "total_marks must be positive"))]
    pub(crate) total_marks: f64,
    #[serde(alias = "passingMarks")]
    #[validate(range(min = 0.0, message = "passing_marks must be non-negative"))]
    pub(crate) passing_marks: f64,
    #[serde(default, alias = "shuffleQuestions")]
    pub(crate) shuffle_questions: bool,
    #[serde(default = "default_show_results", alias = "showResults")]
    pub(crate) show_results: bool,
    #[validate(length(min = 1, message = "an exam needs at least one question"), nested)]
    pub(crate) questions: Vec<ExamQuestionItem>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamUpdate {
    #[serde(default)]
    #[validate(length(min = 3, max = 200, message = "title must be 3-200 characters"))]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) instructions: Option<String>,
    #[serde(default, alias = "durationMinutes")]
    #[validate(range(min = 5, max = 300, message = "duration_minutes must be 5-300"))]
    pub(crate) duration_minutes: Option<i32>,
    #[serde(default, alias = "totalMarks")]
    #[validate(range(exclusive_min = 0.0, message = "total_marks must be positive"))]
    pub(crate) total_marks: Option<f64>,
    #[serde(default, alias = "passingMarks")]
    #[validate(range(min = 0.0, message = "passing_marks must be non-negative"))]
    pub(crate) passing_marks: Option<f64>,
    #[serde(default, alias = "shuffleQuestions")]
    pub(crate) shuffle_questions: Option<bool>,
    #[serde(default, alias = "showResults")]
    pub(crate) show_results: Option<bool>,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) questions: Option<Vec<ExamQuestionItem>>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ScheduleRequest {
    #[serde(alias = "scheduledAt", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) scheduled_at: OffsetDateTime,
    #[serde(alias = "endsAt", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) ends_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExamListQuery {
    #[serde(default, alias = "classId")]
    pub(crate) class_id: Option<String>,
    #[serde(default, alias = "subjectId")]
    pub(crate) subject_id: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<ExamStatus>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OptionView {
    pub(crate) id: String,
    pub(crate) text: String,
    /// Withheld (None) in student projections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) is_correct: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamQuestionDetail {
    pub(crate) question_id: String,
    pub(crate) text: String,
    pub(crate) kind: QuestionKind,
    pub(crate) points: f64,
    pub(crate) position: i32,
    pub(crate) options: Vec<OptionView>,
}

impl ExamQuestionDetail {
    pub(crate) fn assemble(
        entry: &ExamQuestion,
        question: &Question,
        options: &[QuestionOption],
        reveal_answers: bool,
    ) -> Self {
        Self {
            question_id: question.id.clone(),
            text: question.text.clone(),
            kind: question.kind,
            points: entry.points,
            position: entry.position,
            options: options
                .iter()
                .map(|option| OptionView {
                    id: option.id.clone(),
                    text: option.text.clone(),
                    is_correct: reveal_answers.then_some(option.is_correct),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) class_id: String,
    pub(crate) subject_id: String,
    pub(crate) created_by: String,
    pub(crate) duration_minutes: i32,
    pub(crate) instructions: String,
    pub(crate) total_questions: i32,
    pub(crate) total_marks: f64,
    pub(crate) passing_marks: f64,
    pub(crate) shuffle_questions: bool,
    pub(crate) show_results: bool,
    pub(crate) status: ExamStatus,
    pub(crate) scheduled_at: Option<String>,
    pub(crate) ends_at: Option<String>,
    pub(crate) published_at: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) questions: Option<Vec<ExamQuestionDetail>>,
}

impl ExamResponse {
    pub(crate) fn new(
        exam: &Exam,
        status: ExamStatus,
        questions: Option<Vec<ExamQuestionDetail>>,
    ) -> Self {
        Self {
            id: exam.id.clone(),
            title: exam.title.clone(),
            class_id: exam.class_id.clone(),
            subject_id: exam.subject_id.clone(),
            created_by: exam.created_by.clone(),
            duration_minutes: exam.duration_minutes,
            instructions: exam.instructions.clone(),
            total_questions: exam.total_questions,
            total_marks: exam.total_marks,
            passing_marks: exam.passing_marks,
            shuffle_questions: exam.shuffle_questions,
            show_results: exam.show_results,
            status,
            scheduled_at: exam.scheduled_at.map(format_primitive),
            ends_at: exam.ends_at.map(format_primitive),
            published_at: exam.published_at.map(format_primitive),
            created_at: format_primitive(exam.created_at),
            updated_at: format_primitive(exam.updated_at),
            questions,
        }
    }
}

fn default_points() -> f64 {
    1.0
}

fn default_show_results() -> bool {
    true
}

fn parse_offset_datetime_flexible(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    // datetime-local inputs often arrive without a timezone.
    if raw.len() == 16 && raw.as_bytes().get(10) == Some(&b'T') {
        let candidate = format!("{raw}:00Z");
        if let Ok(value) = OffsetDateTime::parse(&candidate, &Rfc3339) {
            return Some(value);
        }
    }

    if raw.len() == 19 && raw.as_bytes().get(10) == Some(&b'T') {
        let candidate = format!("{raw}Z");
        if let Ok(value) = OffsetDateTime::parse(&candidate, &Rfc3339) {
            return Some(value);
        }
    }

    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(value.assume_utc());
    }

    None
}

fn deserialize_offset_datetime_flexible<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_offset_datetime_flexible(&raw)
        .ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_request_accepts_timezoneless_input() {
        let body = r#"{"scheduledAt": "2026-09-01T09:00", "endsAt": "2026-09-01T11:00:00"}"#;
        let request: ScheduleRequest = serde_json::from_str(body).unwrap();
        assert!(request.scheduled_at < request.ends_at);
    }

    #[test]
    fn schedule_request_rejects_garbage() {
        let body = r#"{"scheduledAt": "next tuesday", "endsAt": "2026-09-01T11:00:00Z"}"#;
        assert!(serde_json::from_str::<ScheduleRequest>(body).is_err());
    }

    #[test]
    fn exam_create_defaults_points_per_question() {
        let body = r#"{
            "title": "Algebra midterm",
            "classId": "class-1",
            "subjectId": "subject-1",
            "durationMinutes": 60,
            "totalMarks": 10,
            "passingMarks": 4,
            "questions": [{"questionId": "q1"}]
        }"#;
        let request: ExamCreate = serde_json::from_str(body).unwrap();
        assert_eq!(request.questions[0].points, 1.0);
        assert!(request.validate().is_ok());
    }
}
