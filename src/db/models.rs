use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{
    DifficultyLevel, ExamStatus, ProctorWarning, QuestionKind, SubmissionStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
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
    pub(crate) scheduled_at: Option<PrimitiveDateTime>,
    pub(crate) ends_at: Option<PrimitiveDateTime>,
    pub(crate) published_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// One entry of an exam's ordered question list, with its point value.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamQuestion {
    pub(crate) exam_id: String,
    pub(crate) question_id: String,
    pub(crate) points: f64,
    pub(crate) position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) kind: QuestionKind,
    pub(crate) expected_answer: Option<String>,
    pub(crate) subject_id: String,
    pub(crate) topic: Option<String>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionOption {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) text: String,
    pub(crate) is_correct: bool,
    pub(crate) position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) time_spent_seconds: i32,
    pub(crate) warnings: Json<Vec<ProctorWarning>>,
    pub(crate) status: SubmissionStatus,
    pub(crate) total_score: f64,
    pub(crate) max_score: f64,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_by: Option<String>,
    pub(crate) reevaluation_requested: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct SubmissionAnswer {
    pub(crate) id: String,
    pub(crate) submission_id: String,
    pub(crate) question_id: String,
    pub(crate) answer: String,
    pub(crate) is_correct: bool,
    pub(crate) awarded_marks: f64,
    pub(crate) reviewed: bool,
    pub(crate) position: i32,
}
