use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Question, QuestionOption};
use crate::db::types::{DifficultyLevel, QuestionKind};
use crate::schemas::exam::OptionView;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct OptionCreate {
    #[validate(length(min = 1, message = "option text must not be empty"))]
    pub(crate) text: String,
    #[serde(default, alias = "isCorrect")]
    pub(crate) is_correct: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionCreate {
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub(crate) text: String,
    #[serde(alias = "type")]
    pub(crate) kind: QuestionKind,
    #[serde(default, alias = "expectedAnswer")]
    pub(crate) expected_answer: Option<String>,
    #[serde(alias = "subjectId")]
    #[validate(length(min = 1, message = "subject_id must not be empty"))]
    pub(crate) subject_id: String,
    #[serde(default)]
    pub(crate) topic: Option<String>,
    #[serde(default = "default_difficulty")]
    pub(crate) difficulty: DifficultyLevel,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) options: Vec<OptionCreate>,
}

impl QuestionCreate {
    /// Kind-specific shape rules that validator's field attributes cannot
    /// express: choice questions carry options with exactly one marked
    /// correct, short answers carry none.
    pub(crate) fn check_option_shape(&self) -> Result<(), &'static str> {
        check_option_shape(self.kind, &self.options)
    }
}

pub(crate) fn check_option_shape(
    kind: QuestionKind,
    options: &[OptionCreate],
) -> Result<(), &'static str> {
    let correct = options.iter().filter(|option| option.is_correct).count();
    match kind {
        QuestionKind::MultipleChoice => {
            if options.len() < 2 {
                return Err("multiple_choice questions need at least two options");
            }
            if correct != 1 {
                return Err("exactly one option must be marked correct");
            }
        }
        QuestionKind::TrueFalse => {
            if options.len() != 2 {
                return Err("true_false questions need exactly two options");
            }
            if correct != 1 {
                return Err("exactly one option must be marked correct");
            }
        }
        QuestionKind::ShortAnswer => {
            if !options.is_empty() {
                return Err("short_answer questions do not take options");
            }
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionUpdate {
    #[serde(default)]
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub(crate) text: Option<String>,
    #[serde(default, alias = "expectedAnswer")]
    pub(crate) expected_answer: Option<Option<String>>,
    #[serde(default)]
    pub(crate) topic: Option<Option<String>>,
    #[serde(default)]
    pub(crate) difficulty: Option<DifficultyLevel>,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) options: Option<Vec<OptionCreate>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionBankQuery {
    #[serde(default, alias = "subjectId")]
    pub(crate) subject_id: Option<String>,
    #[serde(default)]
    pub(crate) topic: Option<String>,
    #[serde(default)]
    pub(crate) difficulty: Option<DifficultyLevel>,
    #[serde(default = "default_include_shared", alias = "includeShared")]
    pub(crate) include_shared: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ShareRequest {
    #[serde(alias = "teacherIds")]
    #[validate(length(min = 1, message = "at least one teacher id is required"))]
    pub(crate) teacher_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) kind: QuestionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) expected_answer: Option<String>,
    pub(crate) subject_id: String,
    pub(crate) topic: Option<String>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) options: Vec<OptionView>,
}

impl QuestionResponse {
    pub(crate) fn new(question: &Question, options: &[QuestionOption]) -> Self {
        Self {
            id: question.id.clone(),
            text: question.text.clone(),
            kind: question.kind,
            expected_answer: question.expected_answer.clone(),
            subject_id: question.subject_id.clone(),
            topic: question.topic.clone(),
            difficulty: question.difficulty,
            created_by: question.created_by.clone(),
            created_at: format_primitive(question.created_at),
            updated_at: format_primitive(question.updated_at),
            options: options
                .iter()
                .map(|option| OptionView {
                    id: option.id.clone(),
                    text: option.text.clone(),
                    is_correct: Some(option.is_correct),
                })
                .collect(),
        }
    }
}

fn default_difficulty() -> DifficultyLevel {
    DifficultyLevel::Medium
}

fn default_include_shared() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(text: &str, is_correct: bool) -> OptionCreate {
        OptionCreate { text: text.to_string(), is_correct }
    }

    #[test]
    fn multiple_choice_needs_one_correct_of_at_least_two() {
        assert!(check_option_shape(
            QuestionKind::MultipleChoice,
            &[option("A", true), option("B", false)]
        )
        .is_ok());
        assert!(check_option_shape(QuestionKind::MultipleChoice, &[option("A", true)]).is_err());
        assert!(check_option_shape(
            QuestionKind::MultipleChoice,
            &[option("A", true), option("B", true)]
        )
        .is_err());
        assert!(check_option_shape(
            QuestionKind::MultipleChoice,
            &[option("A", false), option("B", false)]
        )
        .is_err());
    }

    #[test]
    fn true_false_needs_exactly_two_options() {
        assert!(check_option_shape(
            QuestionKind::TrueFalse,
            &[option("True", true), option("False", false)]
        )
        .is_ok());
        assert!(check_option_shape(QuestionKind::TrueFalse, &[option("True", true)]).is_err());
    }

    #[test]
    fn short_answer_takes_no_options() {
        assert!(check_option_shape(QuestionKind::ShortAnswer, &[]).is_ok());
        assert!(check_option_shape(QuestionKind::ShortAnswer, &[option("A", false)]).is_err());
    }
}
