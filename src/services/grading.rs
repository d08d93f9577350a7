//! Submission grading engine: single-attempt admission, deterministic
//! auto-grading of objective questions, and persistence of the scored
//! attempt.

use std::collections::HashMap;

use sqlx::PgPool;
use time::Duration;
use uuid::Uuid;

use crate::core::security::Principal;
use crate::core::time::primitive_now_utc;
use crate::db::models::{ExamQuestion, Question, QuestionOption, Submission, SubmissionAnswer};
use crate::db::types::QuestionKind;
use crate::repositories;
use crate::repositories::submissions::NewAnswer;
use crate::schemas::submission::{AnswerInput, SubmitRequest};
use crate::services::{access, error::ExamError};

/// Outcome of grading a single answer against its question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Verdict {
    pub(crate) correct: bool,
    /// False routes the answer to human grading (`reviewed` stays unset).
    pub(crate) auto_graded: bool,
}

/// Grades one answer value under the question's kind. The closed dispatch
/// makes "short answers are never auto-graded" a visible contract instead of
/// a fallthrough.
pub(crate) fn grade_answer(
    kind: QuestionKind,
    options: &[QuestionOption],
    answer: &str,
) -> Verdict {
    match kind {
        QuestionKind::MultipleChoice | QuestionKind::TrueFalse => {
            // Correct iff the value equals the text of the first option
            // flagged correct; with none flagged, no answer can be correct.
            let correct = options
                .iter()
                .find(|option| option.is_correct)
                .is_some_and(|option| option.text == answer);
            Verdict { correct, auto_graded: true }
        }
        QuestionKind::ShortAnswer => Verdict { correct: false, auto_graded: false },
    }
}

pub(crate) struct LoadedQuestion {
    pub(crate) question: Question,
    pub(crate) options: Vec<QuestionOption>,
}

#[derive(Debug)]
pub(crate) struct GradeOutcome {
    pub(crate) answers: Vec<NewAnswer>,
    pub(crate) total_score: f64,
    pub(crate) max_score: f64,
}

/// Deterministic grading pass over the supplied answers.
///
/// Answers whose question is not part of the exam's question list, or whose
/// question row cannot be resolved, are skipped rather than rejected: a
/// forged or stale question id must not discard an otherwise valid attempt.
/// `max_score` sums the point values of the matched answers only, so a
/// partial submission has a smaller denominator than the exam's full total.
pub(crate) fn autograde(
    exam_questions: &[ExamQuestion],
    questions: &HashMap<String, LoadedQuestion>,
    answers: &[AnswerInput],
) -> GradeOutcome {
    let points_by_question: HashMap<&str, f64> = exam_questions
        .iter()
        .map(|entry| (entry.question_id.as_str(), entry.points))
        .collect();

    let mut graded = Vec::new();
    let mut total_score = 0.0;
    let mut max_score = 0.0;

    for answer in answers {
        let Some(points) = points_by_question.get(answer.question_id.as_str()).copied() else {
            continue;
        };
        let Some(loaded) = questions.get(&answer.question_id) else {
            continue;
        };

        max_score += points;

        let verdict = grade_answer(loaded.question.kind, &loaded.options, &answer.answer);
        let awarded = if verdict.correct { points } else { 0.0 };
        total_score += awarded;

        graded.push(NewAnswer {
            question_id: answer.question_id.clone(),
            answer: answer.answer.clone(),
            is_correct: verdict.correct,
            awarded_marks: awarded,
            reviewed: verdict.auto_graded,
        });
    }

    GradeOutcome { answers: graded, total_score, max_score }
}

/// The single-attempt submission protocol. Checks run in a fixed order:
/// missing exam, unpublished, closed window, duplicate attempt, then grading.
pub(crate) async fn submit(
    pool: &PgPool,
    exam_id: &str,
    principal: &Principal,
    payload: SubmitRequest,
) -> Result<(Submission, Vec<SubmissionAnswer>), ExamError> {
    let now = primitive_now_utc();

    let exam = repositories::exams::find_by_id(pool, exam_id)
        .await?
        .ok_or(ExamError::NotFound("Exam"))?;

    let prior = repositories::submissions::find_attempt(pool, exam_id, &principal.id)
        .await?
        .map(|submission| submission.status);
    access::check_submit(principal, &exam, prior, now)?;

    let exam_questions = repositories::exams::list_questions(pool, exam_id).await?;
    let answered_ids: Vec<String> =
        payload.answers.iter().map(|answer| answer.question_id.clone()).collect();
    let questions = load_questions(pool, &answered_ids).await?;

    let outcome = autograde(&exam_questions, &questions, &payload.answers);

    let submission_id = Uuid::new_v4().to_string();
    let start_time = now - Duration::seconds(i64::from(payload.time_spent_seconds));
    let submission = repositories::submissions::insert_attempt(
        pool,
        repositories::submissions::NewSubmission {
            id: &submission_id,
            exam_id,
            student_id: &principal.id,
            start_time,
            time_spent_seconds: payload.time_spent_seconds,
            warnings: payload.warnings,
            total_score: outcome.total_score,
            max_score: outcome.max_score,
            created_at: now,
        },
        &outcome.answers,
    )
    .await
    .map_err(ExamError::from_submission_insert)?;

    let answers = repositories::submissions::list_answers(pool, &submission.id).await?;

    tracing::info!(
        exam_id = %exam_id,
        submission_id = %submission.id,
        total_score = submission.total_score,
        max_score = submission.max_score,
        "submission graded"
    );
    Ok((submission, answers))
}

async fn load_questions(
    pool: &PgPool,
    question_ids: &[String],
) -> Result<HashMap<String, LoadedQuestion>, ExamError> {
    let questions = repositories::questions::find_many_by_ids(pool, question_ids).await?;
    let mut options_by_question: HashMap<String, Vec<QuestionOption>> = HashMap::new();
    for option in
        repositories::questions::list_options_for_questions(pool, question_ids).await?
    {
        options_by_question.entry(option.question_id.clone()).or_default().push(option);
    }

    Ok(questions
        .into_iter()
        .map(|question| {
            let options = options_by_question.remove(&question.id).unwrap_or_default();
            (question.id.clone(), LoadedQuestion { question, options })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures::{exam_question, loaded_question, option};

    fn answer(question_id: &str, value: &str) -> AnswerInput {
        AnswerInput { question_id: question_id.to_string(), answer: value.to_string() }
    }

    fn question_map(entries: Vec<LoadedQuestion>) -> HashMap<String, LoadedQuestion> {
        entries.into_iter().map(|entry| (entry.question.id.clone(), entry)).collect()
    }

    #[test]
    fn correct_choice_awards_the_configured_points() {
        let questions = question_map(vec![loaded_question(
            "q1",
            QuestionKind::MultipleChoice,
            vec![option("q1", "A", true), option("q1", "B", false)],
        )]);
        let exam_questions = vec![exam_question("q1", 2.0)];

        let outcome = autograde(&exam_questions, &questions, &[answer("q1", "A")]);

        assert_eq!(outcome.total_score, 2.0);
        assert_eq!(outcome.max_score, 2.0);
        assert_eq!(outcome.answers.len(), 1);
        assert!(outcome.answers[0].is_correct);
        assert_eq!(outcome.answers[0].awarded_marks, 2.0);
    }

    #[test]
    fn wrong_choice_awards_zero_but_counts_toward_max() {
        let questions = question_map(vec![loaded_question(
            "q1",
            QuestionKind::MultipleChoice,
            vec![option("q1", "A", true), option("q1", "B", false)],
        )]);
        let exam_questions = vec![exam_question("q1", 2.0)];

        let outcome = autograde(&exam_questions, &questions, &[answer("q1", "B")]);

        assert_eq!(outcome.total_score, 0.0);
        assert_eq!(outcome.max_score, 2.0);
        assert!(!outcome.answers[0].is_correct);
    }

    #[test]
    fn true_false_uses_the_same_mechanism() {
        let questions = question_map(vec![loaded_question(
            "q1",
            QuestionKind::TrueFalse,
            vec![option("q1", "True", false), option("q1", "False", true)],
        )]);
        let exam_questions = vec![exam_question("q1", 1.0)];

        let outcome = autograde(&exam_questions, &questions, &[answer("q1", "False")]);
        assert_eq!(outcome.total_score, 1.0);
    }

    #[test]
    fn short_answer_is_never_auto_graded() {
        let questions =
            question_map(vec![loaded_question("q1", QuestionKind::ShortAnswer, vec![])]);
        let exam_questions = vec![exam_question("q1", 3.0)];

        let outcome = autograde(&exam_questions, &questions, &[answer("q1", "photosynthesis")]);

        assert_eq!(outcome.total_score, 0.0);
        assert_eq!(outcome.max_score, 3.0);
        assert!(!outcome.answers[0].is_correct);
        assert!(!outcome.answers[0].reviewed);
    }

    #[test]
    fn objective_answers_are_marked_reviewed() {
        let questions = question_map(vec![loaded_question(
            "q1",
            QuestionKind::MultipleChoice,
            vec![option("q1", "A", true)],
        )]);
        let exam_questions = vec![exam_question("q1", 1.0)];

        let outcome = autograde(&exam_questions, &questions, &[answer("q1", "B")]);
        assert!(outcome.answers[0].reviewed);
    }

    #[test]
    fn no_option_flagged_correct_means_no_answer_is_correct() {
        let questions = question_map(vec![loaded_question(
            "q1",
            QuestionKind::MultipleChoice,
            vec![option("q1", "A", false), option("q1", "B", false)],
        )]);
        let exam_questions = vec![exam_question("q1", 1.0)];

        for value in ["A", "B", ""] {
            let outcome = autograde(&exam_questions, &questions, &[answer("q1", value)]);
            assert!(!outcome.answers[0].is_correct, "answer {value:?} must not be correct");
        }
    }

    #[test]
    fn forged_question_ids_are_skipped_silently() {
        let questions = question_map(vec![loaded_question(
            "q1",
            QuestionKind::MultipleChoice,
            vec![option("q1", "A", true)],
        )]);
        let exam_questions = vec![exam_question("q1", 2.0)];

        let outcome = autograde(
            &exam_questions,
            &questions,
            &[answer("q1", "A"), answer("not-in-exam", "A")],
        );

        assert_eq!(outcome.answers.len(), 1);
        assert_eq!(outcome.max_score, 2.0);
        assert_eq!(outcome.total_score, 2.0);
    }

    #[test]
    fn unresolvable_question_rows_are_skipped() {
        // "q2" is in the exam's list but its question row is gone.
        let questions = question_map(vec![loaded_question(
            "q1",
            QuestionKind::MultipleChoice,
            vec![option("q1", "A", true)],
        )]);
        let exam_questions = vec![exam_question("q1", 1.0), exam_question("q2", 5.0)];

        let outcome =
            autograde(&exam_questions, &questions, &[answer("q1", "A"), answer("q2", "A")]);

        assert_eq!(outcome.answers.len(), 1);
        assert_eq!(outcome.max_score, 1.0);
    }

    #[test]
    fn partial_submission_has_a_smaller_denominator() {
        let questions = question_map(vec![
            loaded_question("q1", QuestionKind::MultipleChoice, vec![option("q1", "A", true)]),
            loaded_question("q2", QuestionKind::MultipleChoice, vec![option("q2", "C", true)]),
        ]);
        let exam_questions = vec![exam_question("q1", 2.0), exam_question("q2", 3.0)];

        let outcome = autograde(&exam_questions, &questions, &[answer("q1", "A")]);

        assert_eq!(outcome.max_score, 2.0);
        assert_eq!(outcome.total_score, 2.0);
    }

    #[test]
    fn grading_is_deterministic() {
        let questions = question_map(vec![
            loaded_question(
                "q1",
                QuestionKind::MultipleChoice,
                vec![option("q1", "A", true), option("q1", "B", false)],
            ),
            loaded_question("q2", QuestionKind::ShortAnswer, vec![]),
        ]);
        let exam_questions = vec![exam_question("q1", 2.0), exam_question("q2", 4.0)];
        let answers = [answer("q1", "A"), answer("q2", "essay text")];

        let first = autograde(&exam_questions, &questions, &answers);
        for _ in 0..10 {
            let again = autograde(&exam_questions, &questions, &answers);
            assert_eq!(again.total_score, first.total_score);
            assert_eq!(again.max_score, first.max_score);
            let verdicts: Vec<bool> = again.answers.iter().map(|a| a.is_correct).collect();
            let expected: Vec<bool> = first.answers.iter().map(|a| a.is_correct).collect();
            assert_eq!(verdicts, expected);
        }
    }

    #[test]
    fn total_never_exceeds_max() {
        let questions = question_map(vec![
            loaded_question("q1", QuestionKind::MultipleChoice, vec![option("q1", "A", true)]),
            loaded_question("q2", QuestionKind::TrueFalse, vec![option("q2", "True", true)]),
            loaded_question("q3", QuestionKind::ShortAnswer, vec![]),
        ]);
        let exam_questions =
            vec![exam_question("q1", 2.0), exam_question("q2", 1.5), exam_question("q3", 4.0)];

        let outcome = autograde(
            &exam_questions,
            &questions,
            &[answer("q1", "A"), answer("q2", "False"), answer("q3", "anything")],
        );

        assert!(outcome.total_score <= outcome.max_score);
        assert_eq!(outcome.max_score, 7.5);
        assert_eq!(outcome.total_score, 2.0);
    }
}
