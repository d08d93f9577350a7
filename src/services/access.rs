//! Access gate: pure decisions about what a principal may see or submit.
//! Everything here is derivable from exam/submission state alone, with no
//! store calls, so the rules are testable as plain functions.

use time::PrimitiveDateTime;

use crate::core::security::Principal;
use crate::db::models::Exam;
use crate::db::types::{ExamStatus, SubmissionStatus};
use crate::services::error::ExamError;
use crate::services::lifecycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExamVisibility {
    pub(crate) visible: bool,
    /// When false for a visible exam, the caller gets the exam metadata with
    /// questions withheld. A reduced projection, not an error.
    pub(crate) questions_visible: bool,
}

pub(crate) fn can_view(
    principal: &Principal,
    exam: &Exam,
    now: PrimitiveDateTime,
) -> ExamVisibility {
    if principal.is_authority() {
        return ExamVisibility { visible: true, questions_visible: true };
    }

    let visible = principal.class_id.as_deref() == Some(exam.class_id.as_str());
    let questions_visible =
        visible && exam.status == ExamStatus::Published && lifecycle::is_active(exam, now);

    ExamVisibility { visible, questions_visible }
}

/// The admission check run before a submission is accepted. The duplicate
/// decision here is advisory; the store's uniqueness constraint settles races.
pub(crate) fn check_submit(
    principal: &Principal,
    exam: &Exam,
    prior: Option<SubmissionStatus>,
    now: PrimitiveDateTime,
) -> Result<(), ExamError> {
    if principal.is_authority() {
        return Err(ExamError::Forbidden("Only students may submit"));
    }
    if principal.class_id.as_deref() != Some(exam.class_id.as_str()) {
        return Err(ExamError::Forbidden("Exam belongs to another class"));
    }
    if exam.status != ExamStatus::Published {
        return Err(ExamError::NotAvailable);
    }
    if !lifecycle::is_active(exam, now) {
        return Err(ExamError::WindowClosed);
    }
    if prior.is_some_and(|status| status.is_attempt()) {
        return Err(ExamError::AlreadySubmitted);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::security::Role;
    use crate::test_support::fixtures::{exam_with_window, principal, Window};

    fn student(class_id: &str) -> Principal {
        principal("student-1", Role::Student, Some(class_id))
    }

    #[test]
    fn authority_always_sees_questions() {
        let (exam, now) = exam_with_window(ExamStatus::Draft, Window::Closed);
        let teacher = principal("teacher-1", Role::Teacher, None);

        let visibility = can_view(&teacher, &exam, now);
        assert!(visibility.visible);
        assert!(visibility.questions_visible);
    }

    #[test]
    fn student_of_other_class_sees_nothing() {
        let (exam, now) = exam_with_window(ExamStatus::Published, Window::Open);

        let visibility = can_view(&student("other-class"), &exam, now);
        assert!(!visibility.visible);
        assert!(!visibility.questions_visible);
    }

    #[test]
    fn student_gets_reduced_projection_outside_the_window() {
        let (exam, now) = exam_with_window(ExamStatus::Published, Window::Closed);

        let visibility = can_view(&student(&exam.class_id), &exam, now);
        assert!(visibility.visible);
        assert!(!visibility.questions_visible);
    }

    #[test]
    fn student_sees_questions_only_while_published_and_active() {
        let (exam, now) = exam_with_window(ExamStatus::Published, Window::Open);
        let visibility = can_view(&student(&exam.class_id), &exam, now);
        assert!(visibility.questions_visible);

        let (scheduled, now) = exam_with_window(ExamStatus::Scheduled, Window::Open);
        let visibility = can_view(&student(&scheduled.class_id), &scheduled, now);
        assert!(visibility.visible);
        assert!(!visibility.questions_visible);
    }

    #[test]
    fn submit_requires_student_role() {
        let (exam, now) = exam_with_window(ExamStatus::Published, Window::Open);
        let teacher = principal("teacher-1", Role::Teacher, None);

        assert!(matches!(
            check_submit(&teacher, &exam, None, now),
            Err(ExamError::Forbidden(_))
        ));
    }

    #[test]
    fn submit_to_draft_exam_is_not_available() {
        let (exam, now) = exam_with_window(ExamStatus::Draft, Window::Open);

        assert!(matches!(
            check_submit(&student(&exam.class_id), &exam, None, now),
            Err(ExamError::NotAvailable)
        ));
    }

    #[test]
    fn submit_outside_window_is_rejected() {
        let (exam, now) = exam_with_window(ExamStatus::Published, Window::Closed);

        assert!(matches!(
            check_submit(&student(&exam.class_id), &exam, None, now),
            Err(ExamError::WindowClosed)
        ));
    }

    #[test]
    fn submit_with_unset_window_is_rejected() {
        let (exam, now) = exam_with_window(ExamStatus::Published, Window::Unset);

        assert!(matches!(
            check_submit(&student(&exam.class_id), &exam, None, now),
            Err(ExamError::WindowClosed)
        ));
    }

    #[test]
    fn second_attempt_is_already_submitted() {
        let (exam, now) = exam_with_window(ExamStatus::Published, Window::Open);

        assert!(matches!(
            check_submit(&student(&exam.class_id), &exam, Some(SubmissionStatus::Submitted), now),
            Err(ExamError::AlreadySubmitted)
        ));
    }

    #[test]
    fn draft_attempt_does_not_block_submission() {
        let (exam, now) = exam_with_window(ExamStatus::Published, Window::Open);

        assert!(check_submit(
            &student(&exam.class_id),
            &exam,
            Some(SubmissionStatus::Draft),
            now
        )
        .is_ok());
    }

    #[test]
    fn admissible_submission_passes() {
        let (exam, now) = exam_with_window(ExamStatus::Published, Window::Open);

        assert!(check_submit(&student(&exam.class_id), &exam, None, now).is_ok());
    }
}
