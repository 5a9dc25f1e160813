//! Post-submission result computation.
//!
//! Pure functions over the quiz, the attempt record, the server's answer
//! snapshot, and the revealed answer key. Multiple-choice correctness is
//! strict set equality with the key; essays are never auto-scored. When the
//! server has produced a score it is taken verbatim, otherwise a local
//! percentage is computed only once nothing is awaiting manual grading.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::{
    AnswerKey, AnswerValue, Attempt, AttemptAnswer, AttemptId, OptionId, Question, QuestionId,
    QuestionKind, Quiz,
};

/// Outcome of one question within a graded attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// The selection matches the correct set exactly.
    Correct,
    /// The selection is missing a correct option, includes a wrong one, or
    /// was never made.
    Incorrect,
    /// Essay response awaiting an instructor.
    PendingManual,
    /// Essay response graded by an instructor; its points are visible only
    /// through the aggregate score.
    ManuallyGraded,
}

/// Review row for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionReview {
    pub question_id: QuestionId,
    pub points: u32,
    /// Locally verifiable points; always zero for essays.
    pub earned_points: u32,
    pub verdict: Verdict,
    /// What the learner selected (multiple choice).
    pub selected: BTreeSet<OptionId>,
    /// The revealed correct set (multiple choice).
    pub correct: BTreeSet<OptionId>,
    /// What the learner wrote (essay).
    pub free_text: Option<String>,
    /// Author rationale, when provided.
    pub explanation: Option<String>,
}

/// Full result view of a submitted attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub attempt_id: AttemptId,
    pub reviews: Vec<QuestionReview>,
    /// Points from locally verified multiple-choice answers only.
    pub earned_points: u32,
    pub total_points: u32,
    /// The server's score verbatim once graded; otherwise computed locally,
    /// or `None` while manual grading is outstanding.
    pub score_percent: Option<u32>,
    /// `None` until a score exists.
    pub passed: Option<bool>,
    /// Questions still awaiting an instructor.
    pub pending_manual: usize,
    pub is_graded: bool,
}

impl AttemptOutcome {
    pub fn review(&self, question_id: QuestionId) -> Option<&QuestionReview> {
        self.reviews.iter().find(|r| r.question_id == question_id)
    }
}

/// Compute the result view for a submitted attempt.
pub fn evaluate(
    quiz: &Quiz,
    attempt: &Attempt,
    answers: &HashMap<QuestionId, AttemptAnswer>,
    key: &AnswerKey,
) -> AttemptOutcome {
    let mut reviews = Vec::with_capacity(quiz.questions.len());
    let mut earned_points = 0;
    let mut pending_manual = 0;

    for question in &quiz.questions {
        let answer = answers.get(&question.id).map(|a| &a.value);
        let review = review_question(question, answer, key, attempt.is_graded);
        earned_points += review.earned_points;
        if review.verdict == Verdict::PendingManual {
            pending_manual += 1;
        }
        reviews.push(review);
    }

    let total_points = quiz.total_points();
    let score_percent = match attempt.score_percent {
        Some(score) => Some(score),
        None if pending_manual > 0 => None,
        None => Some(percent_score(earned_points, total_points)),
    };
    let passed = score_percent.map(|score| score >= quiz.passing_grade_percent);

    AttemptOutcome {
        attempt_id: attempt.id,
        reviews,
        earned_points,
        total_points,
        score_percent,
        passed,
        pending_manual,
        is_graded: attempt.is_graded,
    }
}

fn review_question(
    question: &Question,
    answer: Option<&AnswerValue>,
    key: &AnswerKey,
    attempt_graded: bool,
) -> QuestionReview {
    match &question.kind {
        QuestionKind::MultipleChoice { .. } => {
            let selected = answer
                .and_then(AnswerValue::as_choice)
                .cloned()
                .unwrap_or_default();
            let correct = key
                .correct_options(question.id)
                .cloned()
                .unwrap_or_default();
            // Strict set equality: a missing correct option and an extra
            // wrong one fail the same way.
            let verdict = if selected == correct {
                Verdict::Correct
            } else {
                Verdict::Incorrect
            };
            let earned_points = match verdict {
                Verdict::Correct => question.points,
                _ => 0,
            };
            QuestionReview {
                question_id: question.id,
                points: question.points,
                earned_points,
                verdict,
                selected,
                correct,
                free_text: None,
                explanation: question.explanation.clone(),
            }
        }
        QuestionKind::Essay => QuestionReview {
            question_id: question.id,
            points: question.points,
            earned_points: 0,
            verdict: if attempt_graded {
                Verdict::ManuallyGraded
            } else {
                Verdict::PendingManual
            },
            selected: BTreeSet::new(),
            correct: BTreeSet::new(),
            free_text: answer.and_then(AnswerValue::as_text).map(str::to_string),
            explanation: question.explanation.clone(),
        },
    }
}

/// Integer percent, rounded half up. A zero total is defined as zero, not
/// a division error.
fn percent_score(earned: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    ((f64::from(earned) / f64::from(total)) * 100.0).round() as u32
}
