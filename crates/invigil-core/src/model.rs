//! Data model for quizzes, questions, and attempts.
//!
//! These types mirror what the backend stores. Note that [`AnswerOption`]
//! deliberately carries no correctness flag: correct option ids travel only
//! in the post-submission answer key, so an unsubmitted attempt never holds
//! the information needed to reveal answers.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type QuizId = Uuid;
pub type QuestionId = Uuid;
pub type OptionId = Uuid;
pub type AttemptId = Uuid;
pub type UserId = Uuid;

/// A quiz definition: the ordered questions plus the rules of the attempt.
/// Immutable once fetched; a running session never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: QuizId,
    pub title: String,
    /// Attempt duration in whole minutes.
    pub time_limit_minutes: u32,
    /// Minimum percent score for a passing attempt.
    pub passing_grade_percent: u32,
    /// How many attempts a learner may start in total.
    pub max_attempts: u32,
    /// Questions in presentation order.
    pub questions: Vec<Question>,
}

impl Quiz {
    /// The time limit as a duration.
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(u64::from(self.time_limit_minutes) * 60)
    }

    /// Sum of all question point values.
    pub fn total_points(&self) -> u32 {
        self.questions.iter().map(|q| q.points).sum()
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// Look up a question by id.
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// True if any question requires manual grading.
    pub fn has_essay_questions(&self) -> bool {
        self.questions.iter().any(Question::is_essay)
    }
}

/// One question within a quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    /// Point value of the question.
    pub points: u32,
    /// Author-provided rationale, shown in the result view when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub kind: QuestionKind,
}

impl Question {
    pub fn is_essay(&self) -> bool {
        matches!(self.kind, QuestionKind::Essay)
    }

    /// The selectable options, empty for essay questions.
    pub fn options(&self) -> &[AnswerOption] {
        match &self.kind {
            QuestionKind::MultipleChoice { options } => options,
            QuestionKind::Essay => &[],
        }
    }
}

/// Question payload, tagged by type. Adding a question type means adding a
/// variant here and letting the compiler point at every match that needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QuestionKind {
    /// Single-selection question over a fixed option list.
    MultipleChoice { options: Vec<AnswerOption> },
    /// Free-text question, graded manually by an instructor.
    Essay,
}

/// One selectable option of a multiple-choice question. Correctness is not
/// part of this type; it lives in [`AnswerKey`] and is only revealed after
/// submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: OptionId,
    pub text: String,
}

/// Correct option ids per multiple-choice question, as revealed by the
/// backend in the post-submission result view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerKey {
    by_question: HashMap<QuestionId, BTreeSet<OptionId>>,
}

impl AnswerKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, question: QuestionId, correct: BTreeSet<OptionId>) {
        self.by_question.insert(question, correct);
    }

    /// The correct option set for a question, if the key covers it.
    pub fn correct_options(&self, question: QuestionId) -> Option<&BTreeSet<OptionId>> {
        self.by_question.get(&question)
    }

    pub fn is_empty(&self) -> bool {
        self.by_question.is_empty()
    }
}

impl FromIterator<(QuestionId, BTreeSet<OptionId>)> for AnswerKey {
    fn from_iter<I: IntoIterator<Item = (QuestionId, BTreeSet<OptionId>)>>(iter: I) -> Self {
        Self {
            by_question: iter.into_iter().collect(),
        }
    }
}

/// One attempt at a quiz, as recorded by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub quiz_id: QuizId,
    pub user_id: UserId,
    /// Server-stamped start instant; all remaining-time math derives from it.
    pub started_at: DateTime<Utc>,
    /// Set exactly once, at submission. A submitted attempt accepts no
    /// further answer mutation.
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    /// Percent score; `None` until grading has produced one.
    #[serde(default)]
    pub score_percent: Option<u32>,
    /// True once manual grading (if any) has completed.
    #[serde(default)]
    pub is_graded: bool,
}

impl Attempt {
    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }
}

/// A learner's stored response to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptAnswer {
    pub question_id: QuestionId,
    pub value: AnswerValue,
}

/// Response payload, tagged by question type. A selection and a free text
/// cannot be confused at the type level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnswerValue {
    /// Selected option ids of a multiple-choice question.
    Choice(BTreeSet<OptionId>),
    /// Free text of an essay question.
    Text(String),
}

impl AnswerValue {
    /// A single-selection choice, the normal case for multiple-choice input.
    pub fn single_choice(option: OptionId) -> Self {
        AnswerValue::Choice(BTreeSet::from([option]))
    }

    pub fn as_choice(&self) -> Option<&BTreeSet<OptionId>> {
        match self {
            AnswerValue::Choice(selected) => Some(selected),
            AnswerValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(text) => Some(text),
            AnswerValue::Choice(_) => None,
        }
    }
}
