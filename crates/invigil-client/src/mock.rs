//! In-memory backend for tests and demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use invigil_core::error::BackendError;
use invigil_core::evaluator;
use invigil_core::model::{
    AnswerKey, Attempt, AttemptAnswer, AttemptId, QuestionId, Quiz, QuizId, UserId,
};
use invigil_core::traits::{
    AttemptBundle, Clock, GradedView, QuizBackend, StartedAttempt, SubmitReceipt, SystemClock,
};
use uuid::Uuid;

/// A mock course platform for testing the attempt engine without a server.
///
/// Upholds the full backend contract: attempt gating on start, last-write-wins
/// answer upserts that refuse once submitted, idempotent submission, and a
/// result view only after submission. Choice-only quizzes are graded at
/// submission; quizzes with essays stay ungraded until [`Self::grade_essays`].
pub struct MockBackend {
    inner: Mutex<MockInner>,
    /// Stamps `started_at` and `submitted_at`; injectable for pinned-time tests.
    clock: Arc<dyn Clock>,
    /// The learner every attempt is recorded under.
    user_id: UserId,
    start_calls: AtomicU32,
    save_calls: AtomicU32,
    submit_calls: AtomicU32,
}

#[derive(Default)]
struct MockInner {
    quizzes: HashMap<QuizId, Quiz>,
    keys: HashMap<QuizId, AnswerKey>,
    attempts: HashMap<AttemptId, Attempt>,
    answers: HashMap<AttemptId, HashMap<QuestionId, AttemptAnswer>>,
    attempts_used: HashMap<QuizId, u32>,
    /// Artificial latency before a save lands, keyed by question.
    save_delays: HashMap<QuestionId, Duration>,
    /// Remaining saves that fail with a retryable error.
    failing_saves: u32,
    /// Remaining submits that fail with a retryable error.
    failing_submits: u32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// A mock that stamps attempts from the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(MockInner::default()),
            clock,
            user_id: Uuid::new_v4(),
            start_calls: AtomicU32::new(0),
            save_calls: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
        }
    }

    /// Register a quiz and the answer key it will be graded against.
    pub fn add_quiz(&self, quiz: Quiz, key: AnswerKey) {
        let mut inner = self.inner.lock().unwrap();
        inner.keys.insert(quiz.id, key);
        inner.quizzes.insert(quiz.id, quiz);
    }

    /// Place an attempt record directly, as if started in an earlier run.
    /// The quiz must already be registered.
    pub fn seed_attempt(&self, attempt: Attempt, answers: Vec<AttemptAnswer>) {
        let mut inner = self.inner.lock().unwrap();
        *inner.attempts_used.entry(attempt.quiz_id).or_insert(0) += 1;
        inner.answers.insert(
            attempt.id,
            answers.into_iter().map(|a| (a.question_id, a)).collect(),
        );
        inner.attempts.insert(attempt.id, attempt);
    }

    /// Delay saves for one question so racy orderings can be forced.
    pub fn set_save_delay(&self, question_id: QuestionId, delay: Duration) {
        self.inner
            .lock()
            .unwrap()
            .save_delays
            .insert(question_id, delay);
    }

    /// Make the next `count` saves fail with a retryable error.
    pub fn fail_next_saves(&self, count: u32) {
        self.inner.lock().unwrap().failing_saves = count;
    }

    /// Make the next `count` submits fail with a retryable error.
    pub fn fail_next_submits(&self, count: u32) {
        self.inner.lock().unwrap().failing_submits = count;
    }

    /// Finish manual grading with the given final score.
    pub fn grade_essays(&self, attempt_id: AttemptId, score_percent: u32) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(attempt) = inner.attempts.get_mut(&attempt_id) {
            attempt.score_percent = Some(score_percent);
            attempt.is_graded = true;
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::Relaxed)
    }

    pub fn save_calls(&self) -> u32 {
        self.save_calls.load(Ordering::Relaxed)
    }

    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::Relaxed)
    }

    /// The attempt record as the platform currently stores it.
    pub fn attempt(&self, attempt_id: AttemptId) -> Option<Attempt> {
        self.inner.lock().unwrap().attempts.get(&attempt_id).cloned()
    }

    /// The stored answer for one question, if any save has landed.
    pub fn saved_answer(
        &self,
        attempt_id: AttemptId,
        question_id: QuestionId,
    ) -> Option<AttemptAnswer> {
        self.inner
            .lock()
            .unwrap()
            .answers
            .get(&attempt_id)
            .and_then(|per_question| per_question.get(&question_id))
            .cloned()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuizBackend for MockBackend {
    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartedAttempt, BackendError> {
        self.start_calls.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap();

        let max_attempts = inner
            .quizzes
            .get(&quiz_id)
            .map(|quiz| quiz.max_attempts)
            .ok_or_else(|| BackendError::NotFound(format!("quiz {quiz_id}")))?;

        let has_open = inner
            .attempts
            .values()
            .any(|a| a.quiz_id == quiz_id && !a.is_submitted());
        if has_open {
            return Err(BackendError::AttemptOpen(
                "finish your open attempt before starting another".to_string(),
            ));
        }

        let used = inner.attempts_used.get(&quiz_id).copied().unwrap_or(0);
        if used >= max_attempts {
            return Err(BackendError::AttemptLimitReached(format!(
                "{used} of {max_attempts} attempts used"
            )));
        }

        let attempt = Attempt {
            id: Uuid::new_v4(),
            quiz_id,
            user_id: self.user_id,
            started_at: self.clock.now(),
            submitted_at: None,
            score_percent: None,
            is_graded: false,
        };
        let attempt_id = attempt.id;
        *inner.attempts_used.entry(quiz_id).or_insert(0) += 1;
        inner.attempts.insert(attempt_id, attempt);
        inner.answers.insert(attempt_id, HashMap::new());
        Ok(StartedAttempt { attempt_id })
    }

    async fn fetch_attempt(&self, attempt_id: AttemptId) -> Result<AttemptBundle, BackendError> {
        let inner = self.inner.lock().unwrap();
        let attempt = inner
            .attempts
            .get(&attempt_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("attempt {attempt_id}")))?;
        let quiz = inner
            .quizzes
            .get(&attempt.quiz_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("quiz {}", attempt.quiz_id)))?;
        let answers = inner
            .answers
            .get(&attempt_id)
            .map(|per_question| per_question.values().cloned().collect())
            .unwrap_or_default();
        Ok(AttemptBundle {
            attempt,
            quiz,
            answers,
        })
    }

    async fn save_answer(
        &self,
        attempt_id: AttemptId,
        answer: &AttemptAnswer,
    ) -> Result<(), BackendError> {
        self.save_calls.fetch_add(1, Ordering::Relaxed);
        let (delay, fail) = {
            let mut inner = self.inner.lock().unwrap();
            let delay = inner.save_delays.get(&answer.question_id).copied();
            let fail = inner.failing_saves > 0;
            if fail {
                inner.failing_saves -= 1;
            }
            (delay, fail)
        };

        // The delay runs outside the lock; a slow save must not block the
        // rest of the platform, and a faster later save may land first.
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(BackendError::Network(
                "injected save failure".to_string(),
            ));
        }

        let mut inner = self.inner.lock().unwrap();
        let submitted = match inner.attempts.get(&attempt_id) {
            Some(attempt) => attempt.is_submitted(),
            None => return Err(BackendError::NotFound(format!("attempt {attempt_id}"))),
        };
        if submitted {
            return Err(BackendError::Server {
                status: 409,
                message: "attempt already submitted".to_string(),
            });
        }
        inner
            .answers
            .entry(attempt_id)
            .or_default()
            .insert(answer.question_id, answer.clone());
        Ok(())
    }

    async fn submit_attempt(&self, attempt_id: AttemptId) -> Result<SubmitReceipt, BackendError> {
        self.submit_calls.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap();

        let attempt = inner
            .attempts
            .get(&attempt_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("attempt {attempt_id}")))?;

        // Repeats return the original receipt.
        if attempt.is_submitted() {
            return Ok(SubmitReceipt {
                score_percent: attempt.score_percent,
                is_graded: attempt.is_graded,
            });
        }

        if inner.failing_submits > 0 {
            inner.failing_submits -= 1;
            return Err(BackendError::Server {
                status: 503,
                message: "injected submit failure".to_string(),
            });
        }

        let quiz = inner
            .quizzes
            .get(&attempt.quiz_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("quiz {}", attempt.quiz_id)))?;

        // Choice-only quizzes grade instantly; essays wait for an instructor.
        let (score_percent, is_graded) = if quiz.has_essay_questions() {
            (None, false)
        } else {
            let answers = inner.answers.get(&attempt_id).cloned().unwrap_or_default();
            let key = inner
                .keys
                .get(&attempt.quiz_id)
                .cloned()
                .unwrap_or_default();
            let outcome = evaluator::evaluate(&quiz, &attempt, &answers, &key);
            (outcome.score_percent, true)
        };

        let submitted_at = self.clock.now();
        if let Some(stored) = inner.attempts.get_mut(&attempt_id) {
            stored.submitted_at = Some(submitted_at);
            stored.score_percent = score_percent;
            stored.is_graded = is_graded;
        }
        Ok(SubmitReceipt {
            score_percent,
            is_graded,
        })
    }

    async fn fetch_result(&self, attempt_id: AttemptId) -> Result<GradedView, BackendError> {
        let inner = self.inner.lock().unwrap();
        let attempt = inner
            .attempts
            .get(&attempt_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("attempt {attempt_id}")))?;
        if !attempt.is_submitted() {
            return Err(BackendError::NotFound(format!(
                "attempt {attempt_id} has no result yet"
            )));
        }
        let answers = inner
            .answers
            .get(&attempt_id)
            .map(|per_question| per_question.values().cloned().collect())
            .unwrap_or_default();
        let answer_key = inner
            .keys
            .get(&attempt.quiz_id)
            .cloned()
            .unwrap_or_default();
        Ok(GradedView {
            attempt,
            answers,
            answer_key,
        })
    }
}
