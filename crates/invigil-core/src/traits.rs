//! Trait boundaries of the attempt engine.
//!
//! [`QuizBackend`] is the seam to the remote system of record; the REST and
//! in-memory implementations live in `invigil-client`. [`Clock`] exists so
//! that everything derived from wall-clock time can be pinned in tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::model::{AnswerKey, Attempt, AttemptAnswer, AttemptId, Quiz, QuizId};

// ---------------------------------------------------------------------------
// Quiz backend
// ---------------------------------------------------------------------------

/// The remote system of record for quizzes, attempts, and grading.
///
/// Implementations must uphold the contract the session engines rely on:
/// `save_answer` is an upsert where the last arriving write wins,
/// `submit_attempt` is idempotent and repeats return the original receipt,
/// and `fetch_result` only succeeds for submitted attempts.
#[async_trait::async_trait]
pub trait QuizBackend: Send + Sync {
    /// Begin a new attempt. The backend enforces the attempt limit and
    /// refuses while an unsubmitted attempt is open.
    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartedAttempt, BackendError>;

    /// Fetch everything needed to run or resume an attempt: the attempt
    /// record, its quiz definition, and the answers saved so far.
    async fn fetch_attempt(&self, attempt_id: AttemptId) -> Result<AttemptBundle, BackendError>;

    /// Upsert one answer. Idempotent per (attempt, question); the last
    /// arriving call wins.
    async fn save_answer(
        &self,
        attempt_id: AttemptId,
        answer: &AttemptAnswer,
    ) -> Result<(), BackendError>;

    /// Submit the attempt for grading. Repeated calls return the receipt of
    /// the original submission.
    async fn submit_attempt(&self, attempt_id: AttemptId) -> Result<SubmitReceipt, BackendError>;

    /// The graded view of a submitted attempt, including the answer key.
    /// Fails with [`BackendError::NotFound`] before submission.
    async fn fetch_result(&self, attempt_id: AttemptId) -> Result<GradedView, BackendError>;
}

/// Acknowledgement of a freshly created attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedAttempt {
    pub attempt_id: AttemptId,
}

/// Everything a session needs to run an attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptBundle {
    pub attempt: Attempt,
    pub quiz: Quiz,
    /// Answers persisted so far, at most one per question.
    pub answers: Vec<AttemptAnswer>,
}

/// Receipt returned by a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Final percent score, or `None` while manual grading is outstanding.
    pub score_percent: Option<u32>,
    pub is_graded: bool,
}

/// Post-submission view of an attempt: the server's answer snapshot plus
/// the revealed answer key. This is the only place correct option ids
/// appear on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradedView {
    pub attempt: Attempt,
    pub answers: Vec<AttemptAnswer>,
    pub answer_key: AnswerKey,
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Wall-clock source. Sessions read it once at load to anchor the
/// countdown, and to stamp submission instants.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_holds_and_advances() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::at(start);
        assert_eq!(clock.now(), start);

        clock.advance(chrono::Duration::minutes(25));
        assert_eq!(clock.now(), start + chrono::Duration::minutes(25));

        let later = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
