//! Live attempt session.
//!
//! An [`AttemptSession`] owns one attempt from load to result: it anchors
//! the countdown on the server-stamped start instant, routes edits through
//! the autosave engine, and drives submission through the single-flight
//! controller, whether the learner clicks submit or the timer runs out.
//!
//! The lifecycle is an explicit state machine. [`next_phase`] is a pure
//! function over `(phase, event)`, so every transition, including the racy
//! ones around timer expiry, can be tested without a runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::countdown::{remaining_seconds, Countdown};
use crate::error::BackendError;
use crate::evaluator::{self, AttemptOutcome};
use crate::model::{
    AnswerValue, Attempt, AttemptAnswer, AttemptId, OptionId, Question, QuestionId, QuestionKind,
    Quiz, QuizId,
};
use crate::submit::{SubmissionController, SubmitError};
use crate::sync::{SaveStatus, SyncConfig, SyncEngine};
use crate::traits::{AttemptBundle, Clock, QuizBackend, SubmitReceipt, SystemClock};

/// Everything a session needs from its host, passed explicitly so tests
/// can swap the backend, pin the clock, and tighten autosave tuning.
#[derive(Clone)]
pub struct SessionContext {
    pub backend: Arc<dyn QuizBackend>,
    pub clock: Arc<dyn Clock>,
    pub sync: SyncConfig,
}

impl SessionContext {
    /// Context with the system clock and default autosave tuning.
    pub fn new(backend: Arc<dyn QuizBackend>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            sync: SyncConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }
}

// ---------------------------------------------------------------------------
// Lifecycle state machine
// ---------------------------------------------------------------------------

/// Phase of a live attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    /// Countdown running, answers editable.
    Answering,
    /// The countdown hit zero. Answers are frozen; submission is pending
    /// or has failed and can be retried.
    TimeExpired,
    /// A submit call is on the wire.
    Submitting {
        /// Whether the flight was forced by timer expiry.
        timed_out: bool,
    },
    /// Accepted by the backend; manual grading still outstanding.
    Submitted,
    /// The final score is known.
    Graded,
}

impl AttemptPhase {
    /// Submitted or graded; nothing moves the machine out of these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptPhase::Submitted | AttemptPhase::Graded)
    }

    /// Edits are accepted only while answering.
    pub fn accepts_edits(&self) -> bool {
        matches!(self, AttemptPhase::Answering)
    }
}

/// Events that move an attempt through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptEvent {
    CountdownExpired,
    SubmitStarted,
    SubmitSucceeded { graded: bool },
    SubmitFailed,
    GradeReceived,
}

/// The transition function. Unlisted pairs are inert: terminal phases stay
/// terminal and out-of-order events do not move the machine.
pub fn next_phase(phase: AttemptPhase, event: AttemptEvent) -> AttemptPhase {
    use AttemptEvent::*;
    use AttemptPhase::*;
    match (phase, event) {
        (Answering, CountdownExpired) => TimeExpired,
        (Answering, SubmitStarted) => Submitting { timed_out: false },
        (TimeExpired, SubmitStarted) => Submitting { timed_out: true },
        // Expiry during a manual flight reclassifies it, so a failure then
        // lands in TimeExpired rather than back in Answering.
        (Submitting { timed_out: false }, CountdownExpired) => Submitting { timed_out: true },
        (Submitting { .. }, SubmitSucceeded { graded: true }) => Graded,
        (Submitting { .. }, SubmitSucceeded { graded: false }) => Submitted,
        (Submitting { timed_out: true }, SubmitFailed) => TimeExpired,
        (Submitting { timed_out: false }, SubmitFailed) => Answering,
        (Submitted, GradeReceived) => Graded,
        (phase, _) => phase,
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Session-level failures. Submission has its own error type,
/// [`SubmitError`], because its outcome is shared between callers.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("question {0} does not exist in this quiz")]
    UnknownQuestion(QuestionId),

    #[error("option {option} does not belong to question {question}")]
    UnknownOption {
        question: QuestionId,
        option: OptionId,
    },

    #[error("question {0} is not multiple choice")]
    NotMultipleChoice(QuestionId),

    #[error("question {0} is not an essay")]
    NotEssay(QuestionId),

    #[error("the attempt has not been submitted yet")]
    NotSubmitted,
}

struct SessionShared {
    quiz: Quiz,
    attempt_id: AttemptId,
    backend: Arc<dyn QuizBackend>,
    clock: Arc<dyn Clock>,
    phase: Mutex<AttemptPhase>,
    attempt: Mutex<Attempt>,
    answers: Mutex<HashMap<QuestionId, AttemptAnswer>>,
    cursor: AtomicUsize,
    submitter: SubmissionController,
}

impl SessionShared {
    fn apply(&self, event: AttemptEvent) -> AttemptPhase {
        let mut phase = self.phase.lock().unwrap();
        let next = next_phase(*phase, event);
        if next != *phase {
            debug!(attempt_id = %self.attempt_id, from = ?*phase, to = ?next, ?event, "phase change");
            *phase = next;
        }
        next
    }

    fn apply_receipt(&self, receipt: &SubmitReceipt) {
        {
            let mut attempt = self.attempt.lock().unwrap();
            if attempt.submitted_at.is_none() {
                attempt.submitted_at = Some(self.clock.now());
            }
            attempt.score_percent = receipt.score_percent;
            attempt.is_graded = receipt.is_graded;
        }
        self.apply(AttemptEvent::SubmitSucceeded {
            graded: receipt.is_graded,
        });
    }
}

/// One learner working one attempt.
pub struct AttemptSession {
    shared: Arc<SessionShared>,
    sync: SyncEngine,
    countdown: Option<Countdown>,
}

impl AttemptSession {
    /// Start a new attempt and open a session for it. The backend enforces
    /// the attempt limit and the one-open-attempt rule; refusals surface as
    /// [`SessionError::Backend`].
    #[instrument(skip(ctx))]
    pub async fn start(ctx: SessionContext, quiz_id: QuizId) -> Result<Self, SessionError> {
        let started = ctx.backend.start_attempt(quiz_id).await?;
        info!(%quiz_id, attempt_id = %started.attempt_id, "attempt started");
        Self::load(ctx, started.attempt_id).await
    }

    /// Load an attempt, fresh or mid-flight, and resume where it stands.
    /// Remaining time derives from the server-stamped start instant, so a
    /// process restart never resets the countdown. An attempt past its
    /// limit loads directly into automatic submission; an already-submitted
    /// one loads into its terminal phase.
    #[instrument(skip(ctx))]
    pub async fn load(ctx: SessionContext, attempt_id: AttemptId) -> Result<Self, SessionError> {
        let bundle = ctx.backend.fetch_attempt(attempt_id).await?;
        Ok(Self::from_bundle(ctx, bundle))
    }

    fn from_bundle(ctx: SessionContext, bundle: AttemptBundle) -> Self {
        let AttemptBundle {
            attempt,
            quiz,
            answers,
        } = bundle;
        let answers: HashMap<QuestionId, AttemptAnswer> = answers
            .into_iter()
            .map(|answer| (answer.question_id, answer))
            .collect();

        let attempt_id = attempt.id;
        let submitted = attempt.is_submitted();
        let (initial_phase, remaining) = if submitted {
            let phase = if attempt.is_graded {
                AttemptPhase::Graded
            } else {
                AttemptPhase::Submitted
            };
            (phase, Duration::ZERO)
        } else {
            let secs = remaining_seconds(attempt.started_at, quiz.time_limit(), ctx.clock.now());
            let phase = if secs == 0 {
                AttemptPhase::TimeExpired
            } else {
                AttemptPhase::Answering
            };
            (phase, Duration::from_secs(secs))
        };

        let submitter = if submitted {
            let receipt = SubmitReceipt {
                score_percent: attempt.score_percent,
                is_graded: attempt.is_graded,
            };
            SubmissionController::already_submitted(Arc::clone(&ctx.backend), attempt_id, receipt)
        } else {
            SubmissionController::new(Arc::clone(&ctx.backend), attempt_id)
        };

        let shared = Arc::new(SessionShared {
            quiz,
            attempt_id,
            backend: Arc::clone(&ctx.backend),
            clock: Arc::clone(&ctx.clock),
            phase: Mutex::new(initial_phase),
            attempt: Mutex::new(attempt),
            answers: Mutex::new(answers),
            cursor: AtomicUsize::new(0),
            submitter,
        });

        let sync = SyncEngine::spawn(Arc::clone(&ctx.backend), attempt_id, ctx.sync.clone());

        // Submitted attempts need no timer. Everything else gets one, and a
        // watchdog that turns its expiry into an automatic submission. An
        // already-expired attempt expires the countdown immediately.
        let countdown = if submitted {
            None
        } else {
            let countdown = Countdown::start(remaining);
            let expiry = countdown.expired();
            let watchdog_shared = Arc::clone(&shared);
            tokio::spawn(async move {
                if expiry.await {
                    auto_submit(&watchdog_shared).await;
                }
            });
            Some(countdown)
        };

        info!(
            attempt_id = %attempt_id,
            phase = ?initial_phase,
            remaining_secs = remaining.as_secs(),
            "attempt session ready"
        );

        Self {
            shared,
            sync,
            countdown,
        }
    }

    // -- editing ------------------------------------------------------------

    /// Record a multiple-choice selection. Picking an option replaces the
    /// previous pick, and queues exactly one background save. Outside the
    /// answering phase this is a quiet no-op, matching a stale UI click
    /// after submission.
    pub fn select_answer(
        &self,
        question_id: QuestionId,
        option_id: OptionId,
    ) -> Result<(), SessionError> {
        if !self.phase().accepts_edits() {
            debug!(attempt_id = %self.shared.attempt_id, %question_id, "edit ignored outside answering phase");
            return Ok(());
        }
        let question = self
            .shared
            .quiz
            .question(question_id)
            .ok_or(SessionError::UnknownQuestion(question_id))?;
        match &question.kind {
            QuestionKind::MultipleChoice { options } => {
                if !options.iter().any(|option| option.id == option_id) {
                    return Err(SessionError::UnknownOption {
                        question: question_id,
                        option: option_id,
                    });
                }
            }
            QuestionKind::Essay => return Err(SessionError::NotMultipleChoice(question_id)),
        }
        self.record(AttemptAnswer {
            question_id,
            value: AnswerValue::single_choice(option_id),
        });
        Ok(())
    }

    /// Record an essay draft. Same edit rules as [`Self::select_answer`].
    pub fn set_essay_text(
        &self,
        question_id: QuestionId,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        if !self.phase().accepts_edits() {
            debug!(attempt_id = %self.shared.attempt_id, %question_id, "edit ignored outside answering phase");
            return Ok(());
        }
        let question = self
            .shared
            .quiz
            .question(question_id)
            .ok_or(SessionError::UnknownQuestion(question_id))?;
        if !question.is_essay() {
            return Err(SessionError::NotEssay(question_id));
        }
        self.record(AttemptAnswer {
            question_id,
            value: AnswerValue::Text(text.into()),
        });
        Ok(())
    }

    fn record(&self, answer: AttemptAnswer) {
        self.shared
            .answers
            .lock()
            .unwrap()
            .insert(answer.question_id, answer.clone());
        self.sync.save(answer);
    }

    // -- navigation ---------------------------------------------------------

    pub fn question_index(&self) -> usize {
        self.shared.cursor.load(Ordering::Relaxed)
    }

    /// Move to `index`, clamped to the quiz bounds. Returns the index the
    /// cursor actually landed on.
    pub fn jump_to(&self, index: usize) -> usize {
        let last = self.shared.quiz.question_count().saturating_sub(1);
        let clamped = index.min(last);
        self.shared.cursor.store(clamped, Ordering::Relaxed);
        clamped
    }

    pub fn next_question(&self) -> usize {
        self.jump_to(self.question_index().saturating_add(1))
    }

    pub fn previous_question(&self) -> usize {
        self.jump_to(self.question_index().saturating_sub(1))
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.shared.quiz.questions.get(self.question_index())
    }

    // -- submission ---------------------------------------------------------

    /// Submit the attempt. Races freely with the expiry watchdog: whichever
    /// comes second joins the first one's flight, and the backend sees one
    /// call. On success the countdown stops. Repeat calls return the
    /// original receipt. Unsaved answers are not waited for; the server
    /// grades what has arrived.
    pub async fn submit(&self) -> Result<SubmitReceipt, SubmitError> {
        let receipt = perform_submit(&self.shared).await?;
        if let Some(countdown) = &self.countdown {
            countdown.cancel();
        }
        Ok(receipt)
    }

    /// Fetch the graded view and fold it into a reviewable outcome. Valid
    /// from submission onward; grading may still be pending, in which case
    /// the outcome carries no score yet.
    pub async fn fetch_result(&self) -> Result<AttemptOutcome, SessionError> {
        if !self.phase().is_terminal() {
            return Err(SessionError::NotSubmitted);
        }
        let view = self.shared.backend.fetch_result(self.shared.attempt_id).await?;
        if view.attempt.is_graded {
            self.shared.apply(AttemptEvent::GradeReceived);
        }
        {
            let mut attempt = self.shared.attempt.lock().unwrap();
            *attempt = view.attempt.clone();
        }
        let answers: HashMap<QuestionId, AttemptAnswer> = view
            .answers
            .iter()
            .map(|answer| (answer.question_id, answer.clone()))
            .collect();
        Ok(evaluator::evaluate(
            &self.shared.quiz,
            &view.attempt,
            &answers,
            &view.answer_key,
        ))
    }

    // -- observation --------------------------------------------------------

    pub fn quiz(&self) -> &Quiz {
        &self.shared.quiz
    }

    pub fn attempt_id(&self) -> AttemptId {
        self.shared.attempt_id
    }

    /// Snapshot of the attempt record as last seen.
    pub fn attempt(&self) -> Attempt {
        self.shared.attempt.lock().unwrap().clone()
    }

    pub fn phase(&self) -> AttemptPhase {
        *self.shared.phase.lock().unwrap()
    }

    /// The learner's current answer to a question, if any.
    pub fn answer(&self, question_id: QuestionId) -> Option<AttemptAnswer> {
        self.shared.answers.lock().unwrap().get(&question_id).cloned()
    }

    /// Persistence status of a question's newest edit.
    pub fn save_status(&self, question_id: QuestionId) -> Option<SaveStatus> {
        self.sync.status(question_id)
    }

    /// Time left on the countdown; zero once expired or submitted.
    pub fn remaining(&self) -> Duration {
        self.countdown
            .as_ref()
            .map(Countdown::remaining)
            .unwrap_or(Duration::ZERO)
    }

    /// Whole-seconds countdown channel for rendering, absent once the
    /// attempt was loaded in a submitted state.
    pub fn subscribe_remaining(&self) -> Option<watch::Receiver<u64>> {
        self.countdown.as_ref().map(Countdown::subscribe_remaining)
    }

    /// Wait for every queued save to settle. Submission never requires
    /// this; it exists for orderly teardown and tests.
    pub async fn flush_saves(&self) {
        self.sync.await_idle().await;
    }
}

async fn perform_submit(shared: &SessionShared) -> Result<SubmitReceipt, SubmitError> {
    shared.apply(AttemptEvent::SubmitStarted);
    match shared.submitter.submit().await {
        Ok(receipt) => {
            shared.apply_receipt(&receipt);
            info!(
                attempt_id = %shared.attempt_id,
                graded = receipt.is_graded,
                score = ?receipt.score_percent,
                "attempt submitted"
            );
            Ok(receipt)
        }
        Err(err) => {
            shared.apply(AttemptEvent::SubmitFailed);
            warn!(attempt_id = %shared.attempt_id, %err, "submission failed");
            Err(err)
        }
    }
}

async fn auto_submit(shared: &SessionShared) {
    let phase = shared.apply(AttemptEvent::CountdownExpired);
    if phase.is_terminal() {
        // Submitted manually in the same instant the timer ran out.
        return;
    }
    info!(attempt_id = %shared.attempt_id, "time limit reached, submitting automatically");
    if let Err(err) = perform_submit(shared).await {
        warn!(
            attempt_id = %shared.attempt_id,
            %err,
            "automatic submission failed; submission stays retryable"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AnswerOption;
    use crate::traits::{GradedView, ManualClock, StartedAttempt};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::AtomicU32;
    use uuid::Uuid;

    /// Accepts saves and submits, counts calls; the rest is unused here.
    #[derive(Default)]
    struct StubBackend {
        submit_calls: AtomicU32,
        graded_on_submit: bool,
    }

    #[async_trait::async_trait]
    impl QuizBackend for StubBackend {
        async fn start_attempt(&self, _: QuizId) -> Result<StartedAttempt, BackendError> {
            unimplemented!("not used by session unit tests")
        }

        async fn fetch_attempt(&self, _: AttemptId) -> Result<AttemptBundle, BackendError> {
            unimplemented!("not used by session unit tests")
        }

        async fn save_answer(
            &self,
            _: AttemptId,
            _: &AttemptAnswer,
        ) -> Result<(), BackendError> {
            Ok(())
        }

        async fn submit_attempt(&self, _: AttemptId) -> Result<SubmitReceipt, BackendError> {
            self.submit_calls.fetch_add(1, Ordering::Relaxed);
            Ok(SubmitReceipt {
                score_percent: self.graded_on_submit.then_some(100),
                is_graded: self.graded_on_submit,
            })
        }

        async fn fetch_result(&self, _: AttemptId) -> Result<GradedView, BackendError> {
            unimplemented!("not used by session unit tests")
        }
    }

    fn make_quiz(question_count: usize) -> Quiz {
        let questions = (0..question_count)
            .map(|i| Question {
                id: Uuid::new_v4(),
                points: 5,
                explanation: None,
                kind: if i % 2 == 0 {
                    QuestionKind::MultipleChoice {
                        options: vec![
                            AnswerOption {
                                id: Uuid::new_v4(),
                                text: "a".to_string(),
                            },
                            AnswerOption {
                                id: Uuid::new_v4(),
                                text: "b".to_string(),
                            },
                        ],
                    }
                } else {
                    QuestionKind::Essay
                },
            })
            .collect();
        Quiz {
            id: Uuid::new_v4(),
            title: "unit fixture".to_string(),
            time_limit_minutes: 30,
            passing_grade_percent: 60,
            max_attempts: 3,
            questions,
        }
    }

    fn make_bundle(quiz: Quiz, started_at: chrono::DateTime<Utc>) -> AttemptBundle {
        AttemptBundle {
            attempt: Attempt {
                id: Uuid::new_v4(),
                quiz_id: quiz.id,
                user_id: Uuid::new_v4(),
                started_at,
                submitted_at: None,
                score_percent: None,
                is_graded: false,
            },
            quiz,
            answers: Vec::new(),
        }
    }

    fn test_ctx(backend: Arc<StubBackend>, clock: Arc<ManualClock>) -> SessionContext {
        SessionContext::new(backend as Arc<dyn QuizBackend>).with_clock(clock as Arc<dyn Clock>)
    }

    fn now_fixture() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn fresh_session(question_count: usize) -> (AttemptSession, Arc<StubBackend>) {
        let backend = Arc::new(StubBackend::default());
        let clock = Arc::new(ManualClock::at(now_fixture()));
        let ctx = test_ctx(Arc::clone(&backend), clock);
        let bundle = make_bundle(make_quiz(question_count), now_fixture());
        (AttemptSession::from_bundle(ctx, bundle), backend)
    }

    // -- transition function -------------------------------------------------

    #[test]
    fn answering_reacts_to_expiry_and_submit() {
        use AttemptEvent::*;
        use AttemptPhase::*;
        assert_eq!(next_phase(Answering, CountdownExpired), TimeExpired);
        assert_eq!(
            next_phase(Answering, SubmitStarted),
            Submitting { timed_out: false }
        );
        assert_eq!(
            next_phase(TimeExpired, SubmitStarted),
            Submitting { timed_out: true }
        );
    }

    #[test]
    fn submit_failure_returns_to_where_it_came_from() {
        use AttemptEvent::*;
        use AttemptPhase::*;
        assert_eq!(
            next_phase(Submitting { timed_out: false }, SubmitFailed),
            Answering
        );
        assert_eq!(
            next_phase(Submitting { timed_out: true }, SubmitFailed),
            TimeExpired
        );
    }

    #[test]
    fn expiry_during_a_manual_flight_reclassifies_it() {
        use AttemptEvent::*;
        use AttemptPhase::*;
        let mid_flight = next_phase(Submitting { timed_out: false }, CountdownExpired);
        assert_eq!(mid_flight, Submitting { timed_out: true });
        // A failure after that lands in TimeExpired, not Answering.
        assert_eq!(next_phase(mid_flight, SubmitFailed), TimeExpired);
    }

    #[test]
    fn success_lands_by_grading_status() {
        use AttemptEvent::*;
        use AttemptPhase::*;
        assert_eq!(
            next_phase(Submitting { timed_out: true }, SubmitSucceeded { graded: false }),
            Submitted
        );
        assert_eq!(
            next_phase(Submitting { timed_out: false }, SubmitSucceeded { graded: true }),
            Graded
        );
        assert_eq!(next_phase(Submitted, GradeReceived), Graded);
    }

    #[test]
    fn terminal_phases_are_inert() {
        use AttemptEvent::*;
        use AttemptPhase::*;
        for phase in [Submitted, Graded] {
            for event in [
                CountdownExpired,
                SubmitStarted,
                SubmitFailed,
                SubmitSucceeded { graded: true },
            ] {
                let expect = match (phase, event) {
                    (Submitted, GradeReceived) => Graded,
                    _ => phase,
                };
                assert_eq!(next_phase(phase, event), expect);
            }
        }
        assert_eq!(next_phase(TimeExpired, CountdownExpired), TimeExpired);
    }

    // -- navigation ----------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn navigation_clamps_to_quiz_bounds() {
        let (session, _) = fresh_session(3);
        assert_eq!(session.question_index(), 0);
        assert_eq!(session.previous_question(), 0);
        assert_eq!(session.next_question(), 1);
        assert_eq!(session.next_question(), 2);
        assert_eq!(session.next_question(), 2);
        assert_eq!(session.jump_to(99), 2);
        assert_eq!(session.jump_to(0), 0);
        assert!(session.current_question().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_quiz_navigation_stays_at_zero() {
        let (session, _) = fresh_session(0);
        assert_eq!(session.jump_to(5), 0);
        assert!(session.current_question().is_none());
    }

    // -- editing -------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn selecting_twice_keeps_a_single_selection() {
        let (session, _) = fresh_session(1);
        let question = session.quiz().questions[0].clone();
        let options = question.options().to_vec();

        session.select_answer(question.id, options[0].id).unwrap();
        session.select_answer(question.id, options[1].id).unwrap();
        session.flush_saves().await;

        let answer = session.answer(question.id).unwrap();
        let selected = answer.value.as_choice().unwrap();
        assert_eq!(selected.len(), 1);
        assert!(selected.contains(&options[1].id));
        assert_eq!(session.save_status(question.id), Some(SaveStatus::Saved));
    }

    #[tokio::test(start_paused = true)]
    async fn editing_rejects_unknown_targets_and_wrong_kinds() {
        let (session, _) = fresh_session(2);
        let choice = session.quiz().questions[0].clone();
        let essay = session.quiz().questions[1].clone();

        assert!(matches!(
            session.select_answer(Uuid::new_v4(), Uuid::new_v4()),
            Err(SessionError::UnknownQuestion(_))
        ));
        assert!(matches!(
            session.select_answer(choice.id, Uuid::new_v4()),
            Err(SessionError::UnknownOption { .. })
        ));
        assert!(matches!(
            session.select_answer(essay.id, Uuid::new_v4()),
            Err(SessionError::NotMultipleChoice(_))
        ));
        assert!(matches!(
            session.set_essay_text(choice.id, "text"),
            Err(SessionError::NotEssay(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn edits_after_submission_are_quiet_noops() {
        let backend = Arc::new(StubBackend::default());
        let clock = Arc::new(ManualClock::at(now_fixture()));
        let ctx = test_ctx(Arc::clone(&backend), clock);
        let mut bundle = make_bundle(make_quiz(1), now_fixture());
        bundle.attempt.submitted_at = Some(now_fixture());
        let session = AttemptSession::from_bundle(ctx, bundle);

        let question = session.quiz().questions[0].clone();
        let option = question.options()[0].id;
        session.select_answer(question.id, option).unwrap();

        assert!(session.answer(question.id).is_none());
        assert_eq!(session.save_status(question.id), None);
    }

    // -- lifecycle -----------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn loading_a_submitted_attempt_lands_terminal() {
        let backend = Arc::new(StubBackend::default());
        let clock = Arc::new(ManualClock::at(now_fixture()));
        let ctx = test_ctx(Arc::clone(&backend), clock);

        let mut bundle = make_bundle(make_quiz(1), now_fixture());
        bundle.attempt.submitted_at = Some(now_fixture());
        bundle.attempt.score_percent = Some(80);
        bundle.attempt.is_graded = true;
        let session = AttemptSession::from_bundle(ctx, bundle);

        assert_eq!(session.phase(), AttemptPhase::Graded);
        assert_eq!(session.remaining(), Duration::ZERO);
        assert!(session.subscribe_remaining().is_none());

        // Repeat submission reuses the loaded receipt without the wire.
        let receipt = session.submit().await.unwrap();
        assert_eq!(receipt.score_percent, Some(80));
        assert_eq!(backend.submit_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_past_the_limit_flags_time_expired() {
        let backend = Arc::new(StubBackend::default());
        let clock = Arc::new(ManualClock::at(now_fixture()));
        let ctx = test_ctx(Arc::clone(&backend), clock);

        // Started 31 minutes ago against a 30 minute limit.
        let started = now_fixture() - chrono::Duration::minutes(31);
        let session = AttemptSession::from_bundle(ctx, make_bundle(make_quiz(1), started));
        assert_eq!(session.phase(), AttemptPhase::TimeExpired);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_submit_reaches_a_terminal_phase() {
        let backend = Arc::new(StubBackend {
            graded_on_submit: true,
            ..StubBackend::default()
        });
        let clock = Arc::new(ManualClock::at(now_fixture()));
        let ctx = test_ctx(Arc::clone(&backend), Arc::clone(&clock));
        let session = AttemptSession::from_bundle(ctx, make_bundle(make_quiz(1), now_fixture()));

        let receipt = session.submit().await.unwrap();
        assert!(receipt.is_graded);
        assert_eq!(session.phase(), AttemptPhase::Graded);
        assert_eq!(session.attempt().submitted_at, Some(now_fixture()));

        // And again: same receipt, still one wire call.
        let repeat = session.submit().await.unwrap();
        assert_eq!(repeat, receipt);
        assert_eq!(backend.submit_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ungraded_submit_lands_in_submitted() {
        let (session, backend) = fresh_session(1);
        let receipt = session.submit().await.unwrap();
        assert!(!receipt.is_graded);
        assert_eq!(session.phase(), AttemptPhase::Submitted);
        assert_eq!(backend.submit_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn result_requires_submission() {
        let (session, _) = fresh_session(1);
        assert!(matches!(
            session.fetch_result().await,
            Err(SessionError::NotSubmitted)
        ));
    }
}
