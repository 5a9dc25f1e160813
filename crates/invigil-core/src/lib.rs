//! Core library for invigil: quiz and attempt model types, the backend
//! trait, and the engines that drive a live attempt session.
//!
//! The crate is transport-agnostic. Everything here operates against the
//! [`QuizBackend`] trait; HTTP and in-memory implementations live in
//! `invigil-client`.

pub mod countdown;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod session;
pub mod submit;
pub mod sync;
pub mod traits;

pub use countdown::{remaining_seconds, Countdown, CountdownState};
pub use error::BackendError;
pub use evaluator::{evaluate, AttemptOutcome, QuestionReview, Verdict};
pub use model::{
    AnswerKey, AnswerOption, AnswerValue, Attempt, AttemptAnswer, AttemptId, OptionId, Question,
    QuestionId, QuestionKind, Quiz, QuizId, UserId,
};
pub use session::{AttemptEvent, AttemptPhase, AttemptSession, SessionContext, SessionError};
pub use submit::{SubmissionController, SubmitError};
pub use sync::{SaveStatus, SyncConfig, SyncEngine};
pub use traits::{
    AttemptBundle, Clock, GradedView, ManualClock, QuizBackend, StartedAttempt, SubmitReceipt,
    SystemClock,
};
