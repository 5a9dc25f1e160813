//! Idempotent, single-flight submission.
//!
//! However many times submission is triggered, by the learner, by timer
//! expiry, or by both at once, the backend sees at most one in-flight
//! submit call. Concurrent callers join the existing flight and receive the
//! leader's outcome; callers after success receive the original receipt
//! without a network round trip. A failed or abandoned flight resets, so
//! submission stays retryable.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::error::BackendError;
use crate::model::AttemptId;
use crate::traits::{QuizBackend, SubmitReceipt};

/// Submission failure. `Clone` because every joiner of a shared flight
/// receives the same outcome.
#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    /// The backend rejected or failed the submission.
    #[error(transparent)]
    Backend(Arc<BackendError>),

    /// The task owning the in-flight submission was dropped mid-call.
    #[error("submission was interrupted before completing")]
    Interrupted,
}

impl From<BackendError> for SubmitError {
    fn from(err: BackendError) -> Self {
        SubmitError::Backend(Arc::new(err))
    }
}

impl SubmitError {
    /// The underlying backend error, when there is one.
    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            SubmitError::Backend(err) => Some(err),
            SubmitError::Interrupted => None,
        }
    }

    /// True when trying again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SubmitError::Backend(err) => err.is_retryable(),
            SubmitError::Interrupted => true,
        }
    }
}

type Outcome = Option<Result<SubmitReceipt, SubmitError>>;

enum Flight {
    /// No submission attempted, or the last flight failed or was abandoned.
    Idle,
    /// A submit call is on the wire; joiners wait on the channel.
    InFlight(watch::Receiver<Outcome>),
    /// Submission succeeded; the receipt is final.
    Done(SubmitReceipt),
}

enum Role {
    Finished(SubmitReceipt),
    Joiner(watch::Receiver<Outcome>),
    Leader(watch::Sender<Outcome>),
}

/// Reopens the flight if the leader is dropped before settling it. The
/// leader holds the only `watch::Sender`, so an abandoned `InFlight` entry
/// could never complete, and every later submit would join it instead of
/// retrying.
struct FlightReset<'a> {
    flight: &'a Mutex<Flight>,
    armed: bool,
}

impl Drop for FlightReset<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.flight.lock().unwrap() = Flight::Idle;
        }
    }
}

/// Serializes submission of one attempt.
pub struct SubmissionController {
    backend: Arc<dyn QuizBackend>,
    attempt_id: AttemptId,
    flight: Mutex<Flight>,
}

impl SubmissionController {
    pub fn new(backend: Arc<dyn QuizBackend>, attempt_id: AttemptId) -> Self {
        Self {
            backend,
            attempt_id,
            flight: Mutex::new(Flight::Idle),
        }
    }

    /// For attempts loaded in an already-submitted state; `submit` then
    /// returns `receipt` without touching the backend.
    pub fn already_submitted(
        backend: Arc<dyn QuizBackend>,
        attempt_id: AttemptId,
        receipt: SubmitReceipt,
    ) -> Self {
        Self {
            backend,
            attempt_id,
            flight: Mutex::new(Flight::Done(receipt)),
        }
    }

    /// Submit the attempt, coalescing with any flight already in progress.
    pub async fn submit(&self) -> Result<SubmitReceipt, SubmitError> {
        let role = {
            let mut flight = self.flight.lock().unwrap();
            match &*flight {
                Flight::Done(receipt) => Role::Finished(receipt.clone()),
                Flight::InFlight(outcome_rx) => Role::Joiner(outcome_rx.clone()),
                Flight::Idle => {
                    let (outcome_tx, outcome_rx) = watch::channel(None);
                    *flight = Flight::InFlight(outcome_rx);
                    Role::Leader(outcome_tx)
                }
            }
        };

        let outcome_tx = match role {
            Role::Finished(receipt) => {
                debug!(attempt_id = %self.attempt_id, "attempt already submitted, reusing receipt");
                return Ok(receipt);
            }
            Role::Joiner(mut outcome_rx) => {
                debug!(attempt_id = %self.attempt_id, "joining in-flight submission");
                return match outcome_rx.wait_for(|outcome| outcome.is_some()).await {
                    Ok(outcome) => outcome.clone().unwrap_or(Err(SubmitError::Interrupted)),
                    Err(_) => Err(SubmitError::Interrupted),
                };
            }
            Role::Leader(outcome_tx) => outcome_tx,
        };

        // If this future is dropped at the backend await, say under a
        // caller's timeout, the guard reopens the flight so the next
        // submit leads a fresh one.
        let mut reset = FlightReset {
            flight: &self.flight,
            armed: true,
        };

        debug!(attempt_id = %self.attempt_id, "submitting attempt");
        let outcome = self
            .backend
            .submit_attempt(self.attempt_id)
            .await
            .map_err(SubmitError::from);

        {
            let mut flight = self.flight.lock().unwrap();
            *flight = match &outcome {
                Ok(receipt) => Flight::Done(receipt.clone()),
                // Reset so a later call can retry.
                Err(_) => Flight::Idle,
            };
        }
        reset.armed = false;
        let _ = outcome_tx.send(Some(outcome.clone()));
        outcome
    }

    /// Receipt of a completed submission, if one exists.
    pub fn receipt(&self) -> Option<SubmitReceipt> {
        match &*self.flight.lock().unwrap() {
            Flight::Done(receipt) => Some(receipt.clone()),
            _ => None,
        }
    }
}
