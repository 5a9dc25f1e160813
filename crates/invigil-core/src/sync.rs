//! Background answer persistence with last-write-wins ordering.
//!
//! Every edit is queued immediately and saved off the hot path; the caller
//! never waits on the network. Writes to the same question are serialized
//! and stamped with a per-question sequence number, so a slow response for
//! an old value can neither overwrite a newer one on the server nor clobber
//! its status locally. Writes to different questions run concurrently.
//!
//! An intermediate write that has been superseded before it reaches the
//! wire is dropped entirely; only the newest value per question is sent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio::time;
use tracing::{debug, error, warn};

use crate::error::BackendError;
use crate::model::{AttemptAnswer, AttemptId, QuestionId};
use crate::traits::QuizBackend;

/// Persistence status of one question's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    /// A write for this question is queued or in flight.
    Saving,
    /// The newest write was acknowledged by the backend.
    Saved,
    /// The newest write failed after exhausting its retries.
    Error,
}

/// Tuning for the autosave engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Additional attempts after a transient failure; zero disables retry.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

struct SaveJob {
    seq: u64,
    answer: AttemptAnswer,
}

struct SaveDone {
    question_id: QuestionId,
    seq: u64,
    result: Result<(), BackendError>,
}

struct QuestionTrack {
    /// Sequence number of the newest write issued for this question.
    latest_seq: u64,
    /// A write for this question is currently on the wire.
    busy: bool,
    /// Newest write waiting for the wire; replaced, not appended, when a
    /// fresher edit arrives.
    pending: Option<SaveJob>,
    status: SaveStatus,
}

impl Default for QuestionTrack {
    fn default() -> Self {
        Self {
            latest_seq: 0,
            busy: false,
            pending: None,
            status: SaveStatus::Saving,
        }
    }
}

#[derive(Default)]
struct SyncState {
    tracks: HashMap<QuestionId, QuestionTrack>,
    /// Writes accepted but not yet settled, including collapsed ones.
    unresolved: usize,
}

impl SyncState {
    /// Settle one write; true when the engine just became idle.
    fn resolve_one(&mut self) -> bool {
        self.unresolved = self.unresolved.saturating_sub(1);
        self.unresolved == 0
    }
}

/// Handle to the autosave pump for one attempt.
///
/// Dropping the handle closes the queue; writes already accepted still
/// drain to the backend.
pub struct SyncEngine {
    state: Arc<Mutex<SyncState>>,
    jobs: mpsc::UnboundedSender<SaveJob>,
    idle: Arc<Notify>,
}

impl SyncEngine {
    /// Spawn the pump task for `attempt_id`.
    pub fn spawn(backend: Arc<dyn QuizBackend>, attempt_id: AttemptId, config: SyncConfig) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(SyncState::default()));
        let idle = Arc::new(Notify::new());
        tokio::spawn(run_pump(
            jobs_rx,
            backend,
            attempt_id,
            config,
            Arc::clone(&state),
            Arc::clone(&idle),
        ));
        Self {
            state,
            jobs: jobs_tx,
            idle,
        }
    }

    /// Queue one write. Returns immediately; the answer is stamped with the
    /// next sequence number for its question and saved in the background.
    pub fn save(&self, answer: AttemptAnswer) {
        let question_id = answer.question_id;
        let seq = {
            let mut st = self.state.lock().unwrap();
            st.unresolved += 1;
            let track = st.tracks.entry(question_id).or_default();
            track.latest_seq += 1;
            track.status = SaveStatus::Saving;
            track.latest_seq
        };
        if self.jobs.send(SaveJob { seq, answer }).is_err() {
            // Pump already shut down; only reachable during teardown.
            let mut st = self.state.lock().unwrap();
            if let Some(track) = st.tracks.get_mut(&question_id) {
                track.status = SaveStatus::Error;
            }
            if st.resolve_one() {
                self.idle.notify_waiters();
            }
        }
    }

    /// Status of the newest write for a question; `None` if never edited.
    pub fn status(&self, question_id: QuestionId) -> Option<SaveStatus> {
        self.state
            .lock()
            .unwrap()
            .tracks
            .get(&question_id)
            .map(|track| track.status)
    }

    /// True when no write is queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.state.lock().unwrap().unresolved == 0
    }

    /// Wait until every accepted write has settled. Submission never waits
    /// on this; it exists for orderly teardown and tests.
    pub async fn await_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before the check so a settle in between cannot be missed.
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

async fn run_pump(
    mut jobs: mpsc::UnboundedReceiver<SaveJob>,
    backend: Arc<dyn QuizBackend>,
    attempt_id: AttemptId,
    config: SyncConfig,
    state: Arc<Mutex<SyncState>>,
    idle: Arc<Notify>,
) {
    let mut in_flight = FuturesUnordered::new();
    let mut open = true;
    while open || !in_flight.is_empty() {
        tokio::select! {
            job = jobs.recv(), if open => match job {
                Some(job) => {
                    if let Some(job) = admit(&state, &idle, job) {
                        in_flight.push(perform_save(
                            Arc::clone(&backend),
                            attempt_id,
                            job,
                            config.clone(),
                            Arc::clone(&state),
                        ));
                    }
                }
                None => open = false,
            },
            Some(done) = in_flight.next(), if !in_flight.is_empty() => {
                if let Some(job) = settle(&state, &idle, done) {
                    in_flight.push(perform_save(
                        Arc::clone(&backend),
                        attempt_id,
                        job,
                        config.clone(),
                        Arc::clone(&state),
                    ));
                }
            }
        }
    }
}

/// Gate one queued job onto the wire. Per question, at most one write is in
/// flight; newer arrivals collapse into a single pending slot.
fn admit(state: &Mutex<SyncState>, idle: &Notify, job: SaveJob) -> Option<SaveJob> {
    let mut st = state.lock().unwrap();
    let question_id = job.answer.question_id;
    let Some(track) = st.tracks.get_mut(&question_id) else {
        // save() creates the track, so this only guards a logic error.
        if st.resolve_one() {
            idle.notify_waiters();
        }
        return None;
    };
    if job.seq < track.latest_seq {
        // Superseded while queued. Sending it could land after the newer
        // value on the server, so it never reaches the wire.
        debug!(%question_id, seq = job.seq, "dropping superseded write before send");
        if st.resolve_one() {
            idle.notify_waiters();
        }
        return None;
    }
    if track.busy {
        if track.pending.replace(job).is_some() {
            // The write it replaced is settled as collapsed.
            if st.resolve_one() {
                idle.notify_waiters();
            }
        }
        return None;
    }
    track.busy = true;
    Some(job)
}

/// Apply one completed write and release the next pending one, if any.
fn settle(state: &Mutex<SyncState>, idle: &Notify, done: SaveDone) -> Option<SaveJob> {
    let mut st = state.lock().unwrap();
    let next = match st.tracks.get_mut(&done.question_id) {
        Some(track) => {
            if track.latest_seq == done.seq {
                track.status = match &done.result {
                    Ok(()) => SaveStatus::Saved,
                    Err(err) => {
                        error!(question_id = %done.question_id, %err, "answer save failed");
                        SaveStatus::Error
                    }
                };
            } else {
                // A newer write owns the status now; this outcome, success
                // or failure, is discarded.
                debug!(
                    question_id = %done.question_id,
                    seq = done.seq,
                    latest = track.latest_seq,
                    "discarding stale save completion"
                );
            }
            match track.pending.take() {
                Some(job) => Some(job),
                None => {
                    track.busy = false;
                    None
                }
            }
        }
        None => None,
    };
    if st.resolve_one() {
        idle.notify_waiters();
    }
    next
}

async fn perform_save(
    backend: Arc<dyn QuizBackend>,
    attempt_id: AttemptId,
    job: SaveJob,
    config: SyncConfig,
    state: Arc<Mutex<SyncState>>,
) -> SaveDone {
    let question_id = job.answer.question_id;
    let mut tries = 0u32;
    let result = loop {
        match backend.save_answer(attempt_id, &job.answer).await {
            Ok(()) => break Ok(()),
            Err(err) if err.is_retryable() && tries < config.max_retries => {
                tries += 1;
                warn!(%question_id, seq = job.seq, %err, retry = tries, "answer save failed, will retry");
                time::sleep(config.retry_delay).await;
                if superseded(&state, question_id, job.seq) {
                    // A fresher write is queued for this question; let it win.
                    debug!(%question_id, seq = job.seq, "abandoning retry of superseded write");
                    break Err(err);
                }
            }
            Err(err) => break Err(err),
        }
    };
    SaveDone {
        question_id,
        seq: job.seq,
        result,
    }
}

fn superseded(state: &Mutex<SyncState>, question_id: QuestionId, seq: u64) -> bool {
    let st = state.lock().unwrap();
    st.tracks
        .get(&question_id)
        .is_some_and(|track| track.latest_seq != seq)
}
