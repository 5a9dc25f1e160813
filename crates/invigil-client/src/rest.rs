//! REST implementation of the quiz backend.
//!
//! Wire DTOs are camelCase and private to this module; everything crossing
//! the trait boundary is an `invigil-core` type. Error responses share one
//! envelope, `{"error": {"code", "message"}}`, and are mapped onto the
//! typed taxonomy so callers never match on message strings.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use invigil_core::error::BackendError;
use invigil_core::model::{
    AnswerValue, Attempt, AttemptAnswer, AttemptId, OptionId, Question, QuestionId, QuestionKind,
    Quiz, QuizId, UserId,
};
use invigil_core::traits::{
    AttemptBundle, GradedView, QuizBackend, StartedAttempt, SubmitReceipt,
};

use crate::config::ClientConfig;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Quiz backend over the course platform's REST API.
pub struct RestBackend {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl RestBackend {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_parts(
            &config.base_url,
            config.token.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Trailing slashes are trimmed so path joins stay predictable.
    pub fn with_parts(base_url: &str, token: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            timeout,
            client,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, BackendError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.timeout)
            } else {
                BackendError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(map_error(status, response).await);
        }
        Ok(response)
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, BackendError> {
    response
        .json()
        .await
        .map_err(|e| BackendError::Protocol(format!("failed to decode response: {e}")))
}

async fn map_error(status: u16, response: reqwest::Response) -> BackendError {
    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => (envelope.error.code, envelope.error.message),
        Err(_) => (String::new(), body),
    };
    let message = if message.is_empty() {
        format!("HTTP {status}")
    } else {
        message
    };
    match status {
        401 | 403 => BackendError::Unauthorized(message),
        404 => BackendError::NotFound(message),
        409 if code == "attempt_limit_reached" => BackendError::AttemptLimitReached(message),
        409 if code == "attempt_open" => BackendError::AttemptOpen(message),
        _ => BackendError::Server { status, message },
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartAttemptResponse {
    attempt_id: AttemptId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttemptDto {
    id: AttemptId,
    quiz_id: QuizId,
    user_id: UserId,
    started_at: DateTime<Utc>,
    #[serde(default)]
    submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    score: Option<u32>,
    #[serde(default)]
    is_graded: bool,
}

impl From<AttemptDto> for Attempt {
    fn from(dto: AttemptDto) -> Self {
        Attempt {
            id: dto.id,
            quiz_id: dto.quiz_id,
            user_id: dto.user_id,
            started_at: dto.started_at,
            submitted_at: dto.submitted_at,
            score_percent: dto.score,
            is_graded: dto.is_graded,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuizDto {
    id: QuizId,
    title: String,
    time_limit_minutes: u32,
    passing_grade_percent: u32,
    max_attempts: u32,
    questions: Vec<QuestionDto>,
}

impl From<QuizDto> for Quiz {
    fn from(dto: QuizDto) -> Self {
        Quiz {
            id: dto.id,
            title: dto.title,
            time_limit_minutes: dto.time_limit_minutes,
            passing_grade_percent: dto.passing_grade_percent,
            max_attempts: dto.max_attempts,
            questions: dto.questions.into_iter().map(Question::from).collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionDto {
    id: QuestionId,
    #[serde(rename = "type")]
    kind: QuestionTypeDto,
    points: u32,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    options: Vec<OptionDto>,
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "camelCase")]
enum QuestionTypeDto {
    MultipleChoice,
    Essay,
}

#[derive(Deserialize)]
struct OptionDto {
    id: OptionId,
    text: String,
}

impl From<QuestionDto> for Question {
    fn from(dto: QuestionDto) -> Self {
        let kind = match dto.kind {
            QuestionTypeDto::MultipleChoice => QuestionKind::MultipleChoice {
                options: dto
                    .options
                    .into_iter()
                    .map(|o| invigil_core::model::AnswerOption {
                        id: o.id,
                        text: o.text,
                    })
                    .collect(),
            },
            QuestionTypeDto::Essay => QuestionKind::Essay,
        };
        Question {
            id: dto.id,
            points: dto.points,
            explanation: dto.explanation,
            kind,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerDto {
    question_id: QuestionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selected_answer_ids: Option<Vec<OptionId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    free_text: Option<String>,
}

impl From<&AttemptAnswer> for AnswerDto {
    fn from(answer: &AttemptAnswer) -> Self {
        match &answer.value {
            AnswerValue::Choice(selected) => AnswerDto {
                question_id: answer.question_id,
                selected_answer_ids: Some(selected.iter().copied().collect()),
                free_text: None,
            },
            AnswerValue::Text(text) => AnswerDto {
                question_id: answer.question_id,
                selected_answer_ids: None,
                free_text: Some(text.clone()),
            },
        }
    }
}

impl AnswerDto {
    fn into_answer(self) -> Result<AttemptAnswer, BackendError> {
        let value = match (self.selected_answer_ids, self.free_text) {
            (Some(selected), _) => AnswerValue::Choice(selected.into_iter().collect()),
            (None, Some(text)) => AnswerValue::Text(text),
            (None, None) => {
                return Err(BackendError::Protocol(format!(
                    "answer for question {} carries neither a selection nor text",
                    self.question_id
                )))
            }
        };
        Ok(AttemptAnswer {
            question_id: self.question_id,
            value,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttemptBundleDto {
    attempt: AttemptDto,
    quiz: QuizDto,
    #[serde(default)]
    answers: Vec<AnswerDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(default)]
    score: Option<u32>,
    is_graded: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyEntryDto {
    question_id: QuestionId,
    correct_answer_ids: Vec<OptionId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultResponse {
    attempt: AttemptDto,
    #[serde(default)]
    answers: Vec<AnswerDto>,
    #[serde(default)]
    answer_key: Vec<KeyEntryDto>,
}

fn collect_answers(dtos: Vec<AnswerDto>) -> Result<Vec<AttemptAnswer>, BackendError> {
    dtos.into_iter().map(AnswerDto::into_answer).collect()
}

// ---------------------------------------------------------------------------
// Trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl QuizBackend for RestBackend {
    #[instrument(skip(self))]
    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartedAttempt, BackendError> {
        let response = self
            .send(self.request(Method::POST, &format!("/api/quizzes/{quiz_id}/attempts")))
            .await?;
        let started: StartAttemptResponse = decode(response).await?;
        Ok(StartedAttempt {
            attempt_id: started.attempt_id,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_attempt(&self, attempt_id: AttemptId) -> Result<AttemptBundle, BackendError> {
        let response = self
            .send(self.request(Method::GET, &format!("/api/attempts/{attempt_id}")))
            .await?;
        let bundle: AttemptBundleDto = decode(response).await?;
        Ok(AttemptBundle {
            attempt: bundle.attempt.into(),
            quiz: bundle.quiz.into(),
            answers: collect_answers(bundle.answers)?,
        })
    }

    #[instrument(skip(self, answer), fields(question_id = %answer.question_id))]
    async fn save_answer(
        &self,
        attempt_id: AttemptId,
        answer: &AttemptAnswer,
    ) -> Result<(), BackendError> {
        let path = format!(
            "/api/attempts/{attempt_id}/answers/{}",
            answer.question_id
        );
        self.send(self.request(Method::PUT, &path).json(&AnswerDto::from(answer)))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn submit_attempt(&self, attempt_id: AttemptId) -> Result<SubmitReceipt, BackendError> {
        let response = self
            .send(self.request(Method::POST, &format!("/api/attempts/{attempt_id}/submit")))
            .await?;
        let receipt: SubmitResponse = decode(response).await?;
        Ok(SubmitReceipt {
            score_percent: receipt.score,
            is_graded: receipt.is_graded,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_result(&self, attempt_id: AttemptId) -> Result<GradedView, BackendError> {
        let response = self
            .send(self.request(Method::GET, &format!("/api/attempts/{attempt_id}/result")))
            .await?;
        let result: ResultResponse = decode(response).await?;
        let answer_key = result
            .answer_key
            .into_iter()
            .map(|entry| {
                (
                    entry.question_id,
                    entry.correct_answer_ids.into_iter().collect::<BTreeSet<_>>(),
                )
            })
            .collect();
        Ok(GradedView {
            attempt: result.attempt.into(),
            answers: collect_answers(result.answers)?,
            answer_key,
        })
    }
}
