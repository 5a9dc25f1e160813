//! Walkthrough — one quiz attempt from start to graded result.
//!
//! Runs entirely against the in-memory backend, so there is nothing to
//! configure: a quiz is seeded, an attempt is started, answers autosave in
//! the background, and the attempt is submitted and graded.
//!
//! ```bash
//! cargo run --example walkthrough
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use invigil_client::MockBackend;
use invigil_core::model::{AnswerKey, AnswerOption, Question, QuestionKind, Quiz};
use invigil_core::session::{AttemptSession, SessionContext};
use invigil_core::traits::QuizBackend;
use invigil_core::Verdict;
use uuid::Uuid;

fn seed_quiz() -> (Quiz, AnswerKey) {
    let mut key = AnswerKey::new();
    let mut questions = Vec::new();

    for (text, choices, correct) in [
        ("What does a move do?", ["transfers ownership", "copies the value", "borrows the value"], 0),
        ("Which reference kind allows mutation?", ["&T", "&mut T", "Box<T>"], 1),
    ] {
        let options: Vec<_> = choices
            .iter()
            .map(|&text| AnswerOption {
                id: Uuid::new_v4(),
                text: text.to_string(),
            })
            .collect();
        let question = Question {
            id: Uuid::new_v4(),
            points: 5,
            explanation: Some(format!("({text})")),
            kind: QuestionKind::MultipleChoice {
                options: options.clone(),
            },
        };
        key.insert(question.id, BTreeSet::from([options[correct].id]));
        questions.push(question);
    }

    questions.push(Question {
        id: Uuid::new_v4(),
        points: 10,
        explanation: None,
        kind: QuestionKind::Essay,
    });

    let quiz = Quiz {
        id: Uuid::new_v4(),
        title: "Ownership and borrowing".to_string(),
        time_limit_minutes: 30,
        passing_grade_percent: 60,
        max_attempts: 3,
        questions,
    };
    (quiz, key)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("invigil=info".parse().unwrap()),
        )
        .init();

    // Seed the in-memory platform with one quiz.
    let backend = Arc::new(MockBackend::new());
    let (quiz, key) = seed_quiz();
    let quiz_id = quiz.id;
    backend.add_quiz(quiz, key);

    // Start an attempt. The countdown anchors on the server-stamped start.
    let ctx = SessionContext::new(Arc::clone(&backend) as Arc<dyn QuizBackend>);
    let session = AttemptSession::start(ctx, quiz_id).await?;
    println!("Attempt {} on \"{}\"", session.attempt_id(), session.quiz().title);
    println!("Time remaining: {}s\n", session.remaining().as_secs());

    // Answer the multiple-choice questions (first option each) and draft
    // the essay. Every edit autosaves in the background.
    let questions = session.quiz().questions.clone();
    for question in &questions {
        match &question.kind {
            QuestionKind::MultipleChoice { options } => {
                session.select_answer(question.id, options[0].id)?;
            }
            QuestionKind::Essay => {
                session.set_essay_text(
                    question.id,
                    "A move transfers ownership; the source can no longer be used.",
                )?;
            }
        }
    }
    session.flush_saves().await;
    for question in &questions {
        println!(
            "  question {}: {:?}",
            question.id,
            session.save_status(question.id)
        );
    }

    // Submit. The essay keeps the final score pending.
    let receipt = session.submit().await?;
    println!("\nSubmitted. Graded: {}", receipt.is_graded);

    let pending = session.fetch_result().await?;
    println!(
        "Choice points so far: {}/{} ({} question(s) awaiting an instructor)",
        pending.earned_points, pending.total_points, pending.pending_manual
    );

    // The instructor grades the essay; the result is now final.
    backend.grade_essays(session.attempt_id(), 85);
    let outcome = session.fetch_result().await?;
    println!("\nFinal result:");
    for review in &outcome.reviews {
        let marker = match review.verdict {
            Verdict::Correct => "correct",
            Verdict::Incorrect => "incorrect",
            Verdict::PendingManual => "pending",
            Verdict::ManuallyGraded => "graded by instructor",
        };
        println!("  {}: {} ({} pts)", review.question_id, marker, review.points);
    }
    println!(
        "  Score: {}%, passed: {}",
        outcome.score_percent.unwrap_or(0),
        outcome.passed.unwrap_or(false)
    );

    Ok(())
}
