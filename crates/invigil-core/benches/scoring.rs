use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use uuid::Uuid;

use invigil_core::evaluator::evaluate;
use invigil_core::model::{
    AnswerKey, AnswerOption, AnswerValue, Attempt, AttemptAnswer, Question, QuestionId,
    QuestionKind, Quiz,
};
use invigil_core::remaining_seconds;

type Fixture = (Quiz, Attempt, HashMap<QuestionId, AttemptAnswer>, AnswerKey);

/// A submitted multiple-choice attempt where every other answer is correct.
fn synthetic_attempt(question_count: usize) -> Fixture {
    let mut key = AnswerKey::new();
    let mut answers = HashMap::new();
    let mut questions = Vec::with_capacity(question_count);

    for i in 0..question_count {
        let options: Vec<AnswerOption> = (0..4)
            .map(|j| AnswerOption {
                id: Uuid::new_v4(),
                text: format!("option {j}"),
            })
            .collect();
        let question = Question {
            id: Uuid::new_v4(),
            points: 5,
            explanation: None,
            kind: QuestionKind::MultipleChoice {
                options: options.clone(),
            },
        };
        key.insert(question.id, BTreeSet::from([options[0].id]));
        let picked = if i % 2 == 0 { options[0].id } else { options[1].id };
        answers.insert(
            question.id,
            AttemptAnswer {
                question_id: question.id,
                value: AnswerValue::single_choice(picked),
            },
        );
        questions.push(question);
    }

    let quiz = Quiz {
        id: Uuid::new_v4(),
        title: "bench".to_string(),
        time_limit_minutes: 60,
        passing_grade_percent: 60,
        max_attempts: 1,
        questions,
    };
    let attempt = Attempt {
        id: Uuid::new_v4(),
        quiz_id: quiz.id,
        user_id: Uuid::new_v4(),
        started_at: Utc::now(),
        submitted_at: Some(Utc::now()),
        score_percent: None,
        is_graded: false,
    };
    (quiz, attempt, answers, key)
}

fn bench_evaluate(c: &mut Criterion) {
    for size in [10usize, 100, 1000] {
        let (quiz, attempt, answers, key) = synthetic_attempt(size);
        c.bench_function(&format!("evaluate_{size}_questions"), |b| {
            b.iter(|| {
                evaluate(
                    black_box(&quiz),
                    black_box(&attempt),
                    black_box(&answers),
                    black_box(&key),
                )
            })
        });
    }
}

fn bench_remaining_seconds(c: &mut Criterion) {
    let started_at = Utc::now();
    let now = started_at + chrono::Duration::minutes(29);
    c.bench_function("remaining_seconds", |b| {
        b.iter(|| {
            remaining_seconds(
                black_box(started_at),
                black_box(Duration::from_secs(1800)),
                black_box(now),
            )
        })
    });
}

criterion_group!(benches, bench_evaluate, bench_remaining_seconds);
criterion_main!(benches);
