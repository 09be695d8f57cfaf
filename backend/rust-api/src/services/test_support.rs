//! Fixtures shared by the service unit tests.

use chrono::Utc;

use crate::models::{
    Achievement, AttemptStatus, Choice, Difficulty, Level, LevelStep, NewAttempt, Question,
    StepKind,
};
use crate::repo::Repositories;

pub fn question(id: i64, correct: &[i64], wrong: &[i64]) -> Question {
    let mut choices: Vec<Choice> = correct
        .iter()
        .map(|choice_id| (choice_id, true))
        .chain(wrong.iter().map(|choice_id| (choice_id, false)))
        .map(|(choice_id, is_correct)| Choice {
            id: *choice_id,
            text: format!("choice {}", choice_id),
            is_correct,
            order: *choice_id as i32,
        })
        .collect();
    choices.sort_by_key(|choice| choice.id);

    Question {
        id,
        prompt: format!("question {}", id),
        explanation: format!("explanation {}", id),
        multi_select: correct.len() > 1,
        choices,
    }
}

pub fn level(id: i64, topic: &str, difficulty: Difficulty, reward: i64, questions: &[i64]) -> Level {
    let mut steps = vec![LevelStep {
        id: id * 100,
        order: 1,
        kind: StepKind::Text,
        title: "Intro".to_string(),
        payload: Some(serde_json::json!({ "body": "Read me first" })),
        question_id: None,
    }];
    for (offset, question_id) in questions.iter().enumerate() {
        steps.push(LevelStep {
            id: id * 100 + offset as i64 + 1,
            order: offset as i32 + 2,
            kind: StepKind::Question,
            title: format!("Question {}", offset + 1),
            payload: None,
            question_id: Some(*question_id),
        });
    }

    Level {
        id,
        title: format!("Level {}", id),
        topic: topic.to_string(),
        difficulty,
        reward_points: reward,
        is_active: true,
        steps,
    }
}

pub fn achievement(id: i64, code: &str) -> Achievement {
    Achievement {
        id,
        code: code.to_string(),
        name: code.replace('_', " "),
        description: String::new(),
        icon: String::new(),
        points: 10,
    }
}

/// Levels 1..=3 are active and ordered; level 4 is inactive.
///
/// Level 1 holds question 101 (single answer 1) and question 102
/// (multi-select {1, 2}); levels 2, 3 and 4 hold one question each.
pub async fn seed_catalog() -> Repositories {
    let repos = Repositories::in_memory();

    for question in [
        question(101, &[1], &[2, 3]),
        question(102, &[1, 2], &[3]),
        question(201, &[4], &[5]),
        question(301, &[6], &[7]),
        question(401, &[8], &[9]),
    ] {
        repos.questions.upsert(&question).await.unwrap();
    }

    let mut inactive = level(4, "investing", Difficulty::Hard, 40, &[401]);
    inactive.is_active = false;

    for level in [
        level(1, "budgeting", Difficulty::Easy, 50, &[101, 102]),
        level(2, "budgeting", Difficulty::Medium, 0, &[201]),
        level(3, "investing", Difficulty::Medium, 30, &[301]),
        inactive,
    ] {
        repos.levels.upsert(&level).await.unwrap();
    }

    for achievement in [
        achievement(1, crate::models::achievement::FIRST_STEPS),
        achievement(2, crate::models::achievement::STREAK_3),
        achievement(3, crate::models::achievement::PERFECT_SCORE),
    ] {
        repos.achievements.upsert(&achievement).await.unwrap();
    }

    repos
}

/// Records a finished attempt with the given score.
pub async fn pass_level(repos: &Repositories, user_id: i64, level_id: i64, score: i32) {
    let mut attempt = repos
        .attempts
        .create(NewAttempt {
            user_id,
            level_id,
            started_at: Utc::now(),
        })
        .await
        .unwrap();
    attempt.transition(AttemptStatus::Completed, Utc::now());
    attempt.score = score;
    assert!(repos.attempts.finalize(&attempt).await.unwrap());
}
