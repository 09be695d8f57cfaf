//! Accuracy scoring for completed attempts.
//!
//! Factors are kept in tenths so that the per-question penalty (0.3 per
//! mistake) and the final half-up rounding are exact.

use std::collections::{BTreeSet, HashMap};

use crate::models::AttemptStep;

/// Minimum score that counts as passing a level.
pub const PASS_THRESHOLD: i32 = 70;

const FULL_FACTOR: u32 = 10;
const MISTAKE_PENALTY: u32 = 3;
const THREE_MISTAKES_FACTOR: u32 = 1;

/// Exact set equality; order and duplicates are irrelevant.
pub fn choice_sets_match(selected: &[i64], correct: &[i64]) -> bool {
    let selected: BTreeSet<i64> = selected.iter().copied().collect();
    let correct: BTreeSet<i64> = correct.iter().copied().collect();
    selected == correct
}

/// Contribution of a resolved question, in tenths.
///
/// Exactly three mistakes before the first correct answer still earn 0.1.
pub fn factor_tenths(mistakes: u32) -> u32 {
    if mistakes == 3 {
        return THREE_MISTAKES_FACTOR;
    }
    FULL_FACTOR.saturating_sub(MISTAKE_PENALTY.saturating_mul(mistakes))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionOutcome {
    pub question_id: i64,
    /// Wrong answers recorded before the first correct one.
    pub mistakes: u32,
    pub resolved: bool,
    pub last_correct: bool,
    pub last_choice_ids: Vec<i64>,
}

impl QuestionOutcome {
    pub fn factor_tenths(&self) -> u32 {
        if self.resolved {
            factor_tenths(self.mistakes)
        } else {
            0
        }
    }
}

/// Groups the step log per question, in order of first appearance.
pub fn question_outcomes(steps: &[AttemptStep]) -> Vec<QuestionOutcome> {
    let mut ordered: Vec<&AttemptStep> = steps
        .iter()
        .filter(|step| step.question_id.is_some())
        .collect();
    ordered.sort_by_key(|step| (step.step_order, step.id));

    let mut outcomes: Vec<QuestionOutcome> = Vec::new();
    let mut index: HashMap<i64, usize> = HashMap::new();

    for step in ordered {
        let Some(question_id) = step.question_id else {
            continue;
        };
        let slot = *index.entry(question_id).or_insert_with(|| {
            outcomes.push(QuestionOutcome {
                question_id,
                mistakes: 0,
                resolved: false,
                last_correct: false,
                last_choice_ids: Vec::new(),
            });
            outcomes.len() - 1
        });

        let outcome = &mut outcomes[slot];
        if !outcome.resolved {
            if step.correct {
                outcome.resolved = true;
            } else {
                outcome.mistakes += 1;
            }
        }
        outcome.last_correct = step.correct;
        outcome.last_choice_ids = step.response.choice_ids.clone();
    }

    outcomes
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreSummary {
    pub score: i32,
    pub total_questions: usize,
    pub correct_answers: usize,
    /// Questions that never received a correct answer.
    pub unresolved: Vec<QuestionOutcome>,
}

/// Scores a step log. `level_questions` is the number of question steps the
/// level defines; when unknown, the distinct answered questions are used.
pub fn score_attempt(steps: &[AttemptStep], level_questions: Option<usize>) -> ScoreSummary {
    let outcomes = question_outcomes(steps);
    let total_questions = level_questions.unwrap_or(outcomes.len());

    let sum_tenths: u64 = outcomes
        .iter()
        .map(|outcome| u64::from(outcome.factor_tenths()))
        .sum();

    let correct_answers = outcomes
        .iter()
        .filter(|outcome| outcome.last_correct)
        .count();

    let unresolved = outcomes
        .into_iter()
        .filter(|outcome| !outcome.resolved)
        .collect();

    ScoreSummary {
        score: percentage(sum_tenths, total_questions),
        total_questions,
        correct_answers,
        unresolved,
    }
}

/// round_half_up(sum_tenths / 10 / total * 100), computed on integers.
fn percentage(sum_tenths: u64, total_questions: usize) -> i32 {
    if total_questions == 0 {
        return 0;
    }
    let total = total_questions as u64;
    let rounded = (sum_tenths * 20 + total) / (2 * total);
    rounded.min(100) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnswerPayload;
    use chrono::Utc;

    struct Log {
        steps: Vec<AttemptStep>,
    }

    impl Log {
        fn new() -> Self {
            Self { steps: Vec::new() }
        }

        fn answer(mut self, question_id: i64, correct: bool) -> Self {
            let order = self.steps.len() as i32 + 1;
            self.steps.push(AttemptStep {
                id: order as i64,
                attempt_id: 1,
                level_step_id: Some(question_id),
                question_id: Some(question_id),
                step_order: order,
                response: AnswerPayload {
                    question_id,
                    choice_ids: vec![if correct { 1 } else { 2 }],
                },
                correct,
                duration_ms: 0,
                answered_at: Utc::now(),
            });
            self
        }
    }

    #[test]
    fn choice_sets_ignore_order_and_duplicates() {
        assert!(choice_sets_match(&[2, 5], &[5, 2]));
        assert!(choice_sets_match(&[5, 5, 2], &[2, 5]));
        assert!(!choice_sets_match(&[2, 5, 7], &[2, 5]));
        assert!(!choice_sets_match(&[2], &[2, 5]));
        assert!(!choice_sets_match(&[], &[2]));
    }

    #[test]
    fn factor_curve() {
        assert_eq!(factor_tenths(0), 10);
        assert_eq!(factor_tenths(1), 7);
        assert_eq!(factor_tenths(2), 4);
        assert_eq!(factor_tenths(3), 1);
        assert_eq!(factor_tenths(4), 0);
        assert_eq!(factor_tenths(9), 0);
    }

    #[test]
    fn all_correct_first_try_scores_100() {
        let log = Log::new().answer(1, true).answer(2, true);
        let summary = score_attempt(&log.steps, Some(2));
        assert_eq!(summary.score, 100);
        assert_eq!(summary.correct_answers, 2);
        assert!(summary.unresolved.is_empty());
    }

    #[test]
    fn one_mistake_scores_85() {
        let log = Log::new().answer(1, true).answer(2, false).answer(2, true);
        let summary = score_attempt(&log.steps, Some(2));
        assert_eq!(summary.score, 85);
        assert_eq!(summary.correct_answers, 2);
    }

    #[test]
    fn never_correct_is_unresolved_with_zero_factor() {
        let log = Log::new()
            .answer(1, true)
            .answer(2, false)
            .answer(2, false)
            .answer(2, false);
        let summary = score_attempt(&log.steps, Some(2));

        assert_eq!(summary.score, 50);
        assert_eq!(summary.unresolved.len(), 1);
        assert_eq!(summary.unresolved[0].question_id, 2);
        assert_eq!(summary.unresolved[0].mistakes, 3);
        assert_eq!(summary.correct_answers, 1);
    }

    #[test]
    fn three_mistakes_then_correct_earns_a_tenth() {
        let log = Log::new()
            .answer(1, false)
            .answer(1, false)
            .answer(1, false)
            .answer(1, true);
        let summary = score_attempt(&log.steps, Some(1));
        assert_eq!(summary.score, 10);
        assert!(summary.unresolved.is_empty());
    }

    #[test]
    fn four_mistakes_then_correct_earns_nothing() {
        let log = Log::new()
            .answer(1, false)
            .answer(1, false)
            .answer(1, false)
            .answer(1, false)
            .answer(1, true);
        assert_eq!(score_attempt(&log.steps, Some(1)).score, 0);
    }

    #[test]
    fn correct_answers_follow_the_last_answer() {
        // Resolved on the first try, then answered wrong again.
        let log = Log::new().answer(1, true).answer(1, false);
        let summary = score_attempt(&log.steps, Some(1));
        assert_eq!(summary.score, 100);
        assert_eq!(summary.correct_answers, 0);
    }

    #[test]
    fn unanswered_level_questions_pull_the_score_down() {
        let log = Log::new().answer(1, true);
        assert_eq!(score_attempt(&log.steps, Some(3)).score, 33);
    }

    #[test]
    fn rounds_half_up() {
        // (1.0 + 0.7 + 0.4 + 0.0) / 4 = 52.5%
        let log = Log::new()
            .answer(1, true)
            .answer(2, false)
            .answer(2, true)
            .answer(3, false)
            .answer(3, false)
            .answer(3, true)
            .answer(4, false);
        assert_eq!(score_attempt(&log.steps, Some(4)).score, 53);
    }

    #[test]
    fn falls_back_to_answered_questions_without_level_data() {
        let log = Log::new().answer(1, true).answer(2, false).answer(2, true);
        let summary = score_attempt(&log.steps, None);
        assert_eq!(summary.total_questions, 2);
        assert_eq!(summary.score, 85);
    }

    #[test]
    fn empty_level_scores_zero() {
        assert_eq!(score_attempt(&[], Some(0)).score, 0);
        assert_eq!(score_attempt(&[], None).score, 0);
    }
}
