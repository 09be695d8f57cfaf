use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(format!("Invalid difficulty: {}", value)),
        }
    }
}

/// Kind of content a level step carries. Only `Question` steps are scored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Question,
    Simulation,
    Text,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub id: i64,
    pub text: String,
    pub is_correct: bool,
    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub prompt: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub multi_select: bool,
    pub choices: Vec<Choice>,
}

impl Question {
    /// Ids of the correct choices in presentation order.
    pub fn correct_choice_ids(&self) -> Vec<i64> {
        self.choices
            .iter()
            .filter(|choice| choice.is_correct)
            .map(|choice| choice.id)
            .collect()
    }

    /// A playable question has at least two choices and at least one correct one.
    pub fn is_well_formed(&self) -> bool {
        self.choices.len() >= 2 && self.choices.iter().any(|choice| choice.is_correct)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelStep {
    pub id: i64,
    pub order: i32,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<i64>,
}

impl LevelStep {
    pub fn is_question(&self) -> bool {
        self.kind == StepKind::Question && self.question_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Level {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub topic: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub reward_points: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Ordered by `LevelStep::order`.
    #[serde(default)]
    pub steps: Vec<LevelStep>,
}

fn default_active() -> bool {
    true
}

impl Level {
    pub fn question_steps(&self) -> impl Iterator<Item = &LevelStep> {
        self.steps.iter().filter(|step| step.is_question())
    }

    /// Distinct questions the level asks. A question repeated across steps
    /// is asked and scored once.
    pub fn question_count(&self) -> usize {
        self.question_steps()
            .filter_map(|step| step.question_id)
            .collect::<HashSet<_>>()
            .len()
    }

    /// First question referenced by more than one question step.
    pub fn repeated_question(&self) -> Option<i64> {
        let mut seen = HashSet::new();
        self.question_steps()
            .filter_map(|step| step.question_id)
            .find(|question_id| !seen.insert(*question_id))
    }

    pub fn step_for_question(&self, question_id: i64) -> Option<&LevelStep> {
        self.question_steps()
            .find(|step| step.question_id == Some(question_id))
    }

    /// Sorts steps by order and rejects duplicate order indexes.
    pub fn normalize_steps(&mut self) -> Result<(), String> {
        self.steps.sort_by_key(|step| step.order);
        for pair in self.steps.windows(2) {
            if pair[0].order == pair[1].order {
                return Err(format!(
                    "Level {} has duplicate step order {}",
                    self.id, pair[0].order
                ));
            }
        }
        Ok(())
    }
}

/// Client-facing question: never reveals which choices are correct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: i64,
    pub prompt: String,
    pub multi_select: bool,
    pub choices: Vec<ChoiceView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceView {
    pub id: i64,
    pub text: String,
}

impl From<&Question> for QuestionView {
    fn from(question: &Question) -> Self {
        let mut choices = question.choices.clone();
        choices.sort_by_key(|choice| choice.order);
        Self {
            id: question.id,
            prompt: question.prompt.clone(),
            multi_select: question.multi_select,
            choices: choices
                .into_iter()
                .map(|choice| ChoiceView {
                    id: choice.id,
                    text: choice.text,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LevelSummary {
    pub id: i64,
    pub title: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub reward_points: i64,
    pub question_count: usize,
}

impl From<&Level> for LevelSummary {
    fn from(level: &Level) -> Self {
        Self {
            id: level.id,
            title: level.title.clone(),
            topic: level.topic.clone(),
            difficulty: level.difficulty,
            reward_points: level.reward_points,
            question_count: level.question_count(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LevelStepView {
    pub id: i64,
    pub order: i32,
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
}

#[derive(Debug, Serialize)]
pub struct LevelDetail {
    #[serde(flatten)]
    pub summary: LevelSummary,
    pub steps: Vec<LevelStepView>,
}

#[derive(Debug, Deserialize)]
pub struct ListLevelsQuery {
    pub difficulty: Option<String>,
    pub topic: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LevelAvailabilityResponse {
    pub level_id: i64,
    pub available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: i64, order: i32, kind: StepKind, question_id: Option<i64>) -> LevelStep {
        LevelStep {
            id,
            order,
            kind,
            title: String::new(),
            payload: None,
            question_id,
        }
    }

    #[test]
    fn only_question_steps_with_a_question_are_counted() {
        let level = Level {
            id: 1,
            title: "Budgeting".to_string(),
            topic: "basics".to_string(),
            difficulty: Difficulty::Easy,
            reward_points: 10,
            is_active: true,
            steps: vec![
                step(1, 1, StepKind::Text, None),
                step(2, 2, StepKind::Question, Some(11)),
                step(3, 3, StepKind::Question, None),
                step(4, 4, StepKind::Question, Some(12)),
            ],
        };

        assert_eq!(level.question_count(), 2);
        assert_eq!(level.step_for_question(12).map(|s| s.id), Some(4));
        assert!(level.step_for_question(99).is_none());
    }

    #[test]
    fn repeated_questions_are_counted_once() {
        let level = Level {
            id: 2,
            title: "Review".to_string(),
            topic: "basics".to_string(),
            difficulty: Difficulty::Easy,
            reward_points: 10,
            is_active: true,
            steps: vec![
                step(1, 1, StepKind::Question, Some(11)),
                step(2, 2, StepKind::Question, Some(12)),
                step(3, 3, StepKind::Question, Some(11)),
            ],
        };

        assert_eq!(level.question_count(), 2);
        assert_eq!(level.repeated_question(), Some(11));
    }

    #[test]
    fn normalize_steps_rejects_duplicate_order() {
        let mut level = Level {
            id: 7,
            title: "Dupes".to_string(),
            topic: String::new(),
            difficulty: Difficulty::Hard,
            reward_points: 0,
            is_active: true,
            steps: vec![
                step(1, 2, StepKind::Text, None),
                step(2, 1, StepKind::Text, None),
                step(3, 2, StepKind::Text, None),
            ],
        };

        assert!(level.normalize_steps().is_err());
    }

    #[test]
    fn unknown_step_types_deserialize_as_other() {
        let step: LevelStep =
            serde_json::from_str(r#"{"id":1,"order":1,"type":"video"}"#).unwrap();
        assert_eq!(step.kind, StepKind::Other);
    }

    #[test]
    fn question_view_hides_correctness() {
        let question = Question {
            id: 5,
            prompt: "Pick one".to_string(),
            explanation: "Because".to_string(),
            multi_select: false,
            choices: vec![
                Choice {
                    id: 2,
                    text: "B".to_string(),
                    is_correct: true,
                    order: 2,
                },
                Choice {
                    id: 1,
                    text: "A".to_string(),
                    is_correct: false,
                    order: 1,
                },
            ],
        };

        let view = QuestionView::from(&question);
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.to_string().find("is_correct").is_none());
        assert_eq!(view.choices[0].id, 1);
        assert_eq!(question.correct_choice_ids(), vec![2]);
    }
}
