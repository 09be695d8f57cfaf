use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::models::{
    Difficulty, Level, LevelDetail, LevelStepView, LevelSummary, Question, QuestionView,
};
use crate::repo::{AttemptRepo, LevelRepo, QuestionRepo, Repositories};
use crate::services::scoring::PASS_THRESHOLD;

/// Catalog reads plus the sequential gating rule.
pub struct LevelService {
    levels: Arc<dyn LevelRepo>,
    questions: Arc<dyn QuestionRepo>,
    attempts: Arc<dyn AttemptRepo>,
}

impl LevelService {
    pub fn new(repos: &Repositories) -> Self {
        Self {
            levels: repos.levels.clone(),
            questions: repos.questions.clone(),
            attempts: repos.attempts.clone(),
        }
    }

    pub async fn get_levels(&self) -> CoreResult<Vec<Level>> {
        Ok(self.levels.list_active().await?)
    }

    pub async fn get_levels_by_difficulty(&self, difficulty: Difficulty) -> CoreResult<Vec<Level>> {
        Ok(self.levels.list_by_difficulty(difficulty).await?)
    }

    pub async fn get_levels_by_topic(&self, topic: &str) -> CoreResult<Vec<Level>> {
        Ok(self.levels.list_by_topic(topic).await?)
    }

    /// Active levels, optionally narrowed by difficulty and/or topic.
    pub async fn list_levels(
        &self,
        difficulty: Option<Difficulty>,
        topic: Option<&str>,
    ) -> CoreResult<Vec<LevelSummary>> {
        let levels = match (difficulty, topic) {
            (Some(difficulty), topic) => self
                .get_levels_by_difficulty(difficulty)
                .await?
                .into_iter()
                .filter(|level| topic.map_or(true, |topic| level.topic == topic))
                .collect(),
            (None, Some(topic)) => self.get_levels_by_topic(topic).await?,
            (None, None) => self.get_levels().await?,
        };

        Ok(levels.iter().map(LevelSummary::from).collect())
    }

    /// Level record with ordered steps; inactive levels are returned too.
    pub async fn get_level(&self, level_id: i64) -> CoreResult<Level> {
        self.levels
            .get(level_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("level {}", level_id)))
    }

    /// Level with its steps and the nested questions, safe to hand to clients.
    pub async fn get_level_detail(&self, level_id: i64) -> CoreResult<LevelDetail> {
        let level = self.get_level(level_id).await?;
        if !level.is_active {
            return Err(CoreError::not_found(format!("level {}", level_id)));
        }

        let question_ids: Vec<i64> = level
            .question_steps()
            .filter_map(|step| step.question_id)
            .collect();
        let questions: HashMap<i64, Question> = self
            .questions
            .get_many(&question_ids)
            .await?
            .into_iter()
            .map(|question| (question.id, question))
            .collect();

        let steps = level
            .steps
            .iter()
            .map(|step| LevelStepView {
                id: step.id,
                order: step.order,
                kind: step.kind,
                title: step.title.clone(),
                payload: step.payload.clone(),
                question: step
                    .question_id
                    .and_then(|id| questions.get(&id))
                    .map(QuestionView::from),
            })
            .collect();

        Ok(LevelDetail {
            summary: LevelSummary::from(&level),
            steps,
        })
    }

    /// The first active level is always open; every other active level opens
    /// once the user has passed the active level right before it.
    pub async fn is_level_available(&self, level_id: i64, user_id: i64) -> CoreResult<bool> {
        let mut active = self.levels.list_active().await?;
        active.sort_by_key(|level| level.id);

        let idx = active
            .iter()
            .position(|level| level.id == level_id)
            .ok_or_else(|| CoreError::not_found(format!("level {}", level_id)))?;

        if idx == 0 {
            return Ok(true);
        }

        let previous = active[idx - 1].id;
        let attempts = self.attempts.list_for_user(user_id).await?;
        Ok(attempts
            .iter()
            .any(|attempt| attempt.level_id == previous && attempt.passed(PASS_THRESHOLD)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{pass_level, seed_catalog};

    #[tokio::test]
    async fn first_active_level_is_always_available() {
        let repos = seed_catalog().await;
        let service = LevelService::new(&repos);

        assert!(service.is_level_available(1, 42).await.unwrap());
        assert!(!service.is_level_available(2, 42).await.unwrap());
    }

    #[tokio::test]
    async fn passing_the_previous_level_unlocks_the_next() {
        let repos = seed_catalog().await;
        let service = LevelService::new(&repos);

        pass_level(&repos, 42, 1, 69).await;
        assert!(!service.is_level_available(2, 42).await.unwrap());

        pass_level(&repos, 42, 1, 70).await;
        assert!(service.is_level_available(2, 42).await.unwrap());

        // No look-back beyond one level, and no credit for other users.
        assert!(!service.is_level_available(3, 42).await.unwrap());
        assert!(!service.is_level_available(2, 7).await.unwrap());
    }

    #[tokio::test]
    async fn gating_skips_inactive_levels_in_between() {
        let repos = seed_catalog().await;
        let service = LevelService::new(&repos);

        let mut middle = service.get_level(2).await.unwrap();
        middle.is_active = false;
        repos.levels.upsert(&middle).await.unwrap();

        assert!(!service.is_level_available(3, 42).await.unwrap());

        pass_level(&repos, 42, 1, 70).await;
        assert!(service.is_level_available(3, 42).await.unwrap());
    }

    #[tokio::test]
    async fn inactive_levels_are_not_gated_but_missing() {
        let repos = seed_catalog().await;
        let service = LevelService::new(&repos);

        let err = service.is_level_available(4, 42).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        let err = service.is_level_available(999, 42).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn lists_filter_by_difficulty_and_topic() {
        let repos = seed_catalog().await;
        let service = LevelService::new(&repos);

        let all = service.list_levels(None, None).await.unwrap();
        assert_eq!(
            all.iter().map(|level| level.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let easy = service
            .list_levels(Some(Difficulty::Easy), None)
            .await
            .unwrap();
        assert!(easy.iter().all(|level| level.difficulty == Difficulty::Easy));

        let budgeting = service.list_levels(None, Some("budgeting")).await.unwrap();
        assert_eq!(budgeting.len(), 2);

        let none = service
            .list_levels(Some(Difficulty::Hard), Some("budgeting"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn level_detail_nests_questions_without_answers() {
        let repos = seed_catalog().await;
        let service = LevelService::new(&repos);

        let detail = service.get_level_detail(1).await.unwrap();
        assert_eq!(detail.summary.question_count, 2);
        assert_eq!(detail.steps.len(), 3);
        assert!(detail.steps[0].question.is_none());
        assert_eq!(detail.steps[1].question.as_ref().map(|q| q.id), Some(101));

        let json = serde_json::to_string(&detail).unwrap();
        assert!(!json.contains("is_correct"));

        assert!(service.get_level_detail(4).await.is_err());
    }
}
