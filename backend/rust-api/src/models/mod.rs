pub mod achievement;
pub mod attempt;
pub mod level;
pub mod profile;
pub mod reward;

pub use achievement::{Achievement, AchievementEvent, AchievementProgress, UserAchievement};
pub use attempt::{
    AnswerOutcome, AnswerPayload, Attempt, AttemptResult, AttemptStatus, AttemptStep,
    NewAttempt, NewAttemptStep, RewardInfo, WrongQuestion,
};
pub use level::{
    Choice, Difficulty, Level, LevelDetail, LevelStep, LevelStepView, LevelSummary, Question,
    QuestionView, StepKind,
};
pub use profile::{Profile, ProfileMeta, ProfileUpdate, StreakUpdate, UserStats};
pub use reward::{NewRewardTx, RewardTx, RewardTxType};
