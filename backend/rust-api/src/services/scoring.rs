use serde::Serialize;

use crate::models::{Answer, AnswerValue, Question, Questionnaire};

/// Exact-set-match scoring: the full points when the selected option ids
/// equal the correct set, zero otherwise. No partial credit.
pub fn score_answer(question: &Question, selected_ids: &[i64]) -> Option<i32> {
    if !question.is_scoreable() {
        return None;
    }

    let mut selected: Vec<i64> = selected_ids.to_vec();
    selected.sort_unstable();
    selected.dedup();

    if selected == question.correct_option_ids() {
        Some(question.max_points())
    } else {
        Some(0)
    }
}

/// Aggregate score over a submission's answers, computed lazily when the
/// report view asks for it.
#[derive(Debug, Serialize, PartialEq)]
pub struct ScoreSummary {
    pub earned: i32,
    pub possible: i32,
    pub percentage: f64,
}

pub fn aggregate_score(questionnaire: &Questionnaire, answers: &[Answer]) -> Option<ScoreSummary> {
    let scoreable: Vec<&Question> = questionnaire
        .steps
        .iter()
        .flat_map(|step| step.questions.iter())
        .filter(|question| question.is_scoreable())
        .collect();

    if scoreable.is_empty() {
        return None;
    }

    let possible: i32 = scoreable.iter().map(|question| question.max_points()).sum();
    let earned: i32 = answers
        .iter()
        .filter(|answer| matches!(answer.value, AnswerValue::Choices(_)))
        .filter_map(|answer| answer.points_earned)
        .sum();

    let percentage = if possible > 0 {
        (earned as f64 / possible as f64) * 100.0
    } else {
        0.0
    };

    Some(ScoreSummary {
        earned,
        possible,
        percentage,
    })
}
