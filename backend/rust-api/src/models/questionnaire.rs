use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    MultipleChoice,
    Text,
    Number,
    Date,
    FileUpload,
}

impl QuestionKind {
    /// Stable label used for the answers-recorded metric.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::SingleChoice => "single_choice",
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::Text => "text",
            QuestionKind::Number => "number",
            QuestionKind::Date => "date",
            QuestionKind::FileUpload => "file_upload",
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self, QuestionKind::SingleChoice | QuestionKind::MultipleChoice)
    }
}

/// One selectable option of a choice question. Option ids are numeric and
/// unique within their question; `correct` marks membership in the
/// correct-answer set and is never exposed to respondents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: i64,
    pub label: String,
    #[serde(default)]
    pub correct: bool,
}

/// Upload constraints for file questions. An empty extension list means any
/// extension is accepted; extension matching is case-sensitive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileRules {
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub max_size_bytes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub label: String,
    pub kind: QuestionKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub points: Option<i32>,
    #[serde(default)]
    pub options: Vec<ChoiceOption>,
    #[serde(default)]
    pub file_rules: Option<FileRules>,
}

impl Question {
    pub fn has_choices(&self) -> bool {
        self.kind.is_choice() && !self.options.is_empty()
    }

    pub fn has_correct_answers(&self) -> bool {
        self.options.iter().any(|option| option.correct)
    }

    /// Sorted, deduplicated ids of the options flagged correct.
    pub fn correct_option_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .options
            .iter()
            .filter(|option| option.correct)
            .map(|option| option.id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn max_points(&self) -> i32 {
        self.points.unwrap_or(0)
    }

    pub fn is_scoreable(&self) -> bool {
        self.has_choices() && self.has_correct_answers()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireStep {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub questions: Vec<Question>,
}

/// A form definition: ordered steps of questions. The step list is treated
/// as immutable for the lifetime of any submission created against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Questionnaire {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    /// When false, a respondent requesting a step beyond the one they have
    /// reached is sent back to their current step instead.
    #[serde(default = "default_true")]
    pub allow_step_jump: bool,
    pub steps: Vec<QuestionnaireStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Questionnaire {
    pub fn total_steps(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Step lookup by 1-based number.
    pub fn step(&self, number: u32) -> Option<&QuestionnaireStep> {
        if number == 0 {
            return None;
        }
        self.steps.get((number - 1) as usize)
    }

    pub fn find_question(&self, question_id: &str) -> Option<&Question> {
        self.steps
            .iter()
            .flat_map(|step| step.questions.iter())
            .find(|question| question.id == question_id)
    }
}

/// Respondent-facing projection of an option. Never carries the correct flag.
#[derive(Debug, Serialize)]
pub struct OptionView {
    pub id: i64,
    pub label: String,
}

#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub label: String,
    pub kind: QuestionKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_rules: Option<FileRules>,
}

impl QuestionView {
    pub fn from_question(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            label: question.label.clone(),
            kind: question.kind,
            required: question.required,
            options: question
                .options
                .iter()
                .map(|option| OptionView {
                    id: option.id,
                    label: option.label.clone(),
                })
                .collect(),
            file_rules: question.file_rules.clone(),
        }
    }
}
