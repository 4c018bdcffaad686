pub mod answer;
pub mod questionnaire;
pub mod step_form;
pub mod submission;

pub use answer::{Answer, AnswerValue};
pub use questionnaire::{
    ChoiceOption, FileRules, OptionView, Question, QuestionKind, QuestionView, Questionnaire,
    QuestionnaireStep,
};
pub use step_form::StepForm;
pub use submission::{ClientContext, Submission, SubmissionStatus};
