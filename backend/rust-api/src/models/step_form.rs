use serde::Deserialize;
use std::collections::HashMap;

/// Raw step submission, bound straight from the POST body. Values are kept
/// as JSON until the engine coerces them against each question's declared
/// kind; entries for questions outside the posted step are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct StepForm {
    #[serde(default)]
    pub answers: HashMap<String, serde_json::Value>,
}
