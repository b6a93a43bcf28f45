// src/utils/json.rs

//! Recovery of quiz JSON from imperfect model output.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};

/// First ```` ```json { ... } ``` ```` block in free text.
static FENCED_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:json)?\s*(\{[\s\S]*?\})\s*```").expect("fenced JSON pattern is valid")
});

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ModelOutputError {
    #[error("No valid JSON found in model response")]
    NoJson,

    #[error("Could not parse JSON from fenced block: {0}")]
    MalformedFence(String),

    #[error("Model response is not a JSON object")]
    NotAnObject,

    #[error("Model response has no quiz or questions")]
    MissingQuiz,
}

/// Parses the raw message content, falling back to the first fenced object.
pub fn parse_model_json(raw: &str) -> Result<Value, ModelOutputError> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return Ok(value);
    }

    tracing::warn!(
        preview = %raw.chars().take(200).collect::<String>(),
        "Model response is not plain JSON, looking for a fenced block"
    );
    let captures = FENCED_OBJECT.captures(raw).ok_or(ModelOutputError::NoJson)?;
    serde_json::from_str(&captures[1]).map_err(|e| ModelOutputError::MalformedFence(e.to_string()))
}

/// Returns the quiz object, tolerating the common near-miss shapes:
/// a bare object with `questions`, or a bare array of questions.
pub fn unwrap_quiz(value: Value) -> Result<Value, ModelOutputError> {
    match value {
        Value::Array(questions) => Ok(json!({ "title": "Generated Quiz", "questions": questions })),
        Value::Object(mut map) => {
            if let Some(quiz) = map.remove("quiz") {
                return if quiz.is_object() {
                    Ok(quiz)
                } else {
                    Err(ModelOutputError::NotAnObject)
                };
            }
            if map.get("questions").is_some_and(Value::is_array) {
                return Ok(Value::Object(map));
            }
            Err(ModelOutputError::MissingQuiz)
        }
        _ => Err(ModelOutputError::NotAnObject),
    }
}
