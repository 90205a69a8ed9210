//! Language model seam.
//!
//! Provider replies are decoded once into [`ModelReply`]; nothing downstream
//! inspects provider wire types. Tool arguments stay as the raw JSON the
//! provider sent and are normalized by [`ToolArguments::normalize`] at the
//! orchestrator boundary.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{tools::ToolDeclaration, LlmError};

pub mod gemini;

pub use gemini::GeminiClient;

// ---

/// One generation request.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
    /// Empty means plain generation; otherwise the model may propose a call.
    pub tools: Vec<ToolDeclaration>,
}

/// Decoded model output.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// Natural-language answer, no tool requested.
    Direct(String),
    /// The model wants exactly one tool run.
    ToolProposed {
        name: String,
        arguments: Value,
        partial_text: Option<String>,
    },
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<ModelReply, LlmError>;
}

/// Canonical argument mapping for a tool invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    /// Accept a JSON object, a string holding a serialized object, or null.
    pub fn normalize(raw: Value) -> Result<Self, String> {
        // ---
        match raw {
            Value::Object(map) => Ok(ToolArguments(map)),
            Value::Null => Ok(ToolArguments::default()),
            Value::String(s) if s.trim().is_empty() => Ok(ToolArguments::default()),
            Value::String(s) => match serde_json::from_str::<Value>(&s) {
                Ok(Value::Object(map)) => Ok(ToolArguments(map)),
                Ok(other) => Err(format!("expected an object, got {}", other)),
                Err(e) => Err(format!("arguments are not valid JSON: {}", e)),
            },
            other => Err(format!("expected an object, got {}", other)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    // ---
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use super::*;

    /// Language model that replays scripted replies and records prompts.
    #[derive(Clone, Default)]
    pub struct ScriptedModel {
        replies: Arc<Mutex<VecDeque<Result<ModelReply, LlmError>>>>,
        prompts: Arc<Mutex<Vec<Prompt>>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<Result<ModelReply, LlmError>>) -> Self {
            ScriptedModel {
                replies: Arc::new(Mutex::new(replies.into())),
                prompts: Arc::default(),
            }
        }

        pub fn prompts(&self) -> Vec<Prompt> {
            self.prompts.lock().unwrap().clone()
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, prompt: &Prompt) -> Result<ModelReply, LlmError> {
            self.prompts.lock().unwrap().push(prompt.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::Empty))
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_and_string_arguments_normalize_alike() {
        // ---
        let native = ToolArguments::normalize(json!({"hours": 48})).unwrap();
        let encoded = ToolArguments::normalize(json!("{\"hours\": 48}")).unwrap();
        assert_eq!(native, encoded);
        assert_eq!(native.get("hours"), Some(&json!(48)));
    }

    #[test]
    fn test_missing_arguments_are_empty() {
        // ---
        assert_eq!(
            ToolArguments::normalize(Value::Null).unwrap(),
            ToolArguments::default()
        );
        assert_eq!(
            ToolArguments::normalize(json!("")).unwrap(),
            ToolArguments::default()
        );
    }

    #[test]
    fn test_non_object_arguments_are_rejected() {
        // ---
        assert!(ToolArguments::normalize(json!([1, 2])).is_err());
        assert!(ToolArguments::normalize(json!("[1, 2]")).is_err());
        assert!(ToolArguments::normalize(json!("{not json")).is_err());
    }
}
