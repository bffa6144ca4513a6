use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::OracleSettings;
use crate::error::OracleError;
use crate::services::oracle_service::{ChatMessage, PlanningOracle};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Planning oracle backed by the Anthropic Messages API.
pub struct ClaudeOracle {
    client: reqwest::Client,
    api_key: String,
    settings: OracleSettings,
}

impl ClaudeOracle {
    pub fn new(api_key: impl Into<String>, settings: OracleSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            settings,
        }
    }

    /// Reads the key from the environment variable named in the settings.
    pub fn from_settings(settings: &OracleSettings) -> Result<Self, OracleError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| OracleError::MissingApiKey(settings.api_key_env.clone()))?;
        Ok(Self::new(api_key, settings.clone()))
    }
}

#[async_trait]
impl PlanningOracle for ClaudeOracle {
    async fn complete(&self, transcript: &[ChatMessage]) -> Result<String, OracleError> {
        let body = build_request_body(&self.settings, transcript);

        let response = self
            .client
            .post(&self.settings.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_context_overflow_message(&body) {
                return Err(OracleError::ContextOverflow(body));
            }
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| OracleError::Request(format!("invalid response body: {e}")))?;
        let text = extract_text(&json).ok_or(OracleError::EmptyResponse)?;

        tracing::debug!(
            chars = text.len(),
            preview = %text.chars().take(300).collect::<String>(),
            "claude response"
        );
        Ok(text)
    }
}

/// System turns become the top-level `system` field. The API requires the
/// first message to come from the user, so assistant turns left at the front
/// by compaction or window trimming are carried in `system` as earlier context.
pub fn build_request_body(settings: &OracleSettings, transcript: &[ChatMessage]) -> Value {
    let mut system: Vec<String> = transcript
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| m.content.clone())
        .collect();

    let turns: Vec<&ChatMessage> = transcript.iter().filter(|m| m.role != "system").collect();
    let leading = turns.iter().take_while(|m| m.role == "assistant").count();
    if leading > 0 {
        let earlier = turns[..leading]
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        system.push(format!("Your previous reply in this session:\n{earlier}"));
    }

    let messages: Vec<Value> = turns[leading..]
        .iter()
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();

    let mut body = json!({
        "model": settings.model,
        "max_tokens": settings.max_tokens,
        "temperature": settings.temperature,
        "messages": messages,
    });
    if !system.is_empty() {
        body["system"] = Value::String(system.join("\n\n"));
    }
    body
}

pub fn extract_text(response: &Value) -> Option<String> {
    let text = response["content"]
        .as_array()?
        .iter()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

pub fn is_context_overflow_message(body: &str) -> bool {
    let lowered = body.to_lowercase();
    lowered.contains("prompt is too long")
        || (lowered.contains("context")
            && (lowered.contains("exceed") || lowered.contains("too long")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::oracle_service::OracleGateway;
    use std::sync::{Arc, Mutex};

    #[test]
    fn request_body_hoists_system_and_keeps_leading_assistant_as_context() {
        let transcript = vec![
            ChatMessage::system("organize files"),
            ChatMessage::assistant("previous answer"),
            ChatMessage::user("File: a.txt"),
        ];
        let body = build_request_body(&OracleSettings::default(), &transcript);

        let system = body["system"].as_str().unwrap();
        assert!(system.starts_with("organize files"));
        assert!(system.contains("previous answer"));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "File: a.txt");
        assert_eq!(body["model"], OracleSettings::default().model);
    }

    #[tokio::test]
    async fn compacted_session_keeps_retained_reply_in_request() {
        struct Recorder {
            bodies: Mutex<Vec<Value>>,
        }

        #[async_trait]
        impl PlanningOracle for Recorder {
            async fn complete(&self, transcript: &[ChatMessage]) -> Result<String, OracleError> {
                let body = build_request_body(&OracleSettings::default(), transcript);
                let mut bodies = self.bodies.lock().unwrap();
                bodies.push(body);
                match bodies.len() {
                    1 => Ok("EARLIER-CONTEXT".to_string()),
                    2 => Err(OracleError::ContextOverflow("prompt is too long".to_string())),
                    _ => Ok("[]".to_string()),
                }
            }
        }

        let recorder = Arc::new(Recorder {
            bodies: Mutex::new(Vec::new()),
        });
        let gateway = OracleGateway::new(recorder.clone(), "instructions", 40);
        gateway.respond("first").await.unwrap();
        gateway.respond("second").await.unwrap();

        let bodies = recorder.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 3);
        let retry = &bodies[2];
        assert!(retry["system"].as_str().unwrap().contains("EARLIER-CONTEXT"));
        let messages = retry["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "second");
    }

    #[test]
    fn extract_text_joins_text_blocks() {
        let response = json!({
            "content": [
                {"type": "text", "text": "[{\"action\":"},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "\"move_file\"}]"}
            ]
        });
        assert_eq!(
            extract_text(&response).unwrap(),
            "[{\"action\":\"move_file\"}]"
        );
        assert_eq!(extract_text(&json!({"content": []})), None);
        assert_eq!(extract_text(&json!({"error": "x"})), None);
    }

    #[test]
    fn overflow_messages_are_recognized() {
        assert!(is_context_overflow_message(
            r#"{"type":"error","error":{"type":"invalid_request_error","message":"prompt is too long: 210000 tokens > 200000 maximum"}}"#
        ));
        assert!(is_context_overflow_message("input exceeds the context window"));
        assert!(!is_context_overflow_message("rate limit exceeded"));
    }

    #[test]
    fn missing_key_is_reported_with_variable_name() {
        let settings = OracleSettings {
            api_key_env: "TIDYFOLD_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..OracleSettings::default()
        };
        let err = ClaudeOracle::from_settings(&settings).err().unwrap();
        assert_eq!(
            err,
            OracleError::MissingApiKey("TIDYFOLD_TEST_KEY_THAT_IS_NOT_SET".to_string())
        );
    }
}
