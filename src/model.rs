//! Data models for the CortexAI backend: stream events and REST payloads.

use serde::{Deserialize, Serialize};

/// A decoded event from the `/chat/stream` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text delta.
    Content { text: String },

    /// Generated image payload (base64 data or URI).
    Image { data: String },

    /// Successful completion. A non-empty `final_text` replaces the
    /// locally accumulated text.
    End { final_text: Option<String> },

    /// Server-reported failure.
    Error { message: String },
}

/// Transcript marker for a generated image.
///
/// # Example
/// ```
/// use cortexai::model::image_marker;
///
/// assert_eq!(image_marker("abc"), "\n\n![Generated Image](abc)\n\n");
/// ```
pub fn image_marker(data: &str) -> String {
    format!("\n\n![Generated Image]({})\n\n", data)
}

/// Role of a stored conversation message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Assistant,
}

/// A message stored in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

/// Conversation summary, or a full conversation when `messages` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
}

/// Authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

/// Response of the register, login and Google login endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: User,
    pub token: String,
}

/// Non-streaming chat reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub message: String,
    pub timestamp: String,
    pub model: String,
}

/// Parameters of a chat request, shared by `/chat` and `/chat/stream`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ChatRequest {
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Model name; only honored by the streaming endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Attached image (base64 data URI); only honored by the streaming endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ChatRequest {
    /// Create a request carrying only the message text.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Continue an existing conversation.
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Select the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Attach an image.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// A model offered by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: String,
    pub description: String,
}

/// Response of `GET /models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<ModelInfo>,
    pub current_model: String,
}

/// Response of `POST /generate-image`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGeneration {
    pub success: bool,
    /// Base64 encoded image.
    pub image: String,
    pub prompt: String,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub timestamp: String,
    pub api_configured: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_skips_unset_fields() {
        let request = ChatRequest::new("hi").with_model("gemini-2.5-flash");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"message": "hi", "model": "gemini-2.5-flash"})
        );
    }

    #[test]
    fn test_conversation_without_messages() {
        let conversation: Conversation = serde_json::from_str(
            r#"{"id":"c1","title":"Rust","created_at":"2024-01-01T00:00:00","message_count":4}"#,
        )
        .unwrap();
        assert_eq!(conversation.message_count, Some(4));
        assert!(conversation.messages.is_none());
    }

    #[test]
    fn test_message_roles() {
        let message: Message = serde_json::from_str(
            r#"{"role":"model","content":"hello","timestamp":"t"}"#,
        )
        .unwrap();
        assert_eq!(message.role, Role::Model);
        assert!(message.image.is_none());
    }
}
