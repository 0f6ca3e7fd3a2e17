//! CortexAI backend client and error types.

use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::http::{add_bearer_token, add_extra_headers, api_error, build_http_client};
use crate::model::{
    AuthResponse, ChatRequest, ChatResponse, Conversation, Health, ImageGeneration, ModelList,
    User,
};
use crate::options::{SecretString, TransportOptions};
use crate::stream::{decode, StreamError, StreamHandler};

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Non-success status; `message` comes from the body's `error` field.
    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Message suitable for showing to a user.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Async client for the CortexAI REST and streaming API.
///
/// # Example
/// ```no_run
/// use cortexai::client::CortexClient;
/// use cortexai::model::ChatRequest;
/// use cortexai::options::TransportOptions;
/// use cortexai::stream::Callbacks;
///
/// # async fn run() -> Result<(), cortexai::ClientError> {
/// let mut client = CortexClient::new(TransportOptions::new("http://localhost:5000"))?;
/// client.login("ada@example.com", "hunter2").await?;
///
/// let mut callbacks = Callbacks::new().with_content(|delta| print!("{}", delta));
/// let reply = client
///     .stream_message(&ChatRequest::new("Hello!"), &mut callbacks)
///     .await?;
/// println!("\n{}", reply);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CortexClient {
    http: reqwest::Client,
    options: TransportOptions,
}

impl CortexClient {
    /// Create a client from transport options.
    pub fn new(options: TransportOptions) -> Result<Self, ClientError> {
        if !(options.base_url.starts_with("http://") || options.base_url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base URL must start with http:// or https://, got {:?}",
                options.base_url
            )));
        }
        if options.stream_timeout.is_zero() {
            return Err(ClientError::Config(
                "stream timeout must be greater than zero".to_string(),
            ));
        }

        let http = build_http_client(&options)?;
        Ok(Self { http, options })
    }

    /// Create a client configured from the environment.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(TransportOptions::from_env())
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Bearer token currently in use.
    pub fn token(&self) -> Option<&SecretString> {
        self.options.token.as_ref()
    }

    pub fn set_token(&mut self, token: Option<SecretString>) {
        self.options.token = token;
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self
            .http
            .request(method, self.options.url(path))
            .header(CONTENT_TYPE, "application/json");

        req = add_bearer_token(req, self.options.token.as_ref());
        add_extra_headers(req, &self.options.extra_headers)
    }

    /// Request bounded by the plain request timeout.
    fn call(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.request(method, path);
        match self.options.timeout {
            Some(timeout) => req.timeout(timeout),
            None => req,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        req: RequestBuilder,
        fallback: &str,
    ) -> Result<T, ClientError> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(api_error(status, &body, fallback));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_empty(req: RequestBuilder, fallback: &str) -> Result<(), ClientError> {
        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body, fallback));
        }
        Ok(())
    }

    // --- Authentication ---

    /// Register a new account and keep its token.
    pub async fn register(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<AuthResponse, ClientError> {
        let body = RegisterRequest {
            username,
            email,
            password,
            full_name,
        };
        let auth: AuthResponse = Self::send_json(
            self.call(Method::POST, "/auth/register").json(&body),
            "Registration failed",
        )
        .await?;
        self.set_token(Some(auth.token.clone().into()));
        Ok(auth)
    }

    /// Log in with email and password and keep the returned token.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let body = LoginRequest { email, password };
        let auth: AuthResponse = Self::send_json(
            self.call(Method::POST, "/auth/login").json(&body),
            "Login failed",
        )
        .await?;
        self.set_token(Some(auth.token.clone().into()));
        Ok(auth)
    }

    /// Log in with a Google ID token credential and keep the returned token.
    pub async fn google_login(&mut self, credential: &str) -> Result<AuthResponse, ClientError> {
        let body = GoogleLoginRequest { credential };
        let auth: AuthResponse = Self::send_json(
            self.call(Method::POST, "/auth/google").json(&body),
            "Google login failed",
        )
        .await?;
        self.set_token(Some(auth.token.clone().into()));
        Ok(auth)
    }

    /// End the session on the backend and forget the token.
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        Self::send_empty(self.call(Method::POST, "/auth/logout"), "Logout failed").await?;
        self.set_token(None);
        Ok(())
    }

    pub async fn current_user(&self) -> Result<User, ClientError> {
        let envelope: UserEnvelope =
            Self::send_json(self.call(Method::GET, "/auth/me"), "Failed to get user info").await?;
        Ok(envelope.user)
    }

    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ClientError> {
        let body = ChangePasswordRequest {
            old_password,
            new_password,
        };
        Self::send_empty(
            self.call(Method::POST, "/auth/change-password").json(&body),
            "Failed to change password",
        )
        .await
    }

    /// Ask the backend to send a reset email. Returns the backend's message.
    pub async fn forgot_password(&self, email: &str) -> Result<String, ClientError> {
        let body = ForgotPasswordRequest { email };
        let reply: MessageReply = Self::send_json(
            self.call(Method::POST, "/auth/forgot-password").json(&body),
            "Failed to send reset email",
        )
        .await?;
        Ok(reply.message)
    }

    // --- Chat ---

    /// Send a message and wait for the whole reply.
    pub async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let body = PlainChatRequest {
            message: &request.message,
            conversation_id: request.conversation_id.as_deref(),
            system_prompt: request.system_prompt.as_deref(),
        };
        Self::send_json(
            self.call(Method::POST, "/chat").json(&body),
            "Failed to send message",
        )
        .await
    }

    /// Send a message and decode the streamed reply.
    ///
    /// The configured stream timeout bounds the whole exchange, from sending
    /// the request to the terminal frame. `handler` receives exactly one
    /// `on_complete` or `on_error`, including for failures that happen before
    /// the stream starts.
    pub async fn stream_message<H>(
        &self,
        request: &ChatRequest,
        handler: &mut H,
    ) -> Result<String, ClientError>
    where
        H: StreamHandler + ?Sized,
    {
        let timeout = self.options.stream_timeout;
        let started = Instant::now();
        debug!(url = %self.options.url("/chat/stream"), "starting stream request");

        let opened = match tokio::time::timeout(timeout, self.open_stream(request)).await {
            Ok(opened) => opened,
            Err(_) => Err(StreamError::Timeout.into()),
        };
        let response = match opened {
            Ok(response) => response,
            Err(err) => {
                handler.on_error(&err.user_message());
                return Err(err);
            }
        };
        debug!(status = %response.status(), "stream response received");

        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            let err = StreamError::Timeout;
            handler.on_error(&err.to_string());
            return Err(err.into());
        }

        let text = decode(response.bytes_stream(), remaining, handler).await?;
        Ok(text)
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<reqwest::Response, ClientError> {
        let response = self
            .request(Method::POST, "/chat/stream")
            .json(request)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body, "Failed to stream message"));
        }
        Ok(response)
    }

    // --- Conversations ---

    /// List the user's conversations. A reply without a list counts as empty.
    pub async fn conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        let list: ConversationList = Self::send_json(
            self.call(Method::GET, "/conversations"),
            "Failed to get conversations",
        )
        .await?;
        Ok(list.conversations)
    }

    /// Fetch one conversation with its messages.
    pub async fn conversation(&self, conversation_id: &str) -> Result<Conversation, ClientError> {
        Self::send_json(
            self.call(Method::GET, &format!("/conversations/{}", conversation_id)),
            "Failed to get conversation",
        )
        .await
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ClientError> {
        Self::send_empty(
            self.call(Method::DELETE, &format!("/conversations/{}", conversation_id)),
            "Failed to delete conversation",
        )
        .await
    }

    /// Create a conversation and return its id.
    pub async fn create_conversation(&self, title: Option<&str>) -> Result<String, ClientError> {
        let body = NewConversationRequest { title };
        let created: CreatedConversation = Self::send_json(
            self.call(Method::POST, "/conversations/new").json(&body),
            "Failed to create conversation",
        )
        .await?;
        Ok(created.conversation_id)
    }

    /// Remove every message of a conversation, keeping the conversation.
    pub async fn clear_conversation(&self, conversation_id: &str) -> Result<(), ClientError> {
        Self::send_empty(
            self.call(
                Method::POST,
                &format!("/conversations/{}/clear", conversation_id),
            ),
            "Failed to clear conversation",
        )
        .await
    }

    // --- Models, images, health ---

    pub async fn models(&self) -> Result<ModelList, ClientError> {
        Self::send_json(self.call(Method::GET, "/models"), "Failed to get models").await
    }

    pub async fn generate_image(&self, prompt: &str) -> Result<ImageGeneration, ClientError> {
        let body = ImagePrompt { prompt };
        Self::send_json(
            self.call(Method::POST, "/generate-image").json(&body),
            "Failed to generate image",
        )
        .await
    }

    pub async fn health(&self) -> Result<Health, ClientError> {
        Self::send_json(self.call(Method::GET, "/health"), "Health check failed").await
    }

    /// Timeout applied to streamed replies.
    pub fn stream_timeout(&self) -> Duration {
        self.options.stream_timeout
    }
}

// --- Request/Response bodies ---

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct GoogleLoginRequest<'a> {
    credential: &'a str,
}

#[derive(Debug, Serialize)]
struct ChangePasswordRequest<'a> {
    old_password: &'a str,
    new_password: &'a str,
}

#[derive(Debug, Serialize)]
struct ForgotPasswordRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct PlainChatRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_prompt: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct NewConversationRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ImagePrompt<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Debug, Deserialize)]
struct MessageReply {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ConversationList {
    #[serde(default)]
    conversations: Vec<Conversation>,
}

#[derive(Debug, Deserialize)]
struct CreatedConversation {
    conversation_id: String,
}
