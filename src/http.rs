//! HTTP client utilities for talking to the CortexAI backend.
//!
//! This module provides reqwest client construction, request decoration
//! and mapping of error bodies.

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;

use crate::client::ClientError;
use crate::options::{SecretString, TransportOptions};

/// Build a configured HTTP client from transport options.
///
/// This applies the proxy. The request timeout is not set on the client
/// itself because it would also cut long streamed replies; callers apply it
/// per request instead.
pub fn build_http_client(transport_options: &TransportOptions) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();

    if let Some(proxy_url) = &transport_options.proxy {
        if let Ok(proxy) = reqwest::Proxy::all(proxy_url) {
            builder = builder.proxy(proxy);
        }
    }

    builder.build()
}

/// Add extra headers to a request if specified in transport options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// Add a bearer `Authorization` header when a token is present.
pub fn add_bearer_token(request: RequestBuilder, token: Option<&SecretString>) -> RequestBuilder {
    match token {
        Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret())),
        None => request,
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Map a non-success response body to a [`ClientError::Api`].
///
/// Uses the body's `error` field when present, `fallback` otherwise.
pub fn api_error(status: StatusCode, body: &str, fallback: &str) -> ClientError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| fallback.to_string());

    ClientError::Api {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&TransportOptions::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_build_http_client_with_proxy() {
        let transport_options =
            TransportOptions::default().with_proxy("http://proxy.example.com:8080".to_string());

        let client = build_http_client(&transport_options);
        assert!(client.is_ok());
    }

    #[test]
    fn test_bearer_token_header() {
        let client = Client::new();
        let token = SecretString::from("abc");
        let request = add_bearer_token(client.get("http://localhost/auth/me"), Some(&token))
            .build()
            .unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer abc");

        let request = add_bearer_token(client.get("http://localhost/auth/me"), None)
            .build()
            .unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_api_error_uses_body_message() {
        let err = api_error(StatusCode::UNAUTHORIZED, r#"{"error":"Invalid token"}"#, "Login failed");
        assert!(matches!(
            err,
            ClientError::Api { status: 401, ref message } if message == "Invalid token"
        ));
    }

    #[test]
    fn test_api_error_falls_back() {
        let err = api_error(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>", "Login failed");
        assert!(matches!(
            err,
            ClientError::Api { status: 502, ref message } if message == "Login failed"
        ));

        let err = api_error(StatusCode::BAD_REQUEST, r#"{"message":"nope"}"#, "Login failed");
        assert_eq!(err.to_string(), "Login failed (HTTP 400)");
    }
}
