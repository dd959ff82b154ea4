//! AI adapter: fixed-dimension embeddings and short summaries over an
//! OpenAI-compatible HTTP API.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::error::{Error, Result};

/// Width of the embedding column; anything else is an integrity failure.
pub const EMBEDDING_DIM: usize = 768;

/// First slice of the body used for embeddings.
const EMBED_CONTENT_CHARS: usize = 2000;

#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn summarize(&self, text: &str) -> Result<String>;
}

/// Canonical projection of a message for embedding generation.
pub fn embedding_input(
    subject: Option<&str>,
    from_name: Option<&str>,
    from_email: &str,
    body_text: Option<&str>,
) -> String {
    let from = from_name.filter(|n| !n.is_empty()).unwrap_or(from_email);
    let body = body_text.unwrap_or("");
    let content: String = body.chars().take(EMBED_CONTENT_CHARS).collect();
    format!(
        "Subject: {}\nFrom: {}\nContent: {}",
        subject.unwrap_or(""),
        from,
        content
    )
}

pub struct HttpAiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    embedding_model: String,
    chat_model: String,
}

impl HttpAiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .expect("reqwest client"),
            api_base: config.ai_api_base.trim_end_matches('/').to_string(),
            api_key: config.ai_api_key.clone(),
            embedding_model: config.ai_embedding_model.clone(),
            chat_model: config.ai_chat_model.clone(),
        }
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl AiProvider for HttpAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.api_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.embedding_model,
                "input": text,
                "dimensions": EMBEDDING_DIM,
            }))
            .send()
            .await
            .map_err(|e| Error::Ai(format!("embedding request: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Ai(format!(
                "embedding request failed: {}",
                response.status()
            )));
        }
        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Ai(format!("decode embedding response: {e}")))?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or_else(|| Error::Ai("embedding response was empty".into()))?;

        if vector.len() != EMBEDDING_DIM {
            return Err(Error::Integrity(format!(
                "embedding dimension mismatch: got {}, expected {EMBEDDING_DIM}",
                vector.len()
            )));
        }
        Ok(vector)
    }

    async fn summarize(&self, text: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.chat_model,
                "messages": [
                    {
                        "role": "system",
                        "content": "Summarize the email in two or three sentences. Mention deadlines and requested actions."
                    },
                    { "role": "user", "content": text }
                ],
            }))
            .send()
            .await
            .map_err(|e| Error::Ai(format!("summary request: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Ai(format!(
                "summary request failed: {}",
                response.status()
            )));
        }
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Ai(format!("decode summary response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| Error::Ai("summary response was empty".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_input_prefers_display_name() {
        let input = embedding_input(Some("Hi"), Some("Jo"), "jo@x.com", Some("body"));
        assert_eq!(input, "Subject: Hi\nFrom: Jo\nContent: body");
    }

    #[test]
    fn embedding_input_falls_back_to_address() {
        let input = embedding_input(None, None, "jo@x.com", None);
        assert_eq!(input, "Subject: \nFrom: jo@x.com\nContent: ");
    }

    #[test]
    fn embedding_input_truncates_body() {
        let body = "x".repeat(5000);
        let input = embedding_input(Some("s"), None, "a@b.c", Some(&body));
        let content = input.split("Content: ").nth(1).unwrap();
        assert_eq!(content.chars().count(), EMBED_CONTENT_CHARS);
    }
}
