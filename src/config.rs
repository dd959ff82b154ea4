use anyhow::{Context, Result};
use std::env;

/// Runtime configuration, read once at startup. Required variables fail
/// fast with the variable name in the error.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_redirect_uri: String,
    pub encryption_key: [u8; 32],
    pub access_token_secret: String,
    pub access_token_audience: String,
    pub access_token_issuer: String,
    pub ai_api_key: String,
    pub ai_api_base: String,
    pub ai_embedding_model: String,
    pub ai_chat_model: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let encryption_key_hex = required("ENCRYPTION_KEY")?;
        let raw = hex::decode(encryption_key_hex.trim())
            .context("ENCRYPTION_KEY must be hex encoded")?;
        let encryption_key: [u8; 32] = raw
            .try_into()
            .map_err(|_| anyhow::anyhow!("ENCRYPTION_KEY must be 64 hex characters (32 bytes)"))?;

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://mailboard.db".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            google_client_id: required("GOOGLE_CLIENT_ID")?,
            google_client_secret: required("GOOGLE_CLIENT_SECRET")?,
            google_redirect_uri: required("GOOGLE_REDIRECT_URI")?,
            encryption_key,
            access_token_secret: required("ACCESS_TOKEN_SECRET")?,
            access_token_audience: env::var("ACCESS_TOKEN_AUDIENCE")
                .unwrap_or_else(|_| "mailboard".into()),
            access_token_issuer: env::var("ACCESS_TOKEN_ISSUER")
                .unwrap_or_else(|_| "mailboard".into()),
            ai_api_key: required("AI_API_KEY")?,
            ai_api_base: env::var("AI_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            ai_embedding_model: env::var("AI_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".into()),
            ai_chat_model: env::var("AI_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
        })
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{name} must be set"))
}
