use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::types::{PromptSettings, DEFAULT_MODEL, DEFAULT_ROLE, DEFAULT_TEMPERATURE};
use crate::util::normalize_base_url;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub role: String,
    pub connect_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url = std::env::var("STREAMCHAT_API_URL")
            .ok()
            .map(|v| normalize_base_url(&v))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let model = std::env::var("STREAMCHAT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let temperature = match std::env::var("STREAMCHAT_TEMPERATURE") {
            Ok(raw) => raw
                .trim()
                .parse::<f32>()
                .with_context(|| format!("Invalid STREAMCHAT_TEMPERATURE '{raw}'"))?,
            Err(_) => DEFAULT_TEMPERATURE,
        };
        let role = std::env::var("STREAMCHAT_ROLE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ROLE.to_string());
        let connect_timeout = match std::env::var("STREAMCHAT_CONNECT_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("Invalid STREAMCHAT_CONNECT_TIMEOUT_SECS '{raw}'"))?,
            ),
            Err(_) => Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self {
            api_url,
            model,
            temperature,
            role,
            connect_timeout,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid STREAMCHAT_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if self.model.trim().is_empty() {
            bail!("STREAMCHAT_MODEL must not be empty");
        }

        if !(0.0..=1.0).contains(&self.temperature) {
            bail!(
                "Invalid temperature {}: expected a value between 0.0 and 1.0",
                self.temperature
            );
        }

        if self.connect_timeout.is_zero() {
            bail!("STREAMCHAT_CONNECT_TIMEOUT_SECS must be greater than zero");
        }

        Ok(())
    }

    /// Initial prompt settings for a session.
    pub fn prompt_settings(&self) -> PromptSettings {
        PromptSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            role: self.role.clone(),
        }
    }
}
