use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::notify::DeliveryConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL. Absent: in-memory ledger (dev only).
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    /// Time the recipient has to accept or decline a transfer
    pub transfer_ttl_secs: i64,
    pub atm_code_ttl_secs: i64,
    pub reset_batch_size: i64,
    pub expiry_scan_interval_secs: u64,
    pub expiry_batch_size: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            transfer_ttl_secs: 600,
            atm_code_ttl_secs: 600,
            reset_batch_size: 500,
            expiry_scan_interval_secs: 60,
            expiry_batch_size: 100,
        }
    }
}

/// Shared secret expected in `X-Webhook-Token`
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct WebhookConfig {
    pub secret: String,
}

/// HS256 key for verifying bearer tokens
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Log,
    Http,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    pub sms_url: Option<String>,
    pub timeout_ms: u64,
    pub queue_size: usize,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Log,
            sms_url: None,
            timeout_ms: 5000,
            queue_size: 1024,
            max_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl NotifierConfig {
    pub fn delivery(&self) -> DeliveryConfig {
        DeliveryConfig {
            queue_size: self.queue_size,
            max_attempts: self.max_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`, then apply environment overrides
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// `DATABASE_URL`, `WEBHOOK_SECRET` and `JWT_SECRET` win over the file
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            self.postgres_url = Some(url);
        }
        if let Some(secret) = lookup("WEBHOOK_SECRET").filter(|v| !v.is_empty()) {
            self.webhook.secret = secret;
        }
        if let Some(secret) = lookup("JWT_SECRET").filter(|v| !v.is_empty()) {
            self.auth.jwt_secret = secret;
        }
    }
}
