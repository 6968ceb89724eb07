//! Pipeline configuration
//!
//! Loaded from a TOML file. Secrets never live in the file itself: the file
//! names the environment variables that hold them (`*_env` fields), and they
//! are read when the runtime objects are built.

use crate::consumer::ConsumerSettings;
use crate::mail::providers::{HttpMailConfig, SmtpConfig, SmtpTls};
use crate::supervisor::BackoffConfig;
use crate::transport::AmqpSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Files tried, in order, when no `--config` is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["alert-mailer.toml", "config/alert-mailer.toml"];

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub consumer: ConsumerSection,
    #[serde(default)]
    pub supervisor: BackoffConfig,
    pub mail: MailSection,
    #[serde(default)]
    pub health: HealthSection,
}

/// `[broker]` - AMQP connection and queue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker URL, `amqp://` or `amqps://`
    #[serde(default = "default_broker_url")]
    pub url: String,
    /// Environment variable that, when set, replaces `url`
    pub url_env: Option<String>,
    /// Environment variables holding credentials to inject into the URL
    pub username_env: Option<String>,
    pub password_env: Option<String>,
    /// Durable queue carrying alert events
    #[serde(default = "default_queue")]
    pub queue: String,
    /// Unacknowledged deliveries the broker may push at once
    #[serde(default = "default_prefetch")]
    pub prefetch: u16,
    #[serde(default = "default_consumer_tag")]
    pub consumer_tag: String,
    /// Durable queue receiving permanently failed messages
    pub dead_letter_queue: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_broker_url() -> String {
    "amqp://localhost:5672/%2f".to_string()
}

fn default_queue() -> String {
    "alerts".to_string()
}

fn default_prefetch() -> u16 {
    1
}

fn default_consumer_tag() -> String {
    "alert-mailer".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            url_env: None,
            username_env: None,
            password_env: None,
            queue: default_queue(),
            prefetch: default_prefetch(),
            consumer_tag: default_consumer_tag(),
            dead_letter_queue: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// `[consumer]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumerSection {
    /// Pause before a transiently failed message is handed back
    #[serde(default = "default_requeue_delay_ms")]
    pub requeue_delay_ms: u64,
}

fn default_requeue_delay_ms() -> u64 {
    1000
}

impl Default for ConsumerSection {
    fn default() -> Self {
        Self {
            requeue_delay_ms: default_requeue_delay_ms(),
        }
    }
}

/// Which mail provider delivers alerts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MailProvider {
    Smtp,
    Http,
}

/// `[mail]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MailSection {
    pub provider: MailProvider,
    /// Sender address
    pub from: String,
    /// Upper bound on one provider call
    #[serde(default = "default_mail_timeout_secs")]
    pub timeout_secs: u64,
    pub smtp: Option<SmtpSection>,
    pub http: Option<HttpSection>,
}

fn default_mail_timeout_secs() -> u64 {
    30
}

/// `[mail.smtp]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmtpSection {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: SmtpTls,
    pub username_env: Option<String>,
    pub password_env: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

/// `[mail.http]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpSection {
    pub endpoint: String,
    pub api_key_env: Option<String>,
}

/// `[health]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSection {
    #[serde(default = "default_health_port")]
    pub port: u16,
}

fn default_health_port() -> u16 {
    8080
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            port: default_health_port(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// First default location that exists, if any
    pub fn find_default_path() -> Option<PathBuf> {
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.is_file())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::InvalidConfig(message.to_string()));

        if self.broker.queue.trim().is_empty() {
            return invalid("broker.queue must not be empty");
        }
        if self.broker.prefetch == 0 {
            return invalid("broker.prefetch must be at least 1");
        }
        if self.broker.dead_letter_queue.as_deref() == Some(self.broker.queue.as_str()) {
            return invalid("broker.dead_letter_queue must differ from broker.queue");
        }
        if self.broker.dead_letter_queue.as_deref().map(str::trim) == Some("") {
            return invalid("broker.dead_letter_queue must not be empty when set");
        }
        if self.broker.connect_timeout_secs == 0 {
            return invalid("broker.connect_timeout_secs must be greater than zero");
        }
        if self.broker.url_env.is_none() {
            crate::transport::amqp::parse_broker_url(&self.broker.url)
                .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        }

        self.supervisor
            .validate()
            .map_err(ConfigError::InvalidConfig)?;

        if self.mail.from.trim().is_empty() {
            return invalid("mail.from must not be empty");
        }
        if self.mail.timeout_secs == 0 {
            return invalid("mail.timeout_secs must be greater than zero");
        }
        match self.mail.provider {
            MailProvider::Smtp if self.mail.smtp.is_none() => {
                return invalid("mail.provider = \"smtp\" requires a [mail.smtp] section");
            }
            MailProvider::Http if self.mail.http.is_none() => {
                return invalid("mail.provider = \"http\" requires a [mail.http] section");
            }
            _ => {}
        }

        Ok(())
    }

    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_var_name)
            .map_err(|_| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// Broker URL with `url_env` override and credential injection applied
    pub fn broker_url(&self) -> Result<String, ConfigError> {
        let raw = match &self.broker.url_env {
            Some(name) => Self::get_env_var_required(name)?,
            None => self.broker.url.clone(),
        };

        let username = Self::get_env_var_optional(self.broker.username_env.as_ref());
        let password = Self::get_env_var_optional(self.broker.password_env.as_ref());
        if username.is_none() && password.is_none() {
            return Ok(raw);
        }

        let mut url = Url::parse(&raw).map_err(|_| {
            ConfigError::InvalidConfig(format!(
                "broker URL is not valid: {}",
                crate::error::sanitize_error_message(&raw)
            ))
        })?;
        let rejected = || ConfigError::InvalidConfig("broker URL cannot carry credentials".into());
        if let Some(username) = username {
            url.set_username(&username).map_err(|_| rejected())?;
        }
        if let Some(password) = password {
            url.set_password(Some(&password)).map_err(|_| rejected())?;
        }
        Ok(url.to_string())
    }

    pub fn amqp_settings(&self) -> Result<AmqpSettings, ConfigError> {
        Ok(AmqpSettings {
            url: self.broker_url()?,
            queue: self.broker.queue.clone(),
            prefetch: self.broker.prefetch,
            consumer_tag: self.broker.consumer_tag.clone(),
            dead_letter_queue: self.broker.dead_letter_queue.clone(),
            connect_timeout: Duration::from_secs(self.broker.connect_timeout_secs),
        })
    }

    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            requeue_delay: Duration::from_millis(self.consumer.requeue_delay_ms),
        }
    }

    pub fn mail_timeout(&self) -> Duration {
        Duration::from_secs(self.mail.timeout_secs)
    }

    /// SMTP provider settings with credentials read from the environment
    pub fn smtp_config(&self) -> Result<SmtpConfig, ConfigError> {
        let smtp = self
            .mail
            .smtp
            .as_ref()
            .ok_or_else(|| ConfigError::InvalidConfig("missing [mail.smtp] section".into()))?;

        let credentials = match (&smtp.username_env, &smtp.password_env) {
            (Some(user_env), Some(pass_env)) => Some((
                Self::get_env_var_required(user_env)?,
                Self::get_env_var_required(pass_env)?,
            )),
            (None, None) => None,
            _ => {
                return Err(ConfigError::InvalidConfig(
                    "mail.smtp needs both username_env and password_env, or neither".into(),
                ))
            }
        };

        Ok(SmtpConfig {
            host: smtp.host.clone(),
            port: smtp.port,
            tls: smtp.tls,
            credentials,
            from: self.mail.from.clone(),
            timeout: self.mail_timeout(),
        })
    }

    /// HTTP provider settings with the API key read from the environment
    pub fn http_mail_config(&self) -> Result<HttpMailConfig, ConfigError> {
        let http = self
            .mail
            .http
            .as_ref()
            .ok_or_else(|| ConfigError::InvalidConfig("missing [mail.http] section".into()))?;

        let api_key = match &http.api_key_env {
            Some(name) => Some(Self::get_env_var_required(name)?),
            None => None,
        };

        Ok(HttpMailConfig {
            endpoint: http.endpoint.clone(),
            api_key,
            from: self.mail.from.clone(),
            timeout: self.mail_timeout(),
        })
    }

    /// Health port, overridable with `HEALTH_PORT`
    pub fn health_port(&self) -> u16 {
        std::env::var("HEALTH_PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(self.health.port)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[broker]
url = "amqp://localhost:5672/%2f"

[mail]
provider = "smtp"
from = "alerts@example.com"

[mail.smtp]
host = "localhost"
port = 1025
tls = "none"
"#;
        Self::from_toml(toml_content).expect("Test config should parse")
    }
}
