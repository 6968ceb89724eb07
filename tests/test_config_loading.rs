//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.

use alert_mailer::config::{ConfigError, MailProvider, PipelineConfig};
use alert_mailer::mail::providers::SmtpTls;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[broker]
url = "amqp://rabbit.internal:5672/%2f"
queue = "weather-alerts"
dead_letter_queue = "weather-alerts.dead"

[mail]
provider = "smtp"
from = "alerts@example.com"

[mail.smtp]
host = "smtp.example.com"
port = 465
tls = "implicit"
"#,
    );

    let config = PipelineConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.broker.queue, "weather-alerts");
    assert_eq!(config.mail.provider, MailProvider::Smtp);

    let smtp = config.smtp_config().unwrap();
    assert_eq!(smtp.host, "smtp.example.com");
    assert_eq!(smtp.port, 465);
    assert_eq!(smtp.tls, SmtpTls::Implicit);
    assert_eq!(smtp.credentials, None);
    assert_eq!(smtp.timeout, Duration::from_secs(30));

    let settings = config.amqp_settings().unwrap();
    assert_eq!(settings.url, "amqp://rabbit.internal:5672/%2f");
    assert_eq!(settings.dead_letter_queue.as_deref(), Some("weather-alerts.dead"));
}

#[test]
fn test_minimal_config_uses_defaults() {
    let temp_file = write_config(
        r#"
[mail]
provider = "http"
from = "alerts@example.com"

[mail.http]
endpoint = "https://mail.example.com/v1/send"
"#,
    );

    let config = PipelineConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.broker.url, "amqp://localhost:5672/%2f");
    assert_eq!(config.broker.queue, "alerts");
    assert_eq!(config.broker.prefetch, 1);
    assert_eq!(config.consumer.requeue_delay_ms, 1000);
    assert_eq!(
        config.supervisor.delay_for(1),
        Duration::from_millis(config.supervisor.sustained_delay_ms)
    );

    let http = config.http_mail_config().unwrap();
    assert_eq!(http.endpoint, "https://mail.example.com/v1/send");
    assert_eq!(http.api_key, None);
}

#[test]
fn test_missing_file_is_file_read_error() {
    let result = PipelineConfig::load_from_file(std::path::Path::new(
        "/nonexistent/alert-mailer.toml",
    ));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_invalid_toml_is_parse_error() {
    let temp_file = write_config("[mail\nprovider = ");
    let result = PipelineConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_missing_mail_section_is_rejected() {
    let temp_file = write_config("[broker]\nqueue = \"alerts\"\n");
    let result = PipelineConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_broker_url_env_overrides_file() {
    std::env::set_var(
        "ALERT_MAILER_IT_BROKER_URL",
        "amqps://mq.example.com:5671/prod",
    );

    let temp_file = write_config(
        r#"
[broker]
url_env = "ALERT_MAILER_IT_BROKER_URL"

[mail]
provider = "smtp"
from = "alerts@example.com"

[mail.smtp]
host = "localhost"
"#,
    );

    let config = PipelineConfig::load_from_file(temp_file.path()).unwrap();
    assert_eq!(
        config.amqp_settings().unwrap().url,
        "amqps://mq.example.com:5671/prod"
    );
}

#[test]
fn test_show_output_round_trips() {
    let temp_file = write_config(
        r#"
[mail]
provider = "smtp"
from = "alerts@example.com"

[mail.smtp]
host = "localhost"
"#,
    );

    let config = PipelineConfig::load_from_file(temp_file.path()).unwrap();
    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed = PipelineConfig::from_toml(&rendered).unwrap();
    assert_eq!(config, reparsed);
}
