//! Alert publishing utility
//!
//! Puts a single alert onto the durable queue, the same way an upstream
//! producer would. Handy for smoke-testing a running consumer.
//!
//! ## Usage
//!
//! ```bash
//! publish-alert --email ops@example.com --subject "Storm Warning" \
//!   --body "Severe weather approaching"
//!
//! # Deliberately malformed payload, to exercise the error path
//! publish-alert --raw 'not json'
//! ```

use alert_mailer::protocol::AlertMessage;
use alert_mailer::transport::amqp::parse_broker_url;
use clap::Parser;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties};

#[derive(Parser)]
#[command(
    name = "publish-alert",
    about = "Publish an alert event onto the durable alert queue"
)]
struct Args {
    /// Broker URL
    #[arg(long, env = "AMQP_URL", default_value = "amqp://localhost:5672/%2f")]
    url: String,

    /// Target queue
    #[arg(long, default_value = "alerts")]
    queue: String,

    /// Recipient address
    #[arg(long, required_unless_present = "raw")]
    email: Option<String>,

    /// Subject line
    #[arg(long, default_value = "")]
    subject: String,

    /// Message body
    #[arg(long, default_value = "")]
    body: String,

    /// Publish this payload verbatim instead of building an alert
    #[arg(long, conflicts_with = "email")]
    raw: Option<String>,

    /// Publish the same message this many times
    #[arg(long, default_value_t = 1)]
    count: u32,
}

impl Args {
    fn payload(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        match (&self.raw, &self.email) {
            (Some(raw), _) => Ok(raw.as_bytes().to_vec()),
            (None, Some(email)) => {
                Ok(AlertMessage::new(email.as_str(), self.subject.as_str(), self.body.as_str())
                    .to_payload()?)
            }
            (None, None) => Err("either --email or --raw is required".into()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let url = parse_broker_url(&args.url)?;
    let payload = args.payload()?;

    println!(
        "Connecting to {}:{}...",
        url.host_str().unwrap_or_default(),
        url.port().unwrap_or(5672)
    );
    let connection = Connection::connect(url.as_str(), ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;
    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await?;

    channel
        .queue_declare(
            &args.queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;

    let properties = BasicProperties::default()
        .with_delivery_mode(2)
        .with_content_type("application/json".into());

    for _ in 0..args.count {
        let confirmation = channel
            .basic_publish(
                "",
                &args.queue,
                BasicPublishOptions::default(),
                &payload,
                properties.clone(),
            )
            .await?
            .await?;
        if confirmation.is_nack() {
            return Err("broker refused the message".into());
        }
    }

    println!(
        "Published {} message(s) to '{}' ({} bytes each)",
        args.count,
        args.queue,
        payload.len()
    );

    channel.close(200, "done").await?;
    connection.close(200, "done").await?;
    Ok(())
}
