//! Alert Mailer - Main Entry Point
//!
//! Consumes alert events from a durable AMQP queue and delivers them as
//! email, reconnecting with backoff whenever the broker goes away.

use alert_mailer::config::{MailProvider, PipelineConfig};
use alert_mailer::mail::providers::{HttpMailTransport, SmtpMailTransport};
use alert_mailer::mail::{MailDispatcher, MailTransport};
use alert_mailer::observability::{health::HealthServer, init_default_logging, metrics::metrics};
use alert_mailer::transport::AmqpConnectionManager;
use alert_mailer::{ConsumerSupervisor, PipelineError, PipelineResult, QueueConsumer};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Durable alert queue to email delivery
#[derive(Parser)]
#[command(name = "alert-mailer")]
#[command(about = "Consume alert events from a durable queue and deliver them as email")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "ALERT_MAILER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the consumer until SIGINT/SIGTERM
    Run,
    /// Validate the configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting alert-mailer v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_pipeline(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(config_path: Option<&PathBuf>) -> PipelineResult<PipelineConfig> {
    let path = match config_path {
        Some(path) => path.clone(),
        None => PipelineConfig::find_default_path().ok_or_else(|| {
            PipelineError::internal(
                "No configuration file found. Provide one with -c/--config or create alert-mailer.toml",
            )
        })?,
    };

    info!("Loading configuration from: {}", path.display());
    Ok(PipelineConfig::load_from_file(&path)?)
}

/// Builds the configured mail provider
struct MailTransportFactory;

impl MailTransportFactory {
    fn create(config: &PipelineConfig) -> PipelineResult<Arc<dyn MailTransport>> {
        let transport: Arc<dyn MailTransport> = match config.mail.provider {
            MailProvider::Smtp => Arc::new(SmtpMailTransport::new(config.smtp_config()?)?),
            MailProvider::Http => Arc::new(HttpMailTransport::new(config.http_mail_config()?)?),
        };
        Ok(transport)
    }
}

/// Wire the pipeline together from configuration
fn build_supervisor(
    config: &PipelineConfig,
) -> PipelineResult<ConsumerSupervisor<AmqpConnectionManager>> {
    let transport = MailTransportFactory::create(config)?;
    info!(provider = transport.name(), "Mail provider configured");

    let mailer = Arc::new(MailDispatcher::new(transport, config.mail_timeout()));
    let consumer = QueueConsumer::new(mailer, config.consumer_settings());
    let manager = AmqpConnectionManager::new(config.amqp_settings()?)?;

    Ok(ConsumerSupervisor::new(
        manager,
        consumer,
        config.supervisor.clone(),
    ))
}

async fn run_pipeline(config: PipelineConfig) -> PipelineResult<()> {
    metrics().set_supervisor_state("idle");

    let supervisor = Arc::new(build_supervisor(&config)?);

    let health_server = HealthServer::new(
        config.health_port(),
        config.broker.queue.clone(),
        supervisor.subscribe(),
    );
    let health_task = tokio::spawn(health_server.start());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor_task = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run(shutdown_rx).await })
    };

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!(queue = %config.broker.queue, "Pipeline running");

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }

    // In-flight sends finish (or time out) before the session closes
    let _ = shutdown_tx.send(true);
    if let Err(e) = supervisor_task.await {
        warn!("Supervisor task ended abnormally: {}", e);
    }
    health_task.abort();

    let stats = supervisor.consumer().stats();
    info!(
        delivered = stats.delivered,
        transient_failures = stats.transient_failures,
        permanent_failures = stats.permanent_failures,
        decode_errors = stats.decode_errors,
        "Final consumer statistics"
    );
    Ok(())
}

fn handle_config_command(config: &PipelineConfig, show: bool) -> PipelineResult<()> {
    if show {
        let rendered = toml::to_string_pretty(config)
            .map_err(|e| PipelineError::internal(format!("cannot render configuration: {e}")))?;
        println!("Current configuration:");
        println!("{rendered}");
    }

    info!("Configuration validation complete");
    Ok(())
}
