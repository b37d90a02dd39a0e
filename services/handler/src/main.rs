use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_types::region::Region;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vigil_handler::config::HandlerConfig;
use vigil_handler::consumer::NotificationConsumer;
use vigil_handler::detect::{DetectionHandler, MatchPolicy};
use vigil_handler::enroll::EnrollmentHandler;
use vigil_handler::faces::RekognitionCatalog;
use vigil_handler::notify::{AlertSink, SnsAlertSink};
use vigil_handler::objects::S3ObjectDirectory;
use vigil_handler::store::DynamoRecordStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration; missing required values are fatal here, never
    // per event.
    let config = HandlerConfig::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        collection = %config.recognition.collection_id,
        "Starting Vigil handler service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Shared AWS configuration for every collaborator client
    let mut aws_loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.aws.region.clone()));
    if let Some(ref endpoint_url) = config.aws.endpoint_url {
        aws_loader = aws_loader.endpoint_url(endpoint_url);
    }
    let aws_config = aws_loader.load().await;

    let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);
    if config.aws.force_path_style {
        s3_config_builder = s3_config_builder.force_path_style(true);
    }
    let s3_client = aws_sdk_s3::Client::from_conf(s3_config_builder.build());

    let objects = Arc::new(S3ObjectDirectory::new(s3_client));
    let faces = Arc::new(RekognitionCatalog::new(
        aws_sdk_rekognition::Client::new(&aws_config),
        config.recognition.collection_id.clone(),
    ));
    let records = Arc::new(DynamoRecordStore::new(
        aws_sdk_dynamodb::Client::new(&aws_config),
        config.audit.table_name.clone(),
    ));

    // Absent topic ARN is the valid "alerting disabled" state.
    let alerts: Option<Arc<dyn AlertSink>> = match config.alerting.topic_arn {
        Some(ref topic_arn) => {
            info!(topic = %topic_arn, "Intruder alerting enabled");
            Some(Arc::new(SnsAlertSink::new(
                aws_sdk_sns::Client::new(&aws_config),
                topic_arn.clone(),
            )))
        }
        None => {
            info!("No notification topic configured, alerting disabled");
            None
        }
    };

    let enrollment = Arc::new(EnrollmentHandler::new(
        objects,
        faces.clone(),
        records.clone(),
        config.recognition.identity_metadata_key.clone(),
    ));

    let detection = Arc::new(DetectionHandler::new(
        faces,
        records,
        alerts,
        MatchPolicy::new(
            config.recognition.similarity_threshold,
            config.recognition.alert_on_no_face,
        ),
    ));

    let consumer = NotificationConsumer::new(
        &config.kafka,
        config.buckets.clone(),
        enrollment,
        detection,
    )
    .context("Failed to initialize Kafka consumer")?;

    // Spawn consumer task
    let consumer_handle = tokio::spawn(async move {
        if let Err(e) = consumer.run().await {
            error!(error = %e, "Notification consumer error");
        }
    });

    info!("Handler service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down handler service");

    consumer_handle.abort();

    info!("Handler service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
