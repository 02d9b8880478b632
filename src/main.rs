use std::{net::TcpListener, sync::Arc, time::Duration};

use env_logger::Env;
use pagedrop::{
    configuration::get_configuration,
    services::{
        DeliveryQueue, HttpDocumentSource, Orchestrator, PageExtractor, PgStorage, Storage,
        TranscriptClient,
    },
    startup::run,
};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let configuration = get_configuration().expect("Failed to read configuration.");

    let pool_options = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(15 * 60)) // 15 minutes
        .max_lifetime(None);

    let connection_pool = pool_options.connect_lazy_with(configuration.database.with_db());
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to run database migrations.");

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(address)?;

    let storage: Arc<dyn Storage> = Arc::new(PgStorage::new(connection_pool));

    let delivery = Arc::new(DeliveryQueue::new(
        configuration.delivery.endpoint().map(str::to_string),
        Duration::from_secs(configuration.delivery.retry_interval_secs),
        storage.clone(),
    ));
    delivery.initialize().await;

    let extractor = PageExtractor::new(TranscriptClient::new(configuration.transcript));
    let orchestrator = Arc::new(Orchestrator::new(
        storage,
        extractor,
        Arc::new(HttpDocumentSource::default()),
        delivery.clone(),
    ));
    orchestrator.load_persisted().await;

    run(listener, orchestrator, delivery, configuration.application)?.await
}
