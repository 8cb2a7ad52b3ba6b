//! Catalog demo entry point.
//!
//! Runs a scripted session against the pipeline and prints the collected
//! metrics. Uses Postgres when `DATABASE_URL` is set, in-memory stores
//! otherwise.

use std::sync::Arc;

use cache::InMemoryCacheStore;
use catalog::attribute::{CreateAttribute, GetAttributes};
use catalog::brand::{CreateBrand, DeleteBrand, GetBrand, ListBrands, UpdateBrand};
use domain::{AuthenticatedUser, EventPublisher, InMemoryEventPublisher, UnitOfWorkFactory};
use entity_store::{EntityStore, InMemoryEntityStore, PostgresEntityStore};
use futures_util::StreamExt;
use pipeline::{Mediator, PipelineConfig, PipelineError, RequestContext};
use sqlx::postgres::PgPoolOptions;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn connect_store() -> Result<Arc<dyn EntityStore>, BoxError> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        tracing::info!("DATABASE_URL not set, using in-memory store");
        return Ok(Arc::new(InMemoryEntityStore::new()));
    };

    let pool = PgPoolOptions::new().max_connections(5).connect(&url).await?;
    let store = PostgresEntityStore::new(pool);
    store.run_migrations().await?;
    tracing::info!("connected to postgres");
    Ok(Arc::new(store))
}

async fn run_session(mediator: &Mediator) -> Result<(), PipelineError> {
    let editor = || RequestContext::new(Arc::new(AuthenticatedUser::new("editor-1").with_name("Editor")));

    // 1. Attributes: a cached list invalidated by creation
    mediator
        .send_with(CreateAttribute::new("Color"), editor())
        .await?;
    let first = mediator.send(GetAttributes).await?;
    let second = mediator.send(GetAttributes).await?;
    tracing::info!(count = first.len(), cached = (first == second), "attributes listed");

    mediator.send_with(CreateAttribute::new("Size"), editor()).await?;
    let attributes = mediator.send(GetAttributes).await?;
    tracing::info!(count = attributes.len(), "attributes listed after create");

    // 2. Brands: detail cache invalidated by update
    let id = mediator
        .send_with(CreateBrand::new("Acme"), editor())
        .await?;
    let brand = mediator.send(GetBrand { id }).await?;
    tracing::info!(name = %brand.name, version = brand.version, "brand loaded");

    let updated = mediator
        .send_with(
            UpdateBrand::new(id, "Acme Corporation").with_website("https://acme.test"),
            editor(),
        )
        .await?;
    tracing::info!(name = %updated.name, version = updated.version, "brand updated");

    let page = mediator.send(ListBrands::default()).await?;
    tracing::info!(total = page.total, "brands listed");

    // 3. Rejected requests
    if let Err(err) = mediator.send(CreateAttribute::new("   ")).await {
        tracing::info!(error = %err, "blank attribute rejected");
    }

    mediator.send_with(DeleteBrand { id }, editor()).await?;
    if let Err(err) = mediator.send(GetBrand { id }).await {
        tracing::info!(error = %err, "deleted brand is gone");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Configuration and tracing
    let config = PipelineConfig::from_env();
    pipeline::telemetry::init_tracing(&config)?;
    tracing::info!(environment = ?config.environment, "starting catalog demo");

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Stores, publisher and a subscriber draining published events
    let store = connect_store().await?;
    let publisher = InMemoryEventPublisher::new();
    let mut events = publisher.subscribe();
    let subscriber = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            tracing::info!(
                event_type = %event.event_type,
                aggregate_id = %event.aggregate_id,
                version = %event.aggregate_version,
                "event published"
            );
        }
    });

    let publisher: Arc<dyn EventPublisher> = Arc::new(publisher);
    let uow = UnitOfWorkFactory::new(store, publisher);

    // 4. Mediator
    let mediator = catalog::register(
        Mediator::builder()
            .config(config)
            .cache_store(Arc::new(InMemoryCacheStore::new())),
        &uow,
    )
    .build()?;

    // 5. Scripted session
    run_session(&mediator).await?;

    // Dropping the last publisher handle closes the event stream.
    drop(mediator);
    drop(uow);
    subscriber.await?;

    println!("{}", metrics_handle.render());
    Ok(())
}
