use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use docuspace::api::{self, AppState};
use docuspace::collab::CollabService;
use docuspace::completion::ChatCompletionClient;
use docuspace::config;
use docuspace::embedding::{EmbeddingClient, HashEmbeddingClient, HttpEmbeddingClient};
use docuspace::index::VectorIndexClient;
use docuspace::logging;
use docuspace::metrics::PipelineMetrics;
use docuspace::pipeline::{PipelineService, PipelineSettings};
use docuspace::retry::RetryPolicy;
use docuspace::store::{self, ChatStore, DocumentStore, MessageStore, SpaceStore};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    let pool = store::connect(&config.database_path)
        .await
        .context("Failed to open database")?;
    store::init_schema(&pool)
        .await
        .context("Failed to initialize database schema")?;

    let documents = DocumentStore::new(pool.clone());
    let collab = CollabService::new(
        documents.clone(),
        SpaceStore::new(pool.clone()),
        ChatStore::new(pool.clone()),
        MessageStore::new(pool),
    );

    let timeout = Duration::from_secs(config.provider_timeout_secs);
    let embedding: Arc<dyn EmbeddingClient> = match &config.embedding_url {
        Some(url) => Arc::new(
            HttpEmbeddingClient::new(
                url,
                config.embedding_api_key.clone(),
                &config.embedding_model,
                config.embedding_dimension,
                timeout,
            )
            .context("Failed to build embedding client")?,
        ),
        None => {
            tracing::warn!("EMBEDDING_URL not set; using the deterministic fallback embedder");
            Arc::new(HashEmbeddingClient::new(config.embedding_dimension))
        }
    };
    let completion = Arc::new(
        ChatCompletionClient::new(
            &config.completion_url,
            config.completion_api_key.clone(),
            timeout,
        )
        .context("Failed to build completion client")?,
    );
    let index = Arc::new(
        VectorIndexClient::new(
            &config.index_url,
            config.index_api_key.clone(),
            &config.index_name,
            config.embedding_dimension as u64,
            timeout,
        )
        .context("Failed to build vector index client")?,
    );

    let settings = PipelineSettings {
        chunk_size: config.chunk_size,
        chunk_overlap: config.chunk_overlap,
        search_top_k: config.search_top_k,
        embedding_concurrency: config.embedding_concurrency,
        completion_model: config.completion_model.clone(),
        retry: RetryPolicy {
            max_attempts: config.retry_max_attempts,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        },
    };
    let pipeline = PipelineService::new(
        embedding,
        completion,
        index,
        documents.clone(),
        collab.clone(),
        Arc::new(PipelineMetrics::new()),
        settings,
    );

    let app = api::create_router(AppState {
        pipeline,
        collab,
        documents,
    });

    let (listener, port) = bind_listener().await.context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4200..=4299;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4200-4299",
    ))
}
