//! services/api/src/bin/api.rs

use adaptive_tutor_core::domain::TrainingMaterial;
use adaptive_tutor_core::memory::InMemoryStore;
use adaptive_tutor_core::pipeline::LearningPipeline;
use adaptive_tutor_core::ports::{DatabaseService, DocumentStore};
use api_lib::{
    adapters::{DbAdapter, OpenAiTutorAdapter},
    config::Config,
    error::ApiError,
    web::{router, state::AppState, ApiDoc},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Persistence ---
    let (db, documents): (Arc<dyn DatabaseService>, Arc<dyn DocumentStore>) = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            let db: Arc<dyn DatabaseService> = db_adapter.clone();
            let documents: Arc<dyn DocumentStore> = db_adapter;
            (db, documents)
        }
        None => {
            warn!("DATABASE_URL is not set; sessions are kept in memory and lost on restart");
            let store = Arc::new(InMemoryStore::new());
            if let Some(dir) = &config.materials_dir {
                seed_materials(&store, dir).await?;
            }
            let db: Arc<dyn DatabaseService> = store.clone();
            let documents: Arc<dyn DocumentStore> = store;
            (db, documents)
        }
    };

    // --- 3. Initialize the AI Backend Adapter ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let openai_client = Client::with_config(openai_config);
    let ai_adapter = Arc::new(
        OpenAiTutorAdapter::new(
            openai_client,
            config.generation_model.clone(),
            config.chat_model.clone(),
            config.enrichment_model.clone(),
        )
        .map_err(|e| ApiError::Internal(e.to_string()))?,
    );

    // --- 4. Build the Pipeline & Shared AppState ---
    let pipeline = Arc::new(LearningPipeline::new(db, documents, ai_adapter, config.pipeline.clone()));
    let app_state = Arc::new(AppState {
        pipeline: pipeline.clone(),
        config: config.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("http://localhost:3000"))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let app = Router::new()
        .merge(router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    info!("Server stopped; draining background work...");
    pipeline.shutdown().await;
    Ok(())
}

/// Loads every `.txt` or `.md` file of `dir` as a training.
async fn seed_materials(store: &InMemoryStore, dir: &Path) -> Result<(), ApiError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_text = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("txt") | Some("md")
        );
        if !is_text {
            continue;
        }
        let text = tokio::fs::read_to_string(&path).await?;
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string();
        let material = TrainingMaterial::new(Uuid::new_v4(), Uuid::nil(), title, text);
        info!("Loaded training '{}' as {}", material.title, material.id);
        store.insert_material(material).await;
    }
    Ok(())
}
