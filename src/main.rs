//! Conductor server binary.
//!
//! This is the main entry point for running Conductor as a standalone
//! server. For library usage, import from the `conductor` crate instead.

use std::sync::Arc;

use axum::{routing::get, Router};
use conductor::db::InMemoryRepository;
use conductor::llm::provider_registry::ProviderConfig;
use conductor::utils::OrchestratorConfig;
use conductor::{
    AppState, Cache, Classifier, ConversationRepository, EmbeddingService, LruCache, MemoryComposer,
    Orchestrator, Planner, ProviderRegistry, ToolRegistry, TursoClient,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
#[cfg(feature = "swagger-ui")]
use utoipa::OpenApi;
#[cfg(feature = "swagger-ui")]
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Conductor — a conversational agent orchestrator");

    let config = OrchestratorConfig::from_env()?;

    // =================================================================
    // Persistence
    // =================================================================
    let repo: Arc<dyn ConversationRepository> = if config.database.turso_url == ":memory:" {
        Arc::new(InMemoryRepository::new())
    } else if config.database.use_local {
        Arc::new(TursoClient::new_local(&config.database.turso_url).await?)
    } else {
        Arc::new(
            TursoClient::new_remote(config.database.turso_url.clone(), config.database.turso_auth_token.clone())
                .await?,
        )
    };
    tracing::info!("Persistence repository initialized");

    // =================================================================
    // LLM provider
    // =================================================================
    let provider = ProviderRegistry::build(&ProviderConfig {
        kind: config.llm.default_provider.clone(),
        openai_api_key: config.llm.openai_api_key.clone(),
        openai_base_url: config.llm.openai_api_base.clone(),
        ollama_url: Some(config.llm.ollama_url.clone()),
        anthropic_api_key: config.llm.anthropic_api_key.clone(),
    })?;
    tracing::info!("LLM provider initialized");

    // =================================================================
    // Tools, cache, embeddings
    // =================================================================
    let registry = Arc::new(ToolRegistry::with_default_tools());
    let cache: Arc<dyn Cache> = Arc::new(LruCache::with_defaults());
    let embeddings = Arc::new(EmbeddingService::with_defaults());
    tracing::info!("Tool registry initialized with {} categories", registry.categories().len());

    // =================================================================
    // Memory, classifier, planner
    // =================================================================
    let composer = Arc::new(MemoryComposer::new(
        repo.clone(),
        cache.clone(),
        embeddings.clone(),
        provider.clone(),
        config.llm.summarization_model.clone(),
    ));
    let classifier = Arc::new(Classifier::new(provider.clone(), config.llm.default_model.clone()));
    let planner = Arc::new(Planner::new(provider.clone(), config.llm.default_model.clone()));

    // =================================================================
    // Orchestrator
    // =================================================================
    let orchestrator = Arc::new(Orchestrator::new(
        repo.clone(),
        provider,
        registry,
        composer,
        classifier,
        planner,
        embeddings,
        config.llm.default_model.clone(),
        config.llm.vision_model.clone(),
    ));

    let state = AppState { orchestrator, repo };

    // =================================================================
    // Router
    // =================================================================
    #[cfg(feature = "swagger-ui")]
    #[derive(OpenApi)]
    #[openapi(
        paths(conductor::api::handlers::chat::chat, conductor::api::handlers::conversations::list_conversations),
        components(schemas(conductor::types::ChatRequest, conductor::types::ConversationSummaryDto)),
        tags((name = "chat", description = "Chat endpoints"), (name = "conversations", description = "Conversation endpoints")),
        info(title = "Conductor API", version = "0.1.0", description = "Conversational agent orchestrator")
    )]
    struct ApiDoc;

    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api", conductor::api::routes::create_router());

    #[cfg(feature = "swagger-ui")]
    let app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let app = app
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
