use axum::{
    routing::{get, post},
    Router,
};
use std::env;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use comment_sentiment::api;
use comment_sentiment::config::PipelineConfig;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::trigger_analysis,
        api::get_analysis_status,
        api::list_tasks,
        api::health
    ),
    components(
        schemas(
            api::AnalyzeRequest,
            api::AnalyzeResponse,
            api::TaskStatus,
            api::TaskResult,
            api::TaskSummary,
            comment_sentiment::models::PipelineReport,
            comment_sentiment::models::SentimentResult,
            comment_sentiment::models::SentimentCounts,
            comment_sentiment::models::Sentiment
        )
    ),
    tags(
        (name = "analysis", description = "Comment sentiment analysis runs")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = PipelineConfig::from_env();
    if config.completion.api_key.is_empty() {
        tracing::warn!("NVIDIA_API_KEY not set; every request must carry its own api_key");
    }
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    let state = Arc::new(api::AppState::new(config));

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::health))
        .route("/analyze", post(api::trigger_analysis))
        .route("/analyze/:task_id", get(api::get_analysis_status))
        .route("/tasks", get(api::list_tasks))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
