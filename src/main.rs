use axum::{response::IntoResponse, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use karma_backend::api;
use karma_backend::config::{self, Config};
use karma_backend::db::Database;
use karma_backend::decay;
use karma_backend::engine::ReputationEngine;
use karma_backend::metrics;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "karma-backend" }))
}

async fn metrics_endpoint() -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    config::set_local_mode(config.local_mode);
    metrics::register_metrics();

    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    let engine = Arc::new(ReputationEngine::new(db.clone(), &config));

    // Spawn background decay worker for inactive ratings
    if config.decay_enabled {
        decay::spawn_decay_worker(
            db.clone(),
            config.decay_interval_seconds,
            config.decay_inactivity_seconds,
        );
    }

    let api_token = config.api_token.clone();

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .merge(api::router(engine))
        .layer(CorsLayer::permissive())
        // Static bearer token guard for /api/ routes. Disabled when no
        // token is configured.
        .layer(axum::middleware::from_fn(
            move |req: axum::http::Request<axum::body::Body>, next: axum::middleware::Next| {
                let expected = api_token.clone();
                async move {
                    if let Some(expected) = expected {
                        if req.uri().path().starts_with("/api/") {
                            let authorized = req
                                .headers()
                                .get(axum::http::header::AUTHORIZATION)
                                .and_then(|v| v.to_str().ok())
                                .and_then(|v| v.strip_prefix("Bearer "))
                                .map(|t| t == expected)
                                .unwrap_or(false);
                            if !authorized {
                                return (
                                    axum::http::StatusCode::UNAUTHORIZED,
                                    Json(json!({ "error": "Invalid or missing API token" })),
                                )
                                    .into_response();
                            }
                        }
                    }
                    next.run(req).await
                }
            },
        ))
        .layer(axum::middleware::from_fn(
            |req: axum::http::Request<axum::body::Body>, next: axum::middleware::Next| async move {
                let method = req.method().to_string();
                let endpoint = metrics::normalize_path(req.uri().path());
                let start = std::time::Instant::now();
                let response = next.run(req).await;
                metrics::API_REQUESTS_TOTAL
                    .with_label_values(&[&method, &endpoint, response.status().as_str()])
                    .inc();
                metrics::API_REQUEST_DURATION_SECONDS
                    .with_label_values(&[&endpoint])
                    .observe(start.elapsed().as_secs_f64());
                response
            },
        ));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind server port");

    tracing::info!("Karma backend listening on port {}", config.port);
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
