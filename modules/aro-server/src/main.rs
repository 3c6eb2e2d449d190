use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use aro_runtime::{
    routing::parse_query, Application, Contract, EngineDeps, ExecutionEngine, HttpRequest,
    HttpResponse,
};

mod config;

use config::ServerConfig;

/// Request bodies above this size are rejected.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("aro=info".parse()?))
        .init();

    let config = ServerConfig::from_env()?;
    config.log_summary();

    let application = Application::from_json(
        &tokio::fs::read_to_string(&config.application)
            .await
            .with_context(|| format!("reading {}", config.application.display()))?,
    )
    .context("parsing application")?;

    let contract = match &config.contract {
        Some(path) => Some(
            Contract::from_json(
                &tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?,
            )
            .context("parsing OpenAPI contract")?,
        ),
        None => None,
    };
    let serve_http = contract.is_some();

    let engine = EngineDeps::builder()
        .application(application)
        .contract(contract)
        .config(config.engine.clone())
        .build()
        .build_engine()?;

    let starter = engine.clone();
    let start = tokio::spawn(async move {
        match starter.start().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Application-Start failed");
                starter.services().lifecycle.signal_shutdown();
                false
            }
        }
    });

    if serve_http {
        let addr = config.addr();
        info!(application = engine.name(), "ARO server starting on {addr}");
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router(engine.clone()))
            .with_graceful_shutdown(shutdown_signal(engine.clone()))
            .await?;
    } else {
        info!(application = engine.name(), "No contract configured, HTTP disabled");
        shutdown_signal(engine.clone()).await;
    }

    let success = if start.is_finished() {
        start.await.unwrap_or(false)
    } else {
        true
    };
    engine.shutdown(success).await?;
    info!(success, "ARO server stopped");
    Ok(())
}

/// Every request goes to the engine, which routes by the contract.
fn router(engine: ExecutionEngine) -> Router {
    Router::new()
        .fallback(handle)
        .with_state(engine)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

async fn handle(State(engine): State<ExecutionEngine>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            return into_response(HttpResponse::error(400, "unreadable request body"));
        }
    };

    let mut req =
        HttpRequest::new(parts.method.as_str(), parts.uri.path()).with_body(body.to_vec());
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            req = req.with_header(name.as_str(), value);
        }
    }
    if let Some(raw) = parts.uri.query() {
        req.query.extend(parse_query(raw));
    }

    into_response(engine.handle_request(req).await)
}

fn into_response(response: HttpResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            headers.insert(name, value);
        }
    }

    let body = if status == StatusCode::NO_CONTENT {
        headers.remove(axum::http::header::CONTENT_TYPE);
        Body::empty()
    } else {
        Body::from(response.body.to_string())
    };
    (status, headers, body).into_response()
}

/// Resolves on Ctrl-C or when a feature set stops the application.
async fn shutdown_signal(engine: ExecutionEngine) {
    let services = engine.services().clone();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                services.lifecycle.wait_for_shutdown().await;
            }
            info!("Shutdown requested");
        }
        _ = services.lifecycle.wait_for_shutdown() => {
            info!("Application requested shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aro_runtime::{
        AroStatement, BinaryOp, Expression, FeatureSet, Preposition, ResultDescriptor,
    };
    use serde_json::{json, Value as Json};
    use tower::ServiceExt;

    const CONTRACT: &str = r#"{
        "openapi": "3.0.3",
        "paths": {
            "/hello/{name}": { "get": { "operationId": "sayHello" } },
            "/ping": { "post": { "operationId": "ping" } }
        }
    }"#;

    fn engine() -> ExecutionEngine {
        let greeting = Expression::binary(
            BinaryOp::Concat,
            Expression::literal("Hello, "),
            Expression::field("pathParameters", "name"),
        );
        let application = Application::new("Greeter")
            .with_feature_set(FeatureSet::new("sayHello", "Greeting API").with_statement(
                AroStatement::new(
                    "Return",
                    ResultDescriptor::qualified("OK", "status"),
                    Preposition::With,
                    greeting,
                ),
            ))
            .with_feature_set(FeatureSet::new("ping", "Greeting API").with_statement(
                AroStatement::new(
                    "Log",
                    ResultDescriptor::new("ping"),
                    Preposition::To,
                    Expression::literal("console"),
                ),
            ));
        EngineDeps::builder()
            .application(application)
            .contract(Some(Contract::from_json(CONTRACT).unwrap()))
            .build()
            .build_engine()
            .unwrap()
    }

    async fn send(request: axum::http::Request<Body>) -> (StatusCode, Option<String>, String) {
        let response = router(engine()).oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn operations_respond_with_json() {
        let (status, content_type, body) = send(
            axum::http::Request::get("/hello/Ada%20L")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        assert_eq!(serde_json::from_str::<Json>(&body).unwrap(), json!("Hello, Ada L"));
    }

    #[tokio::test]
    async fn unknown_paths_are_404() {
        let (status, _, body) = send(
            axum::http::Request::get("/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body: Json = serde_json::from_str(&body).unwrap();
        assert!(body["error"].as_str().unwrap().contains("/nope"));
    }

    #[tokio::test]
    async fn handlers_without_a_response_return_204() {
        let (status, content_type, body) = send(
            axum::http::Request::post("/ping")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(content_type, None);
        assert!(body.is_empty());
    }

    #[test]
    fn engine_responses_convert_to_http() {
        let response = into_response(HttpResponse::json(201, json!({"id": 7})));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "application/json"
        );
    }

    #[tokio::test]
    async fn null_bodies_are_sent_as_json_unless_no_content() {
        let response = into_response(HttpResponse::json(200, Json::Null));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "application/json"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"null");

        let empty = into_response(HttpResponse::json(204, Json::Null));
        assert!(empty.headers().get(axum::http::header::CONTENT_TYPE).is_none());
        let bytes = to_bytes(empty.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }
}
