/// HTTP 入口：健康检查 + 发送信封
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::docusign::SendEnvelopeRequest;
use crate::error::AppError;
use crate::pipeline::SigningPipeline;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<SigningPipeline>,
}

impl AppState {
    pub fn new(pipeline: SigningPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn router(state: AppState, route: &str) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(route, post(send_envelope))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// 接收签署请求，完成后返回 DocuSign 的原始 JSON
async fn send_envelope(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let request = parse_request(&headers, &body)?;
    request.validate().map_err(AppError::BadRequest)?;

    let reply = state.pipeline.run(request).await?;

    Ok((
        reply.status,
        [(header::CONTENT_TYPE, "application/json")],
        reply.body,
    )
        .into_response())
}

/// 按 Content-Type 解析 JSON 或表单请求体
fn parse_request(headers: &HeaderMap, body: &[u8]) -> Result<SendEnvelopeRequest, AppError> {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

    if is_form {
        let fields: serde_json::Map<String, serde_json::Value> = url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), serde_json::Value::String(v.into_owned())))
            .collect();
        return serde_json::from_value(serde_json::Value::Object(fields))
            .map_err(|e| AppError::BadRequest(format!("表单字段错误: {}", e)));
    }

    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("JSON 解析失败: {}", e)))
}

/// 等待 Ctrl+C 后优雅退出
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("监听退出信号失败: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，停止接收新请求");
}
