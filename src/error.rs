/// HTTP 层错误类型
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::docusign::SubmitError;
use crate::drive::AcquireError;
use crate::drive::token::TokenError;
use crate::pipeline::PipelineError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 请求体无法解析或缺少字段
    #[error("请求无效: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl AppError {
    /// 错误对应的状态码与错误标识
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::Pipeline(PipelineError::Acquire(e)) => match e {
                AcquireError::Token(TokenError::Credentials(_)) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "credentials_unavailable")
                }
                AcquireError::Token(TokenError::Authorization(_)) => {
                    (StatusCode::BAD_GATEWAY, "authorization_failed")
                }
                AcquireError::Token(TokenError::Store(_)) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "token_store_error")
                }
                AcquireError::Listing(_) => (StatusCode::BAD_GATEWAY, "listing_failed"),
                AcquireError::NoMatchingFile { .. } => (StatusCode::NOT_FOUND, "no_matching_file"),
                AcquireError::Download { .. } => (StatusCode::BAD_GATEWAY, "download_failed"),
                AcquireError::LocalIo(_) => (StatusCode::INTERNAL_SERVER_ERROR, "local_io"),
            },
            AppError::Pipeline(PipelineError::Document { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "local_io")
            }
            AppError::Pipeline(PipelineError::Submit(SubmitError::InvalidAccountId(_))) => {
                (StatusCode::BAD_REQUEST, "invalid_request")
            }
            AppError::Pipeline(PipelineError::Submit(_)) => {
                (StatusCode::BAD_GATEWAY, "signature_service_unavailable")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // DocuSign 的结构化错误体原样转发
        if let AppError::Pipeline(PipelineError::Submit(SubmitError::Rejected(reply))) = self {
            return (
                reply.status,
                [(header::CONTENT_TYPE, "application/json")],
                reply.body,
            )
                .into_response();
        }

        let (status, error) = self.classify();
        if status.is_server_error() {
            tracing::error!("请求失败 ({}): {}", status, self);
        }

        let body = ErrorBody {
            error,
            message: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}
