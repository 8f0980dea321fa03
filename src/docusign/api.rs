/// DocuSign eSignature REST API 调用模块
use axum::body::Bytes;
use reqwest::{StatusCode, Url};

use crate::docusign::types::EnvelopeDefinition;
use crate::utils::http_client;

/// DocuSign 的原始响应（状态码 + 未经改写的响应体）
#[derive(Debug, Clone)]
pub struct ServiceReply {
    pub status: StatusCode,
    pub body: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// DocuSign 返回了结构化的错误体（如 `{"errorCode": ..., "message": ...}`）
    #[error("DocuSign 拒绝了信封 ({})", .0.status)]
    Rejected(ServiceReply),

    /// 非 JSON 的错误响应
    #[error("DocuSign 返回非结构化错误 {status}: {body}")]
    Unstructured { status: StatusCode, body: String },

    #[error("DocuSign 请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("DocuSign base path 无效: {0}")]
    InvalidBasePath(String),

    #[error("accountId 不是合法的路径段: {0:?}")]
    InvalidAccountId(String),
}

/// Envelopes API 客户端
pub struct EnvelopesApi {
    base_path: String,
}

impl EnvelopesApi {
    /// # Arguments
    /// * `base_path` - 如 `https://demo.docusign.net/restapi`
    pub fn new(base_path: &str) -> Self {
        Self {
            base_path: base_path.trim_end_matches('/').to_string(),
        }
    }

    /// 创建（并立即发送）信封
    ///
    /// 成功时返回 DocuSign 的原始响应体
    pub async fn create_envelope(
        &self,
        access_token: &str,
        account_id: &str,
        envelope: &EnvelopeDefinition,
    ) -> Result<ServiceReply, SubmitError> {
        let url = self.envelopes_url(account_id)?;

        let response = http_client::get_client()
            .post(url)
            .bearer_auth(access_token)
            .json(envelope)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return Ok(ServiceReply { status, body });
        }

        if serde_json::from_slice::<serde_json::Value>(&body).is_ok_and(|v| v.is_object()) {
            tracing::warn!("DocuSign 返回错误 {}: {}", status, String::from_utf8_lossy(&body));
            return Err(SubmitError::Rejected(ServiceReply { status, body }));
        }

        Err(SubmitError::Unstructured {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    /// `{base}/v2.1/accounts/{accountId}/envelopes`，accountId 作为单个路径段编码
    fn envelopes_url(&self, account_id: &str) -> Result<Url, SubmitError> {
        if matches!(account_id, "" | "." | "..") {
            return Err(SubmitError::InvalidAccountId(account_id.to_string()));
        }

        let mut url = Url::parse(&self.base_path)
            .map_err(|e| SubmitError::InvalidBasePath(format!("{}: {}", self.base_path, e)))?;
        url.path_segments_mut()
            .map_err(|_| SubmitError::InvalidBasePath(self.base_path.clone()))?
            .pop_if_empty()
            .extend(["v2.1", "accounts", account_id, "envelopes"]);

        Ok(url)
    }
}
