/// DocuSign 模块 - 构建并发送签署信封
pub mod api;
pub mod types;

pub use api::{EnvelopesApi, ServiceReply, SubmitError};
pub use types::{SendEnvelopeRequest, SignatureRequest};

use crate::config::SignatureConfig;

/// 签署请求发送器
pub struct SignatureRequester {
    api: EnvelopesApi,
    config: SignatureConfig,
}

impl SignatureRequester {
    pub fn new(config: SignatureConfig) -> Self {
        Self {
            api: EnvelopesApi::new(&config.base_path),
            config,
        }
    }

    /// 发送信封
    ///
    /// # Arguments
    /// * `access_token` - 调用方提供的 DocuSign Bearer Token
    /// * `request` - 已读入文档内容的签署请求
    pub async fn submit(
        &self,
        access_token: &str,
        request: &SignatureRequest,
    ) -> Result<ServiceReply, SubmitError> {
        let envelope = request.to_envelope(&self.config);

        tracing::info!(
            "📨 发送信封: account={}, group={}, 文档 {} 字节",
            request.account_id,
            request.group_id,
            request.document.len()
        );

        let reply = self
            .api
            .create_envelope(access_token, &request.account_id, &envelope)
            .await?;

        tracing::info!("✅ 信封已创建 (HTTP {})", reply.status);
        Ok(reply)
    }
}
