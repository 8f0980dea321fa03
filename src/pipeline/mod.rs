/// 签署流水线
///
/// 每个请求依次经过：received → downloading → submitting → responded，
/// 任何一步失败都以明确的错误结束，不会让请求悬挂
use std::path::PathBuf;
use tracing::Instrument;

use crate::docusign::{SendEnvelopeRequest, ServiceReply, SignatureRequest, SignatureRequester, SubmitError};
use crate::drive::{AcquireError, DownloadedFile, FileAcquirer};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error("读取已下载的文件失败 {}: {source}", .path.display())]
    Document {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

pub struct SigningPipeline {
    acquirer: FileAcquirer,
    requester: SignatureRequester,
}

impl SigningPipeline {
    pub fn new(acquirer: FileAcquirer, requester: SignatureRequester) -> Self {
        Self {
            acquirer,
            requester,
        }
    }

    /// 执行一次完整的获取 + 签署
    ///
    /// 不做去重：相同请求调用两次会发送两个信封
    pub async fn run(&self, request: SendEnvelopeRequest) -> Result<ServiceReply, PipelineError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("envelope", request_id = %request_id);

        async {
            tracing::info!("📨 收到签署请求 (account {})", request.account_id);
            let result = self.run_stages(&request_id, &request).await;
            match &result {
                Ok(reply) => tracing::info!("✅ DocuSign 已响应 {}", reply.status),
                Err(e) => tracing::error!("❌ 签署流程失败: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        request_id: &str,
        request: &SendEnvelopeRequest,
    ) -> Result<ServiceReply, PipelineError> {
        let downloaded = self.acquirer.acquire(request_id).await?;
        tracing::info!(
            "📄 已获取 {} ({} 字节) -> {}",
            downloaded.source.name,
            downloaded.bytes,
            downloaded.path.display()
        );

        // 下载已 sync 到磁盘，这里从文件重新读取
        let signature_request = build_signature_request(request, &downloaded).await?;

        tracing::debug!("提交信封到 DocuSign");
        let reply = self
            .requester
            .submit(&request.auth, &signature_request)
            .await?;

        Ok(reply)
    }
}

async fn build_signature_request(
    request: &SendEnvelopeRequest,
    downloaded: &DownloadedFile,
) -> Result<SignatureRequest, PipelineError> {
    let document = tokio::fs::read(&downloaded.path)
        .await
        .map_err(|source| PipelineError::Document {
            path: downloaded.path.clone(),
            source,
        })?;

    Ok(SignatureRequest {
        account_id: request.account_id.clone(),
        group_id: request.group_id.clone(),
        email_subject: request.email_subject.clone(),
        email_content: request.email_content.clone(),
        document,
    })
}
