/// Google Drive API 调用模块
///
/// 负责列出文件夹内容并把文件内容流式写入本地磁盘
use reqwest::StatusCode;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::drive::types::{DriveFile, FileList};
use crate::utils::http_client;

/// files.list 只请求需要的字段
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType)";

/// 单页最大条目数
const PAGE_SIZE: &str = "100";

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    /// Access Token 无效或已过期
    #[error("Drive API 返回 401，Token 无效或已过期")]
    Unauthorized,

    #[error("Drive API 返回错误 {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("Drive API 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("写入本地文件失败: {0}")]
    Io(#[from] std::io::Error),
}

/// Drive API 客户端
pub struct DriveClient {
    api_base: String,
    access_token: String,
}

impl DriveClient {
    /// # Arguments
    /// * `api_base` - API 根地址，如 `https://www.googleapis.com`
    /// * `access_token` - 已解密的 Access Token（明文）
    pub fn new(api_base: &str, access_token: String) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    /// 列出文件夹中所有未删除的文件
    ///
    /// 自动跟随 `nextPageToken` 翻页
    pub async fn list_folder(&self, folder_id: &str) -> Result<Vec<DriveFile>, DriveError> {
        let url = format!("{}/drive/v3/files", self.api_base);
        let query = format!("'{}' in parents and trashed=false", folder_id);

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.as_str()),
                ("fields", LIST_FIELDS),
                ("pageSize", PAGE_SIZE),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let response = http_client::get_client()
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&params)
                .send()
                .await?;

            let response = check_status(response).await?;
            let page: FileList = response.json().await?;

            tracing::debug!("Drive 文件列表: 本页 {} 个文件", page.files.len());
            files.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(files)
    }

    /// 下载文件内容到 `dest`
    ///
    /// 按块写入，返回前已 flush 并 sync 到磁盘
    ///
    /// # Returns
    /// 写入的字节数
    pub async fn download(&self, file: &DriveFile, dest: &Path) -> Result<u64, DriveError> {
        let url = format!("{}/drive/v3/files/{}", self.api_base, file.id);

        let response = http_client::get_client()
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("alt", "media")])
            .send()
            .await?;

        let mut response = check_status(response).await?;

        let mut out = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;

        while let Some(chunk) = response.chunk().await? {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        out.flush().await?;
        out.sync_all().await?;

        tracing::info!("✅ {} 下载完成（{} 字节）", file.name, written);
        Ok(written)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(DriveError::Unauthorized);
    }

    let body = response.text().await.unwrap_or_default();
    Err(DriveError::Api { status, body })
}
