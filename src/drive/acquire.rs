/// 文件获取：授权 → 列出文件夹 → 过滤 → 下载
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::DriveConfig;
use crate::drive::api::{DriveClient, DriveError};
use crate::drive::token::{TokenError, TokenManager};
use crate::drive::types::{DownloadedFile, DriveFile};

/// 文件名 / mime type 过滤条件
#[derive(Debug, Clone)]
pub struct FileFilter {
    pub name_contains: String,
    pub mime_type: String,
}

impl FileFilter {
    pub fn matches(&self, file: &DriveFile) -> bool {
        file.name.contains(&self.name_contains) && file.mime_type.contains(&self.mime_type)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("列出 Drive 文件夹失败: {0}")]
    Listing(DriveError),

    #[error("文件夹 {folder_id} 中在 {waited:?} 内没有匹配的文件")]
    NoMatchingFile { folder_id: String, waited: Duration },

    #[error("下载 {name} 失败: {source}")]
    Download { name: String, source: DriveError },

    #[error("创建下载目录失败: {0}")]
    LocalIo(#[from] std::io::Error),
}

/// 从固定文件夹获取第一个匹配的文件
pub struct FileAcquirer {
    tokens: Arc<TokenManager>,
    api_base: String,
    folder_id: String,
    filter: FileFilter,
    download_dir: PathBuf,
    poll_interval: Duration,
    acquire_timeout: Duration,
}

impl FileAcquirer {
    pub fn new(tokens: Arc<TokenManager>, config: &DriveConfig) -> Self {
        Self {
            tokens,
            api_base: config.api_base.clone(),
            folder_id: config.folder_id.clone(),
            filter: FileFilter {
                name_contains: config.name_contains.clone(),
                mime_type: config.mime_type.clone(),
            },
            download_dir: config.download_dir.clone(),
            poll_interval: config.poll_interval(),
            acquire_timeout: config.acquire_timeout(),
        }
    }

    /// 获取文件并写入 `<download_dir>/<request_id>/<文件名>`
    ///
    /// 文件夹中暂时没有匹配文件时按 `poll_interval` 轮询，
    /// 超过 `acquire_timeout` 返回 [`AcquireError::NoMatchingFile`]
    pub async fn acquire(&self, request_id: &str) -> Result<DownloadedFile, AcquireError> {
        let started = Instant::now();
        let deadline = started + self.acquire_timeout;

        let (file, client) = loop {
            // 每轮重新取 Token，长时间轮询中即将过期的 Token 会被提前刷新
            let access_token = self.tokens.get_valid_token().await?;
            let mut client = DriveClient::new(&self.api_base, access_token);

            let files = match client.list_folder(&self.folder_id).await {
                Err(DriveError::Unauthorized) => {
                    tracing::warn!("Drive 返回 401，强制刷新 Token 后重试一次");
                    let access_token = self.tokens.force_refresh().await?;
                    client = DriveClient::new(&self.api_base, access_token);
                    client
                        .list_folder(&self.folder_id)
                        .await
                        .map_err(AcquireError::Listing)?
                }
                other => other.map_err(AcquireError::Listing)?,
            };

            tracing::debug!("文件夹 {} 中共有 {} 个文件", self.folder_id, files.len());

            if let Some(file) = self.select(files) {
                break (file, client);
            }

            // 截止时间点上的那次列表也已检查过
            let now = Instant::now();
            if now >= deadline {
                let waited = now - started;
                tracing::warn!("文件夹 {} 中没有匹配的文件，放弃等待", self.folder_id);
                return Err(AcquireError::NoMatchingFile {
                    folder_id: self.folder_id.clone(),
                    waited,
                });
            }

            let pause = self.poll_interval.min(deadline - now);
            tracing::debug!("暂无匹配文件，{:?} 后重新检查", pause);
            tokio::time::sleep(pause).await;
        };

        let request_dir = self.download_dir.join(request_id);
        tokio::fs::create_dir_all(&request_dir).await?;
        let path = request_dir.join(local_file_name(&file));

        let bytes = client
            .download(&file, &path)
            .await
            .map_err(|source| {
                tracing::error!("下载 {} 失败: {}", file.name, source);
                AcquireError::Download {
                    name: file.name.clone(),
                    source,
                }
            })?;

        Ok(DownloadedFile {
            source: file,
            path,
            bytes,
        })
    }

    /// 选出第一个匹配的文件，其余匹配项只记录日志
    fn select(&self, files: Vec<DriveFile>) -> Option<DriveFile> {
        let mut matched = files.into_iter().filter(|f| self.filter.matches(f));
        let first = matched.next()?;

        for skipped in matched {
            tracing::info!("跳过额外的匹配文件: {} ({})", skipped.name, skipped.id);
        }

        Some(first)
    }
}

/// Drive 文件名可能包含路径分隔符，只保留最后一段
fn local_file_name(file: &DriveFile) -> PathBuf {
    let name = file.name.replace(['/', '\\'], "_");
    match Path::new(&name).file_name() {
        Some(base) if base != ".." => PathBuf::from(base),
        _ => PathBuf::from(format!("{}.pdf", file.id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::token::TokenStore;
    use crate::drive::token::testing::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn file(id: &str, name: &str, mime_type: &str) -> DriveFile {
        DriveFile {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
        }
    }

    fn filter() -> FileFilter {
        FileFilter {
            name_contains: "file".to_string(),
            mime_type: "application/pdf".to_string(),
        }
    }

    #[test]
    fn test_filter_requires_name_and_mime_type() {
        let filter = filter();
        assert!(filter.matches(&file("1", "my-file.pdf", "application/pdf")));
        assert!(!filter.matches(&file("2", "report.pdf", "application/pdf")));
        assert!(!filter.matches(&file("3", "file.docx", "application/vnd.google-apps.document")));
    }

    #[test]
    fn test_local_file_name_strips_paths() {
        assert_eq!(
            local_file_name(&file("1", "file.pdf", "application/pdf")),
            PathBuf::from("file.pdf")
        );
        assert_eq!(
            local_file_name(&file("2", "../../etc/file", "application/pdf")),
            PathBuf::from(".._.._etc_file")
        );
        assert_eq!(
            local_file_name(&file("3", "..", "application/pdf")),
            PathBuf::from("3.pdf")
        );
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        acquirer: FileAcquirer,
        download_dir: PathBuf,
        store: Arc<MemoryTokenStore>,
    }

    fn fixture(server: &MockServer, timeout_secs: u64) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let credentials = write_credentials(dir.path(), &format!("{}/token", server.uri()));
        let cipher = test_cipher();
        let store = Arc::new(MemoryTokenStore::with_token(stored_token(&cipher, "drive-token", 3600)));
        let tokens = Arc::new(TokenManager::new(
            store.clone(),
            Arc::new(StaticAuthorizer::new("unused")),
            cipher,
            credentials,
        ));

        let download_dir = dir.path().join("downloads");
        let config = DriveConfig {
            api_base: server.uri(),
            folder_id: "folder".to_string(),
            download_dir: download_dir.clone(),
            poll_interval_secs: 1,
            acquire_timeout_secs: timeout_secs,
            ..DriveConfig::default()
        };

        Fixture {
            acquirer: FileAcquirer::new(tokens, &config),
            download_dir,
            store,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_acquire_downloads_first_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [
                    {"id": "0", "name": "notes.txt", "mimeType": "text/plain"},
                    {"id": "1", "name": "file.pdf", "mimeType": "application/pdf"},
                    {"id": "2", "name": "file-copy.pdf", "mimeType": "application/pdf"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/1"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, 0);
        let downloaded = fx.acquirer.acquire("req-1").await.unwrap();

        assert_eq!(downloaded.source.id, "1");
        assert_eq!(downloaded.path, fx.download_dir.join("req-1").join("file.pdf"));
        assert_eq!(downloaded.bytes, 6);
        assert_eq!(std::fs::read(&downloaded.path).unwrap(), b"%PDF-1");
    }

    #[tokio::test]
    async fn test_acquire_without_match_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"files": []})),
            )
            .mount(&server)
            .await;

        let fx = fixture(&server, 0);
        let err = fx.acquirer.acquire("req-2").await.unwrap_err();

        assert!(matches!(err, AcquireError::NoMatchingFile { .. }));
        assert!(!fx.download_dir.join("req-2").exists());
    }

    #[tokio::test]
    async fn test_deadline_includes_final_listing() {
        let server = MockServer::start().await;
        // 间隔 1 秒、超时 2 秒：在 0、1、2 秒各列一次
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"files": []})),
            )
            .expect(3)
            .mount(&server)
            .await;

        let fx = fixture(&server, 2);
        let started = std::time::Instant::now();
        let err = fx.acquirer.acquire("req-6").await.unwrap_err();

        assert!(started.elapsed() >= Duration::from_secs(2));
        match err {
            AcquireError::NoMatchingFile { waited, .. } => {
                assert!(waited >= Duration::from_secs(2), "{waited:?}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_file_appearing_at_deadline_is_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"files": []})),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "late", "name": "file.pdf", "mimeType": "application/pdf"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/late"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pdf".to_vec()))
            .mount(&server)
            .await;

        // 第三次列表恰好发生在截止时间
        let fx = fixture(&server, 2);
        let downloaded = fx.acquirer.acquire("req-7").await.unwrap();
        assert_eq!(downloaded.source.id, "late");
    }

    #[tokio::test]
    async fn test_each_poll_uses_current_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(wiremock::matchers::bearer_token("drive-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"files": []})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(wiremock::matchers::bearer_token("rotated"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "r", "name": "file.pdf", "mimeType": "application/pdf"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/r"))
            .and(wiremock::matchers::bearer_token("rotated"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pdf".to_vec()))
            .mount(&server)
            .await;

        let fx = fixture(&server, 5);

        // 轮询期间 Token 被其他请求刷新
        let store = fx.store.clone();
        let rotate = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            store
                .save(&stored_token(&test_cipher(), "rotated", 3600))
                .unwrap();
        });

        let downloaded = fx.acquirer.acquire("req-9").await.unwrap();
        rotate.await.unwrap();
        assert_eq!(downloaded.source.id, "r");
    }

    #[tokio::test]
    async fn test_download_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "gone", "name": "file.pdf", "mimeType": "application/pdf"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string("File not found"))
            .mount(&server)
            .await;

        let fx = fixture(&server, 0);
        let err = fx.acquirer.acquire("req-8").await.unwrap_err();
        match err {
            AcquireError::Download { name, source } => {
                assert_eq!(name, "file.pdf");
                assert!(matches!(source, DriveError::Api { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_acquire_polls_until_file_appears() {
        let server = MockServer::start().await;
        // 第一次列表为空，之后出现匹配文件
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"files": []})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "7", "name": "file.pdf", "mimeType": "application/pdf"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/7"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pdf".to_vec()))
            .mount(&server)
            .await;

        let fx = fixture(&server, 5);
        let downloaded = fx.acquirer.acquire("req-3").await.unwrap();
        assert_eq!(downloaded.source.id, "7");
    }

    #[tokio::test]
    async fn test_listing_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
            .mount(&server)
            .await;

        let fx = fixture(&server, 0);
        let err = fx.acquirer.acquire("req-4").await.unwrap_err();
        assert!(matches!(err, AcquireError::Listing(DriveError::Api { .. })));
    }

    #[tokio::test]
    async fn test_unauthorized_listing_refreshes_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(wiremock::matchers::bearer_token("drive-token"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "renewed",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(wiremock::matchers::bearer_token("renewed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "9", "name": "file.pdf", "mimeType": "application/pdf"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/9"))
            .and(wiremock::matchers::bearer_token("renewed"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pdf".to_vec()))
            .mount(&server)
            .await;

        let fx = fixture(&server, 0);
        let downloaded = fx.acquirer.acquire("req-5").await.unwrap();
        assert_eq!(downloaded.source.id, "9");
    }
}
