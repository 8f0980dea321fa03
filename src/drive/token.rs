/// Token 存储与自动刷新管理模块
use anyhow::{Context, Result};
use async_trait::async_trait;
use oauth2::{RefreshToken, TokenResponse, basic::BasicTokenResponse};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::crypto::TokenCipher;
use crate::config::oauth_config::OAuthConfig;
use crate::drive::types::{GrantedToken, StoredToken};

/// Token 刷新阈值（提前多少分钟刷新）
const REFRESH_THRESHOLD_MINUTES: i64 = 5;

/// Token 持久化接口
///
/// 由 [`TokenManager`] 持有，所有请求共享同一个实例
pub trait TokenStore: Send + Sync {
    /// 读取已保存的 Token，不存在时返回 `None`
    fn load(&self) -> Result<Option<StoredToken>>;

    /// 保存（覆盖）Token
    fn save(&self, token: &StoredToken) -> Result<()>;

    /// Token 是否仍可直接使用
    fn is_valid(&self, token: &StoredToken) -> bool {
        !token.is_token_expiring(REFRESH_THRESHOLD_MINUTES)
    }
}

/// 交互式授权接口（首次使用或没有可用 Token 时调用）
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, config: &OAuthConfig) -> Result<GrantedToken>;
}

/// 基于 JSON 文件的 Token 存储（默认 `token.json`）
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<StoredToken>> {
        if !self.path.exists() {
            tracing::debug!("Token 文件不存在: {}", self.path.display());
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("读取 Token 文件失败: {}", self.path.display()))?;

        let token: StoredToken = serde_json::from_str(&content)
            .context("解析 Token 文件失败（文件可能损坏，删除后重新授权）")?;

        Ok(Some(token))
    }

    /// 先写临时文件再重命名，避免并发读到写了一半的文件
    fn save(&self, token: &StoredToken) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("创建 Token 目录失败")?;
        }

        let content = serde_json::to_string_pretty(token).context("序列化 Token 失败")?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)
            .with_context(|| format!("写入 Token 文件失败: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("替换 Token 文件失败: {}", self.path.display()))?;

        tracing::info!("Token 已保存到 {}", self.path.display());
        Ok(())
    }
}

/// Token 获取失败的原因
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// credentials.json 缺失或无效
    #[error("客户端凭据不可用: {0:#}")]
    Credentials(anyhow::Error),

    /// 交互式授权或刷新失败
    #[error("OAuth2 授权失败: {0:#}")]
    Authorization(anyhow::Error),

    /// Token 读写或解密失败
    #[error("Token 存储错误: {0:#}")]
    Store(anyhow::Error),
}

/// Token 管理器
///
/// 负责按需授权、自动刷新过期的 Access Token。
/// 授权与刷新由互斥锁串行化，同一时刻只有一个请求会访问 OAuth2 端点。
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    authorizer: Arc<dyn Authorizer>,
    cipher: TokenCipher,
    credentials_path: PathBuf,
    lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        authorizer: Arc<dyn Authorizer>,
        cipher: TokenCipher,
        credentials_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            authorizer,
            cipher,
            credentials_path: credentials_path.into(),
            lock: Mutex::new(()),
        }
    }

    /// 获取有效的 Access Token
    ///
    /// - 已保存且未过期：直接返回
    /// - 即将过期（默认提前 5 分钟）：使用 Refresh Token 刷新并保存
    /// - 未保存：执行交互式授权并保存
    ///
    /// 每次调用都会重新读取客户端凭据文件
    pub async fn get_valid_token(&self) -> Result<String, TokenError> {
        let oauth = self.load_credentials()?;
        let _guard = self.lock.lock().await;

        match self.store.load().map_err(TokenError::Store)? {
            Some(token) if self.store.is_valid(&token) => token
                .decrypt_access_token(&self.cipher)
                .map_err(TokenError::Store),
            Some(token) => {
                tracing::info!("Access Token 即将过期（{}），自动刷新", token.expires_at);
                self.refresh_locked(&oauth, token).await
            }
            None => self.authorize_locked(&oauth).await,
        }
    }

    /// 强制刷新 Access Token
    ///
    /// 在 API 返回 401 时调用
    pub async fn force_refresh(&self) -> Result<String, TokenError> {
        let oauth = self.load_credentials()?;
        let _guard = self.lock.lock().await;

        match self.store.load().map_err(TokenError::Store)? {
            Some(token) => self.refresh_locked(&oauth, token).await,
            None => self.authorize_locked(&oauth).await,
        }
    }

    fn load_credentials(&self) -> Result<OAuthConfig, TokenError> {
        OAuthConfig::load(&self.credentials_path).map_err(|e| {
            tracing::error!("加载客户端凭据失败: {:#}", e);
            TokenError::Credentials(e)
        })
    }

    async fn authorize_locked(&self, oauth: &OAuthConfig) -> Result<String, TokenError> {
        tracing::info!("🔐 没有已保存的 Token，开始交互式授权");

        let grant = self
            .authorizer
            .authorize(oauth)
            .await
            .map_err(TokenError::Authorization)?;
        let access_token = grant.access_token.clone();

        let token = StoredToken::from_grant(&self.cipher, grant).map_err(TokenError::Authorization)?;
        self.store.save(&token).map_err(TokenError::Store)?;

        tracing::info!("✅ 授权完成");
        Ok(access_token)
    }

    async fn refresh_locked(
        &self,
        oauth: &OAuthConfig,
        mut token: StoredToken,
    ) -> Result<String, TokenError> {
        let refresh_token = token
            .decrypt_refresh_token(&self.cipher)
            .context("解密 Refresh Token 失败")
            .map_err(TokenError::Store)?;

        let grant = exchange_refresh_token(oauth, refresh_token)
            .await
            .map_err(TokenError::Authorization)?;
        let access_token = grant.access_token.clone();

        token
            .apply_refresh(&self.cipher, grant)
            .map_err(TokenError::Store)?;
        self.store.save(&token).map_err(TokenError::Store)?;

        tracing::info!("✅ Access Token 刷新成功（新的过期时间: {}）", token.expires_at);
        Ok(access_token)
    }
}

/// 使用 Refresh Token 交换新的 Access Token
async fn exchange_refresh_token(oauth: &OAuthConfig, refresh_token: String) -> Result<GrantedToken> {
    let client = oauth.client(None)?;

    let response = client
        .exchange_refresh_token(&RefreshToken::new(refresh_token))
        .request_async(oauth2::reqwest::async_http_client)
        .await
        .map_err(|e| {
            let error_msg = e.to_string();

            if error_msg.contains("invalid_grant") {
                tracing::error!("❌ Token 刷新失败 [授权被拒绝/已过期]: {}", error_msg);
                tracing::error!("   💡 Refresh Token 已过期或被撤销，删除 token.json 后重新授权");
                anyhow::anyhow!("Refresh Token 交换失败（可能已过期或被撤销）：{}", error_msg)
            } else {
                anyhow::anyhow!("Refresh Token 交换失败: {}", error_msg)
            }
        })?;

    Ok(grant_from_response(&response))
}

/// 从 OAuth2 Token 响应提取授权结果
pub(crate) fn grant_from_response(response: &BasicTokenResponse) -> GrantedToken {
    GrantedToken {
        access_token: response.access_token().secret().to_string(),
        refresh_token: response.refresh_token().map(|t| t.secret().to_string()),
        expires_in_seconds: response
            .expires_in()
            .unwrap_or(Duration::from_secs(3600))
            .as_secs() as i64,
        scopes: response
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default(),
    }
}
